//! Layout fast-clock broadcasts.
//!
//! A fast-clock node periodically sends a `'T'` packet carrying both the
//! real wall time and the scaled layout time:
//!
//! | Byte | Meaning |
//! |------|---------|
//! | 0..3 | real hour, minute, second |
//! | 3 | flags: 0x01 fast mode, 0x02 hold, 0x04 real 12h, 0x08 fast 12h |
//! | 4..7 | fast hour, minute, second |
//! | 7..9 | scale factor, big endian |
//! | 9..12 | real date: 12 bit year, 4 bit month, day |

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::packet::Packet;

/// Command byte of a fast-clock broadcast.
pub const FAST_CLOCK_CMD: u8 = b'T';

const FLAG_FAST_MODE: u8 = 0x01;
const FLAG_HOLD: u8 = 0x02;
const FLAG_REAL_12H: u8 = 0x04;
const FLAG_FAST_12H: u8 = 0x08;

/// One decoded broadcast. Times that do not form a valid clock reading are
/// `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FastClockStatus {
    pub real: Option<NaiveDateTime>,
    pub fast: Option<NaiveTime>,
    pub fast_mode: bool,
    pub hold: bool,
    pub real_12h: bool,
    pub fast_12h: bool,
    pub factor: u16,
}

impl FastClockStatus {
    /// Decodes a broadcast. Anything other than a `'T'` packet with at
    /// least 12 data bytes is ignored.
    pub fn decode(pkt: &Packet) -> Option<Self> {
        if pkt.cmd != FAST_CLOCK_CMD || pkt.data.len() < 12 {
            return None;
        }
        let d = &pkt.data;
        let flags = d[3];

        let fast = NaiveTime::from_hms_opt(d[4].into(), d[5].into(), d[6].into());
        let year = (i32::from(d[9]) << 4) | i32::from(d[10] >> 4);
        let real = NaiveDate::from_ymd_opt(year, u32::from(d[10] & 0x0F), d[11].into())
            .and_then(|date| date.and_hms_opt(d[0].into(), d[1].into(), d[2].into()));

        Some(Self {
            real,
            fast,
            fast_mode: flags & FLAG_FAST_MODE != 0,
            hold: flags & FLAG_HOLD != 0,
            real_12h: flags & FLAG_REAL_12H != 0,
            fast_12h: flags & FLAG_FAST_12H != 0,
            factor: u16::from_be_bytes([d[7], d[8]]),
        })
    }

    /// Status bar text, e.g. `FAST: 02:15:00PM   REAL: 09:41:07`.
    pub fn status_line(&self) -> String {
        let mut line = String::new();
        if let Some(fast) = self.fast {
            if self.hold {
                line.push_str("FAST: HOLD");
            } else if self.fast_12h {
                line.push_str(&fast.format("FAST: %I:%M:%S%p").to_string());
            } else {
                line.push_str(&fast.format("FAST: %H:%M:%S").to_string());
            }
        }
        if let Some(real) = self.real {
            line.push_str("   ");
            if self.real_12h {
                line.push_str(&real.format("REAL: %I:%M:%S%p").to_string());
            } else {
                line.push_str(&real.format("REAL: %H:%M:%S").to_string());
            }
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-03-15 09:41:07 real, 14:15:00 fast, factor 4.
    fn broadcast(flags: u8) -> Packet {
        Packet::new(
            0xFF,
            0x0C,
            b'T',
            vec![9, 41, 7, flags, 14, 15, 0, 0, 4, 0x7E, 0x83, 15],
        )
    }

    #[test]
    fn decodes_fields() {
        let status = FastClockStatus::decode(&broadcast(0x01)).unwrap();
        assert!(status.fast_mode);
        assert!(!status.hold);
        assert_eq!(status.factor, 4);
        assert_eq!(status.fast, NaiveTime::from_hms_opt(14, 15, 0));
        assert_eq!(
            status.real,
            NaiveDate::from_ymd_opt(2024, 3, 15).and_then(|d| d.and_hms_opt(9, 41, 7))
        );
    }

    #[test]
    fn formats_status_line() {
        let status = FastClockStatus::decode(&broadcast(0x01)).unwrap();
        assert_eq!(status.status_line(), "FAST: 14:15:00   REAL: 09:41:07");

        let status = FastClockStatus::decode(&broadcast(0x08)).unwrap();
        assert_eq!(status.status_line(), "FAST: 02:15:00PM   REAL: 09:41:07");

        let status = FastClockStatus::decode(&broadcast(0x02 | 0x04)).unwrap();
        assert_eq!(status.status_line(), "FAST: HOLD   REAL: 09:41:07AM");
    }

    #[test]
    fn ignores_short_or_other_packets() {
        let mut pkt = broadcast(0);
        pkt.data.truncate(11);
        assert!(FastClockStatus::decode(&pkt).is_none());

        let mut pkt = broadcast(0);
        pkt.cmd = b'S';
        assert!(FastClockStatus::decode(&pkt).is_none());
    }

    #[test]
    fn invalid_times_are_dropped() {
        let mut pkt = broadcast(0);
        pkt.data[4] = 25;
        pkt.data[10] = 0x80; // month 0
        let status = FastClockStatus::decode(&pkt).unwrap();
        assert_eq!(status.fast, None);
        assert_eq!(status.real, None);
        assert_eq!(status.status_line(), "");
    }
}
