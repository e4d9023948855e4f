//! Single-bit sensor decoding out of MRBus status packets.
//!
//! A sensor is described in layout files by a pattern `"0xSS,C,N:B"`:
//!
//! | Part | Meaning |
//! |------|---------|
//! | `0xSS` | source node address, two hex digits |
//! | `C` | command character of the status packet |
//! | `N` | byte number counted from the start of the raw bus frame |
//! | `B` | bit within that byte, 0-7 |
//!
//! Raw frames carry a six byte header before the payload, so byte `N` is
//! payload offset `N - 6`.
//!
//! A sensor whose source address is zero never matches anything. That is
//! how unconfigured or unparseable sensors behave.
//!
//! ```rust
//! use rs_ctc::packet::Packet;
//! use rs_ctc::sensor::SensorBit;
//!
//! let mut bit = SensorBit::from_pattern("0x37,C,6:3").unwrap();
//! let pkt = Packet::new(0xFF, 0x37, b'C', vec![0x08]);
//! assert!(bit.test_packet(&pkt));
//! assert!(bit.state());
//! assert!(!bit.test_packet(&pkt));
//! ```

use crate::packet::Packet;

/// Bytes of bus framing ahead of the payload.
pub const HEADER_LEN: usize = 6;

/// Why a sensor pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    /// Text does not have the `0xSS,C,N:B` shape.
    #[error("sensor pattern {0:?} does not match 0xSS,C,N:B")]
    Format(String),
    /// Byte number points into the frame header.
    #[error("sensor byte {0} is inside the 6 byte frame header")]
    HeaderByte(usize),
    /// Bit index past the end of a byte.
    #[error("sensor bit {0} is not in 0..=7")]
    BitIndex(u8),
}

/// One boolean carried in a status packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorBit {
    src: u8,
    cmd: u8,
    byte_offset: usize,
    bit_index: u8,
    state: bool,
}

impl SensorBit {
    /// A sensor that never matches, holding `initial` forever.
    pub const fn inert(initial: bool) -> Self {
        Self {
            src: 0,
            cmd: 0,
            byte_offset: 0,
            bit_index: 0,
            state: initial,
        }
    }

    /// Parses a pattern. The initial state is `false`.
    pub fn from_pattern(pattern: &str) -> Result<Self, PatternError> {
        let format_err = || PatternError::Format(pattern.to_string());

        let (src, rest) = pattern.split_once(',').ok_or_else(format_err)?;
        let src = src
            .strip_prefix("0x")
            .filter(|hex| hex.len() == 2 && hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            .ok_or_else(format_err)?;

        let (cmd, rest) = rest.split_once(',').ok_or_else(format_err)?;
        let cmd = match cmd.as_bytes() {
            [c] if c.is_ascii_alphanumeric() => *c,
            _ => return Err(format_err()),
        };

        let (byte, bit) = rest.split_once(':').ok_or_else(format_err)?;
        let byte: usize = leading_digits(byte)
            .filter(|d| d.len() == byte.len())
            .and_then(|d| d.parse().ok())
            .ok_or_else(format_err)?;
        // Anything after the bit digits is ignored.
        let bit: u8 = leading_digits(bit)
            .and_then(|d| d.parse().ok())
            .ok_or_else(format_err)?;

        if byte < HEADER_LEN {
            return Err(PatternError::HeaderByte(byte));
        }
        if bit > 7 {
            return Err(PatternError::BitIndex(bit));
        }

        Ok(Self {
            src,
            cmd,
            byte_offset: byte - HEADER_LEN,
            bit_index: bit,
            state: false,
        })
    }

    /// Builds a sensor from an optional layout pattern.
    ///
    /// A missing pattern gives an inert sensor. An unparseable one is logged
    /// and also gives an inert sensor, so a typo in one sensor never stops
    /// the panel from loading.
    pub fn configured(pattern: Option<&str>, initial: bool) -> Self {
        match pattern.map(str::trim).filter(|p| !p.is_empty()) {
            None => Self::inert(initial),
            Some(p) => match Self::from_pattern(p) {
                Ok(bit) => bit.with_state(initial),
                Err(e) => {
                    log::warn!("{}; sensor left unconfigured", e);
                    Self::inert(initial)
                }
            },
        }
    }

    /// Sets the current state.
    pub fn with_state(mut self, state: bool) -> Self {
        self.state = state;
        self
    }

    /// True if this sensor can never match a packet.
    pub const fn is_inert(&self) -> bool {
        self.src == 0
    }

    /// Current state.
    pub const fn state(&self) -> bool {
        self.state
    }

    /// Source node address.
    pub const fn src(&self) -> u8 {
        self.src
    }

    /// Command byte.
    pub const fn cmd(&self) -> u8 {
        self.cmd
    }

    /// Offset into the packet payload.
    pub const fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Bit within the payload byte.
    pub const fn bit_index(&self) -> u8 {
        self.bit_index
    }

    /// True if `pkt` carries this sensor's bit, whether or not it changed.
    pub fn packet_applies(&self, pkt: &Packet) -> bool {
        !self.is_inert()
            && pkt.src == self.src
            && pkt.cmd == self.cmd
            && pkt.data.len() > self.byte_offset
    }

    /// Updates the state from `pkt` and reports whether it flipped.
    pub fn test_packet(&mut self, pkt: &Packet) -> bool {
        if !self.packet_applies(pkt) {
            return false;
        }
        let Some(byte) = pkt.data.get(self.byte_offset) else {
            return false;
        };
        let new_state = byte & (1 << self.bit_index) != 0;
        let changed = new_state != self.state;
        self.state = new_state;
        changed
    }
}

impl Default for SensorBit {
    fn default() -> Self {
        Self::inert(false)
    }
}

fn leading_digits(text: &str) -> Option<&str> {
    let end = text
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    (end > 0).then(|| &text[..end])
}
