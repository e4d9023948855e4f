//! MRBus packets and their JSON wire form.
//!
//! The gateway bridges the physical bus onto MQTT as one JSON record per
//! packet:
//!
//! ```text
//! {"type":"pkt","src":55,"dst":255,"cmd":83,"data":[8,0,1],"time":"2024-05-01T12:00:00Z"}
//! ```
//!
//! Outbound commands are written in layout files as short text specs,
//! `"dest,cmdChar,byte0,byte1,..."`, and always go out from the console
//! address [`CONSOLE_ADDRESS`].
//!
//! # Example
//!
//! ```rust
//! use rs_ctc::packet::{Packet, CONSOLE_ADDRESS};
//!
//! let pkt = Packet::from_command_spec("0x37,L,0x01,2").unwrap();
//! assert_eq!(pkt.dest, 0x37);
//! assert_eq!(pkt.src, CONSOLE_ADDRESS);
//! assert_eq!(pkt.cmd, b'L');
//! assert_eq!(pkt.data, vec![1, 2]);
//! ```

use core::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Source address used for every packet the panel transmits.
pub const CONSOLE_ADDRESS: u8 = 0xFE;

/// Value of the `type` field on packet records.
pub const WIRE_TYPE: &str = "pkt";

/// Errors from decoding wire records or command specs.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// Record was not valid JSON, or a field was missing, non-numeric or out of range.
    #[error("malformed packet record: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Record parsed but is not a packet.
    #[error("record type {0:?} is not a packet")]
    NotAPacket(String),
    /// Command spec text could not be parsed.
    #[error("bad command spec {spec:?}: {reason}")]
    BadCommandSpec {
        /// The offending spec text.
        spec: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// A single MRBus packet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Packet {
    /// Destination address.
    pub dest: u8,
    /// Source address.
    pub src: u8,
    /// Command byte (usually an ASCII letter).
    pub cmd: u8,
    /// Payload bytes following the fixed header.
    pub data: Vec<u8>,
}

/// JSON record as carried on the MQTT topics.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    #[serde(rename = "type")]
    kind: String,
    src: u8,
    dst: u8,
    cmd: u8,
    data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<String>,
}

impl Packet {
    /// Creates a packet.
    pub fn new(dest: u8, src: u8, cmd: u8, data: impl Into<Vec<u8>>) -> Self {
        Self {
            dest,
            src,
            cmd,
            data: data.into(),
        }
    }

    /// Parses a `"dest,cmdChar,byte0,..."` command spec.
    ///
    /// The destination and payload bytes accept decimal or `0x` hex. The
    /// command is a single ASCII character. The source is always
    /// [`CONSOLE_ADDRESS`].
    pub fn from_command_spec(spec: &str) -> Result<Self, PacketError> {
        let bad = |reason| PacketError::BadCommandSpec {
            spec: spec.to_string(),
            reason,
        };

        let mut fields = spec.split(',').map(str::trim);

        let dest = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| bad("missing destination"))?;
        let dest = parse_byte(dest).ok_or_else(|| bad("destination is not a byte"))?;

        let cmd = fields.next().ok_or_else(|| bad("missing command"))?;
        let cmd = match cmd.as_bytes() {
            [c] if c.is_ascii_graphic() => *c,
            _ => return Err(bad("command must be one ASCII character")),
        };

        let data = fields
            .map(|f| parse_byte(f).ok_or_else(|| bad("payload entry is not a byte")))
            .collect::<Result<Vec<u8>, _>>()?;

        Ok(Self::new(dest, CONSOLE_ADDRESS, cmd, data))
    }

    /// Decodes a wire record.
    pub fn from_wire(payload: &[u8]) -> Result<Self, PacketError> {
        let record: WireRecord = serde_json::from_slice(payload)?;
        if record.kind != WIRE_TYPE {
            return Err(PacketError::NotAPacket(record.kind));
        }
        Ok(Self::new(record.dst, record.src, record.cmd, record.data))
    }

    /// Encodes this packet as a wire record stamped with the current time.
    pub fn to_wire(&self) -> String {
        self.to_wire_at(Utc::now())
    }

    /// Encodes this packet as a wire record stamped with `time`.
    pub fn to_wire_at(&self, time: DateTime<Utc>) -> String {
        let record = WireRecord {
            kind: WIRE_TYPE.to_string(),
            src: self.src,
            dst: self.dest,
            cmd: self.cmd,
            data: self.data.clone(),
            time: Some(time.to_rfc3339_opts(SecondsFormat::Millis, true)),
        };
        // A record of plain integers and strings always serializes.
        serde_json::to_string(&record).unwrap_or_default()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:02X}->{:02X}] ", self.src, self.dest)?;
        if self.cmd.is_ascii_graphic() {
            write!(f, "'{}'", self.cmd as char)?;
        } else {
            write!(f, "0x{:02X}", self.cmd)?;
        }
        for byte in &self.data {
            write!(f, " {:02X}", byte)?;
        }
        Ok(())
    }
}

/// Parses a decimal or `0x`-prefixed hex byte.
pub(crate) fn parse_byte(text: &str) -> Option<u8> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
