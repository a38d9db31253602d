use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;
use super::{END_MARKER, START_MARKER};

// code structure : marker/sequence(1) + payload(3), big endian on the radio

/// A 32 bit radio code as printed by the firmware (`0x` + uppercase hex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PacketCode(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Opens a message; the low byte carries the announced length.
    Start { expected_len: u8 },
    /// Closes a message.
    End,
    /// Carries up to three characters. `sequence` is zero based.
    Data { sequence: u8 },
}

impl PacketCode {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub fn kind(self) -> PacketKind {
        let bytes = self.to_bytes();
        match bytes[0] {
            START_MARKER => PacketKind::Start {
                expected_len: bytes[3],
            },
            END_MARKER => PacketKind::End,
            sequence => PacketKind::Data { sequence },
        }
    }

    /// Characters carried by a data code.
    ///
    /// Zero bytes are padding and non printable bytes are dropped, the same
    /// filter the receiver firmware applies before appending to its buffer.
    pub fn payload_chars(self) -> impl Iterator<Item = char> {
        let bytes = self.to_bytes();
        bytes
            .into_iter()
            .skip(1)
            .filter(|b| (32..=126).contains(b))
            .map(char::from)
    }
}

impl fmt::Display for PacketCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

impl FromStr for PacketCode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);

        // from_str_radix would also take a sign
        if digits.is_empty()
            || digits.len() > 8
            || !digits.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(ProtocolError::InvalidCode(s.into()));
        }

        u32::from_str_radix(digits, 16)
            .map(PacketCode)
            .map_err(|_| ProtocolError::InvalidCode(s.into()))
    }
}
