//! Control-plane frames exchanged with the companion chip.
//!
//! ## Frame Format
//!
//! ```text
//! +------------+--------+------------+-----------+----------+
//! |   Magic    | Opcode |   Length   |  Payload  | Checksum |
//! +------------+--------+------------+-----------+----------+
//! | 2 bytes LE | 1 byte | 2 bytes LE |  0..=200  | optional |
//! +------------+--------+------------+-----------+----------+
//! ```
//!
//! The checksum byte is the two's complement of the sum of every preceding
//! byte, so a valid frame sums to zero modulo 256.

use {
    crate::error::{Error, Result},
    byteorder::{LittleEndian, WriteBytesExt},
};

/// Magic + opcode + length.
pub const HEADER_LEN: usize = 5;

/// Largest payload the companion firmware accepts.
pub const MAX_PAYLOAD_LEN: usize = 200;

/// Largest frame on the wire, checksum included.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN + 1;

/// Opcode accepted for every kind regardless of the kind's bound.
pub const TEST_OPCODE: u8 = 0xFF;

/// Frame kind, carried on the wire by its 16-bit magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameKind {
    /// Host to companion command.
    Command,
    /// Companion to host acknowledgment: one status byte keyed by the
    /// command opcode it answers.
    Ack,
    /// Unsolicited companion to host indication.
    Indication,
}

impl FrameKind {
    /// All kinds, in magic-table order.
    pub const ALL: [Self; 3] = [Self::Command, Self::Ack, Self::Indication];

    /// Magic value identifying this kind.
    pub const fn magic(self) -> u16 {
        match self {
            Self::Command => 0xABBA,
            Self::Ack => 0xAABB,
            Self::Indication => 0xCDDC,
        }
    }

    /// Look up the kind for a magic value.
    pub fn from_magic(magic: u16) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.magic() == magic)
    }

    /// Exclusive upper bound for ordinary opcodes of this kind.
    pub const fn opcode_limit(self) -> u8 {
        match self {
            Self::Command | Self::Ack => 0x60,
            Self::Indication => 0x30,
        }
    }

    /// Whether `opcode` is valid for this kind.
    pub const fn accepts_opcode(self, opcode: u8) -> bool {
        opcode < self.opcode_limit() || opcode == TEST_OPCODE
    }

    /// Whether `byte` can start a magic (magics are little-endian).
    pub fn is_magic_lead(byte: u8) -> bool {
        Self::ALL
            .into_iter()
            .any(|kind| kind.magic().to_le_bytes()[0] == byte)
    }
}

/// A validated frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame kind.
    pub kind: FrameKind,
    /// Opcode.
    pub opcode: u8,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking the opcode bound and payload length.
    pub fn new(kind: FrameKind, opcode: u8, payload: impl Into<Vec<u8>>) -> Result<Self> {
        let payload = payload.into();
        if !kind.accepts_opcode(opcode) {
            return Err(Error::Protocol(format!(
                "opcode {opcode:#04x} out of range for {kind:?}"
            )));
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::Protocol(format!(
                "payload of {} bytes exceeds {MAX_PAYLOAD_LEN}",
                payload.len()
            )));
        }
        Ok(Self {
            kind,
            opcode,
            payload,
        })
    }

    /// Build a command frame.
    pub fn command(opcode: u8, payload: impl Into<Vec<u8>>) -> Result<Self> {
        Self::new(FrameKind::Command, opcode, payload)
    }

    /// Serialize the frame, appending the checksum when `checksum` is set.
    #[allow(clippy::cast_possible_truncation)] // payload length is bounded by MAX_PAYLOAD_LEN
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn encode(&self, checksum: bool) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len() + 1);
        buf.write_u16::<LittleEndian>(self.kind.magic()).unwrap();
        buf.push(self.opcode);
        buf.write_u16::<LittleEndian>(self.payload.len() as u16).unwrap();
        buf.extend_from_slice(&self.payload);
        if checksum {
            buf.push(checksum_byte(&buf));
        }
        buf
    }

    /// Total encoded length.
    pub fn encoded_len(&self, checksum: bool) -> usize {
        HEADER_LEN + self.payload.len() + usize::from(checksum)
    }
}

/// Two's complement of the byte sum of `bytes`.
pub fn checksum_byte(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}
