//! Error types for btbridge.

use std::io;
use thiserror::Error;

/// Result type for btbridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for btbridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, image file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The receive ring buffer had no room for incoming bytes.
    #[error("RX ring buffer overrun: {dropped} bytes dropped")]
    Overrun {
        /// Number of bytes that did not fit.
        dropped: usize,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An OTA session is already running.
    #[error("OTA session already in progress")]
    Busy,

    /// OTA session failure.
    #[error("OTA failed: {0}")]
    Ota(#[from] OtaError),
}

/// Reason a packet write failed after exhausting its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailure {
    /// No response before the transaction deadline.
    Timeout,
    /// The bootloader answered with a non-zero status.
    Rejected(u8),
    /// The watchdog saw the write address stop advancing and failed it.
    ForceFailed,
    /// The response did not echo the address that was written.
    AddressMismatch,
}

impl std::fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "no response"),
            Self::Rejected(status) => write!(f, "rejected with status {status:#04x}"),
            Self::ForceFailed => write!(f, "stuck, force-failed by watchdog"),
            Self::AddressMismatch => write!(f, "response address mismatch"),
        }
    }
}

/// Session-level OTA failure.
///
/// Every variant maps to a distinct negative code (see [`OtaError::code`]),
/// so the host can tell causes apart from a bare status value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtaError {
    /// The bootloader never answered stay-in-ROM / link-check.
    #[error("companion chip did not enter its ROM bootloader")]
    LinkFailed,

    /// Switching to the transfer baud rate failed.
    #[error("baud rate switch to {0} failed")]
    BaudRateFailed(u32),

    /// Reading the flash JEDEC ID failed.
    #[error("could not read flash ID")]
    FlashIdFailed,

    /// The flash ID is not in the parameter table.
    #[error("unknown flash ID {0:#08x}")]
    UnknownFlash(u32),

    /// The image does not fit in the detected flash part.
    #[error("image of {size} bytes exceeds flash capacity of {capacity} bytes")]
    ImageTooLarge {
        /// Image size in bytes.
        size: u32,
        /// Detected flash capacity in bytes.
        capacity: u32,
    },

    /// Status-register protect/unprotect did not take effect.
    #[error("flash {} failed", protect_action(.lock))]
    ProtectFailed {
        /// `true` when re-locking, `false` when unlocking.
        lock: bool,
    },

    /// An erase transaction failed.
    #[error("erase at {addr:#010x} failed")]
    EraseFailed {
        /// Address of the failing erase unit.
        addr: u32,
    },

    /// A packet write failed on every attempt.
    #[error("write at {addr:#010x} failed: {reason}")]
    WriteFailed {
        /// Target address of the failing packet.
        addr: u32,
        /// Cause of the last attempt's failure.
        reason: WriteFailure,
    },

    /// Writing the chip keyword failed.
    #[error("chip keyword write failed")]
    KeywordFailed,

    /// The device CRC could not be read.
    #[error("CRC read failed")]
    CrcReadFailed,

    /// The device CRC differs from the locally accumulated one.
    #[error("CRC mismatch: local {local:#010x}, device {device:#010x}")]
    CrcMismatch {
        /// CRC computed over the source image.
        local: u32,
        /// CRC reported by the bootloader.
        device: u32,
    },

    /// The overall session ceiling elapsed.
    #[error("OTA session timed out")]
    SessionTimeout,

    /// The watchdog ran out of whole-procedure restarts.
    #[error("OTA session stalled and restarts are exhausted")]
    Stalled,

    /// The embedding application asked to stop.
    #[error("OTA session cancelled")]
    Cancelled,

    /// Sending on the UART or reading the source image failed.
    #[error("transport failure: {0}")]
    Transport(String),
}

fn protect_action(lock: &bool) -> &'static str {
    if *lock { "protect" } else { "unprotect" }
}

impl OtaError {
    /// Stable negative status code for this failure.
    pub fn code(&self) -> i32 {
        match self {
            Self::LinkFailed => -1,
            Self::BaudRateFailed(_) => -2,
            Self::FlashIdFailed => -3,
            Self::UnknownFlash(_) => -4,
            Self::ImageTooLarge { .. } => -5,
            Self::ProtectFailed { .. } => -6,
            Self::EraseFailed { .. } => -7,
            Self::WriteFailed { reason, .. } => match reason {
                WriteFailure::Timeout => -8,
                WriteFailure::Rejected(_) => -9,
                WriteFailure::ForceFailed => -10,
                WriteFailure::AddressMismatch => -11,
            },
            Self::KeywordFailed => -12,
            Self::CrcReadFailed => -13,
            Self::CrcMismatch { .. } => -14,
            Self::SessionTimeout => -15,
            Self::Stalled => -16,
            Self::Cancelled => -17,
            Self::Transport(_) => -18,
        }
    }
}
