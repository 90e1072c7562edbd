//! Firmware update of the companion chip through its ROM bootloader.
//!
//! ```text
//! Start -> Reset -> StayRom -> SetBaudRate -> LinkCheck -> GetFlashId
//!   -> ProtectFlash(Unprotect) -> EraseFlash -> WriteFlash -> WriteChipKeyword
//!   -> ReadCrc -> ProtectFlash(Reprotect) -> Reboot -> Cleanup -> Idle
//! ```
//!
//! Any unrecoverable error skips to `Cleanup`, which always restores the
//! link, the baud rate and the power mode.

pub mod config;
pub mod session;
pub mod watchdog;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use {
    crate::flash::ProtectMode,
    config::{OtaConfig, PacketMode},
    watchdog::{Watchdog, WatchdogAction},
};

use crate::error::OtaError;

/// Macro state of an OTA session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OtaState {
    /// No session.
    #[default]
    Idle,
    /// Power and link prepared.
    Start,
    /// Companion being reset.
    Reset,
    /// Holding the companion in its ROM bootloader.
    StayRom,
    /// Switching to the transfer baud rate.
    SetBaudRate,
    /// Confirming the bootloader link.
    LinkCheck,
    /// Reading the flash JEDEC ID.
    GetFlashId,
    /// Changing block protection.
    ProtectFlash(ProtectMode),
    /// Erasing the target range.
    EraseFlash,
    /// Streaming the image.
    WriteFlash,
    /// Writing the completion keyword.
    WriteChipKeyword,
    /// Comparing device and image CRC.
    ReadCrc,
    /// Rebooting into the new image.
    Reboot,
    /// Restoring link, baud and power.
    Cleanup,
}

/// Sub-state of a protection change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtectStep {
    /// Not changing protection.
    #[default]
    Idle,
    /// Reading SR1.
    ReadSr1,
    /// Reading SR2.
    ReadSr2,
    /// Computing the target value.
    ComputeTarget,
    /// Writing SR1 (or both registers at once).
    WriteSr1,
    /// Writing SR2.
    WriteSr2,
    /// Re-reading SR1 after a write.
    VerifySr1,
    /// Re-reading SR2 after a write.
    VerifySr2,
    /// Target value in place.
    Done,
}

/// Sub-state of the erase/write phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlashStep {
    /// No flash operation.
    #[default]
    Idle,
    /// Erasing a 4 KB sector.
    Erase4K,
    /// Erasing a 32 KB block.
    Erase32K,
    /// Erasing a 64 KB block.
    Erase64K,
    /// Reading a sector back for read-modify-write.
    ReadBack,
    /// Writing a packet or sector.
    WriteSector,
    /// All flash operations of the phase finished.
    Done,
}

/// State shared between the engine and its timers.
#[derive(Debug, Clone, Default)]
pub struct SessionStatus {
    /// Macro state.
    pub state: OtaState,
    /// Protect sub-state.
    pub protect_step: ProtectStep,
    /// Erase/write sub-state.
    pub flash_step: FlashStep,
    /// Address of the write in flight.
    pub write_addr: Option<u32>,
    /// Bumped on every completed transaction.
    pub progress: u64,
    /// Watchdog asks the write in flight to fail.
    pub force_fail: bool,
    /// Watchdog asks for a whole-procedure restart.
    pub restart: bool,
    /// Session must end with this error.
    pub abort: Option<OtaError>,
}

impl SessionStatus {
    /// What the watchdog looks at.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state,
            flash_step: self.flash_step,
            write_addr: self.write_addr,
            progress: self.progress,
        }
    }
}

/// Immutable view of [`SessionStatus`] for the watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Macro state.
    pub state: OtaState,
    /// Erase/write sub-state.
    pub flash_step: FlashStep,
    /// Address of the write in flight.
    pub write_addr: Option<u32>,
    /// Transaction counter.
    pub progress: u64,
}

/// Summary of a successful session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct OtaReport {
    /// Detected flash part.
    pub flash_name: &'static str,
    /// JEDEC ID.
    pub flash_id: u32,
    /// Image bytes written.
    pub bytes: u32,
    /// Packets written.
    pub packets: u32,
    /// CRC32 confirmed by the device.
    pub crc: u32,
    /// Whole-procedure restarts taken.
    pub restarts: u32,
    /// Failed write attempts that were retried.
    pub write_retries: u32,
}

/// Per-packet progress callback: state, bytes done, bytes total.
pub type ProgressFn<'a> = dyn FnMut(OtaState, usize, usize) + 'a;

pub(crate) fn lock_status(status: &Mutex<SessionStatus>) -> MutexGuard<'_, SessionStatus> {
    status
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}
