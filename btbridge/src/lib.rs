//! # btbridge
//!
//! Host-side link to a Bluetooth coprocessor attached over UART.
//!
//! This crate provides:
//!
//! - A resynchronizing frame codec for the command/ack/indication protocol
//! - A ring-buffer bridge carrying partial frames between polls
//! - An immutable command/ack/indication dispatcher
//! - ROM bootloader transactions and an OTA engine that reflashes the
//!   companion's external SPI flash (protect handling, erase planning,
//!   retried writes, CRC verification, watchdog)
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//! - Anything else that implements [`Uart`] and feeds received bytes to
//!   [`Companion::on_bytes_received`]
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for configuration and reports
//!
//! ## Example
//!
//! ```rust,no_run
//! use btbridge::{Companion, Dispatcher, FileImage, OtaConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         use btbridge::{NativePort, RxPump};
//!
//!         let port = NativePort::open_simple("/dev/ttyUSB0", 115_200)?;
//!         let reader = port.try_clone()?;
//!         let mut companion = Companion::new(port, Dispatcher::default(), OtaConfig::default());
//!         let _pump = RxPump::spawn(reader, companion.rx_sink())?;
//!
//!         let mut image = FileImage::open("companion.bin")?;
//!         let report = companion.begin_ota(0x0025_0000, &mut image)?;
//!         println!("flashed {} bytes, crc {:#010x}", report.bytes, report.crc);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod companion;
pub mod error;
pub mod flash;
pub mod hal;
pub mod image;
pub mod link;
pub mod ota;
pub mod port;
pub mod protocol;

#[cfg(test)]
mod testing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). A running OTA
/// session then ends with [`OtaError::Cancelled`] after its cleanup.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator, RtsReset, RxPump};
pub use {
    companion::Companion,
    error::{Error, OtaError, Result, WriteFailure},
    flash::{FLASH_TABLE, FlashParams},
    hal::{PowerControl, PowerMode, ResetLine, StaticPower, ThreadTimers, TimerId, Timers},
    image::{FileImage, ImageSource, MemoryImage},
    link::{Dispatcher, DispatcherBuilder, RxSink},
    ota::{OtaConfig, OtaReport, OtaState, PacketMode},
    port::{Port, PortEnumerator, PortInfo, SerialConfig, Uart},
    protocol::{Frame, FrameKind},
};
