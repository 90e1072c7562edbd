//! Serial transport to the companion chip.
//!
//! Two seams live here:
//!
//! - [`Uart`]: the narrow send side the bridge and OTA engine need. Received
//!   bytes travel the other way, pushed into an [`RxSink`](crate::link::RxSink)
//!   by whoever owns the receive path.
//! - [`Port`]: a host serial port (timeout, baud rate, RTS line), implemented by
//!   [`NativePort`] on desktop platforms.
//!
//! ```text
//!  OTA engine / send_command           RX thread / interrupt
//!            |                                  |
//!            v                                  v
//!      +-----------+                     +-------------+
//!      |   Uart    |                     |   RxSink    |
//!      +-----+-----+                     +------+------+
//!            |                                  |
//!            v                                  |
//!   +-----------------+      bytes       +------+------+
//!   |   NativePort    | ---------------> |   RxPump    |
//!   |  (serialport)   |                  +-------------+
//!   +-----------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use {
    crate::error::Result,
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Send side of the companion UART.
pub trait Uart: Send {
    /// Queue bytes for transmission.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Transmit bytes and wait until they are out, failing after `timeout`.
    fn send_sync(&mut self, bytes: &[u8], timeout: Duration) -> Result<()>;

    /// Change the local baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Current local baud rate.
    fn baud_rate(&self) -> u32;
}

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
    /// Use RTS/CTS hardware flow control.
    pub hardware_flow_control: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(50),
            hardware_flow_control: false,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout (also the RX thread's wake-up interval).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable RTS/CTS flow control.
    #[must_use]
    pub fn with_hardware_flow_control(mut self, enabled: bool) -> Self {
        self.hardware_flow_control = enabled;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Host serial port.
pub trait Port: Read + Write + Send {
    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Set the baud rate.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Get the current baud rate.
    fn baud_rate(&self) -> u32;

    /// Set RTS (Request To Send) pin state.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Trait for listing available serial ports.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator, RtsReset, RxPump};
