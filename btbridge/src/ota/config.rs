//! OTA session tuning.

use std::time::Duration;

/// Packet size used while streaming the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PacketMode {
    /// 4 KB packets, sent as sector writes when aligned.
    #[default]
    HighSpeed,
    /// 256 byte packets for hosts short on RAM.
    LowRam,
}

impl PacketMode {
    /// Packet size in bytes.
    pub const fn packet_size(self) -> usize {
        match self {
            Self::HighSpeed => 4096,
            Self::LowRam => 256,
        }
    }
}

/// Configuration for [`Companion`](crate::Companion) and its OTA sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OtaConfig {
    /// Baud rate the ROM bootloader starts at.
    pub rom_baud: u32,
    /// Baud rate for the transfer; `None` stays at `rom_baud`.
    pub transfer_baud: Option<u32>,
    /// Delay the bootloader waits before switching baud, in ms.
    pub baud_switch_delay_ms: u8,
    /// Packet size.
    pub packet_mode: PacketMode,
    /// Flash address of the chip keyword.
    pub keyword_address: u32,
    /// Keyword marking a complete image.
    pub keyword: Vec<u8>,
    /// Deadline for ordinary transactions.
    pub response_timeout: Duration,
    /// Deadline for erase transactions.
    pub erase_timeout: Duration,
    /// Deadline for the CRC transaction.
    pub crc_timeout: Duration,
    /// How long to keep asking the ROM to stay after reset.
    pub stay_rom_window: Duration,
    /// Gap between stay-in-ROM requests.
    pub stay_rom_interval: Duration,
    /// Link checks before giving up.
    pub link_attempts: u32,
    /// Attempts per packet.
    pub write_retries: u32,
    /// Write/verify rounds per status register.
    pub sr_attempts: u32,
    /// Pause before re-reading a status register.
    pub sr_retry_delay: Duration,
    /// Ceiling for the whole session.
    pub session_timeout: Duration,
    /// Watchdog period.
    pub daemon_interval: Duration,
    /// Whole-procedure restarts the watchdog may trigger.
    pub max_restarts: u32,
    /// Frames carry a checksum byte.
    pub checksum: bool,
    /// RX ring buffer size.
    pub ring_capacity: usize,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            rom_baud: 115_200,
            transfer_baud: Some(921_600),
            baud_switch_delay_ms: 20,
            packet_mode: PacketMode::HighSpeed,
            keyword_address: 0x000F_F000,
            keyword: b"BTBRIDGE".to_vec(),
            response_timeout: Duration::from_millis(500),
            erase_timeout: Duration::from_secs(3),
            crc_timeout: Duration::from_secs(5),
            stay_rom_window: Duration::from_secs(2),
            stay_rom_interval: Duration::from_millis(10),
            link_attempts: 5,
            write_retries: 3,
            sr_attempts: 10,
            sr_retry_delay: Duration::from_millis(10),
            session_timeout: Duration::from_secs(150),
            daemon_interval: Duration::from_secs(2),
            max_restarts: 3,
            checksum: true,
            ring_capacity: 16 * 1024,
        }
    }
}

impl OtaConfig {
    /// Set the transfer baud rate (`None` keeps the ROM rate).
    #[must_use]
    pub fn with_transfer_baud(mut self, baud: Option<u32>) -> Self {
        self.transfer_baud = baud;
        self
    }

    /// Set the ROM baud rate.
    #[must_use]
    pub fn with_rom_baud(mut self, baud: u32) -> Self {
        self.rom_baud = baud;
        self
    }

    /// Set the packet mode.
    #[must_use]
    pub fn with_packet_mode(mut self, mode: PacketMode) -> Self {
        self.packet_mode = mode;
        self
    }

    /// Set the keyword and its address.
    #[must_use]
    pub fn with_keyword(mut self, address: u32, keyword: impl Into<Vec<u8>>) -> Self {
        self.keyword_address = address;
        self.keyword = keyword.into();
        self
    }

    /// Set the ordinary transaction deadline.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Set the session ceiling.
    #[must_use]
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Set the watchdog period.
    #[must_use]
    pub fn with_daemon_interval(mut self, interval: Duration) -> Self {
        self.daemon_interval = interval;
        self
    }

    /// Set the stay-in-ROM window.
    #[must_use]
    pub fn with_stay_rom_window(mut self, window: Duration) -> Self {
        self.stay_rom_window = window;
        self
    }

    /// Set the status register verify delay.
    #[must_use]
    pub fn with_sr_retry_delay(mut self, delay: Duration) -> Self {
        self.sr_retry_delay = delay;
        self
    }

    /// Enable or disable frame checksums.
    #[must_use]
    pub fn with_checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    /// Set the RX ring buffer size.
    #[must_use]
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Packet size in bytes.
    pub fn packet_size(&self) -> usize {
        self.packet_mode.packet_size()
    }
}
