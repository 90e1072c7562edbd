//! Configuration file support for btbridge.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BTBRIDGE_*)
//! 3. Local config file (./btbridge.toml)
//! 4. Global config file (~/.config/btbridge/config.toml)

use {
    btbridge::{OtaConfig, PacketMode},
    directories::ProjectDirs,
    log::{debug, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Local config file name, looked up in the working directory.
pub const LOCAL_CONFIG: &str = "btbridge.toml";

/// Serial link to the companion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Baud rate of the frame link and the ROM bootloader.
    pub baud: Option<u32>,
    /// How long RTS holds the companion in reset, in milliseconds.
    pub reset_hold_ms: Option<u64>,
}

/// OTA session tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtaSection {
    /// Baud rate used for the transfer; 0 keeps the ROM rate.
    pub transfer_baud: Option<u32>,
    /// Stream 256 byte packets instead of 4 KB sectors.
    #[serde(default)]
    pub low_ram: bool,
    /// Completion keyword written after the image.
    pub keyword: Option<String>,
    /// Flash address of the completion keyword.
    pub keyword_address: Option<u32>,
    /// Overall session ceiling in seconds.
    pub session_timeout_secs: Option<u64>,
    /// Whole-procedure restarts allowed after a stall.
    pub max_restarts: Option<u32>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// OTA settings.
    #[serde(default)]
    pub ota: OtaSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "btbridge").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.connection.reset_hold_ms.is_some() {
            self.connection.reset_hold_ms = other.connection.reset_hold_ms;
        }

        if other.ota.transfer_baud.is_some() {
            self.ota.transfer_baud = other.ota.transfer_baud;
        }
        if other.ota.low_ram {
            self.ota.low_ram = true;
        }
        if other.ota.keyword.is_some() {
            self.ota.keyword = other.ota.keyword;
        }
        if other.ota.keyword_address.is_some() {
            self.ota.keyword_address = other.ota.keyword_address;
        }
        if other.ota.session_timeout_secs.is_some() {
            self.ota.session_timeout_secs = other.ota.session_timeout_secs;
        }
        if other.ota.max_restarts.is_some() {
            self.ota.max_restarts = other.ota.max_restarts;
        }
    }

    /// Session configuration with the file's settings applied over the
    /// library defaults.
    pub fn ota_config(&self) -> OtaConfig {
        let mut ota = OtaConfig::default();
        if let Some(baud) = self.connection.baud {
            ota = ota.with_rom_baud(baud);
        }
        if let Some(baud) = self.ota.transfer_baud {
            ota = ota.with_transfer_baud((baud != 0).then_some(baud));
        }
        if self.ota.low_ram {
            ota = ota.with_packet_mode(PacketMode::LowRam);
        }
        if self.ota.keyword.is_some() || self.ota.keyword_address.is_some() {
            let address = self.ota.keyword_address.unwrap_or(ota.keyword_address);
            let keyword = self
                .ota
                .keyword
                .as_ref()
                .map_or_else(|| ota.keyword.clone(), |k| k.as_bytes().to_vec());
            ota = ota.with_keyword(address, keyword);
        }
        if let Some(secs) = self.ota.session_timeout_secs {
            ota = ota.with_session_timeout(Duration::from_secs(secs));
        }
        if let Some(restarts) = self.ota.max_restarts {
            ota.max_restarts = restarts;
        }
        ota
    }
}

#[cfg(test)]
mod tests {
    use {super::*, tempfile::tempdir};

    #[test]
    fn test_default_config_is_empty() {
        let config = Config::default();
        assert!(config.connection.serial.is_none());
        assert!(config.connection.baud.is_none());
        assert!(!config.ota.low_ram);
        assert!(config.ota.keyword.is_none());
    }

    #[test]
    fn test_parse_full_toml() {
        let config: Config = toml::from_str(
            r#"
[connection]
serial = "/dev/ttyUSB0"
baud = 115200
reset_hold_ms = 50

[ota]
transfer_baud = 460800
low_ram = true
keyword = "DONE"
keyword_address = 1044480
session_timeout_secs = 60
max_restarts = 1
"#,
        )
        .unwrap();
        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.connection.baud, Some(115_200));
        assert_eq!(config.connection.reset_hold_ms, Some(50));
        assert_eq!(config.ota.transfer_baud, Some(460_800));
        assert!(config.ota.low_ram);
        assert_eq!(config.ota.keyword.as_deref(), Some("DONE"));
        assert_eq!(config.ota.keyword_address, Some(0xFF000));
    }

    #[test]
    fn test_parse_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.serial.is_none());
        assert!(config.ota.transfer_baud.is_none());
    }

    #[test]
    fn test_merge_overrides_set_fields_only() {
        let mut base: Config = toml::from_str(
            r#"
[connection]
serial = "/dev/ttyUSB0"
baud = 115200
[ota]
keyword = "GLOBAL"
"#,
        )
        .unwrap();
        let local: Config = toml::from_str(
            r#"
[connection]
serial = "/dev/ttyACM1"
[ota]
low_ram = true
"#,
        )
        .unwrap();
        base.merge(local);
        assert_eq!(base.connection.serial.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(base.connection.baud, Some(115_200));
        assert_eq!(base.ota.keyword.as_deref(), Some("GLOBAL"));
        assert!(base.ota.low_ram);
    }

    #[test]
    fn test_merge_does_not_clear_low_ram() {
        let mut base = Config::default();
        base.ota.low_ram = true;
        base.merge(Config::default());
        assert!(base.ota.low_ram);
    }

    #[test]
    fn test_ota_config_defaults_untouched() {
        assert_eq!(Config::default().ota_config(), OtaConfig::default());
    }

    #[test]
    fn test_ota_config_applies_settings() {
        let config: Config = toml::from_str(
            r#"
[connection]
baud = 57600
[ota]
transfer_baud = 0
low_ram = true
keyword = "OK"
session_timeout_secs = 30
max_restarts = 0
"#,
        )
        .unwrap();
        let ota = config.ota_config();
        assert_eq!(ota.rom_baud, 57_600);
        assert_eq!(ota.transfer_baud, None);
        assert_eq!(ota.packet_mode, PacketMode::LowRam);
        assert_eq!(ota.keyword, b"OK".to_vec());
        assert_eq!(ota.keyword_address, OtaConfig::default().keyword_address);
        assert_eq!(ota.session_timeout, Duration::from_secs(30));
        assert_eq!(ota.max_restarts, 0);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.connection.serial = Some("COM3".to_string());
        config.ota.transfer_baud = Some(921_600);
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.connection.serial.as_deref(), Some("COM3"));
        assert_eq!(back.ota.transfer_baud, Some(921_600));
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btbridge.toml");
        fs::write(
            &path,
            r#"
[connection]
serial = "/dev/ttyUSB1"
[ota]
max_restarts = 5
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.serial.as_deref(), Some("/dev/ttyUSB1"));
        assert_eq!(config.ota.max_restarts, Some(5));
    }

    #[test]
    fn test_load_from_path_invalid_toml_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[connection\nserial = ").unwrap();
        let config = Config::load_from_path(&path);
        assert!(config.connection.serial.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.serial.is_none());
    }

    #[test]
    fn test_global_config_path_is_some() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("btbridge"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
