//! btbridge CLI - host tool for a UART-attached Bluetooth coprocessor.
//!
//! ## Features
//!
//! - Reflash the companion's external SPI flash through its ROM bootloader
//! - Send command frames and wait for their acks
//! - Print indications as they arrive
//! - List supported flash parts and serial ports
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    btbridge::OtaError,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    env_logger::Env,
    log::debug,
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    },
};

mod commands;
mod config;

use {
    commands::{
        completions::cmd_completions,
        info::{cmd_flash_table, cmd_list_ports},
        link::{cmd_listen, cmd_send, parse_hex_bytes},
        ota::{OtaOptions, cmd_ota},
    },
    config::Config,
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// User-facing failures.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// No port on the command line, in the environment or in a config file.
    #[error("no serial port given (use --port, BTBRIDGE_PORT or [connection] serial in btbridge.toml)")]
    NoPort,
    /// Payload argument is not hex.
    #[error("invalid payload: {0}")]
    Payload(String),
    /// The companion acked a command with a non-zero status.
    #[error("command {opcode:#04x} rejected with status {status:#04x}")]
    Rejected {
        /// Command opcode.
        opcode: u8,
        /// Ack status.
        status: u8,
    },
    /// OTA session failed.
    #[error("OTA failed (code {code}): {source}")]
    Ota {
        /// Stable negative status code.
        code: i32,
        /// Failure cause.
        source: OtaError,
    },
    /// Interrupted by Ctrl-C.
    #[error("interrupted by user")]
    Cancelled,
}

/// btbridge - talk to and reflash a Bluetooth coprocessor over UART.
///
/// Environment variables:
///   BTBRIDGE_PORT   - Default serial port
///   BTBRIDGE_BAUD   - Frame link and ROM bootloader baud rate (default: 115200)
#[derive(Parser)]
#[command(name = "btbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Serial port to use.
    #[arg(short, long, global = true, env = "BTBRIDGE_PORT")]
    port: Option<String>,

    /// Baud rate of the frame link and ROM bootloader.
    #[arg(short, long, global = true, env = "BTBRIDGE_BAUD")]
    baud: Option<u32>,

    /// Send frames without the trailing checksum byte.
    #[arg(long, global = true)]
    no_checksum: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flash a raw image into the companion's external flash.
    Ota {
        /// Image file.
        image: PathBuf,

        /// Flash address (hex).
        #[arg(short, long, value_parser = parse_hex_u32)]
        address: u32,

        /// Stream 256 byte packets instead of 4 KB sectors.
        #[arg(long)]
        low_ram: bool,

        /// Stay at the ROM baud rate for the whole transfer.
        #[arg(long)]
        no_baud_switch: bool,
    },

    /// Send a command frame.
    Send {
        /// Command opcode (hex).
        #[arg(value_parser = parse_hex_u8)]
        opcode: u8,

        /// Payload bytes as hex, e.g. "01 02 0a".
        #[arg(default_value = "")]
        payload: String,

        /// Wait for the ack and fail on a non-zero status.
        #[arg(short, long)]
        wait_ack: bool,

        /// Ack timeout in milliseconds.
        #[arg(long, default_value = "1000")]
        timeout_ms: u64,
    },

    /// Print indications and acks as they arrive.
    Listen {
        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<u64>,
    },

    /// List supported flash parts.
    FlashTable {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        shell: Shell,
    },
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0x00_25_00_00
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}

/// Parse a hexadecimal opcode.
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    u8::from_str_radix(s, 16).map_err(|e| format!("Invalid hex opcode: {e}"))
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn main() -> Result<()> {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "btbridge v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    // A running OTA session sees Ctrl-C through the library's checker and
    // cleans up before returning.
    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Ctrl-C handler not installed: {e}");
    }
    btbridge::set_interrupt_checker(was_interrupted);

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Ota {
            image,
            address,
            low_ram,
            no_baud_switch,
        } => {
            let options = OtaOptions {
                image,
                address: *address,
                low_ram: *low_ram,
                no_baud_switch: *no_baud_switch,
            };
            cmd_ota(&cli, &config, &options)?;
        },
        Commands::Send {
            opcode,
            payload,
            wait_ack,
            timeout_ms,
        } => {
            let payload = parse_hex_bytes(payload)?;
            let wait = wait_ack.then(|| Duration::from_millis(*timeout_ms));
            cmd_send(&cli, &config, *opcode, &payload, wait)?;
        },
        Commands::Listen { duration } => {
            cmd_listen(&cli, &config, duration.map(Duration::from_secs))?;
        },
        Commands::FlashTable { json } => {
            cmd_flash_table(*json)?;
        },
        Commands::ListPorts { json } => {
            cmd_list_ports(*json)?;
        },
        Commands::Completions { shell } => {
            cmd_completions(*shell);
        },
    }

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn test_cli_command_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_ota() {
        let cli = Cli::try_parse_from([
            "btbridge",
            "--port",
            "/dev/ttyUSB0",
            "--baud",
            "57600",
            "ota",
            "fw.bin",
            "--address",
            "0x250000",
        ])
        .unwrap();
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(57600));
        if let Commands::Ota {
            image,
            address,
            low_ram,
            no_baud_switch,
        } = cli.command
        {
            assert_eq!(image.to_str().unwrap(), "fw.bin");
            assert_eq!(address, 0x0025_0000);
            assert!(!low_ram);
            assert!(!no_baud_switch);
        } else {
            panic!("Expected Ota command");
        }
    }

    #[test]
    fn test_cli_parse_ota_flags() {
        let cli = Cli::try_parse_from([
            "btbridge",
            "ota",
            "fw.bin",
            "-a",
            "250800",
            "--low-ram",
            "--no-baud-switch",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Ota {
                address: 0x0025_0800,
                low_ram: true,
                no_baud_switch: true,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_ota_requires_address() {
        assert!(Cli::try_parse_from(["btbridge", "ota", "fw.bin"]).is_err());
    }

    #[test]
    fn test_cli_parse_send() {
        let cli = Cli::try_parse_from([
            "btbridge",
            "send",
            "0x21",
            "01 02",
            "--wait-ack",
            "--timeout-ms",
            "250",
        ])
        .unwrap();
        if let Commands::Send {
            opcode,
            payload,
            wait_ack,
            timeout_ms,
        } = cli.command
        {
            assert_eq!(opcode, 0x21);
            assert_eq!(payload, "01 02");
            assert!(wait_ack);
            assert_eq!(timeout_ms, 250);
        } else {
            panic!("Expected Send command");
        }
    }

    #[test]
    fn test_cli_parse_send_defaults() {
        let cli = Cli::try_parse_from(["btbridge", "send", "5"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Send {
                opcode: 5,
                wait_ack: false,
                timeout_ms: 1000,
                ..
            }
        ));
    }

    #[test]
    fn test_cli_parse_listen() {
        let cli = Cli::try_parse_from(["btbridge", "listen", "--duration", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Listen { duration: Some(3) }));
    }

    #[test]
    fn test_cli_parse_flash_table_json() {
        let cli = Cli::try_parse_from(["btbridge", "flash-table", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::FlashTable { json: true }));
    }

    #[test]
    fn test_cli_parse_list_ports() {
        let cli = Cli::try_parse_from(["btbridge", "list-ports"]).unwrap();
        assert!(matches!(cli.command, Commands::ListPorts { json: false }));
    }

    #[test]
    fn test_cli_parse_completions() {
        let cli = Cli::try_parse_from(["btbridge", "completions", "zsh"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Zsh }
        ));
    }

    #[test]
    fn test_cli_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "btbridge",
            "flash-table",
            "-vv",
            "--no-checksum",
            "--config",
            "my.toml",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.no_checksum);
        assert_eq!(cli.config_path, Some(PathBuf::from("my.toml")));
    }

    #[test]
    fn test_cli_missing_subcommand() {
        assert!(Cli::try_parse_from(["btbridge"]).is_err());
    }

    #[test]
    fn test_parse_hex_u32_with_prefix() {
        assert_eq!(parse_hex_u32("0x00250000").unwrap(), 0x0025_0000);
        assert_eq!(parse_hex_u32("0X00250000").unwrap(), 0x0025_0000);
    }

    #[test]
    fn test_parse_hex_u32_without_prefix() {
        assert_eq!(parse_hex_u32("DEADBEEF").unwrap(), 0xDEAD_BEEF);
        assert_eq!(parse_hex_u32("ff").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_hex_u32_with_underscores_and_whitespace() {
        assert_eq!(parse_hex_u32("0x00_25_00_00").unwrap(), 0x0025_0000);
        assert_eq!(parse_hex_u32("  0xFF  ").unwrap(), 0xFF);
    }

    #[test]
    fn test_parse_hex_u32_invalid() {
        assert!(parse_hex_u32("not_hex").is_err());
        assert!(parse_hex_u32("0xGG").is_err());
        assert!(parse_hex_u32("0x1FFFFFFFF").is_err());
    }

    #[test]
    fn test_parse_hex_u8() {
        assert_eq!(parse_hex_u8("0x5f").unwrap(), 0x5F);
        assert_eq!(parse_hex_u8("21").unwrap(), 0x21);
        assert!(parse_hex_u8("0x100").is_err());
    }

    #[test]
    fn test_ota_error_message_carries_code() {
        let source = OtaError::CrcMismatch {
            local: 1,
            device: 2,
        };
        let err = CliError::Ota {
            code: source.code(),
            source,
        };
        assert!(err.to_string().contains("code -14"));
    }
}
