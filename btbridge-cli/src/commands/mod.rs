//! Command implementations.
//!
//! Each subcommand is implemented in its own module; the serial link they
//! share is opened here.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod link;
pub(crate) mod ota;

use {
    crate::{Cli, CliError, config::Config},
    anyhow::{Context, Result},
    btbridge::{Companion, Dispatcher, NativePort, OtaConfig, RtsReset, RxPump},
    log::debug,
    std::time::Duration,
};

/// Settle time after releasing reset before the ROM listens.
const RESET_SETTLE: Duration = Duration::from_millis(5);

/// Default RTS hold time.
const DEFAULT_RESET_HOLD_MS: u64 = 20;

/// An open companion link with its reader thread.
pub(crate) struct Link {
    pub(crate) companion: Companion<NativePort>,
    pump: RxPump,
}

impl Link {
    /// Stop the reader thread.
    pub(crate) fn close(self) {
        self.pump.stop();
    }
}

/// Serial port named by the flag, environment or config file.
pub(crate) fn port_name(cli: &Cli, config: &Config) -> Result<String> {
    cli.port
        .clone()
        .or_else(|| config.connection.serial.clone())
        .ok_or_else(|| CliError::NoPort.into())
}

/// Session configuration from the config file with the global flags applied.
pub(crate) fn ota_config(cli: &Cli, config: &Config) -> OtaConfig {
    let mut ota = config.ota_config();
    if let Some(baud) = cli.baud {
        ota = ota.with_rom_baud(baud);
    }
    if cli.no_checksum {
        ota = ota.with_checksum(false);
    }
    ota
}

/// Open the port, start the reader thread and wire the RTS reset line.
pub(crate) fn open_link(
    cli: &Cli,
    config: &Config,
    dispatcher: Dispatcher,
    ota: OtaConfig,
) -> Result<Link> {
    let name = port_name(cli, config)?;
    let port = NativePort::open_simple(&name, ota.rom_baud)
        .with_context(|| format!("Failed to open {name}"))?;
    let reader = port.try_clone().context("Failed to clone port for reading")?;
    let rts = port.try_clone().context("Failed to clone port for reset")?;

    let hold = config
        .connection
        .reset_hold_ms
        .unwrap_or(DEFAULT_RESET_HOLD_MS);
    debug!("opened {name} at {} baud, reset hold {hold} ms", ota.rom_baud);

    let companion = Companion::new(port, dispatcher, ota)
        .with_reset_line(RtsReset::new(rts, Duration::from_millis(hold), RESET_SETTLE));
    let pump = RxPump::spawn(reader, companion.rx_sink()).context("Failed to start reader")?;
    Ok(Link { companion, pump })
}
