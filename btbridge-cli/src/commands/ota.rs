//! OTA command implementation.

use {
    super::open_link,
    crate::{Cli, CliError, config::Config, use_fancy_output},
    anyhow::{Context, Result},
    btbridge::{Dispatcher, FileImage, ImageSource, OtaConfig, OtaState, PacketMode},
    console::style,
    indicatif::{ProgressBar, ProgressStyle},
    log::info,
    std::path::Path,
};

/// Options of the `ota` subcommand.
pub(crate) struct OtaOptions<'a> {
    pub(crate) image: &'a Path,
    pub(crate) address: u32,
    pub(crate) low_ram: bool,
    pub(crate) no_baud_switch: bool,
}

/// Apply the subcommand flags over the configured session settings.
pub(crate) fn apply_options(mut ota: OtaConfig, options: &OtaOptions<'_>) -> OtaConfig {
    if options.low_ram {
        ota = ota.with_packet_mode(PacketMode::LowRam);
    }
    if options.no_baud_switch {
        ota = ota.with_transfer_baud(None);
    }
    ota
}

fn state_label(state: OtaState) -> String {
    match state {
        OtaState::Idle => "done".to_string(),
        OtaState::ProtectFlash(mode) => format!("protect ({mode:?})"),
        other => format!("{other:?}"),
    }
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

/// Flash an image to the companion's external flash.
pub(crate) fn cmd_ota(cli: &Cli, config: &Config, options: &OtaOptions<'_>) -> Result<()> {
    let mut image = FileImage::open(options.image)
        .with_context(|| format!("Failed to open image {}", options.image.display()))?;
    let ota = apply_options(super::ota_config(cli, config), options);

    if !cli.quiet {
        eprintln!(
            "{} {} ({} bytes) -> {:#010x}",
            style("📦").cyan(),
            options.image.display(),
            image.len(),
            options.address
        );
    }

    let mut link = open_link(cli, config, Dispatcher::default(), ota)?;

    let pb = progress_bar(u64::from(image.len()), cli.quiet);
    let mut last = OtaState::Idle;
    let mut on_progress = |state: OtaState, done: usize, _total: usize| {
        if state != last {
            info!("OTA: {}", state_label(state));
            pb.set_message(state_label(state));
            last = state;
        }
        pb.set_position(done as u64);
    };

    let result = link
        .companion
        .begin_ota_with_progress(options.address, &mut image, &mut on_progress);
    link.close();

    let report = match result {
        Ok(report) => report,
        Err(btbridge::Error::Ota(source)) => {
            pb.abandon_with_message(style("failed").red().to_string());
            if matches!(source, btbridge::OtaError::Cancelled) {
                return Err(CliError::Cancelled.into());
            }
            return Err(CliError::Ota {
                code: source.code(),
                source,
            }
            .into());
        },
        Err(e) => {
            pb.abandon();
            return Err(e).context("OTA could not start");
        },
    };
    pb.finish_with_message(style("done").green().to_string());

    if !cli.quiet {
        eprintln!(
            "{} {} bytes in {} packets to {} ({:#08x}), CRC {:#010x}",
            style("✓").green(),
            report.bytes,
            report.packets,
            report.flash_name,
            report.flash_id,
            report.crc
        );
        if report.restarts > 0 || report.write_retries > 0 {
            eprintln!(
                "  {} {} restart(s), {} write retr(ies)",
                style("ℹ").blue(),
                report.restarts,
                report.write_retries
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {super::*, std::path::PathBuf};

    fn options(path: &Path) -> OtaOptions<'_> {
        OtaOptions {
            image: path,
            address: 0x0025_0000,
            low_ram: false,
            no_baud_switch: false,
        }
    }

    #[test]
    fn test_apply_options_defaults_keep_config() {
        let path = PathBuf::from("fw.bin");
        let ota = apply_options(OtaConfig::default(), &options(&path));
        assert_eq!(ota, OtaConfig::default());
    }

    #[test]
    fn test_apply_options_low_ram_and_no_switch() {
        let path = PathBuf::from("fw.bin");
        let mut opts = options(&path);
        opts.low_ram = true;
        opts.no_baud_switch = true;
        let ota = apply_options(OtaConfig::default(), &opts);
        assert_eq!(ota.packet_mode, PacketMode::LowRam);
        assert_eq!(ota.transfer_baud, None);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(state_label(OtaState::Idle), "done");
        assert_eq!(state_label(OtaState::WriteFlash), "WriteFlash");
    }
}
