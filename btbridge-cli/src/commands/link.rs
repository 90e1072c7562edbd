//! Frame link commands: send a command, listen for indications.

use {
    super::{ota_config, open_link},
    crate::{Cli, CliError, config::Config, was_interrupted},
    anyhow::{Context, Result},
    btbridge::{Dispatcher, DispatcherBuilder, FrameKind, protocol::MAX_PAYLOAD_LEN},
    console::style,
    log::debug,
    std::{
        thread,
        time::{Duration, Instant},
    },
};

/// Poll period of the listen loop.
const LISTEN_POLL: Duration = Duration::from_millis(10);

/// Parse a payload given as hex, with optional spaces, commas or `0x` prefixes.
pub(crate) fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, CliError> {
    let digits: String = s
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .map(|tok| tok.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::Payload(format!("odd number of hex digits in '{s}'")));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| CliError::Payload(format!("bad hex byte in '{s}'")))
        })
        .collect()
}

pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Send one command frame, optionally waiting for its ack.
pub(crate) fn cmd_send(
    cli: &Cli,
    config: &Config,
    opcode: u8,
    payload: &[u8],
    wait_ack: Option<Duration>,
) -> Result<()> {
    let ota = ota_config(cli, config);
    let mut link = open_link(cli, config, Dispatcher::default(), ota)?;

    let result = match wait_ack {
        Some(timeout) => link
            .companion
            .send_command_wait_ack(opcode, payload, timeout)
            .map(Some),
        None => link.companion.send_command(opcode, payload).map(|()| None),
    };
    link.close();

    match result.with_context(|| format!("Command {opcode:#04x} failed"))? {
        Some(0) => {
            println!("ack {opcode:#04x} status 0x00");
            Ok(())
        },
        Some(status) => Err(CliError::Rejected { opcode, status }.into()),
        None => {
            if !cli.quiet {
                eprintln!(
                    "{} sent {opcode:#04x} ({} bytes)",
                    style("✓").green(),
                    payload.len()
                );
            }
            Ok(())
        },
    }
}

fn listening_dispatcher() -> Result<Dispatcher> {
    let mut builder = DispatcherBuilder::new();
    for opcode in 0..FrameKind::Indication.opcode_limit() {
        builder = builder.on_indication(opcode, MAX_PAYLOAD_LEN, move |payload| {
            println!("ind {opcode:#04x}: {}", hex_string(payload));
        });
    }
    for opcode in 0..FrameKind::Ack.opcode_limit() {
        builder = builder.on_ack(opcode, move |status| {
            println!("ack {opcode:#04x} status {status:#04x}");
        });
    }
    Ok(builder.build()?)
}

/// Print indications and acks until Ctrl-C or `duration` elapses.
pub(crate) fn cmd_listen(cli: &Cli, config: &Config, duration: Option<Duration>) -> Result<()> {
    let ota = ota_config(cli, config);
    let mut link = open_link(cli, config, listening_dispatcher()?, ota)?;
    if !cli.quiet {
        eprintln!("{} listening, Ctrl-C to stop", style("📡").cyan());
    }

    let started = Instant::now();
    let mut frames = 0usize;
    while !was_interrupted() && duration.is_none_or(|d| started.elapsed() < d) {
        let summary = link.companion.poll();
        frames += summary.frames;
        if summary.discarded > 0 {
            debug!("discarded {} bytes of an oversized frame", summary.discarded);
        }
        thread::sleep(LISTEN_POLL);
    }
    link.close();
    debug!("listen stopped after {frames} frames");
    Ok(())
}
