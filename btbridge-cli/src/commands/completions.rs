//! Shell completion generation.

use {
    crate::Cli,
    clap::CommandFactory,
    clap_complete::{Shell, generate},
    std::io,
};

/// Generate shell completions to `out`.
pub(crate) fn write_completions(shell: Shell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}
