use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;

pub const BIN_NAME: &str = "deployer";

/// Completion script for `shell`, written to `out`.
pub fn write_completions<C: CommandFactory>(shell: Shell, out: &mut dyn Write) {
    let mut cmd = C::command();
    clap_complete::generate(shell, &mut cmd, BIN_NAME, out);
}

#[allow(clippy::unnecessary_wraps)]
pub fn run<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    write_completions::<C>(shell, &mut std::io::stdout().lock());
    Ok(EXIT_SUCCESS)
}
