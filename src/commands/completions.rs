//! Shell completions for `artifact-repo`.
//!
//! Completes subcommands and flags only; repository ids and item paths come
//! from the configuration at run time and are not completed.
//!
//! ```bash
//! artifact-repo completions bash > ~/.local/share/bash-completion/completions/artifact-repo
//! artifact-repo completions zsh > ~/.zfunc/_artifact-repo
//! artifact-repo completions fish > ~/.config/fish/completions/artifact-repo.fish
//! ```

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::cli::Cli;

const BIN_NAME: &str = "artifact-repo";

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate the script for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script for `shell` to `out`.
pub fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, BIN_NAME, out);
}

pub fn execute(args: CompletionsArgs) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_completions(args.shell, &mut out);
    out.flush()?;
    Ok(())
}
