// src/cli/dispatcher.rs

use anyhow::Result;

use crate::cli::args::{Cli, Command};
use crate::cli::handlers;

/// Routes a parsed command line to its handler. Returns whether the run
/// was clean; the binary maps that to the exit code.
pub fn dispatch(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Gen(args) => handlers::generate::handle(&args),
    }
}
