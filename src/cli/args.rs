// src/cli/args.rs

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "girder",
    version,
    about = "Compiles declarative build descriptions into a low-level build graph."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate the build description and emit the manifest.
    Gen(GenArgs),
}

#[derive(Args, Debug, Default)]
pub struct GenArgs {
    /// The source root. When absent, the root is found by walking up from
    /// the current directory looking for the dotfile.
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Print progress for every loaded file and generated item.
    #[arg(short, long)]
    pub verbose: bool,

    /// Run the full evaluation but write nothing.
    #[arg(long)]
    pub check_only: bool,
}
