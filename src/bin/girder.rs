// src/bin/girder.rs

use clap::Parser;
use colored::Colorize;
use girder::cli::{Cli, dispatcher};

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match dispatcher::dispatch(cli) {
        Ok(true) => {}
        Ok(false) => {
            // The evaluation errors were already rendered with their
            // source ranges; just signal the failure.
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            std::process::exit(1);
        }
    }
}
