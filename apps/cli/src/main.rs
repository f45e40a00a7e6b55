//! FoldScape CLI — curate and publish the protein-ML repository catalog.
//!
//! Validates, categorizes and scores a JSON record store produced by the
//! collectors, and only writes it back when the result passes validation.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
