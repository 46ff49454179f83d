//! crisisbrief CLI: condense disaster reports for the public, responders and authorities.
//!
//! Takes a text or audio field report and prints a one-line alert, a
//! responder summary and a six-section authority report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
