//! MedContact CLI: physician contact enrichment through a search-grounded model.
//!
//! Reads a physician table, fills in address, phone and e-mail columns over
//! several search rounds per record, and writes the enriched table plus a
//! processing transcript.

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
