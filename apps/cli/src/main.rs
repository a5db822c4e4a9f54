//! ingestflow CLI: scheduled ingestion and tool pipelines over lifelog records.
//!
//! Runs text through the configured tool pipeline, ingests daily batches from
//! the lifelog API, and inspects the audit trail and persisted results.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    if let Err(report) = commands::run(cli).await {
        eprintln!("Error: {report:?}");
        std::process::exit(commands::exit_code(&report));
    }
    Ok(())
}
