//! CaseGraph CLI: replay investigation streams into a persisted graph.
//!
//! Feeds recorded agent event streams through the graph engine and inspects,
//! reflows, and lists the investigations kept in the local database.

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
