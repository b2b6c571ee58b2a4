//! NeuroGraph CLI: build graphs, mine patterns and serve the pipeline API.
//!
//! Coordinates the AtomSpace builder and the Neural Miner over a shared
//! output volume.

mod commands;
mod server;

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
