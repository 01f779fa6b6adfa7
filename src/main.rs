//! events-block - fetch, cache and render events from a REST events API
//!
//! Runs the block server, or renders a block or editor preview once from the
//! command line.

use clap::Parser;

use events_block::cli::{Cli, Command};
use events_block::{commands, config, server, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = config::load(&cli)?;
    telemetry::init(&settings.logging)?;

    match &cli.command {
        Command::Serve(_) => server::serve(&settings).await?,
        Command::Render(args) => {
            let html = commands::render(&settings, args).await?;
            println!("{html}");
        }
        Command::Preview(args) => {
            let html = commands::preview(&settings, args).await?;
            println!("{html}");
        }
        Command::ClearCache(args) => {
            commands::clear_cache(args).await?;
            println!("Cache cleared successfully");
        }
    }

    Ok(())
}
