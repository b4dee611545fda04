//! Cadence CLI application
//!
//! Command-line operator surface for the cadence orchestration engine.

mod args;
mod cli;
mod renderer;

use anyhow::{Context, Result};
use args::{Args, Commands, ListArgs};
use cadence_core::{agents::builtin_registry, EngineBuilder, EngineConfig};
use clap::Parser;
use cli::Cli;
use log::info;
use renderer::TerminalRenderer;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let Args {
        database_file,
        config,
        max_concurrency,
        no_color,
        command,
    } = Args::parse();

    if let Some(Commands::Schema) = command {
        let schema = cadence_core::plan_document_schema()?;
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let mut config = EngineConfig::load_or_default(config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(max_concurrency) = max_concurrency {
        config.max_concurrency = max_concurrency;
    }

    let engine = EngineBuilder::new()
        .with_database_path(database_file)
        .with_config(config)
        .with_registry(builtin_registry()?)
        .build()
        .await
        .context("Failed to initialize engine")?;

    info!("Cadence started with database {}", engine.database_path().display());

    let cli = Cli::new(engine, TerminalRenderer::new(!no_color));
    match command {
        Some(command) => cli.handle(command).await,
        None => {
            cli.list_plans(ListArgs {
                status: None,
                goal: None,
                limit: None,
            })
            .await
        }
    }
}
