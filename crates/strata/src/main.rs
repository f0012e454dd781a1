// crates/strata/src/main.rs
// Strata - progressive, timeout-bounded loader for layered reference content

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, Context};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".strata/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = Context::from_cli(&cli)?;

    match cli.command {
        Commands::Layers => cli::run_layers(&ctx)?,
        Commands::Load { layer, subkey } => cli::run_load(&ctx, layer, subkey).await?,
        Commands::Core => cli::run_core(&ctx).await?,
        Commands::Hierarchy { max_layer } => cli::run_hierarchy(&ctx, max_layer).await?,
        Commands::Task { text } => cli::run_task(&ctx, &text).await?,
        Commands::Search { query, layers } => cli::run_search(&ctx, &query, &layers).await?,
        Commands::Categories => cli::run_categories(&ctx).await?,
    }

    Ok(())
}
