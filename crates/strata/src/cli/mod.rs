// crates/strata/src/cli/mod.rs
// CLI module for Strata commands

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use strata::config::StrataConfig;
use strata::loader::ProgressiveLoader;
use strata::source::FsSource;
use strata_types::Layer;
use tracing::debug;

pub mod info;
pub mod load;
mod output;

pub use info::{run_categories, run_layers};
pub use load::{run_core, run_hierarchy, run_load, run_search, run_task};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Progressive, timeout-bounded loader for layered reference content")]
#[command(version)]
pub struct Cli {
    /// Content root, one directory per layer (default: config, then ".")
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Config file (default: ~/.strata/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show layers and the timeout ladder
    Layers,

    /// Load one layer (e.g. core, l2, 03-frameworks)
    Load {
        layer: Layer,

        /// Sub-key within the layer (e.g. a guideline category)
        #[arg(long)]
        subkey: Option<String>,
    },

    /// Load the core principles layer
    Core,

    /// Load every layer up to and including --max-layer
    Hierarchy {
        #[arg(long, default_value = "best-practices")]
        max_layer: Layer,
    },

    /// Load the layers a task description calls for
    Task {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Keyword search; --layer loads those layers first
    Search {
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        #[arg(long = "layer")]
        layers: Vec<Layer>,
    },

    /// List guideline categories
    Categories,
}

/// Everything a command handler needs
pub struct Context {
    pub loader: ProgressiveLoader,
    pub json: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = StrataConfig::load(cli.config.as_deref())?;

        let root = cli
            .root
            .clone()
            .or_else(|| config.loader.content_root.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(root = %root.display(), "Using content root");

        let source = FsSource::new(root).with_extensions(config.loader.extensions.clone());
        let loader = ProgressiveLoader::new(Arc::new(source), &config)?;

        Ok(Self {
            loader,
            json: cli.json,
        })
    }
}
