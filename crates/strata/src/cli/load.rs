// crates/strata/src/cli/load.rs
// Load and search commands

use super::Context;
use super::output::{print_hits, print_result};
use anyhow::Result;
use strata_types::Layer;

pub async fn run_load(ctx: &Context, layer: Layer, subkey: Option<String>) -> Result<()> {
    let result = ctx.loader.load(layer, subkey.as_deref()).await;
    print_result(&result, ctx.json)
}

pub async fn run_core(ctx: &Context) -> Result<()> {
    let result = ctx.loader.load_core().await;
    print_result(&result, ctx.json)
}

pub async fn run_hierarchy(ctx: &Context, max_layer: Layer) -> Result<()> {
    let result = ctx.loader.load_hierarchy(max_layer).await;
    print_result(&result, ctx.json)
}

pub async fn run_task(ctx: &Context, text: &[String]) -> Result<()> {
    let task = text.join(" ");
    let result = ctx.loader.load_by_task(&task).await;
    print_result(&result, ctx.json)
}

pub async fn run_search(ctx: &Context, query: &[String], layers: &[Layer]) -> Result<()> {
    let query = query.join(" ");
    // A fresh process has an empty cache, so default to searching every layer
    let layers = if layers.is_empty() {
        &Layer::ALL[..]
    } else {
        layers
    };
    let hits = ctx.loader.search(&query, Some(layers)).await;
    print_hits(&hits, ctx.json)
}
