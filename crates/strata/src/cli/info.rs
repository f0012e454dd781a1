// crates/strata/src/cli/info.rs
// Introspection commands

use super::Context;
use super::output::print_json;
use anyhow::Result;
use serde::Serialize;
use strata::loader::LayerInfo;

#[derive(Serialize)]
struct LayersReport {
    layers: Vec<LayerInfo>,
    timeouts_ms: Vec<(String, u64)>,
}

pub fn run_layers(ctx: &Context) -> Result<()> {
    let report = LayersReport {
        layers: ctx.loader.layers(),
        timeouts_ms: ctx
            .loader
            .timeouts()
            .ladder()
            .iter()
            .map(|(class, budget)| (class.to_string(), budget.as_millis() as u64))
            .collect(),
    };

    if ctx.json {
        return print_json(&report);
    }

    println!("{:<3} {:<16} {:<18} {:>7}", "L", "NAME", "DIRECTORY", "TOKENS");
    for info in &report.layers {
        println!(
            "{:<3} {:<16} {:<18} {:>7}",
            info.ordinal, info.name, info.dir_name, info.token_budget
        );
    }

    println!("\nTimeout ladder:");
    for (class, ms) in &report.timeouts_ms {
        println!("  {:<13} {:>6}ms", class, ms);
    }
    Ok(())
}

pub async fn run_categories(ctx: &Context) -> Result<()> {
    let categories = ctx.loader.categories().await;
    if ctx.json {
        return print_json(&categories);
    }

    if categories.is_empty() {
        println!("No guideline categories");
    }
    for category in categories {
        println!("{}", category);
    }
    Ok(())
}
