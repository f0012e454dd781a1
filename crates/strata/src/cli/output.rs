// crates/strata/src/cli/output.rs
// Text and JSON rendering for command results

use anyhow::Result;
use serde::Serialize;
use strata::loader::{LoadResult, SearchHit};

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_result(result: &LoadResult, json: bool) -> Result<()> {
    if json {
        return print_json(result);
    }

    println!("{}", result.summary());
    for skip in &result.skipped {
        match &skip.asset_id {
            Some(id) => println!("  skipped {} {} ({})", skip.key, id, skip.reason),
            None => println!("  skipped {} ({})", skip.key, skip.reason),
        }
    }

    for asset in &result.assets {
        println!("\n--- {} / {} (~{} tokens) ---", asset.key, asset.id, asset.tokens);
        println!("{}", asset.text.trim_end());
    }
    Ok(())
}

pub fn print_hits(hits: &[SearchHit], json: bool) -> Result<()> {
    if json {
        return print_json(hits);
    }

    if hits.is_empty() {
        println!("No matches");
        return Ok(());
    }
    for hit in hits {
        println!(
            "{:>4}  {:<28} {}",
            hit.match_count,
            hit.key.to_string(),
            hit.asset_id
        );
    }
    Ok(())
}
