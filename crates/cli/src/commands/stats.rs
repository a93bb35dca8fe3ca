//! Stats command handler.
//!
//! Summarizes the index artifact.

use clap::Args;
use kb_core::{AppResult, KbConfig};
use kb_retrieval::ArtifactLocation;

use super::print_json;

/// Show index artifact statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Artifact path or URL (default: the configured output path)
    #[arg(long)]
    pub index: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &KbConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let location = match &self.index {
            Some(index) => ArtifactLocation::parse(index),
            None => ArtifactLocation::File(config.output_path()),
        };
        let stats = location.load().await?.stats();

        if self.json {
            return print_json(&stats);
        }

        println!("Index: {}", location);
        println!("Kind: {}", stats.kind.as_str());
        if let Some(model) = &stats.model {
            println!("Model: {}", model);
        }
        if let Some(dimensions) = stats.dimensions {
            println!("Dimensions: {}", dimensions);
        }
        for (locale, count) in &stats.chunks {
            println!("Chunks [{}]: {}", locale, count);
        }
        if let Some(built_at) = stats.built_at {
            println!("Built: {}", built_at.to_rfc3339());
        }

        Ok(())
    }
}
