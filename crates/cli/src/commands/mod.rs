//! Command handlers for the knowledge base CLI.

pub mod build;
pub mod query;
pub mod stats;

// Re-export command types for convenience
pub use build::BuildCommand;
pub use query::QueryCommand;
pub use stats::StatsCommand;

use kb_core::config::EmbeddingSettings;
use kb_core::{AppResult, KbConfig};
use kb_retrieval::{create_provider, EmbeddingProvider};
use std::sync::Arc;

/// Embedding provider for the configured settings, or `None` when the
/// provider needs an API key and none is set.
pub(crate) fn configured_provider(
    config: &KbConfig,
) -> AppResult<Option<Arc<dyn EmbeddingProvider>>> {
    provider_with(config, &config.embedding)
}

/// Like [`configured_provider`], with `settings` in place of the configured
/// embedding section. The API key still comes from the config.
pub(crate) fn provider_with(
    config: &KbConfig,
    settings: &EmbeddingSettings,
) -> AppResult<Option<Arc<dyn EmbeddingProvider>>> {
    let api_key = config.resolve_api_key();
    if settings.provider == "openai" && api_key.is_none() {
        tracing::debug!(
            "No API key in {}; embeddings unavailable",
            settings.api_key_env
        );
        return Ok(None);
    }

    create_provider(settings, api_key.as_deref()).map(Some)
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
