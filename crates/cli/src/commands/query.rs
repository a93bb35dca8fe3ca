//! Query command handler.
//!
//! Loads the artifact and prints the top-k chunks for a question.

use clap::Args;
use kb_core::{AppError, AppResult, KbConfig};
use kb_retrieval::{
    settings_for_index, ArtifactCache, ArtifactLocation, LoadedIndex, Locale, RetrievalContext,
    Retriever,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{print_json, provider_with};

/// Retrieve the chunks most relevant to a question
#[derive(Args, Debug)]
pub struct QueryCommand {
    /// Question text
    pub query: String,

    /// Locale to search (en or es; anything else searches es)
    #[arg(short, long)]
    pub locale: Option<String>,

    /// Number of chunks to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Artifact path or URL (default: the configured output path)
    #[arg(long)]
    pub index: Option<String>,

    /// Print the formatted context block instead of individual results
    #[arg(long)]
    pub context: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl QueryCommand {
    pub async fn execute(&self, config: &KbConfig) -> AppResult<()> {
        tracing::info!("Executing query command");
        tracing::debug!("Query options: {:?}", self);

        let locale = Locale::from_request(self.locale.as_deref());
        let k = self.top_k.unwrap_or(config.retrieval.top_k);
        let location = match &self.index {
            Some(index) => ArtifactLocation::parse(index),
            None => ArtifactLocation::File(config.output_path()),
        };

        let cache = ArtifactCache::new();
        let index = cache.get_or_load(&location).await?;

        let retriever = index_retriever(config, index)?;

        let token = CancellationToken::new();
        let interrupt = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        let results = match retriever
            .retrieve_cancellable(&self.query, locale, k, &token)
            .await
        {
            Ok(results) => results,
            Err(AppError::Cancelled) => return Err(AppError::Cancelled),
            Err(e) => {
                tracing::warn!("Retrieval failed, continuing without sources: {}", e);
                vec![]
            }
        };

        let context = RetrievalContext::new(results);

        if self.json {
            if self.context {
                print_json(&context)?;
            } else {
                print_json(&context.sources)?;
            }
        } else if !context.has_sources {
            println!("No sources found for [{}]", locale);
        } else if self.context {
            println!("{}", context.context);
            println!();
            println!("Sources:");
            println!("{}", context.outline());
        } else {
            for (i, result) in context.sources.iter().enumerate() {
                println!(
                    "{}. [{}] {} (score: {:.3})",
                    i + 1,
                    result.title,
                    result.id,
                    result.score
                );
                println!("   {}", preview(&result.text, 160));
            }
        }

        Ok(())
    }
}

/// Retriever for `index`, embedding queries the way the index was built.
///
/// Model and dimensions come from the index, not the config. When no
/// matching provider can be set up the retriever returns no results.
fn index_retriever(config: &KbConfig, index: Arc<LoadedIndex>) -> AppResult<Retriever> {
    let provider = match index.as_ref() {
        LoadedIndex::Embeddings {
            model, dimensions, ..
        } => {
            let settings = settings_for_index(&config.embedding, model, *dimensions);
            if settings.model != config.embedding.model {
                tracing::info!(
                    "Index was built with '{}'; overriding configured model '{}'",
                    settings.model,
                    config.embedding.model
                );
            }
            provider_with(config, &settings).unwrap_or_else(|e| {
                tracing::warn!("Embedding provider unavailable: {}", e);
                None
            })
        }
        LoadedIndex::Lexical { .. } => None,
    };

    match Retriever::from_settings(Arc::clone(&index), provider, &config.retrieval) {
        Ok(retriever) => Ok(retriever),
        Err(e) => {
            tracing::warn!("Retrieval unavailable, continuing without sources: {}", e);
            Retriever::from_settings(index, None, &config.retrieval)
        }
    }
}

/// First `max_chars` characters of `text` on one line.
fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}
