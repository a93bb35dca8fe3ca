//! Embedding generation.
//!
//! The indexer embeds every chunk in fixed-size batches; the retriever
//! embeds one query at a time. Both must use the same model for a given
//! artifact.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, settings_for_index, EmbeddingProvider};

use crate::types::Chunk;
use kb_core::{AppError, AppResult};

/// Embed `chunks` in place, `batch_size` chunks per provider call.
///
/// Batches are sent in order. Each response is paired with the batch that
/// produced it before anything is written back, and a length mismatch
/// fails the whole run.
pub async fn embed_chunks(
    provider: &dyn EmbeddingProvider,
    chunks: &mut [Chunk],
    batch_size: usize,
) -> AppResult<()> {
    if chunks.is_empty() {
        return Ok(());
    }

    let batch_size = batch_size.max(1);
    let total_batches = chunks.len().div_ceil(batch_size);

    tracing::info!(
        "Embedding {} chunks in {} batches using provider '{}' (model: {})",
        chunks.len(),
        total_batches,
        provider.provider_name(),
        provider.model_name()
    );

    let mut dimensions: Option<usize> = None;

    for (batch_index, batch) in chunks.chunks_mut(batch_size).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = provider.embed_batch(&texts).await.map_err(|e| {
            AppError::Embedding(format!(
                "Batch {}/{} failed: {}",
                batch_index + 1,
                total_batches,
                e
            ))
        })?;

        if vectors.len() != batch.len() {
            return Err(AppError::Embedding(format!(
                "Batch {}/{} returned {} vectors for {} inputs",
                batch_index + 1,
                total_batches,
                vectors.len(),
                batch.len()
            )));
        }

        for (chunk, vector) in batch.iter_mut().zip(vectors) {
            match dimensions {
                None => dimensions = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(AppError::Embedding(format!(
                        "Chunk '{}' embedded with {} dimensions, expected {}",
                        chunk.id,
                        vector.len(),
                        expected
                    )));
                }
                Some(_) => {}
            }
            chunk.embedding = Some(vector);
        }

        tracing::info!("Embedded batch {}/{}", batch_index + 1, total_batches);
    }

    Ok(())
}
