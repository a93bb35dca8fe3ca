//! Query-time retrieval over a loaded artifact.
//!
//! The artifact kind is inspected once, in [`Retriever::new`], and turned
//! into a scorer. Queries never branch on the kind again.

use crate::artifact::LoadedIndex;
use crate::embeddings::EmbeddingProvider;
use crate::lexical::SearchOptions;
use crate::locale::Locale;
use crate::types::{BuildStrategy, ScoredChunk};
use async_trait::async_trait;
use kb_core::config::RetrievalSettings;
use kb_core::{AppError, AppResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Ranking strategy bound to one artifact kind.
#[async_trait]
trait Scorer: Send + Sync + std::fmt::Debug {
    async fn score(
        &self,
        index: &LoadedIndex,
        query: &str,
        locale: Locale,
        k: usize,
    ) -> AppResult<Vec<ScoredChunk>>;
}

/// Cosine similarity against precomputed chunk embeddings.
#[derive(Debug)]
struct CosineScorer {
    provider: Arc<dyn EmbeddingProvider>,
}

#[async_trait]
impl Scorer for CosineScorer {
    async fn score(
        &self,
        index: &LoadedIndex,
        query: &str,
        locale: Locale,
        k: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let LoadedIndex::Embeddings { partitions, .. } = index else {
            return Err(AppError::Index(
                "Cosine scoring needs an embeddings index".to_string(),
            ));
        };
        let Some(chunks) = partitions.get(&locale) else {
            return Ok(vec![]);
        };
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let query_embedding = self.provider.embed(query).await?;

        let mut results: Vec<ScoredChunk> = chunks
            .iter()
            .map(|chunk| {
                let score = chunk
                    .embedding
                    .as_deref()
                    .map(|embedding| cosine_similarity(&query_embedding, embedding))
                    .unwrap_or(0.0);
                ScoredChunk::new(chunk, score)
            })
            .collect();

        // Stable, so equal scores keep artifact order.
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);

        Ok(results)
    }
}

/// Keyword search over the serialized lexical index.
#[derive(Debug)]
struct LexicalScorer {
    options: SearchOptions,
}

#[async_trait]
impl Scorer for LexicalScorer {
    async fn score(
        &self,
        index: &LoadedIndex,
        query: &str,
        locale: Locale,
        k: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let LoadedIndex::Lexical { partitions, .. } = index else {
            return Err(AppError::Index(
                "Lexical scoring needs a lexical index".to_string(),
            ));
        };
        let Some(partition) = partitions.get(&locale) else {
            return Ok(vec![]);
        };

        let results = partition
            .index
            .search(query, &self.options)
            .into_iter()
            .filter_map(|hit| match partition.hydrate(&hit.id) {
                Some(chunk) => Some(ScoredChunk::new(chunk, hit.score as f32)),
                None => {
                    warn!("Lexical hit '{}' has no chunk record; skipping", hit.id);
                    None
                }
            })
            .take(k)
            .collect();

        Ok(results)
    }
}

/// Embeddings artifact with nothing to embed the query: always empty.
#[derive(Debug)]
struct EmptyScorer;

#[async_trait]
impl Scorer for EmptyScorer {
    async fn score(
        &self,
        _index: &LoadedIndex,
        _query: &str,
        _locale: Locale,
        _k: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        Ok(vec![])
    }
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for vectors of different length, empty vectors and vectors
/// with zero norm, so the result is never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Answers `(query, locale, k)` against one loaded artifact.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<LoadedIndex>,
    scorer: Arc<dyn Scorer>,
}

impl Retriever {
    /// Bind a retriever to `index` with default lexical search options.
    ///
    /// An embeddings index without a provider yields a retriever that
    /// always returns no results. A provider whose model or dimensionality
    /// differs from the one that built the index is rejected.
    pub fn new(
        index: Arc<LoadedIndex>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
    ) -> AppResult<Self> {
        Self::with_options(index, provider, SearchOptions::default())
    }

    /// Same as [`Retriever::new`], taking lexical options from settings.
    pub fn from_settings(
        index: Arc<LoadedIndex>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        settings: &RetrievalSettings,
    ) -> AppResult<Self> {
        let options = SearchOptions {
            prefix: settings.prefix,
            fuzzy: settings.fuzzy,
        };
        Self::with_options(index, provider, options)
    }

    pub fn with_options(
        index: Arc<LoadedIndex>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        options: SearchOptions,
    ) -> AppResult<Self> {
        let scorer: Arc<dyn Scorer> = match (index.as_ref(), provider) {
            (
                LoadedIndex::Embeddings {
                    model, dimensions, ..
                },
                Some(provider),
            ) => {
                if provider.model_name() != model.as_str() {
                    return Err(AppError::Config(format!(
                        "Index was built with embedding model '{}' but the provider uses '{}'",
                        model,
                        provider.model_name()
                    )));
                }
                if let Some(dimensions) = *dimensions {
                    if provider.dimensions() != dimensions {
                        return Err(AppError::Config(format!(
                            "Index holds {}-dimensional embeddings but the provider produces {}",
                            dimensions,
                            provider.dimensions()
                        )));
                    }
                }
                Arc::new(CosineScorer { provider })
            }
            (LoadedIndex::Embeddings { model, .. }, None) => {
                warn!(
                    "Embeddings index ({}) loaded without an embedding provider; queries will return no results",
                    model
                );
                Arc::new(EmptyScorer)
            }
            (LoadedIndex::Lexical { .. }, _) => Arc::new(LexicalScorer { options }),
        };

        debug!("Retriever ready with {:?}", scorer);

        Ok(Self { index, scorer })
    }

    pub fn kind(&self) -> BuildStrategy {
        self.index.kind()
    }

    pub fn index(&self) -> &Arc<LoadedIndex> {
        &self.index
    }

    /// Top `k` chunks of `locale` for `query`, best first.
    pub async fn try_retrieve(
        &self,
        query: &str,
        locale: Locale,
        k: usize,
    ) -> AppResult<Vec<ScoredChunk>> {
        let query = query.trim();
        if query.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let results = self.scorer.score(&self.index, query, locale, k).await?;

        debug!(
            "Retrieved {} chunks for [{}] (requested top-{})",
            results.len(),
            locale,
            k
        );

        Ok(results)
    }

    /// Like [`Retriever::try_retrieve`], but a failure is logged and
    /// reported as no results.
    pub async fn retrieve(&self, query: &str, locale: Locale, k: usize) -> Vec<ScoredChunk> {
        match self.try_retrieve(query, locale, k).await {
            Ok(results) => results,
            Err(e) => {
                warn!("Retrieval failed, continuing without sources: {}", e);
                vec![]
            }
        }
    }

    /// Like [`Retriever::try_retrieve`], abandoned with
    /// [`AppError::Cancelled`] once `token` fires.
    pub async fn retrieve_cancellable(
        &self,
        query: &str,
        locale: Locale,
        k: usize,
        token: &CancellationToken,
    ) -> AppResult<Vec<ScoredChunk>> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AppError::Cancelled),
            results = self.try_retrieve(query, locale, k) => results,
        }
    }
}
