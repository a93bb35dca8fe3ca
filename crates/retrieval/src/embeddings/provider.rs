//! Embedding provider trait and factory.

use super::providers::openai::OpenAiProvider;
use super::providers::trigram::{TrigramProvider, TRIGRAM_MODEL};
use kb_core::config::EmbeddingSettings;
use kb_core::{AppError, AppResult};
use std::sync::Arc;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Get provider name (e.g., "openai", "trigram")
    fn provider_name(&self) -> &str;

    /// Get model identifier
    fn model_name(&self) -> &str;

    /// Get embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts in one call, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Embedding("No embedding returned".to_string()))
    }
}

/// Create an embedding provider based on configuration.
///
/// The `openai` provider needs an API key; the local `trigram` provider
/// does not, and always reports its own model id whatever `model` says.
pub fn create_provider(
    settings: &EmbeddingSettings,
    api_key: Option<&str>,
) -> AppResult<Arc<dyn EmbeddingProvider>> {
    match settings.provider.as_str() {
        "openai" => {
            let key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                AppError::Config(format!(
                    "OpenAI embeddings need an API key in {}",
                    settings.api_key_env
                ))
            })?;
            Ok(Arc::new(OpenAiProvider::new(settings, key)?))
        }

        "trigram" => {
            if settings.model != TRIGRAM_MODEL {
                tracing::debug!(
                    "Trigram provider ignores configured model '{}'",
                    settings.model
                );
            }
            Ok(Arc::new(TrigramProvider::new(settings.dimensions)))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: openai, trigram",
            settings.provider
        ))),
    }
}

/// Settings that reproduce the embedder an artifact was built with.
///
/// The provider is picked from the recorded model id and the configured
/// model and dimensions are replaced by the artifact's. Endpoint, key
/// variable and batch size stay as configured.
pub fn settings_for_index(
    settings: &EmbeddingSettings,
    model: &str,
    dimensions: Option<usize>,
) -> EmbeddingSettings {
    let provider = if model == TRIGRAM_MODEL {
        "trigram"
    } else {
        "openai"
    };

    EmbeddingSettings {
        provider: provider.to_string(),
        model: model.to_string(),
        dimensions: dimensions.unwrap_or(settings.dimensions),
        ..settings.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_trigram_provider() {
        let settings = EmbeddingSettings {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            ..Default::default()
        };

        let provider = create_provider(&settings, None).unwrap();
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.model_name(), "trigram-v1");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_openai_requires_key() {
        let settings = EmbeddingSettings::default();

        let result = create_provider(&settings, None);
        assert!(matches!(result, Err(AppError::Config(_))));

        let provider = create_provider(&settings, Some("sk-test")).unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_create_unknown_provider() {
        let settings = EmbeddingSettings {
            provider: "unknown".to_string(),
            ..Default::default()
        };

        let result = create_provider(&settings, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unknown embedding provider"));
    }

    #[test]
    fn test_trigram_ignores_configured_model() {
        let settings = EmbeddingSettings {
            provider: "trigram".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.model, "text-embedding-3-small");

        let provider = create_provider(&settings, None).unwrap();
        assert_eq!(provider.model_name(), TRIGRAM_MODEL);
    }

    #[test]
    fn test_settings_for_index() {
        let configured = EmbeddingSettings {
            model: "text-embedding-3-large".to_string(),
            batch_size: 16,
            ..Default::default()
        };

        let trigram = settings_for_index(&configured, TRIGRAM_MODEL, Some(64));
        assert_eq!(trigram.provider, "trigram");
        assert_eq!(trigram.model, TRIGRAM_MODEL);
        assert_eq!(trigram.dimensions, 64);
        assert_eq!(trigram.batch_size, 16);

        let openai = settings_for_index(&configured, "text-embedding-3-small", None);
        assert_eq!(openai.provider, "openai");
        assert_eq!(openai.model, "text-embedding-3-small");
        assert_eq!(openai.dimensions, configured.dimensions);
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let settings = EmbeddingSettings {
            provider: "trigram".to_string(),
            dimensions: 128,
            ..Default::default()
        };
        let provider = create_provider(&settings, None).unwrap();

        let embedding = provider.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 128);
    }
}
