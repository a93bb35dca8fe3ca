//! Offline index build: sources → chunks → artifact on disk.

use crate::artifact::{write_artifact, IndexArtifact};
use crate::chunker::chunk_documents;
use crate::embeddings::{embed_chunks, EmbeddingProvider};
use crate::locale::Locale;
use crate::source::read_sources;
use crate::types::{BuildReport, BuildStrategy, SourceDocument};
use kb_core::{AppResult, KbConfig};
use std::collections::BTreeMap;
use std::time::Instant;

/// Chunk `documents` and turn them into an artifact.
///
/// With a provider every chunk is embedded (an embeddings artifact);
/// without one a lexical artifact is built. Nothing is written here.
pub async fn build_artifact(
    documents: &[SourceDocument],
    config: &KbConfig,
    provider: Option<&dyn EmbeddingProvider>,
) -> AppResult<IndexArtifact> {
    let mut chunks = chunk_documents(documents, &config.chunking);

    tracing::info!(
        "Split {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );

    match provider {
        Some(provider) => {
            embed_chunks(provider, &mut chunks, config.embedding.batch_size).await?;
            Ok(IndexArtifact::embeddings(provider.model_name(), chunks))
        }
        None => IndexArtifact::lexical(chunks),
    }
}

/// Build the artifact for the configured content directory and write it to
/// the configured output path.
///
/// Any failure before the write leaves an existing artifact untouched.
pub async fn build_index(
    config: &KbConfig,
    provider: Option<&dyn EmbeddingProvider>,
) -> AppResult<BuildReport> {
    let started = Instant::now();
    let strategy = if provider.is_some() {
        BuildStrategy::Embeddings
    } else {
        BuildStrategy::Lexical
    };

    let content_dir = config.content_path();
    let output = config.output_path();

    tracing::info!(
        "Building {} index from {:?}",
        strategy.as_str(),
        content_dir
    );

    let documents = read_sources(&content_dir)?;
    if documents.is_empty() {
        tracing::warn!("No markdown documents found in {:?}", content_dir);
    }

    let artifact = build_artifact(&documents, config, provider).await?;
    let chunks = chunk_counts(&artifact);
    let bytes_written = write_artifact(&artifact, &output)?;

    let report = BuildReport {
        strategy,
        documents: documents.len(),
        chunks,
        output,
        bytes_written,
        duration_secs: started.elapsed().as_secs_f64(),
    };

    tracing::info!(
        "Indexed {} chunks from {} documents in {:.2}s",
        report.total_chunks(),
        report.documents,
        report.duration_secs
    );

    Ok(report)
}

fn chunk_counts(artifact: &IndexArtifact) -> BTreeMap<Locale, usize> {
    match artifact {
        IndexArtifact::Embeddings { locales, .. } => {
            locales.iter().map(|(l, c)| (*l, c.len())).collect()
        }
        IndexArtifact::Lexical { locales, .. } => locales
            .iter()
            .map(|(l, p)| (*l, p.chunks.len()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::providers::trigram::TrigramProvider;
    use async_trait::async_trait;
    use kb_core::AppError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Succeeds for the first `ok_batches` calls, then fails.
    #[derive(Debug)]
    struct FlakyProvider {
        ok_batches: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn provider_name(&self) -> &str {
            "flaky"
        }

        fn model_name(&self) -> &str {
            "flaky-model"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.ok_batches {
                return Err(AppError::Embedding("rate limited".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn workspace(files: &[(&str, &str)]) -> (TempDir, KbConfig) {
        let temp = TempDir::new().unwrap();
        let content = temp.path().join("content").join("knowledge");
        std::fs::create_dir_all(&content).unwrap();
        for (name, body) in files {
            std::fs::write(content.join(name), body).unwrap();
        }

        let config = KbConfig {
            workspace: temp.path().to_path_buf(),
            ..Default::default()
        };
        (temp, config)
    }

    fn output_exists(config: &KbConfig) -> bool {
        Path::new(&config.output_path()).exists()
    }

    #[tokio::test]
    async fn test_lexical_build_writes_artifact() {
        let (_temp, config) = workspace(&[
            ("services.md", "## EN\nWe build websites.\n## ES\nConstruimos sitios web.\n"),
            ("pricing.md", "## EN\nPlans start small.\n## ES\nPlanes accesibles.\n"),
        ]);

        let report = build_index(&config, None).await.unwrap();

        assert_eq!(report.strategy, BuildStrategy::Lexical);
        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks[&Locale::En], 2);
        assert_eq!(report.chunks[&Locale::Es], 2);
        assert!(report.bytes_written > 0);

        let json = std::fs::read_to_string(config.output_path()).unwrap();
        assert_eq!(
            IndexArtifact::from_json(&json).unwrap().kind(),
            BuildStrategy::Lexical
        );
    }

    #[tokio::test]
    async fn test_embeddings_build_records_model() {
        let (_temp, config) = workspace(&[("faq.md", "## EN\nHow long?\n## ES\n¿Cuánto?\n")]);
        let provider = TrigramProvider::new(64);

        let report = build_index(&config, Some(&provider)).await.unwrap();
        assert_eq!(report.strategy, BuildStrategy::Embeddings);

        let json = std::fs::read_to_string(config.output_path()).unwrap();
        let IndexArtifact::Embeddings { model, locales, .. } = IndexArtifact::from_json(&json).unwrap()
        else {
            panic!("expected embeddings artifact");
        };
        assert_eq!(model, "trigram-v1");
        assert_eq!(locales[&Locale::En][0].embedding.as_ref().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_failed_batch_writes_nothing() {
        // 70 short documents make two batches of 64 in the English pass alone.
        let bodies: Vec<(String, String)> = (0..70)
            .map(|i| (format!("doc{:02}.md", i), format!("Document {}.", i)))
            .collect();
        let files: Vec<(&str, &str)> = bodies
            .iter()
            .map(|(n, b)| (n.as_str(), b.as_str()))
            .collect();
        let (_temp, config) = workspace(&files);

        let provider = FlakyProvider {
            ok_batches: 1,
            calls: AtomicUsize::new(0),
        };
        let result = build_index(&config, Some(&provider)).await;

        assert!(matches!(result, Err(AppError::Embedding(_))));
        assert!(!output_exists(&config));
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_artifact() {
        let (_temp, config) = workspace(&[("a.md", "Hello there.")]);
        build_index(&config, None).await.unwrap();
        let before = std::fs::read_to_string(config.output_path()).unwrap();

        let provider = FlakyProvider {
            ok_batches: 0,
            calls: AtomicUsize::new(0),
        };
        assert!(build_index(&config, Some(&provider)).await.is_err());

        let after = std::fs::read_to_string(config.output_path()).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_missing_content_dir() {
        let temp = TempDir::new().unwrap();
        let config = KbConfig {
            workspace: temp.path().to_path_buf(),
            ..Default::default()
        };

        assert!(build_index(&config, None).await.is_err());
        assert!(!output_exists(&config));
    }
}
