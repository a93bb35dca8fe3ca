//! Build command handler.
//!
//! Reads the content directory and writes the index artifact.

use clap::{Args, ValueEnum};
use kb_core::{AppError, AppResult, KbConfig};
use kb_retrieval::{build_index, BuildStrategy, EmbeddingProvider};
use std::path::PathBuf;
use std::sync::Arc;

use super::{configured_provider, print_json};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyArg {
    /// Embeddings when an API key is available, lexical otherwise
    Auto,
    Embeddings,
    Lexical,
}

/// Build the index artifact from markdown sources
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Directory of bilingual markdown documents
    #[arg(long)]
    pub content_dir: Option<PathBuf>,

    /// Artifact output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Index kind to build
    #[arg(long, value_enum, default_value = "auto")]
    pub strategy: StrategyArg,

    /// Output the build report as JSON
    #[arg(long)]
    pub json: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config: &KbConfig) -> AppResult<()> {
        tracing::info!("Executing build command");
        tracing::debug!("Build options: {:?}", self);

        let mut config = config.clone();
        if let Some(dir) = &self.content_dir {
            config.content_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        config.validate()?;

        let provider = configured_provider(&config)?;
        let provider = select_provider(self.strategy, provider)?;

        let report = build_index(&config, provider.as_deref()).await?;

        if self.json {
            print_json(&report)?;
        } else {
            let per_locale = report
                .chunks
                .iter()
                .map(|(locale, count)| format!("{} {}", count, locale))
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "Built {} index: {} documents, {} chunks ({}) -> {} ({} bytes, {:.2}s)",
                report.strategy.as_str(),
                report.documents,
                report.total_chunks(),
                per_locale,
                report.output.display(),
                report.bytes_written,
                report.duration_secs
            );
        }

        Ok(())
    }
}

/// Decide the build strategy from the flag and the available provider.
fn select_provider(
    strategy: StrategyArg,
    provider: Option<Arc<dyn EmbeddingProvider>>,
) -> AppResult<Option<Arc<dyn EmbeddingProvider>>> {
    let chosen = match strategy {
        StrategyArg::Auto if provider.is_some() => BuildStrategy::Embeddings,
        StrategyArg::Auto | StrategyArg::Lexical => BuildStrategy::Lexical,
        StrategyArg::Embeddings => BuildStrategy::Embeddings,
    };

    match chosen {
        BuildStrategy::Lexical => Ok(None),
        BuildStrategy::Embeddings => provider.map(Some).ok_or_else(|| {
            AppError::Config(
                "Embeddings build requested but no embedding API key is configured".to_string(),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_retrieval::embeddings::providers::trigram::TrigramProvider;

    fn trigram() -> Option<Arc<dyn EmbeddingProvider>> {
        Some(Arc::new(TrigramProvider::new(8)))
    }

    #[test]
    fn test_auto_follows_provider() {
        assert!(select_provider(StrategyArg::Auto, trigram()).unwrap().is_some());
        assert!(select_provider(StrategyArg::Auto, None).unwrap().is_none());
    }

    #[test]
    fn test_lexical_ignores_provider() {
        assert!(select_provider(StrategyArg::Lexical, trigram()).unwrap().is_none());
    }

    #[test]
    fn test_embeddings_requires_provider() {
        assert!(select_provider(StrategyArg::Embeddings, None).is_err());
        assert!(select_provider(StrategyArg::Embeddings, trigram()).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_build_command_writes_to_output_flag() {
        let temp = tempfile::TempDir::new().unwrap();
        let content = temp.path().join("docs");
        std::fs::create_dir_all(&content).unwrap();
        std::fs::write(content.join("faq.md"), "## EN\nHello.\n## ES\nHola.\n").unwrap();

        let config = KbConfig {
            workspace: temp.path().to_path_buf(),
            ..Default::default()
        };
        let command = BuildCommand {
            content_dir: Some(content),
            output: Some(PathBuf::from("out/index.json")),
            strategy: StrategyArg::Lexical,
            json: true,
        };

        command.execute(&config).await.unwrap();
        assert!(temp.path().join("out").join("index.json").exists());
    }
}
