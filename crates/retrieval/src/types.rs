//! Retrieval type definitions.

use crate::locale::Locale;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A locale-specific slice of a source document; the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{documentName}-{locale}-{position}`
    pub id: String,

    pub locale: Locale,

    /// Label of the source document, shared by all of its chunks
    pub title: String,

    pub text: String,

    /// Present only in embeddings artifacts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    /// Copy of this chunk without its vector.
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: None,
            ..self.clone()
        }
    }
}

/// A chunk paired with its relevance score.
///
/// Scores are only meaningful relative to other results of the same
/// artifact and strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub id: String,
    pub locale: Locale,
    pub title: String,
    pub text: String,
    pub score: f32,
}

impl ScoredChunk {
    pub fn new(chunk: &Chunk, score: f32) -> Self {
        Self {
            id: chunk.id.clone(),
            locale: chunk.locale,
            title: chunk.title.clone(),
            text: chunk.text.clone(),
            score,
        }
    }
}

/// A markdown source file split into its locale sections.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name, used as the id prefix (e.g. `services.md`)
    pub name: String,

    /// Human-readable title derived from the file stem
    pub title: String,

    pub path: PathBuf,

    /// Section text per locale; missing sections already fall back to the
    /// whole body
    pub sections: BTreeMap<Locale, String>,
}

/// Which artifact kind a build produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStrategy {
    Embeddings,
    Lexical,
}

impl BuildStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStrategy::Embeddings => "embeddings",
            BuildStrategy::Lexical => "lexical",
        }
    }
}

/// Statistics from an index build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub strategy: BuildStrategy,

    /// Number of source documents read
    pub documents: usize,

    /// Chunks emitted per locale
    pub chunks: BTreeMap<Locale, usize>,

    pub output: PathBuf,

    pub bytes_written: u64,

    pub duration_secs: f64,
}

impl BuildReport {
    pub fn total_chunks(&self) -> usize {
        self.chunks.values().sum()
    }
}

/// Summary of a loaded artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub kind: BuildStrategy,

    /// Embedding model, for embeddings artifacts
    pub model: Option<String>,

    /// Vector length, for embeddings artifacts
    pub dimensions: Option<usize>,

    pub chunks: BTreeMap<Locale, usize>,

    pub built_at: Option<chrono::DateTime<chrono::Utc>>,
}
