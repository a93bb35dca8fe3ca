//! Index artifact: the single file shared by the indexer and the retriever.
//!
//! The artifact is JSON tagged by `kind`:
//!
//! ```json
//! { "kind": "embeddings", "model": "...", "locales": { "en": [chunk, ...], "es": [...] } }
//! { "kind": "lexical", "locales": { "en": { "serializedIndex": "...", "chunks": [...] }, ... } }
//! ```

use crate::lexical::{LexicalIndex, CHUNK_FIELDS};
use crate::locale::Locale;
use crate::types::{BuildStrategy, Chunk, IndexStats};
use chrono::{DateTime, Utc};
use kb_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Serialized output of the indexer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IndexArtifact {
    Embeddings {
        model: String,
        #[serde(rename = "builtAt", default, skip_serializing_if = "Option::is_none")]
        built_at: Option<DateTime<Utc>>,
        locales: BTreeMap<Locale, Vec<Chunk>>,
    },
    Lexical {
        #[serde(rename = "builtAt", default, skip_serializing_if = "Option::is_none")]
        built_at: Option<DateTime<Utc>>,
        locales: BTreeMap<Locale, LexicalPartitionData>,
    },
}

/// Serialized lexical partition for one locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LexicalPartitionData {
    pub serialized_index: String,
    pub chunks: Vec<Chunk>,
}

impl IndexArtifact {
    pub fn kind(&self) -> BuildStrategy {
        match self {
            IndexArtifact::Embeddings { .. } => BuildStrategy::Embeddings,
            IndexArtifact::Lexical { .. } => BuildStrategy::Lexical,
        }
    }

    /// Group embedded chunks by locale into an embeddings artifact.
    pub fn embeddings(model: &str, chunks: Vec<Chunk>) -> Self {
        IndexArtifact::Embeddings {
            model: model.to_string(),
            built_at: Some(Utc::now()),
            locales: partition(chunks),
        }
    }

    /// Build the per-locale lexical indexes over `text` and `title`.
    pub fn lexical(chunks: Vec<Chunk>) -> AppResult<Self> {
        let mut locales = BTreeMap::new();

        for (locale, chunks) in partition(chunks) {
            let mut index = LexicalIndex::new(&CHUNK_FIELDS);
            index.add_all(
                chunks
                    .iter()
                    .map(|c| (c.id.as_str(), vec![c.text.as_str(), c.title.as_str()])),
            )?;

            tracing::debug!(
                "Built lexical index for [{}]: {} chunks, {} terms",
                locale,
                index.len(),
                index.term_count()
            );

            locales.insert(
                locale,
                LexicalPartitionData {
                    serialized_index: index.to_json()?,
                    chunks: chunks.iter().map(Chunk::without_embedding).collect(),
                },
            );
        }

        Ok(IndexArtifact::Lexical {
            built_at: Some(Utc::now()),
            locales,
        })
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| AppError::Artifact(format!("Failed to parse index artifact: {}", e)))
    }
}

/// Split chunks into locale partitions, keeping their relative order.
/// Every supported locale gets a partition, even when empty.
fn partition(chunks: Vec<Chunk>) -> BTreeMap<Locale, Vec<Chunk>> {
    let mut locales: BTreeMap<Locale, Vec<Chunk>> =
        Locale::ALL.iter().map(|l| (*l, Vec::new())).collect();
    for chunk in chunks {
        locales.entry(chunk.locale).or_default().push(chunk);
    }
    locales
}

/// Write `artifact` to `path` so that readers see either the previous file
/// or the complete new one.
///
/// The JSON is written to a temporary file in the destination directory
/// and then renamed over `path`. Returns the number of bytes written.
pub fn write_artifact(artifact: &IndexArtifact, path: &Path) -> AppResult<u64> {
    let json = artifact.to_json()?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| {
        AppError::Artifact(format!("Failed to create output directory {:?}: {}", dir, e))
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    temp.write_all(json.as_bytes())?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .map_err(|e| AppError::Artifact(format!("Failed to write {:?}: {}", path, e.error)))?;

    tracing::info!("Wrote {} artifact to {:?}", artifact.kind().as_str(), path);

    Ok(json.len() as u64)
}

/// Where an artifact is read from. Its display form is the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactLocation {
    File(PathBuf),
    Url(String),
}

impl ArtifactLocation {
    /// Interpret `http://` and `https://` strings as URLs, anything else as
    /// a file path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ArtifactLocation::Url(location.to_string())
        } else {
            ArtifactLocation::File(PathBuf::from(location))
        }
    }

    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    /// Read the raw artifact text.
    pub async fn read(&self) -> AppResult<String> {
        match self {
            ArtifactLocation::File(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                AppError::Artifact(format!("Failed to read index artifact {:?}: {}", path, e))
            }),
            ArtifactLocation::Url(url) => {
                let response = reqwest::get(url).await.map_err(|e| {
                    AppError::Artifact(format!("Failed to fetch index artifact {}: {}", url, e))
                })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(AppError::Artifact(format!(
                        "Fetching index artifact {} returned {}",
                        url, status
                    )));
                }
                response.text().await.map_err(|e| {
                    AppError::Artifact(format!("Failed to read index artifact {}: {}", url, e))
                })
            }
        }
    }

    /// Read, parse and hydrate the artifact.
    pub async fn load(&self) -> AppResult<LoadedIndex> {
        let json = self.read().await?;
        let artifact = IndexArtifact::from_json(&json)?;
        let index = LoadedIndex::from_artifact(artifact)?;

        tracing::info!(
            "Loaded {} index from {} ({} chunks)",
            index.kind().as_str(),
            self,
            index.chunk_counts().values().sum::<usize>()
        );

        Ok(index)
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactLocation::File(path) => write!(f, "{}", path.display()),
            ArtifactLocation::Url(url) => f.write_str(url),
        }
    }
}

/// Lexical partition ready for querying.
#[derive(Debug, Clone)]
pub struct LexicalPartition {
    pub index: LexicalIndex,
    pub chunks: Vec<Chunk>,
    positions: std::collections::HashMap<String, usize>,
}

impl LexicalPartition {
    /// Chunk record for a stored id.
    pub fn hydrate(&self, id: &str) -> Option<&Chunk> {
        self.positions.get(id).map(|&i| &self.chunks[i])
    }
}

/// An artifact after parsing and validation; immutable and shared.
#[derive(Debug, Clone)]
pub enum LoadedIndex {
    Embeddings {
        model: String,
        dimensions: Option<usize>,
        built_at: Option<DateTime<Utc>>,
        partitions: BTreeMap<Locale, Vec<Chunk>>,
    },
    Lexical {
        built_at: Option<DateTime<Utc>>,
        partitions: BTreeMap<Locale, LexicalPartition>,
    },
}

impl LoadedIndex {
    /// Validate an artifact and deserialize its lexical structures.
    ///
    /// Fails when a chunk sits in the wrong locale partition, when ids
    /// repeat within a partition, or when embeddings disagree on length.
    pub fn from_artifact(artifact: IndexArtifact) -> AppResult<Self> {
        match artifact {
            IndexArtifact::Embeddings {
                model,
                built_at,
                locales,
            } => {
                let mut dimensions = None;
                for (locale, chunks) in &locales {
                    check_partition(*locale, chunks)?;
                    for chunk in chunks {
                        let Some(embedding) = &chunk.embedding else {
                            continue;
                        };
                        match dimensions {
                            None => dimensions = Some(embedding.len()),
                            Some(d) if d != embedding.len() => {
                                return Err(AppError::Artifact(format!(
                                    "Chunk '{}' has {} dimensions, expected {}",
                                    chunk.id,
                                    embedding.len(),
                                    d
                                )));
                            }
                            Some(_) => {}
                        }
                    }
                }

                Ok(LoadedIndex::Embeddings {
                    model,
                    dimensions,
                    built_at,
                    partitions: locales,
                })
            }
            IndexArtifact::Lexical { built_at, locales } => {
                let mut partitions = BTreeMap::new();
                for (locale, data) in locales {
                    check_partition(locale, &data.chunks)?;
                    let index = LexicalIndex::from_json(&data.serialized_index)?;
                    let positions = data
                        .chunks
                        .iter()
                        .enumerate()
                        .map(|(i, c)| (c.id.clone(), i))
                        .collect();
                    partitions.insert(
                        locale,
                        LexicalPartition {
                            index,
                            chunks: data.chunks,
                            positions,
                        },
                    );
                }

                Ok(LoadedIndex::Lexical {
                    built_at,
                    partitions,
                })
            }
        }
    }

    pub fn kind(&self) -> BuildStrategy {
        match self {
            LoadedIndex::Embeddings { .. } => BuildStrategy::Embeddings,
            LoadedIndex::Lexical { .. } => BuildStrategy::Lexical,
        }
    }

    pub fn chunk_counts(&self) -> BTreeMap<Locale, usize> {
        match self {
            LoadedIndex::Embeddings { partitions, .. } => {
                partitions.iter().map(|(l, c)| (*l, c.len())).collect()
            }
            LoadedIndex::Lexical { partitions, .. } => partitions
                .iter()
                .map(|(l, p)| (*l, p.chunks.len()))
                .collect(),
        }
    }

    pub fn stats(&self) -> IndexStats {
        let (model, dimensions, built_at) = match self {
            LoadedIndex::Embeddings {
                model,
                dimensions,
                built_at,
                ..
            } => (Some(model.clone()), *dimensions, *built_at),
            LoadedIndex::Lexical { built_at, .. } => (None, None, *built_at),
        };

        IndexStats {
            kind: self.kind(),
            model,
            dimensions,
            chunks: self.chunk_counts(),
            built_at,
        }
    }
}

fn check_partition(locale: Locale, chunks: &[Chunk]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for chunk in chunks {
        if chunk.locale != locale {
            return Err(AppError::Artifact(format!(
                "Chunk '{}' is tagged '{}' but stored under '{}'",
                chunk.id, chunk.locale, locale
            )));
        }
        if !seen.insert(chunk.id.as_str()) {
            return Err(AppError::Artifact(format!(
                "Duplicate chunk id '{}' in locale '{}'",
                chunk.id, locale
            )));
        }
    }
    Ok(())
}
