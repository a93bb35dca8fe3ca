//! Bilingual knowledge-base retrieval.
//!
//! The indexer turns a directory of markdown documents with `## EN` and
//! `## ES` sections into a single artifact, either embeddings or a lexical
//! index depending on whether an embedding credential is available. The
//! retriever loads that artifact once and answers `(query, locale, k)`.

pub mod artifact;
pub mod cache;
pub mod chunker;
pub mod context;
pub mod embeddings;
pub mod indexer;
pub mod lexical;
pub mod locale;
pub mod retriever;
pub mod source;
pub mod types;

// Re-export commonly used types
pub use artifact::{ArtifactLocation, IndexArtifact, LoadedIndex};
pub use cache::ArtifactCache;
pub use context::{format_context, source_outline, RetrievalContext};
pub use embeddings::{create_provider, settings_for_index, EmbeddingProvider};
pub use indexer::{build_artifact, build_index};
pub use locale::Locale;
pub use retriever::Retriever;
pub use types::{BuildReport, BuildStrategy, Chunk, IndexStats, ScoredChunk};
