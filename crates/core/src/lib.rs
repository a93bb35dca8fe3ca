//! Knowledge Base Core Library
//!
//! This crate provides the foundational utilities shared by the indexer and
//! the retriever:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::KbConfig;
pub use error::{AppError, AppResult};
