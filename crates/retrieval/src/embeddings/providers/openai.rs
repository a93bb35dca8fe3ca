//! OpenAI Embedding Provider
//!
//! Calls the `/embeddings` endpoint of the OpenAI API (or any compatible
//! server) with a batch of inputs per request.
//!
//! # Features
//! - Batch embedding in a single request
//! - Response items re-ordered by their `index` field
//! - Automatic retry with exponential backoff on transport errors, rate
//!   limits and server errors

use crate::embeddings::EmbeddingProvider;
use async_trait::async_trait;
use kb_core::config::EmbeddingSettings;
use kb_core::AppError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const EMBEDDING_ENDPOINT: &str = "/embeddings";

/// Maximum attempts per request
const MAX_RETRIES: u32 = 3;

/// Initial backoff duration in milliseconds
const INITIAL_BACKOFF_MS: u64 = 200;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: Arc<Client>,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Outcome of a single failed attempt.
enum Failure {
    Retryable(AppError),
    Fatal(AppError),
}

impl OpenAiProvider {
    pub fn new(settings: &EmbeddingSettings, api_key: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Embedding(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Arc::new(client),
            base_url,
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            dimensions: settings.dimensions,
        })
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_with_retries(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.request(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(Failure::Fatal(e)) => return Err(e),
                Err(Failure::Retryable(e)) if attempt >= MAX_RETRIES => return Err(e),
                Err(Failure::Retryable(e)) => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    warn!(
                        "Embedding request failed (attempt {}/{}): {}; retrying in {}ms",
                        attempt, MAX_RETRIES, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, Failure> {
        let url = format!("{}{}", self.base_url, EMBEDDING_ENDPOINT);
        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        debug!("Sending embedding request for {} inputs to {}", texts.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Failure::Retryable(AppError::Embedding(format!(
                    "Failed to send request to {}: {}",
                    url, e
                )))
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);
            let err = AppError::Embedding(format!("Embeddings API error ({}): {}", status, message));

            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    Failure::Retryable(err)
                } else {
                    Failure::Fatal(err)
                },
            );
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            Failure::Fatal(AppError::Embedding(format!(
                "Failed to parse embeddings response: {}",
                e
            )))
        })?;

        order_response(body.data, texts.len(), self.dimensions).map_err(Failure::Fatal)
    }
}

/// Sort response items by `index` and check they cover every input once.
fn order_response(
    mut items: Vec<EmbeddingItem>,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, AppError> {
    if items.len() != expected {
        return Err(AppError::Embedding(format!(
            "Embeddings API returned {} vectors for {} inputs",
            items.len(),
            expected
        )));
    }

    items.sort_by_key(|item| item.index);

    items
        .into_iter()
        .enumerate()
        .map(|(position, item)| {
            if item.index != position {
                return Err(AppError::Embedding(format!(
                    "Embeddings API response is missing index {}",
                    position
                )));
            }
            if item.embedding.len() != dimensions {
                return Err(AppError::Embedding(format!(
                    "Unexpected embedding dimensions: got {}, expected {}",
                    item.embedding.len(),
                    dimensions
                )));
            }
            Ok(item.embedding)
        })
        .collect()
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn provider_name(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(AppError::Embedding(format!(
                "Cannot embed empty text at index {}",
                i
            )));
        }

        self.embed_with_retries(texts).await
    }
}
