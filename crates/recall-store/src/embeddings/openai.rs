// crates/recall-store/src/embeddings/openai.rs
// OpenAI embeddings API client (text-embedding-3-small / -large)

use super::Embedder;
use crate::http::create_fast_client;
use crate::utils::truncate_at_boundary;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// API endpoint base for OpenAI
const API_BASE: &str = "https://api.openai.com";

/// Max input tokens (OpenAI limit for embedding models)
const MAX_INPUT_TOKENS: usize = 8192;

/// Approximate chars per token (conservative estimate)
const CHARS_PER_TOKEN: usize = 4;

/// Max characters to embed (based on token limit)
const MAX_TEXT_CHARS: usize = MAX_INPUT_TOKENS * CHARS_PER_TOKEN;

/// Max texts per batch request (OpenAI allows up to 2048 inputs,
/// but we cap lower to stay well within the 300k total token limit)
const MAX_BATCH_SIZE: usize = 256;

/// Retry attempts
const RETRY_ATTEMPTS: usize = 2;

/// OpenAI embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OpenAiEmbeddingModel {
    /// text-embedding-3-small: 1536 default dims
    #[default]
    TextEmbedding3Small,
    /// text-embedding-3-large: 3072 default dims
    TextEmbedding3Large,
}

impl OpenAiEmbeddingModel {
    /// Get the model name for API calls
    pub fn model_name(&self) -> &'static str {
        match self {
            Self::TextEmbedding3Small => "text-embedding-3-small",
            Self::TextEmbedding3Large => "text-embedding-3-large",
        }
    }

    /// Get default embedding dimensions for this model
    pub fn default_dimensions(&self) -> usize {
        match self {
            Self::TextEmbedding3Small => 1536,
            Self::TextEmbedding3Large => 3072,
        }
    }

    /// Parse from model name string
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "text-embedding-3-small" => Some(Self::TextEmbedding3Small),
            "text-embedding-3-large" => Some(Self::TextEmbedding3Large),
            _ => None,
        }
    }
}

impl std::fmt::Display for OpenAiEmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.model_name())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// OpenAI embeddings client
pub struct OpenAiEmbeddings {
    api_key: String,
    api_base: String,
    model: OpenAiEmbeddingModel,
    dimensions: usize,
    http_client: reqwest::Client,
}

impl OpenAiEmbeddings {
    /// Create new OpenAI embeddings client with default settings
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, OpenAiEmbeddingModel::default(), None)
    }

    /// Create embeddings client with model and optional output dimensions
    pub fn with_config(
        api_key: String,
        model: OpenAiEmbeddingModel,
        dimensions: Option<usize>,
    ) -> Self {
        Self::with_http_client(api_key, model, dimensions, create_fast_client())
    }

    /// Create embeddings client with a shared HTTP client
    pub fn with_http_client(
        api_key: String,
        model: OpenAiEmbeddingModel,
        dimensions: Option<usize>,
        http_client: reqwest::Client,
    ) -> Self {
        let dimensions = dimensions.unwrap_or_else(|| model.default_dimensions());

        Self {
            api_key,
            api_base: API_BASE.to_string(),
            model,
            dimensions,
            http_client,
        }
    }

    /// Point the client at an OpenAI-compatible endpoint (proxies, tests)
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Get embedding dimensions
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the model being used
    pub fn model(&self) -> OpenAiEmbeddingModel {
        self.model
    }

    /// Embed multiple texts, chunked into parallel requests of at most
    /// `MAX_BATCH_SIZE` inputs.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        if texts.len() <= MAX_BATCH_SIZE {
            return self.embed_texts(texts).await;
        }

        let chunks: Vec<&[String]> = texts.chunks(MAX_BATCH_SIZE).collect();
        debug!(
            "Embedding {} texts in {} parallel batches",
            texts.len(),
            chunks.len()
        );

        let futures: Vec<_> = chunks
            .into_iter()
            .map(|chunk| self.embed_texts(chunk))
            .collect();

        let results = futures::future::join_all(futures).await;

        let mut all_results = Vec::with_capacity(texts.len());
        for result in results {
            all_results.extend(result?);
        }

        Ok(all_results)
    }

    /// Core embedding call, one request per chunk
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts
            .iter()
            .map(|t| {
                if t.len() > MAX_TEXT_CHARS {
                    debug!("Truncating text from {} to {} chars", t.len(), MAX_TEXT_CHARS);
                    truncate_at_boundary(t, MAX_TEXT_CHARS)
                } else {
                    t.as_str()
                }
            })
            .collect();

        let body = serde_json::json!({
            "input": inputs,
            "model": self.model.model_name(),
            "dimensions": self.dimensions,
            "encoding_format": "float"
        });
        let url = format!("{}/v1/embeddings", self.api_base);

        let mut last_error = None;
        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
            }

            match self
                .http_client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let resp: EmbeddingResponse = response
                        .json()
                        .await
                        .context("Failed to parse embedding response")?;

                    // Sort by index to ensure correct ordering
                    let mut data = resp.data;
                    data.sort_by_key(|d| d.index);

                    let embeddings: Vec<Vec<f32>> =
                        data.into_iter().map(|d| d.embedding).collect();

                    if embeddings.len() != texts.len() {
                        anyhow::bail!(
                            "OpenAI returned {} embeddings for {} inputs",
                            embeddings.len(),
                            texts.len()
                        );
                    }

                    return Ok(embeddings);
                }
                Ok(response) => {
                    let status = response.status();
                    let error_text = response.text().await.unwrap_or_default();

                    let msg = serde_json::from_str::<ErrorResponse>(&error_text)
                        .map(|e| e.error.message)
                        .unwrap_or(error_text);

                    let error = anyhow::anyhow!("OpenAI API error {}: {}", status, msg);

                    // Client errors other than rate limiting will not improve on retry
                    if status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS
                    {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
                Err(e) => {
                    last_error = Some(e.into());
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbeddings {
    fn provider_id(&self) -> String {
        format!("openai:{}", self.model.model_name())
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts).await
    }
}
