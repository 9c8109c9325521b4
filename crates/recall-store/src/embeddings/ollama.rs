// crates/recall-store/src/embeddings/ollama.rs
// Ollama embeddings via OpenAI-compatible /v1/embeddings endpoint

use super::Embedder;
use crate::http::create_local_client;
use crate::utils::truncate_at_boundary;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Default Ollama embedding model
const DEFAULT_MODEL: &str = "nomic-embed-text";

/// Max characters to embed per text before truncation.
///
/// Most local embedding models have an 8192-token context window, and dense
/// text can tokenize at close to 2 chars/token, so the limit sits well below
/// 8192 * 4.
const MAX_TEXT_CHARS: usize = 12_000;

/// Max texts per batch request
const MAX_BATCH_SIZE: usize = 64;

/// Retry attempts
const RETRY_ATTEMPTS: usize = 1;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Ollama embeddings client (OpenAI-compatible endpoint, no auth required)
pub struct OllamaEmbeddings {
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl OllamaEmbeddings {
    /// Create a new Ollama embeddings client.
    /// If `http_client` is `None`, uses a client with a 60s timeout suitable for
    /// local embedding batches.
    pub fn new(base_url: String, model: Option<String>, http_client: Option<reqwest::Client>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            http_client: http_client.unwrap_or_else(create_local_client),
        }
    }

    /// Get model name
    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Embed multiple texts, sequentially in chunks of `MAX_BATCH_SIZE`
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut all_results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(MAX_BATCH_SIZE) {
            all_results.extend(self.embed_texts(chunk).await?);
        }
        Ok(all_results)
    }

    /// Core embedding call via Ollama's OpenAI-compatible endpoint.
    ///
    /// On a 400 response (typically context overflow), retries with the truncation
    /// limit halved.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let mut max_chars = MAX_TEXT_CHARS;
        let mut last_error = None;

        for attempt in 0..=RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(1000)).await;
            }

            let inputs: Vec<&str> = texts
                .iter()
                .map(|t| {
                    if t.len() > max_chars {
                        debug!(
                            "Truncating text from {} to {} chars for Ollama embedding",
                            t.len(),
                            max_chars
                        );
                        truncate_at_boundary(t, max_chars)
                    } else {
                        t.as_str()
                    }
                })
                .collect();

            let body = serde_json::json!({
                "input": inputs,
                "model": self.model,
            });

            match self
                .http_client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let resp: EmbeddingResponse = response
                        .json()
                        .await
                        .context("Failed to parse Ollama embedding response")?;

                    let mut data = resp.data;
                    data.sort_by_key(|d| d.index);

                    let embeddings: Vec<Vec<f32>> =
                        data.into_iter().map(|d| d.embedding).collect();
                    if embeddings.len() != texts.len() {
                        anyhow::bail!(
                            "Ollama returned {} embeddings for {} inputs",
                            embeddings.len(),
                            texts.len()
                        );
                    }
                    return Ok(embeddings);
                }
                Ok(response) => {
                    let status = response.status();
                    let body_text = response.text().await.unwrap_or_default();

                    // 400 is usually context overflow: halve the truncation limit
                    if status == reqwest::StatusCode::BAD_REQUEST && attempt < RETRY_ATTEMPTS {
                        let prev = max_chars;
                        max_chars /= 2;
                        debug!(
                            "Ollama returned 400 (context overflow), reducing truncation \
                             limit from {} to {} chars for retry",
                            prev, max_chars
                        );
                    }

                    last_error = Some(anyhow::anyhow!(
                        "Ollama embedding request failed ({}): {}",
                        status,
                        body_text
                    ));
                }
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Ollama embedding request error: {}", e));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding failed")))
    }
}

#[async_trait]
impl Embedder for OllamaEmbeddings {
    fn provider_id(&self) -> String {
        format!("ollama:{}", self.model)
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_batch(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::mock_http::{embeddings_body, serve};

    #[test]
    fn test_defaults() {
        let client = OllamaEmbeddings::new("http://localhost:11434/".to_string(), None, None);
        assert_eq!(client.model_name(), DEFAULT_MODEL);
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.provider_id(), "ollama:nomic-embed-text");
    }

    #[tokio::test]
    async fn test_retry_halves_truncation_on_400() {
        let server = serve(vec![
            (
                400,
                r#"{"error":"input length exceeds context length 8192"}"#.to_string(),
            ),
            (200, embeddings_body(&[vec![0.1; 8]])),
        ])
        .await;

        let client = OllamaEmbeddings::new(server.base_url.clone(), None, None);
        let long_input = "x".repeat(MAX_TEXT_CHARS + 5000);
        let result = client.embed_texts(&[long_input]).await.unwrap();
        assert_eq!(result[0].len(), 8);

        server.handle.await.unwrap();
        let requests = server.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);

        let first_len = requests[0].body["input"][0].as_str().unwrap().len();
        let retry_len = requests[1].body["input"][0].as_str().unwrap().len();
        assert_eq!(first_len, MAX_TEXT_CHARS);
        assert_eq!(retry_len, MAX_TEXT_CHARS / 2);
        assert!(!requests[0].head.to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn test_persistent_failure_surfaces_error() {
        let server = serve(vec![
            (500, "model not loaded".to_string()),
            (500, "model not loaded".to_string()),
        ])
        .await;

        let client = OllamaEmbeddings::new(server.base_url.clone(), None, None);
        let err = client.embed_query("hello").await.unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
        server.handle.await.unwrap();
    }
}
