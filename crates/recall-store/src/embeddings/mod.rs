// crates/recall-store/src/embeddings/mod.rs
// Embedding providers and the gateway the store talks to

mod gateway;
mod ollama;
mod openai;

pub use self::gateway::EmbeddingGateway;
pub use self::ollama::OllamaEmbeddings;
pub use self::openai::{OpenAiEmbeddingModel, OpenAiEmbeddings};

use crate::config::ApiKeys;
use crate::error::{RecallError, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Default Ollama endpoint when OLLAMA_HOST is unset
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// A text-to-vector provider.
///
/// `embed_documents` must return one vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier (`provider:model`), persisted to detect provider changes
    fn provider_id(&self) -> String;

    async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
    }
}

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    OpenAi,
    Ollama,
}

impl EmbeddingProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "ollama" => Some(Self::Ollama),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

impl fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `"<provider>:<model>"` string. The model part is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderSpec {
    pub provider: EmbeddingProvider,
    pub model: Option<String>,
}

impl EmbedderSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let (provider_name, model) = match spec.split_once(':') {
            Some((p, m)) => (p.trim(), Some(m.trim()).filter(|m| !m.is_empty())),
            None => (spec.trim(), None),
        };
        let provider = EmbeddingProvider::from_name(provider_name).ok_or_else(|| {
            RecallError::Config(format!(
                "unknown embedding provider '{provider_name}' (expected openai or ollama)"
            ))
        })?;
        Ok(Self {
            provider,
            model: model.map(str::to_string),
        })
    }
}

/// Build an embedder from a spec and the provider credentials.
///
/// `dims` is passed to providers that accept a requested output size.
pub fn embedder_from_spec(
    spec: &EmbedderSpec,
    api_keys: &ApiKeys,
    ollama_host: Option<&str>,
    dims: Option<usize>,
) -> Result<Arc<dyn Embedder>> {
    match spec.provider {
        EmbeddingProvider::OpenAi => {
            let api_key = api_keys.openai.clone().ok_or_else(|| {
                RecallError::Config("OPENAI_API_KEY is required for openai embeddings".into())
            })?;
            let model = match spec.model.as_deref() {
                Some(name) => OpenAiEmbeddingModel::from_name(name).ok_or_else(|| {
                    RecallError::Config(format!("unknown OpenAI embedding model '{name}'"))
                })?,
                None => OpenAiEmbeddingModel::default(),
            };
            Ok(Arc::new(OpenAiEmbeddings::with_config(api_key, model, dims)))
        }
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbeddings::new(
            ollama_host.unwrap_or(DEFAULT_OLLAMA_HOST).to_string(),
            spec.model.clone(),
            None,
        ))),
    }
}

#[cfg(test)]
pub(crate) mod mock_http {
    //! Minimal HTTP/1.1 server for provider tests. Serves one canned response
    //! per connection and records each request body.

    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    #[derive(Debug, Clone)]
    pub struct Captured {
        pub head: String,
        pub body: serde_json::Value,
    }

    pub struct MockServer {
        pub base_url: String,
        pub requests: Arc<Mutex<Vec<Captured>>>,
        pub handle: JoinHandle<()>,
    }

    pub async fn serve(responses: Vec<(u16, String)>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let captured = requests.clone();

        let handle = tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 8192];
                let head_end = loop {
                    let n = stream.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "client closed before sending headers");
                    buf.extend_from_slice(&chunk[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        break pos + 4;
                    }
                };
                let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                while buf.len() < head_end + content_length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    assert!(n > 0, "client closed mid-body");
                    buf.extend_from_slice(&chunk[..n]);
                }
                let body_json =
                    serde_json::from_slice(&buf[head_end..head_end + content_length])
                        .unwrap_or(serde_json::Value::Null);
                captured.lock().unwrap().push(Captured {
                    head,
                    body: body_json,
                });

                let reason = if status == 200 { "OK" } else { "Error" };
                let resp = format!(
                    "HTTP/1.1 {status} {reason}\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                stream.write_all(resp.as_bytes()).await.unwrap();
                stream.flush().await.unwrap();
            }
        });

        MockServer {
            base_url: format!("http://127.0.0.1:{port}"),
            requests,
            handle,
        }
    }

    /// OpenAI-style success body with the given vectors, indexes reversed to
    /// exercise client-side reordering.
    pub fn embeddings_body(vectors: &[Vec<f32>]) -> String {
        let data: Vec<serde_json::Value> = vectors
            .iter()
            .enumerate()
            .rev()
            .map(|(i, v)| serde_json::json!({"embedding": v, "index": i}))
            .collect();
        serde_json::json!({
            "data": data,
            "usage": {"prompt_tokens": 1, "total_tokens": 1}
        })
        .to_string()
    }
}
