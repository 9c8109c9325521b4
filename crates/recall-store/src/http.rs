// crates/recall-store/src/http.rs
// HTTP client construction for embedding providers

use std::time::Duration;

/// Connect timeout for provider endpoints
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request timeout for hosted embedding APIs
pub const FAST_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for local embedding servers, which may be slow on large batches
pub const LOCAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for quick hosted API calls (embeddings).
pub fn create_fast_client() -> reqwest::Client {
    build_client(FAST_TIMEOUT)
}

/// Client for local model servers (Ollama).
pub fn create_local_client() -> reqwest::Client {
    build_client(LOCAL_TIMEOUT)
}

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(4)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to default HTTP client: {}", e);
            reqwest::Client::new()
        })
}
