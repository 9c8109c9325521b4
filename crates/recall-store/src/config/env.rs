// crates/recall-store/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// API keys loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// OpenAI API key (OPENAI_API_KEY)
    pub openai: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables
    pub fn from_env() -> Self {
        let keys = Self {
            openai: Self::read_key("OPENAI_API_KEY"),
        };
        keys.log_status();
        keys
    }

    /// Read a single API key from environment, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Log which API keys are available (without exposing values)
    fn log_status(&self) {
        if self.openai.is_some() {
            debug!(keys = ?["OpenAI"], "API keys loaded");
        } else {
            debug!("No OPENAI_API_KEY set");
        }
    }

    /// Get a summary of available providers
    pub fn summary(&self) -> String {
        if self.openai.is_some() {
            "OpenAI".to_string()
        } else {
            "None".to_string()
        }
    }
}

/// Embeddings configuration from environment variables
#[derive(Debug, Clone, Default)]
pub struct EmbeddingsConfig {
    /// Embedding dimension override (RECALL_EMBEDDING_DIMENSIONS)
    pub dimensions: Option<usize>,
    /// Ollama endpoint (OLLAMA_HOST)
    pub ollama_host: Option<String>,
}

impl EmbeddingsConfig {
    /// Load embeddings configuration from environment variables
    pub fn from_env() -> Self {
        let dimensions = std::env::var("RECALL_EMBEDDING_DIMENSIONS")
            .ok()
            .and_then(|d| match d.trim().parse() {
                Ok(dims) => Some(dims),
                Err(_) => {
                    warn!(value = %d, "Invalid RECALL_EMBEDDING_DIMENSIONS, ignoring");
                    None
                }
            });

        if let Some(dims) = dimensions {
            debug!(dimensions = dims, "Custom embedding dimensions configured");
        }

        Self {
            dimensions,
            ollama_host: std::env::var("OLLAMA_HOST")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|s| normalize_ollama_host(&s)),
        }
    }
}

/// `OLLAMA_HOST` is often set as a bare `host:port`
fn normalize_ollama_host(host: &str) -> String {
    let host = host.trim();
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

/// Configuration validation result
#[derive(Debug)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: ConfigValidation) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// API keys for embedding providers
    pub api_keys: ApiKeys,
    /// Embeddings configuration
    pub embeddings: EmbeddingsConfig,
    /// Database file (DATABASE_URL or RECALL_DB_PATH)
    pub db_path: PathBuf,
    /// Config file override (RECALL_CONFIG)
    pub config_path: Option<PathBuf>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");

        let db_path = std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(|url| parse_database_url(&url))
            .or_else(|| {
                std::env::var("RECALL_DB_PATH")
                    .ok()
                    .filter(|s| !s.trim().is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(default_db_path);

        Self {
            api_keys: ApiKeys::from_env(),
            embeddings: EmbeddingsConfig::from_env(),
            db_path,
            config_path: std::env::var("RECALL_CONFIG")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if self.embeddings.dimensions == Some(0) {
            validation.add_error("RECALL_EMBEDDING_DIMENSIONS must be greater than zero");
        }

        if let Some(parent) = self.db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            validation.add_warning(format!(
                "Database directory {} does not exist yet and will be created",
                parent.display()
            ));
        }

        validation
    }
}

/// Accepts `sqlite:///abs/path`, `sqlite+aiosqlite:///abs/path` or a bare path.
pub fn parse_database_url(url: &str) -> PathBuf {
    let url = url.trim();
    let rest = ["sqlite+aiosqlite://", "sqlite://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .unwrap_or(url);
    PathBuf::from(rest)
}

/// `~/.recall/recall.db`
pub fn default_db_path() -> PathBuf {
    recall_home().join("recall.db")
}

/// `~/.recall`, falling back to the working directory without a home dir
pub fn recall_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".recall")
}

/// Create the parent directory of a database file if needed.
pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys_summary() {
        let keys = ApiKeys::default();
        assert_eq!(keys.summary(), "None");

        let keys = ApiKeys {
            openai: Some("sk-test".to_string()),
        };
        assert_eq!(keys.summary(), "OpenAI");
    }

    #[test]
    fn test_parse_database_url() {
        assert_eq!(
            parse_database_url("sqlite:///var/lib/recall/store.db"),
            PathBuf::from("/var/lib/recall/store.db")
        );
        assert_eq!(
            parse_database_url("sqlite+aiosqlite:///tmp/x.db"),
            PathBuf::from("/tmp/x.db")
        );
        assert_eq!(parse_database_url("data/x.db"), PathBuf::from("data/x.db"));
        assert_eq!(parse_database_url("sqlite://x.db"), PathBuf::from("x.db"));
    }

    #[test]
    fn test_normalize_ollama_host() {
        assert_eq!(normalize_ollama_host("gpu:11434"), "http://gpu:11434");
        assert_eq!(
            normalize_ollama_host("https://ollama.internal"),
            "https://ollama.internal"
        );
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with(".recall/recall.db"));
    }

    #[test]
    fn test_validation_zero_dims() {
        let config = EnvConfig {
            api_keys: ApiKeys::default(),
            embeddings: EmbeddingsConfig {
                dimensions: Some(0),
                ollama_host: None,
            },
            db_path: PathBuf::from("recall.db"),
            config_path: None,
        };
        let validation = config.validate();
        assert!(!validation.is_valid());
        assert!(validation.report().starts_with("Errors:"));
    }

    #[test]
    fn test_validation_ok() {
        let config = EnvConfig {
            api_keys: ApiKeys::default(),
            embeddings: EmbeddingsConfig::default(),
            db_path: PathBuf::from("recall.db"),
            config_path: None,
        };
        let validation = config.validate();
        assert!(validation.is_valid());
        assert_eq!(validation.report(), "Configuration OK");
    }

    #[test]
    fn test_merge() {
        let mut a = ConfigValidation::new();
        a.add_warning("w1");
        let mut b = ConfigValidation::new();
        b.add_error("e1");
        a.merge(b);
        assert!(!a.is_valid());
        assert_eq!(a.warnings.len(), 1);
    }
}
