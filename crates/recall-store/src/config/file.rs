// crates/recall-store/src/config/file.rs
// File-based configuration (recall.toml / recall.json / ~/.recall/config.toml)

use super::env::recall_home;
use crate::error::{RecallError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config structure
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct RecallConfig {
    #[serde(default)]
    pub store: StoreSection,
}

/// `[store]` section
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct StoreSection {
    /// Absent means a plain KV store without semantic search
    pub index: Option<IndexSection>,
}

/// `[store.index]` section
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct IndexSection {
    /// Embedding dimensions; probed from the provider when unset
    pub dims: Option<usize>,
    /// `"<provider>:<model>"`, e.g. `openai:text-embedding-3-small`
    pub embed: String,
    /// Field paths to embed; defaults to the whole value
    pub fields: Option<Vec<String>>,
}

impl RecallConfig {
    /// Load the first config file found.
    ///
    /// An explicit path (argument, then `env_path`) must exist. Without one,
    /// `./recall.toml`, `./recall.json` and `~/.recall/config.toml` are tried
    /// in that order, and finding none yields the default config.
    pub fn load(explicit: Option<&Path>, env_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit.or(env_path) {
            return Self::load_from(path);
        }

        for path in Self::candidate_paths() {
            if path.is_file() {
                return Self::load_from(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse a config file, TOML unless the extension is `.json`
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecallError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
        .map_err(|e| RecallError::Config(format!("{}: {e}", path.display())))?;

        debug!(path = %path.display(), "Loaded config from file");
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    pub fn from_json_str(contents: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(contents).map_err(|e| e.to_string())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from("recall.toml"),
            PathBuf::from("recall.json"),
            recall_home().join("config.toml"),
        ]
    }

    pub fn index(&self) -> Option<&IndexSection> {
        self.store.index.as_ref()
    }
}
