// crates/recall-store/src/config/mod.rs
// Configuration: environment, config file and index resolution

pub mod env;
pub mod file;

pub use env::{ApiKeys, ConfigValidation, EmbeddingsConfig, EnvConfig};
pub use file::{IndexSection, RecallConfig, StoreSection};

use crate::embeddings::{EmbedderSpec, EmbeddingProvider, embedder_from_spec};
use crate::error::{RecallError, Result};
use crate::fields::{self, ROOT_PATH};
use crate::store::IndexConfig;
use tracing::info;

/// Build the store's index configuration from the config file and environment.
///
/// Returns `None` when no `[store.index]` section exists. Dimensions come from
/// the file, then `RECALL_EMBEDDING_DIMENSIONS`.
pub fn resolve_index_config(file: &RecallConfig, env: &EnvConfig) -> Result<Option<IndexConfig>> {
    let Some(section) = file.index() else {
        return Ok(None);
    };

    let spec = EmbedderSpec::parse(&section.embed)?;
    let dims = section.dims.or(env.embeddings.dimensions);
    if dims == Some(0) {
        return Err(RecallError::Config("index dims must be greater than zero".into()));
    }

    let fields = section
        .fields
        .clone()
        .unwrap_or_else(|| vec![ROOT_PATH.to_string()]);
    fields::parse_all(&fields)?;

    let embedder = embedder_from_spec(
        &spec,
        &env.api_keys,
        env.embeddings.ollama_host.as_deref(),
        dims,
    )?;
    info!(
        provider = %embedder.provider_id(),
        dims = ?dims,
        fields = ?fields,
        "Index configuration resolved"
    );

    Ok(Some(IndexConfig {
        embedder,
        dims,
        fields,
    }))
}

/// Validate environment and index settings without building anything.
pub fn validate(file: &RecallConfig, env: &EnvConfig) -> ConfigValidation {
    let mut validation = env.validate();

    let Some(section) = file.index() else {
        validation.add_warning("No [store.index] configured: semantic search is disabled");
        return validation;
    };

    match EmbedderSpec::parse(&section.embed) {
        Ok(spec) => {
            if spec.provider == EmbeddingProvider::OpenAi && env.api_keys.openai.is_none() {
                validation.add_warning(
                    "Index uses openai embeddings but OPENAI_API_KEY is not set",
                );
            }
        }
        Err(e) => validation.add_error(e.to_string()),
    }

    if section.dims == Some(0) {
        validation.add_error("store.index.dims must be greater than zero");
    }

    if let Some(fields) = &section.fields {
        if fields.is_empty() {
            validation.add_warning("store.index.fields is empty: nothing will be embedded");
        }
        if let Err(e) = fields::parse_all(fields) {
            validation.add_error(e.to_string());
        }
    }

    validation
}
