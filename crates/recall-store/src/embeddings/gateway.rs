// crates/recall-store/src/embeddings/gateway.rs
// Dedupes texts, calls the embedder and validates what comes back

use super::Embedder;
use crate::error::{RecallError, Result};
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Text embedded once at setup to learn the vector size
const PROBE_TEXT: &str = "dimension probe";

/// Wraps an [`Embedder`] with the checks the store relies on.
#[derive(Clone)]
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingGateway {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn provider_id(&self) -> String {
        self.embedder.provider_id()
    }

    /// Embed every distinct text in one provider call.
    ///
    /// With `expected` unset, every vector must match the first one's length.
    pub async fn embed_documents<I>(
        &self,
        texts: I,
        expected: Option<usize>,
    ) -> Result<HashMap<String, Vec<f32>>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = texts
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if distinct.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Embedding {} distinct document texts", distinct.len());
        let vectors = self
            .embedder
            .embed_documents(&distinct)
            .await
            .map_err(|e| RecallError::Embedding(format!("{e:#}")))?;

        if vectors.len() != distinct.len() {
            return Err(RecallError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                distinct.len()
            )));
        }

        let mut expected = expected;
        for vector in &vectors {
            let expected = *expected.get_or_insert(vector.len());
            check_dimensions(vector, expected)?;
        }

        Ok(distinct.into_iter().zip(vectors).collect())
    }

    /// Embed each distinct query concurrently.
    pub async fn embed_queries<I>(&self, queries: I, expected: usize) -> Result<HashMap<String, Vec<f32>>>
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = queries
            .into_iter()
            .filter(|q| seen.insert(q.clone()))
            .collect();
        if distinct.is_empty() {
            return Ok(HashMap::new());
        }

        debug!("Embedding {} distinct queries", distinct.len());
        let vectors = try_join_all(distinct.iter().map(|q| self.embedder.embed_query(q)))
            .await
            .map_err(|e| RecallError::Embedding(format!("{e:#}")))?;

        for vector in &vectors {
            check_dimensions(vector, expected)?;
        }
        Ok(distinct.into_iter().zip(vectors).collect())
    }

    /// Learn the provider's vector size by embedding a short fixed text.
    pub async fn probe_dimensions(&self) -> Result<usize> {
        let vector = self
            .embedder
            .embed_query(PROBE_TEXT)
            .await
            .map_err(|e| RecallError::Embedding(format!("dimension probe failed: {e:#}")))?;
        if vector.is_empty() {
            return Err(RecallError::Embedding(
                "dimension probe returned an empty vector".into(),
            ));
        }
        Ok(vector.len())
    }
}

fn check_dimensions(vector: &[f32], expected: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(RecallError::Embedding("provider returned an empty vector".into()));
    }
    if vector.len() != expected {
        return Err(RecallError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}
