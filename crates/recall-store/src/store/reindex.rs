// crates/recall-store/src/store/reindex.rs
// Rebuild vector entries from the Item Table

use super::Store;
use crate::db::{items, vectors};
use crate::error::{RecallError, Result};
use crate::namespace;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Items embedded and committed per transaction
const PAGE_SIZE: usize = 256;

/// Outcome of a rebuild
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReindexStats {
    pub items: usize,
    pub entries: usize,
}

/// (encoded namespace, key, [(entry path, vector)])
type PageEntries = Vec<(String, String, Vec<(String, Vec<f32>)>)>;

impl Store {
    /// Re-embed every item with the default field set and replace all of its
    /// vector entries. Per-write field overrides are not remembered.
    pub async fn reindex(&self) -> Result<ReindexStats> {
        self.ensure_ready()?;
        if self.index.is_none() {
            return Err(RecallError::Config(
                "reindex requires an index configuration".into(),
            ));
        }
        let _guard = self.batch_lock.lock().await;

        let stats = self.run_rebuild().await?;
        info!(items = stats.items, entries = stats.entries, "Reindex complete");
        Ok(stats)
    }

    /// Page through items in `(namespace, key)` order. Each page is embedded
    /// first, then committed in its own transaction.
    pub(super) async fn rebuild_index(&self) -> Result<ReindexStats> {
        let Some(index) = &self.index else {
            return Ok(ReindexStats::default());
        };

        let mut stats = ReindexStats::default();
        let mut after: Option<(String, String)> = None;

        loop {
            let cursor = after.clone();
            let page = self
                .pool
                .run(move |conn| items::items_page_sync(conn, cursor.as_ref(), PAGE_SIZE))
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some((namespace::encode(&last.namespace)?, last.key.clone()));

            let mut planned = Vec::with_capacity(page.len());
            for item in &page {
                let entries: Vec<(String, String)> = index
                    .default_fields
                    .iter()
                    .flat_map(|path| path.entries(&item.value))
                    .collect();
                planned.push((namespace::encode(&item.namespace)?, item.key.clone(), entries));
            }

            let texts: Vec<String> = planned
                .iter()
                .flat_map(|(_, _, entries)| entries.iter().map(|(_, text)| text.clone()))
                .collect();
            let documents = index
                .gateway
                .embed_documents(texts, self.dims.get().copied())
                .await?;

            if self.dims.get().is_none()
                && let Some(first) = documents.values().next()
            {
                self.create_vector_table(first.len()).await?;
            }

            let mut resolved: PageEntries = Vec::with_capacity(planned.len());
            for (encoded, key, entries) in planned {
                let with_vectors: Vec<(String, Vec<f32>)> = entries
                    .into_iter()
                    .filter_map(|(path, text)| documents.get(&text).map(|v| (path, v.clone())))
                    .collect();
                stats.entries += with_vectors.len();
                resolved.push((encoded, key, with_vectors));
            }

            let resolved = Arc::new(resolved);
            self.pool
                .run_with_retry(move |conn| -> Result<()> {
                    let tx = conn.unchecked_transaction()?;
                    for (encoded, key, entries) in resolved.iter() {
                        if entries.is_empty() {
                            vectors::delete_vector_entries_sync(&tx, encoded, key)?;
                        } else {
                            vectors::upsert_vector_entries_sync(&tx, encoded, key, entries)?;
                        }
                    }
                    tx.commit()?;
                    Ok(())
                })
                .await?;

            stats.items += page.len();
            debug!(items = stats.items, "Reindexed page");
            if page.len() < PAGE_SIZE {
                break;
            }
        }

        Ok(stats)
    }
}
