// crates/recall-store/src/store/batch.rs
// Batch commit: answer reads, apply writes, one transaction

use super::plan::{BatchPlan, PlannedOp, WriteAction};
use super::search::{list_namespaces_sync, run_search_sync};
use crate::db::{items, vectors};
use crate::error::{RecallError, Result};
use chrono::{DateTime, Utc};
use recall_types::OpResult;
use rusqlite::Connection;
use std::collections::HashMap;

/// Vectors computed before the transaction opens
#[derive(Debug, Default)]
pub(crate) struct Embedded {
    /// Query text -> vector. Empty when semantic search is unavailable.
    pub queries: HashMap<String, Vec<f32>>,
    /// Document text -> vector
    pub documents: HashMap<String, Vec<f32>>,
}

/// Run a planned batch inside one transaction.
///
/// Reads see the state before this batch. Any error rolls back every write.
pub(crate) fn commit_batch_sync(
    conn: &Connection,
    plan: &BatchPlan,
    embedded: &Embedded,
    now: DateTime<Utc>,
) -> Result<Vec<OpResult>> {
    let tx = conn.unchecked_transaction()?;

    let mut results = Vec::with_capacity(plan.ops.len());
    for op in &plan.ops {
        let result = match op {
            PlannedOp::Get(get) => OpResult::Get(items::get_item_sync(&tx, &get.namespace, &get.key)?),
            PlannedOp::Put => OpResult::Put,
            PlannedOp::Search(search) => {
                let query_vector = search
                    .query
                    .as_ref()
                    .and_then(|q| embedded.queries.get(q))
                    .map(Vec::as_slice);
                OpResult::Search(run_search_sync(&tx, search, query_vector)?)
            }
            PlannedOp::ListNamespaces(list) => {
                OpResult::ListNamespaces(list_namespaces_sync(&tx, list)?)
            }
        };
        results.push(result);
    }

    for write in &plan.writes {
        match &write.action {
            WriteAction::Delete => {
                vectors::delete_vector_entries_sync(&tx, &write.encoded, &write.key)?;
                items::delete_item_sync(&tx, &write.namespace, &write.key)?;
            }
            WriteAction::Upsert { value, entries } => {
                items::upsert_item_sync(&tx, &write.namespace, &write.key, value, now)?;
                if entries.is_empty() {
                    vectors::delete_vector_entries_sync(&tx, &write.encoded, &write.key)?;
                } else {
                    let with_vectors = entries
                        .iter()
                        .map(|(path, text)| {
                            embedded
                                .documents
                                .get(text)
                                .map(|v| (path.clone(), v.clone()))
                                .ok_or_else(|| {
                                    RecallError::Storage(format!(
                                        "no embedding computed for {}/{} path {}",
                                        write.namespace, write.key, path
                                    ))
                                })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    vectors::upsert_vector_entries_sync(
                        &tx,
                        &write.encoded,
                        &write.key,
                        &with_vectors,
                    )?;
                }
            }
        }
    }

    tx.commit()?;
    Ok(results)
}
