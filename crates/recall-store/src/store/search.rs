// crates/recall-store/src/store/search.rs
// Search and namespace listing over one connection

use super::plan::PlannedSearch;
use crate::db::{MAX_KNN, items, vectors};
use crate::error::Result;
use crate::namespace::{self, NamespacePrefix};
use crate::utils::distance_to_score;
use recall_types::{ListNamespacesOp, Namespace, SearchItem};
use rusqlite::Connection;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::ops::ControlFlow;
use tracing::debug;

/// Nearest-neighbour candidates fetched per requested result
pub const OVERFETCH_FACTOR: usize = 5;

/// Run one search. `query_vector` selects the semantic path.
pub(crate) fn run_search_sync(
    conn: &Connection,
    search: &PlannedSearch,
    query_vector: Option<&[f32]>,
) -> Result<Vec<SearchItem>> {
    if search.limit == 0 {
        return Ok(Vec::new());
    }
    match query_vector {
        Some(vector) => semantic_search_sync(conn, search, vector),
        None => filter_search_sync(conn, search),
    }
}

/// Scan items under the prefix in `(namespace, key)` order and page over the
/// filtered matches.
fn filter_search_sync(conn: &Connection, search: &PlannedSearch) -> Result<Vec<SearchItem>> {
    let mut skipped = 0;
    let mut results = Vec::with_capacity(search.limit.min(64));

    items::scan_items_sync(conn, &search.prefix, |item| {
        if search.filter.as_ref().is_some_and(|f| !f.matches(&item.value)) {
            return ControlFlow::Continue(());
        }
        if skipped < search.offset {
            skipped += 1;
            return ControlFlow::Continue(());
        }
        results.push(SearchItem { item, score: None });
        if results.len() >= search.limit {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;

    Ok(results)
}

/// Overfetch nearest neighbours, keep each item's best score, then prune by
/// namespace and filter before paging.
///
/// Candidates pruned away still count toward the overfetch depth, so a very
/// selective prefix or filter can return fewer than `limit` results.
fn semantic_search_sync(
    conn: &Connection,
    search: &PlannedSearch,
    query: &[f32],
) -> Result<Vec<SearchItem>> {
    let wanted = search.offset.saturating_add(search.limit);
    let fetch_k = wanted.saturating_mul(OVERFETCH_FACTOR).min(MAX_KNN);
    let hits = vectors::knn_sync(conn, query, fetch_k)?;
    debug!(
        "Semantic search fetched {} candidates (k={})",
        hits.len(),
        fetch_k
    );

    let prefix = NamespacePrefix::new(&search.prefix)?;
    let mut best: HashMap<(String, String), f64> = HashMap::new();
    for hit in hits {
        if !prefix.matches_encoded(&hit.namespace) {
            continue;
        }
        let score = distance_to_score(hit.distance);
        best.entry((hit.namespace, hit.key))
            .and_modify(|s| *s = s.max(score))
            .or_insert(score);
    }

    let mut results = Vec::with_capacity(best.len());
    for ((encoded, key), score) in best {
        let ns = namespace::decode(&encoded)?;
        let Some(item) = items::get_item_sync(conn, &ns, &key)? else {
            continue;
        };
        if search.filter.as_ref().is_some_and(|f| !f.matches(&item.value)) {
            continue;
        }
        results.push(SearchItem {
            item,
            score: Some(score),
        });
    }

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.item.namespace.cmp(&b.item.namespace))
            .then_with(|| a.item.key.cmp(&b.item.key))
    });

    Ok(results
        .into_iter()
        .skip(search.offset)
        .take(search.limit)
        .collect())
}

/// Distinct namespaces matching every condition, truncated to `max_depth`,
/// sorted and paged.
pub(crate) fn list_namespaces_sync(conn: &Connection, op: &ListNamespacesOp) -> Result<Vec<Namespace>> {
    let all = items::list_distinct_namespaces_sync(conn)?;

    let unique: BTreeSet<Namespace> = all
        .into_iter()
        .filter(|ns| namespace::matches_all(&op.match_conditions, ns))
        .map(|ns| match op.max_depth {
            Some(depth) => ns.truncated(depth),
            None => ns,
        })
        .collect();

    Ok(unique
        .into_iter()
        .skip(op.offset)
        .take(op.limit)
        .collect())
}
