// crates/recall-store/src/db/vectors.rs
// Vector Index: per-path entries in store_vectors, embeddings in vec_store

use super::schema::VEC_TABLE;
use crate::error::Result;
use crate::utils::embedding_to_bytes;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::HashMap;

/// sqlite-vec refuses KNN queries deeper than this
pub const MAX_KNN: usize = 4096;

/// One nearest-neighbour candidate
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Encoded namespace
    pub namespace: String,
    pub key: String,
    pub path: String,
    pub distance: f64,
}

/// Replace every vector entry of an item with `entries`.
///
/// Paths are unique per item; a repeated path keeps its last vector.
/// Requires the vector table to exist.
pub fn upsert_vector_entries_sync(
    conn: &Connection,
    namespace: &str,
    key: &str,
    entries: &[(String, Vec<f32>)],
) -> Result<()> {
    delete_vector_entries_sync(conn, namespace, key)?;

    let mut latest: HashMap<&str, &[f32]> = HashMap::with_capacity(entries.len());
    let mut order: Vec<&str> = Vec::with_capacity(entries.len());
    for (path, embedding) in entries {
        if latest.insert(path.as_str(), embedding.as_slice()).is_none() {
            order.push(path.as_str());
        }
    }

    let mut insert_entry = conn.prepare_cached(
        "INSERT INTO store_vectors (namespace, key, path) VALUES (?1, ?2, ?3)",
    )?;
    let mut insert_vector = conn.prepare_cached(&format!(
        "INSERT INTO {VEC_TABLE} (rowid, embedding) VALUES (?1, ?2)"
    ))?;

    for path in order {
        let Some(embedding) = latest.get(path) else {
            continue;
        };
        insert_entry.execute(params![namespace, key, path])?;
        let rowid = conn.last_insert_rowid();
        insert_vector.execute(params![rowid, embedding_to_bytes(embedding)])?;
    }
    Ok(())
}

/// Remove every vector entry of an item. Returns how many were removed.
///
/// Safe to call before the vector table exists: with no entries there is
/// nothing to remove from it.
pub fn delete_vector_entries_sync(conn: &Connection, namespace: &str, key: &str) -> Result<usize> {
    let ids: Vec<i64> = {
        let mut stmt = conn
            .prepare_cached("SELECT id FROM store_vectors WHERE namespace = ?1 AND key = ?2")?;
        let ids = stmt
            .query_map(params![namespace, key], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        ids
    };
    if ids.is_empty() {
        return Ok(0);
    }

    let mut delete_vector =
        conn.prepare_cached(&format!("DELETE FROM {VEC_TABLE} WHERE rowid = ?1"))?;
    for id in &ids {
        delete_vector.execute([id])?;
    }
    conn.execute(
        "DELETE FROM store_vectors WHERE namespace = ?1 AND key = ?2",
        params![namespace, key],
    )?;
    Ok(ids.len())
}

/// The `k` nearest entries to `query`, nearest first. `k` is capped at [`MAX_KNN`].
pub fn knn_sync(conn: &Connection, query: &[f32], k: usize) -> Result<Vec<VectorHit>> {
    let k = k.min(MAX_KNN);
    if k == 0 {
        return Ok(Vec::new());
    }

    let candidates: Vec<(i64, f64)> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, distance FROM {VEC_TABLE}
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance"
        ))?;
        let rows = stmt
            .query_map(params![embedding_to_bytes(query), k as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut lookup = conn
        .prepare_cached("SELECT namespace, key, path FROM store_vectors WHERE id = ?1")?;
    let mut hits = Vec::with_capacity(candidates.len());
    for (rowid, distance) in candidates {
        let entry: Option<(String, String, String)> = lookup
            .query_row([rowid], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
            .optional()?;
        match entry {
            Some((namespace, key, path)) => hits.push(VectorHit {
                namespace,
                key,
                path,
                distance,
            }),
            None => tracing::debug!("vector {} has no entry row, skipping", rowid),
        }
    }
    Ok(hits)
}

/// Remove all vector entries (provider change, table rebuild).
pub fn clear_all_sync(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM store_vectors", [])?;
    if super::schema::current_vec_store_dims(conn).is_some() {
        conn.execute(&format!("DELETE FROM {VEC_TABLE}"), [])?;
    }
    Ok(())
}

/// Entry paths of one item, sorted.
pub fn entry_paths_sync(conn: &Connection, namespace: &str, key: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT path FROM store_vectors WHERE namespace = ?1 AND key = ?2 ORDER BY path",
    )?;
    let paths = stmt
        .query_map(params![namespace, key], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(paths)
}

/// Total number of vector entries.
pub fn count_entries_sync(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM store_vectors", [], |r| r.get(0))?;
    Ok(count as usize)
}
