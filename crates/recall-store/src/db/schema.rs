// crates/recall-store/src/db/schema.rs
// Database schema, lazy vector table and provider change detection

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

/// Name of the sqlite-vec virtual table holding item embeddings
pub const VEC_TABLE: &str = "vec_store";

/// `store_state` key recording which embedding provider produced the vectors
pub const EMBEDDING_PROVIDER_KEY: &str = "embedding_provider";

/// `store_state` key present while vector entries were invalidated and the
/// rebuild from the Item Table has not completed
pub const REBUILD_PENDING_KEY: &str = "rebuild_pending";

const SCHEMA: &str = r#"
-- Item Table: system of record
CREATE TABLE IF NOT EXISTS store_items (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, key)
);

-- Vector entries, joined to vec_store by rowid = id
CREATE TABLE IF NOT EXISTS store_vectors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    path TEXT NOT NULL,
    UNIQUE (namespace, key, path)
);

CREATE TABLE IF NOT EXISTS store_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Create base tables. Idempotent, safe to run from concurrent processes.
///
/// The vector table is not created here: its width depends on the embedding
/// dimension, which may not be known yet.
pub fn run_all_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Read a `store_state` value - sync version for pool.interact()
pub fn get_state_sync(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM store_state WHERE key = ?",
        [key],
        |row| row.get(0),
    )
    .optional()
}

/// Upsert a `store_state` value - sync version for pool.interact()
pub fn set_state_sync(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO store_state (key, value, updated_at)
         VALUES (?, ?, CURRENT_TIMESTAMP)
         ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            updated_at = CURRENT_TIMESTAMP",
        params![key, value],
    )?;
    Ok(())
}

/// Remove a `store_state` value - sync version for pool.interact()
pub fn clear_state_sync(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM store_state WHERE key = ?", [key])?;
    Ok(())
}

/// True while an invalidated index still has to be rebuilt.
pub fn rebuild_pending_sync(conn: &Connection) -> rusqlite::Result<bool> {
    Ok(get_state_sync(conn, REBUILD_PENDING_KEY)?.is_some())
}

/// DDL for the vector table at a given dimension.
pub fn vec_store_create_sql(dims: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS {VEC_TABLE} USING vec0(\
             embedding float[{dims}] distance_metric=cosine\
         )"
    )
}

/// Dimension of the existing vector table, parsed from its DDL.
pub fn current_vec_store_dims(conn: &Connection) -> Option<usize> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
        [VEC_TABLE],
        |row| {
            let sql: String = row.get(0)?;
            // DDL looks like "embedding float[1536] distance_metric=cosine"
            if let Some(start) = sql.find("float[") {
                let rest = &sql[start + 6..];
                if let Some(end) = rest.find(']')
                    && let Ok(dim) = rest[..end].parse::<usize>()
                {
                    return Ok(Some(dim));
                }
            }
            Ok(None)
        },
    )
    .unwrap_or(None)
}

/// Outcome of [`ensure_vector_table`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VecTableStatus {
    /// Table already existed with the requested dimension
    Ready,
    /// Table did not exist and was created
    Created,
    /// Table existed with another dimension; it was dropped, recreated and
    /// all vector entries were cleared
    Recreated { previous_dims: usize },
}

impl VecTableStatus {
    /// True when existing items need their vectors rebuilt.
    pub fn needs_rebuild(&self) -> bool {
        matches!(self, Self::Recreated { .. })
    }
}

/// Ensure the vector table exists with `target_dims` columns.
pub fn ensure_vector_table(conn: &Connection, target_dims: usize) -> Result<VecTableStatus> {
    match current_vec_store_dims(conn) {
        Some(dim) if dim == target_dims => Ok(VecTableStatus::Ready),
        Some(dim) => {
            tracing::info!(
                "{} dimensions mismatch ({} -> {}), recreating table",
                VEC_TABLE,
                dim,
                target_dims
            );
            let tx = conn.unchecked_transaction()?;
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {VEC_TABLE}"))?;
            tx.execute_batch(&vec_store_create_sql(target_dims))?;
            tx.execute("DELETE FROM store_vectors", [])?;
            set_state_sync(&tx, REBUILD_PENDING_KEY, "1")?;
            tx.commit()?;
            Ok(VecTableStatus::Recreated { previous_dims: dim })
        }
        None => {
            tracing::info!("Creating {} with {} dimensions", VEC_TABLE, target_dims);
            conn.execute_batch(&vec_store_create_sql(target_dims))?;
            Ok(VecTableStatus::Created)
        }
    }
}

/// Check if the embedding provider changed and invalidate vectors if so.
///
/// Invalidation marks a pending rebuild in the same transaction, so a rebuild
/// that fails later is retried on the next setup.
///
/// On first use the provider is recorded without touching anything unless
/// vector entries already exist (written by an unknown provider). Returns
/// `true` if vector entries were cleared and need rebuilding.
pub fn check_embedding_provider_change(conn: &Connection, current_provider: &str) -> Result<bool> {
    let stored = get_state_sync(conn, EMBEDDING_PROVIDER_KEY)?;

    if stored.as_deref() == Some(current_provider) {
        return Ok(false);
    }

    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM store_vectors", [], |r| r.get(0))?;
    if stored.is_none() && existing == 0 {
        set_state_sync(conn, EMBEDDING_PROVIDER_KEY, current_provider)?;
        return Ok(false);
    }

    tracing::info!(
        "Embedding provider changed ({} -> {}), clearing {} vector entries",
        stored.as_deref().unwrap_or("unknown"),
        current_provider,
        existing
    );

    let tx = conn.unchecked_transaction()?;
    super::vectors::clear_all_sync(&tx)?;
    set_state_sync(&tx, EMBEDDING_PROVIDER_KEY, current_provider)?;
    set_state_sync(&tx, REBUILD_PENDING_KEY, "1")?;
    tx.commit()?;

    Ok(true)
}
