// crates/recall-store/src/db/items.rs
// Item Table: namespace + key -> JSON value with timestamps

use crate::error::{RecallError, Result};
use crate::namespace::{self, NamespacePrefix};
use crate::utils::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use recall_types::{Item, Namespace};
use rusqlite::{Connection, OptionalExtension, params};
use std::ops::ControlFlow;

const ITEM_COLUMNS: &str = "namespace, key, value, created_at, updated_at";

/// Item row as stored, before decoding
struct RawItem {
    namespace: String,
    key: String,
    value: String,
    created_at: String,
    updated_at: String,
}

impl RawItem {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            namespace: row.get(0)?,
            key: row.get(1)?,
            value: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    }

    fn into_item(self) -> Result<Item> {
        let timestamp = |raw: &str| {
            parse_timestamp(raw)
                .ok_or_else(|| RecallError::Storage(format!("corrupt timestamp {raw:?}")))
        };
        Ok(Item {
            namespace: namespace::decode(&self.namespace)?,
            value: serde_json::from_str(&self.value)?,
            created_at: timestamp(&self.created_at)?,
            updated_at: timestamp(&self.updated_at)?,
            key: self.key,
        })
    }
}

/// Point lookup - sync version for pool.interact()
pub fn get_item_sync(conn: &Connection, ns: &Namespace, key: &str) -> Result<Option<Item>> {
    let encoded = namespace::encode(ns)?;
    let raw = conn
        .query_row(
            &format!("SELECT {ITEM_COLUMNS} FROM store_items WHERE namespace = ?1 AND key = ?2"),
            params![encoded, key],
            RawItem::from_row,
        )
        .optional()?;
    raw.map(RawItem::into_item).transpose()
}

/// Insert or fully replace an item's value.
///
/// `created_at` is kept on update. `updated_at` becomes `max(now, previous + 1µs)`
/// so it strictly increases even when the clock does not.
pub fn upsert_item_sync(
    conn: &Connection,
    ns: &Namespace,
    key: &str,
    value: &serde_json::Value,
    now: DateTime<Utc>,
) -> Result<()> {
    let encoded = namespace::encode(ns)?;
    let now = now.trunc_subsecs(6);

    let previous: Option<String> = conn
        .query_row(
            "SELECT updated_at FROM store_items WHERE namespace = ?1 AND key = ?2",
            params![encoded, key],
            |row| row.get(0),
        )
        .optional()?;

    let updated_at = match previous.as_deref().and_then(parse_timestamp) {
        Some(prev) if prev >= now => prev + Duration::microseconds(1),
        _ => now,
    };
    let stamp = format_timestamp(&updated_at);

    conn.execute(
        "INSERT INTO store_items (namespace, key, value, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(namespace, key) DO UPDATE SET
            value = excluded.value,
            updated_at = excluded.updated_at",
        params![encoded, key, serde_json::to_string(value)?, stamp],
    )?;
    Ok(())
}

/// Remove an item row. Returns whether a row existed.
pub fn delete_item_sync(conn: &Connection, ns: &Namespace, key: &str) -> Result<bool> {
    let encoded = namespace::encode(ns)?;
    let deleted = conn.execute(
        "DELETE FROM store_items WHERE namespace = ?1 AND key = ?2",
        params![encoded, key],
    )?;
    Ok(deleted > 0)
}

/// Visit every item under `prefix` in `(namespace, key)` order until `visit`
/// breaks.
pub fn scan_items_sync<F>(conn: &Connection, prefix: &Namespace, mut visit: F) -> Result<()>
where
    F: FnMut(Item) -> ControlFlow<()>,
{
    let prefix = NamespacePrefix::new(prefix)?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM store_items
         WHERE namespace LIKE ?1 ESCAPE '\\'
         ORDER BY namespace, key"
    ))?;
    let mut rows = stmt.query([prefix.like_pattern()])?;

    while let Some(row) = rows.next()? {
        let raw = RawItem::from_row(row)?;
        // LIKE folds ASCII case
        if !prefix.matches_encoded(&raw.namespace) {
            continue;
        }
        if visit(raw.into_item()?).is_break() {
            break;
        }
    }
    Ok(())
}

/// Distinct namespaces that currently hold at least one item.
pub fn list_distinct_namespaces_sync(conn: &Connection) -> Result<Vec<Namespace>> {
    let mut stmt = conn.prepare("SELECT DISTINCT namespace FROM store_items")?;
    let encoded = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    encoded.iter().map(|e| namespace::decode(e)).collect()
}

/// Keyset page of items ordered by `(namespace, key)`, starting after `after`
/// (encoded namespace, key). Used by reindexing.
pub fn items_page_sync(
    conn: &Connection,
    after: Option<&(String, String)>,
    limit: usize,
) -> Result<Vec<Item>> {
    let (after_ns, after_key) = match after {
        Some((ns, key)) => (ns.as_str(), key.as_str()),
        None => ("", ""),
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {ITEM_COLUMNS} FROM store_items
         WHERE (namespace, key) > (?1, ?2)
         ORDER BY namespace, key
         LIMIT ?3"
    ))?;
    let raws = stmt
        .query_map(params![after_ns, after_key, limit as i64], RawItem::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawItem::into_item).collect()
}

/// Total number of stored items.
pub fn count_items_sync(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM store_items", [], |r| r.get(0))?;
    Ok(count as usize)
}
