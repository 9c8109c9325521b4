// crates/recall-store/src/db/test_support.rs
// Shared test helpers for database tests

use super::pool::ensure_sqlite_vec_registered;
use super::schema::run_all_migrations;
use rusqlite::Connection;

/// Plain in-memory connection with sqlite-vec loaded and the base schema,
/// for sync-function tests that don't need a pool.
pub fn bare_conn() -> Connection {
    ensure_sqlite_vec_registered();
    let conn = Connection::open_in_memory().expect("Failed to open in-memory connection");
    run_all_migrations(&conn).expect("Failed to create schema");
    conn
}
