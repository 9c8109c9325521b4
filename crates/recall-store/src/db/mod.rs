// crates/recall-store/src/db/mod.rs
// SQLite persistence: Item Table, Vector Index and their schema

pub mod items;
pub mod pool;
pub mod schema;
pub mod vectors;

#[cfg(test)]
pub mod test_support;

pub use pool::{DatabasePool, DbStorage, ensure_sqlite_vec_registered, is_rusqlite_contention};
pub use schema::{
    EMBEDDING_PROVIDER_KEY, REBUILD_PENDING_KEY, VEC_TABLE, VecTableStatus,
    check_embedding_provider_change, clear_state_sync, current_vec_store_dims,
    ensure_vector_table, get_state_sync, rebuild_pending_sync, set_state_sync,
};
pub use vectors::{MAX_KNN, VectorHit};
