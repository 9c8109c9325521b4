// crates/recall-store/src/lib.rs
// Recall - namespaced key-value store with semantic search for agent memory

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod fields;
pub mod filter;
pub mod http;
pub mod namespace;
pub mod store;
pub mod utils;

pub use error::{RecallError, Result};
pub use recall_types as types;
pub use store::{IndexConfig, ReindexStats, Store, StoreOptions, StoreStats};
