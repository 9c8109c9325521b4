// crates/recall-store/src/store/mod.rs
// Store facade: setup, batched operations and convenience wrappers
//
// A batch runs in three phases:
//   1. plan    - validate, parse filters and field paths, de-duplicate puts
//   2. embed   - distinct queries and document texts, outside any transaction
//   3. commit  - one transaction answers reads, then applies writes

mod batch;
mod plan;
mod reindex;
mod search;

pub use plan::operations_from_json;
pub use reindex::ReindexStats;
pub use search::OVERFETCH_FACTOR;

use crate::db::{self, DatabasePool, DbStorage, VecTableStatus};
use crate::embeddings::{Embedder, EmbeddingGateway};
use crate::error::{RecallError, Result};
use crate::fields::{self, FieldPath, ROOT_PATH};
use batch::{Embedded, commit_batch_sync};
use chrono::Utc;
use plan::BatchPlan;
use recall_types::{
    GetOp, IndexMode, Item, ListNamespacesOp, Namespace, OpResult, Operation, PutOp, SearchItem,
    SearchOp,
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

/// Semantic index settings, fixed for the lifetime of a store.
#[derive(Clone)]
pub struct IndexConfig {
    pub embedder: Arc<dyn Embedder>,
    /// Vector size; learned from the provider when `None`
    pub dims: Option<usize>,
    /// Field paths embedded by default (`["$"]` embeds the whole value)
    pub fields: Vec<String>,
}

impl IndexConfig {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            dims: None,
            fields: vec![ROOT_PATH.to_string()],
        }
    }

    pub fn dims(mut self, dims: usize) -> Self {
        self.dims = Some(dims);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexConfig")
            .field("provider", &self.embedder.provider_id())
            .field("dims", &self.dims)
            .field("fields", &self.fields)
            .finish()
    }
}

/// How to open a [`Store`]
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub storage: DbStorage,
    pub index: Option<IndexConfig>,
}

impl StoreOptions {
    pub fn in_memory() -> Self {
        Self {
            storage: DbStorage::InMemory,
            index: None,
        }
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            storage: DbStorage::File(path.as_ref().to_path_buf()),
            index: None,
        }
    }

    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = Some(index);
        self
    }
}

/// Resolved index state
struct IndexState {
    gateway: EmbeddingGateway,
    default_fields: Vec<FieldPath>,
    configured_dims: Option<usize>,
}

/// Counts reported by [`Store::stats`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub items: usize,
    pub vector_entries: usize,
    pub dims: Option<usize>,
    pub provider: Option<String>,
    pub semantic_search: bool,
}

/// Namespaced key-value store with optional semantic search.
///
/// Call [`setup`](Self::setup) once before issuing operations. Batches run
/// one at a time per store.
pub struct Store {
    pool: Arc<DatabasePool>,
    index: Option<IndexState>,
    /// Frozen once known (configured, found on disk, probed or first embed)
    dims: OnceLock<usize>,
    setup: OnceCell<()>,
    batch_lock: Mutex<()>,
    /// Set while invalidated vector entries may still need a rebuild
    rebuild_outstanding: AtomicBool,
}

impl Store {
    /// Open the database and validate the index configuration.
    pub async fn new(options: StoreOptions) -> Result<Self> {
        let index = options
            .index
            .map(|config| -> Result<IndexState> {
                if config.dims == Some(0) {
                    return Err(RecallError::Config("index dims must be greater than zero".into()));
                }
                Ok(IndexState {
                    gateway: EmbeddingGateway::new(config.embedder),
                    default_fields: fields::parse_all(&config.fields)?,
                    configured_dims: config.dims,
                })
            })
            .transpose()?;

        let pool = DatabasePool::open_storage(options.storage).await?;

        Ok(Self {
            pool: Arc::new(pool),
            index,
            dims: OnceLock::new(),
            setup: OnceCell::new(),
            batch_lock: Mutex::new(()),
            rebuild_outstanding: AtomicBool::new(false),
        })
    }

    /// Plain KV store in memory, already set up
    pub async fn in_memory() -> Result<Self> {
        let store = Self::new(StoreOptions::in_memory()).await?;
        store.setup().await?;
        Ok(store)
    }

    /// Prepare the vector index. Idempotent.
    ///
    /// Resolves the embedding dimension (configured, existing table, then a
    /// probe), creates the vector table and rebuilds vectors when the provider
    /// or dimension changed. A failed probe leaves semantic search unavailable
    /// until the first successful document embedding.
    pub async fn setup(&self) -> Result<()> {
        self.setup.get_or_try_init(|| self.initialize()).await?;
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        let Some(index) = &self.index else {
            info!("Store ready (no index configured, semantic search disabled)");
            return Ok(());
        };

        let provider = index.gateway.provider_id();
        let provider_changed = {
            let provider = provider.clone();
            self.pool
                .interact(move |conn| db::check_embedding_provider_change(conn, &provider))
                .await?
        };
        let existing_dims = self
            .pool
            .interact(|conn| Ok(db::current_vec_store_dims(conn)))
            .await?;

        let dims = match (index.configured_dims, existing_dims) {
            (Some(configured), _) => Some(configured),
            (None, Some(existing)) if !provider_changed => Some(existing),
            _ => match index.gateway.probe_dimensions().await {
                Ok(probed) => {
                    info!(provider = %provider, dims = probed, "Detected embedding dimensions");
                    Some(probed)
                }
                Err(e) => {
                    warn!("Semantic search unavailable until embeddings succeed: {}", e);
                    None
                }
            },
        };

        let Some(dims) = dims else {
            self.rebuild_outstanding.store(true, Ordering::SeqCst);
            return Ok(());
        };

        let status = self.create_vector_table(dims).await?;
        info!(provider = %provider, dims, ?status, provider_changed, "Store ready");
        self.finish_rebuild(status).await
    }

    /// Rebuild vector entries when they were invalidated or never written.
    async fn finish_rebuild(&self, status: VecTableStatus) -> Result<()> {
        let (pending, item_count) = self
            .pool
            .run(|conn| -> Result<_> {
                Ok((
                    db::rebuild_pending_sync(conn)?,
                    db::items::count_items_sync(conn)?,
                ))
            })
            .await?;
        let rebuild = pending
            || status.needs_rebuild()
            || (status == VecTableStatus::Created && item_count > 0);
        if rebuild {
            let stats = self.run_rebuild().await?;
            info!(
                items = stats.items,
                entries = stats.entries,
                "Rebuilt vector index"
            );
        } else {
            self.rebuild_outstanding.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Rebuild the whole index under the pending marker.
    ///
    /// The marker is cleared only after the last page commits, so a failed
    /// rebuild runs again on the next setup or batch.
    async fn run_rebuild(&self) -> Result<ReindexStats> {
        self.rebuild_outstanding.store(true, Ordering::SeqCst);
        self.pool
            .run(|conn| db::set_state_sync(conn, db::REBUILD_PENDING_KEY, "1"))
            .await?;
        let stats = self.rebuild_index().await?;
        self.pool
            .run(|conn| db::clear_state_sync(conn, db::REBUILD_PENDING_KEY))
            .await?;
        self.rebuild_outstanding.store(false, Ordering::SeqCst);
        Ok(stats)
    }

    /// Create (or resize) the vector table and freeze the dimension.
    async fn create_vector_table(&self, dims: usize) -> Result<VecTableStatus> {
        let status = self
            .pool
            .interact(move |conn| db::ensure_vector_table(conn, dims))
            .await?;
        if self.dims.set(dims).is_err() {
            debug!("Embedding dimension already frozen");
        }
        Ok(status)
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.setup.initialized() {
            Ok(())
        } else {
            Err(RecallError::NotInitialized)
        }
    }

    /// True when searches with a query take the semantic path.
    pub fn semantic_search_available(&self) -> bool {
        self.index.is_some() && self.dims.get().is_some()
    }

    /// Frozen embedding dimension, if known
    pub fn dimensions(&self) -> Option<usize> {
        self.dims.get().copied()
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.pool.path()
    }

    /// Execute operations atomically. Results are in submission order.
    pub async fn batch(&self, operations: Vec<Operation>) -> Result<Vec<OpResult>> {
        self.ensure_ready()?;
        let _guard = self.batch_lock.lock().await;

        if self.dims.get().is_some() && self.rebuild_outstanding.load(Ordering::SeqCst) {
            self.finish_rebuild(VecTableStatus::Ready).await?;
        }

        let op_count = operations.len();
        let plan = BatchPlan::build(
            operations,
            self.index.as_ref().map(|i| i.default_fields.as_slice()),
        )?;
        let embedded = self.embed_plan(&plan).await?;
        debug!(
            ops = op_count,
            writes = plan.writes.len(),
            queries = embedded.queries.len(),
            documents = embedded.documents.len(),
            "Committing batch"
        );

        let plan = Arc::new(plan);
        let embedded = Arc::new(embedded);
        self.pool
            .run_with_retry(move |conn| commit_batch_sync(conn, &plan, &embedded, Utc::now()))
            .await
    }

    /// Phase 2: every provider call for the batch, before the transaction.
    async fn embed_plan(&self, plan: &BatchPlan) -> Result<Embedded> {
        let Some(index) = &self.index else {
            return Ok(Embedded::default());
        };

        let queries = match self.dims.get() {
            Some(&dims) => index.gateway.embed_queries(plan.queries(), dims).await?,
            None => Default::default(),
        };

        let documents = index
            .gateway
            .embed_documents(plan.document_texts(), self.dims.get().copied())
            .await?;

        if self.dims.get().is_none()
            && let Some(first) = documents.values().next()
        {
            let dims = first.len();
            info!(dims, "Learned embedding dimensions from first documents");
            let status = self.create_vector_table(dims).await?;
            self.finish_rebuild(status).await?;
        }

        Ok(Embedded { queries, documents })
    }

    // ═══════════════════════════════════════
    // SINGLE-OPERATION WRAPPERS
    // ═══════════════════════════════════════

    async fn single(&self, op: Operation) -> Result<OpResult> {
        self.batch(vec![op])
            .await?
            .pop()
            .ok_or_else(|| RecallError::Storage("batch returned no result".into()))
    }

    pub async fn get(&self, namespace: impl Into<Namespace>, key: impl Into<String>) -> Result<Option<Item>> {
        Ok(self.single(GetOp::new(namespace, key).into()).await?.into_item())
    }

    /// Upsert with default indexing. A `null` value deletes the item.
    pub async fn put(
        &self,
        namespace: impl Into<Namespace>,
        key: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        self.single(PutOp::upsert(namespace, key, value).into())
            .await
            .map(|_| ())
    }

    pub async fn put_with_index(
        &self,
        namespace: impl Into<Namespace>,
        key: impl Into<String>,
        value: Value,
        index: IndexMode,
    ) -> Result<()> {
        self.single(PutOp::upsert(namespace, key, value).with_index(index).into())
            .await
            .map(|_| ())
    }

    pub async fn delete(&self, namespace: impl Into<Namespace>, key: impl Into<String>) -> Result<()> {
        self.single(PutOp::delete(namespace, key).into())
            .await
            .map(|_| ())
    }

    pub async fn search(&self, op: SearchOp) -> Result<Vec<SearchItem>> {
        self.single(op.into())
            .await?
            .into_search_items()
            .ok_or_else(|| RecallError::Storage("search returned a non-search result".into()))
    }

    pub async fn list_namespaces(&self, op: ListNamespacesOp) -> Result<Vec<Namespace>> {
        self.single(op.into())
            .await?
            .into_namespaces()
            .ok_or_else(|| RecallError::Storage("list returned a non-list result".into()))
    }

    /// Item and vector counts plus index state.
    pub async fn stats(&self) -> Result<StoreStats> {
        let (items, vector_entries, provider) = self
            .pool
            .run(|conn| -> Result<_> {
                Ok((
                    db::items::count_items_sync(conn)?,
                    db::vectors::count_entries_sync(conn)?,
                    db::get_state_sync(conn, db::EMBEDDING_PROVIDER_KEY)?,
                ))
            })
            .await?;
        Ok(StoreStats {
            items,
            vector_entries,
            dims: self.dimensions(),
            provider,
            semantic_search: self.semantic_search_available(),
        })
    }
}
