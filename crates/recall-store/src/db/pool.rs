// crates/recall-store/src/db/pool.rs
// Async connection pool using deadpool-sqlite
//
// The store serializes all access through a single pooled connection, so the
// pool is sized to one. Closures passed to `run` / `interact` execute on a
// blocking thread and never block the async runtime.
//
// ## pool.run()
// Store operations use `pool.run()`, which converts errors to `RecallError`:
// ```ignore
// let item = pool.run(move |conn| items::get_item_sync(conn, &ns, &key)).await?;
// ```
//
// ## pool.interact()
// Setup and schema code uses `pool.interact()` for `anyhow::Result`.

use crate::error::RecallError;
use crate::utils::path_to_string;
use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::{Path, PathBuf};
use std::sync::Once;
use std::time::Duration;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Registers sqlite-vec extension globally (once per process).
/// Must be called before any SQLite connections are opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
pub fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature sqlite3_auto_extension expects
        // (fn(*mut sqlite3, *mut *const c_char, *const sqlite3_api_routines) -> c_int).
        // The pointer targets a statically linked symbol and stays valid for the
        // lifetime of the process.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Check if a rusqlite error is SQLITE_BUSY or SQLITE_LOCKED.
///
/// SQLITE_BUSY occurs with file-based databases under write contention from
/// another process. SQLITE_LOCKED occurs with shared-cache in-memory databases.
pub fn is_rusqlite_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

/// Retry delays for SQLite contention backoff (100ms, 500ms, 2s).
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_millis(2000),
];

/// Calls `op` up to `RETRY_DELAYS.len() + 1` times, sleeping between attempts
/// while `is_retryable` holds for the error.
async fn retry_with_backoff<F, Fut, R, E>(
    mut op: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<R, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
    E: std::fmt::Display,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) if is_retryable(&e) => {
                tracing::warn!(
                    "SQLite contention on attempt {}/{}, retrying in {:?}: {}",
                    attempt + 1,
                    RETRY_DELAYS.len(),
                    delay,
                    e
                );
                tokio::time::sleep(*delay).await;
            }
            Err(e) => return Err(e),
        }
    }

    // Final attempt (no retry after this)
    op().await
}

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbStorage {
    File(PathBuf),
    /// Private in-memory database, unique per pool
    InMemory,
}

/// Database pool wrapper with sqlite-vec support and per-connection setup.
pub struct DatabasePool {
    pool: Pool,
    path: Option<PathBuf>,
}

impl DatabasePool {
    /// Open a pooled database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_storage(DbStorage::File(path.to_path_buf())).await
    }

    /// Open a pooled in-memory database.
    ///
    /// Uses a uniquely named shared-cache URI so the database outlives any
    /// individual connection recycle and never collides with another pool.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_storage(DbStorage::InMemory).await
    }

    /// 1. Registers sqlite-vec (once per process)
    /// 2. Backs up an existing file database
    /// 3. Creates the single-connection pool with its pragma hook
    /// 4. Runs idempotent schema setup
    pub async fn open_storage(storage: DbStorage) -> Result<Self> {
        ensure_sqlite_vec_registered();

        let (conn_str, path, hook) = match storage {
            DbStorage::File(p) => {
                ensure_parent_directory(&p)?;
                if let Err(e) = Self::backup_before_migration(&p) {
                    tracing::warn!("Pre-migration backup failed (continuing anyway): {}", e);
                }
                let s = path_to_string(&p);
                let hook = make_file_post_create_hook(p.clone());
                (s, Some(p), hook)
            }
            DbStorage::InMemory => {
                let uri = format!(
                    "file:recall_mem_{}?mode=memory&cache=shared",
                    uuid::Uuid::new_v4().simple()
                );
                (uri, None, make_memory_post_create_hook())
            }
        };

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .max_size(1)
            .post_create(hook)
            .build()
            .context("Failed to build connection pool")?;

        let db_pool = Self { pool, path };
        db_pool.run_migrations().await?;
        Ok(db_pool)
    }

    /// Run a closure with a pooled connection, returning `anyhow::Result`.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get connection from pool")?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Run a closure with a pooled connection, converting errors to `RecallError`.
    pub async fn run<F, R, E>(&self, f: F) -> Result<R, RecallError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + 'static,
        R: Send + 'static,
        E: Into<RecallError> + Send + 'static,
    {
        self.pool
            .get()
            .await
            .map_err(|e| RecallError::Storage(format!("Failed to get connection: {e}")))?
            .interact(move |conn| f(conn).map_err(Into::into))
            .await
            .map_err(RecallError::from)?
    }

    /// Like [`run`](Self::run) but re-runs the closure on SQLite contention.
    ///
    /// The closure must be `Clone` and must leave no trace when it fails
    /// (wrap its writes in a transaction).
    pub async fn run_with_retry<F, R, E>(&self, f: F) -> Result<R, RecallError>
    where
        F: FnOnce(&Connection) -> Result<R, E> + Send + Clone + 'static,
        R: Send + 'static,
        E: Into<RecallError> + Send + 'static,
    {
        retry_with_backoff(
            || {
                let f_clone = f.clone();
                self.run(f_clone)
            },
            RecallError::is_contention,
        )
        .await
    }

    /// Database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Snapshot an existing database with `VACUUM INTO` before schema setup.
    /// Keeps at most one backup per database (overwrites previous).
    fn backup_before_migration(path: &Path) -> Result<()> {
        let backup_path = path.with_extension("db.pre-migration");

        // Only backup if the source DB file exists (not first run)
        if !path.exists() {
            return Ok(());
        }

        let conn = Connection::open(path).context("Failed to open DB for backup")?;

        // VACUUM INTO fails if the target exists
        let _ = std::fs::remove_file(&backup_path);

        conn.execute("VACUUM INTO ?1", [backup_path.to_string_lossy().as_ref()])
            .context("Failed to create pre-migration backup")?;

        tracing::info!("Created pre-migration backup: {}", backup_path.display());
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| {
            super::schema::run_all_migrations(conn)?;
            if let Err(e) = conn.execute_batch("PRAGMA optimize") {
                tracing::debug!("PRAGMA optimize skipped: {}", e);
            }
            Ok(())
        })
        .await
    }
}

/// Ensure parent directory exists with secure permissions (0o700 on Unix).
fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(parent)?.permissions();
            perms.set_mode(0o700);
            std::fs::set_permissions(parent, perms)?;
        }
    }
    Ok(())
}

/// Post-create hook for file databases: pragmas plus 0o600 file permissions.
fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;

                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    if let Err(e) = std::fs::set_permissions(&path_for_perms, perms) {
                        tracing::warn!("Failed to set database file permissions to 0600: {}", e);
                    }
                }
                #[cfg(not(unix))]
                let _ = &path_for_perms;

                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

/// Post-create hook for in-memory databases (WAL does not apply).
fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys=ON; \
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL;",
    )?;
    Ok(())
}
