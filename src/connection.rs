//! Connection manager for the `bb8` pool wrapping `rusqlite`.
//!
//! Adapted from `ankurah-storage-sqlite`'s connection manager: `rusqlite`
//! connections are not `Send`, so each is wrapped in a `Mutex` and every
//! operation runs inside `spawn_blocking`.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// Configuration for the writer's SQLite connection.
#[derive(Clone, Debug)]
pub enum SqliteConfig {
    /// File-based database.
    File(PathBuf),
    /// In-memory database (for testing).
    Memory,
}

/// `bb8::ManageConnection` implementation for `rusqlite`.
pub struct SqliteConnectionManager {
    config: SqliteConfig,
}

impl SqliteConnectionManager {
    pub fn new(config: SqliteConfig) -> Self { Self { config } }

    pub fn file(path: impl Into<PathBuf>) -> Self { Self::new(SqliteConfig::File(path.into())) }

    pub fn memory() -> Self { Self::new(SqliteConfig::Memory) }

    fn create_connection(&self) -> Result<Connection, StoreError> {
        let conn = match &self.config {
            SqliteConfig::File(path) => Connection::open(path)?,
            SqliteConfig::Memory => Connection::open_in_memory()?,
        };

        // The write path is single-writer per spec.md §5; WAL plus a busy
        // timeout keeps the teacher's posture of "tolerate, don't contend".
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        Ok(conn)
    }
}

/// A pooled SQLite connection wrapper. Thread-safe via `Arc<Mutex<_>>` since
/// `rusqlite::Connection` is not `Send`.
pub struct PooledConnection {
    inner: Arc<Mutex<Connection>>,
}

impl PooledConnection {
    pub fn new(conn: Connection) -> Self { Self { inner: Arc::new(Mutex::new(conn)) } }

    /// Run `f` with shared access to the connection inside `spawn_blocking`.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }

    /// Run `f` with mutable access — used for opening a `rusqlite::Transaction`,
    /// which borrows the connection mutably for its lifetime.
    pub async fn with_connection_mut<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.blocking_lock();
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::TaskJoin(e.to_string()))?
    }

    /// Like `with_connection`, but for callers whose closure returns a richer
    /// error type than `StoreError` (e.g. `WriteError`) — used by the
    /// orchestrator so a codec-level `InvalidDetail`/`DoesNotExist` doesn't
    /// get flattened away crossing the `spawn_blocking` boundary.
    pub async fn with_connection_as<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.blocking_lock();
            f(&guard)
        })
        .await
        .map_err(|e| E::from(StoreError::TaskJoin(e.to_string())))?
    }
}

impl Clone for PooledConnection {
    fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

impl bb8::ManageConnection for SqliteConnectionManager {
    type Connection = PooledConnection;
    type Error = StoreError;

    fn connect(&self) -> impl std::future::Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let config = self.config.clone();
        async move {
            let manager = SqliteConnectionManager::new(config);
            tokio::task::spawn_blocking(move || manager.create_connection().map(PooledConnection::new))
                .await
                .map_err(|e| StoreError::TaskJoin(e.to_string()))?
        }
    }

    #[allow(refining_impl_trait)]
    fn is_valid<'a, 'b>(&'a self, conn: &'b mut Self::Connection) -> impl std::future::Future<Output = Result<(), Self::Error>> + Send {
        let conn_inner = conn.inner.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                let guard = conn_inner.blocking_lock();
                guard.execute_batch("SELECT 1").map_err(StoreError::from)
            })
            .await
            .map_err(|e| StoreError::TaskJoin(e.to_string()))?
        }
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool { false }
}
