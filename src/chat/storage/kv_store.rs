//! Key-value persistence backends.
//!
//! Records are JSON text under string keys. [`KeyValueStore::apply`] applies a
//! batch of writes atomically, so multi-record changes never leave a partial
//! state behind.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::OptionalExtension;
use tokio::sync::RwLock;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::chat::core::config::StorageConfig;
use crate::chat::core::errors::ChatResult;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One write of a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvWrite {
    /// Insert or overwrite a record.
    Put {
        /// Record key.
        key: String,
        /// Serialized record.
        value: String,
    },
    /// Remove a record if present.
    Delete {
        /// Record key.
        key: String,
    },
}

impl KvWrite {
    /// Build a put.
    #[must_use]
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Build a delete.
    #[must_use]
    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Trait for key-value record storage.
pub trait KeyValueStore: Send + Sync {
    /// Read a record.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, key: &str) -> StoreFuture<'_, ChatResult<Option<String>>>;

    /// Apply all writes in one transaction.
    ///
    /// # Errors
    /// Returns an error if storage access fails; no write is applied then.
    fn apply(&self, writes: Vec<KvWrite>) -> StoreFuture<'_, ChatResult<()>>;
}

/// `SQLite` implementation of key-value storage.
pub struct SqliteKvStore {
    conn: Arc<Connection>,
    table: String,
}

impl SqliteKvStore {
    /// Open the database at `config.sqlite_path` and create the table.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn open(config: &StorageConfig) -> ChatResult<Self> {
        if let Some(parent) = config
            .sqlite_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(Arc::new(conn), &config.table).await
    }

    /// Use a private in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn in_memory(table: &str) -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(Arc::new(conn), table).await
    }

    /// Initialize the store on an existing connection.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn with_connection(conn: Arc<Connection>, table: &str) -> ChatResult<Self> {
        let table = table.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> StoreFuture<'_, ChatResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn apply(&self, writes: Vec<KvWrite>) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            if writes.is_empty() {
                return Ok(());
            }

            let table = self.table.clone();
            let count = writes.len();
            let now_ms = Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    for write in writes {
                        match write {
                            KvWrite::Put { key, value } => {
                                tx.execute(
                                    &format!(
                                        "INSERT INTO {table} (key, value, updated_at)
                                         VALUES (?1, ?2, ?3)
                                         ON CONFLICT(key) DO UPDATE
                                         SET value = excluded.value,
                                             updated_at = excluded.updated_at"
                                    ),
                                    rusqlite::params![key, value, now_ms],
                                )?;
                            }
                            KvWrite::Delete { key } => {
                                tx.execute(
                                    &format!("DELETE FROM {table} WHERE key = ?1"),
                                    rusqlite::params![key],
                                )?;
                            }
                        }
                    }
                    tx.commit()?;
                    Ok(())
                })
                .await?;
            debug!(count, "Applied key-value batch");
            Ok(())
        })
    }
}

/// In-process key-value storage; contents are lost on drop.
#[derive(Default)]
pub struct MemoryKvStore {
    records: RwLock<HashMap<String, String>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store holds no record.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> StoreFuture<'_, ChatResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.records.read().await.get(&key).cloned()) })
    }

    fn apply(&self, writes: Vec<KvWrite>) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let mut records = self.records.write().await;
            for write in writes {
                match write {
                    KvWrite::Put { key, value } => {
                        records.insert(key, value);
                    }
                    KvWrite::Delete { key } => {
                        records.remove(&key);
                    }
                }
            }
            Ok(())
        })
    }
}
