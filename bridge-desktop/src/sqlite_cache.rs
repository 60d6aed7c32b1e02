//! Persistent cache storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{CacheKey, HttpMethod, HttpResponse},
    storage::{CacheStorage, CacheStore},
    time::{Clock, SystemClock},
};
use bytes::Bytes;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cache_stores (
        name TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cache_entries (
        store_name TEXT NOT NULL,
        method TEXT NOT NULL,
        url TEXT NOT NULL,
        status INTEGER NOT NULL,
        headers TEXT NOT NULL,
        body BLOB NOT NULL,
        stored_at INTEGER NOT NULL,
        PRIMARY KEY (store_name, method, url)
    )
    "#,
];

// Writes through a handle whose store was deleted insert nothing, so no row
// can outlive its `cache_stores` entry.
const UPSERT_ENTRY: &str = r#"
    INSERT INTO cache_entries (store_name, method, url, status, headers, body, stored_at)
    SELECT ?, ?, ?, ?, ?, ?, ?
    WHERE EXISTS (SELECT 1 FROM cache_stores WHERE name = ?)
    ON CONFLICT(store_name, method, url) DO UPDATE SET
        status = excluded.status,
        headers = excluded.headers,
        body = excluded.body,
        stored_at = excluded.stored_at
"#;

fn storage_error(context: &str, e: sqlx::Error) -> BridgeError {
    error!(error = %e, "{}", context);
    BridgeError::Storage(format!("{}: {}", context, e))
}

/// SQLite-backed cache storage.
///
/// Every named store lives in one database file, so generations survive
/// restarts of the host process:
/// - One row per store in `cache_stores` (rowid gives creation order)
/// - One row per cached exchange in `cache_entries`
/// - Batch writes and store deletion run in transactions
#[derive(Clone)]
pub struct SqliteCacheStorage {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStorage {
    /// Open (or create) the cache database at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to connect to cache DB", e))?;

        let storage = Self::with_pool(pool, Arc::new(SystemClock));
        storage.migrate().await?;

        debug!(path = ?db_path, "Initialized cache storage");
        Ok(storage)
    }

    /// Create an in-memory cache database (for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::in_memory_with_clock(Arc::new(SystemClock)).await
    }

    /// In-memory database stamping entries with the given clock
    pub async fn in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self> {
        // A memory database exists per connection, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| storage_error("Failed to connect to cache DB", e))?;

        let storage = Self::with_pool(pool, clock);
        storage.migrate().await?;
        Ok(storage)
    }

    fn with_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("Failed to create cache tables", e))?;
        }
        Ok(())
    }

    /// When an entry was last written, in Unix milliseconds
    pub async fn stored_at(&self, store: &str, key: &CacheKey) -> Result<Option<i64>> {
        let row = sqlx::query(
            "SELECT stored_at FROM cache_entries WHERE store_name = ? AND method = ? AND url = ?",
        )
        .bind(store)
        .bind(key.method.as_str())
        .bind(key.url.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to read entry timestamp", e))?;

        row.map(|r| r.try_get::<i64, _>("stored_at"))
            .transpose()
            .map_err(|e| storage_error("Malformed entry row", e))
    }
}

#[async_trait]
impl CacheStorage for SqliteCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn CacheStore>> {
        sqlx::query("INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(self.clock.unix_timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to open cache store", e))?;

        Ok(Arc::new(SqliteCacheStore {
            name: name.to_string(),
            pool: self.pool.clone(),
            clock: self.clock.clone(),
        }))
    }

    async fn has(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM cache_stores WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to look up cache store", e))?;
        Ok(row.is_some())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        sqlx::query("DELETE FROM cache_entries WHERE store_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete cache entries", e))?;

        let removed = sqlx::query("DELETE FROM cache_stores WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to delete cache store", e))?
            .rows_affected();

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit store deletion", e))?;

        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM cache_stores ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to list cache stores", e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| storage_error("Malformed store row", e))
    }
}

/// Handle to one store inside a [`SqliteCacheStorage`] database.
///
/// Once the store is deleted from the storage, writes through the handle
/// fail with [`BridgeError::Storage`].
pub struct SqliteCacheStore {
    name: String,
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCacheStore {
    async fn upsert<'e, E>(
        &self,
        executor: E,
        key: &CacheKey,
        response: &HttpResponse,
        stored_at: i64,
    ) -> Result<()>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let headers = encode_headers(&response.headers)?;
        let written = sqlx::query(UPSERT_ENTRY)
            .bind(self.name.as_str())
            .bind(key.method.as_str())
            .bind(key.url.as_str())
            .bind(i64::from(response.status))
            .bind(headers)
            .bind(response.body.to_vec())
            .bind(stored_at)
            .bind(self.name.as_str())
            .execute(executor)
            .await
            .map_err(|e| storage_error("Failed to store cache entry", e))?
            .rows_affected();

        if written == 0 {
            debug!(store = %self.name, key = %key, "Write to deleted cache store dropped");
            return Err(BridgeError::Storage(format!(
                "Cache store '{}' no longer exists",
                self.name
            )));
        }
        Ok(())
    }
}

fn encode_headers(headers: &HashMap<String, String>) -> Result<String> {
    serde_json::to_string(headers)
        .map_err(|e| BridgeError::Storage(format!("Failed to encode headers: {}", e)))
}

fn decode_response(row: &SqliteRow) -> Result<HttpResponse> {
    let status: i64 = row
        .try_get("status")
        .map_err(|e| storage_error("Malformed entry row", e))?;
    let headers: String = row
        .try_get("headers")
        .map_err(|e| storage_error("Malformed entry row", e))?;
    let body: Vec<u8> = row
        .try_get("body")
        .map_err(|e| storage_error("Malformed entry row", e))?;

    let status = u16::try_from(status)
        .map_err(|_| BridgeError::Storage(format!("Invalid stored status: {}", status)))?;
    let headers = serde_json::from_str(&headers)
        .map_err(|e| BridgeError::Storage(format!("Failed to decode headers: {}", e)))?;

    Ok(HttpResponse {
        status,
        headers,
        body: Bytes::from(body),
    })
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &CacheKey) -> Result<Option<HttpResponse>> {
        if !key.is_cacheable() {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT status, headers, body FROM cache_entries \
             WHERE store_name = ? AND method = ? AND url = ?",
        )
        .bind(self.name.as_str())
        .bind(key.method.as_str())
        .bind(key.url.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to match cache entry", e))?;

        row.as_ref().map(decode_response).transpose()
    }

    async fn put(&self, key: CacheKey, response: HttpResponse) -> Result<()> {
        key.ensure_cacheable()?;
        let stored_at = self.clock.unix_timestamp_millis();
        self.upsert(&self.pool, &key, &response, stored_at).await
    }

    async fn put_all(&self, entries: Vec<(CacheKey, HttpResponse)>) -> Result<()> {
        for (key, _) in &entries {
            key.ensure_cacheable()?;
        }

        let stored_at = self.clock.unix_timestamp_millis();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        // An early return drops `tx`, rolling back the rows already written.
        for (key, response) in &entries {
            self.upsert(&mut *tx, key, response, stored_at).await?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit cache batch", e))
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        let removed = sqlx::query(
            "DELETE FROM cache_entries WHERE store_name = ? AND method = ? AND url = ?",
        )
        .bind(self.name.as_str())
        .bind(key.method.as_str())
        .bind(key.url.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to delete cache entry", e))?
        .rows_affected();

        Ok(removed > 0)
    }

    async fn keys(&self) -> Result<Vec<CacheKey>> {
        let rows = sqlx::query(
            "SELECT method, url FROM cache_entries WHERE store_name = ? ORDER BY method, url",
        )
        .bind(self.name.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to list cache entries", e))?;

        rows.iter()
            .map(|row| -> Result<CacheKey> {
                let method: String = row
                    .try_get("method")
                    .map_err(|e| storage_error("Malformed entry row", e))?;
                let url: String = row
                    .try_get("url")
                    .map_err(|e| storage_error("Malformed entry row", e))?;
                let method: HttpMethod = method.parse()?;
                Ok(CacheKey::new(method, &url))
            })
            .collect()
    }
}
