//! Cache storage trait and SQLite implementation.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Serialize};

use super::traits::Bucket;

/// A cached value together with its storage metadata.
#[derive(Debug, Clone)]
pub struct Stored<T> {
  pub data: T,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
  /// When the entry stops being valid; None means it never expires
  pub expires_at: Option<DateTime<Utc>>,
}

/// A mutation recorded while offline, waiting for replay.
#[derive(Debug, Clone)]
pub struct QueuedAction<A> {
  /// Queue row id; removal key after a successful replay
  pub id: i64,
  pub action: A,
  pub queued_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Reads never return expired entries; expired rows are deleted as a side
/// effect of the read (lazy eviction, no background sweep). Writes to the
/// same bucket/key are last-write-wins.
pub trait CacheStore: Send + Sync {
  /// Upsert an entry, expiring `ttl` from now when given.
  fn put<T: Serialize>(
    &self,
    bucket: Bucket,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
  ) -> Result<()>;

  /// Get an entry. Missing and expired both read as `None`.
  fn get<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> Result<Option<Stored<T>>>;

  /// All non-expired entries in a bucket, in no particular order.
  fn get_all<T: DeserializeOwned>(&self, bucket: Bucket) -> Result<Vec<T>>;

  /// Remove a single entry.
  fn remove(&self, bucket: Bucket, key: &str) -> Result<()>;

  /// Remove every entry in a bucket.
  fn clear(&self, bucket: Bucket) -> Result<()>;

  /// Record an offline mutation; returns its queue id.
  fn enqueue<A: Serialize>(&self, action: &A) -> Result<i64>;

  /// All queued mutations in enqueue order.
  fn queued_actions<A: DeserializeOwned>(&self) -> Result<Vec<QueuedAction<A>>>;

  /// Remove a queued mutation after successful replay.
  fn remove_action(&self, id: i64) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn put<T: Serialize>(&self, _: Bucket, _: &str, _: &T, _: Option<Duration>) -> Result<()> {
    Ok(()) // Discard
  }

  fn get<T: DeserializeOwned>(&self, _: Bucket, _: &str) -> Result<Option<Stored<T>>> {
    Ok(None) // Always miss
  }

  fn get_all<T: DeserializeOwned>(&self, _: Bucket) -> Result<Vec<T>> {
    Ok(Vec::new())
  }

  fn remove(&self, _: Bucket, _: &str) -> Result<()> {
    Ok(())
  }

  fn clear(&self, _: Bucket) -> Result<()> {
    Ok(())
  }

  fn enqueue<A: Serialize>(&self, _: &A) -> Result<i64> {
    Ok(0) // Discard; replay will never see it
  }

  fn queued_actions<A: DeserializeOwned>(&self) -> Result<Vec<QueuedAction<A>>> {
    Ok(Vec::new())
  }

  fn remove_action(&self, _: i64) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based cache storage.
///
/// One entries table partitioned by bucket, one offline queue table. The
/// connection is an explicit handle: callers `open` their own store and may
/// `close` it, so tests get isolated instances.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Bucketed TTL key-value entries (serialized JSON values)
CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    key TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at INTEGER NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (bucket, key)
);

CREATE INDEX IF NOT EXISTS idx_entries_expiry ON entries(bucket, expires_at);

-- Mutations made while offline, replayed in id order
CREATE TABLE IF NOT EXISTS offline_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    action BLOB NOT NULL,
    queued_at INTEGER NOT NULL
);
"#;

impl SqliteStore {
  /// Open a store at the given path, creating parent directories.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// Open the store at the default platform data directory.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open an in-memory store. Every call gets a fresh database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Close the underlying connection.
  pub fn close(self) -> Result<()> {
    let conn = self
      .conn
      .into_inner()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    conn
      .close()
      .map_err(|(_, e)| eyre!("Failed to close cache database: {}", e))
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("stint").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

impl CacheStore for SqliteStore {
  fn put<T: Serialize>(
    &self,
    bucket: Bucket,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
  ) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data = serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize entry: {}", e))?;
    let now = Utc::now().timestamp_millis();
    let expires_at = ttl.map(|ttl| now + ttl.as_millis() as i64);

    conn
      .execute(
        "INSERT OR REPLACE INTO entries (bucket, key, data, cached_at, expires_at)
         VALUES (?, ?, ?, ?, ?)",
        params![bucket.as_str(), key, data, now, expires_at],
      )
      .map_err(|e| eyre!("Failed to store entry: {}", e))?;

    Ok(())
  }

  fn get<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> Result<Option<Stored<T>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT data, cached_at, expires_at FROM entries
         WHERE bucket = ? AND key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(Vec<u8>, i64, Option<i64>)> = stmt
      .query_row(params![bucket.as_str(), key], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      })
      .ok();
    drop(stmt);

    let (data, cached_at, expires_at) = match row {
      Some(row) => row,
      None => return Ok(None),
    };

    // Lazy eviction: an expired entry reads as absent and is deleted
    if let Some(exp) = expires_at {
      if Utc::now().timestamp_millis() > exp {
        conn
          .execute(
            "DELETE FROM entries WHERE bucket = ? AND key = ?",
            params![bucket.as_str(), key],
          )
          .map_err(|e| eyre!("Failed to evict expired entry: {}", e))?;
        return Ok(None);
      }
    }

    let data: T =
      serde_json::from_slice(&data).map_err(|e| eyre!("Failed to deserialize entry: {}", e))?;

    Ok(Some(Stored {
      data,
      cached_at: millis_to_datetime(cached_at)?,
      expires_at: expires_at.map(millis_to_datetime).transpose()?,
    }))
  }

  fn get_all<T: DeserializeOwned>(&self, bucket: Bucket) -> Result<Vec<T>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let now = Utc::now().timestamp_millis();

    // Evict everything in the bucket that has lapsed before reading
    conn
      .execute(
        "DELETE FROM entries WHERE bucket = ? AND expires_at IS NOT NULL AND expires_at < ?",
        params![bucket.as_str(), now],
      )
      .map_err(|e| eyre!("Failed to evict expired entries: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT data FROM entries WHERE bucket = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let entries: Vec<T> = stmt
      .query_map(params![bucket.as_str()], |row| {
        let data: Vec<u8> = row.get(0)?;
        Ok(data)
      })
      .map_err(|e| eyre!("Failed to query entries: {}", e))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(entries)
  }

  fn remove(&self, bucket: Bucket, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM entries WHERE bucket = ? AND key = ?",
        params![bucket.as_str(), key],
      )
      .map_err(|e| eyre!("Failed to remove entry: {}", e))?;

    Ok(())
  }

  fn clear(&self, bucket: Bucket) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM entries WHERE bucket = ?",
        params![bucket.as_str()],
      )
      .map_err(|e| eyre!("Failed to clear bucket: {}", e))?;

    Ok(())
  }

  fn enqueue<A: Serialize>(&self, action: &A) -> Result<i64> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let data =
      serde_json::to_vec(action).map_err(|e| eyre!("Failed to serialize action: {}", e))?;

    conn
      .execute(
        "INSERT INTO offline_queue (action, queued_at) VALUES (?, ?)",
        params![data, Utc::now().timestamp_millis()],
      )
      .map_err(|e| eyre!("Failed to enqueue action: {}", e))?;

    Ok(conn.last_insert_rowid())
  }

  fn queued_actions<A: DeserializeOwned>(&self) -> Result<Vec<QueuedAction<A>>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT id, action, queued_at FROM offline_queue ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let rows: Vec<(i64, Vec<u8>, i64)> = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| eyre!("Failed to query queue: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    let mut actions = Vec::with_capacity(rows.len());
    for (id, data, queued_at) in rows {
      let action: A = serde_json::from_slice(&data)
        .map_err(|e| eyre!("Failed to deserialize queued action {}: {}", id, e))?;
      actions.push(QueuedAction {
        id,
        action,
        queued_at: millis_to_datetime(queued_at)?,
      });
    }

    Ok(actions)
  }

  fn remove_action(&self, id: i64) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM offline_queue WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove queued action: {}", e))?;

    Ok(())
  }
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>> {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .ok_or_else(|| eyre!("Invalid timestamp in cache: {}", millis))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_put_get_roundtrip() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
      .put(Bucket::Students, "s1", &"Ada Lovelace".to_string(), None)
      .unwrap();

    let stored: Stored<String> = store.get(Bucket::Students, "s1").unwrap().unwrap();
    assert_eq!(stored.data, "Ada Lovelace");
    assert!(stored.expires_at.is_none());
  }

  #[test]
  fn test_missing_key_is_none() {
    let store = SqliteStore::open_in_memory().unwrap();
    let got: Option<Stored<String>> = store.get(Bucket::Students, "nope").unwrap();
    assert!(got.is_none());
  }

  #[test]
  fn test_expired_entry_reads_as_absent_and_is_evicted() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
      .put(
        Bucket::Students,
        "s1",
        &"stale".to_string(),
        Some(Duration::from_millis(0)),
      )
      .unwrap();
    std::thread::sleep(Duration::from_millis(5));

    let got: Option<Stored<String>> = store.get(Bucket::Students, "s1").unwrap();
    assert!(got.is_none());

    // The expired row was deleted, not just skipped
    let conn = store.conn.lock().unwrap();
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 0);
  }

  #[test]
  fn test_get_all_excludes_expired() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
      .put(Bucket::Feedback, "f1", &"keep".to_string(), None)
      .unwrap();
    store
      .put(
        Bucket::Feedback,
        "f2",
        &"drop".to_string(),
        Some(Duration::from_millis(0)),
      )
      .unwrap();
    std::thread::sleep(Duration::from_millis(5));

    let all: Vec<String> = store.get_all(Bucket::Feedback).unwrap();
    assert_eq!(all, vec!["keep".to_string()]);
  }

  #[test]
  fn test_put_overwrites_instead_of_duplicating() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
      .put(Bucket::Cache, "k", &"first".to_string(), None)
      .unwrap();
    store
      .put(Bucket::Cache, "k", &"second".to_string(), None)
      .unwrap();

    let all: Vec<String> = store.get_all(Bucket::Cache).unwrap();
    assert_eq!(all, vec!["second".to_string()]);
  }

  #[test]
  fn test_buckets_are_isolated() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
      .put(Bucket::Students, "id", &"student".to_string(), None)
      .unwrap();
    store
      .put(Bucket::Profile, "id", &"profile".to_string(), None)
      .unwrap();

    store.clear(Bucket::Students).unwrap();

    let student: Option<Stored<String>> = store.get(Bucket::Students, "id").unwrap();
    let profile: Option<Stored<String>> = store.get(Bucket::Profile, "id").unwrap();
    assert!(student.is_none());
    assert_eq!(profile.unwrap().data, "profile");
  }

  #[test]
  fn test_queue_preserves_enqueue_order() {
    let store = SqliteStore::open_in_memory().unwrap();

    store.enqueue(&"first".to_string()).unwrap();
    store.enqueue(&"second".to_string()).unwrap();
    store.enqueue(&"third".to_string()).unwrap();

    let queued: Vec<QueuedAction<String>> = store.queued_actions().unwrap();
    let order: Vec<&str> = queued.iter().map(|q| q.action.as_str()).collect();
    assert_eq!(order, vec!["first", "second", "third"]);
  }

  #[test]
  fn test_remove_action_by_id() {
    let store = SqliteStore::open_in_memory().unwrap();

    let first = store.enqueue(&"a".to_string()).unwrap();
    let second = store.enqueue(&"b".to_string()).unwrap();
    assert_ne!(first, second);

    store.remove_action(first).unwrap();

    let queued: Vec<QueuedAction<String>> = store.queued_actions().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].action, "b");
    assert_eq!(queued[0].id, second);
  }

  #[test]
  fn test_close_releases_the_handle() {
    let store = SqliteStore::open_in_memory().unwrap();
    store
      .put(Bucket::Cache, "k", &"v".to_string(), None)
      .unwrap();
    store.close().unwrap();
  }
}
