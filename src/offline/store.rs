//! Persistent bucket storage for the offline boundary cache.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use sha2::{Digest, Sha256};

use crate::error::DataError;

/// A response retrieved from a bucket.
#[derive(Debug, Clone)]
pub struct StoredResponse {
  pub status: u16,
  pub content_type: String,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

/// Schema for bucket tables.
const BUCKET_SCHEMA: &str = r#"
-- Opaque request/response pairs, one row per (bucket, request)
CREATE TABLE IF NOT EXISTS bucket_entries (
    bucket TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, request_key)
);

CREATE INDEX IF NOT EXISTS idx_bucket_entries_bucket ON bucket_entries(bucket);
"#;

/// Named persistent key/value areas at the network boundary.
///
/// Writes are idempotent upserts keyed by full request identity, so
/// concurrent writers need no coordination beyond last-write-wins.
pub struct BucketStore {
  conn: Mutex<Connection>,
}

impl BucketStore {
  /// Open or create the store at the given path.
  pub fn open_at(path: &Path) -> Result<Self, DataError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| DataError::Storage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| DataError::Storage(format!("failed to open {}: {}", path.display(), e)))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// In-memory store, used by tests.
  pub fn in_memory() -> Result<Self, DataError> {
    let store = Self {
      conn: Mutex::new(Connection::open_in_memory()?),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<(), DataError> {
    let conn = self.lock()?;
    conn
      .execute_batch(BUCKET_SCHEMA)
      .map_err(|e| DataError::Storage(format!("failed to run bucket migrations: {}", e)))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DataError> {
    self
      .conn
      .lock()
      .map_err(|e| DataError::Storage(format!("lock poisoned: {}", e)))
  }

  /// Stable fixed-length key for a request.
  fn request_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Upsert a response under `(bucket, url)`. Last write wins.
  pub fn put(
    &self,
    bucket: &str,
    url: &str,
    status: u16,
    content_type: &str,
    body: &[u8],
  ) -> Result<(), DataError> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO bucket_entries (bucket, request_key, url, status, content_type, body, stored_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![bucket, Self::request_key(url), url, status, content_type, body],
    )?;
    Ok(())
  }

  /// Look up a response by full request URL.
  pub fn get(&self, bucket: &str, url: &str) -> Result<Option<StoredResponse>, DataError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare(
      "SELECT status, content_type, body, stored_at FROM bucket_entries
       WHERE bucket = ? AND request_key = ?",
    )?;

    let row: Option<(u16, String, Vec<u8>, String)> = stmt
      .query_row(params![bucket, Self::request_key(url)], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, content_type, body, stored_at)) => Ok(Some(StoredResponse {
        status,
        content_type,
        body,
        stored_at: parse_datetime(&stored_at)?,
      })),
      None => Ok(None),
    }
  }

  /// Distinct bucket names currently holding entries.
  pub fn bucket_names(&self) -> Result<Vec<String>, DataError> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT DISTINCT bucket FROM bucket_entries ORDER BY bucket")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  /// Delete every bucket not in `keep`. Returns the number of rows purged.
  /// Called once per activation, never during request handling.
  pub fn delete_buckets_except(&self, keep: &[String]) -> Result<usize, DataError> {
    let conn = self.lock()?;
    let placeholders = vec!["?"; keep.len()].join(", ");
    let sql = format!(
      "DELETE FROM bucket_entries WHERE bucket NOT IN ({})",
      placeholders
    );
    let purged = conn.execute(&sql, params_from_iter(keep.iter()))?;
    Ok(purged)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DataError> {
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| DataError::Storage(format!("failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_put_get_round_trip() {
    let store = BucketStore::in_memory().unwrap();
    store
      .put("static-v1", "https://app.example.com/assets/app.js", 200, "text/javascript", b"console.log(1)")
      .unwrap();

    let hit = store
      .get("static-v1", "https://app.example.com/assets/app.js")
      .unwrap()
      .expect("entry should exist");
    assert_eq!(hit.status, 200);
    assert_eq!(hit.body, b"console.log(1)");

    assert!(store
      .get("api-v1", "https://app.example.com/assets/app.js")
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_put_overwrites() {
    let store = BucketStore::in_memory().unwrap();
    store.put("api-v1", "https://x/a", 200, "application/json", b"old").unwrap();
    store.put("api-v1", "https://x/a", 200, "application/json", b"new").unwrap();

    let hit = store.get("api-v1", "https://x/a").unwrap().unwrap();
    assert_eq!(hit.body, b"new");
  }

  #[test]
  fn test_delete_buckets_except() {
    let store = BucketStore::in_memory().unwrap();
    store.put("static-v1", "https://x/a", 200, "text/plain", b"a").unwrap();
    store.put("static-v2", "https://x/a", 200, "text/plain", b"a").unwrap();
    store.put("api-v2", "https://x/b", 200, "application/json", b"b").unwrap();

    let purged = store
      .delete_buckets_except(&["static-v2".to_string(), "api-v2".to_string()])
      .unwrap();
    assert_eq!(purged, 1);
    assert_eq!(store.bucket_names().unwrap(), vec!["api-v2", "static-v2"]);
    assert!(store.get("static-v1", "https://x/a").unwrap().is_none());
    assert!(store.get("static-v2", "https://x/a").unwrap().is_some());
  }
}
