//! Persistent store for sanitized records.
//!
//! Every row here has passed the validation gate; sanitizers guarantee
//! each field is either well-typed or null before it lands.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::DataError;

/// Schema for the record table.
const RECORD_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    entity_type TEXT NOT NULL,
    record_key TEXT NOT NULL,
    data TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (entity_type, record_key)
);
"#;

pub struct RecordStore {
  conn: Mutex<Connection>,
}

impl RecordStore {
  /// Open or create the store at the given path.
  pub fn open_at(path: &Path) -> Result<Self, DataError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| DataError::Storage(format!("failed to create data directory: {}", e)))?;
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
      .execute_batch(RECORD_SCHEMA)
      .map_err(|e| DataError::Storage(format!("failed to run record migrations: {}", e)))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, DataError> {
    self
      .conn
      .lock()
      .map_err(|e| DataError::Storage(format!("lock poisoned: {}", e)))
  }

  /// Upsert one sanitized record.
  pub fn upsert<T: Serialize>(
    &self,
    entity_type: &str,
    record_key: &str,
    record: &T,
  ) -> Result<(), DataError> {
    let data = serde_json::to_string(record)?;
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO records (entity_type, record_key, data, stored_at)
       VALUES (?, ?, ?, datetime('now'))",
      params![entity_type, record_key, data],
    )?;
    Ok(())
  }

  pub fn count(&self, entity_type: &str) -> Result<usize, DataError> {
    let conn = self.lock()?;
    let count: i64 = conn.query_row(
      "SELECT COUNT(*) FROM records WHERE entity_type = ?",
      params![entity_type],
      |row| row.get(0),
    )?;
    Ok(count as usize)
  }

  /// Fetch one record back as JSON, mainly for inspection and tests.
  #[allow(dead_code)]
  pub fn get(&self, entity_type: &str, record_key: &str) -> Result<Option<serde_json::Value>, DataError> {
    let conn = self.lock()?;
    let mut stmt =
      conn.prepare("SELECT data FROM records WHERE entity_type = ? AND record_key = ?")?;
    let data: Option<String> = stmt
      .query_row(params![entity_type, record_key], |row| row.get(0))
      .ok();
    match data {
      Some(text) => Ok(Some(serde_json::from_str(&text)?)),
      None => Ok(None),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_upsert_and_count() {
    let store = RecordStore::in_memory().unwrap();
    store.upsert("race", "2025-1", &json!({"name": "Australian Grand Prix"})).unwrap();
    store.upsert("race", "2025-2", &json!({"name": "Chinese Grand Prix"})).unwrap();
    store.upsert("race", "2025-1", &json!({"name": "Australian GP"})).unwrap();

    assert_eq!(store.count("race").unwrap(), 2);
    assert_eq!(store.count("driver").unwrap(), 0);

    let record = store.get("race", "2025-1").unwrap().unwrap();
    assert_eq!(record["name"], "Australian GP");
  }
}
