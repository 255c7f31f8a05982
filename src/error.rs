//! Error taxonomy for the data layer.
//!
//! Network and parse failures are recovered step by step inside the
//! fallback chain and only surface as `Unavailable` once the whole chain
//! is exhausted. Validation failures are never silently recovered.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
  #[error("network failure: {0}")]
  Network(String),

  #[error("parse failure: {0}")]
  Parse(String),

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("data unavailable: {0}")]
  Unavailable(String),

  #[error("decompression failure: {0}")]
  Decompression(String),

  #[error("storage error: {0}")]
  Storage(String),
}

impl DataError {
  /// Build a network error from an HTTP status line.
  pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
    DataError::Network(format!("status {} from {}", status, url))
  }
}

impl From<reqwest::Error> for DataError {
  fn from(e: reqwest::Error) -> Self {
    DataError::Network(e.to_string())
  }
}

impl From<serde_json::Error> for DataError {
  fn from(e: serde_json::Error) -> Self {
    DataError::Parse(e.to_string())
  }
}

impl From<rusqlite::Error> for DataError {
  fn from(e: rusqlite::Error) -> Self {
    DataError::Storage(e.to_string())
  }
}
