//! Generic in-memory key/value cache with per-entry time-to-live.
//!
//! Entries are never evicted by a background sweep; freshness is judged at
//! read time. An expired entry stays retrievable through [`TtlCache::get_stale`]
//! so the fetch layer can serve it as a degraded fallback. Memory is bounded
//! only by what callers store; bounded-LRU semantics are an explicit
//! non-goal at current entity volumes.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Result of a freshness-checked cache lookup.
///
/// An expired entry and a missing entry are both a `Miss`: callers get a
/// single failure branch, and the distinction only matters to the degrade
/// chain, which asks for it explicitly via `get_stale`.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
  Hit(V),
  Miss,
}

/// An entry retrieved while ignoring expiry.
#[derive(Debug, Clone)]
pub struct Stale<V> {
  pub value: V,
  pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Entry<V> {
  value: V,
  stored_at: DateTime<Utc>,
  ttl: Duration,
}

impl<V> Entry<V> {
  fn is_fresh(&self, now: DateTime<Utc>) -> bool {
    now - self.stored_at < self.ttl
  }
}

/// Snapshot of cache contents for diagnostics.
#[derive(Debug, Clone)]
pub struct CacheStats {
  pub size: usize,
  pub keys: Vec<String>,
}

/// Expiring key/value store.
#[derive(Debug, Default)]
pub struct TtlCache<V> {
  entries: HashMap<String, Entry<V>>,
}

impl<V: Clone> TtlCache<V> {
  pub fn new() -> Self {
    Self {
      entries: HashMap::new(),
    }
  }

  /// Look up a key, returning a hit only for present-and-fresh entries.
  pub fn get(&self, key: &str) -> Lookup<V> {
    let now = Utc::now();
    match self.entries.get(key) {
      Some(entry) if entry.is_fresh(now) => Lookup::Hit(entry.value.clone()),
      _ => Lookup::Miss,
    }
  }

  /// Look up a key ignoring expiry.
  ///
  /// This is the degrade chain's expired-cache step; it must never be
  /// preferred over a fresh network result.
  pub fn get_stale(&self, key: &str) -> Option<Stale<V>> {
    self.entries.get(key).map(|entry| Stale {
      value: entry.value.clone(),
      stored_at: entry.stored_at,
    })
  }

  /// Store a value, overwriting any previous entry under the key.
  pub fn set(&mut self, key: &str, value: V, ttl: Duration) {
    self.entries.insert(
      key.to_string(),
      Entry {
        value,
        stored_at: Utc::now(),
        ttl,
      },
    );
  }

  /// Drop every entry.
  #[allow(dead_code)]
  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn stats(&self) -> CacheStats {
    let mut keys: Vec<String> = self.entries.keys().cloned().collect();
    keys.sort();
    CacheStats {
      size: self.entries.len(),
      keys,
    }
  }

  #[cfg(test)]
  fn backdate(&mut self, key: &str, age: Duration) {
    if let Some(entry) = self.entries.get_mut(key) {
      entry.stored_at = Utc::now() - age;
    }
  }
}

/// TTL classes used by the fetch layer.
///
/// `Short` suits live-oriented data, `Medium` and `Long` slow-changing
/// reference data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
  Short,
  Medium,
  Long,
}

impl TtlClass {
  pub fn duration(self) -> Duration {
    match self {
      TtlClass::Short => Duration::minutes(1),
      TtlClass::Medium => Duration::minutes(30),
      TtlClass::Long => Duration::hours(24),
    }
  }
}
