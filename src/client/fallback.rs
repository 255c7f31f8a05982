//! Fallback-aware fetch client.
//!
//! Wraps a [`Transport`] with the TTL cache and a fixed degrade chain:
//! fresh cache, network, prior-season rewrite, expired cache, caller
//! default. The upstream occasionally has no data published for the
//! current season yet; rather than surface an error, the chain masks it
//! with the prior season's data and availability wins over
//! source-accuracy. Degraded serves are only visible in logs and in the
//! [`Provenance`] tag on the result.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{CacheStats, Lookup, TtlCache, TtlClass};
use crate::error::DataError;

/// Seam between the fetch layer and the actual HTTP client.
pub trait Transport: Send + Sync {
  /// GET the URL and parse the body as JSON.
  fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, DataError>> + Send;
}

/// Where a fetched value came from.
///
/// Exists to drive logging and to let callers decide whether a
/// background refresh is worthwhile; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
  /// Fresh cache hit or a successful network fetch.
  Fresh,
  /// Served from the rewritten prior-season endpoint.
  FallbackSeason,
  /// Served from an expired cache entry.
  StaleCache,
  /// Served from the caller-supplied default.
  Default,
}

impl Provenance {
  pub fn is_degraded(self) -> bool {
    self != Provenance::Fresh
  }
}

/// A value annotated with its provenance.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub value: T,
  pub provenance: Provenance,
}

/// Rewrite rule applied when the original URL fails.
pub trait SeasonRewrite: Send + Sync {
  /// Return the URL to retry against, or `None` if the rule does not
  /// apply to this URL.
  fn rewrite(&self, url: &str) -> Option<String>;
}

/// Earliest season the upstream has data for.
const FIRST_SEASON: i64 = 1950;

/// Rewrites the season path segment to the immediately prior season.
///
/// Matches the first path segment that parses as a four-digit year
/// (with or without a `.json` suffix); seasons at the 1950 floor do not
/// rewrite.
pub struct PriorSeasonRewrite;

impl SeasonRewrite for PriorSeasonRewrite {
  fn rewrite(&self, url: &str) -> Option<String> {
    let mut segments: Vec<String> = url.split('/').map(String::from).collect();
    for segment in segments.iter_mut() {
      let (stem, suffix) = match segment.strip_suffix(".json") {
        Some(stem) => (stem, ".json"),
        None => (segment.as_str(), ""),
      };
      if stem.len() != 4 || !stem.chars().all(|c| c.is_ascii_digit()) {
        continue;
      }
      let year: i64 = match stem.parse() {
        Ok(y) => y,
        Err(_) => continue,
      };
      if year <= FIRST_SEASON || year > 2100 {
        return None;
      }
      *segment = format!("{}{}", year - 1, suffix);
      return Some(segments.join("/"));
    }
    None
  }
}

/// Fetch client walking the degrade chain of increasingly-less-accurate
/// sources. Each step is only attempted after the prior one has failed;
/// latency is additive across fallback depth.
pub struct FallbackClient<T: Transport> {
  transport: T,
  cache: Mutex<TtlCache<Value>>,
  rewrite: Option<Box<dyn SeasonRewrite>>,
}

impl<T: Transport> FallbackClient<T> {
  pub fn new(transport: T) -> Self {
    Self {
      transport,
      cache: Mutex::new(TtlCache::new()),
      rewrite: None,
    }
  }

  pub fn with_rewrite(mut self, rule: impl SeasonRewrite + 'static) -> Self {
    self.rewrite = Some(Box::new(rule));
    self
  }

  fn cache(&self) -> MutexGuard<'_, TtlCache<Value>> {
    self.cache.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fetch with the full degrade chain, fresh cache first.
  pub async fn fetch(
    &self,
    url: &str,
    ttl: TtlClass,
    default: Option<Value>,
  ) -> Result<Fetched<Value>, DataError> {
    self.run_chain(url, ttl, default, true).await
  }

  /// Fetch skipping the fresh-cache step (forced resync). The result
  /// still lands in the cache and the rest of the chain still applies.
  pub async fn refresh(
    &self,
    url: &str,
    ttl: TtlClass,
    default: Option<Value>,
  ) -> Result<Fetched<Value>, DataError> {
    self.run_chain(url, ttl, default, false).await
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cache().stats()
  }

  #[allow(dead_code)]
  pub fn clear_cache(&self) {
    self.cache().clear();
  }

  async fn run_chain(
    &self,
    url: &str,
    ttl: TtlClass,
    default: Option<Value>,
    use_fresh_cache: bool,
  ) -> Result<Fetched<Value>, DataError> {
    if use_fresh_cache {
      if let Some(value) = self.try_fresh_cache(url) {
        return Ok(Fetched {
          value,
          provenance: Provenance::Fresh,
        });
      }
    }

    if let Some(value) = self.try_network(url, ttl).await {
      return Ok(Fetched {
        value,
        provenance: Provenance::Fresh,
      });
    }

    if let Some(value) = self.try_fallback_season(url, ttl).await {
      return Ok(Fetched {
        value,
        provenance: Provenance::FallbackSeason,
      });
    }

    if let Some(value) = self.try_expired_cache(url) {
      return Ok(Fetched {
        value,
        provenance: Provenance::StaleCache,
      });
    }

    if let Some(value) = default {
      warn!(url, "serving caller default, all sources failed");
      return Ok(Fetched {
        value,
        provenance: Provenance::Default,
      });
    }

    Err(DataError::Unavailable(url.to_string()))
  }

  fn try_fresh_cache(&self, url: &str) -> Option<Value> {
    match self.cache().get(url) {
      Lookup::Hit(value) => {
        debug!(url, "cache hit");
        Some(value)
      }
      Lookup::Miss => None,
    }
  }

  async fn try_network(&self, url: &str, ttl: TtlClass) -> Option<Value> {
    match self.transport.get_json(url).await {
      Ok(value) => {
        self.cache().set(url, value.clone(), ttl.duration());
        Some(value)
      }
      Err(e) => {
        debug!(url, error = %e, "network fetch failed");
        None
      }
    }
  }

  async fn try_fallback_season(&self, url: &str, ttl: TtlClass) -> Option<Value> {
    let rule = self.rewrite.as_ref()?;
    let rewritten = rule.rewrite(url)?;
    match self.transport.get_json(&rewritten).await {
      Ok(value) => {
        // Cached under the original key so future lookups of the
        // original URL hit this result.
        self.cache().set(url, value.clone(), ttl.duration());
        warn!(url, fallback = %rewritten, "serving prior-season fallback");
        Some(value)
      }
      Err(e) => {
        debug!(url, fallback = %rewritten, error = %e, "fallback season fetch failed");
        None
      }
    }
  }

  fn try_expired_cache(&self, url: &str) -> Option<Value> {
    let stale = self.cache().get_stale(url)?;
    warn!(url, stored_at = %stale.stored_at, "serving expired cache entry");
    Some(stale.value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  /// Transport that answers from a fixed table and records every request.
  struct MockTransport {
    responses: std::collections::HashMap<String, Value>,
    log: Mutex<Vec<String>>,
  }

  impl MockTransport {
    fn new() -> Self {
      Self {
        responses: std::collections::HashMap::new(),
        log: Mutex::new(Vec::new()),
      }
    }

    fn respond(mut self, url: &str, value: Value) -> Self {
      self.responses.insert(url.to_string(), value);
      self
    }

    fn requests(&self) -> Vec<String> {
      self.log.lock().unwrap().clone()
    }
  }

  impl Transport for MockTransport {
    fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, DataError>> + Send {
      self.log.lock().unwrap().push(url.to_string());
      let result = self
        .responses
        .get(url)
        .cloned()
        .ok_or_else(|| DataError::Network(format!("unreachable: {}", url)));
      async move { result }
    }
  }

  #[test]
  fn test_prior_season_rewrite() {
    let rule = PriorSeasonRewrite;
    assert_eq!(
      rule.rewrite("https://api.example.com/f1/2025/driverStandings.json"),
      Some("https://api.example.com/f1/2024/driverStandings.json".to_string())
    );
    assert_eq!(
      rule.rewrite("https://api.example.com/f1/2025.json"),
      Some("https://api.example.com/f1/2024.json".to_string())
    );
    // Floor season never rewrites.
    assert_eq!(rule.rewrite("https://api.example.com/f1/1950.json"), None);
    // No season segment at all.
    assert_eq!(rule.rewrite("https://api.example.com/f1/current.json"), None);
  }

  #[tokio::test]
  async fn test_network_success_is_fresh_and_cached() {
    let url = "https://api.example.com/f1/2025.json";
    let transport = MockTransport::new().respond(url, json!({"races": 24}));
    let client = FallbackClient::new(transport);

    let fetched = client.fetch(url, TtlClass::Medium, None).await.unwrap();
    assert_eq!(fetched.provenance, Provenance::Fresh);
    assert_eq!(fetched.value, json!({"races": 24}));

    // Second fetch is a cache hit: no new request.
    let again = client.fetch(url, TtlClass::Medium, None).await.unwrap();
    assert_eq!(again.provenance, Provenance::Fresh);
    assert_eq!(client.transport.requests().len(), 1);
  }

  #[tokio::test]
  async fn test_fallback_season_caches_under_original_key() {
    let url = "https://api.example.com/f1/2025/driverStandings.json";
    let prior = "https://api.example.com/f1/2024/driverStandings.json";
    let transport = MockTransport::new().respond(prior, json!({"standings": []}));
    let client = FallbackClient::new(transport).with_rewrite(PriorSeasonRewrite);

    let fetched = client.fetch(url, TtlClass::Medium, None).await.unwrap();
    assert_eq!(fetched.provenance, Provenance::FallbackSeason);
    assert_eq!(client.transport.requests(), vec![url, prior]);

    // The original key now hits the cache directly.
    let again = client.fetch(url, TtlClass::Medium, None).await.unwrap();
    assert_eq!(again.provenance, Provenance::Fresh);
    assert_eq!(client.transport.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_chain_order_with_everything_failing() {
    let url = "https://api.example.com/f1/2025/driverStandings.json";
    let prior = "https://api.example.com/f1/2024/driverStandings.json";
    let client = FallbackClient::new(MockTransport::new()).with_rewrite(PriorSeasonRewrite);

    // Seed an entry and expire it so the stale step has something to serve.
    {
      let mut cache = client.cache();
      cache.set(url, json!({"stale": true}), chrono::Duration::seconds(-1));
    }

    let fetched = client.fetch(url, TtlClass::Short, None).await.unwrap();
    assert_eq!(fetched.provenance, Provenance::StaleCache);
    assert_eq!(fetched.value, json!({"stale": true}));
    // Exactly one rewritten retry, attempted before the stale serve.
    assert_eq!(client.transport.requests(), vec![url, prior]);
  }

  #[tokio::test]
  async fn test_default_then_unavailable() {
    let url = "https://api.example.com/f1/2025.json";
    let client = FallbackClient::new(MockTransport::new()).with_rewrite(PriorSeasonRewrite);

    let fetched = client
      .fetch(url, TtlClass::Short, Some(json!({"default": true})))
      .await
      .unwrap();
    assert_eq!(fetched.provenance, Provenance::Default);

    let err = client.fetch(url, TtlClass::Short, None).await.unwrap_err();
    assert!(matches!(err, DataError::Unavailable(_)));
  }

  #[tokio::test]
  async fn test_refresh_bypasses_fresh_cache() {
    let url = "https://api.example.com/f1/2025.json";
    let transport = MockTransport::new().respond(url, json!({"v": 1}));
    let client = FallbackClient::new(transport);

    client.fetch(url, TtlClass::Long, None).await.unwrap();
    let refreshed = client.refresh(url, TtlClass::Long, None).await.unwrap();
    assert_eq!(refreshed.provenance, Provenance::Fresh);
    // Both calls reached the network despite the fresh cache entry.
    assert_eq!(client.transport.requests().len(), 2);
  }
}
