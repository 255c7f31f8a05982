//! Multi-tier offline cache at the network boundary.
//!
//! Intercepts outbound requests and picks a caching strategy per request
//! class: cache-first for immutable assets, stale-while-revalidate for
//! API responses, network-first for navigations and everything else.
//! Buckets are persistent and origin-scoped, so a device that has seen a
//! response once can keep serving it across process restarts while
//! offline. Operates independently of the in-process TTL cache: it must
//! survive process restarts, which an in-memory cache cannot.

mod store;

pub use store::{BucketStore, StoredResponse};

use std::future::Future;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};

use crate::error::DataError;

/// An outbound request seen at the boundary.
#[derive(Debug, Clone)]
pub struct BoundaryRequest {
  pub url: String,
  /// Full-page navigation, as opposed to a subresource or data fetch.
  pub navigation: bool,
}

impl BoundaryRequest {
  pub fn get(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      navigation: false,
    }
  }

  pub fn navigation(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      navigation: true,
    }
  }
}

/// Where the response the caller received actually came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  Network,
  Bucket,
  Fallback,
}

#[derive(Debug, Clone)]
pub struct BoundaryResponse {
  pub status: u16,
  pub content_type: String,
  pub body: Vec<u8>,
  pub served_from: ServedFrom,
}

impl BoundaryResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  fn from_stored(stored: StoredResponse) -> Self {
    Self {
      status: stored.status,
      content_type: stored.content_type,
      body: stored.body,
      served_from: ServedFrom::Bucket,
    }
  }

  /// Fixed placeholder for an asset that was never cached.
  fn asset_placeholder() -> Self {
    Self {
      status: 503,
      content_type: "text/plain".to_string(),
      body: b"Asset unavailable offline".to_vec(),
      served_from: ServedFrom::Fallback,
    }
  }

  /// Structured offline payload for an API request with no cached entry.
  fn offline_api() -> Self {
    let payload = json!({"error": "Data not available offline", "offline": true});
    Self {
      status: 503,
      content_type: "application/json".to_string(),
      body: payload.to_string().into_bytes(),
      served_from: ServedFrom::Fallback,
    }
  }

  /// Minimal offline page for a navigation with no cached shell.
  fn offline_page() -> Self {
    Self {
      status: 503,
      content_type: "text/html".to_string(),
      body: b"<!doctype html><title>Offline</title><h1>You are offline</h1><p>Reconnect to load fresh data.</p>".to_vec(),
      served_from: ServedFrom::Fallback,
    }
  }

  fn offline_generic() -> Self {
    Self {
      status: 503,
      content_type: "text/plain".to_string(),
      body: b"Offline - resource unavailable".to_vec(),
      served_from: ServedFrom::Fallback,
    }
  }
}

/// Request classes, each mapped to one caching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  StaticAsset,
  Api,
  Navigation,
  Dynamic,
}

impl RequestClass {
  fn bucket_base(self) -> &'static str {
    match self {
      RequestClass::StaticAsset => "static",
      RequestClass::Api => "api",
      RequestClass::Navigation => "navigation",
      RequestClass::Dynamic => "dynamic",
    }
  }

  const ALL: [RequestClass; 4] = [
    RequestClass::StaticAsset,
    RequestClass::Api,
    RequestClass::Navigation,
    RequestClass::Dynamic,
  ];
}

const ASSET_EXTENSIONS: &[&str] = &[
  ".js", ".css", ".png", ".jpg", ".jpeg", ".svg", ".ico", ".webp", ".woff2",
];

/// Classify a request by its URL shape. The navigation flag wins.
pub fn classify(request: &BoundaryRequest) -> RequestClass {
  if request.navigation {
    return RequestClass::Navigation;
  }

  let path = url::Url::parse(&request.url)
    .map(|u| u.path().to_string())
    .unwrap_or_else(|_| request.url.clone());

  if path.starts_with("/assets/") || ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
    return RequestClass::StaticAsset;
  }

  if path.contains("/api/") || path.ends_with(".json") {
    return RequestClass::Api;
  }

  RequestClass::Dynamic
}

/// Seam between the gateway and the actual network.
pub trait BoundaryFetch: Send + Sync + 'static {
  fn fetch(&self, url: &str) -> impl Future<Output = Result<BoundaryResponse, DataError>> + Send;
}

/// reqwest-backed boundary fetch.
#[derive(Clone)]
pub struct HttpBoundaryFetch {
  http: reqwest::Client,
}

impl HttpBoundaryFetch {
  pub fn new(timeout_secs: u64) -> Result<Self, DataError> {
    let http = reqwest::Client::builder()
      .timeout(std::time::Duration::from_secs(timeout_secs))
      .build()?;
    Ok(Self { http })
  }
}

impl BoundaryFetch for HttpBoundaryFetch {
  fn fetch(&self, url: &str) -> impl Future<Output = Result<BoundaryResponse, DataError>> + Send {
    let http = self.http.clone();
    let url = url.to_string();
    async move {
      let response = http.get(&url).send().await?;
      let status = response.status().as_u16();
      let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
      let body = response.bytes().await?.to_vec();
      Ok(BoundaryResponse {
        status,
        content_type,
        body,
        served_from: ServedFrom::Network,
      })
    }
  }
}

/// Boundary-process lifecycle. Exactly one `Active` generation serves
/// cached traffic; stale buckets are purged during activation, never
/// during request handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  Installing,
  Installed,
  Activating,
  Active,
}

/// The interception layer itself.
pub struct OfflineGateway<F: BoundaryFetch> {
  store: Arc<BucketStore>,
  fetch: Arc<F>,
  version: String,
  state: Lifecycle,
}

impl<F: BoundaryFetch> OfflineGateway<F> {
  pub fn new(store: BucketStore, fetch: F, version: impl Into<String>) -> Self {
    Self {
      store: Arc::new(store),
      fetch: Arc::new(fetch),
      version: version.into(),
      state: Lifecycle::Installing,
    }
  }

  #[allow(dead_code)]
  pub fn state(&self) -> Lifecycle {
    self.state
  }

  fn bucket_name(&self, class: RequestClass) -> String {
    format!("{}-{}", class.bucket_base(), self.version)
  }

  /// Populate the static bucket with the precache set.
  ///
  /// Any precache failure fails the install: a partially-populated shell
  /// is worse than retrying the whole install later.
  pub async fn install(&mut self, precache: &[String]) -> Result<(), DataError> {
    self.state = Lifecycle::Installing;
    let bucket = self.bucket_name(RequestClass::StaticAsset);

    let responses =
      futures::future::try_join_all(precache.iter().map(|url| self.fetch.fetch(url))).await?;

    for (url, response) in precache.iter().zip(responses) {
      if !response.is_success() {
        return Err(DataError::Network(format!(
          "precache of {} returned status {}",
          url, response.status
        )));
      }
      self
        .store
        .put(&bucket, url, response.status, &response.content_type, &response.body)?;
    }

    self.state = Lifecycle::Installed;
    Ok(())
  }

  /// Purge buckets from prior versions and start serving cached traffic.
  /// Returns the number of entries purged.
  pub async fn activate(&mut self) -> Result<usize, DataError> {
    self.state = Lifecycle::Activating;
    let keep: Vec<String> = RequestClass::ALL
      .iter()
      .map(|class| self.bucket_name(*class))
      .collect();
    let purged = self.store.delete_buckets_except(&keep)?;
    self.state = Lifecycle::Active;
    Ok(purged)
  }

  /// Intercept one request. Always produces a response; storage failures
  /// degrade to a miss and network failures degrade to the class's
  /// offline fallback.
  pub async fn handle(&self, request: &BoundaryRequest) -> BoundaryResponse {
    if self.state != Lifecycle::Active {
      return match self.fetch.fetch(&request.url).await {
        Ok(response) => response,
        Err(_) => BoundaryResponse::offline_generic(),
      };
    }

    match classify(request) {
      RequestClass::StaticAsset => self.cache_first(request).await,
      RequestClass::Api => self.stale_while_revalidate(request).await,
      RequestClass::Navigation => {
        self
          .network_first(request, RequestClass::Navigation, BoundaryResponse::offline_page)
          .await
      }
      RequestClass::Dynamic => {
        self
          .network_first(request, RequestClass::Dynamic, BoundaryResponse::offline_generic)
          .await
      }
    }
  }

  /// Serve from the bucket if present; fetch-store-serve on miss.
  async fn cache_first(&self, request: &BoundaryRequest) -> BoundaryResponse {
    let bucket = self.bucket_name(RequestClass::StaticAsset);
    if let Some(stored) = self.lookup(&bucket, &request.url) {
      return BoundaryResponse::from_stored(stored);
    }

    match self.fetch.fetch(&request.url).await {
      Ok(response) => {
        if response.is_success() {
          self.store_response(&bucket, &request.url, &response);
        }
        response
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "static asset unreachable and not cached");
        BoundaryResponse::asset_placeholder()
      }
    }
  }

  /// Serve the cached entry immediately and refresh it in the background;
  /// block on the network only when nothing is cached.
  async fn stale_while_revalidate(&self, request: &BoundaryRequest) -> BoundaryResponse {
    let bucket = self.bucket_name(RequestClass::Api);
    if let Some(stored) = self.lookup(&bucket, &request.url) {
      self.spawn_revalidate(bucket, request.url.clone());
      return BoundaryResponse::from_stored(stored);
    }

    match self.fetch.fetch(&request.url).await {
      Ok(response) => {
        if response.is_success() {
          self.store_response(&bucket, &request.url, &response);
        }
        response
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "api request failed with no cached entry");
        BoundaryResponse::offline_api()
      }
    }
  }

  async fn network_first(
    &self,
    request: &BoundaryRequest,
    class: RequestClass,
    fallback: fn() -> BoundaryResponse,
  ) -> BoundaryResponse {
    let bucket = self.bucket_name(class);
    match self.fetch.fetch(&request.url).await {
      Ok(response) => {
        if response.is_success() {
          self.store_response(&bucket, &request.url, &response);
        }
        response
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network-first falling back to bucket");
        match self.lookup(&bucket, &request.url) {
          Some(stored) => BoundaryResponse::from_stored(stored),
          None => fallback(),
        }
      }
    }
  }

  /// Fire-and-forget refresh; failures are swallowed and the response
  /// already served is never retracted.
  fn spawn_revalidate(&self, bucket: String, url: String) {
    let store = Arc::clone(&self.store);
    let fetch = Arc::clone(&self.fetch);
    tokio::spawn(async move {
      match fetch.fetch(&url).await {
        Ok(response) if response.is_success() => {
          if let Err(e) = store.put(&bucket, &url, response.status, &response.content_type, &response.body)
          {
            debug!(url = %url, error = %e, "revalidation store failed");
          }
        }
        Ok(response) => {
          debug!(url = %url, status = response.status, "revalidation returned non-success");
        }
        Err(e) => {
          debug!(url = %url, error = %e, "revalidation fetch failed");
        }
      }
    });
  }

  fn lookup(&self, bucket: &str, url: &str) -> Option<StoredResponse> {
    match self.store.get(bucket, url) {
      Ok(hit) => {
        if let Some(stored) = &hit {
          debug!(bucket, url, stored_at = %stored.stored_at, "bucket hit");
        }
        hit
      }
      Err(e) => {
        warn!(bucket, url, error = %e, "bucket lookup failed, treating as miss");
        None
      }
    }
  }

  fn store_response(&self, bucket: &str, url: &str, response: &BoundaryResponse) {
    if let Err(e) = self
      .store
      .put(bucket, url, response.status, &response.content_type, &response.body)
    {
      warn!(bucket, url, error = %e, "bucket store failed");
    }
  }
}
