//! HTTP client and endpoint set for the season-scoped results API.

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::config::UpstreamConfig;
use crate::error::DataError;

use super::fallback::Transport;

/// URL builders for the upstream REST shape, season-scoped throughout.
#[derive(Debug, Clone)]
pub struct Endpoints {
  base_url: String,
}

impl Endpoints {
  pub fn new(base_url: &str) -> Self {
    Self {
      base_url: base_url.trim_end_matches('/').to_string(),
    }
  }

  /// Season schedule: `/{season}.json`
  pub fn season(&self, season: i64) -> String {
    format!("{}/{}.json", self.base_url, season)
  }

  /// `/{season}/driverStandings.json`
  pub fn driver_standings(&self, season: i64) -> String {
    format!("{}/{}/driverStandings.json", self.base_url, season)
  }

  /// `/{season}/constructorStandings.json`
  pub fn constructor_standings(&self, season: i64) -> String {
    format!("{}/{}/constructorStandings.json", self.base_url, season)
  }

  /// `/{season}/drivers.json`
  pub fn drivers(&self, season: i64) -> String {
    format!("{}/{}/drivers.json", self.base_url, season)
  }

  /// `/{season}/constructors.json`
  pub fn constructors(&self, season: i64) -> String {
    format!("{}/{}/constructors.json", self.base_url, season)
  }

  /// `/{season}/{round}/results.json`
  pub fn results(&self, season: i64, round: i64) -> String {
    format!("{}/{}/{}/results.json", self.base_url, season, round)
  }
}

/// Client for the upstream REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct UpstreamClient {
  http: Client,
}

impl UpstreamClient {
  pub fn new(config: &UpstreamConfig) -> Result<Self, DataError> {
    let http = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self { http })
  }
}

impl Transport for UpstreamClient {
  fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, DataError>> + Send {
    let http = self.http.clone();
    let url = url.to_string();
    async move {
      let response = http.get(&url).send().await?;
      let status = response.status();
      if !status.is_success() {
        return Err(DataError::from_status(status, &url));
      }
      let body = response.text().await?;
      let value: Value = serde_json::from_str(&body)?;
      Ok(value)
    }
  }
}
