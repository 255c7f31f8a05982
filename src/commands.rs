//! Subcommand implementations for the pitwall CLI.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;

use crate::cache::TtlClass;
use crate::client::{Endpoints, FallbackClient, PriorSeasonRewrite, UpstreamClient};
use crate::codec::Codec;
use crate::config::Config;
use crate::live::{LiveTimingFeed, TimingQuery};
use crate::offline::{BoundaryRequest, BucketStore, HttpBoundaryFetch, OfflineGateway};
use crate::store::RecordStore;
use crate::sync::{SyncKind, SyncRequest, SyncService};

fn fallback_client(config: &Config) -> Result<FallbackClient<UpstreamClient>> {
  let transport = UpstreamClient::new(&config.upstream)?;
  Ok(FallbackClient::new(transport).with_rewrite(PriorSeasonRewrite))
}

/// `pitwall sync` - refresh one entity class into the record store.
pub async fn sync(
  config: &Config,
  kind: SyncKind,
  season: Option<i64>,
  round: Option<i64>,
  force: bool,
) -> Result<()> {
  let client = fallback_client(config)?;
  let endpoints = Endpoints::new(&config.upstream.base_url);
  let store = RecordStore::open_at(&config.records_db_path()?)?;
  let service = SyncService::new(client, endpoints, store, config.upstream.default_season);

  let response = service
    .handle(&SyncRequest {
      kind,
      season,
      round,
      force,
    })
    .await;

  println!("{}", serde_json::to_string_pretty(&response)?);
  if response.success {
    Ok(())
  } else {
    Err(eyre!(
      "sync failed: {}",
      response.error.unwrap_or_else(|| "unknown error".to_string())
    ))
  }
}

/// `pitwall standings` - print the championship table for a season.
pub async fn standings(config: &Config, season: Option<i64>, constructors: bool) -> Result<()> {
  let client = fallback_client(config)?;
  let endpoints = Endpoints::new(&config.upstream.base_url);
  let season = season.unwrap_or(config.upstream.default_season);

  let url = if constructors {
    endpoints.constructor_standings(season)
  } else {
    endpoints.driver_standings(season)
  };

  let fetched = client.fetch(&url, TtlClass::Medium, None).await?;
  tracing::debug!(stats = ?client.cache_stats(), "fetch cache state");
  if fetched.provenance.is_degraded() {
    println!("(degraded source: {:?})", fetched.provenance);
  }

  let pointers: &[&str] = if constructors {
    &[
      "/standings",
      "/MRData/StandingsTable/StandingsLists/0/ConstructorStandings",
    ]
  } else {
    &[
      "/standings",
      "/MRData/StandingsTable/StandingsLists/0/DriverStandings",
    ]
  };
  let rows = extract_array(&fetched.value, pointers)
    .ok_or_else(|| eyre!("no standings found for season {}", season))?;

  println!("{:>3}  {:<24} {:>7}  {}", "POS", "NAME", "POINTS", "WINS");
  for row in rows {
    let name = if constructors {
      text(&row, &["/name", "/Constructor/name"])
    } else {
      format!(
        "{} {}",
        text(&row, &["/given_name", "/Driver/givenName"]),
        text(&row, &["/family_name", "/Driver/familyName"])
      )
    };
    println!(
      "{:>3}  {:<24} {:>7}  {}",
      text(&row, &["/position"]),
      name.trim(),
      text(&row, &["/points"]),
      text(&row, &["/wins"]),
    );
  }

  Ok(())
}

/// `pitwall races` - print the season schedule.
pub async fn races(config: &Config, season: Option<i64>) -> Result<()> {
  let client = fallback_client(config)?;
  let endpoints = Endpoints::new(&config.upstream.base_url);
  let season = season.unwrap_or(config.upstream.default_season);

  let fetched = client
    .fetch(&endpoints.season(season), TtlClass::Medium, None)
    .await?;
  if fetched.provenance.is_degraded() {
    println!("(degraded source: {:?})", fetched.provenance);
  }

  let rows = extract_array(&fetched.value, &["/races", "/MRData/RaceTable/Races"])
    .ok_or_else(|| eyre!("no races found for season {}", season))?;

  println!("{:>3}  {:<32} {}", "RND", "RACE", "DATE");
  for row in rows {
    println!(
      "{:>3}  {:<32} {}",
      text(&row, &["/round"]),
      text(&row, &["/name", "/raceName"]),
      text(&row, &["/race_date", "/date"]),
    );
  }

  Ok(())
}

/// `pitwall live` - run the mock live-timing stream end to end through
/// the codec and print what the receiver decodes.
pub async fn live(race_id: String, session: Option<String>, updates: usize) -> Result<()> {
  let feed = LiveTimingFeed::new(Codec::default());
  let query = TimingQuery {
    race_id,
    session_type: session,
  };

  let mut rx = feed.stream(&query, updates)?;
  while let Some(wire) = rx.recv().await {
    let frame = feed.decode(&wire)?;
    let leader = frame
      .standings
      .first()
      .map(|row| format!("P1 {} ({})", row.driver_id, row.constructor))
      .unwrap_or_else(|| "empty grid".to_string());
    println!(
      "frame {:>3}  {:>4} bytes on wire  {}  [{}]",
      frame.frame,
      wire.len(),
      leader,
      frame.session_type
    );
  }

  Ok(())
}

/// `pitwall offline warm` - precache the configured shell and activate
/// the current bucket generation.
pub async fn offline_warm(config: &Config) -> Result<()> {
  let mut gateway = open_gateway(config)?;
  gateway.install(&config.offline.precache).await?;
  let purged = gateway.activate().await?;
  println!(
    "offline cache ready: version {}, {} url(s) precached, {} stale entries purged",
    config.offline.version,
    config.offline.precache.len(),
    purged
  );
  Ok(())
}

/// `pitwall offline fetch` - route one request through the boundary
/// cache, exactly as the interception layer would.
pub async fn offline_fetch(config: &Config, url: String, navigation: bool) -> Result<()> {
  let mut gateway = open_gateway(config)?;
  gateway.install(&[]).await?;
  gateway.activate().await?;

  let request = if navigation {
    BoundaryRequest::navigation(url)
  } else {
    BoundaryRequest::get(url)
  };
  let response = gateway.handle(&request).await;

  println!(
    "{} {} (served from {:?})",
    response.status, response.content_type, response.served_from
  );
  let preview = String::from_utf8_lossy(&response.body);
  let preview: String = preview.chars().take(500).collect();
  println!("{}", preview);

  Ok(())
}

fn open_gateway(config: &Config) -> Result<OfflineGateway<HttpBoundaryFetch>> {
  let store = BucketStore::open_at(&config.offline_db_path()?)?;
  let fetch = HttpBoundaryFetch::new(config.upstream.timeout_secs)?;
  Ok(OfflineGateway::new(
    store,
    fetch,
    config.offline.version.as_str(),
  ))
}

fn extract_array(doc: &Value, pointers: &[&str]) -> Option<Vec<Value>> {
  for pointer in pointers {
    if let Some(Value::Array(items)) = doc.pointer(pointer) {
      return Some(items.clone());
    }
  }
  None
}

/// First non-null string-ish value at the given pointers, else "-".
fn text(row: &Value, pointers: &[&str]) -> String {
  for pointer in pointers {
    match row.pointer(pointer) {
      Some(Value::String(s)) if !s.is_empty() => return s.clone(),
      Some(Value::Number(n)) => return n.to_string(),
      _ => continue,
    }
  }
  "-".to_string()
}
