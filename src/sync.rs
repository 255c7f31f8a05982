//! Sync trigger: refresh one entity class from the upstream into the
//! record store.
//!
//! The request/response shapes mirror the trigger endpoint's wire
//! contract; routing and authentication of that endpoint live outside
//! this layer. Every record passes the validation gate before it is
//! sanitized and persisted; invalid records are skipped and counted,
//! never silently coerced into storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::TtlClass;
use crate::client::{Endpoints, FallbackClient, Transport};
use crate::error::DataError;
use crate::store::RecordStore;
use crate::validate::{
  sanitize_constructor, sanitize_driver, sanitize_lap_time, sanitize_race, validate_constructor,
  validate_driver, validate_lap_time, validate_race, ValidationOutcome,
};

/// Entity classes the trigger can refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
  Races,
  Drivers,
  Constructors,
  Results,
}

impl SyncKind {
  fn entity_type(self) -> &'static str {
    match self {
      SyncKind::Races => "race",
      SyncKind::Drivers => "driver",
      SyncKind::Constructors => "constructor",
      SyncKind::Results => "result",
    }
  }

  fn ttl(self) -> TtlClass {
    match self {
      // Schedules and results move during a season.
      SyncKind::Races | SyncKind::Results => TtlClass::Medium,
      // Driver and constructor reference data barely changes.
      SyncKind::Drivers | SyncKind::Constructors => TtlClass::Long,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
  #[serde(rename = "type")]
  pub kind: SyncKind,
  pub season: Option<i64>,
  pub round: Option<i64>,
  #[serde(default)]
  pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  pub timestamp: DateTime<Utc>,
}

impl SyncResponse {
  fn ok(message: String) -> Self {
    Self {
      success: true,
      message: Some(message),
      error: None,
      timestamp: Utc::now(),
    }
  }

  fn fail(error: String) -> Self {
    Self {
      success: false,
      message: None,
      error: Some(error),
      timestamp: Utc::now(),
    }
  }
}

/// Orchestrates fetch → validate → sanitize → persist for one trigger.
pub struct SyncService<T: Transport> {
  client: FallbackClient<T>,
  endpoints: Endpoints,
  store: RecordStore,
  default_season: i64,
}

impl<T: Transport> SyncService<T> {
  pub fn new(
    client: FallbackClient<T>,
    endpoints: Endpoints,
    store: RecordStore,
    default_season: i64,
  ) -> Self {
    Self {
      client,
      endpoints,
      store,
      default_season,
    }
  }

  pub fn store(&self) -> &RecordStore {
    &self.store
  }

  /// Handle one trigger request. Never panics or propagates; failures
  /// are folded into the response the way the endpoint reports them.
  pub async fn handle(&self, request: &SyncRequest) -> SyncResponse {
    match self.run(request).await {
      Ok(message) => SyncResponse::ok(message),
      Err(e) => {
        warn!(kind = ?request.kind, error = %e, "sync failed");
        SyncResponse::fail(e.to_string())
      }
    }
  }

  async fn run(&self, request: &SyncRequest) -> Result<String, DataError> {
    let season = request.season.unwrap_or(self.default_season);
    let url = match request.kind {
      SyncKind::Races => self.endpoints.season(season),
      SyncKind::Drivers => self.endpoints.drivers(season),
      SyncKind::Constructors => self.endpoints.constructors(season),
      SyncKind::Results => {
        let round = request
          .round
          .ok_or_else(|| DataError::Validation("results sync requires a round".to_string()))?;
        self.endpoints.results(season, round)
      }
    };

    let ttl = request.kind.ttl();
    let fetched = if request.force {
      self.client.refresh(&url, ttl, None).await?
    } else {
      self.client.fetch(&url, ttl, None).await?
    };

    let raws = extract_records(request.kind, &fetched.value)?;
    let entity_type = request.kind.entity_type();

    let mut stored = 0usize;
    let mut skipped = 0usize;
    for raw in &raws {
      let mapped = map_record(request.kind, raw);
      let outcome = validate_record(request.kind, &mapped);
      if !outcome.is_valid() {
        skipped += 1;
        warn!(entity_type, errors = ?outcome.errors, "skipping invalid record");
        continue;
      }
      if !outcome.warnings.is_empty() {
        debug!(entity_type, warnings = ?outcome.warnings, "record has cosmetic issues");
      }

      match sanitize_record(request.kind, &mapped) {
        Some((key, record)) => {
          self.store.upsert(entity_type, &key, &record)?;
          stored += 1;
        }
        None => {
          // Validation passed but identity fields still sanitized to
          // null; treat as a skip rather than storing a keyless row.
          skipped += 1;
          warn!(entity_type, "record lost its identity during sanitization");
        }
      }
    }

    let mut message = format!(
      "synced {} {} record(s), {} skipped",
      stored, entity_type, skipped
    );
    if fetched.provenance.is_degraded() {
      message.push_str(&format!(" (source: {:?})", fetched.provenance));
    }
    Ok(message)
  }
}

/// Pull the entity array out of a season-scoped response document.
/// Accepts both the flat shape and the nested upstream table shape.
fn extract_records(kind: SyncKind, doc: &Value) -> Result<Vec<Value>, DataError> {
  let pointers: &[&str] = match kind {
    SyncKind::Races => &["/races", "/MRData/RaceTable/Races"],
    SyncKind::Drivers => &["/drivers", "/MRData/DriverTable/Drivers"],
    SyncKind::Constructors => &["/constructors", "/MRData/ConstructorTable/Constructors"],
    SyncKind::Results => &["/results", "/MRData/RaceTable/Races/0/Results"],
  };

  for pointer in pointers {
    if let Some(Value::Array(items)) = doc.pointer(pointer) {
      return Ok(items.clone());
    }
  }

  Err(DataError::Parse(format!(
    "no {} array found in response document",
    kind.entity_type()
  )))
}

/// Normalize an upstream record to the canonical field names the
/// validators and sanitizers know. Canonical keys win when present.
fn map_record(kind: SyncKind, raw: &Value) -> Value {
  let pick = |keys: &[&str]| -> Value {
    for key in keys {
      if let Some(v) = raw.pointer(&format!("/{}", key.replace('.', "/"))) {
        if !v.is_null() {
          return v.clone();
        }
      }
    }
    Value::Null
  };

  match kind {
    SyncKind::Races => json!({
      "season": pick(&["season"]),
      "round": pick(&["round"]),
      "name": pick(&["name", "raceName"]),
      "circuit": pick(&["circuit", "Circuit.circuitName"]),
      "race_date": pick(&["race_date", "date"]),
      "race_time": pick(&["race_time", "time"]),
      "url": pick(&["url"]),
    }),
    SyncKind::Drivers => json!({
      "driver_id": pick(&["driver_id", "driverId"]),
      "number": pick(&["number", "permanentNumber"]),
      "code": pick(&["code"]),
      "given_name": pick(&["given_name", "givenName"]),
      "family_name": pick(&["family_name", "familyName"]),
      "nationality": pick(&["nationality"]),
      "date_of_birth": pick(&["date_of_birth", "dateOfBirth"]),
    }),
    SyncKind::Constructors => json!({
      "constructor_id": pick(&["constructor_id", "constructorId"]),
      "name": pick(&["name"]),
      "nationality": pick(&["nationality"]),
      "color": pick(&["color"]),
    }),
    SyncKind::Results => json!({
      "driver_id": pick(&["driver_id", "Driver.driverId"]),
      "lap": pick(&["lap", "laps"]),
      "position": pick(&["position"]),
      "time": pick(&["time", "FastestLap.Time.time"]),
      "session_type": pick(&["session_type"]),
    }),
  }
}

fn validate_record(kind: SyncKind, mapped: &Value) -> ValidationOutcome {
  match kind {
    SyncKind::Races => validate_race(mapped),
    SyncKind::Drivers => validate_driver(mapped),
    SyncKind::Constructors => validate_constructor(mapped),
    SyncKind::Results => validate_lap_time(mapped),
  }
}

fn sanitize_record(kind: SyncKind, mapped: &Value) -> Option<(String, Value)> {
  match kind {
    SyncKind::Races => {
      let record = sanitize_race(mapped);
      Some((record.record_key()?, serde_json::to_value(&record).ok()?))
    }
    SyncKind::Drivers => {
      let record = sanitize_driver(mapped);
      Some((record.record_key()?, serde_json::to_value(&record).ok()?))
    }
    SyncKind::Constructors => {
      let record = sanitize_constructor(mapped);
      Some((record.record_key()?, serde_json::to_value(&record).ok()?))
    }
    SyncKind::Results => {
      let record = sanitize_lap_time(mapped);
      Some((record.record_key()?, serde_json::to_value(&record).ok()?))
    }
  }
}
