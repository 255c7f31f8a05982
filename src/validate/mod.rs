//! Validation and sanitization gate for records headed to storage.
//!
//! Validation and sanitization are independent passes: validators report
//! hard rule violations (`errors`, which block persistence) and cosmetic
//! formatting problems (`warnings`, which never block); sanitizers never
//! fail and never consult the validators. Callers are expected to
//! validate first and only sanitize-and-persist records with no errors.

mod sanitize;

pub use sanitize::{
  sanitize_constructor, sanitize_driver, sanitize_lap_time, sanitize_race, SanitizedConstructor,
  SanitizedDriver, SanitizedLapTime, SanitizedRace,
};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Earliest season with published data.
pub const FIRST_SEASON: i64 = 1950;

/// Session types accepted on lap-time entries.
pub const SESSION_TYPES: &[&str] = &["race", "qualifying", "sprint", "practice"];

pub(crate) static LAP_TIME_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\d{1,2}:\d{2}\.\d{3}$").unwrap());

pub(crate) static SECTOR_TIME_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\d{1,2}\.\d{3}$").unwrap());

pub(crate) static HEX_COLOR_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap());

/// Result of one validation pass. Produced fresh per call.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
  pub errors: Vec<String>,
  pub warnings: Vec<String>,
}

impl ValidationOutcome {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }

  fn error(&mut self, message: impl Into<String>) {
    self.errors.push(message.into());
  }

  fn warning(&mut self, message: impl Into<String>) {
    self.warnings.push(message.into());
  }
}

// ============================================================================
// Field accessors
// ============================================================================

/// Integer field: accepts a JSON integer or a string holding one (the
/// upstream serves stringly-typed numbers).
fn integer_field(raw: &Value, key: &str) -> Option<i64> {
  match raw.get(key) {
    Some(Value::Number(n)) => n.as_i64(),
    Some(Value::String(s)) => s.trim().parse().ok(),
    _ => None,
  }
}

fn string_field<'a>(raw: &'a Value, key: &str) -> Option<&'a str> {
  raw.get(key).and_then(Value::as_str)
}

fn non_empty_string(raw: &Value, key: &str) -> Option<String> {
  let trimmed = string_field(raw, key)?.trim();
  if trimmed.is_empty() {
    None
  } else {
    Some(trimmed.to_string())
  }
}

fn is_present(raw: &Value, key: &str) -> bool {
  matches!(raw.get(key), Some(v) if !v.is_null())
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
  NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

pub(crate) fn parse_race_time(s: &str) -> Option<chrono::NaiveTime> {
  let trimmed = s.trim().trim_end_matches('Z');
  chrono::NaiveTime::parse_from_str(trimmed, "%H:%M:%S").ok()
}

// ============================================================================
// Entity validators
// ============================================================================

/// Validate a raw race record.
pub fn validate_race(raw: &Value) -> ValidationOutcome {
  let mut outcome = ValidationOutcome::default();

  match integer_field(raw, "season") {
    Some(season) if season >= FIRST_SEASON => {}
    Some(_) => outcome.error(format!("season must be an integer >= {}", FIRST_SEASON)),
    None => outcome.error("season is required and must be an integer"),
  }

  match integer_field(raw, "round") {
    Some(round) if round > 0 => {}
    _ => outcome.error("round must be a positive integer"),
  }

  if non_empty_string(raw, "name").is_none() {
    outcome.error("name is required");
  }

  match string_field(raw, "race_date") {
    Some(s) if parse_date(s).is_some() => {}
    _ => outcome.error("race_date must be a valid YYYY-MM-DD date"),
  }

  if let Some(s) = string_field(raw, "race_time") {
    if parse_race_time(s).is_none() {
      outcome.warning("race_time does not match HH:MM:SS");
    }
  }

  if let Some(s) = string_field(raw, "url") {
    if url::Url::parse(s).is_err() {
      outcome.warning("url is not a valid URL");
    }
  }

  outcome
}

/// Validate a raw driver record.
pub fn validate_driver(raw: &Value) -> ValidationOutcome {
  let mut outcome = ValidationOutcome::default();

  if non_empty_string(raw, "driver_id").is_none() {
    outcome.error("driver_id is required");
  }

  if non_empty_string(raw, "family_name").is_none() {
    outcome.error("family_name is required");
  }

  if is_present(raw, "number") {
    match integer_field(raw, "number") {
      Some(n) if (1..=99).contains(&n) => {}
      _ => outcome.error("number must be an integer between 1 and 99"),
    }
  }

  if let Some(code) = string_field(raw, "code") {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
      outcome.warning("code should be exactly 3 uppercase letters");
    }
  }

  if let Some(nat) = string_field(raw, "nationality") {
    if nat.chars().count() != 3 {
      outcome.warning("nationality should be a 3-character code");
    }
  }

  if let Some(dob) = string_field(raw, "date_of_birth") {
    if parse_date(dob).is_none() {
      outcome.warning("date_of_birth does not match YYYY-MM-DD");
    }
  }

  outcome
}

/// Validate a raw constructor record.
pub fn validate_constructor(raw: &Value) -> ValidationOutcome {
  let mut outcome = ValidationOutcome::default();

  if non_empty_string(raw, "constructor_id").is_none() {
    outcome.error("constructor_id is required");
  }

  if non_empty_string(raw, "name").is_none() {
    outcome.error("name is required");
  }

  if let Some(color) = string_field(raw, "color") {
    if !HEX_COLOR_RE.is_match(color) {
      outcome.warning("color should match #RRGGBB");
    }
  }

  if let Some(nat) = string_field(raw, "nationality") {
    if nat.chars().count() != 3 {
      outcome.warning("nationality should be a 3-character code");
    }
  }

  outcome
}

/// Validate a raw lap-time entry.
pub fn validate_lap_time(raw: &Value) -> ValidationOutcome {
  let mut outcome = ValidationOutcome::default();

  if non_empty_string(raw, "driver_id").is_none() {
    outcome.error("driver_id is required");
  }

  match integer_field(raw, "lap") {
    Some(lap) if lap > 0 => {}
    _ => outcome.error("lap must be a positive integer"),
  }

  if is_present(raw, "position") {
    match integer_field(raw, "position") {
      Some(p) if p > 0 => {}
      _ => outcome.error("position must be a positive integer"),
    }
  }

  if let Some(time) = string_field(raw, "time") {
    if !LAP_TIME_RE.is_match(time.trim()) {
      outcome.warning("time does not match M:SS.mmm");
    }
  }

  for key in ["sector_1", "sector_2", "sector_3"] {
    if let Some(sector) = string_field(raw, key) {
      if !SECTOR_TIME_RE.is_match(sector.trim()) {
        outcome.warning(format!("{} does not match SS.mmm", key));
      }
    }
  }

  if let Some(session) = string_field(raw, "session_type") {
    if !SESSION_TYPES.contains(&session) {
      outcome.warning("session_type is not a recognized session");
    }
  }

  outcome
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_valid_race_passes_clean() {
    let outcome = validate_race(&json!({
      "season": 2025,
      "round": 1,
      "name": "Australian Grand Prix",
      "race_date": "2025-03-16"
    }));
    assert!(outcome.is_valid());
    assert!(outcome.errors.is_empty());
    assert!(outcome.warnings.is_empty());
  }

  #[test]
  fn test_invalid_race_collects_all_errors() {
    let outcome = validate_race(&json!({
      "season": 1900,
      "round": 0,
      "name": "",
      "race_date": "not-a-date"
    }));
    assert!(!outcome.is_valid());
    assert_eq!(outcome.errors.len(), 4);
  }

  #[test]
  fn test_race_accepts_stringly_typed_numbers() {
    let outcome = validate_race(&json!({
      "season": "2025",
      "round": "1",
      "name": "Monaco Grand Prix",
      "race_date": "2025-05-25"
    }));
    assert!(outcome.is_valid());
  }

  #[test]
  fn test_race_cosmetic_problems_are_warnings() {
    let outcome = validate_race(&json!({
      "season": 2025,
      "round": 7,
      "name": "Monaco Grand Prix",
      "race_date": "2025-05-25",
      "race_time": "afternoon",
      "url": "not a url"
    }));
    assert!(outcome.is_valid());
    assert_eq!(outcome.warnings.len(), 2);
  }

  #[test]
  fn test_driver_rules() {
    let outcome = validate_driver(&json!({
      "driver_id": "verstappen",
      "family_name": "Verstappen",
      "number": 1,
      "code": "VER",
      "nationality": "NED"
    }));
    assert!(outcome.is_valid());
    assert!(outcome.warnings.is_empty());

    let outcome = validate_driver(&json!({
      "driver_id": "",
      "number": 120,
      "code": "ver",
      "nationality": "Dutch"
    }));
    // Missing driver_id + family_name, impossible number.
    assert_eq!(outcome.errors.len(), 3);
    // Lowercase code + long nationality.
    assert_eq!(outcome.warnings.len(), 2);
  }

  #[test]
  fn test_constructor_color_rule() {
    let outcome = validate_constructor(&json!({
      "constructor_id": "mclaren",
      "name": "McLaren",
      "color": "#FF8000"
    }));
    assert!(outcome.is_valid());
    assert!(outcome.warnings.is_empty());

    let outcome = validate_constructor(&json!({
      "constructor_id": "mclaren",
      "name": "McLaren",
      "color": "orange"
    }));
    assert!(outcome.is_valid());
    assert_eq!(outcome.warnings.len(), 1);
  }

  #[test]
  fn test_lap_time_rules() {
    let outcome = validate_lap_time(&json!({
      "driver_id": "norris",
      "lap": 12,
      "position": 1,
      "time": "1:23.456",
      "sector_1": "28.111",
      "session_type": "race"
    }));
    assert!(outcome.is_valid());
    assert!(outcome.warnings.is_empty());

    let outcome = validate_lap_time(&json!({
      "driver_id": "norris",
      "lap": 0,
      "time": "fast",
      "sector_2": "28,111",
      "session_type": "warmup"
    }));
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.warnings.len(), 3);
  }
}
