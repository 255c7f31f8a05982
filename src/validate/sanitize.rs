//! Field-by-field coercion of raw external records into nullable-safe
//! storage form.
//!
//! Every sanitizer is total: unrecognized or malformed values become
//! `None`, never a partially-malformed string. The output is built once
//! per raw input and is what actually reaches storage.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use super::{parse_date, parse_race_time, LAP_TIME_RE, SESSION_TYPES};

// ============================================================================
// Coercion helpers
// ============================================================================

/// Trimmed string; empty-after-trim becomes `None`.
fn clean_string(raw: &Value, key: &str) -> Option<String> {
  let s = raw.get(key)?.as_str()?.trim();
  if s.is_empty() {
    None
  } else {
    Some(s.to_string())
  }
}

/// `parseInt`-style integer coercion: JSON integers pass through, floats
/// truncate, strings parse from a leading integer prefix.
fn coerce_int(raw: &Value, key: &str) -> Option<i64> {
  match raw.get(key)? {
    Value::Number(n) => n.as_i64().or_else(|| {
      let f = n.as_f64()?;
      if f.is_finite() {
        Some(f.trunc() as i64)
      } else {
        None
      }
    }),
    Value::String(s) => leading_int(s),
    _ => None,
  }
}

fn leading_int(s: &str) -> Option<i64> {
  let s = s.trim();
  let (sign, rest) = match s.strip_prefix('-') {
    Some(rest) => (-1, rest),
    None => (1, s.strip_prefix('+').unwrap_or(s)),
  };
  let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
  if digits.is_empty() {
    None
  } else {
    digits.parse::<i64>().ok().map(|n| sign * n)
  }
}

fn coerce_float(raw: &Value, key: &str) -> Option<f64> {
  match raw.get(key)? {
    Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

fn coerce_date(raw: &Value, key: &str) -> Option<NaiveDate> {
  raw.get(key)?.as_str().and_then(parse_date)
}

/// Allow-listed enum value; anything outside the set becomes `None`.
fn allow_listed(raw: &Value, key: &str, allowed: &[&str]) -> Option<String> {
  let s = clean_string(raw, key)?;
  if allowed.contains(&s.as_str()) {
    Some(s)
  } else {
    None
  }
}

/// Truthiness coercion for present values; absent fields stay `None`.
fn truthy(raw: &Value, key: &str) -> Option<bool> {
  Some(match raw.get(key)? {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
    Value::String(s) => !s.is_empty(),
    Value::Array(_) | Value::Object(_) => true,
  })
}

/// Formatted time string kept only when it matches the expected pattern.
fn formatted(raw: &Value, key: &str, check: impl Fn(&str) -> bool) -> Option<String> {
  let s = clean_string(raw, key)?;
  if check(&s) {
    Some(s)
  } else {
    None
  }
}

// ============================================================================
// Sanitized records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedRace {
  pub season: Option<i64>,
  pub round: Option<i64>,
  pub name: Option<String>,
  pub circuit: Option<String>,
  pub race_date: Option<NaiveDate>,
  pub race_time: Option<String>,
  pub url: Option<String>,
  pub sprint_weekend: Option<bool>,
}

impl SanitizedRace {
  pub fn record_key(&self) -> Option<String> {
    Some(format!("{}-{}", self.season?, self.round?))
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedDriver {
  pub driver_id: Option<String>,
  pub number: Option<i64>,
  pub code: Option<String>,
  pub given_name: Option<String>,
  pub family_name: Option<String>,
  pub nationality: Option<String>,
  pub date_of_birth: Option<NaiveDate>,
}

impl SanitizedDriver {
  pub fn record_key(&self) -> Option<String> {
    self.driver_id.clone()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedConstructor {
  pub constructor_id: Option<String>,
  pub name: Option<String>,
  pub nationality: Option<String>,
  pub color: Option<String>,
}

impl SanitizedConstructor {
  pub fn record_key(&self) -> Option<String> {
    self.constructor_id.clone()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SanitizedLapTime {
  pub driver_id: Option<String>,
  pub lap: Option<i64>,
  pub position: Option<i64>,
  pub time: Option<String>,
  pub sector_1: Option<f64>,
  pub sector_2: Option<f64>,
  pub sector_3: Option<f64>,
  pub session_type: Option<String>,
  pub personal_best: Option<bool>,
}

impl SanitizedLapTime {
  pub fn record_key(&self) -> Option<String> {
    Some(format!("{}-{}", self.driver_id.as_deref()?, self.lap?))
  }
}

// ============================================================================
// Sanitizers
// ============================================================================

pub fn sanitize_race(raw: &Value) -> SanitizedRace {
  SanitizedRace {
    season: coerce_int(raw, "season"),
    round: coerce_int(raw, "round"),
    name: clean_string(raw, "name"),
    circuit: clean_string(raw, "circuit"),
    race_date: coerce_date(raw, "race_date"),
    race_time: formatted(raw, "race_time", |s| parse_race_time(s).is_some()),
    url: clean_string(raw, "url").filter(|s| url::Url::parse(s).is_ok()),
    sprint_weekend: truthy(raw, "sprint_weekend"),
  }
}

pub fn sanitize_driver(raw: &Value) -> SanitizedDriver {
  SanitizedDriver {
    driver_id: clean_string(raw, "driver_id"),
    number: coerce_int(raw, "number"),
    code: clean_string(raw, "code")
      .filter(|c| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_uppercase())),
    given_name: clean_string(raw, "given_name"),
    family_name: clean_string(raw, "family_name"),
    nationality: clean_string(raw, "nationality").filter(|n| n.chars().count() == 3),
    date_of_birth: coerce_date(raw, "date_of_birth"),
  }
}

pub fn sanitize_constructor(raw: &Value) -> SanitizedConstructor {
  SanitizedConstructor {
    constructor_id: clean_string(raw, "constructor_id"),
    name: clean_string(raw, "name"),
    nationality: clean_string(raw, "nationality").filter(|n| n.chars().count() == 3),
    color: clean_string(raw, "color").filter(|c| super::HEX_COLOR_RE.is_match(c)),
  }
}

pub fn sanitize_lap_time(raw: &Value) -> SanitizedLapTime {
  SanitizedLapTime {
    driver_id: clean_string(raw, "driver_id"),
    lap: coerce_int(raw, "lap"),
    position: coerce_int(raw, "position"),
    time: formatted(raw, "time", |s| LAP_TIME_RE.is_match(s)),
    sector_1: coerce_float(raw, "sector_1").filter(|f| *f >= 0.0),
    sector_2: coerce_float(raw, "sector_2").filter(|f| *f >= 0.0),
    sector_3: coerce_float(raw, "sector_3").filter(|f| *f >= 0.0),
    session_type: allow_listed(raw, "session_type", SESSION_TYPES),
    personal_best: truthy(raw, "personal_best"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::validate::validate_race;
  use serde_json::json;

  #[test]
  fn test_sanitize_race_coerces_fields() {
    let raw = json!({
      "season": "2025",
      "round": 1.9,
      "name": "  Australian Grand Prix  ",
      "circuit": "",
      "race_date": "2025-03-16",
      "race_time": "not a time",
      "url": "https://example.com/race",
      "sprint_weekend": 0
    });
    let race = sanitize_race(&raw);

    assert_eq!(race.season, Some(2025));
    assert_eq!(race.round, Some(1));
    assert_eq!(race.name.as_deref(), Some("Australian Grand Prix"));
    assert_eq!(race.circuit, None);
    assert_eq!(race.race_date.map(|d| d.to_string()).as_deref(), Some("2025-03-16"));
    assert_eq!(race.race_time, None);
    assert_eq!(race.url.as_deref(), Some("https://example.com/race"));
    assert_eq!(race.sprint_weekend, Some(false));
    assert_eq!(race.record_key().as_deref(), Some("2025-1"));
  }

  #[test]
  fn test_sanitize_never_propagates_malformed_values() {
    let raw = json!({
      "season": "next year",
      "round": [],
      "name": 42,
      "race_date": "16/03/2025"
    });
    let race = sanitize_race(&raw);

    assert_eq!(race.season, None);
    assert_eq!(race.round, None);
    assert_eq!(race.name, None);
    assert_eq!(race.race_date, None);
    assert_eq!(race.record_key(), None);
  }

  #[test]
  fn test_sanitized_valid_race_still_validates_clean() {
    let raw = json!({
      "season": 2025,
      "round": 1,
      "name": " Australian Grand Prix ",
      "race_date": "2025-03-16",
      "race_time": "05:00:00",
      "url": "https://example.com/race"
    });
    assert!(validate_race(&raw).is_valid());

    let sanitized = serde_json::to_value(sanitize_race(&raw)).unwrap();
    let outcome = validate_race(&sanitized);
    assert!(outcome.is_valid());
    assert!(outcome.warnings.is_empty());
  }

  #[test]
  fn test_sanitize_driver_allow_lists_code() {
    let raw = json!({
      "driver_id": " verstappen ",
      "number": "1",
      "code": "ver",
      "family_name": "Verstappen",
      "nationality": "Dutch",
      "date_of_birth": "1997-09-30"
    });
    let driver = sanitize_driver(&raw);

    assert_eq!(driver.driver_id.as_deref(), Some("verstappen"));
    assert_eq!(driver.number, Some(1));
    assert_eq!(driver.code, None);
    assert_eq!(driver.nationality, None);
    assert!(driver.date_of_birth.is_some());
  }

  #[test]
  fn test_sanitize_lap_time_enums_and_floats() {
    let raw = json!({
      "driver_id": "norris",
      "lap": "12",
      "position": 3,
      "time": "1:23.456",
      "sector_1": "28.111",
      "sector_2": -1.0,
      "session_type": "warmup",
      "personal_best": "yes"
    });
    let lap = sanitize_lap_time(&raw);

    assert_eq!(lap.lap, Some(12));
    assert_eq!(lap.time.as_deref(), Some("1:23.456"));
    assert_eq!(lap.sector_1, Some(28.111));
    assert_eq!(lap.sector_2, None);
    assert_eq!(lap.session_type, None);
    assert_eq!(lap.personal_best, Some(true));
    assert_eq!(lap.record_key().as_deref(), Some("norris-12"));
  }

  #[test]
  fn test_truthiness_coercion() {
    let raw = json!({"a": true, "b": 0, "c": "", "d": "false", "e": null});
    assert_eq!(truthy(&raw, "a"), Some(true));
    assert_eq!(truthy(&raw, "b"), Some(false));
    assert_eq!(truthy(&raw, "c"), Some(false));
    assert_eq!(truthy(&raw, "d"), Some(true));
    assert_eq!(truthy(&raw, "e"), Some(false));
    assert_eq!(truthy(&raw, "missing"), None);
  }
}
