//! Compression codec for high-frequency live-timing frames.
//!
//! Two transforms, applied structurally on the parsed value rather than
//! by text substitution, so a string *value* that happens to contain a
//! dictionary token is never corrupted:
//!
//! 1. map keys are renamed through a fixed long-name → short-alias
//!    dictionary;
//! 2. non-integer numeric leaves are rounded to a bounded decimal
//!    precision (3 places by default).
//!
//! The rounding step is lossy and intentionally one-way: a bandwidth /
//! precision trade-off for a stream ticking tens of times per second.
//! Decompression reverses only the rename; unknown keys pass through
//! unchanged, so a frame from a sender that never compressed decodes
//! losslessly.

use serde_json::{Map, Number, Value};

use crate::error::DataError;

/// Long field names and their wire aliases. Aliases must stay disjoint
/// from the long names so the reverse rename is unambiguous.
const DICTIONARY: &[(&str, &str)] = &[
  ("position", "p"),
  ("driver_id", "d"),
  ("driver_number", "n"),
  ("constructor", "c"),
  ("lap_time", "t"),
  ("gap_to_leader", "g"),
  ("interval", "i"),
  ("sector_1", "s1"),
  ("sector_2", "s2"),
  ("sector_3", "s3"),
  ("session_type", "y"),
  ("laps_completed", "l"),
  ("pit_stops", "ps"),
  ("tyre_compound", "tc"),
];

const DEFAULT_PRECISION: u32 = 3;

/// Frame codec with configurable rounding precision. The dictionary is
/// fixed; both ends of the channel must share it.
#[derive(Debug, Clone, Copy)]
pub struct Codec {
  precision: u32,
}

impl Default for Codec {
  fn default() -> Self {
    Self {
      precision: DEFAULT_PRECISION,
    }
  }
}

impl Codec {
  #[allow(dead_code)]
  pub fn with_precision(precision: u32) -> Self {
    Self { precision }
  }

  /// Shrink a frame: rename keys, round non-integer numbers, serialize.
  pub fn compress(&self, value: &Value) -> Result<String, DataError> {
    let shrunk = self.transform(value, Direction::Shorten);
    serde_json::to_string(&shrunk).map_err(DataError::from)
  }

  /// Reverse the rename and parse. Rounding is not reversed; precision
  /// loss is permanent.
  pub fn decompress(&self, text: &str) -> Result<Value, DataError> {
    let value: Value = serde_json::from_str(text)
      .map_err(|e| DataError::Decompression(format!("malformed frame: {}", e)))?;
    Ok(self.transform(&value, Direction::Lengthen))
  }

  fn transform(&self, value: &Value, direction: Direction) -> Value {
    match value {
      Value::Object(map) => {
        let mut out = Map::with_capacity(map.len());
        for (key, inner) in map {
          out.insert(
            direction.rename(key).to_string(),
            self.transform(inner, direction),
          );
        }
        Value::Object(out)
      }
      Value::Array(items) => {
        Value::Array(items.iter().map(|v| self.transform(v, direction)).collect())
      }
      Value::Number(n) => Value::Number(self.round(n)),
      other => other.clone(),
    }
  }

  fn round(&self, n: &Number) -> Number {
    if n.is_i64() || n.is_u64() {
      return n.clone();
    }
    let Some(f) = n.as_f64() else {
      return n.clone();
    };
    let factor = 10f64.powi(self.precision as i32);
    let rounded = (f * factor).round() / factor;
    Number::from_f64(rounded).unwrap_or_else(|| n.clone())
  }
}

#[derive(Clone, Copy)]
enum Direction {
  Shorten,
  Lengthen,
}

impl Direction {
  /// Rename a key, or leave it alone when it is not in the dictionary.
  fn rename(self, key: &str) -> &str {
    let found = match self {
      Direction::Shorten => DICTIONARY.iter().find(|(long, _)| *long == key),
      Direction::Lengthen => DICTIONARY.iter().find(|(_, short)| *short == key),
    };
    match (self, found) {
      (Direction::Shorten, Some((_, short))) => short,
      (Direction::Lengthen, Some((long, _))) => long,
      _ => key,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_dictionary_aliases_are_disjoint_from_long_names() {
    for (_, short) in DICTIONARY {
      assert!(
        !DICTIONARY.iter().any(|(long, _)| long == short),
        "alias {} collides with a long name",
        short
      );
    }
  }

  #[test]
  fn test_round_trip_integers_exact() {
    let codec = Codec::default();
    let frame = json!({
      "position": 3,
      "driver_id": "norris",
      "laps_completed": 42,
      "pit_stops": 1
    });
    let wire = codec.compress(&frame).unwrap();
    assert!(wire.contains("\"p\":3"));
    assert_eq!(codec.decompress(&wire).unwrap(), frame);
  }

  #[test]
  fn test_round_trip_floats_within_precision() {
    let codec = Codec::default();
    let frame = json!({
      "gap_to_leader": 1.2345678,
      "interval": 0.4999999,
      "sector_1": 28.1114
    });
    let decoded = codec.decompress(&codec.compress(&frame).unwrap()).unwrap();

    for key in ["gap_to_leader", "interval", "sector_1"] {
      let original = frame[key].as_f64().unwrap();
      let roundtripped = decoded[key].as_f64().unwrap();
      assert!((original - roundtripped).abs() < 1e-3, "{} drifted", key);
    }
  }

  #[test]
  fn test_compression_shrinks_nested_frames() {
    let codec = Codec::default();
    let frame = json!({
      "session_type": "race",
      "standings": [
        {"position": 1, "driver_id": "verstappen", "gap_to_leader": 0.0},
        {"position": 2, "driver_id": "norris", "gap_to_leader": 2.137}
      ]
    });
    let wire = codec.compress(&frame).unwrap();
    assert!(wire.len() < serde_json::to_string(&frame).unwrap().len());
    assert_eq!(codec.decompress(&wire).unwrap()["standings"][1]["driver_id"], json!("norris"));
  }

  #[test]
  fn test_string_values_matching_dictionary_tokens_survive() {
    let codec = Codec::default();
    // "position" as a *value*, and an alias as a value, must not be touched.
    let frame = json!({"comment": "fighting for position", "driver_id": "p"});
    let decoded = codec.decompress(&codec.compress(&frame).unwrap()).unwrap();
    assert_eq!(decoded, frame);
  }

  #[test]
  fn test_uncompressed_sender_is_tolerated() {
    let codec = Codec::default();
    let plain = json!({"custom_field": 7, "note": "no dictionary keys here"});
    let decoded = codec.decompress(&serde_json::to_string(&plain).unwrap()).unwrap();
    assert_eq!(decoded, plain);
  }

  #[test]
  fn test_malformed_frame_is_a_decompression_error() {
    let codec = Codec::default();
    let err = codec.decompress("{not json").unwrap_err();
    assert!(matches!(err, DataError::Decompression(_)));
  }

  #[test]
  fn test_custom_precision() {
    let codec = Codec::with_precision(1);
    let decoded = codec
      .decompress(&codec.compress(&json!({"interval": 1.26})).unwrap())
      .unwrap();
    assert_eq!(decoded["interval"], json!(1.3));
  }
}
