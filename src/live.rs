//! Live-timing channel: current standings plus synthetic mock updates.
//!
//! Frames are compressed with the codec before they go on the wire and
//! decompressed by the receiver, so both ends of the channel exercise the
//! same contract the production feed uses. The mock generator exists for
//! demos and tests; it jitters lap times and gaps and occasionally swaps
//! adjacent positions.

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::codec::Codec;
use crate::error::DataError;

/// Query shape of the live channel: race plus optional session.
#[derive(Debug, Clone)]
pub struct TimingQuery {
  pub race_id: String,
  pub session_type: Option<String>,
}

/// One row of the running order. Field names are the codec dictionary's
/// long names, so frames actually shrink on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingRow {
  pub position: i64,
  pub driver_id: String,
  pub driver_number: i64,
  pub constructor: String,
  pub lap_time: Option<String>,
  pub gap_to_leader: f64,
  pub interval: f64,
}

/// One frame on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingFrame {
  pub race_id: String,
  pub session_type: String,
  pub frame: u64,
  pub standings: Vec<StandingRow>,
}

/// Fixed demo grid used when no real feed is attached.
const DEMO_GRID: &[(&str, i64, &str)] = &[
  ("verstappen", 1, "Red Bull"),
  ("norris", 4, "McLaren"),
  ("leclerc", 16, "Ferrari"),
  ("piastri", 81, "McLaren"),
  ("hamilton", 44, "Ferrari"),
  ("russell", 63, "Mercedes"),
  ("alonso", 14, "Aston Martin"),
  ("gasly", 10, "Alpine"),
];

/// Produces compressed timing frames for a query.
pub struct LiveTimingFeed {
  codec: Codec,
}

impl LiveTimingFeed {
  pub fn new(codec: Codec) -> Self {
    Self { codec }
  }

  /// Current standings for the queried race.
  pub fn snapshot(&self, query: &TimingQuery) -> TimingFrame {
    let standings = DEMO_GRID
      .iter()
      .enumerate()
      .map(|(i, (driver_id, number, constructor))| {
        let gap = i as f64 * 1.8;
        StandingRow {
          position: i as i64 + 1,
          driver_id: (*driver_id).to_string(),
          driver_number: *number,
          constructor: (*constructor).to_string(),
          lap_time: Some(format!("1:{:02}.{:03}", 23 + i / 4, 400 + i * 37)),
          gap_to_leader: gap,
          interval: if i == 0 { 0.0 } else { 1.8 },
        }
      })
      .collect();

    TimingFrame {
      race_id: query.race_id.clone(),
      session_type: query
        .session_type
        .clone()
        .unwrap_or_else(|| "race".to_string()),
      frame: 0,
      standings,
    }
  }

  /// Jitter a frame into its successor.
  fn advance(&self, frame: &TimingFrame) -> TimingFrame {
    let mut rng = rand::thread_rng();
    let mut next = frame.clone();
    next.frame += 1;

    for row in next.standings.iter_mut() {
      row.gap_to_leader = (row.gap_to_leader + rng.gen_range(-0.3..0.3)).max(0.0);
      if rng.gen_bool(0.5) {
        row.lap_time = Some(format!(
          "1:{:02}.{:03}",
          rng.gen_range(22..26),
          rng.gen_range(0..1000)
        ));
      }
    }

    // Occasional position swap between adjacent cars.
    if next.standings.len() >= 2 && rng.gen_bool(0.3) {
      let i = rng.gen_range(0..next.standings.len() - 1);
      next.standings.swap(i, i + 1);
      for (pos, row) in next.standings.iter_mut().enumerate() {
        row.position = pos as i64 + 1;
      }
    }

    next
  }

  /// Compress a frame for transmission.
  pub fn encode(&self, frame: &TimingFrame) -> Result<String, DataError> {
    let value = serde_json::to_value(frame)?;
    self.codec.compress(&value)
  }

  /// Receiver side: decompress and deserialize.
  pub fn decode(&self, wire: &str) -> Result<TimingFrame, DataError> {
    let value: Value = self.codec.decompress(wire)?;
    serde_json::from_value(value).map_err(DataError::from)
  }

  /// Answer a query with the snapshot plus `updates` mock frames,
  /// each compressed and pushed through the channel in order.
  pub fn stream(
    &self,
    query: &TimingQuery,
    updates: usize,
  ) -> Result<mpsc::UnboundedReceiver<String>, DataError> {
    let (tx, rx) = mpsc::unbounded_channel();

    let mut frame = self.snapshot(query);
    tx.send(self.encode(&frame)?)
      .map_err(|_| DataError::Unavailable("live channel closed".to_string()))?;

    for _ in 0..updates {
      frame = self.advance(&frame);
      let wire = self.encode(&frame)?;
      debug!(race_id = %query.race_id, frame = frame.frame, bytes = wire.len(), "emitting frame");
      if tx.send(wire).is_err() {
        break;
      }
    }

    Ok(rx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn race_query(race_id: &str) -> TimingQuery {
    TimingQuery {
      race_id: race_id.to_string(),
      session_type: None,
    }
  }

  #[test]
  fn test_snapshot_round_trips_through_codec() {
    let feed = LiveTimingFeed::new(Codec::default());
    let frame = feed.snapshot(&race_query("monaco-2025"));

    let wire = feed.encode(&frame).unwrap();
    let decoded = feed.decode(&wire).unwrap();

    assert_eq!(decoded.race_id, "monaco-2025");
    assert_eq!(decoded.session_type, "race");
    assert_eq!(decoded.standings.len(), DEMO_GRID.len());
    // Integer and string fields survive exactly.
    assert_eq!(decoded.standings[0].position, 1);
    assert_eq!(decoded.standings[0].driver_id, "verstappen");
    assert_eq!(decoded.standings[1].lap_time, frame.standings[1].lap_time);
  }

  #[test]
  fn test_wire_frames_are_smaller_than_plain_json() {
    let feed = LiveTimingFeed::new(Codec::default());
    let frame = feed.snapshot(&race_query("spa-2025"));

    let wire = feed.encode(&frame).unwrap();
    let plain = serde_json::to_string(&frame).unwrap();
    assert!(wire.len() < plain.len());
  }

  #[tokio::test]
  async fn test_stream_emits_snapshot_plus_updates() {
    let feed = LiveTimingFeed::new(Codec::default());
    let mut rx = feed.stream(&race_query("suzuka-2025"), 4).unwrap();

    let mut frames = Vec::new();
    while let Some(wire) = rx.recv().await {
      frames.push(feed.decode(&wire).unwrap());
    }

    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].frame, 0);
    assert_eq!(frames[4].frame, 4);
    // Positions stay a permutation of 1..=n across jittered frames.
    for frame in &frames {
      let mut positions: Vec<i64> = frame.standings.iter().map(|r| r.position).collect();
      positions.sort_unstable();
      let expected: Vec<i64> = (1..=frame.standings.len() as i64).collect();
      assert_eq!(positions, expected);
    }
  }

  #[test]
  fn test_session_type_override() {
    let feed = LiveTimingFeed::new(Codec::default());
    let query = TimingQuery {
      race_id: "monza-2025".to_string(),
      session_type: Some("qualifying".to_string()),
    };
    assert_eq!(feed.snapshot(&query).session_type, "qualifying");
  }
}
