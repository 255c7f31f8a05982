use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub upstream: UpstreamConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
  /// Override for the directory holding the sqlite databases
  /// (default: platform data dir).
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
  /// Base URL of the season-scoped results API
  pub base_url: String,
  pub timeout_secs: u64,
  /// Season used when a command does not specify one
  /// (default: the current calendar year).
  pub default_season: i64,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      base_url: "https://api.jolpi.ca/ergast/f1".to_string(),
      timeout_secs: 10,
      default_season: current_year(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
  /// Version identifier for the offline buckets; bump per release to
  /// purge stale buckets at activation.
  pub version: String,
  /// URLs precached into the static bucket on install.
  pub precache: Vec<String>,
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      version: "v1".to_string(),
      precache: Vec::new(),
    }
  }
}

fn current_year() -> i64 {
  use chrono::Datelike;
  chrono::Utc::now().year() as i64
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./pitwall.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/pitwall/config.yaml
  ///
  /// With no file found, built-in defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        info!("no config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("pitwall.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("pitwall").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("pitwall"))
  }

  /// Path of the sanitized-record database.
  pub fn records_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("records.db"))
  }

  /// Path of the offline bucket database.
  pub fn offline_db_path(&self) -> Result<PathBuf> {
    Ok(self.data_dir()?.join("offline.db"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_are_usable() {
    let config = Config::default();
    assert!(config.upstream.base_url.starts_with("https://"));
    assert!(config.upstream.default_season >= 2025);
    assert_eq!(config.offline.version, "v1");
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let config: Config = serde_yaml::from_str(
      "upstream:\n  base_url: https://api.example.com/f1\noffline:\n  version: v7\n",
    )
    .unwrap();
    assert_eq!(config.upstream.base_url, "https://api.example.com/f1");
    assert_eq!(config.upstream.timeout_secs, 10);
    assert_eq!(config.offline.version, "v7");
    assert!(config.offline.precache.is_empty());
  }
}
