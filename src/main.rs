mod cache;
mod client;
mod codec;
mod commands;
mod config;
mod error;
mod live;
mod offline;
mod store;
mod sync;
mod validate;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use sync::SyncKind;

#[derive(Parser, Debug)]
#[command(name = "pitwall")]
#[command(about = "Offline-first data layer and sync tool for motorsport statistics")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/pitwall/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Refresh one entity class from the upstream into the record store
  Sync {
    #[arg(value_enum)]
    kind: SyncKind,
    #[arg(short, long)]
    season: Option<i64>,
    /// Round number (required for results)
    #[arg(short, long)]
    round: Option<i64>,
    /// Bypass the fresh cache and refetch
    #[arg(long)]
    force: bool,
  },
  /// Print the championship standings for a season
  Standings {
    #[arg(short, long)]
    season: Option<i64>,
    /// Constructor standings instead of driver standings
    #[arg(long)]
    constructors: bool,
  },
  /// Print the race schedule for a season
  Races {
    #[arg(short, long)]
    season: Option<i64>,
  },
  /// Stream mock live-timing frames through the compression codec
  Live {
    race_id: String,
    /// Session type (race, qualifying, sprint, practice)
    #[arg(long)]
    session: Option<String>,
    /// Number of mock updates after the snapshot
    #[arg(short = 'n', long, default_value_t = 5)]
    updates: usize,
  },
  /// Manage the offline boundary cache
  Offline {
    #[command(subcommand)]
    action: OfflineAction,
  },
}

#[derive(Subcommand, Debug)]
enum OfflineAction {
  /// Precache the configured shell URLs and activate this version
  Warm,
  /// Route one request through the boundary cache
  Fetch {
    url: String,
    /// Treat the request as a full-page navigation
    #[arg(long)]
    navigation: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pitwall=info")),
    )
    .with_writer(writer)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  match args.command {
    Command::Sync {
      kind,
      season,
      round,
      force,
    } => commands::sync(&config, kind, season, round, force).await,
    Command::Standings {
      season,
      constructors,
    } => commands::standings(&config, season, constructors).await,
    Command::Races { season } => commands::races(&config, season).await,
    Command::Live {
      race_id,
      session,
      updates,
    } => commands::live(race_id, session, updates).await,
    Command::Offline { action } => match action {
      OfflineAction::Warm => commands::offline_warm(&config).await,
      OfflineAction::Fetch { url, navigation } => {
        commands::offline_fetch(&config, url, navigation).await
      }
    },
  }
}
