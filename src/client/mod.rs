//! Fetch layer: upstream HTTP client plus the fallback degrade chain.

mod fallback;
mod upstream;

pub use fallback::{
  FallbackClient, Fetched, PriorSeasonRewrite, Provenance, SeasonRewrite, Transport,
};
pub use upstream::{Endpoints, UpstreamClient};
