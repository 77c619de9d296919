//! Upstream API access
//!
//! This module contains everything that talks to the game's developer API:
//! - Rate-limited transport with throttle retry and backoff
//! - Classification of ambiguous payload codes into semantic outcomes
//! - Typed endpoint wrappers with envelope decoding and pagination

mod classifier;
mod client;
mod transport;
mod types;

pub use classifier::{classify, AmbiguityReason, Classification, Endpoint, FatalCause};
pub use client::{ApiClient, GameDetailOutcome, GamesOutcome, LookupOutcome};
pub use transport::{build_http_client, RateLimiter, Transport, TransportError};
pub use types::{parse_start_time, payload_code, CatalogEntry, GameRecord, GamesPage, UserRecord};
