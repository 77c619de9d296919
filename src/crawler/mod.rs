//! Crawler module for player-graph traversal
//!
//! This module contains the core ingestion logic, including:
//! - Breadth-first frontier management with depth bounding
//! - Per-run nickname resolution caching
//! - The bounded recovery protocol for stale identifiers
//! - Overall run coordination

mod manager;
mod recovery;
mod resolve;

pub use manager::{seed_frontier, CrawlNode, IngestionManager, IngestionSummary, NodeTarget};
pub use recovery::{
    RecoveryController, RecoveryState, RecoveryStep, RecoveryVerdict, RESOLVE_ATTEMPT_LIMIT,
    UID_VARIANT_LIMIT,
};
pub use resolve::{Resolution, ResolutionCache};
