//! Per-run nickname resolution cache
//!
//! Nicknames are mutable and user-chosen; the stable identity behind one can
//! change between runs. The cache therefore lives only for the current run:
//! successful mappings short-circuit repeat lookups, and a nickname that
//! fails to resolve is tombstoned so it is never asked about again this run.

use crate::api::{ApiClient, LookupOutcome};
use crate::Result;
use std::collections::HashMap;

/// Outcome of resolving one nickname
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The nickname maps to this identity
    Resolved(String),

    /// The nickname does not map to any identity this run
    Unresolved,
}

/// Per-run memo of nickname -> identity mappings
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, Resolution>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized resolution without issuing any request
    pub fn cached(&self, nickname: &str) -> Option<&Resolution> {
        self.entries.get(nickname)
    }

    /// Seeds the cache with a mapping learned from a payload rather than a
    /// lookup (a player's own game records carry their current nickname)
    pub fn insert_resolved(&mut self, nickname: &str, uid: &str) {
        self.entries
            .insert(nickname.to_string(), Resolution::Resolved(uid.to_string()));
    }

    /// Resolves a nickname, memoized for the remainder of the run.
    ///
    /// An unresolved answer is memoized too: the first miss is the only
    /// request this nickname will ever cost this run.
    pub async fn resolve(&mut self, client: &ApiClient, nickname: &str) -> Result<Resolution> {
        if let Some(cached) = self.entries.get(nickname) {
            return Ok(cached.clone());
        }
        self.refresh(client, nickname).await
    }

    /// Issues a lookup unconditionally and overwrites the memo.
    ///
    /// Recovery uses this path: the memoized mapping is exactly what is
    /// suspected stale, so it must not short-circuit.
    pub async fn refresh(&mut self, client: &ApiClient, nickname: &str) -> Result<Resolution> {
        let resolution = match client.lookup_nickname(nickname).await? {
            LookupOutcome::Resolved { uid } => Resolution::Resolved(uid),
            LookupOutcome::Unresolved => Resolution::Unresolved,
        };
        self.entries
            .insert(nickname.to_string(), resolution.clone());
        Ok(resolution)
    }

    /// Number of memoized nicknames (resolved and tombstoned)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_returns_seeded_mapping() {
        let mut cache = ResolutionCache::new();
        assert!(cache.cached("Alice").is_none());

        cache.insert_resolved("Alice", "u-alice");
        assert_eq!(
            cache.cached("Alice"),
            Some(&Resolution::Resolved("u-alice".to_string()))
        );
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_seeding_overwrites_previous_entry() {
        let mut cache = ResolutionCache::new();
        cache.insert_resolved("Alice", "u-old");
        cache.insert_resolved("Alice", "u-new");

        assert_eq!(
            cache.cached("Alice"),
            Some(&Resolution::Resolved("u-new".to_string()))
        );
        assert_eq!(cache.len(), 1);
    }
}
