//! Ingestion manager - main crawl orchestration logic
//!
//! This module contains the breadth-first traversal over the player graph:
//! - Seeding the frontier from configured nicknames and uids
//! - Resolving nicknames to stable identities (with per-run memoization)
//! - Fetching paginated game lists and per-game participant lists
//! - Entering the bounded recovery protocol on ambiguous responses
//! - Persisting results through the storage and export collaborators
//!
//! All mutable per-run state lives in one traversal context owned by the
//! manager; the other components are passed what they need per call.

use crate::api::{
    AmbiguityReason, ApiClient, GameDetailOutcome, GameRecord, GamesOutcome,
};
use crate::config::{CrawlConfig, SeedsConfig};
use crate::crawler::recovery::{
    RecoveryController, RecoveryState, RecoveryStep, RecoveryVerdict,
};
use crate::crawler::resolve::{Resolution, ResolutionCache};
use crate::export::DatasetWriter;
use crate::storage::MatchStore;
use crate::{ArenaError, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// What a crawl node points at
#[derive(Debug, Clone)]
pub enum NodeTarget {
    /// A seed nickname that still needs resolution
    Nickname(String),

    /// A known identity, with the nickname it was last seen under (used as
    /// recovery context when the identifier turns out stale)
    Identity {
        uid: String,
        nickname: Option<String>,
    },
}

/// One pending visit in the frontier
#[derive(Debug, Clone)]
pub struct CrawlNode {
    pub target: NodeTarget,
    pub depth: u32,
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    /// Identities whose game list was fetched (including empty ones)
    pub users_processed: u64,
    /// Games ingested from focal players' own lists
    pub games_ingested: u64,
    /// Per-player match rows persisted (focal and participants)
    pub participant_rows: u64,
    /// Peers enqueued for a deeper level
    pub users_discovered: u64,
    /// Nodes that legitimately ended with zero games
    pub empty_nodes: u64,
    /// Nodes abandoned by the recovery protocol
    pub abandoned_nodes: u64,
    /// Nicknames that resolved to nothing this run
    pub unresolved_nicknames: u64,
}

/// A peer observed in a fetched game
struct DiscoveredPeer {
    uid: String,
    nickname: Option<String>,
}

/// How a node's fetch loop ended
enum NodeOutcome {
    Completed(Vec<DiscoveredPeer>),
    Empty,
    Abandoned,
}

/// Result of ingesting one identity's game list
enum UserIngest {
    Completed(Vec<DiscoveredPeer>),
    Ambiguous(AmbiguityReason),
}

/// All mutable per-run state, in one place
///
/// Nothing here survives the run; only the storage layer persists.
#[derive(Default)]
struct RunContext {
    /// Identities whose game list has been fetched (dedup by identity, not
    /// by nickname)
    visited: HashSet<String>,

    /// Games whose participant list has been handled this run
    seen_games: HashSet<i64>,

    /// Per-run nickname resolution memo
    resolutions: ResolutionCache,

    /// Per-seed recovery bookkeeping, keyed by the originating nickname
    recovery: HashMap<String, RecoveryState>,
}

/// Builds the initial frontier from the configured seeds, all at depth 0
pub fn seed_frontier(seeds: &SeedsConfig) -> VecDeque<CrawlNode> {
    let mut frontier = VecDeque::new();
    for nickname in &seeds.nicknames {
        frontier.push_back(CrawlNode {
            target: NodeTarget::Nickname(nickname.clone()),
            depth: 0,
        });
    }
    for uid in &seeds.uids {
        frontier.push_back(CrawlNode {
            target: NodeTarget::Identity {
                uid: uid.clone(),
                nickname: None,
            },
            depth: 0,
        });
    }
    frontier
}

/// Coordinates the recursive ingestion of match data
pub struct IngestionManager<S: MatchStore> {
    client: ApiClient,
    store: Arc<Mutex<S>>,
    exporter: Option<DatasetWriter>,
    config: CrawlConfig,
    controller: RecoveryController,
    ctx: RunContext,
    summary: IngestionSummary,
}

impl<S: MatchStore> IngestionManager<S> {
    pub fn new(
        client: ApiClient,
        store: Arc<Mutex<S>>,
        exporter: Option<DatasetWriter>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            client,
            store,
            exporter,
            config,
            controller: RecoveryController::default(),
            ctx: RunContext::default(),
            summary: IngestionSummary::default(),
        }
    }

    /// Runs a full ingestion from the given seeds.
    ///
    /// # Arguments
    ///
    /// * `seeds` - Seed nicknames and uids, all entering at depth 0
    /// * `config_hash` - Hash of the configuration, recorded on the run row
    ///
    /// # Returns
    ///
    /// * `Ok(IngestionSummary)` - The run completed (possibly with some
    ///   nodes yielding no data)
    /// * `Err(ArenaError)` - A fatal outcome aborted the run; the run row is
    ///   marked failed with the cause
    pub async fn run(
        &mut self,
        seeds: &SeedsConfig,
        config_hash: &str,
    ) -> Result<IngestionSummary> {
        let mut frontier = seed_frontier(seeds);
        if frontier.is_empty() {
            return Err(ArenaError::NoSeeds);
        }

        let run_id = self.store.lock().unwrap().create_run(config_hash)?;
        tracing::info!(
            "Starting ingestion run {} with {} seeds, max depth {}",
            run_id,
            frontier.len(),
            self.config.max_depth
        );

        let outcome = self.crawl(&mut frontier).await;

        if let Some(exporter) = self.exporter.as_mut() {
            if let Err(e) = exporter.flush_all() {
                tracing::warn!("Failed to flush export buffers: {}", e);
            }
        }

        match outcome {
            Ok(()) => {
                self.store.lock().unwrap().complete_run(run_id)?;
                tracing::info!(
                    "Run {} completed: {} users, {} games, {} participant rows",
                    run_id,
                    self.summary.users_processed,
                    self.summary.games_ingested,
                    self.summary.participant_rows
                );
                Ok(self.summary.clone())
            }
            Err(err) => {
                tracing::error!("Run {} aborted: {}", run_id, err);
                if let Err(mark_err) = self.store.lock().unwrap().fail_run(run_id, &err.to_string())
                {
                    tracing::warn!("Failed to mark run {} as failed: {}", run_id, mark_err);
                }
                Err(err)
            }
        }
    }

    /// The breadth-first crawl loop.
    ///
    /// The frontier is FIFO, so every depth-d node is processed before any
    /// depth-(d+1) node; depth limiting stays predictable.
    async fn crawl(&mut self, frontier: &mut VecDeque<CrawlNode>) -> Result<()> {
        while let Some(node) = frontier.pop_front() {
            tracing::info!("Ingest queue: {} nodes left", frontier.len() + 1);
            let discovered = self.process_node(&node).await?;

            if node.depth >= self.config.max_depth {
                continue;
            }
            for peer in discovered {
                if self.ctx.visited.contains(&peer.uid) {
                    continue;
                }
                self.summary.users_discovered += 1;
                frontier.push_back(CrawlNode {
                    target: NodeTarget::Identity {
                        uid: peer.uid,
                        nickname: peer.nickname,
                    },
                    depth: node.depth + 1,
                });
            }
        }
        Ok(())
    }

    /// Processes one frontier node end to end, recovery included.
    async fn process_node(&mut self, node: &CrawlNode) -> Result<Vec<DiscoveredPeer>> {
        let (uid, origin_nickname) = match &node.target {
            NodeTarget::Nickname(nickname) => match self.resolve_with_store(nickname).await? {
                Some(uid) => (uid, Some(nickname.clone())),
                None => {
                    tracing::info!("Nickname '{}' is unresolved; skipping node", nickname);
                    self.summary.unresolved_nicknames += 1;
                    return Ok(Vec::new());
                }
            },
            NodeTarget::Identity { uid, nickname } => (uid.clone(), nickname.clone()),
        };

        if self.ctx.visited.contains(&uid) {
            return Ok(Vec::new());
        }
        tracing::info!("Ingesting user {} at depth {}", uid, node.depth);

        let mut current_uid = uid;
        let outcome = loop {
            self.ctx.visited.insert(current_uid.clone());
            match self.ingest_user(&current_uid).await? {
                UserIngest::Completed(discovered) => break NodeOutcome::Completed(discovered),
                UserIngest::Ambiguous(reason) => {
                    match self
                        .recover(&current_uid, origin_nickname.as_deref(), reason)
                        .await?
                    {
                        RecoveryVerdict::Resume { uid: fresh } => {
                            if fresh != current_uid && self.ctx.visited.contains(&fresh) {
                                tracing::info!(
                                    "Recovered identifier {} was already visited; node done",
                                    fresh
                                );
                                break NodeOutcome::Empty;
                            }
                            tracing::info!(
                                "Resuming node with identifier {} after recovery",
                                fresh
                            );
                            current_uid = fresh;
                        }
                        RecoveryVerdict::EmptyResult => break NodeOutcome::Empty,
                        RecoveryVerdict::Abandon => break NodeOutcome::Abandoned,
                    }
                }
            }
        };

        // Recovery bookkeeping is per-node; drop it with the node.
        if let Some(seed) = origin_nickname.as_deref() {
            self.ctx.recovery.remove(seed);
        }

        match outcome {
            NodeOutcome::Completed(discovered) => {
                self.summary.users_processed += 1;
                Ok(discovered)
            }
            NodeOutcome::Empty => {
                self.summary.users_processed += 1;
                self.summary.empty_nodes += 1;
                tracing::info!("User {} ended with zero games", current_uid);
                Ok(Vec::new())
            }
            NodeOutcome::Abandoned => {
                self.summary.abandoned_nodes += 1;
                tracing::warn!("Abandoning node for {}; no results emitted", current_uid);
                Ok(Vec::new())
            }
        }
    }

    /// One recovery step for a failing identifier.
    async fn recover(
        &mut self,
        current_uid: &str,
        origin_nickname: Option<&str>,
        reason: AmbiguityReason,
    ) -> Result<RecoveryVerdict> {
        let Some(seed) = origin_nickname else {
            // No recovery context: a missing identifier abandons the node, a
            // "no games" answer is a valid empty result.
            return Ok(match reason {
                AmbiguityReason::UidInvalid => RecoveryVerdict::Abandon,
                AmbiguityReason::NoGames => RecoveryVerdict::EmptyResult,
            });
        };

        let step = {
            let state = self.ctx.recovery.entry(seed.to_string()).or_default();

            // A "no games" answer from an identifier recovery itself
            // produced is final unless the operator opted into rechecking.
            if reason == AmbiguityReason::NoGames
                && state.has_recovered()
                && !self.config.recheck_empty_after_recovery
            {
                return Ok(RecoveryVerdict::EmptyResult);
            }

            self.controller.begin_attempt(state, current_uid, reason)
        };

        match step {
            RecoveryStep::Stop(verdict) => Ok(verdict),
            RecoveryStep::Resolve => {
                tracing::info!("Re-resolving seed '{}' for recovery", seed);
                let resolution = self.ctx.resolutions.refresh(&self.client, seed).await?;
                let state = self.ctx.recovery.entry(seed.to_string()).or_default();
                Ok(self
                    .controller
                    .apply_resolution(state, current_uid, reason, &resolution))
            }
        }
    }

    /// Ingests one identity's paginated game list.
    async fn ingest_user(&mut self, uid: &str) -> Result<UserIngest> {
        tracing::info!("Fetching games for uid {}", uid);

        let cutoff = if self.config.only_newer_games {
            self.store
                .lock()
                .unwrap()
                .user_ingested_until(uid)?
                .as_deref()
                .and_then(crate::api::parse_start_time)
        } else {
            None
        };

        let mut discovered: Vec<DiscoveredPeer> = Vec::new();
        let mut discovered_uids: HashSet<String> = HashSet::new();
        let mut processed: u32 = 0;
        let mut next_token: Option<String> = None;
        let mut stop = false;

        loop {
            let page = match self.client.user_games(uid, next_token.as_deref()).await? {
                GamesOutcome::Page(page) => page,
                GamesOutcome::Ambiguous(reason) => {
                    if processed == 0 {
                        return Ok(UserIngest::Ambiguous(reason));
                    }
                    // Ambiguity mid-pagination, after data already arrived,
                    // behaves like the end of the list.
                    tracing::debug!(
                        "Game list for {} ended ambiguously after {} games",
                        uid,
                        processed
                    );
                    break;
                }
            };

            for game in &page.user_games {
                if let Some(cutoff) = cutoff {
                    if let Some(start) = game.start_time() {
                        if start <= cutoff {
                            tracing::info!(
                                "Reached previously ingested match {:?} for uid {}; stopping early",
                                game.game_id,
                                uid
                            );
                            stop = true;
                            break;
                        }
                    }
                }

                let Some(game_id) = game.game_id else {
                    continue;
                };
                let already_known = self.store.lock().unwrap().has_game(game_id)?;

                // A player's own rows carry their current nickname; seed
                // the memo so later sightings skip the lookup.
                if let Some(nick) = &game.nickname {
                    self.ctx.resolutions.insert_resolved(nick, uid);
                }

                self.persist_record(uid, game)?;
                processed += 1;
                self.summary.games_ingested += 1;
                tracing::info!("Processed game {} for uid {}", processed, uid);

                if self.config.fetch_game_details {
                    for peer in self.ingest_game_participants(game_id, already_known).await? {
                        if discovered_uids.insert(peer.uid.clone()) {
                            discovered.push(peer);
                        }
                    }
                }

                if let Some(cap) = self.config.max_games_per_user {
                    if processed >= cap {
                        stop = true;
                        break;
                    }
                }
            }

            if stop {
                break;
            }
            next_token = page.next_token();
            if next_token.is_none() {
                break;
            }
        }

        // The focal player is not their own peer.
        discovered.retain(|peer| peer.uid != uid);
        Ok(UserIngest::Completed(discovered))
    }

    /// Fetches and persists the participant list for one game.
    ///
    /// Each game id is handled at most once per run; games already stored
    /// with a full participant set reuse the stored identities instead of
    /// spending a request.
    async fn ingest_game_participants(
        &mut self,
        game_id: i64,
        already_known: bool,
    ) -> Result<Vec<DiscoveredPeer>> {
        if !self.ctx.seen_games.insert(game_id) {
            return Ok(Vec::new());
        }

        if already_known {
            let cached = self.store.lock().unwrap().participants_for_game(game_id)?;
            if cached.len() > 1 {
                tracing::info!(
                    "Skipping fetch for known game {}; {} participants cached",
                    game_id,
                    cached.len()
                );
                return Ok(cached
                    .into_iter()
                    .map(|uid| DiscoveredPeer {
                        uid,
                        nickname: None,
                    })
                    .collect());
            }
        }

        let participants = match self.client.game_detail(game_id).await? {
            GameDetailOutcome::Participants(list) => list,
            GameDetailOutcome::Missing => {
                tracing::warn!(
                    "Game {} is expired or unpublished server-side; flagging incomplete",
                    game_id
                );
                self.store.lock().unwrap().mark_game_incomplete(game_id)?;
                return Ok(Vec::new());
            }
        };

        let total = participants.len();
        let mut discovered = Vec::new();
        for participant in &participants {
            let Some(uid) = self.participant_identity(participant).await? else {
                continue;
            };
            self.persist_record(&uid, participant)?;
            discovered.push(DiscoveredPeer {
                uid,
                nickname: participant.nickname.clone(),
            });
        }
        if total < 2 {
            self.store.lock().unwrap().mark_game_incomplete(game_id)?;
        }
        tracing::info!("Fetched {} participants for game {}", total, game_id);
        Ok(discovered)
    }

    /// Works out the stable identity behind a participant record.
    async fn participant_identity(&mut self, record: &GameRecord) -> Result<Option<String>> {
        // Newer payloads carry the identity inline.
        if let Some(uid) = record.user_id.as_deref().filter(|uid| !uid.is_empty()) {
            if let Some(nick) = &record.nickname {
                self.ctx.resolutions.insert_resolved(nick, uid);
            }
            return Ok(Some(uid.to_string()));
        }
        let Some(nickname) = record.nickname.as_deref().filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        self.resolve_with_store(nickname).await
    }

    /// Resolves a nickname through the memo, the stored users table, and
    /// finally the lookup endpoint, in that order.
    async fn resolve_with_store(&mut self, nickname: &str) -> Result<Option<String>> {
        if let Some(resolution) = self.ctx.resolutions.cached(nickname) {
            return Ok(match resolution {
                Resolution::Resolved(uid) => Some(uid.clone()),
                Resolution::Unresolved => None,
            });
        }
        if !self.config.prefer_api_lookup {
            if let Some(uid) = self.store.lock().unwrap().uid_for_nickname(nickname)? {
                self.ctx.resolutions.insert_resolved(nickname, &uid);
                return Ok(Some(uid));
            }
        }
        match self.ctx.resolutions.resolve(&self.client, nickname).await? {
            Resolution::Resolved(uid) => Ok(Some(uid)),
            Resolution::Unresolved => Ok(None),
        }
    }

    /// Persists one per-player game record to storage and the exporter.
    fn persist_record(&mut self, uid: &str, record: &GameRecord) -> Result<()> {
        self.store.lock().unwrap().upsert_game_record(uid, record)?;
        if let Some(exporter) = self.exporter.as_mut() {
            exporter.append(uid, record)?;
        }
        self.summary.participant_rows += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_frontier_starts_everything_at_depth_zero() {
        let seeds = SeedsConfig {
            nicknames: vec!["Alice".to_string(), "Bob".to_string()],
            uids: vec!["u-carol".to_string()],
        };
        let frontier = seed_frontier(&seeds);

        assert_eq!(frontier.len(), 3);
        assert!(frontier.iter().all(|node| node.depth == 0));
        assert!(matches!(
            &frontier[0].target,
            NodeTarget::Nickname(n) if n == "Alice"
        ));
        assert!(matches!(
            &frontier[2].target,
            NodeTarget::Identity { uid, nickname: None } if uid == "u-carol"
        ));
    }

    #[test]
    fn test_seed_frontier_empty_when_no_seeds() {
        assert!(seed_frontier(&SeedsConfig::default()).is_empty());
    }
}
