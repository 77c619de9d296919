//! Storage trait and error types

use crate::api::{CatalogEntry, GameRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record is missing required field: {0}")]
    MissingField(&'static str),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the match-history store
///
/// Every write is an idempotent upsert: applying the same record twice
/// produces the same stored state as applying it once. This is what makes
/// re-running a seed list a safe, coarse-grained resume.
pub trait MatchStore {
    // ===== Run Management =====

    /// Creates a new ingestion run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    /// Marks a run as failed, recording the cause
    fn fail_run(&mut self, run_id: i64, error: &str) -> StorageResult<()>;

    // ===== Match Ingestion =====

    /// Upserts everything a per-player game record carries: the user row,
    /// the match row, the per-user-per-match stats, and the nested
    /// equipment/mastery/skill sub-records.
    fn upsert_game_record(&mut self, uid: &str, record: &GameRecord) -> StorageResult<()>;

    /// Whether a match row exists for this game id
    fn has_game(&self, game_id: i64) -> StorageResult<bool>;

    /// Flags a match as having partial participant data
    fn mark_game_incomplete(&mut self, game_id: i64) -> StorageResult<()>;

    /// Stored participant identities for a game
    fn participants_for_game(&self, game_id: i64) -> StorageResult<Vec<String>>;

    // ===== User Lookups =====

    /// Most recently seen identity for a nickname, if any
    fn uid_for_nickname(&self, nickname: &str) -> StorageResult<Option<String>>;

    /// Timestamp up to which a user's matches have been ingested
    fn user_ingested_until(&self, uid: &str) -> StorageResult<Option<String>>;

    // ===== Metadata Catalogs =====

    /// Replaces the character catalog; returns the number of rows stored
    fn refresh_characters(&mut self, entries: &[CatalogEntry]) -> StorageResult<usize>;

    /// Replaces the item catalog; returns the number of rows stored
    fn refresh_items(&mut self, entries: &[CatalogEntry]) -> StorageResult<usize>;

    // ===== Statistics =====

    /// Total number of stored matches
    fn count_matches(&self) -> StorageResult<u64>;

    /// Total number of stored per-player match rows
    fn count_participant_rows(&self) -> StorageResult<u64>;
}
