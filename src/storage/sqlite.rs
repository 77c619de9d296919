//! SQLite storage implementation
//!
//! This module provides the SQLite-backed implementation of the
//! [`MatchStore`] trait. Write paths use `ON CONFLICT` upserts keyed on the
//! natural keys so re-ingesting a game id never duplicates rows.

use crate::api::{CatalogEntry, GameRecord};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{MatchStore, StorageError, StorageResult};
use crate::storage::RunStatus;
use chrono::Utc;
use rusqlite::{named_params, params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a database file and initializes the schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open or migrate the database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database, mainly for tests
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn upsert_user(tx: &Transaction<'_>, uid: &str, record: &GameRecord) -> StorageResult<()> {
        let start_time = record.start_time_iso();
        tx.execute(
            "INSERT INTO users (
                uid, nickname, first_seen, last_seen, ingested_until, last_mmr, ml_bot, last_language
            ) VALUES (
                :uid, :nickname, :first_seen, :last_seen, :ingested_until, :last_mmr, :ml_bot, :last_language
            )
            ON CONFLICT(uid) DO UPDATE SET
                nickname = COALESCE(excluded.nickname, users.nickname),
                last_seen = CASE
                    WHEN excluded.last_seen IS NULL THEN users.last_seen
                    WHEN users.last_seen IS NULL THEN excluded.last_seen
                    WHEN unixepoch(excluded.last_seen) > unixepoch(users.last_seen)
                        THEN excluded.last_seen
                    ELSE users.last_seen
                END,
                ingested_until = CASE
                    WHEN excluded.ingested_until IS NULL THEN users.ingested_until
                    WHEN users.ingested_until IS NULL THEN excluded.ingested_until
                    WHEN unixepoch(excluded.ingested_until) > unixepoch(users.ingested_until)
                        THEN excluded.ingested_until
                    ELSE users.ingested_until
                END,
                last_mmr = COALESCE(excluded.last_mmr, users.last_mmr),
                ml_bot = excluded.ml_bot,
                last_language = COALESCE(excluded.last_language, users.last_language)",
            named_params! {
                ":uid": uid,
                ":nickname": record.nickname,
                ":first_seen": start_time,
                ":last_seen": start_time,
                ":ingested_until": start_time,
                ":last_mmr": record.mmr_after,
                ":ml_bot": record.ml_bot_flag(),
                ":last_language": record.language,
            },
        )?;
        Ok(())
    }

    fn upsert_match(
        tx: &Transaction<'_>,
        game_id: i64,
        record: &GameRecord,
    ) -> StorageResult<()> {
        tx.execute(
            "INSERT INTO matches (
                game_id, season_id, matching_mode, matching_team_mode, server_name,
                version_season, version_major, version_minor, start_dtm, duration
            ) VALUES (
                :game_id, :season_id, :matching_mode, :matching_team_mode, :server_name,
                :version_season, :version_major, :version_minor, :start_dtm, :duration
            )
            ON CONFLICT(game_id) DO UPDATE SET
                season_id = excluded.season_id,
                matching_mode = excluded.matching_mode,
                matching_team_mode = excluded.matching_team_mode,
                server_name = excluded.server_name,
                version_season = excluded.version_season,
                version_major = excluded.version_major,
                version_minor = excluded.version_minor,
                start_dtm = excluded.start_dtm,
                duration = excluded.duration",
            named_params! {
                ":game_id": game_id,
                ":season_id": record.season_id,
                ":matching_mode": record.matching_mode,
                ":matching_team_mode": record.matching_team_mode,
                ":server_name": record.server_name,
                ":version_season": record.version_season,
                ":version_major": record.version_major,
                ":version_minor": record.version_minor,
                ":start_dtm": record.start_time_iso(),
                ":duration": record.duration,
            },
        )?;
        Ok(())
    }

    fn upsert_stats(
        tx: &Transaction<'_>,
        game_id: i64,
        uid: &str,
        record: &GameRecord,
    ) -> StorageResult<()> {
        tx.execute(
            "INSERT INTO user_match_stats (
                game_id, uid, character_num, skin_code, game_rank, player_kill,
                player_assistant, monster_kill, mmr_gain, mmr_loss_entry_cost,
                victory, play_time, damage_to_player, character_level, best_weapon,
                best_weapon_level, team_number, premade, language, ml_bot
            ) VALUES (
                :game_id, :uid, :character_num, :skin_code, :game_rank, :player_kill,
                :player_assistant, :monster_kill, :mmr_gain, :mmr_loss_entry_cost,
                :victory, :play_time, :damage_to_player, :character_level, :best_weapon,
                :best_weapon_level, :team_number, :premade, :language, :ml_bot
            )
            ON CONFLICT(game_id, uid) DO UPDATE SET
                character_num = excluded.character_num,
                skin_code = excluded.skin_code,
                game_rank = excluded.game_rank,
                player_kill = excluded.player_kill,
                player_assistant = excluded.player_assistant,
                monster_kill = excluded.monster_kill,
                mmr_gain = excluded.mmr_gain,
                mmr_loss_entry_cost = excluded.mmr_loss_entry_cost,
                victory = excluded.victory,
                play_time = excluded.play_time,
                damage_to_player = excluded.damage_to_player,
                character_level = excluded.character_level,
                best_weapon = excluded.best_weapon,
                best_weapon_level = excluded.best_weapon_level,
                team_number = excluded.team_number,
                premade = excluded.premade,
                language = excluded.language,
                ml_bot = excluded.ml_bot",
            named_params! {
                ":game_id": game_id,
                ":uid": uid,
                ":character_num": record.character_num,
                ":skin_code": record.skin_code,
                ":game_rank": record.game_rank,
                ":player_kill": record.player_kill,
                ":player_assistant": record.player_assistant,
                ":monster_kill": record.monster_kill,
                ":mmr_gain": record.effective_mmr_gain(),
                ":mmr_loss_entry_cost": record.mmr_loss_entry_cost,
                ":victory": record.victory,
                ":play_time": record.play_time,
                ":damage_to_player": record.damage_to_player,
                ":character_level": record.character_level,
                ":best_weapon": record.best_weapon,
                ":best_weapon_level": record.best_weapon_level,
                ":team_number": record.team_number,
                ":premade": record.pre_made,
                ":language": record.language,
                ":ml_bot": record.ml_bot_flag(),
            },
        )?;
        Ok(())
    }

    /// Deletes and reinserts a keyed sub-record table for one (game, player)
    fn replace_keyed_rows(
        tx: &Transaction<'_>,
        table: &str,
        key_column: &str,
        value_column: &str,
        game_id: i64,
        uid: &str,
        rows: &BTreeMap<String, i64>,
    ) -> StorageResult<()> {
        tx.execute(
            &format!("DELETE FROM {} WHERE game_id = ?1 AND uid = ?2", table),
            params![game_id, uid],
        )?;
        let sql = format!(
            "INSERT INTO {} (game_id, uid, {}, {}) VALUES (?1, ?2, ?3, ?4)",
            table, key_column, value_column
        );
        let mut stmt = tx.prepare(&sql)?;
        for (key, value) in rows {
            let Ok(key) = key.parse::<i64>() else {
                continue;
            };
            stmt.execute(params![game_id, uid, key, value])?;
        }
        Ok(())
    }

    fn replace_equipment(
        tx: &Transaction<'_>,
        game_id: i64,
        uid: &str,
        record: &GameRecord,
    ) -> StorageResult<()> {
        let Some(equipment) = &record.equipment else {
            return Ok(());
        };
        let grades = record.equipment_grade.clone().unwrap_or_default();
        tx.execute(
            "DELETE FROM equipment WHERE game_id = ?1 AND uid = ?2",
            params![game_id, uid],
        )?;
        let mut stmt = tx.prepare(
            "INSERT INTO equipment (game_id, uid, slot, item_id, grade)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (slot, item_id) in equipment {
            let Ok(slot_num) = slot.parse::<i64>() else {
                continue;
            };
            stmt.execute(params![game_id, uid, slot_num, item_id, grades.get(slot)])?;
        }
        Ok(())
    }
}

impl MatchStore for SqliteStore {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn fail_run(&mut self, run_id: i64, error: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, error = ?3 WHERE id = ?4",
            params![RunStatus::Failed.to_db_string(), now, error, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Match Ingestion =====

    fn upsert_game_record(&mut self, uid: &str, record: &GameRecord) -> StorageResult<()> {
        let game_id = record.game_id.ok_or(StorageError::MissingField("gameId"))?;

        let tx = self.conn.transaction()?;
        Self::upsert_user(&tx, uid, record)?;
        Self::upsert_match(&tx, game_id, record)?;
        Self::upsert_stats(&tx, game_id, uid, record)?;
        Self::replace_equipment(&tx, game_id, uid, record)?;
        if let Some(rows) = &record.mastery_level {
            Self::replace_keyed_rows(&tx, "mastery_levels", "mastery_id", "level", game_id, uid, rows)?;
        }
        if let Some(rows) = &record.skill_level_info {
            Self::replace_keyed_rows(&tx, "skill_levels", "skill_code", "level", game_id, uid, rows)?;
        }
        if let Some(rows) = &record.skill_order_info {
            Self::replace_keyed_rows(&tx, "skill_orders", "sequence", "skill_code", game_id, uid, rows)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn has_game(&self, game_id: i64) -> StorageResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM matches WHERE game_id = ?1",
                params![game_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn mark_game_incomplete(&mut self, game_id: i64) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE matches SET incomplete = 1 WHERE game_id = ?1",
            params![game_id],
        )?;
        Ok(())
    }

    fn participants_for_game(&self, game_id: i64) -> StorageResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT uid FROM user_match_stats WHERE game_id = ?1")?;
        let uids = stmt
            .query_map(params![game_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(uids)
    }

    // ===== User Lookups =====

    fn uid_for_nickname(&self, nickname: &str) -> StorageResult<Option<String>> {
        let uid = self
            .conn
            .query_row(
                "SELECT uid FROM users WHERE nickname = ?1
                 ORDER BY unixepoch(last_seen) DESC LIMIT 1",
                params![nickname],
                |row| row.get(0),
            )
            .optional()?;
        Ok(uid)
    }

    fn user_ingested_until(&self, uid: &str) -> StorageResult<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT ingested_until FROM users WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(value)
    }

    // ===== Metadata Catalogs =====

    fn refresh_characters(&mut self, entries: &[CatalogEntry]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM characters", [])?;
        let mut stored = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO characters (character_code, name) VALUES (?1, ?2)
                 ON CONFLICT DO NOTHING",
            )?;
            for entry in entries {
                let (Some(code), Some(name)) = (entry.int("characterCode"), entry.text("character"))
                else {
                    continue;
                };
                stored += stmt.execute(params![code, name])?;
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    fn refresh_items(&mut self, entries: &[CatalogEntry]) -> StorageResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM items", [])?;
        let mut stored = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO items (
                    item_code, name, mode_type, item_type, item_grade, is_completed_item
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT DO NOTHING",
            )?;
            for entry in entries {
                let (Some(code), Some(name)) = (entry.int("code"), entry.text("name")) else {
                    continue;
                };
                stored += stmt.execute(params![
                    code,
                    name,
                    entry.int("modeType"),
                    entry.text("itemType"),
                    entry.text("itemGrade"),
                    entry.flag("isCompletedItem").map(i64::from).unwrap_or(0),
                ])?;
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    // ===== Statistics =====

    fn count_matches(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_participant_rows(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM user_match_stats", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record(game_id: i64, nickname: &str, start: &str) -> GameRecord {
        serde_json::from_value(json!({
            "gameId": game_id,
            "nickname": nickname,
            "seasonId": 25,
            "matchingMode": 3,
            "matchingTeamMode": 3,
            "serverName": "Seoul",
            "startDtm": start,
            "duration": 1100,
            "characterNum": 14,
            "gameRank": 2,
            "playerKill": 5,
            "mmrGainInGame": 12,
            "equipment": {"0": 101, "1": 202},
            "equipmentGrade": {"0": 4, "1": 5},
            "masteryLevel": {"1": 12, "3": 9},
            "skillLevelInfo": {"1014100": 3},
            "skillOrderInfo": {"1": 1014100, "2": 1014200},
        }))
        .unwrap()
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let record = sample_record(42, "Alice", "2025-10-27T23:24:03.003+0900");

        store.upsert_game_record("u-alice", &record).unwrap();
        store.upsert_game_record("u-alice", &record).unwrap();

        assert_eq!(store.count_matches().unwrap(), 1);
        assert_eq!(store.count_participant_rows().unwrap(), 1);

        let slots: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM equipment WHERE game_id = 42", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(slots, 2);
    }

    #[test]
    fn test_upsert_requires_game_id() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let record = GameRecord::default();
        assert!(matches!(
            store.upsert_game_record("u-1", &record),
            Err(StorageError::MissingField("gameId"))
        ));
    }

    #[test]
    fn test_participants_for_game() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let record = sample_record(7, "Alice", "2025-10-27T23:24:03.003+0900");
        store.upsert_game_record("u-alice", &record).unwrap();
        let record = sample_record(7, "Bob", "2025-10-27T23:24:03.003+0900");
        store.upsert_game_record("u-bob", &record).unwrap();

        let mut uids = store.participants_for_game(7).unwrap();
        uids.sort();
        assert_eq!(uids, vec!["u-alice", "u-bob"]);
        assert!(store.has_game(7).unwrap());
        assert!(!store.has_game(8).unwrap());
    }

    #[test]
    fn test_uid_for_nickname_prefers_latest_sighting() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        // Nickname "Swapped" was seen on an old account, then on a newer one.
        let old = sample_record(1, "Swapped", "2025-01-01T00:00:00+00:00");
        store.upsert_game_record("u-old", &old).unwrap();
        let new = sample_record(2, "Swapped", "2025-06-01T00:00:00+00:00");
        store.upsert_game_record("u-new", &new).unwrap();

        assert_eq!(
            store.uid_for_nickname("Swapped").unwrap(),
            Some("u-new".to_string())
        );
        assert_eq!(store.uid_for_nickname("Nobody").unwrap(), None);
    }

    #[test]
    fn test_ingested_until_is_monotonic() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let newer = sample_record(1, "Alice", "2025-06-01T00:00:00+00:00");
        store.upsert_game_record("u-1", &newer).unwrap();
        let older = sample_record(2, "Alice", "2025-01-01T00:00:00+00:00");
        store.upsert_game_record("u-1", &older).unwrap();

        let until = store.user_ingested_until("u-1").unwrap().unwrap();
        assert!(until.starts_with("2025-06-01"));
    }

    #[test]
    fn test_mark_game_incomplete() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let record = sample_record(9, "Alice", "2025-10-27T23:24:03.003+0900");
        store.upsert_game_record("u-1", &record).unwrap();
        store.mark_game_incomplete(9).unwrap();

        let flag: i64 = store
            .conn
            .query_row("SELECT incomplete FROM matches WHERE game_id = 9", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(flag, 1);
    }

    #[test]
    fn test_catalog_refresh_replaces_rows() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let first = vec![
            CatalogEntry(json!({"characterCode": 1, "character": "Jackie"})),
            CatalogEntry(json!({"characterCode": 2, "character": "Aya"})),
        ];
        assert_eq!(store.refresh_characters(&first).unwrap(), 2);

        let second = vec![CatalogEntry(json!({"characterCode": 3, "character": "Fiora"}))];
        assert_eq!(store.refresh_characters(&second).unwrap(), 1);

        let count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM characters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_run_lifecycle() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        let run_id = store.create_run("abc123").unwrap();
        store.complete_run(run_id).unwrap();

        let status: String = store
            .conn
            .query_row("SELECT status FROM runs WHERE id = ?1", [run_id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(status, "completed");

        assert!(matches!(
            store.complete_run(run_id + 1),
            Err(StorageError::RunNotFound(_))
        ));
    }
}
