//! Partitioned JSON-lines dataset writer

use crate::api::GameRecord;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rows buffered per partition before a part file is written
const DEFAULT_FLUSH_ROWS: usize = 1000;

/// Errors from the export writer
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encode error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Partition key for both datasets
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub season_id: Option<i64>,
    pub server_name: Option<String>,
    pub matching_mode: Option<i64>,
    /// Calendar date (UTC-naive, `YYYY-MM-DD`) of the match start
    pub date: Option<String>,
}

impl PartitionKey {
    fn from_record(record: &GameRecord) -> Self {
        let date = record
            .start_time()
            .map(|start| start.date_naive().to_string());
        Self {
            season_id: record.season_id,
            server_name: record.server_name.clone(),
            matching_mode: record.matching_mode,
            date,
        }
    }

    /// Hive-style relative directory, e.g.
    /// `season=25/server=Seoul/mode=3/date=2025-10-27`
    fn relative_dir(&self) -> PathBuf {
        let mut path = PathBuf::new();
        path.push(format!("season={}", display_or_unknown(self.season_id)));
        path.push(format!(
            "server={}",
            self.server_name.as_deref().unwrap_or("unknown")
        ));
        path.push(format!("mode={}", display_or_unknown(self.matching_mode)));
        path.push(format!(
            "date={}",
            self.date.as_deref().unwrap_or("unknown")
        ));
        path
    }
}

fn display_or_unknown(value: Option<i64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}

/// Buffered writer for one dataset (matches or participants)
struct Dataset {
    root: PathBuf,
    prefix: &'static str,
    buffers: HashMap<PartitionKey, Vec<Value>>,
    file_counters: HashMap<PartitionKey, u32>,
    flush_rows: usize,
}

impl Dataset {
    fn new(root: PathBuf, prefix: &'static str, flush_rows: usize) -> Self {
        Self {
            root,
            prefix,
            buffers: HashMap::new(),
            file_counters: HashMap::new(),
            flush_rows,
        }
    }

    fn append(&mut self, key: PartitionKey, row: Value) -> Result<(), ExportError> {
        let buffer = self.buffers.entry(key.clone()).or_default();
        buffer.push(row);
        if buffer.len() >= self.flush_rows {
            self.flush_partition(&key)?;
        }
        Ok(())
    }

    fn flush_partition(&mut self, key: &PartitionKey) -> Result<(), ExportError> {
        let Some(rows) = self.buffers.get_mut(key) else {
            return Ok(());
        };
        if rows.is_empty() {
            return Ok(());
        }

        let dir = self.root.join(key.relative_dir());
        fs::create_dir_all(&dir)?;

        let counter = self.file_counters.entry(key.clone()).or_insert(0);
        *counter += 1;
        let filename = dir.join(format!("{}-part-{:05}.jsonl", self.prefix, counter));

        let file = fs::File::create(&filename)?;
        let mut out = BufWriter::new(file);
        for row in rows.iter() {
            serde_json::to_writer(&mut out, row)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        tracing::debug!(
            "Flushed {} rows to {}",
            rows.len(),
            filename.display()
        );
        rows.clear();
        Ok(())
    }

    fn flush_all(&mut self) -> Result<(), ExportError> {
        let keys: Vec<PartitionKey> = self
            .buffers
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            self.flush_partition(&key)?;
        }
        Ok(())
    }
}

/// Writes the `matches/` and `participants/` export datasets
pub struct DatasetWriter {
    matches: Dataset,
    participants: Dataset,
    exported_matches: HashSet<i64>,
}

impl DatasetWriter {
    pub fn new(base_dir: &Path) -> Result<Self, ExportError> {
        Self::with_flush_rows(base_dir, DEFAULT_FLUSH_ROWS)
    }

    pub fn with_flush_rows(base_dir: &Path, flush_rows: usize) -> Result<Self, ExportError> {
        fs::create_dir_all(base_dir)?;
        Ok(Self {
            matches: Dataset::new(base_dir.join("matches"), "matches", flush_rows),
            participants: Dataset::new(
                base_dir.join("participants"),
                "participants",
                flush_rows,
            ),
            exported_matches: HashSet::new(),
        })
    }

    /// Appends one per-player game record: a participant row always, and a
    /// match row the first time this game id is seen.
    pub fn append(&mut self, uid: &str, record: &GameRecord) -> Result<(), ExportError> {
        let key = PartitionKey::from_record(record);

        if let Some(game_id) = record.game_id {
            if self.exported_matches.insert(game_id) {
                self.matches.append(key.clone(), match_row(record))?;
            }
        }
        self.participants
            .append(key, participant_row(uid, record))?;
        Ok(())
    }

    /// Writes out every non-empty buffer. Call at end of run; data still
    /// buffered when the process exits is lost.
    pub fn flush_all(&mut self) -> Result<(), ExportError> {
        self.matches.flush_all()?;
        self.participants.flush_all()?;
        Ok(())
    }
}

fn match_row(record: &GameRecord) -> Value {
    json!({
        "game_id": record.game_id,
        "season_id": record.season_id,
        "matching_mode": record.matching_mode,
        "matching_team_mode": record.matching_team_mode,
        "version_season": record.version_season,
        "version_major": record.version_major,
        "version_minor": record.version_minor,
        "start_dtm": record.start_time_iso(),
        "server_name": record.server_name,
        "duration": record.duration,
    })
}

fn participant_row(uid: &str, record: &GameRecord) -> Value {
    json!({
        "game_id": record.game_id,
        "uid": uid,
        "nickname": record.nickname,
        "character_num": record.character_num,
        "skin_code": record.skin_code,
        "game_rank": record.game_rank,
        "player_kill": record.player_kill,
        "player_assistant": record.player_assistant,
        "monster_kill": record.monster_kill,
        "mmr_gain": record.effective_mmr_gain(),
        "mmr_loss_entry_cost": record.mmr_loss_entry_cost,
        "victory": record.victory,
        "play_time": record.play_time,
        "duration": record.duration,
        "damage_to_player": record.damage_to_player,
        "character_level": record.character_level,
        "best_weapon": record.best_weapon,
        "best_weapon_level": record.best_weapon_level,
        "team_number": record.team_number,
        "premade": record.pre_made,
        "language": record.language,
        "ml_bot": record.ml_bot_flag(),
        "season_id": record.season_id,
        "matching_mode": record.matching_mode,
        "matching_team_mode": record.matching_team_mode,
        "server_name": record.server_name,
        "mastery_level": record.mastery_level,
        "equipment": record.equipment,
        "equipment_grade": record.equipment_grade,
        "skill_level_info": record.skill_level_info,
        "skill_order_info": record.skill_order_info,
    })
}
