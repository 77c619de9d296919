//! Database schema definitions
//!
//! All SQL schema definitions for the Arena-Stats database. Re-ingesting the
//! same game id must be a no-op beyond refreshing mutable fields, so every
//! table carries a natural key and the write paths use upserts against it.

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track ingestion runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT
);

-- Players, keyed by their stable identity
CREATE TABLE IF NOT EXISTS users (
    uid TEXT PRIMARY KEY,
    nickname TEXT,
    first_seen TEXT,
    last_seen TEXT,
    ingested_until TEXT,
    last_mmr INTEGER,
    ml_bot INTEGER DEFAULT 0,
    last_language TEXT
);

CREATE INDEX IF NOT EXISTS idx_user_nickname ON users (nickname);

-- Matches
CREATE TABLE IF NOT EXISTS matches (
    game_id INTEGER PRIMARY KEY,
    season_id INTEGER,
    matching_mode INTEGER,
    matching_team_mode INTEGER,
    server_name TEXT,
    incomplete INTEGER DEFAULT 0,
    version_season INTEGER,
    version_major INTEGER,
    version_minor INTEGER,
    start_dtm TEXT,
    duration INTEGER
);

CREATE INDEX IF NOT EXISTS idx_matches_context
    ON matches (season_id, server_name, matching_mode, matching_team_mode);

-- One row per player per match
CREATE TABLE IF NOT EXISTS user_match_stats (
    game_id INTEGER NOT NULL,
    uid TEXT NOT NULL,
    character_num INTEGER,
    skin_code INTEGER,
    game_rank INTEGER,
    player_kill INTEGER,
    player_assistant INTEGER,
    monster_kill INTEGER,
    mmr_gain INTEGER,
    mmr_loss_entry_cost INTEGER,
    victory INTEGER,
    play_time INTEGER,
    damage_to_player INTEGER,
    character_level INTEGER,
    best_weapon INTEGER,
    best_weapon_level INTEGER,
    team_number INTEGER,
    premade INTEGER,
    language TEXT,
    ml_bot INTEGER,
    PRIMARY KEY (game_id, uid),
    FOREIGN KEY (game_id) REFERENCES matches(game_id) ON DELETE CASCADE,
    FOREIGN KEY (uid) REFERENCES users(uid) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_user_match_character
    ON user_match_stats (character_num, game_rank);

CREATE INDEX IF NOT EXISTS idx_user_match_user ON user_match_stats (uid);

-- Nested sub-records, replaced wholesale per (game, player)
CREATE TABLE IF NOT EXISTS equipment (
    game_id INTEGER NOT NULL,
    uid TEXT NOT NULL,
    slot INTEGER NOT NULL,
    item_id INTEGER,
    grade INTEGER,
    PRIMARY KEY (game_id, uid, slot),
    FOREIGN KEY (game_id, uid) REFERENCES user_match_stats(game_id, uid)
        ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS mastery_levels (
    game_id INTEGER NOT NULL,
    uid TEXT NOT NULL,
    mastery_id INTEGER NOT NULL,
    level INTEGER,
    PRIMARY KEY (game_id, uid, mastery_id),
    FOREIGN KEY (game_id, uid) REFERENCES user_match_stats(game_id, uid)
        ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS skill_levels (
    game_id INTEGER NOT NULL,
    uid TEXT NOT NULL,
    skill_code INTEGER NOT NULL,
    level INTEGER,
    PRIMARY KEY (game_id, uid, skill_code),
    FOREIGN KEY (game_id, uid) REFERENCES user_match_stats(game_id, uid)
        ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS skill_orders (
    game_id INTEGER NOT NULL,
    uid TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    skill_code INTEGER,
    PRIMARY KEY (game_id, uid, sequence),
    FOREIGN KEY (game_id, uid) REFERENCES user_match_stats(game_id, uid)
        ON DELETE CASCADE
);

-- Metadata catalogs, replaced wholesale on refresh
CREATE TABLE IF NOT EXISTS characters (
    character_code INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS items (
    item_code INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    mode_type INTEGER,
    item_type TEXT,
    item_grade TEXT,
    is_completed_item INTEGER
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
