//! Wire types for the upstream API
//!
//! Responses are JSON envelopes with a numeric `code`, a free-text `message`,
//! and endpoint-specific data alongside. Only the fields the ingester
//! persists or exports are modeled; the raw value is kept where the export
//! writer needs pass-through access.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Extracts the payload-level `code` from a decoded envelope.
///
/// The API is not consistent about the JSON type of `code`; numbers and
/// numeric strings both occur in the wild.
pub fn payload_code(body: &Value) -> Option<i64> {
    match body.get("code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The `user` object returned by the nickname lookup endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// One page of a player's match list, or the participant list of one match.
///
/// Both `/v1/user/games/uid/<uid>` and `/v1/games/<game_id>` return their
/// rows under the `userGames` key; the former adds a `next` pagination token.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GamesPage {
    pub user_games: Vec<GameRecord>,
    next: Option<Value>,
}

impl GamesPage {
    /// Pagination token for the following page, stringified.
    ///
    /// The API has returned both strings and bare integers here.
    pub fn next_token(&self) -> Option<String> {
        match self.next.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// One per-player-per-match record as returned by the API.
///
/// Every field is optional: the upstream adds, renames, and drops fields
/// between patches without notice, and older matches lack newer fields.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameRecord {
    pub game_id: Option<i64>,
    pub user_id: Option<String>,
    pub nickname: Option<String>,

    // Match context
    pub season_id: Option<i64>,
    pub matching_mode: Option<i64>,
    pub matching_team_mode: Option<i64>,
    pub server_name: Option<String>,
    pub version_season: Option<i64>,
    pub version_major: Option<i64>,
    pub version_minor: Option<i64>,
    pub start_dtm: Option<String>,
    pub duration: Option<i64>,

    // Per-player stats
    pub character_num: Option<i64>,
    pub skin_code: Option<i64>,
    pub game_rank: Option<i64>,
    pub player_kill: Option<i64>,
    pub player_assistant: Option<i64>,
    pub monster_kill: Option<i64>,
    pub mmr_gain: Option<i64>,
    pub mmr_gain_in_game: Option<i64>,
    pub mmr_loss_entry_cost: Option<i64>,
    pub mmr_after: Option<i64>,
    pub victory: Option<i64>,
    pub play_time: Option<i64>,
    pub damage_to_player: Option<i64>,
    pub character_level: Option<i64>,
    pub best_weapon: Option<i64>,
    pub best_weapon_level: Option<i64>,
    pub team_number: Option<i64>,
    pub pre_made: Option<i64>,
    pub language: Option<String>,
    pub mlbot: Option<bool>,
    #[serde(rename = "isMLBot")]
    pub is_ml_bot: Option<bool>,

    // Nested sub-records, keyed by slot / id / sequence
    pub equipment: Option<BTreeMap<String, i64>>,
    pub equipment_grade: Option<BTreeMap<String, i64>>,
    pub mastery_level: Option<BTreeMap<String, i64>>,
    pub skill_level_info: Option<BTreeMap<String, i64>>,
    pub skill_order_info: Option<BTreeMap<String, i64>>,
}

impl GameRecord {
    /// Effective MMR delta; newer payloads moved it to `mmrGainInGame`.
    pub fn effective_mmr_gain(&self) -> Option<i64> {
        self.mmr_gain.or(self.mmr_gain_in_game)
    }

    /// Collapses the two bot flags into one stored value.
    pub fn ml_bot_flag(&self) -> i64 {
        i64::from(self.mlbot == Some(true) || self.is_ml_bot == Some(true))
    }

    /// Parses `startDtm` into a timezone-aware timestamp.
    ///
    /// The API emits `2025-10-27T23:24:03.003+0900` (no colon in the
    /// offset); RFC 3339 variants and a trailing `Z` also occur.
    pub fn start_time(&self) -> Option<DateTime<FixedOffset>> {
        parse_start_time(self.start_dtm.as_deref()?)
    }

    /// `startDtm` normalized to RFC 3339, or the raw string if unparseable.
    pub fn start_time_iso(&self) -> Option<String> {
        let raw = self.start_dtm.as_deref()?;
        match parse_start_time(raw) {
            Some(parsed) => Some(parsed.to_rfc3339()),
            None => Some(raw.to_string()),
        }
    }
}

/// Parses the API's timestamp dialects into a fixed-offset datetime
pub fn parse_start_time(value: &str) -> Option<DateTime<FixedOffset>> {
    if value.is_empty() {
        return None;
    }
    if let Some(stripped) = value.strip_suffix('Z') {
        let rewritten = format!("{}+00:00", stripped);
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&rewritten) {
            return Some(parsed);
        }
    }
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
}

/// One entry of the character or item catalog, kept loosely typed
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry(pub Value);

impl CatalogEntry {
    pub fn int(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_code_accepts_numbers_and_numeric_strings() {
        assert_eq!(payload_code(&json!({"code": 200})), Some(200));
        assert_eq!(payload_code(&json!({"code": "404"})), Some(404));
        assert_eq!(payload_code(&json!({"code": null})), None);
        assert_eq!(payload_code(&json!({"message": "ok"})), None);
    }

    #[test]
    fn parse_start_time_compact_offset() {
        let parsed = parse_start_time("2025-10-27T23:24:03.003+0900").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-10-27T23:24:03.003+09:00");
    }

    #[test]
    fn parse_start_time_rfc3339_and_zulu() {
        assert!(parse_start_time("2025-10-27T23:24:03+09:00").is_some());
        assert!(parse_start_time("2025-10-27T14:24:03Z").is_some());
        assert!(parse_start_time("not a time").is_none());
    }

    #[test]
    fn game_record_deserializes_from_camel_case() {
        let record: GameRecord = serde_json::from_value(json!({
            "gameId": 42,
            "userId": "u-1",
            "nickname": "Alice",
            "seasonId": 25,
            "matchingMode": 3,
            "serverName": "Seoul",
            "mmrGainInGame": 7,
            "isMLBot": true,
            "equipment": {"0": 101, "1": 202},
        }))
        .unwrap();

        assert_eq!(record.game_id, Some(42));
        assert_eq!(record.effective_mmr_gain(), Some(7));
        assert_eq!(record.ml_bot_flag(), 1);
        assert_eq!(record.equipment.as_ref().unwrap()["0"], 101);
    }

    #[test]
    fn next_token_stringifies_numbers() {
        let page: GamesPage =
            serde_json::from_value(json!({"userGames": [], "next": 123456})).unwrap();
        assert_eq!(page.next_token(), Some("123456".to_string()));

        let page: GamesPage =
            serde_json::from_value(json!({"userGames": [], "next": ""})).unwrap();
        assert_eq!(page.next_token(), None);
    }
}
