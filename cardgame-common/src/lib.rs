// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Query parameter carrying the player identity from the bot to the web app.
pub const USER_ID_PARAM: &str = "user_id";
pub const DEFAULT_USER_ID: &str = "default";
pub const LAST_PLAYED_KEY: &str = "lastPlayed";

pub type UserId = String;
pub type CardId = String;

/// Stored stats document. Starts out as [`UserStats::new_at`] and then holds
/// whatever keys the client saved, verbatim.
pub type StatsRecord = Map<String, Value>;

/// Per-user gameplay totals as reported by the game client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub games_played: u64,
    pub games_won: u64,
    pub games_lost: u64,
    pub total_damage_dealt: u64,
    pub total_cards_played: u64,
    pub total_turns: u64,
    pub favorite_cards: BTreeMap<CardId, u64>,
    pub last_played: DateTime<Utc>,
}

impl UserStats {
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            games_played: 0,
            games_won: 0,
            games_lost: 0,
            total_damage_dealt: 0,
            total_cards_played: 0,
            total_turns: 0,
            favorite_cards: BTreeMap::new(),
            last_played: now,
        }
    }

    pub fn into_record(self) -> StatsRecord {
        let favorite_cards: Map<String, Value> = self
            .favorite_cards
            .into_iter()
            .map(|(card, count)| (card, Value::from(count)))
            .collect();

        let mut record = StatsRecord::new();
        record.insert("gamesPlayed".to_string(), Value::from(self.games_played));
        record.insert("gamesWon".to_string(), Value::from(self.games_won));
        record.insert("gamesLost".to_string(), Value::from(self.games_lost));
        record.insert(
            "totalDamageDealt".to_string(),
            Value::from(self.total_damage_dealt),
        );
        record.insert(
            "totalCardsPlayed".to_string(),
            Value::from(self.total_cards_played),
        );
        record.insert("totalTurns".to_string(), Value::from(self.total_turns));
        record.insert("favoriteCards".to_string(), Value::Object(favorite_cards));
        stamp_last_played(&mut record, self.last_played);
        record
    }
}

/// Zeroed record for a user seen for the first time.
pub fn default_record(now: DateTime<Utc>) -> StatsRecord {
    UserStats::new_at(now).into_record()
}

/// Copy every key of `update` over `record`, then stamp `lastPlayed` with
/// `now`. Keys and values are stored as sent; a client-supplied `lastPlayed`
/// is overwritten.
pub fn merge_update(record: &mut StatsRecord, update: StatsRecord, now: DateTime<Utc>) {
    record.extend(update);
    stamp_last_played(record, now);
}

fn stamp_last_played(record: &mut StatsRecord, now: DateTime<Utc>) {
    record.insert(
        LAST_PLAYED_KEY.to_string(),
        Value::String(now.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    );
}

/// Web app URL for `user_id`: `base` with `user_id=<id>` appended to its
/// query string.
pub fn launch_url(base: &Url, user_id: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(USER_ID_PARAM, user_id);
    url
}

pub fn env_or(var_name: &str, default: &str) -> String {
    std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string())
}

/// Read a variable that has no sensible default. Blank values count as unset.
pub fn required_env(var_name: &str) -> anyhow::Result<String> {
    required_value(var_name, std::env::var(var_name).ok())
}

fn required_value(var_name: &str, value: Option<String>) -> anyhow::Result<String> {
    normalize_optional_string(value).with_context(|| format!("{var_name} must be set"))
}

fn normalize_optional_string(value: Option<String>) -> Option<String> {
    value
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000 + seconds, 0).unwrap()
    }

    fn object(value: Value) -> StatsRecord {
        match value {
            Value::Object(map) => map,
            other => panic!("expected a JSON object, got {other}"),
        }
    }

    #[test]
    fn new_record_is_all_zero() {
        let stats = UserStats::new_at(at(0));
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.games_won, 0);
        assert_eq!(stats.games_lost, 0);
        assert_eq!(stats.total_damage_dealt, 0);
        assert_eq!(stats.total_cards_played, 0);
        assert_eq!(stats.total_turns, 0);
        assert!(stats.favorite_cards.is_empty());
        assert_eq!(stats.last_played, at(0));
    }

    #[test]
    fn default_record_has_the_eight_camel_case_keys() {
        let record = default_record(at(0));

        let mut keys: Vec<&str> = record.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "favoriteCards",
                "gamesLost",
                "gamesPlayed",
                "gamesWon",
                "lastPlayed",
                "totalCardsPlayed",
                "totalDamageDealt",
                "totalTurns",
            ]
        );
        assert_eq!(record["favoriteCards"], json!({}));
        assert_eq!(record["gamesPlayed"], 0);
    }

    #[test]
    fn default_record_matches_typed_serialization() {
        let typed = serde_json::to_value(UserStats::new_at(at(3))).unwrap();
        assert_eq!(Value::Object(default_record(at(3))), typed);

        let back: UserStats = serde_json::from_value(Value::Object(default_record(at(3)))).unwrap();
        assert_eq!(back, UserStats::new_at(at(3)));
    }

    #[test]
    fn merge_overwrites_only_present_fields() {
        let mut record = default_record(at(0));
        record.insert("gamesLost".to_string(), json!(4));
        record.insert("totalTurns".to_string(), json!(30));

        merge_update(
            &mut record,
            object(json!({"gamesPlayed": 5, "gamesWon": 1})),
            at(10),
        );

        assert_eq!(record["gamesPlayed"], 5);
        assert_eq!(record["gamesWon"], 1);
        assert_eq!(record["gamesLost"], 4);
        assert_eq!(record["totalTurns"], 30);
        let stats: UserStats = serde_json::from_value(Value::Object(record)).unwrap();
        assert_eq!(stats.last_played, at(10));
    }

    #[test]
    fn merge_replaces_favorite_cards_wholesale() {
        let mut record = default_record(at(0));
        record.insert("favoriteCards".to_string(), json!({"fireball": 3}));

        merge_update(
            &mut record,
            object(json!({"favoriteCards": {"knight": 2}})),
            at(1),
        );

        assert_eq!(record["favoriteCards"], json!({"knight": 2}));
    }

    #[test]
    fn merge_stores_unknown_and_odd_typed_values_verbatim() {
        let mut record = default_record(at(0));

        merge_update(
            &mut record,
            object(json!({
                "streak": 3,
                "gamesPlayed": -1,
                "totalDamageDealt": 12.5,
                "difficulty": "hard"
            })),
            at(1),
        );

        assert_eq!(record["streak"], 3);
        assert_eq!(record["gamesPlayed"], -1);
        assert_eq!(record["totalDamageDealt"], 12.5);
        assert_eq!(record["difficulty"], "hard");
        assert_eq!(record["gamesWon"], 0);
    }

    #[test]
    fn merge_overwrites_client_supplied_last_played() {
        let mut record = default_record(at(0));

        merge_update(
            &mut record,
            object(json!({"lastPlayed": "1999-01-01T00:00:00Z"})),
            at(5),
        );

        let stats: UserStats = serde_json::from_value(Value::Object(record)).unwrap();
        assert_eq!(stats.last_played, at(5));
    }

    #[test]
    fn merge_keeps_last_played_monotonic_with_clock() {
        let mut record = default_record(at(0));
        let first = at(1);
        merge_update(&mut record, StatsRecord::new(), first);
        let second = first + Duration::milliseconds(1);
        merge_update(&mut record, StatsRecord::new(), second);

        let stats: UserStats = serde_json::from_value(Value::Object(record)).unwrap();
        assert!(stats.last_played > first);
    }

    #[test]
    fn launch_url_appends_user_id() {
        let base = Url::parse("https://cards.example.com/play").unwrap();
        let url = launch_url(&base, "42");
        assert_eq!(url.as_str(), "https://cards.example.com/play?user_id=42");
    }

    #[test]
    fn launch_url_keeps_existing_query_and_encodes_id() {
        let base = Url::parse("https://cards.example.com/?theme=dark").unwrap();
        let url = launch_url(&base, "a b&c");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("theme".to_string(), "dark".to_string()),
                ("user_id".to_string(), "a b&c".to_string()),
            ]
        );
    }

    #[test]
    fn required_env_rejects_missing_variable() {
        let error = required_env("CARDGAME_COMMON_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(error.to_string().contains("CARDGAME_COMMON_TEST_UNSET_VARIABLE"));
    }

    #[test]
    fn required_value_treats_blank_as_unset() {
        let error = required_value("WEBAPP_URL", Some("   ".to_string())).unwrap_err();
        assert_eq!(error.to_string(), "WEBAPP_URL must be set");
        assert!(required_value("WEBAPP_URL", Some(String::new())).is_err());
    }

    #[test]
    fn required_value_trims_surrounding_whitespace() {
        let value = required_value("TELEGRAM_BOT_TOKEN", Some("  123:abc \n".to_string())).unwrap();
        assert_eq!(value, "123:abc");
    }

    #[test]
    fn env_or_falls_back_to_default() {
        assert_eq!(
            env_or("CARDGAME_COMMON_TEST_UNSET_VARIABLE", "0.0.0.0:5000"),
            "0.0.0.0:5000"
        );
    }
}
