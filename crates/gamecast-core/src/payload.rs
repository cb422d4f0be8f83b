//! Typed view of the game client's "all game data" document and its
//! conversion into a [`MatchSnapshot`].
//!
//! Every field defaults when absent; validation happens once, in
//! [`LiveGamePayload::into_snapshot`].

use serde::Deserialize;
use thiserror::Error;

use crate::types::{MatchSnapshot, PlayerSnapshot};

pub const STATUS_LOADING: &str = "loading";
pub const STATUS_IN_PROGRESS: &str = "in_progress";
pub const STATUS_ENDED: &str = "ended";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload has no players")]
    NoPlayers,

    #[error("player at roster index {index} has no name")]
    MissingName { index: usize },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGamePayload {
    #[serde(default)]
    pub active_player: ActivePlayer,
    #[serde(default)]
    pub all_players: Vec<RosterEntry>,
    #[serde(default)]
    pub game_data: GameData,
    #[serde(default)]
    pub events: EventLog,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePlayer {
    #[serde(default)]
    pub riot_id_game_name: Option<String>,
    #[serde(default)]
    pub summoner_name: Option<String>,
    #[serde(default)]
    pub current_gold: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    #[serde(default)]
    pub riot_id_game_name: Option<String>,
    #[serde(default)]
    pub summoner_name: Option<String>,
    #[serde(default)]
    pub champion_name: String,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub scores: Scores,
    #[serde(default)]
    pub items: Vec<ItemEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub creep_score: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemEntry {
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    #[serde(default)]
    pub game_mode: String,
    #[serde(default)]
    pub game_time: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventLog {
    #[serde(default, rename = "Events")]
    pub events: Vec<GameEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GameEvent {
    #[serde(default, rename = "EventName")]
    pub name: String,
}

fn pick_name(riot_id: &Option<String>, summoner: &Option<String>) -> Option<String> {
    [riot_id, summoner]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

impl RosterEntry {
    pub fn name(&self) -> Option<String> {
        pick_name(&self.riot_id_game_name, &self.summoner_name)
    }

    fn to_snapshot(&self, index: usize, gold: f64) -> Result<PlayerSnapshot, PayloadError> {
        let name = self.name().ok_or(PayloadError::MissingName { index })?;
        Ok(PlayerSnapshot {
            name,
            champion: self.champion_name.clone(),
            kills: self.scores.kills,
            deaths: self.scores.deaths,
            assists: self.scores.assists,
            creep_score: self.scores.creep_score,
            gold,
            items: self
                .items
                .iter()
                .map(|i| i.display_name.clone())
                .filter(|n| !n.is_empty())
                .collect(),
        })
    }
}

impl LiveGamePayload {
    pub fn from_json(value: serde_json::Value) -> Result<Self, PayloadError> {
        serde_json::from_value(value).map_err(|e| PayloadError::Malformed(e.to_string()))
    }

    /// Status derived from the most recent lifecycle event.
    pub fn status(&self) -> &'static str {
        let mut status = STATUS_LOADING;
        for event in &self.events.events {
            match event.name.as_str() {
                "GameStart" => status = STATUS_IN_PROGRESS,
                "GameEnd" => status = STATUS_ENDED,
                _ => {}
            }
        }
        status
    }

    pub fn into_snapshot(self) -> Result<MatchSnapshot, PayloadError> {
        if self.all_players.is_empty() {
            return Err(PayloadError::NoPlayers);
        }

        let active_name = pick_name(
            &self.active_player.riot_id_game_name,
            &self.active_player.summoner_name,
        );
        let main_index = active_name
            .as_deref()
            .and_then(|active| {
                self.all_players
                    .iter()
                    .position(|p| p.name().as_deref() == Some(active))
            })
            .unwrap_or(0);

        let main_entry = &self.all_players[main_index];
        let main_player = main_entry.to_snapshot(main_index, self.active_player.current_gold)?;

        let mut allies = Vec::new();
        let mut enemies = Vec::new();
        for (index, entry) in self.all_players.iter().enumerate() {
            if index == main_index {
                continue;
            }
            let player = entry.to_snapshot(index, 0.0)?;
            if entry.team == main_entry.team {
                allies.push(player);
            } else {
                enemies.push(player);
            }
        }

        Ok(MatchSnapshot {
            status: self.status().to_string(),
            main_player,
            allies,
            enemies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(name: &str, champ: &str, team: &str) -> serde_json::Value {
        json!({
            "riotIdGameName": name,
            "championName": champ,
            "team": team,
            "scores": {"kills": 1, "deaths": 2, "assists": 3, "creepScore": 40},
            "items": [{"displayName": "Boots", "itemID": 1001}]
        })
    }

    #[test]
    fn splits_roster_by_team() {
        let payload = LiveGamePayload::from_json(json!({
            "activePlayer": {"riotIdGameName": "me", "currentGold": 812.5},
            "allPlayers": [
                entry("ally", "Leona", "ORDER"),
                entry("me", "Ahri", "ORDER"),
                entry("foe", "Zed", "CHAOS"),
            ],
            "events": {"Events": [{"EventName": "GameStart"}]}
        }))
        .unwrap();
        let snap = payload.into_snapshot().unwrap();
        assert_eq!(snap.status, STATUS_IN_PROGRESS);
        assert_eq!(snap.main_player.name, "me");
        assert!((snap.main_player.gold - 812.5).abs() < f64::EPSILON);
        assert_eq!(snap.main_player.items, vec!["Boots"]);
        assert_eq!(snap.allies.len(), 1);
        assert_eq!(snap.allies[0].name, "ally");
        assert_eq!(snap.allies[0].gold, 0.0);
        assert_eq!(snap.enemies[0].champion, "Zed");
    }

    #[test]
    fn falls_back_to_first_entry() {
        let payload = LiveGamePayload::from_json(json!({
            "allPlayers": [entry("first", "Ahri", "ORDER"), entry("second", "Zed", "CHAOS")]
        }))
        .unwrap();
        let snap = payload.into_snapshot().unwrap();
        assert_eq!(snap.main_player.name, "first");
        assert_eq!(snap.status, STATUS_LOADING);
    }

    #[test]
    fn summoner_name_used_when_riot_id_blank() {
        let payload = LiveGamePayload::from_json(json!({
            "allPlayers": [{"riotIdGameName": "  ", "summonerName": "legacy"}]
        }))
        .unwrap();
        assert_eq!(payload.into_snapshot().unwrap().main_player.name, "legacy");
    }

    #[test]
    fn empty_roster_rejected() {
        let payload = LiveGamePayload::from_json(json!({})).unwrap();
        assert_eq!(payload.into_snapshot().unwrap_err(), PayloadError::NoPlayers);
    }

    #[test]
    fn nameless_player_rejected() {
        let payload = LiveGamePayload::from_json(json!({
            "allPlayers": [entry("me", "Ahri", "ORDER"), {"championName": "Zed"}]
        }))
        .unwrap();
        assert_eq!(
            payload.into_snapshot().unwrap_err(),
            PayloadError::MissingName { index: 1 }
        );
    }

    #[test]
    fn wrong_types_are_malformed() {
        let err = LiveGamePayload::from_json(json!({"allPlayers": "nope"})).unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn game_end_wins_over_start() {
        let payload = LiveGamePayload::from_json(json!({
            "events": {"Events": [{"EventName": "GameStart"}, {"EventName": "ChampionKill"}, {"EventName": "GameEnd"}]}
        }))
        .unwrap();
        assert_eq!(payload.status(), STATUS_ENDED);
    }
}
