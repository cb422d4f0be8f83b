//! Value types exchanged between pipeline stages.
//!
//! Snapshots are immutable once built: each ingest produces a brand-new
//! `MatchSnapshot` that replaces the previous one wholesale.

use serde::{Deserialize, Serialize};

/// Subject name used for match-wide events that have no player.
pub const SYSTEM_SUBJECT: &str = "System";

// ─── Snapshots ──────────────────────────────────────────────────

/// Point-in-time view of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Stable key used to match a player across snapshots.
    pub name: String,
    pub champion: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub creep_score: u32,
    pub gold: f64,
    /// Owned item names. Compared with set semantics; order is irrelevant.
    pub items: Vec<String>,
}

impl PlayerSnapshot {
    /// Derived stats captured into events for prompt rendering.
    pub fn stat_line(&self) -> StatLine {
        StatLine {
            champion: self.champion.clone(),
            kills: self.kills,
            deaths: self.deaths,
            assists: self.assists,
            creep_score: self.creep_score,
            gold: self.gold,
        }
    }
}

/// Point-in-time view of a whole match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub status: String,
    pub main_player: PlayerSnapshot,
    pub allies: Vec<PlayerSnapshot>,
    pub enemies: Vec<PlayerSnapshot>,
}

// ─── Change events ──────────────────────────────────────────────

/// Discriminant of a [`ChangeEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    GameStatus,
    Kill,
    Death,
    Assist,
    ItemPurchase,
    GoldMilestone,
    CsMilestone,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::GameStatus => "game_status",
            ChangeKind::Kill => "kill",
            ChangeKind::Death => "death",
            ChangeKind::Assist => "assist",
            ChangeKind::ItemPurchase => "item_purchase",
            ChangeKind::GoldMilestone => "gold_milestone",
            ChangeKind::CsMilestone => "cs_milestone",
        }
    }
}

/// Subject's derived stats at the moment an event was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatLine {
    pub champion: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub creep_score: u32,
    pub gold: f64,
}

/// Per-kind old/new values of a change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeDetail {
    GameStatus { from: String, to: String },
    Kill { from: u32, to: u32 },
    Death { from: u32, to: u32 },
    Assist { from: u32, to: u32 },
    /// `current` is the full item list; `added` is `current − previous`.
    ItemPurchase {
        previous: Vec<String>,
        current: Vec<String>,
        added: Vec<String>,
    },
    GoldMilestone { previous_gold: f64, threshold: f64 },
    CsMilestone { previous_cs: u32, threshold: u32 },
}

impl ChangeDetail {
    pub fn kind(&self) -> ChangeKind {
        match self {
            ChangeDetail::GameStatus { .. } => ChangeKind::GameStatus,
            ChangeDetail::Kill { .. } => ChangeKind::Kill,
            ChangeDetail::Death { .. } => ChangeKind::Death,
            ChangeDetail::Assist { .. } => ChangeKind::Assist,
            ChangeDetail::ItemPurchase { .. } => ChangeKind::ItemPurchase,
            ChangeDetail::GoldMilestone { .. } => ChangeKind::GoldMilestone,
            ChangeDetail::CsMilestone { .. } => ChangeKind::CsMilestone,
        }
    }
}

/// One detected state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub subject: String,
    pub is_main_player: bool,
    /// `None` for match-wide events (game status).
    pub stats: Option<StatLine>,
    pub detail: ChangeDetail,
}

impl ChangeEvent {
    pub fn kind(&self) -> ChangeKind {
        self.detail.kind()
    }
}

// ─── Notification ───────────────────────────────────────────────

/// Rendered commentary ready for fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub audio: Vec<u8>,
    pub voice: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_kind_matches_variant() {
        let d = ChangeDetail::GoldMilestone {
            previous_gold: 900.0,
            threshold: 1000.0,
        };
        assert_eq!(d.kind(), ChangeKind::GoldMilestone);
        assert_eq!(d.kind().as_str(), "gold_milestone");
    }

    #[test]
    fn detail_serializes_with_kind_tag() {
        let d = ChangeDetail::Kill { from: 2, to: 3 };
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["kind"], "kill");
        assert_eq!(json["from"], 2);
        assert_eq!(json["to"], 3);
    }

    #[test]
    fn stat_line_copies_player_stats() {
        let p = PlayerSnapshot {
            name: "Faker".into(),
            champion: "Ahri".into(),
            kills: 4,
            deaths: 1,
            assists: 7,
            creep_score: 180,
            gold: 1250.5,
            items: vec!["Doran's Ring".into()],
        };
        let s = p.stat_line();
        assert_eq!(s.champion, "Ahri");
        assert_eq!((s.kills, s.deaths, s.assists, s.creep_score), (4, 1, 7, 180));
        assert!((s.gold - 1250.5).abs() < f64::EPSILON);
    }
}
