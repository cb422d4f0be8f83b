//! Snapshot differencing: turns consecutive match snapshots into an
//! ordered list of change events.
//!
//! The detector owns exactly one baseline. The first call after
//! construction or [`ChangeDetector::reset`] only establishes it; every
//! call replaces it with the snapshot just seen.

use std::collections::HashSet;

use crate::types::{
    ChangeDetail, ChangeEvent, MatchSnapshot, PlayerSnapshot, SYSTEM_SUBJECT,
};

/// Default gold thresholds (ascending).
pub const DEFAULT_GOLD_MILESTONES: [f64; 7] =
    [1000.0, 2000.0, 3000.0, 5000.0, 7500.0, 10000.0, 15000.0];

/// Default creep-score thresholds (ascending).
pub const DEFAULT_CS_MILESTONES: [u32; 6] = [50, 100, 150, 200, 250, 300];

/// Which transitions the detector reports, plus the milestone ladders.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub track_game_status: bool,
    pub track_kills: bool,
    pub track_deaths: bool,
    pub track_assists: bool,
    pub track_items: bool,
    gold_milestones: Vec<f64>,
    cs_milestones: Vec<u32>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            track_game_status: true,
            track_kills: true,
            track_deaths: true,
            track_assists: true,
            track_items: true,
            gold_milestones: DEFAULT_GOLD_MILESTONES.to_vec(),
            cs_milestones: DEFAULT_CS_MILESTONES.to_vec(),
        }
    }
}

impl DetectorConfig {
    /// Replace the gold ladder. Sorted ascending, duplicates and NaN dropped.
    pub fn with_gold_milestones(mut self, mut milestones: Vec<f64>) -> Self {
        milestones.retain(|m| !m.is_nan());
        milestones.sort_by(f64::total_cmp);
        milestones.dedup();
        self.gold_milestones = milestones;
        self
    }

    /// Replace the creep-score ladder. Sorted ascending, duplicates dropped.
    pub fn with_cs_milestones(mut self, mut milestones: Vec<u32>) -> Self {
        milestones.sort_unstable();
        milestones.dedup();
        self.cs_milestones = milestones;
        self
    }

    pub fn gold_milestones(&self) -> &[f64] {
        &self.gold_milestones
    }

    pub fn cs_milestones(&self) -> &[u32] {
        &self.cs_milestones
    }
}

/// Stateful differ holding the previous snapshot.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    config: DetectorConfig,
    baseline: Option<MatchSnapshot>,
}

impl ChangeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            baseline: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The snapshot the next call will be compared against.
    pub fn baseline(&self) -> Option<&MatchSnapshot> {
        self.baseline.as_ref()
    }

    /// Forget the baseline; the next `detect` only re-establishes it.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// Diff `current` against the baseline and adopt it as the new baseline.
    ///
    /// Order: game status, then the main player (kill, death, assist, item
    /// purchase, gold milestones, CS milestones), then allies and enemies in
    /// roster order without milestones.
    pub fn detect(&mut self, current: MatchSnapshot) -> Vec<ChangeEvent> {
        let Some(previous) = self.baseline.replace(current) else {
            return Vec::new();
        };
        // Just stored above.
        let Some(current) = self.baseline.as_ref() else {
            return Vec::new();
        };

        let mut events = Vec::new();

        if self.config.track_game_status && previous.status != current.status {
            events.push(ChangeEvent {
                subject: SYSTEM_SUBJECT.to_string(),
                is_main_player: false,
                stats: None,
                detail: ChangeDetail::GameStatus {
                    from: previous.status.clone(),
                    to: current.status.clone(),
                },
            });
        }

        self.diff_player(&previous.main_player, &current.main_player, true, &mut events);

        for (prev_roster, curr_roster) in [
            (&previous.allies, &current.allies),
            (&previous.enemies, &current.enemies),
        ] {
            for prev in prev_roster {
                // Players who left have no counterpart and produce nothing.
                if let Some(curr) = find_by_name(curr_roster, &prev.name) {
                    self.diff_player(prev, curr, false, &mut events);
                }
            }
        }

        events
    }

    fn diff_player(
        &self,
        prev: &PlayerSnapshot,
        curr: &PlayerSnapshot,
        is_main_player: bool,
        out: &mut Vec<ChangeEvent>,
    ) {
        let event = |detail: ChangeDetail| ChangeEvent {
            subject: curr.name.clone(),
            is_main_player,
            stats: Some(curr.stat_line()),
            detail,
        };

        if self.config.track_kills && curr.kills > prev.kills {
            out.push(event(ChangeDetail::Kill {
                from: prev.kills,
                to: curr.kills,
            }));
        }

        if self.config.track_deaths && curr.deaths > prev.deaths {
            out.push(event(ChangeDetail::Death {
                from: prev.deaths,
                to: curr.deaths,
            }));
        }

        if self.config.track_assists && curr.assists > prev.assists {
            out.push(event(ChangeDetail::Assist {
                from: prev.assists,
                to: curr.assists,
            }));
        }

        // Sales shrink the list and are not reported.
        if self.config.track_items && curr.items.len() >= prev.items.len() {
            let prev_set: HashSet<&str> = prev.items.iter().map(String::as_str).collect();
            let curr_set: HashSet<&str> = curr.items.iter().map(String::as_str).collect();
            if prev_set != curr_set {
                let mut seen = HashSet::new();
                let added = curr
                    .items
                    .iter()
                    .filter(|i| !prev_set.contains(i.as_str()) && seen.insert(i.as_str()))
                    .cloned()
                    .collect();
                out.push(event(ChangeDetail::ItemPurchase {
                    previous: prev.items.clone(),
                    current: curr.items.clone(),
                    added,
                }));
            }
        }

        if !is_main_player {
            return;
        }

        for &threshold in &self.config.gold_milestones {
            if prev.gold < threshold && threshold <= curr.gold {
                out.push(event(ChangeDetail::GoldMilestone {
                    previous_gold: prev.gold,
                    threshold,
                }));
            }
        }

        for &threshold in &self.config.cs_milestones {
            if prev.creep_score < threshold && threshold <= curr.creep_score {
                out.push(event(ChangeDetail::CsMilestone {
                    previous_cs: prev.creep_score,
                    threshold,
                }));
            }
        }
    }
}

fn find_by_name<'a>(players: &'a [PlayerSnapshot], name: &str) -> Option<&'a PlayerSnapshot> {
    players.iter().find(|p| p.name == name)
}
