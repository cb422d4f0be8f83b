//! Significance filter and commentary prompt assembly.

use crate::types::{ChangeDetail, ChangeEvent, ChangeKind, MatchSnapshot, StatLine};

/// Voice tag used for synthesized commentary unless configured otherwise.
pub const DEFAULT_VOICE: &str = "onyx";

/// Substituted when the commentary generator fails.
pub const FALLBACK_COMMENTARY: &str =
    "Error generating commentary. But honestly, you're probably doing terribly anyway.";

/// Persona handed to the commentary generator as its system prompt.
pub const COMMENTATOR_PERSONA: &str = "You are a game stats agent for League of Legends that is very mean, \
and you will be given live game stats data of a match. Go out of your way to roast and criticize the \
player whenever you get the chance to, but still give good advice. Keep your responses concise and \
punchy - 2-3 sentences max. Focus on the most important aspects of what just happened.";

const PREAMBLE: &str = "The following events just happened in the game:";

const INSTRUCTIONS: &str = "Give a brief, snarky commentary on what just happened. \
Prioritize suggesting item builds for the active player and their champion.";

const CLOSING: &str = "Be mean but helpful. Keep it short and punchy.";

/// Whether an event is worth narrating.
///
/// Main player: kills, deaths, purchases and milestones. Everyone else:
/// kills and deaths only.
pub fn is_significant(event: &ChangeEvent) -> bool {
    match event.kind() {
        ChangeKind::Kill | ChangeKind::Death => true,
        ChangeKind::ItemPurchase | ChangeKind::GoldMilestone | ChangeKind::CsMilestone => {
            event.is_main_player
        }
        ChangeKind::Assist | ChangeKind::GameStatus => false,
    }
}

/// Keep significant events, preserving detection order.
pub fn significant_events(events: &[ChangeEvent]) -> Vec<&ChangeEvent> {
    events.iter().filter(|e| is_significant(e)).collect()
}

/// One-line description of an event including the subject's current stats.
pub fn render_event(event: &ChangeEvent) -> String {
    let name = &event.subject;
    let zero = StatLine {
        champion: String::new(),
        kills: 0,
        deaths: 0,
        assists: 0,
        creep_score: 0,
        gold: 0.0,
    };
    let s = event.stats.as_ref().unwrap_or(&zero);

    match &event.detail {
        ChangeDetail::Kill { from, to } => format!(
            "{name} just got a kill! They now have {to} kills (was {from}). \
             Current stats: {} deaths, {} assists, {} CS, {:.0} gold.",
            s.deaths, s.assists, s.creep_score, s.gold
        ),
        ChangeDetail::Death { from, to } => format!(
            "{name} just died! They now have {to} deaths (was {from}). \
             Current stats: {} kills, {} assists, {} CS.",
            s.kills, s.assists, s.creep_score
        ),
        ChangeDetail::Assist { to, .. } => format!(
            "{name} got an assist! They now have {to} assists. Current KDA: {}/{}/{to}",
            s.kills, s.deaths
        ),
        ChangeDetail::ItemPurchase { current, added, .. } => format!(
            "{name} just purchased new items: {}! They now have: {}. Current gold: {:.0}",
            added.join(", "),
            current.join(", "),
            s.gold
        ),
        ChangeDetail::GoldMilestone { threshold, .. } => format!(
            "{name} reached {threshold:.0} gold! Current stats: {}/{}/{} KDA, {} CS.",
            s.kills, s.deaths, s.assists, s.creep_score
        ),
        ChangeDetail::CsMilestone { threshold, .. } => format!(
            "{name} reached {threshold} CS! Current gold: {:.0}",
            s.gold
        ),
        ChangeDetail::GameStatus { from, to } => {
            format!("Game status changed from '{from}' to '{to}'")
        }
    }
}

/// Main-player context appended to every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub player_name: String,
    pub champion: String,
    pub items: Vec<String>,
    pub enemy_champions: Vec<String>,
}

impl PromptContext {
    pub fn from_snapshot(snapshot: &MatchSnapshot) -> Self {
        Self {
            player_name: snapshot.main_player.name.clone(),
            champion: snapshot.main_player.champion.clone(),
            items: snapshot.main_player.items.clone(),
            enemy_champions: snapshot.enemies.iter().map(|e| e.champion.clone()).collect(),
        }
    }
}

/// Filter, render and frame `events` into a single generator prompt.
///
/// Returns `None` when nothing significant happened.
pub fn build_prompt(events: &[ChangeEvent], context: &PromptContext) -> Option<String> {
    let lines: Vec<String> = significant_events(events)
        .into_iter()
        .map(render_event)
        .collect();
    if lines.is_empty() {
        return None;
    }

    let items = if context.items.is_empty() {
        "none".to_string()
    } else {
        context.items.join(", ")
    };
    let enemies = if context.enemy_champions.is_empty() {
        "unknown".to_string()
    } else {
        context.enemy_champions.join(", ")
    };

    Some(format!(
        "{PREAMBLE}\n\n{}\n\n{INSTRUCTIONS}\n\n\
         Active Player's Username: {}\n\
         Active Player's Champion: {}\n\
         Current Items: {items}\n\
         Enemy Champions: {enemies}\n\n\
         {CLOSING}",
        lines.join("\n"),
        context.player_name,
        context.champion,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PlayerSnapshot, SYSTEM_SUBJECT};

    fn stats() -> StatLine {
        StatLine {
            champion: "Ahri".into(),
            kills: 3,
            deaths: 1,
            assists: 4,
            creep_score: 120,
            gold: 1432.7,
        }
    }

    fn event(detail: ChangeDetail, is_main_player: bool) -> ChangeEvent {
        ChangeEvent {
            subject: if is_main_player { "me" } else { "other" }.into(),
            is_main_player,
            stats: Some(stats()),
            detail,
        }
    }

    fn context() -> PromptContext {
        PromptContext {
            player_name: "me".into(),
            champion: "Ahri".into(),
            items: vec!["Boots".into()],
            enemy_champions: vec!["Zed".into(), "Lux".into()],
        }
    }

    #[test]
    fn significance_rules() {
        let kill = ChangeDetail::Kill { from: 2, to: 3 };
        let assist = ChangeDetail::Assist { from: 0, to: 1 };
        let cs = ChangeDetail::CsMilestone {
            previous_cs: 40,
            threshold: 50,
        };
        assert!(is_significant(&event(kill.clone(), true)));
        assert!(is_significant(&event(kill, false)));
        assert!(is_significant(&event(cs.clone(), true)));
        assert!(!is_significant(&event(cs, false)));
        assert!(!is_significant(&event(assist.clone(), true)));
        assert!(!is_significant(&event(assist, false)));

        let status = ChangeEvent {
            subject: SYSTEM_SUBJECT.into(),
            is_main_player: false,
            stats: None,
            detail: ChangeDetail::GameStatus {
                from: "loading".into(),
                to: "in_progress".into(),
            },
        };
        assert!(!is_significant(&status));
    }

    #[test]
    fn kill_template_carries_stats() {
        let line = render_event(&event(ChangeDetail::Kill { from: 2, to: 3 }, true));
        assert_eq!(
            line,
            "me just got a kill! They now have 3 kills (was 2). \
             Current stats: 1 deaths, 4 assists, 120 CS, 1433 gold."
        );
    }

    #[test]
    fn purchase_template_highlights_added_items() {
        let line = render_event(&event(
            ChangeDetail::ItemPurchase {
                previous: vec!["Boots".into()],
                current: vec!["Boots".into(), "Pickaxe".into()],
                added: vec!["Pickaxe".into()],
            },
            true,
        ));
        assert!(line.contains("purchased new items: Pickaxe!"));
        assert!(line.contains("They now have: Boots, Pickaxe."));
    }

    #[test]
    fn prompt_none_when_nothing_significant() {
        let events = vec![event(ChangeDetail::Assist { from: 0, to: 1 }, true)];
        assert!(build_prompt(&events, &context()).is_none());
        assert!(build_prompt(&[], &context()).is_none());
    }

    #[test]
    fn prompt_keeps_filtered_order_and_context() {
        let events = vec![
            event(ChangeDetail::Death { from: 0, to: 1 }, true),
            event(ChangeDetail::Assist { from: 0, to: 1 }, true),
            event(ChangeDetail::Kill { from: 4, to: 5 }, false),
        ];
        let prompt = build_prompt(&events, &context()).unwrap();
        let death = prompt.find("me just died!").unwrap();
        let kill = prompt.find("other just got a kill!").unwrap();
        assert!(death < kill);
        assert!(!prompt.contains("assist!"));
        assert!(prompt.starts_with(PREAMBLE));
        assert!(prompt.contains("Active Player's Champion: Ahri"));
        assert!(prompt.contains("Current Items: Boots"));
        assert!(prompt.contains("Enemy Champions: Zed, Lux"));
    }

    #[test]
    fn context_from_snapshot_uses_enemy_champions() {
        let p = |name: &str, champ: &str| PlayerSnapshot {
            name: name.into(),
            champion: champ.into(),
            kills: 0,
            deaths: 0,
            assists: 0,
            creep_score: 0,
            gold: 0.0,
            items: vec![],
        };
        let snap = MatchSnapshot {
            status: "in_progress".into(),
            main_player: p("me", "Ahri"),
            allies: vec![p("a", "Leona")],
            enemies: vec![p("b", "Zed"), p("c", "Lux")],
        };
        let ctx = PromptContext::from_snapshot(&snap);
        assert_eq!(ctx.champion, "Ahri");
        assert_eq!(ctx.enemy_champions, vec!["Zed", "Lux"]);
    }
}
