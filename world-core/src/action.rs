//! Free-text action classification.
//!
//! Player input is classified by the first matching rule of an ordered
//! table, so when text fits several categories the earlier rule wins:
//! dialogue > explore > combat > investigate > other. "Talk the guard out
//! of attacking" is dialogue, not combat.

use crate::text::Normalized;
use crate::world::{Grid, Location, NpcTarget};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classified kind of a player action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Dialogue,
    Explore,
    Combat,
    Investigate,
    Other,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionType::Dialogue => "dialogue",
            ActionType::Explore => "explore",
            ActionType::Combat => "combat",
            ActionType::Investigate => "investigate",
            ActionType::Other => "other",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Npc,
    Location,
}

/// Something the action refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTarget {
    pub kind: TargetKind,
    pub id: String,
    pub name: String,
}

/// Result of analyzing one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionAnalysis {
    pub action_type: ActionType,
    pub targets: Vec<ActionTarget>,
}

impl ActionAnalysis {
    pub fn npc_targets(&self) -> impl Iterator<Item = &ActionTarget> {
        self.targets.iter().filter(|t| t.kind == TargetKind::Npc)
    }

    /// Whether an NPC target matches by id or by display name.
    ///
    /// Display names are not unique, so two NPCs sharing a name both match.
    pub fn mentions_npc(&self, npc: &NpcTarget) -> bool {
        self.npc_targets()
            .any(|t| t.id == npc.id.as_str() || t.name.eq_ignore_ascii_case(&npc.name))
    }
}

struct ActionRule {
    action_type: ActionType,
    keywords: &'static [&'static str],
}

lazy_static::lazy_static! {
    /// Classification rules in priority order.
    static ref ACTION_RULES: Vec<ActionRule> = vec![
        ActionRule {
            action_type: ActionType::Dialogue,
            keywords: &[
                "talk", "speak", "ask", "tell", "say", "greet", "chat", "persuade",
                "convince", "negotiate", "bargain", "question", "reply",
                "对话", "交谈", "询问", "说服", "打招呼", "聊",
            ],
        },
        ActionRule {
            action_type: ActionType::Explore,
            keywords: &[
                "go", "walk", "move", "explore", "enter", "head", "travel", "climb",
                "leave", "exit", "wander", "look around", "run to", "proceed",
                "前往", "探索", "进入", "离开", "走", "去",
            ],
        },
        ActionRule {
            action_type: ActionType::Combat,
            keywords: &[
                "attack", "fight", "strike", "kill", "stab", "shoot", "hit", "slash",
                "punch", "battle", "ambush", "duel",
                "攻击", "战斗", "打", "杀", "砍",
            ],
        },
        ActionRule {
            action_type: ActionType::Investigate,
            keywords: &[
                "search", "investigate", "examine", "inspect", "study", "look at",
                "read", "check", "observe", "analyze", "decipher",
                "调查", "搜索", "检查", "观察", "研究",
            ],
        },
    ];
}

/// Classify text by the first matching rule; `Other` when none match.
pub fn classify_action(text: &str) -> ActionType {
    let normalized = Normalized::new(text);
    ACTION_RULES
        .iter()
        .find(|rule| normalized.contains_any(rule.keywords))
        .map(|rule| rule.action_type)
        .unwrap_or(ActionType::Other)
}

/// Classifies actions and extracts their targets from the current scene.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionAnalyzer;

impl ActionAnalyzer {
    /// Classify `text` and collect the NPCs of `grid` and the `location`
    /// it names. Names match as whole words, without fuzziness.
    pub fn analyze(text: &str, grid: Option<&Grid>, location: Option<&Location>) -> ActionAnalysis {
        let action_type = classify_action(text);
        let normalized = Normalized::new(text);
        let mut targets = Vec::new();

        if let Some(grid) = grid {
            for npc in &grid.npcs {
                if normalized.contains_keyword(&npc.name) {
                    targets.push(ActionTarget {
                        kind: TargetKind::Npc,
                        id: npc.npc_id.to_string(),
                        name: npc.name.clone(),
                    });
                }
            }
        }

        if let Some(location) = location {
            if normalized.contains_keyword(&location.name) {
                targets.push(ActionTarget {
                    kind: TargetKind::Location,
                    id: location.id.to_string(),
                    name: location.name.clone(),
                });
            }
        }

        tracing::debug!(%action_type, targets = targets.len(), "classified action");
        ActionAnalysis {
            action_type,
            targets,
        }
    }
}
