//! Turn mechanics and narrator context.
//!
//! The engine decides whether an action needs an ability check, rolls it,
//! and assembles the read-only [`WorldContext`] handed to the narrator.

use crate::dice::{resolve_check, roll_ability_check, AbilityCheck, DiceError, DiceRoller, SuccessLevel};
use crate::quest::{completion_ratio, is_complete, next_checkpoint};
use crate::store::WorldSnapshot;
use crate::text::Normalized;
use crate::world::{
    Ability, Character, Checkpoint, GridId, InteractiveObject, Meters, PlayerWorldProgress, Quest,
    Run,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Difficulty table
// ============================================================================

struct CheckTrigger {
    ability: Ability,
    dc: i32,
    keywords: &'static [&'static str],
}

lazy_static::lazy_static! {
    /// Actions that call for a check, in priority order.
    static ref CHECK_TRIGGERS: Vec<CheckTrigger> = vec![
        CheckTrigger {
            ability: Ability::Combat,
            dc: 12,
            keywords: &[
                "attack", "fight", "strike", "stab", "slash", "shoot", "punch", "kill",
                "ambush", "wrestle", "duel", "攻击", "战斗", "砍", "刺",
            ],
        },
        CheckTrigger {
            ability: Ability::Social,
            dc: 13,
            keywords: &[
                "persuade", "convince", "intimidate", "deceive", "bribe", "negotiate",
                "lie", "bluff", "charm", "说服", "威胁", "欺骗", "贿赂", "谈判",
            ],
        },
        CheckTrigger {
            ability: Ability::Stealth,
            dc: 14,
            keywords: &[
                "sneak", "hide", "steal", "pickpocket", "lockpick", "tiptoe", "slip past",
                "潜行", "躲藏", "偷", "撬锁",
            ],
        },
        CheckTrigger {
            ability: Ability::Knowledge,
            dc: 11,
            keywords: &[
                "decipher", "recall", "identify", "analyze", "translate", "study",
                "解读", "辨认", "分析", "翻译", "研究",
            ],
        },
    ];
}

/// The check an action calls for, if any.
pub fn required_check(action_text: &str) -> Option<(Ability, i32)> {
    let text = Normalized::new(action_text);
    CHECK_TRIGGERS
        .iter()
        .find(|t| text.contains_any(t.keywords))
        .map(|t| (t.ability, t.dc))
}

/// Narrator guidance for an outcome.
pub fn narrative_hint(check: Option<&AbilityCheck>) -> String {
    match check {
        None => "The action proceeds without resistance.".to_string(),
        Some(c) => match c.level {
            SuccessLevel::Critical => format!(
                "A flawless {} effort. The outcome exceeds every expectation.",
                c.ability
            ),
            SuccessLevel::Success => format!("The {} attempt succeeds cleanly.", c.ability),
            SuccessLevel::Partial => format!(
                "The {} attempt succeeds, but with a cost or complication.",
                c.ability
            ),
            SuccessLevel::Failure => format!(
                "The {} attempt fails and the situation turns against the character.",
                c.ability
            ),
        },
    }
}

/// Mechanical result of one action. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub requires_check: bool,
    pub check_kind: Option<Ability>,
    pub dc: Option<i32>,
    pub check: Option<AbilityCheck>,
    /// Uncontested actions always succeed.
    pub success: bool,
    pub narrative_hint: String,
}

// ============================================================================
// Narrator context
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub name: String,
    pub description: String,
    pub danger_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSummary {
    pub direction: String,
    pub name: String,
}

/// An NPC in the player's grid, merged with the world-level record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcContext {
    pub name: String,
    pub description: String,
    pub activity: Option<String>,
    pub position: Option<String>,
    pub reputation: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridContext {
    pub name: String,
    pub description: String,
    pub atmosphere: String,
    pub exits: Vec<ExitSummary>,
    pub objects: Vec<InteractiveObject>,
    pub npcs: Vec<NpcContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestContext {
    pub name: String,
    pub description: String,
    pub next_checkpoint: Option<String>,
    pub completed: usize,
    pub total: usize,
    pub completion_ratio: f32,
}

/// Everything the narrator may know for one turn.
///
/// Objects and NPCs come from the player's current grid only, and only
/// discovered locations are listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldContext {
    pub world_name: String,
    pub lore: String,
    pub meters: Meters,
    pub mission: String,
    pub turn: u32,
    pub character_name: String,
    pub location: Option<LocationSummary>,
    pub grid: Option<GridContext>,
    pub quest: Option<QuestContext>,
    pub discovered_locations: Vec<String>,
    pub recent_events: Vec<String>,
}

/// Number of history entries surfaced to the narrator.
const RECENT_EVENTS: usize = 5;

// ============================================================================
// Engine
// ============================================================================

/// Resolves actions with an injected dice roller.
#[derive(Clone)]
pub struct GameEngine {
    roller: Arc<dyn DiceRoller>,
}

impl std::fmt::Debug for GameEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameEngine").finish_non_exhaustive()
    }
}

impl GameEngine {
    pub fn new(roller: Arc<dyn DiceRoller>) -> Self {
        Self { roller }
    }

    /// Decide whether the action needs a check and roll it if so.
    pub fn process_player_action(
        &self,
        character: &Character,
        action_text: &str,
    ) -> Result<ActionResult, DiceError> {
        let Some((ability, dc)) = required_check(action_text) else {
            return Ok(ActionResult {
                requires_check: false,
                check_kind: None,
                dc: None,
                check: None,
                success: true,
                narrative_hint: narrative_hint(None),
            });
        };

        let check = roll_ability_check(ability, character.score(ability), dc, self.roller.as_ref())?;
        tracing::debug!(%check, "ability check");
        Ok(ActionResult {
            requires_check: true,
            check_kind: Some(ability),
            dc: Some(dc),
            success: check.success,
            narrative_hint: narrative_hint(Some(&check)),
            check: Some(check),
        })
    }

    /// The check to judge a checkpoint's ability requirement with.
    ///
    /// Reuses the action's own roll when it was for the required ability,
    /// re-judged against the checkpoint's DC. Otherwise rolls the required
    /// ability, but only when the player stands on the checkpoint's grid.
    pub fn checkpoint_check(
        &self,
        character: &Character,
        checkpoint: &Checkpoint,
        current_grid: Option<&GridId>,
        action_check: Option<&AbilityCheck>,
    ) -> Result<Option<AbilityCheck>, DiceError> {
        let Some(requirement) = checkpoint.requirement else {
            return Ok(action_check.copied());
        };
        if let Some(grid) = &checkpoint.grid_id {
            if current_grid != Some(grid) {
                return Ok(action_check.copied());
            }
        }

        let score = character.score(requirement.ability);
        let check = match action_check.filter(|c| c.ability == requirement.ability) {
            Some(existing) => resolve_check(requirement.ability, score, requirement.dc, existing.roll)?,
            None => roll_ability_check(requirement.ability, score, requirement.dc, self.roller.as_ref())?,
        };
        tracing::debug!(checkpoint = %checkpoint.id, %check, "checkpoint check");
        Ok(Some(check))
    }

    /// Assemble the narrator context for the player's current position.
    pub fn world_context(
        &self,
        snapshot: &WorldSnapshot,
        progress: &PlayerWorldProgress,
        run: &Run,
        character: &Character,
    ) -> WorldContext {
        let grid = progress
            .current_grid
            .as_ref()
            .and_then(|id| snapshot.grid(id));

        let location = progress
            .current_location
            .as_ref()
            .and_then(|id| snapshot.location(id))
            .map(|l| LocationSummary {
                name: l.name.clone(),
                description: l.description.clone(),
                danger_level: l.danger_level,
            });

        let grid = grid.map(|g| GridContext {
            name: g.name.clone(),
            description: g.description.clone(),
            atmosphere: g.atmosphere.clone(),
            exits: g
                .connections
                .iter()
                .filter(|c| snapshot.grids.contains(&c.target_grid_id))
                .map(|c| ExitSummary {
                    direction: c.direction.clone(),
                    name: if c.target_name.is_empty() {
                        snapshot
                            .grid(&c.target_grid_id)
                            .map(|t| t.name.clone())
                            .unwrap_or_default()
                    } else {
                        c.target_name.clone()
                    },
                })
                .collect(),
            objects: g.objects.clone(),
            npcs: g
                .npcs
                .iter()
                .map(|n| {
                    let record = snapshot.npc(&n.npc_id);
                    NpcContext {
                        name: n.name.clone(),
                        description: record.map(|r| r.description.clone()).unwrap_or_default(),
                        activity: n.activity.clone(),
                        position: n.position.clone(),
                        reputation: progress.reputation_with(&n.npc_id),
                    }
                })
                .collect(),
        });

        let quest = active_quest(snapshot, progress, run).map(|q| {
            let quest_progress = progress.quest(&q.id).cloned().unwrap_or_default();
            QuestContext {
                name: q.name.clone(),
                description: q.description.clone(),
                next_checkpoint: next_checkpoint(q, &quest_progress).map(|c| c.description.clone()),
                completed: quest_progress.completed_count(),
                total: q.checkpoints.len(),
                completion_ratio: completion_ratio(q, &quest_progress),
            }
        });

        let discovered_locations = progress
            .discovered_locations
            .iter()
            .filter_map(|id| snapshot.location(id))
            .map(|l| l.name.clone())
            .collect();

        let recent_events = progress
            .history
            .iter()
            .rev()
            .take(RECENT_EVENTS)
            .rev()
            .map(|r| r.detail.clone())
            .collect();

        WorldContext {
            world_name: snapshot.world.name.clone(),
            lore: snapshot.world.lore.clone(),
            meters: snapshot.world.meters,
            mission: run.mission.clone(),
            turn: run.turn,
            character_name: character.name.clone(),
            location,
            grid,
            quest,
            discovered_locations,
            recent_events,
        }
    }
}

/// The quest a run follows: its own, else the first unfinished one.
pub fn active_quest<'s>(
    snapshot: &'s WorldSnapshot,
    progress: &PlayerWorldProgress,
    run: &Run,
) -> Option<&'s Quest> {
    if let Some(id) = &run.quest_id {
        return snapshot.quest(id);
    }
    snapshot.quests.iter().find(|q| {
        progress
            .quest(&q.id)
            .map(|p| !is_complete(q, p))
            .unwrap_or(true)
    })
}
