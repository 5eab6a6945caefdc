//! Checkpoint completion rules.
//!
//! A checkpoint with a grid id completes only when, for the current action,
//! all of these hold, checked in this order:
//!
//! 1. the player stands in the checkpoint's grid
//! 2. the action type is compatible with the required action
//! 3. the target NPC, if any, is among the action's targets
//! 4. the ability requirement, if any, passed (partial success counts)
//!
//! The first failing condition decides the reason reported back.
//!
//! Checkpoints without a grid id predate grid-based quests. They go through
//! a description-keyword heuristic that is kept only so old quests stay
//! playable; author new checkpoints with a grid id.

use crate::action::{ActionAnalysis, ActionType};
use crate::dice::AbilityCheck;
use crate::quest::next_checkpoint;
use crate::quest::QuestProgress;
use crate::text::{core_name, Normalized};
use crate::world::{Checkpoint, CheckpointAction, CheckpointId, GridId, Quest};
use serde::{Deserialize, Serialize};

/// Reason given when the player is in the wrong grid.
pub const WRONG_LOCATION_REASON: &str =
    "You need to go to the specified location to complete this objective";

/// Everything the detector looks at for one action.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointContext<'a> {
    pub current_grid: Option<&'a GridId>,
    pub current_grid_name: Option<&'a str>,
    pub current_location_name: Option<&'a str>,
    pub analysis: &'a ActionAnalysis,
    pub check: Option<&'a AbilityCheck>,
}

/// Outcome of evaluating one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub checkpoint_id: CheckpointId,
    pub completed: bool,
    pub reason: String,
}

impl Detection {
    fn completed(checkpoint: &Checkpoint) -> Self {
        Self {
            checkpoint_id: checkpoint.id.clone(),
            completed: true,
            reason: checkpoint.description.clone(),
        }
    }

    fn blocked(checkpoint: &Checkpoint, reason: impl Into<String>) -> Self {
        Self {
            checkpoint_id: checkpoint.id.clone(),
            completed: false,
            reason: reason.into(),
        }
    }
}

/// Whether an action type satisfies a checkpoint's action requirement.
pub fn action_satisfies(required: CheckpointAction, actual: ActionType) -> bool {
    match required {
        CheckpointAction::Dialogue => actual == ActionType::Dialogue,
        CheckpointAction::Investigation => matches!(
            actual,
            ActionType::Dialogue | ActionType::Investigate | ActionType::Other
        ),
        CheckpointAction::Exploration => true,
        CheckpointAction::Combat => actual == ActionType::Combat,
    }
}

/// Evaluate the quest's next checkpoint. `None` when the quest is done.
pub fn evaluate_next(
    quest: &Quest,
    progress: &QuestProgress,
    ctx: &CheckpointContext<'_>,
) -> Option<Detection> {
    next_checkpoint(quest, progress).map(|checkpoint| evaluate(checkpoint, ctx))
}

/// Evaluate one checkpoint against the current action.
pub fn evaluate(checkpoint: &Checkpoint, ctx: &CheckpointContext<'_>) -> Detection {
    let Some(required_grid) = &checkpoint.grid_id else {
        return evaluate_legacy(checkpoint, ctx);
    };

    if ctx.current_grid != Some(required_grid) {
        return Detection::blocked(checkpoint, WRONG_LOCATION_REASON);
    }

    if !action_satisfies(checkpoint.action, ctx.analysis.action_type) {
        return Detection::blocked(
            checkpoint,
            format!(
                "This objective requires a {} action, not {}",
                checkpoint.action.name(),
                ctx.analysis.action_type
            ),
        );
    }

    if let Some(npc) = &checkpoint.target_npc {
        if !ctx.analysis.mentions_npc(npc) {
            return Detection::blocked(checkpoint, format!("You need to interact with {}", npc.name));
        }
    }

    if let Some(requirement) = &checkpoint.requirement {
        match ctx.check.filter(|c| c.ability == requirement.ability) {
            None => {
                return Detection::blocked(
                    checkpoint,
                    format!(
                        "This objective requires a {} check (DC {})",
                        requirement.ability, requirement.dc
                    ),
                );
            }
            Some(check) if !check.success => {
                return Detection::blocked(
                    checkpoint,
                    format!(
                        "Your {} check failed ({} vs DC {})",
                        requirement.ability, check.total, check.dc
                    ),
                );
            }
            Some(_) => {}
        }
    }

    tracing::info!(checkpoint = %checkpoint.id, "checkpoint completed");
    Detection::completed(checkpoint)
}

// ============================================================================
// Legacy checkpoints
// ============================================================================

const LEGACY_DIALOGUE: &[&str] = &["talk", "speak", "ask", "convince", "对话", "交谈", "询问"];
const LEGACY_COMBAT: &[&str] = &["defeat", "fight", "kill", "battle", "战斗", "击败", "消灭"];
const LEGACY_INVESTIGATE: &[&str] = &["investigate", "search", "examine", "find", "调查", "搜索", "寻找"];
const LEGACY_TRAVEL: &[&str] = &["go to", "travel to", "reach", "arrive", "visit", "前往", "到达", "抵达"];

/// Deprecated: guesses the requirement from the description text. New
/// checkpoints should set a grid id.
fn evaluate_legacy(checkpoint: &Checkpoint, ctx: &CheckpointContext<'_>) -> Detection {
    tracing::debug!(checkpoint = %checkpoint.id, "evaluating legacy checkpoint without grid id");
    let description = Normalized::new(&checkpoint.description);
    let action = ctx.analysis.action_type;

    if description.contains_any(LEGACY_DIALOGUE) {
        let named = ctx
            .analysis
            .npc_targets()
            .any(|t| description.contains_keyword(&t.name));
        return if action == ActionType::Dialogue && named {
            Detection::completed(checkpoint)
        } else {
            Detection::blocked(checkpoint, "Talk to the person this objective names")
        };
    }

    if description.contains_any(LEGACY_COMBAT) {
        return if action == ActionType::Combat {
            Detection::completed(checkpoint)
        } else {
            Detection::blocked(checkpoint, "This objective requires a fight")
        };
    }

    if description.contains_any(LEGACY_INVESTIGATE) {
        return if matches!(action, ActionType::Investigate | ActionType::Other) {
            Detection::completed(checkpoint)
        } else {
            Detection::blocked(checkpoint, "Search the area more closely")
        };
    }

    if description.contains_any(LEGACY_TRAVEL) {
        let here = [ctx.current_grid_name, ctx.current_location_name]
            .into_iter()
            .flatten()
            .any(|name| description.contains_keyword(name) || description.contains_keyword(&core_name(name)));
        return if here {
            Detection::completed(checkpoint)
        } else {
            Detection::blocked(checkpoint, WRONG_LOCATION_REASON)
        };
    }

    Detection::blocked(checkpoint, "Nothing you did moved this objective forward")
}
