//! World-state bookkeeping: visits, NPC interactions, reputation and meters.

use crate::action::{ActionAnalysis, ActionType};
use crate::dice::{AbilityCheck, SuccessLevel};
use crate::movement::MovementOutcome;
use crate::world::{Ability, Checkpoint, LocationId, Meter, NpcId, PlayerWorldProgress, World};
use serde::{Deserialize, Serialize};

/// Default number of interaction records kept per player and world.
pub const HISTORY_LIMIT: usize = 50;

/// Reputation bounds.
pub const REPUTATION_MIN: i32 = -100;
pub const REPUTATION_MAX: i32 = 100;

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Visit,
    Dialogue,
    Combat,
    Interaction,
    Checkpoint,
}

/// One entry of the interaction history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub turn: u32,
    pub kind: InteractionKind,
    /// Id of the grid, NPC or checkpoint involved.
    pub subject: String,
    pub detail: String,
}

/// Changes the tracker applied for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerReport {
    /// Location that became discovered this turn.
    pub discovered_location: Option<LocationId>,
    pub reputation_changes: Vec<(NpcId, i32)>,
    pub meters_changed: bool,
}

/// Applies per-turn deltas to progress and world meters.
#[derive(Debug, Clone, Copy)]
pub struct WorldStateTracker {
    history_limit: usize,
}

impl Default for WorldStateTracker {
    fn default() -> Self {
        Self {
            history_limit: HISTORY_LIMIT,
        }
    }
}

impl WorldStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    /// Record an arrival. Entering a location for the first time raises
    /// the world's mystery.
    pub fn record_visit(
        &self,
        progress: &mut PlayerWorldProgress,
        world: &mut World,
        outcome: &MovementOutcome,
        turn: u32,
        report: &mut TrackerReport,
    ) {
        self.push(
            progress,
            InteractionRecord {
                turn,
                kind: InteractionKind::Visit,
                subject: outcome.grid_id.to_string(),
                detail: outcome.grid_name.clone(),
            },
        );

        if let Some(location) = &outcome.new_location {
            world.meters.adjust(Meter::Mystery, 1);
            report.discovered_location = Some(location.clone());
            report.meters_changed = true;
        }
    }

    /// Record the NPCs an action touched and shift their reputation.
    ///
    /// Combat also raises the world's danger, with or without a target.
    pub fn record_action(
        &self,
        progress: &mut PlayerWorldProgress,
        world: &mut World,
        analysis: &ActionAnalysis,
        check: Option<&AbilityCheck>,
        turn: u32,
        report: &mut TrackerReport,
    ) {
        if analysis.action_type == ActionType::Combat {
            world.meters.adjust(Meter::Danger, 2);
            report.meters_changed = true;
        }

        let delta = reputation_delta(analysis.action_type, check);
        let kind = match analysis.action_type {
            ActionType::Dialogue => InteractionKind::Dialogue,
            ActionType::Combat => InteractionKind::Combat,
            _ => InteractionKind::Interaction,
        };

        for target in analysis.npc_targets() {
            let npc_id = NpcId::from(target.id.as_str());
            progress.visited_npcs.insert(npc_id.clone());

            if delta != 0 {
                let current = progress.reputation_with(&npc_id);
                let updated = (current + delta).clamp(REPUTATION_MIN, REPUTATION_MAX);
                progress.reputation.insert(npc_id.clone(), updated);
                if updated != current {
                    report.reputation_changes.push((npc_id.clone(), updated - current));
                }
            }

            self.push(
                progress,
                InteractionRecord {
                    turn,
                    kind,
                    subject: npc_id.to_string(),
                    detail: target.name.clone(),
                },
            );
        }
    }

    /// Record a completed checkpoint. Progress steadies the world.
    pub fn record_checkpoint(
        &self,
        progress: &mut PlayerWorldProgress,
        world: &mut World,
        checkpoint: &Checkpoint,
        turn: u32,
        report: &mut TrackerReport,
    ) {
        world.meters.adjust(Meter::Stability, 3);
        report.meters_changed = true;
        self.push(
            progress,
            InteractionRecord {
                turn,
                kind: InteractionKind::Checkpoint,
                subject: checkpoint.id.to_string(),
                detail: checkpoint.description.clone(),
            },
        );
    }

    fn push(&self, progress: &mut PlayerWorldProgress, record: InteractionRecord) {
        progress.history.push(record);
        if progress.history.len() > self.history_limit {
            let excess = progress.history.len() - self.history_limit;
            progress.history.drain(..excess);
        }
    }
}

fn reputation_delta(action_type: ActionType, check: Option<&AbilityCheck>) -> i32 {
    match action_type {
        ActionType::Dialogue => match check.filter(|c| c.ability == Ability::Social) {
            Some(c) if c.level == SuccessLevel::Critical => 2,
            Some(c) if !c.success => -1,
            _ => 1,
        },
        ActionType::Combat => -2,
        _ => 0,
    }
}
