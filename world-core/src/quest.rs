//! Quest checkpoint progress.
//!
//! Checkpoints are completed strictly in authoring order: the only
//! checkpoint ever evaluated is the one [`next_checkpoint`] returns.

use crate::world::{Checkpoint, CheckpointId, Quest};
use serde::{Deserialize, Serialize};

/// Progress of one player through one quest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestProgress {
    /// Completed checkpoint ids, in completion order, without duplicates.
    #[serde(default)]
    pub checkpoints_completed: Vec<CheckpointId>,
    /// The checkpoint the player is working on, if any.
    #[serde(default)]
    pub current_checkpoint: Option<CheckpointId>,
}

impl QuestProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_completed(&self, id: &CheckpointId) -> bool {
        self.checkpoints_completed.contains(id)
    }

    pub fn completed_count(&self) -> usize {
        self.checkpoints_completed.len()
    }
}

/// First checkpoint, in quest order, that has not been completed.
pub fn next_checkpoint<'q>(quest: &'q Quest, progress: &QuestProgress) -> Option<&'q Checkpoint> {
    quest
        .checkpoints
        .iter()
        .find(|c| !progress.is_completed(&c.id))
}

/// Mark a checkpoint complete. Completing it again changes nothing.
///
/// Returns whether the checkpoint was newly completed.
pub fn update_progress(quest: &Quest, progress: &mut QuestProgress, checkpoint: &CheckpointId) -> bool {
    let newly = !progress.is_completed(checkpoint);
    if newly {
        progress.checkpoints_completed.push(checkpoint.clone());
    }
    progress.current_checkpoint = next_checkpoint(quest, progress).map(|c| c.id.clone());
    newly
}

/// Whether every checkpoint of the quest is done.
pub fn is_complete(quest: &Quest, progress: &QuestProgress) -> bool {
    progress.completed_count() >= quest.checkpoints.len()
}

/// Fraction of checkpoints completed, in [0, 1].
pub fn completion_ratio(quest: &Quest, progress: &QuestProgress) -> f32 {
    if quest.checkpoints.is_empty() {
        return 1.0;
    }
    let done = quest
        .checkpoints
        .iter()
        .filter(|c| progress.is_completed(&c.id))
        .count();
    done as f32 / quest.checkpoints.len() as f32
}
