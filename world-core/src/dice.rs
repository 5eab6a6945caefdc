//! Ability checks on a d20.
//!
//! A check rolls 1d20, adds `score - 5` and compares the total against a
//! difficulty class. Natural 20 and natural 1 override the total.

use crate::world::{Ability, ABILITY_MAX, ABILITY_MIN};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

/// Score treated as the average, contributing no modifier.
pub const BASELINE_SCORE: i32 = 5;

/// Margin above the DC needed for a full success.
pub const FULL_SUCCESS_MARGIN: i32 = 5;

/// Error type for ability checks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Ability score {score} for {ability} is outside [1, 10]")]
    ScoreOutOfRange { ability: Ability, score: i32 },
    #[error("Roll {0} is not a d20 result")]
    InvalidRoll(u8),
}

/// How well a check went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessLevel {
    Critical,
    Success,
    Partial,
    Failure,
}

impl SuccessLevel {
    pub fn is_success(&self) -> bool {
        !matches!(self, SuccessLevel::Failure)
    }
}

impl fmt::Display for SuccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SuccessLevel::Critical => "critical",
            SuccessLevel::Success => "success",
            SuccessLevel::Partial => "partial",
            SuccessLevel::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one ability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityCheck {
    pub ability: Ability,
    pub roll: u8,
    pub modifier: i32,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub level: SuccessLevel,
}

impl fmt::Display for AbilityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} check: [{}] {:+} = {} vs DC {} ({})",
            self.ability, self.roll, self.modifier, self.total, self.dc, self.level
        )
    }
}

/// Resolve a check from a known d20 result.
///
/// Pure: the same (roll, score, dc) always yields the same check.
pub fn resolve_check(
    ability: Ability,
    score: i32,
    dc: i32,
    roll: u8,
) -> Result<AbilityCheck, DiceError> {
    if !(ABILITY_MIN..=ABILITY_MAX).contains(&score) {
        return Err(DiceError::ScoreOutOfRange { ability, score });
    }
    if !(1..=20).contains(&roll) {
        return Err(DiceError::InvalidRoll(roll));
    }

    let modifier = score - BASELINE_SCORE;
    let total = roll as i32 + modifier;

    let level = if roll == 20 {
        SuccessLevel::Critical
    } else if roll == 1 {
        SuccessLevel::Failure
    } else if total >= dc.saturating_add(FULL_SUCCESS_MARGIN) {
        SuccessLevel::Success
    } else if total >= dc {
        SuccessLevel::Partial
    } else {
        SuccessLevel::Failure
    };

    Ok(AbilityCheck {
        ability,
        roll,
        modifier,
        total,
        dc,
        success: level.is_success(),
        level,
    })
}

/// Roll a check using the given roller.
pub fn roll_ability_check(
    ability: Ability,
    score: i32,
    dc: i32,
    roller: &dyn DiceRoller,
) -> Result<AbilityCheck, DiceError> {
    resolve_check(ability, score, dc, roller.roll_d20())
}

/// Source of d20 results.
pub trait DiceRoller: Send + Sync {
    /// A value in [1, 20].
    fn roll_d20(&self) -> u8;
}

/// Rolls with the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRoller;

impl DiceRoller for ThreadRoller {
    fn roll_d20(&self) -> u8 {
        rand::thread_rng().gen_range(1..=20)
    }
}

/// Reproducible rolls from a seed.
#[derive(Debug)]
pub struct SeededRoller {
    rng: Mutex<StdRng>,
}

impl SeededRoller {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl DiceRoller for SeededRoller {
    fn roll_d20(&self) -> u8 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(1..=20)
    }
}

/// Returns queued rolls in order, then repeats the last one.
#[derive(Debug)]
pub struct ScriptedRolls {
    rolls: Mutex<VecDeque<u8>>,
    last: Mutex<u8>,
}

impl ScriptedRolls {
    pub fn new(rolls: impl IntoIterator<Item = u8>) -> Self {
        let rolls: VecDeque<u8> = rolls.into_iter().map(|r| r.clamp(1, 20)).collect();
        let last = rolls.back().copied().unwrap_or(10);
        Self {
            rolls: Mutex::new(rolls),
            last: Mutex::new(last),
        }
    }

    /// Always roll the same value.
    pub fn always(roll: u8) -> Self {
        Self::new([roll])
    }
}

impl DiceRoller for ScriptedRolls {
    fn roll_d20(&self) -> u8 {
        let mut rolls = self.rolls.lock().unwrap_or_else(|e| e.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(next) = rolls.pop_front() {
            *last = next;
        }
        *last
    }
}
