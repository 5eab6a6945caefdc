//! World-adventure data model.
//!
//! Contains the records the engine works with: worlds, locations, grids,
//! NPCs, characters, runs, quests and per-player progress.

use crate::quest::QuestProgress;
use crate::tracker::InteractionRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of the account that owns characters and progress.
    UserId
);
string_id!(
    /// Unique identifier for worlds.
    WorldId
);
string_id!(
    /// Unique identifier for locations.
    LocationId
);
string_id!(
    /// Unique identifier for grids (the smallest explorable cell).
    GridId
);
string_id!(
    /// Unique identifier for NPCs.
    NpcId
);
string_id!(
    /// Unique identifier for player characters.
    CharacterId
);
string_id!(
    /// Unique identifier for runs (one playthrough).
    RunId
);
string_id!(QuestId);
string_id!(CheckpointId);

// ============================================================================
// Worlds and Locations
// ============================================================================

/// Upper bound of every world meter.
pub const METER_MAX: u8 = 100;

/// One of the three world meters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Meter {
    Stability,
    Danger,
    Mystery,
}

/// The 0-100 meters describing a world's mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meters {
    pub stability: u8,
    pub danger: u8,
    pub mystery: u8,
}

impl Meters {
    pub fn new(stability: u8, danger: u8, mystery: u8) -> Self {
        Self {
            stability: stability.min(METER_MAX),
            danger: danger.min(METER_MAX),
            mystery: mystery.min(METER_MAX),
        }
    }

    pub fn get(&self, meter: Meter) -> u8 {
        match meter {
            Meter::Stability => self.stability,
            Meter::Danger => self.danger,
            Meter::Mystery => self.mystery,
        }
    }

    /// Shift a meter by `delta`, clamped to 0..=100.
    pub fn adjust(&mut self, meter: Meter, delta: i32) {
        let slot = match meter {
            Meter::Stability => &mut self.stability,
            Meter::Danger => &mut self.danger,
            Meter::Mystery => &mut self.mystery,
        };
        *slot = (*slot as i32 + delta).clamp(0, METER_MAX as i32) as u8;
    }
}

impl Default for Meters {
    fn default() -> Self {
        Self::new(50, 30, 50)
    }
}

/// A generated world. Worlds are archived, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    pub id: WorldId,
    pub name: String,
    pub lore: String,
    pub meters: Meters,
    #[serde(default)]
    pub archived: bool,
}

impl World {
    pub fn new(name: impl Into<String>, lore: impl Into<String>) -> Self {
        Self {
            id: WorldId::new(),
            name: name.into(),
            lore: lore.into(),
            meters: Meters::default(),
            archived: false,
        }
    }

    pub fn with_meters(mut self, meters: Meters) -> Self {
        self.meters = meters;
        self
    }
}

/// A named area of a world, made of grids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub world_id: WorldId,
    pub name: String,
    pub description: String,
    pub danger_level: u8,
    #[serde(default)]
    pub discovered: bool,
}

impl Location {
    pub fn new(world_id: WorldId, name: impl Into<String>) -> Self {
        Self {
            id: LocationId::new(),
            world_id,
            name: name.into(),
            description: String::new(),
            danger_level: 1,
            discovered: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_danger_level(mut self, level: u8) -> Self {
        self.danger_level = level;
        self
    }
}

// ============================================================================
// Grids
// ============================================================================

/// A directed edge from one grid to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub direction: String,
    pub target_grid_id: GridId,
    #[serde(default)]
    pub target_name: String,
}

impl Connection {
    pub fn new(
        direction: impl Into<String>,
        target_grid_id: GridId,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            direction: direction.into(),
            target_grid_id,
            target_name: target_name.into(),
        }
    }
}

/// Something in a grid the player can interact with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveObject {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// An NPC present in a grid, with what they are doing there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridNpc {
    pub npc_id: NpcId,
    pub name: String,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
}

/// The smallest explorable cell of a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub id: GridId,
    pub location_id: LocationId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub first_visit_description: Option<String>,
    #[serde(default)]
    pub atmosphere: String,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub objects: Vec<InteractiveObject>,
    #[serde(default)]
    pub npcs: Vec<GridNpc>,
}

impl Grid {
    pub fn new(location_id: LocationId, name: impl Into<String>) -> Self {
        Self {
            id: GridId::new(),
            location_id,
            name: name.into(),
            description: String::new(),
            first_visit_description: None,
            atmosphere: String::new(),
            connections: Vec::new(),
            objects: Vec::new(),
            npcs: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<GridId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_first_visit(mut self, description: impl Into<String>) -> Self {
        self.first_visit_description = Some(description.into());
        self
    }

    pub fn with_atmosphere(mut self, atmosphere: impl Into<String>) -> Self {
        self.atmosphere = atmosphere.into();
        self
    }

    pub fn connect(mut self, connection: Connection) -> Self {
        self.connections.push(connection);
        self
    }

    pub fn with_object(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.objects.push(InteractiveObject {
            name: name.into(),
            description: description.into(),
        });
        self
    }

    pub fn with_npc(mut self, npc: GridNpc) -> Self {
        self.npcs.push(npc);
        self
    }

    /// Description shown on arrival.
    pub fn arrival_description(&self, first_visit: bool) -> &str {
        match (&self.first_visit_description, first_visit) {
            (Some(text), true) if !text.is_empty() => text,
            _ => &self.description,
        }
    }
}

/// A world-level NPC record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub world_id: WorldId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location_id: Option<LocationId>,
}

impl Npc {
    pub fn new(world_id: WorldId, name: impl Into<String>) -> Self {
        Self {
            id: NpcId::new(),
            world_id,
            name: name.into(),
            description: String::new(),
            location_id: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The per-grid annotation for placing this NPC in a grid.
    pub fn in_grid(&self, activity: Option<&str>, position: Option<&str>) -> GridNpc {
        GridNpc {
            npc_id: self.id.clone(),
            name: self.name.clone(),
            activity: activity.map(str::to_string),
            position: position.map(str::to_string),
        }
    }
}

// ============================================================================
// Characters
// ============================================================================

/// Lowest legal ability score.
pub const ABILITY_MIN: i32 = 1;
/// Highest legal ability score.
pub const ABILITY_MAX: i32 = 10;

/// The five character abilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Combat,
    Social,
    Stealth,
    Knowledge,
    Survival,
}

impl Ability {
    pub fn name(&self) -> &'static str {
        match self {
            Ability::Combat => "combat",
            Ability::Social => "social",
            Ability::Stealth => "stealth",
            Ability::Knowledge => "knowledge",
            Ability::Survival => "survival",
        }
    }

    pub fn all() -> [Ability; 5] {
        [
            Ability::Combat,
            Ability::Social,
            Ability::Stealth,
            Ability::Knowledge,
            Ability::Survival,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ability scores, each in [1, 10] with 5 as average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    pub combat: i32,
    pub social: i32,
    pub stealth: i32,
    pub knowledge: i32,
    pub survival: i32,
}

impl Abilities {
    pub fn new(combat: i32, social: i32, stealth: i32, knowledge: i32, survival: i32) -> Self {
        Self {
            combat,
            social,
            stealth,
            knowledge,
            survival,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Combat => self.combat,
            Ability::Social => self.social,
            Ability::Stealth => self.stealth,
            Ability::Knowledge => self.knowledge,
            Ability::Survival => self.survival,
        }
    }

    /// First ability whose score is outside [1, 10].
    pub fn out_of_range(&self) -> Option<(Ability, i32)> {
        Ability::all()
            .into_iter()
            .map(|a| (a, self.get(a)))
            .find(|(_, score)| !(ABILITY_MIN..=ABILITY_MAX).contains(score))
    }
}

impl Default for Abilities {
    fn default() -> Self {
        Self::new(5, 5, 5, 5, 5)
    }
}

/// A player character. Death is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub user_id: UserId,
    pub name: String,
    pub abilities: Abilities,
    pub alive: bool,
}

impl Character {
    pub fn new(user_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            user_id,
            name: name.into(),
            abilities: Abilities::default(),
            alive: true,
        }
    }

    pub fn with_abilities(mut self, abilities: Abilities) -> Self {
        self.abilities = abilities;
        self
    }

    pub fn score(&self, ability: Ability) -> i32 {
        self.abilities.get(ability)
    }
}

// ============================================================================
// Runs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Active,
    Completed,
}

/// One playthrough of a world by a character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub user_id: UserId,
    pub world_id: WorldId,
    pub character_id: CharacterId,
    pub mission: String,
    #[serde(default)]
    pub quest_id: Option<QuestId>,
    pub turn: u32,
    pub status: RunStatus,
    /// Continuation token for the text generator.
    #[serde(default)]
    pub continuation: Option<String>,
}

impl Run {
    pub fn new(
        user_id: UserId,
        world_id: WorldId,
        character_id: CharacterId,
        mission: impl Into<String>,
    ) -> Self {
        Self {
            id: RunId::new(),
            user_id,
            world_id,
            character_id,
            mission: mission.into(),
            quest_id: None,
            turn: 0,
            status: RunStatus::Active,
            continuation: None,
        }
    }

    pub fn with_quest(mut self, quest_id: QuestId) -> Self {
        self.quest_id = Some(quest_id);
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }
}

// ============================================================================
// Quests
// ============================================================================

/// What kind of action a checkpoint asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointAction {
    Dialogue,
    Investigation,
    #[default]
    Exploration,
    Combat,
}

impl CheckpointAction {
    pub fn name(&self) -> &'static str {
        match self {
            CheckpointAction::Dialogue => "dialogue",
            CheckpointAction::Investigation => "investigation",
            CheckpointAction::Exploration => "exploration",
            CheckpointAction::Combat => "combat",
        }
    }
}

/// The NPC a checkpoint is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcTarget {
    pub id: NpcId,
    pub name: String,
}

/// An ability check a checkpoint demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityRequirement {
    pub ability: Ability,
    pub dc: i32,
}

/// One milestone of a quest.
///
/// Checkpoints without a `grid_id` are legacy records and go through the
/// description-keyword heuristic instead of exact matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub description: String,
    #[serde(default)]
    pub grid_id: Option<GridId>,
    #[serde(default)]
    pub action: CheckpointAction,
    #[serde(default)]
    pub target_npc: Option<NpcTarget>,
    #[serde(default)]
    pub requirement: Option<AbilityRequirement>,
}

impl Checkpoint {
    pub fn new(id: impl Into<CheckpointId>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            grid_id: None,
            action: CheckpointAction::Exploration,
            target_npc: None,
            requirement: None,
        }
    }

    pub fn at_grid(mut self, grid_id: impl Into<GridId>) -> Self {
        self.grid_id = Some(grid_id.into());
        self
    }

    pub fn with_action(mut self, action: CheckpointAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_target_npc(mut self, id: impl Into<NpcId>, name: impl Into<String>) -> Self {
        self.target_npc = Some(NpcTarget {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    pub fn with_requirement(mut self, ability: Ability, dc: i32) -> Self {
        self.requirement = Some(AbilityRequirement { ability, dc });
        self
    }

    pub fn is_legacy(&self) -> bool {
        self.grid_id.is_none()
    }
}

/// A quest: an ordered list of checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub world_id: WorldId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub checkpoints: Vec<Checkpoint>,
}

impl Quest {
    pub fn new(world_id: WorldId, name: impl Into<String>) -> Self {
        Self {
            id: QuestId::new(),
            world_id,
            name: name.into(),
            description: String::new(),
            checkpoints: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoints.push(checkpoint);
        self
    }

    pub fn checkpoint(&self, id: &CheckpointId) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| &c.id == id)
    }
}

// ============================================================================
// Player progress
// ============================================================================

/// Persistent per-(user, world) record of discovery, reputation and quests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerWorldProgress {
    pub user_id: UserId,
    pub world_id: WorldId,
    #[serde(default)]
    pub current_location: Option<LocationId>,
    #[serde(default)]
    pub current_grid: Option<GridId>,
    #[serde(default)]
    pub discovered_locations: BTreeSet<LocationId>,
    #[serde(default)]
    pub discovered_grids: BTreeSet<GridId>,
    #[serde(default)]
    pub visited_npcs: BTreeSet<NpcId>,
    #[serde(default)]
    pub reputation: BTreeMap<NpcId, i32>,
    #[serde(default)]
    pub quests: BTreeMap<QuestId, QuestProgress>,
    #[serde(default)]
    pub history: Vec<InteractionRecord>,
}

impl PlayerWorldProgress {
    pub fn new(user_id: UserId, world_id: WorldId) -> Self {
        Self {
            user_id,
            world_id,
            current_location: None,
            current_grid: None,
            discovered_locations: BTreeSet::new(),
            discovered_grids: BTreeSet::new(),
            visited_npcs: BTreeSet::new(),
            reputation: BTreeMap::new(),
            quests: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    /// Progress for a quest, created on first access.
    pub fn quest_mut(&mut self, quest_id: &QuestId) -> &mut QuestProgress {
        self.quests.entry(quest_id.clone()).or_default()
    }

    pub fn quest(&self, quest_id: &QuestId) -> Option<&QuestProgress> {
        self.quests.get(quest_id)
    }

    pub fn reputation_with(&self, npc_id: &NpcId) -> i32 {
        self.reputation.get(npc_id).copied().unwrap_or(0)
    }

    pub fn has_discovered_grid(&self, grid_id: &GridId) -> bool {
        self.discovered_grids.contains(grid_id)
    }
}

/// One processed turn, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub run_id: RunId,
    pub turn: u32,
    pub player_text: String,
    pub narrative: String,
    pub used_fallback: bool,
}
