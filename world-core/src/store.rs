//! Record storage for worlds, characters, runs and player progress.
//!
//! The engine talks to storage through [`WorldStore`]. Every call is a
//! single atomic statement; turn-level serialization is the session's job.
//! [`MemoryStore`] is the in-process implementation.

use crate::movement::GridMap;
use crate::quest::QuestProgress;
use crate::tracker::InteractionRecord;
use crate::world::{
    Character, CharacterId, Connection, Grid, GridId, GridNpc, InteractiveObject, Location,
    LocationId, Npc, NpcId, PlayerWorldProgress, Quest, QuestId, Run, RunId, TurnRecord, UserId,
    World, WorldId,
};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Errors from storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Could not decode {field}: {message}")]
    Decode { field: &'static str, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// ============================================================================
// Raw records
// ============================================================================

/// A stored field that arrives either structured or as a JSON string.
///
/// An explicit `null` is read as absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaybeEncoded<T> {
    Parsed(T),
    Encoded(String),
    Null,
}

impl<T: Default> Default for MaybeEncoded<T> {
    fn default() -> Self {
        MaybeEncoded::Parsed(T::default())
    }
}

impl<T: DeserializeOwned + Default> MaybeEncoded<T> {
    /// The structured value. Null and blank strings decode to the default.
    pub fn decode(self, field: &'static str) -> Result<T, StoreError> {
        match self {
            MaybeEncoded::Parsed(value) => Ok(value),
            MaybeEncoded::Null => Ok(T::default()),
            MaybeEncoded::Encoded(text) if matches!(text.trim(), "" | "null") => Ok(T::default()),
            MaybeEncoded::Encoded(text) => {
                serde_json::from_str(&text).map_err(|e| StoreError::Decode {
                    field,
                    message: e.to_string(),
                })
            }
        }
    }
}

/// A grid as stored, with list fields possibly still encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRecord {
    pub id: GridId,
    pub location_id: LocationId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub first_visit_description: Option<String>,
    #[serde(default)]
    pub atmosphere: String,
    #[serde(default)]
    pub connections: MaybeEncoded<Vec<Connection>>,
    #[serde(default)]
    pub objects: MaybeEncoded<Vec<InteractiveObject>>,
    #[serde(default)]
    pub npcs: MaybeEncoded<Vec<GridNpc>>,
}

impl GridRecord {
    pub fn into_grid(self) -> Result<Grid, StoreError> {
        Ok(Grid {
            id: self.id,
            location_id: self.location_id,
            name: self.name,
            description: self.description,
            first_visit_description: self.first_visit_description,
            atmosphere: self.atmosphere,
            connections: self.connections.decode("grid.connections")?,
            objects: self.objects.decode("grid.objects")?,
            npcs: self.npcs.decode("grid.npcs")?,
        })
    }
}

impl From<Grid> for GridRecord {
    fn from(grid: Grid) -> Self {
        Self {
            id: grid.id,
            location_id: grid.location_id,
            name: grid.name,
            description: grid.description,
            first_visit_description: grid.first_visit_description,
            atmosphere: grid.atmosphere,
            connections: MaybeEncoded::Parsed(grid.connections),
            objects: MaybeEncoded::Parsed(grid.objects),
            npcs: MaybeEncoded::Parsed(grid.npcs),
        }
    }
}

/// Player progress as stored, with collection fields possibly encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: UserId,
    pub world_id: WorldId,
    #[serde(default)]
    pub current_location: Option<LocationId>,
    #[serde(default)]
    pub current_grid: Option<GridId>,
    #[serde(default)]
    pub discovered_locations: MaybeEncoded<BTreeSet<LocationId>>,
    #[serde(default)]
    pub discovered_grids: MaybeEncoded<BTreeSet<GridId>>,
    #[serde(default)]
    pub visited_npcs: MaybeEncoded<BTreeSet<NpcId>>,
    #[serde(default)]
    pub reputation: MaybeEncoded<BTreeMap<NpcId, i32>>,
    #[serde(default)]
    pub quests: MaybeEncoded<BTreeMap<QuestId, QuestProgress>>,
    #[serde(default)]
    pub history: MaybeEncoded<Vec<InteractionRecord>>,
}

impl ProgressRecord {
    pub fn into_progress(self) -> Result<PlayerWorldProgress, StoreError> {
        Ok(PlayerWorldProgress {
            user_id: self.user_id,
            world_id: self.world_id,
            current_location: self.current_location,
            current_grid: self.current_grid,
            discovered_locations: self.discovered_locations.decode("progress.discovered_locations")?,
            discovered_grids: self.discovered_grids.decode("progress.discovered_grids")?,
            visited_npcs: self.visited_npcs.decode("progress.visited_npcs")?,
            reputation: self.reputation.decode("progress.reputation")?,
            quests: self.quests.decode("progress.quests")?,
            history: self.history.decode("progress.history")?,
        })
    }
}

impl From<PlayerWorldProgress> for ProgressRecord {
    fn from(p: PlayerWorldProgress) -> Self {
        Self {
            user_id: p.user_id,
            world_id: p.world_id,
            current_location: p.current_location,
            current_grid: p.current_grid,
            discovered_locations: MaybeEncoded::Parsed(p.discovered_locations),
            discovered_grids: MaybeEncoded::Parsed(p.discovered_grids),
            visited_npcs: MaybeEncoded::Parsed(p.visited_npcs),
            reputation: MaybeEncoded::Parsed(p.reputation),
            quests: MaybeEncoded::Parsed(p.quests),
            history: MaybeEncoded::Parsed(p.history),
        }
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Storage collaborator keyed by string ids.
pub trait WorldStore: Send + Sync {
    fn world(&self, id: &WorldId) -> Result<World, StoreError>;
    fn save_world(&self, world: World) -> Result<(), StoreError>;

    fn locations(&self, world_id: &WorldId) -> Result<Vec<Location>, StoreError>;
    fn save_location(&self, location: Location) -> Result<(), StoreError>;

    /// Grids of a world, with list fields decoded.
    fn grids(&self, world_id: &WorldId) -> Result<Vec<Grid>, StoreError>;
    fn save_grid(&self, record: GridRecord) -> Result<(), StoreError>;

    fn npcs(&self, world_id: &WorldId) -> Result<Vec<Npc>, StoreError>;
    fn save_npc(&self, npc: Npc) -> Result<(), StoreError>;

    fn quests(&self, world_id: &WorldId) -> Result<Vec<Quest>, StoreError>;
    fn save_quest(&self, quest: Quest) -> Result<(), StoreError>;

    fn character(&self, id: &CharacterId) -> Result<Character, StoreError>;
    fn save_character(&self, character: Character) -> Result<(), StoreError>;

    fn run(&self, id: &RunId) -> Result<Run, StoreError>;
    fn save_run(&self, run: Run) -> Result<(), StoreError>;

    /// Progress for (user, world), if any has been recorded.
    fn progress(&self, user_id: &UserId, world_id: &WorldId) -> Result<Option<PlayerWorldProgress>, StoreError>;
    fn save_progress(&self, record: ProgressRecord) -> Result<(), StoreError>;

    fn append_turn(&self, record: TurnRecord) -> Result<(), StoreError>;
    fn turns(&self, run_id: &RunId) -> Result<Vec<TurnRecord>, StoreError>;
}

/// Everything about one world the engine needs for a turn.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    pub world: World,
    pub locations: HashMap<LocationId, Location>,
    pub grids: GridMap,
    pub npcs: HashMap<NpcId, Npc>,
    pub quests: Vec<Quest>,
}

impl WorldSnapshot {
    pub fn load(store: &dyn WorldStore, world_id: &WorldId) -> Result<Self, StoreError> {
        let world = store.world(world_id)?;
        let locations = store
            .locations(world_id)?
            .into_iter()
            .map(|l| (l.id.clone(), l))
            .collect();
        let grids = GridMap::new(store.grids(world_id)?);
        let npcs = store
            .npcs(world_id)?
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect();
        let quests = store.quests(world_id)?;

        for (from, to) in grids.broken_connections() {
            tracing::warn!(world = %world_id, %from, %to, "grid connection references a missing grid");
        }

        Ok(Self {
            world,
            locations,
            grids,
            npcs,
            quests,
        })
    }

    pub fn location(&self, id: &LocationId) -> Option<&Location> {
        self.locations.get(id)
    }

    pub fn grid(&self, id: &GridId) -> Option<&Grid> {
        self.grids.get(id)
    }

    pub fn npc(&self, id: &NpcId) -> Option<&Npc> {
        self.npcs.get(id)
    }

    pub fn quest(&self, id: &QuestId) -> Option<&Quest> {
        self.quests.iter().find(|q| &q.id == id)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Concurrent in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) worlds: DashMap<WorldId, World>,
    pub(crate) locations: DashMap<LocationId, Location>,
    pub(crate) grids: DashMap<GridId, Grid>,
    pub(crate) npcs: DashMap<NpcId, Npc>,
    pub(crate) quests: DashMap<QuestId, Quest>,
    pub(crate) characters: DashMap<CharacterId, Character>,
    pub(crate) runs: DashMap<RunId, Run>,
    pub(crate) progress: DashMap<(UserId, WorldId), PlayerWorldProgress>,
    pub(crate) turns: DashMap<RunId, Vec<TurnRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a grid that is already structured.
    pub fn insert_grid(&self, grid: Grid) {
        self.grids.insert(grid.id.clone(), grid);
    }

    fn location_ids(&self, world_id: &WorldId) -> BTreeSet<LocationId> {
        self.locations
            .iter()
            .filter(|l| &l.world_id == world_id)
            .map(|l| l.id.clone())
            .collect()
    }
}

fn sorted_by<T, K: Ord>(mut items: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    items.sort_by_key(|item| key(item));
    items
}

impl WorldStore for MemoryStore {
    fn world(&self, id: &WorldId) -> Result<World, StoreError> {
        self.worlds
            .get(id)
            .map(|w| w.clone())
            .ok_or_else(|| StoreError::not_found("World", id))
    }

    fn save_world(&self, world: World) -> Result<(), StoreError> {
        self.worlds.insert(world.id.clone(), world);
        Ok(())
    }

    fn locations(&self, world_id: &WorldId) -> Result<Vec<Location>, StoreError> {
        let locations = self
            .locations
            .iter()
            .filter(|l| &l.world_id == world_id)
            .map(|l| l.clone())
            .collect();
        Ok(sorted_by(locations, |l: &Location| l.id.clone()))
    }

    fn save_location(&self, location: Location) -> Result<(), StoreError> {
        self.locations.insert(location.id.clone(), location);
        Ok(())
    }

    fn grids(&self, world_id: &WorldId) -> Result<Vec<Grid>, StoreError> {
        let locations = self.location_ids(world_id);
        let grids = self
            .grids
            .iter()
            .filter(|g| locations.contains(&g.location_id))
            .map(|g| g.clone())
            .collect();
        Ok(sorted_by(grids, |g: &Grid| g.id.clone()))
    }

    fn save_grid(&self, record: GridRecord) -> Result<(), StoreError> {
        let grid = record.into_grid()?;
        self.insert_grid(grid);
        Ok(())
    }

    fn npcs(&self, world_id: &WorldId) -> Result<Vec<Npc>, StoreError> {
        let npcs = self
            .npcs
            .iter()
            .filter(|n| &n.world_id == world_id)
            .map(|n| n.clone())
            .collect();
        Ok(sorted_by(npcs, |n: &Npc| n.id.clone()))
    }

    fn save_npc(&self, npc: Npc) -> Result<(), StoreError> {
        self.npcs.insert(npc.id.clone(), npc);
        Ok(())
    }

    fn quests(&self, world_id: &WorldId) -> Result<Vec<Quest>, StoreError> {
        let quests = self
            .quests
            .iter()
            .filter(|q| &q.world_id == world_id)
            .map(|q| q.clone())
            .collect();
        Ok(sorted_by(quests, |q: &Quest| q.id.clone()))
    }

    fn save_quest(&self, quest: Quest) -> Result<(), StoreError> {
        self.quests.insert(quest.id.clone(), quest);
        Ok(())
    }

    fn character(&self, id: &CharacterId) -> Result<Character, StoreError> {
        self.characters
            .get(id)
            .map(|c| c.clone())
            .ok_or_else(|| StoreError::not_found("Character", id))
    }

    fn save_character(&self, character: Character) -> Result<(), StoreError> {
        self.characters.insert(character.id.clone(), character);
        Ok(())
    }

    fn run(&self, id: &RunId) -> Result<Run, StoreError> {
        self.runs
            .get(id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::not_found("Run", id))
    }

    fn save_run(&self, run: Run) -> Result<(), StoreError> {
        self.runs.insert(run.id.clone(), run);
        Ok(())
    }

    fn progress(&self, user_id: &UserId, world_id: &WorldId) -> Result<Option<PlayerWorldProgress>, StoreError> {
        Ok(self
            .progress
            .get(&(user_id.clone(), world_id.clone()))
            .map(|p| p.clone()))
    }

    fn save_progress(&self, record: ProgressRecord) -> Result<(), StoreError> {
        let progress = record.into_progress()?;
        self.progress
            .insert((progress.user_id.clone(), progress.world_id.clone()), progress);
        Ok(())
    }

    fn append_turn(&self, record: TurnRecord) -> Result<(), StoreError> {
        self.turns.entry(record.run_id.clone()).or_default().push(record);
        Ok(())
    }

    fn turns(&self, run_id: &RunId) -> Result<Vec<TurnRecord>, StoreError> {
        Ok(self.turns.get(run_id).map(|t| t.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (MemoryStore, WorldId) {
        let store = MemoryStore::new();
        let world = World::new("Ashfall", "A land of cinders.");
        let world_id = world.id.clone();
        store.save_world(world).unwrap();

        let mut location = Location::new(world_id.clone(), "Harbor");
        location.id = LocationId::from("harbor");
        store.save_location(location).unwrap();
        (store, world_id)
    }

    #[test]
    fn test_missing_records_are_not_found() {
        let store = MemoryStore::new();
        let err = store.world(&WorldId::from("nope")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "World not found: nope");
        assert!(store.run(&RunId::from("nope")).unwrap_err().is_not_found());
        assert!(store
            .progress(&UserId::from("u"), &WorldId::from("w"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_encoded_and_parsed_grids_normalize_identically() {
        let (store, world_id) = seeded();

        let parsed: GridRecord = serde_json::from_value(serde_json::json!({
            "id": "docks",
            "location_id": "harbor",
            "name": "Docks",
            "connections": [{"direction": "north", "target_grid_id": "market", "target_name": "Market"}],
            "npcs": [{"npc_id": "npc-1", "name": "Harbormaster"}],
        }))
        .unwrap();

        let encoded: GridRecord = serde_json::from_value(serde_json::json!({
            "id": "docks-encoded",
            "location_id": "harbor",
            "name": "Docks",
            "connections": "[{\"direction\": \"north\", \"target_grid_id\": \"market\", \"target_name\": \"Market\"}]",
            "objects": "",
            "npcs": "[{\"npc_id\": \"npc-1\", \"name\": \"Harbormaster\"}]",
        }))
        .unwrap();

        store.save_grid(parsed).unwrap();
        store.save_grid(encoded).unwrap();

        let grids = store.grids(&world_id).unwrap();
        assert_eq!(grids.len(), 2);
        assert_eq!(grids[0].connections, grids[1].connections);
        assert_eq!(grids[0].npcs, grids[1].npcs);
        assert!(grids[1].objects.is_empty());
    }

    #[test]
    fn test_null_fields_read_as_absent() {
        let (store, world_id) = seeded();
        let record: GridRecord = serde_json::from_value(serde_json::json!({
            "id": "quay",
            "location_id": "harbor",
            "name": "Quay",
            "connections": null,
            "objects": "null",
            "npcs": null,
        }))
        .unwrap();
        store.save_grid(record).unwrap();
        let grid = &store.grids(&world_id).unwrap()[0];
        assert!(grid.connections.is_empty());
        assert!(grid.objects.is_empty());
        assert!(grid.npcs.is_empty());

        let progress: ProgressRecord = serde_json::from_value(serde_json::json!({
            "user_id": "u",
            "world_id": "w",
            "reputation": null,
            "history": null,
        }))
        .unwrap();
        let progress = progress.into_progress().unwrap();
        assert!(progress.reputation.is_empty());
        assert!(progress.history.is_empty());
    }

    #[test]
    fn test_malformed_encoded_field_is_a_decode_error() {
        let record: GridRecord = serde_json::from_value(serde_json::json!({
            "id": "bad",
            "location_id": "harbor",
            "name": "Bad",
            "connections": "not json",
        }))
        .unwrap();
        let err = MemoryStore::new().save_grid(record).unwrap_err();
        assert!(matches!(err, StoreError::Decode { field: "grid.connections", .. }));
    }

    #[test]
    fn test_encoded_progress_blob() {
        let store = MemoryStore::new();
        let record: ProgressRecord = serde_json::from_value(serde_json::json!({
            "user_id": "u",
            "world_id": "w",
            "quests": "{\"q1\": {\"checkpoints_completed\": [\"cp1\"], \"current_checkpoint\": \"cp2\"}}",
            "discovered_grids": ["g1"],
        }))
        .unwrap();
        store.save_progress(record).unwrap();

        let progress = store
            .progress(&UserId::from("u"), &WorldId::from("w"))
            .unwrap()
            .unwrap();
        let quest = progress.quest(&QuestId::from("q1")).unwrap();
        assert_eq!(quest.completed_count(), 1);
        assert!(progress.has_discovered_grid(&GridId::from("g1")));
    }

    #[test]
    fn test_snapshot_only_includes_own_world() {
        let (store, world_id) = seeded();
        store.insert_grid(Grid::new(LocationId::from("harbor"), "Docks").with_id("docks"));
        store.insert_grid(Grid::new(LocationId::from("elsewhere"), "Void").with_id("void"));
        store
            .save_npc(Npc::new(world_id.clone(), "Harbormaster"))
            .unwrap();
        store
            .save_npc(Npc::new(WorldId::from("other"), "Stranger"))
            .unwrap();

        let snapshot = WorldSnapshot::load(&store, &world_id).unwrap();
        assert_eq!(snapshot.grids.len(), 1);
        assert!(snapshot.grid(&GridId::from("docks")).is_some());
        assert_eq!(snapshot.npcs.len(), 1);
        assert!(snapshot.location(&LocationId::from("harbor")).is_some());
    }

    #[test]
    fn test_turns_append_in_order() {
        let store = MemoryStore::new();
        let run_id = RunId::from("r");
        for turn in 1..=3 {
            store
                .append_turn(TurnRecord {
                    run_id: run_id.clone(),
                    turn,
                    player_text: format!("action {turn}"),
                    narrative: "ok".to_string(),
                    used_fallback: false,
                })
                .unwrap();
        }
        let turns = store.turns(&run_id).unwrap();
        assert_eq!(turns.iter().map(|t| t.turn).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
