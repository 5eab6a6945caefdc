//! Save and load a whole [`MemoryStore`] as a JSON file.

use crate::store::{GridRecord, MemoryStore, ProgressRecord, StoreError, WorldStore};
use crate::world::{Character, Location, Npc, Quest, Run, TurnRecord, World};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Current save file version.
const SAVE_VERSION: u32 = 1;

/// Contents of a save file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Save format version for compatibility checking.
    pub version: u32,

    /// Seconds since the Unix epoch when the save was created.
    #[serde(default)]
    pub saved_at: String,

    #[serde(default)]
    pub worlds: Vec<World>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub grids: Vec<GridRecord>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub quests: Vec<Quest>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub progress: Vec<ProgressRecord>,
    #[serde(default)]
    pub turns: Vec<TurnRecord>,
}

impl StoreSnapshot {
    /// Copy every record out of a store.
    pub fn capture(store: &MemoryStore) -> Self {
        fn collect<K, V: Clone>(map: &dashmap::DashMap<K, V>) -> Vec<V>
        where
            K: Eq + std::hash::Hash,
        {
            map.iter().map(|e| e.value().clone()).collect()
        }

        let mut turns: Vec<TurnRecord> = store
            .turns
            .iter()
            .flat_map(|e| e.value().clone())
            .collect();
        turns.sort_by(|a, b| a.run_id.cmp(&b.run_id).then(a.turn.cmp(&b.turn)));

        Self {
            version: SAVE_VERSION,
            saved_at: timestamp(),
            worlds: collect(&store.worlds),
            locations: collect(&store.locations),
            grids: collect(&store.grids).into_iter().map(GridRecord::from).collect(),
            npcs: collect(&store.npcs),
            quests: collect(&store.quests),
            characters: collect(&store.characters),
            runs: collect(&store.runs),
            progress: collect(&store.progress)
                .into_iter()
                .map(ProgressRecord::from)
                .collect(),
            turns,
        }
    }

    /// Build a store from the snapshot, decoding any encoded fields.
    pub fn restore(self) -> Result<MemoryStore, StoreError> {
        let store = MemoryStore::new();
        for world in self.worlds {
            store.save_world(world)?;
        }
        for location in self.locations {
            store.save_location(location)?;
        }
        for grid in self.grids {
            store.save_grid(grid)?;
        }
        for npc in self.npcs {
            store.save_npc(npc)?;
        }
        for quest in self.quests {
            store.save_quest(quest)?;
        }
        for character in self.characters {
            store.save_character(character)?;
        }
        for run in self.runs {
            store.save_run(run)?;
        }
        for progress in self.progress {
            store.save_progress(progress)?;
        }
        for turn in self.turns {
            store.append_turn(turn)?;
        }
        Ok(store)
    }
}

impl MemoryStore {
    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), StoreError> {
        let snapshot = StoreSnapshot::capture(self);
        let content = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).await?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;

        if snapshot.version != SAVE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SAVE_VERSION,
                found: snapshot.version,
            });
        }

        tracing::info!(
            worlds = snapshot.worlds.len(),
            runs = snapshot.runs.len(),
            "loaded store snapshot"
        );
        snapshot.restore()
    }
}

fn timestamp() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", now.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{
        Character, CharacterId, Grid, GridId, LocationId, PlayerWorldProgress, RunId, UserId,
        WorldId,
    };
    use tempfile::tempdir;

    fn populated() -> (MemoryStore, WorldId) {
        let store = MemoryStore::new();
        let world = World::new("Ashfall", "Cinders everywhere.");
        let world_id = world.id.clone();
        store.save_world(world).unwrap();

        let mut location = Location::new(world_id.clone(), "Harbor");
        location.id = LocationId::from("harbor");
        store.save_location(location).unwrap();
        store.insert_grid(Grid::new(LocationId::from("harbor"), "Docks").with_id("docks"));

        let mut character = Character::new(UserId::from("u"), "Vex");
        character.id = CharacterId::from("c");
        store.save_character(character).unwrap();

        let mut progress = PlayerWorldProgress::new(UserId::from("u"), world_id.clone());
        progress.discovered_grids.insert(GridId::from("docks"));
        store.save_progress(progress.into()).unwrap();
        (store, world_id)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (store, world_id) = populated();
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        store.save_json(&path).await.unwrap();
        let loaded = MemoryStore::load_json(&path).await.unwrap();

        assert_eq!(loaded.world(&world_id).unwrap().name, "Ashfall");
        assert_eq!(loaded.grids(&world_id).unwrap().len(), 1);
        assert_eq!(loaded.character(&CharacterId::from("c")).unwrap().name, "Vex");
        let progress = loaded
            .progress(&UserId::from("u"), &world_id)
            .unwrap()
            .unwrap();
        assert!(progress.has_discovered_grid(&GridId::from("docks")));
        assert!(loaded.turns(&RunId::from("none")).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_version_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("old.json");
        tokio::fs::write(&path, r#"{"version": 99}"#).await.unwrap();

        let err = MemoryStore::load_json(&path).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionMismatch {
                expected: 1,
                found: 99
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = MemoryStore::load_json(dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
