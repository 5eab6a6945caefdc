//! Testing utilities for the adventure engine.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic narration without API calls
//! - `SampleWorld` for a small seeded world with a two-step quest
//! - `TestHarness` for scripted turn-by-turn scenarios
//! - Assertion helpers for verifying player state

use crate::dice::ScriptedRolls;
use crate::session::{GameSession, RunSetup, SessionConfig, SessionError, TurnOutcome};
use crate::store::{MemoryStore, WorldStore};
use crate::world::{
    Abilities, Ability, Character, CharacterId, Checkpoint, CheckpointAction, Connection, Grid,
    GridId, Location, LocationId, Npc, NpcId, PlayerWorldProgress, Quest, QuestId, Run, UserId,
    World, WorldId,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use textgen::{Error, Generation, GenerationRequest, TextGenerator};
use uuid::Uuid;

// ============================================================================
// Mock narrator
// ============================================================================

/// A scripted narrator reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Narrative(String),
    Failure(String),
    /// Wait before answering, to exercise timeouts.
    Delayed(Duration, String),
}

impl MockResponse {
    pub fn narrative(text: impl Into<String>) -> Self {
        MockResponse::Narrative(text.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        MockResponse::Failure(message.into())
    }

    pub fn delayed(delay: Duration, text: impl Into<String>) -> Self {
        MockResponse::Delayed(delay, text.into())
    }
}

#[derive(Debug, Default)]
struct MockState {
    responses: VecDeque<MockResponse>,
    requests: Vec<GenerationRequest>,
}

/// A text generator that returns scripted replies and records requests.
///
/// Clones share state, so a test can keep a handle after giving one to a
/// session.
#[derive(Debug, Clone, Default)]
pub struct MockGenerator {
    state: Arc<Mutex<MockState>>,
}

impl MockGenerator {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                responses: responses.into(),
                requests: Vec::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a reply to the queue.
    pub fn queue(&self, response: MockResponse) {
        self.state().responses.push_back(response);
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.state().requests.clone()
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.state().requests.last().cloned()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation, Error> {
        let response = {
            let mut state = self.state();
            state.requests.push(request.clone());
            state
                .responses
                .pop_front()
                .unwrap_or_else(|| MockResponse::narrative("The story continues."))
        };

        let continuation = request
            .continuation
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match response {
            MockResponse::Narrative(text) => Ok(Generation { text, continuation }),
            MockResponse::Failure(message) => Err(Error::Api {
                status: 500,
                message,
            }),
            MockResponse::Delayed(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(Generation { text, continuation })
            }
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Sample world
// ============================================================================

/// Ids of the records [`SampleWorld::seed`] creates.
///
/// Town layout, all in one location:
///
/// ```text
/// woods path <-west- gatehouse <-> market <-> temple entrance <-> temple interior
/// ```
///
/// The woodland path belongs to a second location. The quest asks the
/// player to beat the gate guard (combat, DC 12) and then speak with Mira
/// inside the temple.
#[derive(Debug, Clone)]
pub struct SampleWorld {
    pub user_id: UserId,
    pub world_id: WorldId,
    pub character_id: CharacterId,
    pub quest_id: QuestId,
    pub town: LocationId,
    pub woods: LocationId,
    pub gatehouse: GridId,
    pub market: GridId,
    pub temple_entrance: GridId,
    pub temple_interior: GridId,
    pub woods_path: GridId,
    pub guard: NpcId,
    pub mira: NpcId,
    pub hermit: NpcId,
}

impl SampleWorld {
    /// Seed the sample world into a store.
    pub fn seed(store: &dyn WorldStore) -> Result<Self, SessionError> {
        let sample = Self {
            user_id: UserId::from("user-1"),
            world_id: WorldId::from("emberfall"),
            character_id: CharacterId::from("vex"),
            quest_id: QuestId::from("ember-relic"),
            town: LocationId::from("town"),
            woods: LocationId::from("woods"),
            gatehouse: GridId::from("gatehouse"),
            market: GridId::from("market"),
            temple_entrance: GridId::from("temple-entrance"),
            temple_interior: GridId::from("temple-interior"),
            woods_path: GridId::from("woods-path"),
            guard: NpcId::from("npc-bren"),
            mira: NpcId::from("npc-mira"),
            hermit: NpcId::from("npc-hermit"),
        };

        let mut world = World::new("Emberfall", "A walled town built on the ashes of an older one.");
        world.id = sample.world_id.clone();
        store.save_world(world)?;

        let mut town = Location::new(sample.world_id.clone(), "Emberfall Town")
            .with_description("Soot-stained walls around a busy market.");
        town.id = sample.town.clone();
        store.save_location(town)?;

        let mut woods = Location::new(sample.world_id.clone(), "Ashen Woods")
            .with_description("Grey trees that never regrew their leaves.")
            .with_danger_level(3);
        woods.id = sample.woods.clone();
        store.save_location(woods)?;

        let mut guard = Npc::new(sample.world_id.clone(), "Captain Bren")
            .with_description("A scarred veteran who trusts no one.");
        guard.id = sample.guard.clone();
        let mut mira = Npc::new(sample.world_id.clone(), "Mira")
            .with_description("Keeper of the temple flame.");
        mira.id = sample.mira.clone();
        let mut hermit = Npc::new(sample.world_id.clone(), "Old Hermit")
            .with_description("Knows where the relic was first found.");
        hermit.id = sample.hermit.clone();

        let grids = [
            Grid::new(sample.town.clone(), "Gatehouse")
                .with_id(sample.gatehouse.clone())
                .with_description("A squat stone gatehouse at the town's edge.")
                .with_first_visit("You pass under the portcullis into Emberfall for the first time.")
                .with_atmosphere("Smoke drifts from the watch fire.")
                .connect(Connection::new("north", sample.market.clone(), "Market Plaza"))
                .connect(Connection::new("west", sample.woods_path.clone(), "Woodland Path"))
                .with_npc(guard.in_grid(Some("watching the road"), Some("by the gate"))),
            Grid::new(sample.town.clone(), "Market Plaza")
                .with_id(sample.market.clone())
                .with_description("Stalls crowd a cobbled square.")
                .with_object("Notice Board", "Bounties and rumors pinned in layers.")
                .connect(Connection::new("south", sample.gatehouse.clone(), "Gatehouse"))
                .connect(Connection::new("north", sample.temple_entrance.clone(), "Temple Entrance")),
            Grid::new(sample.town.clone(), "Temple Entrance")
                .with_id(sample.temple_entrance.clone())
                .with_description("Wide steps climb to bronze doors.")
                .connect(Connection::new("south", sample.market.clone(), "Market Plaza"))
                .connect(Connection::new("inside", sample.temple_interior.clone(), "Temple Interior")),
            Grid::new(sample.town.clone(), "Temple Interior")
                .with_id(sample.temple_interior.clone())
                .with_description("Candlelight flickers over a cracked altar.")
                .with_object("Shrine Relic", "An ember that never cools.")
                .connect(Connection::new("out", sample.temple_entrance.clone(), "Temple Entrance"))
                .with_npc(mira.in_grid(Some("tending the flame"), None)),
            Grid::new(sample.woods.clone(), "Woodland Path")
                .with_id(sample.woods_path.clone())
                .with_description("A narrow path between grey trunks.")
                .connect(Connection::new("east", sample.gatehouse.clone(), "Gatehouse"))
                .with_npc(hermit.in_grid(Some("gathering bark"), None)),
        ];

        store.save_npc(guard)?;
        store.save_npc(mira)?;
        store.save_npc(hermit)?;
        for grid in grids {
            store.save_grid(grid.into())?;
        }

        let mut quest = Quest::new(sample.world_id.clone(), "The Ember Relic")
            .with_description("Recover the relic from the temple.")
            .with_checkpoint(
                Checkpoint::new("cp-guard", "Get past the gate guard")
                    .at_grid(sample.gatehouse.clone())
                    .with_action(CheckpointAction::Combat)
                    .with_requirement(Ability::Combat, 12),
            )
            .with_checkpoint(
                Checkpoint::new("cp-mira", "Speak with Mira in the temple")
                    .at_grid(sample.temple_interior.clone())
                    .with_action(CheckpointAction::Dialogue)
                    .with_target_npc(sample.mira.clone(), "Mira"),
            );
        quest.id = sample.quest_id.clone();
        store.save_quest(quest)?;

        let mut character = Character::new(sample.user_id.clone(), "Vex")
            .with_abilities(Abilities::new(8, 5, 4, 6, 5));
        character.id = sample.character_id.clone();
        store.save_character(character)?;

        Ok(sample)
    }

    /// A run of the sample quest that starts at the gatehouse.
    pub fn run_setup(&self) -> RunSetup {
        RunSetup::new(
            self.user_id.clone(),
            self.character_id.clone(),
            self.world_id.clone(),
            "Recover the ember relic",
        )
        .with_quest(self.quest_id.clone())
        .starting_at(self.gatehouse.clone())
    }
}

// ============================================================================
// Test harness
// ============================================================================

/// Test harness for running turn-by-turn scenarios.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub generator: MockGenerator,
    pub session: GameSession,
    pub sample: SampleWorld,
    pub run: Run,
}

impl TestHarness {
    /// Seed the sample world and start a run with scripted dice.
    pub async fn new(rolls: impl IntoIterator<Item = u8>) -> Result<Self, SessionError> {
        Self::with_config(rolls, SessionConfig::default()).await
    }

    pub async fn with_config(
        rolls: impl IntoIterator<Item = u8>,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let store = Arc::new(MemoryStore::new());
        let sample = SampleWorld::seed(store.as_ref())?;
        let generator = MockGenerator::default();
        let session = GameSession::new(
            store.clone(),
            Box::new(generator.clone()),
            Arc::new(ScriptedRolls::new(rolls)),
        )
        .with_config(config);
        let run = session.start_run(sample.run_setup()).await?;

        Ok(Self {
            store,
            generator,
            session,
            sample,
            run,
        })
    }

    /// Queue a narrator reply.
    pub fn expect_narrative(&self, text: impl Into<String>) -> &Self {
        self.generator.queue(MockResponse::narrative(text));
        self
    }

    /// Queue a narrator failure.
    pub fn expect_failure(&self) -> &Self {
        self.generator.queue(MockResponse::failure("service unavailable"));
        self
    }

    /// Send one player action.
    pub async fn act(&self, text: &str) -> Result<TurnOutcome, SessionError> {
        self.session.take_turn(&self.run.id, text).await
    }

    pub fn progress(&self) -> PlayerWorldProgress {
        self.store
            .progress(&self.sample.user_id, &self.sample.world_id)
            .ok()
            .flatten()
            .unwrap_or_else(|| {
                PlayerWorldProgress::new(self.sample.user_id.clone(), self.sample.world_id.clone())
            })
    }

    /// The run as currently stored.
    pub fn stored_run(&self) -> Option<Run> {
        self.store.run(&self.run.id).ok()
    }

    pub fn current_grid(&self) -> Option<GridId> {
        self.progress().current_grid
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the player stands in the given grid.
#[track_caller]
pub fn assert_at_grid(harness: &TestHarness, grid: &GridId) {
    let actual = harness.current_grid();
    assert_eq!(
        actual.as_ref(),
        Some(grid),
        "Expected player at {grid}, found {actual:?}"
    );
}

/// Assert the sample quest has the given number of completed checkpoints.
#[track_caller]
pub fn assert_checkpoints_completed(harness: &TestHarness, count: usize) {
    let progress = harness.progress();
    let completed = progress
        .quest(&harness.sample.quest_id)
        .map(|q| q.completed_count())
        .unwrap_or(0);
    assert_eq!(completed, count, "Expected {count} completed checkpoints, got {completed}");
}
