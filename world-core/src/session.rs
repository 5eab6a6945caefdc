//! GameSession - the primary public API for world-adventure play.
//!
//! A session owns the storage handle, the narrator and the dice, and runs
//! one player turn end to end: movement, classification, checks, quest
//! checkpoints, world-state deltas, persistence and narration.
//!
//! Turns for the same (user, world) pair are serialized with an async
//! mutex, so concurrent requests cannot overwrite each other's progress.

use crate::action::{ActionAnalysis, ActionAnalyzer};
use crate::checkpoint::{evaluate, CheckpointContext, Detection};
use crate::dice::{DiceError, DiceRoller};
use crate::engine::{active_quest, ActionResult, GameEngine};
use crate::movement::{GridMovementSystem, MovementError, MovementIntent, MovementOutcome, DEFAULT_MAX_DEPTH};
use crate::prompt::{build_system_prompt, build_turn_prompt, default_narrative, TurnFacts};
use crate::quest::{is_complete, next_checkpoint, update_progress};
use crate::store::{StoreError, WorldSnapshot, WorldStore};
use crate::tracker::{TrackerReport, WorldStateTracker, HISTORY_LIMIT};
use crate::world::{
    Character, CharacterId, CheckpointId, GridId, PlayerWorldProgress, QuestId, Run, RunId,
    RunStatus, TurnRecord, UserId, World, WorldId,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use textgen::{GenerationRequest, TextGenerator};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request was rejected before any state changed.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => SessionError::NotFound { kind, id },
            other => SessionError::Store(other),
        }
    }
}

impl From<DiceError> for SessionError {
    fn from(err: DiceError) -> Self {
        SessionError::Validation(err.to_string())
    }
}

impl From<MovementError> for SessionError {
    fn from(err: MovementError) -> Self {
        match err {
            MovementError::UnknownGrid(id) => SessionError::NotFound {
                kind: "Grid",
                id: id.to_string(),
            },
        }
    }
}

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest accepted action, in characters.
    pub max_action_chars: usize,

    /// How long to wait for the narrator before falling back.
    pub generator_timeout: Duration,

    /// Maximum tokens for narrator responses.
    pub max_tokens: usize,

    /// Temperature for narrator generation.
    pub temperature: Option<f32>,

    /// Extra narrator instructions.
    pub custom_prompt: Option<String>,

    /// Hop limit for multi-hop movement.
    pub max_path_depth: usize,

    /// Interaction records kept per player and world.
    pub history_limit: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_action_chars: 1000,
            generator_timeout: Duration::from_secs(30),
            max_tokens: 1024,
            temperature: Some(0.8),
            custom_prompt: None,
            max_path_depth: DEFAULT_MAX_DEPTH,
            history_limit: HISTORY_LIMIT,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_action_chars(mut self, chars: usize) -> Self {
        self.max_action_chars = chars;
        self
    }

    pub fn with_generator_timeout(mut self, timeout: Duration) -> Self {
        self.generator_timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }
}

/// Parameters for starting a run.
#[derive(Debug, Clone)]
pub struct RunSetup {
    pub user_id: UserId,
    pub character_id: CharacterId,
    pub world_id: WorldId,
    pub mission: String,
    pub quest_id: Option<QuestId>,
    /// Where to place the player if they have no position in this world yet.
    pub start_grid: Option<GridId>,
}

impl RunSetup {
    pub fn new(
        user_id: UserId,
        character_id: CharacterId,
        world_id: WorldId,
        mission: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            character_id,
            world_id,
            mission: mission.into(),
            quest_id: None,
            start_grid: None,
        }
    }

    pub fn with_quest(mut self, quest_id: QuestId) -> Self {
        self.quest_id = Some(quest_id);
        self
    }

    pub fn starting_at(mut self, grid_id: GridId) -> Self {
        self.start_grid = Some(grid_id);
        self
    }
}

/// Movement that happened during a turn.
#[derive(Debug, Clone)]
pub struct TurnMovement {
    pub intent: MovementIntent,
    pub outcome: MovementOutcome,
}

/// Result of one player turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub run_id: RunId,
    pub turn: u32,
    /// Narrator text shown to the player.
    pub narrative: String,
    /// Whether the narrative came from the deterministic fallback.
    pub used_fallback: bool,
    pub analysis: ActionAnalysis,
    pub action: ActionResult,
    pub movement: Option<TurnMovement>,
    /// Evaluation of the quest's next checkpoint, if the run has one.
    pub checkpoint: Option<Detection>,
    pub checkpoints_completed: Vec<CheckpointId>,
    pub quest_complete: bool,
    pub run_status: RunStatus,
}

/// A world-adventure game session.
pub struct GameSession {
    store: Arc<dyn WorldStore>,
    generator: Box<dyn TextGenerator>,
    engine: GameEngine,
    config: SessionConfig,
    locks: PairLocks,
}

type PairLocks = DashMap<(UserId, WorldId), Arc<Mutex<()>>>;

/// Exclusive access to one (user, world) pair.
///
/// Dropping it releases the lock and forgets the pair when no other task
/// holds or waits on it, so the lock map only tracks pairs in use.
struct PairGuard<'a> {
    locks: &'a PairLocks,
    key: (UserId, WorldId),
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl GameSession {
    /// Create a session over the given collaborators.
    pub fn new(
        store: Arc<dyn WorldStore>,
        generator: Box<dyn TextGenerator>,
        roller: Arc<dyn DiceRoller>,
    ) -> Self {
        Self {
            store,
            generator,
            engine: GameEngine::new(roller),
            config: SessionConfig::default(),
            locks: DashMap::new(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn WorldStore> {
        &self.store
    }

    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    fn tracker(&self) -> WorldStateTracker {
        WorldStateTracker::new().with_history_limit(self.config.history_limit)
    }

    async fn lock_pair(&self, user_id: &UserId, world_id: &WorldId) -> PairGuard<'_> {
        let key = (user_id.clone(), world_id.clone());
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        PairGuard {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    /// Progress for (user, world), created empty when absent.
    pub fn progress(&self, user_id: &UserId, world_id: &WorldId) -> Result<PlayerWorldProgress, SessionError> {
        Ok(self
            .store
            .progress(user_id, world_id)?
            .unwrap_or_else(|| PlayerWorldProgress::new(user_id.clone(), world_id.clone())))
    }

    /// Start a new run of a world with a character.
    pub async fn start_run(&self, setup: RunSetup) -> Result<Run, SessionError> {
        let character = self.store.character(&setup.character_id)?;
        if character.user_id != setup.user_id {
            return Err(SessionError::Validation(format!(
                "Character {} does not belong to user {}",
                character.id, setup.user_id
            )));
        }
        check_character(&character)?;

        let _guard = self.lock_pair(&setup.user_id, &setup.world_id).await;

        let mut snapshot = WorldSnapshot::load(self.store.as_ref(), &setup.world_id)?;
        if snapshot.world.archived {
            return Err(SessionError::Validation(format!(
                "World {} is archived",
                setup.world_id
            )));
        }
        if let Some(quest_id) = &setup.quest_id {
            if snapshot.quest(quest_id).is_none() {
                return Err(SessionError::NotFound {
                    kind: "Quest",
                    id: quest_id.to_string(),
                });
            }
        }

        let mut progress = self.progress(&setup.user_id, &setup.world_id)?;
        let mut world = snapshot.world.clone();
        let mut report = TrackerReport::default();

        if let (Some(start), None) = (&setup.start_grid, &progress.current_grid) {
            let movement = GridMovementSystem::new(&snapshot.grids);
            let outcome = movement.execute_movement(&mut progress, start)?;
            self.tracker()
                .record_visit(&mut progress, &mut world, &outcome, 0, &mut report);
        }

        let mut run = Run::new(
            setup.user_id.clone(),
            setup.world_id.clone(),
            setup.character_id.clone(),
            setup.mission,
        );
        run.quest_id = setup.quest_id;

        snapshot.world = world;
        self.persist_state(&mut snapshot, &progress, &report);
        self.store.save_run(run.clone())?;

        tracing::info!(
            run = %run.id,
            user = %run.user_id,
            world = %run.world_id,
            "run started"
        );
        Ok(run)
    }

    /// Move the player directly to a grid.
    ///
    /// The grid must exist in the world and, when the player already has a
    /// position, be reachable within the configured hop limit.
    pub async fn execute_movement(
        &self,
        user_id: &UserId,
        world_id: &WorldId,
        grid_id: &GridId,
    ) -> Result<MovementOutcome, SessionError> {
        let _guard = self.lock_pair(user_id, world_id).await;

        let mut snapshot = WorldSnapshot::load(self.store.as_ref(), world_id)?;
        let mut progress = self.progress(user_id, world_id)?;
        let movement =
            GridMovementSystem::new(&snapshot.grids).with_max_depth(self.config.max_path_depth);

        if !snapshot.grids.contains(grid_id) {
            return Err(MovementError::UnknownGrid(grid_id.clone()).into());
        }
        if let Some(current) = &progress.current_grid {
            let route = movement.find_path(current, grid_id, self.config.max_path_depth);
            if !route.found {
                return Err(SessionError::Validation(format!(
                    "Grid {grid_id} is not reachable from {current}"
                )));
            }
        }

        let mut world = snapshot.world.clone();
        let mut report = TrackerReport::default();
        let outcome = movement.execute_movement(&mut progress, grid_id)?;
        self.tracker()
            .record_visit(&mut progress, &mut world, &outcome, 0, &mut report);

        snapshot.world = world;
        self.persist_state(&mut snapshot, &progress, &report);
        Ok(outcome)
    }

    /// Process one player action for a run.
    ///
    /// Only validation problems and missing records fail the turn. Storage
    /// write failures are logged, and narrator failures or timeouts fall
    /// back to a deterministic narrative.
    pub async fn take_turn(&self, run_id: &RunId, action_text: &str) -> Result<TurnOutcome, SessionError> {
        let text = action_text.trim();
        if text.is_empty() {
            return Err(SessionError::Validation("Action text is empty".to_string()));
        }
        let length = text.chars().count();
        if length > self.config.max_action_chars {
            return Err(SessionError::Validation(format!(
                "Action text is {length} characters, the limit is {}",
                self.config.max_action_chars
            )));
        }

        let run = self.store.run(run_id)?;
        let _guard = self.lock_pair(&run.user_id, &run.world_id).await;

        // Re-read under the lock; a concurrent turn may have advanced it.
        let mut run = self.store.run(run_id)?;
        if !run.is_active() {
            return Err(SessionError::Validation(format!("Run {run_id} is already completed")));
        }
        let character = self.store.character(&run.character_id)?;
        check_character(&character)?;

        let mut snapshot = WorldSnapshot::load(self.store.as_ref(), &run.world_id)?;
        let mut progress = self.progress(&run.user_id, &run.world_id)?;
        let mut world: World = snapshot.world.clone();
        let tracker = self.tracker();
        let mut report = TrackerReport::default();
        let turn = run.turn + 1;

        // Movement
        let movement_system =
            GridMovementSystem::new(&snapshot.grids).with_max_depth(self.config.max_path_depth);
        let intent = progress
            .current_grid
            .as_ref()
            .and_then(|current| movement_system.detect_movement_intent(text, current));
        let movement = match intent {
            Some(intent) => {
                let outcome = movement_system.execute_movement(&mut progress, &intent.target_grid_id)?;
                tracker.record_visit(&mut progress, &mut world, &outcome, turn, &mut report);
                Some(TurnMovement { intent, outcome })
            }
            None => None,
        };

        // Classification and mechanics
        let grid = progress.current_grid.as_ref().and_then(|id| snapshot.grid(id));
        let location = progress
            .current_location
            .as_ref()
            .and_then(|id| snapshot.location(id));
        let analysis = ActionAnalyzer::analyze(text, grid, location);
        let action = self.engine.process_player_action(&character, text)?;

        // Quest checkpoint
        let mut checkpoint = None;
        let mut checkpoints_completed = Vec::new();
        let mut quest_complete = false;
        if let Some(quest) = active_quest(&snapshot, &progress, &run) {
            let quest_progress = progress.quest(&quest.id).cloned().unwrap_or_default();
            if let Some(next) = next_checkpoint(quest, &quest_progress) {
                let check = self.engine.checkpoint_check(
                    &character,
                    next,
                    progress.current_grid.as_ref(),
                    action.check.as_ref(),
                )?;
                let ctx = CheckpointContext {
                    current_grid: progress.current_grid.as_ref(),
                    current_grid_name: grid.map(|g| g.name.as_str()),
                    current_location_name: location.map(|l| l.name.as_str()),
                    analysis: &analysis,
                    check: check.as_ref(),
                };
                let detection = evaluate(next, &ctx);
                if detection.completed {
                    update_progress(quest, progress.quest_mut(&quest.id), &next.id);
                    tracker.record_checkpoint(&mut progress, &mut world, next, turn, &mut report);
                    checkpoints_completed.push(next.id.clone());
                } else {
                    progress.quest_mut(&quest.id).current_checkpoint = Some(next.id.clone());
                }
                checkpoint = Some(detection);
            }
            quest_complete = progress
                .quest(&quest.id)
                .map(|p| is_complete(quest, p))
                .unwrap_or(quest.checkpoints.is_empty());
        }

        tracker.record_action(&mut progress, &mut world, &analysis, action.check.as_ref(), turn, &mut report);

        run.turn = turn;
        if quest_complete && run.quest_id.is_some() {
            run.status = RunStatus::Completed;
        }

        snapshot.world = world;
        self.persist_state(&mut snapshot, &progress, &report);

        // Narration
        let context = self.engine.world_context(&snapshot, &progress, &run, &character);
        let completed: Vec<Detection> = checkpoint.iter().filter(|d| d.completed).cloned().collect();
        let facts = TurnFacts {
            action: &action,
            movement: movement.as_ref().map(|m| &m.outcome),
            completed: &completed,
            quest_complete,
        };
        let fallback = default_narrative(&context, &facts);
        let mut request = GenerationRequest::new(build_turn_prompt(text, &facts))
            .with_system(build_system_prompt(&context, self.config.custom_prompt.as_deref()))
            .with_continuation(run.continuation.clone())
            .with_fallback(fallback.clone())
            .with_max_tokens(self.config.max_tokens);
        if let Some(temperature) = self.config.temperature {
            request = request.with_temperature(temperature);
        }

        let (narrative, used_fallback) =
            match tokio::time::timeout(self.config.generator_timeout, self.generator.generate(request)).await {
                Ok(Ok(generation)) if !generation.text.trim().is_empty() => {
                    run.continuation = Some(generation.continuation);
                    (generation.text, false)
                }
                Ok(Ok(_)) => {
                    tracing::warn!(generator = self.generator.name(), "narrator returned empty text, using fallback");
                    (fallback, true)
                }
                Ok(Err(e)) => {
                    tracing::warn!(generator = self.generator.name(), error = %e, "narrator failed, using fallback");
                    (fallback, true)
                }
                Err(_) => {
                    tracing::warn!(
                        generator = self.generator.name(),
                        timeout_secs = self.config.generator_timeout.as_secs(),
                        "narrator timed out, using fallback"
                    );
                    (fallback, true)
                }
            };

        if let Err(e) = self.store.save_run(run.clone()) {
            tracing::warn!(run = %run.id, error = %e, "failed to save run");
        }
        let record = TurnRecord {
            run_id: run.id.clone(),
            turn,
            player_text: text.to_string(),
            narrative: narrative.clone(),
            used_fallback,
        };
        if let Err(e) = self.store.append_turn(record) {
            tracing::warn!(run = %run.id, error = %e, "failed to record turn");
        }

        tracing::info!(
            run = %run.id,
            turn,
            action = %analysis.action_type,
            moved = movement.is_some(),
            completed = checkpoints_completed.len(),
            used_fallback,
            "turn processed"
        );

        Ok(TurnOutcome {
            run_id: run.id.clone(),
            turn,
            narrative,
            used_fallback,
            analysis,
            action,
            movement,
            checkpoint,
            checkpoints_completed,
            quest_complete,
            run_status: run.status,
        })
    }

    /// Write progress, world meters and newly discovered locations.
    fn persist_state(&self, snapshot: &mut WorldSnapshot, progress: &PlayerWorldProgress, report: &TrackerReport) {
        if let Err(e) = self.store.save_progress(progress.clone().into()) {
            tracing::warn!(user = %progress.user_id, world = %progress.world_id, error = %e, "failed to save progress");
        }
        if report.meters_changed {
            if let Err(e) = self.store.save_world(snapshot.world.clone()) {
                tracing::warn!(world = %snapshot.world.id, error = %e, "failed to save world");
            }
        }
        if let Some(id) = &report.discovered_location {
            if let Some(location) = snapshot.locations.get_mut(id) {
                if !location.discovered {
                    location.discovered = true;
                    if let Err(e) = self.store.save_location(location.clone()) {
                        tracing::warn!(location = %id, error = %e, "failed to save location");
                    }
                }
            }
        }
    }
}

fn check_character(character: &Character) -> Result<(), SessionError> {
    if !character.alive {
        return Err(SessionError::Validation(format!(
            "Character {} is dead",
            character.name
        )));
    }
    if let Some((ability, score)) = character.abilities.out_of_range() {
        return Err(SessionError::Validation(format!(
            "Ability score {score} for {ability} is outside [1, 10]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config() {
        let config = SessionConfig::new()
            .with_max_action_chars(200)
            .with_generator_timeout(Duration::from_secs(5))
            .with_max_tokens(2048);

        assert_eq!(config.max_action_chars, 200);
        assert_eq!(config.generator_timeout, Duration::from_secs(5));
        assert_eq!(config.max_tokens, 2048);
        assert_eq!(config.max_path_depth, DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_store_errors_map_to_not_found() {
        let err: SessionError = StoreError::not_found("Run", "r1").into();
        assert!(matches!(err, SessionError::NotFound { kind: "Run", .. }));
        assert_eq!(err.to_string(), "Run not found: r1");

        let err: SessionError = MovementError::UnknownGrid(GridId::from("g")).into();
        assert!(matches!(err, SessionError::NotFound { kind: "Grid", .. }));
    }

    #[test]
    fn test_dead_character_rejected() {
        let mut character = Character::new(UserId::from("u"), "Fallen");
        character.alive = false;
        assert!(matches!(
            check_character(&character),
            Err(SessionError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_pair_locks_are_released_after_use() {
        let harness = crate::testing::TestHarness::new([10]).await.unwrap();
        assert!(harness.session.locks.is_empty());

        harness.act("look around").await.unwrap();
        assert!(harness.session.locks.is_empty());

        let (a, b) = tokio::join!(harness.act("go north"), harness.act("go south"));
        a.unwrap();
        b.unwrap();
        assert!(harness.session.locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiting_task_keeps_pair_lock() {
        let harness = crate::testing::TestHarness::new([10]).await.unwrap();
        let user = harness.sample.user_id.clone();
        let world = harness.sample.world_id.clone();

        let held = harness.session.lock_pair(&user, &world).await;
        assert_eq!(harness.session.locks.len(), 1);

        let waiting = harness.session.lock_pair(&user, &world);
        tokio::pin!(waiting);
        let still_waiting = tokio::time::timeout(Duration::from_millis(20), waiting.as_mut()).await;
        assert!(still_waiting.is_err());

        drop(held);
        assert_eq!(harness.session.locks.len(), 1);

        let second = waiting.await;
        drop(second);
        assert!(harness.session.locks.is_empty());
    }
}
