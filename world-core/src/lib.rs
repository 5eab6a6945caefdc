//! World-adventure game engine with an AI narrator.
//!
//! This crate provides:
//! - Grid-based movement with pathfinding and movement-intent detection
//! - Ordered quest checkpoints and their completion rules
//! - d20 ability checks with an injectable roller
//! - Narrator context assembly that only reveals what the player has found
//! - A session API that runs one player turn end to end
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use textgen::GeneratorConfig;
//! use world_core::{GameSession, MemoryStore, RunSetup, ThreadRoller};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::load_json("worlds.json").await?);
//!     let narrator = GeneratorConfig::from_env()?.build()?;
//!     let session = GameSession::new(store, narrator, Arc::new(ThreadRoller));
//!
//!     let run = session.start_run(RunSetup::new(
//!         "user-1".into(), "vex".into(), "emberfall".into(), "Recover the relic",
//!     )).await?;
//!
//!     let turn = session.take_turn(&run.id, "walk north to the market").await?;
//!     println!("{}", turn.narrative);
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod checkpoint;
pub mod dice;
pub mod engine;
pub mod movement;
pub mod persist;
pub mod prompt;
pub mod quest;
pub mod session;
pub mod store;
pub mod testing;
pub mod text;
pub mod tracker;
pub mod world;

// Primary public API
pub use action::{classify_action, ActionAnalysis, ActionAnalyzer, ActionType};
pub use checkpoint::{CheckpointContext, Detection};
pub use dice::{AbilityCheck, DiceRoller, ScriptedRolls, SeededRoller, SuccessLevel, ThreadRoller};
pub use engine::{ActionResult, GameEngine, WorldContext};
pub use movement::{GridMap, GridMovementSystem, MovementIntent, MovementOutcome, PathResult};
pub use session::{GameSession, RunSetup, SessionConfig, SessionError, TurnOutcome};
pub use store::{MemoryStore, StoreError, WorldSnapshot, WorldStore};
pub use testing::{MockGenerator, MockResponse, SampleWorld, TestHarness};
pub use tracker::WorldStateTracker;
