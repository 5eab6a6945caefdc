//! End-to-end turn tests against the sample world with a mock narrator.

use std::time::Duration;
use world_core::movement::MatchRule;
use world_core::testing::{assert_at_grid, assert_checkpoints_completed, MockResponse};
use world_core::world::{CheckpointId, NpcId, RunId, RunStatus};
use world_core::{ActionType, SessionConfig, SessionError, TestHarness, WorldStore};

// ============================================================================
// Quest flow
// ============================================================================

#[tokio::test]
async fn test_attack_completes_guard_checkpoint_on_partial_success() {
    // combat 8 gives +3, so a 9 totals exactly DC 12
    let harness = TestHarness::new([9]).await.unwrap();
    harness.expect_narrative("Bren staggers back and waves you through.");

    let turn = harness.act("attack the guard").await.unwrap();

    assert_eq!(turn.analysis.action_type, ActionType::Combat);
    let check = turn.action.check.expect("combat should roll");
    assert_eq!(check.modifier, 3);
    assert_eq!(check.total, 12);
    assert!(turn.action.success);
    assert_eq!(turn.checkpoints_completed, vec![CheckpointId::from("cp-guard")]);
    assert!(!turn.quest_complete);
    assert_checkpoints_completed(&harness, 1);
    assert_eq!(turn.narrative, "Bren staggers back and waves you through.");
}

#[tokio::test]
async fn test_failed_attack_leaves_checkpoint_pending() {
    let harness = TestHarness::new([8]).await.unwrap();

    let turn = harness.act("attack the guard").await.unwrap();

    assert!(!turn.action.success);
    assert!(turn.checkpoints_completed.is_empty());
    let detection = turn.checkpoint.unwrap();
    assert!(!detection.completed);
    assert!(detection.reason.contains("failed"));
    assert_checkpoints_completed(&harness, 0);
}

#[tokio::test]
async fn test_wrong_grid_reports_location_reason() {
    let harness = TestHarness::new([20]).await.unwrap();

    let moved = harness.act("walk north").await.unwrap();
    assert_eq!(moved.movement.unwrap().intent.matched_by, MatchRule::Direction);
    assert_at_grid(&harness, &harness.sample.market);

    let turn = harness.act("attack the merchant").await.unwrap();
    let detection = turn.checkpoint.unwrap();
    assert!(!detection.completed);
    assert!(detection.reason.contains("need to go to the specified location"));
    assert_checkpoints_completed(&harness, 0);
}

#[tokio::test]
async fn test_full_quest_completes_run() {
    let harness = TestHarness::new([15]).await.unwrap();

    let first = harness.act("attack the guard").await.unwrap();
    assert_eq!(first.checkpoints_completed.len(), 1);

    let walk = harness.act("walk to the Temple Interior").await.unwrap();
    let movement = walk.movement.expect("should move");
    assert!(!movement.intent.is_direct);
    assert_eq!(
        movement.intent.path_names,
        vec!["Market Plaza", "Temple Entrance", "Temple Interior"]
    );
    assert!(movement.outcome.first_visit);
    assert_at_grid(&harness, &harness.sample.temple_interior);

    let talk = harness.act("talk to Mira about the relic").await.unwrap();
    assert_eq!(talk.analysis.action_type, ActionType::Dialogue);
    assert_eq!(talk.checkpoints_completed, vec![CheckpointId::from("cp-mira")]);
    assert!(talk.quest_complete);
    assert_eq!(talk.run_status, RunStatus::Completed);
    assert_checkpoints_completed(&harness, 2);

    let after = harness.act("look around").await;
    assert!(matches!(after, Err(SessionError::Validation(_))));
}

#[tokio::test]
async fn test_checkpoints_cannot_complete_out_of_order() {
    let harness = TestHarness::new([15]).await.unwrap();

    harness.act("walk to the Temple Interior").await.unwrap();
    let turn = harness.act("talk to Mira").await.unwrap();

    let detection = turn.checkpoint.unwrap();
    assert_eq!(detection.checkpoint_id, CheckpointId::from("cp-guard"));
    assert!(!detection.completed);
    assert_checkpoints_completed(&harness, 0);
}

// ============================================================================
// Movement and world state
// ============================================================================

#[tokio::test]
async fn test_first_and_repeat_visits() {
    let harness = TestHarness::new([10]).await.unwrap();

    harness.act("go north").await.unwrap();
    let back = harness.act("go south").await.unwrap();
    let outcome = back.movement.unwrap().outcome;
    assert_eq!(outcome.grid_id, harness.sample.gatehouse);
    assert!(!outcome.first_visit);
    assert_eq!(outcome.description, "A squat stone gatehouse at the town's edge.");
}

#[tokio::test]
async fn test_looking_toward_a_place_does_not_move() {
    let harness = TestHarness::new([10]).await.unwrap();

    let turn = harness.act("look up at the temple").await.unwrap();
    assert!(turn.movement.is_none());
    assert_at_grid(&harness, &harness.sample.gatehouse);

    let turn = harness.act("look inside the temple").await.unwrap();
    assert!(turn.movement.is_none());

    let turn = harness.act("ask the captain about the temple interior").await.unwrap();
    assert!(turn.movement.is_none());
    assert_at_grid(&harness, &harness.sample.gatehouse);
    assert!(!harness.progress().has_discovered_grid(&harness.sample.temple_entrance));
}

#[tokio::test]
async fn test_entering_new_location_discovers_it() {
    let harness = TestHarness::new([10]).await.unwrap();
    let mystery_before = harness
        .store
        .world(&harness.sample.world_id)
        .unwrap()
        .meters
        .mystery;

    let turn = harness.act("head west into the woods").await.unwrap();
    let outcome = turn.movement.unwrap().outcome;
    assert_eq!(outcome.new_location, Some(harness.sample.woods.clone()));

    let progress = harness.progress();
    assert!(progress.discovered_locations.contains(&harness.sample.woods));
    let world = harness.store.world(&harness.sample.world_id).unwrap();
    assert_eq!(world.meters.mystery, mystery_before + 1);
    let woods = harness
        .store
        .locations(&harness.sample.world_id)
        .unwrap()
        .into_iter()
        .find(|l| l.id == harness.sample.woods)
        .unwrap();
    assert!(woods.discovered);
}

#[tokio::test]
async fn test_dialogue_and_combat_change_reputation() {
    let harness = TestHarness::new([10]).await.unwrap();
    let bren = NpcId::from("npc-bren");

    harness.act("talk to Captain Bren").await.unwrap();
    assert_eq!(harness.progress().reputation_with(&bren), 1);
    assert!(harness.progress().visited_npcs.contains(&bren));

    harness.act("attack Captain Bren").await.unwrap();
    assert_eq!(harness.progress().reputation_with(&bren), -1);
}

#[tokio::test]
async fn test_direct_movement_respects_hop_limit() {
    let harness = TestHarness::with_config([10], SessionConfig::new().with_max_path_depth(1))
        .await
        .unwrap();

    let far = harness
        .session
        .execute_movement(
            &harness.sample.user_id,
            &harness.sample.world_id,
            &harness.sample.temple_interior,
        )
        .await;
    assert!(matches!(far, Err(SessionError::Validation(_))));

    let near = harness
        .session
        .execute_movement(
            &harness.sample.user_id,
            &harness.sample.world_id,
            &harness.sample.market,
        )
        .await
        .unwrap();
    assert!(near.first_visit);

    let missing = harness
        .session
        .execute_movement(
            &harness.sample.user_id,
            &harness.sample.world_id,
            &"nowhere".into(),
        )
        .await;
    assert!(matches!(missing, Err(SessionError::NotFound { kind: "Grid", .. })));
}

// ============================================================================
// Narrator context
// ============================================================================

#[tokio::test]
async fn test_context_only_reveals_current_grid() {
    let harness = TestHarness::new([10]).await.unwrap();

    harness.act("look around").await.unwrap();
    let request = harness.generator.last_request().unwrap();
    let system = request.system.unwrap();

    assert!(system.contains("Captain Bren"));
    assert!(system.contains("watching the road"));
    assert!(!system.contains("Mira"));
    assert!(!system.contains("Shrine Relic"));
    assert!(!system.contains("Old Hermit"));
    assert!(!system.contains("Ashen Woods"));
    assert!(!system.contains("Notice Board"));
}

#[tokio::test]
async fn test_continuation_token_is_carried() {
    let harness = TestHarness::new([10]).await.unwrap();

    harness.act("look around").await.unwrap();
    let token = harness.stored_run().unwrap().continuation.expect("token saved");

    harness.act("look around again").await.unwrap();
    let request = harness.generator.last_request().unwrap();
    assert_eq!(request.continuation, Some(token));
}

// ============================================================================
// Degraded narrator
// ============================================================================

#[tokio::test]
async fn test_generator_failure_uses_fallback() {
    let harness = TestHarness::new([10]).await.unwrap();
    harness.expect_failure();

    let turn = harness.act("walk north").await.unwrap();

    assert!(turn.used_fallback);
    assert!(turn.narrative.starts_with("Stalls crowd a cobbled square."));
    let turns = harness.store.turns(&harness.run.id).unwrap();
    assert_eq!(turns.len(), 1);
    assert!(turns[0].used_fallback);
    assert_eq!(turns[0].narrative, turn.narrative);
}

#[tokio::test]
async fn test_generator_timeout_uses_fallback() {
    let config = SessionConfig::new().with_generator_timeout(Duration::from_millis(50));
    let harness = TestHarness::with_config([10], config).await.unwrap();
    harness
        .generator
        .queue(MockResponse::delayed(Duration::from_secs(5), "too late"));

    let turn = harness.act("look around").await.unwrap();

    assert!(turn.used_fallback);
    assert_ne!(turn.narrative, "too late");
    assert!(!turn.narrative.is_empty());
}

// ============================================================================
// Validation and concurrency
// ============================================================================

#[tokio::test]
async fn test_rejects_bad_input() {
    let harness = TestHarness::with_config([10], SessionConfig::new().with_max_action_chars(20))
        .await
        .unwrap();

    assert!(matches!(harness.act("   ").await, Err(SessionError::Validation(_))));
    assert!(matches!(
        harness.act("this action is much too long to accept").await,
        Err(SessionError::Validation(_))
    ));
    assert!(matches!(
        harness.session.take_turn(&RunId::from("missing"), "look").await,
        Err(SessionError::NotFound { kind: "Run", .. })
    ));

    // Nothing was recorded for rejected turns.
    assert!(harness.store.turns(&harness.run.id).unwrap().is_empty());
    assert_eq!(harness.stored_run().unwrap().turn, 0);
}

#[tokio::test]
async fn test_dead_character_cannot_act() {
    let harness = TestHarness::new([10]).await.unwrap();
    let mut character = harness.store.character(&harness.sample.character_id).unwrap();
    character.alive = false;
    harness.store.save_character(character).unwrap();

    assert!(matches!(
        harness.act("look around").await,
        Err(SessionError::Validation(_))
    ));
}

#[tokio::test]
async fn test_concurrent_turns_are_serialized() {
    let harness = TestHarness::new([10]).await.unwrap();

    let (a, b) = tokio::join!(harness.act("go north"), harness.act("talk to Captain Bren"));
    let (a, b) = (a.unwrap(), b.unwrap());

    let mut turns = vec![a.turn, b.turn];
    turns.sort();
    assert_eq!(turns, vec![1, 2]);
    assert_eq!(harness.stored_run().unwrap().turn, 2);
    assert_eq!(harness.store.turns(&harness.run.id).unwrap().len(), 2);
}
