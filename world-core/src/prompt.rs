//! Prompt construction for the narrator.

use crate::checkpoint::Detection;
use crate::engine::{ActionResult, WorldContext};
use crate::movement::MovementOutcome;

/// What happened mechanically this turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnFacts<'a> {
    pub action: &'a ActionResult,
    pub movement: Option<&'a MovementOutcome>,
    pub completed: &'a [Detection],
    pub quest_complete: bool,
}

/// System prompt: fixed narrator rules followed by the world context.
pub fn build_system_prompt(context: &WorldContext, custom: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/narrator_base.txt"));

    if let Some(custom) = custom {
        prompt.push_str("\n## Additional Instructions\n");
        prompt.push_str(custom);
        prompt.push('\n');
    }

    prompt.push_str("\n## World: ");
    prompt.push_str(&context.world_name);
    prompt.push('\n');
    if !context.lore.is_empty() {
        prompt.push_str(&context.lore);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Stability {}/100, danger {}/100, mystery {}/100\n",
        context.meters.stability, context.meters.danger, context.meters.mystery
    ));

    prompt.push_str("\n## Player Character\n");
    prompt.push_str(&format!("**Name:** {}\n", context.character_name));
    prompt.push_str(&format!("**Mission:** {}\n", context.mission));
    prompt.push_str(&format!("**Turn:** {}\n", context.turn));

    if let Some(location) = &context.location {
        prompt.push_str("\n## Current Location: ");
        prompt.push_str(&location.name);
        prompt.push('\n');
        if !location.description.is_empty() {
            prompt.push_str(&location.description);
            prompt.push('\n');
        }
    }

    if let Some(grid) = &context.grid {
        prompt.push_str("\n## Surroundings: ");
        prompt.push_str(&grid.name);
        prompt.push('\n');
        prompt.push_str(&grid.description);
        prompt.push('\n');
        if !grid.atmosphere.is_empty() {
            prompt.push_str(&format!("Atmosphere: {}\n", grid.atmosphere));
        }

        if !grid.exits.is_empty() {
            prompt.push_str("\nExits:\n");
            for exit in &grid.exits {
                prompt.push_str(&format!("- {}: {}\n", exit.direction, exit.name));
            }
        }

        if !grid.objects.is_empty() {
            prompt.push_str("\nObjects:\n");
            for object in &grid.objects {
                if object.description.is_empty() {
                    prompt.push_str(&format!("- {}\n", object.name));
                } else {
                    prompt.push_str(&format!("- {}: {}\n", object.name, object.description));
                }
            }
        }

        if !grid.npcs.is_empty() {
            prompt.push_str("\nPeople here:\n");
            for npc in &grid.npcs {
                prompt.push_str(&format!("- {}", npc.name));
                if let Some(activity) = &npc.activity {
                    prompt.push_str(&format!(", {activity}"));
                }
                if let Some(position) = &npc.position {
                    prompt.push_str(&format!(" ({position})"));
                }
                prompt.push_str(&format!(" [attitude {:+}]", npc.reputation));
                if !npc.description.is_empty() {
                    prompt.push_str(&format!(": {}", npc.description));
                }
                prompt.push('\n');
            }
        }
    }

    if let Some(quest) = &context.quest {
        prompt.push_str("\n## Quest: ");
        prompt.push_str(&quest.name);
        prompt.push('\n');
        prompt.push_str(&format!(
            "Progress: {}/{} objectives ({:.0}%)\n",
            quest.completed,
            quest.total,
            quest.completion_ratio * 100.0
        ));
        match &quest.next_checkpoint {
            Some(next) => prompt.push_str(&format!("Current objective: {next}\n")),
            None => prompt.push_str("All objectives are complete.\n"),
        }
    }

    if !context.discovered_locations.is_empty() {
        prompt.push_str("\n## Known Places\n");
        prompt.push_str(&context.discovered_locations.join(", "));
        prompt.push('\n');
    }

    if !context.recent_events.is_empty() {
        prompt.push_str("\n## Recent Events\n");
        for event in &context.recent_events {
            prompt.push_str(&format!("- {event}\n"));
        }
    }

    prompt
}

/// The per-turn user message: the player's words plus resolved facts.
pub fn build_turn_prompt(player_text: &str, facts: &TurnFacts<'_>) -> String {
    let mut prompt = format!("The player says: \"{}\"\n\n## Resolved This Turn\n", player_text.trim());

    if let Some(movement) = facts.movement {
        prompt.push_str(&format!("- Moved to {}", movement.grid_name));
        if movement.first_visit {
            prompt.push_str(" (first visit)");
        }
        prompt.push_str(&format!(". Arrival: {}\n", movement.description));
    }

    prompt.push_str(&format!("- Outcome: {}\n", facts.action.narrative_hint));

    for detection in facts.completed {
        prompt.push_str(&format!("- Objective completed: {}\n", detection.reason));
    }
    if facts.quest_complete {
        prompt.push_str("- The quest is complete. Bring this chapter to a satisfying close.\n");
    }

    prompt
}

/// Narrative used when the text generator is unavailable.
///
/// Built only from resolved facts, so it is deterministic.
pub fn default_narrative(context: &WorldContext, facts: &TurnFacts<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    match facts.movement {
        Some(movement) if !movement.description.is_empty() => parts.push(movement.description.clone()),
        Some(movement) => parts.push(format!("You arrive at {}.", movement.grid_name)),
        None => {}
    }

    if facts.action.requires_check || facts.movement.is_none() {
        parts.push(facts.action.narrative_hint.clone());
    }

    for detection in facts.completed {
        parts.push(format!("Objective complete: {}.", detection.reason.trim_end_matches('.')));
    }

    if facts.quest_complete {
        parts.push("Your quest is complete.".to_string());
    } else if let Some(next) = context.quest.as_ref().and_then(|q| q.next_checkpoint.as_ref()) {
        parts.push(format!("Your objective: {next}"));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GridContext, NpcContext, QuestContext};
    use crate::world::{CheckpointId, GridId, LocationId, Meters};

    fn context() -> WorldContext {
        WorldContext {
            world_name: "Ashfall".to_string(),
            lore: "A land of cinders.".to_string(),
            meters: Meters::default(),
            mission: "Find the relic".to_string(),
            turn: 3,
            character_name: "Vex".to_string(),
            location: None,
            grid: Some(GridContext {
                name: "Docks".to_string(),
                description: "Wet planks.".to_string(),
                atmosphere: "Gulls cry.".to_string(),
                exits: Vec::new(),
                objects: Vec::new(),
                npcs: vec![NpcContext {
                    name: "Harbormaster".to_string(),
                    description: String::new(),
                    activity: Some("counting crates".to_string()),
                    position: None,
                    reputation: 2,
                }],
            }),
            quest: Some(QuestContext {
                name: "The Relic".to_string(),
                description: String::new(),
                next_checkpoint: Some("Speak to the harbormaster".to_string()),
                completed: 0,
                total: 2,
                completion_ratio: 0.0,
            }),
            discovered_locations: vec!["Harbor".to_string()],
            recent_events: Vec::new(),
        }
    }

    fn uncontested() -> ActionResult {
        ActionResult {
            requires_check: false,
            check_kind: None,
            dc: None,
            check: None,
            success: true,
            narrative_hint: "The action proceeds without resistance.".to_string(),
        }
    }

    #[test]
    fn test_system_prompt_sections() {
        let prompt = build_system_prompt(&context(), Some("Be brief."));
        assert!(prompt.contains("## World: Ashfall"));
        assert!(prompt.contains("Harbormaster, counting crates [attitude +2]"));
        assert!(prompt.contains("Current objective: Speak to the harbormaster"));
        assert!(prompt.contains("Be brief."));
    }

    #[test]
    fn test_default_narrative_is_deterministic() {
        let action = uncontested();
        let movement = MovementOutcome {
            grid_id: GridId::from("docks"),
            grid_name: "Docks".to_string(),
            location_id: LocationId::from("harbor"),
            first_visit: true,
            description: "Salt air fills your lungs.".to_string(),
            new_location: None,
        };
        let completed = vec![Detection {
            checkpoint_id: CheckpointId::from("cp1"),
            completed: true,
            reason: "Reach the docks".to_string(),
        }];
        let facts = TurnFacts {
            action: &action,
            movement: Some(&movement),
            completed: &completed,
            quest_complete: false,
        };

        let a = default_narrative(&context(), &facts);
        let b = default_narrative(&context(), &facts);
        assert_eq!(a, b);
        assert!(a.starts_with("Salt air fills your lungs."));
        assert!(a.contains("Objective complete: Reach the docks."));
    }

    #[test]
    fn test_turn_prompt_mentions_completion() {
        let action = uncontested();
        let facts = TurnFacts {
            action: &action,
            movement: None,
            completed: &[],
            quest_complete: true,
        };
        let prompt = build_turn_prompt("  look around ", &facts);
        assert!(prompt.starts_with("The player says: \"look around\""));
        assert!(prompt.contains("quest is complete"));
    }
}
