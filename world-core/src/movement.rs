//! Grid movement: pathfinding and movement-intent detection.
//!
//! Intent detection is a best-effort rule matcher over place names and
//! direction words, not a language model. Ambiguous names and partial
//! words can produce both misses and false matches.

use crate::text::{core_name, Normalized};
use crate::world::{Connection, Grid, GridId, LocationId, PlayerWorldProgress};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Default hop limit for multi-hop routes.
pub const DEFAULT_MAX_DEPTH: usize = 3;

/// Errors from executing movement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MovementError {
    #[error("Grid not found: {0}")]
    UnknownGrid(GridId),
}

/// Words that signal the player wants to move.
const MOVE_KEYWORDS: &[&str] = &[
    "go", "walk", "move", "head", "travel", "enter", "run", "climb", "proceed", "return",
    "leave", "exit", "step", "cross", "follow the path", "make my way",
    "前往", "去", "走", "进入", "离开", "回到",
];

/// Words that signal leaving the current grid.
const EXIT_KEYWORDS: &[&str] = &[
    "exit", "leave", "go out", "get out", "step out", "head out", "离开", "出去", "走出",
];

/// Connection labels that mean "the way out".
const EXIT_DIRECTIONS: &[&str] = &["out", "outside", "exit", "外", "出口"];

/// Canonical directions and the words that name them.
const DIRECTIONS: &[(&str, &[&str])] = &[
    ("north", &["north", "northward", "northwards", "北方", "北边", "向北", "往北"]),
    ("south", &["south", "southward", "southwards", "南方", "南边", "向南", "往南"]),
    ("east", &["east", "eastward", "eastwards", "东方", "东边", "向东", "往东"]),
    ("west", &["west", "westward", "westwards", "西方", "西边", "向西", "往西"]),
    ("northeast", &["northeast", "东北"]),
    ("northwest", &["northwest", "西北"]),
    ("southeast", &["southeast", "东南"]),
    ("southwest", &["southwest", "西南"]),
    ("up", &["up", "upstairs", "upward", "楼上", "向上"]),
    ("down", &["down", "downstairs", "downward", "楼下", "向下"]),
    ("inside", &["inside", "inward", "里面"]),
    ("outside", &["outside", "外面"]),
];

/// All grids of a world, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct GridMap {
    grids: HashMap<GridId, Grid>,
}

impl GridMap {
    pub fn new(grids: impl IntoIterator<Item = Grid>) -> Self {
        Self {
            grids: grids.into_iter().map(|g| (g.id.clone(), g)).collect(),
        }
    }

    pub fn insert(&mut self, grid: Grid) {
        self.grids.insert(grid.id.clone(), grid);
    }

    pub fn get(&self, id: &GridId) -> Option<&Grid> {
        self.grids.get(id)
    }

    pub fn contains(&self, id: &GridId) -> bool {
        self.grids.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Grid> {
        self.grids.values()
    }

    /// Grids of one location, sorted by id for stable matching.
    pub fn in_location(&self, location_id: &LocationId) -> Vec<&Grid> {
        let mut grids: Vec<&Grid> = self
            .grids
            .values()
            .filter(|g| &g.location_id == location_id)
            .collect();
        grids.sort_by(|a, b| a.id.cmp(&b.id));
        grids
    }

    /// Connections whose target grid does not exist.
    pub fn broken_connections(&self) -> Vec<(GridId, GridId)> {
        let mut broken: Vec<(GridId, GridId)> = self
            .grids
            .values()
            .flat_map(|g| {
                g.connections
                    .iter()
                    .filter(|c| !self.contains(&c.target_grid_id))
                    .map(|c| (g.id.clone(), c.target_grid_id.clone()))
            })
            .collect();
        broken.sort();
        broken
    }
}

/// Result of a path search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub found: bool,
    /// Grids to walk through, excluding the start and including the target.
    pub path: Vec<GridId>,
    pub names: Vec<String>,
}

impl PathResult {
    fn not_found() -> Self {
        Self {
            found: false,
            path: Vec::new(),
            names: Vec::new(),
        }
    }
}

/// Which rule produced a movement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Direction,
    TargetName,
    FuzzyName,
    Exit,
    Pathfinding,
}

/// A detected wish to move somewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementIntent {
    pub target_grid_id: GridId,
    pub target_name: String,
    pub direction: Option<String>,
    /// True for a single hop along a direct connection.
    pub is_direct: bool,
    /// Full route for indirect moves (empty when direct).
    pub path: Vec<GridId>,
    pub path_names: Vec<String>,
    pub matched_by: MatchRule,
}

/// What happened when the player moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub grid_id: GridId,
    pub grid_name: String,
    pub location_id: LocationId,
    pub first_visit: bool,
    pub description: String,
    /// Set when this move entered a location for the first time.
    pub new_location: Option<LocationId>,
}

/// Movement over a [`GridMap`].
#[derive(Debug, Clone, Copy)]
pub struct GridMovementSystem<'a> {
    map: &'a GridMap,
    max_depth: usize,
}

impl<'a> GridMovementSystem<'a> {
    pub fn new(map: &'a GridMap) -> Self {
        Self {
            map,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Hop limit used when broadening intent detection.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Shortest route from `start` to `target` within `max_depth` hops.
    ///
    /// Breadth-first, so the first path found has the fewest edges. A target
    /// that is only reachable by a longer route is reported as not found.
    /// Connections to missing grids are skipped.
    pub fn find_path(&self, start: &GridId, target: &GridId, max_depth: usize) -> PathResult {
        if start == target {
            return PathResult {
                found: true,
                path: Vec::new(),
                names: Vec::new(),
            };
        }
        if !self.map.contains(start) {
            return PathResult::not_found();
        }

        let mut visited: HashSet<GridId> = HashSet::new();
        let mut parent: HashMap<GridId, GridId> = HashMap::new();
        let mut queue: VecDeque<(GridId, usize)> = VecDeque::new();
        visited.insert(start.clone());
        queue.push_back((start.clone(), 0));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(grid) = self.map.get(&current) else {
                continue;
            };

            for connection in &grid.connections {
                let next = &connection.target_grid_id;
                if !self.map.contains(next) {
                    tracing::warn!(from = %current, to = %next, "skipping connection to missing grid");
                    continue;
                }
                if !visited.insert(next.clone()) {
                    continue;
                }
                parent.insert(next.clone(), current.clone());
                if next == target {
                    return self.reconstruct(start, target, &parent);
                }
                queue.push_back((next.clone(), depth + 1));
            }
        }

        PathResult::not_found()
    }

    fn reconstruct(
        &self,
        start: &GridId,
        target: &GridId,
        parent: &HashMap<GridId, GridId>,
    ) -> PathResult {
        let mut path = vec![target.clone()];
        let mut cursor = target;
        while let Some(prev) = parent.get(cursor) {
            if prev == start {
                break;
            }
            path.push(prev.clone());
            cursor = prev;
        }
        path.reverse();

        let names = path
            .iter()
            .map(|id| self.map.get(id).map(|g| g.name.clone()).unwrap_or_default())
            .collect();
        PathResult {
            found: true,
            path,
            names,
        }
    }

    /// Detect where, if anywhere, the player is trying to go.
    ///
    /// Rules on direct connections are tried first: direction words, a
    /// target's full name, a target's core name with generic words
    /// stripped, and an exit phrase. Only then is the search broadened to
    /// every grid of the same location (reached through [`find_path`]),
    /// by full name and then by core name.
    ///
    /// Text with a direction word but no movement verb ("look up") only
    /// matches a connection in that direction.
    ///
    /// [`find_path`]: GridMovementSystem::find_path
    pub fn detect_movement_intent(&self, text: &str, current: &GridId) -> Option<MovementIntent> {
        let grid = self.map.get(current)?;
        let text = Normalized::new(text);

        let wants_to_move = text.contains_any(MOVE_KEYWORDS);
        let mentions_direction = DIRECTIONS
            .iter()
            .any(|(_, words)| text.contains_any(words));
        if !wants_to_move && !mentions_direction {
            return None;
        }

        let connections: Vec<&Connection> = grid
            .connections
            .iter()
            .filter(|c| {
                let exists = self.map.contains(&c.target_grid_id);
                if !exists {
                    tracing::warn!(from = %grid.id, to = %c.target_grid_id, "ignoring connection to missing grid");
                }
                exists
            })
            .collect();

        if let Some(conn) = connections
            .iter()
            .find(|c| direction_mentioned(&text, &c.direction))
        {
            return Some(self.direct(conn, MatchRule::Direction));
        }

        if !wants_to_move {
            return None;
        }

        if let Some(conn) = connections
            .iter()
            .find(|c| text.contains_keyword(&self.target_name(c)))
        {
            return Some(self.direct(conn, MatchRule::TargetName));
        }

        if let Some(conn) = connections.iter().find(|c| {
            let core = core_name(&self.target_name(c));
            core.chars().count() >= 2 && text.contains_keyword(&core)
        }) {
            return Some(self.direct(conn, MatchRule::FuzzyName));
        }

        if text.contains_any(EXIT_KEYWORDS) {
            let here = core_name(&grid.name);
            let leaving_here = text.contains_keyword(&here) || text.only_words_from(EXIT_KEYWORDS);
            if leaving_here || connections.len() == 1 {
                let way_out = connections
                    .iter()
                    .find(|c| is_exit_direction(&c.direction))
                    .or_else(|| {
                        connections
                            .iter()
                            .find(|c| core_name(&self.target_name(c)) != here)
                    })
                    .or_else(|| connections.first());
                if let Some(conn) = way_out {
                    return Some(self.direct(conn, MatchRule::Exit));
                }
            }
        }

        let others: Vec<&Grid> = self
            .map
            .in_location(&grid.location_id)
            .into_iter()
            .filter(|g| g.id != grid.id)
            .collect();

        let named = others.iter().copied().filter(|g| text.contains_keyword(&g.name));
        if let Some(intent) = self.route_to_first(grid, named) {
            return Some(intent);
        }

        let fuzzy = others.iter().copied().filter(|g| {
            let core = core_name(&g.name);
            core.chars().count() >= 2 && text.contains_keyword(&core)
        });
        self.route_to_first(grid, fuzzy)
    }

    /// Route to the first reachable candidate within the hop limit.
    fn route_to_first<'g>(
        &self,
        from: &Grid,
        candidates: impl Iterator<Item = &'g Grid>,
    ) -> Option<MovementIntent> {
        for candidate in candidates {
            let route = self.find_path(&from.id, &candidate.id, self.max_depth);
            if route.found {
                tracing::debug!(from = %from.id, to = %candidate.id, hops = route.path.len(), "multi-hop movement");
                return Some(MovementIntent {
                    target_grid_id: candidate.id.clone(),
                    target_name: candidate.name.clone(),
                    direction: None,
                    is_direct: route.path.len() == 1,
                    path: route.path,
                    path_names: route.names,
                    matched_by: MatchRule::Pathfinding,
                });
            }
        }
        None
    }

    fn target_name(&self, connection: &Connection) -> String {
        if connection.target_name.is_empty() {
            self.map
                .get(&connection.target_grid_id)
                .map(|g| g.name.clone())
                .unwrap_or_default()
        } else {
            connection.target_name.clone()
        }
    }

    fn direct(&self, connection: &Connection, matched_by: MatchRule) -> MovementIntent {
        MovementIntent {
            target_grid_id: connection.target_grid_id.clone(),
            target_name: self.target_name(connection),
            direction: Some(connection.direction.clone()),
            is_direct: true,
            path: Vec::new(),
            path_names: Vec::new(),
            matched_by,
        }
    }

    /// Move the player to `grid_id` and record the visit.
    ///
    /// First visits are decided by membership in the discovered-grid set and
    /// get the grid's first-visit description.
    pub fn execute_movement(
        &self,
        progress: &mut PlayerWorldProgress,
        grid_id: &GridId,
    ) -> Result<MovementOutcome, MovementError> {
        let grid = self
            .map
            .get(grid_id)
            .ok_or_else(|| MovementError::UnknownGrid(grid_id.clone()))?;

        let first_visit = !progress.has_discovered_grid(grid_id);
        let new_location = progress
            .discovered_locations
            .insert(grid.location_id.clone())
            .then(|| grid.location_id.clone());

        progress.current_grid = Some(grid.id.clone());
        progress.current_location = Some(grid.location_id.clone());
        progress.discovered_grids.insert(grid.id.clone());

        tracing::info!(
            user = %progress.user_id,
            grid = %grid.id,
            first_visit,
            "player moved"
        );

        Ok(MovementOutcome {
            grid_id: grid.id.clone(),
            grid_name: grid.name.clone(),
            location_id: grid.location_id.clone(),
            first_visit,
            description: grid.arrival_description(first_visit).to_string(),
            new_location,
        })
    }
}

fn direction_mentioned(text: &Normalized, label: &str) -> bool {
    let label_norm = Normalized::new(label);
    if label_norm.is_empty() {
        return false;
    }
    let canonical = DIRECTIONS.iter().find(|(name, words)| {
        label_norm.as_str() == *name || words.iter().any(|w| Normalized::new(w) == label_norm)
    });
    match canonical {
        Some((_, words)) => text.contains_any(words),
        None => text.contains_keyword(label),
    }
}

fn is_exit_direction(label: &str) -> bool {
    let label = Normalized::new(label);
    EXIT_DIRECTIONS.iter().any(|d| label.as_str() == *d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{LocationId, UserId, WorldId};

    fn grid(id: &str, location: &str, name: &str) -> Grid {
        Grid::new(LocationId::from(location), name)
            .with_id(id)
            .with_description(format!("{name}."))
    }

    fn link(g: Grid, direction: &str, target: &str, name: &str) -> Grid {
        g.connect(Connection::new(direction, GridId::from(target), name))
    }

    /// a <-> b <-> c <-> d, plus a broken edge from b.
    fn corridor() -> GridMap {
        GridMap::new([
            link(grid("a", "town", "Gatehouse"), "north", "b", "Market Plaza"),
            link(
                link(
                    link(grid("b", "town", "Market Plaza"), "south", "a", "Gatehouse"),
                    "north",
                    "c",
                    "Temple Entrance",
                ),
                "east",
                "missing",
                "Collapsed Alley",
            ),
            link(
                link(grid("c", "town", "Temple Entrance"), "south", "b", "Market Plaza"),
                "inside",
                "d",
                "Temple Interior",
            ),
            link(grid("d", "town", "Temple Interior"), "out", "c", "Temple Entrance"),
        ])
    }

    #[test]
    fn test_find_path_reflexive() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let result = system.find_path(&GridId::from("a"), &GridId::from("a"), 3);
        assert!(result.found);
        assert!(result.path.is_empty());
        assert!(result.names.is_empty());
    }

    #[test]
    fn test_find_path_two_hops() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let result = system.find_path(&GridId::from("a"), &GridId::from("c"), 3);
        assert!(result.found);
        assert_eq!(result.path, vec![GridId::from("b"), GridId::from("c")]);
        assert_eq!(result.names, vec!["Market Plaza", "Temple Entrance"]);
    }

    #[test]
    fn test_find_path_respects_depth_limit() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let result = system.find_path(&GridId::from("a"), &GridId::from("d"), 2);
        assert!(!result.found);

        let result = system.find_path(&GridId::from("a"), &GridId::from("d"), 3);
        assert!(result.found);
        assert_eq!(result.path.len(), 3);
    }

    #[test]
    fn test_find_path_skips_broken_edges() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let result = system.find_path(&GridId::from("b"), &GridId::from("missing"), 3);
        assert!(!result.found);
        assert_eq!(
            map.broken_connections(),
            vec![(GridId::from("b"), GridId::from("missing"))]
        );
    }

    #[test]
    fn test_direction_intent() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let intent = system
            .detect_movement_intent("I walk north", &GridId::from("a"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("b"));
        assert!(intent.is_direct);
        assert_eq!(intent.matched_by, MatchRule::Direction);

        let intent = system
            .detect_movement_intent("north", &GridId::from("a"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("b"));
    }

    #[test]
    fn test_target_name_intent() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let intent = system
            .detect_movement_intent("head to the Temple Entrance", &GridId::from("b"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("c"));
        assert_eq!(intent.matched_by, MatchRule::TargetName);
    }

    #[test]
    fn test_fuzzy_intent() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let intent = system
            .detect_movement_intent("go to the market", &GridId::from("a"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("b"));
        assert_eq!(intent.matched_by, MatchRule::FuzzyName);
    }

    #[test]
    fn test_exit_intent() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let intent = system
            .detect_movement_intent("leave", &GridId::from("d"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("c"));
        assert_eq!(intent.matched_by, MatchRule::Exit);
    }

    #[test]
    fn test_multi_hop_intent() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let intent = system
            .detect_movement_intent("walk to the Temple Interior", &GridId::from("a"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("d"));
        assert!(!intent.is_direct);
        assert_eq!(
            intent.path,
            vec![GridId::from("b"), GridId::from("c"), GridId::from("d")]
        );
        assert_eq!(
            intent.path_names,
            vec!["Market Plaza", "Temple Entrance", "Temple Interior"]
        );
        assert_eq!(intent.matched_by, MatchRule::Pathfinding);
    }

    #[test]
    fn test_neighbour_rules_run_before_broadening() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        // "temple" fuzzily names the neighbouring entrance
        let intent = system
            .detect_movement_intent("walk to the Temple Interior", &GridId::from("b"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("c"));
        assert!(intent.is_direct);
        assert_eq!(intent.matched_by, MatchRule::FuzzyName);
    }

    #[test]
    fn test_direction_without_movement_verb() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        assert!(system
            .detect_movement_intent("look up at the temple", &GridId::from("a"))
            .is_none());
        assert!(system
            .detect_movement_intent("look inside the temple", &GridId::from("b"))
            .is_none());

        // A matching connection still counts.
        let intent = system
            .detect_movement_intent("peer inside", &GridId::from("c"))
            .unwrap();
        assert_eq!(intent.target_grid_id, GridId::from("d"));
        assert_eq!(intent.matched_by, MatchRule::Direction);
    }

    #[test]
    fn test_no_intent_without_movement_words() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        assert!(system
            .detect_movement_intent("admire the market plaza", &GridId::from("a"))
            .is_none());
        assert!(system
            .detect_movement_intent("tell me about the temple interior", &GridId::from("a"))
            .is_none());
        assert!(system
            .detect_movement_intent("go north", &GridId::from("unknown"))
            .is_none());
    }

    #[test]
    fn test_execute_movement_first_visit() {
        let map = GridMap::new([grid("a", "town", "Gatehouse")
            .with_first_visit("You arrive at the gatehouse for the first time.")]);
        let system = GridMovementSystem::new(&map);
        let mut progress = PlayerWorldProgress::new(UserId::from("u"), WorldId::from("w"));

        let first = system
            .execute_movement(&mut progress, &GridId::from("a"))
            .unwrap();
        assert!(first.first_visit);
        assert_eq!(first.new_location, Some(LocationId::from("town")));
        assert!(first.description.contains("first time"));
        assert_eq!(progress.current_grid, Some(GridId::from("a")));
        assert_eq!(progress.current_location, Some(LocationId::from("town")));

        let second = system
            .execute_movement(&mut progress, &GridId::from("a"))
            .unwrap();
        assert!(!second.first_visit);
        assert_eq!(second.new_location, None);
        assert_eq!(second.description, "Gatehouse.");
    }

    #[test]
    fn test_execute_movement_unknown_grid() {
        let map = corridor();
        let system = GridMovementSystem::new(&map);
        let mut progress = PlayerWorldProgress::new(UserId::from("u"), WorldId::from("w"));
        assert_eq!(
            system.execute_movement(&mut progress, &GridId::from("nowhere")),
            Err(MovementError::UnknownGrid(GridId::from("nowhere")))
        );
        assert!(progress.current_grid.is_none());
    }
}
