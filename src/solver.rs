use bevy::prelude::*;
use bevy::utils::Instant;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::components::{layer, GameConfig, InitialPose};
use crate::events::GameEventBus;
use crate::executor::Executor;
use crate::grid::{GridPos, Heading};
use crate::level::{Level, LevelQuery, TileKind};
use crate::queue::MinQueue;
use crate::search::{self, Action, HeuristicMode, SearchNode};
use crate::strategic;
use crate::tools::{self, ToolKind, ToolState};

/// Which planning strategy `StartBot` dispatches to. Both produce the
/// same `Plan` shape and replay through the same executor.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Strategy {
    BestFirst,
    Strategic,
}

/// Search tuning, tunable from the startup config file.
#[derive(Resource, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub strategy: Strategy,
    pub heuristic: HeuristicMode,
    pub distance_weight: f32,
    pub tools_weight: f32,
    pub direction_weight: f32,
    /// Cost of one tool reconfiguration.
    pub tool_cost: u32,
    /// Cost of advancing or jumping one step; keep well above `tool_cost`
    /// so cube moves stay the minimized resource.
    pub move_cost: u32,
    /// Wall-clock budget for a single solve, in seconds.
    pub timeout: f32,
    /// Nodes expanded per fixed tick before yielding back to the frame
    /// driver.
    pub expansions_per_tick: usize,
    /// Path length cap for the strategic enumeration.
    pub max_path_len: usize,
    /// Executor delay between applied actions, in seconds.
    pub action_delay: f32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::BestFirst,
            heuristic: HeuristicMode::DistanceAndTools,
            distance_weight: 10.0,
            tools_weight: 50.0,
            direction_weight: 20.0,
            tool_cost: 1,
            move_cost: 10,
            timeout: 5.0,
            expansions_per_tick: 1,
            max_path_len: 20,
            action_delay: 0.1,
        }
    }
}

/// A finished plan: the front-to-back action list plus the tool snapshot
/// it was planned against, kept so the executor can refuse a stale scene.
#[derive(Clone, Debug)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub initial_tools: Vec<ToolState>,
    pub expanded: usize,
}

impl Plan {
    pub fn tool_action_count(&self) -> usize {
        self.actions.iter().filter(|a| a.is_tool_action()).count()
    }
}

/// Terminal result of a solve. Failures are values, not errors; no
/// separate infeasibility proof exists, so an unreachable goal surfaces
/// as `Exhausted` or `Timeout`.
#[derive(Debug)]
pub enum SolveOutcome {
    Solved(Plan),
    Timeout,
    Exhausted,
}

/// Whether the cube may occupy a cell: ground present underneath and no
/// obstacle standing on it. Both checks ride the cast primitive.
pub(crate) fn cell_walkable(query: &impl LevelQuery, cell: GridPos, probe: f32) -> bool {
    let ts = query.tile_size();
    let pos = cell.to_world(ts, ts * 0.5);
    let ground = query.cast(pos, Vec3::NEG_Y, probe, layer::GROUND).is_some();
    let obstacle = query.cast(pos, Vec3::NEG_Y, probe, layer::OBSTACLE).is_some();
    ground && !obstacle
}

/// A best-first search in flight. Expansion is resumable: the host calls
/// `step` once per expanded node and the wall-clock timeout is checked at
/// exactly that suspension point.
pub struct SolveTask {
    nodes: Vec<SearchNode>,
    open: MinQueue<usize>,
    visited: FxHashSet<String>,
    initial_tools: Vec<ToolState>,
    finish: Vec3,
    started: Instant,
    expanded: usize,
    cfg: SolverConfig,
    probe: f32,
    finish_radius: f32,
    jump_cells: i32,
}

impl SolveTask {
    /// Capture the start state. Returns `None` when the scene has no
    /// finish to search toward.
    pub fn new(
        query: &impl LevelQuery,
        start_cell: GridPos,
        start_heading: Heading,
        cfg: &SolverConfig,
        game: &GameConfig,
    ) -> Option<Self> {
        let finish = query.finish_center()?;
        let initial_tools = tools::capture(query);
        let ts = query.tile_size();

        let mut task = Self {
            nodes: Vec::new(),
            open: MinQueue::new(),
            visited: FxHashSet::default(),
            initial_tools: initial_tools.clone(),
            finish,
            started: Instant::now(),
            expanded: 0,
            cfg: cfg.clone(),
            probe: game.ground_probe,
            finish_radius: game.finish_radius,
            jump_cells: game.jump_distance.round() as i32,
        };

        let heuristic = task.evaluate(start_cell, start_heading, &initial_tools, ts);
        task.nodes.push(SearchNode {
            cell: start_cell,
            heading: start_heading,
            tools: initial_tools,
            parent: None,
            action: None,
            path_cost: 0,
            heuristic,
        });
        task.visited.insert(search::state_key(
            start_cell,
            start_heading,
            &task.nodes[0].tools,
        ));
        task.open.push(0, heuristic);
        Some(task)
    }

    fn evaluate(&self, cell: GridPos, heading: Heading, tool_states: &[ToolState], ts: f32) -> u32 {
        search::evaluate(
            self.cfg.heuristic,
            self.cfg.distance_weight,
            self.cfg.tools_weight,
            self.cfg.direction_weight,
            cell.to_world(ts, ts * 0.5),
            heading,
            tool_states,
            &self.initial_tools,
            self.finish,
        )
    }

    /// Expand one node. `None` means the search is still running; this is
    /// the only suspension point and the only place the timeout and
    /// cancellation are observed.
    pub fn step(&mut self, query: &impl LevelQuery) -> Option<SolveOutcome> {
        if self.started.elapsed().as_secs_f32() > self.cfg.timeout {
            return Some(SolveOutcome::Timeout);
        }
        let Some(index) = self.open.pop() else {
            return Some(SolveOutcome::Exhausted);
        };
        self.expanded += 1;

        let ts = query.tile_size();
        let node = self.nodes[index].clone();

        if (node.cell.to_world(ts, ts * 0.5) - self.finish).length() <= self.finish_radius {
            return Some(SolveOutcome::Solved(self.reconstruct(index)));
        }

        // Tool actions first: both quarter turns of every rotatable tool.
        for (slot, tool) in node.tools.iter().enumerate() {
            if tool.kind != ToolKind::Rotatable {
                continue;
            }
            for quarter_turns in [1i8, -1] {
                let mut hypothetical = tools::clone_states(&node.tools);
                hypothetical[slot].facing = tool.facing.turned(quarter_turns);
                self.push_child(
                    query,
                    index,
                    node.cell,
                    node.heading,
                    hypothetical,
                    Action::RotateTool {
                        tool: tool.id,
                        quarter_turns,
                    },
                    self.cfg.tool_cost,
                );
            }
        }

        // Forward move: one tile along the heading, onto valid ground.
        let ahead = node.cell.offset(node.heading, 1);
        if cell_walkable(query, ahead, self.probe) {
            self.push_child(
                query,
                index,
                ahead,
                node.heading,
                node.tools.clone(),
                Action::MoveCube {
                    cell: ahead,
                    heading: node.heading,
                },
                self.cfg.move_cost,
            );
        }

        // Tile underfoot, read through the node's hypothetical snapshot.
        match self.tile_at(query, &node.tools, node.cell) {
            Some((TileKind::Direction, facing)) if facing != node.heading => {
                // Free heading change where a direction tile will turn the cube.
                self.push_child(
                    query,
                    index,
                    node.cell,
                    facing,
                    node.tools.clone(),
                    Action::MoveCube {
                        cell: node.cell,
                        heading: facing,
                    },
                    0,
                );
            }
            Some((TileKind::Jump, _)) => {
                let target = node.cell.offset(node.heading, self.jump_cells);
                if cell_walkable(query, target, self.probe) {
                    self.push_child(
                        query,
                        index,
                        target,
                        node.heading,
                        node.tools.clone(),
                        Action::MoveCube {
                            cell: target,
                            heading: node.heading,
                        },
                        self.cfg.move_cost,
                    );
                }
            }
            _ => {}
        }

        None
    }

    /// Drive the search synchronously; used by tests and the strategic
    /// fallback paths, never by the frame driver.
    pub fn run_to_completion(&mut self, query: &impl LevelQuery) -> SolveOutcome {
        loop {
            if let Some(outcome) = self.step(query) {
                return outcome;
            }
        }
    }

    /// The tile acting under a cell, with tool facings taken from the
    /// node's snapshot rather than the live scene.
    fn tile_at(
        &self,
        query: &impl LevelQuery,
        tool_states: &[ToolState],
        cell: GridPos,
    ) -> Option<(TileKind, Heading)> {
        if let Some(tool) = tool_states.iter().find(|t| t.cell == cell) {
            let kind = query.placement(tool.id.0).map(|p| p.kind)?;
            return Some((kind, tool.facing));
        }
        let ts = query.tile_size();
        let tile = query.tile_under(cell.to_world(ts, ts * 0.5), self.probe)?;
        if tile.tool.is_some() {
            // The live tool sits here but the snapshot moved it away.
            return None;
        }
        Some((tile.kind, tile.facing))
    }

    #[allow(clippy::too_many_arguments)]
    fn push_child(
        &mut self,
        query: &impl LevelQuery,
        parent: usize,
        cell: GridPos,
        heading: Heading,
        tool_states: Vec<ToolState>,
        action: Action,
        step_cost: u32,
    ) {
        let key = search::state_key(cell, heading, &tool_states);
        if !self.visited.insert(key) {
            return;
        }
        let ts = query.tile_size();
        let heuristic = self.evaluate(cell, heading, &tool_states, ts);
        let path_cost = self.nodes[parent].path_cost + step_cost;
        let node = SearchNode {
            cell,
            heading,
            tools: tool_states,
            parent: Some(parent),
            action: Some(action),
            path_cost,
            heuristic,
        };
        let priority = node.total_cost();
        self.nodes.push(node);
        self.open.push(self.nodes.len() - 1, priority);
    }

    /// Walk the accepted node's parent chain to the root, reading the
    /// recorded actions, and reverse into a front-to-back sequence.
    fn reconstruct(&self, goal: usize) -> Plan {
        let mut actions = Vec::new();
        let mut index = goal;
        while let Some(parent) = self.nodes[index].parent {
            if let Some(action) = self.nodes[index].action {
                actions.push(action);
            }
            index = parent;
        }
        actions.reverse();
        Plan {
            actions,
            initial_tools: self.initial_tools.clone(),
            expanded: self.expanded,
        }
    }
}

/// Kick off a solve-then-execute run.
#[derive(Event, Default)]
pub struct StartBot;

/// At most one solve is in flight per cube; starting a new one replaces
/// (cancels) the previous task.
#[derive(Resource, Default)]
pub struct ActiveSolve {
    pub task: Option<SolveTask>,
}

pub struct SolverPlugin;

impl Plugin for SolverPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<StartBot>()
            .init_resource::<SolverConfig>()
            .insert_resource(ActiveSolve::default())
            .add_systems(FixedUpdate, (begin_solve, step_solve).chain());
    }
}

pub fn begin_solve(
    mut requests: EventReader<StartBot>,
    mut active: ResMut<ActiveSolve>,
    mut executor: ResMut<Executor>,
    level: Res<Level>,
    cfg: Res<SolverConfig>,
    game: Res<GameConfig>,
    pose: Option<Res<InitialPose>>,
    mut bus: ResMut<GameEventBus>,
) {
    if requests.is_empty() {
        return;
    }
    requests.clear();
    let Some(pose) = pose else {
        return;
    };

    // A fresh request cancels whatever was in flight and clears results.
    active.task = None;
    executor.cancel();

    match cfg.strategy {
        Strategy::Strategic => {
            bus.emit("solve_started", serde_json::json!({ "strategy": "strategic" }));
            match strategic::solve(&*level, pose.cell, pose.heading, &cfg, &game) {
                Some(plan) => {
                    bus.emit(
                        "plan_found",
                        serde_json::json!({ "actions": plan.actions.len() }),
                    );
                    executor.begin(plan);
                }
                None => {
                    warn!("[Cubot solver] strategic search found no plan");
                    bus.emit("plan_failed", serde_json::json!({ "reason": "no_path" }));
                }
            }
        }
        Strategy::BestFirst => match SolveTask::new(&*level, pose.cell, pose.heading, &cfg, &game)
        {
            Some(task) => {
                bus.emit("solve_started", serde_json::json!({ "strategy": "best_first" }));
                active.task = Some(task);
            }
            None => {
                warn!("[Cubot solver] level has no finish; nothing to solve");
                bus.emit("plan_failed", serde_json::json!({ "reason": "no_finish" }));
            }
        },
    }
}

pub fn step_solve(
    mut active: ResMut<ActiveSolve>,
    mut executor: ResMut<Executor>,
    level: Res<Level>,
    cfg: Res<SolverConfig>,
    mut bus: ResMut<GameEventBus>,
) {
    let Some(task) = active.task.as_mut() else {
        return;
    };
    for _ in 0..cfg.expansions_per_tick.max(1) {
        match task.step(&*level) {
            None => {}
            Some(SolveOutcome::Solved(plan)) => {
                info!(
                    "[Cubot solver] plan found: {} actions after {} expansions",
                    plan.actions.len(),
                    plan.expanded
                );
                bus.emit(
                    "plan_found",
                    serde_json::json!({
                        "actions": plan.actions.len(),
                        "tool_actions": plan.tool_action_count(),
                        "expanded": plan.expanded,
                    }),
                );
                executor.begin(plan);
                active.task = None;
                return;
            }
            Some(SolveOutcome::Timeout) => {
                warn!("[Cubot solver] search timed out");
                bus.emit("plan_failed", serde_json::json!({ "reason": "timeout" }));
                active.task = None;
                return;
            }
            Some(SolveOutcome::Exhausted) => {
                warn!("[Cubot solver] search exhausted without reaching the finish");
                bus.emit("plan_failed", serde_json::json!({ "reason": "exhausted" }));
                active.task = None;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::TileKind;

    fn solve(level: &Level) -> SolveOutcome {
        let cfg = SolverConfig::default();
        let game = GameConfig::default();
        let mut task = SolveTask::new(
            level,
            level.start_cell,
            level.start_heading,
            &cfg,
            &game,
        )
        .expect("level has a finish");
        task.run_to_completion(level)
    }

    fn expect_plan(level: &Level) -> Plan {
        match solve(level) {
            SolveOutcome::Solved(plan) => plan,
            other => panic!("expected a plan, got {other:?}"),
        }
    }

    #[test]
    fn straight_corridor_needs_only_forward_moves() {
        let level = Level::corridor(5);
        let plan = expect_plan(&level);
        assert_eq!(plan.tool_action_count(), 0);
        let cells: Vec<GridPos> = plan
            .actions
            .iter()
            .map(|a| match a {
                Action::MoveCube { cell, heading } => {
                    assert_eq!(*heading, Heading::North);
                    *cell
                }
                other => panic!("unexpected action {other:?}"),
            })
            .collect();
        // Move count equals the straight-line distance in tiles.
        assert_eq!(
            cells,
            (1..=5).map(|z| GridPos::new(0, z)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn correctly_facing_direction_tile_needs_no_tool_actions() {
        // Corner tile already faces the finish leg and is not
        // reconfigurable; the plan is pure movement.
        let level = Level::bend(2, Heading::East, None);
        let plan = expect_plan(&level);
        assert_eq!(plan.tool_action_count(), 0);
        // The crossing produces a free heading change at the corner.
        assert!(plan.actions.contains(&Action::MoveCube {
            cell: GridPos::new(0, 2),
            heading: Heading::East,
        }));
        assert!(plan.actions.contains(&Action::MoveCube {
            cell: GridPos::new(2, 2),
            heading: Heading::East,
        }));
    }

    #[test]
    fn wrong_facing_tool_gets_exactly_one_quarter_turn() {
        // South-facing corner tool: one quarter turn from the needed East.
        let level = Level::bend(2, Heading::South, Some(ToolKind::Rotatable));
        let plan = expect_plan(&level);
        assert_eq!(plan.tool_action_count(), 1);
        let rotation = plan
            .actions
            .iter()
            .find_map(|a| match a {
                Action::RotateTool {
                    tool,
                    quarter_turns,
                } => Some((*tool, *quarter_turns)),
                _ => None,
            })
            .expect("plan must correct the tool");
        assert_eq!(rotation.1.abs(), 1);
        // The corrected crossing then turns the cube east to the finish.
        assert!(plan.actions.contains(&Action::MoveCube {
            cell: GridPos::new(0, 2),
            heading: Heading::East,
        }));
    }

    #[test]
    fn opposite_facing_tool_takes_two_quarter_turns() {
        let level = Level::bend(2, Heading::West, Some(ToolKind::Rotatable));
        let plan = expect_plan(&level);
        assert_eq!(plan.tool_action_count(), 2);
    }

    #[test]
    fn turn_without_any_tool_fails_cleanly() {
        // The corner tile faces the wrong way and is not reconfigurable:
        // more turns required than tools available.
        let level = Level::bend(2, Heading::South, None);
        match solve(&level) {
            SolveOutcome::Exhausted | SolveOutcome::Timeout => {}
            SolveOutcome::Solved(plan) => panic!("impossible level solved: {:?}", plan.actions),
        }
    }

    #[test]
    fn jump_tile_plans_over_the_gap() {
        let mut level = Level::new(1.0);
        level.push(TileKind::Ground, GridPos::new(0, 0), Heading::North);
        level.push(TileKind::Jump, GridPos::new(0, 1), Heading::North);
        // Gap at z = 2; jump_distance is two tiles.
        level.push(TileKind::Ground, GridPos::new(0, 3), Heading::North);
        level.push(TileKind::Finish, GridPos::new(0, 3), Heading::North);
        let plan = expect_plan(&level);
        assert_eq!(
            plan.actions,
            vec![
                Action::MoveCube {
                    cell: GridPos::new(0, 1),
                    heading: Heading::North,
                },
                Action::MoveCube {
                    cell: GridPos::new(0, 3),
                    heading: Heading::North,
                },
            ]
        );
    }

    #[test]
    fn blocked_jump_landing_is_rejected() {
        let mut level = Level::new(1.0);
        level.push(TileKind::Ground, GridPos::new(0, 0), Heading::North);
        level.push(TileKind::Jump, GridPos::new(0, 1), Heading::North);
        level.push(TileKind::Ground, GridPos::new(0, 3), Heading::North);
        level.push(TileKind::Wall, GridPos::new(0, 3), Heading::North);
        level.push(TileKind::Ground, GridPos::new(5, 5), Heading::North);
        level.push(TileKind::Finish, GridPos::new(5, 5), Heading::North);
        match solve(&level) {
            SolveOutcome::Exhausted => {}
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn distance_only_heuristic_solves_the_bend_too() {
        let level = Level::bend(2, Heading::South, Some(ToolKind::Rotatable));
        let cfg = SolverConfig {
            heuristic: HeuristicMode::DistanceOnly,
            ..Default::default()
        };
        let game = GameConfig::default();
        let mut task =
            SolveTask::new(&level, level.start_cell, level.start_heading, &cfg, &game).unwrap();
        match task.run_to_completion(&level) {
            SolveOutcome::Solved(plan) => assert!(plan.tool_action_count() >= 1),
            other => panic!("expected a plan, got {other:?}"),
        }
    }

    #[test]
    fn advanced_heuristic_solves_the_bend() {
        let level = Level::bend(2, Heading::South, Some(ToolKind::Rotatable));
        let cfg = SolverConfig {
            heuristic: HeuristicMode::Advanced,
            ..Default::default()
        };
        let game = GameConfig::default();
        let mut task =
            SolveTask::new(&level, level.start_cell, level.start_heading, &cfg, &game).unwrap();
        assert!(matches!(
            task.run_to_completion(&level),
            SolveOutcome::Solved(_)
        ));
    }

    #[test]
    fn missing_finish_yields_no_task() {
        let mut level = Level::new(1.0);
        level.push(TileKind::Ground, GridPos::new(0, 0), Heading::North);
        assert!(SolveTask::new(
            &level,
            level.start_cell,
            level.start_heading,
            &SolverConfig::default(),
            &GameConfig::default(),
        )
        .is_none());
    }
}
