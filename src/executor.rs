use bevy::prelude::*;

use crate::components::{Cube, InitialPose, LevelComplete};
use crate::events::GameEventBus;
use crate::level::Level;
use crate::motion::CubeMotion;
use crate::phase::EditMode;
use crate::search::Action;
use crate::solver::{self, Plan, SolverConfig};
use crate::tools;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum ExecPhase {
    #[default]
    Idle,
    /// Edit window: player control suspended, tool transforms owned here.
    Editing,
    /// Plan applied; the cube runs the level under its own physics.
    Running,
    Done,
}

/// Replays a finished plan against the live scene, then watches the real
/// run confirm it. Planning happened on an idealized model; the run must
/// pass through the actual collision and trigger pipeline to count.
#[derive(Resource, Default)]
pub struct Executor {
    plan: Option<Plan>,
    phase: ExecPhase,
    next_action: usize,
    delay_left: f32,
}

impl Executor {
    /// Install a plan; replay starts on the next tick.
    pub fn begin(&mut self, plan: Plan) {
        self.plan = Some(plan);
        self.phase = ExecPhase::Editing;
        self.next_action = 0;
        self.delay_left = 0.0;
    }

    /// Stop and forget everything, clearing result flags.
    pub fn cancel(&mut self) {
        *self = Self::default();
    }

    pub fn is_idle(&self) -> bool {
        self.phase == ExecPhase::Idle
    }

    pub fn is_running(&self) -> bool {
        self.phase == ExecPhase::Running
    }

    pub fn is_done(&self) -> bool {
        self.phase == ExecPhase::Done
    }

    /// Advance the replay by one fixed tick.
    #[allow(clippy::too_many_arguments)]
    pub fn tick(
        &mut self,
        level: &mut Level,
        cube: &mut CubeMotion,
        pose: &InitialPose,
        edit: &mut bool,
        complete: bool,
        cfg: &SolverConfig,
        dt: f32,
        bus: &mut GameEventBus,
    ) {
        match self.phase {
            ExecPhase::Idle | ExecPhase::Done => {}
            ExecPhase::Editing => self.tick_editing(level, cube, pose, edit, cfg, dt, bus),
            ExecPhase::Running => {
                if complete {
                    cube.movement_enabled = false;
                    self.phase = ExecPhase::Done;
                    bus.emit("bot_finished", serde_json::json!({}));
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn tick_editing(
        &mut self,
        level: &mut Level,
        cube: &mut CubeMotion,
        pose: &InitialPose,
        edit: &mut bool,
        cfg: &SolverConfig,
        dt: f32,
        bus: &mut GameEventBus,
    ) {
        let Some(plan) = self.plan.take() else {
            self.phase = ExecPhase::Idle;
            return;
        };

        if !*edit {
            // Entering the edit window: the scene must still match the
            // snapshot the plan was computed against.
            let current = tools::capture(level);
            if let Some(stale) = tools::diff(&current, &plan.initial_tools) {
                warn!(
                    "[Cubot executor] tool {} changed since planning; aborting",
                    stale.id.0
                );
                bus.emit(
                    "invalid_action",
                    serde_json::json!({ "reason": "stale_scene", "tool": stale.id.0 }),
                );
                self.abort(edit);
                return;
            }
            *edit = true;
            cube.movement_enabled = false;
            bus.emit(
                "edit_begin",
                serde_json::json!({ "actions": plan.actions.len() }),
            );
        }

        self.delay_left -= dt;
        if self.delay_left > 0.0 {
            self.plan = Some(plan);
            return;
        }

        if let Some(action) = plan.actions.get(self.next_action).copied() {
            if let Err(reason) = apply_action(action, level, cube) {
                warn!("[Cubot executor] {reason}; aborting remaining actions");
                bus.emit(
                    "invalid_action",
                    serde_json::json!({ "reason": reason, "index": self.next_action }),
                );
                self.abort(edit);
                return;
            }
            bus.emit(
                "action_applied",
                serde_json::to_value(action).unwrap_or_default(),
            );
            self.next_action += 1;
            self.delay_left = cfg.action_delay;
            self.plan = Some(plan);
            return;
        }

        // Every action applied and settled: leave the edit window and hand
        // the cube back to physics from its initial pose.
        *edit = false;
        let ts = level.tile_size;
        cube.reset(pose.cell.to_world(ts, level.rest_y()), pose.heading, ts);
        cube.movement_enabled = true;
        self.phase = ExecPhase::Running;
        self.plan = Some(plan);
        bus.emit("run_started", serde_json::json!({}));
    }

    fn abort(&mut self, edit: &mut bool) {
        *edit = false;
        self.plan = None;
        self.next_action = 0;
        self.phase = ExecPhase::Idle;
    }
}

fn apply_action(action: Action, level: &mut Level, cube: &mut CubeMotion) -> Result<(), String> {
    let ts = level.tile_size;
    let rest_y = level.rest_y();
    match action {
        Action::RotateTool {
            tool,
            quarter_turns,
        } => {
            let Some(tile) = level.tool_mut(tool) else {
                return Err(format!("tool {} no longer exists", tool.0));
            };
            tile.facing = tile.facing.turned(quarter_turns);
            Ok(())
        }
        Action::PlaceTool { tool, cell, facing } => {
            if level.cell_occupied(cell, tool.0) {
                return Err(format!("cell ({},{}) is no longer free", cell.x, cell.z));
            }
            let Some(tile) = level.tool_mut(tool) else {
                return Err(format!("tool {} no longer exists", tool.0));
            };
            tile.cell = cell;
            tile.facing = facing;
            Ok(())
        }
        Action::MoveCube { cell, heading } => {
            // The search already validated legality; bypass locomotion and
            // place the pose directly. A mid-jump request is dropped.
            cube.try_apply_move(cell.to_world(ts, rest_y), heading, ts);
            Ok(())
        }
    }
}

pub struct ExecutorPlugin;

impl Plugin for ExecutorPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(Executor::default()).add_systems(
            FixedUpdate,
            run_executor.after(solver::step_solve),
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_executor(
    mut exec: ResMut<Executor>,
    mut level: ResMut<Level>,
    mut edit: ResMut<EditMode>,
    complete: Res<LevelComplete>,
    pose: Option<Res<InitialPose>>,
    cfg: Res<SolverConfig>,
    time: Res<Time<Fixed>>,
    mut bus: ResMut<GameEventBus>,
    mut cubes: Query<(&mut CubeMotion, &mut Transform), With<Cube>>,
) {
    let Some(pose) = pose else {
        return;
    };
    let Ok((mut cube, mut transform)) = cubes.get_single_mut() else {
        return;
    };
    exec.tick(
        &mut level,
        &mut cube,
        &pose,
        &mut edit.0,
        complete.0,
        &cfg,
        time.delta_secs(),
        &mut bus,
    );
    // Direct pose writes keep the dependent visual transform in sync.
    transform.translation = cube.position;
    transform.rotation = cube.facing_quat();
}
