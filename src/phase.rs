use bevy::prelude::*;

use crate::components::{Cube, InitialPose, LevelComplete};
use crate::level::Level;
use crate::motion::CubeMotion;
use crate::tools::{self, ToolState};

/// The player-facing mode split: free tool repositioning versus the cube
/// actually running the level.
#[derive(States, Default, Clone, Copy, Eq, PartialEq, Debug, Hash)]
pub enum GamePhase {
    #[default]
    Planning,
    Execution,
}

/// Single gate for direct tool manipulation. While set, the executor owns
/// every tool transform and player control is suspended; otherwise the
/// planning surface does.
#[derive(Resource, Default, Clone, Copy)]
pub struct EditMode(pub bool);

/// Tool transforms captured at startup; stopping a run restores them.
#[derive(Resource, Clone)]
pub struct InitialToolStates(pub Vec<ToolState>);

#[derive(Event, Default)]
pub struct StartRun;

#[derive(Event, Default)]
pub struct StopRun;

pub struct PhasePlugin;

impl Plugin for PhasePlugin {
    fn build(&self, app: &mut App) {
        app.init_state::<GamePhase>()
            .init_resource::<EditMode>()
            .init_resource::<LevelComplete>()
            .add_event::<StartRun>()
            .add_event::<StopRun>()
            .add_systems(Startup, capture_initial_tool_states)
            .add_systems(Update, apply_phase_commands)
            .add_systems(OnEnter(GamePhase::Execution), enter_execution)
            .add_systems(OnEnter(GamePhase::Planning), enter_planning);
    }
}

fn capture_initial_tool_states(mut commands: Commands, level: Res<Level>) {
    commands.insert_resource(InitialToolStates(tools::capture(&*level)));
}

fn apply_phase_commands(
    mut start: EventReader<StartRun>,
    mut stop: EventReader<StopRun>,
    state: Res<State<GamePhase>>,
    mut next: ResMut<NextState<GamePhase>>,
) {
    if !start.is_empty() {
        start.clear();
        if *state.get() == GamePhase::Planning {
            next.set(GamePhase::Execution);
        }
    }
    if !stop.is_empty() {
        stop.clear();
        if *state.get() == GamePhase::Execution {
            next.set(GamePhase::Planning);
        }
    }
}

fn enter_execution(
    level: Res<Level>,
    pose: Option<Res<InitialPose>>,
    mut cubes: Query<(&mut CubeMotion, &mut Transform), With<Cube>>,
) {
    let Some(pose) = pose else {
        return;
    };
    let Ok((mut cube, mut transform)) = cubes.get_single_mut() else {
        return;
    };
    let ts = level.tile_size;
    cube.reset(pose.cell.to_world(ts, level.rest_y()), pose.heading, ts);
    cube.movement_enabled = true;
    transform.translation = cube.position;
    transform.rotation = cube.facing_quat();
}

fn enter_planning(
    initial: Option<Res<InitialToolStates>>,
    pose: Option<Res<InitialPose>>,
    mut level: ResMut<Level>,
    mut edit: ResMut<EditMode>,
    mut complete: ResMut<LevelComplete>,
    mut cubes: Query<(&mut CubeMotion, &mut Transform), With<Cube>>,
) {
    edit.0 = false;
    complete.0 = false;
    level.finish_removed = false;

    // Every tool returns to its captured initial transform.
    if let Some(initial) = initial.as_ref() {
        for state in &initial.0 {
            if let Some(tile) = level.tool_mut(state.id) {
                tile.cell = state.cell;
                tile.facing = state.facing;
            }
        }
    }

    if let Some(pose) = pose {
        if let Ok((mut cube, mut transform)) = cubes.get_single_mut() {
            let ts = level.tile_size;
            cube.reset(pose.cell.to_world(ts, level.rest_y()), pose.heading, ts);
            cube.movement_enabled = false;
            transform.translation = cube.position;
            transform.rotation = cube.facing_quat();
        }
    }
}
