use bevy::prelude::*;

use crate::components::{Cube, GameConfig, LevelComplete};
use crate::events::GameEventBus;
use crate::executor;
use crate::level::{Level, LevelQuery, TileKind};
use crate::motion::{CubeMotion, MotionState};
use crate::phase::EditMode;

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LevelComplete>().add_systems(
            FixedUpdate,
            (tick_cube_motion, tick_fragile_tiles, check_finish)
                .chain()
                .after(executor::run_executor),
        );
    }
}

/// Tracks how long the cube has rested on one fragile tile.
#[derive(Default)]
pub struct FragileContact {
    tile: Option<u32>,
    elapsed: f32,
}

impl FragileContact {
    /// Advance break/respawn bookkeeping by one tick. Returns the id of a
    /// tile that broke this tick, if any.
    pub fn tick(
        &mut self,
        level: &mut Level,
        cube: &CubeMotion,
        cfg: &GameConfig,
        edit_mode: bool,
        dt: f32,
    ) -> Option<u32> {
        level.tick_broken(dt);

        // Tool manipulation in the edit window never springs the trap.
        if edit_mode || !cube.movement_enabled {
            self.tile = None;
            return None;
        }

        let standing_on = match cube.state {
            MotionState::Grounded => level
                .tile_under(cube.position, cfg.ground_probe)
                .filter(|t| t.kind == TileKind::Fragile)
                .map(|t| t.id),
            _ => None,
        };

        match standing_on {
            Some(id) if self.tile == Some(id) => {
                self.elapsed += dt;
                if self.elapsed >= cfg.fragile_break_delay {
                    level.break_tile(id, cfg.fragile_respawn);
                    self.tile = None;
                    return Some(id);
                }
            }
            Some(id) => {
                self.tile = Some(id);
                self.elapsed = 0.0;
            }
            None => self.tile = None,
        }
        None
    }
}

/// Watches for the cube settling inside the finish region, then runs the
/// completion delay. Detection requires a full tick inside while not
/// mid-rotation or mid-jump.
#[derive(Default)]
pub struct FinishWatch {
    inside_ticks: u32,
    delay_left: Option<f32>,
}

impl FinishWatch {
    /// Returns true on the tick the level completes.
    pub fn tick(
        &mut self,
        level: &mut Level,
        cube: &mut CubeMotion,
        cfg: &GameConfig,
        dt: f32,
    ) -> bool {
        if let Some(left) = self.delay_left.as_mut() {
            *left -= dt;
            if *left <= 0.0 {
                self.delay_left = None;
                return true;
            }
            return false;
        }

        let settled = matches!(cube.state, MotionState::Grounded)
            && level.within_finish(cube.position, cfg.finish_radius);
        if settled {
            self.inside_ticks += 1;
        } else {
            self.inside_ticks = 0;
        }

        // A full tick inside: one tick to arrive, one to confirm.
        if self.inside_ticks >= 2 {
            cube.movement_enabled = false;
            level.remove_finish();
            self.inside_ticks = 0;
            self.delay_left = Some(cfg.finish_delay);
        }
        false
    }

    pub fn pending(&self) -> bool {
        self.delay_left.is_some()
    }
}

fn tick_cube_motion(
    cfg: Res<GameConfig>,
    level: Res<Level>,
    edit: Res<EditMode>,
    time: Res<Time<Fixed>>,
    mut bus: ResMut<GameEventBus>,
    mut cubes: Query<(&mut CubeMotion, &mut Transform), With<Cube>>,
) {
    // Tool transforms belong to the executor while editing; the cube holds
    // still until the window closes.
    if edit.0 {
        return;
    }
    let dt = time.delta_secs();
    for (mut cube, mut transform) in cubes.iter_mut() {
        let events = cube.step(&*level, &cfg, dt);
        transform.translation = cube.position;
        transform.rotation = cube.facing_quat();
        for event in events {
            bus.emit("motion", serde_json::to_value(event).unwrap_or_default());
        }
    }
}

fn tick_fragile_tiles(
    cfg: Res<GameConfig>,
    edit: Res<EditMode>,
    time: Res<Time<Fixed>>,
    mut level: ResMut<Level>,
    mut bus: ResMut<GameEventBus>,
    mut contact: Local<FragileContact>,
    cubes: Query<&CubeMotion, With<Cube>>,
) {
    let Ok(cube) = cubes.get_single() else {
        return;
    };
    if let Some(id) = contact.tick(&mut level, cube, &cfg, edit.0, time.delta_secs()) {
        bus.emit("tile_broken", serde_json::json!({ "tile": id }));
    }
}

fn check_finish(
    cfg: Res<GameConfig>,
    time: Res<Time<Fixed>>,
    mut level: ResMut<Level>,
    mut complete: ResMut<LevelComplete>,
    mut bus: ResMut<GameEventBus>,
    mut watch: Local<FinishWatch>,
    mut cubes: Query<&mut CubeMotion, With<Cube>>,
) {
    if complete.0 {
        return;
    }
    let Ok(mut cube) = cubes.get_single_mut() else {
        return;
    };
    let was_pending = watch.pending();
    if watch.tick(&mut level, &mut cube, &cfg, time.delta_secs()) {
        complete.0 = true;
        bus.emit("level_complete", serde_json::json!({}));
    } else if watch.pending() && !was_pending {
        bus.emit("finish_reached", serde_json::json!({}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridPos, Heading};

    const DT: f32 = 1.0 / 60.0;

    fn resting_cube(level: &Level, cell: GridPos) -> CubeMotion {
        let mut cube = CubeMotion::new(
            cell.to_world(level.tile_size, level.rest_y()),
            Heading::North,
            level.tile_size,
        );
        cube.movement_enabled = true;
        cube
    }

    #[test]
    fn fragile_tile_breaks_after_the_delay_and_respawns() {
        let mut level = Level::new(1.0);
        level.push(TileKind::Fragile, GridPos::new(0, 0), Heading::North);
        let fragile_id = level.tiles[0].id;
        let cube = resting_cube(&level, GridPos::new(0, 0));
        let cfg = GameConfig::default();
        let mut contact = FragileContact::default();

        let break_ticks = (cfg.fragile_break_delay / DT) as usize + 2;
        let mut broke = None;
        for _ in 0..break_ticks {
            if let Some(id) = contact.tick(&mut level, &cube, &cfg, false, DT) {
                broke = Some(id);
                break;
            }
        }
        assert_eq!(broke, Some(fragile_id));
        assert!(level.is_broken(fragile_id));

        // The tile returns after its respawn window.
        let respawn_ticks = (cfg.fragile_respawn / DT) as usize + 2;
        for _ in 0..respawn_ticks {
            contact.tick(&mut level, &cube, &cfg, false, DT);
        }
        assert!(!level.is_broken(fragile_id));
    }

    #[test]
    fn edit_mode_suppresses_fragile_triggers() {
        let mut level = Level::new(1.0);
        level.push(TileKind::Fragile, GridPos::new(0, 0), Heading::North);
        let cube = resting_cube(&level, GridPos::new(0, 0));
        let cfg = GameConfig::default();
        let mut contact = FragileContact::default();

        let ticks = (cfg.fragile_break_delay / DT) as usize * 2;
        for _ in 0..ticks {
            assert_eq!(contact.tick(&mut level, &cube, &cfg, true, DT), None);
        }
        assert!(!level.is_broken(level.tiles[0].id));
    }

    #[test]
    fn leaving_the_tile_resets_the_break_timer() {
        let mut level = Level::new(1.0);
        level.push(TileKind::Fragile, GridPos::new(0, 0), Heading::North);
        level.push(TileKind::Ground, GridPos::new(0, 1), Heading::North);
        let mut cube = resting_cube(&level, GridPos::new(0, 0));
        let cfg = GameConfig::default();
        let mut contact = FragileContact::default();

        let half = (cfg.fragile_break_delay / DT) as usize / 2;
        for _ in 0..half {
            contact.tick(&mut level, &cube, &cfg, false, DT);
        }
        // Step off, then back on: the countdown starts over.
        cube.try_apply_move(GridPos::new(0, 1).to_world(1.0, 0.5), Heading::North, 1.0);
        contact.tick(&mut level, &cube, &cfg, false, DT);
        cube.try_apply_move(GridPos::new(0, 0).to_world(1.0, 0.5), Heading::North, 1.0);
        for _ in 0..half + 10 {
            contact.tick(&mut level, &cube, &cfg, false, DT);
        }
        assert!(!level.is_broken(level.tiles[0].id));
    }

    #[test]
    fn finish_confirms_then_completes_after_the_delay() {
        let mut level = Level::corridor(2);
        let mut cube = resting_cube(&level, GridPos::new(0, 2));
        let cfg = GameConfig::default();
        let mut watch = FinishWatch::default();

        // Two ticks inside: detection fires, movement locks, marker goes.
        assert!(!watch.tick(&mut level, &mut cube, &cfg, DT));
        assert!(!watch.tick(&mut level, &mut cube, &cfg, DT));
        assert!(watch.pending());
        assert!(!cube.movement_enabled);
        assert!(level.finish_removed);

        let mut completed = false;
        for _ in 0..(cfg.finish_delay / DT) as usize + 2 {
            if watch.tick(&mut level, &mut cube, &cfg, DT) {
                completed = true;
                break;
            }
        }
        assert!(completed);
    }

    #[test]
    fn finish_ignores_a_cube_mid_transition() {
        let mut level = Level::corridor(2);
        let mut cube = resting_cube(&level, GridPos::new(0, 2));
        cube.request_turn(Heading::East);
        let cfg = GameConfig::default();
        let mut watch = FinishWatch::default();
        for _ in 0..3 {
            assert!(!watch.tick(&mut level, &mut cube, &cfg, DT));
        }
        assert!(!watch.pending());
    }
}
