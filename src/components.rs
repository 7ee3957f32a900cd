use bevy::prelude::*;

use crate::grid::{GridPos, Heading};

/// Marks the player-controlled cube entity.
#[derive(Component)]
pub struct Cube;

/// The pose the cube starts a run from; the executor and phase resets
/// return to it.
#[derive(Resource, Clone, Copy)]
pub struct InitialPose {
    pub cell: GridPos,
    pub heading: Heading,
}

/// True when the app runs without a window. All gameplay systems work in
/// either mode; only visual layering differs.
#[derive(Resource, Clone, Copy)]
pub struct HeadlessMode(pub bool);

/// Set once the finish condition has been confirmed and the completion
/// delay has elapsed.
#[derive(Resource, Clone, Copy, Default)]
pub struct LevelComplete(pub bool);

/// Scene layer bits, used by the cast primitive's filter masks.
/// Kept as plain bit constants to mirror the layer arithmetic the
/// collision queries are written against.
pub mod layer {
    pub const GROUND: u32 = 1 << 0;
    pub const OBSTACLE: u32 = 1 << 1;
    pub const FINISH: u32 = 1 << 2;
    pub const TOOL: u32 = 1 << 3;
}

/// Motion constants, tunable from the startup config file.
#[derive(Resource, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Base ground speed in world units per second.
    pub speed: f32,
    /// Turn interpolation rate; a full turn takes 1/rotation_speed seconds.
    pub rotation_speed: f32,
    /// Forward probe length for obstacle and collision checks.
    pub check_distance: f32,
    /// Downward probe length for ground contact.
    pub ground_probe: f32,
    /// Downward acceleration while falling.
    pub gravity: f32,
    /// Headings closer than this (degrees) count as already aligned.
    pub angle_tolerance_deg: f32,
    /// Jump reach in tiles.
    pub jump_distance: f32,
    /// Seconds a jump arc takes from launch to landing.
    pub jump_duration: f32,
    /// Peak height of the jump arc above ground.
    pub jump_height: f32,
    /// Jump tiles trigger within this fraction of a tile from their center.
    pub jump_trigger_frac: f32,
    /// Speed multiplier while boosted.
    pub boost_factor: f32,
    /// Seconds a boost lasts, measured from the most recent trigger.
    pub boost_duration: f32,
    /// Jump reach multiplier while boosted.
    pub boost_jump_multiplier: f32,
    /// Seconds the colliding flag stays set after its last trigger.
    pub collide_reset_delay: f32,
    /// Acceptance radius around the finish trigger center.
    pub finish_radius: f32,
    /// Seconds between finish detection and the completion signal.
    pub finish_delay: f32,
    /// Seconds of contact before a fragile tile breaks.
    pub fragile_break_delay: f32,
    /// Seconds a broken fragile tile stays gone.
    pub fragile_respawn: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            speed: 5.0,
            rotation_speed: 10.0,
            check_distance: 1.0,
            ground_probe: 1.0,
            gravity: 20.0,
            angle_tolerance_deg: 5.0,
            jump_distance: 2.0,
            jump_duration: 0.6,
            jump_height: 0.5,
            jump_trigger_frac: 0.3,
            boost_factor: 2.0,
            boost_duration: 3.0,
            boost_jump_multiplier: 1.5,
            collide_reset_delay: 2.0,
            finish_radius: 0.3,
            finish_delay: 1.0,
            fragile_break_delay: 1.0,
            fragile_respawn: 3.0,
        }
    }
}
