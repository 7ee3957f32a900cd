use bevy::prelude::*;

use crate::components::{Cube, InitialPose};
use crate::level::Level;
use crate::motion::CubeMotion;

pub struct PlayerPlugin;

impl Plugin for PlayerPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, spawn_cube);
    }
}

/// Spawn the controlled cube at the level's start pose and record that
/// pose for resets. A windowed host layers its visuals onto this entity.
fn spawn_cube(mut commands: Commands, level: Res<Level>) {
    let pose = InitialPose {
        cell: level.start_cell,
        heading: level.start_heading,
    };
    commands.insert_resource(pose);

    let position = pose.cell.to_world(level.tile_size, level.rest_y());
    let motion = CubeMotion::new(position, pose.heading, level.tile_size);
    commands.spawn((Cube, motion, Transform::from_translation(position)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_spawns_one_cube_at_the_start_cell() {
        let mut app = App::new();
        app.insert_resource(Level::corridor(3))
            .add_plugins(PlayerPlugin);
        app.update();

        let pose = app.world().resource::<InitialPose>();
        assert_eq!(pose.cell, Level::corridor(3).start_cell);

        let mut query = app.world_mut().query_filtered::<&CubeMotion, With<Cube>>();
        let cubes: Vec<_> = query.iter(app.world()).collect();
        assert_eq!(cubes.len(), 1);
        assert!(!cubes[0].movement_enabled, "cube starts parked");
        assert_eq!(cubes[0].position, Vec3::new(0.0, 0.5, 0.0));
    }
}
