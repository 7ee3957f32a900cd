use std::collections::HashMap;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::components::layer;
use crate::grid::{GridPos, Heading};
use crate::raycast::{self, CastHit, CastTarget};
use crate::tools::{ToolId, ToolKind, ToolState};

/// Behavior a tile carries. Ground-like kinds are walkable; `Wall` blocks
/// and bounces; `Finish` is a trigger volume with no physical presence.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TileKind {
    Ground,
    /// Forces the cube's heading to the tile facing past the midpoint.
    Direction,
    /// Launches the cube along an arc to a cell ahead.
    Jump,
    /// Grants a timed speed boost.
    Speed,
    /// Collapses shortly after the cube rests on it.
    Fragile,
    Wall,
    Finish,
}

impl TileKind {
    pub fn is_ground_like(self) -> bool {
        matches!(
            self,
            TileKind::Ground | TileKind::Direction | TileKind::Jump | TileKind::Speed | TileKind::Fragile
        )
    }

    fn base_layers(self) -> u32 {
        match self {
            k if k.is_ground_like() => layer::GROUND,
            TileKind::Wall => layer::OBSTACLE,
            TileKind::Finish => layer::FINISH,
            _ => 0,
        }
    }
}

/// One tile instance in the scene.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TilePlacement {
    pub id: u32,
    pub kind: TileKind,
    pub cell: GridPos,
    pub facing: Heading,
    /// `Some` marks this tile as a reconfigurable tool.
    pub tool: Option<ToolKind>,
}

impl TilePlacement {
    pub fn layers(&self) -> u32 {
        let mut bits = self.kind.base_layers();
        if self.tool.is_some() {
            bits |= layer::TOOL;
        }
        bits
    }
}

/// The in-memory scene: every tile placement, the cube's start pose and
/// the lattice pitch. Runtime-only state (broken fragile tiles, the
/// removed finish marker) is not part of the serialized description.
#[derive(Resource, Clone, Serialize, Deserialize)]
pub struct Level {
    pub tile_size: f32,
    pub tiles: Vec<TilePlacement>,
    pub start_cell: GridPos,
    pub start_heading: Heading,
    #[serde(skip)]
    broken: HashMap<u32, f32>,
    #[serde(skip)]
    pub finish_removed: bool,
}

impl Level {
    pub fn new(tile_size: f32) -> Self {
        Self {
            tile_size,
            tiles: Vec::new(),
            start_cell: GridPos::new(0, 0),
            start_heading: Heading::North,
            broken: HashMap::new(),
            finish_removed: false,
        }
    }

    /// Height of the cube's center while resting on a tile top.
    pub fn rest_y(&self) -> f32 {
        self.tile_size * 0.5
    }

    pub fn push(&mut self, kind: TileKind, cell: GridPos, facing: Heading) -> u32 {
        self.push_placement(kind, cell, facing, None)
    }

    pub fn push_tool(&mut self, kind: TileKind, cell: GridPos, facing: Heading, tool: ToolKind) -> u32 {
        self.push_placement(kind, cell, facing, Some(tool))
    }

    fn push_placement(
        &mut self,
        kind: TileKind,
        cell: GridPos,
        facing: Heading,
        tool: Option<ToolKind>,
    ) -> u32 {
        let id = self.tiles.iter().map(|t| t.id + 1).max().unwrap_or(1);
        self.tiles.push(TilePlacement {
            id,
            kind,
            cell,
            facing,
            tool,
        });
        id
    }

    pub fn tool_mut(&mut self, id: ToolId) -> Option<&mut TilePlacement> {
        self.tiles
            .iter_mut()
            .find(|t| t.id == id.0 && t.tool.is_some())
    }

    /// Whether a cell already holds a functional tile (wall, another tool
    /// or special ground). Placing a tool onto plain ground or under the
    /// finish trigger is allowed; anything else refuses the placement.
    pub fn cell_occupied(&self, cell: GridPos, ignore_id: u32) -> bool {
        self.tiles.iter().any(|t| {
            t.id != ignore_id
                && t.cell == cell
                && !self.is_broken(t.id)
                && (t.tool.is_some()
                    || !matches!(t.kind, TileKind::Ground | TileKind::Finish))
        })
    }

    pub fn is_broken(&self, id: u32) -> bool {
        self.broken.contains_key(&id)
    }

    pub fn break_tile(&mut self, id: u32, respawn_secs: f32) {
        self.broken.insert(id, respawn_secs);
    }

    /// Advance fragile respawn timers by one tick.
    pub fn tick_broken(&mut self, dt: f32) {
        self.broken.retain(|_, left| {
            *left -= dt;
            *left > 0.0
        });
    }

    pub fn remove_finish(&mut self) {
        self.finish_removed = true;
    }

    fn tile_aabb(&self, tile: &TilePlacement) -> (Vec3, Vec3) {
        let ts = self.tile_size;
        let center = tile.cell.to_world(ts, 0.0);
        let half = ts * 0.5;
        if tile.kind.is_ground_like() {
            // Slab under the walking surface; its top face is y = 0.
            (
                Vec3::new(center.x - half, -half, center.z - half),
                Vec3::new(center.x + half, 0.0, center.z + half),
            )
        } else {
            // Walls and triggers occupy the cell above the surface.
            (
                Vec3::new(center.x - half, 0.0, center.z - half),
                Vec3::new(center.x + half, ts, center.z + half),
            )
        }
    }

    /// Castable boxes, special tiles first so that a tool sharing a cell
    /// with plain ground wins equal-distance ties in the probe.
    fn cast_targets(&self) -> impl Iterator<Item = CastTarget> + '_ {
        let to_target = move |tile: &TilePlacement| {
            if self.is_broken(tile.id) {
                return None;
            }
            if tile.kind == TileKind::Finish && self.finish_removed {
                return None;
            }
            let (min, max) = self.tile_aabb(tile);
            Some(CastTarget {
                id: tile.id,
                min,
                max,
                layers: tile.layers(),
            })
        };
        self.tiles
            .iter()
            .filter(|t| t.kind != TileKind::Ground)
            .filter_map(to_target)
            .chain(
                self.tiles
                    .iter()
                    .filter(|t| t.kind == TileKind::Ground)
                    .filter_map(to_target),
            )
    }
}

/// Narrow scene interface the motion model and solver are written
/// against: a cast primitive, underfoot classification, the finish
/// test and tool enumeration. Injected rather than looked up globally.
pub trait LevelQuery {
    fn tile_size(&self) -> f32;

    /// Ray probe against scene tiles whose layers intersect `mask`.
    fn cast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32) -> Option<CastHit>;

    fn placement(&self, id: u32) -> Option<&TilePlacement>;

    fn finish_center(&self) -> Option<Vec3>;

    fn tool_states(&self) -> Vec<ToolState>;

    /// The ground tile directly beneath a position, classified via the
    /// cast primitive.
    fn tile_under(&self, pos: Vec3, max_distance: f32) -> Option<&TilePlacement> {
        let hit = self.cast(pos, Vec3::NEG_Y, max_distance, layer::GROUND)?;
        self.placement(hit.id)
    }

    /// Whether a position lies inside the finish acceptance region.
    fn within_finish(&self, pos: Vec3, radius: f32) -> bool {
        self.finish_center()
            .is_some_and(|center| (pos - center).length() <= radius)
    }
}

impl LevelQuery for Level {
    fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn cast(&self, origin: Vec3, direction: Vec3, max_distance: f32, mask: u32) -> Option<CastHit> {
        raycast::cast(origin, direction, max_distance, mask, self.cast_targets())
    }

    fn placement(&self, id: u32) -> Option<&TilePlacement> {
        self.tiles.iter().find(|t| t.id == id)
    }

    fn finish_center(&self) -> Option<Vec3> {
        if self.finish_removed {
            return None;
        }
        self.tiles
            .iter()
            .find(|t| t.kind == TileKind::Finish)
            .map(|t| t.cell.to_world(self.tile_size, self.rest_y()))
    }

    fn tool_states(&self) -> Vec<ToolState> {
        self.tiles
            .iter()
            .filter_map(|t| {
                t.tool.map(|kind| ToolState {
                    id: ToolId(t.id),
                    kind,
                    cell: t.cell,
                    facing: t.facing,
                })
            })
            .collect()
    }
}

impl Level {
    /// Straight corridor of `len` ground tiles north of the origin, with
    /// the finish over the last one.
    pub fn corridor(len: i32) -> Self {
        let mut level = Level::new(1.0);
        for z in 0..=len {
            level.push(TileKind::Ground, GridPos::new(0, z), Heading::North);
        }
        level.push(TileKind::Finish, GridPos::new(0, len), Heading::North);
        level
    }

    /// Corridor with an L-bend: north for `leg` cells, then east to the
    /// finish. The corner cell holds a direction tile facing `corner`.
    /// `tool` marks the corner tile reconfigurable.
    pub fn bend(leg: i32, corner: Heading, tool: Option<ToolKind>) -> Self {
        let mut level = Level::new(1.0);
        for z in 0..leg {
            level.push(TileKind::Ground, GridPos::new(0, z), Heading::North);
        }
        let corner_cell = GridPos::new(0, leg);
        match tool {
            Some(kind) => level.push_tool(TileKind::Direction, corner_cell, corner, kind),
            None => level.push(TileKind::Direction, corner_cell, corner),
        };
        for x in 1..=leg {
            level.push(TileKind::Ground, GridPos::new(x, leg), Heading::North);
        }
        level.push(TileKind::Finish, GridPos::new(leg, leg), Heading::North);
        level
    }

    /// Development level exercising every tile behavior: a speed pad, a
    /// jump over a gap, a fragile crossing, a wall, and one rotatable
    /// direction tool guarding the bend to the finish.
    pub fn test_level() -> Self {
        let mut level = Level::new(1.0);
        for z in 0..=2 {
            level.push(TileKind::Ground, GridPos::new(0, z), Heading::North);
        }
        level.push(TileKind::Speed, GridPos::new(0, 3), Heading::North);
        level.push(TileKind::Jump, GridPos::new(0, 4), Heading::North);
        // Gap at z = 5; the jump clears it.
        level.push(TileKind::Ground, GridPos::new(0, 6), Heading::North);
        level.push(TileKind::Fragile, GridPos::new(0, 7), Heading::North);
        level.push_tool(
            TileKind::Direction,
            GridPos::new(0, 8),
            Heading::West,
            ToolKind::Rotatable,
        );
        level.push(TileKind::Wall, GridPos::new(0, 9), Heading::North);
        for x in 1..=3 {
            level.push(TileKind::Ground, GridPos::new(x, 8), Heading::North);
        }
        level.push(TileKind::Finish, GridPos::new(3, 8), Heading::North);
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::layer;

    #[test]
    fn tile_under_classifies_by_cell() {
        let level = Level::test_level();
        let pos = GridPos::new(0, 4).to_world(1.0, level.rest_y());
        let tile = level.tile_under(pos, 1.0).expect("ground under jump cell");
        assert_eq!(tile.kind, TileKind::Jump);

        let gap = GridPos::new(0, 5).to_world(1.0, level.rest_y());
        assert!(level.tile_under(gap, 1.0).is_none());
    }

    #[test]
    fn forward_cast_sees_the_wall() {
        let level = Level::test_level();
        let pos = GridPos::new(0, 8).to_world(1.0, level.rest_y());
        let hit = level
            .cast(pos, Heading::North.vec(), 1.0, layer::OBSTACLE)
            .expect("wall ahead");
        assert_eq!(level.placement(hit.id).unwrap().kind, TileKind::Wall);
        assert!((hit.distance - 0.5).abs() < 1e-4);
    }

    #[test]
    fn broken_tiles_stop_casting_until_respawn() {
        let mut level = Level::test_level();
        let fragile_id = level
            .tiles
            .iter()
            .find(|t| t.kind == TileKind::Fragile)
            .unwrap()
            .id;
        let pos = GridPos::new(0, 7).to_world(1.0, level.rest_y());
        assert!(level.tile_under(pos, 1.0).is_some());

        level.break_tile(fragile_id, 0.5);
        assert!(level.tile_under(pos, 1.0).is_none());

        level.tick_broken(0.6);
        assert!(!level.is_broken(fragile_id));
        assert!(level.tile_under(pos, 1.0).is_some());
    }

    #[test]
    fn finish_center_hides_after_removal() {
        let mut level = Level::corridor(4);
        assert!(level.finish_center().is_some());
        level.remove_finish();
        assert!(level.finish_center().is_none());
        assert!(!level.within_finish(GridPos::new(0, 4).to_world(1.0, 0.5), 0.3));
    }

    #[test]
    fn tool_enumeration_reports_cells_and_facings() {
        let level = Level::test_level();
        let tools = level.tool_states();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].cell, GridPos::new(0, 8));
        assert_eq!(tools[0].facing, Heading::West);
        assert_eq!(tools[0].kind, ToolKind::Rotatable);
    }

    #[test]
    fn occupancy_blocks_functional_tiles_only() {
        let mut level = Level::corridor(3);
        // Plain ground and the finish trigger accept a tool on top.
        assert!(!level.cell_occupied(GridPos::new(0, 1), u32::MAX));
        assert!(!level.cell_occupied(GridPos::new(0, 3), u32::MAX));

        let busy = GridPos::new(2, 2);
        let id = level.push(TileKind::Jump, busy, Heading::North);
        assert!(level.cell_occupied(busy, u32::MAX));
        // A broken special tile frees its cell until it respawns.
        level.break_tile(id, 1.0);
        assert!(!level.cell_occupied(busy, u32::MAX));

        let walled = GridPos::new(3, 3);
        level.push(TileKind::Wall, walled, Heading::North);
        assert!(level.cell_occupied(walled, u32::MAX));
    }

    #[test]
    fn level_description_round_trips_through_serde() {
        let level = Level::test_level();
        let json = serde_json::to_string(&level).unwrap();
        let back: Level = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tiles.len(), level.tiles.len());
        assert_eq!(back.start_cell, level.start_cell);
        assert_eq!(back.tile_size, level.tile_size);
    }
}
