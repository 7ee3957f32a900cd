use bevy::prelude::Vec3;
use serde::{Deserialize, Serialize};

/// Snap a world position to the tile lattice in the horizontal plane.
/// The vertical coordinate is left untouched.
pub fn snap(pos: Vec3, tile_size: f32) -> Vec3 {
    Vec3::new(
        (pos.x / tile_size).round() * tile_size,
        pos.y,
        (pos.z / tile_size).round() * tile_size,
    )
}

/// Integer lattice cell. Two world positions are the same cell iff their
/// snapped (x, z) coordinates match; y never participates.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub z: i32,
}

impl GridPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub fn from_world(pos: Vec3, tile_size: f32) -> Self {
        Self {
            x: (pos.x / tile_size).round() as i32,
            z: (pos.z / tile_size).round() as i32,
        }
    }

    /// Center of this cell in world space, at the given height.
    pub fn to_world(self, tile_size: f32, y: f32) -> Vec3 {
        Vec3::new(self.x as f32 * tile_size, y, self.z as f32 * tile_size)
    }

    pub fn offset(self, heading: Heading, cells: i32) -> Self {
        let step = heading.step();
        Self {
            x: self.x + step.0 * cells,
            z: self.z + step.1 * cells,
        }
    }
}

/// One of the four cardinal unit vectors in the horizontal plane.
/// Rotations move between them in 90 degree steps only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Heading {
    /// +Z
    North,
    /// +X
    East,
    /// -Z
    South,
    /// -X
    West,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    pub fn vec(self) -> Vec3 {
        match self {
            Heading::North => Vec3::Z,
            Heading::East => Vec3::X,
            Heading::South => Vec3::NEG_Z,
            Heading::West => Vec3::NEG_X,
        }
    }

    /// Integer (x, z) step of one cell along this heading.
    pub fn step(self) -> (i32, i32) {
        match self {
            Heading::North => (0, 1),
            Heading::East => (1, 0),
            Heading::South => (0, -1),
            Heading::West => (-1, 0),
        }
    }

    /// Rotate by quarter turns; positive is clockwise viewed from above
    /// (North -> East -> South -> West).
    pub fn turned(self, quarter_turns: i8) -> Heading {
        let idx = match self {
            Heading::North => 0i8,
            Heading::East => 1,
            Heading::South => 2,
            Heading::West => 3,
        };
        match (idx + quarter_turns).rem_euclid(4) {
            0 => Heading::North,
            1 => Heading::East,
            2 => Heading::South,
            _ => Heading::West,
        }
    }

    pub fn opposite(self) -> Heading {
        self.turned(2)
    }

    /// Rotation about the vertical axis in degrees, with North at zero.
    pub fn angle_deg(self) -> i32 {
        match self {
            Heading::North => 0,
            Heading::East => 90,
            Heading::South => 180,
            Heading::West => 270,
        }
    }

    /// Number of +90 degree turns from North; the canonical-key encoding.
    pub fn index(self) -> u8 {
        (self.angle_deg() / 90) as u8
    }

    /// Nearest cardinal heading for an arbitrary horizontal vector.
    /// Returns `None` for a degenerate (near-zero) input.
    pub fn from_vec(v: Vec3) -> Option<Heading> {
        if v.x.abs() < 1e-4 && v.z.abs() < 1e-4 {
            return None;
        }
        Some(if v.x.abs() >= v.z.abs() {
            if v.x >= 0.0 {
                Heading::East
            } else {
                Heading::West
            }
        } else if v.z >= 0.0 {
            Heading::North
        } else {
            Heading::South
        })
    }

    /// Reflect this heading off a surface with the given (axis-aligned)
    /// outward normal. A head-on wall sends the cube straight back; a side
    /// wall mirrors the perpendicular component.
    pub fn reflected(self, normal: Vec3) -> Heading {
        let d = self.vec();
        let n = normal.normalize_or_zero();
        let r = d - 2.0 * d.dot(n) * n;
        Heading::from_vec(r).unwrap_or_else(|| self.opposite())
    }

    /// Angle between two headings in degrees (0, 90 or 180).
    pub fn angle_to(self, other: Heading) -> f32 {
        let diff = (self.angle_deg() - other.angle_deg()).rem_euclid(360);
        (diff.min(360 - diff)) as f32
    }
}
