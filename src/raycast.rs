use bevy::prelude::Vec3;

/// An axis-aligned box belonging to a scene layer set.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastTarget {
    pub id: u32,
    pub min: Vec3,
    pub max: Vec3,
    pub layers: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastHit {
    pub id: u32,
    pub point: Vec3,
    /// Outward normal of the face the ray entered through.
    pub normal: Vec3,
    pub distance: f32,
    pub layers: u32,
}

/// Slab-method ray vs AABB intersection. Returns the entry distance and
/// the axis (0..3) plus sign of the face crossed, or `None` on a miss.
fn ray_box_entry(
    origin: Vec3,
    dir_normalized: Vec3,
    max_distance: f32,
    min: Vec3,
    max: Vec3,
) -> Option<(f32, usize, f32)> {
    let mut tmin = 0.0f32;
    let mut tmax = max_distance.max(0.0);
    let mut entry_axis = 0usize;
    let mut entry_sign = 0.0f32;

    for axis in 0..3 {
        let (o, d, mn, mx) = match axis {
            0 => (origin.x, dir_normalized.x, min.x, max.x),
            1 => (origin.y, dir_normalized.y, min.y, max.y),
            _ => (origin.z, dir_normalized.z, min.z, max.z),
        };
        if d.abs() < 1e-6 {
            if o < mn || o > mx {
                return None;
            }
            continue;
        }
        let inv = 1.0 / d;
        let mut t1 = (mn - o) * inv;
        let mut t2 = (mx - o) * inv;
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 >= tmin {
            tmin = t1;
            entry_axis = axis;
            entry_sign = -d.signum();
        }
        tmax = tmax.min(t2);
        if tmin > tmax {
            return None;
        }
    }

    if tmax < 0.0 || tmin > max_distance {
        return None;
    }
    if entry_sign == 0.0 {
        // Origin inside the box; report straight back along the ray.
        return Some((0.0, entry_axis, 0.0));
    }
    Some((tmin, entry_axis, entry_sign))
}

/// Cast a ray against every target whose layers intersect `mask` and
/// return the nearest hit. This is the one probe primitive the motion
/// model and solver consume: ground checks, forward obstacle checks and
/// underfoot classification all route through it.
pub fn cast(
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
    mask: u32,
    targets: impl IntoIterator<Item = CastTarget>,
) -> Option<CastHit> {
    let len = direction.length();
    if len <= 1e-4 {
        return None;
    }
    let dir = direction / len;

    let mut best: Option<CastHit> = None;
    for target in targets {
        if target.layers & mask == 0 {
            continue;
        }
        if let Some((distance, axis, sign)) =
            ray_box_entry(origin, dir, max_distance, target.min, target.max)
        {
            if best.as_ref().is_some_and(|b| b.distance <= distance) {
                continue;
            }
            let mut normal = Vec3::ZERO;
            if sign != 0.0 {
                normal[axis] = sign;
            } else {
                normal = -dir;
            }
            best = Some(CastHit {
                id: target.id,
                point: origin + dir * distance,
                normal,
                distance,
                layers: target.layers,
            });
        }
    }
    best
}
