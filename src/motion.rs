use bevy::prelude::*;
use serde::Serialize;

use crate::components::{layer, GameConfig};
use crate::grid::{self, GridPos, Heading};
use crate::level::{LevelQuery, TileKind};

/// Discrete motion states. `Rotating` and `Jumping` carry their own
/// elapsed-time counters and completion predicates; there is no suspended
/// control flow anywhere in the model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MotionState {
    Grounded,
    Falling { speed: f32 },
    Rotating { from: Heading, to: Heading, progress: f32 },
    Jumping { origin: Vec3, target: Vec3, elapsed: f32 },
}

impl MotionState {
    pub fn name(&self) -> &'static str {
        match self {
            MotionState::Grounded => "grounded",
            MotionState::Falling { .. } => "falling",
            MotionState::Rotating { .. } => "rotating",
            MotionState::Jumping { .. } => "jumping",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum TurnCause {
    Tile,
    Obstacle,
}

/// Transition notifications produced by a tick, for the event bus and tests.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum MotionEvent {
    TookOff,
    Landed,
    TurnStarted { to: Heading, cause: TurnCause },
    TurnFinished { heading: Heading },
    JumpStarted { target: GridPos },
    JumpLanded { cell: GridPos },
    CollisionStarted,
    BoostStarted,
}

/// Per-tick state machine advancing the cube's pose from the grid state
/// and the tile underfoot. The live run executes this every fixed step,
/// and the solver's idealized moves must agree with what it does.
#[derive(Component, Clone, Debug)]
pub struct CubeMotion {
    pub position: Vec3,
    pub heading: Heading,
    pub state: MotionState,
    /// When false, velocity is forced to zero every tick regardless of state.
    pub movement_enabled: bool,
    pub velocity: Vec3,
    /// Seconds of speed boost remaining; zero when not boosted.
    pub boost_left: f32,
    /// Seconds until the colliding flag auto-clears; zero when clear.
    pub collide_left: f32,
    entry_cell: GridPos,
    entry_point: Vec3,
}

impl CubeMotion {
    pub fn new(position: Vec3, heading: Heading, tile_size: f32) -> Self {
        let snapped = grid::snap(position, tile_size);
        Self {
            position: snapped,
            heading,
            state: MotionState::Grounded,
            movement_enabled: false,
            velocity: Vec3::ZERO,
            boost_left: 0.0,
            collide_left: 0.0,
            entry_cell: GridPos::from_world(snapped, tile_size),
            entry_point: snapped,
        }
    }

    pub fn is_boosted(&self) -> bool {
        self.boost_left > 0.0
    }

    pub fn is_colliding(&self) -> bool {
        self.collide_left > 0.0
    }

    pub fn cell(&self, tile_size: f32) -> GridPos {
        GridPos::from_world(self.position, tile_size)
    }

    /// Facing rotation for dependent visual transforms, interpolated
    /// through an active turn.
    pub fn facing_quat(&self) -> Quat {
        match self.state {
            MotionState::Rotating { from, to, progress } => {
                let a = Quat::from_rotation_y((from.angle_deg() as f32).to_radians());
                let b = Quat::from_rotation_y((to.angle_deg() as f32).to_radians());
                a.slerp(b, progress.clamp(0.0, 1.0))
            }
            _ => Quat::from_rotation_y((self.heading.angle_deg() as f32).to_radians()),
        }
    }

    /// Return to a rest pose: locked rotation, no overlays, no motion.
    pub fn reset(&mut self, position: Vec3, heading: Heading, tile_size: f32) {
        let snapped = grid::snap(position, tile_size);
        self.position = snapped;
        self.heading = heading;
        self.state = MotionState::Grounded;
        self.velocity = Vec3::ZERO;
        self.boost_left = 0.0;
        self.collide_left = 0.0;
        self.entry_cell = GridPos::from_world(snapped, tile_size);
        self.entry_point = snapped;
    }

    /// External turn request. Dropped unless grounded: at most one
    /// rotation is active and a jump cannot be interrupted.
    pub fn request_turn(&mut self, to: Heading) -> bool {
        if !matches!(self.state, MotionState::Grounded) || self.heading == to {
            return false;
        }
        self.state = MotionState::Rotating {
            from: self.heading,
            to,
            progress: 0.0,
        };
        self.velocity = Vec3::ZERO;
        true
    }

    /// Direct pose application for planned moves. Dropped while a jump is
    /// in flight; never queued.
    pub fn try_apply_move(&mut self, position: Vec3, heading: Heading, tile_size: f32) -> bool {
        if matches!(self.state, MotionState::Jumping { .. }) {
            return false;
        }
        self.position = grid::snap(position, tile_size);
        self.heading = heading;
        self.state = MotionState::Grounded;
        self.velocity = Vec3::ZERO;
        self.entry_cell = GridPos::from_world(self.position, tile_size);
        self.entry_point = self.position - heading.vec() * (0.5 * tile_size);
        true
    }

    /// Advance one fixed tick against the scene.
    pub fn step(&mut self, query: &impl LevelQuery, cfg: &GameConfig, dt: f32) -> Vec<MotionEvent> {
        let mut events = Vec::new();

        if !self.movement_enabled {
            self.velocity = Vec3::ZERO;
            return events;
        }

        // Overlay timers keep counting through every state.
        if self.collide_left > 0.0 {
            self.collide_left = (self.collide_left - dt).max(0.0);
        }
        if self.boost_left > 0.0 {
            self.boost_left = (self.boost_left - dt).max(0.0);
        }

        match self.state {
            MotionState::Falling { speed } => self.step_falling(speed, query, cfg, dt, &mut events),
            MotionState::Rotating { from, to, progress } => {
                self.step_rotating(from, to, progress, query.tile_size(), cfg, dt, &mut events)
            }
            MotionState::Jumping { origin, target, elapsed } => {
                self.step_jumping(origin, target, elapsed, query, cfg, dt, &mut events)
            }
            MotionState::Grounded => self.step_grounded(query, cfg, dt, &mut events),
        }

        events
    }

    fn step_grounded(
        &mut self,
        query: &impl LevelQuery,
        cfg: &GameConfig,
        dt: f32,
        events: &mut Vec<MotionEvent>,
    ) {
        // Ground contact is re-checked every tick.
        if query
            .cast(self.position, Vec3::NEG_Y, cfg.ground_probe, layer::GROUND)
            .is_none()
        {
            self.state = MotionState::Falling { speed: 0.0 };
            self.velocity = Vec3::ZERO;
            events.push(MotionEvent::TookOff);
            return;
        }

        self.track_cell_entry(query.tile_size());

        if self.evaluate_tile(query, cfg, events) {
            return;
        }

        // Forward obstacle: flag the contact and bounce off its normal.
        if let Some(hit) = query.cast(
            self.position,
            self.heading.vec(),
            cfg.check_distance,
            layer::OBSTACLE,
        ) {
            if !self.is_colliding() {
                events.push(MotionEvent::CollisionStarted);
            }
            self.collide_left = cfg.collide_reset_delay;
            let to = self.heading.reflected(hit.normal);
            self.velocity = Vec3::ZERO;
            self.state = MotionState::Rotating {
                from: self.heading,
                to,
                progress: 0.0,
            };
            events.push(MotionEvent::TurnStarted {
                to,
                cause: TurnCause::Obstacle,
            });
            return;
        }

        let speed = if self.is_boosted() {
            cfg.speed * cfg.boost_factor
        } else {
            cfg.speed
        };
        self.velocity = self.heading.vec() * speed;
        self.position += self.velocity * dt;
        self.track_cell_entry(query.tile_size());
    }

    /// React to the tile directly underfoot. Returns true when the tick
    /// was consumed by a started transition (turn or jump).
    fn evaluate_tile(
        &mut self,
        query: &impl LevelQuery,
        cfg: &GameConfig,
        events: &mut Vec<MotionEvent>,
    ) -> bool {
        let ts = query.tile_size();
        let Some(tile) = query.tile_under(self.position, cfg.ground_probe) else {
            return false;
        };
        let (kind, facing, tile_cell) = (tile.kind, tile.facing, tile.cell);

        match kind {
            TileKind::Direction => {
                if self.heading.angle_to(facing) > cfg.angle_tolerance_deg
                    && self.passed_half_cell(ts)
                {
                    self.velocity = Vec3::ZERO;
                    self.state = MotionState::Rotating {
                        from: self.heading,
                        to: facing,
                        progress: 0.0,
                    };
                    events.push(MotionEvent::TurnStarted {
                        to: facing,
                        cause: TurnCause::Tile,
                    });
                    return true;
                }
            }
            TileKind::Jump => {
                let center = tile_cell.to_world(ts, self.position.y);
                if (self.position - center).length() <= cfg.jump_trigger_frac * ts {
                    let reach = cfg.jump_distance
                        * ts
                        * if self.is_boosted() {
                            cfg.boost_jump_multiplier
                        } else {
                            1.0
                        };
                    let target = grid::snap(self.position + self.heading.vec() * reach, ts);
                    events.push(MotionEvent::JumpStarted {
                        target: GridPos::from_world(target, ts),
                    });
                    self.velocity = Vec3::ZERO;
                    self.state = MotionState::Jumping {
                        origin: self.position,
                        target,
                        elapsed: 0.0,
                    };
                    return true;
                }
            }
            TileKind::Speed => {
                // Re-entry restarts the clock; boosts never stack.
                if !self.is_boosted() {
                    events.push(MotionEvent::BoostStarted);
                }
                self.boost_left = cfg.boost_duration;
            }
            _ => {}
        }
        false
    }

    fn step_rotating(
        &mut self,
        from: Heading,
        to: Heading,
        progress: f32,
        tile_size: f32,
        cfg: &GameConfig,
        dt: f32,
        events: &mut Vec<MotionEvent>,
    ) {
        self.velocity = Vec3::ZERO;
        let progress = progress + dt * cfg.rotation_speed;
        if progress < 1.0 {
            self.state = MotionState::Rotating { from, to, progress };
            return;
        }
        // Completion: heading snaps exactly, position snaps to the lattice.
        self.heading = to;
        self.position = grid::snap(self.position, tile_size);
        self.state = MotionState::Grounded;
        self.entry_cell = GridPos::from_world(self.position, tile_size);
        self.entry_point = self.position;
        events.push(MotionEvent::TurnFinished { heading: to });
    }

    fn step_jumping(
        &mut self,
        origin: Vec3,
        target: Vec3,
        elapsed: f32,
        query: &impl LevelQuery,
        cfg: &GameConfig,
        dt: f32,
        events: &mut Vec<MotionEvent>,
    ) {
        // Gravity and ground checks are suspended for the whole flight.
        let elapsed = elapsed + dt;
        let t = (elapsed / cfg.jump_duration.max(1e-3)).min(1.0);
        let flat = origin.lerp(target, t);
        let arc = (std::f32::consts::PI * t).sin() * cfg.jump_height;
        self.position = Vec3::new(flat.x, origin.y + arc, flat.z);
        self.velocity = Vec3::ZERO;

        if t < 1.0 {
            self.state = MotionState::Jumping {
                origin,
                target,
                elapsed,
            };
            return;
        }

        let ts = query.tile_size();
        self.position = target;
        self.state = MotionState::Grounded;
        let cell = GridPos::from_world(target, ts);
        self.entry_cell = cell;
        // Landing counts as entering from the approach edge, so a chained
        // tile is already past its midpoint.
        self.entry_point = target - self.heading.vec() * (0.5 * ts);
        events.push(MotionEvent::JumpLanded { cell });

        // Chained activation: the landing tile acts this same tick.
        self.evaluate_tile(query, cfg, events);
    }

    fn step_falling(
        &mut self,
        speed: f32,
        query: &impl LevelQuery,
        cfg: &GameConfig,
        dt: f32,
        events: &mut Vec<MotionEvent>,
    ) {
        if let Some(hit) = query.cast(self.position, Vec3::NEG_Y, cfg.ground_probe, layer::GROUND) {
            // Contact restored: settle on the surface with rotation locked
            // and gravity off.
            self.position.y = hit.point.y + query.tile_size() * 0.5;
            self.state = MotionState::Grounded;
            self.velocity = Vec3::ZERO;
            events.push(MotionEvent::Landed);
            return;
        }
        let speed = speed + cfg.gravity * dt;
        self.position.y -= speed * dt;
        self.velocity = Vec3::NEG_Y * speed;
        self.state = MotionState::Falling { speed };
    }

    fn track_cell_entry(&mut self, tile_size: f32) {
        let cell = GridPos::from_world(self.position, tile_size);
        if cell != self.entry_cell {
            self.entry_cell = cell;
            self.entry_point = self.position;
        }
    }

    fn passed_half_cell(&self, tile_size: f32) -> bool {
        (self.position - self.entry_point).dot(self.heading.vec()) >= 0.5 * tile_size
    }
}
