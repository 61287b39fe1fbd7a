//! Procedural gait generation.
//!
//! While the character is `Moving`, a single phase accumulator advances with
//! horizontal speed and each leg derives its hip and knee targets from
//! `phase + offset`. The right leg runs half a cycle behind the left, so the
//! two legs never swing forward together. Outside `Moving` the phase freezes
//! and targets ease back to neutral.

use std::f32::consts::{PI, TAU};

use bevy::prelude::*;

use crate::config::GaitConfig;
use crate::locomotion::LocomotionState;
use crate::movement::horizontal_direction;

/// Which leg.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegSide {
    Left,
    Right,
}

impl LegSide {
    /// Phase offset of this leg.
    pub fn phase_offset(self) -> f32 {
        match self {
            Self::Left => 0.0,
            Self::Right => PI,
        }
    }
}

/// Joint entities of one leg.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct GaitLeg {
    /// Which leg.
    pub side: LegSide,
    /// Body carrying the hip joint drive (the thigh).
    pub upper: Entity,
    /// Body carrying the knee joint drive (the shin), if any.
    pub lower: Option<Entity>,
}

/// Joint targets of one leg, in radians. Positive `upper` swings forward.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct LegPose {
    /// Hip target.
    pub upper: f32,
    /// Knee target. Negative flexes.
    pub lower: f32,
}

impl LegPose {
    /// Pose at phase `phi`.
    pub fn at_phase(phi: f32, config: &GaitConfig) -> Self {
        Self {
            upper: config.hip_swing * phi.sin(),
            lower: -config.knee_bend * phi.cos().max(0.0),
        }
    }

    fn scaled(self, factor: f32) -> Self {
        Self {
            upper: self.upper * factor,
            lower: self.lower * factor,
        }
    }

    fn is_finite(&self) -> bool {
        self.upper.is_finite() && self.lower.is_finite()
    }
}

/// Root-body motion the generator reads each step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaitMotion {
    /// Linear velocity of the root.
    pub velocity: Vec3,
    /// Rotation of the root.
    pub rotation: Quat,
}

/// Gait state of one ragdoll.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_ragdoll_controller::prelude::*;
///
/// let mut gait = GaitGenerator::biped(
///     (Entity::from_raw(1), Some(Entity::from_raw(2))),
///     (Entity::from_raw(3), Some(Entity::from_raw(4))),
/// );
/// let motion = GaitMotion { velocity: Vec3::NEG_Z, rotation: Quat::IDENTITY };
///
/// gait.step(LocomotionState::Standing, motion, 1.0 / 60.0, &GaitConfig::default());
/// assert_eq!(gait.phase(), 0.0);
///
/// gait.step(LocomotionState::Moving, motion, 1.0 / 60.0, &GaitConfig::default());
/// assert!(gait.phase() > 0.0);
/// ```
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct GaitGenerator {
    legs: Vec<GaitLeg>,
    poses: Vec<LegPose>,
    phase: f32,
    stride_sign: f32,
    active: bool,
}

impl GaitGenerator {
    /// Generator driving `legs`.
    pub fn new(legs: Vec<GaitLeg>) -> Self {
        let poses = vec![LegPose::default(); legs.len()];
        Self {
            legs,
            poses,
            phase: 0.0,
            stride_sign: 1.0,
            active: false,
        }
    }

    /// Two-legged generator from `(upper, lower)` pairs.
    pub fn biped(left: (Entity, Option<Entity>), right: (Entity, Option<Entity>)) -> Self {
        Self::new(vec![
            GaitLeg {
                side: LegSide::Left,
                upper: left.0,
                lower: left.1,
            },
            GaitLeg {
                side: LegSide::Right,
                upper: right.0,
                lower: right.1,
            },
        ])
    }

    /// Phase in `[0, 2π)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Driven legs.
    pub fn legs(&self) -> &[GaitLeg] {
        &self.legs
    }

    /// Current pose of every leg, in `legs()` order.
    pub fn poses(&self) -> &[LegPose] {
        &self.poses
    }

    /// Pose of the first leg on `side`.
    pub fn pose(&self, side: LegSide) -> Option<LegPose> {
        self.legs
            .iter()
            .position(|leg| leg.side == side)
            .map(|i| self.poses[i])
    }

    /// Whether the last step advanced the phase.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Advance one step.
    pub fn step(
        &mut self,
        state: LocomotionState,
        motion: GaitMotion,
        dt: f32,
        config: &GaitConfig,
    ) {
        if self.poses.len() != self.legs.len() {
            self.poses.resize(self.legs.len(), LegPose::default());
        }
        if self.stride_sign == 0.0 {
            self.stride_sign = 1.0;
        }

        let facing = if motion.rotation.is_finite() {
            horizontal_direction(motion.rotation * Vec3::NEG_Z)
        } else {
            None
        };

        self.active = state == LocomotionState::Moving && facing.is_some();
        let Some(facing) = facing.filter(|_| self.active) else {
            self.relax(dt, config);
            return;
        };

        let horizontal = Vec3::new(motion.velocity.x, 0.0, motion.velocity.z);
        let speed = if horizontal.is_finite() {
            horizontal.length()
        } else {
            0.0
        };
        let forward_speed = if horizontal.is_finite() {
            horizontal.dot(facing)
        } else {
            0.0
        };
        if forward_speed.abs() > 0.05 {
            self.stride_sign = forward_speed.signum();
        }

        let frequency = config.cadence + config.cadence_per_speed * speed;
        self.phase = (self.phase + TAU * frequency * dt).rem_euclid(TAU);

        for (leg, pose) in self.legs.iter().zip(self.poses.iter_mut()) {
            let mut next = LegPose::at_phase(self.phase + leg.side.phase_offset(), config);
            next.upper *= self.stride_sign;
            if next.is_finite() {
                *pose = next;
            }
        }
    }

    fn relax(&mut self, dt: f32, config: &GaitConfig) {
        let keep = 1.0 - (config.relax_rate * dt).clamp(0.0, 1.0);
        for pose in &mut self.poses {
            *pose = pose.scaled(keep);
        }
    }

    /// Phase back to zero and legs at neutral.
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.stride_sign = 1.0;
        self.active = false;
        for pose in &mut self.poses {
            *pose = LegPose::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn biped() -> GaitGenerator {
        GaitGenerator::biped(
            (Entity::from_raw(1), Some(Entity::from_raw(2))),
            (Entity::from_raw(3), Some(Entity::from_raw(4))),
        )
    }

    fn walking(speed: f32) -> GaitMotion {
        GaitMotion {
            velocity: Vec3::NEG_Z * speed,
            rotation: Quat::IDENTITY,
        }
    }

    #[test]
    fn phase_frozen_outside_moving() {
        let config = GaitConfig::default();
        let mut gait = biped();
        for state in [
            LocomotionState::Standing,
            LocomotionState::Airborne,
            LocomotionState::Fallen,
        ] {
            gait.step(state, walking(2.0), DT, &config);
            assert_eq!(gait.phase(), 0.0);
            assert!(!gait.is_active());
        }
    }

    #[test]
    fn phase_advances_faster_with_speed() {
        let config = GaitConfig::default();
        let mut slow = biped();
        let mut fast = biped();
        slow.step(LocomotionState::Moving, walking(0.5), DT, &config);
        fast.step(LocomotionState::Moving, walking(3.0), DT, &config);
        assert!(fast.phase() > slow.phase());
        assert!(slow.phase() > 0.0);
    }

    #[test]
    fn phase_stays_in_range() {
        let config = GaitConfig::default();
        let mut gait = biped();
        for _ in 0..1000 {
            gait.step(LocomotionState::Moving, walking(3.0), DT, &config);
            assert!((0.0..TAU).contains(&gait.phase()));
        }
    }

    #[test]
    fn legs_alternate() {
        let config = GaitConfig::default();
        let threshold = 10f32.to_radians();
        let mut gait = biped();

        let mut active = 0;
        let mut both_forward = 0;
        for _ in 0..300 {
            gait.step(LocomotionState::Moving, walking(2.0), DT, &config);
            let left = gait.pose(LegSide::Left).unwrap().upper;
            let right = gait.pose(LegSide::Right).unwrap().upper;
            if left > threshold || right > threshold {
                active += 1;
            }
            if left > threshold && right > threshold {
                both_forward += 1;
            }
        }
        assert!(active > 0);
        assert!((both_forward as f32) < 0.1 * active as f32);
    }

    #[test]
    fn knee_flexes_during_forward_swing() {
        let config = GaitConfig::default();
        let pose = LegPose::at_phase(0.0, &config);
        assert!((pose.lower + config.knee_bend).abs() < 1e-5);
        let stance = LegPose::at_phase(PI, &config);
        assert_eq!(stance.lower, 0.0);
    }

    #[test]
    fn targets_relax_toward_neutral() {
        let config = GaitConfig::default();
        let mut gait = biped();
        for _ in 0..20 {
            gait.step(LocomotionState::Moving, walking(2.0), DT, &config);
        }
        let moving = gait.pose(LegSide::Left).unwrap();
        let phase = gait.phase();

        for _ in 0..120 {
            gait.step(LocomotionState::Standing, walking(0.0), DT, &config);
        }
        let relaxed = gait.pose(LegSide::Left).unwrap();
        assert!(relaxed.upper.abs() < moving.upper.abs().max(1e-3));
        assert!(relaxed.upper.abs() < 1e-3);
        assert_eq!(gait.phase(), phase);
    }

    #[test]
    fn walking_backward_reverses_swing() {
        let config = GaitConfig::default();
        let mut forward = biped();
        let mut backward = biped();
        forward.step(LocomotionState::Moving, walking(2.0), DT, &config);
        backward.step(LocomotionState::Moving, walking(-2.0), DT, &config);

        let f = forward.pose(LegSide::Left).unwrap().upper;
        let b = backward.pose(LegSide::Left).unwrap().upper;
        assert!(f > 0.0);
        assert!((f + b).abs() < 1e-5);
    }

    #[test]
    fn vertical_facing_short_circuits_to_neutral() {
        let config = GaitConfig::default();
        let mut gait = biped();
        let motion = GaitMotion {
            velocity: Vec3::NEG_Z * 2.0,
            rotation: Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
        };
        gait.step(LocomotionState::Moving, motion, DT, &config);
        assert!(!gait.is_active());
        assert_eq!(gait.phase(), 0.0);
        assert!(gait.poses().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn non_finite_motion_produces_finite_targets() {
        let config = GaitConfig::default();
        let mut gait = biped();
        let motion = GaitMotion {
            velocity: Vec3::new(f32::NAN, 0.0, f32::INFINITY),
            rotation: Quat::IDENTITY,
        };
        for _ in 0..10 {
            gait.step(LocomotionState::Moving, motion, DT, &config);
        }
        assert!(gait.phase().is_finite());
        assert!(gait.poses().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn reset_returns_to_neutral() {
        let config = GaitConfig::default();
        let mut gait = biped();
        for _ in 0..10 {
            gait.step(LocomotionState::Moving, walking(2.0), DT, &config);
        }
        gait.reset();
        assert_eq!(gait.phase(), 0.0);
        assert!(gait.poses().iter().all(|p| *p == LegPose::default()));
    }
}
