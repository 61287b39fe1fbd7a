//! Upright balance and fall classification.
//!
//! The [`BalanceController`] lives on the ragdoll root. Each step it fuses the
//! foot sensors into a grounded flag, measures how far the root leans from
//! vertical, decides whether the character has fallen, and produces the PD
//! torque that pushes the root back upright.
//!
//! Falling is hysteretic. The fall criteria must hold for
//! `fall_confirm_time` before `Fallen` is reported, and the recovery criteria
//! (a tighter angle) must hold for `recover_time` before it clears.

use std::f32::consts::PI;

use bevy::prelude::*;

use crate::config::BalanceConfig;
use crate::ground::GroundContact;

/// Deterministic overrides of the balance signals.
///
/// `None` lets the measured value through.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceOverride {
    /// Forced grounded flag.
    pub grounded: Option<bool>,
    /// Forced fallen flag.
    pub fallen: Option<bool>,
}

/// Balance state of one ragdoll.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct BalanceController {
    grounded: bool,
    fallen: bool,
    contact: GroundContact,
    tilt: f32,
    height_above_support: Option<f32>,
    fall_timer: f32,
    recover_timer: f32,
    overrides: BalanceOverride,
}

impl BalanceController {
    /// Fresh, upright, not grounded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grounded flag, after overrides.
    pub fn is_grounded(&self) -> bool {
        self.overrides.grounded.unwrap_or(self.grounded)
    }

    /// Fallen flag, after overrides.
    pub fn is_fallen(&self) -> bool {
        self.overrides.fallen.unwrap_or(self.fallen)
    }

    /// Last fused sensor state.
    pub fn contact(&self) -> GroundContact {
        self.contact
    }

    /// Last measured tilt from vertical (radians).
    pub fn tilt(&self) -> f32 {
        self.tilt
    }

    /// Last measured root height above the lowest registered body.
    pub fn height_above_support(&self) -> Option<f32> {
        self.height_above_support
    }

    /// Force the grounded flag, or release it with `None`.
    pub fn set_ground_override(&mut self, grounded: Option<bool>) {
        self.overrides.grounded = grounded;
    }

    /// Force the fallen flag, or release it with `None`.
    pub fn set_fallen_override(&mut self, fallen: Option<bool>) {
        self.overrides.fallen = fallen;
    }

    /// Active overrides.
    pub fn overrides(&self) -> BalanceOverride {
        self.overrides
    }

    /// Release every override.
    pub fn clear_overrides(&mut self) {
        self.overrides = BalanceOverride::default();
    }

    /// Fold this step's sensor state in.
    pub fn update_ground(&mut self, contact: GroundContact) {
        self.contact = contact;
        self.grounded = contact.is_grounded();
    }

    /// Advance fall detection with this step's posture.
    ///
    /// `height_above_support` is the root height above the lowest body of
    /// the ragdoll, `None` when it cannot be measured.
    pub fn update_posture(
        &mut self,
        rotation: Quat,
        height_above_support: Option<f32>,
        dt: f32,
        config: &BalanceConfig,
    ) {
        self.tilt = tilt_angle(rotation);
        self.height_above_support = height_above_support.filter(|h| h.is_finite());

        let collapsed = match (self.height_above_support, config.min_root_height) {
            (Some(height), Some(min)) => height < min,
            _ => false,
        };

        if self.fallen {
            let recovered = self.tilt < config.recover_angle && !collapsed;
            if recovered {
                self.recover_timer += dt;
                if self.recover_timer >= config.recover_time {
                    self.fallen = false;
                    self.fall_timer = 0.0;
                    self.recover_timer = 0.0;
                }
            } else {
                self.recover_timer = 0.0;
            }
        } else {
            let falling = self.tilt > config.fall_angle || collapsed;
            if falling {
                self.fall_timer += dt;
                if self.fall_timer >= config.fall_confirm_time {
                    self.fallen = true;
                    self.fall_timer = 0.0;
                    self.recover_timer = 0.0;
                }
            } else {
                self.fall_timer = 0.0;
            }
        }
    }

    /// Drive multiplier to publish on the airborne channel.
    pub fn drive_multiplier(&self, config: &BalanceConfig) -> f32 {
        if self.is_grounded() {
            1.0
        } else {
            config.airborne_drive_multiplier
        }
    }

    /// PD torque pushing the root upright.
    ///
    /// Zero while fallen or when disabled. Yaw rate is not damped, so turning
    /// is left to the heading controller. `inertia` converts the angular
    /// acceleration gains into torque.
    pub fn upright_torque(
        &self,
        rotation: Quat,
        angular_velocity: Vec3,
        inertia: f32,
        config: &BalanceConfig,
    ) -> Vec3 {
        if !config.upright_torque_enabled || self.is_fallen() {
            return Vec3::ZERO;
        }

        let error = upright_error(rotation);
        let tilt_rate = angular_velocity - Vec3::Y * angular_velocity.y;
        let acceleration = error * config.upright_strength - tilt_rate * config.upright_damping;
        let mut torque = acceleration * inertia;

        if let Some(max) = config.max_upright_torque {
            torque = torque.clamp_length_max(max);
        }
        if torque.is_finite() {
            torque
        } else {
            Vec3::ZERO
        }
    }

    /// Back to the spawn state. Overrides are kept.
    pub fn reset(&mut self) {
        *self = Self {
            overrides: self.overrides,
            ..Self::default()
        };
    }
}

/// One registered body, sampled for [`composite_inertia`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodySample {
    pub position: Vec3,
    pub mass: f32,
    /// Largest principal moment of inertia of the body itself.
    pub inertia: f32,
    pub angular_velocity: Vec3,
}

/// Whole-ragdoll inertia about the root and its rotation rate.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq)]
pub struct CompositeInertia {
    /// Sum of every body's own inertia plus `m·d²` about the root (kg·m²).
    pub inertia: f32,
    /// Angular velocity of the bodies, weighted by their share of `inertia`.
    pub angular_velocity: Vec3,
}

/// Inertia of the ragdoll about `root`, treating the joints as rigid.
///
/// The upright torque acts on the root but has to tip the whole rig, so its
/// gains are scaled by this. The weighted angular velocity barely sees a
/// light root wobbling against its neighbours, which keeps the damping term
/// from fighting the joint motors. Non-finite samples are skipped.
pub fn composite_inertia(
    root: Vec3,
    bodies: impl IntoIterator<Item = BodySample>,
) -> CompositeInertia {
    let mut inertia = 0.0;
    let mut momentum = Vec3::ZERO;
    for body in bodies {
        let offset = body.position - root;
        let weight = body.inertia.max(0.0) + body.mass.max(0.0) * offset.length_squared();
        if !weight.is_finite() || !body.angular_velocity.is_finite() {
            continue;
        }
        inertia += weight;
        momentum += body.angular_velocity * weight;
    }
    if inertia <= 0.0 {
        return CompositeInertia::default();
    }
    CompositeInertia {
        inertia,
        angular_velocity: momentum / inertia,
    }
}

/// Angle between the body's up axis and world up, in `[0, π]`.
///
/// Non-finite rotations read as upright so a corrupt pose never latches a
/// fall on its own.
pub fn tilt_angle(rotation: Quat) -> f32 {
    if !rotation.is_finite() {
        return 0.0;
    }
    let up = rotation.normalize() * Vec3::Y;
    up.dot(Vec3::Y).clamp(-1.0, 1.0).acos()
}

/// Rotation vector (axis × angle) taking the body's up axis to world up.
///
/// Fully inverted bodies rotate about their own right axis.
pub fn upright_error(rotation: Quat) -> Vec3 {
    if !rotation.is_finite() {
        return Vec3::ZERO;
    }
    let rotation = rotation.normalize();
    let up = rotation * Vec3::Y;
    let axis = up.cross(Vec3::Y);
    let sin = axis.length();
    let cos = up.dot(Vec3::Y);

    if sin < 1e-6 {
        if cos > 0.0 {
            return Vec3::ZERO;
        }
        return (rotation * Vec3::X).normalize_or_zero() * PI;
    }
    axis / sin * sin.atan2(cos)
}
