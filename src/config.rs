//! Controller configuration.
//!
//! [`RagdollConfig`] carries every spawn-time constant of the balance,
//! locomotion and gait layers. The controller never derives these values on
//! its own; games tune them through presets and `with_*` builders, and
//! [`RagdollConfig::validate`] rejects nonsense before a character exists.

use std::f32::consts::{FRAC_PI_3, FRAC_PI_6};

use bevy::prelude::*;

use crate::error::{ensure_positive, ensure_range, ConfigError};
use crate::ground::GroundLayers;

/// How locomotion, jump and climb forces are spread over the ragdoll.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForceDistribution {
    /// The root receives the force for the whole registered mass. Joints drag
    /// the rest of the body along.
    #[default]
    Root,
    /// Every registered body receives a share proportional to its own mass.
    AllBodies,
}

/// Upright balance and fall detection settings.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct BalanceConfig {
    /// Whether the upright torque is applied at all.
    pub upright_torque_enabled: bool,
    /// Proportional gain, as angular acceleration per radian of tilt (1/s²).
    pub upright_strength: f32,
    /// Damping gain on tilt angular velocity (1/s).
    pub upright_damping: f32,
    /// Optional cap on the upright torque magnitude (N·m).
    pub max_upright_torque: Option<f32>,
    /// Tilt from vertical beyond which the character is falling (radians).
    pub fall_angle: f32,
    /// Root height above the lowest body below which the character is
    /// collapsed. `None` disables the height criterion.
    pub min_root_height: Option<f32>,
    /// Time the fall criteria must hold before `Fallen` is reported (s).
    pub fall_confirm_time: f32,
    /// Tilt below which a fallen character counts as upright again (radians).
    pub recover_angle: f32,
    /// Time the recovery criteria must hold before `Fallen` clears (s).
    pub recover_time: f32,
    /// Drive multiplier published while no foot touches the ground.
    pub airborne_drive_multiplier: f32,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            upright_torque_enabled: true,
            upright_strength: 300.0,
            upright_damping: 30.0,
            max_upright_torque: None,
            fall_angle: FRAC_PI_3,
            min_root_height: Some(0.25),
            fall_confirm_time: 0.3,
            recover_angle: FRAC_PI_6,
            recover_time: 0.5,
            airborne_drive_multiplier: 0.15,
        }
    }
}

/// Locomotion, jump and climb settings.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct MovementConfig {
    /// Horizontal speed at full input (m/s). Soft cap: no velocity clamping.
    pub max_speed: f32,
    /// Maximum horizontal acceleration the locomotion force produces (m/s²).
    pub acceleration: f32,
    /// Input magnitude at or below which the character is standing.
    pub input_deadzone: f32,
    /// Upward velocity change of the jump impulse (m/s).
    pub jump_speed: f32,
    /// How long a jump press stays valid when it cannot fire immediately (s).
    /// Zero means the press is only considered on the step it happens.
    pub jump_buffer_time: f32,
    /// Upward acceleration while climbing (m/s²). Must exceed gravity to
    /// make progress.
    pub climb_acceleration: f32,
    /// Yaw gain turning the root toward the movement direction (1/s²).
    pub turn_strength: f32,
    /// Yaw damping gain (1/s).
    pub turn_damping: f32,
    /// Where forces are applied.
    pub distribution: ForceDistribution,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            acceleration: 15.0,
            input_deadzone: 0.1,
            jump_speed: 5.0,
            jump_buffer_time: 0.0,
            climb_acceleration: 14.0,
            turn_strength: 40.0,
            turn_damping: 8.0,
            distribution: ForceDistribution::Root,
        }
    }
}

/// Procedural gait settings.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct GaitConfig {
    /// Stride frequency at zero speed (cycles/s).
    pub cadence: f32,
    /// Extra stride frequency per m/s of horizontal speed.
    pub cadence_per_speed: f32,
    /// Peak hip swing either side of neutral (radians).
    pub hip_swing: f32,
    /// Peak knee flexion during the swing phase (radians).
    pub knee_bend: f32,
    /// Rate at which targets return to neutral while not moving (1/s).
    pub relax_rate: f32,
}

impl Default for GaitConfig {
    fn default() -> Self {
        Self {
            cadence: 1.0,
            cadence_per_speed: 0.6,
            hip_swing: 0.5,
            knee_bend: 0.7,
            relax_rate: 6.0,
        }
    }
}

/// Spawn-time configuration of one ragdoll character.
///
/// # Example
///
/// ```rust
/// use msg_ragdoll_controller::prelude::*;
///
/// let config = RagdollConfig::player()
///     .with_max_speed(4.0)
///     .with_jump_speed(6.0);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, PartialEq, Default)]
#[reflect(Component)]
pub struct RagdollConfig {
    /// Upright torque and fall detection.
    pub balance: BalanceConfig,
    /// Locomotion, jump and climb forces.
    pub movement: MovementConfig,
    /// Leg swing generation.
    pub gait: GaitConfig,
    /// Layers the foot sensors accept as ground.
    pub ground_layers: GroundLayers,
}

impl RagdollConfig {
    /// Responsive tuning for player characters.
    pub fn player() -> Self {
        Self {
            movement: MovementConfig {
                max_speed: 3.5,
                acceleration: 18.0,
                jump_speed: 5.5,
                ..default()
            },
            ..default()
        }
    }

    /// Slower, steadier tuning for autonomous characters.
    pub fn ai() -> Self {
        Self {
            balance: BalanceConfig {
                upright_strength: 350.0,
                upright_damping: 35.0,
                ..default()
            },
            movement: MovementConfig {
                max_speed: 2.5,
                acceleration: 12.0,
                turn_strength: 30.0,
                ..default()
            },
            ..default()
        }
    }

    /// Set the upright torque gains.
    pub fn with_upright_torque(mut self, strength: f32, damping: f32) -> Self {
        self.balance.upright_strength = strength;
        self.balance.upright_damping = damping;
        self
    }

    /// Enable or disable the upright torque.
    pub fn with_upright_torque_enabled(mut self, enabled: bool) -> Self {
        self.balance.upright_torque_enabled = enabled;
        self
    }

    /// Set the fall angle and the time it must be exceeded.
    pub fn with_fall_detection(mut self, angle: f32, confirm_time: f32) -> Self {
        self.balance.fall_angle = angle;
        self.balance.fall_confirm_time = confirm_time;
        self
    }

    /// Set the collapse height criterion.
    pub fn with_min_root_height(mut self, height: Option<f32>) -> Self {
        self.balance.min_root_height = height;
        self
    }

    /// Set the drive multiplier used while airborne.
    pub fn with_airborne_drive_multiplier(mut self, multiplier: f32) -> Self {
        self.balance.airborne_drive_multiplier = multiplier;
        self
    }

    /// Set maximum speed and acceleration.
    pub fn with_movement(mut self, max_speed: f32, acceleration: f32) -> Self {
        self.movement.max_speed = max_speed;
        self.movement.acceleration = acceleration;
        self
    }

    /// Set maximum horizontal speed.
    pub fn with_max_speed(mut self, max_speed: f32) -> Self {
        self.movement.max_speed = max_speed;
        self
    }

    /// Set the input deadzone.
    pub fn with_input_deadzone(mut self, deadzone: f32) -> Self {
        self.movement.input_deadzone = deadzone;
        self
    }

    /// Set the jump velocity change.
    pub fn with_jump_speed(mut self, speed: f32) -> Self {
        self.movement.jump_speed = speed;
        self
    }

    /// Set the jump buffer window.
    pub fn with_jump_buffer_time(mut self, time: f32) -> Self {
        self.movement.jump_buffer_time = time;
        self
    }

    /// Set the climbing acceleration.
    pub fn with_climb_acceleration(mut self, acceleration: f32) -> Self {
        self.movement.climb_acceleration = acceleration;
        self
    }

    /// Set how forces are spread over the body.
    pub fn with_distribution(mut self, distribution: ForceDistribution) -> Self {
        self.movement.distribution = distribution;
        self
    }

    /// Set the stride frequency model.
    pub fn with_cadence(mut self, cadence: f32, per_speed: f32) -> Self {
        self.gait.cadence = cadence;
        self.gait.cadence_per_speed = per_speed;
        self
    }

    /// Set the swing amplitudes.
    pub fn with_swing(mut self, hip_swing: f32, knee_bend: f32) -> Self {
        self.gait.hip_swing = hip_swing;
        self.gait.knee_bend = knee_bend;
        self
    }

    /// Set the ground layer mask.
    pub fn with_ground_layers(mut self, layers: GroundLayers) -> Self {
        self.ground_layers = layers;
        self
    }

    /// Check every constant. Called by the rig builder before spawning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.balance;
        ensure_positive("upright_strength", b.upright_strength)?;
        ensure_positive("upright_damping", b.upright_damping)?;
        if let Some(max) = b.max_upright_torque {
            ensure_positive("max_upright_torque", max)?;
        }
        ensure_range("fall_angle", b.fall_angle, 0.0, std::f32::consts::PI)?;
        ensure_range("recover_angle", b.recover_angle, 0.0, b.fall_angle)?;
        if let Some(height) = b.min_root_height {
            ensure_positive("min_root_height", height)?;
        }
        ensure_range("fall_confirm_time", b.fall_confirm_time, 0.0, f32::MAX)?;
        ensure_range("recover_time", b.recover_time, 0.0, f32::MAX)?;
        ensure_range(
            "airborne_drive_multiplier",
            b.airborne_drive_multiplier,
            0.0,
            1.0,
        )?;

        let m = &self.movement;
        ensure_positive("max_speed", m.max_speed)?;
        ensure_positive("acceleration", m.acceleration)?;
        ensure_range("input_deadzone", m.input_deadzone, 0.0, 1.0)?;
        ensure_positive("jump_speed", m.jump_speed)?;
        ensure_range("jump_buffer_time", m.jump_buffer_time, 0.0, f32::MAX)?;
        ensure_range("climb_acceleration", m.climb_acceleration, 0.0, f32::MAX)?;
        ensure_range("turn_strength", m.turn_strength, 0.0, f32::MAX)?;
        ensure_range("turn_damping", m.turn_damping, 0.0, f32::MAX)?;

        let g = &self.gait;
        ensure_positive("cadence", g.cadence)?;
        ensure_range("cadence_per_speed", g.cadence_per_speed, 0.0, f32::MAX)?;
        ensure_range("hip_swing", g.hip_swing, 0.0, std::f32::consts::FRAC_PI_2)?;
        ensure_range("knee_bend", g.knee_bend, 0.0, std::f32::consts::PI)?;
        ensure_positive("relax_rate", g.relax_rate)?;

        if self.ground_layers.is_empty() {
            return Err(ConfigError::EmptyGroundMask);
        }
        Ok(())
    }
}
