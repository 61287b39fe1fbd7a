//! Root hub component, force accumulator and spawn bundle.

use bevy::prelude::*;

use crate::balance::{BalanceController, CompositeInertia};
use crate::config::RagdollConfig;
use crate::drive::DriveMultipliers;
use crate::error::ConfigError;
use crate::gait::GaitGenerator;
use crate::intent::MovementIntent;
use crate::locomotion::LocomotionStateMachine;

/// Marks the root body of a ragdoll and caches per-step derived values.
///
/// The controller only drives entities carrying this component; everything
/// else about the character hangs off the body graph built from here.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct RagdollController {
    /// Sum of the masses of every registered body.
    pub total_mass: f32,
    /// Horizontal speed of the root (m/s).
    pub horizontal_speed: f32,
    /// Root height above the lowest registered body.
    pub height_above_support: Option<f32>,
    /// Inertia of the registered bodies about the root.
    pub composite: CompositeInertia,
}

impl RagdollController {
    /// Fresh hub. Values fill in after the first step.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-body force accumulator.
///
/// Controller systems add forces here during a step; the backend flushes the
/// sum once, after subtracting what it applied the step before, so forces
/// written by other systems into the engine's force component survive.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct RagdollForces {
    force: Vec3,
    torque: Vec3,
    applied_force: Vec3,
    applied_torque: Vec3,
}

impl RagdollForces {
    /// Add a force for this step.
    pub fn add_force(&mut self, force: Vec3) {
        if force.is_finite() {
            self.force += force;
        }
    }

    /// Add a torque for this step.
    pub fn add_torque(&mut self, torque: Vec3) {
        if torque.is_finite() {
            self.torque += torque;
        }
    }

    /// Force accumulated so far this step.
    pub fn accumulated_force(&self) -> Vec3 {
        self.force
    }

    /// Torque accumulated so far this step.
    pub fn accumulated_torque(&self) -> Vec3 {
        self.torque
    }

    /// Start a new step. Returns what was applied last step, to subtract.
    pub fn prepare_new_frame(&mut self) -> (Vec3, Vec3) {
        let previous = (self.applied_force, self.applied_torque);
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
        self.applied_force = Vec3::ZERO;
        self.applied_torque = Vec3::ZERO;
        previous
    }

    /// Finish the step. Returns what to apply and remembers it.
    pub fn finalize_frame(&mut self) -> (Vec3, Vec3) {
        self.applied_force = self.force;
        self.applied_torque = self.torque;
        (self.force, self.torque)
    }
}

/// Controller components for a ragdoll root.
///
/// Physics components are added separately; see the rig builder in the
/// `rig` module for a complete humanoid.
#[derive(Bundle, Default)]
pub struct RagdollControllerBundle {
    pub controller: RagdollController,
    pub config: RagdollConfig,
    pub balance: BalanceController,
    pub locomotion: LocomotionStateMachine,
    pub multipliers: DriveMultipliers,
    pub intent: MovementIntent,
    pub gait: GaitGenerator,
}

impl RagdollControllerBundle {
    /// Bundle with a validated configuration.
    pub fn new(config: RagdollConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..default()
        })
    }

    /// Drive these legs with the gait generator.
    pub fn with_gait(mut self, gait: GaitGenerator) -> Self {
        self.gait = gait;
        self
    }
}
