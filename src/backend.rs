//! Physics backend abstraction.
//!
//! The controller never talks to a physics engine directly. Everything it
//! needs, from reading body state and applying forces to walking joints and
//! steering joint motors, goes through [`RagdollPhysicsBackend`], so the same
//! systems run on Rapier or any other engine with jointed rigid bodies.

use bevy::prelude::*;

use crate::body_graph::JointLink;
use crate::drive::{DriveAxis, DriveParams};

/// Trait for physics backend implementations.
///
/// All methods are static and operate on the ECS [`World`]; the controller's
/// systems are exclusive and call them in a fixed order every step. Methods
/// reading a missing body return neutral values instead of failing.
///
/// For an implementation see `Rapier3dBackend` in the `rapier` module.
pub trait RagdollPhysicsBackend: 'static + Send + Sync {
    /// Returns the plugin that sets up this backend.
    fn plugin() -> impl Plugin;

    /// Every joint in the scene.
    fn joint_links(world: &mut World) -> Vec<JointLink>;

    /// Enable or disable collision between the two bodies of a joint.
    fn set_joint_collision(world: &mut World, link: &JointLink, enabled: bool);

    /// Whether the two bodies of a joint may collide, `None` if unknown.
    fn joint_collision_enabled(_world: &World, _link: &JointLink) -> Option<bool> {
        None
    }

    /// Live motor settings of the joint on `joint` about `axis`.
    ///
    /// `None` when the backend has no motor state for it.
    fn get_joint_drive(world: &World, joint: Entity, axis: DriveAxis) -> Option<DriveParams>;

    /// Steer the joint motor toward `target` radians with `params`.
    fn set_joint_drive(
        world: &mut World,
        joint: Entity,
        axis: DriveAxis,
        target: f32,
        params: DriveParams,
    );

    /// Get the current linear velocity of a body.
    fn get_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the linear velocity of a body.
    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3);

    /// Get the current angular velocity of a body.
    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3;

    /// Set the angular velocity of a body.
    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3);

    /// Apply an impulse (instantaneous momentum change) to a body.
    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3);

    /// Apply a force for the coming physics step.
    fn apply_force(world: &mut World, entity: Entity, force: Vec3);

    /// Apply a torque for the coming physics step.
    fn apply_torque(world: &mut World, entity: Entity, torque: Vec3);

    /// Get the world rotation of a body.
    fn get_rotation(world: &World, entity: Entity) -> Quat;

    /// Get the world position of a body.
    fn get_position(world: &World, entity: Entity) -> Vec3;

    /// Get the fixed timestep length in seconds.
    fn get_fixed_timestep(world: &World) -> f32;

    /// Get the mass of a body.
    fn get_mass(_world: &World, _entity: Entity) -> f32 {
        1.0
    }

    /// Get the largest principal moment of inertia of a body.
    ///
    /// Used to turn angular-acceleration gains into torques.
    fn get_principal_inertia(_world: &World, _entity: Entity) -> f32 {
        1.0
    }
}

/// Empty plugin for backends that don't need additional setup.
pub struct NoOpBackendPlugin;

impl Plugin for NoOpBackendPlugin {
    fn build(&self, _app: &mut App) {}
}
