//! Rapier3D physics backend implementation.
//!
//! This module provides the physics backend for Bevy Rapier3D.
//! Enable with the `rapier3d` feature.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;

use crate::backend::RagdollPhysicsBackend;
use crate::body_graph::JointLink;
use crate::controller::RagdollForces;
use crate::drive::{DriveAxis, DriveParams};
use crate::ground::GroundSensor;
use crate::RagdollControllerSet;

/// Rapier3D physics backend for the ragdoll controller.
///
/// Joints are [`ImpulseJoint`]s living on the child body, drives are the
/// joint's position motors, and forces go through [`RagdollForces`] so the
/// controller's contribution to [`ExternalForce`] is replaced every step
/// instead of piling up. Ground contacts arrive as Rapier collision events,
/// handled by a dedicated system in [`Rapier3dBackendPlugin`].
pub struct Rapier3dBackend;

fn joint_axis(axis: DriveAxis) -> JointAxis {
    match axis {
        DriveAxis::X => JointAxis::AngX,
        DriveAxis::Y => JointAxis::AngY,
        DriveAxis::Z => JointAxis::AngZ,
    }
}

impl RagdollPhysicsBackend for Rapier3dBackend {
    fn plugin() -> impl Plugin {
        Rapier3dBackendPlugin
    }

    fn joint_links(world: &mut World) -> Vec<JointLink> {
        world
            .query::<(Entity, &ImpulseJoint)>()
            .iter(world)
            .map(|(entity, joint)| JointLink::new(entity, joint.parent, entity))
            .collect()
    }

    fn set_joint_collision(world: &mut World, link: &JointLink, enabled: bool) {
        // Only touch the joint when the flag differs, so Rapier doesn't
        // rebuild it every time a ragdoll is registered.
        if Self::joint_collision_enabled(world, link) == Some(enabled) {
            return;
        }
        if let Some(mut joint) = world.get_mut::<ImpulseJoint>(link.joint) {
            let generic: &mut GenericJoint = joint.data.as_mut();
            generic.set_contacts_enabled(enabled);
        }
    }

    fn joint_collision_enabled(world: &World, link: &JointLink) -> Option<bool> {
        world.get::<ImpulseJoint>(link.joint).map(|joint| {
            let generic: &GenericJoint = joint.data.as_ref();
            generic.contacts_enabled()
        })
    }

    fn get_joint_drive(world: &World, joint: Entity, axis: DriveAxis) -> Option<DriveParams> {
        let joint = world.get::<ImpulseJoint>(joint)?;
        let generic: &GenericJoint = joint.data.as_ref();
        generic
            .motor(joint_axis(axis))
            .map(|motor| DriveParams::new(motor.stiffness, motor.damping, motor.max_force))
    }

    fn set_joint_drive(
        world: &mut World,
        joint: Entity,
        axis: DriveAxis,
        target: f32,
        params: DriveParams,
    ) {
        let axis = joint_axis(axis);
        let unchanged = world.get::<ImpulseJoint>(joint).is_some_and(|joint| {
            let generic: &GenericJoint = joint.data.as_ref();
            generic.motor(axis).is_some_and(|motor| {
                motor.target_pos == target
                    && motor.stiffness == params.spring
                    && motor.damping == params.damper
                    && motor.max_force == params.max_force
            })
        });
        if unchanged {
            return;
        }

        if let Some(mut joint) = world.get_mut::<ImpulseJoint>(joint) {
            let generic: &mut GenericJoint = joint.data.as_mut();
            generic.set_motor_position(axis, target, params.spring, params.damper);
            generic.set_motor_max_force(axis, params.max_force);
        }
    }

    fn get_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.linvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_velocity(world: &mut World, entity: Entity, velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel = velocity;
        }
    }

    fn get_angular_velocity(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Velocity>(entity)
            .map(|v| v.angvel)
            .unwrap_or(Vec3::ZERO)
    }

    fn set_angular_velocity(world: &mut World, entity: Entity, angular_velocity: Vec3) {
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.angvel = angular_velocity;
        }
    }

    fn apply_impulse(world: &mut World, entity: Entity, impulse: Vec3) {
        if !impulse.is_finite() {
            return;
        }
        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.impulse += impulse;
            return;
        }
        // Fallback: apply as velocity change if no ExternalImpulse component
        let mass = Self::get_mass(world, entity);
        if let Some(mut vel) = world.get_mut::<Velocity>(entity) {
            vel.linvel += impulse / mass;
        }
    }

    fn apply_force(world: &mut World, entity: Entity, force: Vec3) {
        // Accumulate into RagdollForces; apply_ragdoll_forces flushes the sum
        // into ExternalForce at the end of the step.
        if let Some(mut forces) = world.get_mut::<RagdollForces>(entity) {
            forces.add_force(force);
            return;
        }
        // Without an accumulator, a force over one step is an impulse.
        let dt = Self::get_fixed_timestep(world);
        Self::apply_impulse(world, entity, force * dt);
    }

    fn apply_torque(world: &mut World, entity: Entity, torque: Vec3) {
        if let Some(mut forces) = world.get_mut::<RagdollForces>(entity) {
            forces.add_torque(torque);
            return;
        }
        if !torque.is_finite() {
            return;
        }
        let dt = Self::get_fixed_timestep(world);
        if let Some(mut ext_impulse) = world.get_mut::<ExternalImpulse>(entity) {
            ext_impulse.torque_impulse += torque * dt;
        }
    }

    fn get_rotation(world: &World, entity: Entity) -> Quat {
        world
            .get::<Transform>(entity)
            .map(|t| t.rotation)
            .or_else(|| {
                world
                    .get::<GlobalTransform>(entity)
                    .map(|t| t.to_scale_rotation_translation().1)
            })
            .unwrap_or(Quat::IDENTITY)
    }

    fn get_position(world: &World, entity: Entity) -> Vec3 {
        world
            .get::<Transform>(entity)
            .map(|t| t.translation)
            .or_else(|| world.get::<GlobalTransform>(entity).map(|t| t.translation()))
            .unwrap_or(Vec3::ZERO)
    }

    fn get_fixed_timestep(world: &World) -> f32 {
        world
            .get_resource::<Time<Fixed>>()
            .map(|t| t.timestep().as_secs_f32())
            .filter(|&d| d > 0.0)
            .unwrap_or(1.0 / 60.0)
    }

    fn get_mass(world: &World, entity: Entity) -> f32 {
        // Rapier fills ReadMassProperties after the body's first step; until
        // then fall back to an explicit collider mass.
        if let Some(mass) = world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.mass)
            .filter(|&m| m > 0.0 && m.is_finite())
        {
            return mass;
        }
        match world.get::<ColliderMassProperties>(entity) {
            Some(ColliderMassProperties::Mass(mass)) if *mass > 0.0 => *mass,
            _ => 1.0,
        }
    }

    fn get_principal_inertia(world: &World, entity: Entity) -> f32 {
        world
            .get::<ReadMassProperties>(entity)
            .map(|props| props.principal_inertia.max_element())
            .filter(|&i| i > 0.0 && i.is_finite())
            .unwrap_or_else(|| 0.1 * Self::get_mass(world, entity))
    }
}

/// Plugin that sets up Rapier3D-specific systems for the ragdoll controller.
pub struct Rapier3dBackendPlugin;

impl Plugin for Rapier3dBackendPlugin {
    fn build(&self, app: &mut App) {
        // The whole controller step lands before Rapier reads the ECS.
        app.configure_sets(
            FixedUpdate,
            RagdollControllerSet::FinalApplication.before(PhysicsSet::SyncBackend),
        );

        // Preparation - Subtract last step's forces
        app.add_systems(
            FixedUpdate,
            clear_ragdoll_forces.in_set(RagdollControllerSet::Preparation),
        );

        // Sensors - Feed foot sensor contacts from collision events
        app.add_systems(
            FixedUpdate,
            rapier_ground_contacts.in_set(RagdollControllerSet::Sensors),
        );

        // Final Application - Apply accumulated forces to physics
        app.add_systems(
            FixedUpdate,
            apply_ragdoll_forces.in_set(RagdollControllerSet::FinalApplication),
        );
    }
}

/// Update [`GroundSensor`] contact sets from Rapier collision events.
///
/// The other collider's layers are its [`CollisionGroups`] memberships; a
/// collider without groups belongs to every layer.
fn rapier_ground_contacts(
    mut collision_events: EventReader<CollisionEvent>,
    mut q_sensors: Query<&mut GroundSensor>,
    q_groups: Query<&CollisionGroups>,
) {
    let memberships = |entity: Entity| {
        q_groups
            .get(entity)
            .map_or(u32::MAX, |groups| groups.memberships.bits())
    };

    for event in collision_events.read() {
        match *event {
            CollisionEvent::Started(a, b, _) => {
                for (sensor, other) in [(a, b), (b, a)] {
                    if let Ok(mut ground) = q_sensors.get_mut(sensor) {
                        if ground.on_enter(other, memberships(other)) {
                            trace!("sensor {sensor}: touching {other}");
                        }
                    }
                }
            }
            CollisionEvent::Stopped(a, b, _) => {
                for (sensor, other) in [(a, b), (b, a)] {
                    if let Ok(mut ground) = q_sensors.get_mut(sensor) {
                        ground.on_exit(other);
                    }
                }
            }
        }
    }
}

/// Clear ragdoll forces at the start of each step.
///
/// Subtracts what the controller applied last step from [`ExternalForce`], so
/// forces other systems wrote there are preserved while ours are replaced.
pub fn clear_ragdoll_forces(mut q: Query<(&mut ExternalForce, &mut RagdollForces)>) {
    for (mut ext_force, mut forces) in &mut q {
        let (force_to_subtract, torque_to_subtract) = forces.prepare_new_frame();
        ext_force.force -= force_to_subtract;
        ext_force.torque -= torque_to_subtract;
    }
}

/// Apply accumulated ragdoll forces at the end of each step.
pub fn apply_ragdoll_forces(mut q: Query<(&mut ExternalForce, &mut RagdollForces)>) {
    for (mut ext_force, mut forces) in &mut q {
        let (force_to_apply, torque_to_apply) = forces.finalize_frame();
        ext_force.force += force_to_apply;
        ext_force.torque += torque_to_apply;
    }
}

/// Rapier components for one ragdoll body.
///
/// # Defaults
///
/// - `rigid_body`: [`RigidBody::Dynamic`]
/// - `damping`: Linear 0.05, Angular 0.5 (keeps joint chains from jittering)
/// - `mass_properties`: Default (computed by Rapier from collider)
#[derive(Bundle, Default)]
pub struct RagdollBodyBundle {
    /// The rigid body type.
    pub rigid_body: RigidBody,
    /// Current linear and angular velocity. Updated by Rapier each physics step.
    pub velocity: Velocity,
    /// Forces integrated by Rapier. The controller owns only its own share.
    pub external_force: ExternalForce,
    /// Impulses for the coming step, used for jumps.
    pub external_impulse: ExternalImpulse,
    /// Damping coefficients for velocity reduction.
    pub damping: Damping,
    /// Computed mass properties. Rapier updates this based on the colliders.
    pub mass_properties: ReadMassProperties,
    /// Controller force accumulator.
    pub forces: RagdollForces,
}

impl RagdollBodyBundle {
    /// Create a dynamic ragdoll body.
    pub fn new() -> Self {
        Self {
            rigid_body: RigidBody::Dynamic,
            damping: Damping {
                linear_damping: 0.05,
                angular_damping: 0.5,
            },
            ..default()
        }
    }

    /// Set custom damping values.
    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.damping = Damping {
            linear_damping: linear,
            angular_damping: angular,
        };
        self
    }
}
