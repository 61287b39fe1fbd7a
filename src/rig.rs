//! Ready-made humanoid ragdoll for Rapier3D.
//!
//! Spawns a pelvis-rooted biped: torso on a spine hinge, and per leg a thigh,
//! shin and foot on hip, knee and ankle hinges about the body's X axis. Each
//! foot carries a trigger sensor child for ground detection. The pelvis gets
//! the full controller bundle with a gait driving hips and knees.

use bevy::prelude::*;
use bevy_rapier3d::geometry::Group;
use bevy_rapier3d::prelude::*;

use crate::config::RagdollConfig;
use crate::controller::RagdollControllerBundle;
use crate::drive::{DriveParams, JointDrive};
use crate::error::{ensure_positive, ConfigError};
use crate::gait::GaitGenerator;
use crate::ground::GroundSensor;
use crate::rapier::RagdollBodyBundle;

/// Segment masses, joint motors and foot friction of a [`HumanoidRig`].
///
/// Segment sizes are fixed; masses and motors are the tuning knobs. Motors
/// are force based, so springs are in N·m/rad and dampers in N·m·s/rad. A
/// knee has to hold roughly half the rig's weight on a half-metre lever even
/// at the airborne multiplier, which puts the floor around 150 N·m/rad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumanoidRigConfig {
    pub pelvis_mass: f32,
    pub torso_mass: f32,
    pub thigh_mass: f32,
    pub shin_mass: f32,
    pub foot_mass: f32,
    pub spine_drive: DriveParams,
    pub hip_drive: DriveParams,
    pub knee_drive: DriveParams,
    pub ankle_drive: DriveParams,
    pub foot_friction: f32,
}

impl Default for HumanoidRigConfig {
    fn default() -> Self {
        Self {
            pelvis_mass: 10.0,
            torso_mass: 20.0,
            thigh_mass: 7.0,
            shin_mass: 4.0,
            foot_mass: 1.0,
            spine_drive: DriveParams::new(2000.0, 150.0, 3000.0),
            hip_drive: DriveParams::new(1200.0, 100.0, 2000.0),
            knee_drive: DriveParams::new(1500.0, 120.0, 2000.0),
            ankle_drive: DriveParams::new(1200.0, 80.0, 1500.0),
            foot_friction: 1.0,
        }
    }
}

impl HumanoidRigConfig {
    /// Sum of all segment masses.
    pub fn total_mass(&self) -> f32 {
        self.pelvis_mass
            + self.torso_mass
            + 2.0 * (self.thigh_mass + self.shin_mass + self.foot_mass)
    }

    /// Check masses and motors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (segment, mass) in [
            ("pelvis", self.pelvis_mass),
            ("torso", self.torso_mass),
            ("thigh", self.thigh_mass),
            ("shin", self.shin_mass),
            ("foot", self.foot_mass),
        ] {
            if !(mass > 0.0 && mass.is_finite()) {
                return Err(ConfigError::InvalidSegmentMass { segment, mass });
            }
        }
        for (field, drive) in [
            ("spine_drive.spring", self.spine_drive),
            ("hip_drive.spring", self.hip_drive),
            ("knee_drive.spring", self.knee_drive),
            ("ankle_drive.spring", self.ankle_drive),
        ] {
            ensure_positive(field, drive.spring)?;
        }
        ensure_positive("foot_friction", self.foot_friction)
    }
}

/// Entities of a spawned humanoid, left leg first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HumanoidRig {
    /// Pelvis, the controller root.
    pub root: Entity,
    pub torso: Entity,
    pub thighs: [Entity; 2],
    pub shins: [Entity; 2],
    pub feet: [Entity; 2],
    /// Sensor collider under each foot.
    pub sensors: [Entity; 2],
}

const PELVIS_HALF: Vec3 = Vec3::new(0.16, 0.08, 0.1);
const TORSO_HALF: Vec3 = Vec3::new(0.18, 0.22, 0.11);
const FOOT_HALF: Vec3 = Vec3::new(0.06, 0.04, 0.12);
const SENSOR_HALF: Vec3 = Vec3::new(0.07, 0.06, 0.13);
const LIMB_HALF_HEIGHT: f32 = 0.18;
const LIMB_RADIUS: f32 = 0.05;
const LIMB_HALF_LENGTH: f32 = LIMB_HALF_HEIGHT + LIMB_RADIUS;
const HIP_OFFSET: f32 = 0.1;

const FOOT_Y: f32 = 0.04;
const SHIN_Y: f32 = 0.31;
const THIGH_Y: f32 = 0.77;
const PELVIS_Y: f32 = 1.06;
const TORSO_Y: f32 = 1.36;

fn hinge(anchor1: Vec3, anchor2: Vec3, drive: DriveParams) -> RevoluteJoint {
    RevoluteJointBuilder::new(Vec3::X)
        .local_anchor1(anchor1)
        .local_anchor2(anchor2)
        .motor_model(MotorModel::ForceBased)
        .motor_position(0.0, drive.spring, drive.damper)
        .motor_max_force(drive.max_force)
        .build()
}

fn part(position: Vec3, collider: Collider, mass: f32) -> impl Bundle {
    (
        Transform::from_translation(position),
        RagdollBodyBundle::new(),
        collider,
        ColliderMassProperties::Mass(mass),
        CollisionGroups::new(Group::GROUP_2, Group::ALL),
    )
}

impl HumanoidRig {
    /// Spawn a standing humanoid with its feet on the plane `y = origin.y`.
    pub fn spawn(
        world: &mut World,
        origin: Vec3,
        rig: &HumanoidRigConfig,
        config: RagdollConfig,
    ) -> Result<Self, ConfigError> {
        rig.validate()?;
        let controller = RagdollControllerBundle::new(config)?;

        let root = world
            .spawn(part(
                origin + Vec3::Y * PELVIS_Y,
                Collider::cuboid(PELVIS_HALF.x, PELVIS_HALF.y, PELVIS_HALF.z),
                rig.pelvis_mass,
            ))
            .id();

        let spine = hinge(
            Vec3::Y * PELVIS_HALF.y,
            Vec3::NEG_Y * TORSO_HALF.y,
            rig.spine_drive,
        );
        let torso = world
            .spawn((
                part(
                    origin + Vec3::Y * TORSO_Y,
                    Collider::cuboid(TORSO_HALF.x, TORSO_HALF.y, TORSO_HALF.z),
                    rig.torso_mass,
                ),
                ImpulseJoint::new(root, spine),
                JointDrive::new(rig.spine_drive),
            ))
            .id();

        let mut thighs = [Entity::PLACEHOLDER; 2];
        let mut shins = [Entity::PLACEHOLDER; 2];
        let mut feet = [Entity::PLACEHOLDER; 2];
        let mut sensors = [Entity::PLACEHOLDER; 2];

        for (i, side) in [-1.0_f32, 1.0].into_iter().enumerate() {
            let x = side * HIP_OFFSET;

            let hip = hinge(
                Vec3::new(x, -(PELVIS_Y - THIGH_Y - LIMB_HALF_LENGTH), 0.0),
                Vec3::Y * LIMB_HALF_LENGTH,
                rig.hip_drive,
            );
            thighs[i] = world
                .spawn((
                    part(
                        origin + Vec3::new(x, THIGH_Y, 0.0),
                        Collider::capsule_y(LIMB_HALF_HEIGHT, LIMB_RADIUS),
                        rig.thigh_mass,
                    ),
                    ImpulseJoint::new(root, hip),
                    JointDrive::new(rig.hip_drive),
                ))
                .id();

            let knee = hinge(
                Vec3::NEG_Y * LIMB_HALF_LENGTH,
                Vec3::Y * LIMB_HALF_LENGTH,
                rig.knee_drive,
            );
            shins[i] = world
                .spawn((
                    part(
                        origin + Vec3::new(x, SHIN_Y, 0.0),
                        Collider::capsule_y(LIMB_HALF_HEIGHT, LIMB_RADIUS),
                        rig.shin_mass,
                    ),
                    ImpulseJoint::new(thighs[i], knee),
                    JointDrive::new(rig.knee_drive),
                ))
                .id();

            let ankle = hinge(
                Vec3::NEG_Y * LIMB_HALF_LENGTH,
                Vec3::Y * FOOT_HALF.y,
                rig.ankle_drive,
            );
            feet[i] = world
                .spawn((
                    part(
                        origin + Vec3::new(x, FOOT_Y, 0.0),
                        Collider::cuboid(FOOT_HALF.x, FOOT_HALF.y, FOOT_HALF.z),
                        rig.foot_mass,
                    ),
                    Friction::coefficient(rig.foot_friction),
                    ImpulseJoint::new(shins[i], ankle),
                    JointDrive::new(rig.ankle_drive),
                ))
                .id();

            let sensor = GroundSensor::try_new(feet[i], config.ground_layers)?;
            sensors[i] = world
                .spawn((
                    Transform::default(),
                    Collider::cuboid(SENSOR_HALF.x, SENSOR_HALF.y, SENSOR_HALF.z),
                    Sensor,
                    ActiveEvents::COLLISION_EVENTS,
                    CollisionGroups::new(
                        Group::GROUP_3,
                        Group::from_bits_truncate(config.ground_layers.bits()),
                    ),
                    ColliderMassProperties::Density(0.0),
                    sensor,
                    ChildOf(feet[i]),
                ))
                .id();
        }

        let gait = GaitGenerator::biped(
            (thighs[0], Some(shins[0])),
            (thighs[1], Some(shins[1])),
        );
        world
            .entity_mut(root)
            .insert(controller.with_gait(gait));

        info!("spawned humanoid ragdoll {root} at {origin}");
        Ok(Self {
            root,
            torso,
            thighs,
            shins,
            feet,
            sensors,
        })
    }

    /// Every rigid body of the rig, root first.
    pub fn bodies(&self) -> Vec<Entity> {
        let mut bodies = vec![self.root, self.torso];
        for i in 0..2 {
            bodies.extend([self.thighs[i], self.shins[i], self.feet[i]]);
        }
        bodies
    }
}
