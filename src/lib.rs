//! # `msg_ragdoll_controller`
//!
//! A physics-driven humanoid ragdoll controller with physics backend abstraction.
//!
//! This crate keeps a jointed ragdoll standing and walking purely through
//! forces and joint motors:
//! - Discovers the ragdoll's bodies by walking its joints from a root body
//! - Detects ground contact with foot trigger sensors
//! - Applies an upright torque and detects falls with hysteresis
//! - Drives locomotion through a small state machine (standing, moving,
//!   airborne, fallen) with edge-triggered jumps and wall climbing
//! - Generates an alternating procedural gait on the leg joint motors
//! - Softens every joint motor in the air via drive-strength multipliers
//! - Abstracts the physics backend (Rapier3D included)
//!
//! ## Architecture
//!
//! Every fixed step runs a chain of system sets, see [`RagdollControllerSet`]:
//! 1. Input sources are sampled into each root's [`intent::MovementIntent`]
//! 2. New ragdolls get a body graph and joint drive baselines
//! 3. The backend feeds sensor contacts
//! 4. Balance updates grounded/fallen and pushes the root upright
//! 5. The locomotion state machine advances
//! 6. Movement forces, the gait and the joint drives are applied
//! 7. The backend flushes forces and state markers are synced
//!
//! ## Usage
//!
//! ```rust
//! use bevy::prelude::*;
//! use msg_ragdoll_controller::prelude::*;
//!
//! // Controller components for a ragdoll root
//! let bundle = RagdollControllerBundle::new(RagdollConfig::player()).unwrap();
//! assert_eq!(bundle.locomotion.state(), LocomotionState::Standing);
//!
//! // Spawn it on the root body together with its physics components
//! ```

use bevy::prelude::*;

pub mod backend;
pub mod balance;
pub mod body_graph;
pub mod config;
pub mod controller;
pub mod drive;
pub mod error;
pub mod gait;
pub mod ground;
pub mod intent;
pub mod locomotion;
pub mod movement;
pub mod state;
pub mod systems;

#[cfg(feature = "rapier3d")]
pub mod rapier;
#[cfg(feature = "rapier3d")]
pub mod rig;

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::backend::RagdollPhysicsBackend;
    pub use crate::balance::{BalanceController, BalanceOverride, CompositeInertia};
    pub use crate::body_graph::{BodyGraph, JointLink, RagdollPart};
    pub use crate::config::{
        BalanceConfig, ForceDistribution, GaitConfig, MovementConfig, RagdollConfig,
    };
    pub use crate::controller::{RagdollController, RagdollControllerBundle, RagdollForces};
    pub use crate::drive::{DriveAxis, DriveMultipliers, DriveParams, JointDrive, MultiplierSource};
    pub use crate::error::ConfigError;
    pub use crate::gait::{GaitGenerator, GaitLeg, GaitMotion, LegPose, LegSide};
    pub use crate::ground::{GroundContact, GroundLayers, GroundSensor};
    pub use crate::intent::{
        DirectInput, InputContext, InputSample, MovementInput, MovementInputSource,
        MovementIntent, SeekTargetInput,
    };
    pub use crate::locomotion::{
        JumpRequest, LocomotionSignals, LocomotionState, LocomotionStateMachine,
    };
    pub use crate::state::{Airborne, Fallen, Grounded};
    pub use crate::systems::reset_ragdoll;
    pub use crate::{RagdollControllerPlugin, RagdollControllerSet};

    #[cfg(feature = "rapier3d")]
    pub use crate::rapier::{Rapier3dBackend, RagdollBodyBundle};
    #[cfg(feature = "rapier3d")]
    pub use crate::rig::{HumanoidRig, HumanoidRigConfig};
}

/// Ordered phases of one controller step in `FixedUpdate`.
///
/// Backends hook their own systems into these sets; games can order their
/// systems relative to them.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RagdollControllerSet {
    /// Per-step resets and input sampling.
    Preparation,
    /// Body graph discovery and drive baseline capture.
    Topology,
    /// Sensor contact bookkeeping.
    Sensors,
    /// Grounded, fallen and upright torque.
    Balance,
    /// State machine.
    Locomotion,
    /// Forces, gait and joint drives.
    Actuation,
    /// Flush to the physics engine and marker sync.
    FinalApplication,
}

/// Main plugin for the ragdoll controller.
///
/// This plugin is generic over a physics backend `B` which provides the actual
/// physics operations (joint access, force application, etc.).
///
/// # Type Parameters
/// - `B`: The physics backend implementation (e.g., `Rapier3dBackend`)
///
/// # Examples
///
/// With Rapier3D backend:
/// ```rust,no_run
/// use bevy::prelude::*;
/// use bevy_rapier3d::prelude::*;
/// use msg_ragdoll_controller::prelude::*;
///
/// App::new()
///     .add_plugins(MinimalPlugins)
///     .add_plugins(RapierPhysicsPlugin::<NoUserData>::default().in_fixed_schedule())
///     .add_plugins(RagdollControllerPlugin::<Rapier3dBackend>::default())
///     .run();
/// ```
pub struct RagdollControllerPlugin<B: backend::RagdollPhysicsBackend> {
    _marker: std::marker::PhantomData<B>,
}

impl<B: backend::RagdollPhysicsBackend> Default for RagdollControllerPlugin<B> {
    fn default() -> Self {
        Self {
            _marker: std::marker::PhantomData,
        }
    }
}

impl<B: backend::RagdollPhysicsBackend> Plugin for RagdollControllerPlugin<B> {
    fn build(&self, app: &mut App) {
        // Register core types
        app.register_type::<controller::RagdollController>();
        app.register_type::<controller::RagdollForces>();
        app.register_type::<config::RagdollConfig>();
        app.register_type::<balance::BalanceController>();
        app.register_type::<body_graph::BodyGraph>();
        app.register_type::<body_graph::RagdollPart>();
        app.register_type::<drive::JointDrive>();
        app.register_type::<drive::DriveMultipliers>();
        app.register_type::<gait::GaitGenerator>();
        app.register_type::<ground::GroundSensor>();
        app.register_type::<intent::MovementIntent>();
        app.register_type::<locomotion::LocomotionStateMachine>();
        app.register_type::<state::Grounded>();
        app.register_type::<state::Airborne>();
        app.register_type::<state::Fallen>();

        app.configure_sets(
            FixedUpdate,
            (
                RagdollControllerSet::Preparation,
                RagdollControllerSet::Topology,
                RagdollControllerSet::Sensors,
                RagdollControllerSet::Balance,
                RagdollControllerSet::Locomotion,
                RagdollControllerSet::Actuation,
                RagdollControllerSet::FinalApplication,
            )
                .chain(),
        );

        // Add the physics backend plugin
        app.add_plugins(B::plugin());

        app.add_systems(
            FixedUpdate,
            systems::sample_movement_input::<B>.in_set(RagdollControllerSet::Preparation),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::build_body_graphs::<B>,
                systems::capture_drive_baselines::<B>,
            )
                .chain()
                .in_set(RagdollControllerSet::Topology),
        );
        app.add_systems(
            FixedUpdate,
            systems::update_balance::<B>.in_set(RagdollControllerSet::Balance),
        );
        app.add_systems(
            FixedUpdate,
            systems::update_locomotion_state::<B>.in_set(RagdollControllerSet::Locomotion),
        );
        app.add_systems(
            FixedUpdate,
            (
                systems::apply_movement::<B>,
                systems::update_gait::<B>,
                systems::apply_joint_drives::<B>,
            )
                .chain()
                .in_set(RagdollControllerSet::Actuation),
        );
        app.add_systems(
            FixedUpdate,
            systems::sync_state_markers.in_set(RagdollControllerSet::FinalApplication),
        );
    }
}
