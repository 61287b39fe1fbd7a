//! Core controller systems.
//!
//! These systems run the ragdoll controller step by step. They are generic
//! over the physics backend and exclusive: each collects what it needs from
//! the world, then reads and writes bodies through the backend.

use bevy::prelude::*;

use crate::backend::RagdollPhysicsBackend;
use crate::balance::{composite_inertia, BalanceController, BodySample, CompositeInertia};
use crate::body_graph::{BodyGraph, RagdollPart};
use crate::config::RagdollConfig;
use crate::controller::RagdollController;
use crate::drive::{DriveAxis, DriveMultipliers, JointDrive, MultiplierSource};
use crate::gait::{GaitGenerator, GaitMotion};
use crate::ground::{GroundContact, GroundSensor};
use crate::intent::{InputContext, MovementInput, MovementIntent};
use crate::locomotion::{LocomotionSignals, LocomotionState, LocomotionStateMachine};
use crate::movement::{
    climb_acceleration, distribute, heading_acceleration, jump_velocity_change,
    locomotion_acceleration,
};
use crate::state::{Airborne, Fallen, Grounded};

/// Pull this step's sample from every injected input source.
pub fn sample_movement_input<B: RagdollPhysicsBackend>(world: &mut World) {
    let roots: Vec<Entity> = world
        .query_filtered::<Entity, (With<MovementInput>, With<MovementIntent>)>()
        .iter(world)
        .collect();
    if roots.is_empty() {
        return;
    }
    let dt = B::get_fixed_timestep(world);

    for root in roots {
        let context = InputContext {
            root_position: B::get_position(world, root),
            root_velocity: B::get_velocity(world, root),
            dt,
        };
        let sample = match world.get_mut::<MovementInput>(root) {
            Some(mut input) => input.sample(&context),
            None => continue,
        };
        if let Some(mut intent) = world.get_mut::<MovementIntent>(root) {
            intent.apply_sample(sample);
        }
    }
}

/// Discover the bodies of every new ragdoll.
///
/// Walks the backend's joints from each root without a [`BodyGraph`],
/// disables collision across every joint it crosses and tags each body with
/// [`RagdollPart`]. Runs once per ragdoll; remove the graph to rebuild.
pub fn build_body_graphs<B: RagdollPhysicsBackend>(world: &mut World) {
    let roots: Vec<Entity> = world
        .query_filtered::<Entity, (With<RagdollController>, Without<BodyGraph>)>()
        .iter(world)
        .collect();
    if roots.is_empty() {
        return;
    }

    let links = B::joint_links(world);
    let sensors: Vec<(Entity, Entity)> = world
        .query::<(Entity, &GroundSensor)>()
        .iter(world)
        .map(|(entity, sensor)| (entity, sensor.body()))
        .collect();

    for root in roots {
        let graph = BodyGraph::build(root, &links).with_sensors(sensors.iter().copied());

        for link in graph.links() {
            B::set_joint_collision(world, link, false);
        }
        for &body in graph.bodies() {
            if let Ok(mut entity) = world.get_entity_mut(body) {
                entity.insert(RagdollPart { root });
            }
        }

        if graph.sensors().is_empty() {
            warn!("ragdoll {root} has no ground sensors and will never report grounded");
        }
        info!(
            "ragdoll {root}: {} bodies, {} joints, {} ground sensors",
            graph.len(),
            graph.links().len(),
            graph.sensors().len()
        );
        world.entity_mut(root).insert(graph);
    }
}

/// Record the baseline drive of every joint that has none yet.
pub fn capture_drive_baselines<B: RagdollPhysicsBackend>(world: &mut World) {
    let pending: Vec<(Entity, DriveAxis)> = world
        .query::<(Entity, &JointDrive, &RagdollPart)>()
        .iter(world)
        .filter(|(_, drive, _)| !drive.is_captured())
        .map(|(entity, drive, _)| (entity, drive.axis()))
        .collect();

    for (entity, axis) in pending {
        let live = B::get_joint_drive(world, entity, axis);
        let Some(mut drive) = world.get_mut::<JointDrive>(entity) else {
            continue;
        };
        if drive.capture(live) {
            debug!("joint {entity}: drive baseline {:?}", drive.baseline());
        } else if drive.refused_captures() == 1 {
            warn!("joint {entity}: live drive has no spring yet, retrying next step");
        }
    }
}

/// Ground detection, fall detection and the upright torque.
pub fn update_balance<B: RagdollPhysicsBackend>(world: &mut World) {
    let roots: Vec<(Entity, RagdollConfig, BodyGraph)> = world
        .query_filtered::<(Entity, &RagdollConfig, &BodyGraph), With<BalanceController>>()
        .iter(world)
        .map(|(entity, config, graph)| (entity, *config, graph.clone()))
        .collect();
    let dt = B::get_fixed_timestep(world);

    for (root, config, graph) in roots {
        let contact = GroundContact::aggregate(
            graph
                .sensors()
                .iter()
                .filter_map(|&sensor| world.get::<GroundSensor>(sensor)),
        );

        let position = B::get_position(world, root);
        let rotation = B::get_rotation(world, root);
        let velocity = B::get_velocity(world, root);

        let samples: Vec<BodySample> = graph
            .bodies()
            .iter()
            .map(|&body| BodySample {
                position: B::get_position(world, body),
                mass: B::get_mass(world, body),
                inertia: B::get_principal_inertia(world, body),
                angular_velocity: B::get_angular_velocity(world, body),
            })
            .collect();
        let lowest = samples
            .iter()
            .skip(1)
            .map(|sample| sample.position.y)
            .fold(f32::INFINITY, f32::min);
        let height = lowest.is_finite().then(|| position.y - lowest);
        let total_mass: f32 = samples.iter().map(|sample| sample.mass).sum();
        let composite = composite_inertia(position, samples);

        let Some(mut balance) = world.get_mut::<BalanceController>(root) else {
            continue;
        };
        balance.update_ground(contact);
        balance.update_posture(rotation, height, dt, &config.balance);
        let grounded = balance.is_grounded();
        let multiplier = balance.drive_multiplier(&config.balance);
        let torque = balance.upright_torque(
            rotation,
            composite.angular_velocity,
            composite.inertia,
            &config.balance,
        );

        if let Some(mut multipliers) = world.get_mut::<DriveMultipliers>(root) {
            multipliers.tick(dt);
            if grounded {
                multipliers.clear(MultiplierSource::Airborne);
            } else {
                multipliers.set(MultiplierSource::Airborne, multiplier);
            }
        }

        if let Some(mut controller) = world.get_mut::<RagdollController>(root) {
            controller.total_mass = total_mass;
            controller.horizontal_speed = Vec2::new(velocity.x, velocity.z).length();
            controller.height_above_support = height;
            controller.composite = composite;
        }

        if torque != Vec3::ZERO {
            B::apply_torque(world, root, torque);
        }
    }
}

/// Advance the locomotion state machine from balance and intent.
pub fn update_locomotion_state<B: RagdollPhysicsBackend>(world: &mut World) {
    let roots: Vec<(Entity, RagdollConfig)> = world
        .query_filtered::<(Entity, &RagdollConfig), With<LocomotionStateMachine>>()
        .iter(world)
        .map(|(entity, config)| (entity, *config))
        .collect();
    let dt = B::get_fixed_timestep(world);

    for (root, config) in roots {
        let (grounded, fallen) = world
            .get::<BalanceController>(root)
            .map(|balance| (balance.is_grounded(), balance.is_fallen()))
            .unwrap_or_default();

        let signals = match world.get_mut::<MovementIntent>(root) {
            Some(mut intent) => LocomotionSignals {
                grounded,
                fallen,
                input_magnitude: intent.input_magnitude(),
                jump_edge: intent.take_jump_edge(),
                wall_grabbing: intent.is_wall_grabbing(),
            },
            None => LocomotionSignals {
                grounded,
                fallen,
                ..default()
            },
        };

        let transition = match world.get_mut::<LocomotionStateMachine>(root) {
            Some(mut machine) => machine.step(signals, dt, &config.movement),
            None => continue,
        };

        if let Some((LocomotionState::Fallen, _)) = transition {
            if let Some(mut gait) = world.get_mut::<GaitGenerator>(root) {
                gait.reset();
            }
        }
    }
}

/// Locomotion force, heading torque, jump impulse and climb force.
pub fn apply_movement<B: RagdollPhysicsBackend>(world: &mut World) {
    let roots: Vec<(Entity, RagdollConfig, Vec<Entity>)> = world
        .query_filtered::<
            (Entity, &RagdollConfig, Option<&BodyGraph>),
            With<LocomotionStateMachine>,
        >()
        .iter(world)
        .map(|(entity, config, graph)| {
            let bodies = graph.map_or_else(|| vec![entity], |g| g.bodies().to_vec());
            (entity, *config, bodies)
        })
        .collect();
    let dt = B::get_fixed_timestep(world);

    for (root, config, bodies) in roots {
        let movement = &config.movement;
        let grounded = world
            .get::<BalanceController>(root)
            .is_some_and(BalanceController::is_grounded);
        let Some(machine) = world.get::<LocomotionStateMachine>(root).cloned() else {
            continue;
        };
        let intent = world.get::<MovementIntent>(root).cloned().unwrap_or_default();
        let masses: Vec<(Entity, f32)> = bodies
            .iter()
            .map(|&body| (body, B::get_mass(world, body)))
            .collect();

        if machine.allows_locomotion(grounded) {
            if let Some((direction, magnitude)) = intent.world_direction() {
                let velocity = B::get_velocity(world, root);
                let acceleration =
                    locomotion_acceleration(velocity, direction, magnitude, dt, movement);
                for (body, force) in distribute(acceleration, &masses, movement.distribution) {
                    B::apply_force(world, body, force);
                }

                let rotation = B::get_rotation(world, root);
                let composite = world
                    .get::<RagdollController>(root)
                    .map(|controller| controller.composite)
                    .filter(|composite| composite.inertia > 0.0)
                    .unwrap_or_else(|| CompositeInertia {
                        inertia: B::get_principal_inertia(world, root),
                        angular_velocity: B::get_angular_velocity(world, root),
                    });
                let turn = heading_acceleration(
                    rotation,
                    composite.angular_velocity,
                    direction,
                    movement,
                );
                if turn != Vec3::ZERO {
                    B::apply_torque(world, root, turn * composite.inertia);
                }
            }
        }

        let jumped = world
            .get_mut::<LocomotionStateMachine>(root)
            .is_some_and(|mut machine| machine.try_consume_jump(grounded));
        if jumped {
            // Under `Root` the pelvis takes the momentum of the whole rig and
            // the joints hand it on to the other segments.
            let delta_v = jump_velocity_change(movement);
            for (body, impulse) in distribute(delta_v, &masses, movement.distribution) {
                B::apply_impulse(world, body, impulse);
            }
            debug!("ragdoll {root}: jump");
        }

        if machine.climb_active() && intent.is_jump_pressed() {
            let climb = climb_acceleration(movement);
            for (body, force) in distribute(climb, &masses, movement.distribution) {
                B::apply_force(world, body, force);
            }
        }
    }
}

/// Advance the gait and hand its targets to the leg joint drives.
pub fn update_gait<B: RagdollPhysicsBackend>(world: &mut World) {
    let roots: Vec<(Entity, RagdollConfig, LocomotionState)> = world
        .query_filtered::<(Entity, &RagdollConfig, &LocomotionStateMachine), With<GaitGenerator>>()
        .iter(world)
        .map(|(entity, config, machine)| (entity, *config, machine.state()))
        .collect();
    let dt = B::get_fixed_timestep(world);

    for (root, config, state) in roots {
        let motion = GaitMotion {
            velocity: B::get_velocity(world, root),
            rotation: B::get_rotation(world, root),
        };

        let targets: Vec<(Entity, f32)> = {
            let Some(mut gait) = world.get_mut::<GaitGenerator>(root) else {
                continue;
            };
            gait.step(state, motion, dt, &config.gait);
            gait.legs()
                .iter()
                .zip(gait.poses())
                .flat_map(|(leg, pose)| {
                    std::iter::once((leg.upper, pose.upper))
                        .chain(leg.lower.map(|lower| (lower, pose.lower)))
                })
                .collect()
        };

        for (joint, target) in targets {
            if let Some(mut drive) = world.get_mut::<JointDrive>(joint) {
                drive.set_target(target);
            }
        }
    }
}

/// Scale every captured drive by its ragdoll's multiplier and write it out.
pub fn apply_joint_drives<B: RagdollPhysicsBackend>(world: &mut World) {
    let drives: Vec<(Entity, Entity)> = world
        .query_filtered::<(Entity, &RagdollPart), With<JointDrive>>()
        .iter(world)
        .map(|(entity, part)| (entity, part.root))
        .collect();

    for (joint, root) in drives {
        let multiplier = world
            .get::<DriveMultipliers>(root)
            .map_or(1.0, DriveMultipliers::resolve);

        let command = {
            let Some(mut drive) = world.get_mut::<JointDrive>(joint) else {
                continue;
            };
            drive.apply_multiplier(multiplier);
            drive
                .effective()
                .map(|params| (drive.axis(), drive.target(), params))
        };

        if let Some((axis, target, params)) = command {
            B::set_joint_drive(world, joint, axis, target, params);
        }
    }
}

/// Sync state marker components with the balance controller.
pub fn sync_state_markers(
    mut commands: Commands,
    q_roots: Query<(
        Entity,
        &BalanceController,
        Has<Grounded>,
        Has<Airborne>,
        Has<Fallen>,
    )>,
) {
    for (entity, balance, has_grounded, has_airborne, has_fallen) in &q_roots {
        let grounded = balance.is_grounded();
        if grounded && !has_grounded {
            commands.entity(entity).insert(Grounded).remove::<Airborne>();
        } else if !grounded && !has_airborne {
            commands.entity(entity).insert(Airborne).remove::<Grounded>();
        }

        let fallen = balance.is_fallen();
        if fallen && !has_fallen {
            commands.entity(entity).insert(Fallen);
        } else if !fallen && has_fallen {
            commands.entity(entity).remove::<Fallen>();
        }
    }
}

/// Return a ragdoll's controller state to its spawn values.
///
/// For respawns and teleports. Overrides and forced states survive, drive
/// baselines are kept and ground contacts are left to the sensors.
pub fn reset_ragdoll(world: &mut World, root: Entity) {
    if let Some(mut balance) = world.get_mut::<BalanceController>(root) {
        balance.reset();
    }
    if let Some(mut machine) = world.get_mut::<LocomotionStateMachine>(root) {
        machine.reset();
    }
    if let Some(mut gait) = world.get_mut::<GaitGenerator>(root) {
        gait.reset();
    }
    if let Some(mut intent) = world.get_mut::<MovementIntent>(root) {
        intent.clear();
    }
    if let Some(mut multipliers) = world.get_mut::<DriveMultipliers>(root) {
        *multipliers = DriveMultipliers::default();
    }
}
