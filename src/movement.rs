//! Locomotion, heading, jump and climb force math.
//!
//! Everything here is a pure function of the current body state and the
//! configuration. The actuation systems decide *whether* to call these (the
//! state machine gates them) and the backend applies the results.

use bevy::prelude::*;

use crate::config::{ForceDistribution, MovementConfig};

/// Horizontal unit vector of `v`, `None` when the projection is degenerate.
///
/// A forward axis pointing almost straight up or down projects to nearly
/// nothing; normalizing that would amplify noise into a random direction.
pub fn horizontal_direction(v: Vec3) -> Option<Vec3> {
    let flat = Vec3::new(v.x, 0.0, v.z);
    let length_squared = flat.length_squared();
    (length_squared.is_finite() && length_squared > 1e-6).then(|| flat / length_squared.sqrt())
}

/// Horizontal acceleration toward `direction` with a soft speed cap.
///
/// No acceleration is produced along `direction` once the velocity component
/// along it reaches `magnitude × max_speed`. Sideways drift is bled off so the
/// character can change direction. The result never exceeds
/// `config.acceleration`.
pub fn locomotion_acceleration(
    velocity: Vec3,
    direction: Vec3,
    magnitude: f32,
    dt: f32,
    config: &MovementConfig,
) -> Vec3 {
    let Some(direction) = horizontal_direction(direction) else {
        return Vec3::ZERO;
    };
    if !velocity.is_finite() || dt <= 0.0 {
        return Vec3::ZERO;
    }

    let horizontal = Vec3::new(velocity.x, 0.0, velocity.z);
    let along = horizontal.dot(direction);
    let lateral = horizontal - direction * along;

    let desired = magnitude.clamp(0.0, 1.0) * config.max_speed;
    let deficit = desired - along;
    let forward = if deficit > 0.0 {
        direction * (deficit / dt).min(config.acceleration)
    } else {
        Vec3::ZERO
    };
    let correction = -(lateral / dt).clamp_length_max(config.acceleration);

    (forward + correction).clamp_length_max(config.acceleration)
}

/// Yaw acceleration turning `rotation`'s facing toward `direction`.
///
/// Facing is the body's `-Z` axis projected on the ground plane. Returns zero
/// when either direction is degenerate.
pub fn heading_acceleration(
    rotation: Quat,
    angular_velocity: Vec3,
    direction: Vec3,
    config: &MovementConfig,
) -> Vec3 {
    let (Some(facing), Some(desired)) = (
        horizontal_direction(rotation * Vec3::NEG_Z),
        horizontal_direction(direction),
    ) else {
        return Vec3::ZERO;
    };
    let error = facing.cross(desired).y.atan2(facing.dot(desired));
    let yaw_rate = if angular_velocity.y.is_finite() {
        angular_velocity.y
    } else {
        0.0
    };
    Vec3::Y * (error * config.turn_strength - yaw_rate * config.turn_damping)
}

/// Velocity change of the jump impulse.
pub fn jump_velocity_change(config: &MovementConfig) -> Vec3 {
    Vec3::Y * config.jump_speed
}

/// Acceleration applied while climbing.
pub fn climb_acceleration(config: &MovementConfig) -> Vec3 {
    Vec3::Y * config.climb_acceleration
}

/// Split a whole-body acceleration (or velocity change) into per-body vectors.
///
/// `bodies` pairs each registered body with its mass, root first. With
/// [`ForceDistribution::Root`] the root receives the amount for the total
/// mass; with [`ForceDistribution::AllBodies`] each body receives its own
/// share. Multiply by seconds for forces, use as-is for impulses.
pub fn distribute(
    amount: Vec3,
    bodies: &[(Entity, f32)],
    distribution: ForceDistribution,
) -> Vec<(Entity, Vec3)> {
    if !amount.is_finite() || amount == Vec3::ZERO {
        return Vec::new();
    }
    match distribution {
        ForceDistribution::Root => {
            let Some(&(root, _)) = bodies.first() else {
                return Vec::new();
            };
            let total: f32 = bodies.iter().map(|&(_, mass)| mass).sum();
            vec![(root, amount * total)]
        }
        ForceDistribution::AllBodies => bodies
            .iter()
            .map(|&(body, mass)| (body, amount * mass))
            .collect(),
    }
}
