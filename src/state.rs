//! State marker components.
//!
//! These mirror the balance controller's signals on the ragdoll root so other
//! game systems can filter on them in queries. They are added and removed by
//! the controller at the end of every step; do not insert them yourself.

use bevy::prelude::*;

/// Marker component indicating at least one foot touches the ground.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_ragdoll_controller::prelude::*;
///
/// fn count_grounded(q: Query<(), (With<RagdollController>, With<Grounded>)>) -> usize {
///     q.iter().count()
/// }
/// ```
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Grounded;

/// Marker component indicating no foot touches the ground.
///
/// Mutually exclusive with [`Grounded`].
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Airborne;

/// Marker component indicating the character has lost its balance.
///
/// Present from the step balance reports the fall until it reports recovery.
#[derive(Component, Reflect, Debug, Clone, Copy, Default)]
#[reflect(Component)]
pub struct Fallen;
