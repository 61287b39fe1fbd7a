//! Per-foot ground sensing.
//!
//! A [`GroundSensor`] counts the ground colliders currently overlapping one
//! foot. The physics backend feeds it enter/exit notifications; the balance
//! controller fuses every sensor of a character into a single grounded flag.

use bevy::prelude::*;

use crate::error::ConfigError;

/// Collision-layer bitmask selecting which colliders count as ground.
///
/// Bits follow the backend's collision group memberships. A collider counts
/// as ground when its memberships share at least one bit with the mask.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroundLayers(pub u32);

impl GroundLayers {
    /// Environment geometry only (layer bit 0).
    pub const ENVIRONMENT: Self = Self(1);
    /// Every layer.
    pub const ALL: Self = Self(u32::MAX);

    /// Create a mask from raw bits.
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits of the mask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the mask selects nothing.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether a collider with these memberships counts as ground.
    pub const fn matches(self, memberships: u32) -> bool {
        self.0 & memberships != 0
    }
}

impl Default for GroundLayers {
    fn default() -> Self {
        Self::ENVIRONMENT
    }
}

/// Ground contact tracker attached to a foot sensor collider.
///
/// `body` is the foot rigid body the sensor reports for. The body graph uses
/// it to assign the sensor to its character, so sensors can live on child
/// collider entities.
///
/// # Example
///
/// ```rust
/// use bevy::prelude::*;
/// use msg_ragdoll_controller::prelude::*;
///
/// let foot = Entity::from_raw(7);
/// let ground = Entity::from_raw(1);
/// let mut sensor = GroundSensor::new(foot);
///
/// sensor.on_enter(ground, GroundLayers::ENVIRONMENT.bits());
/// assert!(sensor.is_grounded());
///
/// sensor.on_exit(ground);
/// assert!(!sensor.is_grounded());
/// ```
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct GroundSensor {
    body: Entity,
    layers: GroundLayers,
    contacts: Vec<Entity>,
}

impl GroundSensor {
    /// Sensor for `body` counting environment geometry.
    pub fn new(body: Entity) -> Self {
        Self {
            body,
            layers: GroundLayers::default(),
            contacts: Vec::new(),
        }
    }

    /// Sensor with an explicit ground mask. An empty mask is rejected.
    pub fn try_new(body: Entity, layers: GroundLayers) -> Result<Self, ConfigError> {
        if layers.is_empty() {
            return Err(ConfigError::EmptyGroundMask);
        }
        Ok(Self::new(body).with_layers_unchecked(layers))
    }

    fn with_layers_unchecked(mut self, layers: GroundLayers) -> Self {
        self.layers = layers;
        self
    }

    /// The foot body this sensor reports for.
    pub fn body(&self) -> Entity {
        self.body
    }

    /// The ground mask.
    pub fn layers(&self) -> GroundLayers {
        self.layers
    }

    /// Record a collider starting to overlap the sensor.
    ///
    /// Returns whether the collider counts as ground. Colliders outside the
    /// mask are ignored, and a collider already tracked is not counted twice.
    pub fn on_enter(&mut self, other: Entity, memberships: u32) -> bool {
        if !self.layers.matches(memberships) {
            return false;
        }
        if !self.contacts.contains(&other) {
            self.contacts.push(other);
        }
        true
    }

    /// Record a collider no longer overlapping the sensor.
    pub fn on_exit(&mut self, other: Entity) {
        self.contacts.retain(|&e| e != other);
    }

    /// Number of ground colliders currently overlapping.
    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    /// True while at least one ground collider overlaps.
    pub fn is_grounded(&self) -> bool {
        !self.contacts.is_empty()
    }

    /// Forget every tracked contact (respawn, teleport).
    pub fn clear(&mut self) {
        self.contacts.clear();
    }
}

/// Fused ground state of one character.
#[derive(Reflect, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroundContact {
    /// Number of sensors that belong to the character.
    pub feet: usize,
    /// Number of those sensors currently grounded.
    pub grounded_feet: usize,
    /// Total overlapping ground colliders across all feet.
    pub contacts: usize,
}

impl GroundContact {
    /// Fuse a set of foot sensors. Grounded when any foot is.
    pub fn aggregate<'a>(sensors: impl IntoIterator<Item = &'a GroundSensor>) -> Self {
        sensors
            .into_iter()
            .fold(Self::default(), |mut acc, sensor| {
                acc.feet += 1;
                acc.contacts += sensor.contact_count();
                if sensor.is_grounded() {
                    acc.grounded_feet += 1;
                }
                acc
            })
    }

    /// At least one foot is grounded.
    pub fn is_grounded(&self) -> bool {
        self.grounded_feet > 0
    }
}
