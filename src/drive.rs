//! Joint drives and drive-strength multipliers.
//!
//! A [`JointDrive`] sits on every jointed body whose joint motor the
//! controller steers. Its spring/damper baseline is captured from the live
//! joint exactly once, after the body graph exists, and every later write is
//! `baseline × multiplier`. Multipliers come from [`DriveMultipliers`] on the
//! character root, where independent sources publish a value and the most
//! restrictive one wins.

use bevy::prelude::*;

/// Spring/damper/max-force triple of a joint motor.
#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
pub struct DriveParams {
    /// Position stiffness.
    pub spring: f32,
    /// Velocity damping.
    pub damper: f32,
    /// Largest force or torque the motor may exert.
    pub max_force: f32,
}

impl DriveParams {
    /// Build a triple.
    pub const fn new(spring: f32, damper: f32, max_force: f32) -> Self {
        Self {
            spring,
            damper,
            max_force,
        }
    }

    /// Spring and damper scaled by `multiplier`. The force limit is kept.
    pub fn scaled(&self, multiplier: f32) -> Self {
        Self {
            spring: self.spring * multiplier,
            damper: self.damper * multiplier,
            max_force: self.max_force,
        }
    }

    /// A usable baseline: positive, finite spring.
    pub fn is_usable_baseline(&self) -> bool {
        self.spring > 0.0 && self.spring.is_finite() && self.damper.is_finite()
    }
}

/// Local joint axis a drive acts about.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveAxis {
    /// Local X, the hinge axis of the bundled humanoid rig.
    #[default]
    X,
    /// Local Y.
    Y,
    /// Local Z.
    Z,
}

/// Controller-side state of one joint motor.
///
/// # Example
///
/// ```rust
/// use msg_ragdoll_controller::prelude::*;
///
/// let mut drive = JointDrive::new(DriveParams::new(400.0, 40.0, 500.0));
/// // Live joint reported zero: capture is refused and retried later.
/// assert!(!drive.capture(Some(DriveParams::new(0.0, 0.0, 500.0))));
/// assert!(drive.capture(Some(DriveParams::new(400.0, 40.0, 500.0))));
///
/// drive.apply_multiplier(0.15);
/// assert!((drive.effective_spring() - 60.0).abs() < 1e-3);
/// ```
#[derive(Component, Reflect, Debug, Clone)]
#[reflect(Component)]
pub struct JointDrive {
    axis: DriveAxis,
    configured: DriveParams,
    baseline: Option<DriveParams>,
    multiplier: f32,
    target: f32,
    refused_captures: u32,
}

impl JointDrive {
    /// Drive about the local X axis with the configured triple.
    pub fn new(configured: DriveParams) -> Self {
        Self {
            axis: DriveAxis::X,
            configured,
            baseline: None,
            multiplier: 1.0,
            target: 0.0,
            refused_captures: 0,
        }
    }

    /// Select the driven axis.
    pub fn with_axis(mut self, axis: DriveAxis) -> Self {
        self.axis = axis;
        self
    }

    /// Driven axis.
    pub fn axis(&self) -> DriveAxis {
        self.axis
    }

    /// The spawn-time triple.
    pub fn configured(&self) -> DriveParams {
        self.configured
    }

    /// The captured baseline, if capture has happened.
    pub fn baseline(&self) -> Option<DriveParams> {
        self.baseline
    }

    /// Whether the baseline has been captured.
    pub fn is_captured(&self) -> bool {
        self.baseline.is_some()
    }

    /// How many capture attempts were refused so far.
    pub fn refused_captures(&self) -> u32 {
        self.refused_captures
    }

    /// Try to capture the baseline from the live joint.
    ///
    /// Write-once: returns `false` if already captured. A live value with a
    /// zero spring is refused so a half-built joint never becomes the
    /// baseline. `None` means the backend exposes no motor state, in which
    /// case the configured triple is used.
    pub fn capture(&mut self, live: Option<DriveParams>) -> bool {
        if self.baseline.is_some() {
            return false;
        }
        let candidate = live.unwrap_or(self.configured);
        if !candidate.is_usable_baseline() {
            self.refused_captures += 1;
            return false;
        }
        self.baseline = Some(candidate);
        true
    }

    /// Set the resolved multiplier for this step. Clamped to `[0, 1]`.
    pub fn apply_multiplier(&mut self, multiplier: f32) {
        self.multiplier = if multiplier.is_finite() {
            multiplier.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    /// Multiplier in effect.
    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    /// Set the target rotation in radians. Non-finite targets are ignored.
    pub fn set_target(&mut self, target: f32) {
        if target.is_finite() {
            self.target = target;
        }
    }

    /// Target rotation in radians.
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Triple to write to the joint, `None` until the baseline exists.
    pub fn effective(&self) -> Option<DriveParams> {
        self.baseline.map(|b| b.scaled(self.multiplier))
    }

    /// Effective spring, zero until the baseline exists.
    pub fn effective_spring(&self) -> f32 {
        self.effective().map_or(0.0, |p| p.spring)
    }
}

/// Named writer of a drive multiplier.
#[derive(Reflect, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MultiplierSource {
    /// Published by the balance controller while no foot is grounded.
    Airborne,
    /// Published by combat code while the character is knocked out.
    Knockout,
    /// Any other game-defined writer.
    External(u8),
}

#[derive(Reflect, Debug, Clone, Copy, PartialEq)]
struct MultiplierEntry {
    source: MultiplierSource,
    value: f32,
    remaining: Option<f32>,
}

/// Drive-strength multipliers of one character, resolved by minimum.
///
/// Each source owns its entry. Timed entries count down once per physics step
/// and disappear when they reach zero.
#[derive(Component, Reflect, Debug, Clone, Default)]
#[reflect(Component)]
pub struct DriveMultipliers {
    entries: Vec<MultiplierEntry>,
}

impl DriveMultipliers {
    /// Publish `value` for `source` until cleared. Clamped to `[0, 1]`;
    /// non-finite values are treated as zero.
    pub fn set(&mut self, source: MultiplierSource, value: f32) {
        self.upsert(source, value, None);
    }

    /// Publish `value` for `source` for `seconds` of simulated time.
    pub fn set_for(&mut self, source: MultiplierSource, value: f32, seconds: f32) {
        self.upsert(source, value, Some(seconds.max(0.0)));
    }

    fn upsert(&mut self, source: MultiplierSource, value: f32, remaining: Option<f32>) {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            0.0
        };
        match self.entries.iter_mut().find(|e| e.source == source) {
            Some(entry) => {
                entry.value = value;
                entry.remaining = remaining;
            }
            None => self.entries.push(MultiplierEntry {
                source,
                value,
                remaining,
            }),
        }
    }

    /// Withdraw the entry of `source`.
    pub fn clear(&mut self, source: MultiplierSource) {
        self.entries.retain(|e| e.source != source);
    }

    /// Value currently published by `source`.
    pub fn get(&self, source: MultiplierSource) -> Option<f32> {
        self.entries
            .iter()
            .find(|e| e.source == source)
            .map(|e| e.value)
    }

    /// Whether `source` has an entry.
    pub fn is_active(&self, source: MultiplierSource) -> bool {
        self.get(source).is_some()
    }

    /// Most restrictive published value, 1.0 when nothing is published.
    pub fn resolve(&self) -> f32 {
        self.entries.iter().map(|e| e.value).fold(1.0, f32::min)
    }

    /// Advance timed entries by one step and drop the expired ones.
    pub fn tick(&mut self, dt: f32) {
        for entry in &mut self.entries {
            if let Some(remaining) = entry.remaining.as_mut() {
                *remaining -= dt;
            }
        }
        self.entries
            .retain(|e| e.remaining.is_none_or(|remaining| remaining > 0.0));
    }
}
