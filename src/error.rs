//! Configuration errors.
//!
//! Every controller constant is validated when a configuration is built or a
//! rig is spawned. Nothing inside a physics step returns these.

use thiserror::Error;

/// Reasons a spawn-time configuration is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A value that must be strictly positive (and finite) was not.
    #[error("`{field}` must be positive and finite, got {value}")]
    NotPositive { field: &'static str, value: f32 },

    /// A value fell outside its allowed closed range.
    #[error("`{field}` must lie in [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f32,
        min: f32,
        max: f32,
    },

    /// The ground layer mask selects no collision layer at all.
    #[error("ground layer mask is empty, no collider could ever count as ground")]
    EmptyGroundMask,

    /// A body segment was configured with a non-positive mass.
    #[error("segment `{segment}` has invalid mass {mass}")]
    InvalidSegmentMass { segment: &'static str, mass: f32 },
}

/// Rejects values that are not strictly positive and finite.
pub(crate) fn ensure_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

/// Rejects values outside `[min, max]`, including NaN.
pub(crate) fn ensure_range(
    field: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
