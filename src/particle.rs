//! Per-particle attribute access on top of [`ParticleSnapshot`].
//!
//! Simulation hosts are loose about attribute width: ids and ages are
//! routinely declared as doubles, explicit object indices sometimes as
//! doubles too. The readers here try the requested width first and fall
//! back to the other, converting element-wise, so callers see one
//! consistent type.

use crate::error::{BakeError, Result};
use crate::host::ParticleSnapshot;

/// Stable per-particle id, as exposed by the simulation.
pub const ATTR_PARTICLE_ID: &str = "particleId";

/// Ids sorted ascending, parallel to [`ATTR_ID_INDEX`].
pub const ATTR_SORTED_ID: &str = "sortedId";

/// Current array index of each entry of [`ATTR_SORTED_ID`].
pub const ATTR_ID_INDEX: &str = "idIndex";

/// Particle age in seconds; default driver of sequential cycling.
pub const ATTR_AGE: &str = "age";

/// Instancing option names used with
/// [`ParticleSnapshot::mapped_attribute`].
pub const OPTION_OBJECT_INDEX: &str = "objectIndex";
pub const OPTION_AGE: &str = "age";
pub const OPTION_CYCLE_START: &str = "cycleStartObject";

/// Reads an int attribute, falling back to a double attribute of the
/// same name with truncation.
pub fn int_attr(particles: &dyn ParticleSnapshot, name: &str) -> Result<Vec<i64>> {
    if let Some(values) = particles.int_attr(name) {
        return Ok(values);
    }
    if let Some(values) = particles.double_attr(name) {
        return Ok(values.into_iter().map(|v| v.trunc() as i64).collect());
    }
    Err(BakeError::Data(format!("{name} is not a readable per-particle attribute")))
}

/// Reads a double attribute, falling back to an int attribute of the
/// same name.
pub fn double_attr(particles: &dyn ParticleSnapshot, name: &str) -> Result<Vec<f64>> {
    if let Some(values) = particles.double_attr(name) {
        return Ok(values);
    }
    if let Some(values) = particles.int_attr(name) {
        return Ok(values.into_iter().map(|v| v as f64).collect());
    }
    Err(BakeError::Data(format!("{name} is not a readable per-particle attribute")))
}
