//! Per-particle object-index resolution.
//!
//! Decides, for every particle on the current frame, which template slot
//! it is instancing: an explicitly mapped per-particle attribute wins,
//! then sequential age-based cycling, then slot 0.

use crate::error::Result;
use crate::host::ParticleSnapshot;
use crate::particle::{self, ATTR_AGE, OPTION_AGE, OPTION_CYCLE_START, OPTION_OBJECT_INDEX};
use crate::round3;
use serde::{Deserialize, Serialize};

/// Whether cycle steps are counted in frames or seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleUnit {
    Frames,
    Seconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CycleMode {
    /// Each particle keeps whatever index the mapped attribute gives it
    /// (or 0).
    None,
    /// The index advances by one every `step` units of particle age,
    /// wrapping at the template count.
    Sequential { step: f64, unit: CycleUnit },
}

impl CycleMode {
    pub fn is_sequential(&self) -> bool {
        matches!(self, CycleMode::Sequential { .. })
    }
}

impl Default for CycleMode {
    fn default() -> Self {
        CycleMode::None
    }
}

pub struct ObjectIndexResolver {
    cycling: CycleMode,
    fps: f64,
    instancer_slot: usize,
}

impl ObjectIndexResolver {
    pub fn new(cycling: CycleMode, fps: f64, instancer_slot: usize) -> Self {
        Self { cycling, fps, instancer_slot }
    }

    /// Resolved template index per particle index for the current frame.
    ///
    /// Indices at or beyond `template_count` clamp to the last slot, the
    /// same fallback the instancing host applies when drawing.
    pub fn resolve(
        &self,
        particles: &dyn ParticleSnapshot,
        template_count: usize,
    ) -> Result<Vec<usize>> {
        let count = particles.count();
        if template_count <= 1 {
            return Ok(vec![0; count]);
        }

        if let Some(attr) = particles.mapped_attribute(self.instancer_slot, OPTION_OBJECT_INDEX) {
            let raw = particle::int_attr(particles, &attr)?;
            return Ok(raw.into_iter().map(|v| clamp_index(v, template_count)).collect());
        }

        if let CycleMode::Sequential { step, unit } = self.cycling {
            return self.sequential_indices(particles, template_count, step, unit);
        }

        Ok(vec![0; count])
    }

    fn sequential_indices(
        &self,
        particles: &dyn ParticleSnapshot,
        template_count: usize,
        step: f64,
        unit: CycleUnit,
    ) -> Result<Vec<usize>> {
        let age_attr = particles
            .mapped_attribute(self.instancer_slot, OPTION_AGE)
            .unwrap_or_else(|| ATTR_AGE.to_string());
        let ages = particle::double_attr(particles, &age_attr)?;

        let cycle_starts = match particles.mapped_attribute(self.instancer_slot, OPTION_CYCLE_START) {
            Some(attr) => particle::int_attr(particles, &attr)?,
            None => vec![0; ages.len()],
        };

        // Ages are in seconds; a frame-denominated step converts through
        // the scene frame rate so the division below is unit-consistent.
        let step_seconds = match unit {
            CycleUnit::Frames => step / self.fps,
            CycleUnit::Seconds => step,
        };

        let count = template_count as i64;
        let mut indices = Vec::with_capacity(ages.len());
        for (i, &age) in ages.iter().enumerate() {
            // Round to 3 decimals before truncating: an age that lands a
            // hair under a step boundary still advances, matching the
            // host's numeric behavior.
            let steps = round3(age / step_seconds).trunc() as i64;
            let start = cycle_starts.get(i).copied().unwrap_or(0);
            let index = (start + steps).rem_euclid(count);
            indices.push(clamp_index(index, template_count));
        }
        Ok(indices)
    }
}

fn clamp_index(raw: i64, template_count: usize) -> usize {
    if raw < 0 {
        return 0;
    }
    (raw as usize).min(template_count - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_saturates_at_last_slot() {
        assert_eq!(clamp_index(7, 3), 2);
        assert_eq!(clamp_index(2, 3), 2);
        assert_eq!(clamp_index(-1, 3), 0);
    }
}
