//! Stable particle-id to per-frame array-index translation.
//!
//! Per-particle attribute arrays are indexed by the particle's current
//! position, which shifts whenever an earlier particle dies. The
//! simulation publishes three parallel arrays per frame (ids sorted
//! ascending, the current index of each sorted id, and the ids in
//! current array order) and `IdentityMap` snapshots them so the bake
//! can follow one particle across frames.

use crate::error::Result;
use crate::host::ParticleSnapshot;
use crate::particle::{self, ATTR_ID_INDEX, ATTR_PARTICLE_ID, ATTR_SORTED_ID};

#[derive(Debug, Default)]
pub struct IdentityMap {
    sorted_ids: Vec<i64>,
    id_indices: Vec<usize>,
    unsorted_ids: Vec<i64>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot from the simulation's current id arrays.
    /// Called once per frame; the previous frame's mapping is discarded
    /// wholesale, never patched.
    pub fn refresh(&mut self, particles: &dyn ParticleSnapshot) -> Result<()> {
        let sorted = particle::int_attr(particles, ATTR_SORTED_ID)?;
        let indices = particle::int_attr(particles, ATTR_ID_INDEX)?;
        let unsorted = particle::int_attr(particles, ATTR_PARTICLE_ID)?;
        self.set(sorted, indices.into_iter().map(|i| i as usize).collect(), unsorted);
        Ok(())
    }

    pub fn set(&mut self, sorted_ids: Vec<i64>, id_indices: Vec<usize>, unsorted_ids: Vec<i64>) {
        debug_assert!(sorted_ids.windows(2).all(|w| w[0] <= w[1]), "sorted ids must be non-decreasing");
        self.sorted_ids = sorted_ids;
        self.id_indices = id_indices;
        self.unsorted_ids = unsorted_ids;
    }

    /// Current array index of a live particle, `None` once it has died.
    pub fn id_to_index(&self, particle_id: i64) -> Option<usize> {
        let pos = self.sorted_ids.binary_search(&particle_id).ok()?;
        self.id_indices.get(pos).copied()
    }

    /// Id of the particle currently at `index`, `None` out of bounds.
    pub fn index_to_id(&self, index: usize) -> Option<i64> {
        self.unsorted_ids.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.unsorted_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unsorted_ids.is_empty()
    }
}
