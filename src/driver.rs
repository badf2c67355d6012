//! The bake frame loop.
//!
//! Strictly sequential: each frame's identity mapping and blend
//! decisions depend on the previous frame's resolved state, so there is
//! no concurrent baking of frames or particles. The only yield point is
//! the cancellation check at each frame boundary.

use crate::config::{BakeConfig, BakeMode};
use crate::error::{BakeError, Result};
use crate::handle::ObjectHandle;
use crate::host::{ParticleSnapshot, ProgressSink, SceneGraph, SimulationClock};
use crate::identity::IdentityMap;
use crate::resolver::ObjectIndexResolver;
use crate::template::TemplateSet;
use crate::tracker::Tracker;
use crate::undo::{ModifierStack, UndoOp};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Session-scoped counters, returned with the result rather than kept in
/// process-wide state so independent bakes never cross-talk.
#[derive(Debug, Clone, Copy, Default)]
pub struct BakeStats {
    /// Frames the simulation was advanced through, including frames the
    /// output step skipped.
    pub frames_stepped: u32,
    /// Frames that produced output.
    pub frames_baked: u32,
    pub duplicates_created: u32,
    pub elapsed: Duration,
}

/// What a completed bake hands back to the embedding command layer.
#[derive(Debug)]
pub struct BakeOutcome {
    /// Names of every created top-level duplicate, in ascending particle
    /// id order, suitable for selection and reporting.
    pub created: Vec<String>,
    pub stats: BakeStats,
    /// Reversal operations for the whole bake, not yet applied. Applying
    /// them undoes the bake; reverting them redoes it.
    pub undo: ModifierStack,
}

pub struct BakeDriver {
    config: BakeConfig,
    /// Sorted copy of the target filter; empty means every particle.
    targets: Vec<i64>,
    identity: IdentityMap,
    trackers: BTreeMap<i64, Tracker>,
    stats: BakeStats,
}

impl BakeDriver {
    pub fn new(config: BakeConfig) -> Result<BakeDriver> {
        config.validate()?;
        let mut targets = config.target_ids.clone();
        targets.sort_unstable();
        Ok(BakeDriver {
            config,
            targets,
            identity: IdentityMap::new(),
            trackers: BTreeMap::new(),
            stats: BakeStats::default(),
        })
    }

    /// Runs the whole bake. On any error after the first scene mutation,
    /// cancellation included, everything created so far is rolled
    /// back before the error is returned.
    pub fn run<S>(
        mut self,
        sim: &mut S,
        scene: &mut dyn SceneGraph,
        progress: &mut dyn ProgressSink,
    ) -> Result<BakeOutcome>
    where
        S: SimulationClock + ParticleSnapshot,
    {
        let started = Instant::now();
        let frames = (self.config.end_frame - self.config.start_frame) as u32;
        progress.begin(frames + 4);

        let result = self.run_frames(sim, scene, progress);
        progress.end();

        match result {
            Ok(mut outcome) => {
                outcome.stats.elapsed = started.elapsed();
                Ok(outcome)
            }
            Err(err) => {
                let mut rollback = self.build_undo_stack(scene);
                rollback.apply_all(scene);
                Err(err)
            }
        }
    }

    fn run_frames<S>(
        &mut self,
        sim: &mut S,
        scene: &mut dyn SceneGraph,
        progress: &mut dyn ProgressSink,
    ) -> Result<BakeOutcome>
    where
        S: SimulationClock + ParticleSnapshot,
    {
        let config = self.config.clone();
        let animated = config.mode == BakeMode::Animated;

        let mut templates = TemplateSet::reset(
            scene,
            config.instancer_slot,
            config.copy_as_instance,
            animated,
            config.cycling,
        )?;
        if animated {
            templates.validate_for_animation(scene)?;
        }
        let resolver = ObjectIndexResolver::new(config.cycling, config.fps, config.instancer_slot);

        progress.set_label("run up");
        sim.advance_to(config.start_frame - 1);
        progress.advance(1);

        for frame in config.start_frame..=config.end_frame {
            // The simulator is advanced every integer frame even when the
            // output step skips this frame; particle state depends on
            // being evaluated each frame.
            sim.advance_to(frame);
            self.stats.frames_stepped += 1;
            if (frame - config.start_frame) % config.frame_step != 0 {
                continue;
            }

            progress.set_label(&format!("frame {frame}"));
            templates.refresh_matrices(scene);
            templates.update(scene, frame as f64);
            self.identity.refresh(sim)?;
            let resolved = resolver.resolve(sim, templates.slot_count())?;
            let sim_start = sim.start_frame();

            for particle_index in 0..sim.count() {
                let Some(particle_id) = self.identity.index_to_id(particle_index) else {
                    log::warn!("particle index {particle_index} has no id this frame; skipped");
                    continue;
                };
                if !self.is_targeted(particle_id) {
                    continue;
                }
                let object_index = resolved[particle_index];
                let Some(template) = templates.slot(object_index) else {
                    log::warn!(
                        "particle {particle_id} resolved to empty template slot {object_index}; skipped"
                    );
                    continue;
                };
                let world = scene.particle_matrix(config.instancer_slot, particle_index)
                    * template.base_matrix();

                let tracker = self.trackers.entry(particle_id).or_insert_with(|| {
                    Tracker::new(particle_id, config.mode, config.copy_as_instance)
                });
                tracker.bake(scene, &mut templates, frame, sim_start, object_index, world)?;
            }

            // Every tracker ever created, including ones absent this
            // frame: absence is what walks a tracker toward dead.
            for tracker in self.trackers.values_mut() {
                tracker.end_frame(scene, frame);
            }

            self.stats.frames_baked += 1;
            progress.advance(1);
            if progress.is_cancelled() {
                return Err(BakeError::Cancelled);
            }
        }

        progress.set_label("finalizing");
        for tracker in self.trackers.values_mut() {
            tracker.finalize(scene);
        }
        progress.advance(1);

        let mut created = Vec::new();
        for tracker in self.trackers.values() {
            for root in tracker.roots() {
                created.push(root.name().to_string());
            }
        }
        self.stats.duplicates_created = created.len() as u32;

        let undo = self.build_undo_stack(scene);
        progress.advance(1);

        Ok(BakeOutcome { created, stats: self.stats, undo })
    }

    fn is_targeted(&self, particle_id: i64) -> bool {
        self.targets.is_empty() || self.targets.binary_search(&particle_id).is_ok()
    }

    /// Reversal ops for everything created so far: child removals first
    /// (instance copies must drop their shared children before deletion),
    /// then deletions of every created root.
    fn build_undo_stack(&self, scene: &mut dyn SceneGraph) -> ModifierStack {
        let mut stack = ModifierStack::new();
        let roots: Vec<_> = self.trackers.values().flat_map(|tracker| tracker.roots()).collect();

        if self.config.copy_as_instance {
            for root in &roots {
                let mut handle = root.clone();
                let Some(node) = handle.resolve(scene) else { continue };
                for child in scene.children(node) {
                    stack.push(UndoOp::RemoveChild {
                        parent: handle.clone(),
                        child: ObjectHandle::new(scene, child),
                    });
                }
            }
        }
        for root in roots {
            stack.push(UndoOp::DeleteNode { node: root });
        }
        stack
    }
}
