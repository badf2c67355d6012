//! Per-particle bake state.
//!
//! One tracker exists for every particle id ever seen during a bake. It
//! owns the particle's duplicate exclusively and carries the life state
//! that decides when the duplicate pops out of existence. Static and
//! animated baking share the registry but not the mechanics, so the
//! tracker is a tagged variant dispatched on the bake mode chosen once
//! at session start.

use crate::config::BakeMode;
use crate::error::{BakeError, Result};
use crate::geometry::{BlendDuplicate, TrackedGeometry};
use crate::handle::ObjectHandle;
use crate::host::{SceneGraph, ATTR_ROTATE, ATTR_SCALE, ATTR_TRANSLATE, ATTR_VISIBILITY};
use crate::template::TemplateSet;
use glam::{DMat4, EulerRot};

/// Life state of an animated tracker.
///
/// `bake` marks the tracker alive; `end_frame` walks it toward `Dead`
/// only on frames where `bake` was not called. A particle must be absent
/// for one full frame before it is declared dead, so a single skipped
/// sighting does not kill its duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Life {
    Uninitialized,
    AliveThisFrame,
    AliveLastFrame,
    Dead,
}

pub struct Tracker {
    particle_id: i64,
    kind: TrackerKind,
}

enum TrackerKind {
    Static(StaticState),
    Animated(AnimatedState),
}

#[derive(Default)]
struct StaticState {
    created: Vec<ObjectHandle>,
}

struct AnimatedState {
    geometry: Option<TrackedGeometry>,
    object_index: Option<usize>,
    life: Life,
    baked_this_frame: bool,
    copy_as_instance: bool,
}

impl Tracker {
    pub fn new(particle_id: i64, mode: BakeMode, copy_as_instance: bool) -> Tracker {
        let kind = match mode {
            BakeMode::Static => TrackerKind::Static(StaticState::default()),
            BakeMode::Animated => TrackerKind::Animated(AnimatedState {
                geometry: None,
                object_index: None,
                life: Life::Uninitialized,
                baked_this_frame: false,
                copy_as_instance,
            }),
        };
        Tracker { particle_id, kind }
    }

    pub fn particle_id(&self) -> i64 {
        self.particle_id
    }

    pub fn life(&self) -> Life {
        match &self.kind {
            TrackerKind::Static(_) => Life::Uninitialized,
            TrackerKind::Animated(state) => state.life,
        }
    }

    /// Processes one sighting of the particle: `world` is the resolved
    /// world matrix `particle_matrix * template_base_matrix` for this
    /// frame.
    pub fn bake(
        &mut self,
        scene: &mut dyn SceneGraph,
        templates: &mut TemplateSet,
        frame: i32,
        sim_start: i32,
        object_index: usize,
        world: DMat4,
    ) -> Result<()> {
        match &mut self.kind {
            TrackerKind::Static(state) => state.bake(scene, templates, frame, object_index, world),
            TrackerKind::Animated(state) => {
                state.bake(scene, templates, frame, sim_start, object_index, world)
            }
        }
    }

    /// Called once per frame after every particle is processed, on every
    /// tracker ever created; absence from the frame's particle set is
    /// what drives the decay toward `Dead`.
    pub fn end_frame(&mut self, scene: &mut dyn SceneGraph, frame: i32) {
        if let TrackerKind::Animated(state) = &mut self.kind {
            state.end_frame(scene, frame);
        }
    }

    /// Post-bake hook. Curve cleanup would go here; the default bake
    /// leaves keys exactly as recorded.
    pub fn finalize(&mut self, _scene: &mut dyn SceneGraph) {}

    /// Handles of every duplicate root this tracker created, in creation
    /// order.
    pub fn roots(&self) -> Vec<ObjectHandle> {
        match &self.kind {
            TrackerKind::Static(state) => state.created.clone(),
            TrackerKind::Animated(state) => match &state.geometry {
                Some(geometry) => vec![geometry.handle().clone()],
                None => Vec::new(),
            },
        }
    }
}

impl StaticState {
    /// A snapshot bake: one fresh duplicate per sighting, transformed
    /// once, never keyed.
    fn bake(
        &mut self,
        scene: &mut dyn SceneGraph,
        templates: &mut TemplateSet,
        frame: i32,
        object_index: usize,
        world: DMat4,
    ) -> Result<()> {
        let mut duplicate = templates.duplicate(scene, object_index, frame as f64)?;
        let root = duplicate.resolve_root(scene)?;
        scene.set_world_transform(root, world);
        self.created.push(duplicate.handle().clone());
        Ok(())
    }
}

impl AnimatedState {
    fn bake(
        &mut self,
        scene: &mut dyn SceneGraph,
        templates: &mut TemplateSet,
        frame: i32,
        sim_start: i32,
        object_index: usize,
        world: DMat4,
    ) -> Result<()> {
        let time = frame as f64;
        if self.geometry.is_none() {
            self.initialize(scene, templates, frame, sim_start, object_index)?;
        }
        self.life = Life::AliveThisFrame;
        self.baked_this_frame = true;

        self.key_transform(scene, time, world)?;

        if self.object_index != Some(object_index) {
            self.object_index_changed(scene, templates, time, object_index)?;
        }

        // Once blended, key the weight every baked frame even when the
        // index is unchanged; sparse keys would interpolate through
        // intermediate weight levels and show the wrong template.
        if !self.copy_as_instance {
            if let Some(TrackedGeometry::Blend(blend)) = self.geometry.as_mut() {
                blend.key_weight(scene, time, Some(object_index));
            }
        }

        self.object_index = Some(object_index);
        Ok(())
    }

    fn initialize(
        &mut self,
        scene: &mut dyn SceneGraph,
        templates: &mut TemplateSet,
        frame: i32,
        sim_start: i32,
        object_index: usize,
    ) -> Result<()> {
        let mut duplicate = templates.duplicate(scene, object_index, frame as f64)?;
        let root = duplicate.resolve_root(scene)?;

        // Pinned invisible from the simulation start until the particle's
        // first sighting, visible from then on.
        if sim_start < frame {
            scene.key_attribute(root, ATTR_VISIBILITY, sim_start as f64, 0.0);
        }
        scene.key_attribute(root, ATTR_VISIBILITY, frame as f64, 1.0);

        self.geometry = Some(TrackedGeometry::Plain(duplicate));
        self.object_index = Some(object_index);
        Ok(())
    }

    fn key_transform(&mut self, scene: &mut dyn SceneGraph, time: f64, world: DMat4) -> Result<()> {
        let root = match self.geometry.as_mut().expect("initialized above") {
            TrackedGeometry::Plain(duplicate) => duplicate.resolve_root(scene)?,
            TrackedGeometry::Blend(blend) => blend.resolve_root(scene)?,
        };

        let (scale, rotation, translation) = world.to_scale_rotation_translation();
        let euler = rotation.to_euler(EulerRot::XYZ);

        let channels = ATTR_TRANSLATE
            .into_iter()
            .zip([translation.x, translation.y, translation.z])
            .chain(ATTR_ROTATE.into_iter().zip([euler.0, euler.1, euler.2]))
            .chain(ATTR_SCALE.into_iter().zip([scale.x, scale.y, scale.z]));
        for (attr, value) in channels {
            scene.key_attribute(root, attr, time, value);
        }
        Ok(())
    }

    /// The particle switched templates. Instance copies cannot be
    /// deformed per-copy, so they are only legal under the rotation
    /// scheme; otherwise the plain duplicate converts to a blend
    /// duplicate on first divergence.
    fn object_index_changed(
        &mut self,
        scene: &mut dyn SceneGraph,
        templates: &mut TemplateSet,
        time: f64,
        _object_index: usize,
    ) -> Result<()> {
        if self.copy_as_instance {
            if !templates.has_rotation() {
                return Err(BakeError::Configuration(
                    "cycling must be sequential to bake animation with copy-as-instance; \
                     disable copy-as-instance or switch the cycle mode"
                        .into(),
                ));
            }
            return Ok(());
        }

        if let Some(TrackedGeometry::Plain(_)) = self.geometry {
            let Some(TrackedGeometry::Plain(duplicate)) = self.geometry.take() else {
                unreachable!("checked variant above")
            };
            let mut blend = BlendDuplicate::from_base(scene, duplicate, templates.slot_count());
            for index in 0..templates.slot_count() {
                if let Some(template) = templates.slot(index) {
                    blend.add_target(scene, index, template.shapes());
                }
            }
            // The base shape covers every frame up to the divergence; one
            // key a frame earlier pins it there.
            blend.key_weight(scene, time - 1.0, None);
            self.geometry = Some(TrackedGeometry::Blend(blend));
        }
        Ok(())
    }

    fn end_frame(&mut self, scene: &mut dyn SceneGraph, frame: i32) {
        if self.baked_this_frame {
            self.baked_this_frame = false;
            return;
        }
        match self.life {
            Life::AliveThisFrame => self.life = Life::AliveLastFrame,
            Life::AliveLastFrame => {
                self.life = Life::Dead;
                if let Some(geometry) = self.geometry.as_mut() {
                    if let Ok(root) = geometry.resolve_root(scene) {
                        scene.key_attribute(root, ATTR_VISIBILITY, frame as f64, 0.0);
                    }
                }
            }
            Life::Uninitialized | Life::Dead => {}
        }
    }
}
