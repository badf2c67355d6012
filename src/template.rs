//! The fixed set of template shapes behind an instancing relationship.
//!
//! Captured once when a bake starts. Each slot records the template's
//! root, its deformable shapes, and a base world matrix: the template's
//! own local transform composed with everything above it, since the
//! instancer draws copies as if the template sat at the world root.

use crate::error::{BakeError, Result};
use crate::geometry::{BlendDuplicate, Duplicate};
use crate::handle::ObjectHandle;
use crate::host::{NodeId, SceneGraph};
use crate::resolver::CycleMode;
use glam::DMat4;
use smallvec::SmallVec;

#[derive(Debug)]
pub struct Template {
    root: ObjectHandle,
    shapes: SmallVec<[NodeId; 4]>,
    base_matrix: DMat4,
}

impl Template {
    pub fn base_matrix(&self) -> DMat4 {
        self.base_matrix
    }

    pub fn shapes(&self) -> &[NodeId] {
        &self.shapes
    }

    pub fn name(&self) -> &str {
        self.root.name()
    }

    fn capture(scene: &dyn SceneGraph, root: NodeId) -> Template {
        Template {
            root: ObjectHandle::new(scene, root),
            shapes: scene.shapes_under(root).into(),
            base_matrix: base_matrix(scene, root),
        }
    }
}

/// The instancer uses the template's first scene path: its own local
/// transform, pre-multiplied by the chain above it when it is not a
/// world child.
fn base_matrix(scene: &dyn SceneGraph, root: NodeId) -> DMat4 {
    let local = scene.local_matrix(root);
    if scene.parent(root).is_some() {
        scene.ancestor_matrix(root) * local
    } else {
        local
    }
}

pub struct TemplateSet {
    instancer_slot: usize,
    slots: Vec<Option<Template>>,
    /// Per-slot blend duplicates for the copy-as-instance rotation
    /// scheme; empty when the scheme is inactive.
    rotating: Vec<Option<BlendDuplicate>>,
    copy_as_instance: bool,
    duplicate_counter: u64,
}

impl TemplateSet {
    /// Captures every template slot of the instancing relationship. A
    /// slot whose binding is missing or dead is logged and left empty;
    /// the bake continues with the remaining slots. Zero usable slots is
    /// a configuration error.
    ///
    /// When animated duplicates are copied as instances under sequential
    /// cycling, per-slot blend duplicates get rotated between logical
    /// indices instead of deforming each copy independently; instance
    /// copies share shape data, so per-copy blending is impossible. The
    /// rotation array is allocated here and filled lazily on first use
    /// of each slot.
    pub fn reset(
        scene: &dyn SceneGraph,
        instancer_slot: usize,
        copy_as_instance: bool,
        bake_animation: bool,
        cycling: CycleMode,
    ) -> Result<TemplateSet> {
        let count = scene.template_count(instancer_slot);
        let mut slots = Vec::with_capacity(count);
        for index in 0..count {
            let root = scene.resolve_instance_root(instancer_slot, index).filter(|&r| scene.is_alive(r));
            match root {
                Some(root) => slots.push(Some(Template::capture(scene, root))),
                None => {
                    log::error!("template slot {index} has no usable shape bound; slot skipped");
                    slots.push(None);
                }
            }
        }
        if slots.iter().all(Option::is_none) {
            return Err(BakeError::Configuration(
                "no shape is associated with the instancing relationship".into(),
            ));
        }

        let rotating =
            if copy_as_instance && bake_animation && cycling.is_sequential() && slots.len() > 1 {
                (0..slots.len()).map(|_| None).collect()
            } else {
                Vec::new()
            };

        Ok(TemplateSet { instancer_slot, slots, rotating, copy_as_instance, duplicate_counter: 0 })
    }

    pub fn instancer_slot(&self) -> usize {
        self.instancer_slot
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&Template> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn has_rotation(&self) -> bool {
        !self.rotating.is_empty()
    }

    pub fn duplicates_created(&self) -> u64 {
        self.duplicate_counter
    }

    /// Re-reads base matrices for the current frame. The slot set itself
    /// never changes after `reset`; a template whose root can no longer
    /// be resolved is dropped with a log entry.
    pub fn refresh_matrices(&mut self, scene: &dyn SceneGraph) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            let Some(template) = slot else { continue };
            match template.root.resolve(scene) {
                Some(root) => template.base_matrix = base_matrix(scene, root),
                None => {
                    log::warn!("template slot {index} disappeared mid-bake; slot dropped");
                    *slot = None;
                }
            }
        }
    }

    /// Fails when any usable template is animated on the host side: an
    /// animated bake records absolute transforms per frame and cannot
    /// layer them over host animation.
    pub fn validate_for_animation(&mut self, scene: &dyn SceneGraph) -> Result<()> {
        for slot in self.slots.iter_mut().flatten() {
            if let Some(root) = slot.root.resolve(scene) {
                if scene.is_animated(root) {
                    return Err(BakeError::Configuration(format!(
                        "instanced object {} is animated; animated baking is unsupported for it",
                        slot.root.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Produces a duplicate representing template `index` as of `time`.
    ///
    /// Under the rotation scheme the first request per slot builds the
    /// slot's blend duplicate (base shape keyed active from `time`) and
    /// hands out its own root; later requests for the slot return
    /// instance copies sharing its deformation.
    pub fn duplicate(
        &mut self,
        scene: &mut dyn SceneGraph,
        index: usize,
        time: f64,
    ) -> Result<Duplicate> {
        if self.slot(index).is_none() {
            return Err(BakeError::Invariant(format!("template slot {index} is empty")));
        }

        self.duplicate_counter += 1;
        let suffix = format!("_{}", self.duplicate_counter);

        if self.has_rotation() {
            if self.rotating[index].is_some() {
                let blend = self.rotating[index].as_mut().expect("slot checked above");
                return blend.instance_copy(scene, &suffix);
            }

            let source = self.resolve_slot_root(scene, index)?;
            let base = Duplicate::create(scene, source, false, &suffix)?;
            let mut blend = BlendDuplicate::from_base(scene, base, self.slots.len());
            for (slot_index, slot) in self.slots.iter().enumerate() {
                if let Some(template) = slot {
                    blend.add_target(scene, slot_index, template.shapes());
                }
            }
            blend.key_weight(scene, time, None);
            let duplicate = blend.as_duplicate();
            self.rotating[index] = Some(blend);
            return Ok(duplicate);
        }

        let source = self.resolve_slot_root(scene, index)?;
        Duplicate::create(scene, source, self.copy_as_instance, &suffix)
    }

    /// Per-frame rotation step. Each populated slot is keyed to show the
    /// template one step ahead, then the slot array rotates so logical
    /// index `i` now holds what slot `(i + 1) mod count` held. The
    /// instancer advances every copy's cycle by one step and the
    /// physical objects must follow.
    pub fn update(&mut self, scene: &mut dyn SceneGraph, time: f64) {
        if self.rotating.is_empty() {
            return;
        }
        let count = self.rotating.len();
        for (index, slot) in self.rotating.iter_mut().enumerate() {
            if let Some(blend) = slot {
                blend.key_weight(scene, time, Some((index + 1) % count));
            }
        }
        self.rotating.rotate_right(1);
    }

    fn resolve_slot_root(&mut self, scene: &dyn SceneGraph, index: usize) -> Result<NodeId> {
        let template = self.slots[index].as_mut().expect("caller checked the slot");
        template
            .root
            .resolve(scene)
            .ok_or_else(|| BakeError::Invariant(format!("template slot {index} is gone")))
    }
}
