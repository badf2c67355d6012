//! Duplicate geometry owned by the bake.
//!
//! A [`Duplicate`] is a standalone copy of one template's hierarchy,
//! reparented to the world root so it picks up no ancestor transforms the
//! particle copies never had. A [`BlendDuplicate`] is a duplicate whose
//! shapes carry a blend deformer over the full template set, letting one
//! object stand in for different templates over time by keying a single
//! weight channel per shape.

use crate::error::{BakeError, Result};
use crate::handle::ObjectHandle;
use crate::host::{NodeId, SceneGraph, ATTR_BLEND_WEIGHT};
use crate::round3;
use smallvec::SmallVec;

#[derive(Debug, Clone)]
pub struct Duplicate {
    root: ObjectHandle,
    shapes: SmallVec<[NodeId; 4]>,
}

impl Duplicate {
    /// Copies the hierarchy under `source`, renames every non-shared node
    /// with `suffix` to keep names collision-free, and reparents the copy
    /// to the world root. The particle transform already contains
    /// everything above the template's own first-level parent, so the
    /// copy must not inherit the original's ancestors.
    pub fn create(
        scene: &mut dyn SceneGraph,
        source: NodeId,
        as_instance: bool,
        suffix: &str,
    ) -> Result<Duplicate> {
        let root = scene.duplicate_subtree(source, as_instance);
        rename_subtree(scene, source, root, suffix);

        if !scene.is_transform(root) {
            scene.delete_node(root);
            return Err(BakeError::Unsupported(
                "only transform-rooted hierarchies can be uninstanced".into(),
            ));
        }
        if scene.parent(root).is_some() {
            scene.reparent_to_world(root);
        }

        let shapes = scene.shapes_under(root).into();
        Ok(Duplicate { root: ObjectHandle::new(scene, root), shapes })
    }

    pub fn name(&self) -> &str {
        self.root.name()
    }

    pub fn handle(&self) -> &ObjectHandle {
        &self.root
    }

    pub fn shapes(&self) -> &[NodeId] {
        &self.shapes
    }

    pub fn resolve_root(&mut self, scene: &dyn SceneGraph) -> Result<NodeId> {
        self.root
            .resolve(scene)
            .ok_or_else(|| BakeError::Invariant(format!("duplicate {} is gone", self.root.name())))
    }
}

/// Renames the copied hierarchy after its source, node for node. Nodes
/// reached through more than one scene path are left alone: with
/// instance copies those are the original's own nodes.
fn rename_subtree(scene: &mut dyn SceneGraph, source: NodeId, duplicate: NodeId, suffix: &str) {
    let source_nodes = scene.descendants(source);
    let duplicate_nodes = scene.descendants(duplicate);
    debug_assert_eq!(source_nodes.len(), duplicate_nodes.len());

    for (src, dup) in source_nodes.into_iter().zip(duplicate_nodes) {
        if scene.shared_instance_count(dup) > 1 {
            continue;
        }
        let name = format!("{}{}", scene.node_name(src), suffix);
        scene.rename_node(dup, &name);
    }
}

#[derive(Debug)]
pub struct BlendDuplicate {
    base: Duplicate,
    deformers: SmallVec<[NodeId; 4]>,
    targets: Vec<bool>,
    max_targets: usize,
}

impl BlendDuplicate {
    /// Wraps an existing duplicate, creating one blend deformer per shape
    /// part. Targets are registered separately with [`Self::add_target`].
    pub fn from_base(scene: &mut dyn SceneGraph, base: Duplicate, max_targets: usize) -> Self {
        let deformers = base.shapes().iter().map(|&shape| scene.create_blend_deformer(shape)).collect();
        BlendDuplicate { base, deformers, targets: vec![false; max_targets], max_targets }
    }

    /// The weight level that shows target `index` exclusively. `None` is
    /// the base shape. Levels are spaced by `1 / max_targets` and rounded
    /// to 3 decimals, so every template owns a distinct non-zero level.
    pub fn weight_level(max_targets: usize, index: Option<usize>) -> f64 {
        match index {
            None => 0.0,
            Some(index) => round3((index + 1) as f64 / max_targets as f64),
        }
    }

    /// Registers one template's shapes as a blend target at that
    /// template's weight level. Re-registering an index is a no-op.
    pub fn add_target(&mut self, scene: &mut dyn SceneGraph, index: usize, target_shapes: &[NodeId]) {
        if self.targets[index] {
            return;
        }
        if target_shapes.len() != self.deformers.len() {
            log::warn!(
                "blend target {index} has {} shape parts, duplicate has {}; target skipped",
                target_shapes.len(),
                self.deformers.len()
            );
            return;
        }
        let level = Self::weight_level(self.max_targets, Some(index));
        for (&deformer, &target) in self.deformers.iter().zip(target_shapes) {
            scene.add_blend_target(deformer, target, level);
        }
        self.targets[index] = true;
    }

    /// Keys every shape part's weight channel to the level of `index` at
    /// `time`. Keyed once per baked frame even when the index is
    /// unchanged, so host-side interpolation never drifts between levels.
    pub fn key_weight(&mut self, scene: &mut dyn SceneGraph, time: f64, index: Option<usize>) {
        let weight = Self::weight_level(self.max_targets, index);
        for &deformer in &self.deformers {
            scene.key_attribute(deformer, ATTR_BLEND_WEIGHT, time, weight);
        }
    }

    /// A plain view of the blended geometry, for callers that key its
    /// transform but never touch the deformers.
    pub fn as_duplicate(&self) -> Duplicate {
        self.base.clone()
    }

    /// An instance copy sharing this object's shapes and deformation.
    pub fn instance_copy(&mut self, scene: &mut dyn SceneGraph, suffix: &str) -> Result<Duplicate> {
        let root = self.base.resolve_root(scene)?;
        Duplicate::create(scene, root, true, suffix)
    }

    pub fn name(&self) -> &str {
        self.base.name()
    }

    pub fn handle(&self) -> &ObjectHandle {
        self.base.handle()
    }

    pub fn resolve_root(&mut self, scene: &dyn SceneGraph) -> Result<NodeId> {
        self.base.resolve_root(scene)
    }
}

/// What an animated tracker currently owns: a plain duplicate until the
/// first template switch, a blend duplicate afterwards.
#[derive(Debug)]
pub enum TrackedGeometry {
    Plain(Duplicate),
    Blend(BlendDuplicate),
}

impl TrackedGeometry {
    pub fn handle(&self) -> &ObjectHandle {
        match self {
            TrackedGeometry::Plain(duplicate) => duplicate.handle(),
            TrackedGeometry::Blend(blend) => blend.handle(),
        }
    }

    pub fn resolve_root(&mut self, scene: &dyn SceneGraph) -> Result<NodeId> {
        match self {
            TrackedGeometry::Plain(duplicate) => duplicate.resolve_root(scene),
            TrackedGeometry::Blend(blend) => blend.resolve_root(scene),
        }
    }
}
