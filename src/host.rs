use glam::DMat4;

/// Opaque scene-node identifier issued by the host.
///
/// A `NodeId` stays stable for the lifetime of the node it names, but it
/// can go stale if the node is deleted. Long-lived references should be
/// held through [`crate::handle::ObjectHandle`], which falls back to a
/// name lookup when the id no longer resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Keyable transform channel paths on a duplicate root.
pub const ATTR_TRANSLATE: [&str; 3] = ["tx", "ty", "tz"];
pub const ATTR_ROTATE: [&str; 3] = ["rx", "ry", "rz"];
pub const ATTR_SCALE: [&str; 3] = ["sx", "sy", "sz"];
pub const ATTR_VISIBILITY: &str = "visibility";

/// Keyable weight path on a blend deformer node.
pub const ATTR_BLEND_WEIGHT: &str = "weight";

/// Steps the particle simulation. Advancing must fully re-evaluate every
/// per-particle attribute as of the requested frame, even when frames are
/// visited one at a time.
pub trait SimulationClock {
    fn advance_to(&mut self, frame: i32);

    /// Frame at which the simulation emits its first particle. Used to
    /// pin duplicates invisible before their particle is born.
    fn start_frame(&self) -> i32;
}

/// Read-only view of the simulation state at the current frame.
///
/// Attribute reads return `None` when no per-particle attribute of that
/// name and width is declared; width fallback (int-declared data read as
/// double and vice versa) is handled above this trait in
/// [`crate::particle`].
pub trait ParticleSnapshot {
    fn count(&self) -> usize;

    fn int_attr(&self, name: &str) -> Option<Vec<i64>>;

    fn double_attr(&self, name: &str) -> Option<Vec<f64>>;

    /// Resolves the per-slot attribute-name indirection table: which
    /// particle attribute, if any, is mapped onto the named instancing
    /// option (`"objectIndex"`, `"age"`, ...).
    fn mapped_attribute(&self, instancer_slot: usize, option: &str) -> Option<String>;
}

/// The host scene graph. Everything the bake creates or edits goes
/// through this seam; mutation entry points are undoable on the host
/// side, and the bake additionally records its own reversal ops in
/// [`crate::undo::ModifierStack`] so a whole bake can be taken back as a
/// unit.
///
/// Matrices use glam's column-vector convention: `a * b` applies `b`
/// first. `ancestor_matrix` must return the world matrix of the chain
/// *above* a node (identity for a world child).
pub trait SceneGraph {
    // -- instancing relationship ------------------------------------------

    /// Number of template slots bound to the instancer.
    fn template_count(&self, instancer_slot: usize) -> usize;

    /// Root node bound to one template slot, if the slot is populated and
    /// the binding still resolves.
    fn resolve_instance_root(&self, instancer_slot: usize, template_index: usize) -> Option<NodeId>;

    /// The transform the instancer applies to one particle's copy this
    /// frame, excluding the template's own base matrix.
    fn particle_matrix(&self, instancer_slot: usize, particle_index: usize) -> DMat4;

    // -- queries ----------------------------------------------------------

    /// All live nodes carrying this name. More than one entry means the
    /// name is ambiguous in the host scene.
    fn nodes_by_name(&self, name: &str) -> Vec<NodeId>;

    fn node_name(&self, node: NodeId) -> String;

    fn is_alive(&self, node: NodeId) -> bool;

    fn is_transform(&self, node: NodeId) -> bool;

    /// Whether any attribute of the node is driven by host-side animation.
    fn is_animated(&self, node: NodeId) -> bool;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn local_matrix(&self, node: NodeId) -> DMat4;

    /// World matrix of the ancestor chain above `node`; identity when the
    /// node is parented to the world root.
    fn ancestor_matrix(&self, node: NodeId) -> DMat4;

    /// The subtree rooted at `node` in depth-first order, `node` first.
    fn descendants(&self, node: NodeId) -> Vec<NodeId>;

    /// Deformable shape nodes in the subtree, depth-first.
    fn shapes_under(&self, node: NodeId) -> Vec<NodeId>;

    /// Number of scene paths sharing this node. Greater than one for
    /// nodes reached through instance copies; those must not be renamed.
    fn shared_instance_count(&self, node: NodeId) -> usize;

    // -- mutation ---------------------------------------------------------

    /// Copies the subtree rooted at `node`. With `as_instance` the copy
    /// shares shape data with the original instead of duplicating it.
    fn duplicate_subtree(&mut self, node: NodeId, as_instance: bool) -> NodeId;

    /// Renames a node; returns the name actually assigned (the host may
    /// uniquify it).
    fn rename_node(&mut self, node: NodeId, name: &str) -> String;

    fn reparent_to_world(&mut self, node: NodeId);

    fn set_world_transform(&mut self, node: NodeId, matrix: DMat4);

    /// Adds a keyframe on an attribute path of the node. Stepped-tangent
    /// interpretation is up to the host; the bake keys densely enough not
    /// to rely on interpolation shape.
    fn key_attribute(&mut self, node: NodeId, attr: &str, time: f64, value: f64);

    /// Creates a blend deformer driving `shape` and returns its node. The
    /// deformer's [`ATTR_BLEND_WEIGHT`] selects among registered targets.
    fn create_blend_deformer(&mut self, shape: NodeId) -> NodeId;

    /// Registers `target` on the deformer at the given weight level: the
    /// target is fully shown when the keyed weight equals `weight`.
    fn add_blend_target(&mut self, deformer: NodeId, target: NodeId, weight: f64);

    fn delete_node(&mut self, node: NodeId);

    /// Reverses a prior [`SceneGraph::delete_node`] of the same node.
    fn restore_node(&mut self, node: NodeId);

    fn remove_child(&mut self, parent: NodeId, child: NodeId);

    /// Reverses a prior [`SceneGraph::remove_child`].
    fn add_child(&mut self, parent: NodeId, child: NodeId);
}

/// Progress reporting and cooperative cancellation. Checked once per
/// frame boundary, never mid-frame.
pub trait ProgressSink {
    /// Announces the total number of work units before the bake starts.
    fn begin(&mut self, _units: u32) {}

    fn advance(&mut self, n: u32);

    fn set_label(&mut self, label: &str);

    fn is_cancelled(&self) -> bool;

    fn end(&mut self) {}
}

/// A sink for hosts that have no progress UI.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn advance(&mut self, _n: u32) {}

    fn set_label(&mut self, _label: &str) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}
