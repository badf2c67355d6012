//! Reversible scene operations, batched so a whole bake can be taken
//! back or replayed as a unit.
//!
//! The stack keeps a cursor marking how far it has been applied, so a
//! partially-applied batch can be completed or unwound without
//! re-deriving which operations already ran. Child removals are pushed
//! before deletions: an instance copy's shared children must be detached
//! before their parents go away.

use crate::handle::ObjectHandle;
use crate::host::SceneGraph;

#[derive(Debug, Clone)]
pub enum UndoOp {
    /// Detach `child` from `parent` (apply) / reattach it (revert).
    RemoveChild { parent: ObjectHandle, child: ObjectHandle },
    /// Delete a node the bake created (apply) / restore it (revert).
    DeleteNode { node: ObjectHandle },
}

impl UndoOp {
    fn apply(&mut self, scene: &mut dyn SceneGraph) {
        match self {
            UndoOp::RemoveChild { parent, child } => {
                if let (Some(parent), Some(child)) = (parent.resolve(scene), child.resolve(scene)) {
                    scene.remove_child(parent, child);
                }
            }
            UndoOp::DeleteNode { node } => {
                if let Some(node) = node.resolve(scene) {
                    scene.delete_node(node);
                }
            }
        }
    }

    fn revert(&mut self, scene: &mut dyn SceneGraph) {
        match self {
            UndoOp::RemoveChild { parent, child } => {
                if let (Some(parent), Some(child)) = (parent.resolve(scene), child.resolve(scene)) {
                    scene.add_child(parent, child);
                }
            }
            UndoOp::DeleteNode { node } => {
                // The node is dead here; resolution would fail, but the
                // handle still caches the id the host can restore.
                if let Some(id) = node.cached_id() {
                    scene.restore_node(id);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct ModifierStack {
    ops: Vec<UndoOp>,
    done: usize,
}

impl ModifierStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: UndoOp) {
        self.ops.push(op);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every operation not yet done, in push order.
    pub fn apply_all(&mut self, scene: &mut dyn SceneGraph) {
        for index in self.done..self.ops.len() {
            self.ops[index].apply(scene);
            self.done = index + 1;
        }
    }

    /// Reverts every done operation, most recent first.
    pub fn revert_all(&mut self, scene: &mut dyn SceneGraph) {
        for index in (0..self.done).rev() {
            self.ops[index].revert(scene);
            self.done = index;
        }
    }
}
