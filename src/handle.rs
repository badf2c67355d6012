use crate::host::{NodeId, SceneGraph};

/// Weak reference to a scene node: a cached [`NodeId`] plus the node's
/// name as a fallback. The id is re-validated on every access; if the
/// node behind it was deleted and later recreated under the same name,
/// the handle re-attaches through the name lookup.
///
/// Ownership stays with the host; dropping a handle never deletes
/// anything.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    cached: Option<NodeId>,
    name: String,
}

impl ObjectHandle {
    pub fn new(scene: &dyn SceneGraph, node: NodeId) -> Self {
        Self { cached: Some(node), name: scene.node_name(node) }
    }

    /// A handle that will only ever resolve through the name lookup.
    pub fn from_name(name: impl Into<String>) -> Self {
        Self { cached: None, name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last id this handle saw, without revalidation. Useful when the
    /// node is known to be dead (e.g. restoring a deletion).
    pub fn cached_id(&self) -> Option<NodeId> {
        self.cached
    }

    pub fn is_valid(&self) -> bool {
        self.cached.is_some() || !self.name.is_empty()
    }

    /// Current node behind the handle, or `None` if it cannot be found.
    /// An ambiguous fallback name (several live nodes match) is treated
    /// as unresolved and logged rather than guessed at.
    pub fn resolve(&mut self, scene: &dyn SceneGraph) -> Option<NodeId> {
        if let Some(node) = self.cached {
            if scene.is_alive(node) {
                return Some(node);
            }
            self.cached = None;
        }
        if self.name.is_empty() {
            return None;
        }
        let matches = scene.nodes_by_name(&self.name);
        match matches.as_slice() {
            [] => None,
            [node] => {
                self.cached = Some(*node);
                Some(*node)
            }
            _ => {
                log::warn!("more than one node matches name {}", self.name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_handle_is_invalid() {
        let handle = ObjectHandle::from_name("");
        assert!(!handle.is_valid());
    }
}
