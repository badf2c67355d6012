//! In-memory reference host.
//!
//! Implements the collaborator seams (a scripted particle simulation
//! and an arena scene graph) just far enough to drive whole bakes from
//! the integration tests. The simulation and the scene share the current
//! frame's particle state through an `Rc<RefCell<_>>`, the same way a
//! real host's instancer reads the live particle buffers.

use crate::host::{NodeId, ParticleSnapshot, ProgressSink, SceneGraph, SimulationClock};
use crate::particle::{ATTR_ID_INDEX, ATTR_PARTICLE_ID, ATTR_SORTED_ID};
use glam::DMat4;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Particle state for one scripted frame, index-aligned across fields.
#[derive(Debug, Default, Clone)]
pub struct ParticleFrame {
    pub ids: Vec<i64>,
    pub matrices: Vec<DMat4>,
    pub int_attrs: HashMap<String, Vec<i64>>,
    pub double_attrs: HashMap<String, Vec<f64>>,
}

impl ParticleFrame {
    pub fn new(ids: Vec<i64>) -> ParticleFrame {
        let matrices = vec![DMat4::IDENTITY; ids.len()];
        ParticleFrame { ids, matrices, int_attrs: HashMap::new(), double_attrs: HashMap::new() }
    }

    pub fn with_matrices(mut self, matrices: Vec<DMat4>) -> ParticleFrame {
        assert_eq!(matrices.len(), self.ids.len(), "matrices must align with ids");
        self.matrices = matrices;
        self
    }

    pub fn with_double(mut self, name: &str, values: Vec<f64>) -> ParticleFrame {
        assert_eq!(values.len(), self.ids.len(), "{name} must align with ids");
        self.double_attrs.insert(name.to_string(), values);
        self
    }

    pub fn with_int(mut self, name: &str, values: Vec<i64>) -> ParticleFrame {
        assert_eq!(values.len(), self.ids.len(), "{name} must align with ids");
        self.int_attrs.insert(name.to_string(), values);
        self
    }
}

#[derive(Debug, Default)]
struct SimState {
    current: ParticleFrame,
}

/// Deterministic particle simulation replaying pre-scripted frames.
/// Frames that were never scripted read back as empty.
pub struct ScriptedSim {
    start_frame: i32,
    frames: BTreeMap<i32, ParticleFrame>,
    mappings: HashMap<(usize, String), String>,
    state: Rc<RefCell<SimState>>,
}

impl ScriptedSim {
    pub fn new(start_frame: i32) -> ScriptedSim {
        ScriptedSim {
            start_frame,
            frames: BTreeMap::new(),
            mappings: HashMap::new(),
            state: Rc::new(RefCell::new(SimState::default())),
        }
    }

    pub fn script_frame(&mut self, frame: i32, particles: ParticleFrame) {
        self.frames.insert(frame, particles);
    }

    /// Declares that `option` of instancer `slot` reads from the named
    /// per-particle attribute.
    pub fn map_attribute(&mut self, slot: usize, option: &str, attr: &str) {
        self.mappings.insert((slot, option.to_string()), attr.to_string());
    }

    fn shared_state(&self) -> Rc<RefCell<SimState>> {
        Rc::clone(&self.state)
    }
}

impl SimulationClock for ScriptedSim {
    fn advance_to(&mut self, frame: i32) {
        let particles = self.frames.get(&frame).cloned().unwrap_or_default();
        self.state.borrow_mut().current = particles;
    }

    fn start_frame(&self) -> i32 {
        self.start_frame
    }
}

impl ParticleSnapshot for ScriptedSim {
    fn count(&self) -> usize {
        self.state.borrow().current.ids.len()
    }

    fn int_attr(&self, name: &str) -> Option<Vec<i64>> {
        let state = self.state.borrow();
        let frame = &state.current;
        match name {
            ATTR_PARTICLE_ID => Some(frame.ids.clone()),
            ATTR_SORTED_ID => {
                let mut sorted = frame.ids.clone();
                sorted.sort_unstable();
                Some(sorted)
            }
            ATTR_ID_INDEX => {
                let mut sorted = frame.ids.clone();
                sorted.sort_unstable();
                let indices = sorted
                    .iter()
                    .map(|id| frame.ids.iter().position(|other| other == id).unwrap() as i64)
                    .collect();
                Some(indices)
            }
            _ => frame.int_attrs.get(name).cloned(),
        }
    }

    fn double_attr(&self, name: &str) -> Option<Vec<f64>> {
        self.state.borrow().current.double_attrs.get(name).cloned()
    }

    fn mapped_attribute(&self, instancer_slot: usize, option: &str) -> Option<String> {
        self.mappings.get(&(instancer_slot, option.to_string())).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Transform,
    Shape,
    Deformer,
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: DMat4,
    alive: bool,
    animated: bool,
    /// Reached through an instance copy; renames must skip it.
    shared: bool,
    keys: BTreeMap<String, Vec<(f64, f64)>>,
    blend_targets: Vec<(NodeId, f64)>,
}

/// Arena scene graph; ids index the arena directly.
/// Deletion marks a subtree dead rather than freeing it, so
/// deleted ids stay restorable.
pub struct HarnessScene {
    nodes: Vec<Node>,
    instancers: Vec<Vec<NodeId>>,
    sim: Rc<RefCell<SimState>>,
}

impl HarnessScene {
    pub fn new(sim: &ScriptedSim) -> HarnessScene {
        HarnessScene { nodes: Vec::new(), instancers: Vec::new(), sim: sim.shared_state() }
    }

    // -- construction -----------------------------------------------------

    pub fn add_transform(&mut self, name: &str, parent: Option<NodeId>, local: DMat4) -> NodeId {
        self.push_node(name, NodeKind::Transform, parent, local)
    }

    pub fn add_shape(&mut self, name: &str, parent: NodeId) -> NodeId {
        self.push_node(name, NodeKind::Shape, Some(parent), DMat4::IDENTITY)
    }

    /// A transform root with one shape child, the common template shape.
    pub fn add_template(&mut self, name: &str, local: DMat4) -> NodeId {
        let root = self.add_transform(name, None, local);
        self.add_shape(&format!("{name}Shape"), root);
        root
    }

    pub fn add_instancer(&mut self, templates: Vec<NodeId>) -> usize {
        self.instancers.push(templates);
        self.instancers.len() - 1
    }

    pub fn set_animated(&mut self, node: NodeId, animated: bool) {
        self.nodes[Self::index(node)].animated = animated;
    }

    // -- inspection -------------------------------------------------------

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|node| node.alive && node.name == name)
            .map(|index| NodeId(index as u64))
    }

    /// Live transforms parented to the world root.
    pub fn live_world_roots(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&index| {
                let node = &self.nodes[index];
                node.alive && node.parent.is_none() && node.kind == NodeKind::Transform
            })
            .map(|index| NodeId(index as u64))
            .collect()
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.alive).count()
    }

    pub fn keys(&self, node: NodeId, attr: &str) -> Vec<(f64, f64)> {
        self.nodes[Self::index(node)].keys.get(attr).cloned().unwrap_or_default()
    }

    pub fn world_matrix(&self, node: NodeId) -> DMat4 {
        self.ancestor_matrix(node) * self.local_matrix(node)
    }

    pub fn deformers_under(&self, root: NodeId) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|&node| self.nodes[Self::index(node)].kind == NodeKind::Deformer)
            .collect()
    }

    pub fn blend_targets(&self, node: NodeId) -> Vec<(NodeId, f64)> {
        self.nodes[Self::index(node)].blend_targets.clone()
    }

    // -- internals --------------------------------------------------------

    fn index(node: NodeId) -> usize {
        node.0 as usize
    }

    fn push_node(&mut self, name: &str, kind: NodeKind, parent: Option<NodeId>, local: DMat4) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(Node {
            name: name.to_string(),
            kind,
            parent,
            children: Vec::new(),
            local,
            alive: true,
            animated: false,
            shared: false,
            keys: BTreeMap::new(),
            blend_targets: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[Self::index(parent)].children.push(id);
        }
        id
    }

    fn clone_subtree(&mut self, source: NodeId, parent: Option<NodeId>, as_instance: bool, is_root: bool) -> NodeId {
        let template = self.nodes[Self::index(source)].clone();
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(Node {
            name: template.name.clone(),
            kind: template.kind,
            parent,
            children: Vec::new(),
            local: template.local,
            alive: true,
            animated: false,
            shared: as_instance && !is_root,
            keys: BTreeMap::new(),
            blend_targets: template.blend_targets.clone(),
        });
        if let Some(parent) = parent {
            self.nodes[Self::index(parent)].children.push(id);
        }
        for child in template.children {
            if self.nodes[Self::index(child)].alive {
                self.clone_subtree(child, Some(id), as_instance, false);
            }
        }
        id
    }

    /// Structural subtree walk ignoring alive flags, for delete/restore.
    fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = vec![node];
        let mut cursor = 0;
        while cursor < out.len() {
            let children = self.nodes[Self::index(out[cursor])].children.clone();
            out.extend(children);
            cursor += 1;
        }
        out
    }
}

impl SceneGraph for HarnessScene {
    fn template_count(&self, instancer_slot: usize) -> usize {
        self.instancers.get(instancer_slot).map_or(0, Vec::len)
    }

    fn resolve_instance_root(&self, instancer_slot: usize, template_index: usize) -> Option<NodeId> {
        let node = *self.instancers.get(instancer_slot)?.get(template_index)?;
        self.is_alive(node).then_some(node)
    }

    fn particle_matrix(&self, _instancer_slot: usize, particle_index: usize) -> DMat4 {
        self.sim.borrow().current.matrices.get(particle_index).copied().unwrap_or(DMat4::IDENTITY)
    }

    fn nodes_by_name(&self, name: &str) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&index| self.nodes[index].alive && self.nodes[index].name == name)
            .map(|index| NodeId(index as u64))
            .collect()
    }

    fn node_name(&self, node: NodeId) -> String {
        self.nodes[Self::index(node)].name.clone()
    }

    fn is_alive(&self, node: NodeId) -> bool {
        self.nodes.get(Self::index(node)).is_some_and(|n| n.alive)
    }

    fn is_transform(&self, node: NodeId) -> bool {
        self.nodes[Self::index(node)].kind == NodeKind::Transform
    }

    fn is_animated(&self, node: NodeId) -> bool {
        self.nodes[Self::index(node)].animated
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[Self::index(node)].parent
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes[Self::index(node)]
            .children
            .iter()
            .copied()
            .filter(|&child| self.nodes[Self::index(child)].alive)
            .collect()
    }

    fn local_matrix(&self, node: NodeId) -> DMat4 {
        self.nodes[Self::index(node)].local
    }

    fn ancestor_matrix(&self, node: NodeId) -> DMat4 {
        let mut matrix = DMat4::IDENTITY;
        let mut cursor = self.nodes[Self::index(node)].parent;
        while let Some(parent) = cursor {
            matrix = self.nodes[Self::index(parent)].local * matrix;
            cursor = self.nodes[Self::index(parent)].parent;
        }
        matrix
    }

    fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !self.nodes[Self::index(current)].alive {
                continue;
            }
            out.push(current);
            let children = &self.nodes[Self::index(current)].children;
            for &child in children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    fn shapes_under(&self, node: NodeId) -> Vec<NodeId> {
        self.descendants(node)
            .into_iter()
            .filter(|&n| self.nodes[Self::index(n)].kind == NodeKind::Shape)
            .collect()
    }

    fn shared_instance_count(&self, node: NodeId) -> usize {
        if self.nodes[Self::index(node)].shared {
            2
        } else {
            1
        }
    }

    fn duplicate_subtree(&mut self, node: NodeId, as_instance: bool) -> NodeId {
        let parent = self.nodes[Self::index(node)].parent;
        self.clone_subtree(node, parent, as_instance, true)
    }

    fn rename_node(&mut self, node: NodeId, name: &str) -> String {
        self.nodes[Self::index(node)].name = name.to_string();
        name.to_string()
    }

    fn reparent_to_world(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[Self::index(node)].parent {
            self.nodes[Self::index(parent)].children.retain(|&child| child != node);
        }
        self.nodes[Self::index(node)].parent = None;
    }

    fn set_world_transform(&mut self, node: NodeId, matrix: DMat4) {
        // Duplicates are world children; their local matrix is the world
        // matrix.
        debug_assert!(self.nodes[Self::index(node)].parent.is_none());
        self.nodes[Self::index(node)].local = matrix;
    }

    fn key_attribute(&mut self, node: NodeId, attr: &str, time: f64, value: f64) {
        self.nodes[Self::index(node)].keys.entry(attr.to_string()).or_default().push((time, value));
    }

    fn create_blend_deformer(&mut self, shape: NodeId) -> NodeId {
        let name = format!("{}_blend", self.nodes[Self::index(shape)].name);
        self.push_node(&name, NodeKind::Deformer, Some(shape), DMat4::IDENTITY)
    }

    fn add_blend_target(&mut self, deformer: NodeId, target: NodeId, weight: f64) {
        self.nodes[Self::index(deformer)].blend_targets.push((target, weight));
    }

    fn delete_node(&mut self, node: NodeId) {
        for member in self.subtree(node) {
            self.nodes[Self::index(member)].alive = false;
        }
    }

    fn restore_node(&mut self, node: NodeId) {
        for member in self.subtree(node) {
            self.nodes[Self::index(member)].alive = true;
        }
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[Self::index(parent)].children.retain(|&c| c != child);
        self.nodes[Self::index(child)].parent = None;
        // A detached shared child was only ever a path to the original's
        // data; dropping the path retires the node.
        if self.nodes[Self::index(child)].shared {
            for member in self.subtree(child) {
                self.nodes[Self::index(member)].alive = false;
            }
        }
    }

    fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[Self::index(parent)].children.push(child);
        self.nodes[Self::index(child)].parent = Some(parent);
        if self.nodes[Self::index(child)].shared {
            for member in self.subtree(child) {
                self.nodes[Self::index(member)].alive = true;
            }
        }
    }
}

/// Progress sink recording everything it is told, with an optional
/// cancellation threshold for abort tests.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub advanced: u32,
    pub labels: Vec<String>,
    pub began_with: Option<u32>,
    pub ended: bool,
    /// Report cancelled once this many units have been advanced.
    pub cancel_after: Option<u32>,
}

impl RecordingProgress {
    pub fn cancelling_after(units: u32) -> RecordingProgress {
        RecordingProgress { cancel_after: Some(units), ..RecordingProgress::default() }
    }
}

impl ProgressSink for RecordingProgress {
    fn begin(&mut self, units: u32) {
        self.began_with = Some(units);
    }

    fn advance(&mut self, n: u32) {
        self.advanced += n;
    }

    fn set_label(&mut self, label: &str) {
        self.labels.push(label.to_string());
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_after.is_some_and(|threshold| self.advanced >= threshold)
    }

    fn end(&mut self) {
        self.ended = true;
    }
}
