//! Compositor: z-ordered overlay layers above the base tree.
//!
//! Each layer is a root node laid out against the full screen and painted
//! after the base frame. A modal layer captures input: hit testing and focus
//! traversal never reach anything below the top-most modal.

use tracing::debug;

use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layer {
    pub root: NodeId,
    pub z: i32,
    pub modal: bool,
}

/// Overlay registry. Layers are kept sorted by ascending `z`; layers with
/// equal `z` keep insertion order.
#[derive(Debug, Default)]
pub struct Compositor {
    layers: Vec<Layer>,
    next_z: i32,
    /// Set by every call that changes the layer stack.
    changed: bool,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack `root` above every existing layer. Returns the assigned z.
    pub fn push(&mut self, root: NodeId, modal: bool) -> i32 {
        self.next_z += 1;
        let z = self.next_z;
        self.insert(Layer { root, z, modal });
        z
    }

    /// Insert `root` at an explicit z. A root already on the compositor is
    /// moved rather than duplicated.
    pub fn push_at(&mut self, root: NodeId, z: i32, modal: bool) {
        self.next_z = self.next_z.max(z);
        self.insert(Layer { root, z, modal });
    }

    fn insert(&mut self, layer: Layer) {
        self.layers.retain(|l| l.root != layer.root);
        let at = self.layers.partition_point(|l| l.z <= layer.z);
        self.layers.insert(at, layer);
        self.changed = true;
        debug!(root = %layer.root, z = layer.z, modal = layer.modal, "push layer");
    }

    /// Remove the layer rooted at `root`. The node itself stays in the tree.
    pub fn remove(&mut self, root: NodeId) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.root != root);
        let removed = before != self.layers.len();
        self.changed |= removed;
        removed
    }

    /// Raise an existing layer above all others.
    pub fn bring_to_front(&mut self, root: NodeId) -> bool {
        let Some(layer) = self.layers.iter().find(|l| l.root == root).copied() else {
            return false;
        };
        self.push(root, layer.modal);
        true
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn top_modal(&self) -> Option<&Layer> {
        self.layers.iter().rev().find(|l| l.modal)
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn clear(&mut self) {
        self.changed |= !self.layers.is_empty();
        self.layers.clear();
    }

    /// Drop layers whose root no longer exists.
    pub fn retain_live(&mut self, tree: &Tree) {
        let before = self.layers.len();
        self.layers.retain(|l| tree.contains(l.root));
        self.changed |= before != self.layers.len();
    }

    /// Whether the layer stack changed since the last call.
    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Root of the subtree that currently receives keyboard input: the
    /// top-most modal layer if any, else the base root.
    pub fn input_scope(&self, tree: &Tree) -> Option<NodeId> {
        match self.top_modal() {
            Some(layer) => Some(layer.root),
            None => tree.root(),
        }
    }
}
