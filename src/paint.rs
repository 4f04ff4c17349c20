//! Paint Module: tree traversal into a cell buffer.
//!
//! Responsibilities:
//! - `Surface`, the clipped drawing handle widgets paint through
//! - Pre-order painting of visible nodes, clipped to ancestor bounds
//! - Style inheritance down the tree
//! - Isolation of panicking widgets (skipped for the frame, logged)
//! - Overlay composition in ascending z-order

use std::panic::{self, AssertUnwindSafe};

use tracing::warn;

use crate::buffer::{copy_region, Buffer};
use crate::compositor::Compositor;
use crate::layout::bounds_intersection;
use crate::tree::{NodeId, Tree};
use crate::types::{Bounds, Cell, Style};

// ============================================================================
// Surface
// ============================================================================

/// Mutable view of a buffer restricted to a clip rectangle. Writes outside
/// the clip are dropped.
pub struct Surface<'a> {
    buf: &'a mut Buffer,
    clip: Bounds,
}

impl<'a> Surface<'a> {
    pub fn new(buf: &'a mut Buffer, clip: Bounds) -> Self {
        let clip = bounds_intersection(clip, buf.area()).unwrap_or_default();
        Self { buf, clip }
    }

    pub fn clip(&self) -> Bounds {
        self.clip
    }

    fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.clip.x && x < self.clip.right() && y >= self.clip.y && y < self.clip.bottom()
    }

    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        if self.contains(x, y) {
            self.buf.set(x, y, cell);
        }
    }

    pub fn put_char(&mut self, x: u16, y: u16, ch: char, style: Style) {
        if self.contains(x, y) {
            let mut tmp = [0u8; 4];
            self.buf.set(x, y, Cell::new(ch.encode_utf8(&mut tmp), style));
        }
    }

    /// Write text clipped to the surface. Returns columns advanced.
    pub fn print(&mut self, x: u16, y: u16, text: &str, style: Style) -> u16 {
        self.buf.write_clipped(x, y, text, style, self.clip)
    }

    /// Write text clipped to both `limit` and the surface.
    pub fn print_within(&mut self, x: u16, y: u16, text: &str, style: Style, limit: Bounds) -> u16 {
        let clip = bounds_intersection(limit, self.clip).unwrap_or(Bounds::new(x, y, 0, 0));
        self.buf.write_clipped(x, y, text, style, clip)
    }

    pub fn fill(&mut self, rect: Bounds, cell: &Cell) {
        if let Some(r) = bounds_intersection(rect, self.clip) {
            self.buf.fill(r.x, r.y, r.width, r.height, cell);
        }
    }

    /// Read back a cell, used by widgets that blend with what is below.
    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        self.buf.get(x, y)
    }
}

// ============================================================================
// Tree Painting
// ============================================================================

/// Paint the subtree at `root` into `buffer`. Returns the number of widgets
/// that rendered successfully.
pub fn paint_tree(tree: &Tree, root: NodeId, buffer: &mut Buffer) -> usize {
    let clip = buffer.area();
    paint_node(tree, root, buffer, clip, Style::default())
}

fn paint_node(tree: &Tree, id: NodeId, buffer: &mut Buffer, clip: Bounds, parent: Style) -> usize {
    let Some(node) = tree.get(id) else {
        return 0;
    };
    if !node.visible {
        return 0;
    }
    let Some(node_clip) = bounds_intersection(node.bounds, clip) else {
        return 0;
    };

    let style = node.style.resolve(parent);
    let area = node.bounds;
    let mut painted = 0;

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut surface = Surface::new(buffer, node_clip);
        node.widget.render(&mut surface, area, style);
    }));
    match result {
        Ok(()) => painted += 1,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            warn!(node = %id, kind = node.kind(), %reason, "widget render panicked; skipped this frame");
        }
    }

    for &child in &node.children {
        painted += paint_node(tree, child, buffer, node_clip, style);
    }
    painted
}

/// Paint the base tree and then every overlay layer in ascending z. Each
/// overlay is painted into `scratch` and blitted over the base frame, so an
/// overlay fully covers what lies under its root's bounds.
pub fn paint_frame(
    tree: &Tree,
    compositor: &Compositor,
    frame: &mut Buffer,
    scratch: &mut Buffer,
) -> usize {
    frame.clear();
    let mut painted = 0;
    if let Some(root) = tree.root() {
        painted += paint_tree(tree, root, frame);
    }

    for layer in compositor.layers() {
        let Some(node) = tree.get(layer.root) else {
            continue;
        };
        if !node.visible {
            continue;
        }
        let Some(region) = bounds_intersection(node.bounds, frame.area()) else {
            continue;
        };
        if scratch.width() != frame.width() || scratch.height() != frame.height() {
            scratch.resize(frame.width(), frame.height());
        }
        scratch.clear();
        painted += paint_tree(tree, layer.root, scratch);
        copy_region(scratch, frame, region, region.x, region.y);
    }
    painted
}
