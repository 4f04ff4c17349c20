//! Tree Module: node arena and parent/child bookkeeping.
//!
//! Responsibilities:
//! - Id allocation (sequential u32, never recycled, 0 is invalid)
//! - Node creation and recursive disposal
//! - Parent-child relationships with cycle rejection
//! - Dirty-flag propagation (layout dirtiness bubbles to ancestors)
//! - Fluent `NodeMut` setters that mutate and mark dirty in one step

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{EngineError, Result};
use crate::event::{EventCtx, Handlers};
use crate::input::{KeyEvent, MouseEvent};
use crate::layout::{Align, Dimension, Edges, FlexDirection, Justify, LayoutProps};
use crate::style::VisualStyle;
use crate::types::{Bounds, CellAttrs, Rgba};
use crate::widget::Widget;

/// Stable node handle. Ids are never reused within one `Tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const INVALID: NodeId = NodeId(0);

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) visible: bool,
    pub(crate) focusable: bool,
    pub(crate) bounds: Bounds,
    pub(crate) layout_dirty: bool,
    pub(crate) render_dirty: bool,
    pub(crate) layout: LayoutProps,
    pub(crate) style: VisualStyle,
    pub(crate) widget: Box<dyn Widget>,
    pub(crate) handlers: Handlers,
}

impl Node {
    fn new(id: NodeId, widget: Box<dyn Widget>) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            visible: true,
            focusable: false,
            bounds: Bounds::default(),
            layout_dirty: true,
            render_dirty: true,
            layout: LayoutProps::default(),
            style: VisualStyle::default(),
            widget,
            handlers: Handlers::default(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &'static str {
        self.widget.kind()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_focusable(&self) -> bool {
        self.focusable
    }

    /// Absolute bounds from the most recent layout pass.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn layout(&self) -> &LayoutProps {
        &self.layout
    }

    pub fn style(&self) -> &VisualStyle {
        &self.style
    }

    pub fn widget(&self) -> &dyn Widget {
        self.widget.as_ref()
    }

    pub fn is_layout_dirty(&self) -> bool {
        self.layout_dirty
    }

    pub fn is_render_dirty(&self) -> bool {
        self.render_dirty
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("visible", &self.visible)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

/// Arena of nodes keyed by id. Parents are plain id lookups; a container
/// owns the ordered list of its children's ids.
#[derive(Debug)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
    root: Option<NodeId>,
    pub(crate) focused: Option<NodeId>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            root: None,
            focused: None,
        }
    }

    /// Allocate a node for `widget`. The node starts detached and dirty.
    pub fn create(&mut self, widget: impl Widget) -> NodeId {
        self.create_boxed(Box::new(widget))
    }

    pub fn create_boxed(&mut self, widget: Box<dyn Widget>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        debug!(node = %id, kind = widget.kind(), "create node");
        self.nodes.insert(id, Node::new(id, widget));
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(&id).ok_or(EngineError::InvalidNode(id))
    }

    /// Fluent mutation handle for `id`.
    pub fn node_mut(&mut self, id: NodeId) -> Result<NodeMut<'_>> {
        if !self.nodes.contains_key(&id) {
            return Err(EngineError::InvalidNode(id));
        }
        Ok(NodeMut { tree: self, id })
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, id: NodeId) -> Result<()> {
        if !self.contains(id) {
            return Err(EngineError::InvalidNode(id));
        }
        self.root = Some(id);
        self.mark_dirty(id);
        Ok(())
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Typed access to a node's widget.
    pub fn widget<T: Widget>(&self, id: NodeId) -> Option<&T> {
        self.nodes.get(&id)?.widget.as_any().downcast_ref::<T>()
    }

    /// Typed mutable access to a node's widget. The node is marked dirty
    /// since the caller may change anything that affects size or paint.
    pub fn widget_mut<T: Widget>(&mut self, id: NodeId) -> Option<&mut T> {
        if !self.contains(id) {
            return None;
        }
        self.mark_dirty(id);
        self.nodes
            .get_mut(&id)?
            .widget
            .as_any_mut()
            .downcast_mut::<T>()
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    /// Whether `ancestor` is `id` or lies on its parent chain.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.nodes.get(&c).and_then(|n| n.parent);
        }
        false
    }

    fn check_attach(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.node(parent)?;
        self.node(child)?;
        if !parent_node.widget.is_container() {
            return Err(EngineError::NotAContainer(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(EngineError::Cycle { parent, child });
        }
        Ok(())
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check_attach(parent, child)?;
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(child);
        }
        self.attach_parent(parent, child);
        Ok(())
    }

    /// Insert `child` at `index` (clamped to the child count).
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.check_attach(parent, child)?;
        self.detach(child);
        if let Some(p) = self.nodes.get_mut(&parent) {
            let at = index.min(p.children.len());
            p.children.insert(at, child);
        }
        self.attach_parent(parent, child);
        Ok(())
    }

    /// Detach `child` from `parent`. The child stays alive in the arena.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        let attached = self.node(child)?.parent == Some(parent);
        if !attached {
            return Err(EngineError::InvalidNode(child));
        }
        self.detach(child);
        Ok(())
    }

    fn attach_parent(&mut self, parent: NodeId, child: NodeId) {
        if let Some(c) = self.nodes.get_mut(&child) {
            c.parent = Some(parent);
        }
        self.mark_dirty(child);
        debug!(parent = %parent, child = %child, "append child");
    }

    fn detach(&mut self, child: NodeId) {
        let old_parent = self.nodes.get_mut(&child).and_then(|c| c.parent.take());
        if let Some(old) = old_parent {
            if let Some(p) = self.nodes.get_mut(&old) {
                p.children.retain(|&c| c != child);
            }
            self.mark_dirty(old);
        }
    }

    /// Destroy `id` and its whole subtree. Each widget is disposed, its
    /// handler lists cleared and its parent link severed before it leaves
    /// the arena.
    pub fn dispose(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.detach(id);

        let mut stack = vec![id];
        let mut order = Vec::new();
        while let Some(cur) = stack.pop() {
            order.push(cur);
            if let Some(n) = self.nodes.get(&cur) {
                stack.extend(n.children.iter().copied());
            }
        }

        // Children before parents.
        for cur in order.into_iter().rev() {
            if let Some(mut node) = self.nodes.remove(&cur) {
                node.widget.dispose();
                node.handlers.clear();
                node.parent = None;
                node.children.clear();
            }
            if self.root == Some(cur) {
                self.root = None;
            }
            if self.focused == Some(cur) {
                self.focused = None;
            }
        }
        debug!(node = %id, "dispose subtree");
        Ok(())
    }

    /// Pre-order walk from `root`, including invisible nodes.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(cur) = stack.pop() {
            if let Some(n) = self.nodes.get(&cur) {
                out.push(cur);
                stack.extend(n.children.iter().rev().copied());
            }
        }
        out
    }

    // ------------------------------------------------------------------------
    // Dirty flags
    // ------------------------------------------------------------------------

    /// Mark `id` for re-layout and repaint; layout dirtiness propagates to
    /// every ancestor.
    pub fn mark_dirty(&mut self, id: NodeId) {
        if let Some(n) = self.nodes.get_mut(&id) {
            n.render_dirty = true;
        }
        let mut cur = Some(id);
        while let Some(c) = cur {
            match self.nodes.get_mut(&c) {
                Some(n) => {
                    n.layout_dirty = true;
                    cur = n.parent;
                }
                None => break,
            }
        }
    }

    /// Mark `id` for repaint only.
    pub fn mark_render_dirty(&mut self, id: NodeId) {
        if let Some(n) = self.nodes.get_mut(&id) {
            n.render_dirty = true;
        }
    }

    pub fn needs_layout(&self) -> bool {
        self.nodes.values().any(|n| n.layout_dirty)
    }

    pub fn needs_paint(&self) -> bool {
        self.nodes.values().any(|n| n.render_dirty || n.layout_dirty)
    }

    pub fn clear_dirty_flags(&mut self) {
        for n in self.nodes.values_mut() {
            n.layout_dirty = false;
            n.render_dirty = false;
        }
    }
}

// ============================================================================
// NodeMut
// ============================================================================

/// Builder-style handle returned by `Tree::node_mut`. Every setter applies
/// its change and marks the matching dirty flag before returning.
pub struct NodeMut<'a> {
    tree: &'a mut Tree,
    id: NodeId,
}

impl NodeMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    // Existence is checked in `Tree::node_mut`, and nothing can remove the
    // node while this handle borrows the tree.
    fn with_node(&mut self, f: impl FnOnce(&mut Node)) {
        if let Some(n) = self.tree.nodes.get_mut(&self.id) {
            f(n);
        }
    }

    fn layout(mut self, f: impl FnOnce(&mut LayoutProps)) -> Self {
        self.with_node(|n| f(&mut n.layout));
        self.tree.mark_dirty(self.id);
        self
    }

    fn style(mut self, f: impl FnOnce(VisualStyle) -> VisualStyle) -> Self {
        self.with_node(|n| n.style = f(n.style));
        self.tree.mark_render_dirty(self.id);
        self
    }

    pub fn width(self, width: impl Into<Dimension>) -> Self {
        let width = width.into();
        self.layout(|l| l.width = width)
    }

    pub fn height(self, height: impl Into<Dimension>) -> Self {
        let height = height.into();
        self.layout(|l| l.height = height)
    }

    pub fn min_width(self, v: u16) -> Self {
        self.layout(|l| l.min_width = Some(v))
    }

    pub fn max_width(self, v: u16) -> Self {
        self.layout(|l| l.max_width = Some(v))
    }

    pub fn min_height(self, v: u16) -> Self {
        self.layout(|l| l.min_height = Some(v))
    }

    pub fn max_height(self, v: u16) -> Self {
        self.layout(|l| l.max_height = Some(v))
    }

    pub fn flex(self, grow: u16) -> Self {
        self.layout(|l| l.flex = grow)
    }

    pub fn direction(self, direction: FlexDirection) -> Self {
        self.layout(|l| l.direction = direction)
    }

    pub fn justify(self, justify: Justify) -> Self {
        self.layout(|l| l.justify = justify)
    }

    pub fn align_items(self, align: Align) -> Self {
        self.layout(|l| l.align_items = align)
    }

    pub fn align_self(self, align: Align) -> Self {
        self.layout(|l| l.align_self = Some(align))
    }

    pub fn gap(self, gap: u16) -> Self {
        self.layout(|l| l.gap = gap)
    }

    pub fn padding(self, padding: impl Into<Edges>) -> Self {
        let padding = padding.into();
        self.layout(|l| l.padding = padding)
    }

    pub fn margin(self, margin: impl Into<Edges>) -> Self {
        let margin = margin.into();
        self.layout(|l| l.margin = margin)
    }

    /// Replace all layout properties at once.
    pub fn layout_props(self, props: LayoutProps) -> Self {
        self.layout(|l| *l = props)
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.with_node(|n| n.visible = visible);
        self.tree.mark_dirty(self.id);
        self
    }

    pub fn focusable(mut self, focusable: bool) -> Self {
        self.with_node(|n| n.focusable = focusable);
        self
    }

    pub fn fg(self, color: Rgba) -> Self {
        self.style(|s| s.fg(color))
    }

    pub fn bg(self, color: Rgba) -> Self {
        self.style(|s| s.bg(color))
    }

    pub fn attrs(self, attrs: CellAttrs) -> Self {
        self.style(|s| s.attrs(attrs))
    }

    pub fn bold(self, on: bool) -> Self {
        self.style(|s| s.flag(CellAttrs::BOLD, on))
    }

    pub fn italic(self, on: bool) -> Self {
        self.style(|s| s.flag(CellAttrs::ITALIC, on))
    }

    pub fn underline(self, on: bool) -> Self {
        self.style(|s| s.flag(CellAttrs::UNDERLINE, on))
    }

    pub fn visual_style(self, style: VisualStyle) -> Self {
        self.style(|_| style)
    }

    /// Register a key handler. Handlers run in registration order; the first
    /// to return true stops propagation.
    pub fn on_key<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&KeyEvent, &mut EventCtx) -> bool + 'static,
    {
        self.with_node(|n| n.handlers.key.push(Box::new(handler)));
        self
    }

    pub fn on_mouse<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&MouseEvent, &mut EventCtx) -> bool + 'static,
    {
        self.with_node(|n| n.handlers.mouse.push(Box::new(handler)));
        self
    }

    pub fn on_paste<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str, &mut EventCtx) -> bool + 'static,
    {
        self.with_node(|n| n.handlers.paste.push(Box::new(handler)));
        self
    }

    pub fn on_focus<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut EventCtx) + 'static,
    {
        self.with_node(|n| n.handlers.focus.push(Box::new(handler)));
        self
    }

    pub fn on_blur<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&mut EventCtx) + 'static,
    {
        self.with_node(|n| n.handlers.blur.push(Box::new(handler)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{BoxWidget, Spinner, Text};

    #[test]
    fn test_ids_are_sequential_and_never_recycled() {
        let mut tree = Tree::new();
        let a = tree.create(BoxWidget::new());
        let b = tree.create(Text::new("x"));
        assert_eq!(a, NodeId(1));
        assert_eq!(b, NodeId(2));
        tree.dispose(a).unwrap();
        let c = tree.create(BoxWidget::new());
        assert_eq!(c, NodeId(3));
        assert!(tree.node(NodeId::INVALID).is_err());
    }

    #[test]
    fn test_append_and_remove_child() {
        let mut tree = Tree::new();
        let parent = tree.create(BoxWidget::new());
        let a = tree.create(Text::new("a"));
        let b = tree.create(Text::new("b"));
        tree.append_child(parent, a).unwrap();
        tree.append_child(parent, b).unwrap();
        assert_eq!(tree.node(parent).unwrap().children(), &[a, b]);
        assert_eq!(tree.node(a).unwrap().parent(), Some(parent));

        tree.remove_child(parent, a).unwrap();
        assert_eq!(tree.node(parent).unwrap().children(), &[b]);
        assert_eq!(tree.node(a).unwrap().parent(), None);
        assert!(tree.contains(a));
        assert!(tree.remove_child(parent, a).is_err());
    }

    #[test]
    fn test_insert_child_clamps_index() {
        let mut tree = Tree::new();
        let parent = tree.create(BoxWidget::new());
        let a = tree.create(Text::new("a"));
        let b = tree.create(Text::new("b"));
        let c = tree.create(Text::new("c"));
        tree.append_child(parent, a).unwrap();
        tree.insert_child(parent, 0, b).unwrap();
        tree.insert_child(parent, 99, c).unwrap();
        assert_eq!(tree.node(parent).unwrap().children(), &[b, a, c]);
    }

    #[test]
    fn test_reparent_moves_child() {
        let mut tree = Tree::new();
        let p1 = tree.create(BoxWidget::new());
        let p2 = tree.create(BoxWidget::new());
        let child = tree.create(Text::new("c"));
        tree.append_child(p1, child).unwrap();
        tree.append_child(p2, child).unwrap();
        assert!(tree.node(p1).unwrap().children().is_empty());
        assert_eq!(tree.node(p2).unwrap().children(), &[child]);
    }

    #[test]
    fn test_leaf_rejects_children() {
        let mut tree = Tree::new();
        let leaf = tree.create(Text::new("leaf"));
        let other = tree.create(Text::new("other"));
        assert!(matches!(
            tree.append_child(leaf, other),
            Err(EngineError::NotAContainer(id)) if id == leaf
        ));
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut tree = Tree::new();
        let a = tree.create(BoxWidget::new());
        let b = tree.create(BoxWidget::new());
        let c = tree.create(BoxWidget::new());
        tree.append_child(a, b).unwrap();
        tree.append_child(b, c).unwrap();
        assert!(matches!(
            tree.append_child(c, a),
            Err(EngineError::Cycle { .. })
        ));
        assert!(matches!(
            tree.append_child(a, a),
            Err(EngineError::Cycle { .. })
        ));
        // Graph unchanged after the rejected append
        assert_eq!(tree.node(a).unwrap().parent(), None);
    }

    #[test]
    fn test_dispose_is_recursive_and_stops_widgets() {
        let mut tree = Tree::new();
        let root = tree.create(BoxWidget::new());
        let inner = tree.create(BoxWidget::new());
        let spinner = tree.create(Spinner::new());
        tree.append_child(root, inner).unwrap();
        tree.append_child(inner, spinner).unwrap();
        tree.set_root(root).unwrap();

        tree.dispose(inner).unwrap();
        assert!(!tree.contains(inner));
        assert!(!tree.contains(spinner));
        assert!(tree.node(root).unwrap().children().is_empty());
        assert_eq!(tree.root(), Some(root));

        tree.dispose(root).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.root(), None);
        assert!(tree.dispose(root).is_err());
    }

    #[test]
    fn test_layout_dirty_propagates_to_ancestors() {
        let mut tree = Tree::new();
        let root = tree.create(BoxWidget::new());
        let child = tree.create(BoxWidget::new());
        let leaf = tree.create(Text::new("x"));
        tree.append_child(root, child).unwrap();
        tree.append_child(child, leaf).unwrap();
        tree.clear_dirty_flags();
        assert!(!tree.needs_paint());

        tree.node_mut(leaf).unwrap().width(5u16);
        assert!(tree.node(root).unwrap().is_layout_dirty());
        assert!(tree.node(child).unwrap().is_layout_dirty());
        assert!(tree.node(leaf).unwrap().is_render_dirty());
        assert!(!tree.node(root).unwrap().is_render_dirty());
    }

    #[test]
    fn test_style_setters_only_mark_render_dirty() {
        let mut tree = Tree::new();
        let root = tree.create(BoxWidget::new());
        let leaf = tree.create(Text::new("x"));
        tree.append_child(root, leaf).unwrap();
        tree.clear_dirty_flags();

        tree.node_mut(leaf).unwrap().fg(0x112233FF).bold(true);
        assert!(!tree.needs_layout());
        assert!(tree.needs_paint());
        let style = tree.node(leaf).unwrap().style();
        assert_eq!(style.fg, 0x112233FF);
        assert!(style.attrs.contains(CellAttrs::BOLD));
    }

    #[test]
    fn test_fluent_setters_chain() {
        let mut tree = Tree::new();
        let n = tree.create(BoxWidget::new());
        tree.node_mut(n)
            .unwrap()
            .width(Dimension::Percent(50.0))
            .height(3u16)
            .flex(2)
            .direction(FlexDirection::Row)
            .padding([1u16, 2])
            .gap(1)
            .focusable(true);
        let node = tree.node(n).unwrap();
        assert_eq!(node.layout().width, Dimension::Percent(50.0));
        assert_eq!(node.layout().height, Dimension::Cells(3));
        assert_eq!(node.layout().flex, 2);
        assert_eq!(node.layout().padding, Edges::new(1, 2, 1, 2));
        assert!(node.is_focusable());
    }

    #[test]
    fn test_widget_downcast() {
        let mut tree = Tree::new();
        let t = tree.create(Text::new("before"));
        tree.clear_dirty_flags();
        tree.widget_mut::<Text>(t).unwrap().set_content("after");
        assert_eq!(tree.widget::<Text>(t).unwrap().content(), "after");
        assert!(tree.widget::<Spinner>(t).is_none());
        assert!(tree.needs_layout());
    }

    #[test]
    fn test_descendants_pre_order() {
        let mut tree = Tree::new();
        let root = tree.create(BoxWidget::new());
        let a = tree.create(BoxWidget::new());
        let a1 = tree.create(Text::new("a1"));
        let b = tree.create(Text::new("b"));
        tree.append_child(root, a).unwrap();
        tree.append_child(a, a1).unwrap();
        tree.append_child(root, b).unwrap();
        assert_eq!(tree.descendants(root), vec![root, a, a1, b]);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(7).to_string(), "#7");
    }
}
