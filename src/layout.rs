//! Layout Module: flexbox constraint resolution via Taffy.
//!
//! Responsibilities:
//! - Layout property types (dimensions, direction, alignment, edges)
//! - Translate `LayoutProps` into Taffy styles and solve each pass
//! - Write absolute `Bounds` back onto every node
//! - Rectangle predicates and hit testing for mouse routing
//!
//! Coordinates saturate at zero: contradictory constraints produce empty
//! boxes, never an error.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use taffy::style_helpers::{auto, length, percent};
use taffy::{AvailableSpace, NodeId as TaffyNode, TaffyError, TaffyTree};
use tracing::{debug, warn};

use crate::compositor::Compositor;
use crate::error::EngineError;
use crate::tree::{NodeId, Tree};
use crate::types::Bounds;

// ============================================================================
// Property Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Dimension {
    #[default]
    Auto,
    Cells(u16),
    /// Percentage of the containing box's content size on the same axis.
    Percent(f32),
}

impl Dimension {
    pub fn percent(p: f32) -> Self {
        Self::Percent(p)
    }
}

impl From<u16> for Dimension {
    fn from(n: u16) -> Self {
        Self::Cells(n)
    }
}

impl FromStr for Dimension {
    type Err = EngineError;

    /// Accepts `"auto"`, a cell count such as `"12"`, or a percentage such
    /// as `"50%"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        if let Some(p) = s.strip_suffix('%') {
            return match p.trim().parse::<f32>() {
                Ok(v) if v.is_finite() && v >= 0.0 => Ok(Self::Percent(v)),
                _ => Err(EngineError::Config(format!("invalid percentage `{s}`"))),
            };
        }
        s.parse::<u16>()
            .map(Self::Cells)
            .map_err(|_| EngineError::Config(format!("invalid dimension `{s}`")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlexDirection {
    Row,
    #[default]
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Justify {
    #[default]
    Start,
    Center,
    End,
    SpaceBetween,
    SpaceAround,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    Start,
    Center,
    End,
    #[default]
    Stretch,
}

/// Four-sided spacing, used for padding, margin and widget insets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Edges {
    pub top: u16,
    pub right: u16,
    pub bottom: u16,
    pub left: u16,
}

impl Edges {
    pub const ZERO: Edges = Edges::new(0, 0, 0, 0);

    pub const fn new(top: u16, right: u16, bottom: u16, left: u16) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const fn all(v: u16) -> Self {
        Self::new(v, v, v, v)
    }

    pub fn horizontal(&self) -> u16 {
        self.left.saturating_add(self.right)
    }

    pub fn vertical(&self) -> u16 {
        self.top.saturating_add(self.bottom)
    }

    fn combine(self, other: Edges) -> Edges {
        Edges::new(
            self.top.saturating_add(other.top),
            self.right.saturating_add(other.right),
            self.bottom.saturating_add(other.bottom),
            self.left.saturating_add(other.left),
        )
    }
}

impl From<u16> for Edges {
    fn from(v: u16) -> Self {
        Self::all(v)
    }
}

/// `[vertical, horizontal]`
impl From<[u16; 2]> for Edges {
    fn from([v, h]: [u16; 2]) -> Self {
        Self::new(v, h, v, h)
    }
}

/// `[top, right, bottom, left]`
impl From<[u16; 4]> for Edges {
    fn from([t, r, b, l]: [u16; 4]) -> Self {
        Self::new(t, r, b, l)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LayoutProps {
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Option<u16>,
    pub max_width: Option<u16>,
    pub min_height: Option<u16>,
    pub max_height: Option<u16>,
    /// Grow factor; 0 keeps the base size.
    pub flex: u16,
    pub direction: FlexDirection,
    pub justify: Justify,
    pub align_items: Align,
    pub align_self: Option<Align>,
    pub gap: u16,
    pub padding: Edges,
    pub margin: Edges,
}

fn percent_of(p: f32, avail: u32) -> u32 {
    if !p.is_finite() || p <= 0.0 {
        return 0;
    }
    (avail as f64 * p as f64 / 100.0).floor() as u32
}

fn to_u16(v: u32) -> u16 {
    v.min(u16::MAX as u32) as u16
}

/// Whole cells from a rounded taffy coordinate. Negative and NaN values
/// collapse to zero.
fn cells(v: f32) -> u16 {
    v.round().max(0.0) as u16
}

// ============================================================================
// Taffy Style Mapping
// ============================================================================

fn dimension(d: Dimension) -> taffy::Dimension {
    match d {
        Dimension::Auto => auto(),
        Dimension::Cells(n) => length(n as f32),
        Dimension::Percent(p) if p.is_finite() && p > 0.0 => percent(p / 100.0),
        Dimension::Percent(_) => length(0.0),
    }
}

fn limit(v: Option<u16>) -> taffy::Dimension {
    v.map_or(auto(), |n| length(n as f32))
}

fn inset_rect(e: Edges) -> taffy::Rect<taffy::LengthPercentage> {
    taffy::Rect {
        top: length(e.top as f32),
        right: length(e.right as f32),
        bottom: length(e.bottom as f32),
        left: length(e.left as f32),
    }
}

fn margin_rect(e: Edges) -> taffy::Rect<taffy::LengthPercentageAuto> {
    taffy::Rect {
        top: length(e.top as f32),
        right: length(e.right as f32),
        bottom: length(e.bottom as f32),
        left: length(e.left as f32),
    }
}

fn align(a: Align) -> taffy::AlignItems {
    match a {
        Align::Start => taffy::AlignItems::Start,
        Align::Center => taffy::AlignItems::Center,
        Align::End => taffy::AlignItems::End,
        Align::Stretch => taffy::AlignItems::Stretch,
    }
}

/// Translate `props` into a taffy flex style. Widget insets (box borders)
/// become taffy border edges so they are excluded from the content box.
/// Items only grow: `flex_shrink` is pinned to zero.
fn to_taffy_style(props: &LayoutProps, insets: Edges) -> taffy::Style {
    taffy::Style {
        display: taffy::Display::Flex,
        flex_direction: match props.direction {
            FlexDirection::Row => taffy::FlexDirection::Row,
            FlexDirection::Column => taffy::FlexDirection::Column,
        },
        justify_content: Some(match props.justify {
            Justify::Start => taffy::JustifyContent::Start,
            Justify::Center => taffy::JustifyContent::Center,
            Justify::End => taffy::JustifyContent::End,
            Justify::SpaceBetween => taffy::JustifyContent::SpaceBetween,
            Justify::SpaceAround => taffy::JustifyContent::SpaceAround,
        }),
        align_items: Some(align(props.align_items)),
        align_self: props.align_self.map(align),
        flex_grow: props.flex as f32,
        flex_shrink: 0.0,
        size: taffy::Size {
            width: dimension(props.width),
            height: dimension(props.height),
        },
        min_size: taffy::Size {
            width: limit(props.min_width),
            height: limit(props.min_height),
        },
        max_size: taffy::Size {
            width: limit(props.max_width),
            height: limit(props.max_height),
        },
        padding: inset_rect(props.padding),
        border: inset_rect(insets),
        margin: margin_rect(props.margin),
        gap: taffy::Size {
            width: length(props.gap as f32),
            height: length(props.gap as f32),
        },
        ..Default::default()
    }
}

// ============================================================================
// Layout Pass
// ============================================================================

/// Leaf nodes carry their widget's measured size as taffy node context.
type LeafSize = taffy::Size<f32>;

/// Lay out the subtree at `root` inside an `available_width` x
/// `available_height` box at the origin. `Auto` on the root fills the box.
pub fn compute(tree: &mut Tree, root: NodeId, available_width: u16, available_height: u16) {
    compute_with(tree, root, available_width, available_height);
}

/// Lay out the base root and every overlay layer against the full screen.
pub fn compute_layers(tree: &mut Tree, compositor: &Compositor, width: u16, height: u16) {
    if let Some(root) = tree.root() {
        compute_with(tree, root, width, height);
    }
    for layer in compositor.layers() {
        compute_with(tree, layer.root, width, height);
    }
}

fn compute_with(tree: &mut Tree, root: NodeId, width: u16, height: u16) {
    let Some(node) = tree.get(root) else {
        return;
    };
    if !node.visible {
        zero_subtree(tree, root, 0, 0);
        return;
    }

    let start = Instant::now();
    let placed = match solve(tree, root, width, height) {
        Ok(placed) => placed,
        Err(e) => {
            warn!(root = %root, error = ?e, "layout failed, subtree collapsed");
            zero_subtree(tree, root, 0, 0);
            return;
        }
    };
    for &(id, bounds) in &placed {
        if let Some(n) = tree.get_mut(id) {
            n.bounds = bounds;
            n.layout_dirty = false;
        }
    }
    debug!(
        root = %root,
        nodes = placed.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "layout pass"
    );
}

/// Mirror the visible subtree at `root` into a fresh `TaffyTree`, solve it
/// and read back absolute bounds for every node under `root`.
fn solve(
    tree: &Tree,
    root: NodeId,
    width: u16,
    height: u16,
) -> Result<Vec<(NodeId, Bounds)>, TaffyError> {
    let Some(node) = tree.get(root) else {
        return Ok(Vec::new());
    };
    let mut solver: TaffyTree<LeafSize> = TaffyTree::new();
    let mut mirror = HashMap::new();
    let Some(root_node) = mirror_node(tree, &mut solver, &mut mirror, root)? else {
        return Ok(Vec::new());
    };

    // The root's own box is resolved here against the available size; taffy
    // then only sees a fixed-size container without margins.
    let props = node.layout;
    let m = props.margin;
    let (aw, ah) = (width as u32, height as u32);
    let root_w = match props.width {
        Dimension::Cells(n) => n as u32,
        Dimension::Percent(p) => percent_of(p, aw),
        Dimension::Auto => aw.saturating_sub(m.horizontal() as u32),
    };
    let root_h = match props.height {
        Dimension::Cells(n) => n as u32,
        Dimension::Percent(p) => percent_of(p, ah),
        Dimension::Auto => ah.saturating_sub(m.vertical() as u32),
    };
    let mut style = solver.style(root_node)?.clone();
    style.size = taffy::Size {
        width: length(root_w as f32),
        height: length(root_h as f32),
    };
    style.margin = margin_rect(Edges::ZERO);
    solver.set_style(root_node, style)?;

    solver.compute_layout_with_measure(
        root_node,
        taffy::Size {
            width: AvailableSpace::Definite(root_w as f32),
            height: AvailableSpace::Definite(root_h as f32),
        },
        |known, _available, _id, leaf: Option<&mut LeafSize>, _style| {
            let leaf = leaf.map_or(taffy::Size::ZERO, |size| *size);
            taffy::Size {
                width: known.width.unwrap_or(leaf.width),
                height: known.height.unwrap_or(leaf.height),
            }
        },
    )?;

    let mut placed = Vec::with_capacity(mirror.len());
    let origin = (m.left as f32, m.top as f32);
    read_back(tree, &solver, &mirror, root, origin, true, &mut placed)?;

    // Padding or borders larger than the root push taffy past the screen;
    // the root itself never extends beyond the available box.
    if let Some((_, b)) = placed.first_mut() {
        b.width = b.width.min(to_u16(aw.saturating_sub(b.x as u32)));
        b.height = b.height.min(to_u16(ah.saturating_sub(b.y as u32)));
    }
    Ok(placed)
}

/// Add the visible subtree at `id` to `solver`, children first. Hidden nodes
/// are left out entirely so they take no space and no gap.
fn mirror_node(
    tree: &Tree,
    solver: &mut TaffyTree<LeafSize>,
    mirror: &mut HashMap<NodeId, TaffyNode>,
    id: NodeId,
) -> Result<Option<TaffyNode>, TaffyError> {
    let Some(node) = tree.get(id) else {
        return Ok(None);
    };
    if !node.visible {
        return Ok(None);
    }
    let style = to_taffy_style(&node.layout, node.widget.insets());
    let taffy_node = if node.widget.is_container() {
        let mut children = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            if let Some(c) = mirror_node(tree, solver, mirror, child)? {
                children.push(c);
            }
        }
        solver.new_with_children(style, &children)?
    } else {
        let (w, h) = node.widget.measure();
        solver.new_leaf_with_context(
            style,
            LeafSize {
                width: w as f32,
                height: h as f32,
            },
        )?
    };
    mirror.insert(id, taffy_node);
    Ok(Some(taffy_node))
}

/// Convert taffy's parent-relative layouts into absolute `Bounds`. Hidden
/// children get zero-size bounds at their parent's content origin.
fn read_back(
    tree: &Tree,
    solver: &TaffyTree<LeafSize>,
    mirror: &HashMap<NodeId, TaffyNode>,
    id: NodeId,
    origin: (f32, f32),
    is_root: bool,
    out: &mut Vec<(NodeId, Bounds)>,
) -> Result<(), TaffyError> {
    let (Some(node), Some(&taffy_node)) = (tree.get(id), mirror.get(&id)) else {
        return Ok(());
    };
    let layout = solver.layout(taffy_node)?;
    let (x, y) = if is_root {
        origin
    } else {
        (origin.0 + layout.location.x, origin.1 + layout.location.y)
    };
    out.push((
        id,
        Bounds::new(cells(x), cells(y), cells(layout.size.width), cells(layout.size.height)),
    ));

    let frame = node.layout.padding.combine(node.widget.insets());
    let content = (
        cells(x).saturating_add(frame.left),
        cells(y).saturating_add(frame.top),
    );
    for &child in &node.children {
        if mirror.contains_key(&child) {
            read_back(tree, solver, mirror, child, (x, y), false, out)?;
        } else {
            for hidden in tree.descendants(child) {
                out.push((hidden, Bounds::new(content.0, content.1, 0, 0)));
            }
        }
    }
    Ok(())
}

/// Give a hidden subtree empty bounds at `(x, y)`.
fn zero_subtree(tree: &mut Tree, id: NodeId, x: u16, y: u16) {
    for node_id in tree.descendants(id) {
        if let Some(n) = tree.get_mut(node_id) {
            n.bounds = Bounds::new(x, y, 0, 0);
            n.layout_dirty = false;
        }
    }
}

// ============================================================================
// Geometry Helpers
// ============================================================================

pub fn bounds_intersect(a: Bounds, b: Bounds) -> bool {
    bounds_intersection(a, b).is_some()
}

/// Overlapping rectangle of `a` and `b`, or `None` when they do not overlap.
pub fn bounds_intersection(a: Bounds, b: Bounds) -> Option<Bounds> {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());
    if x2 > x1 && y2 > y1 {
        Some(Bounds::new(x1, y1, x2 - x1, y2 - y1))
    } else {
        None
    }
}

pub fn point_in_bounds(b: Bounds, x: u16, y: u16) -> bool {
    x >= b.x && x < b.right() && y >= b.y && y < b.bottom()
}

// ============================================================================
// Hit Testing
// ============================================================================

/// Deepest visible node under `(x, y)`. Overlay layers are searched from
/// the highest z down; nothing below the top-most modal layer is reachable.
pub fn hit_test(tree: &Tree, compositor: &Compositor, x: u16, y: u16) -> Option<NodeId> {
    for layer in compositor.layers().iter().rev() {
        if let Some(hit) = hit_node(tree, layer.root, x, y) {
            return Some(hit);
        }
        if layer.modal {
            return None;
        }
    }
    tree.root().and_then(|root| hit_node(tree, root, x, y))
}

fn hit_node(tree: &Tree, id: NodeId, x: u16, y: u16) -> Option<NodeId> {
    let node = tree.get(id)?;
    if !node.visible || !point_in_bounds(node.bounds, x, y) {
        return None;
    }
    // Later children paint on top, so they win.
    for &child in node.children.iter().rev() {
        if let Some(hit) = hit_node(tree, child, x, y) {
            return Some(hit);
        }
    }
    Some(id)
}
