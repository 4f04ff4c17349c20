//! Event Module: handler registration, dispatch and focus.
//!
//! Responsibilities:
//! - Per-node handler lists (key, mouse, paste, focus, blur)
//! - Key and paste routing: focused node first, bubbling to ancestors
//! - Mouse routing via hit testing, click-to-focus
//! - Tab / Shift+Tab focus traversal in depth-first tree order
//! - Modal confinement: input never leaves the top-most modal layer
//! - `EventCtx`, through which handlers request quit or defer tree mutations

use std::fmt;

use tracing::debug;

use crate::compositor::Compositor;
use crate::input::{KeyEvent, Modifiers, MouseAction, MouseButton, MouseEvent};
use crate::layout::hit_test;
use crate::tree::{NodeId, Tree};

pub type KeyHandler = Box<dyn FnMut(&KeyEvent, &mut EventCtx) -> bool>;
pub type MouseHandler = Box<dyn FnMut(&MouseEvent, &mut EventCtx) -> bool>;
pub type PasteHandler = Box<dyn FnMut(&str, &mut EventCtx) -> bool>;
pub type FocusHandler = Box<dyn FnMut(&mut EventCtx)>;

/// A tree mutation queued during dispatch or paint, applied once the pass
/// that queued it has finished.
pub type Deferred = Box<dyn FnOnce(&mut Tree)>;

#[derive(Default)]
pub struct Handlers {
    pub(crate) key: Vec<KeyHandler>,
    pub(crate) mouse: Vec<MouseHandler>,
    pub(crate) paste: Vec<PasteHandler>,
    pub(crate) focus: Vec<FocusHandler>,
    pub(crate) blur: Vec<FocusHandler>,
}

impl Handlers {
    pub fn clear(&mut self) {
        self.key.clear();
        self.mouse.clear();
        self.paste.clear();
        self.focus.clear();
        self.blur.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
            && self.mouse.is_empty()
            && self.paste.is_empty()
            && self.focus.is_empty()
            && self.blur.is_empty()
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("key", &self.key.len())
            .field("mouse", &self.mouse.len())
            .field("paste", &self.paste.len())
            .field("focus", &self.focus.len())
            .field("blur", &self.blur.len())
            .finish()
    }
}

// ============================================================================
// EventCtx
// ============================================================================

/// Passed to every handler. Handlers cannot touch the tree directly while it
/// is being traversed; structural changes go through `defer`.
#[derive(Default)]
pub struct EventCtx {
    target: Option<NodeId>,
    current: Option<NodeId>,
    deferred: Vec<Deferred>,
    quit: bool,
}

impl EventCtx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Node the event was originally routed to.
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Node whose handler is running right now.
    pub fn current(&self) -> Option<NodeId> {
        self.current
    }

    pub fn defer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Tree) + 'static,
    {
        self.deferred.push(Box::new(f));
    }

    pub fn request_quit(&mut self) {
        self.quit = true;
    }

    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Run queued mutations in the order they were deferred. Returns how many
    /// ran.
    pub fn apply_deferred(&mut self, tree: &mut Tree) -> usize {
        let queued = std::mem::take(&mut self.deferred);
        let n = queued.len();
        for f in queued {
            f(tree);
        }
        n
    }

    fn enter(&mut self, id: NodeId) {
        self.current = Some(id);
    }
}

impl fmt::Debug for EventCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCtx")
            .field("target", &self.target)
            .field("current", &self.current)
            .field("deferred", &self.deferred.len())
            .field("quit", &self.quit)
            .finish()
    }
}

// ============================================================================
// Key / Paste Dispatch
// ============================================================================

/// Node keyboard input goes to: the focused node when it lies inside the
/// current input scope, otherwise the scope root.
fn key_target(tree: &Tree, compositor: &Compositor) -> Option<(NodeId, NodeId)> {
    let scope = compositor.input_scope(tree)?;
    let target = match tree.focused() {
        Some(f) if tree.is_ancestor_or_self(scope, f) => f,
        _ => scope,
    };
    Some((target, scope))
}

/// Route a key event. Tab and Shift+Tab move focus when there is somewhere
/// to move it; everything else bubbles from the target towards the scope
/// root. At each node the registered handlers run first, in registration
/// order, then the widget's own `handle_key`. Returns whether anything
/// consumed the key.
pub fn dispatch_key(
    tree: &mut Tree,
    compositor: &Compositor,
    key: &KeyEvent,
    ctx: &mut EventCtx,
) -> bool {
    let Some((target, scope)) = key_target(tree, compositor) else {
        return false;
    };

    if key.name == "tab" {
        let moved = if key.modifiers == Modifiers::SHIFT {
            focus_prev(tree, compositor, ctx)
        } else if key.modifiers.is_empty() {
            focus_next(tree, compositor, ctx)
        } else {
            false
        };
        if moved {
            return true;
        }
    }

    ctx.target = Some(target);
    let mut cur = Some(target);
    while let Some(id) = cur {
        let Some(node) = tree.get_mut(id) else { break };
        ctx.enter(id);
        for handler in node.handlers.key.iter_mut() {
            if handler(key, ctx) {
                return true;
            }
        }
        if node.widget.handle_key(key) {
            tree.mark_dirty(id);
            return true;
        }
        if id == scope {
            break;
        }
        cur = node.parent;
    }
    false
}

/// Route bracketed-paste text along the same path as keys.
pub fn dispatch_paste(
    tree: &mut Tree,
    compositor: &Compositor,
    text: &str,
    ctx: &mut EventCtx,
) -> bool {
    let Some((target, scope)) = key_target(tree, compositor) else {
        return false;
    };
    ctx.target = Some(target);
    let mut cur = Some(target);
    while let Some(id) = cur {
        let Some(node) = tree.get_mut(id) else { break };
        ctx.enter(id);
        for handler in node.handlers.paste.iter_mut() {
            if handler(text, ctx) {
                return true;
            }
        }
        if id == scope {
            break;
        }
        cur = node.parent;
    }
    false
}

// ============================================================================
// Mouse Dispatch
// ============================================================================

/// Route a mouse event to the deepest node under the pointer and bubble to
/// its ancestors. A button press also focuses the nearest focusable node on
/// that path.
pub fn dispatch_mouse(
    tree: &mut Tree,
    compositor: &Compositor,
    mouse: &MouseEvent,
    ctx: &mut EventCtx,
) -> bool {
    let Some(hit) = hit_test(tree, compositor, mouse.x, mouse.y) else {
        return false;
    };

    if mouse.action == MouseAction::Press && mouse.button != MouseButton::None {
        let mut cur = Some(hit);
        while let Some(id) = cur {
            let Some(node) = tree.get(id) else { break };
            if node.focusable {
                set_focus(tree, Some(id), ctx);
                break;
            }
            cur = node.parent;
        }
    }

    ctx.target = Some(hit);
    let mut cur = Some(hit);
    while let Some(id) = cur {
        let Some(node) = tree.get_mut(id) else { break };
        ctx.enter(id);
        for handler in node.handlers.mouse.iter_mut() {
            if handler(mouse, ctx) {
                return true;
            }
        }
        if node.widget.handle_mouse(mouse) {
            tree.mark_dirty(id);
            return true;
        }
        cur = node.parent;
    }
    false
}

// ============================================================================
// Focus
// ============================================================================

/// Move focus to `id` (or clear it), firing blur on the old node and focus
/// on the new one. Returns false when focus did not change.
pub fn set_focus(tree: &mut Tree, id: Option<NodeId>, ctx: &mut EventCtx) -> bool {
    let id = id.filter(|&n| tree.contains(n));
    let old = tree.focused;
    if old == id {
        return false;
    }
    tree.focused = id;
    debug!(from = ?old, to = ?id, "focus change");

    if let Some(old) = old {
        if let Some(node) = tree.get_mut(old) {
            ctx.enter(old);
            for handler in node.handlers.blur.iter_mut() {
                handler(ctx);
            }
        }
        tree.mark_render_dirty(old);
    }
    if let Some(new) = id {
        if let Some(node) = tree.get_mut(new) {
            ctx.enter(new);
            for handler in node.handlers.focus.iter_mut() {
                handler(ctx);
            }
        }
        tree.mark_render_dirty(new);
    }
    true
}

/// Advance focus to the next focusable node in the input scope, wrapping.
pub fn focus_next(tree: &mut Tree, compositor: &Compositor, ctx: &mut EventCtx) -> bool {
    let order = collect_focusable_order(tree, compositor);
    if order.is_empty() {
        return false;
    }
    let next = tree
        .focused()
        .and_then(|f| order.iter().position(|&h| h == f))
        .map(|i| (i + 1) % order.len())
        .unwrap_or(0);
    set_focus(tree, Some(order[next]), ctx)
}

/// Move focus to the previous focusable node in the input scope, wrapping.
pub fn focus_prev(tree: &mut Tree, compositor: &Compositor, ctx: &mut EventCtx) -> bool {
    let order = collect_focusable_order(tree, compositor);
    if order.is_empty() {
        return false;
    }
    let prev = match tree
        .focused()
        .and_then(|f| order.iter().position(|&h| h == f))
    {
        Some(0) | None => order.len() - 1,
        Some(i) => i - 1,
    };
    set_focus(tree, Some(order[prev]), ctx)
}

/// Focusable, visible nodes in depth-first order within the input scope.
pub fn collect_focusable_order(tree: &Tree, compositor: &Compositor) -> Vec<NodeId> {
    let mut result = Vec::new();
    if let Some(scope) = compositor.input_scope(tree) {
        collect_focusable_recursive(tree, scope, &mut result);
    }
    result
}

fn collect_focusable_recursive(tree: &Tree, id: NodeId, result: &mut Vec<NodeId>) {
    if let Some(node) = tree.get(id) {
        if !node.visible {
            return;
        }
        if node.focusable {
            result.push(id);
        }
        for &child in &node.children {
            collect_focusable_recursive(tree, child, result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::compute_layers;
    use crate::paint::Surface;
    use crate::types::{Bounds, Style};
    use crate::widget::{BoxWidget, Text, Widget};
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Leaf that consumes `+` and counts clicks.
    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    impl Widget for Counter {
        fn kind(&self) -> &'static str {
            "counter"
        }

        fn render(&self, _surface: &mut Surface<'_>, _area: Bounds, _style: Style) {}

        fn handle_key(&mut self, key: &KeyEvent) -> bool {
            if key.name == "+" {
                self.value += 1;
                return true;
            }
            false
        }

        fn handle_mouse(&mut self, mouse: &MouseEvent) -> bool {
            if mouse.action == MouseAction::Press {
                self.value += 10;
                return true;
            }
            false
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    type Log = Rc<RefCell<Vec<String>>>;

    fn logger(log: &Log, label: &'static str, consume: bool) -> impl FnMut(&KeyEvent, &mut EventCtx) -> bool {
        let log = Rc::clone(log);
        move |_key, _ctx| {
            log.borrow_mut().push(label.to_string());
            consume
        }
    }

    fn press(x: u16, y: u16) -> MouseEvent {
        MouseEvent {
            x,
            y,
            button: MouseButton::Left,
            action: MouseAction::Press,
            modifiers: Modifiers::empty(),
        }
    }

    /// root (column) > [a (focusable, 1 row), b (focusable, 1 row) > counter]
    fn fixture() -> (Tree, NodeId, NodeId, NodeId, NodeId) {
        let mut tree = Tree::new();
        let root = tree.create(BoxWidget::new());
        let a = tree.create(Text::new("a"));
        let b = tree.create(BoxWidget::new());
        let counter = tree.create(Counter::default());
        tree.append_child(root, a).unwrap();
        tree.append_child(root, b).unwrap();
        tree.append_child(b, counter).unwrap();
        tree.node_mut(a).unwrap().focusable(true).height(1u16);
        tree.node_mut(b).unwrap().focusable(true).height(1u16);
        tree.node_mut(counter).unwrap().height(1u16);
        tree.set_root(root).unwrap();
        (tree, root, a, b, counter)
    }

    #[test]
    fn test_key_bubbles_to_ancestors_in_order() {
        let (mut tree, root, a, _b, _c) = fixture();
        let log: Log = Rc::default();
        tree.node_mut(a).unwrap().on_key(logger(&log, "a1", false)).on_key(logger(&log, "a2", false));
        tree.node_mut(root).unwrap().on_key(logger(&log, "root", true));

        let compositor = Compositor::new();
        let mut ctx = EventCtx::new();
        set_focus(&mut tree, Some(a), &mut ctx);
        assert!(dispatch_key(&mut tree, &compositor, &KeyEvent::new("x"), &mut ctx));
        assert_eq!(*log.borrow(), vec!["a1", "a2", "root"]);
        assert_eq!(ctx.target(), Some(a));
        assert_eq!(ctx.current(), Some(root));
    }

    #[test]
    fn test_first_consumer_stops_propagation() {
        let (mut tree, root, a, _b, _c) = fixture();
        let log: Log = Rc::default();
        tree.node_mut(a).unwrap().on_key(logger(&log, "a", true));
        tree.node_mut(root).unwrap().on_key(logger(&log, "root", true));
        let mut ctx = EventCtx::new();
        set_focus(&mut tree, Some(a), &mut ctx);
        dispatch_key(&mut tree, &Compositor::new(), &KeyEvent::new("x"), &mut ctx);
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn test_unfocused_key_goes_to_root() {
        let (mut tree, root, _a, _b, _c) = fixture();
        let log: Log = Rc::default();
        tree.node_mut(root).unwrap().on_key(logger(&log, "root", false));
        let mut ctx = EventCtx::new();
        assert!(!dispatch_key(&mut tree, &Compositor::new(), &KeyEvent::new("x"), &mut ctx));
        assert_eq!(*log.borrow(), vec!["root"]);
    }

    #[test]
    fn test_widget_handle_key_after_handlers() {
        let (mut tree, _root, _a, _b, counter) = fixture();
        tree.node_mut(counter).unwrap().focusable(true);
        let mut ctx = EventCtx::new();
        set_focus(&mut tree, Some(counter), &mut ctx);
        tree.clear_dirty_flags();
        assert!(dispatch_key(&mut tree, &Compositor::new(), &KeyEvent::new("+"), &mut ctx));
        assert_eq!(tree.widget::<Counter>(counter).unwrap().value, 1);
        assert!(tree.needs_paint());
    }

    #[test]
    fn test_tab_cycles_focus_and_fires_handlers() {
        let (mut tree, _root, a, b, _c) = fixture();
        let log: Log = Rc::default();
        let (l1, l2) = (Rc::clone(&log), Rc::clone(&log));
        tree.node_mut(a)
            .unwrap()
            .on_blur(move |_| l1.borrow_mut().push("blur a".into()));
        tree.node_mut(b)
            .unwrap()
            .on_focus(move |_| l2.borrow_mut().push("focus b".into()));

        let compositor = Compositor::new();
        let mut ctx = EventCtx::new();
        let tab = KeyEvent::new("tab");
        let back = KeyEvent::new("tab").with_modifiers(Modifiers::SHIFT);

        assert!(dispatch_key(&mut tree, &compositor, &tab, &mut ctx));
        assert_eq!(tree.focused(), Some(a));
        dispatch_key(&mut tree, &compositor, &tab, &mut ctx);
        assert_eq!(tree.focused(), Some(b));
        dispatch_key(&mut tree, &compositor, &tab, &mut ctx);
        assert_eq!(tree.focused(), Some(a));
        dispatch_key(&mut tree, &compositor, &back, &mut ctx);
        assert_eq!(tree.focused(), Some(b));
        assert_eq!(*log.borrow(), vec!["blur a", "focus b", "blur a", "focus b"]);
    }

    #[test]
    fn test_modal_confines_focus_and_keys() {
        let (mut tree, root, a, _b, _c) = fixture();
        let dialog = tree.create(BoxWidget::new());
        let ok = tree.create(Text::new("OK"));
        tree.append_child(dialog, ok).unwrap();
        tree.node_mut(ok).unwrap().focusable(true);

        let log: Log = Rc::default();
        tree.node_mut(root).unwrap().on_key(logger(&log, "root", true));
        tree.node_mut(dialog).unwrap().on_key(logger(&log, "dialog", true));

        let mut compositor = Compositor::new();
        let mut ctx = EventCtx::new();
        set_focus(&mut tree, Some(a), &mut ctx);
        compositor.push(dialog, true);

        assert_eq!(collect_focusable_order(&tree, &compositor), vec![ok]);
        dispatch_key(&mut tree, &compositor, &KeyEvent::new("x"), &mut ctx);
        assert_eq!(*log.borrow(), vec!["dialog"]);

        focus_next(&mut tree, &compositor, &mut ctx);
        assert_eq!(tree.focused(), Some(ok));
    }

    #[test]
    fn test_click_focuses_and_reaches_widget() {
        let (mut tree, _root, _a, b, counter) = fixture();
        let compositor = Compositor::new();
        compute_layers(&mut tree, &compositor, 10, 4);
        let mut ctx = EventCtx::new();

        // Row 1 is `b`, whose only child is the counter.
        assert!(dispatch_mouse(&mut tree, &compositor, &press(0, 1), &mut ctx));
        assert_eq!(tree.focused(), Some(b));
        assert_eq!(ctx.target(), Some(counter));
        assert_eq!(tree.widget::<Counter>(counter).unwrap().value, 10);
    }

    #[test]
    fn test_modal_swallows_hits_outside_it() {
        let (mut tree, root, _a, _b, _c) = fixture();
        let clicks = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&clicks);
        tree.node_mut(root).unwrap().on_mouse(move |_, _| {
            *seen.borrow_mut() += 1;
            true
        });
        let dialog = tree.create(BoxWidget::new());
        tree.node_mut(dialog).unwrap().width(3u16).height(1u16);
        let mut compositor = Compositor::new();
        compositor.push(dialog, true);
        compute_layers(&mut tree, &compositor, 10, 4);

        let mut ctx = EventCtx::new();
        assert!(!dispatch_mouse(&mut tree, &compositor, &press(8, 3), &mut ctx));
        assert_eq!(*clicks.borrow(), 0);

        compositor.remove(dialog);
        assert!(dispatch_mouse(&mut tree, &compositor, &press(8, 3), &mut ctx));
        assert_eq!(*clicks.borrow(), 1);
    }

    #[test]
    fn test_paste_routed_to_focus() {
        let (mut tree, _root, a, _b, _c) = fixture();
        let got = Rc::new(RefCell::new(String::new()));
        let sink = Rc::clone(&got);
        tree.node_mut(a).unwrap().on_paste(move |text, _| {
            sink.borrow_mut().push_str(text);
            true
        });
        let mut ctx = EventCtx::new();
        set_focus(&mut tree, Some(a), &mut ctx);
        assert!(dispatch_paste(&mut tree, &Compositor::new(), "clip", &mut ctx));
        assert_eq!(*got.borrow(), "clip");
    }

    #[test]
    fn test_deferred_mutations_run_after_dispatch() {
        let (mut tree, root, a, _b, _c) = fixture();
        tree.node_mut(root).unwrap().on_key(move |_, ctx| {
            ctx.defer(move |tree| {
                let _ = tree.dispose(a);
            });
            ctx.request_quit();
            true
        });
        let mut ctx = EventCtx::new();
        dispatch_key(&mut tree, &Compositor::new(), &KeyEvent::new("q"), &mut ctx);
        assert!(tree.contains(a));
        assert!(ctx.has_deferred());
        assert!(ctx.quit_requested());

        assert_eq!(ctx.apply_deferred(&mut tree), 1);
        assert!(!tree.contains(a));
        assert!(!ctx.has_deferred());
    }

    #[test]
    fn test_dispose_clears_handlers_and_focus() {
        let (mut tree, _root, a, _b, _c) = fixture();
        let mut ctx = EventCtx::new();
        set_focus(&mut tree, Some(a), &mut ctx);
        tree.dispose(a).unwrap();
        assert_eq!(tree.focused(), None);
        assert!(!set_focus(&mut tree, Some(a), &mut ctx));
    }
}
