//! Scheduler: the render loop state machine.
//!
//! Responsibilities:
//! - Idle -> Running -> Stopped lifecycle and terminal mode management
//! - Input, tick, refresh and resize triggers, each ending in at most one frame
//! - Frame pipeline: deferred mutations, layout (only when dirty), paint,
//!   overlay composition, diff, write, flush, clear dirty flags
//! - Idempotent `quit` that restores the terminal and runs quit handlers once,
//!   including on fatal errors and on drop

use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::buffer::Buffer;
use crate::compositor::Compositor;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::event::{dispatch_key, dispatch_mouse, dispatch_paste, EventCtx};
use crate::input::{InputDecoder, InputEvent};
use crate::layout;
use crate::paint::paint_frame;
use crate::render::Renderer;
use crate::terminal::{TerminalBackend, TerminalModes};
use crate::tree::{NodeId, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, never started.
    Idle,
    Running,
    /// Terminal. A stopped loop cannot be restarted.
    Stopped,
}

/// Timings and counters for the most recent frame.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub frames: u64,
    pub changed_cells: usize,
    pub widgets_painted: usize,
    pub layout_us: u64,
    pub paint_us: u64,
    pub total_us: u64,
}

pub struct RenderLoop<B: TerminalBackend> {
    backend: B,
    config: EngineConfig,
    modes: TerminalModes,
    tree: Tree,
    compositor: Compositor,
    decoder: InputDecoder,
    renderer: Renderer,
    frame: Buffer,
    scratch: Buffer,
    ctx: EventCtx,
    state: LoopState,
    force_layout: bool,
    needs_frame: bool,
    last_tick: Option<Instant>,
    next_tick: Instant,
    quit_handlers: Vec<Box<dyn FnOnce()>>,
    quit_done: bool,
    stats: FrameStats,
}

impl<B: TerminalBackend> RenderLoop<B> {
    pub fn new(backend: B, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let (width, height) = backend.size();
        Ok(Self {
            modes: TerminalModes::from_config(&config),
            decoder: InputDecoder::with_escape_timeout(config.escape_timeout()),
            renderer: Renderer::new().synchronized(config.synchronized_output),
            frame: Buffer::new(width, height),
            scratch: Buffer::new(width, height),
            tree: Tree::new(),
            compositor: Compositor::new(),
            ctx: EventCtx::new(),
            state: LoopState::Idle,
            force_layout: true,
            needs_frame: true,
            last_tick: None,
            next_tick: Instant::now(),
            quit_handlers: Vec::new(),
            quit_done: false,
            stats: FrameStats::default(),
            backend,
            config,
        })
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut Tree {
        &mut self.tree
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Layer changes made through this borrow are picked up by the next
    /// trigger, which re-runs layout for them.
    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// The most recently painted frame.
    pub fn frame(&self) -> &Buffer {
        &self.frame
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Enter the configured terminal modes and paint the first frame.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            LoopState::Idle => {}
            LoopState::Running => return Err(EngineError::InvalidState("already running")),
            LoopState::Stopped => return Err(EngineError::InvalidState("stopped")),
        }
        if let Err(e) = self.backend.enter(&self.modes) {
            return Err(self.fail(e.into()));
        }
        self.state = LoopState::Running;

        let now = Instant::now();
        self.last_tick = Some(now);
        self.next_tick = now + self.config.frame_interval();
        let (width, height) = self.backend.size();
        if (width, height) != (self.frame.width(), self.frame.height()) {
            self.frame.resize(width, height);
            self.scratch.resize(width, height);
        }
        self.renderer.invalidate();
        self.force_layout = true;
        self.needs_frame = true;
        debug!(width, height, modes = ?self.modes, "render loop started");
        self.render_frame()
    }

    /// Register a closure to run once when the loop stops. Handlers run in
    /// registration order.
    pub fn on_quit<F>(&mut self, handler: F)
    where
        F: FnOnce() + 'static,
    {
        self.quit_handlers.push(Box::new(handler));
    }

    /// Restore the terminal and run quit handlers. Safe to call any number of
    /// times; only the first call has an effect.
    pub fn quit(&mut self) {
        if self.quit_done {
            return;
        }
        self.quit_done = true;
        // `enter` may have failed halfway through, so restore regardless of
        // state; backends treat `leave` without `enter` as a no-op.
        if let Err(e) = self.backend.leave() {
            warn!(%e, "failed to restore terminal");
        }
        self.state = LoopState::Stopped;
        for handler in std::mem::take(&mut self.quit_handlers) {
            handler();
        }
        debug!(frames = self.stats.frames, "render loop stopped");
    }

    /// Fatal errors shut the loop down before being handed back.
    fn fail(&mut self, e: EngineError) -> EngineError {
        if e.is_fatal() {
            warn!(%e, "fatal terminal error, shutting down");
            self.quit();
        }
        e
    }

    // ------------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------------

    /// Decode `bytes`, dispatch the events in arrival order and paint at most
    /// one frame for the whole burst.
    pub fn on_input(&mut self, bytes: &[u8], now: Instant) -> Result<()> {
        if self.state != LoopState::Running {
            return Ok(());
        }
        let events = self.decoder.feed(bytes, now);
        self.dispatch(events);
        self.finish_turn()
    }

    /// Timer trigger: resolve a held ESC whose window has passed, advance
    /// widget animations, and paint if anything became dirty.
    pub fn on_tick(&mut self, now: Instant) -> Result<()> {
        if self.state != LoopState::Running {
            return Ok(());
        }
        let events = self.decoder.flush_timeout(now);
        self.dispatch(events);

        let elapsed = self
            .last_tick
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();
        self.last_tick = Some(now);
        self.tick_widgets(elapsed);
        self.finish_turn()
    }

    /// Paint a frame now, whether or not anything is dirty.
    pub fn refresh(&mut self) -> Result<()> {
        self.needs_frame = true;
        self.render_frame()
    }

    /// Mark a node for re-layout; it is picked up by the next trigger.
    pub fn mark_dirty(&mut self, id: NodeId) {
        self.tree.mark_dirty(id);
    }

    /// Queue a tree mutation for after the current dispatch or paint pass.
    pub fn defer<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Tree) + 'static,
    {
        self.ctx.defer(f);
    }

    /// Resize the frame and repaint everything immediately, outside the
    /// timer cadence.
    pub fn on_resize(&mut self, width: u16, height: u16) -> Result<()> {
        debug!(width, height, "resize");
        self.frame.resize(width, height);
        self.scratch.resize(width, height);
        self.renderer.invalidate();
        self.force_layout = true;
        self.needs_frame = true;
        self.render_frame()
    }

    /// One iteration of the blocking loop: pick up a pending resize, wait
    /// for input until the next tick (or escape deadline, or `max_wait`),
    /// then run whichever triggers are due. Returns whether the loop is
    /// still running.
    pub fn run_once(&mut self, max_wait: Duration) -> Result<bool> {
        if self.state != LoopState::Running {
            return Ok(false);
        }
        if let Some((width, height)) = self.backend.take_resize() {
            self.on_resize(width, height)?;
        }

        let now = Instant::now();
        let mut wake = self.next_tick.min(now + max_wait);
        if let Some(deadline) = self.decoder.deadline() {
            wake = wake.min(deadline);
        }
        let bytes = match self.backend.read_input(wake.saturating_duration_since(now)) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e.into())),
        };

        let now = Instant::now();
        if !bytes.is_empty() {
            self.on_input(&bytes, now)?;
        }
        let escape_due = self.decoder.deadline().is_some_and(|d| now >= d);
        if now >= self.next_tick {
            let interval = self.config.frame_interval();
            self.next_tick += interval;
            // Never try to catch up on missed ticks.
            if self.next_tick <= now {
                self.next_tick = now + interval;
            }
            self.on_tick(now)?;
        } else if escape_due {
            self.on_tick(now)?;
        }
        Ok(self.state == LoopState::Running)
    }

    /// Start if needed and drive the loop until it stops.
    pub fn run(&mut self) -> Result<()> {
        if self.state == LoopState::Idle {
            self.start()?;
        }
        let interval = self.config.frame_interval();
        while self.run_once(interval)? {}
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn dispatch(&mut self, events: Vec<InputEvent>) {
        for ev in events {
            let handled = match &ev {
                InputEvent::Key(key) => {
                    dispatch_key(&mut self.tree, &self.compositor, key, &mut self.ctx)
                }
                InputEvent::Mouse(mouse) => {
                    dispatch_mouse(&mut self.tree, &self.compositor, mouse, &mut self.ctx)
                }
                InputEvent::Paste(text) => {
                    dispatch_paste(&mut self.tree, &self.compositor, text, &mut self.ctx)
                }
                InputEvent::FocusGained | InputEvent::FocusLost => false,
            };
            trace!(?ev, handled, "dispatched");
            if handled {
                self.needs_frame = true;
            }
            self.apply_deferred();
            if self.ctx.quit_requested() {
                break;
            }
        }
    }

    fn apply_deferred(&mut self) {
        if self.ctx.apply_deferred(&mut self.tree) > 0 {
            self.compositor.retain_live(&self.tree);
            self.needs_frame = true;
        }
    }

    fn tick_widgets(&mut self, elapsed: Duration) {
        if elapsed.is_zero() {
            return;
        }
        let ids: Vec<NodeId> = self.tree.ids().collect();
        for id in ids {
            let advanced = self
                .tree
                .get_mut(id)
                .is_some_and(|node| node.widget.tick(elapsed));
            if advanced {
                self.tree.mark_render_dirty(id);
            }
        }
    }

    /// Layers pushed or removed since the last frame need a fresh layout.
    fn sync_layers(&mut self) {
        if self.compositor.take_changed() {
            self.force_layout = true;
            self.needs_frame = true;
        }
    }

    /// End of a trigger: honour a quit request, else paint if needed.
    fn finish_turn(&mut self) -> Result<()> {
        if self.ctx.quit_requested() {
            self.quit();
            return Ok(());
        }
        self.sync_layers();
        if self.needs_frame || self.ctx.has_deferred() || self.tree.needs_paint() {
            self.render_frame()?;
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        if self.state != LoopState::Running {
            return Ok(());
        }
        self.paint_and_flush().map_err(|e| self.fail(e))
    }

    fn paint_and_flush(&mut self) -> Result<()> {
        let start = Instant::now();
        self.apply_deferred();
        self.sync_layers();

        let (width, height) = (self.frame.width(), self.frame.height());
        if self.force_layout || self.tree.needs_layout() {
            layout::compute_layers(&mut self.tree, &self.compositor, width, height);
            self.force_layout = false;
        }
        let laid_out = Instant::now();

        let painted = paint_frame(&self.tree, &self.compositor, &mut self.frame, &mut self.scratch);
        let painted_at = Instant::now();

        let (ansi, changed) = self.renderer.render_to_string(&self.frame);
        if !ansi.is_empty() {
            self.backend.write(ansi.as_bytes())?;
            self.backend.flush()?;
        }

        // Mutations queued by paint-time code wait for the next frame.
        self.tree.clear_dirty_flags();
        self.needs_frame = self.ctx.has_deferred();

        self.stats = FrameStats {
            frames: self.stats.frames + 1,
            changed_cells: changed,
            widgets_painted: painted,
            layout_us: (laid_out - start).as_micros() as u64,
            paint_us: (painted_at - laid_out).as_micros() as u64,
            total_us: start.elapsed().as_micros() as u64,
        };
        debug!(
            frame = self.stats.frames,
            changed,
            painted,
            layout_us = self.stats.layout_us,
            paint_us = self.stats.paint_us,
            total_us = self.stats.total_us,
            "frame"
        );
        Ok(())
    }
}

impl<B: TerminalBackend> Drop for RenderLoop<B> {
    fn drop(&mut self) {
        if self.state == LoopState::Running {
            self.quit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::match_key;
    use crate::terminal::{HeadlessBackend, MockBackend, MockState};
    use crate::types::BorderStyle;
    use crate::widget::{BoxWidget, Spinner, Text};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn hi_loop() -> (RenderLoop<MockBackend>, Rc<RefCell<MockState>>, NodeId, NodeId) {
        let backend = MockBackend::new(10, 3);
        let state = backend.state.clone();
        let mut rl = RenderLoop::new(backend, EngineConfig::default()).unwrap();
        let tree = rl.tree_mut();
        let root = tree.create(BoxWidget::new());
        let text = tree.create(Text::new("Hi"));
        tree.append_child(root, text).unwrap();
        tree.set_root(root).unwrap();
        (rl, state, root, text)
    }

    fn symbol(rl: &RenderLoop<MockBackend>, x: u16, y: u16) -> String {
        rl.frame().get(x, y).unwrap().symbol.to_string()
    }

    fn counter() -> (Rc<RefCell<u32>>, impl FnOnce() + 'static) {
        let count = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&count);
        (count, move || *seen.borrow_mut() += 1)
    }

    #[test]
    fn test_end_to_end_hi() {
        let (mut rl, state, _root, _text) = hi_loop();
        rl.start().unwrap();
        assert_eq!(rl.state(), LoopState::Running);
        assert_eq!(symbol(&rl, 0, 0), "H");
        assert_eq!(symbol(&rl, 1, 0), "i");
        assert_eq!(symbol(&rl, 2, 0), " ");

        let s = state.borrow();
        assert_eq!(s.enters, 1);
        assert_eq!(s.frames.len(), 1);
        assert!(s.frames[0].contains("Hi"));
    }

    #[test]
    fn test_quit_twice_restores_once() {
        let (mut rl, state, _root, _text) = hi_loop();
        let (count, handler) = counter();
        rl.on_quit(handler);
        rl.start().unwrap();
        rl.quit();
        rl.quit();
        assert_eq!(rl.state(), LoopState::Stopped);
        assert_eq!(state.borrow().leaves, 1);
        assert_eq!(*count.borrow(), 1);
        drop(rl);
        assert_eq!(state.borrow().leaves, 1);
    }

    #[test]
    fn test_quit_handlers_run_in_order() {
        let (mut rl, _state, _root, _text) = hi_loop();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = Rc::clone(&order);
            rl.on_quit(move || order.borrow_mut().push(i));
        }
        rl.quit();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_quit_before_start_skips_restore() {
        let (mut rl, state, _root, _text) = hi_loop();
        let (count, handler) = counter();
        rl.on_quit(handler);
        rl.quit();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(state.borrow().leaves, 0);
        assert!(matches!(rl.start(), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_start_twice_rejected() {
        let (mut rl, _state, _root, _text) = hi_loop();
        rl.start().unwrap();
        assert!(matches!(
            rl.start(),
            Err(EngineError::InvalidState("already running"))
        ));
    }

    #[test]
    fn test_failed_write_quits_once() {
        let (mut rl, state, _root, _text) = hi_loop();
        let (count, handler) = counter();
        rl.on_quit(handler);
        state.borrow_mut().fail_writes = true;

        let err = rl.start().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(rl.state(), LoopState::Stopped);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(state.borrow().leaves, 1);

        rl.quit();
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_failed_enter_still_restores_terminal() {
        let (mut rl, state, _root, _text) = hi_loop();
        let (count, handler) = counter();
        rl.on_quit(handler);
        state.borrow_mut().fail_enter = true;

        let err = rl.start().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(rl.state(), LoopState::Stopped);
        let s = state.borrow();
        assert!(!s.entered);
        assert_eq!(s.leaves, 1);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_drop_while_running_restores_once() {
        let (mut rl, state, _root, _text) = hi_loop();
        let (count, handler) = counter();
        rl.on_quit(handler);
        rl.start().unwrap();
        drop(rl);
        let s = state.borrow();
        assert!(!s.entered);
        assert_eq!(s.leaves, 1);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_input_handler_requests_quit() {
        let (mut rl, state, root, _text) = hi_loop();
        rl.tree_mut().node_mut(root).unwrap().on_key(|key, ctx| {
            if match_key(key, "ctrl+c") {
                ctx.request_quit();
                return true;
            }
            false
        });
        rl.start().unwrap();
        rl.on_input(b"x", Instant::now()).unwrap();
        assert_eq!(rl.state(), LoopState::Running);
        rl.on_input(b"\x03", Instant::now()).unwrap();
        assert_eq!(rl.state(), LoopState::Stopped);
        assert_eq!(state.borrow().leaves, 1);
    }

    #[test]
    fn test_burst_paints_one_frame() {
        let (mut rl, state, root, text) = hi_loop();
        rl.tree_mut().node_mut(root).unwrap().on_key(move |key, ctx| {
            let name = key.name.clone();
            ctx.defer(move |tree| {
                if let Some(t) = tree.widget_mut::<Text>(text) {
                    let content = format!("{}{}", t.content(), name);
                    t.set_content(content);
                }
            });
            true
        });
        rl.start().unwrap();
        rl.on_input(b"abc", Instant::now()).unwrap();
        assert_eq!(state.borrow().frames.len(), 2);
        assert_eq!(symbol(&rl, 4, 0), "c");
    }

    #[test]
    fn test_lone_escape_resolves_after_window() {
        let (mut rl, _state, root, _text) = hi_loop();
        let keys = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&keys);
        rl.tree_mut().node_mut(root).unwrap().on_key(move |key, _| {
            sink.borrow_mut().push(key.name.clone());
            true
        });
        rl.start().unwrap();

        let t0 = Instant::now();
        rl.on_input(b"\x1b", t0).unwrap();
        rl.on_tick(t0 + Duration::from_millis(10)).unwrap();
        assert!(keys.borrow().is_empty());
        rl.on_tick(t0 + Duration::from_millis(60)).unwrap();
        assert_eq!(*keys.borrow(), vec!["escape".to_string()]);
    }

    #[test]
    fn test_tick_animates_spinner_until_disposed() {
        let (mut rl, state, root, _text) = hi_loop();
        let spin = rl.tree_mut().create(Spinner::new());
        rl.tree_mut().append_child(root, spin).unwrap();
        rl.start().unwrap();
        assert_eq!(symbol(&rl, 0, 1), "⠋");

        let later = Instant::now() + Duration::from_millis(100);
        rl.on_tick(later).unwrap();
        assert_eq!(rl.tree().widget::<Spinner>(spin).unwrap().frame_index(), 1);
        assert_eq!(symbol(&rl, 0, 1), "⠙");
        let frames = state.borrow().frames.len();

        rl.defer(move |tree| {
            let _ = tree.dispose(spin);
        });
        rl.on_tick(later + Duration::from_millis(100)).unwrap();
        assert!(!rl.tree().contains(spin));
        assert_eq!(symbol(&rl, 0, 1), " ");
        assert_eq!(state.borrow().frames.len(), frames + 1);

        // Nothing left to animate: later ticks paint nothing.
        rl.on_tick(later + Duration::from_millis(300)).unwrap();
        assert_eq!(state.borrow().frames.len(), frames + 1);
    }

    #[test]
    fn test_resize_repaints_immediately() {
        let (mut rl, state, _root, _text) = hi_loop();
        rl.start().unwrap();
        rl.on_resize(20, 5).unwrap();
        assert_eq!(rl.frame().width(), 20);
        assert_eq!(rl.frame().height(), 5);
        assert_eq!(rl.stats().changed_cells, 100);
        let s = state.borrow();
        assert_eq!(s.frames.len(), 2);
        assert!(s.frames[1].contains("\x1b[2J"));
    }

    #[test]
    fn test_refresh_without_changes_writes_nothing() {
        let (mut rl, state, _root, _text) = hi_loop();
        rl.start().unwrap();
        rl.refresh().unwrap();
        assert_eq!(rl.stats().changed_cells, 0);
        assert_eq!(state.borrow().frames.len(), 1);
    }

    #[test]
    fn test_mark_dirty_relayouts_on_next_tick() {
        let (mut rl, _state, _root, text) = hi_loop();
        rl.start().unwrap();
        rl.tree_mut().node_mut(text).unwrap().margin([0u16, 0, 0, 2]);
        rl.mark_dirty(text);
        rl.on_tick(Instant::now()).unwrap();
        assert_eq!(symbol(&rl, 2, 0), "H");
    }

    #[test]
    fn test_modal_overlay_painted_and_captures_input() {
        let (mut rl, _state, root, _text) = hi_loop();
        let hits = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&hits);
        rl.tree_mut().node_mut(root).unwrap().on_key(move |_, _| {
            *seen.borrow_mut() += 1;
            true
        });
        let dialog = rl
            .tree_mut()
            .create(BoxWidget::new().border(BorderStyle::Rounded));
        rl.tree_mut()
            .node_mut(dialog)
            .unwrap()
            .width(4u16)
            .height(3u16);
        rl.start().unwrap();
        rl.compositor_mut().push(dialog, true);
        rl.refresh().unwrap();
        assert_eq!(symbol(&rl, 0, 0), "╭");

        rl.on_input(b"x", Instant::now()).unwrap();
        assert_eq!(*hits.borrow(), 0);
    }

    #[test]
    fn test_layer_changes_paint_on_next_tick() {
        let (mut rl, _state, _root, _text) = hi_loop();
        let dialog = rl.tree_mut().create(BoxWidget::new().border(BorderStyle::Single));
        rl.tree_mut()
            .node_mut(dialog)
            .unwrap()
            .width(3u16)
            .height(3u16);
        rl.start().unwrap();
        assert_eq!(rl.stats().frames, 1);

        // A borrow that changes nothing costs no frame.
        assert!(rl.compositor_mut().top_modal().is_none());
        rl.on_tick(Instant::now()).unwrap();
        assert_eq!(rl.stats().frames, 1);

        rl.compositor_mut().push(dialog, false);
        rl.on_tick(Instant::now()).unwrap();
        assert_eq!(rl.stats().frames, 2);
        assert_eq!(symbol(&rl, 0, 0), "┌");
    }

    #[test]
    fn test_run_once_on_headless_backend() {
        let backend = HeadlessBackend::new(8, 2);
        let mut rl = RenderLoop::new(backend, EngineConfig::default()).unwrap();
        let root = rl.tree_mut().create(BoxWidget::new());
        rl.tree_mut().set_root(root).unwrap();
        rl.tree_mut().node_mut(root).unwrap().on_key(|key, ctx| {
            if key.name == "q" {
                ctx.request_quit();
            }
            true
        });
        rl.start().unwrap();
        assert!(rl.backend().is_entered());

        assert!(rl.run_once(Duration::ZERO).unwrap());
        rl.backend_mut().resize(12, 4);
        rl.backend_mut().push_input(b"q");
        assert!(!rl.run_once(Duration::ZERO).unwrap());
        assert_eq!(rl.frame().width(), 12);
        assert!(!rl.backend().is_entered());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            fps: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            RenderLoop::new(HeadlessBackend::new(1, 1), config),
            Err(EngineError::Config(_))
        ));
    }
}
