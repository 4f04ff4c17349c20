//! Widget Module: the capability set every node's payload implements,
//! plus the handful of built-in widgets the engine needs on its own.
//!
//! Responsibilities:
//! - `Widget` trait (measure, paint, key/mouse handling, polled tick, disposal)
//! - `BoxWidget`: container with optional border and background fill
//! - `Text`: multi-line text leaf
//! - `Spinner`: animated leaf driven by the scheduler's tick

use std::any::Any;
use std::time::Duration;

use crate::input::{KeyEvent, MouseEvent};
use crate::layout::Edges;
use crate::paint::Surface;
use crate::text_utils::{display_width, measure_lines};
use crate::types::{BorderStyle, Bounds, Cell, Rgba, Style};

/// Behaviour attached to a node. The tree owns widgets as `Box<dyn Widget>`.
///
/// `render` takes `&self`: painting never mutates the tree. State changes
/// happen in `handle_key` / `handle_mouse` / `tick`, which run outside the
/// paint pass.
pub trait Widget: Any {
    /// Type tag used in logs and by `Node::kind`.
    fn kind(&self) -> &'static str;

    /// Whether the node accepts children.
    fn is_container(&self) -> bool {
        false
    }

    /// Intrinsic content size `(width, height)` used for `Auto` dimensions
    /// of leaf nodes. Containers are measured from their children.
    fn measure(&self) -> (u16, u16) {
        (0, 0)
    }

    /// Space the widget reserves inside its bounds before children are laid
    /// out (a border, typically).
    fn insets(&self) -> Edges {
        Edges::ZERO
    }

    /// Paint into `surface` within `area` (the node's bounds). Writes outside
    /// the surface's clip are dropped.
    fn render(&self, surface: &mut Surface<'_>, area: Bounds, style: Style);

    fn handle_key(&mut self, _key: &KeyEvent) -> bool {
        false
    }

    fn handle_mouse(&mut self, _mouse: &MouseEvent) -> bool {
        false
    }

    /// Advance time-driven state. Returns true when a repaint is needed.
    fn tick(&mut self, _elapsed: Duration) -> bool {
        false
    }

    /// Release resources before the node leaves the tree.
    fn dispose(&mut self) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

// ============================================================================
// BoxWidget
// ============================================================================

/// Generic container: fills its bounds with the resolved background and
/// optionally draws a border with a title.
#[derive(Debug, Clone, Default)]
pub struct BoxWidget {
    border: BorderStyle,
    border_color: Option<Rgba>,
    title: Option<String>,
}

impl BoxWidget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn border(mut self, border: BorderStyle) -> Self {
        self.border = border;
        self
    }

    pub fn border_color(mut self, color: Rgba) -> Self {
        self.border_color = Some(color);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn set_border(&mut self, border: BorderStyle) {
        self.border = border;
    }

    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title;
    }

    pub fn border_style(&self) -> BorderStyle {
        self.border
    }

    fn render_border(&self, surface: &mut Surface<'_>, area: Bounds, style: Style) {
        let Some((tl, tr, bl, br, h, v)) = self.border.chars() else {
            return;
        };
        if area.width < 2 || area.height < 2 {
            return;
        }
        let border_style = Style {
            fg: self.border_color.unwrap_or(style.fg),
            ..style
        };
        let (x0, y0) = (area.x, area.y);
        let (x1, y1) = (area.right() - 1, area.bottom() - 1);

        surface.put_char(x0, y0, tl, border_style);
        surface.put_char(x1, y0, tr, border_style);
        surface.put_char(x0, y1, bl, border_style);
        surface.put_char(x1, y1, br, border_style);
        for x in x0 + 1..x1 {
            surface.put_char(x, y0, h, border_style);
            surface.put_char(x, y1, h, border_style);
        }
        for y in y0 + 1..y1 {
            surface.put_char(x0, y, v, border_style);
            surface.put_char(x1, y, v, border_style);
        }

        if let Some(title) = &self.title {
            // Title sits on the top edge between the corners: "┌ title ──┐"
            if area.width > 4 {
                let limit = Bounds::new(x0 + 1, y0, area.width - 2, 1);
                let padded = format!(" {title} ");
                surface.print_within(x0 + 1, y0, &padded, border_style, limit);
            }
        }
    }
}

impl Widget for BoxWidget {
    fn kind(&self) -> &'static str {
        "box"
    }

    fn is_container(&self) -> bool {
        true
    }

    fn insets(&self) -> Edges {
        if self.border == BorderStyle::None {
            Edges::ZERO
        } else {
            Edges::all(1)
        }
    }

    fn render(&self, surface: &mut Surface<'_>, area: Bounds, style: Style) {
        surface.fill(area, &Cell::blank(style));
        self.render_border(surface, area, style);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Text
// ============================================================================

/// Plain text leaf. Lines are split on `\n`; each line is clipped to the
/// node's width, lines beyond its height are dropped.
#[derive(Debug, Clone, Default)]
pub struct Text {
    content: String,
}

impl Text {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = content.into();
    }
}

impl Widget for Text {
    fn kind(&self) -> &'static str {
        "text"
    }

    fn measure(&self) -> (u16, u16) {
        measure_lines(&self.content)
    }

    fn render(&self, surface: &mut Surface<'_>, area: Bounds, style: Style) {
        for (row, line) in self.content.split('\n').enumerate() {
            if row >= area.height as usize {
                break;
            }
            surface.print_within(area.x, area.y + row as u16, line, style, area);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ============================================================================
// Spinner
// ============================================================================

pub const SPINNER_DOTS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub const SPINNER_LINE: &[&str] = &["-", "\\", "|", "/"];

const DEFAULT_SPINNER_INTERVAL: Duration = Duration::from_millis(80);

/// Frame-cycling indicator. Frames advance from `tick`; after `dispose` or
/// `stop` the spinner ignores ticks.
#[derive(Debug, Clone)]
pub struct Spinner {
    frames: &'static [&'static str],
    frame_idx: usize,
    interval: Duration,
    frame_elapsed: Duration,
    running: bool,
    label: Option<String>,
}

impl Default for Spinner {
    fn default() -> Self {
        Self::new()
    }
}

impl Spinner {
    pub fn new() -> Self {
        Self {
            frames: SPINNER_DOTS,
            frame_idx: 0,
            interval: DEFAULT_SPINNER_INTERVAL,
            frame_elapsed: Duration::ZERO,
            running: true,
            label: None,
        }
    }

    /// Replace the frame set. An empty slice keeps the current frames.
    pub fn frames(mut self, frames: &'static [&'static str]) -> Self {
        if !frames.is_empty() {
            self.frames = frames;
            self.frame_idx = 0;
        }
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.frame_elapsed = Duration::ZERO;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn frame_index(&self) -> usize {
        self.frame_idx
    }

    pub fn current_frame(&self) -> &'static str {
        self.frames[self.frame_idx % self.frames.len()]
    }
}

impl Widget for Spinner {
    fn kind(&self) -> &'static str {
        "spinner"
    }

    fn measure(&self) -> (u16, u16) {
        let glyph = self
            .frames
            .iter()
            .map(|f| display_width(f))
            .max()
            .unwrap_or(1);
        match &self.label {
            Some(label) => (glyph + 1 + display_width(label), 1),
            None => (glyph, 1),
        }
    }

    fn render(&self, surface: &mut Surface<'_>, area: Bounds, style: Style) {
        if area.is_empty() {
            return;
        }
        let advanced = surface.print_within(area.x, area.y, self.current_frame(), style, area);
        if let Some(label) = &self.label {
            let x = area.x.saturating_add(advanced).saturating_add(1);
            surface.print_within(x, area.y, label, style, area);
        }
    }

    fn tick(&mut self, elapsed: Duration) -> bool {
        if !self.running || self.interval.is_zero() {
            return false;
        }
        self.frame_elapsed += elapsed;
        let mut advanced = false;
        while self.frame_elapsed >= self.interval {
            self.frame_elapsed -= self.interval;
            self.frame_idx = (self.frame_idx + 1) % self.frames.len();
            advanced = true;
        }
        advanced
    }

    fn dispose(&mut self) {
        self.stop();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::types::color;

    fn paint(widget: &dyn Widget, w: u16, h: u16, style: Style) -> Buffer {
        let mut buf = Buffer::new(w, h);
        let area = buf.area();
        let mut surface = Surface::new(&mut buf, area);
        widget.render(&mut surface, area, style);
        buf
    }

    fn row(buf: &Buffer, y: u16) -> String {
        (0..buf.width())
            .map(|x| buf.get(x, y).map(|c| c.symbol.to_string()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_box_border_and_insets() {
        let b = BoxWidget::new().border(BorderStyle::Single);
        assert_eq!(b.insets(), Edges::all(1));
        assert!(b.is_container());
        let buf = paint(&b, 4, 3, Style::default());
        assert_eq!(row(&buf, 0), "┌──┐");
        assert_eq!(row(&buf, 1), "│  │");
        assert_eq!(row(&buf, 2), "└──┘");

        assert_eq!(BoxWidget::new().insets(), Edges::ZERO);
    }

    #[test]
    fn test_box_title_and_border_color() {
        let b = BoxWidget::new()
            .border(BorderStyle::Rounded)
            .border_color(color::rgb(0, 255, 0))
            .title("Log");
        let buf = paint(&b, 10, 3, Style::default());
        assert_eq!(row(&buf, 0), "╭ Log ───╮");
        assert_eq!(buf.get(0, 0).unwrap().fg, color::rgb(0, 255, 0));
    }

    #[test]
    fn test_box_fills_background() {
        let style = Style::new(color::WHITE, color::rgb(0, 0, 128));
        let buf = paint(&BoxWidget::new(), 3, 2, style);
        assert_eq!(buf.get(2, 1).unwrap().bg, color::rgb(0, 0, 128));
    }

    #[test]
    fn test_text_measure_and_render() {
        let t = Text::new("Hi\nthere");
        assert_eq!(t.measure(), (5, 2));
        let buf = paint(&t, 4, 1, Style::default());
        assert_eq!(row(&buf, 0), "Hi  ");
    }

    #[test]
    fn test_text_clips_long_lines() {
        let buf = paint(&Text::new("abcdef"), 3, 1, Style::default());
        assert_eq!(row(&buf, 0), "abc");
    }

    #[test]
    fn test_spinner_ticks_advance_frames() {
        let mut s = Spinner::new()
            .frames(SPINNER_LINE)
            .interval(Duration::from_millis(100));
        assert!(!s.tick(Duration::from_millis(50)));
        assert!(s.tick(Duration::from_millis(60)));
        assert_eq!(s.frame_index(), 1);
        assert!(s.tick(Duration::from_millis(200)));
        assert_eq!(s.frame_index(), 3);
        assert_eq!(s.current_frame(), "/");
    }

    #[test]
    fn test_disposed_spinner_stops_ticking() {
        let mut s = Spinner::new().interval(Duration::from_millis(10));
        s.dispose();
        assert!(!s.is_running());
        assert!(!s.tick(Duration::from_secs(1)));
        assert_eq!(s.frame_index(), 0);
    }

    #[test]
    fn test_spinner_with_label() {
        let s = Spinner::new().frames(SPINNER_LINE).label("loading");
        assert_eq!(s.measure(), (9, 1));
        let buf = paint(&s, 9, 1, Style::default());
        assert_eq!(row(&buf, 0), "- loading");
    }
}
