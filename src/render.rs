//! Render Module: frame diffing and escape-sequence emission.
//!
//! Responsibilities:
//! - Diff the new frame against the previously emitted one
//! - Group changed cells into per-row runs, one cursor move per run
//! - Track cursor and SGR pen state so nothing redundant is emitted
//! - Keep wide clusters intact (a changed continuation re-emits its lead)
//! - Own the previous frame; `invalidate` forces a full repaint

use std::io::{self, Write};
use std::time::Instant;

use tracing::debug;

use crate::ansi;
use crate::buffer::{cells_equal, Buffer};
use crate::types::{Cell, CellAttrs, Rgba};

// ============================================================================
// Pen / Cursor State
// ============================================================================

/// SGR state the terminal is known to be in. `None` means unknown.
#[derive(Debug, Default, Clone, Copy)]
struct Pen {
    fg: Option<Rgba>,
    bg: Option<Rgba>,
    attrs: Option<CellAttrs>,
}

impl Pen {
    fn apply(&mut self, out: &mut String, cell: &Cell) {
        if self.attrs != Some(cell.attrs) {
            ansi::set_attrs(out, cell.attrs);
            // The reset inside set_attrs also dropped both colors.
            *self = Pen {
                attrs: Some(cell.attrs),
                ..Pen::default()
            };
        }
        if self.fg != Some(cell.fg) {
            ansi::set_fg(out, cell.fg);
            self.fg = Some(cell.fg);
        }
        if self.bg != Some(cell.bg) {
            ansi::set_bg(out, cell.bg);
            self.bg = Some(cell.bg);
        }
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Escape stream turning `prev` into `next`, plus the number of cells that
/// differ. With no `prev`, or a size change, the screen is cleared and every
/// cell counts as changed. An unchanged frame produces an empty string.
pub fn diff(prev: Option<&Buffer>, next: &Buffer, synchronized: bool) -> (String, usize) {
    let prev = prev.filter(|p| p.width() == next.width() && p.height() == next.height());
    let width = next.width() as usize;
    let mut out = String::new();
    let mut changed_cells = 0;
    let mut pen = Pen::default();
    let mut cursor: Option<(u16, u16)> = None;
    let mut changed = vec![false; width];

    if prev.is_none() {
        ansi::clear_screen(&mut out);
    }

    for y in 0..next.height() {
        let row = next.row(y);
        changed.fill(false);
        let mut any = false;
        for x in 0..width {
            let differs = match prev {
                Some(p) => !cells_equal(&p.row(y)[x], &row[x]),
                None => true,
            };
            if differs {
                changed[x] = true;
                changed_cells += 1;
                any = true;
                // A continuation cannot be drawn on its own.
                if row[x].is_continuation() && x > 0 {
                    changed[x - 1] = true;
                }
            }
        }
        if !any {
            continue;
        }

        let mut x = 0;
        while x < width {
            if !changed[x] || row[x].is_continuation() {
                x += 1;
                continue;
            }
            let cell = &row[x];
            let pos = (x as u16, y);
            if cursor != Some(pos) {
                ansi::move_to(&mut out, pos.0, pos.1);
            }
            pen.apply(&mut out, cell);
            out.push_str(&cell.symbol);

            let advance = if x + 1 < width && row[x + 1].is_continuation() {
                2
            } else {
                1
            };
            x += advance;
            // Past the right edge the terminal's cursor position is
            // implementation defined.
            cursor = (x < width).then_some((x as u16, y));
        }
    }

    if out.is_empty() {
        return (out, 0);
    }
    ansi::reset(&mut out);
    if synchronized {
        let mut wrapped = String::with_capacity(out.len() + 16);
        ansi::begin_sync(&mut wrapped);
        wrapped.push_str(&out);
        ansi::end_sync(&mut wrapped);
        out = wrapped;
    }
    (out, changed_cells)
}

// ============================================================================
// Renderer
// ============================================================================

/// Stateful diffing renderer. Owns the last emitted frame.
#[derive(Debug, Default)]
pub struct Renderer {
    last: Option<Buffer>,
    synchronized: bool,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap each frame in synchronized-update markers.
    pub fn synchronized(mut self, on: bool) -> Self {
        self.synchronized = on;
        self
    }

    pub fn set_synchronized(&mut self, on: bool) {
        self.synchronized = on;
    }

    /// Forget the previous frame; the next render repaints everything.
    pub fn invalidate(&mut self) {
        self.last = None;
    }

    pub fn last_frame(&self) -> Option<&Buffer> {
        self.last.as_ref()
    }

    /// Diff, write the result to `out` and remember `buffer`. Returns the
    /// number of changed cells. Nothing is written for an unchanged frame.
    /// After a failed write the terminal contents are unknown, so the next
    /// render repaints everything.
    pub fn render(&mut self, buffer: &Buffer, out: &mut dyn Write) -> io::Result<usize> {
        let (ansi, changed) = self.render_to_string(buffer);
        if !ansi.is_empty() {
            if let Err(e) = out.write_all(ansi.as_bytes()) {
                self.invalidate();
                return Err(e);
            }
        }
        Ok(changed)
    }

    /// I/O-free variant of `render`.
    pub fn render_to_string(&mut self, buffer: &Buffer) -> (String, usize) {
        let start = Instant::now();
        let (ansi, changed) = diff(self.last.as_ref(), buffer, self.synchronized);
        match &mut self.last {
            Some(last) if last.width() == buffer.width() && last.height() == buffer.height() => {
                last.clone_from(buffer);
            }
            _ => self.last = Some(buffer.clone()),
        }
        debug!(
            changed,
            bytes = ansi.len(),
            us = start.elapsed().as_micros() as u64,
            "diff"
        );
        (ansi, changed)
    }
}

// ============================================================================
// Batching
// ============================================================================

/// Coalesces any number of frame requests into a single render. Only the
/// most recent frame requested before `flush` is emitted.
#[derive(Debug, Default)]
pub struct BatchRenderer {
    renderer: Renderer,
    pending: Option<Buffer>,
    requests: usize,
}

impl BatchRenderer {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            pending: None,
            requests: 0,
        }
    }

    pub fn request(&mut self, buffer: &Buffer) {
        match &mut self.pending {
            Some(p) => p.clone_from(buffer),
            None => self.pending = Some(buffer.clone()),
        }
        self.requests += 1;
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Render the pending frame, if any. Returns the changed-cell count.
    pub fn flush(&mut self, out: &mut dyn Write) -> io::Result<usize> {
        let Some(buffer) = self.pending.take() else {
            return Ok(0);
        };
        if self.requests > 1 {
            debug!(requests = self.requests, "coalesced frame requests");
        }
        self.requests = 0;
        self.renderer.render(&buffer, out)
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }
}
