//! Cell Buffer: 2D grid of styled grapheme cells.
//!
//! Responsibilities:
//! - Point and region reads/writes, silently clipped to the grid
//! - Grapheme-aware text writes (double-width clusters span two cells)
//! - Resize preserving overlapping content, deep clone for double-buffering
//! - Rectangle blits used to composite overlays onto a base frame

use crate::text_utils::clusters;
use crate::types::{Bounds, Cell, Style};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    width: u16,
    height: u16,
    cells: Vec<Cell>,
}

impl Buffer {
    pub fn new(width: u16, height: u16) -> Self {
        let size = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![Cell::default(); size],
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// The whole grid as a rectangle.
    pub fn area(&self) -> Bounds {
        Bounds::new(0, 0, self.width, self.height)
    }

    fn index(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.width && y < self.height {
            Some((y as usize) * (self.width as usize) + (x as usize))
        } else {
            None
        }
    }

    pub fn get(&self, x: u16, y: u16) -> Option<&Cell> {
        self.index(x, y).map(|i| &self.cells[i])
    }

    /// Row slice, used by the diff pass.
    pub(crate) fn row(&self, y: u16) -> &[Cell] {
        let w = self.width as usize;
        let start = (y as usize) * w;
        &self.cells[start..start + w]
    }

    /// Store a cell as-is. Out-of-bounds writes are dropped.
    pub fn set(&mut self, x: u16, y: u16, cell: Cell) {
        if let Some(i) = self.index(x, y) {
            self.repair_wide_neighbours(x, y, &cell);
            self.cells[i] = cell;
        }
    }

    /// Blank the other half of any wide cluster the incoming cell is about
    /// to split, so a wide lead is always followed by its continuation.
    fn repair_wide_neighbours(&mut self, x: u16, y: u16, incoming: &Cell) {
        let Some(i) = self.index(x, y) else {
            return;
        };
        if self.cells[i].is_continuation() && !incoming.is_continuation() && x > 0 {
            let lead = i - 1;
            if !self.cells[lead].is_continuation() {
                let style = self.cells[lead].style();
                self.cells[lead] = Cell::blank(style);
            }
        }
        if !self.cells[i].is_continuation() {
            if let Some(next) = self.index(x + 1, y) {
                if self.cells[next].is_continuation() {
                    let style = self.cells[next].style();
                    self.cells[next] = Cell::blank(style);
                }
            }
        }
    }

    /// Write `text` starting at (x, y) with `style`, clipped to the buffer.
    /// Returns the number of columns advanced.
    pub fn write(&mut self, x: u16, y: u16, text: &str, style: Style) -> u16 {
        let clip = self.area();
        self.write_clipped(x, y, text, style, clip)
    }

    /// Write `text` starting at (x, y), drawing only clusters that fall
    /// entirely inside `clip`. A double-width cluster that straddles the clip
    /// edge is not drawn. Returns the number of columns advanced.
    pub fn write_clipped(&mut self, x: u16, y: u16, text: &str, style: Style, clip: Bounds) -> u16 {
        let clip = clip_to(clip, self.area());
        let row_visible = y >= clip.y && y < clip.bottom();
        let mut col = x as u32;

        for (cluster, w) in clusters(text) {
            if w == 0 {
                continue;
            }
            let end = col + w as u32;
            if end > clip.right() as u32 {
                break;
            }
            if row_visible && col >= clip.x as u32 {
                let cx = col as u16;
                self.set(cx, y, Cell::new(cluster, style));
                if w == 2 {
                    self.set(cx + 1, y, Cell::continuation(style));
                }
            }
            col = end;
        }

        (col - x as u32).min(u16::MAX as u32) as u16
    }

    /// Fill a rectangle with copies of `cell`.
    pub fn fill(&mut self, x: u16, y: u16, w: u16, h: u16, cell: &Cell) {
        let rect = clip_to(Bounds::new(x, y, w, h), self.area());
        for row in rect.y..rect.bottom() {
            for col in rect.x..rect.right() {
                self.set(col, row, cell.clone());
            }
        }
    }

    /// Reset every cell to a space with default colors and no attributes.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = Cell::default();
        }
    }

    /// Reallocate to `width` x `height`, keeping the overlapping region.
    pub fn resize(&mut self, width: u16, height: u16) {
        if width == self.width && height == self.height {
            return;
        }
        let mut next = Buffer::new(width, height);
        let overlap_w = width.min(self.width);
        let overlap_h = height.min(self.height);
        for y in 0..overlap_h {
            for x in 0..overlap_w {
                if let (Some(src), Some(dst)) = (self.index(x, y), next.index(x, y)) {
                    next.cells[dst] = self.cells[src].clone();
                }
            }
            // A wide lead cut in half by the new right edge becomes a space.
            if overlap_w > 0 && overlap_w < self.width {
                if let Some(edge) = self.index(overlap_w, y) {
                    if self.cells[edge].is_continuation() {
                        if let Some(dst) = next.index(overlap_w - 1, y) {
                            let style = next.cells[dst].style();
                            next.cells[dst] = Cell::blank(style);
                        }
                    }
                }
            }
        }
        *self = next;
    }
}

/// Structural equality used by the diff pass.
pub fn cells_equal(a: &Cell, b: &Cell) -> bool {
    a.fg == b.fg && a.bg == b.bg && a.attrs == b.attrs && a.symbol == b.symbol
}

/// Blit `src_rect` of `src` onto `dst` with its top-left at (dst_x, dst_y).
/// The rectangle is clipped against both buffers.
pub fn copy_region(src: &Buffer, dst: &mut Buffer, src_rect: Bounds, dst_x: u16, dst_y: u16) {
    let src_rect = clip_to(src_rect, src.area());
    for dy in 0..src_rect.height {
        for dx in 0..src_rect.width {
            let (sx, sy) = (src_rect.x + dx, src_rect.y + dy);
            let (tx, ty) = (dst_x.saturating_add(dx), dst_y.saturating_add(dy));
            let Some(cell) = src.get(sx, sy) else {
                continue;
            };
            // Either half of a wide cluster cut off by the source rectangle
            // or the destination edge lands as a blank.
            let orphan_continuation = cell.is_continuation() && dx == 0;
            let wide_lead = src.get(sx + 1, sy).is_some_and(Cell::is_continuation);
            let lead_cut = wide_lead
                && (dx + 1 == src_rect.width
                    || tx.checked_add(1).map_or(true, |nx| nx >= dst.width()));
            if orphan_continuation || lead_cut {
                dst.set(tx, ty, Cell::blank(cell.style()));
            } else {
                dst.set(tx, ty, cell.clone());
            }
        }
    }
}

fn clip_to(rect: Bounds, area: Bounds) -> Bounds {
    let x1 = rect.x.max(area.x);
    let y1 = rect.y.max(area.y);
    let x2 = rect.right().min(area.right());
    let y2 = rect.bottom().min(area.bottom());
    Bounds::new(x1, y1, x2.saturating_sub(x1), y2.saturating_sub(y1))
}
