//! Shared types, enums, and constants.
//!
//! Everything that crosses module boundaries (cells, colors, attributes,
//! rectangles, resolved styles) lives here.

use bitflags::bitflags;
use compact_str::CompactString;

// ============================================================================
// Color Encoding (u32, 0xRRGGBBAA)
// ============================================================================
//
// Bits 31-24: red, 23-16: green, 15-8: blue, 7-0: alpha.
// Alpha 0x00 means "terminal default" and is emitted as SGR 39/49.
// Any other alpha is treated as an opaque truecolor value.

pub type Rgba = u32;

pub mod color {
    use super::Rgba;

    /// Terminal default color (alpha 0).
    pub const DEFAULT: Rgba = 0x0000_0000;
    pub const BLACK: Rgba = 0x0000_00FF;
    pub const WHITE: Rgba = 0xFFFF_FFFF;

    pub const fn rgb(r: u8, g: u8, b: u8) -> Rgba {
        ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | 0xFF
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Rgba {
        ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32
    }

    /// Split into `(r, g, b, a)`.
    pub const fn channels(c: Rgba) -> (u8, u8, u8, u8) {
        (
            ((c >> 24) & 0xFF) as u8,
            ((c >> 16) & 0xFF) as u8,
            ((c >> 8) & 0xFF) as u8,
            (c & 0xFF) as u8,
        )
    }

    pub const fn is_default(c: Rgba) -> bool {
        c & 0xFF == 0
    }

    pub fn to_crossterm(c: Rgba) -> crossterm::style::Color {
        if is_default(c) {
            return crossterm::style::Color::Reset;
        }
        let (r, g, b, _) = channels(c);
        crossterm::style::Color::Rgb { r, g, b }
    }
}

// ============================================================================
// Cell Attributes (bitflags)
// ============================================================================

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellAttrs: u8 {
        const BOLD          = 0b0000_0001;
        const ITALIC        = 0b0000_0010;
        const UNDERLINE     = 0b0000_0100;
        const DIM           = 0b0000_1000;
        const INVERSE       = 0b0001_0000;
        const STRIKETHROUGH = 0b0010_0000;
    }
}

// ============================================================================
// Border Style
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderStyle {
    #[default]
    None,
    Single,
    Double,
    Rounded,
    Bold,
}

impl BorderStyle {
    /// Returns the border characters: (top-left, top-right, bottom-left, bottom-right, horizontal, vertical)
    pub fn chars(self) -> Option<(char, char, char, char, char, char)> {
        match self {
            Self::None => None,
            Self::Single => Some(('┌', '┐', '└', '┘', '─', '│')),
            Self::Double => Some(('╔', '╗', '╚', '╝', '═', '║')),
            Self::Rounded => Some(('╭', '╮', '╰', '╯', '─', '│')),
            Self::Bold => Some(('┏', '┓', '┗', '┛', '━', '┃')),
        }
    }
}

// ============================================================================
// Resolved Style
// ============================================================================

/// Concrete style handed down the tree during painting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Rgba,
    pub bg: Rgba,
    pub attrs: CellAttrs,
}

impl Style {
    pub const fn new(fg: Rgba, bg: Rgba) -> Self {
        Self {
            fg,
            bg,
            attrs: CellAttrs::empty(),
        }
    }

    pub fn attrs(mut self, attrs: CellAttrs) -> Self {
        self.attrs = attrs;
        self
    }
}

// ============================================================================
// Cell
// ============================================================================

/// One grid position. An empty `symbol` marks the right half of a wide cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub symbol: CompactString,
    pub fg: Rgba,
    pub bg: Rgba,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            symbol: CompactString::const_new(" "),
            fg: color::DEFAULT,
            bg: color::DEFAULT,
            attrs: CellAttrs::empty(),
        }
    }
}

impl Cell {
    pub fn new(symbol: &str, style: Style) -> Self {
        Self {
            symbol: CompactString::new(symbol),
            fg: style.fg,
            bg: style.bg,
            attrs: style.attrs,
        }
    }

    pub fn blank(style: Style) -> Self {
        Self::new(" ", style)
    }

    /// Right half of a double-width cluster.
    pub fn continuation(style: Style) -> Self {
        Self {
            symbol: CompactString::const_new(""),
            fg: style.fg,
            bg: style.bg,
            attrs: style.attrs,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.symbol.is_empty()
    }

    pub fn style(&self) -> Style {
        Style {
            fg: self.fg,
            bg: self.bg,
            attrs: self.attrs,
        }
    }
}

// ============================================================================
// Bounds
// ============================================================================

/// Absolute rectangle in buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Bounds {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Bounds {
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge, saturating.
    pub fn right(&self) -> u16 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge, saturating.
    pub fn bottom(&self) -> u16 {
        self.y.saturating_add(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}
