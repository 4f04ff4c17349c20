//! Style Module: per-node visual style and inheritance.
//!
//! Responsibilities:
//! - VisualStyle storage per node (colors, text attributes)
//! - A mask recording which properties were set explicitly
//! - Resolution against the parent's resolved `Style` during painting

use crate::types::{CellAttrs, Rgba, Style};

/// Visual properties a node carries. Only properties whose mask bit is set
/// override the inherited style; everything else flows down from the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VisualStyle {
    pub fg: Rgba,
    pub bg: Rgba,
    pub attrs: CellAttrs,
    pub mask: u8,
}

impl VisualStyle {
    pub const MASK_FG: u8 = 1 << 0;
    pub const MASK_BG: u8 = 1 << 1;
    pub const MASK_ATTRS: u8 = 1 << 2;
    pub const MASK_ALL: u8 = Self::MASK_FG | Self::MASK_BG | Self::MASK_ATTRS;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn fg(mut self, color: Rgba) -> Self {
        self.fg = color;
        self.mask |= Self::MASK_FG;
        self
    }

    pub fn bg(mut self, color: Rgba) -> Self {
        self.bg = color;
        self.mask |= Self::MASK_BG;
        self
    }

    pub fn attrs(mut self, attrs: CellAttrs) -> Self {
        self.attrs = attrs;
        self.mask |= Self::MASK_ATTRS;
        self
    }

    /// Turn one attribute on or off. The attribute set becomes explicit,
    /// seeded from whatever was stored before.
    pub fn flag(mut self, flag: CellAttrs, on: bool) -> Self {
        self.attrs.set(flag, on);
        self.mask |= Self::MASK_ATTRS;
        self
    }

    pub fn is_explicit(&self, bit: u8) -> bool {
        self.mask & bit != 0
    }

    /// Merge with the parent's resolved style.
    pub fn resolve(&self, parent: Style) -> Style {
        if self.mask == Self::MASK_ALL {
            return Style {
                fg: self.fg,
                bg: self.bg,
                attrs: self.attrs,
            };
        }
        Style {
            fg: if self.is_explicit(Self::MASK_FG) {
                self.fg
            } else {
                parent.fg
            },
            bg: if self.is_explicit(Self::MASK_BG) {
                self.bg
            } else {
                parent.bg
            },
            attrs: if self.is_explicit(Self::MASK_ATTRS) {
                self.attrs
            } else {
                parent.attrs
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::color;

    #[test]
    fn test_unset_properties_inherit() {
        let parent = Style::new(color::rgb(1, 2, 3), color::rgb(4, 5, 6)).attrs(CellAttrs::BOLD);
        let resolved = VisualStyle::new().resolve(parent);
        assert_eq!(resolved, parent);
    }

    #[test]
    fn test_explicit_properties_override() {
        let parent = Style::new(color::WHITE, color::BLACK).attrs(CellAttrs::BOLD);
        let style = VisualStyle::new().fg(color::rgb(255, 0, 0));
        let resolved = style.resolve(parent);
        assert_eq!(resolved.fg, color::rgb(255, 0, 0));
        assert_eq!(resolved.bg, color::BLACK);
        assert_eq!(resolved.attrs, CellAttrs::BOLD);
    }

    #[test]
    fn test_explicit_default_color_overrides_parent() {
        let parent = Style::new(color::WHITE, color::BLACK);
        let resolved = VisualStyle::new().bg(color::DEFAULT).resolve(parent);
        assert_eq!(resolved.bg, color::DEFAULT);
    }

    #[test]
    fn test_flag_toggles_single_attribute() {
        let style = VisualStyle::new()
            .flag(CellAttrs::ITALIC, true)
            .flag(CellAttrs::UNDERLINE, true)
            .flag(CellAttrs::ITALIC, false);
        assert_eq!(style.attrs, CellAttrs::UNDERLINE);
        assert!(style.is_explicit(VisualStyle::MASK_ATTRS));
        assert!(!style.is_explicit(VisualStyle::MASK_FG));
    }
}
