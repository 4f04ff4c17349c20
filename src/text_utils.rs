//! Grapheme segmentation and display-width helpers.

use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Display width of one grapheme cluster, clamped to the 0..=2 cells a
/// terminal can actually give it.
pub(crate) fn cluster_width(cluster: &str) -> u16 {
    if cluster.chars().any(char::is_control) {
        return 0;
    }
    UnicodeWidthStr::width(cluster).min(2) as u16
}

/// Iterate grapheme clusters with their cell widths.
pub(crate) fn clusters(text: &str) -> impl Iterator<Item = (&str, u16)> {
    UnicodeSegmentation::graphemes(text, true).map(|g| (g, cluster_width(g)))
}

/// Display width of a single line.
pub fn display_width(text: &str) -> u16 {
    clusters(text).fold(0u16, |acc, (_, w)| acc.saturating_add(w))
}

/// Intrinsic extent of multi-line text: (widest line, line count).
pub(crate) fn measure_lines(text: &str) -> (u16, u16) {
    if text.is_empty() {
        return (0, 0);
    }
    let mut width = 0u16;
    let mut lines = 0u16;
    for line in text.split('\n') {
        width = width.max(display_width(line));
        lines = lines.saturating_add(1);
    }
    (width, lines)
}
