//! ANSI sequence emission.
//!
//! All escape sequences are produced through crossterm's `Command::write_ansi`
//! into a `String`, so the renderer can assemble a whole frame before a
//! single write. Formatting into a `String` cannot fail, hence the discarded
//! `fmt::Result`s.

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::event::{
    DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
};
use crossterm::style::{Attribute, SetAttribute, SetBackgroundColor, SetForegroundColor};
use crossterm::terminal::{
    BeginSynchronizedUpdate, Clear, ClearType, EndSynchronizedUpdate, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::Command;

use crate::config::MouseMode;
use crate::terminal::TerminalModes;
use crate::types::{color, CellAttrs, Rgba};

/// Button-event tracking without the SGR extension.
const MOUSE_NORMAL_ON: &str = "\x1b[?1000h\x1b[?1002h";
const MOUSE_NORMAL_OFF: &str = "\x1b[?1002l\x1b[?1000l";

const ATTR_TABLE: [(CellAttrs, Attribute); 6] = [
    (CellAttrs::BOLD, Attribute::Bold),
    (CellAttrs::DIM, Attribute::Dim),
    (CellAttrs::ITALIC, Attribute::Italic),
    (CellAttrs::UNDERLINE, Attribute::Underlined),
    (CellAttrs::INVERSE, Attribute::Reverse),
    (CellAttrs::STRIKETHROUGH, Attribute::CrossedOut),
];

fn queue(out: &mut String, cmd: impl Command) {
    let _ = cmd.write_ansi(out);
}

/// `CSI row;col H`, 0-indexed input.
pub fn move_to(out: &mut String, x: u16, y: u16) {
    queue(out, MoveTo(x, y));
}

pub fn set_fg(out: &mut String, c: Rgba) {
    queue(out, SetForegroundColor(color::to_crossterm(c)));
}

pub fn set_bg(out: &mut String, c: Rgba) {
    queue(out, SetBackgroundColor(color::to_crossterm(c)));
}

/// Reset all SGR state, then switch on each attribute in `attrs`. Colors are
/// reset too, so callers must re-emit them.
pub fn set_attrs(out: &mut String, attrs: CellAttrs) {
    reset(out);
    for (flag, attr) in ATTR_TABLE {
        if attrs.contains(flag) {
            queue(out, SetAttribute(attr));
        }
    }
}

pub fn reset(out: &mut String) {
    queue(out, SetAttribute(Attribute::Reset));
}

pub fn clear_screen(out: &mut String) {
    queue(out, Clear(ClearType::All));
}

pub fn begin_sync(out: &mut String) {
    queue(out, BeginSynchronizedUpdate);
}

pub fn end_sync(out: &mut String) {
    queue(out, EndSynchronizedUpdate);
}

/// Sequences that switch the terminal into the requested modes.
pub fn enter_modes(modes: &TerminalModes) -> String {
    let mut out = String::new();
    if modes.alternate_screen {
        queue(&mut out, EnterAlternateScreen);
    }
    match modes.mouse {
        MouseMode::Off => {}
        MouseMode::Normal => out.push_str(MOUSE_NORMAL_ON),
        MouseMode::Sgr => queue(&mut out, EnableMouseCapture),
    }
    if modes.bracketed_paste {
        queue(&mut out, EnableBracketedPaste);
    }
    if modes.hide_cursor {
        queue(&mut out, Hide);
    }
    out
}

/// Inverse of `enter_modes`, undone in reverse order.
pub fn leave_modes(modes: &TerminalModes) -> String {
    let mut out = String::new();
    reset(&mut out);
    if modes.hide_cursor {
        queue(&mut out, Show);
    }
    if modes.bracketed_paste {
        queue(&mut out, DisableBracketedPaste);
    }
    match modes.mouse {
        MouseMode::Off => {}
        MouseMode::Normal => out.push_str(MOUSE_NORMAL_OFF),
        MouseMode::Sgr => queue(&mut out, DisableMouseCapture),
    }
    if modes.alternate_screen {
        queue(&mut out, LeaveAlternateScreen);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_and_colors() {
        let mut out = String::new();
        move_to(&mut out, 0, 0);
        move_to(&mut out, 9, 4);
        assert_eq!(out, "\x1b[1;1H\x1b[5;10H");

        out.clear();
        set_fg(&mut out, color::rgb(255, 0, 16));
        set_bg(&mut out, color::DEFAULT);
        assert_eq!(out, "\x1b[38;2;255;0;16m\x1b[49m");
    }

    #[test]
    fn test_attrs_reset_first() {
        let mut out = String::new();
        set_attrs(&mut out, CellAttrs::BOLD | CellAttrs::UNDERLINE);
        assert_eq!(out, "\x1b[0m\x1b[1m\x1b[4m");

        out.clear();
        set_attrs(&mut out, CellAttrs::empty());
        assert_eq!(out, "\x1b[0m");
    }

    #[test]
    fn test_mode_sequences_mirror_each_other() {
        let modes = TerminalModes {
            alternate_screen: true,
            mouse: MouseMode::Normal,
            bracketed_paste: true,
            hide_cursor: true,
        };
        let enter = enter_modes(&modes);
        assert!(enter.starts_with("\x1b[?1049h"));
        assert!(enter.contains(MOUSE_NORMAL_ON));
        assert!(enter.contains("\x1b[?2004h"));
        assert!(enter.ends_with("\x1b[?25l"));

        let leave = leave_modes(&modes);
        assert!(leave.contains("\x1b[?25h"));
        assert!(leave.contains("\x1b[?2004l"));
        assert!(leave.contains(MOUSE_NORMAL_OFF));
        assert!(leave.ends_with("\x1b[?1049l"));
    }

    #[test]
    fn test_sgr_mouse_enables_1006() {
        let modes = TerminalModes {
            mouse: MouseMode::Sgr,
            ..TerminalModes::none()
        };
        assert!(enter_modes(&modes).contains("\x1b[?1006h"));
        assert!(leave_modes(&modes).contains("\x1b[?1006l"));
        assert_eq!(enter_modes(&TerminalModes::none()), "");
    }
}
