//! Input Decoder: raw terminal bytes to structured events.
//!
//! Handles, in one streaming state machine:
//! - Printable ASCII and UTF-8 (incomplete code points wait for more bytes)
//! - Control bytes (enter, tab, backspace, ctrl+letter, ctrl+symbol)
//! - CSI and SS3 keys (arrows, home/end, insert/delete, paging, F1-F12)
//!   with the xterm `;<mod>` parameter
//! - xterm normal (`ESC [ M`) and SGR (`ESC [ <`) mouse reports
//! - Bracketed paste and terminal focus reports
//! - Alt+key (ESC prefix) and the lone-ESC ambiguity, resolved by a timeout
//!
//! Bytes that form no recognised sequence are dropped and the scanner
//! resumes at the next byte.

use std::time::{Duration, Instant};

use bitflags::bitflags;
use tracing::trace;

// ============================================================================
// Event Types
// ============================================================================

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const ALT   = 1 << 1;
        const CTRL  = 1 << 2;
        const META  = 1 << 3;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    /// Key name: the character itself for printable input, otherwise a
    /// lowercase name such as `up`, `enter`, `f5`, `escape`.
    pub name: String,
    /// Raw bytes that produced the event.
    pub sequence: String,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: String::new(),
            modifiers: Modifiers::empty(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    fn with_sequence(mut self, raw: &[u8]) -> Self {
        self.sequence = String::from_utf8_lossy(raw).into_owned();
        self
    }

    pub fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    pub fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    pub fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    pub fn meta(&self) -> bool {
        self.modifiers.contains(Modifiers::META)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseAction {
    Press,
    Release,
    Move,
    Scroll(ScrollDirection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    /// 0-indexed column.
    pub x: u16,
    /// 0-indexed row.
    pub y: u16,
    pub button: MouseButton,
    pub action: MouseAction,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Paste(String),
    FocusGained,
    FocusLost,
}

// ============================================================================
// Decoder
// ============================================================================

/// Sequences longer than this without a final byte are treated as garbage.
const MAX_SEQUENCE_LEN: usize = 64;

const PASTE_END: &[u8] = b"\x1b[201~";

pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

enum Parse {
    Event(InputEvent, usize),
    /// Consumed bytes that carry no event (paste start, junk).
    Skip(usize),
    Incomplete,
}

/// Streaming decoder. Bytes that end mid-sequence are held until the next
/// `feed` completes them, or until `flush_timeout` gives up on them.
#[derive(Debug)]
pub struct InputDecoder {
    pending: Vec<u8>,
    pending_since: Option<Instant>,
    escape_timeout: Duration,
    in_paste: bool,
}

impl Default for InputDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl InputDecoder {
    pub fn new() -> Self {
        Self::with_escape_timeout(DEFAULT_ESCAPE_TIMEOUT)
    }

    pub fn with_escape_timeout(escape_timeout: Duration) -> Self {
        Self {
            pending: Vec::with_capacity(64),
            pending_since: None,
            escape_timeout,
            in_paste: false,
        }
    }

    pub fn escape_timeout(&self) -> Duration {
        self.escape_timeout
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// When pending bytes will be given up on, if any are held.
    pub fn deadline(&self) -> Option<Instant> {
        if self.in_paste {
            return None;
        }
        self.pending_since.map(|t| t + self.escape_timeout)
    }

    /// Decode `bytes` appended to whatever was pending.
    pub fn feed(&mut self, bytes: &[u8], now: Instant) -> Vec<InputEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        self.drain(&mut events);
        if self.pending.is_empty() {
            self.pending_since = None;
        } else if self.pending_since.is_none() || !bytes.is_empty() {
            self.pending_since = Some(now);
        }
        events
    }

    /// Resolve held bytes once the escape window has elapsed: a held ESC
    /// becomes an `escape` key and whatever follows it is decoded as if it
    /// had arrived on its own. Incomplete UTF-8 is discarded.
    pub fn flush_timeout(&mut self, now: Instant) -> Vec<InputEvent> {
        let Some(deadline) = self.deadline() else {
            return Vec::new();
        };
        if now < deadline || self.pending.is_empty() {
            return Vec::new();
        }

        let mut events = Vec::new();
        if self.pending[0] == 0x1b {
            events.push(InputEvent::Key(KeyEvent::new("escape").with_sequence(b"\x1b")));
            self.pending.remove(0);
        }
        self.drain(&mut events);
        if !self.pending.is_empty() && !self.in_paste {
            trace!(bytes = ?self.pending, "dropping incomplete input after timeout");
            self.pending.clear();
        }
        self.pending_since = if self.pending.is_empty() { None } else { Some(now) };
        events
    }

    fn drain(&mut self, events: &mut Vec<InputEvent>) {
        loop {
            if self.in_paste {
                match find(&self.pending, PASTE_END) {
                    Some(end) => {
                        let text = String::from_utf8_lossy(&self.pending[..end]).into_owned();
                        self.pending.drain(..end + PASTE_END.len());
                        self.in_paste = false;
                        events.push(InputEvent::Paste(text));
                        continue;
                    }
                    None => return,
                }
            }
            if self.pending.is_empty() {
                return;
            }
            match self.parse_one() {
                Parse::Event(ev, n) => {
                    self.pending.drain(..n);
                    events.push(ev);
                }
                Parse::Skip(n) => {
                    self.pending.drain(..n);
                }
                Parse::Incomplete => return,
            }
        }
    }

    fn parse_one(&mut self) -> Parse {
        let buf = &self.pending;
        if buf[0] != 0x1b {
            return parse_plain(buf);
        }
        if buf.len() < 2 {
            return Parse::Incomplete;
        }
        match buf[1] {
            b'[' => {
                let result = parse_csi(buf);
                if let Parse::Skip(n) = result {
                    if &buf[..n] == b"\x1b[200~" {
                        self.in_paste = true;
                    }
                }
                result
            }
            b'O' => parse_ss3(buf),
            0x1b => Parse::Event(
                InputEvent::Key(KeyEvent::new("escape").with_sequence(b"\x1b")),
                1,
            ),
            _ => match parse_plain(&buf[1..]) {
                Parse::Event(InputEvent::Key(mut key), n) => {
                    key.modifiers |= Modifiers::ALT;
                    key.sequence = String::from_utf8_lossy(&buf[..n + 1]).into_owned();
                    Parse::Event(InputEvent::Key(key), n + 1)
                }
                Parse::Incomplete => Parse::Incomplete,
                // ESC followed by junk: emit the escape, let the junk be
                // dropped on its own.
                _ => Parse::Event(
                    InputEvent::Key(KeyEvent::new("escape").with_sequence(b"\x1b")),
                    1,
                ),
            },
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn key(name: &str, modifiers: Modifiers, raw: &[u8]) -> InputEvent {
    InputEvent::Key(
        KeyEvent::new(name)
            .with_modifiers(modifiers)
            .with_sequence(raw),
    )
}

/// Decode one key from a buffer that does not start with ESC.
fn parse_plain(buf: &[u8]) -> Parse {
    let b = buf[0];
    let raw = &buf[..1];
    let ev = match b {
        b'\r' | b'\n' => key("enter", Modifiers::empty(), raw),
        b'\t' => key("tab", Modifiers::empty(), raw),
        0x7f | 0x08 => key("backspace", Modifiers::empty(), raw),
        0x00 => key("space", Modifiers::CTRL, raw),
        0x01..=0x1a => {
            let letter = (b'a' + b - 1) as char;
            key(&letter.to_string(), Modifiers::CTRL, raw)
        }
        0x1c..=0x1f => {
            let symbol = ['\\', ']', '^', '_'][(b - 0x1c) as usize];
            key(&symbol.to_string(), Modifiers::CTRL, raw)
        }
        b' ' => key("space", Modifiers::empty(), raw),
        0x21..=0x7e => {
            let ch = b as char;
            let mods = if ch.is_ascii_uppercase() {
                Modifiers::SHIFT
            } else {
                Modifiers::empty()
            };
            key(&ch.to_string(), mods, raw)
        }
        0x80..=0xff => return parse_utf8(buf),
        _ => {
            trace!(byte = b, "dropping unrecognised control byte");
            return Parse::Skip(1);
        }
    };
    Parse::Event(ev, 1)
}

fn parse_utf8(buf: &[u8]) -> Parse {
    let first = buf[0];
    let len = if first & 0xE0 == 0xC0 {
        2
    } else if first & 0xF0 == 0xE0 {
        3
    } else if first & 0xF8 == 0xF0 {
        4
    } else {
        trace!(byte = first, "dropping stray UTF-8 byte");
        return Parse::Skip(1);
    };
    // Continuation bytes that are present must be valid even if more are due.
    let available = buf.len().min(len);
    if buf[1..available].iter().any(|&c| c & 0xC0 != 0x80) {
        trace!(byte = first, "dropping malformed UTF-8 lead");
        return Parse::Skip(1);
    }
    if buf.len() < len {
        return Parse::Incomplete;
    }
    match std::str::from_utf8(&buf[..len]) {
        Ok(s) => Parse::Event(key(s, Modifiers::empty(), &buf[..len]), len),
        Err(_) => Parse::Skip(1),
    }
}

/// xterm modifier parameter: value - 1 is a bitmask of shift/alt/ctrl/meta.
fn decode_modifier(param: u32) -> Modifiers {
    Modifiers::from_bits_truncate(param.saturating_sub(1).min(0x0f) as u8)
}

fn ss3_name(b: u8) -> Option<&'static str> {
    Some(match b {
        b'A' => "up",
        b'B' => "down",
        b'C' => "right",
        b'D' => "left",
        b'H' => "home",
        b'F' => "end",
        b'P' => "f1",
        b'Q' => "f2",
        b'R' => "f3",
        b'S' => "f4",
        _ => return None,
    })
}

fn tilde_name(code: u32) -> Option<&'static str> {
    Some(match code {
        1 | 7 => "home",
        2 => "insert",
        3 => "delete",
        4 | 8 => "end",
        5 => "pageup",
        6 => "pagedown",
        11 => "f1",
        12 => "f2",
        13 => "f3",
        14 => "f4",
        15 => "f5",
        17 => "f6",
        18 => "f7",
        19 => "f8",
        20 => "f9",
        21 => "f10",
        23 => "f11",
        24 => "f12",
        _ => return None,
    })
}

fn parse_ss3(buf: &[u8]) -> Parse {
    if buf.len() < 3 {
        return Parse::Incomplete;
    }
    match ss3_name(buf[2]) {
        Some(name) => Parse::Event(key(name, Modifiers::empty(), &buf[..3]), 3),
        None => {
            trace!(byte = buf[2], "dropping unknown SS3 sequence");
            Parse::Skip(3)
        }
    }
}

fn parse_params(raw: &[u8]) -> Option<Vec<u32>> {
    if raw.is_empty() {
        return Some(Vec::new());
    }
    raw.split(|&b| b == b';')
        .map(|p| {
            if p.is_empty() {
                Some(0)
            } else {
                std::str::from_utf8(p).ok()?.parse::<u32>().ok()
            }
        })
        .collect()
}

fn parse_csi(buf: &[u8]) -> Parse {
    if buf.len() < 3 {
        return Parse::Incomplete;
    }
    match buf[2] {
        b'M' => return parse_normal_mouse(buf),
        b'<' => return parse_sgr_mouse(buf),
        _ => {}
    }

    // Parameter bytes 0x30-0x3F, intermediates 0x20-0x2F, final 0x40-0x7E.
    let mut end = 2;
    loop {
        if end >= buf.len() {
            if end > MAX_SEQUENCE_LEN {
                trace!(len = end, "dropping over-long CSI sequence");
                return Parse::Skip(end);
            }
            return Parse::Incomplete;
        }
        match buf[end] {
            0x20..=0x3f => end += 1,
            0x40..=0x7e => break,
            _ => {
                trace!(byte = buf[end], "malformed CSI sequence");
                return Parse::Skip(end);
            }
        }
        if end > MAX_SEQUENCE_LEN {
            trace!(len = end, "dropping over-long CSI sequence");
            return Parse::Skip(end);
        }
    }

    let final_byte = buf[end];
    let consumed = end + 1;
    let raw = &buf[..consumed];
    let Some(params) = parse_params(&buf[2..end]) else {
        trace!(?raw, "bad CSI parameters");
        return Parse::Skip(consumed);
    };
    let modifiers = params.get(1).map(|&m| decode_modifier(m)).unwrap_or_default();

    let name = match final_byte {
        b'A' | b'B' | b'C' | b'D' | b'H' | b'F' | b'P' | b'Q' | b'R' | b'S' => {
            ss3_name(final_byte)
        }
        b'Z' => {
            return Parse::Event(key("tab", Modifiers::SHIFT | modifiers, raw), consumed);
        }
        b'I' if params.is_empty() => return Parse::Event(InputEvent::FocusGained, consumed),
        b'O' if params.is_empty() => return Parse::Event(InputEvent::FocusLost, consumed),
        b'~' => match params.first().copied() {
            // Paste start switches the decoder into paste mode.
            Some(200) => return Parse::Skip(consumed),
            Some(code) => tilde_name(code),
            None => None,
        },
        _ => None,
    };

    match name {
        Some(name) => Parse::Event(key(name, modifiers, raw), consumed),
        None => {
            trace!(?raw, "dropping unknown CSI sequence");
            Parse::Skip(consumed)
        }
    }
}

fn mouse_modifiers(cb: u32) -> Modifiers {
    let mut m = Modifiers::empty();
    if cb & 4 != 0 {
        m |= Modifiers::SHIFT;
    }
    if cb & 8 != 0 {
        m |= Modifiers::ALT;
    }
    if cb & 16 != 0 {
        m |= Modifiers::CTRL;
    }
    m
}

fn mouse_button(low: u32) -> MouseButton {
    match low {
        0 => MouseButton::Left,
        1 => MouseButton::Middle,
        2 => MouseButton::Right,
        _ => MouseButton::None,
    }
}

/// Shared button-byte decoding. `release` is the SGR final `m`.
fn decode_mouse(cb: u32, x: u16, y: u16, release: bool) -> MouseEvent {
    let low = cb & 3;
    let (button, action) = if cb & 64 != 0 {
        let dir = match low {
            0 => ScrollDirection::Up,
            1 => ScrollDirection::Down,
            2 => ScrollDirection::Left,
            _ => ScrollDirection::Right,
        };
        (MouseButton::None, MouseAction::Scroll(dir))
    } else if cb & 32 != 0 {
        (mouse_button(low), MouseAction::Move)
    } else if release || low == 3 {
        // The normal protocol reports every release as button 3.
        (mouse_button(low), MouseAction::Release)
    } else {
        (mouse_button(low), MouseAction::Press)
    };
    MouseEvent {
        x,
        y,
        button,
        action,
        modifiers: mouse_modifiers(cb),
    }
}

/// `ESC [ M cb cx cy`, each byte offset by 32, coordinates 1-based.
fn parse_normal_mouse(buf: &[u8]) -> Parse {
    if buf.len() < 6 {
        return Parse::Incomplete;
    }
    if buf[3] < 32 || buf[4] < 33 || buf[5] < 33 {
        trace!(raw = ?&buf[..6], "malformed mouse report");
        return Parse::Skip(6);
    }
    let cb = (buf[3] - 32) as u32;
    let x = (buf[4] - 33) as u16;
    let y = (buf[5] - 33) as u16;
    Parse::Event(InputEvent::Mouse(decode_mouse(cb, x, y, false)), 6)
}

/// `ESC [ < b ; x ; y (M|m)`, coordinates 1-based.
fn parse_sgr_mouse(buf: &[u8]) -> Parse {
    let mut end = 3;
    loop {
        if end >= buf.len() {
            return if end > MAX_SEQUENCE_LEN {
                Parse::Skip(end)
            } else {
                Parse::Incomplete
            };
        }
        match buf[end] {
            b'0'..=b'9' | b';' => end += 1,
            b'M' | b'm' => break,
            other => {
                trace!(byte = other, "malformed SGR mouse report");
                return Parse::Skip(end);
            }
        }
        if end > MAX_SEQUENCE_LEN {
            return Parse::Skip(end);
        }
    }
    let consumed = end + 1;
    let params = match parse_params(&buf[3..end]) {
        Some(p) if p.len() == 3 => p,
        _ => {
            trace!(raw = ?&buf[..consumed], "malformed SGR mouse parameters");
            return Parse::Skip(consumed);
        }
    };
    let x = params[1].saturating_sub(1).min(u16::MAX as u32) as u16;
    let y = params[2].saturating_sub(1).min(u16::MAX as u32) as u16;
    let release = buf[end] == b'm';
    Parse::Event(
        InputEvent::Mouse(decode_mouse(params[0], x, y, release)),
        consumed,
    )
}
