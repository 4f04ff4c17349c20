//! TerminalBackend trait + TTY, headless and mock implementations.
//!
//! The render loop depends on this trait, not on crossterm or libc directly.
//! Backends move raw bytes only: decoding happens in `input`, encoding in
//! `render`, so every backend sees exactly the same stream.

use std::io;
use std::time::Duration;

use crate::config::{EngineConfig, MouseMode};

/// Terminal modes requested on `enter` and undone on `leave`. Raw mode is
/// always on while entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalModes {
    pub alternate_screen: bool,
    pub mouse: MouseMode,
    pub bracketed_paste: bool,
    pub hide_cursor: bool,
}

impl TerminalModes {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            alternate_screen: config.alternate_screen,
            mouse: config.mouse,
            bracketed_paste: config.bracketed_paste,
            hide_cursor: config.hide_cursor,
        }
    }

    /// Raw mode only.
    pub fn none() -> Self {
        Self {
            alternate_screen: false,
            mouse: MouseMode::Off,
            bracketed_paste: false,
            hide_cursor: false,
        }
    }
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

// ============================================================================
// TerminalBackend Trait
// ============================================================================

pub trait TerminalBackend {
    fn enter(&mut self, modes: &TerminalModes) -> io::Result<()>;
    /// Undo `enter`. Calling it while not entered is a no-op.
    fn leave(&mut self) -> io::Result<()>;
    fn size(&self) -> (u16, u16);
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    /// Wait up to `timeout` for input and return whatever bytes arrived.
    /// An empty vector means the wait timed out or was interrupted.
    fn read_input(&mut self, timeout: Duration) -> io::Result<Vec<u8>>;
    /// New size if the terminal was resized since the last call.
    fn take_resize(&mut self) -> Option<(u16, u16)>;
}

// ============================================================================
// TtyBackend
// ============================================================================

#[cfg(unix)]
pub use tty::TtyBackend;

#[cfg(unix)]
mod tty {
    use std::io::{self, IsTerminal, Write};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
    use signal_hook::consts::signal::SIGWINCH;
    use signal_hook::SigId;
    use tracing::{debug, warn};

    use super::{TerminalBackend, TerminalModes};
    use crate::ansi;
    use crate::error::{EngineError, Result};

    const READ_CHUNK: usize = 4096;

    /// Real terminal on stdin/stdout. Input is read straight from fd 0 so the
    /// decoder sees every byte, including sequences crossterm would not
    /// report.
    pub struct TtyBackend {
        stdout: io::Stdout,
        modes: Option<TerminalModes>,
        resized: Arc<AtomicBool>,
        sigwinch: Option<SigId>,
        width: u16,
        height: u16,
    }

    impl TtyBackend {
        pub fn new() -> Result<Self> {
            if !io::stdin().is_terminal() || !io::stdout().is_terminal() {
                return Err(EngineError::TtyUnavailable);
            }
            let (width, height) = crossterm::terminal::size().unwrap_or((80, 24));
            let resized = Arc::new(AtomicBool::new(false));
            let sigwinch = signal_hook::flag::register(SIGWINCH, Arc::clone(&resized))?;
            Ok(Self {
                stdout: io::stdout(),
                modes: None,
                resized,
                sigwinch: Some(sigwinch),
                width,
                height,
            })
        }
    }

    impl TerminalBackend for TtyBackend {
        fn enter(&mut self, modes: &TerminalModes) -> io::Result<()> {
            enable_raw_mode()?;
            self.modes = Some(*modes);
            self.stdout.write_all(ansi::enter_modes(modes).as_bytes())?;
            self.stdout.flush()?;
            debug!(?modes, "terminal entered");
            Ok(())
        }

        fn leave(&mut self) -> io::Result<()> {
            let Some(modes) = self.modes.take() else {
                return Ok(());
            };
            let written = self
                .stdout
                .write_all(ansi::leave_modes(&modes).as_bytes())
                .and_then(|()| self.stdout.flush());
            // Raw mode goes even if the mode sequences could not be written.
            let raw = disable_raw_mode();
            debug!("terminal restored");
            written.and(raw)
        }

        fn size(&self) -> (u16, u16) {
            crossterm::terminal::size().unwrap_or((self.width, self.height))
        }

        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.stdout.write_all(bytes)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.stdout.flush()
        }

        fn read_input(&mut self, timeout: Duration) -> io::Result<Vec<u8>> {
            let mut pfd = libc::pollfd {
                fd: libc::STDIN_FILENO,
                events: libc::POLLIN,
                revents: 0,
            };
            let ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
            // SAFETY: pfd is a valid pollfd and nfds is 1.
            let ready = unsafe { libc::poll(&mut pfd, 1, ms) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                // SIGWINCH interrupts the wait; the caller checks take_resize.
                if err.kind() == io::ErrorKind::Interrupted {
                    return Ok(Vec::new());
                }
                return Err(err);
            }
            if ready == 0 || pfd.revents & libc::POLLIN == 0 {
                return Ok(Vec::new());
            }

            let mut buf = [0u8; READ_CHUNK];
            // SAFETY: buf is a valid writable buffer of buf.len() bytes.
            let n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                return match err.kind() {
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock => Ok(Vec::new()),
                    _ => Err(err),
                };
            }
            if n == 0 {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
            }
            Ok(buf[..n as usize].to_vec())
        }

        fn take_resize(&mut self) -> Option<(u16, u16)> {
            if !self.resized.swap(false, Ordering::Relaxed) {
                return None;
            }
            let size = crossterm::terminal::size().ok()?;
            (self.width, self.height) = size;
            Some(size)
        }
    }

    impl Drop for TtyBackend {
        fn drop(&mut self) {
            if let Err(e) = self.leave() {
                warn!(%e, "failed to restore terminal");
            }
            if let Some(id) = self.sigwinch.take() {
                signal_hook::low_level::unregister(id);
            }
        }
    }
}

// ============================================================================
// HeadlessBackend (for tests, CI and off-screen rendering)
// ============================================================================

/// In-memory terminal. Output accumulates in a byte vector; input is queued
/// with `push_input` and handed out on the next `read_input`.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    width: u16,
    height: u16,
    output: Vec<u8>,
    input: Vec<u8>,
    pending_resize: Option<(u16, u16)>,
    entered: Option<TerminalModes>,
}

impl HeadlessBackend {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
    }

    /// Simulate a SIGWINCH.
    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.pending_resize = Some((width, height));
    }

    pub fn is_entered(&self) -> bool {
        self.entered.is_some()
    }
}

impl TerminalBackend for HeadlessBackend {
    fn enter(&mut self, modes: &TerminalModes) -> io::Result<()> {
        self.entered = Some(*modes);
        self.output
            .extend_from_slice(crate::ansi::enter_modes(modes).as_bytes());
        Ok(())
    }

    fn leave(&mut self) -> io::Result<()> {
        if let Some(modes) = self.entered.take() {
            self.output
                .extend_from_slice(crate::ansi::leave_modes(&modes).as_bytes());
        }
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn read_input(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.input))
    }

    fn take_resize(&mut self) -> Option<(u16, u16)> {
        self.pending_resize.take()
    }
}

// ============================================================================
// MockBackend (for Rust unit tests only)
// ============================================================================

/// Records mode transitions and written frames; can be told to fail writes.
/// State lives behind a shared handle so tests keep access after the
/// backend has been moved into a render loop.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    pub state: std::rc::Rc<std::cell::RefCell<MockState>>,
}

#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockState {
    pub width: u16,
    pub height: u16,
    pub enters: usize,
    pub leaves: usize,
    pub entered: bool,
    pub frames: Vec<String>,
    pub pending: Vec<u8>,
    pub input: Vec<u8>,
    pub resize: Option<(u16, u16)>,
    pub fail_writes: bool,
    /// Switch into raw mode, then fail while writing the mode sequences.
    pub fail_enter: bool,
}

#[cfg(test)]
impl MockBackend {
    pub fn new(width: u16, height: u16) -> Self {
        let backend = Self::default();
        {
            let mut s = backend.state.borrow_mut();
            s.width = width;
            s.height = height;
        }
        backend
    }
}

#[cfg(test)]
impl TerminalBackend for MockBackend {
    fn enter(&mut self, _modes: &TerminalModes) -> io::Result<()> {
        let mut s = self.state.borrow_mut();
        s.enters += 1;
        s.entered = true;
        if s.fail_enter {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock mode write failure"));
        }
        Ok(())
    }

    fn leave(&mut self) -> io::Result<()> {
        let mut s = self.state.borrow_mut();
        if s.entered {
            s.entered = false;
            s.leaves += 1;
        }
        Ok(())
    }

    fn size(&self) -> (u16, u16) {
        let s = self.state.borrow();
        (s.width, s.height)
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut s = self.state.borrow_mut();
        if s.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        s.pending.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut s = self.state.borrow_mut();
        let frame = String::from_utf8_lossy(&std::mem::take(&mut s.pending)).into_owned();
        if !frame.is_empty() {
            s.frames.push(frame);
        }
        Ok(())
    }

    fn read_input(&mut self, _timeout: Duration) -> io::Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.state.borrow_mut().input))
    }

    fn take_resize(&mut self) -> Option<(u16, u16)> {
        self.state.borrow_mut().resize.take()
    }
}
