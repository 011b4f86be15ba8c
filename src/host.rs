//! External collaborators
//!
//! The engine does not spawn processes or touch the host terminal itself.
//! A front end supplies a [`PtyBackend`] for the child process and, when
//! drawing to a real terminal, a [`HostTerminal`]. Front-end widgets
//! implement the capability traits at the bottom of this module; the core
//! never depends on them.

use std::io;

use tracing::warn;

/// Size of a terminal in cells and (optionally) pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub rows: u16,
    pub cols: u16,
    pub pixel_width: u16,
    pub pixel_height: u16,
}

impl WindowSize {
    /// Create a new window size with just rows and columns
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }

    /// Create a new window size with pixel dimensions
    pub fn with_pixels(cols: u16, rows: u16, pixel_width: u16, pixel_height: u16) -> Self {
        Self {
            rows,
            cols,
            pixel_width,
            pixel_height,
        }
    }

    /// Pixel size of one cell, if the pixel dimensions are known
    pub fn cell_pixels(&self) -> Option<(u32, u32)> {
        if self.cols == 0 || self.rows == 0 || self.pixel_width == 0 || self.pixel_height == 0 {
            return None;
        }
        Some((
            u32::from(self.pixel_width) / u32::from(self.cols),
            u32::from(self.pixel_height) / u32::from(self.rows),
        ))
    }
}

impl Default for WindowSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// A child process behind a pseudoterminal.
///
/// Methods take `&self` so one backend can be read by the session's pump
/// thread while other threads write input and resize it. `read` blocks
/// until data arrives and returns `Ok(0)` at end of stream; `close` must
/// make a blocked `read` return.
pub trait PtyBackend: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data`
    fn write(&self, data: &[u8]) -> io::Result<()>;

    fn resize(&self, size: WindowSize) -> io::Result<()>;

    /// Release the process handle. Calling it again is a no-op.
    fn close(&self) -> io::Result<()>;

    /// Exit code of the child, once it has exited
    fn exit_status(&self) -> Option<i32>;
}

/// The terminal the engine draws on
pub trait HostTerminal {
    fn size(&self) -> io::Result<WindowSize>;

    fn enter_raw_mode(&mut self) -> io::Result<()>;

    fn restore_mode(&mut self) -> io::Result<()>;
}

/// Keeps the host in raw mode until dropped
pub struct RawModeGuard<'a, H: HostTerminal + ?Sized> {
    host: &'a mut H,
}

impl<'a, H: HostTerminal + ?Sized> RawModeGuard<'a, H> {
    pub fn enter(host: &'a mut H) -> io::Result<Self> {
        host.enter_raw_mode()?;
        Ok(Self { host })
    }
}

impl<H: HostTerminal + ?Sized> Drop for RawModeGuard<'_, H> {
    fn drop(&mut self) {
        if let Err(e) = self.host.restore_mode() {
            warn!("failed to restore host terminal mode: {}", e);
        }
    }
}

/// Something that can be drawn as a string of terminal output
pub trait Renderable {
    /// Full, non-differential render of the current state
    fn render_to_string(&self) -> String;
}

/// Something that tracks keyboard focus
pub trait Focusable {
    fn set_focused(&mut self, focused: bool);

    fn is_focused(&self) -> bool;
}

/// Something that accepts encoded input for the child process
pub trait InputSink {
    fn send_input(&self, bytes: &[u8]) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeHost {
        raw: bool,
        transitions: Vec<bool>,
    }

    impl HostTerminal for FakeHost {
        fn size(&self) -> io::Result<WindowSize> {
            Ok(WindowSize::with_pixels(80, 24, 640, 384))
        }

        fn enter_raw_mode(&mut self) -> io::Result<()> {
            self.raw = true;
            self.transitions.push(true);
            Ok(())
        }

        fn restore_mode(&mut self) -> io::Result<()> {
            self.raw = false;
            self.transitions.push(false);
            Ok(())
        }
    }

    #[test]
    fn test_raw_mode_guard_restores() {
        let mut host = FakeHost::default();
        {
            let _guard = RawModeGuard::enter(&mut host).unwrap();
        }
        assert!(!host.raw);
        assert_eq!(host.transitions, vec![true, false]);
    }

    #[test]
    fn test_window_size_cell_pixels() {
        let host = FakeHost::default();
        assert_eq!(host.size().unwrap().cell_pixels(), Some((8, 16)));
        assert_eq!(WindowSize::new(80, 24).cell_pixels(), None);
        assert_eq!(WindowSize::with_pixels(0, 24, 640, 384).cell_pixels(), None);
        assert_eq!(WindowSize::default(), WindowSize::new(80, 24));
    }
}
