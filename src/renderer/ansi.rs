//! ANSI output sequence writers
//!
//! Pure functions appending escape sequences to an output string. They hold
//! no state; the diff renderer tracks what the sink has already seen.
//!
//! | Sequence | Meaning |
//! |----------|---------|
//! | `ESC [ row ; col H` | CUP, 1-indexed |
//! | `ESC [ Pm m` | SGR |
//! | `ESC [ ? 25 h/l` | show/hide cursor |
//! | `ESC [ Ps SP q` | cursor shape |

use std::fmt::Write;

use crate::core::{CursorShape, Rgb, UnderlineStyle};

pub const SGR_RESET: &str = "\x1b[0m";
pub const CURSOR_SHOW: &str = "\x1b[?25h";
pub const CURSOR_HIDE: &str = "\x1b[?25l";

/// Move the cursor to a 0-indexed position
pub fn cup(out: &mut String, row: usize, col: usize) {
    // Writing into a String cannot fail
    let _ = write!(out, "\x1b[{};{}H", row + 1, col + 1);
}

pub fn sgr_reset(out: &mut String) {
    out.push_str(SGR_RESET);
}

pub fn show_cursor(out: &mut String) {
    out.push_str(CURSOR_SHOW);
}

pub fn hide_cursor(out: &mut String) {
    out.push_str(CURSOR_HIDE);
}

/// DECSCUSR for a cursor shape
pub fn cursor_shape(out: &mut String, shape: CursorShape, blinking: bool) {
    let code = match (shape, blinking) {
        (CursorShape::Block, true) => 1,
        (CursorShape::Block, false) => 2,
        (CursorShape::Underline, true) => 3,
        (CursorShape::Underline, false) => 4,
        (CursorShape::Bar, true) => 5,
        (CursorShape::Bar, false) => 6,
    };
    let _ = write!(out, "\x1b[{} q", code);
}

/// Collects SGR parameters so several changes go out as one sequence
#[derive(Debug, Default)]
pub struct SgrBuilder {
    params: String,
}

impl SgrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    fn separator(&mut self) {
        if !self.params.is_empty() {
            self.params.push(';');
        }
    }

    /// Add a plain numeric code
    pub fn code(&mut self, code: u32) -> &mut Self {
        self.separator();
        let _ = write!(self.params, "{}", code);
        self
    }

    /// Underline in the given style; plain single underline uses `4`
    pub fn underline(&mut self, style: UnderlineStyle) -> &mut Self {
        self.separator();
        match style {
            UnderlineStyle::Single => self.params.push('4'),
            other => {
                let _ = write!(self.params, "4:{}", other.param());
            }
        }
        self
    }

    pub fn fg(&mut self, (r, g, b): Rgb) -> &mut Self {
        self.separator();
        let _ = write!(self.params, "38;2;{};{};{}", r, g, b);
        self
    }

    pub fn bg(&mut self, (r, g, b): Rgb) -> &mut Self {
        self.separator();
        let _ = write!(self.params, "48;2;{};{};{}", r, g, b);
        self
    }

    pub fn underline_color(&mut self, (r, g, b): Rgb) -> &mut Self {
        self.separator();
        let _ = write!(self.params, "58:2::{}:{}:{}", r, g, b);
        self
    }

    /// Append the collected sequence; nothing is written when empty
    pub fn finish(&self, out: &mut String) {
        if self.params.is_empty() {
            return;
        }
        out.push_str("\x1b[");
        out.push_str(&self.params);
        out.push('m');
    }
}
