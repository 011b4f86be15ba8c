//! Deterministic snapshot generation
//!
//! Snapshots capture the terminal state in a serializable format for
//! testing and debugging. Given the same byte stream, the terminal must
//! produce identical snapshots.

use serde::{Deserialize, Serialize};

use super::buffer::Buffer;
use super::cell::{Cell, Color, Style};
use super::cursor::{Cursor, CursorShape};
use super::modes::Modes;
use super::width::{AmbiguousWidth, WidthMode};

/// A complete snapshot of the terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Screen dimensions
    pub cols: usize,
    pub rows: usize,
    /// Live grid content (row-major)
    pub grid: Vec<Vec<CellSnapshot>>,
    /// Soft-wrap flag per live row
    pub wrapped: Vec<bool>,
    pub cursor: CursorSnapshot,
    /// Scroll region
    pub scroll_top: usize,
    pub scroll_bottom: usize,
    pub modes: ModesSnapshot,
    pub title: String,
    pub alternate_screen: bool,
    /// Scrollback line count
    pub scrollback_lines: usize,
    /// Rows dropped from the front of scrollback so far
    pub evicted_lines: u64,
    pub scroll_offset: usize,
    pub horiz_offset: usize,
    pub overlays: OverlaySnapshot,
}

/// Snapshot of a single cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    /// Character plus combining marks
    pub content: String,
    pub fg: ColorSnapshot,
    pub bg: ColorSnapshot,
    #[serde(default, skip_serializing_if = "is_default_color")]
    pub underline_color: ColorSnapshot,
    pub style: StyleSnapshot,
    /// Cell width (0 for continuation, 1 normal, 2 wide)
    pub width: u8,
    /// Drawn width in cell units
    pub visual_width: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<u16>,
}

/// Snapshot of a color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ColorSnapshot {
    #[default]
    Default,
    Indexed {
        index: u8,
    },
    Rgb {
        r: u8,
        g: u8,
        b: u8,
    },
}

fn is_default_color(c: &ColorSnapshot) -> bool {
    *c == ColorSnapshot::Default
}

/// Snapshot of style attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleSnapshot {
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub faint: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    /// SGR 4 sub-parameter (0 = none, 1 single, 2 double, 3 curly, ...)
    #[serde(default, skip_serializing_if = "is_zero")]
    pub underline: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub blink: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub inverse: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// Snapshot of cursor state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub col: usize,
    pub row: usize,
    pub visible: bool,
    pub shape: String,
    pub blinking: bool,
}

/// Snapshot of terminal modes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModesSnapshot {
    #[serde(default, skip_serializing_if = "is_false")]
    pub application_cursor: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub application_keypad: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bracketed_paste: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub linefeed_mode: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub origin_mode: bool,
    pub autowrap: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub insert_mode: bool,
    /// "fixed" or "flexible"
    pub width_mode: String,
    /// "narrow", "wide" or "auto"
    pub ambiguous_width: String,
}

/// Number of registered overlay objects of each kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySnapshot {
    pub palettes: usize,
    pub glyphs: usize,
    pub sprites: usize,
    pub crop_rects: usize,
    pub screen_splits: usize,
}

impl From<&Color> for ColorSnapshot {
    fn from(color: &Color) -> Self {
        match color {
            Color::Default => ColorSnapshot::Default,
            Color::Indexed(i) => ColorSnapshot::Indexed { index: *i },
            Color::Rgb(r, g, b) => ColorSnapshot::Rgb {
                r: *r,
                g: *g,
                b: *b,
            },
        }
    }
}

impl From<&Style> for StyleSnapshot {
    fn from(style: &Style) -> Self {
        StyleSnapshot {
            bold: style.bold,
            faint: style.faint,
            italic: style.italic,
            underline: style.underline.param(),
            blink: style.blink,
            inverse: style.inverse,
            hidden: style.hidden,
            strikethrough: style.strikethrough,
        }
    }
}

impl From<&Cell> for CellSnapshot {
    fn from(cell: &Cell) -> Self {
        CellSnapshot {
            content: cell.text(),
            fg: ColorSnapshot::from(&cell.fg),
            bg: ColorSnapshot::from(&cell.bg),
            underline_color: ColorSnapshot::from(&cell.underline_color),
            style: StyleSnapshot::from(&cell.style),
            width: cell.width,
            visual_width: cell.visual_width,
            palette: cell.palette,
        }
    }
}

impl From<&Cursor> for CursorSnapshot {
    fn from(cursor: &Cursor) -> Self {
        CursorSnapshot {
            col: cursor.col,
            row: cursor.row,
            visible: cursor.visible,
            shape: match cursor.shape {
                CursorShape::Block => "block".to_string(),
                CursorShape::Underline => "underline".to_string(),
                CursorShape::Bar => "bar".to_string(),
            },
            blinking: cursor.blinking,
        }
    }
}

impl ModesSnapshot {
    fn capture(modes: &Modes, buffer: &Buffer) -> Self {
        let cursor = buffer.cursor();
        let width = buffer.width_policy();
        ModesSnapshot {
            application_cursor: modes.application_cursor,
            application_keypad: modes.application_keypad,
            bracketed_paste: modes.bracketed_paste,
            linefeed_mode: modes.linefeed_newline,
            origin_mode: cursor.origin_mode,
            autowrap: cursor.autowrap,
            insert_mode: cursor.insert_mode,
            width_mode: match width.mode {
                WidthMode::Fixed => "fixed".to_string(),
                WidthMode::Flexible => "flexible".to_string(),
            },
            ambiguous_width: match width.ambiguous {
                AmbiguousWidth::Narrow => "narrow".to_string(),
                AmbiguousWidth::Wide => "wide".to_string(),
                AmbiguousWidth::Auto => "auto".to_string(),
            },
        }
    }
}

impl Snapshot {
    /// Create a snapshot of the live grid and the buffer state
    pub fn from_buffer(buffer: &Buffer) -> Self {
        let mut grid = Vec::with_capacity(buffer.rows());
        let mut wrapped = Vec::with_capacity(buffer.rows());

        for row in 0..buffer.rows() {
            let mut row_cells = Vec::with_capacity(buffer.cols());
            for col in 0..buffer.cols() {
                let cell = buffer.cell(col, row).cloned().unwrap_or_default();
                row_cells.push(CellSnapshot::from(&cell));
            }
            grid.push(row_cells);
            wrapped.push(buffer.line(row).is_some_and(|line| line.wrapped));
        }

        let (palettes, glyphs, sprites, crop_rects, screen_splits) = buffer.overlays().counts();

        Snapshot {
            cols: buffer.cols(),
            rows: buffer.rows(),
            grid,
            wrapped,
            cursor: CursorSnapshot::from(buffer.cursor()),
            scroll_top: buffer.scroll_top(),
            scroll_bottom: buffer.scroll_bottom(),
            modes: ModesSnapshot::capture(buffer.modes(), buffer),
            title: buffer.title().to_string(),
            alternate_screen: buffer.is_alternate(),
            scrollback_lines: buffer.scrollback().len(),
            evicted_lines: buffer.scrollback().evicted(),
            scroll_offset: buffer.scroll_offset(),
            horiz_offset: buffer.horiz_offset(),
            overlays: OverlaySnapshot {
                palettes,
                glyphs,
                sprites,
                crop_rects,
                screen_splits,
            },
        }
    }

    /// Convert snapshot to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse snapshot from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Plain text of the grid, one line per row, trailing blanks trimmed
    pub fn to_text(&self) -> String {
        let mut result = String::new();

        for row in &self.grid {
            for cell in row {
                if cell.width == 0 {
                    continue;
                }
                if cell.content.is_empty() {
                    result.push(' ');
                } else {
                    result.push_str(&cell.content);
                }
            }
            while result.ends_with(' ') {
                result.pop();
            }
            result.push('\n');
        }

        while result.ends_with("\n\n") {
            result.pop();
        }

        result
    }

    /// Compare grid contents only
    pub fn content_equals(&self, other: &Snapshot) -> bool {
        self.cols == other.cols && self.rows == other.rows && self.grid == other.grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::modes::DecMode;

    #[test]
    fn test_snapshot_from_buffer() {
        let mut buffer = Buffer::new(10, 3, 100);
        buffer.print('H');
        buffer.print('i');

        let snapshot = Snapshot::from_buffer(&buffer);

        assert_eq!(snapshot.cols, 10);
        assert_eq!(snapshot.rows, 3);
        assert_eq!(snapshot.grid[0][0].content, "H");
        assert_eq!(snapshot.grid[0][1].content, "i");
        assert_eq!(snapshot.cursor.col, 2);
        assert_eq!(snapshot.cursor.row, 0);
        assert_eq!(snapshot.modes.width_mode, "fixed");
    }

    #[test]
    fn test_snapshot_to_text() {
        let mut buffer = Buffer::new(10, 3, 100);
        buffer.print('A');
        buffer.print('B');
        buffer.next_line();
        buffer.print('C');

        let text = Snapshot::from_buffer(&buffer).to_text();
        assert_eq!(text, "AB\nC\n");
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let mut buffer = Buffer::new(5, 2, 100);
        buffer.print('X');
        buffer.cursor_mut().pen.style.bold = true;
        buffer.cursor_mut().pen.fg = Color::RED;
        buffer.print('Y');
        buffer.set_dec_mode(DecMode::FlexibleWidth, true);
        buffer.print('中');

        let snapshot = Snapshot::from_buffer(&buffer);
        let json = snapshot.to_json().unwrap();
        let restored = Snapshot::from_json(&json).unwrap();

        assert_eq!(snapshot, restored);
        assert_eq!(restored.grid[0][2].visual_width, 2.0);
    }

    #[test]
    fn test_snapshot_records_wrap_and_history() {
        let mut buffer = Buffer::new(3, 1, 1);
        for c in "abcdefg".chars() {
            buffer.print(c);
        }
        let snapshot = Snapshot::from_buffer(&buffer);
        assert_eq!(snapshot.scrollback_lines, 1);
        assert_eq!(snapshot.evicted_lines, 1);
        assert!(!snapshot.wrapped[0]);
    }

    #[test]
    fn test_color_snapshot() {
        assert_eq!(ColorSnapshot::from(&Color::Default), ColorSnapshot::Default);
        assert_eq!(
            ColorSnapshot::from(&Color::Indexed(5)),
            ColorSnapshot::Indexed { index: 5 }
        );
        assert_eq!(
            ColorSnapshot::from(&Color::Rgb(255, 128, 0)),
            ColorSnapshot::Rgb {
                r: 255,
                g: 128,
                b: 0
            }
        );
    }
}
