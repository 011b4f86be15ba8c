//! Cursor state
//!
//! Every movement clamps against a [`Bounds`], which carries both the grid
//! size and the current vertical scroll margins, so the cursor can never
//! leave the live grid.

use serde::{Deserialize, Serialize};

use super::cell::Pen;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

impl CursorShape {
    /// Shape and blink flag for a DECSCUSR parameter. `0` maps to a
    /// blinking block like `1`.
    pub fn from_decscusr(param: u32) -> Option<(CursorShape, bool)> {
        let shape = match param {
            0..=2 => CursorShape::Block,
            3 | 4 => CursorShape::Underline,
            5 | 6 => CursorShape::Bar,
            _ => return None,
        };
        // Odd values (and 0) blink
        Some((shape, param == 0 || param % 2 == 1))
    }
}

/// Grid extent plus the inclusive scroll margins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub cols: usize,
    pub rows: usize,
    pub top: usize,
    pub bottom: usize,
}

impl Bounds {
    pub fn new(cols: usize, rows: usize) -> Self {
        Self {
            cols,
            rows,
            top: 0,
            bottom: rows.saturating_sub(1),
        }
    }

    pub fn with_margins(mut self, top: usize, bottom: usize) -> Self {
        self.top = top.min(self.last_row());
        self.bottom = bottom.clamp(self.top, self.last_row());
        self
    }

    fn last_col(&self) -> usize {
        self.cols.saturating_sub(1)
    }

    fn last_row(&self) -> usize {
        self.rows.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub col: usize,
    pub row: usize,
    /// DECTCEM
    pub visible: bool,
    pub shape: CursorShape,
    pub blinking: bool,
    /// Attributes stamped onto newly printed cells
    pub pen: Pen,
    /// DECOM: row addressing is relative to the top margin
    pub origin_mode: bool,
    /// DECAWM
    pub autowrap: bool,
    /// Set after printing into the last column; the next printable wraps
    pub pending_wrap: bool,
    /// IRM
    pub insert_mode: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            shape: CursorShape::default(),
            blinking: true,
            pen: Pen::default(),
            origin_mode: false,
            autowrap: true,
            pending_wrap: false,
            insert_mode: false,
        }
    }
}

/// What DECSC stores and DECRC brings back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCursor {
    pub col: usize,
    pub row: usize,
    pub pen: Pen,
    pub origin_mode: bool,
    pub autowrap: bool,
}

impl Default for SavedCursor {
    fn default() -> Self {
        Cursor::default().save()
    }
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute placement, ignoring origin mode
    pub fn move_to(&mut self, col: usize, row: usize, bounds: Bounds) {
        self.col = col.min(bounds.last_col());
        self.row = row.min(bounds.last_row());
        self.pending_wrap = false;
    }

    /// Column 0 of the first addressable row
    pub fn home(&mut self, bounds: Bounds) {
        let row = if self.origin_mode { bounds.top } else { 0 };
        self.move_to(0, row, bounds);
    }

    /// CUU/CUD. The margins stop the cursor only when it starts inside
    /// the scroll region.
    pub fn move_vertical(&mut self, delta: isize, bounds: Bounds) {
        let n = delta.unsigned_abs();
        self.row = if delta < 0 {
            let floor = if self.row >= bounds.top { bounds.top } else { 0 };
            self.row.saturating_sub(n).max(floor)
        } else {
            let ceiling = if self.row <= bounds.bottom {
                bounds.bottom
            } else {
                bounds.last_row()
            };
            self.row.saturating_add(n).min(ceiling)
        };
        self.pending_wrap = false;
    }

    /// CUF/CUB/BS
    pub fn move_horizontal(&mut self, delta: isize, bounds: Bounds) {
        let n = delta.unsigned_abs();
        self.col = if delta < 0 {
            self.col.saturating_sub(n)
        } else {
            self.col.saturating_add(n).min(bounds.last_col())
        };
        self.pending_wrap = false;
    }

    pub fn goto_col(&mut self, col: usize, bounds: Bounds) {
        self.col = col.min(bounds.last_col());
        self.pending_wrap = false;
    }

    /// VPA and the row half of CUP; relative to the top margin under DECOM
    pub fn goto_row(&mut self, row: usize, bounds: Bounds) {
        self.row = if self.origin_mode {
            bounds.top.saturating_add(row).min(bounds.bottom)
        } else {
            row.min(bounds.last_row())
        };
        self.pending_wrap = false;
    }

    pub fn carriage_return(&mut self) {
        self.col = 0;
        self.pending_wrap = false;
    }

    pub fn save(&self) -> SavedCursor {
        SavedCursor {
            col: self.col,
            row: self.row,
            pen: self.pen,
            origin_mode: self.origin_mode,
            autowrap: self.autowrap,
        }
    }

    /// Restore a saved state, clamped in case the grid shrank since
    pub fn restore(&mut self, saved: &SavedCursor, bounds: Bounds) {
        self.pen = saved.pen;
        self.origin_mode = saved.origin_mode;
        self.autowrap = saved.autowrap;
        self.move_to(saved.col, saved.row, bounds);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
