//! Coordinate systems
//!
//! The engine addresses cells in several coordinate spaces. Each one is a
//! distinct type so they cannot be mixed up silently:
//!
//! - [`ScreenPoint`]: a position on the live grid (row 0 = top of the
//!   logical screen)
//! - [`ViewportPoint`]: a position in the displayed viewport, after the
//!   scroll offset and horizontal offset are applied
//! - [`BufferPoint`]: a buffer-absolute position that stays stable while
//!   rows move from the live grid into scrollback and out of it
//! - [`SubCellPoint`]: sprite placement in 1/[`SUBCELL_UNITS`] cell units
//! - [`SplitPoint`]: a position relative to a screen split region
//!
//! [`Viewport`] captures the scalar state needed to convert between them.

use serde::{Deserialize, Serialize};

/// Sub-cell units per cell along each axis
pub const SUBCELL_UNITS: i32 = 8;

/// Position on the live grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub col: usize,
    pub row: usize,
}

impl ScreenPoint {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

/// Position in the displayed viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ViewportPoint {
    pub col: usize,
    pub row: usize,
}

impl ViewportPoint {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }
}

/// Buffer-absolute position.
///
/// Row 0 is the first row ever pushed into scrollback. Rows below the
/// eviction count no longer exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BufferPoint {
    pub row: u64,
    pub col: usize,
}

impl BufferPoint {
    pub fn new(col: usize, row: u64) -> Self {
        Self { row, col }
    }
}

/// Sprite position in sub-cell units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SubCellPoint {
    pub x: i32,
    pub y: i32,
}

impl SubCellPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The sub-cell position of a cell's top-left corner
    pub fn from_cell(col: i32, row: i32) -> Self {
        Self {
            x: col.saturating_mul(SUBCELL_UNITS),
            y: row.saturating_mul(SUBCELL_UNITS),
        }
    }

    /// The cell containing this point (rounds toward negative infinity)
    pub fn cell(self) -> (i32, i32) {
        (
            self.x.div_euclid(SUBCELL_UNITS),
            self.y.div_euclid(SUBCELL_UNITS),
        )
    }

    /// Offset inside the containing cell, in sub-cell units
    pub fn fraction(self) -> (i32, i32) {
        (
            self.x.rem_euclid(SUBCELL_UNITS),
            self.y.rem_euclid(SUBCELL_UNITS),
        )
    }

    /// Pixel position for a cell of the given pixel size
    pub fn to_pixels(self, cell_width: u32, cell_height: u32) -> (i64, i64) {
        let px = i64::from(self.x) * i64::from(cell_width) / i64::from(SUBCELL_UNITS);
        let py = i64::from(self.y) * i64::from(cell_height) / i64::from(SUBCELL_UNITS);
        (px, py)
    }
}

/// Position relative to a screen split's top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SplitPoint {
    pub col: usize,
    pub row: usize,
}

/// Where a buffer-absolute row currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLocation {
    /// Dropped from scrollback; its content is gone
    Evicted,
    /// Index into scrollback (0 = oldest)
    History(usize),
    /// Row of the live grid
    Live(usize),
    /// Past the bottom of the live grid
    Beyond,
}

/// Scalar view state used for coordinate conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub cols: usize,
    pub rows: usize,
    pub scrollback_len: usize,
    pub evicted: u64,
    pub scroll_offset: usize,
    pub horiz_offset: usize,
}

impl Viewport {
    /// Absolute row number of the first live grid row
    pub fn live_origin(&self) -> u64 {
        self.evicted + self.scrollback_len as u64
    }

    /// Absolute row number of the first visible row
    pub fn view_origin(&self) -> u64 {
        self.live_origin() - self.scroll_offset.min(self.scrollback_len) as u64
    }

    pub fn screen_to_buffer(&self, p: ScreenPoint) -> BufferPoint {
        BufferPoint::new(p.col, self.live_origin() + p.row as u64)
    }

    pub fn buffer_to_screen(&self, p: BufferPoint) -> Option<ScreenPoint> {
        match self.locate(p.row) {
            RowLocation::Live(row) => Some(ScreenPoint::new(p.col, row)),
            _ => None,
        }
    }

    pub fn viewport_to_buffer(&self, p: ViewportPoint) -> BufferPoint {
        BufferPoint::new(
            p.col.saturating_add(self.horiz_offset),
            self.view_origin() + p.row as u64,
        )
    }

    /// Returns `None` when the point is scrolled out of view
    pub fn buffer_to_viewport(&self, p: BufferPoint) -> Option<ViewportPoint> {
        let origin = self.view_origin();
        if p.row < origin || p.col < self.horiz_offset {
            return None;
        }
        let row = (p.row - origin) as usize;
        let col = p.col - self.horiz_offset;
        (row < self.rows && col < self.cols).then_some(ViewportPoint::new(col, row))
    }

    /// Resolve a buffer-absolute row to its storage location
    pub fn locate(&self, row: u64) -> RowLocation {
        if row < self.evicted {
            return RowLocation::Evicted;
        }
        let rel = row - self.evicted;
        if rel < self.scrollback_len as u64 {
            return RowLocation::History(rel as usize);
        }
        let live = rel - self.scrollback_len as u64;
        if live < self.rows as u64 {
            RowLocation::Live(live as usize)
        } else {
            RowLocation::Beyond
        }
    }

    /// Highest valid buffer-absolute row (last live row)
    pub fn last_row(&self) -> u64 {
        self.live_origin() + self.rows.saturating_sub(1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewport() -> Viewport {
        Viewport {
            cols: 10,
            rows: 5,
            scrollback_len: 20,
            evicted: 100,
            scroll_offset: 0,
            horiz_offset: 0,
        }
    }

    #[test]
    fn test_screen_buffer_round_trip() {
        let vp = viewport();
        let p = vp.screen_to_buffer(ScreenPoint::new(3, 2));
        assert_eq!(p, BufferPoint::new(3, 122));
        assert_eq!(vp.buffer_to_screen(p), Some(ScreenPoint::new(3, 2)));
    }

    #[test]
    fn test_history_row_is_not_on_screen() {
        let vp = viewport();
        assert_eq!(vp.buffer_to_screen(BufferPoint::new(0, 119)), None);
        assert_eq!(vp.locate(119), RowLocation::History(19));
        assert_eq!(vp.locate(99), RowLocation::Evicted);
        assert_eq!(vp.locate(125), RowLocation::Beyond);
    }

    #[test]
    fn test_viewport_conversion_follows_scroll_offset() {
        let mut vp = viewport();
        vp.scroll_offset = 10;
        let p = vp.viewport_to_buffer(ViewportPoint::new(0, 0));
        assert_eq!(p.row, 110);
        assert_eq!(vp.buffer_to_viewport(p), Some(ViewportPoint::new(0, 0)));

        // The same absolute point leaves the view when scrolling back down
        vp.scroll_offset = 0;
        assert_eq!(vp.buffer_to_viewport(p), None);
    }

    #[test]
    fn test_viewport_conversion_follows_horizontal_offset() {
        let mut vp = viewport();
        vp.horiz_offset = 4;
        let p = vp.viewport_to_buffer(ViewportPoint::new(1, 0));
        assert_eq!(p.col, 5);
        assert_eq!(vp.buffer_to_viewport(BufferPoint::new(3, 120)), None);
        assert_eq!(
            vp.buffer_to_viewport(BufferPoint::new(13, 120)),
            Some(ViewportPoint::new(9, 0))
        );
    }

    #[test]
    fn test_subcell_conversions() {
        let p = SubCellPoint::new(19, -3);
        assert_eq!(p.cell(), (2, -1));
        assert_eq!(p.fraction(), (3, 5));
        assert_eq!(SubCellPoint::from_cell(2, 1), SubCellPoint::new(16, 8));
        assert_eq!(SubCellPoint::new(12, 8).to_pixels(8, 16), (12, 16));
    }
}
