//! Text selection
//!
//! Selections are stored in buffer-absolute coordinates so they stay
//! anchored to the same content while the viewport scrolls and while rows
//! move from the live grid into scrollback.

use serde::{Deserialize, Serialize};

use super::coords::BufferPoint;

/// Selection type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionKind {
    /// Character-level selection (default)
    #[default]
    Normal,
    /// Word-level selection (double-click)
    Word,
    /// Line-level selection (triple-click)
    Line,
    /// Block/rectangular selection (Alt+drag)
    Block,
}

/// Represents a text selection in the terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Anchor point (where the selection started)
    start: BufferPoint,
    /// Moving end point
    end: BufferPoint,
    kind: SelectionKind,
    /// Whether the selection is still being extended
    active: bool,
}

impl Selection {
    /// Create a new selection starting at the given point
    pub fn new(start: BufferPoint, kind: SelectionKind) -> Self {
        Self {
            start,
            end: start,
            kind,
            active: true,
        }
    }

    /// Update the end point of the selection
    pub fn update(&mut self, end: BufferPoint) {
        self.end = end;
    }

    /// Finish the selection (mouse released)
    pub fn finish(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn kind(&self) -> SelectionKind {
        self.kind
    }

    pub fn start(&self) -> BufferPoint {
        self.start
    }

    pub fn end(&self) -> BufferPoint {
        self.end
    }

    /// Replace both endpoints (used when clamping after a resize)
    pub fn set_points(&mut self, start: BufferPoint, end: BufferPoint) {
        self.start = start;
        self.end = end;
    }

    /// Get the normalized start and end points (start is always before end)
    pub fn normalized(&self) -> (BufferPoint, BufferPoint) {
        if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        }
    }

    /// Check if the cell at `p` is within the selection
    pub fn contains(&self, p: BufferPoint) -> bool {
        self.col_range(p.row, usize::MAX)
            .is_some_and(|(first, last)| p.col >= first && p.col <= last)
    }

    /// Get the range of rows covered by the selection
    pub fn row_range(&self) -> (u64, u64) {
        let (start, end) = self.normalized();
        (start.row, end.row)
    }

    /// Get the inclusive column range selected on `row`, given the
    /// row's last column
    pub fn col_range(&self, row: u64, last_col: usize) -> Option<(usize, usize)> {
        let (start, end) = self.normalized();

        if row < start.row || row > end.row {
            return None;
        }

        match self.kind {
            SelectionKind::Normal | SelectionKind::Word => {
                if row == start.row && row == end.row {
                    Some((start.col, end.col))
                } else if row == start.row {
                    Some((start.col, last_col))
                } else if row == end.row {
                    Some((0, end.col))
                } else {
                    Some((0, last_col))
                }
            }
            SelectionKind::Line => Some((0, last_col)),
            SelectionKind::Block => {
                let min_col = self.start.col.min(self.end.col);
                let max_col = self.start.col.max(self.end.col);
                Some((min_col, max_col))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(col: usize, row: u64) -> BufferPoint {
        BufferPoint::new(col, row)
    }

    #[test]
    fn test_selection_normalized() {
        let mut sel = Selection::new(p(5, 10), SelectionKind::Normal);
        sel.update(p(2, 3));
        assert_eq!(sel.normalized(), (p(2, 3), p(5, 10)));
    }

    #[test]
    fn test_selection_contains_normal() {
        let mut sel = Selection::new(p(5, 1), SelectionKind::Normal);
        sel.update(p(3, 3));

        assert!(!sel.contains(p(4, 1)));
        assert!(sel.contains(p(5, 1)));
        assert!(sel.contains(p(70, 2)));
        assert!(sel.contains(p(3, 3)));
        assert!(!sel.contains(p(4, 3)));
        assert!(!sel.contains(p(0, 4)));
    }

    #[test]
    fn test_selection_contains_block() {
        let mut sel = Selection::new(p(8, 1), SelectionKind::Block);
        sel.update(p(2, 4));

        assert!(sel.contains(p(5, 2)));
        assert!(!sel.contains(p(9, 2)));
        assert_eq!(sel.col_range(3, 79), Some((2, 8)));
    }

    #[test]
    fn test_selection_line_range() {
        let mut sel = Selection::new(p(5, 7), SelectionKind::Line);
        sel.update(p(1, 8));
        assert_eq!(sel.col_range(7, 79), Some((0, 79)));
        assert_eq!(sel.col_range(9, 79), None);
        assert_eq!(sel.row_range(), (7, 8));
    }

    #[test]
    fn test_selection_finish() {
        let mut sel = Selection::new(p(0, 0), SelectionKind::Normal);
        assert!(sel.is_active());
        sel.finish();
        assert!(!sel.is_active());
    }
}
