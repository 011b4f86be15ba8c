//! Scrollback buffer implementation
//!
//! The scrollback buffer stores lines that have scrolled off the top of the
//! visible screen. It's implemented as a ring buffer with a configurable
//! maximum size. Every line that leaves the ring (overflow, shrink or clear)
//! is counted so buffer-absolute row numbers stay stable.

use serde::{Deserialize, Serialize};

use super::cell::{Cell, Color};

/// A line in the terminal, consisting of cells and metadata.
///
/// A line may hold more cells than the current column count after the
/// grid was narrowed; the extra cells are reachable through the
/// horizontal offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// The cells in this line
    pub cells: Vec<Cell>,
    /// Whether this line was soft-wrapped onto the next line
    pub wrapped: bool,
}

impl Line {
    /// Create a new line with the given number of columns
    pub fn new(cols: usize) -> Self {
        Self {
            cells: vec![Cell::default(); cols],
            wrapped: false,
        }
    }

    /// Create a blank line whose cells carry a background color
    pub fn blank(cols: usize, bg: Color) -> Self {
        Self {
            cells: vec![Cell::blank(bg); cols],
            wrapped: false,
        }
    }

    /// Create a line from existing cells
    pub fn from_cells(cells: Vec<Cell>, wrapped: bool) -> Self {
        Self { cells, wrapped }
    }

    /// Grow the line to at least `cols` cells. Never truncates.
    pub fn ensure_len(&mut self, cols: usize) {
        if cols > self.cells.len() {
            self.cells.resize(cols, Cell::default());
        }
    }

    /// Drop cells beyond `cols`
    pub fn truncate(&mut self, cols: usize) {
        self.cells.truncate(cols);
    }

    /// Clear all cells in the line
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.wrapped = false;
    }

    /// Get a cell at the given column
    pub fn get(&self, col: usize) -> Option<&Cell> {
        self.cells.get(col)
    }

    /// Get a mutable cell at the given column
    pub fn get_mut(&mut self, col: usize) -> Option<&mut Cell> {
        self.cells.get_mut(col)
    }

    /// Check if the line is empty (all cells are blank)
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.is_blank())
    }

    /// Get the rightmost non-blank column (for selection/copy)
    pub fn last_non_empty(&self) -> Option<usize> {
        self.cells
            .iter()
            .enumerate()
            .rev()
            .find(|(_, c)| !c.is_blank())
            .map(|(i, _)| i)
    }

    /// Number of columns holding content
    pub fn content_len(&self) -> usize {
        self.last_non_empty().map_or(0, |i| i + 1)
    }

    /// Extract text from a column range, skipping continuation cells.
    /// Trailing spaces are trimmed.
    pub fn text_range(&self, start: usize, end: usize) -> String {
        let mut s = String::new();
        let end = end.min(self.cells.len());
        for cell in self.cells.iter().take(end).skip(start) {
            if cell.is_continuation() {
                continue; // Skip continuation cells for wide chars
            }
            s.push(cell.ch);
            s.extend(cell.combining.iter());
        }
        s.trim_end().to_string()
    }

    /// Extract text content from the line
    pub fn to_text(&self) -> String {
        self.text_range(0, self.cells.len())
    }
}

/// Ring buffer for scrollback lines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scrollback {
    /// The lines in the scrollback buffer
    lines: Vec<Line>,
    /// Index of the oldest line (head of ring buffer)
    head: usize,
    /// Number of lines currently in the buffer
    len: usize,
    /// Maximum number of lines to store
    capacity: usize,
    /// Lines that have left the buffer since creation
    evicted: u64,
}

impl Scrollback {
    /// Create a new scrollback buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Vec::with_capacity(capacity.min(1000)), // Don't pre-allocate too much
            head: 0,
            len: 0,
            capacity,
            evicted: 0,
        }
    }

    /// Get the number of lines in the scrollback
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the scrollback is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the maximum capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of lines dropped from the front of the history
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Push a line into the scrollback buffer, dropping the oldest line
    /// when full
    pub fn push(&mut self, line: Line) {
        if self.capacity == 0 {
            self.evicted += 1;
            return;
        }

        if self.lines.len() < self.capacity {
            // Ring not yet allocated to capacity; the live region is
            // always lines[0..len] with head == 0 here
            self.lines.push(line);
            self.len += 1;
        } else {
            // Buffer full, overwrite oldest
            let idx = (self.head + self.len) % self.capacity;
            self.lines[idx] = line;
            if self.len < self.capacity {
                self.len += 1;
            } else {
                // Move head forward (oldest line is overwritten)
                self.head = (self.head + 1) % self.capacity;
                self.evicted += 1;
            }
        }
    }

    /// Get a line by index (0 = oldest line in scrollback)
    pub fn get(&self, index: usize) -> Option<&Line> {
        if index >= self.len {
            return None;
        }
        let actual_idx = (self.head + index) % self.lines.len();
        self.lines.get(actual_idx)
    }

    /// Get a line by index from the end (0 = most recent line)
    pub fn get_from_end(&self, index: usize) -> Option<&Line> {
        if index >= self.len {
            return None;
        }
        self.get(self.len - 1 - index)
    }

    /// Clear all lines from the scrollback
    pub fn clear(&mut self) {
        self.evicted += self.len as u64;
        self.lines.clear();
        self.head = 0;
        self.len = 0;
    }

    /// Iterate over all lines from oldest to newest
    pub fn iter(&self) -> ScrollbackIter<'_> {
        ScrollbackIter {
            scrollback: self,
            index: 0,
        }
    }

    /// Set a new capacity, dropping the oldest lines if shrinking
    pub fn set_capacity(&mut self, new_capacity: usize) {
        if new_capacity == self.capacity {
            return;
        }

        if new_capacity == 0 {
            self.clear();
            self.capacity = 0;
            return;
        }

        // Linearize so the ring invariant (head == 0 while growing) holds
        let keep = self.len.min(new_capacity);
        let start = self.len - keep;
        let new_lines: Vec<Line> = (start..self.len)
            .filter_map(|i| self.get(i).cloned())
            .collect();
        self.evicted += start as u64;
        self.lines = new_lines;
        self.head = 0;
        self.len = keep;
        self.capacity = new_capacity;
    }
}

/// Iterator over scrollback lines
pub struct ScrollbackIter<'a> {
    scrollback: &'a Scrollback,
    index: usize,
}

impl<'a> Iterator for ScrollbackIter<'a> {
    type Item = &'a Line;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.scrollback.get(self.index)?;
        self.index += 1;
        Some(line)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.scrollback.len.saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ScrollbackIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(i: usize) -> Line {
        let mut line = Line::new(10);
        line.cells[0].ch = char::from_digit((i % 10) as u32, 10).unwrap();
        line
    }

    #[test]
    fn test_line_new() {
        let line = Line::new(80);
        assert_eq!(line.cells.len(), 80);
        assert!(!line.wrapped);
        assert!(line.is_empty());
    }

    #[test]
    fn test_line_ensure_len_never_truncates() {
        let mut line = Line::new(80);
        line.ensure_len(40);
        assert_eq!(line.cells.len(), 80);
        line.ensure_len(100);
        assert_eq!(line.cells.len(), 100);
    }

    #[test]
    fn test_line_to_text() {
        let mut line = Line::new(10);
        line.cells[0].ch = 'H';
        line.cells[1].ch = 'i';
        assert_eq!(line.to_text(), "Hi");
        assert_eq!(line.text_range(1, 5), "i");
    }

    #[test]
    fn test_line_text_skips_continuation() {
        let mut line = Line::new(4);
        line.cells[0].ch = '中';
        line.cells[0].width = 2;
        line.cells[1].width = 0;
        line.cells[2].ch = 'x';
        assert_eq!(line.to_text(), "中x");
    }

    #[test]
    fn test_line_last_non_empty() {
        let mut line = Line::new(10);
        assert_eq!(line.last_non_empty(), None);
        assert_eq!(line.content_len(), 0);
        line.cells[3].ch = 'X';
        assert_eq!(line.last_non_empty(), Some(3));
        line.cells[7].ch = 'Y';
        assert_eq!(line.content_len(), 8);
    }

    #[test]
    fn test_scrollback_push_and_get() {
        let mut sb = Scrollback::new(5);
        assert!(sb.is_empty());

        for i in 0..3 {
            sb.push(numbered(i));
        }

        assert_eq!(sb.len(), 3);
        assert_eq!(sb.get(0).unwrap().cells[0].ch, '0');
        assert_eq!(sb.get(2).unwrap().cells[0].ch, '2');
        assert_eq!(sb.evicted(), 0);
    }

    #[test]
    fn test_scrollback_ring_buffer() {
        let mut sb = Scrollback::new(3);

        // Push 5 lines into a buffer of capacity 3
        for i in 0..5 {
            sb.push(numbered(i));
        }

        // Should only have the last 3 lines (2, 3, 4)
        assert_eq!(sb.len(), 3);
        assert_eq!(sb.evicted(), 2);
        assert_eq!(sb.get(0).unwrap().cells[0].ch, '2');
        assert_eq!(sb.get(1).unwrap().cells[0].ch, '3');
        assert_eq!(sb.get(2).unwrap().cells[0].ch, '4');
    }

    #[test]
    fn test_scrollback_get_from_end() {
        let mut sb = Scrollback::new(5);
        for i in 0..3 {
            sb.push(numbered(i));
        }

        assert_eq!(sb.get_from_end(0).unwrap().cells[0].ch, '2');
        assert_eq!(sb.get_from_end(2).unwrap().cells[0].ch, '0');
        assert!(sb.get_from_end(3).is_none());
    }

    #[test]
    fn test_scrollback_iter() {
        let mut sb = Scrollback::new(5);
        for i in 0..3 {
            sb.push(numbered(i));
        }

        let chars: Vec<char> = sb.iter().map(|l| l.cells[0].ch).collect();
        assert_eq!(chars, vec!['0', '1', '2']);
    }

    #[test]
    fn test_scrollback_zero_capacity() {
        let mut sb = Scrollback::new(0);
        sb.push(Line::new(10));
        assert!(sb.is_empty());
        assert_eq!(sb.evicted(), 1);
    }

    #[test]
    fn test_scrollback_clear_counts_evictions() {
        let mut sb = Scrollback::new(5);
        for i in 0..4 {
            sb.push(numbered(i));
        }
        sb.clear();
        assert!(sb.is_empty());
        assert_eq!(sb.evicted(), 4);
    }

    #[test]
    fn test_scrollback_set_capacity() {
        let mut sb = Scrollback::new(10);
        for i in 0..5 {
            sb.push(numbered(i));
        }

        // Shrink to 3 - should keep lines 2, 3, 4
        sb.set_capacity(3);
        assert_eq!(sb.len(), 3);
        assert_eq!(sb.evicted(), 2);
        assert_eq!(sb.get(0).unwrap().cells[0].ch, '2');

        // Pushing after a shrink keeps FIFO order
        sb.push(numbered(5));
        let chars: Vec<char> = sb.iter().map(|l| l.cells[0].ch).collect();
        assert_eq!(chars, vec!['3', '4', '5']);
    }

    #[test]
    fn test_scrollback_grow_after_wrap() {
        let mut sb = Scrollback::new(3);
        for i in 0..5 {
            sb.push(numbered(i));
        }
        sb.set_capacity(5);
        sb.push(numbered(5));
        let chars: Vec<char> = sb.iter().map(|l| l.cells[0].ch).collect();
        assert_eq!(chars, vec!['2', '3', '4', '5']);
    }
}
