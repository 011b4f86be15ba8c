//! Frame capture
//!
//! A [`FrameSnapshot`] is an owned copy of everything the renderer needs
//! from the buffer: theme-resolved cells for the visible viewport, cursor
//! state and the scroll scalars. It is taken while the buffer lock is held
//! and diffed after the lock is released, so slow output never stalls
//! ingestion.

use crate::core::{resolve_cell, Buffer, Cell, CursorShape, Rgb, Style, UnderlineStyle};

/// Text attributes that survive color resolution. Inverse and hidden are
/// folded into the resolved colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FrameAttrs {
    pub bold: bool,
    pub faint: bool,
    pub italic: bool,
    pub underline: UnderlineStyle,
    pub blink: bool,
    pub strikethrough: bool,
}

impl FrameAttrs {
    fn from_style(style: &Style) -> Self {
        Self {
            bold: style.bold,
            faint: style.faint,
            italic: style.italic,
            underline: style.underline,
            blink: style.blink,
            strikethrough: style.strikethrough,
        }
    }

    /// Whether going from `self` to `next` turns any attribute off
    pub fn turns_off(&self, next: &FrameAttrs) -> bool {
        (self.bold && !next.bold)
            || (self.faint && !next.faint)
            || (self.italic && !next.italic)
            || (self.underline.is_set() && !next.underline.is_set())
            || (self.blink && !next.blink)
            || (self.strikethrough && !next.strikethrough)
    }
}

/// One displayed cell with concrete colors
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCell {
    pub ch: char,
    pub combining: Vec<char>,
    pub fg: Rgb,
    pub bg: Rgb,
    /// `None` when the underline follows the foreground
    pub underline_color: Option<Rgb>,
    pub attrs: FrameAttrs,
    /// Grid columns (0 for the second half of a wide character)
    pub width: u8,
    /// Columns the glyph covers when drawn
    pub visual_width: f32,
}

impl FrameCell {
    /// A blank cell in the given colors
    pub fn blank(fg: Rgb, bg: Rgb) -> Self {
        Self {
            ch: ' ',
            combining: Vec::new(),
            fg,
            bg,
            underline_color: None,
            attrs: FrameAttrs::default(),
            width: 1,
            visual_width: 1.0,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_wide(&self) -> bool {
        self.width == 2
    }

    /// Replace the glyph with a space, keeping colors and attributes
    fn blank_out(&mut self) {
        self.ch = ' ';
        self.combining.clear();
        self.width = 1;
        self.visual_width = 1.0;
    }

    /// Append the cell's text
    pub fn push_text(&self, out: &mut String) {
        out.push(self.ch);
        out.extend(self.combining.iter());
    }
}

/// Cursor as it should appear in the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCursor {
    pub col: usize,
    pub row: usize,
    pub shape: CursorShape,
    pub blinking: bool,
}

/// Owned copy of the visible buffer state
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub cols: usize,
    pub rows: usize,
    /// Row-major, `cols * rows` entries
    pub cells: Vec<FrameCell>,
    /// `None` when the cursor is hidden, scrolled away or outside the
    /// horizontal window
    pub cursor: Option<FrameCursor>,
    /// Live cursor position regardless of visibility
    pub cursor_position: (usize, usize),
    pub scroll_offset: usize,
    pub max_scroll_offset: usize,
    pub horiz_offset: usize,
    pub scrollback_len: usize,
    pub title: String,
    /// Buffer epoch; a change forces a full redraw
    pub epoch: u64,
}

impl FrameSnapshot {
    /// Copy the visible state out of a buffer
    pub fn capture(buffer: &Buffer) -> Self {
        let cols = buffer.cols();
        let rows = buffer.rows();
        let theme = buffer.theme();
        let scheme = buffer.scheme();
        let overlays = buffer.overlays();
        let blank = resolve_cell(&Cell::default(), overlays, scheme, theme);

        let mut cells = Vec::with_capacity(cols * rows);
        for y in 0..rows {
            for x in 0..cols {
                let mut cell = match buffer.visible_cell(x, y) {
                    Some(cell) => {
                        let colors = resolve_cell(cell, overlays, scheme, theme);
                        FrameCell {
                            ch: cell.ch,
                            combining: cell.combining.clone(),
                            fg: colors.fg,
                            bg: colors.bg,
                            underline_color: colors.underline,
                            attrs: FrameAttrs::from_style(&cell.style),
                            width: cell.width,
                            visual_width: cell.visual_width,
                        }
                    }
                    None => FrameCell::blank(blank.fg, blank.bg),
                };
                let selected = buffer
                    .visible_point(x, y)
                    .is_some_and(|p| buffer.is_selected(p));
                if selected {
                    std::mem::swap(&mut cell.fg, &mut cell.bg);
                }
                cells.push(cell);
            }
            split_wide_fragments(&mut cells[y * cols..]);
        }

        let c = buffer.cursor();
        let horiz = buffer.horiz_offset();
        let cursor = (c.visible
            && buffer.scroll_offset() == 0
            && c.col >= horiz
            && c.col - horiz < cols)
            .then(|| FrameCursor {
                col: c.col - horiz,
                row: c.row,
                shape: c.shape,
                blinking: c.blinking,
            });

        Self {
            cols,
            rows,
            cells,
            cursor,
            cursor_position: (c.col, c.row),
            scroll_offset: buffer.scroll_offset(),
            max_scroll_offset: buffer.max_scroll_offset(),
            horiz_offset: horiz,
            scrollback_len: buffer.scrollback().len(),
            title: buffer.title().to_string(),
            epoch: buffer.epoch(),
        }
    }

    /// Cell at a frame position
    pub fn cell(&self, col: usize, row: usize) -> Option<&FrameCell> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        self.cells.get(row * self.cols + col)
    }

    /// Plain text of one frame row, trailing blanks trimmed
    pub fn row_text(&self, row: usize) -> String {
        let mut text = String::new();
        for col in 0..self.cols {
            if let Some(cell) = self.cell(col, row) {
                if !cell.is_continuation() {
                    cell.push_text(&mut text);
                }
            }
        }
        text.trim_end().to_string()
    }
}

/// Blank out halves of wide characters the viewport cut apart: a
/// continuation whose head is scrolled off the left edge, and a head
/// whose continuation is past the right edge. Every continuation left in
/// a row directly follows its head.
fn split_wide_fragments(row: &mut [FrameCell]) {
    for x in 0..row.len() {
        let orphan = match (row[x].width, x) {
            (0, 0) => true,
            (0, _) => !row[x - 1].is_wide(),
            (2, _) => row.get(x + 1).map_or(true, |next| !next.is_continuation()),
            _ => false,
        };
        if orphan {
            row[x].blank_out();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BufferPoint, ColorScheme, SelectionKind};
    use crate::terminal::Terminal;

    #[test]
    fn test_capture_resolves_colors() {
        let mut term = Terminal::new(10, 3, 10);
        term.process(b"\x1b[31mR\x1b[7mI");
        let frame = FrameSnapshot::capture(term.buffer());
        let scheme = ColorScheme::default();

        let r = frame.cell(0, 0).unwrap();
        assert_eq!(r.ch, 'R');
        assert_eq!(r.fg, scheme.ansi[1]);
        assert_eq!(r.bg, scheme.dark_background);

        // Inverse swaps the resolved colors
        let i = frame.cell(1, 0).unwrap();
        assert_eq!(i.fg, scheme.dark_background);
        assert_eq!(i.bg, scheme.ansi[1]);

        assert_eq!(frame.cells.len(), 30);
    }

    #[test]
    fn test_capture_cursor_hidden_when_scrolled() {
        let mut term = Terminal::new(10, 2, 10);
        term.process(b"a\r\nb\r\nc");
        let frame = FrameSnapshot::capture(term.buffer());
        assert_eq!(frame.cursor.map(|c| (c.col, c.row)), Some((1, 1)));

        term.buffer_mut().set_scroll_offset(1);
        let frame = FrameSnapshot::capture(term.buffer());
        assert!(frame.cursor.is_none());
        assert_eq!(frame.row_text(0), "a");

        term.process(b"\x1b[?25l");
        term.buffer_mut().set_scroll_offset(0);
        assert!(FrameSnapshot::capture(term.buffer()).cursor.is_none());
    }

    #[test]
    fn test_capture_marks_selection() {
        let mut term = Terminal::new(10, 2, 10);
        term.process(b"hello");
        let row = term.buffer().viewport().live_origin();
        let buffer = term.buffer_mut();
        buffer.start_selection(BufferPoint::new(0, row), SelectionKind::Normal);
        buffer.update_selection(BufferPoint::new(1, row));
        let frame = FrameSnapshot::capture(term.buffer());
        let plain = frame.cell(2, 0).unwrap();
        let selected = frame.cell(0, 0).unwrap();
        assert_eq!(selected.fg, plain.bg);
        assert_eq!(selected.bg, plain.fg);
    }

    #[test]
    fn test_capture_blanks_wide_fragments_at_viewport_edges() {
        let mut term = Terminal::new(10, 1, 0);
        term.process("a世bcdefg".as_bytes());
        term.resize(4, 1);

        let frame = FrameSnapshot::capture(term.buffer());
        assert!(frame.cell(1, 0).unwrap().is_wide());
        assert!(frame.cell(2, 0).unwrap().is_continuation());
        assert_eq!(frame.row_text(0), "a世b");

        // Head scrolled off the left edge
        term.buffer_mut().set_horiz_offset(2);
        let frame = FrameSnapshot::capture(term.buffer());
        let first = frame.cell(0, 0).unwrap();
        assert_eq!((first.ch, first.width), (' ', 1));
        assert_eq!(frame.row_text(0), " bcd");

        // Continuation past the right edge
        let mut term = Terminal::new(10, 1, 0);
        term.process("abc世".as_bytes());
        term.resize(4, 1);
        let frame = FrameSnapshot::capture(term.buffer());
        let last = frame.cell(3, 0).unwrap();
        assert_eq!((last.ch, last.width), (' ', 1));
        assert_eq!(frame.row_text(0), "abc");
    }
}
