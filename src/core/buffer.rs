//! Terminal buffer
//!
//! The buffer owns everything a terminal displays: the live grid (primary
//! and alternate), the scrollback ring, the cursor and pen, the viewport
//! offsets into history, the selection, the overlay registries and the
//! theme. It never renders. Every mutation that could change the picture
//! sets the dirty flag; the first one after the flag was taken also posts
//! [`Event::Dirty`] on the registered channel so a render loop can wake up.
//!
//! Rows are addressed in three ways. Live rows are indices into the grid.
//! Viewport rows are what the user sees after the scroll offset. Buffer-
//! absolute rows (see [`BufferPoint`]) never change meaning while content
//! moves from the grid into scrollback and out of it.

use std::sync::mpsc::{SyncSender, TrySendError};

use tracing::{debug, trace};

use super::cell::Cell;
use super::coords::{BufferPoint, RowLocation, ScreenPoint, SubCellPoint, Viewport, ViewportPoint};
use super::cursor::{Bounds, Cursor, CursorShape, SavedCursor};
use super::modes::{AnsiMode, DecMode, Modes};
use super::overlay::{
    CropRect, GlyphBitmap, OverlayError, Overlays, Palette, ScreenSplit, Sprite,
};
use super::scrollback::{Line, Scrollback};
use super::selection::{Selection, SelectionKind};
use super::theme::{ColorScheme, Theme};
use super::width::{AmbiguousWidth, WidthMode, WidthPolicy};
use crate::event::Event;

const TAB_WIDTH: usize = 8;

fn default_tab_stops(cols: usize) -> Vec<bool> {
    (0..cols).map(|i| i > 0 && i % TAB_WIDTH == 0).collect()
}

/// Signed step for a relative cursor move; a count of 0 moves by 1
fn step(n: usize) -> isize {
    isize::try_from(n.max(1)).unwrap_or(isize::MAX)
}

fn blank_grid(cols: usize, rows: usize) -> Vec<Line> {
    (0..rows).map(|_| Line::new(cols)).collect()
}

/// Characters that belong to a word for double-click selection
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '~')
}

/// The terminal buffer
#[derive(Debug)]
pub struct Buffer {
    cols: usize,
    rows: usize,
    primary: Vec<Line>,
    alternate: Vec<Line>,
    on_alternate: bool,
    scrollback: Scrollback,
    cursor: Cursor,
    saved_primary: SavedCursor,
    saved_alternate: SavedCursor,
    /// Scroll region top (inclusive)
    scroll_top: usize,
    /// Scroll region bottom (inclusive)
    scroll_bottom: usize,
    tab_stops: Vec<bool>,
    modes: Modes,
    width: WidthPolicy,
    /// Width policy restored by a full reset
    base_width: WidthPolicy,
    /// Cursor style restored by a full reset
    base_cursor: (CursorShape, bool),
    scroll_offset: usize,
    horiz_offset: usize,
    selection: Option<Selection>,
    overlays: Overlays,
    theme: Theme,
    scheme: ColorScheme,
    title: String,
    /// Last printed character, for REP
    last_printed: Option<char>,
    dirty: bool,
    /// Whether `Event::Dirty` was posted since the flag was last taken
    notified: bool,
    events: Option<SyncSender<Event>>,
    /// Bumped whenever cached frames become meaningless (resize, offsets,
    /// screen switch)
    epoch: u64,
}

impl Buffer {
    /// Create a buffer with the given size and scrollback capacity.
    /// Zero dimensions are raised to 1.
    pub fn new(cols: usize, rows: usize, scrollback_capacity: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            primary: blank_grid(cols, rows),
            alternate: blank_grid(cols, rows),
            on_alternate: false,
            scrollback: Scrollback::new(scrollback_capacity),
            cursor: Cursor::new(),
            saved_primary: SavedCursor::default(),
            saved_alternate: SavedCursor::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            tab_stops: default_tab_stops(cols),
            modes: Modes::default(),
            width: WidthPolicy::default(),
            base_width: WidthPolicy::default(),
            base_cursor: (CursorShape::Block, true),
            scroll_offset: 0,
            horiz_offset: 0,
            selection: None,
            overlays: Overlays::default(),
            theme: Theme::default(),
            scheme: ColorScheme::default(),
            title: String::new(),
            last_printed: None,
            dirty: true,
            notified: false,
            events: None,
            epoch: 0,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn grid(&self) -> &Vec<Line> {
        if self.on_alternate {
            &self.alternate
        } else {
            &self.primary
        }
    }

    fn grid_mut(&mut self) -> &mut Vec<Line> {
        if self.on_alternate {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Mutable cursor access. Position changes made through this are not
    /// clamped; prefer [`Buffer::set_cursor`].
    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    pub fn scrollback(&self) -> &Scrollback {
        &self.scrollback
    }

    pub fn modes(&self) -> &Modes {
        &self.modes
    }

    pub fn width_policy(&self) -> WidthPolicy {
        self.width
    }

    /// Set the width policy, also making it the one restored by a reset
    pub fn set_width_policy(&mut self, policy: WidthPolicy) {
        self.width = policy;
        self.base_width = policy;
    }

    /// Set the cursor style, also making it the one restored by a reset
    pub fn set_default_cursor_style(&mut self, shape: CursorShape, blinking: bool) {
        self.base_cursor = (shape, blinking);
        self.set_cursor_style(shape, blinking);
    }

    pub fn set_cursor_style(&mut self, shape: CursorShape, blinking: bool) {
        self.cursor.shape = shape;
        self.cursor.blinking = blinking;
        self.mark_dirty();
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    pub fn scroll_bottom(&self) -> usize {
        self.scroll_bottom
    }

    fn bounds(&self) -> Bounds {
        Bounds::new(self.cols, self.rows).with_margins(self.scroll_top, self.scroll_bottom)
    }

    pub fn is_alternate(&self) -> bool {
        self.on_alternate
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: String) {
        if self.title != title {
            self.title = title.clone();
            self.emit(Event::TitleChanged(title));
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn set_theme(&mut self, theme: Theme) {
        if self.theme != theme {
            self.theme = theme;
            self.mark_dirty();
        }
    }

    pub fn scheme(&self) -> &ColorScheme {
        &self.scheme
    }

    pub fn set_scheme(&mut self, scheme: ColorScheme) {
        self.scheme = scheme;
        self.mark_dirty();
    }

    pub fn overlays(&self) -> &Overlays {
        &self.overlays
    }

    /// Monotonic counter bumped by resize, offset changes and screen switches.
    /// A full reset leaves it alone; the renderer's cell cache already
    /// covers a cleared screen.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Scalar view state for coordinate conversions
    pub fn viewport(&self) -> Viewport {
        Viewport {
            cols: self.cols,
            rows: self.rows,
            scrollback_len: self.scrollback.len(),
            evicted: self.scrollback.evicted(),
            scroll_offset: self.scroll_offset,
            horiz_offset: self.horiz_offset,
        }
    }

    /// A live grid line
    pub fn line(&self, row: usize) -> Option<&Line> {
        self.grid().get(row)
    }

    /// A live grid cell
    pub fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        self.line(row).and_then(|line| line.get(col))
    }

    /// The line at a buffer-absolute row, from history or the live grid.
    /// Evicted rows return `None`.
    pub fn line_at(&self, row: u64) -> Option<&Line> {
        match self.viewport().locate(row) {
            RowLocation::History(i) => self.scrollback.get(i),
            RowLocation::Live(i) => self.grid().get(i),
            RowLocation::Evicted | RowLocation::Beyond => None,
        }
    }

    /// Text of the live grid, one line per row
    pub fn screen_text(&self) -> String {
        self.grid()
            .iter()
            .map(|line| line.text_range(0, self.cols))
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ---- dirty tracking and events ----

    /// Register the channel that receives [`Event`]s. Events that do not
    /// fit in the channel are dropped; the buffer never blocks on it.
    pub fn set_event_sender(&mut self, sender: SyncSender<Event>) {
        self.events = Some(sender);
        self.notified = false;
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => trace!(?event, "event queue full, dropped"),
                Err(TrySendError::Disconnected(_)) => trace!("event receiver dropped"),
            }
        }
    }

    /// Flag that the picture may have changed
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        if !self.notified {
            self.notified = true;
            self.emit(Event::Dirty);
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag, returning its previous value. The next
    /// mutation posts a fresh `Event::Dirty`.
    pub fn take_dirty(&mut self) -> bool {
        let was = self.dirty;
        self.dirty = false;
        self.notified = false;
        was
    }

    pub fn bell(&mut self) {
        self.emit(Event::Bell);
    }

    // ---- writing ----

    /// The cell before `col` on `row`, stepping over a continuation cell
    fn preceding_cell(&self, row: usize, col: usize) -> Option<&Cell> {
        let line = self.grid().get(row)?;
        let prev = line.get(col.checked_sub(1)?)?;
        if prev.is_continuation() {
            line.get(col.checked_sub(2)?)
        } else {
            Some(prev)
        }
    }

    /// Print a character at the cursor with the current pen
    pub fn print(&mut self, c: char) {
        let measure = {
            let prev = if self.cursor.pending_wrap {
                None
            } else {
                self.preceding_cell(self.cursor.row, self.cursor.col)
            };
            self.width.measure(c, prev)
        };

        if measure.columns == 0 {
            self.attach_combining(c);
            return;
        }
        self.last_printed = Some(c);

        if self.cursor.pending_wrap && self.cursor.autowrap {
            self.wrap();
        }

        let cols = self.cols;
        let columns = measure.columns.min(cols);

        // A wide character never straddles the right margin
        if columns == 2 && self.cursor.col + 1 >= cols {
            if self.cursor.autowrap {
                let (row, col, bg) = (self.cursor.row, self.cursor.col, self.cursor.pen.bg);
                self.fix_wide_fragments(row, col, 1);
                if let Some(cell) = self.grid_mut().get_mut(row).and_then(|l| l.get_mut(col)) {
                    cell.erase(bg);
                }
                self.wrap();
            } else {
                self.cursor.col = cols - 2;
            }
        }

        let (row, col) = (self.cursor.row, self.cursor.col);
        if self.cursor.insert_mode {
            self.insert_blank_cells(row, col, columns);
        }
        self.fix_wide_fragments(row, col, columns);

        let pen = self.cursor.pen;
        let mut cell = Cell::with_pen(c, &pen);
        cell.width = columns as u8;
        cell.visual_width = measure.visual;
        if let Some(line) = self.grid_mut().get_mut(row) {
            if let Some(slot) = line.cells.get_mut(col) {
                *slot = cell;
            }
            if columns == 2 {
                if let Some(slot) = line.cells.get_mut(col + 1) {
                    let mut continuation = Cell::with_pen(' ', &pen);
                    continuation.width = 0;
                    *slot = continuation;
                }
            }
        }

        let next = col + columns;
        if next >= cols {
            self.cursor.col = cols - 1;
            self.cursor.pending_wrap = self.cursor.autowrap;
        } else {
            self.cursor.col = next;
        }
        self.mark_dirty();
    }

    /// Attach a zero-width character to the previously written cell
    fn attach_combining(&mut self, c: char) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let target = if self.cursor.pending_wrap {
            Some(col)
        } else {
            col.checked_sub(1)
        };
        let Some(mut target) = target else {
            return;
        };
        if let Some(line) = self.grid_mut().get_mut(row) {
            if target > 0 && line.get(target).is_some_and(|cell| cell.is_continuation()) {
                target -= 1;
            }
            if let Some(cell) = line.get_mut(target) {
                cell.push_combining(c);
            }
        }
        self.mark_dirty();
    }

    /// Repeat the last printed character `n` times (REP)
    pub fn repeat_last(&mut self, n: usize) {
        if let Some(c) = self.last_printed {
            let n = n.min(self.cols * self.rows);
            for _ in 0..n {
                self.print(c);
            }
        }
    }

    /// Blank the other half of any wide character that `[col, col + n)`
    /// cuts through
    fn fix_wide_fragments(&mut self, row: usize, col: usize, n: usize) {
        let Some(line) = self.grid_mut().get_mut(row) else {
            return;
        };
        if line.get(col).is_some_and(|cell| cell.is_continuation()) && col > 0 {
            if let Some(head) = line.get_mut(col - 1) {
                *head = Cell::blank(head.bg);
            }
        }
        let last = col + n.max(1) - 1;
        if line.get(last).is_some_and(|cell| cell.width == 2) {
            if let Some(tail) = line.get_mut(last + 1) {
                if tail.is_continuation() {
                    *tail = Cell::blank(tail.bg);
                }
            }
        }
    }

    /// Overwrite one live grid cell. Out-of-range positions are ignored.
    pub fn write_cell(&mut self, col: usize, row: usize, cell: Cell) {
        if col >= self.cols || row >= self.rows {
            return;
        }
        if let Some(slot) = self.grid_mut().get_mut(row).and_then(|l| l.get_mut(col)) {
            *slot = cell;
        }
        self.mark_dirty();
    }

    /// Move the cursor to an absolute live position, clamped to the grid
    pub fn set_cursor(&mut self, col: usize, row: usize) {
        let bounds = self.bounds();
        self.cursor.move_to(col, row, bounds);
        self.mark_dirty();
    }

    pub fn set_cursor_visible(&mut self, visible: bool) {
        if self.cursor.visible != visible {
            self.cursor.visible = visible;
            self.mark_dirty();
        }
    }

    // ---- line movement ----

    fn wrap(&mut self) {
        let row = self.cursor.row;
        if let Some(line) = self.grid_mut().get_mut(row) {
            line.wrapped = true;
        }
        self.cursor.col = 0;
        self.index();
    }

    /// IND: move down one row, scrolling at the bottom margin
    pub fn index(&mut self) {
        self.cursor.pending_wrap = false;
        if self.cursor.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
        self.mark_dirty();
    }

    /// LF (also CR when LNM is set)
    pub fn linefeed(&mut self) {
        self.index();
        if self.modes.linefeed_newline {
            self.cursor.carriage_return();
        }
    }

    /// NEL
    pub fn next_line(&mut self) {
        self.index();
        self.cursor.carriage_return();
    }

    /// RI: move up one row, scrolling down at the top margin
    pub fn reverse_index(&mut self) {
        self.cursor.pending_wrap = false;
        if self.cursor.row == self.scroll_top {
            self.scroll_down(1);
        } else if self.cursor.row > 0 {
            self.cursor.row -= 1;
        }
        self.mark_dirty();
    }

    pub fn carriage_return(&mut self) {
        self.cursor.carriage_return();
        self.mark_dirty();
    }

    pub fn backspace(&mut self) {
        let bounds = self.bounds();
        self.cursor.move_horizontal(-1, bounds);
        self.mark_dirty();
    }

    /// Advance to the `n`th next tab stop (HT, CHT)
    pub fn tab(&mut self, n: usize) {
        self.cursor.pending_wrap = false;
        let last = self.cols - 1;
        for _ in 0..n.max(1) {
            let col = self.cursor.col;
            self.cursor.col = (col + 1..self.cols)
                .find(|&i| self.tab_stops.get(i).copied().unwrap_or(false))
                .unwrap_or(last);
        }
        self.mark_dirty();
    }

    /// Move back to the `n`th previous tab stop (CBT)
    pub fn back_tab(&mut self, n: usize) {
        self.cursor.pending_wrap = false;
        for _ in 0..n.max(1) {
            let col = self.cursor.col;
            self.cursor.col = (0..col)
                .rev()
                .find(|&i| self.tab_stops.get(i).copied().unwrap_or(false))
                .unwrap_or(0);
        }
        self.mark_dirty();
    }

    pub fn set_tab_stop(&mut self) {
        let col = self.cursor.col;
        if let Some(stop) = self.tab_stops.get_mut(col) {
            *stop = true;
        }
    }

    pub fn clear_tab_stop(&mut self) {
        let col = self.cursor.col;
        if let Some(stop) = self.tab_stops.get_mut(col) {
            *stop = false;
        }
    }

    pub fn clear_all_tab_stops(&mut self) {
        self.tab_stops.iter_mut().for_each(|t| *t = false);
    }

    // ---- scrolling ----

    /// Move the rows `top..=bottom` up by `n`, filling the bottom with
    /// blank rows in the current background. Rows that leave the top go to
    /// scrollback when `into_history` is set and the primary screen is active.
    fn scroll_region_up(&mut self, top: usize, bottom: usize, n: usize, into_history: bool) {
        if top > bottom || bottom >= self.rows {
            return;
        }
        let n = n.min(bottom - top + 1);
        if n == 0 {
            return;
        }
        let cols = self.cols;
        let bg = self.cursor.pen.bg;
        let into_history = into_history && !self.on_alternate;

        let grid = self.grid_mut();
        let removed: Vec<Line> = grid.drain(top..top + n).collect();
        let at = bottom + 1 - n;
        grid.splice(at..at, (0..n).map(|_| Line::blank(cols, bg)));

        if into_history {
            for line in removed {
                self.push_history(line);
            }
        }
        self.mark_dirty();
    }

    /// Move the rows `top..=bottom` down by `n`, filling the top with blanks
    fn scroll_region_down(&mut self, top: usize, bottom: usize, n: usize) {
        if top > bottom || bottom >= self.rows {
            return;
        }
        let n = n.min(bottom - top + 1);
        if n == 0 {
            return;
        }
        let cols = self.cols;
        let bg = self.cursor.pen.bg;

        let grid = self.grid_mut();
        grid.drain(bottom + 1 - n..=bottom);
        grid.splice(top..top, (0..n).map(|_| Line::blank(cols, bg)));
        self.mark_dirty();
    }

    /// Push a row into history. A viewport looking at history stays on
    /// the same content.
    fn push_history(&mut self, line: Line) {
        let anchored = self.scroll_offset > 0;
        self.scrollback.push(line);
        if anchored {
            self.scroll_offset = (self.scroll_offset + 1).min(self.scrollback.len());
        }
    }

    /// SU: scroll the scroll region up
    pub fn scroll_up(&mut self, n: usize) {
        let (top, bottom) = (self.scroll_top, self.scroll_bottom);
        self.scroll_region_up(top, bottom, n, top == 0);
    }

    /// SD: scroll the scroll region down
    pub fn scroll_down(&mut self, n: usize) {
        let (top, bottom) = (self.scroll_top, self.scroll_bottom);
        self.scroll_region_down(top, bottom, n);
    }

    /// Scroll the whole screen up by `n`, moving the top rows into history
    /// (the alternate screen has no history)
    pub fn scroll_up_into_history(&mut self, n: usize) {
        let bottom = self.rows - 1;
        self.scroll_region_up(0, bottom, n, true);
    }

    /// DECSTBM with 0-indexed inclusive bounds. An empty region resets to
    /// the full screen. Homes the cursor.
    pub fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let last = self.rows - 1;
        let (top, bottom) = (top.min(last), bottom.min(last));
        if top < bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        } else {
            self.scroll_top = 0;
            self.scroll_bottom = last;
        }
        let bounds = self.bounds();
        self.cursor.home(bounds);
        self.mark_dirty();
    }

    pub fn reset_scroll_region(&mut self) {
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
    }

    // ---- erasing and editing ----

    /// Erase `[start, end)` of a live row with the current background.
    /// `None` erases to the end of the line and drops any overflow cells
    /// kept from a wider grid.
    fn erase_cells(&mut self, row: usize, start: usize, end: Option<usize>) {
        let cols = self.cols;
        let bg = self.cursor.pen.bg;
        let span = match end {
            Some(end) => end.saturating_sub(start),
            None => cols.saturating_sub(start),
        };
        self.fix_wide_fragments(row, start, span);
        let Some(line) = self.grid_mut().get_mut(row) else {
            return;
        };
        let end = match end {
            Some(end) => end.min(line.cells.len()),
            None => {
                line.truncate(cols);
                line.cells.len()
            }
        };
        for cell in line.cells.iter_mut().take(end).skip(start) {
            cell.erase(bg);
        }
        self.mark_dirty();
    }

    /// ED: 0 below, 1 above, 2 whole screen, 3 scrollback only
    pub fn erase_in_display(&mut self, mode: u32) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        match mode {
            0 => {
                self.erase_cells(row, col, None);
                for r in row + 1..self.rows {
                    self.erase_cells(r, 0, None);
                }
            }
            1 => {
                for r in 0..row {
                    self.erase_cells(r, 0, None);
                }
                self.erase_cells(row, 0, Some(col + 1));
            }
            2 => {
                for r in 0..self.rows {
                    self.erase_cells(r, 0, None);
                }
            }
            3 => {
                self.scrollback.clear();
                self.scroll_offset = 0;
                self.horiz_offset = self.horiz_offset.min(self.max_horiz_offset());
                self.epoch += 1;
                self.mark_dirty();
            }
            _ => debug!(mode, "unknown erase-in-display mode"),
        }
    }

    /// EL: 0 right of cursor, 1 left of cursor, 2 whole line
    pub fn erase_in_line(&mut self, mode: u32) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        match mode {
            0 => self.erase_cells(row, col, None),
            1 => self.erase_cells(row, 0, Some(col + 1)),
            2 => self.erase_cells(row, 0, None),
            _ => debug!(mode, "unknown erase-in-line mode"),
        }
    }

    /// ECH
    pub fn erase_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let end = col.saturating_add(n.max(1)).min(self.cols);
        self.erase_cells(row, col, Some(end));
    }

    fn insert_blank_cells(&mut self, row: usize, col: usize, n: usize) {
        let cols = self.cols;
        let bg = self.cursor.pen.bg;
        let Some(line) = self.grid_mut().get_mut(row) else {
            return;
        };
        let end = cols.min(line.cells.len());
        if col >= end {
            return;
        }
        let n = n.min(end - col);
        line.cells[col..end].rotate_right(n);
        for cell in &mut line.cells[col..col + n] {
            cell.erase(bg);
        }
        // A wide character pushed against the margin lost its continuation
        if line.cells[end - 1].width == 2 {
            line.cells[end - 1].erase(bg);
        }
    }

    /// ICH
    pub fn insert_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        self.fix_wide_fragments(row, col, 1);
        self.insert_blank_cells(row, col, n.max(1));
        self.cursor.pending_wrap = false;
        self.mark_dirty();
    }

    /// DCH
    pub fn delete_chars(&mut self, n: usize) {
        let (row, col) = (self.cursor.row, self.cursor.col);
        let cols = self.cols;
        let bg = self.cursor.pen.bg;
        self.fix_wide_fragments(row, col, n.max(1));
        if let Some(line) = self.grid_mut().get_mut(row) {
            let end = cols.min(line.cells.len());
            if col < end {
                let n = n.max(1).min(end - col);
                line.cells[col..end].rotate_left(n);
                for cell in &mut line.cells[end - n..end] {
                    cell.erase(bg);
                }
            }
        }
        self.cursor.pending_wrap = false;
        self.mark_dirty();
    }

    /// IL: insert blank rows at the cursor inside the scroll region
    pub fn insert_lines(&mut self, n: usize) {
        let row = self.cursor.row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        let bottom = self.scroll_bottom;
        self.scroll_region_down(row, bottom, n.max(1));
        self.cursor.carriage_return();
    }

    /// DL: delete rows at the cursor inside the scroll region
    pub fn delete_lines(&mut self, n: usize) {
        let row = self.cursor.row;
        if row < self.scroll_top || row > self.scroll_bottom {
            return;
        }
        let bottom = self.scroll_bottom;
        self.scroll_region_up(row, bottom, n.max(1), false);
        self.cursor.carriage_return();
    }

    // ---- cursor movement ----

    /// CUP/HVP, honoring origin mode (0-indexed)
    pub fn cursor_position(&mut self, row: usize, col: usize) {
        let bounds = self.bounds();
        self.cursor.goto_row(row, bounds);
        self.cursor.goto_col(col, bounds);
        self.mark_dirty();
    }

    /// CUU
    pub fn cursor_up(&mut self, n: usize) {
        let bounds = self.bounds();
        self.cursor.move_vertical(-step(n), bounds);
        self.mark_dirty();
    }

    /// CUD
    pub fn cursor_down(&mut self, n: usize) {
        let bounds = self.bounds();
        self.cursor.move_vertical(step(n), bounds);
        self.mark_dirty();
    }

    /// CUF
    pub fn cursor_forward(&mut self, n: usize) {
        let bounds = self.bounds();
        self.cursor.move_horizontal(step(n), bounds);
        self.mark_dirty();
    }

    /// CUB
    pub fn cursor_backward(&mut self, n: usize) {
        let bounds = self.bounds();
        self.cursor.move_horizontal(-step(n), bounds);
        self.mark_dirty();
    }

    /// CHA/HPA (0-indexed)
    pub fn cursor_to_col(&mut self, col: usize) {
        let bounds = self.bounds();
        self.cursor.goto_col(col, bounds);
        self.mark_dirty();
    }

    /// VPA (0-indexed), honoring origin mode
    pub fn cursor_to_row(&mut self, row: usize) {
        let bounds = self.bounds();
        self.cursor.goto_row(row, bounds);
        self.mark_dirty();
    }

    /// DECSC
    pub fn save_cursor(&mut self) {
        let saved = self.cursor.save();
        if self.on_alternate {
            self.saved_alternate = saved;
        } else {
            self.saved_primary = saved;
        }
    }

    /// DECRC
    pub fn restore_cursor(&mut self) {
        let saved = if self.on_alternate {
            self.saved_alternate.clone()
        } else {
            self.saved_primary.clone()
        };
        let bounds = self.bounds();
        self.cursor.restore(&saved, bounds);
        self.mark_dirty();
    }

    // ---- screens and modes ----

    /// Switch to the alternate grid. Offsets and the selection reset.
    pub fn enter_alternate_screen(&mut self, clear: bool) {
        if self.on_alternate {
            return;
        }
        self.on_alternate = true;
        if clear {
            let cols = self.cols;
            self.alternate.iter_mut().for_each(|line| *line = Line::new(cols));
        }
        self.leave_history_view();
    }

    pub fn exit_alternate_screen(&mut self) {
        if !self.on_alternate {
            return;
        }
        self.on_alternate = false;
        self.leave_history_view();
    }

    fn leave_history_view(&mut self) {
        self.scroll_offset = 0;
        self.horiz_offset = 0;
        self.selection = None;
        self.epoch += 1;
        self.mark_dirty();
    }

    /// Apply a DEC private mode (`CSI ? Pm h` / `CSI ? Pm l`)
    pub fn set_dec_mode(&mut self, mode: DecMode, enabled: bool) {
        match mode {
            DecMode::ApplicationCursor => self.modes.application_cursor = enabled,
            DecMode::Origin => {
                self.cursor.origin_mode = enabled;
                let bounds = self.bounds();
                self.cursor.home(bounds);
            }
            DecMode::Autowrap => {
                self.cursor.autowrap = enabled;
                if !enabled {
                    self.cursor.pending_wrap = false;
                }
            }
            DecMode::CursorBlink => self.cursor.blinking = enabled,
            DecMode::CursorVisible => self.cursor.visible = enabled,
            DecMode::AlternateScreen | DecMode::AlternateScreenClear => {
                if enabled {
                    self.enter_alternate_screen(mode == DecMode::AlternateScreenClear);
                } else {
                    self.exit_alternate_screen();
                }
            }
            DecMode::AlternateScreenSaveCursor => {
                if enabled {
                    if !self.on_alternate {
                        self.save_cursor();
                        self.enter_alternate_screen(true);
                    }
                } else if self.on_alternate {
                    self.exit_alternate_screen();
                    self.restore_cursor();
                }
            }
            DecMode::BracketedPaste => self.modes.bracketed_paste = enabled,
            DecMode::FlexibleWidth => {
                self.width.mode = if enabled {
                    WidthMode::Flexible
                } else {
                    WidthMode::Fixed
                };
            }
            DecMode::AmbiguousWide => {
                self.width.ambiguous = if enabled {
                    AmbiguousWidth::Wide
                } else {
                    AmbiguousWidth::Narrow
                };
            }
            DecMode::AmbiguousAuto => {
                self.width.ambiguous = if enabled {
                    AmbiguousWidth::Auto
                } else {
                    AmbiguousWidth::Narrow
                };
            }
        }
        self.mark_dirty();
    }

    /// Apply an ANSI mode (`CSI Pm h` / `CSI Pm l`)
    pub fn set_ansi_mode(&mut self, mode: AnsiMode, enabled: bool) {
        match mode {
            AnsiMode::Insert => self.cursor.insert_mode = enabled,
            AnsiMode::LinefeedNewline => self.modes.linefeed_newline = enabled,
        }
    }

    /// DECKPAM/DECKPNM
    pub fn set_application_keypad(&mut self, enabled: bool) {
        self.modes.application_keypad = enabled;
    }

    /// DECSTR: reset the pen and modes without touching the grid
    pub fn soft_reset(&mut self) {
        self.cursor.pen.reset_attributes();
        self.cursor.visible = true;
        self.cursor.origin_mode = false;
        self.cursor.autowrap = true;
        self.cursor.insert_mode = false;
        self.cursor.pending_wrap = false;
        self.modes.application_cursor = false;
        self.modes.application_keypad = false;
        self.reset_scroll_region();
        self.saved_primary = SavedCursor::default();
        self.saved_alternate = SavedCursor::default();
        self.mark_dirty();
    }

    /// RIS: back to the initial state. Theme, color scheme, configured
    /// width policy and cursor style survive; everything else is cleared.
    pub fn reset(&mut self) {
        let (cols, rows) = (self.cols, self.rows);
        self.primary = blank_grid(cols, rows);
        self.alternate = blank_grid(cols, rows);
        self.on_alternate = false;
        self.scrollback.clear();
        self.cursor = Cursor::new();
        self.cursor.shape = self.base_cursor.0;
        self.cursor.blinking = self.base_cursor.1;
        self.saved_primary = SavedCursor::default();
        self.saved_alternate = SavedCursor::default();
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.tab_stops = default_tab_stops(cols);
        self.modes.reset();
        self.width = self.base_width;
        self.scroll_offset = 0;
        self.horiz_offset = 0;
        self.selection = None;
        self.overlays.clear();
        self.title.clear();
        self.last_printed = None;
        self.mark_dirty();
    }

    // ---- resize ----

    /// Resize the grid. Shrinking the height moves the top rows of the
    /// primary grid into scrollback (the alternate grid drops them). Lines
    /// keep cells beyond a narrower width; they stay reachable through the
    /// horizontal offset. Cursor, selection and offsets are clamped.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        if cols == self.cols && rows == self.rows {
            return;
        }
        debug!(from_cols = self.cols, from_rows = self.rows, cols, rows, "resizing buffer");

        let old_rows = self.rows;
        if rows < old_rows {
            let excess = old_rows - rows;
            let moved: Vec<Line> = self.primary.drain(..excess).collect();
            for line in moved {
                self.scrollback.push(line);
            }
            self.alternate.drain(..excess);
            self.cursor.row = self.cursor.row.saturating_sub(excess);
        } else if rows > old_rows {
            let cols_now = cols;
            for grid in [&mut self.primary, &mut self.alternate] {
                grid.extend((old_rows..rows).map(|_| Line::new(cols_now)));
            }
        }
        for line in self.primary.iter_mut().chain(self.alternate.iter_mut()) {
            line.ensure_len(cols);
        }

        let mut stops = default_tab_stops(cols);
        for (stop, old) in stops.iter_mut().zip(self.tab_stops.iter()) {
            *stop = *old;
        }
        self.tab_stops = stops;

        self.cols = cols;
        self.rows = rows;
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.cursor.col = self.cursor.col.min(cols - 1);
        self.cursor.row = self.cursor.row.min(rows - 1);
        self.cursor.pending_wrap = false;

        self.scroll_offset = self.scroll_offset.min(self.max_scroll_offset());
        self.horiz_offset = self.horiz_offset.min(self.max_horiz_offset());
        if let Some(sel) = self.selection.clone() {
            let (start, end) = (self.clamp_point(sel.start()), self.clamp_point(sel.end()));
            if let Some(sel) = self.selection.as_mut() {
                sel.set_points(start, end);
            }
        }

        self.epoch += 1;
        self.mark_dirty();
    }

    /// Change the scrollback capacity, dropping the oldest rows if needed
    pub fn set_scrollback_capacity(&mut self, capacity: usize) {
        self.scrollback.set_capacity(capacity);
        self.scroll_offset = self.scroll_offset.min(self.max_scroll_offset());
        self.epoch += 1;
        self.mark_dirty();
    }

    // ---- viewport offsets ----

    /// Rows of history the viewport can scroll back (0 on the alternate screen)
    pub fn max_scroll_offset(&self) -> usize {
        if self.on_alternate {
            0
        } else {
            self.scrollback.len()
        }
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Set how many rows the viewport looks back into history, clamped to
    /// `[0, max_scroll_offset]`. Never touches the grid.
    pub fn set_scroll_offset(&mut self, offset: usize) {
        let offset = offset.min(self.max_scroll_offset());
        if offset != self.scroll_offset {
            self.scroll_offset = offset;
            self.horiz_offset = self.horiz_offset.min(self.max_horiz_offset());
            self.epoch += 1;
            self.mark_dirty();
        }
    }

    /// Scroll the viewport by a signed number of rows (positive = back)
    pub fn scroll_viewport(&mut self, delta: isize) {
        let offset = if delta >= 0 {
            self.scroll_offset.saturating_add(delta.unsigned_abs())
        } else {
            self.scroll_offset.saturating_sub(delta.unsigned_abs())
        };
        self.set_scroll_offset(offset);
    }

    /// Longest content among the visible lines minus the width
    pub fn max_horiz_offset(&self) -> usize {
        let origin = self.viewport().view_origin();
        (0..self.rows as u64)
            .filter_map(|r| self.line_at(origin + r))
            .map(Line::content_len)
            .max()
            .unwrap_or(0)
            .saturating_sub(self.cols)
    }

    pub fn horiz_offset(&self) -> usize {
        self.horiz_offset
    }

    pub fn set_horiz_offset(&mut self, offset: usize) {
        let offset = offset.min(self.max_horiz_offset());
        if offset != self.horiz_offset {
            self.horiz_offset = offset;
            self.epoch += 1;
            self.mark_dirty();
        }
    }

    /// Buffer-absolute position shown at a viewport position. Screen
    /// splits map to the live grid independently of the scroll offset.
    pub fn visible_point(&self, x: usize, y: usize) -> Option<BufferPoint> {
        if x >= self.cols || y >= self.rows {
            return None;
        }
        let vp = self.viewport();
        let at = ViewportPoint::new(x, y);
        if let Some(split) = self.overlays.split_at_row(y) {
            let screen: ScreenPoint = split.to_screen(split.to_split(at)?);
            if screen.row >= self.rows {
                return None;
            }
            return Some(vp.screen_to_buffer(screen));
        }
        Some(vp.viewport_to_buffer(at))
    }

    /// The cell displayed at a viewport position. This is the only cell
    /// read path a renderer needs: history, live rows, offsets and splits
    /// are all resolved here. `None` means nothing is there (draw blank).
    pub fn visible_cell(&self, x: usize, y: usize) -> Option<&Cell> {
        let p = self.visible_point(x, y)?;
        self.line_at(p.row)?.get(p.col)
    }

    // ---- selection ----

    /// Clamp a point to rows that exist now and columns the viewport reaches
    fn clamp_point(&self, p: BufferPoint) -> BufferPoint {
        let vp = self.viewport();
        BufferPoint::new(
            p.col.min(self.cols - 1 + self.horiz_offset),
            p.row.min(vp.last_row()),
        )
    }

    pub fn start_selection(&mut self, at: BufferPoint, kind: SelectionKind) {
        let at = self.clamp_point(at);
        self.selection = Some(Selection::new(at, kind));
        self.mark_dirty();
    }

    pub fn update_selection(&mut self, to: BufferPoint) {
        let to = self.clamp_point(to);
        if let Some(sel) = self.selection.as_mut() {
            sel.update(to);
            self.mark_dirty();
        }
    }

    pub fn end_selection(&mut self) {
        if let Some(sel) = self.selection.as_mut() {
            sel.finish();
        }
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.mark_dirty();
        }
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Columns of the word touching `p`, or just `p` off a word
    fn word_bounds(&self, p: BufferPoint) -> (usize, usize) {
        let Some(line) = self.line_at(p.row) else {
            return (p.col, p.col);
        };
        let is_word = |col: usize| line.get(col).is_some_and(|cell| is_word_char(cell.ch));
        if !is_word(p.col) {
            return (p.col, p.col);
        }
        let mut start = p.col;
        while start > 0 && is_word(start - 1) {
            start -= 1;
        }
        let mut end = p.col;
        while is_word(end + 1) {
            end += 1;
        }
        (start, end)
    }

    /// The selection with word selections snapped to word boundaries
    fn selection_span(&self) -> Option<Selection> {
        let sel = self.selection.as_ref()?;
        let mut span = sel.clone();
        if sel.kind() == SelectionKind::Word {
            let (start, end) = sel.normalized();
            let start = BufferPoint::new(self.word_bounds(start).0, start.row);
            let end = BufferPoint::new(self.word_bounds(end).1, end.row);
            span.set_points(start, end);
        }
        Some(span)
    }

    /// Whether the cell at a buffer-absolute position is selected
    pub fn is_selected(&self, p: BufferPoint) -> bool {
        self.selection_span().is_some_and(|span| span.contains(p))
    }

    /// Text covered by the selection. Rows are joined with newlines except
    /// where a line soft-wrapped into the next. Evicted rows contribute
    /// nothing.
    pub fn selected_text(&self) -> String {
        let Some(span) = self.selection_span() else {
            return String::new();
        };
        let (start_row, end_row) = span.row_range();
        let first = start_row.max(self.scrollback.evicted());
        let mut out = String::new();
        for row in first..=end_row {
            let Some(line) = self.line_at(row) else {
                continue;
            };
            let last_col = line.cells.len().saturating_sub(1);
            if let Some((a, b)) = span.col_range(row, last_col) {
                out.push_str(&line.text_range(a, b.saturating_add(1)));
            }
            let joins = line.wrapped && span.kind() != SelectionKind::Block;
            if row != end_row && !joins {
                out.push('\n');
            }
        }
        out
    }

    // ---- overlays ----

    pub fn define_palette(&mut self, id: u16, palette: Palette) -> Result<(), OverlayError> {
        self.overlays.define_palette(id, palette)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn remove_palette(&mut self, id: u16) {
        if self.overlays.remove_palette(id).is_some() {
            self.mark_dirty();
        }
    }

    pub fn define_glyph(&mut self, codepoint: char, glyph: GlyphBitmap) -> Result<(), OverlayError> {
        self.overlays.define_glyph(codepoint, glyph)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn remove_glyph(&mut self, codepoint: char) {
        if self.overlays.remove_glyph(codepoint).is_some() {
            self.mark_dirty();
        }
    }

    pub fn place_sprite(&mut self, id: u32, sprite: Sprite) -> Result<(), OverlayError> {
        self.overlays.place_sprite(id, sprite)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn move_sprite(&mut self, id: u32, position: SubCellPoint) -> Result<(), OverlayError> {
        self.overlays.move_sprite(id, position)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn remove_sprite(&mut self, id: u32) {
        if self.overlays.remove_sprite(id).is_some() {
            self.mark_dirty();
        }
    }

    pub fn clear_sprites(&mut self) {
        self.overlays.clear_sprites();
        self.mark_dirty();
    }

    pub fn define_crop_rect(&mut self, id: u16, rect: CropRect) -> Result<(), OverlayError> {
        self.overlays.define_crop_rect(id, rect)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn remove_crop_rect(&mut self, id: u16) {
        if self.overlays.remove_crop_rect(id).is_some() {
            self.mark_dirty();
        }
    }

    pub fn define_screen_split(&mut self, id: u16, split: ScreenSplit) -> Result<(), OverlayError> {
        self.overlays.define_screen_split(id, split)?;
        self.epoch += 1;
        self.mark_dirty();
        Ok(())
    }

    pub fn remove_screen_split(&mut self, id: u16) {
        if self.overlays.remove_screen_split(id).is_some() {
            self.epoch += 1;
            self.mark_dirty();
        }
    }

    pub fn clear_screen_splits(&mut self) {
        self.overlays.clear_screen_splits();
        self.epoch += 1;
        self.mark_dirty();
    }
}
