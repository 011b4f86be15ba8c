//! Differential renderer
//!
//! Converts a [`FrameSnapshot`] into the shortest practical stream of
//! cursor moves, SGR changes and text that brings a terminal-compatible
//! sink from the previously rendered frame to the current one.
//!
//! - Cells equal to the cached value from the last pass are skipped.
//! - SGR changes are computed against the pen tracked across the current
//!   pass, and several changes are merged into one sequence.
//! - A full `SGR 0` is only emitted when an attribute must be turned off.
//! - The cursor is hidden lazily before the first write, and the pass ends
//!   with a single reset followed by cursor placement.

use tracing::trace;

use super::ansi::{self, SgrBuilder};
use super::chrome::ClipRect;
use super::frame::{FrameAttrs, FrameCell, FrameCursor, FrameSnapshot};
use crate::core::Rgb;

/// Attribute state the sink is known to be in
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PenState {
    /// `None` means the sink's default
    fg: Option<Rgb>,
    bg: Option<Rgb>,
    underline_color: Option<Rgb>,
    attrs: FrameAttrs,
}

/// Cursor state last shown on the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShownCursor {
    Unknown,
    Hidden,
    At(FrameCursor),
}

/// Renders frames differentially against a cache of the last frame
#[derive(Debug)]
pub struct DiffRenderer {
    cache: Vec<Option<FrameCell>>,
    size: (usize, usize),
    epoch: Option<u64>,
    force_full: bool,
    focused: bool,
    /// Position of the terminal's top-left cell on the sink
    origin: (usize, usize),
    clip: Option<ClipRect>,
    shown_cursor: ShownCursor,
}

impl Default for DiffRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-pass output state
struct Pass<'a> {
    out: &'a mut String,
    pen: PenState,
    /// Sink cursor position if known
    at: Option<(usize, usize)>,
    cursor_hidden: bool,
    wrote: bool,
}

impl DiffRenderer {
    pub fn new() -> Self {
        Self {
            cache: Vec::new(),
            size: (0, 0),
            epoch: None,
            force_full: true,
            focused: true,
            origin: (0, 0),
            clip: None,
            shown_cursor: ShownCursor::Unknown,
        }
    }

    /// Place the terminal at an offset on the sink (for embedding)
    pub fn set_origin(&mut self, col: usize, row: usize) {
        if self.origin != (col, row) {
            self.origin = (col, row);
            self.invalidate();
        }
    }

    /// Restrict output to a rectangle of sink coordinates
    pub fn set_clip(&mut self, clip: Option<ClipRect>) {
        if self.clip != clip {
            self.clip = clip;
            self.invalidate();
        }
    }

    /// Focus gates whether the cursor is shown
    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Force the next pass to redraw every cell
    pub fn invalidate(&mut self) {
        self.force_full = true;
    }

    /// Render a frame, returning the output for this pass. An unchanged
    /// frame produces an empty string.
    pub fn render(&mut self, frame: &FrameSnapshot) -> String {
        let full = self.force_full
            || self.size != (frame.cols, frame.rows)
            || self.epoch != Some(frame.epoch);
        if full {
            self.cache = vec![None; frame.cols * frame.rows];
            self.size = (frame.cols, frame.rows);
            self.epoch = Some(frame.epoch);
            self.force_full = false;
            self.shown_cursor = ShownCursor::Unknown;
        }

        let mut out = String::new();
        let mut pass = Pass {
            out: &mut out,
            pen: PenState::default(),
            at: None,
            cursor_hidden: false,
            wrote: false,
        };

        for row in 0..frame.rows {
            for col in 0..frame.cols {
                let index = row * frame.cols + col;
                let Some(cell) = frame.cells.get(index) else {
                    continue;
                };
                // Continuations are drawn by their head and cached with it
                if cell.is_continuation() {
                    continue;
                }
                let tail = frame
                    .cells
                    .get(index + 1)
                    .filter(|_| cell.is_wide() && col + 1 < frame.cols);
                let unchanged = self.cache[index].as_ref() == Some(cell)
                    && tail.map_or(true, |t| self.cache[index + 1].as_ref() == Some(t));
                if unchanged {
                    continue;
                }
                let drawn = self.emit_cell(&mut pass, frame, col, row, cell);
                self.cache[index] = drawn.then(|| cell.clone());
                if let Some(tail) = tail {
                    self.cache[index + 1] = drawn.then(|| tail.clone());
                }
            }
        }

        if pass.wrote {
            ansi::sgr_reset(pass.out);
        }
        self.place_cursor(&mut pass, frame.cursor);
        trace!(bytes = out.len(), full, "render pass");
        out
    }

    /// Full, non-differential render that leaves this renderer's cache
    /// untouched. Used for on-demand output.
    pub fn render_full(frame: &FrameSnapshot) -> String {
        let mut renderer = DiffRenderer::new();
        renderer.render(frame)
    }

    fn sink_pos(&self, col: usize, row: usize) -> (usize, usize) {
        (self.origin.0 + col, self.origin.1 + row)
    }

    fn visible(&self, col: usize, row: usize, width: usize) -> bool {
        let (x, y) = self.sink_pos(col, row);
        match self.clip {
            None => true,
            Some(clip) => (0..width.max(1)).all(|dx| clip.contains(x + dx, y)),
        }
    }

    /// Emit one cell. Returns false if the clip rectangle suppressed it.
    fn emit_cell(
        &self,
        pass: &mut Pass,
        frame: &FrameSnapshot,
        col: usize,
        row: usize,
        cell: &FrameCell,
    ) -> bool {
        let width = usize::from(cell.width.max(1));
        if col + width > frame.cols || !self.visible(col, row, width) {
            return false;
        }

        if !pass.cursor_hidden {
            ansi::hide_cursor(pass.out);
            pass.cursor_hidden = true;
        }

        let pos = self.sink_pos(col, row);
        if pass.at != Some(pos) {
            ansi::cup(pass.out, pos.1, pos.0);
        }

        let target = PenState {
            fg: Some(cell.fg),
            bg: Some(cell.bg),
            underline_color: cell.underline_color,
            attrs: cell.attrs,
        };
        apply_pen(pass, target);

        cell.push_text(pass.out);
        pass.wrote = true;

        // Glyphs drawn wider than their grid columns leave the sink cursor
        // somewhere we cannot predict
        let drawn = cell.visual_width.round() as usize;
        pass.at = if drawn > width {
            None
        } else {
            Some((pos.0 + width, pos.1))
        };
        true
    }

    fn place_cursor(&mut self, pass: &mut Pass, cursor: Option<FrameCursor>) {
        let cursor = cursor.filter(|c| self.focused && self.visible(c.col, c.row, 1));
        let next = match cursor {
            Some(c) => ShownCursor::At(c),
            None => ShownCursor::Hidden,
        };

        if !pass.cursor_hidden && self.shown_cursor == next {
            return;
        }

        match cursor {
            Some(c) => {
                let previous_shape = match self.shown_cursor {
                    ShownCursor::At(prev) => Some((prev.shape, prev.blinking)),
                    _ => None,
                };
                if previous_shape != Some((c.shape, c.blinking)) {
                    ansi::cursor_shape(pass.out, c.shape, c.blinking);
                }
                let (x, y) = self.sink_pos(c.col, c.row);
                ansi::cup(pass.out, y, x);
                ansi::show_cursor(pass.out);
            }
            None => {
                if !pass.cursor_hidden {
                    ansi::hide_cursor(pass.out);
                }
            }
        }
        self.shown_cursor = next;
    }
}

/// Bring the sink's pen to `target`, resetting only when an attribute
/// must be turned off
fn apply_pen(pass: &mut Pass, target: PenState) {
    if pass.pen == target {
        return;
    }

    let mut sgr = SgrBuilder::new();
    let must_reset = pass.pen.attrs.turns_off(&target.attrs)
        || (pass.pen.underline_color.is_some() && target.underline_color.is_none());
    if must_reset {
        sgr.code(0);
        pass.pen = PenState::default();
    }

    let (from, to) = (pass.pen.attrs, target.attrs);
    if to.bold && !from.bold {
        sgr.code(1);
    }
    if to.faint && !from.faint {
        sgr.code(2);
    }
    if to.italic && !from.italic {
        sgr.code(3);
    }
    if to.underline.is_set() && to.underline != from.underline {
        sgr.underline(to.underline);
    }
    if to.blink && !from.blink {
        sgr.code(5);
    }
    if to.strikethrough && !from.strikethrough {
        sgr.code(9);
    }
    if let Some(fg) = target.fg.filter(|_| target.fg != pass.pen.fg) {
        sgr.fg(fg);
    }
    if let Some(bg) = target.bg.filter(|_| target.bg != pass.pen.bg) {
        sgr.bg(bg);
    }
    if let Some(color) = target
        .underline_color
        .filter(|_| target.underline_color != pass.pen.underline_color)
    {
        sgr.underline_color(color);
    }

    sgr.finish(pass.out);
    pass.pen = target;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::Terminal;

    fn frame(term: &Terminal) -> FrameSnapshot {
        FrameSnapshot::capture(term.buffer())
    }

    #[test]
    fn test_first_render_draws_everything() {
        let mut term = Terminal::new(4, 2, 0);
        term.process(b"ab");
        let mut renderer = DiffRenderer::new();
        let out = renderer.render(&frame(&term));
        assert!(out.starts_with(ansi::CURSOR_HIDE));
        assert!(out.contains("ab"));
        // 8 cells, one cursor move for the first row and one for the second
        assert_eq!(out.matches('H').count(), 3);
        assert!(out.ends_with("\x1b[1;3H\x1b[?25h"));
    }

    #[test]
    fn test_unchanged_frame_renders_nothing() {
        let mut term = Terminal::new(10, 3, 0);
        term.process(b"\x1b[1;31mhello\x1b[0m world");
        let mut renderer = DiffRenderer::new();
        renderer.render(&frame(&term));
        assert_eq!(renderer.render(&frame(&term)), "");
    }

    #[test]
    fn test_only_changed_cells_are_emitted() {
        let mut term = Terminal::new(10, 3, 0);
        term.process(b"hello");
        let mut renderer = DiffRenderer::new();
        renderer.render(&frame(&term));

        term.process(b"\x1b[1;2HE");
        let out = renderer.render(&frame(&term));
        assert!(out.contains("\x1b[1;2H"));
        assert!(out.contains('E'));
        assert!(!out.contains("llo"));
    }

    #[test]
    fn test_attribute_changes_are_incremental() {
        let mut term = Terminal::new(10, 1, 0);
        term.process(b"a\x1b[1mb\x1b[3mc");
        let mut renderer = DiffRenderer::new();
        let out = renderer.render(&frame(&term));

        // Adding bold then italic never needs a reset inside the pass
        let resets = out.matches("\x1b[0m").count();
        assert_eq!(resets, 1, "only the trailing reset: {out:?}");
        assert!(out.contains("\x1b[1mb"));
        assert!(out.contains("\x1b[3mc"));
    }

    #[test]
    fn test_turning_attribute_off_resets() {
        let mut term = Terminal::new(10, 1, 0);
        term.process(b"\x1b[1ma\x1b[22mb");
        let mut renderer = DiffRenderer::new();
        let out = renderer.render(&frame(&term));
        let b_at = out.find('b').unwrap();
        assert!(out[..b_at].rfind("\x1b[0;").is_some());
    }

    #[test]
    fn test_cursor_hidden_when_unfocused_or_scrolled() {
        let mut term = Terminal::new(10, 2, 10);
        term.process(b"1\r\n2\r\n3");
        let mut renderer = DiffRenderer::new();
        renderer.render(&frame(&term));

        renderer.set_focused(false);
        assert_eq!(renderer.render(&frame(&term)), ansi::CURSOR_HIDE);

        renderer.set_focused(true);
        assert!(renderer.render(&frame(&term)).ends_with(ansi::CURSOR_SHOW));

        term.buffer_mut().set_scroll_offset(1);
        let out = renderer.render(&frame(&term));
        assert!(!out.ends_with(ansi::CURSOR_SHOW));
        assert!(out.contains('1'));
    }

    #[test]
    fn test_resize_forces_full_redraw() {
        let mut term = Terminal::new(5, 2, 0);
        term.process(b"abc");
        let mut renderer = DiffRenderer::new();
        renderer.render(&frame(&term));

        term.resize(6, 2);
        let out = renderer.render(&frame(&term));
        assert!(out.contains("abc"));
    }

    #[test]
    fn test_clip_suppresses_cells_outside() {
        let mut term = Terminal::new(6, 1, 0);
        term.process(b"abcdef");
        let mut renderer = DiffRenderer::new();
        renderer.set_origin(10, 5);
        renderer.set_clip(Some(ClipRect::new(10, 5, 3, 1)));
        let out = renderer.render(&frame(&term));
        assert!(out.contains("\x1b[6;11H"));
        assert!(out.contains("abc"));
        assert!(!out.contains('d'));
    }

    #[test]
    fn test_wide_characters_advance_two_columns() {
        let mut term = Terminal::new(6, 1, 0);
        term.process("世x".as_bytes());
        let mut renderer = DiffRenderer::new();
        let out = renderer.render(&frame(&term));
        // No cursor move needed between the wide char and the next one
        assert!(out.contains("世x"));
    }

    #[test]
    fn test_render_full_ignores_cache() {
        let mut term = Terminal::new(4, 1, 0);
        term.process(b"hi");
        let mut renderer = DiffRenderer::new();
        renderer.render(&frame(&term));
        assert!(DiffRenderer::render_full(&frame(&term)).contains("hi"));
        assert_eq!(renderer.render(&frame(&term)), "");
    }

    /// Apply each render to a second terminal standing in for the sink
    fn replay(sink: &mut Terminal, renderer: &mut DiffRenderer, frame: &FrameSnapshot) {
        sink.process(renderer.render(frame).as_bytes());
        let shown = FrameSnapshot::capture(sink.buffer());
        for row in 0..frame.rows {
            assert_eq!(shown.row_text(row), frame.row_text(row), "row {row}");
        }
    }

    #[test]
    fn test_narrow_over_wide_redraws_right_half() {
        let mut term = Terminal::new(6, 1, 0);
        let mut sink = Terminal::new(6, 1, 0);
        let mut renderer = DiffRenderer::new();

        term.process(b"ab");
        replay(&mut sink, &mut renderer, &frame(&term));
        term.process("\x1b[H世".as_bytes());
        replay(&mut sink, &mut renderer, &frame(&term));
        term.process(b"\x1b[Hab");
        replay(&mut sink, &mut renderer, &frame(&term));
        assert_eq!(FrameSnapshot::capture(sink.buffer()).row_text(0), "ab");
    }

    #[test]
    fn test_wide_fragment_at_left_edge_is_painted() {
        let mut term = Terminal::new(10, 1, 0);
        term.process("a世bcdefg".as_bytes());
        term.resize(4, 1);
        let mut sink = Terminal::new(4, 1, 0);
        let mut renderer = DiffRenderer::new();
        replay(&mut sink, &mut renderer, &frame(&term));

        term.buffer_mut().set_horiz_offset(2);
        replay(&mut sink, &mut renderer, &frame(&term));
        assert_eq!(sink.buffer().cell(0, 0).unwrap().ch, ' ');

        term.buffer_mut().set_horiz_offset(0);
        replay(&mut sink, &mut renderer, &frame(&term));
    }

    #[test]
    fn test_wide_cell_cached_with_its_continuation() {
        let mut term = Terminal::new(6, 1, 0);
        term.process("世".as_bytes());
        let mut renderer = DiffRenderer::new();
        renderer.render(&frame(&term));
        assert_eq!(renderer.render(&frame(&term)), "");

        // Only the head changes; the continuation slot must not keep the
        // old entry
        term.process("\x1b[H中".as_bytes());
        let out = renderer.render(&frame(&term));
        assert!(out.contains('中'));
        assert_eq!(renderer.render(&frame(&term)), "");
    }
}
