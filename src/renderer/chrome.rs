//! Border, status line and scrollbar
//!
//! Geometric decorations for embedding the terminal as a region of a
//! larger screen. Everything here is derived read-only from a
//! [`FrameSnapshot`] and written through the same clip predicate the diff
//! renderer uses.

use super::ansi;
use super::frame::FrameSnapshot;

/// A rectangle of sink cells; positions outside it are never written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl ClipRect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.width && y - self.y < self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Percentage of history above the viewport bottom that is still below
/// it: 100 at the live screen, 0 at the oldest row. `None` without history.
pub fn scroll_percent(scroll_offset: usize, max_scroll_offset: usize) -> Option<u8> {
    if max_scroll_offset == 0 {
        return None;
    }
    let scrolled = scroll_offset.min(max_scroll_offset) * 100 / max_scroll_offset;
    Some((100 - scrolled) as u8)
}

/// Scrollbar thumb as `(start, length)` in track rows.
///
/// The track spans `track` rows and represents `scrollback_len + rows`
/// lines, of which `rows` are visible. Degenerate inputs yield `None`.
pub fn scrollbar_thumb(
    track: usize,
    rows: usize,
    scrollback_len: usize,
    scroll_offset: usize,
) -> Option<(usize, usize)> {
    if track == 0 || rows == 0 {
        return None;
    }
    let total = scrollback_len + rows;
    let length = (rows * track / total).clamp(1, track);
    let travel = track - length;
    let from_top = scrollback_len - scroll_offset.min(scrollback_len);
    let start = if scrollback_len == 0 {
        0
    } else {
        from_top * travel / scrollback_len
    };
    Some((start, length))
}

/// The status line text: cursor position, history depth and scroll state
pub fn status_line(frame: &FrameSnapshot) -> String {
    let (col, row) = frame.cursor_position;
    let mut text = format!(
        "{}:{}  {}x{}  history {}",
        row + 1,
        col + 1,
        frame.cols,
        frame.rows,
        frame.scrollback_len
    );
    if let Some(percent) = scroll_percent(frame.scroll_offset, frame.max_scroll_offset) {
        text.push_str(&format!("  {}%", percent));
    }
    if !frame.title.is_empty() {
        text.push_str("  ");
        text.push_str(&frame.title);
    }
    text
}

/// Box-drawing border style
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorderStyle {
    pub horizontal: char,
    pub vertical: char,
    pub top_left: char,
    pub top_right: char,
    pub bottom_left: char,
    pub bottom_right: char,
}

impl Default for BorderStyle {
    fn default() -> Self {
        Self {
            horizontal: '─',
            vertical: '│',
            top_left: '┌',
            top_right: '┐',
            bottom_left: '└',
            bottom_right: '┘',
        }
    }
}

/// Draws decorations around an embedded terminal region
#[derive(Debug, Clone)]
pub struct Chrome {
    pub style: BorderStyle,
    pub clip: Option<ClipRect>,
    pub show_scrollbar: bool,
}

impl Default for Chrome {
    fn default() -> Self {
        Self {
            style: BorderStyle::default(),
            clip: None,
            show_scrollbar: true,
        }
    }
}

impl Chrome {
    fn put(&self, out: &mut String, x: usize, y: usize, c: char) {
        if self.clip.map_or(true, |clip| clip.contains(x, y)) {
            ansi::cup(out, y, x);
            out.push(c);
        }
    }

    /// Draw a border around a `cols x rows` region whose top-left content
    /// cell is at sink position `(x, y)`. The border occupies the ring
    /// outside the region, so `x` and `y` must be at least 1.
    ///
    /// The status line is embedded in the bottom edge and the scrollbar
    /// thumb replaces the right edge where it lies.
    pub fn render(&self, out: &mut String, frame: &FrameSnapshot, x: usize, y: usize) {
        if frame.cols == 0 || frame.rows == 0 || x == 0 || y == 0 {
            return;
        }
        let (left, top) = (x - 1, y - 1);
        let right = x + frame.cols;
        let bottom = y + frame.rows;
        let s = self.style;

        ansi::sgr_reset(out);
        self.put(out, left, top, s.top_left);
        self.put(out, right, top, s.top_right);
        self.put(out, left, bottom, s.bottom_left);
        self.put(out, right, bottom, s.bottom_right);

        let status: Vec<char> = status_line(frame).chars().collect();
        for col in x..right {
            self.put(out, col, top, s.horizontal);
            let c = status.get(col - x).copied().unwrap_or(s.horizontal);
            self.put(out, col, bottom, c);
        }

        let thumb = if self.show_scrollbar {
            scrollbar_thumb(
                frame.rows,
                frame.rows,
                frame.max_scroll_offset,
                frame.scroll_offset,
            )
        } else {
            None
        };
        for row in 0..frame.rows {
            self.put(out, left, y + row, s.vertical);
            let on_thumb = thumb.is_some_and(|(start, len)| row >= start && row < start + len);
            self.put(out, right, y + row, if on_thumb { '█' } else { s.vertical });
        }
    }
}
