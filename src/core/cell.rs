//! Terminal Cell
//!
//! Represents a single cell in the terminal grid, containing a character
//! and its associated styling attributes.

use serde::{Deserialize, Serialize};

/// A single cell in the terminal grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Base character. A blank cell holds a space.
    pub ch: char,
    /// Combining marks attached to the base character
    pub combining: Vec<char>,
    /// Foreground color
    pub fg: Color,
    /// Background color
    pub bg: Color,
    /// Underline color (`Color::Default` follows the foreground)
    pub underline_color: Color,
    /// Text style attributes
    pub style: Style,
    /// Grid columns occupied: 1 normal, 2 wide, 0 for the continuation
    /// half of a wide character
    pub width: u8,
    /// Rendered width in cell units. Always 1.0 in fixed-width mode.
    pub visual_width: f32,
    /// Mirroring applied to a custom glyph bitmap
    pub flip: GlyphFlip,
    /// Palette override used when resolving indexed colors and glyph pixels
    pub palette: Option<u16>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            combining: Vec::new(),
            fg: Color::Default,
            bg: Color::Default,
            underline_color: Color::Default,
            style: Style::default(),
            width: 1,
            visual_width: 1.0,
            flip: GlyphFlip::None,
            palette: None,
        }
    }
}

impl Cell {
    /// Create a new cell with a single character
    pub fn new(c: char) -> Self {
        Self {
            ch: c,
            ..Default::default()
        }
    }

    /// Create a cell carrying the attributes of the given pen
    pub fn with_pen(c: char, pen: &Pen) -> Self {
        Self {
            ch: c,
            combining: Vec::new(),
            fg: pen.fg,
            bg: pen.bg,
            underline_color: pen.underline_color,
            style: pen.style,
            width: 1,
            visual_width: 1.0,
            flip: pen.flip,
            palette: pen.palette,
        }
    }

    /// A blank cell holding only a background color
    pub fn blank(bg: Color) -> Self {
        Self {
            bg,
            ..Default::default()
        }
    }

    /// Check if this cell shows nothing but its background
    pub fn is_blank(&self) -> bool {
        self.ch == ' ' && self.combining.is_empty()
    }

    /// Check if this cell is the second half of a wide character
    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    /// Check if this cell is displayed wider than a single column
    pub fn is_wide(&self) -> bool {
        self.width == 2 || self.visual_width >= 2.0
    }

    /// Attach a combining mark to the base character
    pub fn push_combining(&mut self, c: char) {
        // Bounded so a stream of marks cannot grow one cell without limit
        if self.combining.len() < 8 {
            self.combining.push(c);
        }
    }

    /// The text shown by this cell (base character plus combining marks)
    pub fn text(&self) -> String {
        let mut s = String::with_capacity(1 + self.combining.len());
        s.push(self.ch);
        s.extend(self.combining.iter());
        s
    }

    /// Clear the cell to default state
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Clear the cell but preserve background color (for erase operations)
    pub fn erase(&mut self, bg: Color) {
        *self = Self::blank(bg);
    }
}

/// Color representation supporting indexed and RGB colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Color {
    /// Default terminal color (foreground or background)
    #[default]
    Default,
    /// 256-color palette index
    Indexed(u8),
    /// 24-bit RGB color
    Rgb(u8, u8, u8),
}

impl Color {
    /// Standard ANSI colors (0-7)
    pub const BLACK: Color = Color::Indexed(0);
    pub const RED: Color = Color::Indexed(1);
    pub const GREEN: Color = Color::Indexed(2);
    pub const YELLOW: Color = Color::Indexed(3);
    pub const BLUE: Color = Color::Indexed(4);
    pub const MAGENTA: Color = Color::Indexed(5);
    pub const CYAN: Color = Color::Indexed(6);
    pub const WHITE: Color = Color::Indexed(7);

    /// Bright ANSI colors (8-15)
    pub const BRIGHT_BLACK: Color = Color::Indexed(8);
    pub const BRIGHT_RED: Color = Color::Indexed(9);
    pub const BRIGHT_GREEN: Color = Color::Indexed(10);
    pub const BRIGHT_YELLOW: Color = Color::Indexed(11);
    pub const BRIGHT_BLUE: Color = Color::Indexed(12);
    pub const BRIGHT_MAGENTA: Color = Color::Indexed(13);
    pub const BRIGHT_CYAN: Color = Color::Indexed(14);
    pub const BRIGHT_WHITE: Color = Color::Indexed(15);

    /// Convert a 256-color index to RGB using the xterm layout for
    /// indices 16-255. The first 16 entries come from `ansi`.
    pub fn indexed_to_rgb(index: u8, ansi: &[(u8, u8, u8); 16]) -> (u8, u8, u8) {
        match index {
            0..=15 => ansi[index as usize],
            // 216 color cube (16-231)
            16..=231 => {
                let n = index - 16;
                let r = n / 36;
                let g = (n % 36) / 6;
                let b = n % 6;
                let to_rgb = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
                (to_rgb(r), to_rgb(g), to_rgb(b))
            }
            // Grayscale (232-255)
            232..=255 => {
                let gray = 8 + (index - 232) * 10;
                (gray, gray, gray)
            }
        }
    }
}

/// Underline variants selectable through SGR 4 and its `4:n` sub-parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnderlineStyle {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

impl UnderlineStyle {
    /// Map the `4:n` sub-parameter to a style
    pub fn from_param(n: u32) -> Option<Self> {
        match n {
            0 => Some(UnderlineStyle::None),
            1 => Some(UnderlineStyle::Single),
            2 => Some(UnderlineStyle::Double),
            3 => Some(UnderlineStyle::Curly),
            4 => Some(UnderlineStyle::Dotted),
            5 => Some(UnderlineStyle::Dashed),
            _ => None,
        }
    }

    /// The `4:n` sub-parameter for this style
    pub fn param(self) -> u32 {
        match self {
            UnderlineStyle::None => 0,
            UnderlineStyle::Single => 1,
            UnderlineStyle::Double => 2,
            UnderlineStyle::Curly => 3,
            UnderlineStyle::Dotted => 4,
            UnderlineStyle::Dashed => 5,
        }
    }

    pub fn is_set(self) -> bool {
        self != UnderlineStyle::None
    }
}

/// Text style attributes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Style {
    pub bold: bool,
    pub faint: bool,
    pub italic: bool,
    pub underline: UnderlineStyle,
    pub blink: bool,
    pub inverse: bool,
    pub hidden: bool,
    pub strikethrough: bool,
}

impl Style {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True when every attribute set in `self` is also set in `other`.
    /// Moving from `self` to `other` then needs no attribute to be turned off.
    pub fn is_subset_of(&self, other: &Style) -> bool {
        (!self.bold || other.bold)
            && (!self.faint || other.faint)
            && (!self.italic || other.italic)
            && (!self.underline.is_set() || other.underline.is_set())
            && (!self.blink || other.blink)
            && (!self.inverse || other.inverse)
            && (!self.hidden || other.hidden)
            && (!self.strikethrough || other.strikethrough)
    }
}

/// Mirroring of a glyph bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GlyphFlip {
    #[default]
    None,
    Horizontal,
    Vertical,
    Both,
}

impl GlyphFlip {
    /// Parse the `h`, `v`, `hv` notation used by the overlay commands
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "" | "none" => Some(GlyphFlip::None),
            "h" => Some(GlyphFlip::Horizontal),
            "v" => Some(GlyphFlip::Vertical),
            "hv" | "vh" => Some(GlyphFlip::Both),
            _ => None,
        }
    }

    pub fn horizontal(self) -> bool {
        matches!(self, GlyphFlip::Horizontal | GlyphFlip::Both)
    }

    pub fn vertical(self) -> bool {
        matches!(self, GlyphFlip::Vertical | GlyphFlip::Both)
    }
}

/// The current pen: attributes applied to every subsequently written cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pen {
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub style: Style,
    pub flip: GlyphFlip,
    pub palette: Option<u16>,
}

impl Pen {
    /// Reset colors and attributes (SGR 0). Overlay pen fields are kept.
    pub fn reset_attributes(&mut self) {
        self.fg = Color::Default;
        self.bg = Color::Default;
        self.underline_color = Color::Default;
        self.style = Style::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANSI: [(u8, u8, u8); 16] = [(1, 1, 1); 16];

    #[test]
    fn test_cell_default() {
        let cell = Cell::default();
        assert!(cell.is_blank());
        assert_eq!(cell.fg, Color::Default);
        assert_eq!(cell.bg, Color::Default);
        assert_eq!(cell.width, 1);
        assert_eq!(cell.visual_width, 1.0);
    }

    #[test]
    fn test_cell_new() {
        let cell = Cell::new('A');
        assert_eq!(cell.text(), "A");
        assert!(!cell.is_blank());
    }

    #[test]
    fn test_cell_combining() {
        let mut cell = Cell::new('e');
        cell.push_combining('\u{301}');
        assert_eq!(cell.text(), "e\u{301}");
        for _ in 0..20 {
            cell.push_combining('\u{301}');
        }
        assert_eq!(cell.combining.len(), 8);
    }

    #[test]
    fn test_cell_erase_keeps_background() {
        let mut cell = Cell::new('A');
        cell.fg = Color::RED;
        cell.style.bold = true;
        cell.erase(Color::BLUE);
        assert!(cell.is_blank());
        assert_eq!(cell.fg, Color::Default);
        assert_eq!(cell.bg, Color::BLUE);
        assert!(!cell.style.bold);
    }

    #[test]
    fn test_cell_with_pen() {
        let mut pen = Pen::default();
        pen.fg = Color::GREEN;
        pen.style.italic = true;
        pen.palette = Some(3);
        let cell = Cell::with_pen('x', &pen);
        assert_eq!(cell.fg, Color::GREEN);
        assert!(cell.style.italic);
        assert_eq!(cell.palette, Some(3));
    }

    #[test]
    fn test_color_indexed_to_rgb() {
        assert_eq!(Color::indexed_to_rgb(3, &ANSI), (1, 1, 1));

        // Test color cube
        assert_eq!(Color::indexed_to_rgb(16, &ANSI), (0, 0, 0));
        assert_eq!(Color::indexed_to_rgb(231, &ANSI), (255, 255, 255));

        // Test grayscale
        assert_eq!(Color::indexed_to_rgb(232, &ANSI), (8, 8, 8));
        assert_eq!(Color::indexed_to_rgb(255, &ANSI), (238, 238, 238));
    }

    #[test]
    fn test_style_subset() {
        let plain = Style::default();
        let mut bold = Style::default();
        bold.bold = true;
        assert!(plain.is_subset_of(&bold));
        assert!(!bold.is_subset_of(&plain));

        let mut curly = Style::default();
        curly.underline = UnderlineStyle::Curly;
        let mut single = Style::default();
        single.underline = UnderlineStyle::Single;
        assert!(curly.is_subset_of(&single));
    }

    #[test]
    fn test_glyph_flip_parse() {
        assert_eq!(GlyphFlip::parse("h"), Some(GlyphFlip::Horizontal));
        assert_eq!(GlyphFlip::parse("vh"), Some(GlyphFlip::Both));
        assert_eq!(GlyphFlip::parse("x"), None);
        assert!(GlyphFlip::Both.horizontal() && GlyphFlip::Both.vertical());
    }

    #[test]
    fn test_pen_reset_keeps_overlay_fields() {
        let mut pen = Pen {
            fg: Color::RED,
            palette: Some(2),
            flip: GlyphFlip::Vertical,
            ..Default::default()
        };
        pen.style.bold = true;
        pen.reset_attributes();
        assert_eq!(pen.fg, Color::Default);
        assert!(!pen.style.bold);
        assert_eq!(pen.palette, Some(2));
        assert_eq!(pen.flip, GlyphFlip::Vertical);
    }
}
