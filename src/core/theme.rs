//! Theme and color resolution
//!
//! Cells declare colors as default, indexed or RGB values. Turning one into
//! a concrete RGB triple is a pure function of the declared color, the
//! cell's palette override, the active [`ColorScheme`] and the [`Theme`]
//! flag, with this fallback order:
//!
//! 1. direct RGB is used as-is
//! 2. an indexed color uses the cell's palette override entry when that
//!    palette exists and holds the index, otherwise the scheme's 256-color table
//! 3. the default color uses the scheme default for the current theme

use serde::{Deserialize, Serialize};

use super::cell::{Cell, Color};
use super::overlay::{Overlays, Palette};

/// An RGB triple
pub type Rgb = (u8, u8, u8);

/// Light/dark theme flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dark" => Some(Theme::Dark),
            "light" => Some(Theme::Light),
            _ => None,
        }
    }
}

/// Which side of the cell a color is resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    Foreground,
    Background,
}

/// Color scheme: default colors per theme plus the 16 ANSI colors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,
    pub dark_foreground: Rgb,
    pub dark_background: Rgb,
    pub light_foreground: Rgb,
    pub light_background: Rgb,
    /// The 16 ANSI colors (0-15)
    pub ansi: [Rgb; 16],
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::xterm()
    }
}

impl ColorScheme {
    /// xterm's stock colors
    pub fn xterm() -> Self {
        Self {
            name: "xterm".to_string(),
            dark_foreground: (229, 229, 229),
            dark_background: (0, 0, 0),
            light_foreground: (0, 0, 0),
            light_background: (255, 255, 255),
            ansi: [
                (0, 0, 0),       // 0: Black
                (205, 0, 0),     // 1: Red
                (0, 205, 0),     // 2: Green
                (205, 205, 0),   // 3: Yellow
                (0, 0, 238),     // 4: Blue
                (205, 0, 205),   // 5: Magenta
                (0, 205, 205),   // 6: Cyan
                (229, 229, 229), // 7: White
                (127, 127, 127), // 8: Bright Black
                (255, 0, 0),     // 9: Bright Red
                (0, 255, 0),     // 10: Bright Green
                (255, 255, 0),   // 11: Bright Yellow
                (92, 92, 255),   // 12: Bright Blue
                (255, 0, 255),   // 13: Bright Magenta
                (0, 255, 255),   // 14: Bright Cyan
                (255, 255, 255), // 15: Bright White
            ],
        }
    }

    /// Get the RGB color for an indexed color (0-255)
    pub fn indexed(&self, index: u8) -> Rgb {
        Color::indexed_to_rgb(index, &self.ansi)
    }

    /// The default color for a role under a theme
    pub fn default_color(&self, theme: Theme, role: ColorRole) -> Rgb {
        match (theme, role) {
            (Theme::Dark, ColorRole::Foreground) => self.dark_foreground,
            (Theme::Dark, ColorRole::Background) => self.dark_background,
            (Theme::Light, ColorRole::Foreground) => self.light_foreground,
            (Theme::Light, ColorRole::Background) => self.light_background,
        }
    }
}

/// Maps a declared color to a concrete RGB value
pub trait ColorResolver {
    fn resolve(&self, color: Color, role: ColorRole, palette: Option<&Palette>, theme: Theme) -> Rgb;
}

impl ColorResolver for ColorScheme {
    fn resolve(&self, color: Color, role: ColorRole, palette: Option<&Palette>, theme: Theme) -> Rgb {
        match color {
            Color::Rgb(r, g, b) => (r, g, b),
            Color::Indexed(i) => palette
                .and_then(|p| p.color(i))
                .unwrap_or_else(|| self.indexed(i)),
            Color::Default => self.default_color(theme, role),
        }
    }
}

/// Concrete colors for one cell as it is displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColors {
    pub fg: Rgb,
    pub bg: Rgb,
    /// `None` when the underline follows the foreground
    pub underline: Option<Rgb>,
}

/// Resolve a cell's displayed colors, applying reverse video and hidden text
pub fn resolve_cell(
    cell: &Cell,
    overlays: &Overlays,
    resolver: &dyn ColorResolver,
    theme: Theme,
) -> ResolvedColors {
    let palette = cell.palette.and_then(|id| overlays.palette(id));
    let mut fg = resolver.resolve(cell.fg, ColorRole::Foreground, palette, theme);
    let mut bg = resolver.resolve(cell.bg, ColorRole::Background, palette, theme);
    if cell.style.inverse {
        std::mem::swap(&mut fg, &mut bg);
    }
    if cell.style.hidden {
        fg = bg;
    }
    let underline = match cell.underline_color {
        Color::Default => None,
        color => Some(resolver.resolve(color, ColorRole::Foreground, palette, theme)),
    };
    ResolvedColors { fg, bg, underline }
}
