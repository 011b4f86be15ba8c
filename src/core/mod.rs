//! Terminal Core Module
//!
//! Platform-independent terminal state. This module contains:
//! - The buffer (live grids, scrollback, viewport offsets, selection)
//! - Cell representation with attributes and width policy
//! - Cursor state and positioning
//! - Coordinate spaces and their conversions
//! - Overlays (palettes, custom glyphs, sprites, screen splits)
//! - Color themes
//! - Deterministic snapshot generation
//!
//! The core is deterministic: given the same sequence of operations, it
//! always produces the same state.

mod buffer;
mod cell;
mod coords;
mod cursor;
mod lru;
mod modes;
mod overlay;
mod scrollback;
mod selection;
mod snapshot;
mod theme;
mod width;

pub use buffer::Buffer;
pub use cell::{Cell, Color, GlyphFlip, Pen, Style, UnderlineStyle};
pub use coords::{
    BufferPoint, RowLocation, ScreenPoint, SplitPoint, SubCellPoint, Viewport, ViewportPoint,
    SUBCELL_UNITS,
};
pub use cursor::{Bounds, Cursor, CursorShape, SavedCursor};
pub use lru::LruCache;
pub use modes::{AnsiMode, DecMode, Modes};
pub use overlay::{
    CropRect, GlyphBitmap, OverlayError, Overlays, Palette, ScreenSplit, Sprite, MAX_CROP_RECTS,
    MAX_GLYPHS, MAX_GLYPH_SIZE, MAX_PALETTES, MAX_PALETTE_COLORS, MAX_SCREEN_SPLITS, MAX_SPRITES,
    MAX_SPRITE_SCALE,
};
pub use scrollback::{Line, Scrollback};
pub use selection::{Selection, SelectionKind};
pub use snapshot::Snapshot;
pub use theme::{resolve_cell, ColorResolver, ColorRole, ColorScheme, ResolvedColors, Rgb, Theme};
pub use width::{classify, AmbiguousWidth, Measure, WidthClass, WidthMode, WidthPolicy};
