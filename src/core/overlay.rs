//! Overlay registries
//!
//! Optional layers on top of plain text: palette tables, pixel-art glyph
//! bitmaps keyed by code point, floating sprites, crop rectangles and
//! screen splits. Every registry is keyed by an integer (or a code point)
//! and bounded. Defining a new key while a registry is full is rejected;
//! redefining an existing key always succeeds.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::cell::GlyphFlip;
use super::coords::{ScreenPoint, SplitPoint, SubCellPoint, ViewportPoint};
use super::theme::Rgb;

pub const MAX_PALETTES: usize = 256;
pub const MAX_PALETTE_COLORS: usize = 256;
pub const MAX_GLYPHS: usize = 1024;
pub const MAX_GLYPH_SIZE: u16 = 64;
pub const MAX_SPRITES: usize = 1024;
pub const MAX_SPRITE_SCALE: u8 = 8;
pub const MAX_CROP_RECTS: usize = 256;
pub const MAX_SCREEN_SPLITS: usize = 16;

/// Errors from overlay registry operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OverlayError {
    #[error("{kind} registry is full ({limit} entries)")]
    CapacityExceeded { kind: &'static str, limit: usize },
    #[error("palette must have 1 to {MAX_PALETTE_COLORS} colors, got {0}")]
    InvalidPalette(usize),
    #[error("glyph bitmap {width}x{height} is invalid")]
    InvalidGlyph { width: u16, height: u16 },
    #[error("sprite scale {0} is outside 1..={MAX_SPRITE_SCALE}")]
    InvalidScale(u8),
    #[error("crop rectangle must have a non-zero size")]
    InvalidCrop,
    #[error("screen split must cover at least one row")]
    InvalidSplit,
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: u32 },
}

/// A palette table addressed by cells and sprites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    colors: Vec<Rgb>,
}

impl Palette {
    pub fn new(colors: Vec<Rgb>) -> Result<Self, OverlayError> {
        if colors.is_empty() || colors.len() > MAX_PALETTE_COLORS {
            return Err(OverlayError::InvalidPalette(colors.len()));
        }
        Ok(Self { colors })
    }

    /// Color at `index`, if the palette is that long
    pub fn color(&self, index: u8) -> Option<Rgb> {
        self.colors.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// A pixel-art glyph. Each pixel is a palette index or transparent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphBitmap {
    width: u16,
    height: u16,
    pixels: Vec<Option<u8>>,
}

impl GlyphBitmap {
    pub fn new(width: u16, height: u16, pixels: Vec<Option<u8>>) -> Result<Self, OverlayError> {
        let valid = (1..=MAX_GLYPH_SIZE).contains(&width)
            && (1..=MAX_GLYPH_SIZE).contains(&height)
            && pixels.len() == width as usize * height as usize;
        if !valid {
            return Err(OverlayError::InvalidGlyph { width, height });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Palette index at (x, y); `None` for transparent or out-of-range pixels
    pub fn pixel(&self, x: u16, y: u16) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .flatten()
    }
}

/// A rectangle in glyph pixel space, used to show part of a sprite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl CropRect {
    pub fn contains(&self, x: u16, y: u16) -> bool {
        x >= self.x
            && y >= self.y
            && u32::from(x) < u32::from(self.x) + u32::from(self.width)
            && u32::from(y) < u32::from(self.y) + u32::from(self.height)
    }
}

/// A floating glyph drawn above the grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    /// Code point of the glyph bitmap to draw
    pub glyph: char,
    pub position: SubCellPoint,
    /// Higher values draw later (on top)
    pub z: i32,
    /// Integer pixel scale
    pub scale: u8,
    pub flip: GlyphFlip,
    pub crop: Option<u16>,
    pub palette: Option<u16>,
}

impl Sprite {
    pub fn new(glyph: char, position: SubCellPoint) -> Self {
        Self {
            glyph,
            position,
            z: 0,
            scale: 1,
            flip: GlyphFlip::None,
            crop: None,
            palette: None,
        }
    }
}

/// A viewport band that shows grid content from a different origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSplit {
    /// First viewport row covered by the split
    pub top: usize,
    /// Number of viewport rows covered
    pub rows: usize,
    /// Live grid position shown at the split's top-left corner
    pub origin: ScreenPoint,
}

impl ScreenSplit {
    /// Convert a viewport position into split-relative coordinates
    pub fn to_split(&self, p: ViewportPoint) -> Option<SplitPoint> {
        (p.row >= self.top && p.row - self.top < self.rows).then_some(SplitPoint {
            col: p.col,
            row: p.row - self.top,
        })
    }

    /// The live grid position displayed at a split-relative position
    pub fn to_screen(&self, p: SplitPoint) -> ScreenPoint {
        ScreenPoint::new(
            self.origin.col.saturating_add(p.col),
            self.origin.row.saturating_add(p.row),
        )
    }
}

/// All overlay registries of one buffer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlays {
    palettes: HashMap<u16, Palette>,
    glyphs: HashMap<char, GlyphBitmap>,
    sprites: HashMap<u32, Sprite>,
    crops: HashMap<u16, CropRect>,
    splits: BTreeMap<u16, ScreenSplit>,
    /// Bumped whenever palette, glyph or crop content changes
    #[serde(skip)]
    revision: u64,
}

fn check_capacity<K: std::hash::Hash + Eq, V>(
    map: &HashMap<K, V>,
    key: &K,
    kind: &'static str,
    limit: usize,
) -> Result<(), OverlayError> {
    if !map.contains_key(key) && map.len() >= limit {
        warn!(kind, limit, "overlay registry full, definition rejected");
        return Err(OverlayError::CapacityExceeded { kind, limit });
    }
    Ok(())
}

impl Overlays {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_palette(&mut self, id: u16, palette: Palette) -> Result<(), OverlayError> {
        check_capacity(&self.palettes, &id, "palette", MAX_PALETTES)?;
        self.palettes.insert(id, palette);
        self.revision += 1;
        Ok(())
    }

    pub fn remove_palette(&mut self, id: u16) -> Option<Palette> {
        self.revision += 1;
        self.palettes.remove(&id)
    }

    pub fn palette(&self, id: u16) -> Option<&Palette> {
        self.palettes.get(&id)
    }

    pub fn define_glyph(&mut self, codepoint: char, glyph: GlyphBitmap) -> Result<(), OverlayError> {
        check_capacity(&self.glyphs, &codepoint, "glyph", MAX_GLYPHS)?;
        self.glyphs.insert(codepoint, glyph);
        self.revision += 1;
        Ok(())
    }

    pub fn remove_glyph(&mut self, codepoint: char) -> Option<GlyphBitmap> {
        self.revision += 1;
        self.glyphs.remove(&codepoint)
    }

    pub fn glyph(&self, codepoint: char) -> Option<&GlyphBitmap> {
        self.glyphs.get(&codepoint)
    }

    /// Insert or replace a sprite
    pub fn place_sprite(&mut self, id: u32, sprite: Sprite) -> Result<(), OverlayError> {
        if sprite.scale == 0 || sprite.scale > MAX_SPRITE_SCALE {
            return Err(OverlayError::InvalidScale(sprite.scale));
        }
        check_capacity(&self.sprites, &id, "sprite", MAX_SPRITES)?;
        self.sprites.insert(id, sprite);
        Ok(())
    }

    pub fn move_sprite(&mut self, id: u32, position: SubCellPoint) -> Result<(), OverlayError> {
        let sprite = self
            .sprites
            .get_mut(&id)
            .ok_or(OverlayError::NotFound { kind: "sprite", id })?;
        sprite.position = position;
        Ok(())
    }

    pub fn remove_sprite(&mut self, id: u32) -> Option<Sprite> {
        self.sprites.remove(&id)
    }

    pub fn clear_sprites(&mut self) {
        self.sprites.clear();
    }

    pub fn sprite(&self, id: u32) -> Option<&Sprite> {
        self.sprites.get(&id)
    }

    /// Sprites in draw order: ascending Z, ties broken by id
    pub fn sprites_in_z_order(&self) -> Vec<(u32, &Sprite)> {
        let mut sprites: Vec<(u32, &Sprite)> = self.sprites.iter().map(|(id, s)| (*id, s)).collect();
        sprites.sort_by_key(|(id, s)| (s.z, *id));
        sprites
    }

    pub fn define_crop_rect(&mut self, id: u16, rect: CropRect) -> Result<(), OverlayError> {
        if rect.width == 0 || rect.height == 0 {
            return Err(OverlayError::InvalidCrop);
        }
        check_capacity(&self.crops, &id, "crop rect", MAX_CROP_RECTS)?;
        self.crops.insert(id, rect);
        self.revision += 1;
        Ok(())
    }

    pub fn remove_crop_rect(&mut self, id: u16) -> Option<CropRect> {
        self.revision += 1;
        self.crops.remove(&id)
    }

    pub fn crop_rect(&self, id: u16) -> Option<&CropRect> {
        self.crops.get(&id)
    }

    pub fn define_screen_split(&mut self, id: u16, split: ScreenSplit) -> Result<(), OverlayError> {
        if split.rows == 0 {
            return Err(OverlayError::InvalidSplit);
        }
        if !self.splits.contains_key(&id) && self.splits.len() >= MAX_SCREEN_SPLITS {
            warn!(limit = MAX_SCREEN_SPLITS, "screen split registry full");
            return Err(OverlayError::CapacityExceeded {
                kind: "screen split",
                limit: MAX_SCREEN_SPLITS,
            });
        }
        self.splits.insert(id, split);
        Ok(())
    }

    pub fn remove_screen_split(&mut self, id: u16) -> Option<ScreenSplit> {
        self.splits.remove(&id)
    }

    pub fn clear_screen_splits(&mut self) {
        self.splits.clear();
    }

    pub fn screen_split(&self, id: u16) -> Option<&ScreenSplit> {
        self.splits.get(&id)
    }

    /// The split covering a viewport row. Overlapping splits resolve to
    /// the lowest id.
    pub fn split_at_row(&self, row: usize) -> Option<&ScreenSplit> {
        self.splits
            .values()
            .find(|s| row >= s.top && row - s.top < s.rows)
    }

    pub fn has_splits(&self) -> bool {
        !self.splits.is_empty()
    }

    /// Entry counts: (palettes, glyphs, sprites, crop rects, splits)
    pub fn counts(&self) -> (usize, usize, usize, usize, usize) {
        (
            self.palettes.len(),
            self.glyphs.len(),
            self.sprites.len(),
            self.crops.len(),
            self.splits.len(),
        )
    }

    /// Changes whenever content that affects rasterized pixels changes
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.revision += 1;
        self.palettes.clear();
        self.glyphs.clear();
        self.sprites.clear();
        self.crops.clear();
        self.splits.clear();
    }
}
