//! Private OSC 7000 overlay commands
//!
//! `OSC 7000 ; <object> ; key=value ; ... ST` manages the overlay
//! registries. Terminals that do not know code 7000 ignore the whole
//! sequence, so programs can emit it unconditionally.
//!
//! ```text
//! palette;id=N;colors=RRGGBB,RRGGBB,...    palette;id=N;delete
//! glyph;cp=N;w=W;h=H;pixels=0123.         glyph;cp=N;delete
//! sprite;id=N;x=..;y=..;z=..;glyph=..;scale=..;flip=h|v|hv;crop=..;palette=..
//! sprite;id=N;delete                       sprite;clear
//! crop;id=N;x=..;y=..;w=..;h=..            crop;id=N;delete
//! split;id=N;top=..;rows=..;origin_row=..;origin_col=..
//! split;id=N;delete                        split;clear
//! pen;palette=N;flip=..                    pen;reset
//! theme;dark                               theme;light
//! ```
//!
//! Numbers are decimal or `0x` hexadecimal. Glyph pixels are one hex digit
//! per pixel naming a palette index, `.` for transparent. Sprite positions
//! are in sub-cell units.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{CropRect, GlyphFlip, Rgb, ScreenPoint, ScreenSplit, Sprite, SubCellPoint, Theme};

/// OSC code of the overlay command family
pub const OVERLAY_OSC: u32 = 7000;

/// Sprite fields given by a `sprite` command. Absent fields keep the
/// existing sprite's value (or the default for a new sprite).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteUpdate {
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub z: Option<i32>,
    pub glyph: Option<char>,
    pub scale: Option<u8>,
    pub flip: Option<GlyphFlip>,
    pub crop: Option<u16>,
    pub palette: Option<u16>,
}

impl SpriteUpdate {
    /// Whether the update only changes the position
    pub fn is_move(&self) -> bool {
        self.z.is_none()
            && self.glyph.is_none()
            && self.scale.is_none()
            && self.flip.is_none()
            && self.crop.is_none()
            && self.palette.is_none()
    }

    /// Apply the given fields to an existing sprite
    pub fn apply(&self, sprite: &mut Sprite) {
        let position = SubCellPoint::new(
            self.x.unwrap_or(sprite.position.x),
            self.y.unwrap_or(sprite.position.y),
        );
        sprite.position = position;
        if let Some(z) = self.z {
            sprite.z = z;
        }
        if let Some(glyph) = self.glyph {
            sprite.glyph = glyph;
        }
        if let Some(scale) = self.scale {
            sprite.scale = scale;
        }
        if let Some(flip) = self.flip {
            sprite.flip = flip;
        }
        if self.crop.is_some() {
            sprite.crop = self.crop;
        }
        if self.palette.is_some() {
            sprite.palette = self.palette;
        }
    }

    /// Build a new sprite. A glyph is required.
    pub fn to_sprite(&self) -> Option<Sprite> {
        let mut sprite = Sprite::new(self.glyph?, SubCellPoint::new(0, 0));
        self.apply(&mut sprite);
        Some(sprite)
    }
}

/// A decoded overlay command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OverlayCommand {
    DefinePalette { id: u16, colors: Vec<Rgb> },
    DeletePalette(u16),
    DefineGlyph {
        codepoint: char,
        width: u16,
        height: u16,
        pixels: Vec<Option<u8>>,
    },
    DeleteGlyph(char),
    /// Place a new sprite or update an existing one
    Sprite { id: u32, update: SpriteUpdate },
    DeleteSprite(u32),
    ClearSprites,
    DefineCrop { id: u16, rect: CropRect },
    DeleteCrop(u16),
    DefineSplit { id: u16, split: ScreenSplit },
    DeleteSplit(u16),
    ClearSplits,
    /// Palette override and flip applied to subsequently written cells
    Pen {
        palette: Option<u16>,
        flip: Option<GlyphFlip>,
    },
    PenReset,
    SetTheme(Theme),
}

/// `key=value` arguments plus bare words
struct Args<'a> {
    pairs: Vec<(&'a str, &'a str)>,
    words: Vec<&'a str>,
}

impl<'a> Args<'a> {
    fn parse(parts: impl Iterator<Item = &'a str>) -> Self {
        let mut pairs = Vec::new();
        let mut words = Vec::new();
        for part in parts.map(str::trim).filter(|p| !p.is_empty()) {
            match part.split_once('=') {
                Some((k, v)) => pairs.push((k.trim(), v.trim())),
                None => words.push(part),
            }
        }
        Self { pairs, words }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().rev().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn has_word(&self, word: &str) -> bool {
        self.words.contains(&word)
    }

    fn unsigned<T: TryFrom<u64>>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(parse_unsigned).and_then(|v| T::try_from(v).ok())
    }

    fn signed(&self, key: &str) -> Option<i32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    fn codepoint(&self, key: &str) -> Option<char> {
        self.unsigned::<u32>(key).and_then(char::from_u32)
    }
}

fn parse_unsigned(s: &str) -> Option<u64> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_rgb(s: &str) -> Option<Rgb> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

fn parse_pixels(s: &str) -> Option<Vec<Option<u8>>> {
    s.chars()
        .map(|c| match c {
            '.' => Some(None),
            c => c.to_digit(16).map(|d| Some(d as u8)),
        })
        .collect()
}

impl OverlayCommand {
    /// Decode the payload that follows `7000;`. Malformed or unknown
    /// commands return `None`.
    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.split(';');
        let object = parts.next()?.trim();
        let args = Args::parse(parts);
        let command = match object {
            "palette" => Self::parse_palette(&args),
            "glyph" => Self::parse_glyph(&args),
            "sprite" => Self::parse_sprite(&args),
            "crop" => Self::parse_crop(&args),
            "split" => Self::parse_split(&args),
            "pen" => Self::parse_pen(&args),
            "theme" => args
                .words
                .first()
                .and_then(|w| Theme::parse(w))
                .map(OverlayCommand::SetTheme),
            _ => None,
        };
        if command.is_none() {
            debug!(payload, "malformed overlay command");
        }
        command
    }

    fn parse_palette(args: &Args) -> Option<Self> {
        let id = args.unsigned("id")?;
        if args.has_word("delete") {
            return Some(OverlayCommand::DeletePalette(id));
        }
        let colors = args
            .get("colors")?
            .split(',')
            .map(parse_rgb)
            .collect::<Option<Vec<_>>>()?;
        Some(OverlayCommand::DefinePalette { id, colors })
    }

    fn parse_glyph(args: &Args) -> Option<Self> {
        let codepoint = args.codepoint("cp")?;
        if args.has_word("delete") {
            return Some(OverlayCommand::DeleteGlyph(codepoint));
        }
        let width: u16 = args.unsigned("w")?;
        let height: u16 = args.unsigned("h")?;
        let pixels = parse_pixels(args.get("pixels")?)?;
        Some(OverlayCommand::DefineGlyph {
            codepoint,
            width,
            height,
            pixels,
        })
    }

    fn parse_sprite(args: &Args) -> Option<Self> {
        if args.has_word("clear") {
            return Some(OverlayCommand::ClearSprites);
        }
        let id = args.unsigned("id")?;
        if args.has_word("delete") {
            return Some(OverlayCommand::DeleteSprite(id));
        }
        let flip = match args.get("flip") {
            Some(f) => Some(GlyphFlip::parse(f)?),
            None => None,
        };
        let update = SpriteUpdate {
            x: args.signed("x"),
            y: args.signed("y"),
            z: args.signed("z"),
            glyph: args.codepoint("glyph"),
            scale: args.unsigned("scale"),
            flip,
            crop: args.unsigned("crop"),
            palette: args.unsigned("palette"),
        };
        Some(OverlayCommand::Sprite { id, update })
    }

    fn parse_crop(args: &Args) -> Option<Self> {
        let id = args.unsigned("id")?;
        if args.has_word("delete") {
            return Some(OverlayCommand::DeleteCrop(id));
        }
        let rect = CropRect {
            x: args.unsigned("x").unwrap_or(0),
            y: args.unsigned("y").unwrap_or(0),
            width: args.unsigned("w")?,
            height: args.unsigned("h")?,
        };
        Some(OverlayCommand::DefineCrop { id, rect })
    }

    fn parse_split(args: &Args) -> Option<Self> {
        if args.has_word("clear") {
            return Some(OverlayCommand::ClearSplits);
        }
        let id = args.unsigned("id")?;
        if args.has_word("delete") {
            return Some(OverlayCommand::DeleteSplit(id));
        }
        let split = ScreenSplit {
            top: args.unsigned("top")?,
            rows: args.unsigned("rows")?,
            origin: ScreenPoint::new(
                args.unsigned("origin_col").unwrap_or(0),
                args.unsigned("origin_row").unwrap_or(0),
            ),
        };
        Some(OverlayCommand::DefineSplit { id, split })
    }

    fn parse_pen(args: &Args) -> Option<Self> {
        if args.has_word("reset") {
            return Some(OverlayCommand::PenReset);
        }
        let flip = match args.get("flip") {
            Some(f) => Some(GlyphFlip::parse(f)?),
            None => None,
        };
        let palette = args.unsigned("palette");
        if flip.is_none() && palette.is_none() {
            return None;
        }
        Some(OverlayCommand::Pen { palette, flip })
    }
}
