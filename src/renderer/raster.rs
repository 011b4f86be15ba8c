//! Glyph and sprite rasterization
//!
//! Pixel front ends draw custom glyph bitmaps in place of text and
//! composite sprites above the grid. Glyph pixels are palette indices; a
//! pixel resolves through the cell's (or sprite's) palette override and
//! falls back to the color scheme, exactly like indexed text colors. A
//! glyph or palette that does not exist draws nothing.
//!
//! Rasterized pixmaps are kept in a bounded LRU cache keyed by everything
//! that affects their pixels.

use std::sync::Arc;

use tracing::trace;

use crate::core::{
    Buffer, Color, ColorResolver, ColorRole, CropRect, GlyphFlip, LruCache, Overlays, Rgb, Theme,
};

/// Default number of cached pixmaps
pub const DEFAULT_PIXMAP_CACHE: usize = 512;

/// RGBA pixel, alpha 0 is transparent
pub type Rgba = [u8; 4];

/// An owned RGBA image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Pixmap {
    /// A transparent pixmap
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0; 4]; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn set(&mut self, x: u32, y: u32, pixel: Rgba) {
        if x < self.width && y < self.height {
            let index = y as usize * self.width as usize + x as usize;
            self.pixels[index] = pixel;
        }
    }

    pub fn fill(&mut self, pixel: Rgba) {
        self.pixels.iter_mut().for_each(|p| *p = pixel);
    }

    /// Copy the opaque pixels of `src` with its top-left at `(x, y)`,
    /// clipping at every edge
    pub fn blit(&mut self, src: &Pixmap, x: i64, y: i64) {
        for sy in 0..src.height {
            let dy = y + i64::from(sy);
            if dy < 0 || dy >= i64::from(self.height) {
                continue;
            }
            for sx in 0..src.width {
                let dx = x + i64::from(sx);
                if dx < 0 || dx >= i64::from(self.width) {
                    continue;
                }
                if let Some(pixel) = src.get(sx, sy).filter(|p| p[3] != 0) {
                    self.set(dx as u32, dy as u32, pixel);
                }
            }
        }
    }
}

/// Everything that determines a rasterized glyph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PixmapKey {
    codepoint: char,
    palette: Option<u16>,
    flip: GlyphFlip,
    scale: u8,
    crop: Option<CropRect>,
    theme: Theme,
    revision: u64,
}

/// Rasterizes glyph bitmaps and composites sprites
#[derive(Debug)]
pub struct Rasterizer {
    cache: LruCache<PixmapKey, Arc<Pixmap>>,
    cell_width: u32,
    cell_height: u32,
    hits: u64,
    misses: u64,
}

impl Rasterizer {
    /// A rasterizer for cells of the given pixel size
    pub fn new(cell_width: u32, cell_height: u32, cache_capacity: usize) -> Self {
        Self {
            cache: LruCache::new(cache_capacity),
            cell_width: cell_width.max(1),
            cell_height: cell_height.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    /// Cache statistics: (hits, misses, entries)
    pub fn cache_stats(&self) -> (u64, u64, usize) {
        (self.hits, self.misses, self.cache.len())
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// The pixmap for a glyph at a pixel scale, or `None` if the glyph is
    /// not defined
    #[allow(clippy::too_many_arguments)]
    pub fn glyph(
        &mut self,
        overlays: &Overlays,
        resolver: &dyn ColorResolver,
        theme: Theme,
        codepoint: char,
        palette: Option<u16>,
        flip: GlyphFlip,
        scale: u8,
        crop: Option<CropRect>,
    ) -> Option<Arc<Pixmap>> {
        let key = PixmapKey {
            codepoint,
            palette,
            flip,
            scale: scale.max(1),
            crop,
            theme,
            revision: overlays.revision(),
        };
        if let Some(pixmap) = self.cache.get(&key) {
            self.hits += 1;
            return Some(Arc::clone(pixmap));
        }
        self.misses += 1;
        let pixmap = Arc::new(rasterize(overlays, resolver, &key)?);
        trace!(?codepoint, "rasterized glyph");
        self.cache.insert(key, Arc::clone(&pixmap));
        Some(pixmap)
    }

    /// Draw every visible cell whose character has a glyph bitmap, scaled
    /// to fill its cell. Canvas pixel (0, 0) is the viewport's top-left.
    pub fn paint_glyph_cells(&mut self, buffer: &Buffer, canvas: &mut Pixmap) {
        let overlays = buffer.overlays();
        if overlays.counts().1 == 0 {
            return;
        }
        for y in 0..buffer.rows() {
            for x in 0..buffer.cols() {
                let Some(cell) = buffer.visible_cell(x, y) else {
                    continue;
                };
                let Some(bitmap) = overlays.glyph(cell.ch) else {
                    continue;
                };
                // Integer scale that fits the bitmap into the cell
                let fit_w = self.cell_width * u32::from(cell.width.max(1))
                    / u32::from(bitmap.width().max(1));
                let fit_h = self.cell_height / u32::from(bitmap.height().max(1));
                let scale = fit_w.min(fit_h).clamp(1, u32::from(u8::MAX)) as u8;
                if let Some(pixmap) = self.glyph(
                    overlays,
                    buffer.scheme(),
                    buffer.theme(),
                    cell.ch,
                    cell.palette,
                    cell.flip,
                    scale,
                    None,
                ) {
                    let px = i64::from(self.cell_width) * x as i64;
                    let py = i64::from(self.cell_height) * y as i64;
                    canvas.blit(&pixmap, px, py);
                }
            }
        }
    }

    /// Composite all sprites in Z order. A crop rectangle selects the part
    /// of the glyph drawn at the sprite's position. Sprites whose glyph is
    /// missing are skipped; a missing crop rectangle draws the whole glyph.
    pub fn composite_sprites(&mut self, buffer: &Buffer, canvas: &mut Pixmap) {
        let overlays = buffer.overlays();
        for (id, sprite) in overlays.sprites_in_z_order() {
            let crop = sprite.crop.and_then(|c| overlays.crop_rect(c).copied());
            let pixmap = self.glyph(
                overlays,
                buffer.scheme(),
                buffer.theme(),
                sprite.glyph,
                sprite.palette,
                sprite.flip,
                sprite.scale,
                crop,
            );
            match pixmap {
                Some(pixmap) => {
                    let (x, y) = sprite.position.to_pixels(self.cell_width, self.cell_height);
                    canvas.blit(&pixmap, x, y);
                }
                None => trace!(id, "sprite glyph missing"),
            }
        }
    }

    /// Paint glyph cells and sprites onto a canvas sized for the viewport
    pub fn render(&mut self, buffer: &Buffer) -> Pixmap {
        let mut canvas = Pixmap::new(
            self.cell_width * buffer.cols() as u32,
            self.cell_height * buffer.rows() as u32,
        );
        self.paint_glyph_cells(buffer, &mut canvas);
        self.composite_sprites(buffer, &mut canvas);
        canvas
    }
}

fn rasterize(overlays: &Overlays, resolver: &dyn ColorResolver, key: &PixmapKey) -> Option<Pixmap> {
    let bitmap = overlays.glyph(key.codepoint)?;
    let palette = key.palette.and_then(|id| overlays.palette(id));

    let (x0, y0, w, h) = match key.crop {
        Some(c) => {
            let x0 = c.x.min(bitmap.width());
            let y0 = c.y.min(bitmap.height());
            let w = c.width.min(bitmap.width() - x0);
            let h = c.height.min(bitmap.height() - y0);
            (x0, y0, w, h)
        }
        None => (0, 0, bitmap.width(), bitmap.height()),
    };
    let scale = u32::from(key.scale);
    let mut pixmap = Pixmap::new(u32::from(w) * scale, u32::from(h) * scale);

    for sy in 0..h {
        for sx in 0..w {
            let Some(index) = bitmap.pixel(x0 + sx, y0 + sy) else {
                continue;
            };
            let rgb: Rgb =
                resolver.resolve(Color::Indexed(index), ColorRole::Foreground, palette, key.theme);
            let pixel = [rgb.0, rgb.1, rgb.2, 255];
            let dx = if key.flip.horizontal() { w - 1 - sx } else { sx };
            let dy = if key.flip.vertical() { h - 1 - sy } else { sy };
            for oy in 0..scale {
                for ox in 0..scale {
                    pixmap.set(u32::from(dx) * scale + ox, u32::from(dy) * scale + oy, pixel);
                }
            }
        }
    }
    Some(pixmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::Terminal;

    fn term_with_glyph() -> Terminal {
        let mut term = Terminal::new(4, 2, 0);
        term.process(b"\x1b]7000;palette;id=1;colors=ff0000,00ff00\x07");
        term.process(b"\x1b]7000;glyph;cp=0xE000;w=2;h=2;pixels=01.1\x07");
        term
    }

    #[test]
    fn test_glyph_pixels_resolve_through_palette() {
        let term = term_with_glyph();
        let buffer = term.buffer();
        let mut raster = Rasterizer::new(8, 16, 4);
        let pixmap = raster
            .glyph(
                buffer.overlays(),
                buffer.scheme(),
                buffer.theme(),
                '\u{E000}',
                Some(1),
                GlyphFlip::None,
                1,
                None,
            )
            .unwrap();
        assert_eq!(pixmap.get(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(pixmap.get(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(pixmap.get(0, 1), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_glyph_flip_and_scale() {
        let term = term_with_glyph();
        let buffer = term.buffer();
        let mut raster = Rasterizer::new(8, 16, 4);
        let pixmap = raster
            .glyph(
                buffer.overlays(),
                buffer.scheme(),
                buffer.theme(),
                '\u{E000}',
                Some(1),
                GlyphFlip::Horizontal,
                2,
                None,
            )
            .unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (4, 4));
        // Pixel (0,0) of the bitmap lands at the right edge
        assert_eq!(pixmap.get(3, 0), Some([255, 0, 0, 255]));
        assert_eq!(pixmap.get(2, 1), Some([255, 0, 0, 255]));
    }

    #[test]
    fn test_missing_glyph_draws_nothing() {
        let term = Terminal::new(4, 2, 0);
        let buffer = term.buffer();
        let mut raster = Rasterizer::new(8, 16, 4);
        let pixmap = raster.glyph(
            buffer.overlays(),
            buffer.scheme(),
            buffer.theme(),
            'x',
            None,
            GlyphFlip::None,
            1,
            None,
        );
        assert!(pixmap.is_none());
    }

    #[test]
    fn test_cache_hits_and_invalidation() {
        let mut term = term_with_glyph();
        let mut raster = Rasterizer::new(8, 16, 4);
        let lookup = |raster: &mut Rasterizer, term: &Terminal| {
            let b = term.buffer();
            let flip = GlyphFlip::None;
            raster.glyph(b.overlays(), b.scheme(), b.theme(), '\u{E000}', Some(1), flip, 1, None)
        };
        lookup(&mut raster, &term);
        lookup(&mut raster, &term);
        assert_eq!(raster.cache_stats(), (1, 1, 1));

        // Redefining the palette changes the pixels
        term.process(b"\x1b]7000;palette;id=1;colors=0000ff,00ff00\x07");
        let pixmap = lookup(&mut raster, &term).unwrap();
        assert_eq!(pixmap.get(0, 0), Some([0, 0, 255, 255]));
        assert_eq!(raster.cache_stats().1, 2);
    }

    #[test]
    fn test_composite_sprites_in_z_order_with_clipping() {
        let mut term = term_with_glyph();
        term.process(b"\x1b]7000;glyph;cp=0xE001;w=1;h=1;pixels=1\x07");
        // Same spot, the higher Z draws on top
        term.process(b"\x1b]7000;sprite;id=1;glyph=0xE000;palette=1;z=5\x07");
        term.process(b"\x1b]7000;sprite;id=2;glyph=0xE001;palette=1;z=1\x07");
        // One pixel off the left edge, one cell down
        term.process(b"\x1b]7000;sprite;id=3;glyph=0xE000;palette=1;x=-1;y=8\x07");

        let mut raster = Rasterizer::new(8, 16, 16);
        let canvas = raster.render(term.buffer());
        assert_eq!((canvas.width(), canvas.height()), (32, 32));
        assert_eq!(canvas.get(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(canvas.get(1, 0), Some([0, 255, 0, 255]));
        assert_eq!(canvas.get(0, 16), Some([0, 255, 0, 255]));
        assert_eq!(canvas.get(1, 16), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_sprite_crop_selects_region() {
        let mut term = term_with_glyph();
        term.process(b"\x1b]7000;crop;id=1;x=1;y=0;w=1;h=2\x07");
        term.process(b"\x1b]7000;sprite;id=1;glyph=0xE000;palette=1;crop=1;scale=2\x07");
        let mut raster = Rasterizer::new(8, 16, 16);
        let canvas = raster.render(term.buffer());
        // Right column of the glyph (green, green) at scale 2
        assert_eq!(canvas.get(0, 0), Some([0, 255, 0, 255]));
        assert_eq!(canvas.get(1, 3), Some([0, 255, 0, 255]));
        assert_eq!(canvas.get(2, 0), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_paint_glyph_cells() {
        let mut term = term_with_glyph();
        term.process(b"\x1b]7000;pen;palette=1\x07\xee\x80\x80");
        let mut raster = Rasterizer::new(4, 4, 16);
        let canvas = raster.render(term.buffer());
        // A 2x2 glyph in a 4x4 cell is drawn at scale 2
        assert_eq!(canvas.get(0, 0), Some([255, 0, 0, 255]));
        assert_eq!(canvas.get(1, 1), Some([255, 0, 0, 255]));
        assert_eq!(canvas.get(2, 0), Some([0, 255, 0, 255]));
        assert_eq!(canvas.get(0, 2), Some([0, 0, 0, 0]));
    }
}
