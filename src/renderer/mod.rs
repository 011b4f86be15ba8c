//! Renderer Module
//!
//! Turns buffer state into output for a sink. The text path captures a
//! [`FrameSnapshot`] under the buffer lock, then diffs it against what the
//! sink already shows and emits the minimal ANSI byte stream. The pixel
//! path rasterizes custom glyphs and sprites for front ends that draw
//! their own surfaces.
//!
//! Rendering never fails: missing overlay references draw blank and a
//! zero-sized frame renders nothing.

mod ansi;
mod chrome;
mod diff;
mod frame;
mod raster;

pub use ansi::{SgrBuilder, CURSOR_HIDE, CURSOR_SHOW, SGR_RESET};
pub use chrome::{scroll_percent, scrollbar_thumb, status_line, BorderStyle, Chrome, ClipRect};
pub use diff::DiffRenderer;
pub use frame::{FrameAttrs, FrameCell, FrameCursor, FrameSnapshot};
pub use raster::{Pixmap, Rasterizer, Rgba, DEFAULT_PIXMAP_CACHE};
