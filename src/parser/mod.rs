//! Terminal escape sequence parser
//!
//! A stateful parser that converts bytes into terminal actions.
//! Based on the VT500-series parser model from <https://vt100.net/emu/dec_ansi_parser>

mod actions;
mod extension;
mod sgr;
mod state;

pub use actions::{Action, ControlCode, CsiAction, EscAction, OscAction};
pub use extension::{OverlayCommand, SpriteUpdate, OVERLAY_OSC};
pub use sgr::{parse_sgr, SgrAttribute};
pub use state::{Parser, MAX_OSC_LEN, MAX_PARAMS};
