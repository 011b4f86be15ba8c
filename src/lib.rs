//! Mochi VT Terminal Engine
//!
//! Interprets a byte stream of text and VT100/ANSI/xterm control sequences,
//! keeps the resulting terminal state and renders it as a minimal ANSI
//! byte stream. This crate provides:
//!
//! - `core`: buffer, cells, cursor, scrollback, selection, overlays, themes
//! - `parser`: VT500-style escape sequence parser
//! - `terminal`: executes parsed actions against the buffer
//! - `renderer`: frame capture, differential ANSI output, chrome, rasterizer
//! - `session`: render loop and child-process pump around a shared terminal
//! - `host`: traits for the child process and host terminal collaborators
//! - `input`: key and paste encoding
//! - `app`: configuration

pub mod app;
pub mod core;
pub mod event;
pub mod host;
pub mod input;
pub mod parser;
pub mod renderer;
pub mod session;
pub mod terminal;

pub use event::Event;
pub use session::{Session, SessionError};
pub use terminal::Terminal;
