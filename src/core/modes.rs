//! Terminal mode flags
//!
//! Mode numbers arrive through `CSI ? Pm h/l` (DEC private) and `CSI Pm h/l`
//! (ANSI). Modes that only flip a flag live in [`Modes`]; the ones that
//! change cursor or grid behavior are applied by the buffer.

use serde::{Deserialize, Serialize};

/// Flags that change how input is encoded or how LF behaves
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modes {
    /// DECCKM - cursor keys send `ESC O` sequences
    pub application_cursor: bool,
    /// DECKPAM/DECKPNM - keypad sends application sequences
    pub application_keypad: bool,
    /// Bracketed paste (DECSET 2004)
    pub bracketed_paste: bool,
    /// LNM - LF also performs CR
    pub linefeed_newline: bool,
}

impl Modes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// DEC private modes understood by the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecMode {
    ApplicationCursor,
    Origin,
    Autowrap,
    CursorBlink,
    CursorVisible,
    /// `?47`: switch screens without clearing
    AlternateScreen,
    /// `?1047`: switch screens, clearing the alternate grid
    AlternateScreenClear,
    /// `?1049`: save cursor, switch and clear
    AlternateScreenSaveCursor,
    BracketedPaste,
    /// `?7700`: one grid column per character, fractional visual width
    FlexibleWidth,
    /// `?7701`: East-Asian ambiguous characters are wide
    AmbiguousWide,
    /// `?7702`: ambiguous characters inherit the preceding cell's width
    AmbiguousAuto,
}

impl DecMode {
    pub fn from_param(param: u32) -> Option<Self> {
        let mode = match param {
            1 => DecMode::ApplicationCursor,
            6 => DecMode::Origin,
            7 => DecMode::Autowrap,
            12 => DecMode::CursorBlink,
            25 => DecMode::CursorVisible,
            47 => DecMode::AlternateScreen,
            1047 => DecMode::AlternateScreenClear,
            1049 => DecMode::AlternateScreenSaveCursor,
            2004 => DecMode::BracketedPaste,
            7700 => DecMode::FlexibleWidth,
            7701 => DecMode::AmbiguousWide,
            7702 => DecMode::AmbiguousAuto,
            _ => return None,
        };
        Some(mode)
    }

    pub fn param(self) -> u32 {
        match self {
            DecMode::ApplicationCursor => 1,
            DecMode::Origin => 6,
            DecMode::Autowrap => 7,
            DecMode::CursorBlink => 12,
            DecMode::CursorVisible => 25,
            DecMode::AlternateScreen => 47,
            DecMode::AlternateScreenClear => 1047,
            DecMode::AlternateScreenSaveCursor => 1049,
            DecMode::BracketedPaste => 2004,
            DecMode::FlexibleWidth => 7700,
            DecMode::AmbiguousWide => 7701,
            DecMode::AmbiguousAuto => 7702,
        }
    }
}

/// ANSI modes understood by the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnsiMode {
    /// IRM
    Insert,
    /// LNM
    LinefeedNewline,
}

impl AnsiMode {
    pub fn from_param(param: u32) -> Option<Self> {
        match param {
            4 => Some(AnsiMode::Insert),
            20 => Some(AnsiMode::LinefeedNewline),
            _ => None,
        }
    }
}
