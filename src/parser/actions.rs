//! Terminal Actions
//!
//! Semantic operations produced by the parser. The terminal executor
//! applies them to the buffer.

use serde::{Deserialize, Serialize};

use super::extension::OverlayCommand;

/// A terminal action produced by the parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Print a character at the cursor
    Print(char),

    /// Execute a C0 control character
    Control(ControlCode),

    /// Execute a CSI (Control Sequence Introducer) command
    Csi(CsiAction),

    /// Execute an OSC (Operating System Command)
    Osc(OscAction),

    /// Execute an ESC sequence (non-CSI)
    Esc(EscAction),
}

/// C0 control codes with an effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlCode {
    /// BEL
    Bell,
    /// BS
    Backspace,
    /// HT
    Tab,
    /// LF, VT and FF
    LineFeed,
    /// CR
    CarriageReturn,
    /// SO - switch to G1 (charsets are not translated)
    ShiftOut,
    /// SI - switch to G0
    ShiftIn,
}

impl ControlCode {
    /// Map a C0 byte to its control code. Bytes without an effect
    /// (NUL, ENQ, ...) return `None`.
    pub fn from_byte(byte: u8) -> Option<Self> {
        let code = match byte {
            0x07 => ControlCode::Bell,
            0x08 => ControlCode::Backspace,
            0x09 => ControlCode::Tab,
            0x0A..=0x0C => ControlCode::LineFeed,
            0x0D => ControlCode::CarriageReturn,
            0x0E => ControlCode::ShiftOut,
            0x0F => ControlCode::ShiftIn,
            _ => return None,
        };
        Some(code)
    }
}

/// CSI (Control Sequence Introducer) actions
///
/// Parameters are grouped: each `;`-separated parameter is one group, and
/// `:`-separated sub-parameters extend the group (`38:2::255:0:0` is a
/// single group of six values). Empty parameters are 0.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CsiAction {
    pub params: Vec<Vec<u32>>,
    /// Intermediate bytes (0x20-0x2F)
    pub intermediates: Vec<u8>,
    /// Final byte (0x40-0x7E)
    pub final_byte: u8,
    /// Private marker (`?`, `>`, `<`, `=`)
    pub private: Option<u8>,
}

impl CsiAction {
    pub fn new(final_byte: u8) -> Self {
        Self {
            final_byte,
            ..Default::default()
        }
    }

    /// First value of parameter group `index`, or `default` if absent
    pub fn param(&self, index: usize, default: u32) -> u32 {
        self.params
            .get(index)
            .and_then(|group| group.first())
            .copied()
            .unwrap_or(default)
    }

    /// Like [`CsiAction::param`] but 0 also means `default`
    pub fn param_or_default(&self, index: usize, default: u32) -> u32 {
        match self.param(index, 0) {
            0 => default,
            v => v,
        }
    }

    /// First value of every parameter group
    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        self.params.iter().filter_map(|group| group.first().copied())
    }

    pub fn is_private(&self) -> bool {
        self.private == Some(b'?')
    }
}

/// OSC (Operating System Command) actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OscAction {
    /// OSC 0 / OSC 2
    SetTitle(String),

    /// OSC 1
    SetIconName(String),

    /// OSC 7000 overlay management
    Overlay(OverlayCommand),

    /// Unknown, unsupported or malformed OSC
    Unknown { command: Option<u32>, data: String },
}

/// ESC sequence actions (non-CSI)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscAction {
    /// ESC 7 - DECSC
    SaveCursor,

    /// ESC 8 - DECRC
    RestoreCursor,

    /// ESC D - IND
    Index,

    /// ESC M - RI
    ReverseIndex,

    /// ESC E - NEL
    NextLine,

    /// ESC H - HTS
    TabSet,

    /// ESC c - RIS
    FullReset,

    /// ESC = - DECKPAM
    ApplicationKeypad,

    /// ESC > - DECKPNM
    NormalKeypad,

    /// ESC ( / ) / * / + followed by a charset designator
    DesignateCharset { slot: u8, charset: u8 },

    /// ESC # 8 - DECALN
    AlignmentTest,

    /// ESC \ - ST outside a string
    StringTerminator,

    /// Unknown ESC sequence (intermediates plus final byte)
    Unknown(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csi_action_param() {
        let mut csi = CsiAction::new(b'H');
        csi.params = vec![vec![10], vec![20]];

        assert_eq!(csi.param(0, 1), 10);
        assert_eq!(csi.param(1, 1), 20);
        assert_eq!(csi.param(2, 1), 1);
    }

    #[test]
    fn test_csi_action_param_or_default() {
        let mut csi = CsiAction::new(b'H');
        csi.params = vec![vec![0], vec![5]];

        assert_eq!(csi.param_or_default(0, 1), 1);
        assert_eq!(csi.param_or_default(1, 1), 5);
        assert_eq!(csi.param_or_default(2, 1), 1);
    }

    #[test]
    fn test_control_codes() {
        assert_eq!(ControlCode::from_byte(0x0B), Some(ControlCode::LineFeed));
        assert_eq!(ControlCode::from_byte(0x07), Some(ControlCode::Bell));
        assert_eq!(ControlCode::from_byte(0x00), None);
    }

    #[test]
    fn test_action_serialization() {
        let action = Action::Csi(CsiAction {
            params: vec![vec![1], vec![38, 2, 0, 255, 0, 0]],
            intermediates: vec![],
            final_byte: b'm',
            private: None,
        });

        let json = serde_json::to_string(&action).unwrap();
        let restored: Action = serde_json::from_str(&json).unwrap();

        assert_eq!(action, restored);
    }
}
