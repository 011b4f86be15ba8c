//! Parser State Machine
//!
//! Implements a VT500-series compatible parser state machine. The parser
//! handles arbitrary chunk boundaries (all state lives in [`Parser`]) and
//! produces semantic actions for the terminal executor.
//!
//! # State Machine
//!
//! The parser follows the state machine model described in:
//! - "A parser for DEC's ANSI-compatible video terminals" by Paul Williams
//! - https://vt100.net/emu/dec_ansi_parser
//!
//! States:
//! - Ground: Normal text processing (UTF-8 decoding)
//! - Escape: After ESC, waiting for next byte
//! - EscapeIntermediate: ESC followed by intermediate bytes
//! - CsiEntry: After CSI (ESC [), collecting parameters
//! - CsiParam: Collecting CSI parameters
//! - CsiIntermediate: CSI with intermediate bytes
//! - CsiIgnore: Malformed CSI, consumed up to its final byte
//! - OscString: Collecting OSC payload
//! - IgnoreString: DCS/SOS/PM/APC payload, consumed without effect
//!
//! Deviations from the reference diagram: ESC inside a string terminates the
//! string (so `ESC \` works as ST without losing the payload), and 8-bit C1
//! controls are not recognized. Input is always UTF-8, so a stray byte in
//! 0x80-0x9F prints U+FFFD instead of starting a sequence.

use tracing::{debug, trace};

use super::actions::{Action, ControlCode, CsiAction, EscAction, OscAction};
use super::extension::{OverlayCommand, OVERLAY_OSC};

/// Maximum number of parameter values (including sub-parameters) kept
/// for one sequence
pub const MAX_PARAMS: usize = 32;

/// Maximum OSC payload in bytes
pub const MAX_OSC_LEN: usize = 64 * 1024;

const MAX_INTERMEDIATES: usize = 2;

const REPLACEMENT: char = '\u{FFFD}';

/// Parser state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    OscString,
    IgnoreString,
}

/// The terminal parser
#[derive(Debug)]
pub struct Parser {
    state: State,
    /// Intermediate bytes collected during parsing
    intermediates: Vec<u8>,
    /// Private marker of the current CSI
    private: Option<u8>,
    /// Completed parameter groups
    params: Vec<Vec<u32>>,
    /// Group being collected (`:`-joined values)
    group: Vec<u32>,
    /// Current parameter being built
    current_param: u32,
    /// Whether anything (digit or separator) was seen for the parameters
    params_started: bool,
    /// Values stored so far across all groups
    param_count: usize,
    /// OSC payload
    osc_string: Vec<u8>,
    /// The OSC payload exceeded `MAX_OSC_LEN`
    osc_overflow: bool,
    /// UTF-8 decoder state
    utf8_buffer: Vec<u8>,
    utf8_remaining: u8,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Create a new parser in the ground state
    pub fn new() -> Self {
        Self {
            state: State::Ground,
            intermediates: Vec::with_capacity(MAX_INTERMEDIATES),
            private: None,
            params: Vec::with_capacity(16),
            group: Vec::with_capacity(4),
            current_param: 0,
            params_started: false,
            param_count: 0,
            osc_string: Vec::with_capacity(256),
            osc_overflow: false,
            utf8_buffer: Vec::with_capacity(4),
            utf8_remaining: 0,
        }
    }

    /// Reset the parser to the ground state
    pub fn reset(&mut self) {
        self.state = State::Ground;
        self.clear_params();
        self.clear_osc();
        self.utf8_buffer.clear();
        self.utf8_remaining = 0;
    }

    /// Whether the parser is between sequences
    pub fn is_ground(&self) -> bool {
        self.state == State::Ground && self.utf8_remaining == 0
    }

    fn clear_params(&mut self) {
        self.intermediates.clear();
        self.private = None;
        self.params.clear();
        self.group.clear();
        self.current_param = 0;
        self.params_started = false;
        self.param_count = 0;
    }

    fn clear_osc(&mut self) {
        self.osc_string.clear();
        self.osc_overflow = false;
    }

    /// Process a chunk of bytes, returning actions
    pub fn parse(&mut self, data: &[u8]) -> Vec<Action> {
        let mut actions = Vec::new();
        self.parse_into(data, &mut actions);
        actions
    }

    /// Process a chunk of bytes, appending actions to `out`
    pub fn parse_into(&mut self, data: &[u8], out: &mut Vec<Action>) {
        for &byte in data {
            self.advance(byte, out);
        }
    }

    /// Process a single byte
    fn advance(&mut self, byte: u8, out: &mut Vec<Action>) {
        if self.utf8_remaining > 0 {
            if (0x80..=0xBF).contains(&byte) {
                self.utf8_buffer.push(byte);
                self.utf8_remaining -= 1;
                if self.utf8_remaining == 0 {
                    out.push(Action::Print(self.finish_utf8()));
                }
                return;
            }
            // Truncated sequence: replace it and reprocess this byte
            self.utf8_buffer.clear();
            self.utf8_remaining = 0;
            out.push(Action::Print(REPLACEMENT));
        }

        let in_string = matches!(self.state, State::OscString | State::IgnoreString);

        match byte {
            0x18 | 0x1A => {
                // CAN, SUB - cancel the current sequence
                if self.state != State::Ground {
                    trace!("sequence cancelled");
                }
                self.state = State::Ground;
                self.clear_osc();
            }
            0x1B => {
                if in_string {
                    // ESC ends the string; the following `\` completes ST
                    self.terminate_string(out);
                }
                self.state = State::Escape;
                self.clear_params();
            }
            0x07 if self.state == State::OscString => self.terminate_string(out),
            0x00..=0x1F => {
                if !in_string {
                    if let Some(code) = ControlCode::from_byte(byte) {
                        out.push(Action::Control(code));
                    }
                }
            }
            0x9C if self.state == State::IgnoreString => self.terminate_string(out),
            _ => match self.state {
                State::Ground => self.process_ground(byte, out),
                State::Escape => self.process_escape(byte, out),
                State::EscapeIntermediate => self.process_escape_intermediate(byte, out),
                State::CsiEntry => self.process_csi_entry(byte, out),
                State::CsiParam => self.process_csi_param(byte, out),
                State::CsiIntermediate => self.process_csi_intermediate(byte, out),
                State::CsiIgnore => self.process_csi_ignore(byte),
                State::OscString => self.process_osc_string(byte),
                State::IgnoreString => {}
            },
        }
    }

    /// Process bytes in ground state (text)
    fn process_ground(&mut self, byte: u8, out: &mut Vec<Action>) {
        match byte {
            0x20..=0x7E => out.push(Action::Print(byte as char)),
            0x7F => {}
            0xC2..=0xDF => self.start_utf8(byte, 1),
            0xE0..=0xEF => self.start_utf8(byte, 2),
            0xF0..=0xF4 => self.start_utf8(byte, 3),
            // Stray continuation bytes and bytes that never start UTF-8
            _ => out.push(Action::Print(REPLACEMENT)),
        }
    }

    fn start_utf8(&mut self, byte: u8, remaining: u8) {
        self.utf8_buffer.clear();
        self.utf8_buffer.push(byte);
        self.utf8_remaining = remaining;
    }

    /// Decode the completed UTF-8 sequence. Overlong forms and surrogates
    /// decode to U+FFFD.
    fn finish_utf8(&mut self) -> char {
        let c = std::str::from_utf8(&self.utf8_buffer)
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(REPLACEMENT);
        self.utf8_buffer.clear();
        c
    }

    /// Process bytes in escape state
    fn process_escape(&mut self, byte: u8, out: &mut Vec<Action>) {
        match byte {
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = State::EscapeIntermediate;
            }
            b'[' => {
                self.state = State::CsiEntry;
                self.clear_params();
            }
            b']' => {
                self.state = State::OscString;
                self.clear_osc();
            }
            b'P' | b'X' | b'^' | b'_' => {
                // DCS, SOS, PM, APC
                self.state = State::IgnoreString;
            }
            0x30..=0x7E => {
                self.state = State::Ground;
                self.dispatch_esc(byte, out);
            }
            _ => self.state = State::Ground,
        }
    }

    /// Process bytes in escape intermediate state
    fn process_escape_intermediate(&mut self, byte: u8, out: &mut Vec<Action>) {
        match byte {
            0x20..=0x2F => {
                if self.intermediates.len() < MAX_INTERMEDIATES {
                    self.intermediates.push(byte);
                }
            }
            0x30..=0x7E => {
                self.state = State::Ground;
                self.dispatch_esc(byte, out);
            }
            _ => self.state = State::Ground,
        }
    }

    /// Dispatch ESC sequence
    fn dispatch_esc(&mut self, final_byte: u8, out: &mut Vec<Action>) {
        let action = match (self.intermediates.as_slice(), final_byte) {
            ([], b'7') => EscAction::SaveCursor,
            ([], b'8') => EscAction::RestoreCursor,
            ([], b'D') => EscAction::Index,
            ([], b'M') => EscAction::ReverseIndex,
            ([], b'E') => EscAction::NextLine,
            ([], b'H') => EscAction::TabSet,
            ([], b'c') => EscAction::FullReset,
            ([], b'=') => EscAction::ApplicationKeypad,
            ([], b'>') => EscAction::NormalKeypad,
            ([], b'\\') => EscAction::StringTerminator,
            ([b'#'], b'8') => EscAction::AlignmentTest,
            ([slot @ (b'(' | b')' | b'*' | b'+')], charset) => EscAction::DesignateCharset {
                slot: *slot,
                charset,
            },
            (intermediates, _) => {
                let mut seq = intermediates.to_vec();
                seq.push(final_byte);
                EscAction::Unknown(seq)
            }
        };
        out.push(Action::Esc(action));
    }

    /// Store the current value in the current group, respecting the cap
    fn finish_param(&mut self) {
        if self.param_count < MAX_PARAMS {
            self.group.push(self.current_param);
            self.param_count += 1;
        }
        self.current_param = 0;
    }

    fn finish_group(&mut self) {
        if !self.group.is_empty() {
            self.params.push(std::mem::take(&mut self.group));
        }
    }

    fn push_digit(&mut self, byte: u8) {
        self.current_param = self
            .current_param
            .saturating_mul(10)
            .saturating_add(u32::from(byte - b'0'));
        self.params_started = true;
    }

    /// Process bytes in CSI entry state
    fn process_csi_entry(&mut self, byte: u8, out: &mut Vec<Action>) {
        match byte {
            b'?' | b'>' | b'<' | b'=' => {
                self.private = Some(byte);
                self.state = State::CsiParam;
            }
            _ => {
                self.state = State::CsiParam;
                self.process_csi_param(byte, out);
            }
        }
    }

    /// Process bytes in CSI param state
    fn process_csi_param(&mut self, byte: u8, out: &mut Vec<Action>) {
        match byte {
            b'0'..=b'9' => self.push_digit(byte),
            b';' => {
                self.params_started = true;
                self.finish_param();
                self.finish_group();
            }
            b':' => {
                self.params_started = true;
                self.finish_param();
            }
            0x20..=0x2F => {
                self.end_params();
                self.intermediates.push(byte);
                self.state = State::CsiIntermediate;
            }
            0x40..=0x7E => {
                self.end_params();
                self.state = State::Ground;
                self.dispatch_csi(byte, out);
            }
            // Private markers in the wrong position
            _ => self.state = State::CsiIgnore,
        }
    }

    fn end_params(&mut self) {
        if self.params_started {
            self.finish_param();
            self.finish_group();
            self.params_started = false;
        }
    }

    /// Process bytes in CSI intermediate state
    fn process_csi_intermediate(&mut self, byte: u8, out: &mut Vec<Action>) {
        match byte {
            0x20..=0x2F if self.intermediates.len() < MAX_INTERMEDIATES => {
                self.intermediates.push(byte);
            }
            0x40..=0x7E => {
                self.state = State::Ground;
                self.dispatch_csi(byte, out);
            }
            _ => self.state = State::CsiIgnore,
        }
    }

    /// Process bytes in CSI ignore state
    fn process_csi_ignore(&mut self, byte: u8) {
        if (0x40..=0x7E).contains(&byte) {
            self.state = State::Ground;
        }
    }

    /// Dispatch CSI sequence
    fn dispatch_csi(&mut self, final_byte: u8, out: &mut Vec<Action>) {
        out.push(Action::Csi(CsiAction {
            params: std::mem::take(&mut self.params),
            intermediates: std::mem::take(&mut self.intermediates),
            final_byte,
            private: self.private.take(),
        }));
        self.clear_params();
    }

    /// Process bytes in OSC string state
    fn process_osc_string(&mut self, byte: u8) {
        if self.osc_string.len() < MAX_OSC_LEN {
            self.osc_string.push(byte);
        } else if !self.osc_overflow {
            debug!("OSC payload exceeds {} bytes, discarding", MAX_OSC_LEN);
            self.osc_overflow = true;
        }
    }

    /// End the current string state, dispatching an OSC if one was collected
    fn terminate_string(&mut self, out: &mut Vec<Action>) {
        let was = self.state;
        self.state = State::Ground;
        if was != State::OscString {
            return;
        }
        if self.osc_overflow {
            self.clear_osc();
            return;
        }
        let payload = std::mem::take(&mut self.osc_string);
        self.clear_osc();
        out.push(Action::Osc(Self::decode_osc(&payload)));
    }

    fn decode_osc(payload: &[u8]) -> OscAction {
        let text = String::from_utf8_lossy(payload);
        let (code, data) = match text.split_once(';') {
            Some((code, data)) => (code, data),
            None => (text.as_ref(), ""),
        };
        let command = code.parse::<u32>().ok();
        match command {
            Some(0 | 2) => OscAction::SetTitle(data.to_string()),
            Some(1) => OscAction::SetIconName(data.to_string()),
            Some(OVERLAY_OSC) => match OverlayCommand::parse(data) {
                Some(cmd) => OscAction::Overlay(cmd),
                None => OscAction::Unknown {
                    command,
                    data: data.to_string(),
                },
            },
            _ => OscAction::Unknown {
                command,
                data: data.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csi(actions: &[Action]) -> &CsiAction {
        match actions {
            [Action::Csi(csi)] => csi,
            other => panic!("Expected a single CSI, got {other:?}"),
        }
    }

    #[test]
    fn test_parser_print() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"Hello");

        assert_eq!(actions.len(), 5);
        assert_eq!(actions[0], Action::Print('H'));
        assert_eq!(actions[4], Action::Print('o'));
    }

    #[test]
    fn test_parser_c0_controls() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"A\nB\rC\x07");

        assert_eq!(
            actions,
            vec![
                Action::Print('A'),
                Action::Control(ControlCode::LineFeed),
                Action::Print('B'),
                Action::Control(ControlCode::CarriageReturn),
                Action::Print('C'),
                Action::Control(ControlCode::Bell),
            ]
        );
    }

    #[test]
    fn test_parser_csi_cursor_up() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[5A");
        let csi = csi(&actions);
        assert_eq!(csi.params, vec![vec![5]]);
        assert_eq!(csi.final_byte, b'A');
        assert_eq!(csi.private, None);
    }

    #[test]
    fn test_parser_csi_cup() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[10;20H");
        assert_eq!(csi(&actions).params, vec![vec![10], vec![20]]);
    }

    #[test]
    fn test_parser_csi_private() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[?25h");
        let csi = csi(&actions);
        assert_eq!(csi.params, vec![vec![25]]);
        assert!(csi.is_private());
    }

    #[test]
    fn test_parser_empty_params() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[H");
        assert!(csi(&actions).params.is_empty());

        let actions = parser.parse(b"\x1b[;5H");
        assert_eq!(csi(&actions).params, vec![vec![0], vec![5]]);

        let actions = parser.parse(b"\x1b[5;H");
        assert_eq!(csi(&actions).params, vec![vec![5], vec![0]]);
    }

    #[test]
    fn test_parser_colon_subparams() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[1;38:2::255:128:0;4:3m");
        assert_eq!(
            csi(&actions).params,
            vec![vec![1], vec![38, 2, 0, 255, 128, 0], vec![4, 3]]
        );
    }

    #[test]
    fn test_parser_csi_intermediate() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[2 q");
        let csi = csi(&actions);
        assert_eq!(csi.params, vec![vec![2]]);
        assert_eq!(csi.intermediates, vec![b' ']);
        assert_eq!(csi.final_byte, b'q');
    }

    #[test]
    fn test_parser_param_limits() {
        let mut parser = Parser::new();
        let mut seq = b"\x1b[".to_vec();
        for _ in 0..40 {
            seq.extend_from_slice(b"1;");
        }
        seq.extend_from_slice(b"99999999999999m");
        let actions = parser.parse(&seq);
        assert_eq!(csi(&actions).params.len(), MAX_PARAMS);

        let actions = parser.parse(b"\x1b[99999999999999A");
        assert_eq!(csi(&actions).params, vec![vec![u32::MAX]]);
    }

    #[test]
    fn test_parser_esc_save_restore() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b7\x1b8");

        assert_eq!(
            actions,
            vec![
                Action::Esc(EscAction::SaveCursor),
                Action::Esc(EscAction::RestoreCursor),
            ]
        );
    }

    #[test]
    fn test_parser_designate_charset() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b(B\x1b)0\x1b#8");

        assert_eq!(
            actions,
            vec![
                Action::Esc(EscAction::DesignateCharset {
                    slot: b'(',
                    charset: b'B'
                }),
                Action::Esc(EscAction::DesignateCharset {
                    slot: b')',
                    charset: b'0'
                }),
                Action::Esc(EscAction::AlignmentTest),
            ]
        );
    }

    #[test]
    fn test_parser_osc_title_bel() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b]0;My Title\x07");
        assert_eq!(
            actions,
            vec![Action::Osc(OscAction::SetTitle("My Title".to_string()))]
        );
    }

    #[test]
    fn test_parser_osc_title_st() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b]2;T\xc3\xa9\x1b\\x");
        assert_eq!(
            actions,
            vec![
                Action::Osc(OscAction::SetTitle("Té".to_string())),
                Action::Esc(EscAction::StringTerminator),
                Action::Print('x'),
            ]
        );
    }

    #[test]
    fn test_parser_osc_overlay() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b]7000;sprite;clear\x07");
        assert_eq!(
            actions,
            vec![Action::Osc(OscAction::Overlay(OverlayCommand::ClearSprites))]
        );
    }

    #[test]
    fn test_parser_osc_overflow_is_discarded() {
        let mut parser = Parser::new();
        let mut seq = b"\x1b]0;".to_vec();
        seq.extend(std::iter::repeat(b'a').take(MAX_OSC_LEN + 10));
        seq.extend_from_slice(b"\x07ok");
        let actions = parser.parse(&seq);
        assert_eq!(actions, vec![Action::Print('o'), Action::Print('k')]);
    }

    #[test]
    fn test_parser_dcs_is_consumed() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1bPq#0;2;0;0;0\x1b\\A");
        assert_eq!(
            actions,
            vec![Action::Esc(EscAction::StringTerminator), Action::Print('A')]
        );
    }

    #[test]
    fn test_parser_utf8() {
        let mut parser = Parser::new();
        let actions = parser.parse("Hello 世界".as_bytes());

        assert_eq!(actions.len(), 8);
        assert_eq!(actions[6], Action::Print('世'));
        assert_eq!(actions[7], Action::Print('界'));
    }

    #[test]
    fn test_parser_utf8_chunk_boundary() {
        let mut parser = Parser::new();

        // UTF-8 for '世' is E4 B8 96
        assert!(parser.parse(&[0xE4]).is_empty());
        assert!(parser.parse(&[0xB8]).is_empty());
        assert_eq!(parser.parse(&[0x96]), vec![Action::Print('世')]);
    }

    #[test]
    fn test_parser_invalid_utf8_reprocesses_byte() {
        let mut parser = Parser::new();
        let actions = parser.parse(&[0xE4, b'A', 0xFF, 0xA0]);
        assert_eq!(
            actions,
            vec![
                Action::Print(REPLACEMENT),
                Action::Print('A'),
                Action::Print(REPLACEMENT),
                Action::Print(REPLACEMENT),
            ]
        );

        // Truncated sequence followed by an escape sequence
        let actions = parser.parse(&[0xC3, 0x1B, b'[', b'A']);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0], Action::Print(REPLACEMENT));
    }

    #[test]
    fn test_parser_chunk_boundary() {
        let mut parser = Parser::new();

        assert!(parser.parse(b"\x1b[").is_empty());
        assert!(parser.parse(b"5").is_empty());
        let actions = parser.parse(b"A");
        assert_eq!(csi(&actions).params, vec![vec![5]]);
    }

    #[test]
    fn test_parser_cancel_sequence() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[5\x18A");
        assert_eq!(actions, vec![Action::Print('A')]);
    }

    #[test]
    fn test_parser_stray_c1_bytes_print_replacement() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x9b2J\x84ok");
        assert_eq!(
            actions,
            vec![
                Action::Print(REPLACEMENT),
                Action::Print('2'),
                Action::Print('J'),
                Action::Print(REPLACEMENT),
                Action::Print('o'),
                Action::Print('k'),
            ]
        );
        assert!(parser.is_ground());

        // The same values as UTF-8 continuation bytes still decode
        assert_eq!(parser.parse("\u{9b}".as_bytes()), vec![Action::Print('\u{9b}')]);
    }

    #[test]
    fn test_parser_malformed_sequence_recovers() {
        let mut parser = Parser::new();
        let actions = parser.parse(b"\x1b[9999999999zGarbage");
        let printed: String = actions
            .iter()
            .filter_map(|a| match a {
                Action::Print(c) => Some(*c),
                _ => None,
            })
            .collect();
        assert_eq!(printed, "Garbage");
        assert!(parser.is_ground());
    }
}
