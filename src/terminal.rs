//! Terminal Executor
//!
//! Ties together the parser and the buffer, applying parsed actions to
//! update the terminal state. Replies the terminal owes the application
//! (device status, device attributes) are queued for the host to write
//! back to the PTY.

use tracing::{debug, trace, warn};

use crate::core::{
    AnsiMode, Buffer, Cell, CursorShape, DecMode, GlyphBitmap, OverlayError, Palette,
};
use crate::parser::{
    parse_sgr, Action, ControlCode, CsiAction, EscAction, OscAction, OverlayCommand, Parser,
    SgrAttribute,
};

/// Upper bound for REP so a single sequence cannot stall ingestion
const MAX_REPEAT: usize = 65_535;

/// Primary device attributes: VT220 class with ANSI color
const PRIMARY_DA: &[u8] = b"\x1b[?62;22c";
/// Secondary device attributes
const SECONDARY_DA: &[u8] = b"\x1b[>0;10;1c";

/// Terminal executor that processes parsed actions and updates the buffer
#[derive(Debug)]
pub struct Terminal {
    /// The terminal buffer
    buffer: Buffer,
    /// The escape sequence parser
    parser: Parser,
    /// Bytes to send back to the application
    replies: Vec<u8>,
    /// Reused action list
    actions: Vec<Action>,
}

impl Terminal {
    /// Create a new terminal with the given dimensions
    pub fn new(cols: usize, rows: usize, scrollback_capacity: usize) -> Self {
        Self::with_buffer(Buffer::new(cols, rows, scrollback_capacity))
    }

    /// Wrap an already configured buffer
    pub fn with_buffer(buffer: Buffer) -> Self {
        Self {
            buffer,
            parser: Parser::new(),
            replies: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Get a reference to the buffer
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Get a mutable reference to the buffer
    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// Process input bytes from the PTY
    pub fn process(&mut self, data: &[u8]) {
        let mut actions = std::mem::take(&mut self.actions);
        self.parser.parse_into(data, &mut actions);
        for action in actions.drain(..) {
            self.apply_action(action);
        }
        self.actions = actions;
    }

    /// Drain the queued replies
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    pub fn has_replies(&self) -> bool {
        !self.replies.is_empty()
    }

    /// Resize the terminal
    pub fn resize(&mut self, cols: usize, rows: usize) {
        self.buffer.resize(cols, rows);
    }

    /// Apply a single parsed action to the buffer
    pub fn apply_action(&mut self, action: Action) {
        match action {
            Action::Print(c) => self.buffer.print(c),
            Action::Control(code) => self.execute_control(code),
            Action::Csi(csi) => self.execute_csi(&csi),
            Action::Esc(esc) => self.execute_esc(esc),
            Action::Osc(osc) => self.execute_osc(osc),
        }
    }

    /// Execute a C0 control character
    fn execute_control(&mut self, code: ControlCode) {
        match code {
            ControlCode::Bell => self.buffer.bell(),
            ControlCode::Backspace => self.buffer.backspace(),
            ControlCode::Tab => self.buffer.tab(1),
            ControlCode::LineFeed => self.buffer.linefeed(),
            ControlCode::CarriageReturn => self.buffer.carriage_return(),
            // Charsets are not translated
            ControlCode::ShiftOut | ControlCode::ShiftIn => trace!(?code, "charset shift"),
        }
    }

    /// Execute a CSI sequence
    fn execute_csi(&mut self, csi: &CsiAction) {
        match csi.private {
            None => {}
            Some(b'?') => return self.execute_csi_private(csi),
            Some(b'>') if csi.final_byte == b'c' => {
                self.replies.extend_from_slice(SECONDARY_DA);
                return;
            }
            Some(_) => {
                debug!(?csi, "unhandled CSI with private marker");
                return;
            }
        }

        match csi.intermediates.as_slice() {
            [] => {}
            [b' '] if csi.final_byte == b'q' => {
                // DECSCUSR - Set Cursor Style
                match CursorShape::from_decscusr(csi.param(0, 0)) {
                    Some((shape, blinking)) => self.buffer.set_cursor_style(shape, blinking),
                    None => debug!(param = csi.param(0, 0), "unknown cursor style"),
                }
                return;
            }
            [b'!'] if csi.final_byte == b'p' => {
                // DECSTR - Soft Terminal Reset
                self.buffer.soft_reset();
                return;
            }
            _ => {
                debug!(?csi, "unhandled CSI with intermediates");
                return;
            }
        }

        let n = csi.param_or_default(0, 1) as usize;
        match csi.final_byte {
            // Cursor movement
            b'A' => self.buffer.cursor_up(n),
            b'B' | b'e' => self.buffer.cursor_down(n),
            b'C' | b'a' => self.buffer.cursor_forward(n),
            b'D' => self.buffer.cursor_backward(n),
            b'E' => {
                // CNL - Cursor Next Line
                self.buffer.cursor_down(n);
                self.buffer.carriage_return();
            }
            b'F' => {
                // CPL - Cursor Previous Line
                self.buffer.cursor_up(n);
                self.buffer.carriage_return();
            }
            b'G' | b'`' => self.buffer.cursor_to_col(n - 1),
            b'H' | b'f' => {
                // CUP - Cursor Position, HVP
                let col = csi.param_or_default(1, 1) as usize;
                self.buffer.cursor_position(n - 1, col - 1);
            }
            b'd' => self.buffer.cursor_to_row(n - 1),
            b'I' => self.buffer.tab(n),
            b'Z' => self.buffer.back_tab(n),

            // Erase operations
            b'J' => self.buffer.erase_in_display(csi.param(0, 0)),
            b'K' => self.buffer.erase_in_line(csi.param(0, 0)),
            b'X' => self.buffer.erase_chars(n),

            // Insert/Delete
            b'L' => self.buffer.insert_lines(n),
            b'M' => self.buffer.delete_lines(n),
            b'@' => self.buffer.insert_chars(n),
            b'P' => self.buffer.delete_chars(n),

            // Scroll
            b'S' => self.buffer.scroll_up(n),
            b'T' => self.buffer.scroll_down(n),

            b'r' => {
                // DECSTBM - Set Top and Bottom Margins
                let rows = self.buffer.rows() as u32;
                let top = csi.param_or_default(0, 1).saturating_sub(1) as usize;
                let bottom = csi.param_or_default(1, rows).saturating_sub(1) as usize;
                self.buffer.set_scroll_region(top, bottom);
            }

            b'm' => self.execute_sgr(&csi.params),

            b'g' => match csi.param(0, 0) {
                // TBC - Tab Clear
                0 => self.buffer.clear_tab_stop(),
                3 => self.buffer.clear_all_tab_stops(),
                other => debug!(param = other, "unknown TBC parameter"),
            },

            b's' if csi.params.is_empty() => self.buffer.save_cursor(),
            b'u' if csi.params.is_empty() => self.buffer.restore_cursor(),

            b'h' | b'l' => {
                // SM / RM
                let enable = csi.final_byte == b'h';
                for param in csi.values() {
                    match AnsiMode::from_param(param) {
                        Some(mode) => self.buffer.set_ansi_mode(mode, enable),
                        None => debug!(param, enable, "unknown ANSI mode"),
                    }
                }
            }

            b'n' => match csi.param(0, 0) {
                // DSR - Device Status Report
                5 => self.replies.extend_from_slice(b"\x1b[0n"),
                6 => self.report_cursor_position(),
                other => debug!(param = other, "unknown DSR request"),
            },

            b'c' if csi.param(0, 0) == 0 => self.replies.extend_from_slice(PRIMARY_DA),

            // REP - Repeat preceding character
            b'b' => self.buffer.repeat_last(n.min(MAX_REPEAT)),

            _ => debug!(
                params = ?csi.params,
                final_byte = %(csi.final_byte as char),
                "unhandled CSI"
            ),
        }
    }

    /// Execute a private CSI sequence (starts with ?)
    fn execute_csi_private(&mut self, csi: &CsiAction) {
        match csi.final_byte {
            b'h' | b'l' => {
                // DECSET / DECRST
                let enable = csi.final_byte == b'h';
                for param in csi.values() {
                    match DecMode::from_param(param) {
                        Some(mode) => self.buffer.set_dec_mode(mode, enable),
                        None => debug!(param, enable, "unknown DEC mode"),
                    }
                }
            }
            _ => debug!(
                params = ?csi.params,
                final_byte = %(csi.final_byte as char),
                "unhandled private CSI"
            ),
        }
    }

    /// CPR, reported relative to the scroll region in origin mode
    fn report_cursor_position(&mut self) {
        let cursor = self.buffer.cursor();
        let row = if cursor.origin_mode {
            cursor.row.saturating_sub(self.buffer.scroll_top())
        } else {
            cursor.row
        };
        let reply = format!("\x1b[{};{}R", row + 1, cursor.col + 1);
        self.replies.extend_from_slice(reply.as_bytes());
    }

    /// Execute SGR (Select Graphic Rendition)
    fn execute_sgr(&mut self, params: &[Vec<u32>]) {
        let pen = &mut self.buffer.cursor_mut().pen;
        for attr in parse_sgr(params) {
            match attr {
                SgrAttribute::Reset => pen.reset_attributes(),
                SgrAttribute::Bold => pen.style.bold = true,
                SgrAttribute::Faint => pen.style.faint = true,
                SgrAttribute::Italic => pen.style.italic = true,
                SgrAttribute::Underline(style) => pen.style.underline = style,
                SgrAttribute::Blink => pen.style.blink = true,
                SgrAttribute::Inverse => pen.style.inverse = true,
                SgrAttribute::Hidden => pen.style.hidden = true,
                SgrAttribute::Strikethrough => pen.style.strikethrough = true,
                SgrAttribute::NormalIntensity => {
                    pen.style.bold = false;
                    pen.style.faint = false;
                }
                SgrAttribute::NotItalic => pen.style.italic = false,
                SgrAttribute::NotUnderlined => pen.style.underline = Default::default(),
                SgrAttribute::NotBlinking => pen.style.blink = false,
                SgrAttribute::NotInverse => pen.style.inverse = false,
                SgrAttribute::NotHidden => pen.style.hidden = false,
                SgrAttribute::NotStrikethrough => pen.style.strikethrough = false,
                SgrAttribute::Foreground(color) => pen.fg = color,
                SgrAttribute::Background(color) => pen.bg = color,
                SgrAttribute::UnderlineColor(color) => pen.underline_color = color,
            }
        }
    }

    /// Execute an ESC sequence
    fn execute_esc(&mut self, esc: EscAction) {
        match esc {
            EscAction::SaveCursor => self.buffer.save_cursor(),
            EscAction::RestoreCursor => self.buffer.restore_cursor(),
            EscAction::Index => self.buffer.index(),
            EscAction::ReverseIndex => self.buffer.reverse_index(),
            EscAction::NextLine => self.buffer.next_line(),
            EscAction::TabSet => self.buffer.set_tab_stop(),
            EscAction::FullReset => {
                self.buffer.reset();
                self.parser.reset();
                self.replies.clear();
            }
            EscAction::ApplicationKeypad => self.buffer.set_application_keypad(true),
            EscAction::NormalKeypad => self.buffer.set_application_keypad(false),
            EscAction::DesignateCharset { slot, charset } => {
                trace!(slot = %(slot as char), charset = %(charset as char), "charset designation");
            }
            EscAction::AlignmentTest => self.alignment_test(),
            EscAction::StringTerminator => {}
            EscAction::Unknown(bytes) => debug!(?bytes, "unknown ESC sequence"),
        }
    }

    /// DECALN: fill the screen with `E` and home the cursor
    fn alignment_test(&mut self) {
        self.buffer.reset_scroll_region();
        for row in 0..self.buffer.rows() {
            for col in 0..self.buffer.cols() {
                self.buffer.write_cell(col, row, Cell::new('E'));
            }
        }
        self.buffer.set_cursor(0, 0);
    }

    /// Execute an OSC sequence
    fn execute_osc(&mut self, osc: OscAction) {
        match osc {
            OscAction::SetTitle(title) => self.buffer.set_title(title),
            OscAction::SetIconName(name) => trace!(%name, "icon name ignored"),
            OscAction::Overlay(command) => {
                if let Err(err) = self.execute_overlay(command) {
                    warn!(%err, "overlay command rejected");
                }
            }
            OscAction::Unknown { command, data } => {
                debug!(?command, len = data.len(), "unknown OSC");
            }
        }
    }

    /// Apply an overlay command to the buffer's registries
    fn execute_overlay(&mut self, command: OverlayCommand) -> Result<(), OverlayError> {
        match command {
            OverlayCommand::DefinePalette { id, colors } => {
                self.buffer.define_palette(id, Palette::new(colors)?)
            }
            OverlayCommand::DeletePalette(id) => {
                self.buffer.remove_palette(id);
                Ok(())
            }
            OverlayCommand::DefineGlyph {
                codepoint,
                width,
                height,
                pixels,
            } => self
                .buffer
                .define_glyph(codepoint, GlyphBitmap::new(width, height, pixels)?),
            OverlayCommand::DeleteGlyph(codepoint) => {
                self.buffer.remove_glyph(codepoint);
                Ok(())
            }
            OverlayCommand::Sprite { id, update } => {
                match self.buffer.overlays().sprite(id).cloned() {
                    Some(sprite) if update.is_move() => {
                        let mut moved = sprite;
                        update.apply(&mut moved);
                        self.buffer.move_sprite(id, moved.position)
                    }
                    Some(mut sprite) => {
                        update.apply(&mut sprite);
                        self.buffer.place_sprite(id, sprite)
                    }
                    None => match update.to_sprite() {
                        Some(sprite) => self.buffer.place_sprite(id, sprite),
                        None => {
                            debug!(id, "sprite placement without a glyph");
                            Ok(())
                        }
                    },
                }
            }
            OverlayCommand::DeleteSprite(id) => {
                self.buffer.remove_sprite(id);
                Ok(())
            }
            OverlayCommand::ClearSprites => {
                self.buffer.clear_sprites();
                Ok(())
            }
            OverlayCommand::DefineCrop { id, rect } => self.buffer.define_crop_rect(id, rect),
            OverlayCommand::DeleteCrop(id) => {
                self.buffer.remove_crop_rect(id);
                Ok(())
            }
            OverlayCommand::DefineSplit { id, split } => self.buffer.define_screen_split(id, split),
            OverlayCommand::DeleteSplit(id) => {
                self.buffer.remove_screen_split(id);
                Ok(())
            }
            OverlayCommand::ClearSplits => {
                self.buffer.clear_screen_splits();
                Ok(())
            }
            OverlayCommand::Pen { palette, flip } => {
                let pen = &mut self.buffer.cursor_mut().pen;
                if palette.is_some() {
                    pen.palette = palette;
                }
                if let Some(flip) = flip {
                    pen.flip = flip;
                }
                Ok(())
            }
            OverlayCommand::PenReset => {
                let pen = &mut self.buffer.cursor_mut().pen;
                pen.palette = None;
                pen.flip = Default::default();
                Ok(())
            }
            OverlayCommand::SetTheme(theme) => {
                self.buffer.set_theme(theme);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Color, GlyphFlip, Snapshot, SubCellPoint, Theme, UnderlineStyle};

    #[test]
    fn test_terminal_print() {
        let mut term = Terminal::new(80, 24, 1000);
        term.process(b"Hello, World!");

        let snapshot = Snapshot::from_buffer(term.buffer());
        assert!(snapshot.to_text().contains("Hello, World!"));
    }

    #[test]
    fn test_terminal_cursor_movement() {
        let mut term = Terminal::new(80, 24, 1000);

        // Move cursor to row 10, col 5 and print
        term.process(b"\x1b[10;5HX");

        assert_eq!(term.buffer().cursor().row, 9);
        assert_eq!(term.buffer().cursor().col, 5); // After printing X
    }

    #[test]
    fn test_terminal_colors() {
        let mut term = Terminal::new(80, 24, 1000);

        // Set red foreground, blue background
        term.process(b"\x1b[31;44mColored");

        assert_eq!(term.buffer().cursor().pen.fg, Color::RED);
        assert_eq!(term.buffer().cursor().pen.bg, Color::BLUE);
    }

    #[test]
    fn test_terminal_basic_text_and_color() {
        let mut term = Terminal::new(80, 24, 1000);
        term.process(b"\x1b[31mHi\x1b[0m");

        let h = term.buffer().cell(0, 0).unwrap();
        assert_eq!(h.ch, 'H');
        assert_eq!(h.fg, Color::RED);
        assert_eq!(h.bg, Color::Default);

        let blank = term.buffer().cell(2, 0).unwrap();
        assert!(blank.is_blank());
        assert_eq!(blank.fg, Color::Default);
    }

    #[test]
    fn test_terminal_sgr_reset() {
        let mut term = Terminal::new(80, 24, 1000);

        term.process(b"\x1b[1;31mBold Red\x1b[0mNormal");

        assert_eq!(term.buffer().cursor().pen.fg, Color::Default);
        assert!(!term.buffer().cursor().pen.style.bold);
    }

    #[test]
    fn test_terminal_sgr_underline_style_and_color() {
        let mut term = Terminal::new(80, 24, 1000);
        term.process(b"\x1b[4:3;58:2::10:20:30mU\x1b[24;59mN");

        let u = term.buffer().cell(0, 0).unwrap();
        assert_eq!(u.style.underline, UnderlineStyle::Curly);
        assert_eq!(u.underline_color, Color::Rgb(10, 20, 30));

        let n = term.buffer().cell(1, 0).unwrap();
        assert_eq!(n.style.underline, UnderlineStyle::None);
        assert_eq!(n.underline_color, Color::Default);
    }

    #[test]
    fn test_terminal_erase() {
        let mut term = Terminal::new(10, 3, 1000);

        term.process(b"XXXXXXXXXX");
        term.process(b"\x1b[1;5H"); // Move to row 1, col 5
        term.process(b"\x1b[K"); // Erase to end of line

        let text = term.buffer().screen_text();
        assert!(text.starts_with("XXXX"));
        assert!(!text.contains("XXXXX"));
    }

    #[test]
    fn test_terminal_scroll_region() {
        let mut term = Terminal::new(80, 5, 1000);

        // Set scroll region to lines 2-4
        term.process(b"\x1b[2;4r");

        assert_eq!(term.buffer().scroll_top(), 1);
        assert_eq!(term.buffer().scroll_bottom(), 3);
    }

    #[test]
    fn test_terminal_alternate_screen() {
        let mut term = Terminal::new(80, 24, 1000);

        term.process(b"Primary");
        term.process(b"\x1b[?1049h"); // Enter alternate screen
        term.process(b"Alternate");

        assert!(term.buffer().is_alternate());

        term.process(b"\x1b[?1049l"); // Exit alternate screen

        assert!(!term.buffer().is_alternate());
        assert!(term.buffer().screen_text().contains("Primary"));
        assert_eq!(term.buffer().cursor().col, 7);
    }

    #[test]
    fn test_terminal_bracketed_paste() {
        let mut term = Terminal::new(80, 24, 1000);

        term.process(b"\x1b[?2004h");
        assert!(term.buffer().modes().bracketed_paste);

        term.process(b"\x1b[?2004l");
        assert!(!term.buffer().modes().bracketed_paste);
    }

    #[test]
    fn test_terminal_title() {
        let mut term = Terminal::new(80, 24, 1000);

        term.process(b"\x1b]0;My Terminal Title\x07");

        assert_eq!(term.buffer().title(), "My Terminal Title");
    }

    #[test]
    fn test_terminal_insert_delete_lines() {
        let mut term = Terminal::new(10, 5, 1000);

        term.process(b"Line 1\r\nLine 2\r\nLine 3\r\nLine 4\r\nLine 5");

        // Move to line 2 and insert a line
        term.process(b"\x1b[2;1H\x1b[L");

        let lines: Vec<String> = term
            .buffer()
            .screen_text()
            .lines()
            .map(String::from)
            .collect();
        assert_eq!(lines[0], "Line 1");
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Line 2");
        assert_eq!(lines[4], "Line 4");
    }

    #[test]
    fn test_terminal_truecolor() {
        let mut term = Terminal::new(80, 24, 1000);

        term.process(b"\x1b[38;2;255;128;64mOrange");

        assert_eq!(term.buffer().cursor().pen.fg, Color::Rgb(255, 128, 64));
    }

    #[test]
    fn test_terminal_device_replies() {
        let mut term = Terminal::new(80, 24, 1000);
        term.process(b"\x1b[5;10H\x1b[6n\x1b[5n\x1b[c");

        let replies = term.take_replies();
        assert_eq!(replies, b"\x1b[5;10R\x1b[0n\x1b[?62;22c".to_vec());
        assert!(!term.has_replies());
    }

    #[test]
    fn test_terminal_cursor_style() {
        let mut term = Terminal::new(80, 24, 1000);
        term.process(b"\x1b[6 q");
        assert_eq!(term.buffer().cursor().shape, CursorShape::Bar);
        assert!(!term.buffer().cursor().blinking);
    }

    #[test]
    fn test_terminal_repeat() {
        let mut term = Terminal::new(10, 2, 0);
        term.process(b"a\x1b[3b");
        assert_eq!(term.buffer().screen_text().lines().next(), Some("aaaa"));
    }

    #[test]
    fn test_terminal_full_reset_is_idempotent() {
        let mut term = Terminal::new(20, 5, 100);
        term.process(b"\x1b[1;31mtext\x1b]0;title\x07\x1b[2;4r");
        term.process(b"\x1bc");
        let once = Snapshot::from_buffer(term.buffer());
        term.process(b"\x1bc");
        let twice = Snapshot::from_buffer(term.buffer());
        assert_eq!(once, twice);
        assert_eq!(once.title, "");
    }

    #[test]
    fn test_terminal_alignment_test() {
        let mut term = Terminal::new(3, 2, 0);
        term.process(b"\x1b#8");
        assert_eq!(term.buffer().screen_text(), "EEE\nEEE");
        assert_eq!(term.buffer().cursor().col, 0);
    }

    #[test]
    fn test_terminal_overlay_commands() {
        let mut term = Terminal::new(20, 5, 0);
        term.process(b"\x1b]7000;palette;id=1;colors=ff0000,00ff00\x07");
        term.process(b"\x1b]7000;glyph;cp=0xE000;w=2;h=1;pixels=01\x07");
        term.process(b"\x1b]7000;sprite;id=3;glyph=0xE000;x=8;y=16;z=2\x07");
        term.process(b"\x1b]7000;sprite;id=3;x=24\x07");

        let overlays = term.buffer().overlays();
        assert!(overlays.palette(1).is_some());
        assert!(overlays.glyph('\u{E000}').is_some());
        let sprite = overlays.sprite(3).unwrap();
        assert_eq!(sprite.position, SubCellPoint::new(24, 16));
        assert_eq!(sprite.z, 2);

        term.process(b"\x1b]7000;sprite;clear\x1b\\");
        assert!(term.buffer().overlays().sprite(3).is_none());
    }

    #[test]
    fn test_terminal_overlay_pen_and_theme() {
        let mut term = Terminal::new(20, 5, 0);
        term.process(b"\x1b]7000;pen;palette=2;flip=h\x07A\x1b]7000;pen;reset\x07B");
        let a = term.buffer().cell(0, 0).unwrap();
        assert_eq!(a.palette, Some(2));
        assert_eq!(a.flip, GlyphFlip::Horizontal);
        let b = term.buffer().cell(1, 0).unwrap();
        assert_eq!(b.palette, None);

        term.process(b"\x1b]7000;theme;light\x07");
        assert_eq!(term.buffer().theme(), Theme::Light);
    }

    #[test]
    fn test_terminal_malformed_overlay_is_ignored() {
        let mut term = Terminal::new(20, 5, 0);
        term.process(b"\x1b]7000;glyph;cp=65;w=0;h=0;pixels=\x07ok");
        assert!(term.buffer().overlays().glyph('A').is_none());
        assert!(term.buffer().screen_text().starts_with("ok"));
    }

    #[test]
    fn test_terminal_width_modes() {
        let mut term = Terminal::new(20, 5, 0);
        term.process(b"\x1b[?7700h");
        term.process("世".as_bytes());
        assert_eq!(term.buffer().cursor().col, 1);
        term.process(b"\x1b[?7700l");
        term.process("世".as_bytes());
        assert_eq!(term.buffer().cursor().col, 3);
    }
}
