//! Input Encoding Module
//!
//! Encodes key presses and pastes into the byte sequences terminal
//! applications expect. The encoding depends on:
//! - Application cursor mode (DECCKM)
//! - Application keypad mode (DECKPAM/DECKPNM)
//! - Modifier keys (Shift, Ctrl, Alt)
//! - Bracketed paste mode (DECSET 2004)
//!
//! Characters that have no traditional control-character form under their
//! modifiers are sent in the extended `CSI 27 ; mod ; codepoint ~` form.

use crate::core::Modes;

/// Keyboard modifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl Modifiers {
    /// Get the modifier parameter for CSI sequences (1 + bitmask)
    /// Shift=1, Alt=2, Ctrl=4
    pub fn as_csi_param(&self) -> u8 {
        let mut param = 1;
        if self.shift {
            param += 1;
        }
        if self.alt {
            param += 2;
        }
        if self.ctrl {
            param += 4;
        }
        param
    }

    /// Check if any modifier is pressed
    pub fn any(&self) -> bool {
        self.shift || self.ctrl || self.alt
    }
}

/// Special keys that produce escape sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    // Cursor keys
    Up,
    Down,
    Left,
    Right,

    // Navigation
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,

    // Function keys
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,

    // Editing
    Backspace,
    Tab,
    Enter,
    Escape,

    // Keypad (when not in application mode, these are same as regular keys)
    KeypadEnter,
    KeypadPlus,
    KeypadMinus,
    KeypadMultiply,
    KeypadDivide,
    KeypadDecimal,
    Keypad0,
    Keypad1,
    Keypad2,
    Keypad3,
    Keypad4,
    Keypad5,
    Keypad6,
    Keypad7,
    Keypad8,
    Keypad9,
}

/// Encode a special key press under the active modes
pub fn encode_key(key: Key, modifiers: Modifiers, modes: &Modes) -> Vec<u8> {
    let application_cursor = modes.application_cursor;
    let application_keypad = modes.application_keypad;
    match key {
        // Cursor keys
        Key::Up => encode_cursor_key(b'A', modifiers, application_cursor),
        Key::Down => encode_cursor_key(b'B', modifiers, application_cursor),
        Key::Right => encode_cursor_key(b'C', modifiers, application_cursor),
        Key::Left => encode_cursor_key(b'D', modifiers, application_cursor),

        // Navigation keys
        Key::Home => encode_special_key(1, b'~', modifiers),
        Key::Insert => encode_special_key(2, b'~', modifiers),
        Key::Delete => encode_special_key(3, b'~', modifiers),
        Key::End => encode_special_key(4, b'~', modifiers),
        Key::PageUp => encode_special_key(5, b'~', modifiers),
        Key::PageDown => encode_special_key(6, b'~', modifiers),

        // Function keys
        Key::F1 => encode_function_key(1, modifiers),
        Key::F2 => encode_function_key(2, modifiers),
        Key::F3 => encode_function_key(3, modifiers),
        Key::F4 => encode_function_key(4, modifiers),
        Key::F5 => encode_special_key(15, b'~', modifiers),
        Key::F6 => encode_special_key(17, b'~', modifiers),
        Key::F7 => encode_special_key(18, b'~', modifiers),
        Key::F8 => encode_special_key(19, b'~', modifiers),
        Key::F9 => encode_special_key(20, b'~', modifiers),
        Key::F10 => encode_special_key(21, b'~', modifiers),
        Key::F11 => encode_special_key(23, b'~', modifiers),
        Key::F12 => encode_special_key(24, b'~', modifiers),

        // Editing keys
        Key::Backspace => {
            if modifiers.ctrl {
                vec![0x08] // Ctrl+Backspace = BS
            } else if modifiers.alt {
                vec![0x1b, 0x7f] // Alt+Backspace = ESC DEL
            } else {
                vec![0x7f] // DEL
            }
        }
        Key::Tab => {
            if modifiers.shift {
                vec![0x1b, b'[', b'Z'] // Shift+Tab = CSI Z (backtab)
            } else {
                vec![0x09] // HT
            }
        }
        Key::Enter => {
            if modifiers.alt {
                vec![0x1b, 0x0d] // Alt+Enter
            } else {
                vec![0x0d] // CR
            }
        }
        Key::Escape => vec![0x1b],

        // Keypad keys
        Key::KeypadEnter => {
            if application_keypad {
                vec![0x1b, b'O', b'M']
            } else {
                vec![0x0d]
            }
        }
        Key::KeypadPlus => {
            if application_keypad {
                vec![0x1b, b'O', b'k']
            } else {
                vec![b'+']
            }
        }
        Key::KeypadMinus => {
            if application_keypad {
                vec![0x1b, b'O', b'm']
            } else {
                vec![b'-']
            }
        }
        Key::KeypadMultiply => {
            if application_keypad {
                vec![0x1b, b'O', b'j']
            } else {
                vec![b'*']
            }
        }
        Key::KeypadDivide => {
            if application_keypad {
                vec![0x1b, b'O', b'o']
            } else {
                vec![b'/']
            }
        }
        Key::KeypadDecimal => {
            if application_keypad {
                vec![0x1b, b'O', b'n']
            } else {
                vec![b'.']
            }
        }
        Key::Keypad0 => encode_keypad_digit(b'p', b'0', application_keypad),
        Key::Keypad1 => encode_keypad_digit(b'q', b'1', application_keypad),
        Key::Keypad2 => encode_keypad_digit(b'r', b'2', application_keypad),
        Key::Keypad3 => encode_keypad_digit(b's', b'3', application_keypad),
        Key::Keypad4 => encode_keypad_digit(b't', b'4', application_keypad),
        Key::Keypad5 => encode_keypad_digit(b'u', b'5', application_keypad),
        Key::Keypad6 => encode_keypad_digit(b'v', b'6', application_keypad),
        Key::Keypad7 => encode_keypad_digit(b'w', b'7', application_keypad),
        Key::Keypad8 => encode_keypad_digit(b'x', b'8', application_keypad),
        Key::Keypad9 => encode_keypad_digit(b'y', b'9', application_keypad),
    }
}

/// Encode a cursor key (arrow keys)
fn encode_cursor_key(code: u8, modifiers: Modifiers, application_mode: bool) -> Vec<u8> {
    if modifiers.any() {
        // With modifiers: CSI 1 ; modifier code
        let param = modifiers.as_csi_param();
        format!("\x1b[1;{}{}", param, code as char).into_bytes()
    } else if application_mode {
        // Application mode: SS3 code
        vec![0x1b, b'O', code]
    } else {
        // Normal mode: CSI code
        vec![0x1b, b'[', code]
    }
}

/// Encode a special key (Home, End, PgUp, PgDn, Insert, Delete, F5-F12)
fn encode_special_key(number: u8, final_byte: u8, modifiers: Modifiers) -> Vec<u8> {
    if modifiers.any() {
        let param = modifiers.as_csi_param();
        format!("\x1b[{};{}{}", number, param, final_byte as char).into_bytes()
    } else {
        format!("\x1b[{}{}", number, final_byte as char).into_bytes()
    }
}

/// Encode function keys F1-F4 (use SS3 in some modes)
fn encode_function_key(number: u8, modifiers: Modifiers) -> Vec<u8> {
    let code = match number {
        1 => b'P',
        2 => b'Q',
        3 => b'R',
        4 => b'S',
        _ => return vec![],
    };

    if modifiers.any() {
        let param = modifiers.as_csi_param();
        format!("\x1b[1;{}{}", param, code as char).into_bytes()
    } else {
        vec![0x1b, b'O', code]
    }
}

/// Encode keypad digit
fn encode_keypad_digit(app_code: u8, normal_code: u8, application_mode: bool) -> Vec<u8> {
    if application_mode {
        vec![0x1b, b'O', app_code]
    } else {
        vec![normal_code]
    }
}

/// Traditional control character for Ctrl plus `c`, if there is one
fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        '@' | ' ' | '2' => Some(0x00),
        '[' | '3' => Some(0x1b),
        '\\' | '4' => Some(0x1c),
        ']' | '5' => Some(0x1d),
        '^' | '6' => Some(0x1e),
        '_' | '/' | '7' => Some(0x1f),
        '?' | '8' => Some(0x7f),
        _ => None,
    }
}

/// Encode a character with modifiers.
///
/// Ctrl produces a control character where one exists (Alt adds an ESC
/// prefix). Combinations with no control form, such as Ctrl+Shift+letter
/// or Ctrl+1, use `CSI 27 ; mod ; codepoint ~` so the application still
/// sees every modifier.
pub fn encode_char(c: char, modifiers: Modifiers) -> Vec<u8> {
    let mut buf = [0u8; 4];
    if modifiers.ctrl {
        let control = if modifiers.shift && c.is_ascii_alphabetic() {
            None
        } else {
            control_byte(c.to_ascii_lowercase())
        };
        return match control {
            Some(byte) if modifiers.alt => vec![0x1b, byte],
            Some(byte) => vec![byte],
            None => encode_extended(c, modifiers),
        };
    }
    if modifiers.alt {
        // Alt+char sends ESC prefix
        let mut bytes = vec![0x1b];
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        bytes
    } else {
        c.encode_utf8(&mut buf).as_bytes().to_vec()
    }
}

/// `CSI 27 ; mod ; codepoint ~`
fn encode_extended(c: char, modifiers: Modifiers) -> Vec<u8> {
    format!("\x1b[27;{};{}~", modifiers.as_csi_param(), c as u32).into_bytes()
}

/// Encode bracketed paste start/end
pub fn encode_bracketed_paste(start: bool) -> Vec<u8> {
    if start {
        vec![0x1b, b'[', b'2', b'0', b'0', b'~'] // CSI 200 ~
    } else {
        vec![0x1b, b'[', b'2', b'0', b'1', b'~'] // CSI 201 ~
    }
}

/// Encode pasted text. With bracketed paste enabled the text is wrapped
/// in `CSI 200 ~` / `CSI 201 ~`, and any end marker inside the text is
/// removed so the paste cannot terminate itself early. Newlines are sent
/// as CR either way.
pub fn encode_paste(text: &str, modes: &Modes) -> Vec<u8> {
    let text = text.replace("\r\n", "\r").replace('\n', "\r");
    if !modes.bracketed_paste {
        return text.into_bytes();
    }
    let body = text.replace("\x1b[201~", "");
    let mut bytes = encode_bracketed_paste(true);
    bytes.extend_from_slice(body.as_bytes());
    bytes.extend(encode_bracketed_paste(false));
    bytes
}
