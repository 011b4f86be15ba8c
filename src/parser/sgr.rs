//! SGR (Select Graphic Rendition) decoding
//!
//! Turns the parameter groups of `CSI ... m` into attribute changes.
//! Extended colors are accepted in both the legacy semicolon form
//! (`38;5;196`, `38;2;255;0;0`) and the colon form (`38:5:196`,
//! `38:2::255:0:0`, `38:2:255:0:0`).

use serde::{Deserialize, Serialize};

use crate::core::{Color, UnderlineStyle};

/// One attribute change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SgrAttribute {
    Reset,
    Bold,
    Faint,
    Italic,
    Underline(UnderlineStyle),
    Blink,
    Inverse,
    Hidden,
    Strikethrough,
    /// 22: neither bold nor faint
    NormalIntensity,
    NotItalic,
    NotUnderlined,
    NotBlinking,
    NotInverse,
    NotHidden,
    NotStrikethrough,
    Foreground(Color),
    Background(Color),
    UnderlineColor(Color),
}

/// Decode the parameter groups of an SGR sequence. No parameters means
/// reset. Unknown codes and malformed colors are skipped.
pub fn parse_sgr(params: &[Vec<u32>]) -> Vec<SgrAttribute> {
    if params.is_empty() {
        return vec![SgrAttribute::Reset];
    }

    let mut attrs = Vec::with_capacity(params.len());
    let mut i = 0;
    while i < params.len() {
        let group = &params[i];
        let code = group.first().copied().unwrap_or(0);
        i += 1;

        let attr = match code {
            0 => SgrAttribute::Reset,
            1 => SgrAttribute::Bold,
            2 => SgrAttribute::Faint,
            3 => SgrAttribute::Italic,
            4 => match group.get(1) {
                Some(&style) => match UnderlineStyle::from_param(style) {
                    Some(UnderlineStyle::None) => SgrAttribute::NotUnderlined,
                    Some(style) => SgrAttribute::Underline(style),
                    None => continue,
                },
                None => SgrAttribute::Underline(UnderlineStyle::Single),
            },
            5 | 6 => SgrAttribute::Blink,
            7 => SgrAttribute::Inverse,
            8 => SgrAttribute::Hidden,
            9 => SgrAttribute::Strikethrough,
            21 => SgrAttribute::Underline(UnderlineStyle::Double),
            22 => SgrAttribute::NormalIntensity,
            23 => SgrAttribute::NotItalic,
            24 => SgrAttribute::NotUnderlined,
            25 => SgrAttribute::NotBlinking,
            27 => SgrAttribute::NotInverse,
            28 => SgrAttribute::NotHidden,
            29 => SgrAttribute::NotStrikethrough,
            30..=37 => SgrAttribute::Foreground(Color::Indexed((code - 30) as u8)),
            39 => SgrAttribute::Foreground(Color::Default),
            40..=47 => SgrAttribute::Background(Color::Indexed((code - 40) as u8)),
            49 => SgrAttribute::Background(Color::Default),
            59 => SgrAttribute::UnderlineColor(Color::Default),
            90..=97 => SgrAttribute::Foreground(Color::Indexed((code - 90 + 8) as u8)),
            100..=107 => SgrAttribute::Background(Color::Indexed((code - 100 + 8) as u8)),
            38 | 48 | 58 => {
                let color = if group.len() > 1 {
                    extended_color(&group[1..])
                } else {
                    let (color, used) = legacy_extended_color(&params[i..]);
                    i += used;
                    color
                };
                let Some(color) = color else {
                    continue;
                };
                match code {
                    38 => SgrAttribute::Foreground(color),
                    48 => SgrAttribute::Background(color),
                    _ => SgrAttribute::UnderlineColor(color),
                }
            }
            _ => continue,
        };
        attrs.push(attr);
    }
    attrs
}

fn component(v: u32) -> Option<u8> {
    u8::try_from(v).ok()
}

/// Colon form: `5:N`, `2:R:G:B` or `2:CS:R:G:B`
fn extended_color(sub: &[u32]) -> Option<Color> {
    match sub {
        [5, index, ..] => component(*index).map(Color::Indexed),
        [2, _, r, g, b, ..] | [2, r, g, b] => {
            Some(Color::Rgb(component(*r)?, component(*g)?, component(*b)?))
        }
        _ => None,
    }
}

/// Semicolon form: the color arguments occupy the following groups.
/// Returns the color and how many groups were consumed.
fn legacy_extended_color(rest: &[Vec<u32>]) -> (Option<Color>, usize) {
    let value = |i: usize| rest.get(i).and_then(|g| g.first()).copied();
    match value(0) {
        Some(5) => match value(1) {
            Some(index) => (component(index).map(Color::Indexed), 2),
            None => (None, rest.len().min(1)),
        },
        Some(2) => match (value(1), value(2), value(3)) {
            (Some(r), Some(g), Some(b)) => {
                let color = match (component(r), component(g), component(b)) {
                    (Some(r), Some(g), Some(b)) => Some(Color::Rgb(r, g, b)),
                    _ => None,
                };
                (color, 4)
            }
            _ => (None, rest.len()),
        },
        Some(_) => (None, 1),
        None => (None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(values: &[&[u32]]) -> Vec<Vec<u32>> {
        values.iter().map(|g| g.to_vec()).collect()
    }

    #[test]
    fn test_sgr_empty_is_reset() {
        assert_eq!(parse_sgr(&[]), vec![SgrAttribute::Reset]);
    }

    #[test]
    fn test_sgr_basic_attributes() {
        let attrs = parse_sgr(&groups(&[&[1], &[31], &[44]]));
        assert_eq!(
            attrs,
            vec![
                SgrAttribute::Bold,
                SgrAttribute::Foreground(Color::RED),
                SgrAttribute::Background(Color::BLUE),
            ]
        );
    }

    #[test]
    fn test_sgr_bright_colors() {
        let attrs = parse_sgr(&groups(&[&[91], &[102]]));
        assert_eq!(
            attrs,
            vec![
                SgrAttribute::Foreground(Color::BRIGHT_RED),
                SgrAttribute::Background(Color::BRIGHT_GREEN),
            ]
        );
    }

    #[test]
    fn test_sgr_legacy_truecolor() {
        let attrs = parse_sgr(&groups(&[&[38], &[2], &[255], &[128], &[0], &[1]]));
        assert_eq!(
            attrs,
            vec![
                SgrAttribute::Foreground(Color::Rgb(255, 128, 0)),
                SgrAttribute::Bold,
            ]
        );
    }

    #[test]
    fn test_sgr_legacy_indexed() {
        let attrs = parse_sgr(&groups(&[&[48], &[5], &[196]]));
        assert_eq!(attrs, vec![SgrAttribute::Background(Color::Indexed(196))]);
    }

    #[test]
    fn test_sgr_colon_forms() {
        let attrs = parse_sgr(&groups(&[&[38, 2, 0, 1, 2, 3], &[58, 2, 4, 5, 6], &[48, 5, 7]]));
        assert_eq!(
            attrs,
            vec![
                SgrAttribute::Foreground(Color::Rgb(1, 2, 3)),
                SgrAttribute::UnderlineColor(Color::Rgb(4, 5, 6)),
                SgrAttribute::Background(Color::Indexed(7)),
            ]
        );
    }

    #[test]
    fn test_sgr_underline_styles() {
        let attrs = parse_sgr(&groups(&[&[4, 3], &[4, 0], &[21], &[4]]));
        assert_eq!(
            attrs,
            vec![
                SgrAttribute::Underline(UnderlineStyle::Curly),
                SgrAttribute::NotUnderlined,
                SgrAttribute::Underline(UnderlineStyle::Double),
                SgrAttribute::Underline(UnderlineStyle::Single),
            ]
        );
    }

    #[test]
    fn test_sgr_out_of_range_color_is_skipped() {
        let attrs = parse_sgr(&groups(&[&[38], &[5], &[300], &[1]]));
        assert_eq!(attrs, vec![SgrAttribute::Bold]);
    }

    #[test]
    fn test_sgr_truncated_color() {
        let attrs = parse_sgr(&groups(&[&[38], &[2], &[10]]));
        assert!(attrs.is_empty());
    }
}
