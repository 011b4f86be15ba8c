//! Character width policy
//!
//! Decides how many grid columns a character occupies and how wide it is
//! drawn. In fixed mode East-Asian wide characters take two columns (a
//! cell plus a continuation cell) and every cell is drawn 1.0 wide. In
//! flexible mode every character takes one grid column and carries its
//! East-Asian width as a fractional visual width instead.

use serde::{Deserialize, Serialize};
use unicode_width::UnicodeWidthChar;

use super::cell::Cell;

/// Grid width mode for the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WidthMode {
    #[default]
    Fixed,
    Flexible,
}

/// Treatment of East-Asian "ambiguous" width characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguousWidth {
    #[default]
    Narrow,
    Wide,
    /// Inherit the category of the preceding cell on the same row
    Auto,
}

/// Unicode width category of a character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthClass {
    /// Combining marks and other zero-width characters
    Zero,
    Narrow,
    Wide,
    Ambiguous,
}

/// Classify a character by East-Asian width
pub fn classify(c: char) -> WidthClass {
    let normal = c.width().unwrap_or(0);
    let cjk = c.width_cjk().unwrap_or(0);
    match (normal, cjk) {
        (0, _) => WidthClass::Zero,
        (2, _) => WidthClass::Wide,
        (1, 2) => WidthClass::Ambiguous,
        _ => WidthClass::Narrow,
    }
}

/// How a character is laid out on the grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measure {
    /// Grid columns consumed (0 for combining marks)
    pub columns: usize,
    /// Drawn width in cell units
    pub visual: f32,
}

/// Width policy carried by a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WidthPolicy {
    pub mode: WidthMode,
    pub ambiguous: AmbiguousWidth,
}

impl WidthPolicy {
    pub fn new(mode: WidthMode, ambiguous: AmbiguousWidth) -> Self {
        Self { mode, ambiguous }
    }

    /// Measure `c` given the cell immediately before the write position
    pub fn measure(&self, c: char, prev: Option<&Cell>) -> Measure {
        let wide = match classify(c) {
            WidthClass::Zero => {
                return Measure {
                    columns: 0,
                    visual: 0.0,
                }
            }
            WidthClass::Narrow => false,
            WidthClass::Wide => true,
            WidthClass::Ambiguous => self.ambiguous_is_wide(prev),
        };

        match (self.mode, wide) {
            (WidthMode::Fixed, true) => Measure {
                columns: 2,
                visual: 1.0,
            },
            (WidthMode::Fixed, false) => Measure {
                columns: 1,
                visual: 1.0,
            },
            (WidthMode::Flexible, true) => Measure {
                columns: 1,
                visual: 2.0,
            },
            (WidthMode::Flexible, false) => Measure {
                columns: 1,
                visual: 1.0,
            },
        }
    }

    fn ambiguous_is_wide(&self, prev: Option<&Cell>) -> bool {
        match self.ambiguous {
            AmbiguousWidth::Narrow => false,
            AmbiguousWidth::Wide => true,
            AmbiguousWidth::Auto => prev.is_some_and(|cell| !cell.is_blank() && cell.is_wide()),
        }
    }
}
