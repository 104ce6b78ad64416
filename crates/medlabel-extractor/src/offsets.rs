//! Label position conversion and character slicing
//!
//! Label files count positions in characters, 1-based, with the end
//! position inclusive. Rust strings index by byte, so slicing goes
//! through a table of character boundaries.

use std::ops::Range;

use medlabel_core::OffsetPolicy;

/// Convert 1-based inclusive label positions to a 0-based half-open range.
///
/// Only the start moves: `(24, 33)` becomes `23..33`. The shift saturates,
/// so `i64::MIN` stays negative and falls outside every note.
pub fn label_char_range(start: i64, end: i64) -> Range<i64> {
    start.saturating_sub(1)..end
}

/// Parse a position cell.
///
/// Accepts integers and integral floats (`"24.0"`), which is what a
/// position column looks like after a round trip through a dataframe
/// with missing values.
pub fn parse_position(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Character boundary table for one text
#[derive(Debug, Clone)]
pub struct CharBoundaries<'a> {
    text: &'a str,
    /// Byte offset of every character, plus the text length
    offsets: Vec<usize>,
}

impl<'a> CharBoundaries<'a> {
    pub fn new(text: &'a str) -> Self {
        let offsets = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { text, offsets }
    }

    /// Number of characters in the text
    pub fn char_count(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Slice by character range.
    ///
    /// Under `Strict`, returns `None` unless `0 <= start <= end <= len`.
    /// Under `Clamp`, both ends are clamped into `[0, len]` and an
    /// inverted range yields an empty slice.
    pub fn slice(&self, range: Range<i64>, policy: OffsetPolicy) -> Option<&'a str> {
        let len = self.char_count() as i64;
        let (lo, hi) = match policy {
            OffsetPolicy::Strict => {
                if range.start < 0 || range.start > range.end || range.end > len {
                    return None;
                }
                (range.start, range.end)
            }
            OffsetPolicy::Clamp => {
                let lo = range.start.clamp(0, len);
                let hi = range.end.clamp(0, len);
                (lo, hi.max(lo))
            }
        };
        Some(&self.text[self.offsets[lo as usize]..self.offsets[hi as usize]])
    }
}
