// A1-style cell and range references.
//
// Highlights accept either a SQL condition or an A1 range; this module
// only needs enough A1 to turn "B2:D10" into column/row bounds. Row
// numbers here are 1-based, matching the row_number primary key.

use serde::{Deserialize, Serialize};

/// An inclusive rectangular range in A1 space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct A1Range {
    /// 1-based first row.
    pub start_row: u32,
    /// 0-based first column.
    pub start_col: u32,
    pub end_row: u32,
    pub end_col: u32,
}

impl A1Range {
    /// Row numbers covered by this range, in order.
    pub fn row_numbers(&self) -> Vec<i64> {
        (self.start_row..=self.end_row).map(|r| r as i64).collect()
    }
}

/// Parse "A1", "B2:D10" (case-insensitive). Rejects open-ended forms
/// like "A:A": sheet tables are unbounded, so whole-column highlights
/// go through the condition path instead.
pub fn parse_range(text: &str) -> Option<A1Range> {
    let text = text.trim();
    let (first, second) = match text.split_once(':') {
        Some((a, b)) => (a, Some(b)),
        None => (text, None),
    };
    let (start_col, start_row) = parse_cell(first)?;
    let (end_col, end_row) = match second {
        Some(b) => parse_cell(b)?,
        None => (start_col, start_row),
    };
    Some(A1Range {
        start_row: start_row.min(end_row),
        start_col: start_col.min(end_col),
        end_row: start_row.max(end_row),
        end_col: start_col.max(end_col),
    })
}

/// Parse a single cell like "C12" into (0-based col, 1-based row).
fn parse_cell(text: &str) -> Option<(u32, u32)> {
    let text = text.trim();
    let split = text.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = text.split_at(split);
    if letters.is_empty() || digits.is_empty() {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((col - 1, row))
}
