// Typed ids for spreadsheets and sheets.
//
// Both are SQLite rowids underneath. Newtypes keep them from being
// swapped at call sites that take several i64 arguments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a spreadsheet (workbook-level container).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpreadsheetId(pub i64);

/// Identifier of a sheet. Also determines the physical table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub i64);

impl SheetId {
    /// Physical table name for this sheet: `sheet_<id>`.
    pub fn table_name(&self) -> String {
        format!("sheet_{}", self.0)
    }
}

impl fmt::Display for SpreadsheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_table_name() {
        assert_eq!(SheetId(7).table_name(), "sheet_7");
        assert_eq!(SheetId(123).table_name(), "sheet_123");
    }
}
