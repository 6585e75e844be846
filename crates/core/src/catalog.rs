// Sheet name resolution boundary between the sandbox and the store.
//
// The sandbox is a textual validator with no database access; it asks
// the catalog to turn a symbolic reference into a physical table name
// and to recognize foreign sheet tables.

/// Resolves symbolic sheet references for the SQL sandbox.
pub trait SheetCatalog {
    /// Resolve `<name|slug|id>` (the text inside
    /// `context.spreadsheet.sheets["..."]`) to a physical table name.
    fn resolve_table(&self, reference: &str) -> Option<String>;

    /// Whether `table` is the physical table of some sheet in this
    /// spreadsheet. Used to reject cross-sheet queries.
    fn is_sheet_table(&self, table: &str) -> bool;
}
