//! `gridagent-store`: SQLite-backed table store.
//!
//! Owns the physical per-sheet tables (`sheet_<id>`, keyed by
//! `row_number`), the metadata tables that are the single source of
//! truth for headers and column order, cell-level IO, and chat
//! transcript persistence.
//!
//! Key invariants:
//! - All mutation goes through the one read-write connection; the
//!   read-only connection serves agent queries and trial validation
//! - `sheet_columns.column_index` is a contiguous 0..N-1 range per sheet
//! - Row numbers are stable for the life of a row and never reassigned
//! - Metadata is authoritative; `sync_columns` reconciles the live
//!   schema into metadata, never the reverse

pub mod cells;
pub mod chat;
pub mod columns;
pub mod filters;
pub mod schema;
pub mod store;

pub use cells::{MutationResult, QueryResult, VisibleRows};
pub use columns::ColumnMeta;
pub use filters::{FilterStore, MemoryFilterStore};
pub use store::{SheetInfo, SheetStore, StoreCatalog};

use gridagent_core::EngineError;

/// Convert a rusqlite error into the engine error type.
///
/// "no such column" surfaces as NotFound so the dispatcher maps it to a
/// 404-equivalent instead of a generic SQL failure.
pub(crate) fn sql_err(e: rusqlite::Error) -> EngineError {
    let msg = e.to_string();
    if msg.contains("no such column") {
        EngineError::NotFound(msg)
    } else {
        EngineError::Sqlite(msg)
    }
}
