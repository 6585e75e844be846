//! `gridagent-core`: shared types for the grid agent engine.
//!
//! Pure types crate: ids, error enums, the chat/tool-record data model,
//! A1 range parsing, and identifier sanitization. No IO dependencies.

pub mod a1;
pub mod catalog;
pub mod chat;
pub mod error;
pub mod ident;
pub mod ids;

pub use catalog::SheetCatalog;
pub use chat::{ChatMessage, ChatRole, ToolCallKind, ToolCallRecord, ToolCallStatus};
pub use error::EngineError;
pub use ids::{SheetId, SpreadsheetId};
