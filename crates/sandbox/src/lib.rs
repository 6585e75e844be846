//! `gridagent-sandbox`: textual SQL validation and rewriting.
//!
//! Accepts raw agent-authored SQL plus the physical table it is bound to
//! and either returns a rewritten statement ready to execute or a
//! specific rejection reason.
//!
//! This is deliberately a disciplined textual validator, not a SQL
//! parser. String literals and comments are blanked out before any
//! keyword scan, so `SELECT 'please do not drop this'` passes while a
//! keyword hidden in a comment still cannot execute. Table containment
//! checks run against the raw text so quoting cannot smuggle a foreign
//! table past them.

pub mod rewrite;
pub mod validate;

pub use rewrite::{parse_create_table_as, rewrite_sheet_refs};
pub use validate::{
    validate_condition, validate_mutation, validate_read, validate_select_fragment, validate_temp,
    BoundMutation, BoundRead, MutationKind,
};
