//! `gridagent-tools`: tool dispatcher.
//!
//! Translates one named tool invocation plus JSON arguments into store /
//! sandbox / filter-store calls, returning a JSON result envelope and an
//! audit record. The dispatcher is the boundary past which failures are
//! always data, never control flow: every error becomes
//! `{ok:false, error}`.

pub mod dispatcher;
pub mod schema;

pub use dispatcher::Dispatcher;
pub use schema::{tool_specs, ToolSpec};
