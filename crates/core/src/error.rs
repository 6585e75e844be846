use std::fmt;

/// Engine-wide error type.
///
/// The tool dispatcher converts every variant except `Provider` into an
/// `{ok:false, error}` envelope; `Provider` aborts the chat turn.
#[derive(Debug, Clone)]
pub enum EngineError {
    /// Rejected SQL or bad tool arguments (wrong table, blacklisted
    /// keyword, stacked statements, unsupported mutation kind, ...).
    Validation(String),
    /// Unknown spreadsheet / sheet / column.
    NotFound(String),
    /// SQLite-level failure.
    Sqlite(String),
    /// AI backend transport failure.
    Provider(String),
    /// File IO error.
    Io(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Sqlite(msg) => write!(f, "sqlite error: {msg}"),
            Self::Provider(msg) => write!(f, "provider error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Whether this error should abort the agent turn instead of being
    /// fed back to the model as a tool-result error.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Provider(_))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}
