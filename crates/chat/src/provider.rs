//! Backend adapter trait and the provider-neutral turn representation.
//!
//! The orchestrator speaks only these types; each backend translates
//! them to and from its provider's wire format. Key invariants:
//!
//! - Tool results are delivered back under the same `call_id` the model
//!   issued, in the order the calls were returned.
//! - A malformed tool call (unparseable arguments) surfaces as
//!   `ModelTurn::malformed`, never as a transport error: the loop
//!   continues with a corrective message instead of aborting.

use gridagent_core::EngineError;
use serde_json::Value;

/// One message in the provider-neutral conversation transcript.
#[derive(Debug, Clone)]
pub enum TurnMessage {
    System(String),
    User(String),
    Assistant {
        content: Option<String>,
        tool_calls: Vec<ToolInvocation>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

/// A tool call the model asked for, with parsed arguments.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// What the model produced for one iteration of the loop.
#[derive(Debug, Default)]
pub struct ModelTurn {
    /// Assistant text, if any.
    pub text: Option<String>,
    /// Tool calls to execute, in order.
    pub tool_calls: Vec<ToolInvocation>,
    /// Set when the model emitted a tool call the backend could not
    /// parse; carries a description for the corrective message.
    pub malformed: Option<String>,
}

/// A provider adapter. Implementations own the HTTP transport and the
/// request/response translation for one AI provider.
pub trait Backend {
    /// Short provider name, used in error messages.
    fn name(&self) -> &str;

    /// Ceiling on model round-trips per user turn.
    fn max_iterations(&self) -> usize;

    /// Send the transcript plus tool schema, return the model's turn.
    /// Errors from this method are transport failures: the orchestrator
    /// persists nothing and surfaces them to the caller.
    fn send(&self, messages: &[TurnMessage], tools: &[Value]) -> Result<ModelTurn, EngineError>;
}
