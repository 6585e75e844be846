//! The bounded agent loop.
//!
//! One `run_turn` call handles one user question: the model sees a
//! system prompt carrying sheet metadata, the stored transcript, and
//! the new question, then iterates tool calls until it answers in
//! prose or hits the backend's iteration ceiling.
//!
//! Key invariants:
//! - Tool calls within an iteration execute serially, in model order.
//! - A completed turn persists exactly one user message and exactly
//!   one assistant message; a transport failure persists neither.
//! - A malformed tool call does not abort the loop: the model gets a
//!   corrective system message and another attempt.

use gridagent_core::{ChatMessage, ChatRole, EngineError, SpreadsheetId, ToolCallRecord, ToolCallStatus};
use gridagent_store::{FilterStore, SheetStore};
use gridagent_tools::{tool_specs, Dispatcher};
use serde_json::Value;

use crate::provider::{Backend, TurnMessage};

const SYSTEM_PROMPT: &str = "You are a spreadsheet assistant. You answer questions about the \
user's data and make changes when asked, always through the provided tools.\n\
\n\
Rules:\n\
- Reference a sheet's table as context.spreadsheet.sheets[\"<sheet name>\"]. It is \
rewritten to the real table name before execution.\n\
- Every row has a row_number column. Use it to identify rows.\n\
- Read with executeSheetSql (SELECT only). Mutate with mutateSheetSql (INSERT, UPDATE, \
or ALTER TABLE ADD COLUMN). Delete rows only through deleteRows.\n\
- Use executeTempSql for multi-step work; temporary tables must be named with a tmp_ prefix.\n\
- When you are done, reply in plain prose summarizing what you found or changed.";

/// Result of one completed agent turn.
#[derive(Debug)]
pub struct TurnOutcome {
    /// The assistant message that was persisted.
    pub reply: ChatMessage,
    /// Model round-trips consumed.
    pub iterations: usize,
}

pub struct Orchestrator<'a> {
    store: &'a SheetStore,
    filters: &'a dyn FilterStore,
    spreadsheet: SpreadsheetId,
    backend: &'a dyn Backend,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a SheetStore,
        filters: &'a dyn FilterStore,
        spreadsheet: SpreadsheetId,
        backend: &'a dyn Backend,
    ) -> Self {
        Self {
            store,
            filters,
            spreadsheet,
            backend,
        }
    }

    /// Run one user question through the agent loop.
    pub fn run_turn(
        &self,
        question: &str,
        context_range: Option<&str>,
    ) -> Result<TurnOutcome, EngineError> {
        let tools: Vec<Value> = tool_specs()
            .iter()
            .map(|spec| {
                serde_json::json!({
                    "name": spec.name,
                    "description": spec.description,
                    "parameters": spec.parameters,
                })
            })
            .collect();

        let summary = self.store.sheet_summary(self.spreadsheet)?;
        let system = format!("{}\n\nCurrent spreadsheet:\n{}", SYSTEM_PROMPT, summary);

        let mut messages = vec![TurnMessage::System(system)];
        for prior in self.store.load_messages(self.spreadsheet)? {
            match prior.role {
                ChatRole::User => messages.push(TurnMessage::User(prior.content)),
                ChatRole::Assistant => messages.push(TurnMessage::Assistant {
                    content: Some(prior.content),
                    tool_calls: Vec::new(),
                }),
            }
        }

        let user_text = match context_range {
            Some(range) => format!("{}\n\n(The user has selected the range {}.)", question, range),
            None => question.to_string(),
        };
        messages.push(TurnMessage::User(user_text));

        let dispatcher = Dispatcher::new(self.store, self.filters, self.spreadsheet);
        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut final_text: Option<String> = None;
        let mut iterations = 0;

        while iterations < self.backend.max_iterations() {
            iterations += 1;
            let turn = self.backend.send(&messages, &tools)?;

            if let Some(reason) = turn.malformed {
                messages.push(TurnMessage::Assistant {
                    content: turn.text,
                    tool_calls: Vec::new(),
                });
                messages.push(TurnMessage::System(format!(
                    "Your last tool call was malformed ({}). Call the tool again with \
                     valid JSON arguments, or answer in plain prose.",
                    reason
                )));
                continue;
            }

            if turn.tool_calls.is_empty() {
                final_text = turn.text;
                break;
            }

            messages.push(TurnMessage::Assistant {
                content: turn.text.clone(),
                tool_calls: turn.tool_calls.clone(),
            });
            for call in turn.tool_calls {
                let (envelope, record) = dispatcher.dispatch(&call.name, &call.arguments);
                records.push(record);
                messages.push(TurnMessage::ToolResult {
                    call_id: call.id,
                    name: call.name,
                    content: envelope.to_string(),
                });
            }
        }

        let content = match final_text {
            Some(text) if !text.trim().is_empty() => text,
            _ => fallback_text(&records),
        };

        let mut user_message = ChatMessage::user(question);
        user_message.context_range = context_range.map(str::to_string);
        self.store.append_message(self.spreadsheet, &user_message)?;

        let reply = ChatMessage::assistant(&content, records);
        self.store.append_message(self.spreadsheet, &reply)?;

        Ok(TurnOutcome { reply, iterations })
    }
}

/// Synthesize assistant text when the model stopped without prose
/// (iteration ceiling, or an empty final message).
fn fallback_text(records: &[ToolCallRecord]) -> String {
    match records.last() {
        None => "I was unable to produce an answer for that request.".to_string(),
        Some(record) => match record.status {
            ToolCallStatus::Ok => {
                let summary = record
                    .summary
                    .clone()
                    .unwrap_or_else(|| format!("{} succeeded", record.name));
                format!("Query complete. {}.", summary.trim_end_matches('.'))
            }
            ToolCallStatus::Error => {
                let reason = record
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                format!("The {} call failed: {}", record.name, reason)
            }
        },
    }
}
