// Chat transcript data model.
//
// ChatMessage and ToolCallRecord are immutable once created: the
// orchestrator appends exactly one user message at the start of a turn
// and one assistant message at the end. Tool records ride along on the
// assistant message as a JSON blob.

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Whether a tool call read or mutated sheet data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallKind {
    Read,
    Mutation,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    Ok,
    Error,
}

/// Audit entry for one executed tool call. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool name as requested by the model.
    pub name: String,
    pub kind: ToolCallKind,
    /// Target sheet name, if the tool was sheet-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// SQL text, condition, or A1 range that drove the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub status: ToolCallStatus,
    /// Human-readable side-effect summary ("3 rows changed", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallRecord {
    pub fn ok(name: &str, kind: ToolCallKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            sheet: None,
            detail: None,
            status: ToolCallStatus::Ok,
            summary: None,
            error: None,
        }
    }

    pub fn error(name: &str, kind: ToolCallKind, message: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            sheet: None,
            detail: None,
            status: ToolCallStatus::Error,
            summary: None,
            error: Some(message.to_string()),
        }
    }

    pub fn with_sheet(mut self, sheet: &str) -> Self {
        self.sheet = Some(sheet.to_string());
        self
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn with_summary(mut self, summary: &str) -> Self {
        self.summary = Some(summary.to_string());
        self
    }
}

/// One persisted chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// A1 range the user had selected when asking, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_range: Option<String>,
    /// Tool calls executed while producing this (assistant) message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl ChatMessage {
    pub fn user(content: &str) -> Self {
        Self {
            role: ChatRole::User,
            content: content.to_string(),
            context_range: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant(content: &str, tool_calls: Vec<ToolCallRecord>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.to_string(),
            context_range: None,
            tool_calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trips_through_json() {
        let rec = ToolCallRecord::ok("executeSheetSql", ToolCallKind::Read)
            .with_sheet("Sales")
            .with_detail("SELECT 1")
            .with_summary("1 row");
        let json = serde_json::to_string(&rec).unwrap();
        let back: ToolCallRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "executeSheetSql");
        assert_eq!(back.status, ToolCallStatus::Ok);
        assert_eq!(back.sheet.as_deref(), Some("Sales"));
        assert!(back.error.is_none());
    }

    #[test]
    fn error_record_skips_empty_fields() {
        let rec = ToolCallRecord::error("deleteRows", ToolCallKind::Mutation, "no such sheet");
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "no such sheet");
        assert!(json.get("summary").is_none());
    }
}
