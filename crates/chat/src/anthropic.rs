//! Anthropic messages-API backend.
//!
//! System text travels in the top-level `system` field, not the message
//! list. Tool calls come back as `tool_use` content blocks with already
//! structured input, and results go back as `tool_result` blocks inside
//! a user message.

use gridagent_core::EngineError;
use serde_json::{json, Value};

use crate::provider::{Backend, ModelTurn, ToolInvocation, TurnMessage};

const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const MAX_ITERATIONS: usize = 10;
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicBackend {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String, api_base: Option<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        AnthropicBackend {
            http,
            api_key,
            model,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }
}

impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn max_iterations(&self) -> usize {
        MAX_ITERATIONS
    }

    fn send(&self, messages: &[TurnMessage], tools: &[Value]) -> Result<ModelTurn, EngineError> {
        let body = build_body(&self.model, messages, tools);

        let response = self
            .http
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| EngineError::Provider(format!("anthropic: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| EngineError::Provider(format!("anthropic: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(text);
            return Err(EngineError::Provider(format!(
                "anthropic: HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            EngineError::Provider(format!("anthropic: invalid response body: {}", e))
        })?;
        Ok(parse_body(&parsed))
    }
}

/// Build the messages-API request body. Consecutive system entries are
/// concatenated into the top-level `system` field; tool results become
/// `tool_result` blocks in user messages.
pub(crate) fn build_body(model: &str, messages: &[TurnMessage], tools: &[Value]) -> Value {
    let mut system = String::new();
    let mut wire: Vec<Value> = Vec::new();

    for message in messages {
        match message {
            TurnMessage::System(text) => {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(text);
            }
            TurnMessage::User(text) => {
                wire.push(json!({ "role": "user", "content": text }));
            }
            TurnMessage::Assistant { content, tool_calls } => {
                let mut blocks: Vec<Value> = Vec::new();
                if let Some(text) = content {
                    blocks.push(json!({ "type": "text", "text": text }));
                }
                for call in tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": call.arguments,
                    }));
                }
                wire.push(json!({ "role": "assistant", "content": blocks }));
            }
            TurnMessage::ToolResult { call_id, content, .. } => {
                // Fold consecutive tool results into one user message.
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": content,
                });
                let folded = wire.last_mut().and_then(|last| {
                    if last["role"] != "user" {
                        return None;
                    }
                    let blocks = last["content"].as_array_mut()?;
                    let is_result = blocks
                        .first()
                        .and_then(|b| b.get("type"))
                        .map_or(false, |t| t == "tool_result");
                    if is_result {
                        Some(blocks)
                    } else {
                        None
                    }
                });
                match folded {
                    Some(blocks) => blocks.push(block),
                    None => wire.push(json!({ "role": "user", "content": [block] })),
                }
            }
        }
    }

    let wrapped: Vec<Value> = tools
        .iter()
        .map(|spec| {
            json!({
                "name": spec["name"],
                "description": spec["description"],
                "input_schema": spec["parameters"],
            })
        })
        .collect();

    let mut body = json!({
        "model": model,
        "max_tokens": MAX_TOKENS,
        "messages": wire,
        "tools": wrapped,
    });
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    body
}

/// Extract text and tool calls from a messages-API response body.
pub(crate) fn parse_body(body: &Value) -> ModelTurn {
    let mut turn = ModelTurn::default();

    let blocks = match body.get("content").and_then(Value::as_array) {
        Some(blocks) => blocks,
        None => {
            turn.malformed = Some("response had no content blocks".to_string());
            return turn;
        }
    };

    let mut text = String::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(chunk) = block.get("text").and_then(Value::as_str) {
                    text.push_str(chunk);
                }
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if name.is_empty() {
                    turn.malformed = Some("tool_use block had no name".to_string());
                    continue;
                }
                let arguments = block.get("input").cloned().unwrap_or(json!({}));
                turn.tool_calls.push(ToolInvocation { id, name, arguments });
            }
            _ => {}
        }
    }
    if !text.is_empty() {
        turn.text = Some(text);
    }

    turn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_lifts_system_and_folds_tool_results() {
        let messages = vec![
            TurnMessage::System("be helpful".into()),
            TurnMessage::User("sum revenue".into()),
            TurnMessage::Assistant {
                content: None,
                tool_calls: vec![
                    ToolInvocation {
                        id: "toolu_1".into(),
                        name: "executeSheetSql".into(),
                        arguments: json!({ "sql": "SELECT 1" }),
                    },
                    ToolInvocation {
                        id: "toolu_2".into(),
                        name: "filters_get".into(),
                        arguments: json!({}),
                    },
                ],
            },
            TurnMessage::ToolResult {
                call_id: "toolu_1".into(),
                name: "executeSheetSql".into(),
                content: "{\"ok\":true}".into(),
            },
            TurnMessage::ToolResult {
                call_id: "toolu_2".into(),
                name: "filters_get".into(),
                content: "{\"filters\":[]}".into(),
            },
        ];
        let tools = vec![json!({
            "name": "executeSheetSql",
            "description": "run sql",
            "parameters": { "type": "object" },
        })];
        let body = build_body("claude-sonnet-4-5", &messages, &tools);

        assert_eq!(body["system"], "be helpful");
        // system message excluded from the list; both results in one user turn
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        let results = body["messages"][2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["tool_use_id"], "toolu_2");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn parse_body_reads_tool_use_blocks() {
        let body = json!({
            "content": [
                { "type": "text", "text": "Checking the sheet." },
                {
                    "type": "tool_use",
                    "id": "toolu_3",
                    "name": "executeSheetSql",
                    "input": { "sql": "SELECT COUNT(*) FROM t" },
                },
            ],
        });
        let turn = parse_body(&body);
        assert_eq!(turn.text.as_deref(), Some("Checking the sheet."));
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "toolu_3");
        assert!(turn.malformed.is_none());
    }

    #[test]
    fn parse_body_flags_nameless_tool_use() {
        let body = json!({
            "content": [{ "type": "tool_use", "id": "toolu_4", "input": {} }],
        });
        let turn = parse_body(&body);
        assert!(turn.tool_calls.is_empty());
        assert!(turn.malformed.is_some());
    }
}
