//! OpenAI chat-completions backend.
//!
//! Uses the function-tools flavour of the chat completions API.
//! Arguments arrive as a JSON-encoded string; when that string does not
//! parse, the turn is flagged malformed rather than failed so the
//! orchestrator can send a corrective message.

use gridagent_core::EngineError;
use serde_json::{json, Value};

use crate::provider::{Backend, ModelTurn, ToolInvocation, TurnMessage};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const MAX_ITERATIONS: usize = 4;

pub struct OpenAiBackend {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String, api_base: Option<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::blocking::Client::new());
        OpenAiBackend {
            http,
            api_key,
            model,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }
}

impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn max_iterations(&self) -> usize {
        MAX_ITERATIONS
    }

    fn send(&self, messages: &[TurnMessage], tools: &[Value]) -> Result<ModelTurn, EngineError> {
        let body = build_body(&self.model, messages, tools);

        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| EngineError::Provider(format!("openai: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| EngineError::Provider(format!("openai: {}", e)))?;

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
                "openai: HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        let parsed: Value = serde_json::from_str(&text)
            .map_err(|e| EngineError::Provider(format!("openai: invalid response body: {}", e)))?;
        Ok(parse_body(&parsed))
    }
}

/// Build the chat-completions request body for the given transcript.
pub(crate) fn build_body(model: &str, messages: &[TurnMessage], tools: &[Value]) -> Value {
    let mut wire = Vec::new();
    for message in messages {
        match message {
            TurnMessage::System(text) => {
                wire.push(json!({ "role": "system", "content": text }));
            }
            TurnMessage::User(text) => {
                wire.push(json!({ "role": "user", "content": text }));
            }
            TurnMessage::Assistant { content, tool_calls } => {
                let mut entry = json!({ "role": "assistant" });
                entry["content"] = match content {
                    Some(text) => json!(text),
                    None => Value::Null,
                };
                if !tool_calls.is_empty() {
                    let calls: Vec<Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                },
                            })
                        })
                        .collect();
                    entry["tool_calls"] = json!(calls);
                }
                wire.push(entry);
            }
            TurnMessage::ToolResult { call_id, content, .. } => {
                wire.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": content,
                }));
            }
        }
    }

    let wrapped: Vec<Value> = tools
        .iter()
        .map(|spec| json!({ "type": "function", "function": spec }))
        .collect();

    json!({
        "model": model,
        "messages": wire,
        "tools": wrapped,
    })
}

/// Extract text and tool calls from a chat-completions response body.
pub(crate) fn parse_body(body: &Value) -> ModelTurn {
    let mut turn = ModelTurn::default();

    let message = match body.pointer("/choices/0/message") {
        Some(m) => m,
        None => {
            turn.malformed = Some("response had no choices".to_string());
            return turn;
        }
    };

    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            turn.text = Some(text.to_string());
        }
    }

    let calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for (i, call) in calls.iter().enumerate() {
        let id = call
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("call_{}", i));
        let name = call
            .pointer("/function/name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let raw_args = call
            .pointer("/function/arguments")
            .and_then(Value::as_str)
            .unwrap_or("{}");
        match serde_json::from_str::<Value>(raw_args) {
            Ok(arguments) => turn.tool_calls.push(ToolInvocation { id, name, arguments }),
            Err(e) => {
                turn.malformed =
                    Some(format!("arguments for {} were not valid JSON: {}", name, e));
            }
        }
    }

    turn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_maps_roles_and_wraps_tools() {
        let messages = vec![
            TurnMessage::System("be helpful".into()),
            TurnMessage::User("sum revenue".into()),
            TurnMessage::Assistant {
                content: None,
                tool_calls: vec![ToolInvocation {
                    id: "call_1".into(),
                    name: "executeSheetSql".into(),
                    arguments: json!({ "sql": "SELECT 1" }),
                }],
            },
            TurnMessage::ToolResult {
                call_id: "call_1".into(),
                name: "executeSheetSql".into(),
                content: "{\"ok\":true}".into(),
            },
        ];
        let tools = vec![json!({ "name": "executeSheetSql", "parameters": {} })];
        let body = build_body("gpt-4o", &messages, &tools);

        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["content"], Value::Null);
        assert_eq!(
            body["messages"][2]["tool_calls"][0]["function"]["arguments"],
            "{\"sql\":\"SELECT 1\"}"
        );
        assert_eq!(body["messages"][3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "executeSheetSql");
    }

    #[test]
    fn parse_body_extracts_tool_calls() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "function": {
                            "name": "filter_add",
                            "arguments": "{\"condition\":\"revenue > 100\"}",
                        },
                    }],
                },
            }],
        });
        let turn = parse_body(&body);
        assert!(turn.text.is_none());
        assert!(turn.malformed.is_none());
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].name, "filter_add");
        assert_eq!(turn.tool_calls[0].arguments["condition"], "revenue > 100");
    }

    #[test]
    fn parse_body_flags_unparseable_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_2",
                        "function": { "name": "deleteRows", "arguments": "{not json" },
                    }],
                },
            }],
        });
        let turn = parse_body(&body);
        assert!(turn.tool_calls.is_empty());
        assert!(turn.malformed.unwrap().contains("deleteRows"));
    }

    #[test]
    fn parse_body_plain_text_reply() {
        let body = json!({
            "choices": [{ "message": { "content": "Total revenue is 240." } }],
        });
        let turn = parse_body(&body);
        assert_eq!(turn.text.as_deref(), Some("Total revenue is 240."));
        assert!(turn.tool_calls.is_empty());
    }
}
