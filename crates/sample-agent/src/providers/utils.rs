use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::errors::ProviderError;
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role,
        });

        match message.role {
            Role::Assistant => {
                // content may be null when the assistant only requests tools
                converted["content"] = if message.content.is_empty() && !message.tool_calls.is_empty() {
                    Value::Null
                } else {
                    json!(message.content)
                };

                if !message.tool_calls.is_empty() {
                    let tool_calls: Vec<Value> = message
                        .tool_calls
                        .iter()
                        .map(|request| {
                            json!({
                                "id": request.id,
                                "type": "function",
                                "function": {
                                    "name": sanitize_function_name(&request.tool_call.name),
                                    "arguments": request.tool_call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
            }
            Role::Tool => {
                converted["content"] = json!(message.content);
                converted["tool_call_id"] = json!(message.tool_call_id.clone().unwrap_or_default());
            }
            Role::System | Role::User => {
                converted["content"] = json!(message.content);
            }
        }

        messages_spec.push(converted);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>, ProviderError> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ProviderError::InvalidRequest(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message, ProviderError> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".into()))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            // Unparseable arguments are kept verbatim; schema validation at
            // dispatch reports them back to the model.
            let arguments = if arguments.trim().is_empty() {
                json!({})
            } else {
                serde_json::from_str::<Value>(arguments)
                    .unwrap_or_else(|_| Value::String(arguments.to_string()))
            };

            message = message.with_tool_call(id, ToolCall::new(function_name, arguments));
        }
    }

    Ok(message)
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn check_openai_context_length_error(error: &Value) -> Option<ProviderError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ProviderError::ContextLengthExceeded(message))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "choices": [{
            "role": "assistant",
            "message": {
                "content": null,
                "tool_calls": [{
                    "id": "1",
                    "function": {
                        "name": "example_fn",
                        "arguments": "{\"param\": \"value\"}"
                    }
                }]
            }
        }],
        "usage": {
            "input_tokens": 10,
            "output_tokens": 25,
            "total_tokens": 35
        }
    }"#;

    #[test]
    fn test_messages_to_openai_spec() {
        let messages = vec![
            Message::user().with_text("Open C:\\a.pdf"),
            Message::assistant().with_tool_call(
                "call_1",
                ToolCall::new("open_file", json!({"file_path": "C:\\a.pdf"})),
            ),
            Message::tool("call_1").with_text("Opened file: C:\\a.pdf"),
            Message::assistant().with_text("Done."),
        ];

        let spec = messages_to_openai_spec(&messages);

        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Open C:\\a.pdf");
        assert_eq!(spec[1]["role"], "assistant");
        assert!(spec[1]["content"].is_null());
        assert_eq!(spec[1]["tool_calls"][0]["id"], "call_1");
        assert_eq!(spec[1]["tool_calls"][0]["function"]["name"], "open_file");
        assert_eq!(
            spec[1]["tool_calls"][0]["function"]["arguments"],
            r#"{"file_path":"C:\\a.pdf"}"#
        );
        assert_eq!(spec[2]["role"], "tool");
        assert_eq!(spec[2]["tool_call_id"], "call_1");
        assert_eq!(spec[3]["content"], "Done.");
    }

    #[test]
    fn test_tools_to_openai_spec() -> Result<(), ProviderError> {
        let tool = Tool::new(
            "test_tool",
            "A test tool",
            json!({
                "type": "object",
                "properties": {
                    "input": {
                        "type": "string",
                        "description": "Test parameter"
                    }
                },
                "required": ["input"]
            }),
        );

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "test_tool");
        assert_eq!(spec[0]["function"]["parameters"]["required"][0], "input");
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let tool = Tool::new("dup", "", json!({}));
        let result = tools_to_openai_spec(&[tool.clone(), tool]);
        assert!(matches!(result, Err(ProviderError::InvalidRequest(_))));
    }

    #[test]
    fn test_openai_response_to_message_text() -> Result<(), ProviderError> {
        let response = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello there"}
            }]
        });
        let message = openai_response_to_message(&response)?;
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.text(), "Hello there");
        assert!(!message.is_tool_call());
        Ok(())
    }

    #[test]
    fn test_openai_response_to_message_tool_request() -> Result<(), ProviderError> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE).unwrap();
        let message = openai_response_to_message(&response)?;

        assert!(message.is_tool_call());
        let request = &message.tool_requests()[0];
        assert_eq!(request.id, "1");
        assert_eq!(request.tool_call.name, "example_fn");
        assert_eq!(request.tool_call.arguments, json!({"param": "value"}));
        Ok(())
    }

    #[test]
    fn test_openai_response_keeps_malformed_arguments() -> Result<(), ProviderError> {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE).unwrap();
        response["choices"][0]["message"]["tool_calls"][0]["function"]["arguments"] =
            json!("{not json");

        let message = openai_response_to_message(&response)?;
        assert_eq!(message.tool_requests()[0].tool_call.arguments, json!("{not json"));
        Ok(())
    }

    #[test]
    fn test_openai_response_without_choices() {
        let result = openai_response_to_message(&json!({"choices": []}));
        assert!(matches!(result, Err(ProviderError::InvalidResponse(_))));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("open_file"), "open_file");
        assert_eq!(sanitize_function_name("open file!"), "open_file_");
    }

    #[test]
    fn test_check_openai_context_length_error() {
        let error = json!({
            "code": "context_length_exceeded",
            "message": "This message is too long"
        });
        let result = check_openai_context_length_error(&error);
        assert!(matches!(result, Some(ProviderError::ContextLengthExceeded(m)) if m == "This message is too long"));

        let error = json!({"code": "other_error", "message": "Some other error"});
        assert!(check_openai_context_length_error(&error).is_none());
    }
}
