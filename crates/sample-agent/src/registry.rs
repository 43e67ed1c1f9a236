use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ToolError, ToolResult};
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;

/// A capability the model can invoke by name
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The schema advertised to the model
    fn tool(&self) -> &Tool;

    /// Run the tool with arguments that already passed schema validation
    async fn invoke(&self, arguments: Value) -> ToolResult<String>;
}

/// Name to capability mapping, shared read-only once the agent is built
#[derive(Default)]
pub struct ToolRegistry {
    handlers: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: ToolHandler + 'static>(&mut self, handler: H) -> ToolResult<()> {
        let name = handler.tool().name.clone();
        if self.index.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        self.index.insert(name, self.handlers.len());
        self.handlers.push(Arc::new(handler));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> ToolResult<&dyn ToolHandler> {
        self.index
            .get(name)
            .map(|&i| self.handlers[i].as_ref())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Schemas for every registered tool, in registration order
    pub fn tools(&self) -> Vec<Tool> {
        self.handlers.iter().map(|h| h.tool().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub async fn invoke(&self, name: &str, arguments: Value) -> ToolResult<String> {
        let handler = self.resolve(name)?;
        validate_arguments(&handler.tool().input_schema, &arguments)
            .map_err(|reason| ToolError::InvalidArguments(format!("{name}: {reason}")))?;
        handler.invoke(arguments).await
    }

    /// Run one requested call and wrap the outcome as a tool message.
    ///
    /// Failures become the message text so the model can see them and respond.
    pub async fn dispatch(&self, request: &ToolRequest) -> Message {
        let call = &request.tool_call;
        tracing::info!(tool = %call.name, call_id = %request.id, "dispatching tool call");

        let text = match self.invoke(&call.name, call.arguments.clone()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %request.id, error = %e, "tool call failed");
                format!("The tool call returned the following error:\n{}", e)
            }
        };

        Message::tool(request.id.clone()).with_text(text)
    }
}

/// Check `arguments` against the subset of JSON Schema our tools declare:
/// object type, `required`, per-property `type` and `enum`, and
/// `additionalProperties: false`.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    let empty = Map::new();
    let args = arguments
        .as_object()
        .ok_or_else(|| format!("arguments must be a JSON object, got {}", type_name(arguments)))?;
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(field) {
                return Err(format!("missing required parameter '{field}'"));
            }
        }
    }

    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
    for (key, value) in args {
        let Some(property) = properties.get(key) else {
            if closed {
                return Err(format!("unexpected parameter '{key}'"));
            }
            continue;
        };

        if let Some(expected) = property.get("type") {
            let allowed: Vec<&str> = match expected {
                Value::String(t) => vec![t.as_str()],
                Value::Array(ts) => ts.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };
            if !allowed.is_empty() && !allowed.iter().any(|t| matches_type(t, value)) {
                return Err(format!(
                    "parameter '{key}' must be of type {}, got {}",
                    allowed.join(" or "),
                    type_name(value)
                ));
            }
        }

        if let Some(options) = property.get("enum").and_then(Value::as_array) {
            if !options.contains(value) {
                return Err(format!("parameter '{key}' must be one of {}", Value::Array(options.clone())));
            }
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::role::Role;
    use crate::models::tool::ToolCall;
    use serde_json::json;

    struct EchoTool {
        tool: Tool,
    }

    impl EchoTool {
        fn new() -> Self {
            Self {
                tool: Tool::new(
                    "echo",
                    "Echoes back the input",
                    json!({
                        "type": "object",
                        "properties": {
                            "message": {"type": "string"},
                            "times": {"type": "integer"},
                            "mode": {"enum": ["loud", "quiet"]}
                        },
                        "required": ["message"],
                        "additionalProperties": false
                    }),
                ),
            }
        }
    }

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn tool(&self) -> &Tool {
            &self.tool
        }

        async fn invoke(&self, arguments: Value) -> ToolResult<String> {
            let message = arguments["message"].as_str().unwrap_or_default();
            if message == "explode" {
                return Err(ToolError::Execution("kaboom".into()));
            }
            Ok(message.to_string())
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool::new()).unwrap();
        registry
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = registry();
        assert_eq!(
            registry.register(EchoTool::new()),
            Err(ToolError::Duplicate("echo".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve() {
        let registry = registry();
        assert_eq!(registry.resolve("echo").unwrap().tool().name, "echo");
        assert!(matches!(registry.resolve("nope"), Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let output = registry().invoke("echo", json!({"message": "hi"})).await.unwrap();
        assert_eq!(output, "hi");
    }

    #[tokio::test]
    async fn test_invoke_argument_errors() {
        let registry = registry();
        let cases = [
            json!({}),
            json!({"message": 5}),
            json!({"message": "hi", "times": 1.5}),
            json!({"message": "hi", "mode": "shout"}),
            json!({"message": "hi", "extra": true}),
            json!("not an object"),
        ];
        for arguments in cases {
            let result = registry.invoke("echo", arguments.clone()).await;
            assert!(
                matches!(result, Err(ToolError::InvalidArguments(_))),
                "expected argument error for {arguments}"
            );
        }
    }

    #[tokio::test]
    async fn test_dispatch_converts_failures_to_text() {
        let registry = registry();

        let request = ToolRequest {
            id: "1".into(),
            tool_call: ToolCall::new("echo", json!({"message": "explode"})),
        };
        let message = registry.dispatch(&request).await;
        assert_eq!(message.role, Role::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("1"));
        assert!(message.text().contains("kaboom"));

        let request = ToolRequest {
            id: "2".into(),
            tool_call: ToolCall::new("missing", json!({})),
        };
        let message = registry.dispatch(&request).await;
        assert!(message.text().contains("Tool not found: missing"));
    }
}
