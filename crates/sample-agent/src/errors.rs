use thiserror::Error;

/// Failures raised while resolving or running a tool.
///
/// These never abort a turn: the registry turns them into tool messages so the
/// model can react to them conversationally.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Failures that abort a request.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Model gateway failed: {0}")]
    Gateway(String),

    #[error("Session storage failed: {0}")]
    Storage(String),

    #[error("Unresolved tool calls: {}", .0.join(", "))]
    UnresolvedToolCalls(Vec<String>),

    #[error("Turn limit of {0} reached before the model produced a reply")]
    TurnLimit(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
