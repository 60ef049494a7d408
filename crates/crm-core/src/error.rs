use crate::types::FailureKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("API ERROR: {context} (HTTP {status}): {detail}")]
    Api {
        context: String,
        status: u16,
        detail: String,
    },

    #[error("CONNECTION ERROR: {context} due to network failure: {message}")]
    Connection { context: String, message: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Loop invariant violated: {0}")]
    LoopInvariant(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled by client")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Classify this error for a tool result. Called once, where the failure
    /// is turned into a message.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            AgentError::InvalidArguments { .. } => FailureKind::InvalidArguments,
            AgentError::ToolNotFound(_) => FailureKind::ToolNotFound,
            AgentError::Api { .. } => FailureKind::Api,
            AgentError::Connection { .. } => FailureKind::Connection,
            AgentError::Cancelled => FailureKind::Cancelled,
            _ => FailureKind::Execution,
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_keep_their_tags() {
        let api = AgentError::Api {
            context: "Failed to log interaction".into(),
            status: 500,
            detail: "db down".into(),
        };
        assert_eq!(api.failure_kind(), FailureKind::Api);
        assert_eq!(
            api.to_string(),
            "API ERROR: Failed to log interaction (HTTP 500): db down"
        );

        let conn = AgentError::Connection {
            context: "Failed to log interaction".into(),
            message: "connection refused".into(),
        };
        assert_eq!(conn.failure_kind(), FailureKind::Connection);
        assert!(conn.to_string().starts_with("CONNECTION ERROR:"));
    }

    #[test]
    fn test_everything_else_is_an_execution_failure() {
        let err = AgentError::ToolExecution {
            tool_name: "x".into(),
            message: "boom".into(),
        };
        assert_eq!(err.failure_kind(), FailureKind::Execution);
        assert_eq!(
            AgentError::Provider("rate limited".into()).failure_kind(),
            FailureKind::Execution
        );
    }
}
