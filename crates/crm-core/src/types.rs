use serde::{Deserialize, Serialize};

/// A single message in a conversation.
///
/// Tagged by `role` on the wire so checkpoints stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    Assistant {
        content: String,
        /// Tool calls requested by the assistant.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool(ToolResult),
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn tool_result(result: ToolResult) -> Self {
        Message::Tool(result)
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool(_) => Role::Tool,
        }
    }

    /// Rendered text of the message. Empty for an assistant message that only
    /// carries tool calls.
    pub fn content(&self) -> &str {
        match self {
            Message::User { content } | Message::Assistant { content, .. } => content,
            Message::Tool(result) => &result.content,
        }
    }

    /// Pending tool calls. Always empty for non-assistant messages.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            Message::Tool(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the model. `arguments` is the raw string the
/// model produced; it is parsed only when the call is executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// Why a tool call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The argument string was not a JSON object, or did not fit the tool.
    InvalidArguments,
    ToolNotFound,
    /// The remote API answered with an error status.
    Api,
    /// The remote API could not be reached or timed out.
    Connection,
    Execution,
    /// The client went away before the call was started.
    Cancelled,
}

/// The answer to one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ToolResult {
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            failure: None,
        }
    }

    pub fn failure(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: FailureKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: content.into(),
            failure: Some(kind),
        }
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }
}

/// Schema definition for a tool's parameters, sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_with_role_tag() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "log_interaction", "{}")],
        );
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["tool_calls"][0]["name"], "log_interaction");

        let result = Message::tool_result(ToolResult::failure(
            "call_1",
            "log_interaction",
            FailureKind::Connection,
            "CONNECTION ERROR: refused",
        ));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["failure"], "connection");

        let parsed: Message = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, result);
    }

    #[test]
    fn test_accessors() {
        let user = Message::user("hello");
        assert_eq!(user.role(), Role::User);
        assert_eq!(user.content(), "hello");
        assert!(user.tool_calls().is_empty());
        assert!(user.as_tool_result().is_none());

        let plain = Message::assistant("done");
        assert!(plain.tool_calls().is_empty());
    }
}
