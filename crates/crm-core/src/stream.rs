//! Stream adapter: turns appended messages into client events.
//!
//! Events are sent in append order over an unbounded channel. Every stream
//! ends with exactly one terminal event: `DONE` after a normal run, `ERROR`
//! otherwise.

use crate::agent_loop::LoopOutcome;
use crate::error::AgentError;
use crate::types::{FailureKind, Message, ToolCall};
use serde::Serialize;
use tokio::sync::mpsc;

/// An event visible to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "TEXT")]
    Text { content: String },

    #[serde(rename = "TOOL_CALL_REQUEST")]
    ToolCallRequest { tool_calls: Vec<ToolCall> },

    /// A tool result.
    #[serde(rename = "TOOL_CALL")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        tool_result: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<FailureKind>,
    },

    #[serde(rename = "ERROR")]
    Error { reason: ErrorReason, content: String },

    #[serde(rename = "DONE")]
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    /// The model call itself failed (rate limit, bad key, outage).
    ModelError,
    LoopLimitExceeded,
    Internal,
}

impl StreamEvent {
    /// Events for one appended message. User messages are not echoed.
    pub fn from_message(message: &Message) -> Vec<StreamEvent> {
        match message {
            Message::User { .. } => Vec::new(),
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut events = Vec::with_capacity(2);
                if !content.trim().is_empty() {
                    events.push(StreamEvent::Text {
                        content: content.clone(),
                    });
                }
                if !tool_calls.is_empty() {
                    events.push(StreamEvent::ToolCallRequest {
                        tool_calls: tool_calls.clone(),
                    });
                }
                events
            }
            Message::Tool(result) => vec![StreamEvent::ToolResult {
                tool_call_id: result.tool_call_id.clone(),
                tool_name: result.tool_name.clone(),
                tool_result: result.content.clone(),
                failure: result.failure,
            }],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    /// Payload for one SSE `data:` line. `DONE` is the bare `[DONE]` sentinel.
    pub fn to_sse_data(&self) -> String {
        match self {
            StreamEvent::Done => "[DONE]".to_string(),
            other => serde_json::to_string(other).unwrap_or_else(|e| {
                format!(
                    r#"{{"type":"ERROR","reason":"internal","content":"unserializable event: {}"}}"#,
                    e
                )
            }),
        }
    }
}

/// Producer side of an event stream.
pub struct EventSink {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit the events for an appended message.
    pub fn message(&self, message: &Message) {
        for event in StreamEvent::from_message(message) {
            let _ = self.tx.send(event);
        }
    }

    /// True once the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Emit the terminal event for a finished run and close the stream.
    pub fn finish(self, result: &Result<LoopOutcome, AgentError>) {
        let event = match result {
            Ok(LoopOutcome::Completed { .. }) => StreamEvent::Done,
            Ok(LoopOutcome::LimitExceeded { turns }) => StreamEvent::Error {
                reason: ErrorReason::LoopLimitExceeded,
                content: format!("Agent error: loop limit exceeded after {} turns", turns),
            },
            // Nobody is listening.
            Err(AgentError::Cancelled) => return,
            Err(e @ AgentError::Provider(_)) => StreamEvent::Error {
                reason: ErrorReason::ModelError,
                content: format!("Agent error: {}", e),
            },
            Err(e) => StreamEvent::Error {
                reason: ErrorReason::Internal,
                content: format!("Agent error: {}", e),
            },
        };
        let _ = self.tx.send(event);
    }

    /// Emit a terminal error for a fault outside the loop (panic, checkpoint
    /// failure) and close the stream.
    pub fn fail(self, content: impl Into<String>) {
        let _ = self.tx.send(StreamEvent::Error {
            reason: ErrorReason::Internal,
            content: content.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolResult;

    #[test]
    fn test_assistant_with_text_and_calls_yields_two_events() {
        let msg = Message::assistant_with_tool_calls(
            "Extracting the details.",
            vec![ToolCall::new("c1", "extract_interaction_from_text", "{}")],
        );
        let events = StreamEvent::from_message(&msg);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Text { .. }));
        assert!(matches!(events[1], StreamEvent::ToolCallRequest { .. }));
    }

    #[test]
    fn test_user_messages_are_not_echoed() {
        assert!(StreamEvent::from_message(&Message::user("hi")).is_empty());
    }

    #[test]
    fn test_wire_format() {
        let text = StreamEvent::Text {
            content: "Logged.".into(),
        };
        assert_eq!(text.to_sse_data(), r#"{"type":"TEXT","content":"Logged."}"#);

        let result = StreamEvent::from_message(&Message::tool_result(ToolResult::failure(
            "c9",
            "log_interaction",
            FailureKind::Api,
            "API ERROR: nope",
        )));
        let json: serde_json::Value = serde_json::from_str(&result[0].to_sse_data()).unwrap();
        assert_eq!(json["type"], "TOOL_CALL");
        assert_eq!(json["tool_call_id"], "c9");
        assert_eq!(json["failure"], "api");

        assert_eq!(StreamEvent::Done.to_sse_data(), "[DONE]");
    }

    #[tokio::test]
    async fn test_finish_emits_single_terminal_event() {
        let (sink, mut rx) = EventSink::channel();
        sink.message(&Message::assistant("Logged."));
        sink.finish(&Ok(LoopOutcome::Completed { turns: 1 }));

        assert!(matches!(rx.recv().await, Some(StreamEvent::Text { .. })));
        assert_eq!(rx.recv().await, Some(StreamEvent::Done));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_limit_and_model_errors_are_distinct() {
        let (sink, mut rx) = EventSink::channel();
        sink.finish(&Ok(LoopOutcome::LimitExceeded { turns: 6 }));
        match rx.recv().await {
            Some(StreamEvent::Error { reason, .. }) => {
                assert_eq!(reason, ErrorReason::LoopLimitExceeded)
            }
            other => panic!("unexpected {other:?}"),
        }

        let (sink, mut rx) = EventSink::channel();
        sink.finish(&Err(AgentError::Provider("429 rate limited".into())));
        match rx.recv().await {
            Some(StreamEvent::Error { reason, content }) => {
                assert_eq!(reason, ErrorReason::ModelError);
                assert!(content.contains("429"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_closed_sink_is_detected() {
        let (sink, rx) = EventSink::channel();
        assert!(!sink.is_closed());
        drop(rx);
        assert!(sink.is_closed());
    }
}
