use crate::state::ConversationState;
use crate::types::Message;
use serde::Serialize;

/// Where the loop goes next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Tools,
    Model,
    End,
}

/// Decide the next stage from the conversation alone.
///
/// Total over every state, including an empty one. Failed tool results go
/// back to the model like clean ones so it can retry or explain the failure.
pub fn decide(state: &ConversationState) -> Route {
    if state.is_terminated() {
        return Route::End;
    }
    match state.last() {
        Some(msg) if !msg.tool_calls().is_empty() => Route::Tools,
        Some(Message::Tool(_)) => Route::Model,
        _ => Route::End,
    }
}
