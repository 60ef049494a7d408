use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::executor::TurnExecutor;
use crate::model::{ChatModel, ModelRequest};
use crate::router::{decide, Route};
use crate::state::ConversationState;
use crate::stream::EventSink;
use crate::tool_registry::ToolRegistry;
use crate::types::{FailureKind, Message, ToolResult};

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result text for calls left unanswered when the turn ceiling is hit.
pub const LOOP_LIMIT_MESSAGE: &str = "Error: Tool call skipped, loop limit reached.";

/// Result text for calls carried by a response the provider filtered.
pub const CONTENT_FILTER_MESSAGE: &str = "Error: Tool call skipped, response was filtered.";

/// Where the loop is between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    AwaitingModel,
    AwaitingTools,
    Terminated,
}

impl LoopState {
    /// Next state after a stage finished and the router spoke.
    pub fn transition(self, route: Route) -> Result<LoopState, AgentError> {
        match (self, route) {
            (LoopState::Terminated, _) => Ok(LoopState::Terminated),
            (_, Route::End) => Ok(LoopState::Terminated),
            (LoopState::AwaitingModel, Route::Tools) => Ok(LoopState::AwaitingTools),
            (LoopState::AwaitingTools, Route::Model) => Ok(LoopState::AwaitingModel),
            (from, route) => Err(AgentError::LoopInvariant(format!(
                "router chose {:?} after a {:?} stage",
                route, from
            ))),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoopOutcome {
    Completed { turns: usize },
    /// The turn ceiling was hit before the router chose End.
    LimitExceeded { turns: usize },
}

impl LoopOutcome {
    pub fn turns(&self) -> usize {
        match self {
            LoopOutcome::Completed { turns } | LoopOutcome::LimitExceeded { turns } => *turns,
        }
    }
}

/// The core agent loop: alternates model calls and tool batches until the
/// router says End.
pub struct AgentLoop {
    model: Arc<dyn ChatModel>,
    executor: TurnExecutor,
    system_prompt: String,
    max_turns: usize,
}

impl AgentLoop {
    pub fn new(model: Arc<dyn ChatModel>, registry: Arc<ToolRegistry>, config: &AgentConfig) -> Self {
        Self {
            model,
            executor: TurnExecutor::new(registry),
            system_prompt: config.system_prompt.clone(),
            max_turns: config.max_turns,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    /// Run one user turn over `state`.
    ///
    /// Every appended message is also sent to `sink`. Returns
    /// `AgentError::Cancelled` when the sink's consumer goes away; the state
    /// is still well formed in that case and can be checkpointed.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        user_message: impl Into<String>,
        sink: &EventSink,
    ) -> Result<LoopOutcome, AgentError> {
        state.begin_turn(Message::user(user_message));

        let mut loop_state = LoopState::AwaitingModel;
        let mut turns = 0;

        loop {
            if loop_state == LoopState::Terminated {
                info!(turns, "Agent loop finished");
                return Ok(LoopOutcome::Completed { turns });
            }
            if turns >= self.max_turns {
                warn!(turns, "Turn ceiling reached, ending run");
                if loop_state == LoopState::AwaitingTools {
                    self.skip_pending(state, sink, LOOP_LIMIT_MESSAGE);
                }
                state.terminate();
                return Ok(LoopOutcome::LimitExceeded { turns });
            }

            turns += 1;
            debug!(turn = turns, state = ?loop_state, "Agent loop stage");

            if loop_state == LoopState::AwaitingModel {
                if sink.is_closed() {
                    return Err(AgentError::Cancelled);
                }
                self.model_stage(state, sink).await?;
            } else {
                self.tools_stage(state, sink).await?;
            }

            loop_state = loop_state.transition(decide(state))?;
        }
    }

    async fn model_stage(&self, state: &mut ConversationState, sink: &EventSink) -> Result<(), AgentError> {
        let request = ModelRequest {
            system: self.system_prompt.clone(),
            messages: state.messages().to_vec(),
            tools: self.executor.registry().schemas(),
        };

        let response = self.model.complete(&request).await?;
        let terminate = response.terminate;
        debug!(tool_calls = response.tool_calls.len(), terminate, "Model responded");

        let message = response.into_message();
        sink.message(&message);
        state.push(message);
        if terminate {
            self.skip_pending(state, sink, CONTENT_FILTER_MESSAGE);
            state.terminate();
        }
        Ok(())
    }

    async fn tools_stage(&self, state: &mut ConversationState, sink: &EventSink) -> Result<(), AgentError> {
        let calls = state.pending_tool_calls().to_vec();
        let mut cancelled = false;

        for call in &calls {
            // A started call always finishes; the rest are closed out so every
            // call still has its result.
            cancelled = cancelled || sink.is_closed();
            let result = if cancelled {
                TurnExecutor::cancelled(call)
            } else {
                self.executor.execute_call(call).await
            };

            let message = Message::tool_result(result);
            sink.message(&message);
            state.push(message);
        }

        if cancelled {
            info!(calls = calls.len(), "Client went away during tool batch");
            return Err(AgentError::Cancelled);
        }
        Ok(())
    }

    /// Answer pending calls without running them so the history stays
    /// well formed for the next run.
    fn skip_pending(&self, state: &mut ConversationState, sink: &EventSink, reason: &str) {
        for call in state.pending_tool_calls().to_vec() {
            let message = Message::tool_result(ToolResult::failure(
                &call.id,
                &call.name,
                FailureKind::Cancelled,
                reason,
            ));
            sink.message(&message);
            state.push(message);
        }
    }
}
