//! Runs user turns against checkpointed threads and streams the result.

use crate::agent_loop::AgentLoop;
use crate::checkpoint::{validate_thread_id, CheckpointStore};
use crate::error::AgentError;
use crate::executor::panic_message;
use crate::state::ConversationState;
use crate::stream::{EventSink, StreamEvent};

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, Instrument};

pub struct ConversationService {
    agent: AgentLoop,
    checkpoints: Arc<dyn CheckpointStore>,
    /// One lock per active thread; two turns on the same thread never overlap.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationService {
    pub fn new(agent: AgentLoop, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            agent,
            checkpoints,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn agent(&self) -> &AgentLoop {
        &self.agent
    }

    pub fn checkpoints(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    pub async fn history(&self, thread_id: &str) -> Result<ConversationState, AgentError> {
        self.checkpoints.get(thread_id).await
    }

    /// Start a turn in the background and return its event stream.
    pub fn stream(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        message: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (sink, rx) = EventSink::channel();
        let service = Arc::clone(self);
        let thread_id = thread_id.into();
        let message = message.into();
        let span = tracing::info_span!("turn", thread_id = %thread_id);
        tokio::spawn(
            async move { service.run_turn(&thread_id, message, sink).await }.instrument(span),
        );
        rx
    }

    /// Run one turn to completion: load, run, persist, then close the
    /// stream with its terminal event.
    pub async fn run_turn(&self, thread_id: &str, message: String, sink: EventSink) {
        if let Err(e) = validate_thread_id(thread_id) {
            sink.fail(format!("Agent error: {}", e));
            return;
        }

        let lock = self.thread_lock(thread_id).await;
        {
            let _guard = lock.lock().await;
            self.run_locked(thread_id, message, sink).await;
        }
        drop(lock);
        self.release_idle_locks().await;
    }

    async fn run_locked(&self, thread_id: &str, message: String, sink: EventSink) {
        let mut state = match self.checkpoints.get(thread_id).await {
            Ok(state) => state,
            Err(e) => {
                error!("Failed to load thread: {}", e);
                sink.fail(format!("Agent error: {}", e));
                return;
            }
        };
        let start = state.len();

        let run = AssertUnwindSafe(self.agent.run(&mut state, message, &sink))
            .catch_unwind()
            .await;
        let result = match run {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Agent run panicked: {}", message);
                sink.fail(format!("Agent error: {}", message));
                return;
            }
        };

        if let Err(e) = self
            .checkpoints
            .append(thread_id, state.messages_since(start), state.is_terminated())
            .await
        {
            error!("Failed to checkpoint thread: {}", e);
            sink.fail(format!("Agent error: {}", e));
            return;
        }

        match &result {
            Ok(outcome) => info!(?outcome, "Turn finished"),
            Err(e) => error!("Turn failed: {}", e),
        }
        sink.finish(&result);
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_idle_locks(&self) {
        self.locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::config::AgentConfig;
    use crate::model::{ChatModel, ModelRequest, ModelResponse};
    use crate::scripted::ScriptedModel;
    use crate::stream::ErrorReason;
    use crate::tool_registry::ToolRegistry;
    use async_trait::async_trait;

    fn service(model: Arc<dyn ChatModel>) -> Arc<ConversationService> {
        let agent = AgentLoop::new(model, Arc::new(ToolRegistry::new()), &AgentConfig::default());
        Arc::new(ConversationService::new(
            agent,
            Arc::new(MemoryCheckpointStore::new()),
        ))
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_turns_accumulate_in_thread() {
        let svc = service(Arc::new(ScriptedModel::new(vec![
            ModelResponse::text("first"),
            ModelResponse::text("second"),
        ])));

        let events = collect(svc.stream("t1", "hello")).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Text {
                    content: "first".into()
                },
                StreamEvent::Done
            ]
        );
        collect(svc.stream("t1", "again")).await;

        let history = svc.history("t1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(svc.history("t2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_model_fault_becomes_terminal_error() {
        let svc = service(Arc::new(ScriptedModel::failing("rate limit exceeded")));
        let events = collect(svc.stream("t1", "hello")).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error { reason, content } => {
                assert_eq!(*reason, ErrorReason::ModelError);
                assert!(content.contains("rate limit exceeded"));
            }
            other => panic!("unexpected {other:?}"),
        }
        // The user message is still recorded.
        assert_eq!(svc.history("t1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_thread_id_is_rejected() {
        let svc = service(Arc::new(ScriptedModel::new(vec![])));
        let events = collect(svc.stream("../x", "hello")).await;
        assert!(matches!(events.as_slice(), [StreamEvent::Error { .. }]));
    }

    struct Panicky;

    #[async_trait]
    impl ChatModel for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        async fn complete(&self, _request: &ModelRequest) -> Result<ModelResponse, AgentError> {
            panic!("model blew up");
        }
    }

    #[tokio::test]
    async fn test_panic_becomes_terminal_error() {
        let svc = service(Arc::new(Panicky));
        let events = collect(svc.stream("t1", "hello")).await;
        match events.as_slice() {
            [StreamEvent::Error { reason, content }] => {
                assert_eq!(*reason, ErrorReason::Internal);
                assert!(content.contains("model blew up"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_same_thread_turns_do_not_interleave() {
        let svc = service(Arc::new(ScriptedModel::repeating(ModelResponse::text("ok"))));
        let a = svc.stream("shared", "one");
        let b = svc.stream("shared", "two");
        collect(a).await;
        collect(b).await;

        let history = svc.history("shared").await.unwrap();
        let roles: Vec<_> = history.messages().iter().map(|m| m.role()).collect();
        use crate::types::Role::*;
        assert_eq!(roles, vec![User, Assistant, User, Assistant]);
    }
}
