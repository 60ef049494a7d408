//! A [`ChatModel`] that replays canned responses.
//!
//! Used by tests across the workspace; other crates enable the
//! `test-util` feature to reach it.

use crate::error::AgentError;
use crate::model::{ChatModel, ModelRequest, ModelResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

enum Script {
    /// Pop one response per call; error once empty.
    Queue(VecDeque<Result<ModelResponse, String>>),
    /// Answer every call with the same response.
    Repeat(ModelResponse),
}

pub struct ScriptedModel {
    script: Mutex<Script>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self::with_script(Script::Queue(responses.into_iter().map(Ok).collect()))
    }

    /// Answer every request with `response`, forever.
    pub fn repeating(response: ModelResponse) -> Self {
        Self::with_script(Script::Repeat(response))
    }

    /// Fail the first request with a provider error.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_script(Script::Queue(VecDeque::from([Err(message.into())])))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of requests received so far.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Copies of every request received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let call = {
            let mut requests = lock(&self.requests);
            requests.push(request.clone());
            requests.len()
        };

        match &mut *lock(&self.script) {
            Script::Repeat(response) => Ok(response.clone()),
            Script::Queue(queue) => match queue.pop_front() {
                Some(Ok(response)) => Ok(response),
                Some(Err(message)) => Err(AgentError::Provider(message)),
                None => Err(AgentError::Provider(format!(
                    "scripted model has no response for call #{}",
                    call
                ))),
            },
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn request() -> ModelRequest {
        ModelRequest {
            system: String::new(),
            messages: vec![Message::user("hi")],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_queue_then_exhausted() {
        let model = ScriptedModel::new(vec![ModelResponse::text("one")]);
        assert_eq!(model.complete(&request()).await.unwrap().content, "one");
        let err = model.complete(&request()).await.unwrap_err();
        assert!(err.to_string().contains("call #2"));
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn test_repeating_never_runs_out() {
        let model = ScriptedModel::repeating(ModelResponse::text("again"));
        for _ in 0..3 {
            assert_eq!(model.complete(&request()).await.unwrap().content, "again");
        }
        assert_eq!(model.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_failing() {
        let model = ScriptedModel::failing("rate limited");
        assert!(matches!(
            model.complete(&request()).await,
            Err(AgentError::Provider(m)) if m == "rate limited"
        ));
    }
}
