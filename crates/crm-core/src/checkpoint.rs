//! Conversation checkpoints: the growing message history of each thread,
//! keyed by thread id.

use crate::error::AgentError;
use crate::state::ConversationState;
use crate::types::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

const MAX_THREAD_ID_LEN: usize = 128;

/// Persistence for conversation threads. Only get/append are required.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The stored state of a thread; empty if the thread is unknown.
    async fn get(&self, thread_id: &str) -> Result<ConversationState, AgentError>;

    /// Append messages to a thread and record its terminate flag.
    async fn append(
        &self,
        thread_id: &str,
        messages: &[Message],
        terminate: bool,
    ) -> Result<(), AgentError>;

    /// Known thread ids, sorted.
    async fn threads(&self) -> Result<Vec<String>, AgentError>;
}

/// Reject ids that are empty, too long, or not safe as a file name.
pub fn validate_thread_id(thread_id: &str) -> Result<(), AgentError> {
    let valid = !thread_id.is_empty()
        && thread_id.len() <= MAX_THREAD_ID_LEN
        && !thread_id.starts_with('.')
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(AgentError::Checkpoint(format!("invalid thread id '{}'", thread_id)))
    }
}

/// In-process store. Threads are lost on restart.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    threads: RwLock<HashMap<String, ConversationState>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<ConversationState, AgentError> {
        validate_thread_id(thread_id)?;
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(
        &self,
        thread_id: &str,
        messages: &[Message],
        terminate: bool,
    ) -> Result<(), AgentError> {
        validate_thread_id(thread_id)?;
        let mut threads = self.threads.write().await;
        let state = threads.entry(thread_id.to_string()).or_default();
        state.extend(messages.iter().cloned());
        *state = ConversationState::from_parts(state.messages().to_vec(), terminate);
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<String>, AgentError> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// On-disk form of one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Checkpoint {
    thread_id: String,
    #[serde(flatten)]
    state: ConversationState,
    updated_at: DateTime<Utc>,
}

/// One JSON file per thread under a directory.
pub struct FileCheckpointStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, thread_id: &str) -> Result<PathBuf, AgentError> {
        validate_thread_id(thread_id)?;
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }

    async fn load(&self, path: &Path) -> Result<Option<Checkpoint>, AgentError> {
        match async_fs::read_to_string(path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, thread_id: &str) -> Result<ConversationState, AgentError> {
        let path = self.path_for(thread_id)?;
        Ok(self
            .load(&path)
            .await?
            .map(|checkpoint| checkpoint.state)
            .unwrap_or_default())
    }

    async fn append(
        &self,
        thread_id: &str,
        messages: &[Message],
        terminate: bool,
    ) -> Result<(), AgentError> {
        let path = self.path_for(thread_id)?;
        let _guard = self.write_lock.lock().await;

        let mut all = self
            .load(&path)
            .await?
            .map(|checkpoint| checkpoint.state.messages().to_vec())
            .unwrap_or_default();
        all.extend(messages.iter().cloned());

        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            state: ConversationState::from_parts(all, terminate),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&checkpoint)?;

        // Write then rename so a crash never leaves a half-written thread.
        let tmp = path.with_extension("json.tmp");
        async_fs::write(&tmp, json).await?;
        async_fs::rename(&tmp, &path).await?;
        debug!(thread_id, appended = messages.len(), "Checkpoint written");
        Ok(())
    }

    async fn threads(&self) -> Result<Vec<String>, AgentError> {
        let mut ids = Vec::new();
        let mut entries = async_fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
