//! Interaction records received through the logging endpoint.

use crm_core::error::AgentError;
use crm_core::interaction::InteractionRecord;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory list of records, optionally mirrored to a JSON file.
pub struct InteractionStore {
    records: RwLock<Vec<InteractionRecord>>,
    path: Option<PathBuf>,
}

impl InteractionStore {
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            path: None,
        }
    }

    /// Open a file-backed store, loading any records already on disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let path = path.into();
        let records = if path.exists() {
            let json = std::fs::read_to_string(&path)?;
            serde_json::from_str(&json)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Vec::new()
        };
        Ok(Self {
            records: RwLock::new(records),
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Add a record. It becomes visible only once the file mirror, if any,
    /// has been written.
    pub async fn insert(&self, record: InteractionRecord) -> Result<(), AgentError> {
        let mut records = self.records.write().await;
        records.push(record);
        if let Err(e) = self.persist(&records).await {
            records.pop();
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self, records: &[InteractionRecord]) -> Result<(), AgentError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(records)?;
        let tmp = path.with_extension("json.tmp");
        async_fs::write(&tmp, json).await?;
        async_fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// All records, oldest first.
    pub async fn list(&self) -> Vec<InteractionRecord> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: Uuid) -> Option<InteractionRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.interaction_id == id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_core::interaction::{InteractionDraft, LogForm};

    fn record(name: &str) -> InteractionRecord {
        LogForm::from(InteractionDraft {
            hcp_name: name.into(),
            ..InteractionDraft::default()
        })
        .into_record()
    }

    #[tokio::test]
    async fn test_insert_get_list() {
        let store = InteractionStore::in_memory();
        let first = record("Dr. Smith");
        let id = first.interaction_id;
        store.insert(first).await.unwrap();
        store.insert(record("Dr. Lee")).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(id).await.unwrap().draft.hcp_name, "Dr. Smith");
        assert!(store.get(Uuid::new_v4()).await.is_none());
        let names: Vec<_> = store
            .list()
            .await
            .into_iter()
            .map(|r| r.draft.hcp_name)
            .collect();
        assert_eq!(names, vec!["Dr. Smith", "Dr. Lee"]);
    }

    #[tokio::test]
    async fn test_file_backed_store_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data").join("interactions.json");

        let store = InteractionStore::open(&path).unwrap();
        let rec = record("Dr. Smith");
        let id = rec.interaction_id;
        store.insert(rec).await.unwrap();

        let reopened = InteractionStore::open(&path).unwrap();
        assert_eq!(reopened.get(id).await.unwrap().draft.hcp_name, "Dr. Smith");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("interactions.json");
        let store = InteractionStore::open(&path).unwrap();
        store.insert(record("Dr. Smith")).await.unwrap();

        // A directory where the temp file goes makes the next write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let rejected = record("Dr. Lee");
        let id = rejected.interaction_id;
        assert!(store.insert(rejected).await.is_err());

        assert_eq!(store.len().await, 1);
        assert!(store.get(id).await.is_none());
        let reopened = InteractionStore::open(&path).unwrap();
        assert_eq!(reopened.len().await, 1);
    }
}
