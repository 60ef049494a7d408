use crate::store::InteractionStore;
use crm_core::agent_loop::AgentLoop;
use crm_core::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crm_core::config::AppConfig;
use crm_core::conversation::ConversationService;
use crm_core::model::ChatModel;
use crm_core::tool_registry::ToolRegistry;
use std::sync::Arc;

/// Shared application state for the server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub conversations: Arc<ConversationService>,
    pub interactions: Arc<InteractionStore>,
}

impl AppState {
    /// Wire the agent, checkpoint store and interaction store from config.
    pub fn new(
        config: AppConfig,
        model: Arc<dyn ChatModel>,
        tool_registry: Arc<ToolRegistry>,
    ) -> anyhow::Result<Self> {
        let checkpoints: Arc<dyn CheckpointStore> = match &config.checkpoint.dir {
            Some(dir) => Arc::new(FileCheckpointStore::new(dir)?),
            None => Arc::new(MemoryCheckpointStore::new()),
        };
        let interactions = match &config.store.interactions_path {
            Some(path) => InteractionStore::open(path)?,
            None => InteractionStore::in_memory(),
        };
        let agent = AgentLoop::new(model, tool_registry, &config.agent);

        Ok(Self {
            conversations: Arc::new(ConversationService::new(agent, checkpoints)),
            interactions: Arc::new(interactions),
            config: Arc::new(config),
        })
    }
}
