pub mod agent_loop;
pub mod checkpoint;
pub mod config;
pub mod conversation;
pub mod error;
pub mod executor;
pub mod interaction;
pub mod model;
pub mod router;
#[cfg(any(test, feature = "test-util"))]
pub mod scripted;
pub mod state;
pub mod stream;
pub mod tool_registry;
pub mod types;

pub use agent_loop::{AgentLoop, LoopOutcome, LoopState};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::AppConfig;
pub use conversation::ConversationService;
pub use error::AgentError;
pub use model::{ChatModel, ModelRequest, ModelResponse, OpenAiChatModel};
pub use router::{decide, Route};
pub use state::ConversationState;
pub use stream::{ErrorReason, EventSink, StreamEvent};
pub use tool_registry::{Tool, ToolRegistry};
pub use types::{FailureKind, Message, Role, ToolCall, ToolResult};
