//! The model boundary: one request in, plain text or tool calls out.

use crate::config::ModelConfig;
use crate::error::AgentError;
use crate::types::{Message, ToolCall, ToolSchema};

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionToolArgs, ChatCompletionToolType, CreateChatCompletionRequestArgs,
    FinishReason, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Everything the model sees for one turn.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// What the model answered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// The provider stopped the response on its own (content filter); the
    /// conversation must not continue this run.
    pub terminate: bool,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
            terminate: false,
        }
    }

    pub fn into_message(self) -> Message {
        Message::assistant_with_tool_calls(self.content, self.tool_calls)
    }
}

/// A chat model that can call tools.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError>;
}

/// Chat model behind any OpenAI-compatible completions endpoint.
pub struct OpenAiChatModel {
    client: Client<OpenAIConfig>,
    config: ModelConfig,
}

impl OpenAiChatModel {
    pub fn new(config: ModelConfig) -> Result<Self, AgentError> {
        let openai_config = OpenAIConfig::new()
            .with_api_base(&config.api_base)
            .with_api_key(
                config
                    .api_key
                    .clone()
                    .unwrap_or_else(|| "not-needed".to_string()),
            );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;

        let client = Client::with_config(openai_config).with_http_client(http_client);
        Ok(Self { client, config })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: &ModelRequest) -> Result<ModelResponse, AgentError> {
        let messages = to_openai_messages(&request.system, &request.messages)?;

        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder
            .model(&self.config.model)
            .messages(messages)
            .temperature(self.config.temperature)
            .max_completion_tokens(self.config.max_tokens);

        if !request.tools.is_empty() {
            let tools: Vec<_> = request
                .tools
                .iter()
                .map(|s| {
                    let func = FunctionObjectArgs::default()
                        .name(&s.name)
                        .description(&s.description)
                        .parameters(s.parameters.clone())
                        .build()
                        .map_err(|e| {
                            AgentError::Provider(format!("function '{}': {}", s.name, e))
                        })?;
                    ChatCompletionToolArgs::default()
                        .r#type(ChatCompletionToolType::Function)
                        .function(func)
                        .build()
                        .map_err(|e| AgentError::Provider(format!("tool '{}': {}", s.name, e)))
                })
                .collect::<Result<Vec<_>, _>>()?;
            request_builder.tools(tools);
        }

        let api_request = request_builder
            .build()
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        debug!(finish_reason = ?choice.finish_reason, "Model responded");

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: tc.function.arguments,
            })
            .collect();

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            terminate: matches!(choice.finish_reason, Some(FinishReason::ContentFilter)),
        })
    }
}

/// Convert the system instruction and history to async-openai request
/// messages. The instruction always comes first.
fn to_openai_messages(
    system: &str,
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, AgentError> {
    let mut result = Vec::with_capacity(messages.len() + 1);

    let sys_msg = ChatCompletionRequestSystemMessageArgs::default()
        .content(system)
        .build()
        .map_err(|e| AgentError::Provider(e.to_string()))?;
    result.push(ChatCompletionRequestMessage::System(sys_msg));

    for msg in messages {
        match msg {
            Message::User { content } => {
                let m = ChatCompletionRequestUserMessageArgs::default()
                    .content(content.as_str())
                    .build()
                    .map_err(|e| AgentError::Provider(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::User(m));
            }
            Message::Assistant {
                content,
                tool_calls,
            } => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                builder.content(content.as_str());
                if !tool_calls.is_empty() {
                    let tc_openai: Vec<ChatCompletionMessageToolCall> = tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.clone(),
                            },
                        })
                        .collect();
                    builder.tool_calls(tc_openai);
                }
                let m = builder
                    .build()
                    .map_err(|e| AgentError::Provider(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::Assistant(m));
            }
            Message::Tool(tool_result) => {
                let m = ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(tool_result.tool_call_id.as_str())
                    .content(tool_result.content.as_str())
                    .build()
                    .map_err(|e| AgentError::Provider(e.to_string()))?;
                result.push(ChatCompletionRequestMessage::Tool(m));
            }
        }
    }

    Ok(result)
}
