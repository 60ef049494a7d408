use crm_core::config::CrmConfig;
use crm_core::error::AgentError;
use crm_core::interaction::LogForm;
use crm_core::tool_registry::Tool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const CONTEXT: &str = "Failed to log interaction";

/// POST a structured interaction to the CRM. The one tool with a side effect.
pub struct LogInteractionTool {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl LogInteractionTool {
    pub fn new(config: &CrmConfig) -> Result<Self, AgentError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hcp-crm/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AgentError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.log_url(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn parse_form(&self, args: Value) -> Result<LogForm, AgentError> {
        let invalid = |message: String| AgentError::InvalidArguments {
            tool_name: self.name().into(),
            message,
        };

        let data = match args {
            Value::Object(mut map) if map.contains_key("interaction_data") => {
                map.remove("interaction_data").unwrap_or(Value::Null)
            }
            other => other,
        };
        // Models sometimes send the draft as a JSON-encoded string.
        let data = match data {
            Value::String(raw) => serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))?,
            other => other,
        };
        serde_json::from_value(data).map_err(|e| invalid(e.to_string()))
    }
}

#[async_trait]
impl Tool for LogInteractionTool {
    fn name(&self) -> &str {
        "log_interaction"
    }

    fn description(&self) -> &str {
        "Save the final structured interaction to the CRM. Call this once the \
         interaction details are known; it is the last action of the task."
    }

    fn parameters_schema(&self) -> Value {
        let list = json!({"type": "array", "items": {"type": "string"}});
        json!({
            "type": "object",
            "properties": {
                "interaction_data": {
                    "type": "object",
                    "properties": {
                        "hcp_name": {"type": "string"},
                        "interaction_type": {"type": "string", "enum": ["Meeting", "Call", "Email"]},
                        "interaction_date": {"type": "string", "description": "YYYY-MM-DD"},
                        "attendees": list,
                        "topics_discussed": list,
                        "materials_shared": list,
                        "samples_distributed": list,
                        "sentiment": {"type": "string", "enum": ["Positive", "Neutral", "Negative"]},
                        "outcomes": {"type": "string"},
                        "follow_up_actions": list
                    },
                    "required": ["hcp_name"]
                }
            },
            "required": ["interaction_data"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError> {
        let form = self.parse_form(args)?;
        debug!(url = %self.url, hcp = %form.draft.hcp_name, "Posting interaction");

        let response = self
            .client
            .post(&self.url)
            .json(&form)
            .send()
            .await
            .map_err(|e| AgentError::Connection {
                context: CONTEXT.into(),
                message: if e.is_timeout() {
                    format!("request timed out after {}s", self.timeout.as_secs())
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                context: CONTEXT.into(),
                status: status.as_u16(),
                detail,
            });
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let id = body
            .get("id")
            .or_else(|| body.get("interaction_id"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "N/A".to_string());

        info!(%id, "Interaction logged");
        Ok(format!(
            "SUCCESS: Interaction logged. API Response ID: {}. Generate a final user confirmation message.",
            id
        ))
    }
}
