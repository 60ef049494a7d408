pub mod extract;
pub mod log_interaction;

use crm_core::config::AppConfig;
use crm_core::error::AgentError;
use crm_core::tool_registry::ToolRegistry;
use std::sync::Arc;

/// Register the CRM tools into the registry.
pub fn register_all(registry: &mut ToolRegistry, config: &AppConfig) -> Result<(), AgentError> {
    registry.register(Arc::new(extract::ExtractInteractionTool))?;
    registry.register(Arc::new(log_interaction::LogInteractionTool::new(&config.crm)?))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all() {
        let mut registry = ToolRegistry::new();
        register_all(&mut registry, &AppConfig::default()).unwrap();
        assert_eq!(
            registry.list_names(),
            vec!["extract_interaction_from_text", "log_interaction"]
        );
        assert!(register_all(&mut registry, &AppConfig::default()).is_err());
    }
}
