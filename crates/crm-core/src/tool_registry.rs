use crate::error::AgentError;
use crate::types::ToolSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait that all tools must implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (used in function calling).
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does. Only used to guide
    /// the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with already-parsed arguments.
    async fn execute(&self, args: Value) -> Result<String, AgentError>;
}

/// Name-to-tool lookup. Filled once at startup and shared behind an `Arc`
/// afterwards, so it is read-only for the lifetime of the process.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique; a second registration under the
    /// same name is rejected.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), AgentError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(AgentError::Config(format!(
                "Tool '{}' registered twice",
                name
            )));
        }
        tracing::debug!("Registered tool: {}", name);
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Resolve a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&Arc<dyn Tool>, AgentError> {
        self.tools
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// List all registered tool names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Schemas for every registered tool, in name order, suitable for sending
    /// to the model.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.list_names()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "Echo the arguments back"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Value) -> Result<String, AgentError> {
            Ok(args.to_string())
        }
    }

    #[test]
    fn test_lookup_hit_and_miss() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("echo"))).unwrap();

        assert_eq!(registry.lookup("echo").unwrap().name(), "echo");
        let err = registry.lookup("missing").err().unwrap();
        assert!(matches!(err, AgentError::ToolNotFound(ref n) if n == "missing"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("echo"))).unwrap();
        assert!(registry.register(Arc::new(Echo("echo"))).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_schemas_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo("zeta"))).unwrap();
        registry.register(Arc::new(Echo("alpha"))).unwrap();
        let names: Vec<_> = registry.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
