use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, SwitchyardError};
use crate::traits::Tool;

/// Registry of tools nodes can call by name.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Call a tool by name, bounded by its timeout.
    pub async fn call(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| SwitchyardError::ToolNotFound(name.to_string()))?;

        debug!(tool = name, "Calling tool");
        let timeout = Duration::from_secs(tool.timeout_secs());
        match tokio::time::timeout(timeout, tool.call(args)).await {
            Ok(result) => result,
            Err(_) => Err(SwitchyardError::ToolExecution {
                tool: name.to_string(),
                message: format!("timed out after {}s", tool.timeout_secs()),
            }),
        }
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
    use futures::future::BoxFuture;

    struct Echo;

    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Returns its input"
        }

        fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(async move { Ok(args) })
        }
    }

    struct Stuck;

    impl Tool for Stuck {
        fn name(&self) -> &str {
            "stuck"
        }

        fn description(&self) -> &str {
            "Never returns"
        }

        fn call(&self, _args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
            Box::pin(futures::future::pending())
        }

        fn timeout_secs(&self) -> u64 {
            1
        }
    }

    #[tokio::test]
    async fn call_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Echo);
        let out = registry
            .call("echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(out["x"], 1);
        assert_eq!(registry.list(), vec!["echo"]);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry
            .call("nope", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Stuck);
        let err = registry
            .call("stuck", serde_json::Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchyardError::ToolExecution { .. }));
    }
}
