//! Lookup table from capability name to implementation.

use std::collections::HashMap;
use std::sync::Arc;

use super::Tool;
use super::builtin::register_builtins;

/// Implementations available to the sandbox.
#[derive(Default)]
pub struct ToolSet {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding every built-in tool.
    pub fn builtin() -> Self {
        let mut tools = Self::new();
        register_builtins(&mut tools);
        tools
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Register a tool that's already in an Arc.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::interpreter::{Interrupt, Value};
    use crate::registry::CapabilityRegistry;
    use crate::tools::{ToolArgs, ToolContext};

    struct Constant(&'static str);

    #[async_trait]
    impl Tool for Constant {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self, _args: ToolArgs, _ctx: &mut ToolContext<'_>) -> Result<Value, Interrupt> {
            Ok(Value::str(self.0))
        }
    }

    #[test]
    fn register_and_get() {
        let mut tools = ToolSet::new();
        tools.register(Constant("zeta"));
        tools.register_arc(Arc::new(Constant("alpha")));
        assert!(tools.contains("zeta"));
        assert!(tools.get("alpha").is_some());
        assert!(!tools.contains("missing"));
        assert_eq!(tools.names(), ["alpha", "zeta"]);
        assert_eq!(tools.len(), 2);
    }

    #[test]
    fn builtins_cover_the_standard_registry() {
        let tools = ToolSet::builtin();
        let registry = CapabilityRegistry::standard();
        for signature in registry.signatures().filter(|s| !s.disallowed) {
            assert!(tools.contains(&signature.name), "no tool for {}", signature.name);
        }
    }
}
