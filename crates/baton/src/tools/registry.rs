use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use strum::IntoEnumIterator;

use super::builtin::BuiltinTool;
use super::error::ToolError;
use super::ToolHandler;
use crate::models::tool::Tool;

/// Name to handler mapping used to resolve an agent's `callable_tools`
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every builtin tool
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for tool in BuiltinTool::iter() {
            registry.register(Arc::new(tool));
        }
        registry
    }

    /// Add a handler, replacing any previous one with the same name
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.declaration().name;
        self.handlers.insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sorted names of every registered tool
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Declarations for the requested names, in request order. Repeated names are declared
    /// once, unknown names are skipped with a warning.
    pub fn declarations(&self, names: &[String], agent: &str) -> Vec<Tool> {
        let mut seen = HashSet::new();
        names
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| match self.handlers.get(name) {
                Some(handler) => Some(handler.declaration()),
                None => {
                    tracing::warn!(agent, tool = %name, "unknown tool requested, ignoring it");
                    None
                }
            })
            .collect()
    }

    /// Run a tool. Never fails: errors come back as text the model can read.
    pub async fn invoke(&self, name: &str, args: &Value) -> String {
        let result = match self.handlers.get(name) {
            Some(handler) => handler.call(args).await,
            None => Err(ToolError::ToolNotFound(name.to_string())),
        };

        match result {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool call failed");
                error_envelope(&err)
            }
        }
    }
}

pub(crate) fn error_envelope(err: &ToolError) -> String {
    format!("The tool call returned the following error:\n{}", err)
}
