use std::collections::HashMap;

/// Successful agent outputs for the current run, keyed by agent name.
///
/// Each name is written at most once per run. A second write for the same name is
/// ignored so downstream agents always see the first output recorded for it.
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    outputs: HashMap<String, String>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an agent's output. Returns false when the name already had an entry.
    pub fn insert<N: Into<String>, O: Into<String>>(&mut self, agent: N, output: O) -> bool {
        let agent = agent.into();
        if self.outputs.contains_key(&agent) {
            tracing::warn!(agent = %agent, "agent already has a stored output, keeping the first");
            return false;
        }
        self.outputs.insert(agent, output.into());
        true
    }

    pub fn get(&self, agent: &str) -> Option<&str> {
        self.outputs.get(agent).map(String::as_str)
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.outputs.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}
