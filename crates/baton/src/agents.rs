//! The workflow engine: agent definitions, the per-run message store, the step executor
//! that runs one agent, and the driver that runs them all.

pub mod spec;
pub mod step;
pub mod store;
pub mod workflow;

pub use spec::AgentSpec;
pub use step::{AgentOutcome, AgentStatus, StepExecutor};
pub use store::MessageStore;
pub use workflow::{RunContext, RunReport, WorkflowDriver};
