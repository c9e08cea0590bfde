//! Callable tools exposed to agents through function declarations.

mod builtin;
mod error;
mod registry;

pub use builtin::BuiltinTool;
pub use error::{ToolError, ToolResult};
pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::tool::Tool;

/// Something the model can call by name with a JSON object of arguments
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The declaration sent to the model
    fn declaration(&self) -> Tool;

    /// Run the tool. `args` is the object the model produced for this call.
    async fn call(&self, args: &Value) -> ToolResult<String>;
}
