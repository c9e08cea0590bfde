use std::path::PathBuf;

use thiserror::Error;

/// Problems with settings or agent configurations. These are fatal to a run and are
/// raised before any agent executes.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file '{}' not found", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{source_desc}': {source}")]
    Json {
        source_desc: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{0}' is not a list of agents")]
    NotAList(String),

    #[error("'{0}' is empty")]
    Empty(String),

    #[error("No valid agents in '{0}'")]
    NoValidAgents(String),

    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Requests per minute must be at least 1, got {0}")]
    InvalidRpmLimit(u32),

    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Configuration error: {0}")]
    Other(#[from] config::ConfigError),
}

/// Errors that halt a workflow run before or instead of the agent loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Describe a task or provide at least one file")]
    EmptyRequest,

    #[error("Workflow generation failed: {output}")]
    GenerationFailed { output: String },

    #[error("Could not parse the generated workflow: {message}")]
    GeneratorParse { message: String, raw_output: String },

    #[error("The generated workflow is invalid: {source}")]
    InvalidGeneratedWorkflow {
        #[source]
        source: ConfigError,
        raw_output: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// The raw model output behind a generator failure, kept for diagnosis
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            WorkflowError::GenerationFailed { output } => Some(output),
            WorkflowError::GeneratorParse { raw_output, .. }
            | WorkflowError::InvalidGeneratedWorkflow { raw_output, .. } => Some(raw_output),
            _ => None,
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Convert a settings field name like `provider.api_key` into the env var that sets it
pub fn to_env_var(field_path: &str) -> String {
    let field_path = field_path.trim_matches('`');
    format!("BATON_{}", field_path.replace('.', "__").to_uppercase())
}
