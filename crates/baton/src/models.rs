//! These models represent the objects passed around by the workflow engine
//!
//! There are a few related formats we need to interact with:
//! - agent configurations, loaded from json files or produced by the generator agent
//! - gemini contents/parts/function declarations, sent from the engine to the LLM
//! - tool invocations, sent from the engine to the tool registry
//!
//! We always immediately convert provider payloads into the internal structs using
//! the helpers in `providers::utils`, so the engine never touches wire json.
pub mod content;
pub mod file;
pub mod message;
pub mod role;
pub mod tool;
