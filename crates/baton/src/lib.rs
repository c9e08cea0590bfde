pub mod agents;
pub mod artifacts;
pub mod config;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod rate_limiter;
pub mod tools;
