//! Runs one agent: builds its input, then drives a bounded function-calling conversation
//! with the provider until the model answers with text or the call budget is spent.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::Display;

use super::spec::AgentSpec;
use super::store::MessageStore;
use crate::models::content::ImageContent;
use crate::models::file::UploadedFile;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::ToolCall;
use crate::prompt_template::{self, PreviousResult};
use crate::providers::base::{GenerateConfig, Generation, Provider};
use crate::tools::ToolRegistry;

pub const MAX_FUNCTION_CALLS: usize = 5;
pub const MAX_INLINE_TEXT_CHARS: usize = 100_000;

pub const INPUT_MISSING: &str = "[Input missing]";
pub const NO_TASK_OR_FILES: &str = "[No task or files]";
pub const CALL_LIMIT_REACHED: &str = "[Call limit reached]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum AgentStatus {
    Success,
    Failed,
    Skipped,
}

/// What one agent produced, as recorded in the run's results log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub agent: String,
    pub status: AgentStatus,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AgentOutcome {
    fn new<A: Into<String>, O: Into<String>>(agent: A, status: AgentStatus, output: O) -> Self {
        Self {
            agent: agent.into(),
            status,
            output: output.into(),
            sources: None,
            details: None,
        }
    }

    pub fn success<A: Into<String>, O: Into<String>>(agent: A, output: O) -> Self {
        Self::new(agent, AgentStatus::Success, output)
    }

    pub fn failed<A: Into<String>, O: Into<String>>(agent: A, output: O) -> Self {
        Self::new(agent, AgentStatus::Failed, output)
    }

    pub fn skipped<A: Into<String>, O: Into<String>>(agent: A, output: O) -> Self {
        Self::new(agent, AgentStatus::Skipped, output)
    }

    pub fn with_sources(mut self, sources: Option<String>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_details<D: Into<String>>(mut self, details: D) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Success
    }
}

/// The read-only view of a run an agent works from
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub workflow: &'a str,
    pub task: &'a str,
    pub files: &'a [UploadedFile],
    pub store: &'a MessageStore,
}

/// The request an agent will send, or the reason it cannot run
#[derive(Debug, PartialEq)]
pub enum AgentInput {
    Ready(Message),
    MissingSources(Vec<String>),
}

/// Text shown to the model when the provider returns neither text nor a function call
pub fn no_valid_response(generation: &Generation) -> String {
    let feedback = generation.feedback.clone().unwrap_or_default();
    format!(
        "[Error: no valid response. Reason: {}. Message: {}]",
        feedback.block_reason.as_deref().unwrap_or("?"),
        feedback.block_reason_message.as_deref().unwrap_or("?")
    )
}

pub fn critical_error(err: &anyhow::Error) -> String {
    format!("[Critical error: {}]", err)
}

fn truncate_chars(text: &str, limit: usize) -> (&str, bool) {
    match text.char_indices().nth(limit) {
        Some((index, _)) => (&text[..index], true),
        None => (text, false),
    }
}

/// Content parts for the uploaded files, wrapped in START/END CONTEXT FILES markers
pub fn file_parts(files: &[UploadedFile], agent: &str) -> Result<Vec<MessageContent>> {
    let mut parts = vec![MessageContent::text("\n\n--- START CONTEXT FILES ---")];

    for file in files {
        if file.is_image() {
            parts.push(MessageContent::text(format!("\nImage: `{}`", file.name)));
            parts.push(MessageContent::Image(ImageContent::from_bytes(
                &file.bytes,
                file.mime_type.as_str(),
            )));
            continue;
        }

        let body = match std::str::from_utf8(&file.bytes) {
            Ok(text) => {
                let (kept, truncated) = truncate_chars(text, MAX_INLINE_TEXT_CHARS);
                if truncated {
                    tracing::warn!(agent, file = %file.name, "file truncated for inline context");
                    format!(
                        "{}\n[... truncated after {} characters]",
                        kept, MAX_INLINE_TEXT_CHARS
                    )
                } else {
                    kept.to_string()
                }
            }
            Err(e) => {
                tracing::warn!(
                    agent,
                    file = %file.name,
                    mime_type = %file.mime_type,
                    error = %e,
                    "file is not valid UTF-8, sending a placeholder"
                );
                "[Content could not be read or decoded]".to_string()
            }
        };
        parts.push(MessageContent::text(prompt_template::file_block(
            &file.name, &body,
        )?));
    }

    parts.push(MessageContent::text("\n--- END CONTEXT FILES ---"));
    Ok(parts)
}

/// Assemble the agent's opening request from the task, files and upstream outputs
pub fn build_input(spec: &AgentSpec, ctx: &StepContext<'_>) -> Result<AgentInput> {
    let mut message = Message::user().with_text(prompt_template::system_block(
        ctx.workflow,
        &spec.name,
        &spec.system_instruction,
    )?);

    let sources = &spec.receives_messages_from;
    let first_stage = sources.is_empty() || sources.iter().all(|src| !ctx.store.contains(src));

    if first_stage {
        message = message.with_text(format!("User request:\n{}", ctx.task));
        if spec.accepts_files && !ctx.files.is_empty() {
            for part in file_parts(ctx.files, &spec.name)? {
                message = message.with_content(part);
            }
        }
        return Ok(AgentInput::Ready(message));
    }

    let mut previous = Vec::with_capacity(sources.len());
    let mut missing = Vec::new();
    for src in sources {
        match ctx.store.get(src) {
            Some(output) => previous.push(PreviousResult {
                source: src,
                output,
            }),
            None => missing.push(src.clone()),
        }
    }
    if !missing.is_empty() {
        return Ok(AgentInput::MissingSources(missing));
    }

    Ok(AgentInput::Ready(
        message.with_text(prompt_template::previous_results(&previous)?),
    ))
}

fn is_planner_without_input(spec: &AgentSpec, ctx: &StepContext<'_>) -> bool {
    spec.name.starts_with("Planner")
        && spec.accepts_files
        && ctx.files.is_empty()
        && ctx.task.trim().is_empty()
}

enum CycleState {
    PendingCall,
    ToolRequested(ToolCall),
    Done(AgentOutcome),
}

/// Executes agents against a provider and a tool registry
pub struct StepExecutor {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    model: String,
}

impl StepExecutor {
    pub fn new<M: Into<String>>(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        model: M,
    ) -> Self {
        Self {
            provider,
            tools,
            model: model.into(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn generate_config(&self, spec: &AgentSpec) -> GenerateConfig {
        GenerateConfig {
            temperature: spec.temperature,
            tools: self.tools.declarations(&spec.callable_tools, &spec.name),
            web_search: spec.enable_web_search,
        }
    }

    /// Run one agent to completion.
    ///
    /// Provider failures, blocked replies and the call limit are reported through the
    /// returned outcome. `Err` is only returned when the request itself cannot be built.
    pub async fn run(&self, spec: &AgentSpec, ctx: &StepContext<'_>) -> Result<AgentOutcome> {
        let input = match build_input(spec, ctx)? {
            AgentInput::Ready(message) => message,
            AgentInput::MissingSources(missing) => {
                let names = missing
                    .iter()
                    .map(|m| format!("'{}'", m))
                    .collect::<Vec<_>>()
                    .join(", ");
                tracing::warn!(agent = %spec.name, missing = %names, "input missing, skipping agent");
                return Ok(AgentOutcome::skipped(&spec.name, INPUT_MISSING).with_details(
                    format!("Input from {} is missing, skipping '{}'", names, spec.name),
                ));
            }
        };

        if is_planner_without_input(spec, ctx) {
            tracing::info!(agent = %spec.name, "no task or files, skipping planner");
            return Ok(AgentOutcome::skipped(&spec.name, NO_TASK_OR_FILES));
        }

        let config = self.generate_config(spec);
        let mut history = vec![input];
        let mut calls = 0;
        let mut call_text: Vec<String> = Vec::new();
        let mut state = CycleState::PendingCall;

        loop {
            state = match state {
                CycleState::PendingCall if calls >= MAX_FUNCTION_CALLS => {
                    tracing::warn!(agent = %spec.name, limit = MAX_FUNCTION_CALLS, "function call limit reached");
                    let output = if call_text.is_empty() {
                        CALL_LIMIT_REACHED.to_string()
                    } else {
                        call_text.join("\n")
                    };
                    CycleState::Done(AgentOutcome::failed(&spec.name, output).with_details(
                        format!("function call limit ({}) reached", MAX_FUNCTION_CALLS),
                    ))
                }
                CycleState::PendingCall => {
                    match self.provider.generate(&self.model, &history, &config).await {
                        Ok(generation) => classify(&spec.name, generation, &mut call_text),
                        Err(e) => {
                            tracing::error!(agent = %spec.name, error = %e, "generation failed");
                            CycleState::Done(AgentOutcome::failed(&spec.name, critical_error(&e)))
                        }
                    }
                }
                CycleState::ToolRequested(call) => {
                    tracing::info!(agent = %spec.name, tool = %call.name, "calling tool");
                    let output = self.tools.invoke(&call.name, &call.arguments).await;
                    let name = call.name.clone();
                    history.push(Message::model().with_tool_request(call));
                    history.push(Message::user().with_tool_response(name, output));
                    calls += 1;
                    CycleState::PendingCall
                }
                CycleState::Done(outcome) => return Ok(outcome),
            };
        }
    }
}

fn classify(agent: &str, generation: Generation, call_text: &mut Vec<String>) -> CycleState {
    let Some(message) = generation.message.as_ref() else {
        return CycleState::Done(AgentOutcome::failed(agent, no_valid_response(&generation)));
    };

    if let Some(call) = message.leading_tool_request() {
        let text = message.texts().join("\n");
        if !text.trim().is_empty() {
            call_text.push(text.trim().to_string());
        }
        return CycleState::ToolRequested(call.clone());
    }

    let text = message.texts().join("\n").trim().to_string();
    if text.is_empty() {
        return CycleState::Done(AgentOutcome::failed(agent, no_valid_response(&generation)));
    }

    let sources = generation.grounding.as_ref().and_then(|g| g.note());
    CycleState::Done(AgentOutcome::success(agent, text).with_sources(sources))
}
