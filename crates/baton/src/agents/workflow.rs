use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use super::spec::{
    load_agent_config, load_workflow, parse_generator_output, validate_config_list, AgentSpec,
};
use super::step::{
    critical_error, file_parts, no_valid_response, AgentOutcome, AgentStatus, StepContext,
    StepExecutor, NO_TASK_OR_FILES,
};
use super::store::MessageStore;
use crate::artifacts::{extract_files, select_final_result, ExtractedFiles, FinalResult};
use crate::config::{Settings, WorkflowEntry};
use crate::errors::{WorkflowError, WorkflowResult};
use crate::models::file::UploadedFile;
use crate::models::message::Message;
use crate::prompt_template;
use crate::providers::base::GenerateConfig;
use crate::providers::factory::get_provider;
use crate::rate_limiter::{RateLimitedProvider, RateLimiter};
use crate::tools::ToolRegistry;

pub const GENERATOR_DETAILS: &str = "Output of the workflow generator";
pub const DEFAULT_GENERATOR_TEMPERATURE: f64 = 0.5;
const GENERATOR_EMPTY: &str = "[Generator returned an empty response]";

/// Mutable state for a single run
pub struct RunContext {
    pub message_store: MessageStore,
    pub uploaded_files: Arc<[UploadedFile]>,
    pub results_log: Vec<AgentOutcome>,
}

impl RunContext {
    pub fn new(files: Vec<UploadedFile>) -> Self {
        Self {
            message_store: MessageStore::new(),
            uploaded_files: files.into(),
            results_log: Vec::new(),
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,
    pub overall_success: bool,
    /// Agent definitions produced by the generator, when the workflow used one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_agents: Option<Vec<AgentSpec>>,
    pub results: Vec<AgentOutcome>,
    pub files: ExtractedFiles,
    pub final_result: Option<FinalResult>,
}

/// Drives a workflow from its configuration to the final report
pub struct WorkflowDriver {
    executor: StepExecutor,
}

impl WorkflowDriver {
    pub fn new(executor: StepExecutor) -> Self {
        Self { executor }
    }

    /// The configured provider behind one process-wide limiter, with the builtin tools
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let provider = get_provider(settings.provider.provider_config())?;
        let limiter = Arc::new(RateLimiter::new(settings.rpm_limit)?);
        let provider = Arc::new(RateLimitedProvider::new(Arc::from(provider), limiter));
        Ok(Self::new(StepExecutor::new(
            provider,
            Arc::new(ToolRegistry::builtin()),
            settings.provider.model.clone(),
        )))
    }

    /// Run a workflow from the catalog
    pub async fn run(
        &self,
        workflow: &WorkflowEntry,
        task: &str,
        files: Vec<UploadedFile>,
    ) -> WorkflowResult<RunReport> {
        if task.trim().is_empty() && files.is_empty() {
            return Err(WorkflowError::EmptyRequest);
        }

        let mut ctx = RunContext::new(files);
        let (specs, generator) = if workflow.is_generator {
            let (generator, specs) = self
                .generate_specs(&workflow.name, &workflow.path, task, &mut ctx)
                .await?;
            (specs, Some(generator))
        } else {
            (load_workflow(&workflow.path, false)?, None)
        };

        let mut report = self
            .execute(&workflow.name, &specs, task, ctx, generator.as_deref())
            .await;
        if generator.is_some() {
            report.generated_agents = Some(specs);
        }
        Ok(report)
    }

    /// Run an already validated list of agents in order
    pub async fn execute(
        &self,
        workflow: &str,
        specs: &[AgentSpec],
        task: &str,
        mut ctx: RunContext,
        generator: Option<&str>,
    ) -> RunReport {
        let mut overall_success = true;
        let total = specs.len();

        for (index, spec) in specs.iter().enumerate() {
            tracing::info!(
                workflow,
                agent = %spec.name,
                round = spec.round,
                "running agent {}/{}",
                index + 1,
                total
            );

            let step_ctx = StepContext {
                workflow,
                task,
                files: &ctx.uploaded_files,
                store: &ctx.message_store,
            };
            let outcome = match self.executor.run(spec, &step_ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(agent = %spec.name, error = %e, "agent step failed");
                    AgentOutcome::failed(&spec.name, critical_error(&e))
                }
            };

            tracing::info!(agent = %spec.name, status = %outcome.status, "agent finished");
            match outcome.status {
                AgentStatus::Success if !outcome.output.contains(NO_TASK_OR_FILES) => {
                    ctx.message_store.insert(&spec.name, &outcome.output);
                }
                AgentStatus::Failed => overall_success = false,
                _ => {}
            }
            ctx.results_log.push(outcome);
        }

        let files = extract_files(&ctx.results_log, generator);
        let final_result = select_final_result(&ctx.results_log, generator);
        tracing::info!(
            workflow,
            overall_success,
            files = files.len(),
            "workflow finished"
        );

        RunReport {
            workflow: workflow.to_string(),
            overall_success,
            generated_agents: None,
            results: ctx.results_log,
            files,
            final_result,
        }
    }

    /// Ask the generator agent for the workflow's agent list
    async fn generate_specs(
        &self,
        workflow: &str,
        path: &Path,
        task: &str,
        ctx: &mut RunContext,
    ) -> WorkflowResult<(String, Vec<AgentSpec>)> {
        let entries = load_agent_config(path, true)?;
        let generator = validate_config_list(&entries, &path.display().to_string())?
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::Internal("generator config has no agents".to_string()))?;

        let request = generator_request(workflow, &generator, task, &ctx.uploaded_files)
            .map_err(|e| WorkflowError::Internal(e.to_string()))?;
        let config = GenerateConfig {
            temperature: Some(generator.temperature.unwrap_or(DEFAULT_GENERATOR_TEMPERATURE)),
            ..Default::default()
        };

        tracing::info!(workflow, agent = %generator.name, "generating workflow");
        let outcome = match self
            .executor
            .provider()
            .generate(self.executor.model(), &[request], &config)
            .await
        {
            Ok(generation) => match generation.message.as_ref() {
                Some(message) => {
                    let text = message.texts().concat().trim().to_string();
                    if text.is_empty() {
                        AgentOutcome::failed(&generator.name, GENERATOR_EMPTY)
                    } else {
                        AgentOutcome::success(&generator.name, text)
                    }
                }
                None => AgentOutcome::failed(&generator.name, no_valid_response(&generation)),
            },
            Err(e) => {
                tracing::error!(agent = %generator.name, error = %e, "workflow generation failed");
                AgentOutcome::failed(&generator.name, critical_error(&e))
            }
        }
        .with_details(GENERATOR_DETAILS);

        let output = outcome.output.clone();
        let success = outcome.is_success();
        ctx.results_log.push(outcome);
        if !success {
            return Err(WorkflowError::GenerationFailed { output });
        }

        let entries = parse_generator_output(&output)?;
        let specs = validate_config_list(&entries, "generated workflow").map_err(|source| {
            WorkflowError::InvalidGeneratedWorkflow {
                source,
                raw_output: output.clone(),
            }
        })?;

        tracing::info!(workflow, agents = specs.len(), "workflow generated");
        Ok((generator.name, specs))
    }
}

fn generator_request(
    workflow: &str,
    generator: &AgentSpec,
    task: &str,
    files: &[UploadedFile],
) -> anyhow::Result<Message> {
    let mut message = Message::user()
        .with_text(prompt_template::system_block(
            workflow,
            &generator.name,
            &generator.system_instruction,
        )?)
        .with_text(format!("User goal:\n{}", task));
    if !files.is_empty() {
        for part in file_parts(files, &generator.name)? {
            message = message.with_content(part);
        }
    }
    Ok(message)
}
