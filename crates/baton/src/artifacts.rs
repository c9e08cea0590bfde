//! Files and the final answer pulled out of a finished run.
//!
//! Agents hand over files with a marker line followed by a fenced block:
//!
//! ````text
//! ## FILE: src/main.py
//! ```python
//! print("hello")
//! ```
//! ````

use anyhow::Result;
use lazy_static::lazy_static;
use chrono::{DateTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::agents::step::{AgentOutcome, INPUT_MISSING, NO_TASK_OR_FILES};

const FILE_BLOCK_PATTERN: &str = r"## FILE: \s*([\w.\-/]+\.\w+)\s*\n```(?:[\w+#\-.]*\n)?(.*?)```";

lazy_static! {
    static ref FILE_BLOCK: Regex =
        Regex::new(&format!("(?s){}", FILE_BLOCK_PATTERN)).expect("valid regex");
    static ref FILE_ONLY: Regex =
        Regex::new(&format!(r"(?s)\A{}\z", FILE_BLOCK_PATTERN)).expect("valid regex");
}

const FINAL_RESULT_ROLES: [&str; 3] = ["Planner", "Reviewer", "Packager"];

/// Path to content, sorted by path
pub type ExtractedFiles = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub agent: String,
    pub output: String,
    /// Set when every candidate output was only file blocks
    pub code_only: bool,
}

fn is_sentinel(output: &str) -> bool {
    output.contains(INPUT_MISSING) || output.contains(NO_TASK_OR_FILES)
}

fn is_generator(outcome: &AgentOutcome, generator: Option<&str>) -> bool {
    generator.is_some_and(|name| outcome.agent == name)
}

/// Collect every file block from successful agent outputs. A later block for the same
/// path replaces an earlier one.
pub fn extract_files(results: &[AgentOutcome], generator: Option<&str>) -> ExtractedFiles {
    let mut files = ExtractedFiles::new();
    for outcome in results {
        if !outcome.is_success() || is_generator(outcome, generator) || outcome.output.is_empty()
        {
            continue;
        }
        for captures in FILE_BLOCK.captures_iter(&outcome.output) {
            let path = captures[1].trim().to_string();
            let content = format!("{}\n", captures[2].trim());
            files.insert(path, content);
        }
    }
    files
}

fn is_file_only(output: &str) -> bool {
    let trimmed = output.trim();
    FILE_ONLY.is_match(trimmed) || trimmed.starts_with("## FILE:")
}

/// Pick the output to present as the run's answer.
///
/// The newest successful text output wins. Outputs made only of file blocks are passed
/// over unless the agent is a planner, reviewer or packager. If nothing else qualifies
/// the newest file-only agent is reported with `code_only` set.
pub fn select_final_result(results: &[AgentOutcome], generator: Option<&str>) -> Option<FinalResult> {
    let mut code_only = None;

    for outcome in results.iter().rev() {
        if !outcome.is_success()
            || is_generator(outcome, generator)
            || outcome.output.is_empty()
            || is_sentinel(&outcome.output)
        {
            continue;
        }

        let preferred_role = FINAL_RESULT_ROLES
            .iter()
            .any(|role| outcome.agent.contains(role));
        if !is_file_only(&outcome.output) || preferred_role {
            return Some(FinalResult {
                agent: outcome.agent.clone(),
                output: outcome.output.clone(),
                code_only: false,
            });
        }

        if code_only.is_none() {
            code_only = Some(FinalResult {
                agent: outcome.agent.clone(),
                output: format!("[Last output was code from agent '{}']", outcome.agent),
                code_only: true,
            });
        }
    }

    code_only
}

/// Write the extracted files into a deflated zip archive
pub fn package_archive(files: &ExtractedFiles) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, content) in files {
        zip.start_file(path.as_str(), options)?;
        zip.write_all(content.as_bytes())?;
    }

    Ok(zip.finish()?.into_inner())
}

/// `<workflow_snake>_output_<YYYYmmdd_HHMM>.zip`
pub fn archive_file_name<Tz: TimeZone>(workflow: &str, now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_output_{}.zip",
        workflow.to_lowercase().replace(' ', "_"),
        now.format("%Y%m%d_%H%M")
    )
}
