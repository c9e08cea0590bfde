use serde::Serialize;
use tera::{Context, Error as TeraError, Tera};

pub const SYSTEM_BLOCK: &str = include_str!("prompts/system_block.md");
pub const PREVIOUS_RESULTS: &str = include_str!("prompts/previous_results.md");
pub const FILE_BLOCK: &str = include_str!("prompts/file_block.md");

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

#[derive(Serialize)]
struct SystemBlock<'a> {
    workflow: &'a str,
    agent: &'a str,
    instruction: &'a str,
}

/// The block that opens every request: which workflow, which role, and its instruction
pub fn system_block(workflow: &str, agent: &str, instruction: &str) -> Result<String, TeraError> {
    load_prompt(
        SYSTEM_BLOCK,
        &SystemBlock {
            workflow,
            agent,
            instruction,
        },
    )
}

#[derive(Serialize)]
pub struct PreviousResult<'a> {
    pub source: &'a str,
    pub output: &'a str,
}

#[derive(Serialize)]
struct PreviousResults<'a> {
    results: &'a [PreviousResult<'a>],
}

/// Upstream outputs handed to a downstream agent, in the order its sources are listed
pub fn previous_results(results: &[PreviousResult<'_>]) -> Result<String, TeraError> {
    load_prompt(PREVIOUS_RESULTS, &PreviousResults { results })
}

#[derive(Serialize)]
struct FileBlock<'a> {
    name: &'a str,
    content: &'a str,
}

/// A text file embedded between START/END delimiters
pub fn file_block(name: &str, content: &str) -> Result<String, TeraError> {
    load_prompt(FILE_BLOCK, &FileBlock { name, content })
}
