use anyhow::{bail, Context, Result};
use baton::agents::{RunReport, WorkflowDriver};
use baton::artifacts::{archive_file_name, package_archive};
use baton::config::{Settings, WorkflowCatalog, WorkflowEntry};
use cliclack::spinner;
use console::style;
use std::fs;
use std::path::{Path, PathBuf};

use crate::inputs::read_files;
use crate::render;

pub struct RunArgs {
    pub workflow: Option<String>,
    pub task: Option<String>,
    pub files: Vec<PathBuf>,
    pub archive: Option<PathBuf>,
    pub json: bool,
}

fn choose_workflow<'a>(catalog: &'a WorkflowCatalog, name: Option<&str>) -> Result<&'a WorkflowEntry> {
    if let Some(name) = name {
        return Ok(catalog.get(name)?);
    }

    let mut select = cliclack::select("Which workflow should run?");
    for entry in catalog.entries() {
        let hint = if entry.is_generator {
            "agents are designed for the task"
        } else {
            ""
        };
        select = select.item(entry.name.clone(), &entry.name, hint);
    }
    let chosen: String = select.interact()?;
    Ok(catalog.get(&chosen)?)
}

fn ask_task() -> Result<String> {
    let task: String = cliclack::input("Describe the task")
        .placeholder("leave empty to work from the files alone")
        .multiline()
        .required(false)
        .interact()?;
    Ok(task)
}

/// Package the extracted files into `<dir>/<workflow>_output_<stamp>.zip`
pub fn write_archive(report: &RunReport, dir: &Path) -> Result<Option<PathBuf>> {
    if report.files.is_empty() {
        return Ok(None);
    }
    let bytes = package_archive(&report.files)?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(archive_file_name(&report.workflow, &chrono::Local::now()));
    fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(Some(path))
}

pub async fn execute(config_file: Option<&Path>, args: RunArgs) -> Result<()> {
    let settings = Settings::load(config_file)?;
    let catalog = WorkflowCatalog::discover(&settings.workflows_dir);
    if catalog.is_empty() {
        bail!(
            "No workflow configuration files found in {}",
            settings.workflows_dir.display()
        );
    }

    let workflow = choose_workflow(&catalog, args.workflow.as_deref())?;
    let task = match args.task {
        Some(task) => task,
        None if args.json => String::new(),
        None => ask_task()?,
    };
    let files = read_files(&args.files)?;
    let driver = WorkflowDriver::from_settings(&settings)?;

    let spin = spinner();
    if !args.json {
        spin.start(format!("running {}", workflow.name));
    }
    let result = driver.run(workflow, &task, files).await;
    if !args.json {
        spin.stop("");
    }

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if let Some(raw) = e.raw_output() {
                eprintln!("{}", style("Raw generator output:").yellow());
                eprintln!("{}", raw);
            }
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render::report(&report)?;
    }

    if let Some(dir) = args.archive {
        match write_archive(&report, &dir)? {
            Some(path) => eprintln!("Archive written to {}", style(path.display()).green()),
            None => eprintln!("{}", style("No files were extracted, no archive written").dim()),
        }
    }

    if !report.overall_success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton::artifacts::ExtractedFiles;

    fn report(files: ExtractedFiles) -> RunReport {
        RunReport {
            workflow: "Python Task".to_string(),
            overall_success: true,
            generated_agents: None,
            results: vec![],
            files,
            final_result: None,
        }
    }

    #[test]
    fn test_write_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = ExtractedFiles::new();
        files.insert("main.py".to_string(), "print(1)\n".to_string());

        let path = write_archive(&report(files), &dir.path().join("out"))
            .unwrap()
            .unwrap();
        assert!(path.is_file());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("python_task_output_"));
        assert!(name.ends_with(".zip"));
    }

    #[test]
    fn test_no_archive_without_files() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_archive(&report(ExtractedFiles::new()), dir.path()).unwrap();
        assert!(written.is_none());
    }
}
