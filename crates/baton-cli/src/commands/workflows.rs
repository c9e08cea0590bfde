use anyhow::Result;
use baton::agents::spec::load_workflow;
use baton::config::{Settings, WorkflowCatalog};
use console::style;
use std::path::Path;

pub fn execute(config_file: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config_file)?;
    let catalog = WorkflowCatalog::discover(&settings.workflows_dir);

    if catalog.is_empty() {
        println!(
            "No workflows found in {}",
            style(settings.workflows_dir.display()).yellow()
        );
        return Ok(());
    }

    for entry in catalog.entries() {
        let agents = match load_workflow(&entry.path, entry.is_generator) {
            Ok(specs) => {
                let names: Vec<String> = specs.into_iter().map(|spec| spec.name).collect();
                names.join(", ")
            }
            Err(e) => style(format!("invalid: {}", e)).red().to_string(),
        };
        println!("{}  {}", style(&entry.name).cyan().bold(), style(agents).dim());
    }
    Ok(())
}
