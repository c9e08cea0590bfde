use anyhow::{anyhow, Result};
use baton::agents::{AgentOutcome, AgentStatus, RunReport};
use bat::WrappingMode;
use console::style;

fn status_label(status: AgentStatus) -> String {
    match status {
        AgentStatus::Success => style("success").green().to_string(),
        AgentStatus::Failed => style("failed").red().bold().to_string(),
        AgentStatus::Skipped => style("skipped").yellow().to_string(),
    }
}

pub fn markdown(content: &str) -> Result<()> {
    bat::PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .wrapping_mode(WrappingMode::Character)
        .print()
        .map_err(|e| anyhow!("Failed to render output: {}", e))?;
    println!();
    Ok(())
}

fn outcome(outcome: &AgentOutcome) -> Result<()> {
    println!(
        "{} {}",
        style(format!("── {} ", outcome.agent)).cyan().bold(),
        status_label(outcome.status)
    );
    if let Some(details) = &outcome.details {
        println!("{}", style(details).dim());
    }
    markdown(&outcome.output)?;
    if let Some(sources) = &outcome.sources {
        println!("{}", style(sources).dim());
    }
    Ok(())
}

pub fn report(report: &RunReport) -> Result<()> {
    if let Some(agents) = &report.generated_agents {
        let names: Vec<&str> = agents.iter().map(|agent| agent.name.as_str()).collect();
        println!(
            "{} {}",
            style("Generated agents:").bold(),
            names.join(" → ")
        );
    }

    for result in &report.results {
        outcome(result)?;
    }

    if !report.files.is_empty() {
        println!("{}", style("Extracted files:").bold());
        for (path, content) in &report.files {
            println!("  {} ({} bytes)", path, content.len());
        }
        println!();
    }

    match &report.final_result {
        Some(final_result) => {
            println!(
                "{}",
                style(format!("Final result from '{}'", final_result.agent))
                    .magenta()
                    .bold()
            );
            markdown(&final_result.output)?;
        }
        None => println!("{}", style("No final result").dim()),
    }

    let summary = if report.overall_success {
        style(format!("Workflow '{}' completed", report.workflow)).green()
    } else {
        style(format!("Workflow '{}' finished with failures", report.workflow)).red()
    };
    println!("{}", summary.bold());
    Ok(())
}
