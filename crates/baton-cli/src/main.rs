mod commands;
mod inputs;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file to read instead of ./baton.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the workflows found in the workflows directory
    Workflows,

    /// Run a workflow on a task and a set of files
    Run {
        /// Workflow name, chosen interactively when omitted
        #[arg(short, long)]
        workflow: Option<String>,

        /// What the agents should do, prompted for when omitted
        #[arg(short, long)]
        task: Option<String>,

        /// Files handed to agents that accept them
        #[arg(short, long = "file", value_name = "PATH")]
        files: Vec<PathBuf>,

        /// Write the extracted files as a zip archive into this directory
        #[arg(short, long, value_name = "DIR")]
        archive: Option<PathBuf>,

        /// Print the full report as JSON instead of rendering it
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Workflows => commands::workflows::execute(cli.config.as_deref()),
        Command::Run {
            workflow,
            task,
            files,
            archive,
            json,
        } => {
            commands::run::execute(
                cli.config.as_deref(),
                commands::run::RunArgs {
                    workflow,
                    task,
                    files,
                    archive,
                    json,
                },
            )
            .await
        }
    }
}
