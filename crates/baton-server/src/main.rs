mod routes;
mod state;

use anyhow::Result;
use baton::agents::WorkflowDriver;
use baton::config::{Settings, WorkflowCatalog};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::new()?;
    let catalog = WorkflowCatalog::discover(&settings.workflows_dir);
    if catalog.is_empty() {
        tracing::warn!(
            dir = %settings.workflows_dir.display(),
            "no workflow configuration files found"
        );
    }
    for entry in catalog.entries() {
        info!(workflow = %entry.name, path = %entry.path.display(), "workflow available");
    }

    let driver = WorkflowDriver::from_settings(&settings)?;
    let app = routes::configure(state::AppState::new(catalog, driver));

    let listener = tokio::net::TcpListener::bind(settings.server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
