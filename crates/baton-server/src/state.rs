use baton::agents::WorkflowDriver;
use baton::config::WorkflowCatalog;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<WorkflowCatalog>,
    pub driver: Arc<WorkflowDriver>,
}

impl AppState {
    pub fn new(catalog: WorkflowCatalog, driver: WorkflowDriver) -> Self {
        Self {
            catalog: Arc::new(catalog),
            driver: Arc::new(driver),
        }
    }
}
