use axum::{extract::State, routing::get, Json, Router};
use baton::config::WorkflowEntry;

use crate::state::AppState;

async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowEntry>> {
    Json(state.catalog.entries().to_vec())
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows", get(list_workflows))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use baton::agents::{StepExecutor, WorkflowDriver};
    use baton::config::WorkflowCatalog;
    use baton::providers::mock::MockProvider;
    use baton::tools::ToolRegistry;
    use serde_json::Value;
    use std::fs;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_workflows() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("agents_config_cpp.json"), "[]").unwrap();
        fs::write(dir.path().join("generator_agent_config.json"), "[]").unwrap();

        let driver = WorkflowDriver::new(StepExecutor::new(
            Arc::new(MockProvider::default()),
            Arc::new(ToolRegistry::builtin()),
            "mock",
        ));
        let app = routes(AppState::new(WorkflowCatalog::discover(dir.path()), driver));

        let request = Request::builder()
            .uri("/workflows")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let workflows: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(workflows.len(), 2);
        assert_eq!(workflows[0]["name"], "Dynamic Workflow Generator");
        assert_eq!(workflows[0]["is_generator"], true);
        assert_eq!(workflows[1]["name"], "C++ Task");
        assert_eq!(workflows[1]["is_generator"], false);
    }
}
