use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use baton::agents::RunReport;
use baton::artifacts::{archive_file_name, package_archive, ExtractedFiles};
use baton::errors::{ConfigError, WorkflowError};
use baton::models::file::UploadedFile;
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize, Serialize)]
struct FilePayload {
    name: String,
    #[serde(default = "default_mime_type")]
    mime_type: String,
    /// Base64 encoded content
    data: String,
}

fn default_mime_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Debug, Deserialize, Serialize)]
struct RunRequest {
    workflow: String,
    #[serde(default)]
    task: String,
    #[serde(default)]
    files: Vec<FilePayload>,
}

/// The `workflow` and `files` of a finished run, so a `RunReport` can be posted as is
#[derive(Debug, Deserialize, Serialize)]
struct ArchiveRequest {
    workflow: String,
    #[serde(default)]
    files: ExtractedFiles,
}

#[derive(Debug, Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_output: Option<String>,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            raw_output: None,
        }),
    )
        .into_response()
}

fn workflow_error_response(err: WorkflowError) -> Response {
    let status = match &err {
        WorkflowError::Config(ConfigError::UnknownWorkflow(_)) => StatusCode::NOT_FOUND,
        WorkflowError::EmptyRequest => StatusCode::BAD_REQUEST,
        WorkflowError::GenerationFailed { .. }
        | WorkflowError::GeneratorParse { .. }
        | WorkflowError::InvalidGeneratedWorkflow { .. } => StatusCode::BAD_GATEWAY,
        WorkflowError::Config(_) | WorkflowError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(status = %status, error = %err, "workflow request failed");

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            raw_output: err.raw_output().map(str::to_string),
        }),
    )
        .into_response()
}

fn decode_files(files: Vec<FilePayload>) -> Result<Vec<UploadedFile>, String> {
    files
        .into_iter()
        .map(|file| {
            let bytes = STANDARD
                .decode(file.data.trim())
                .map_err(|e| format!("File '{}' is not valid base64: {}", file.name, e))?;
            Ok(UploadedFile::new(file.name, file.mime_type, bytes))
        })
        .collect()
}

async fn run_workflow(state: &AppState, request: RunRequest) -> Result<RunReport, Response> {
    let files = decode_files(request.files)
        .map_err(|error| error_response(StatusCode::BAD_REQUEST, error))?;
    let workflow = state
        .catalog
        .get(&request.workflow)
        .map_err(|e| workflow_error_response(e.into()))?;

    state
        .driver
        .run(workflow, &request.task, files)
        .await
        .map_err(workflow_error_response)
}

async fn run_handler(
    State(state): State<AppState>,
    Json(request): Json<RunRequest>,
) -> Response {
    match run_workflow(&state, request).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(response) => response,
    }
}

async fn archive_handler(Json(request): Json<ArchiveRequest>) -> Response {
    if request.files.is_empty() {
        return error_response(
            StatusCode::NOT_FOUND,
            "The workflow produced no files".to_string(),
        );
    }

    match package_archive(&request.files) {
        Ok(bytes) => {
            let file_name = archive_file_name(&request.workflow, &chrono::Local::now());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", file_name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to package files: {}", e),
        ),
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/run", post(run_handler))
        .route("/run/archive", post(archive_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
    };
    use baton::agents::{StepExecutor, WorkflowDriver};
    use baton::config::WorkflowCatalog;
    use baton::models::message::Message;
    use baton::providers::mock::MockProvider;
    use baton::tools::ToolRegistry;
    use serde_json::{json, Value};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(replies: &[&str]) -> (Router, Arc<MockProvider>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("agents_config_python.json"),
            json!([
                {"name": "Coder", "round": 1, "system_instruction": "Write code.",
                 "accepts_files": true}
            ])
            .to_string(),
        )
        .unwrap();
        fs::write(
            dir.path().join("generator_agent_config.json"),
            json!([
                {"name": "WorkflowGenerator", "round": 0,
                 "system_instruction": "Design agents as a JSON list."}
            ])
            .to_string(),
        )
        .unwrap();

        let provider = Arc::new(MockProvider::with_messages(
            replies
                .iter()
                .map(|reply| Message::model().with_text(*reply))
                .collect(),
        ));
        let driver = WorkflowDriver::new(StepExecutor::new(
            provider.clone(),
            Arc::new(ToolRegistry::builtin()),
            "mock",
        ));
        let state = AppState::new(WorkflowCatalog::discover(dir.path()), driver);
        (routes(state), provider, dir)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_run_returns_report() {
        let (app, provider, _dir) = app(&["## FILE: main.py\n```python\nprint('hi')\n```"]);
        let request = post_json(
            "/run",
            json!({
                "workflow": "Python Task",
                "task": "greet",
                "files": [{"name": "notes.txt", "mime_type": "text/plain",
                           "data": STANDARD.encode("be polite")}]
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let report = json_body(response).await;
        assert_eq!(report["workflow"], "Python Task");
        assert_eq!(report["overall_success"], true);
        assert_eq!(report["results"][0]["agent"], "Coder");
        assert_eq!(report["results"][0]["status"], "Success");
        assert_eq!(report["files"]["main.py"], "print('hi')\n");
        assert_eq!(report["final_result"]["code_only"], true);

        // the decoded file reached the agent
        let requests = provider.requests();
        let texts: Vec<String> = requests[0].contents[0]
            .texts()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert!(texts.iter().any(|t| t.contains("be polite")));
    }

    #[tokio::test]
    async fn test_unknown_workflow() {
        let (app, provider, _dir) = app(&[]);
        let response = app
            .oneshot(post_json("/run", json!({"workflow": "Cobol Task", "task": "x"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("Cobol Task"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_request() {
        let (app, _provider, _dir) = app(&[]);
        let response = app
            .oneshot(post_json("/run", json!({"workflow": "Python Task", "task": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_base64() {
        let (app, _provider, _dir) = app(&[]);
        let request = post_json(
            "/run",
            json!({
                "workflow": "Python Task",
                "task": "x",
                "files": [{"name": "a.txt", "data": "***"}]
            }),
        );
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("a.txt"));
    }

    #[tokio::test]
    async fn test_generator_parse_error_returns_raw_output() {
        let (app, _provider, _dir) = app(&["I would rather not."]);
        let response = app
            .oneshot(post_json(
                "/run",
                json!({"workflow": "Dynamic Workflow Generator", "task": "build a CLI"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["raw_output"], "I would rather not.");
    }

    #[tokio::test]
    async fn test_archive_packages_the_reported_files() {
        let (app, provider, _dir) = app(&["## FILE: main.py\n```python\nprint('hi')\n```"]);
        let response = app
            .clone()
            .oneshot(post_json(
                "/run",
                json!({"workflow": "Python Task", "task": "greet"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;

        // the report goes back unchanged and no agent runs again
        let response = app.oneshot(post_json("/run/archive", report)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/zip"
        );
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains("python_task_output_"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        // zip local file header
        assert_eq!(&body[..4], b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_archive_without_files() {
        let (app, provider, _dir) = app(&[]);
        let response = app
            .oneshot(post_json(
                "/run/archive",
                json!({"workflow": "Python Task", "files": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(provider.call_count(), 0);
    }
}
