//! # HTTP API
//!
//! Run lifecycle (`/start`, `/stream/:run_id`) plus read-only endpoints over
//! persisted runs and the static pipeline definition.

pub mod history;
pub mod pipeline;

use axum::{
    extract::rejection::JsonRejection,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use sdlc_core::state::RunHistory;
use sdlc_core::swarm::RunRegistry;
use sdlc_core::StateError;

/// Application state
pub struct AppState {
    pub registry: Arc<RunRegistry>,
    pub history: RunHistory,
}

pub type SharedState = Arc<AppState>;

/// Error body used by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failure of an API call
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<StateError> for ApiError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::InvalidName(_) => ApiError::NotFound,
            e if e.is_not_found() => ApiError::NotFound,
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "SDLC Pipeline API",
        version = "0.1.0",
        description = "Start multi-agent SDLC runs, stream their progress and browse their artifacts"
    ),
    paths(
        pipeline::start_run,
        pipeline::stream_run,
        pipeline::list_agents,
        pipeline::list_phases,
        pipeline::get_status,
        history::list_runs,
        history::list_history,
        history::get_run,
        history::get_run_detail,
        history::get_artifact
    ),
    components(
        schemas(
            ErrorResponse,
            pipeline::StartRequest,
            pipeline::StartResponse,
            pipeline::AgentInfo,
            pipeline::PhaseInfo,
            pipeline::StatusResponse
        )
    ),
    tags(
        (name = "pipeline", description = "Run lifecycle and pipeline definition"),
        (name = "history", description = "Persisted runs")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> Response {
    match ApiDoc::openapi().to_json() {
        Ok(spec) => ([(header::CONTENT_TYPE, "application/json")], spec).into_response(),
        Err(e) => ApiError::Internal(e.to_string()).into_response(),
    }
}

/// The complete router
pub fn app(state: SharedState) -> Router {
    Router::new()
        .route("/start", post(pipeline::start_run))
        .route("/stream/:run_id", get(pipeline::stream_run))
        .route("/api/agents", get(pipeline::list_agents))
        .route("/api/phases", get(pipeline::list_phases))
        .route("/api/status", get(pipeline::get_status))
        .route("/api/runs", get(history::list_runs))
        .route("/api/history", get(history::list_history))
        .route("/api/run/:run_id", get(history::get_run))
        .route("/api/run/:run_id/detail", get(history::get_run_detail))
        .route("/api/artifact/:run_id/:filename", get(history::get_artifact))
        .route("/api/openapi.json", get(serve_openapi))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use sdlc_core::config::PipelineConfig;
    use sdlc_core::models::AgentRole;
    use sdlc_core::swarm::{AgentPipeline, CrewOutput, TaskCallback, TaskOutput};
    use std::path::Path;
    use std::sync::{mpsc, Mutex};
    use tower::ServiceExt;

    /// Seven canned outputs, released by the test
    pub struct GatedCrew {
        pub gate: Mutex<mpsc::Receiver<()>>,
    }

    impl AgentPipeline for GatedCrew {
        fn kickoff(
            &self,
            _requirement: &str,
            on_task_done: TaskCallback<'_>,
        ) -> anyhow::Result<CrewOutput> {
            let _ = self.gate.lock().unwrap().recv();
            let mut outputs = Vec::new();
            for i in 0..7 {
                let output = TaskOutput::new(format!("output {}", i), "agent");
                on_task_done(&output);
                outputs.push(output);
            }
            Ok(CrewOutput {
                tasks_output: outputs,
            })
        }

        fn model_for(&self, role: AgentRole) -> String {
            role.default_model().to_string()
        }
    }

    /// App over a temp output root; the sender releases every run
    pub fn test_app(root: &Path) -> (Router, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel();
        let config = PipelineConfig {
            output_dir: root.to_path_buf(),
            ..PipelineConfig::default()
        };
        let crew = GatedCrew {
            gate: Mutex::new(gate),
        };
        let state = Arc::new(AppState {
            registry: Arc::new(RunRegistry::new(Arc::new(crew), config)),
            history: RunHistory::new(root),
        });
        (app(state), release)
    }

    pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    pub async fn get(app: &Router, uri: &str) -> (StatusCode, String) {
        send(app, Request::get(uri).body(Body::empty()).unwrap()).await
    }
}
