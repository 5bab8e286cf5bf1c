//! # Pipeline API
//!
//! Starting runs, streaming their events, and the static pipeline shape.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderName},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use utoipa::ToSchema;

use sdlc_core::models::AgentRole;
use sdlc_core::swarm::PHASE_DEFS;

use super::{ApiError, SharedState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartRequest {
    /// Free-text description of the software to build
    #[serde(default)]
    pub requirement: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartResponse {
    pub run_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AgentInfo {
    pub key: String,
    pub name: String,
    pub model: String,
    pub temperature: f32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PhaseInfo {
    pub index: usize,
    pub key: String,
    pub phase: String,
    pub agent: String,
    pub file: String,
    pub extract: bool,
    pub icon: String,
    pub color: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub active_runs: Vec<String>,
    pub ollama_base_url: String,
    pub output_dir: String,
}

/// Start a pipeline run
#[utoipa::path(
    post,
    path = "/start",
    tag = "pipeline",
    request_body = StartRequest,
    responses(
        (status = 200, description = "Run accepted", body = StartResponse),
        (status = 400, description = "Blank requirement or unreadable body", body = super::ErrorResponse)
    )
)]
pub async fn start_run(
    State(state): State<SharedState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Json(req) = payload?;
    let requirement = req.requirement.trim();
    if requirement.is_empty() {
        return Err(ApiError::BadRequest("Requirement is required".to_string()));
    }

    let run_id = state
        .registry
        .start(requirement)
        .map_err(|e| ApiError::Internal(format!("{:#}", e)))?;

    Ok(Json(StartResponse { run_id }))
}

/// Server-sent events of a live run
#[utoipa::path(
    get,
    path = "/stream/{run_id}",
    tag = "pipeline",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "text/event-stream of pipeline events; unknown runs get a single error event")
    )
)]
pub async fn stream_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    let events = state
        .registry
        .stream(&run_id)
        .map(|event| Ok::<_, Infallible>(Event::default().data(event.to_json())));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

/// Agents with their configured models
#[utoipa::path(
    get,
    path = "/api/agents",
    tag = "pipeline",
    responses((status = 200, description = "Agent roles", body = [AgentInfo]))
)]
pub async fn list_agents(State(state): State<SharedState>) -> Json<Vec<AgentInfo>> {
    let config = state.registry.config();
    let agents = AgentRole::all()
        .into_iter()
        .map(|role| {
            let model = config.model_config(role);
            AgentInfo {
                key: role.key().to_string(),
                name: role.display_name().to_string(),
                model: model.model,
                temperature: model.temperature,
            }
        })
        .collect();
    Json(agents)
}

/// Phase definitions in execution order
#[utoipa::path(
    get,
    path = "/api/phases",
    tag = "pipeline",
    responses((status = 200, description = "Pipeline phases", body = [PhaseInfo]))
)]
pub async fn list_phases() -> Json<Vec<PhaseInfo>> {
    let phases = PHASE_DEFS
        .iter()
        .enumerate()
        .map(|(index, def)| PhaseInfo {
            index,
            key: def.key.to_string(),
            phase: def.phase.to_string(),
            agent: def.role.display_name().to_string(),
            file: def.file.to_string(),
            extract: def.extract,
            icon: def.icon.to_string(),
            color: def.color.to_string(),
        })
        .collect();
    Json(phases)
}

/// Active runs and backend settings
#[utoipa::path(
    get,
    path = "/api/status",
    tag = "pipeline",
    responses((status = 200, description = "Server status", body = StatusResponse))
)]
pub async fn get_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    let config = state.registry.config();
    Json(StatusResponse {
        active_runs: state.registry.active_runs(),
        ollama_base_url: config.ollama_base_url.clone(),
        output_dir: state.history.root().display().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};

    fn start_request(body: &str) -> Request<Body> {
        Request::post("/start")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_blank_requirement_rejected() {
        let root = tempfile::tempdir().unwrap();
        let (app, _release) = test_app(root.path());

        let (status, body) = send(&app, start_request(r#"{"requirement": "   "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"error":"Requirement is required"}"#);

        let (status, _) = send(&app, start_request("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unreadable_body_gets_json_error() {
        let root = tempfile::tempdir().unwrap();
        let (app, _release) = test_app(root.path());

        let (status, body) = send(&app, start_request("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(error["error"].as_str().is_some_and(|e| !e.is_empty()));

        let no_content_type = Request::post("/start")
            .body(Body::from(r#"{"requirement": "Build a CLI"}"#))
            .unwrap();
        let (status, body) = send(&app, no_content_type).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(serde_json::from_str::<serde_json::Value>(&body).unwrap()["error"].is_string());
    }

    #[tokio::test]
    async fn test_start_then_stream() {
        let root = tempfile::tempdir().unwrap();
        let (app, release) = test_app(root.path());

        let (status, body) = send(&app, start_request(r#"{"requirement": "Build a CLI"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let run_id = serde_json::from_str::<serde_json::Value>(&body).unwrap()["run_id"]
            .as_str()
            .unwrap()
            .to_string();

        let (status, body) = get(&app, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(&run_id));

        let response = tower::ServiceExt::oneshot(
            app.clone(),
            Request::get(format!("/stream/{}", run_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert_eq!(response.headers()["x-accel-buffering"], "no");

        release.send(()).unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();

        assert!(body.starts_with("data: {\"event\":\"pipeline_start\""));
        assert!(body.contains("\"event\":\"pipeline_complete\""));
        assert!(body.trim_end().ends_with("data: {\"event\":\"done\"}"));

        let (status, _) = get(&app, &format!("/api/run/{}", run_id)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_unknown_run() {
        let root = tempfile::tempdir().unwrap();
        let (app, _release) = test_app(root.path());

        let (status, body) = get(&app, "/stream/missing").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body.trim_end(),
            r#"data: {"event":"error","message":"Run not found or completed"}"#
        );
    }

    #[tokio::test]
    async fn test_static_definitions() {
        let root = tempfile::tempdir().unwrap();
        let (app, _release) = test_app(root.path());

        let (_, body) = get(&app, "/api/phases").await;
        let phases: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(phases.len(), 7);
        assert_eq!(phases[6]["file"], "07_ui_app.py");

        let (_, body) = get(&app, "/api/agents").await;
        let agents: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(agents[2]["model"], "devstral-small-2:24b");
    }
}
