//! HTTP surface for browsers and agents.
//!
//! Browsers start runs, follow them as NDJSON and post answers one at a
//! time. Agents use the call-response endpoints under `/api/run`, which
//! block until the run needs them again.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use relay_core::consumer::CallResponseResult;
use relay_core::coordinator::CoordinatorError;
use relay_core::protocol::{ProtocolError, Submission};
use relay_core::types::RunId;
use relay_core::workflow::{WorkflowError, WorkflowMeta, WorkflowRunner};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct AppState {
    pub runner: WorkflowRunner,
}

impl AppState {
    pub fn new(runner: WorkflowRunner) -> Self {
        Self { runner }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unknown workflow: {0}")]
    WorkflowNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::WorkflowNotFound(_) | ApiError::RunNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if code == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        match e {
            CoordinatorError::UnknownRun { run_id } => ApiError::RunNotFound(run_id),
            CoordinatorError::Protocol(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<ProtocolError> for ApiError {
    fn from(e: ProtocolError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::UnknownWorkflow { name } => ApiError::WorkflowNotFound(name),
            WorkflowError::Coordinator(e) => e.into(),
            WorkflowError::Protocol(e) => e.into(),
            WorkflowError::InvalidParams { message } => ApiError::BadRequest(message),
            e @ (WorkflowError::NotRunning { .. } | WorkflowError::NotAwaiting { .. }) => {
                ApiError::Conflict(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

fn parse_run_id(id: &str) -> Result<RunId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::RunNotFound(id.to_string()))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workflows", get(list_workflows).post(start_workflow))
        .route("/workflows/{id}/stream", get(stream_run))
        .route("/workflows/{id}/event/{name}", post(submit_event))
        .route("/api/run", post(run_and_wait))
        .route("/api/run/{id}/respond", post(respond_and_wait))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WorkflowList {
    pub workflows: Vec<WorkflowMeta>,
}

async fn list_workflows(State(st): State<AppState>) -> Json<WorkflowList> {
    Json(WorkflowList {
        workflows: st.runner.registry().list(),
    })
}

#[derive(Debug, Deserialize)]
pub struct StartWorkflowRequest {
    pub name: String,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartWorkflowResponse {
    pub id: RunId,
    pub name: String,
}

async fn start_workflow(
    State(st): State<AppState>,
    Json(req): Json<StartWorkflowRequest>,
) -> Result<Json<StartWorkflowResponse>, ApiError> {
    let started = st.runner.start(&req.name, req.data).await?;
    Ok(Json(StartWorkflowResponse {
        id: started.run_id,
        name: req.name,
    }))
}

async fn stream_run(
    State(st): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let run_id = parse_run_id(&id)?;
    let subscription = st.runner.coordinator().subscribe(run_id).await?;

    let lines = subscription.into_stream().filter_map(move |message| async move {
        match message.to_ndjson_line() {
            Ok(line) => Some(Ok::<_, Infallible>(line)),
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Dropping unencodable message");
                None
            }
        }
    });

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(NDJSON_CONTENT_TYPE),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Ok((headers, Body::from_stream(lines)).into_response())
}

/// Body of a browser answer: `{value}` for input, `{approved}` for confirm.
#[derive(Debug, Default, Deserialize)]
pub struct EventBody {
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub approved: Option<bool>,
}

impl EventBody {
    pub fn into_submission(self, event: String) -> Submission {
        let data = match self.approved {
            Some(approved) => json!({ "approved": approved }),
            None => self.value.unwrap_or(Value::Null),
        };
        Submission::new(event, data)
    }
}

async fn submit_event(
    State(st): State<AppState>,
    Path((id, name)): Path<(String, String)>,
    Json(body): Json<EventBody>,
) -> Result<Json<Value>, ApiError> {
    let run_id = parse_run_id(&id)?;
    st.runner
        .submit_event(run_id, body.into_submission(name))
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub workflow: String,
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

async fn run_and_wait(
    State(st): State<AppState>,
    Json(req): Json<RunRequest>,
) -> Result<Json<CallResponseResult>, ApiError> {
    let result = st.runner.start_and_wait(&req.workflow, req.data).await?;
    Ok(Json(result))
}

async fn respond_and_wait(
    State(st): State<AppState>,
    Path(id): Path<String>,
    Json(submission): Json<Submission>,
) -> Result<Json<CallResponseResult>, ApiError> {
    let run_id = parse_run_id(&id)?;
    let result = st.runner.respond_and_wait(run_id, submission).await?;
    Ok(Json(result))
}
