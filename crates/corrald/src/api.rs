//! REST intent API and the agent heartbeat endpoint.
//!
//! Each handler forwards to the scheduler core and writes group metadata
//! through to the store, returning a uniform JSON envelope.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::warn;

use corral_core::{AgentSnapshot, AgentSpec, ContainerManifest};
use corral_scheduler::{SchedError, Scheduler};
use corral_state::MetaStore;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub sched: Arc<Scheduler>,
    pub store: MetaStore,
}

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn sched_error(err: SchedError) -> axum::response::Response {
    let status = match err {
        SchedError::UnknownGroup(_)
        | SchedError::UnknownContainer(_)
        | SchedError::UnknownAgent(_)
        | SchedError::NotFrozen(_) => StatusCode::NOT_FOUND,
        SchedError::ReplicaInvalid(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::CONFLICT,
    };
    error_response(&err.to_string(), status)
}

/// Persist the current metadata of a group; scheduler state stays
/// authoritative if the write fails.
fn persist_group(state: &ApiState, group_id: &str) {
    match state.sched.group_meta(group_id) {
        Ok(meta) => {
            if let Err(e) = state.store.put_group(&meta) {
                warn!(group = %group_id, error = %e, "failed to persist group meta");
            }
        }
        Err(e) => warn!(group = %group_id, error = %e, "failed to read group meta"),
    }
}

/// Build the REST router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/jobs", get(list_jobs).post(submit_job))
        .route("/api/v1/jobs/{id}", get(show_job).delete(kill_job))
        .route("/api/v1/jobs/{id}/scale", post(scale_job))
        .route("/api/v1/jobs/{id}/update", post(update_job))
        .route("/api/v1/jobs/{id}/rollback", post(rollback_job))
        .route("/api/v1/jobs/{id}/pause", post(pause_job))
        .route("/api/v1/jobs/{id}/continue", post(continue_job))
        .route("/api/v1/jobs/{id}/cancel", post(cancel_job))
        .route("/api/v1/agents", post(add_agent))
        .route("/api/v1/agents/{endpoint}", get(show_agent).delete(remove_agent))
        .route("/api/v1/agents/{endpoint}/freeze", post(freeze_agent))
        .route("/api/v1/agents/{endpoint}/thaw", post(thaw_agent))
        .route("/api/v1/agents/{endpoint}/tags", post(add_tag).delete(remove_tag))
        .route("/api/v1/agents/{endpoint}/pool", post(set_pool))
        .route("/api/v1/agents/{endpoint}/schedule", post(manual_schedule))
        .route("/api/v1/users/{user}/alloc", get(user_alloc))
        .route("/api/v1/heartbeat", post(heartbeat))
        .with_state(state)
}

// ── Jobs ────────────────────────────────────────────────────────────

/// GET /api/v1/jobs
async fn list_jobs(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.sched.list_container_groups())
}

#[derive(serde::Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    pub replica: i32,
    pub user: String,
    pub manifest: ContainerManifest,
}

/// POST /api/v1/jobs
async fn submit_job(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> axum::response::Response {
    let priority = req.manifest.priority;
    match state
        .sched
        .submit(&req.name, &req.manifest, req.replica, priority, &req.user)
    {
        Ok(group_id) => {
            persist_group(&state, &group_id);
            (
                StatusCode::CREATED,
                ApiResponse::ok(serde_json::json!({ "id": group_id })),
            )
                .into_response()
        }
        Err(e) => sched_error(e),
    }
}

/// GET /api/v1/jobs/{id}
async fn show_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.sched.show_container_group(&id) {
        Ok(containers) => ApiResponse::ok(containers).into_response(),
        Err(e) => sched_error(e),
    }
}

/// DELETE /api/v1/jobs/{id}
async fn kill_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.sched.kill(&id) {
        Ok(()) => {
            persist_group(&state, &id);
            ApiResponse::ok("killed").into_response()
        }
        Err(e) => sched_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct ScaleRequest {
    pub replica: i32,
}

/// POST /api/v1/jobs/{id}/scale
async fn scale_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ScaleRequest>,
) -> axum::response::Response {
    match state.sched.change_replica(&id, req.replica) {
        Ok(()) => {
            persist_group(&state, &id);
            ApiResponse::ok(serde_json::json!({ "replica": req.replica })).into_response()
        }
        Err(e) => sched_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct UpdateRequest {
    pub manifest: ContainerManifest,
    #[serde(default)]
    pub update_interval: i64,
}

/// POST /api/v1/jobs/{id}/update
async fn update_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> axum::response::Response {
    match state.sched.update(&id, &req.manifest, req.update_interval) {
        Ok(outcome) => {
            persist_group(&state, &id);
            ApiResponse::ok(serde_json::json!({
                "version": outcome.version,
                "changed": outcome.changed,
            }))
            .into_response()
        }
        Err(e) => sched_error(e),
    }
}

/// POST /api/v1/jobs/{id}/rollback
async fn rollback_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.sched.rollback(&id) {
        Ok(outcome) => {
            persist_group(&state, &id);
            ApiResponse::ok(serde_json::json!({ "version": outcome.version })).into_response()
        }
        Err(e) => sched_error(e),
    }
}

/// POST /api/v1/jobs/{id}/pause
async fn pause_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.sched.pause_update(&id) {
        Ok(()) => ApiResponse::ok("paused").into_response(),
        Err(e) => sched_error(e),
    }
}

#[derive(serde::Deserialize, Default)]
pub struct ContinueRequest {
    #[serde(default)]
    pub break_count: u32,
}

/// POST /api/v1/jobs/{id}/continue
async fn continue_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<ContinueRequest>,
) -> axum::response::Response {
    match state.sched.continue_update(&id, req.break_count) {
        Ok(()) => ApiResponse::ok("continued").into_response(),
        Err(e) => sched_error(e),
    }
}

/// POST /api/v1/jobs/{id}/cancel
async fn cancel_job(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.sched.cancel_update(&id) {
        Ok(()) => {
            persist_group(&state, &id);
            ApiResponse::ok("cancelled").into_response()
        }
        Err(e) => sched_error(e),
    }
}

// ── Agents ──────────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct AddAgentRequest {
    pub spec: AgentSpec,
    #[serde(default)]
    pub snapshot: AgentSnapshot,
}

/// POST /api/v1/agents
async fn add_agent(
    State(state): State<ApiState>,
    Json(req): Json<AddAgentRequest>,
) -> axum::response::Response {
    let endpoint = req.spec.endpoint.clone();
    state.sched.add_agent(req.spec, &req.snapshot);
    (
        StatusCode::CREATED,
        ApiResponse::ok(serde_json::json!({ "endpoint": endpoint })),
    )
        .into_response()
}

/// GET /api/v1/agents/{endpoint}
async fn show_agent(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
) -> axum::response::Response {
    match (
        state.sched.show_agent_overview(&endpoint),
        state.sched.show_agent(&endpoint),
    ) {
        (Ok(overview), Ok(containers)) => ApiResponse::ok(serde_json::json!({
            "overview": overview,
            "containers": containers,
        }))
        .into_response(),
        (Err(e), _) | (_, Err(e)) => sched_error(e),
    }
}

/// DELETE /api/v1/agents/{endpoint}
async fn remove_agent(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
) -> axum::response::Response {
    state.sched.remove_agent(&endpoint);
    ApiResponse::ok("removed").into_response()
}

/// POST /api/v1/agents/{endpoint}/freeze
async fn freeze_agent(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
) -> axum::response::Response {
    match state.sched.freeze_agent(&endpoint) {
        Ok(()) => ApiResponse::ok("frozen").into_response(),
        Err(e) => sched_error(e),
    }
}

/// POST /api/v1/agents/{endpoint}/thaw
async fn thaw_agent(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
) -> axum::response::Response {
    match state.sched.thaw_agent(&endpoint) {
        Ok(()) => ApiResponse::ok("thawed").into_response(),
        Err(e) => sched_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

/// POST /api/v1/agents/{endpoint}/tags
async fn add_tag(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
    Json(req): Json<TagRequest>,
) -> axum::response::Response {
    match state.sched.add_tag(&endpoint, &req.tag) {
        Ok(()) => ApiResponse::ok("tagged").into_response(),
        Err(e) => sched_error(e),
    }
}

/// DELETE /api/v1/agents/{endpoint}/tags
async fn remove_tag(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
    Json(req): Json<TagRequest>,
) -> axum::response::Response {
    match state.sched.remove_tag(&endpoint, &req.tag) {
        Ok(()) => ApiResponse::ok("untagged").into_response(),
        Err(e) => sched_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct PoolRequest {
    pub pool: String,
}

/// POST /api/v1/agents/{endpoint}/pool
async fn set_pool(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
    Json(req): Json<PoolRequest>,
) -> axum::response::Response {
    match state.sched.set_pool(&endpoint, &req.pool) {
        Ok(()) => ApiResponse::ok("pool set").into_response(),
        Err(e) => sched_error(e),
    }
}

#[derive(serde::Deserialize)]
pub struct ManualScheduleRequest {
    pub group_id: String,
}

/// POST /api/v1/agents/{endpoint}/schedule
async fn manual_schedule(
    State(state): State<ApiState>,
    Path(endpoint): Path<String>,
    Json(req): Json<ManualScheduleRequest>,
) -> axum::response::Response {
    match state.sched.manual_schedule(&endpoint, &req.group_id) {
        Ok(()) => ApiResponse::ok("scheduled").into_response(),
        Err(e) => sched_error(e),
    }
}

// ── Users ───────────────────────────────────────────────────────────

/// GET /api/v1/users/{user}/alloc
async fn user_alloc(
    State(state): State<ApiState>,
    Path(user): Path<String>,
) -> impl IntoResponse {
    ApiResponse::ok(state.sched.show_user_alloc(&user))
}

// ── Heartbeat ───────────────────────────────────────────────────────

/// POST /api/v1/heartbeat
///
/// The agent reports its containers and receives the ordered command
/// list in response.
async fn heartbeat(
    State(state): State<ApiState>,
    Json(snapshot): Json<AgentSnapshot>,
) -> impl IntoResponse {
    let commands = state.sched.make_command(&snapshot.endpoint, &snapshot);
    ApiResponse::ok(commands)
}
