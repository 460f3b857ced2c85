//! API regression tests.
//!
//! Drive the REST router end to end: submit jobs, manage agents, and
//! exchange heartbeats, with the scheduler and an in-memory store behind.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use corral_core::{
    AgentSnapshot, AgentSpec, CgroupSpec, ContainerManifest, CpuRequired, GroupStatus,
    MemoryRequired, Priority, SchedulerConfig, VolumeInfo, VolumeMedium, VolumeRequired,
};
use corral_scheduler::{Scheduler, TickOutcome};
use corral_state::MetaStore;
use corrald::api::{build_router, ApiState};

fn test_state() -> ApiState {
    let sched = Arc::new(Scheduler::new(SchedulerConfig::default()));
    sched.start();
    ApiState {
        sched,
        store: MetaStore::open_in_memory().unwrap(),
    }
}

fn test_manifest() -> ContainerManifest {
    ContainerManifest {
        version: "ver_1".into(),
        priority: Priority::Service,
        pool_names: ["default".to_string()].into_iter().collect(),
        cgroups: vec![CgroupSpec {
            cpu: CpuRequired {
                millicores: 1000,
                excess: false,
            },
            memory: MemoryRequired {
                size: 1 << 30,
                ..Default::default()
            },
            ..Default::default()
        }],
        workspace_volume: VolumeRequired {
            size: 1 << 30,
            medium: VolumeMedium::Disk,
            dest_path: "/home/work".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn agent_spec(endpoint: &str) -> AgentSpec {
    let mut volumes = BTreeMap::new();
    volumes.insert(
        "/data".to_string(),
        VolumeInfo {
            medium: VolumeMedium::Disk,
            size: 10 << 30,
            exclusive: false,
        },
    );
    AgentSpec {
        endpoint: endpoint.to_string(),
        cpu_millicores: 4000,
        memory_bytes: 8 << 30,
        volumes,
        tags: BTreeSet::new(),
        pool: "default".to_string(),
    }
}

async fn request_json(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn list_jobs_starts_empty() {
    let router = build_router(test_state());
    let (status, body) = request_json(&router, "GET", "/api/v1/jobs", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!([]));
}

#[tokio::test]
async fn submit_creates_job_and_persists_meta() {
    let state = test_state();
    let router = build_router(state.clone());

    let (status, body) = request_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(serde_json::json!({
            "name": "svc",
            "replica": 2,
            "user": "alice",
            "manifest": serde_json::to_value(test_manifest()).unwrap(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let group_id = body["data"]["id"].as_str().unwrap().to_string();
    assert!(group_id.starts_with("job_"));

    let meta = state.store.get_group(&group_id).unwrap().unwrap();
    assert_eq!(meta.name, "svc");
    assert_eq!(meta.replica, 2);
    assert_eq!(meta.status, GroupStatus::Normal);

    let (status, body) = request_json(&router, "GET", &format!("/api/v1/jobs/{group_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn kill_marks_meta_terminated() {
    let state = test_state();
    let router = build_router(state.clone());

    let (_, body) = request_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(serde_json::json!({
            "name": "svc",
            "replica": 1,
            "user": "alice",
            "manifest": serde_json::to_value(test_manifest()).unwrap(),
        })),
    )
    .await;
    let group_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = request_json(&router, "DELETE", &format!("/api/v1/jobs/{group_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let meta = state.store.get_group(&group_id).unwrap().unwrap();
    assert_eq!(meta.status, GroupStatus::Terminated);
}

#[tokio::test]
async fn show_missing_job_is_not_found() {
    let router = build_router(test_state());
    let (status, body) = request_json(&router, "GET", "/api/v1/jobs/job_missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], serde_json::json!(false));
}

#[tokio::test]
async fn scale_validates_replica() {
    let state = test_state();
    let router = build_router(state.clone());
    let (_, body) = request_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(serde_json::json!({
            "name": "svc",
            "replica": 1,
            "user": "alice",
            "manifest": serde_json::to_value(test_manifest()).unwrap(),
        })),
    )
    .await;
    let group_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = request_json(
        &router,
        "POST",
        &format!("/api/v1/jobs/{group_id}/scale"),
        Some(serde_json::json!({ "replica": -2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request_json(
        &router,
        "POST",
        &format!("/api/v1/jobs/{group_id}/scale"),
        Some(serde_json::json!({ "replica": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.store.get_group(&group_id).unwrap().unwrap().replica, 3);
}

#[tokio::test]
async fn heartbeat_flow_returns_create_commands() {
    let state = test_state();
    let router = build_router(state.clone());

    // Register an agent and submit a job.
    let (status, _) = request_json(
        &router,
        "POST",
        "/api/v1/agents",
        Some(serde_json::json!({ "spec": serde_json::to_value(agent_spec("a:7101")).unwrap() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, body) = request_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(serde_json::json!({
            "name": "svc",
            "replica": 1,
            "user": "alice",
            "manifest": serde_json::to_value(test_manifest()).unwrap(),
        })),
    )
    .await;
    let group_id = body["data"]["id"].as_str().unwrap().to_string();

    // One placement tick puts the container on the agent.
    assert_eq!(
        state.sched.schedule_next_agent(""),
        TickOutcome::Visited("a:7101".to_string())
    );

    // The agent's first heartbeat is answered with a create command.
    let snapshot = AgentSnapshot {
        endpoint: "a:7101".into(),
        containers: vec![],
    };
    let (status, body) = request_json(
        &router,
        "POST",
        "/api/v1/heartbeat",
        Some(serde_json::to_value(&snapshot).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let commands = body["data"].as_array().unwrap();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["action"], "create_container");
    assert_eq!(commands[0]["group_id"], serde_json::json!(group_id));
    assert_eq!(
        commands[0]["manifest"]["workspace_volume"]["source_path"],
        serde_json::json!("/data")
    );
}

#[tokio::test]
async fn agent_freeze_and_thaw() {
    let state = test_state();
    let router = build_router(state.clone());
    request_json(
        &router,
        "POST",
        "/api/v1/agents",
        Some(serde_json::json!({ "spec": serde_json::to_value(agent_spec("a:7101")).unwrap() })),
    )
    .await;

    let (status, _) = request_json(&router, "POST", "/api/v1/agents/a:7101/freeze", None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = request_json(&router, "GET", "/api/v1/agents/a:7101", None).await;
    assert_eq!(body["data"]["overview"]["frozen"], serde_json::json!(true));

    let (status, _) = request_json(&router, "POST", "/api/v1/agents/a:7101/thaw", None).await;
    assert_eq!(status, StatusCode::OK);

    // Thawing twice is an error.
    let (status, _) = request_json(&router, "POST", "/api/v1/agents/a:7101/thaw", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_alloc_reports_quota() {
    let state = test_state();
    let router = build_router(state.clone());
    request_json(
        &router,
        "POST",
        "/api/v1/jobs",
        Some(serde_json::json!({
            "name": "svc",
            "replica": 2,
            "user": "alice",
            "manifest": serde_json::to_value(test_manifest()).unwrap(),
        })),
    )
    .await;

    let (status, body) = request_json(&router, "GET", "/api/v1/users/alice/alloc", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["millicores"], serde_json::json!(2000));
    assert_eq!(body["data"]["replica"], serde_json::json!(2));
}
