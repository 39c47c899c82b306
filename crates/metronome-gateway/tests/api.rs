// Exercises the control surface: health flip, status shape, manual trigger
// happy path and the 404 contract for unknown schedules.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use metronome_gateway::app::{build_router, AppState};
use metronome_lock::{LockManager, LockStore, MemoryLockStore};
use metronome_scheduler::{
    ActivityRecorder, AgentExecutor, AgentReply, AgentUsage, EventPublisher, SchedulerService,
    ServiceConfig, TriggerEngine, WorkflowExecutor,
};
use metronome_store::{db::init_db, ScheduleStore};
use serde_json::Value;
use tower::ServiceExt;

struct OkAgent;

#[async_trait]
impl AgentExecutor for OkAgent {
    async fn execute(
        &self,
        _agent_name: &str,
        _message: &str,
        _timeout: Duration,
    ) -> metronome_scheduler::Result<AgentReply> {
        Ok(AgentReply {
            response: "ok".to_string(),
            usage: AgentUsage::default(),
        })
    }
}

struct NullWorkflow;

#[async_trait]
impl WorkflowExecutor for NullWorkflow {
    async fn start(
        &self,
        _process_id: &str,
        _triggered_by: &str,
        _input_data: Value,
        _timeout: Duration,
    ) -> metronome_scheduler::Result<String> {
        Ok("wf-0".to_string())
    }
}

struct Api {
    state: Arc<AppState>,
    service: Arc<SchedulerService>,
    seed: rusqlite::Connection,
    db_path: PathBuf,
}

impl Drop for Api {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_path);
    }
}

fn api(test: &str) -> Api {
    let db_path =
        std::env::temp_dir().join(format!("metronome-api-{}-{}.db", test, std::process::id()));
    let _ = std::fs::remove_file(&db_path);

    let seed = rusqlite::Connection::open(&db_path).unwrap();
    seed.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")
        .unwrap();
    init_db(&seed).unwrap();

    let store_conn = rusqlite::Connection::open(&db_path).unwrap();
    store_conn
        .execute_batch("PRAGMA busy_timeout=5000;")
        .unwrap();
    let store = Arc::new(ScheduleStore::new(store_conn));

    let lock_store = Arc::new(MemoryLockStore::new());
    let locks = Arc::new(LockManager::new(
        Arc::clone(&lock_store) as Arc<dyn LockStore>,
        Duration::from_secs(5),
        true,
    ));
    let (fired_tx, _fired_rx) = tokio::sync::mpsc::channel(8);
    let engine = Arc::new(TriggerEngine::new(fired_tx));
    let events = EventPublisher::new(lock_store as Arc<dyn LockStore>, false);

    let service = Arc::new(SchedulerService::new(
        store,
        locks,
        engine,
        Arc::new(OkAgent),
        Arc::new(NullWorkflow),
        ActivityRecorder::new(None),
        events,
        ServiceConfig {
            default_timezone: "UTC".to_string(),
            executor_timeout: Duration::from_secs(10),
            reload_interval: Duration::from_secs(60),
            heartbeat_ttl: Duration::from_secs(5),
            instance_id: "api-test".to_string(),
        },
    ));

    Api {
        state: Arc::new(AppState::new(Arc::clone(&service))),
        service,
        seed,
        db_path,
    }
}

fn seed_schedule(api: &Api, id: &str) {
    let now = Utc::now().to_rfc3339();
    api.seed
        .execute(
            "INSERT INTO agent_schedules
             (id, agent_name, name, cron_expression, message, enabled,
              timezone, created_at, updated_at)
             VALUES (?1, 'atlas', 'daily report', '0 9 * * *', 'go', 1, 'UTC', ?2, ?2)",
            rusqlite::params![id, now],
        )
        .unwrap();
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_unhealthy_until_running() {
    let api = api("health");
    let router = build_router(Arc::clone(&api.state));

    let response = router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["status"], "unhealthy");

    // Initialise and start the run loop; health flips to 200.
    api.service.initialize().unwrap();
    let (_fired_tx, fired_rx) = tokio::sync::mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let service = Arc::clone(&api.service);
    tokio::spawn(async move { service.run(fired_rx, shutdown_rx).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");
}

#[tokio::test]
async fn index_lists_endpoints() {
    let api = api("index");
    let router = build_router(api.state.clone());

    let response = router
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["service"], "metronome-scheduler");
    assert!(body["endpoints"]["trigger"]
        .as_str()
        .unwrap()
        .contains("/api/schedules/"));
}

#[tokio::test]
async fn status_exposes_job_table() {
    let api = api("status");
    seed_schedule(&api, "s1");
    api.service.initialize().unwrap();

    let router = build_router(api.state.clone());
    let response = router
        .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["jobs_count"], 1);
    assert_eq!(body["jobs"][0]["id"], "s1");
    assert_eq!(body["jobs"][0]["name"], "daily report");
    assert!(body["jobs"][0]["next_run"].as_str().is_some());
    assert!(body["uptime_seconds"].as_u64().is_some());
}

#[tokio::test]
async fn manual_trigger_unknown_schedule_is_404() {
    let api = api("trigger404");
    let router = build_router(api.state.clone());

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/schedules/does-not-exist/trigger")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn manual_trigger_returns_immediately_and_executes() {
    let api = api("trigger");
    seed_schedule(&api, "s1");

    let router = build_router(api.state.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/schedules/s1/trigger")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "triggered");
    assert_eq!(body["schedule_id"], "s1");
    assert_eq!(body["schedule_name"], "daily report");
    assert_eq!(body["agent_name"], "atlas");

    // The execution runs in the background; poll for the manual record.
    let mut found = false;
    for _ in 0..50 {
        let count: i64 = api
            .seed
            .query_row(
                "SELECT COUNT(*) FROM schedule_executions
                 WHERE schedule_id = 's1' AND triggered_by = 'manual'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        if count == 1 {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "manual execution record expected");
}
