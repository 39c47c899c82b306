use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use metronome_lock::{LockManager, LockStore, MemoryLockStore, RedisLockStore};
use metronome_scheduler::{
    ActivityRecorder, EventPublisher, HttpAgentExecutor, HttpWorkflowExecutor, SchedulerService,
    ServiceConfig, TriggerEngine,
};
use metronome_store::ScheduleStore;
use metronome_gateway::app;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "metronome=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit METRONOME_CONFIG path > ~/.metronome/metronome.toml
    let config_path = std::env::var("METRONOME_CONFIG").ok();
    let config = metronome_core::MetronomeConfig::load(config_path.as_deref())?;

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    // shared SQLite database; scheduler tables are provisioned idempotently
    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    metronome_store::db::init_db(&db)?;
    info!("database migrations complete");
    let store = Arc::new(ScheduleStore::new(db));

    // lock store: Redis for fleets, in-process for a single instance
    let lock_store: Arc<dyn LockStore> = match config.lock.url {
        Some(ref url) => {
            info!(%url, "connecting to lock store");
            Arc::new(RedisLockStore::connect(url).await?)
        }
        None => {
            warn!("no lock store configured — using in-process locks (single instance only)");
            Arc::new(MemoryLockStore::new())
        }
    };
    let lock_ttl = Duration::from_secs(config.lock.ttl_secs);
    let locks = Arc::new(LockManager::new(
        Arc::clone(&lock_store),
        lock_ttl,
        config.lock.auto_renew,
    ));

    // trigger engine feeds the service over a bounded fire channel
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel(256);
    let engine = Arc::new(TriggerEngine::new(fired_tx));

    let agents = Arc::new(HttpAgentExecutor::new(config.executor.base_url.clone()));
    let workflows = Arc::new(HttpWorkflowExecutor::new(
        config
            .executor
            .workflow_url
            .clone()
            .unwrap_or_else(|| config.executor.base_url.clone()),
    ));
    let activity = ActivityRecorder::new(config.executor.activity_url.clone());
    let events = EventPublisher::new(Arc::clone(&lock_store), config.scheduler.publish_events);

    let instance_id = config
        .scheduler
        .instance_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let service = Arc::new(SchedulerService::new(
        store,
        locks,
        Arc::clone(&engine),
        agents,
        workflows,
        activity,
        events,
        ServiceConfig {
            default_timezone: config.scheduler.timezone.clone(),
            executor_timeout: Duration::from_secs(config.executor.timeout_secs),
            reload_interval: Duration::from_secs(config.scheduler.reload_interval_secs),
            heartbeat_ttl: lock_ttl,
            instance_id,
        },
    ));

    // startup failures here are fatal: a scheduler that cannot
    // read its schedules must not pretend to be healthy
    service.initialize()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    {
        let engine = Arc::clone(&engine);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { engine.run(shutdown).await });
    }
    {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.run(fired_rx, shutdown_rx).await });
    }

    let state = Arc::new(app::AppState::new(service));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("metronome gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // stop the engine and service loops
    let _ = shutdown_tx.send(true);
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
