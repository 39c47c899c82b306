use axum::{
    routing::{get, post},
    Router,
};
use metronome_scheduler::SchedulerService;
use std::sync::Arc;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub service: Arc<SchedulerService>,
}

impl AppState {
    pub fn new(service: Arc<SchedulerService>) -> Self {
        Self { service }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::status::index_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/status", get(crate::http::status::status_handler))
        .route(
            "/api/schedules/{schedule_id}/trigger",
            post(crate::http::trigger::trigger_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
