use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;
use metronome_scheduler::StatusSnapshot;

/// GET / — service identity and endpoint map.
pub async fn index_handler() -> Json<Value> {
    Json(json!({
        "service": "metronome-scheduler",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "status": "GET /status",
            "trigger": "POST /api/schedules/{schedule_id}/trigger",
        },
    }))
}

/// GET /status — run state, job table and next-fire times.
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusSnapshot> {
    Json(state.service.status())
}
