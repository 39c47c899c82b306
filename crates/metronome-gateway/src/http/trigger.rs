use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use metronome_core::types::TriggerSource;
use metronome_scheduler::SchedulerError;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;

/// POST /api/schedules/{schedule_id}/trigger — manual fire.
///
/// Validates the schedule exists (404 otherwise), launches the execution in
/// the background under the same locked path as a cron fire, and returns
/// immediately. Callers observe completion via the execution record or the
/// published events, never via this endpoint.
pub async fn trigger_handler(
    State(state): State<Arc<AppState>>,
    Path(schedule_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let schedule = match state.service.manual_trigger_target(&schedule_id) {
        Ok(schedule) => schedule,
        Err(SchedulerError::ScheduleNotFound { .. }) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("schedule {schedule_id} not found") })),
            );
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    info!(schedule_id = %schedule_id, schedule_name = %schedule.name, "manual trigger accepted");

    let service = Arc::clone(&state.service);
    let background_id = schedule_id.clone();
    tokio::spawn(async move {
        service
            .execute_schedule(&background_id, TriggerSource::Manual)
            .await;
    });

    (
        StatusCode::OK,
        Json(json!({
            "status": "triggered",
            "schedule_id": schedule_id,
            "schedule_name": schedule.name,
            "agent_name": schedule.agent_name,
            "message": format!("schedule '{}' launched in background", schedule.name),
        })),
    )
}
