use std::sync::Arc;

use metronome_core::config::EVENTS_CHANNEL;
use metronome_core::types::ExecutionStatus;
use metronome_lock::LockStore;
use serde_json::{json, Value};
use tracing::warn;

/// Publishes lifecycle events on the lock store's pub/sub channel.
///
/// Events are best-effort observability: a failed publish is logged and the
/// execution proceeds unaffected.
pub struct EventPublisher {
    store: Arc<dyn LockStore>,
    enabled: bool,
}

impl EventPublisher {
    pub fn new(store: Arc<dyn LockStore>, enabled: bool) -> Self {
        Self { store, enabled }
    }

    async fn publish(&self, event: Value) {
        if !self.enabled {
            return;
        }
        let payload = event.to_string();
        if let Err(e) = self.store.publish(EVENTS_CHANNEL, &payload).await {
            warn!(error = %e, "event publish failed");
        }
    }

    pub async fn schedule_started(&self, execution_id: &str, schedule_id: &str, agent_name: &str) {
        self.publish(json!({
            "type": "schedule_execution_started",
            "execution_id": execution_id,
            "schedule_id": schedule_id,
            "agent_name": agent_name,
        }))
        .await;
    }

    pub async fn schedule_completed(
        &self,
        execution_id: &str,
        schedule_id: &str,
        status: ExecutionStatus,
        error: Option<&str>,
    ) {
        let mut event = json!({
            "type": "schedule_execution_completed",
            "execution_id": execution_id,
            "schedule_id": schedule_id,
            "status": status.to_string(),
        });
        if let Some(error) = error {
            event["error"] = json!(error);
        }
        self.publish(event).await;
    }

    pub async fn process_started(&self, execution_id: &str, process_schedule_id: &str) {
        self.publish(json!({
            "type": "process_schedule_execution_started",
            "execution_id": execution_id,
            "process_schedule_id": process_schedule_id,
        }))
        .await;
    }

    pub async fn process_completed(
        &self,
        execution_id: &str,
        process_schedule_id: &str,
        status: ExecutionStatus,
        error: Option<&str>,
    ) {
        let mut event = json!({
            "type": "process_schedule_execution_completed",
            "execution_id": execution_id,
            "process_schedule_id": process_schedule_id,
            "status": status.to_string(),
        });
        if let Some(error) = error {
            event["error"] = json!(error);
        }
        self.publish(event).await;
    }
}
