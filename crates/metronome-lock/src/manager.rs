use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::Result;
use crate::lock::DistributedLock;
use crate::store::LockStore;

/// Factory for per-schedule locks plus scheduler-instance heartbeats.
///
/// Key namespaces: `schedule:{id}` for agent schedules, `process_{id}` for
/// process schedules, `scheduler:heartbeat:{instance}` for liveness markers,
/// kept apart so unrelated uses of the same store never collide.
pub struct LockManager {
    store: Arc<dyn LockStore>,
    default_ttl: Duration,
    auto_renew: bool,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, default_ttl: Duration, auto_renew: bool) -> Self {
        Self {
            store,
            default_ttl,
            auto_renew,
        }
    }

    pub fn store(&self) -> Arc<dyn LockStore> {
        Arc::clone(&self.store)
    }

    /// Pure construction of an agent-schedule lock; no I/O happens here.
    pub fn schedule_lock(
        &self,
        schedule_id: &str,
        ttl: Option<Duration>,
        auto_renew: Option<bool>,
    ) -> DistributedLock {
        DistributedLock::new(
            Arc::clone(&self.store),
            format!("schedule:{schedule_id}"),
            ttl.unwrap_or(self.default_ttl),
            auto_renew.unwrap_or(self.auto_renew),
        )
    }

    /// Pure construction of a process-schedule lock.
    pub fn process_lock(
        &self,
        process_schedule_id: &str,
        ttl: Option<Duration>,
        auto_renew: Option<bool>,
    ) -> DistributedLock {
        DistributedLock::new(
            Arc::clone(&self.store),
            format!("process_{process_schedule_id}"),
            ttl.unwrap_or(self.default_ttl),
            auto_renew.unwrap_or(self.auto_renew),
        )
    }

    /// Construct + non-blocking acquire. `None` means another instance (or
    /// an overlapping manual trigger) already holds the schedule. This is the
    /// primary gate in front of every execution.
    pub async fn try_acquire_schedule_lock(
        &self,
        schedule_id: &str,
    ) -> Result<Option<DistributedLock>> {
        let mut lock = self.schedule_lock(schedule_id, None, None);
        if lock.acquire(false, None).await? {
            Ok(Some(lock))
        } else {
            debug!(schedule_id, "schedule lock contended");
            Ok(None)
        }
    }

    /// Construct + non-blocking acquire for a process schedule.
    pub async fn try_acquire_process_lock(
        &self,
        process_schedule_id: &str,
    ) -> Result<Option<DistributedLock>> {
        let mut lock = self.process_lock(process_schedule_id, None, None);
        if lock.acquire(false, None).await? {
            Ok(Some(lock))
        } else {
            debug!(process_schedule_id, "process lock contended");
            Ok(None)
        }
    }

    /// Existence check for status surfaces. Never a safety decision: only
    /// the atomic result of `try_acquire_schedule_lock` is authoritative;
    /// checking here first and acting on it would be a check-then-act race.
    pub async fn is_schedule_locked(&self, schedule_id: &str) -> Result<bool> {
        self.store
            .exists(&format!("schedule:{schedule_id}"))
            .await
    }

    /// Short-TTL liveness marker per running scheduler instance. Feeds
    /// fleet dashboards; never consulted for execution correctness.
    pub async fn set_heartbeat(&self, instance_id: &str, ttl: Duration) -> Result<()> {
        self.store
            .put(
                &format!("scheduler:heartbeat:{instance_id}"),
                &chrono::Utc::now().to_rfc3339(),
                ttl,
            )
            .await
    }
}
