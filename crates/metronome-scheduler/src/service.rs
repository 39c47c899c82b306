use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metronome_core::config::MAX_RESPONSE_BYTES;
use metronome_core::types::{ExecutionStatus, TriggerSource};
use metronome_lock::LockManager;
use metronome_store::{ExecutionCompletion, Schedule, ScheduleStore};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::cron;
use crate::engine::{FiredJob, JobKind, JobSnapshot, TriggerEngine};
use crate::error::{Result, SchedulerError};
use crate::events::EventPublisher;
use crate::executor::{ActivityRecorder, AgentExecutor, WorkflowExecutor};

/// Settings the service needs at runtime, resolved from the top-level
/// config by the binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// IANA zone applied when a schedule row has none.
    pub default_timezone: String,
    /// Hard cap on one executor call.
    pub executor_timeout: Duration,
    /// Cadence of store re-reads to pick up external schedule edits.
    pub reload_interval: Duration,
    /// TTL of this instance's heartbeat key; refreshed at half this.
    pub heartbeat_ttl: Duration,
    /// Identity written to the heartbeat key.
    pub instance_id: String,
}

/// Outcome of one fire attempt. Contention and gating are expected
/// operational states, not errors; callers log them and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Executed { execution_id: String },
    /// Another instance (or an overlapping manual trigger) holds the lock.
    SkippedContended,
    /// The schedule was disabled between scheduling and firing.
    SkippedDisabled,
    /// The target agent's autonomy flag is off (scheduled fires only).
    SkippedAutonomyOff,
    Failed { reason: String },
}

/// Point-in-time view for the /status endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StatusSnapshot {
    pub running: bool,
    pub jobs_count: usize,
    pub uptime_seconds: u64,
    pub last_check: Option<String>,
    pub jobs: Vec<JobSnapshot>,
}

/// Orchestrates the whole fire path: trigger table, distributed lock,
/// persistence, executor dispatch and lifecycle events.
pub struct SchedulerService {
    store: Arc<ScheduleStore>,
    locks: Arc<LockManager>,
    engine: Arc<TriggerEngine>,
    agents: Arc<dyn AgentExecutor>,
    workflows: Arc<dyn WorkflowExecutor>,
    activity: ActivityRecorder,
    events: EventPublisher,
    config: ServiceConfig,
    initialized: AtomicBool,
    running: AtomicBool,
    started_at: chrono::DateTime<Utc>,
}

impl SchedulerService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<ScheduleStore>,
        locks: Arc<LockManager>,
        engine: Arc<TriggerEngine>,
        agents: Arc<dyn AgentExecutor>,
        workflows: Arc<dyn WorkflowExecutor>,
        activity: ActivityRecorder,
        events: EventPublisher,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            locks,
            engine,
            agents,
            workflows,
            activity,
            events,
            config,
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    /// One-time startup work: sweep executions abandoned by a previous
    /// life of this process, then load the trigger table. Idempotent:
    /// a second call is a no-op.
    pub fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let cutoff =
            Utc::now() - chrono::Duration::seconds(2 * self.config.executor_timeout.as_secs() as i64);
        let swept = self.store.sweep_stale_running(cutoff)?;
        if swept > 0 {
            warn!(count = swept, "abandoned executions failed during startup sweep");
        }

        self.load_schedules()?;
        info!(jobs = self.engine.job_count(), "scheduler service initialised");
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.initialized.load(Ordering::SeqCst) && self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            running: self.running.load(Ordering::SeqCst),
            jobs_count: self.engine.job_count(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            last_check: self.engine.last_tick(),
            jobs: self.engine.snapshots(),
        }
    }

    /// Resolve the target of a manual trigger, or `ScheduleNotFound`.
    pub fn manual_trigger_target(&self, schedule_id: &str) -> Result<Schedule> {
        self.store
            .get_schedule(schedule_id)?
            .ok_or_else(|| SchedulerError::ScheduleNotFound {
                id: schedule_id.to_string(),
            })
    }

    /// Read the trigger table from a fresh store snapshot.
    ///
    /// Each enabled schedule is validated and armed; a malformed cron
    /// expression or timezone rejects that one job with a warning and never
    /// takes the service down. The recomputed next fire time is persisted
    /// so external status views stay accurate.
    fn load_schedules(&self) -> Result<()> {
        let mut agent_jobs = 0usize;
        for schedule in self.store.list_enabled_schedules()? {
            let tz = self.effective_timezone(&schedule.timezone);
            match self.engine.add_job(
                JobKind::Agent,
                &schedule.id,
                &schedule.name,
                &schedule.cron_expression,
                tz,
            ) {
                Ok(next) => {
                    agent_jobs += 1;
                    if let Err(e) = self.store.update_schedule_run_times(
                        &schedule.id,
                        None,
                        Some(&next.to_rfc3339()),
                    ) {
                        warn!(schedule_id = %schedule.id, error = %e, "next_run_at not persisted");
                    }
                }
                Err(e) => {
                    warn!(schedule_id = %schedule.id, error = %e, "schedule rejected, not armed");
                }
            }
        }

        let mut process_jobs = 0usize;
        for schedule in self.store.list_enabled_process_schedules()? {
            let tz = self.effective_timezone(&schedule.timezone);
            match self.engine.add_job(
                JobKind::Process,
                &schedule.id,
                &schedule.name,
                &schedule.cron_expression,
                tz,
            ) {
                Ok(next) => {
                    process_jobs += 1;
                    if let Err(e) = self.store.update_process_schedule_run_times(
                        &schedule.id,
                        None,
                        Some(&next.to_rfc3339()),
                    ) {
                        warn!(process_schedule_id = %schedule.id, error = %e, "next_run_at not persisted");
                    }
                }
                Err(e) => {
                    warn!(process_schedule_id = %schedule.id, error = %e, "process schedule rejected, not armed");
                }
            }
        }

        info!(agent_jobs, process_jobs, "schedules loaded into trigger table");
        Ok(())
    }

    /// Drop every scheduler-owned job and re-read the store. Picks up
    /// schedules created, edited or disabled by the external control
    /// surface without a restart.
    pub fn reload_schedules(&self) -> Result<()> {
        self.engine.remove_scheduler_jobs();
        self.load_schedules()
    }

    /// Main loop: receives fired jobs, spawns one task per execution
    /// (per-schedule serialisation comes from the lock, never from this
    /// loop), reloads on the configured cadence and heartbeats for the
    /// fleet dashboard.
    pub async fn run(
        self: Arc<Self>,
        mut fired_rx: mpsc::Receiver<FiredJob>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        self.running.store(true, Ordering::SeqCst);
        info!(instance_id = %self.config.instance_id, "scheduler service started");

        let mut reload = tokio::time::interval(self.config.reload_interval);
        reload.tick().await; // schedules were already loaded by initialize()

        let heartbeat_every = (self.config.heartbeat_ttl / 2).max(Duration::from_secs(1));
        let mut heartbeat = tokio::time::interval(heartbeat_every);

        loop {
            tokio::select! {
                Some(fired) = fired_rx.recv() => {
                    let service = Arc::clone(&self);
                    tokio::spawn(async move {
                        match fired.kind {
                            JobKind::Agent => {
                                service
                                    .execute_schedule(&fired.schedule_id, TriggerSource::Schedule)
                                    .await;
                            }
                            JobKind::Process => {
                                service
                                    .execute_process_schedule(&fired.schedule_id, TriggerSource::Schedule)
                                    .await;
                            }
                        }
                    });
                }
                _ = reload.tick() => {
                    if let Err(e) = self.reload_schedules() {
                        error!(error = %e, "schedule reload failed");
                    }
                }
                _ = heartbeat.tick() => {
                    if let Err(e) = self
                        .locks
                        .set_heartbeat(&self.config.instance_id, self.config.heartbeat_ttl)
                        .await
                    {
                        // Best-effort: a missed heartbeat never blocks a fire.
                        warn!(error = %e, "heartbeat not written");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler service shutting down");
                        break;
                    }
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    // --- agent-schedule fire path -------------------------------------------

    /// The six-step machine for one agent-schedule fire. The distributed
    /// lock is taken first and released on every path out.
    pub async fn execute_schedule(
        &self,
        schedule_id: &str,
        triggered_by: TriggerSource,
    ) -> FireOutcome {
        let mut lock = match self.locks.try_acquire_schedule_lock(schedule_id).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(schedule_id, "fire skipped: schedule already executing elsewhere");
                return FireOutcome::SkippedContended;
            }
            Err(e) => {
                error!(schedule_id, error = %e, "lock store unavailable, fire aborted");
                return FireOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let outcome = self.fire_agent_schedule(schedule_id, triggered_by).await;

        // Always release: a lock held past its execution would starve
        // every future fire of this schedule until TTL expiry. If this task
        // panics instead, the store-side TTL is the backstop.
        match lock.release().await {
            Ok(true) => {}
            Ok(false) => warn!(schedule_id, "lease was lost before release"),
            Err(e) => warn!(schedule_id, error = %e, "lock release failed, TTL will reclaim"),
        }
        outcome
    }

    async fn fire_agent_schedule(
        &self,
        schedule_id: &str,
        triggered_by: TriggerSource,
    ) -> FireOutcome {
        // Fresh read; the trigger-table copy may predate external edits.
        let schedule = match self.store.get_schedule(schedule_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!(schedule_id, "fired schedule no longer exists");
                return FireOutcome::Failed {
                    reason: format!("schedule {schedule_id} not found"),
                };
            }
            Err(e) => {
                error!(schedule_id, error = %e, "schedule fetch failed");
                return FireOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if !schedule.enabled {
            info!(schedule_id, "fire skipped: schedule disabled");
            return FireOutcome::SkippedDisabled;
        }
        // The autonomy flag gates scheduled firing only; a manual trigger is
        // an explicit operator request.
        if triggered_by == TriggerSource::Schedule {
            match self.store.agent_autonomy_enabled(&schedule.agent_name) {
                Ok(true) => {}
                Ok(false) => {
                    info!(schedule_id, agent = %schedule.agent_name, "fire skipped: agent autonomy off");
                    return FireOutcome::SkippedAutonomyOff;
                }
                Err(e) => {
                    error!(schedule_id, error = %e, "autonomy check failed");
                    return FireOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            }
        }

        let execution = match self
            .store
            .create_execution(&schedule, &schedule.message, triggered_by)
        {
            Ok(e) => e,
            Err(e) => {
                error!(schedule_id, error = %e, "execution record not created");
                return FireOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        self.events
            .schedule_started(&execution.id, &schedule.id, &schedule.agent_name)
            .await;
        self.activity
            .record(
                "schedule_execution_started",
                json!({ "execution_id": execution.id, "schedule_id": schedule.id }),
            )
            .await;

        let timeout = schedule
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.executor_timeout);
        let result = tokio::time::timeout(
            timeout,
            self.agents
                .execute(&schedule.agent_name, &schedule.message, timeout),
        )
        .await;

        let outcome = match result {
            Ok(Ok(reply)) => {
                let completion = ExecutionCompletion {
                    response: Some(truncate_response(reply.response)),
                    error: None,
                    context_used: reply.usage.context_used,
                    context_max: reply.usage.context_max,
                    cost: reply.usage.cost,
                    tool_calls: reply.usage.tool_calls,
                    execution_log: reply.usage.execution_log,
                };
                if let Err(e) = self.store.complete_execution(
                    &execution.id,
                    ExecutionStatus::Success,
                    completion,
                ) {
                    error!(execution_id = %execution.id, error = %e, "terminal update failed");
                }
                self.events
                    .schedule_completed(&execution.id, &schedule.id, ExecutionStatus::Success, None)
                    .await;
                FireOutcome::Executed {
                    execution_id: execution.id.clone(),
                }
            }
            Ok(Err(e)) => {
                self.fail_agent_execution(&execution.id, &schedule.id, e.to_string())
                    .await
            }
            Err(_) => {
                let reason = format!("executor call timed out after {}s", timeout.as_secs());
                self.fail_agent_execution(&execution.id, &schedule.id, reason)
                    .await
            }
        };

        self.bump_schedule_run_times(&schedule);
        self.activity
            .record(
                "schedule_execution_completed",
                json!({ "execution_id": execution.id, "schedule_id": schedule.id }),
            )
            .await;
        outcome
    }

    async fn fail_agent_execution(
        &self,
        execution_id: &str,
        schedule_id: &str,
        reason: String,
    ) -> FireOutcome {
        warn!(execution_id, schedule_id, %reason, "execution failed");
        if let Err(e) = self.store.complete_execution(
            execution_id,
            ExecutionStatus::Failed,
            ExecutionCompletion::failure(reason.clone()),
        ) {
            error!(execution_id, error = %e, "terminal update failed");
        }
        self.events
            .schedule_completed(
                execution_id,
                schedule_id,
                ExecutionStatus::Failed,
                Some(&reason),
            )
            .await;
        FireOutcome::Failed { reason }
    }

    fn bump_schedule_run_times(&self, schedule: &Schedule) {
        let now = Utc::now();
        let tz = self.effective_timezone(&schedule.timezone);
        let next = match cron::next_fire(&schedule.cron_expression, tz, now) {
            Ok(n) => Some(n.to_rfc3339()),
            Err(e) => {
                warn!(schedule_id = %schedule.id, error = %e, "next fire not computable");
                None
            }
        };
        if let Err(e) = self.store.update_schedule_run_times(
            &schedule.id,
            Some(&now.to_rfc3339()),
            next.as_deref(),
        ) {
            warn!(schedule_id = %schedule.id, error = %e, "run times not persisted");
        }
    }

    // --- process-schedule fire path -----------------------------------------

    /// Same machine as the agent path, but dispatch goes to the workflow
    /// API and the foreign execution id is what gets recorded.
    pub async fn execute_process_schedule(
        &self,
        process_schedule_id: &str,
        triggered_by: TriggerSource,
    ) -> FireOutcome {
        let mut lock = match self.locks.try_acquire_process_lock(process_schedule_id).await {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                info!(process_schedule_id, "fire skipped: already executing elsewhere");
                return FireOutcome::SkippedContended;
            }
            Err(e) => {
                error!(process_schedule_id, error = %e, "lock store unavailable, fire aborted");
                return FireOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let outcome = self
            .fire_process_schedule(process_schedule_id, triggered_by)
            .await;

        match lock.release().await {
            Ok(true) => {}
            Ok(false) => warn!(process_schedule_id, "lease was lost before release"),
            Err(e) => warn!(process_schedule_id, error = %e, "lock release failed, TTL will reclaim"),
        }
        outcome
    }

    async fn fire_process_schedule(
        &self,
        process_schedule_id: &str,
        triggered_by: TriggerSource,
    ) -> FireOutcome {
        let schedule = match self.store.get_process_schedule(process_schedule_id) {
            Ok(Some(s)) => s,
            Ok(None) => {
                warn!(process_schedule_id, "fired process schedule no longer exists");
                return FireOutcome::Failed {
                    reason: format!("process schedule {process_schedule_id} not found"),
                };
            }
            Err(e) => {
                error!(process_schedule_id, error = %e, "process schedule fetch failed");
                return FireOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if !schedule.enabled {
            info!(process_schedule_id, "fire skipped: process schedule disabled");
            return FireOutcome::SkippedDisabled;
        }

        let execution = match self.store.create_process_execution(&schedule, triggered_by) {
            Ok(e) => e,
            Err(e) => {
                error!(process_schedule_id, error = %e, "execution record not created");
                return FireOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        self.events
            .process_started(&execution.id, &schedule.id)
            .await;

        let timeout = self.config.executor_timeout;
        let input_data = json!({
            "trigger_id": schedule.trigger_id,
            "schedule_id": schedule.id,
        });
        let result = tokio::time::timeout(
            timeout,
            self.workflows.start(
                &schedule.process_id,
                &triggered_by.to_string(),
                input_data,
                timeout,
            ),
        )
        .await;

        let outcome = match result {
            Ok(Ok(workflow_execution_id)) => {
                if let Err(e) = self.store.complete_process_execution(
                    &execution.id,
                    ExecutionStatus::Success,
                    Some(&workflow_execution_id),
                    None,
                ) {
                    error!(execution_id = %execution.id, error = %e, "terminal update failed");
                }
                self.events
                    .process_completed(&execution.id, &schedule.id, ExecutionStatus::Success, None)
                    .await;
                FireOutcome::Executed {
                    execution_id: execution.id.clone(),
                }
            }
            Ok(Err(e)) => {
                self.fail_process_execution(&execution.id, &schedule.id, e.to_string())
                    .await
            }
            Err(_) => {
                let reason = format!("workflow API call timed out after {}s", timeout.as_secs());
                self.fail_process_execution(&execution.id, &schedule.id, reason)
                    .await
            }
        };

        let now = Utc::now();
        let tz = self.effective_timezone(&schedule.timezone);
        let next = cron::next_fire(&schedule.cron_expression, tz, now)
            .map(|n| n.to_rfc3339())
            .ok();
        if let Err(e) = self.store.update_process_schedule_run_times(
            &schedule.id,
            Some(&now.to_rfc3339()),
            next.as_deref(),
        ) {
            warn!(process_schedule_id = %schedule.id, error = %e, "run times not persisted");
        }
        outcome
    }

    async fn fail_process_execution(
        &self,
        execution_id: &str,
        process_schedule_id: &str,
        reason: String,
    ) -> FireOutcome {
        warn!(execution_id, process_schedule_id, %reason, "process execution failed");
        if let Err(e) = self.store.complete_process_execution(
            execution_id,
            ExecutionStatus::Failed,
            None,
            Some(&reason),
        ) {
            error!(execution_id, error = %e, "terminal update failed");
        }
        self.events
            .process_completed(
                execution_id,
                process_schedule_id,
                ExecutionStatus::Failed,
                Some(&reason),
            )
            .await;
        FireOutcome::Failed { reason }
    }

    fn effective_timezone<'a>(&'a self, timezone: &'a str) -> &'a str {
        if timezone.is_empty() {
            &self.config.default_timezone
        } else {
            timezone
        }
    }
}

/// Bound stored response text; executor output can be arbitrarily large.
fn truncate_response(mut response: String) -> String {
    if response.len() > MAX_RESPONSE_BYTES {
        let mut cut = MAX_RESPONSE_BYTES;
        while !response.is_char_boundary(cut) {
            cut -= 1;
        }
        response.truncate(cut);
        response.push_str("\n[truncated]");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_caps_large_responses() {
        let big = "x".repeat(MAX_RESPONSE_BYTES + 500);
        let capped = truncate_response(big);
        assert!(capped.len() <= MAX_RESPONSE_BYTES + "\n[truncated]".len());
        assert!(capped.ends_with("[truncated]"));

        let small = truncate_response("hello".to_string());
        assert_eq!(small, "hello");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        // Multi-byte characters straddling the cap must not split.
        let big = "é".repeat(MAX_RESPONSE_BYTES); // 2 bytes each
        let capped = truncate_response(big);
        assert!(capped.ends_with("[truncated]"));
    }
}
