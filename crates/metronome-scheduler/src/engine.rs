use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::cron;
use crate::error::Result;

/// Which execution path a job fires into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Agent,
    Process,
}

/// One entry in the in-process trigger table.
#[derive(Debug, Clone)]
struct TriggerJob {
    /// Bare schedule id (the table key carries the namespace).
    schedule_id: String,
    name: String,
    kind: JobKind,
    cron_expression: String,
    timezone: String,
    next_fire: DateTime<Utc>,
}

/// A due job handed from the tick loop to the service.
#[derive(Debug, Clone)]
pub struct FiredJob {
    pub schedule_id: String,
    pub kind: JobKind,
}

/// Read-only view of one job for the /status surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct JobSnapshot {
    pub id: String,
    pub name: String,
    pub next_run: String,
}

/// In-process trigger table: job id → (parsed cron, next fire time).
///
/// Jobs are keyed `schedule:{id}` / `process_{id}`, the same namespaces as
/// the distributed-lock keys — and can be added, removed or wholesale
/// reloaded at runtime without restarting the process. Fired jobs are sent
/// through `fired_tx` with `try_send`, so the tick loop is never stalled by
/// a slow consumer.
pub struct TriggerEngine {
    jobs: Mutex<HashMap<String, TriggerJob>>,
    fired_tx: mpsc::Sender<FiredJob>,
    /// RFC 3339 of the most recent tick, surfaced as /status last_check.
    last_tick: Mutex<Option<String>>,
}

impl TriggerEngine {
    pub fn new(fired_tx: mpsc::Sender<FiredJob>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            fired_tx,
            last_tick: Mutex::new(None),
        }
    }

    fn table_key(kind: JobKind, schedule_id: &str) -> String {
        match kind {
            JobKind::Agent => format!("schedule:{schedule_id}"),
            JobKind::Process => format!("process_{schedule_id}"),
        }
    }

    /// Add (or replace) a job. Rejects malformed cron expressions and
    /// unknown timezones; the caller logs and moves on, the rest of the
    /// table keeps ticking.
    pub fn add_job(
        &self,
        kind: JobKind,
        schedule_id: &str,
        name: &str,
        cron_expression: &str,
        timezone: &str,
    ) -> Result<DateTime<Utc>> {
        let next_fire = cron::next_fire(cron_expression, timezone, Utc::now())?;
        let key = Self::table_key(kind, schedule_id);
        let mut jobs = self.jobs.lock().unwrap();
        jobs.insert(
            key,
            TriggerJob {
                schedule_id: schedule_id.to_string(),
                name: name.to_string(),
                kind,
                cron_expression: cron_expression.to_string(),
                timezone: timezone.to_string(),
                next_fire,
            },
        );
        Ok(next_fire)
    }

    /// Remove a single job. Returns whether it existed.
    pub fn remove_job(&self, kind: JobKind, schedule_id: &str) -> bool {
        let key = Self::table_key(kind, schedule_id);
        self.jobs.lock().unwrap().remove(&key).is_some()
    }

    /// Remove every scheduler-owned job (both the agent- and the
    /// process-schedule namespace) ahead of a reload.
    pub fn remove_scheduler_jobs(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        let before = jobs.len();
        jobs.retain(|key, _| {
            !(key.starts_with("schedule:") || key.starts_with("process_"))
        });
        let removed = before - jobs.len();
        if removed > 0 {
            info!(count = removed, "trigger jobs removed for reload");
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Job list for the status endpoint, soonest fire first.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.lock().unwrap();
        let mut entries: Vec<_> = jobs.values().collect();
        entries.sort_by_key(|j| j.next_fire);
        entries
            .iter()
            .map(|j| JobSnapshot {
                id: j.schedule_id.clone(),
                name: j.name.clone(),
                next_run: j.next_fire.to_rfc3339(),
            })
            .collect()
    }

    pub fn last_tick(&self) -> Option<String> {
        self.last_tick.lock().unwrap().clone()
    }

    /// Collect every job due at `now`, advancing each one's next fire time.
    /// A job whose expression stops yielding fire times is dropped with a
    /// warning rather than wedging the table.
    fn due_jobs(&self, now: DateTime<Utc>) -> Vec<FiredJob> {
        let mut jobs = self.jobs.lock().unwrap();
        let mut due = Vec::new();
        let mut dead = Vec::new();

        for (key, job) in jobs.iter_mut() {
            if job.next_fire > now {
                continue;
            }
            due.push(FiredJob {
                schedule_id: job.schedule_id.clone(),
                kind: job.kind,
            });
            match cron::next_fire(&job.cron_expression, &job.timezone, now) {
                Ok(next) => job.next_fire = next,
                Err(e) => {
                    warn!(job = %key, error = %e, "no further fire times, removing job");
                    dead.push(key.clone());
                }
            }
        }
        for key in dead {
            jobs.remove(&key);
        }
        due
    }

    /// Tick loop. Polls every second until `shutdown` broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("trigger engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Utc::now();
                    *self.last_tick.lock().unwrap() = Some(now.to_rfc3339());
                    for fired in self.due_jobs(now) {
                        info!(schedule_id = %fired.schedule_id, "trigger fired");
                        // try_send never blocks the tick loop; a full channel
                        // drops the fire with a warning.
                        if self.fired_tx.try_send(fired.clone()).is_err() {
                            warn!(schedule_id = %fired.schedule_id, "fire channel full or closed — fire dropped");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("trigger engine shutting down");
                        break;
                    }
                }
            }
        }
    }
}
