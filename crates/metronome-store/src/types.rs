use metronome_core::types::{ExecutionStatus, TriggerSource};
use serde::{Deserialize, Serialize};

/// A persisted agent-schedule definition.
///
/// Created and edited by the platform's CRUD surface; the scheduler reads
/// these and writes back only `last_run_at` / `next_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// UUID string, primary key.
    pub id: String,
    /// Target agent, resolved by the executor.
    pub agent_name: String,
    /// Human-readable label.
    pub name: String,
    /// 5-field cron expression: minute hour day month day-of-week.
    pub cron_expression: String,
    /// Opaque payload handed to the executor at fire time.
    pub message: String,
    pub enabled: bool,
    /// IANA zone the cron expression is evaluated in.
    pub timezone: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// ISO-8601 instant of the most recent fire, if any.
    pub last_run_at: Option<String>,
    /// Next fire time consistent with cron_expression and timezone as of
    /// the last (re)computation.
    pub next_run_at: Option<String>,
    /// Per-schedule executor timeout override. Newer column, absent on
    /// older platform databases, so hydration defaults it.
    pub timeout_secs: Option<u64>,
}

/// One concrete attempt to run a schedule's payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleExecution {
    pub id: String,
    pub schedule_id: String,
    pub agent_name: String,
    pub status: ExecutionStatus,
    pub started_at: String,
    /// Set together with `duration_ms`, exactly once, on the terminal update.
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
    /// The payload actually sent.
    pub message: String,
    pub response: Option<String>,
    pub error: Option<String>,
    pub triggered_by: TriggerSource,
    // Observability extras reported by the executor. Newer columns, read
    // defensively, default to None when absent.
    pub context_used: Option<i64>,
    pub context_max: Option<i64>,
    pub cost: Option<f64>,
    pub tool_calls: Option<i64>,
    pub execution_log: Option<String>,
}

/// A schedule whose payload identifies a workflow definition and trigger
/// rather than a free-text message. (process_id, trigger_id) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSchedule {
    pub id: String,
    pub process_id: String,
    pub trigger_id: String,
    pub name: String,
    pub cron_expression: String,
    pub enabled: bool,
    pub timezone: String,
    pub created_at: String,
    pub updated_at: String,
    pub last_run_at: Option<String>,
    pub next_run_at: Option<String>,
}

/// One attempt to start a workflow from a process schedule. Completion is
/// the foreign execution identifier returned by the workflow API, not a
/// response text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessScheduleExecution {
    pub id: String,
    pub process_schedule_id: String,
    pub process_id: String,
    pub status: ExecutionStatus,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
    /// Identifier assigned by the external workflow-execution API.
    pub workflow_execution_id: Option<String>,
    pub error: Option<String>,
    pub triggered_by: TriggerSource,
}

/// Everything a terminal update carries. `duration_ms` is derived by the
/// store from the stored `started_at`, never passed in.
#[derive(Debug, Clone, Default)]
pub struct ExecutionCompletion {
    pub response: Option<String>,
    pub error: Option<String>,
    pub context_used: Option<i64>,
    pub context_max: Option<i64>,
    pub cost: Option<f64>,
    pub tool_calls: Option<i64>,
    pub execution_log: Option<String>,
}

impl ExecutionCompletion {
    pub fn success(response: String) -> Self {
        Self {
            response: Some(response),
            ..Self::default()
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}
