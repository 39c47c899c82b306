use std::sync::Mutex;

use chrono::{DateTime, Utc};
use metronome_core::types::{ExecutionStatus, TriggerSource};
use rusqlite::{Connection, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::types::{
    ExecutionCompletion, ProcessSchedule, ProcessScheduleExecution, Schedule, ScheduleExecution,
};

/// Thread-safe persistence boundary for schedules and executions.
///
/// Wraps a single SQLite connection in a `Mutex`; every call takes the lock,
/// runs one short statement, and releases. The database file is shared with
/// the rest of the platform, so nothing here holds a long transaction.
pub struct ScheduleStore {
    db: Mutex<Connection>,
}

impl ScheduleStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    // --- agent schedules ---------------------------------------------------

    /// All schedules regardless of enabled state; reload uses this to
    /// detect external enable/disable drift.
    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT * FROM agent_schedules ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_schedule)?;
        Ok(rows.filter_map(log_bad_row).collect())
    }

    pub fn list_enabled_schedules(&self) -> Result<Vec<Schedule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT * FROM agent_schedules WHERE enabled = 1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_schedule)?;
        Ok(rows.filter_map(log_bad_row).collect())
    }

    pub fn list_schedules_for_agent(&self, agent_name: &str) -> Result<Vec<Schedule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT * FROM agent_schedules WHERE agent_name = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([agent_name], row_to_schedule)?;
        Ok(rows.filter_map(log_bad_row).collect())
    }

    pub fn get_schedule(&self, id: &str) -> Result<Option<Schedule>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT * FROM agent_schedules WHERE id = ?1",
            [id],
            row_to_schedule,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// The second gate beyond `enabled`: scheduled fires also require the
    /// target agent's autonomy flag. An unknown agent counts as off.
    pub fn agent_autonomy_enabled(&self, agent_name: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT autonomous_enabled FROM agents WHERE name = ?1",
            [agent_name],
            |row| row.get::<_, bool>(0),
        ) {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                debug!(agent_name, "no agent row, autonomy treated as off");
                Ok(false)
            }
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    /// Persist fire bookkeeping so external status views stay accurate
    /// between fires.
    pub fn update_schedule_run_times(
        &self,
        id: &str,
        last_run_at: Option<&str>,
        next_run_at: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let changed = db.execute(
            "UPDATE agent_schedules
             SET last_run_at = COALESCE(?1, last_run_at),
                 next_run_at = ?2,
                 updated_at  = ?3
             WHERE id = ?4",
            rusqlite::params![last_run_at, next_run_at, now, id],
        )?;
        if changed == 0 {
            return Err(StoreError::ScheduleNotFound { id: id.to_string() });
        }
        Ok(())
    }

    // --- executions --------------------------------------------------------

    /// Create an execution record in `running`, generating its id.
    pub fn create_execution(
        &self,
        schedule: &Schedule,
        message: &str,
        triggered_by: TriggerSource,
    ) -> Result<ScheduleExecution> {
        let id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO schedule_executions
             (id, schedule_id, agent_name, status, started_at, message, triggered_by)
             VALUES (?1, ?2, ?3, 'running', ?4, ?5, ?6)",
            rusqlite::params![
                id,
                schedule.id,
                schedule.agent_name,
                started_at,
                message,
                triggered_by.to_string()
            ],
        )?;
        info!(execution_id = %id, schedule_id = %schedule.id, %triggered_by, "execution created");

        Ok(ScheduleExecution {
            id,
            schedule_id: schedule.id.clone(),
            agent_name: schedule.agent_name.clone(),
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            duration_ms: None,
            message: message.to_string(),
            response: None,
            error: None,
            triggered_by,
            context_used: None,
            context_max: None,
            cost: None,
            tool_calls: None,
            execution_log: None,
        })
    }

    /// The single terminal update: sets status, completed_at and the derived
    /// duration together, exactly once. A second call (or a call for an
    /// unknown id) fails with `ExecutionNotRunning`.
    pub fn complete_execution(
        &self,
        id: &str,
        status: ExecutionStatus,
        completion: ExecutionCompletion,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTerminalStatus {
                status: status.to_string(),
            });
        }

        let db = self.db.lock().unwrap();
        let started_at: String = db
            .query_row(
                "SELECT started_at FROM schedule_executions
                 WHERE id = ?1 AND status = 'running'",
                [id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::ExecutionNotRunning {
                    id: id.to_string(),
                },
                other => StoreError::Database(other),
            })?;

        let now = Utc::now();
        let duration_ms = duration_since(&started_at, now);
        let changed = db.execute(
            "UPDATE schedule_executions
             SET status = ?1, completed_at = ?2, duration_ms = ?3,
                 response = ?4, error = ?5,
                 context_used = ?6, context_max = ?7, cost = ?8,
                 tool_calls = ?9, execution_log = ?10
             WHERE id = ?11 AND status = 'running'",
            rusqlite::params![
                status.to_string(),
                now.to_rfc3339(),
                duration_ms,
                completion.response,
                completion.error,
                completion.context_used,
                completion.context_max,
                completion.cost,
                completion.tool_calls,
                completion.execution_log,
                id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::ExecutionNotRunning { id: id.to_string() });
        }
        info!(execution_id = %id, %status, duration_ms, "execution completed");
        Ok(())
    }

    pub fn get_execution(&self, id: &str) -> Result<Option<ScheduleExecution>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT * FROM schedule_executions WHERE id = ?1",
            [id],
            row_to_execution,
        ) {
            Ok(e) => Ok(Some(e)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    // --- process schedules -------------------------------------------------

    pub fn list_process_schedules(&self) -> Result<Vec<ProcessSchedule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT * FROM process_schedules ORDER BY created_at")?;
        let rows = stmt.query_map([], row_to_process_schedule)?;
        Ok(rows.filter_map(log_bad_row).collect())
    }

    pub fn list_enabled_process_schedules(&self) -> Result<Vec<ProcessSchedule>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT * FROM process_schedules WHERE enabled = 1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_process_schedule)?;
        Ok(rows.filter_map(log_bad_row).collect())
    }

    pub fn get_process_schedule(&self, id: &str) -> Result<Option<ProcessSchedule>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT * FROM process_schedules WHERE id = ?1",
            [id],
            row_to_process_schedule,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    pub fn update_process_schedule_run_times(
        &self,
        id: &str,
        last_run_at: Option<&str>,
        next_run_at: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let changed = db.execute(
            "UPDATE process_schedules
             SET last_run_at = COALESCE(?1, last_run_at),
                 next_run_at = ?2,
                 updated_at  = ?3
             WHERE id = ?4",
            rusqlite::params![last_run_at, next_run_at, now, id],
        )?;
        if changed == 0 {
            return Err(StoreError::ScheduleNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn create_process_execution(
        &self,
        schedule: &ProcessSchedule,
        triggered_by: TriggerSource,
    ) -> Result<ProcessScheduleExecution> {
        let id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO process_schedule_executions
             (id, process_schedule_id, process_id, status, started_at, triggered_by)
             VALUES (?1, ?2, ?3, 'running', ?4, ?5)",
            rusqlite::params![
                id,
                schedule.id,
                schedule.process_id,
                started_at,
                triggered_by.to_string()
            ],
        )?;
        info!(execution_id = %id, process_schedule_id = %schedule.id, %triggered_by, "process execution created");

        Ok(ProcessScheduleExecution {
            id,
            process_schedule_id: schedule.id.clone(),
            process_id: schedule.process_id.clone(),
            status: ExecutionStatus::Running,
            started_at,
            completed_at: None,
            duration_ms: None,
            workflow_execution_id: None,
            error: None,
            triggered_by,
        })
    }

    pub fn complete_process_execution(
        &self,
        id: &str,
        status: ExecutionStatus,
        workflow_execution_id: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        if !status.is_terminal() {
            return Err(StoreError::InvalidTerminalStatus {
                status: status.to_string(),
            });
        }

        let db = self.db.lock().unwrap();
        let started_at: String = db
            .query_row(
                "SELECT started_at FROM process_schedule_executions
                 WHERE id = ?1 AND status = 'running'",
                [id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::ExecutionNotRunning {
                    id: id.to_string(),
                },
                other => StoreError::Database(other),
            })?;

        let now = Utc::now();
        let duration_ms = duration_since(&started_at, now);
        let changed = db.execute(
            "UPDATE process_schedule_executions
             SET status = ?1, completed_at = ?2, duration_ms = ?3,
                 workflow_execution_id = ?4, error = ?5
             WHERE id = ?6 AND status = 'running'",
            rusqlite::params![
                status.to_string(),
                now.to_rfc3339(),
                duration_ms,
                workflow_execution_id,
                error,
                id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::ExecutionNotRunning { id: id.to_string() });
        }
        info!(execution_id = %id, %status, duration_ms, "process execution completed");
        Ok(())
    }

    pub fn get_process_execution(&self, id: &str) -> Result<Option<ProcessScheduleExecution>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT * FROM process_schedule_executions WHERE id = ?1",
            [id],
            row_to_process_execution,
        ) {
            Ok(e) => Ok(Some(e)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Database(e)),
        }
    }

    // --- recovery ----------------------------------------------------------

    /// Sweep `running` rows abandoned by a crashed scheduler to `failed`.
    ///
    /// The lock's TTL frees the *next* fire on its own, but a row stuck in
    /// `running` would otherwise sit there forever. Run once at startup with
    /// a cutoff comfortably past the executor timeout.
    pub fn sweep_stale_running(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = older_than.to_rfc3339();
        let mut swept = 0usize;

        let stale: Vec<String> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT id FROM schedule_executions
                 WHERE status = 'running' AND started_at < ?1",
            )?;
            let ids = stmt
                .query_map([&cutoff], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect();
            ids
        };
        for id in stale {
            self.complete_execution(
                &id,
                ExecutionStatus::Failed,
                ExecutionCompletion::failure(
                    "abandoned: scheduler restarted before completion".to_string(),
                ),
            )?;
            swept += 1;
        }

        let stale_process: Vec<String> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT id FROM process_schedule_executions
                 WHERE status = 'running' AND started_at < ?1",
            )?;
            let ids = stmt
                .query_map([&cutoff], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect();
            ids
        };
        for id in stale_process {
            self.complete_process_execution(
                &id,
                ExecutionStatus::Failed,
                None,
                Some("abandoned: scheduler restarted before completion"),
            )?;
            swept += 1;
        }

        if swept > 0 {
            warn!(count = swept, "stale running executions swept to failed");
        }
        Ok(swept)
    }
}

/// Milliseconds between a stored RFC 3339 start and `now`, clamped to ≥ 0.
fn duration_since(started_at: &str, now: DateTime<Utc>) -> i64 {
    DateTime::parse_from_rfc3339(started_at)
        .map(|s| (now - s.with_timezone(&Utc)).num_milliseconds().max(0))
        .unwrap_or(0)
}

/// Log and drop rows that fail to decode instead of failing the whole list.
fn log_bad_row<T>(row: rusqlite::Result<T>) -> Option<T> {
    match row {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("dropping undecodable row: {e}");
            None
        }
    }
}

/// Defensive read for schema-evolution columns: absent column, wrong type
/// and NULL all decode to `None`. Required columns never go through this.
fn opt_column<T: rusqlite::types::FromSql>(row: &Row<'_>, name: &str) -> Option<T> {
    row.get::<_, Option<T>>(name).ok().flatten()
}

fn parse_status(raw: String) -> rusqlite::Result<ExecutionStatus> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })
}

fn parse_trigger(raw: String) -> rusqlite::Result<TriggerSource> {
    raw.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
    })
}

/// Map a SQLite row to a `Schedule`. Statements use `SELECT *` so these
/// name-indexed reads keep working as the platform adds columns.
fn row_to_schedule(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get("id")?,
        agent_name: row.get("agent_name")?,
        name: row.get("name")?,
        cron_expression: row.get("cron_expression")?,
        message: row.get("message")?,
        enabled: row.get("enabled")?,
        timezone: opt_column(row, "timezone").unwrap_or_else(|| "UTC".to_string()),
        description: opt_column(row, "description"),
        created_by: opt_column(row, "created_by"),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        last_run_at: opt_column(row, "last_run_at"),
        next_run_at: opt_column(row, "next_run_at"),
        timeout_secs: opt_column(row, "timeout_secs"),
    })
}

fn row_to_execution(row: &Row<'_>) -> rusqlite::Result<ScheduleExecution> {
    Ok(ScheduleExecution {
        id: row.get("id")?,
        schedule_id: row.get("schedule_id")?,
        agent_name: row.get("agent_name")?,
        status: parse_status(row.get("status")?)?,
        started_at: row.get("started_at")?,
        completed_at: opt_column(row, "completed_at"),
        duration_ms: opt_column(row, "duration_ms"),
        message: row.get("message")?,
        response: opt_column(row, "response"),
        error: opt_column(row, "error"),
        triggered_by: parse_trigger(row.get("triggered_by")?)?,
        context_used: opt_column(row, "context_used"),
        context_max: opt_column(row, "context_max"),
        cost: opt_column(row, "cost"),
        tool_calls: opt_column(row, "tool_calls"),
        execution_log: opt_column(row, "execution_log"),
    })
}

fn row_to_process_schedule(row: &Row<'_>) -> rusqlite::Result<ProcessSchedule> {
    Ok(ProcessSchedule {
        id: row.get("id")?,
        process_id: row.get("process_id")?,
        trigger_id: row.get("trigger_id")?,
        name: row.get("name")?,
        cron_expression: row.get("cron_expression")?,
        enabled: row.get("enabled")?,
        timezone: opt_column(row, "timezone").unwrap_or_else(|| "UTC".to_string()),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        last_run_at: opt_column(row, "last_run_at"),
        next_run_at: opt_column(row, "next_run_at"),
    })
}

fn row_to_process_execution(row: &Row<'_>) -> rusqlite::Result<ProcessScheduleExecution> {
    Ok(ProcessScheduleExecution {
        id: row.get("id")?,
        process_schedule_id: row.get("process_schedule_id")?,
        process_id: row.get("process_id")?,
        status: parse_status(row.get("status")?)?,
        started_at: row.get("started_at")?,
        completed_at: opt_column(row, "completed_at"),
        duration_ms: opt_column(row, "duration_ms"),
        workflow_execution_id: opt_column(row, "workflow_execution_id"),
        error: opt_column(row, "error"),
        triggered_by: parse_trigger(row.get("triggered_by")?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn open_store() -> ScheduleStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        ScheduleStore::new(conn)
    }

    fn seed_schedule(store: &ScheduleStore, id: &str, agent: &str, enabled: bool) -> Schedule {
        let now = Utc::now().to_rfc3339();
        {
            let db = store.db.lock().unwrap();
            db.execute(
                "INSERT INTO agent_schedules
                 (id, agent_name, name, cron_expression, message, enabled,
                  timezone, created_at, updated_at)
                 VALUES (?1, ?2, ?3, '0 9 * * *', 'daily report', ?4, 'UTC', ?5, ?5)",
                rusqlite::params![id, agent, format!("sched-{id}"), enabled, now],
            )
            .unwrap();
        }
        store.get_schedule(id).unwrap().unwrap()
    }

    fn seed_process_schedule(store: &ScheduleStore, id: &str) -> ProcessSchedule {
        let now = Utc::now().to_rfc3339();
        {
            let db = store.db.lock().unwrap();
            db.execute(
                "INSERT INTO process_schedules
                 (id, process_id, trigger_id, name, cron_expression, enabled,
                  timezone, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, '*/5 * * * *', 1, 'UTC', ?5, ?5)",
                rusqlite::params![id, format!("proc-{id}"), format!("trig-{id}"), format!("ps-{id}"), now],
            )
            .unwrap();
        }
        store.get_process_schedule(id).unwrap().unwrap()
    }

    #[test]
    fn provisioning_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let store = ScheduleStore::new(conn);
        seed_schedule(&store, "s1", "atlas", true);
        assert_eq!(store.list_enabled_schedules().unwrap().len(), 1);
    }

    #[test]
    fn enabled_filter_and_agent_filter() {
        let store = open_store();
        seed_schedule(&store, "s1", "atlas", true);
        seed_schedule(&store, "s2", "atlas", false);
        seed_schedule(&store, "s3", "borealis", true);

        assert_eq!(store.list_schedules().unwrap().len(), 3);
        assert_eq!(store.list_enabled_schedules().unwrap().len(), 2);
        assert_eq!(store.list_schedules_for_agent("atlas").unwrap().len(), 2);
    }

    #[test]
    fn terminal_update_happens_exactly_once() {
        let store = open_store();
        let schedule = seed_schedule(&store, "s1", "atlas", true);

        let execution = store
            .create_execution(&schedule, "daily report", TriggerSource::Schedule)
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.completed_at.is_none());

        store
            .complete_execution(
                &execution.id,
                ExecutionStatus::Success,
                ExecutionCompletion::success("ok".to_string()),
            )
            .unwrap();

        let done = store.get_execution(&execution.id).unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Success);
        assert!(done.completed_at.is_some());
        assert!(done.duration_ms.unwrap() >= 0);
        assert_eq!(done.response.as_deref(), Some("ok"));

        // Second terminal update must be rejected.
        let again = store.complete_execution(
            &execution.id,
            ExecutionStatus::Failed,
            ExecutionCompletion::failure("late".to_string()),
        );
        assert!(matches!(again, Err(StoreError::ExecutionNotRunning { .. })));
    }

    #[test]
    fn completing_with_running_status_is_rejected() {
        let store = open_store();
        let schedule = seed_schedule(&store, "s1", "atlas", true);
        let execution = store
            .create_execution(&schedule, "m", TriggerSource::Manual)
            .unwrap();

        let res = store.complete_execution(
            &execution.id,
            ExecutionStatus::Running,
            ExecutionCompletion::default(),
        );
        assert!(matches!(res, Err(StoreError::InvalidTerminalStatus { .. })));
    }

    #[test]
    fn autonomy_gate_defaults_off() {
        let store = open_store();
        assert!(!store.agent_autonomy_enabled("ghost").unwrap());

        {
            let db = store.db.lock().unwrap();
            db.execute(
                "INSERT INTO agents (name, autonomous_enabled) VALUES ('atlas', 1)",
                [],
            )
            .unwrap();
        }
        assert!(store.agent_autonomy_enabled("atlas").unwrap());
    }

    #[test]
    fn run_time_update_requires_existing_schedule() {
        let store = open_store();
        let res = store.update_schedule_run_times("nope", None, Some("2026-01-01T00:00:00Z"));
        assert!(matches!(res, Err(StoreError::ScheduleNotFound { .. })));
    }

    #[test]
    fn sweep_fails_abandoned_running_rows() {
        let store = open_store();
        let schedule = seed_schedule(&store, "s1", "atlas", true);

        let stale = store
            .create_execution(&schedule, "m", TriggerSource::Schedule)
            .unwrap();
        let fresh = store
            .create_execution(&schedule, "m", TriggerSource::Schedule)
            .unwrap();

        // Backdate the first one past any reasonable cutoff.
        {
            let db = store.db.lock().unwrap();
            db.execute(
                "UPDATE schedule_executions SET started_at = ?1 WHERE id = ?2",
                rusqlite::params![
                    (Utc::now() - chrono::Duration::hours(2)).to_rfc3339(),
                    stale.id
                ],
            )
            .unwrap();
        }

        let swept = store
            .sweep_stale_running(Utc::now() - chrono::Duration::minutes(30))
            .unwrap();
        assert_eq!(swept, 1);

        let swept_row = store.get_execution(&stale.id).unwrap().unwrap();
        assert_eq!(swept_row.status, ExecutionStatus::Failed);
        assert!(swept_row.error.unwrap().contains("abandoned"));
        assert!(swept_row.duration_ms.unwrap() >= 0);

        let fresh_row = store.get_execution(&fresh.id).unwrap().unwrap();
        assert_eq!(fresh_row.status, ExecutionStatus::Running);
    }

    #[test]
    fn process_schedule_uniqueness_enforced() {
        let store = open_store();
        seed_process_schedule(&store, "p1");

        let now = Utc::now().to_rfc3339();
        let db = store.db.lock().unwrap();
        let dup = db.execute(
            "INSERT INTO process_schedules
             (id, process_id, trigger_id, name, cron_expression, enabled,
              timezone, created_at, updated_at)
             VALUES ('p2', 'proc-p1', 'trig-p1', 'dup', '* * * * *', 1, 'UTC', ?1, ?1)",
            [&now],
        );
        assert!(dup.is_err(), "(process_id, trigger_id) must be unique");
    }

    #[test]
    fn process_execution_records_foreign_id() {
        let store = open_store();
        let ps = seed_process_schedule(&store, "p1");

        let execution = store
            .create_process_execution(&ps, TriggerSource::Schedule)
            .unwrap();
        store
            .complete_process_execution(
                &execution.id,
                ExecutionStatus::Success,
                Some("wf-exec-42"),
                None,
            )
            .unwrap();

        let done = store.get_process_execution(&execution.id).unwrap().unwrap();
        assert_eq!(done.status, ExecutionStatus::Success);
        assert_eq!(done.workflow_execution_id.as_deref(), Some("wf-exec-42"));
        assert!(done.duration_ms.unwrap() >= 0);
    }

    #[test]
    fn hydration_tolerates_pre_evolution_tables() {
        // A platform database from before the optional columns existed.
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE agent_schedules (
                id              TEXT NOT NULL PRIMARY KEY,
                agent_name      TEXT NOT NULL,
                name            TEXT NOT NULL,
                cron_expression TEXT NOT NULL,
                message         TEXT NOT NULL,
                enabled         INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );
            CREATE TABLE schedule_executions (
                id           TEXT NOT NULL PRIMARY KEY,
                schedule_id  TEXT NOT NULL,
                agent_name   TEXT NOT NULL,
                status       TEXT NOT NULL,
                started_at   TEXT NOT NULL,
                completed_at TEXT,
                duration_ms  INTEGER,
                message      TEXT NOT NULL,
                response     TEXT,
                error        TEXT,
                triggered_by TEXT NOT NULL
            );",
        )
        .unwrap();
        init_db(&conn).unwrap(); // no-ops on the legacy tables

        conn.execute(
            "INSERT INTO agent_schedules VALUES
             ('s1', 'atlas', 'old', '0 9 * * *', 'm', 1,
              '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO schedule_executions VALUES
             ('e1', 's1', 'atlas', 'success', '2024-01-01T00:00:00Z',
              '2024-01-01T00:00:05Z', 5000, 'm', 'ok', NULL, 'schedule')",
            [],
        )
        .unwrap();

        let store = ScheduleStore::new(conn);

        let schedule = store.get_schedule("s1").unwrap().unwrap();
        assert_eq!(schedule.timezone, "UTC"); // defaulted, column absent
        assert!(schedule.timeout_secs.is_none());
        assert!(schedule.description.is_none());

        let execution = store.get_execution("e1").unwrap().unwrap();
        assert!(execution.cost.is_none());
        assert!(execution.tool_calls.is_none());
        assert_eq!(execution.duration_ms, Some(5000));
    }
}
