use rusqlite::Connection;

use crate::error::Result;

/// Initialise the scheduler schema in `conn`. Idempotent: safe to run on
/// every startup and harmless when the wider platform already created the
/// agent tables (the statements no-op on existing tables).
///
/// The process-schedule tables and their indexes are owned by this
/// subsystem; `agent_schedules` and `agents` are owned by the platform and
/// only created here so a standalone deployment boots on an empty database.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS agent_schedules (
            id              TEXT    NOT NULL PRIMARY KEY,
            agent_name      TEXT    NOT NULL,
            name            TEXT    NOT NULL,
            cron_expression TEXT    NOT NULL,   -- 5-field: min hour dom mon dow
            message         TEXT    NOT NULL,   -- opaque executor payload
            enabled         INTEGER NOT NULL DEFAULT 1,
            timezone        TEXT    NOT NULL DEFAULT 'UTC',
            description     TEXT,
            created_by      TEXT,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL,
            last_run_at     TEXT,               -- ISO-8601 or NULL
            next_run_at     TEXT,               -- ISO-8601 or NULL
            timeout_secs    INTEGER             -- per-schedule executor override
        );

        CREATE INDEX IF NOT EXISTS idx_agent_schedules_enabled
            ON agent_schedules (enabled);
        CREATE INDEX IF NOT EXISTS idx_agent_schedules_agent
            ON agent_schedules (agent_name);

        CREATE TABLE IF NOT EXISTS schedule_executions (
            id              TEXT    NOT NULL PRIMARY KEY,
            schedule_id     TEXT    NOT NULL,
            agent_name      TEXT    NOT NULL,
            status          TEXT    NOT NULL DEFAULT 'running',
            started_at      TEXT    NOT NULL,
            completed_at    TEXT,
            duration_ms     INTEGER,            -- completed_at - started_at
            message         TEXT    NOT NULL,
            response        TEXT,
            error           TEXT,
            triggered_by    TEXT    NOT NULL DEFAULT 'schedule',
            context_used    INTEGER,
            context_max     INTEGER,
            cost            REAL,
            tool_calls      INTEGER,
            execution_log   TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_schedule_executions_schedule
            ON schedule_executions (schedule_id);
        CREATE INDEX IF NOT EXISTS idx_schedule_executions_status
            ON schedule_executions (status);

        CREATE TABLE IF NOT EXISTS process_schedules (
            id              TEXT    NOT NULL PRIMARY KEY,
            process_id      TEXT    NOT NULL,
            trigger_id      TEXT    NOT NULL,
            name            TEXT    NOT NULL,
            cron_expression TEXT    NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            timezone        TEXT    NOT NULL DEFAULT 'UTC',
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL,
            last_run_at     TEXT,
            next_run_at     TEXT,
            UNIQUE (process_id, trigger_id)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_process_schedules_process
            ON process_schedules (process_id);
        CREATE INDEX IF NOT EXISTS idx_process_schedules_enabled
            ON process_schedules (enabled);

        CREATE TABLE IF NOT EXISTS process_schedule_executions (
            id                    TEXT    NOT NULL PRIMARY KEY,
            process_schedule_id   TEXT    NOT NULL,
            process_id            TEXT    NOT NULL,
            status                TEXT    NOT NULL DEFAULT 'running',
            started_at            TEXT    NOT NULL,
            completed_at          TEXT,
            duration_ms           INTEGER,
            workflow_execution_id TEXT,   -- assigned by the workflow API
            error                 TEXT,
            triggered_by          TEXT    NOT NULL DEFAULT 'schedule'
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_process_schedule_executions_schedule
            ON process_schedule_executions (process_schedule_id);

        CREATE TABLE IF NOT EXISTS agents (
            name                TEXT    NOT NULL PRIMARY KEY,
            autonomous_enabled  INTEGER NOT NULL DEFAULT 0
        );
        ",
    )?;
    Ok(())
}
