//! `metronome-store` — persistence boundary over the platform's shared
//! SQLite database.
//!
//! The scheduler only ever touches its own tables: `agent_schedules` (read),
//! `schedule_executions` (read/write), `process_schedules` and
//! `process_schedule_executions` (read/write, provisioned here), plus the
//! `agents` autonomy gate. Every operation runs a short-lived statement and
//! commits immediately — the database is shared with the rest of the
//! platform and nothing here may hold it open.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::ScheduleStore;
pub use types::{
    ExecutionCompletion, ProcessSchedule, ProcessScheduleExecution, Schedule, ScheduleExecution,
};
