use thiserror::Error;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression is not a valid 5-field expression.
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCronExpression { expression: String, reason: String },

    /// The timezone is not a known IANA name.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No schedule with the given ID exists.
    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: String },

    /// Persistence layer failure.
    #[error(transparent)]
    Store(#[from] metronome_store::StoreError),

    /// Lock store failure.
    #[error(transparent)]
    Lock(#[from] metronome_lock::LockError),

    /// The external executor was unreachable or returned an error.
    #[error("Executor error: {0}")]
    Executor(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
