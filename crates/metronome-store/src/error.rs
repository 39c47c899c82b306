use thiserror::Error;

/// Errors that can occur within the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No schedule with the given ID exists.
    #[error("Schedule not found: {id}")]
    ScheduleNotFound { id: String },

    /// The execution does not exist or has already reached a terminal state.
    /// Terminal updates happen exactly once.
    #[error("Execution not in running state: {id}")]
    ExecutionNotRunning { id: String },

    /// A terminal update was attempted with a non-terminal status.
    #[error("Invalid terminal status: {status}")]
    InvalidTerminalStatus { status: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
