use thiserror::Error;

/// Errors that can occur within the lock subsystem.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock store is unreachable or rejected an operation.
    #[error("Lock store error: {0}")]
    Store(#[from] redis::RedisError),

    /// The lock-store URL could not be parsed or connected to.
    #[error("Lock store connection failed: {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, LockError>;
