use classpulse_db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input; surfaced immediately, never retried.
    #[error("{0}")]
    Validation(String),
    /// Invariant violation under contention (active poll running,
    /// duplicate vote).
    #[error("{0}")]
    Conflict(String),
    /// Time-based rejection; triggers the poll's transition to completed
    /// as a side effect.
    #[error("{0}")]
    Expired(String),
    #[error("not found")]
    NotFound,
    /// Durable store degraded. Read paths fall back to empty state; write
    /// paths surface this clearly.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<DbError> for CoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound => CoreError::NotFound,
            other => CoreError::Unavailable(other.to_string()),
        }
    }
}
