use crate::database::error::DatabaseError;
use crate::source::error::SourceError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServiceError {
    #[error("DatabaseError: {0}")]
    Database(#[from] DatabaseError),

    #[error("SourceError: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {msg}")]
    Configuration { msg: String },

    #[error("No pending action found, or it has expired")]
    PendingExpired,

    #[error("Invalid selection {choice}: expected a number between 1 and {max}")]
    InvalidChoice { choice: usize, max: usize },

    #[error("{what} not found")]
    NotFound { what: String },
}
