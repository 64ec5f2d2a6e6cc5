use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IngestionError>;

/// Custom error type for ingestion run lifecycle operations
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Another run for the account is still `started`. HTTP callers surface
    /// this as `409 run already active`; no new run row exists.
    #[error("run already active")]
    RunAlreadyActive,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<DieselError> for IngestionError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                IngestionError::RunAlreadyActive
            }
            DieselError::NotFound => IngestionError::NotFound("Record not found".to_string()),
            _ => IngestionError::DatabaseError(err.to_string()),
        }
    }
}
