use diesel::result::Error as DieselError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StatementError>;

/// Custom error type for raw statement persistence and validation
#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Missing required sections: {}", missing.join(", "))]
    MissingRequiredSections { missing: Vec<String> },
}

impl From<DieselError> for StatementError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => StatementError::NotFound("Record not found".to_string()),
            _ => StatementError::DatabaseError(err.to_string()),
        }
    }
}
