use thiserror::Error;

use crate::db::DatabaseError;
use crate::events::EventError;
use crate::flex::FlexError;
use crate::ingestion::IngestionError;
use crate::instruments::InstrumentError;
use crate::ledger::LedgerError;
use crate::mapping::MappingError;
use crate::settings::SettingsError;
use crate::statements::StatementError;

// Create a type alias for Result using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the ledger application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration failed: {0}")]
    Settings(#[from] SettingsError),

    #[error("Flex transport failed: {0}")]
    Flex(#[from] FlexError),

    #[error("Statement processing failed: {0}")]
    Statement(#[from] StatementError),

    #[error("Instrument error: {0}")]
    Instrument(#[from] InstrumentError),

    #[error("Canonical event error: {0}")]
    Event(#[from] EventError),

    #[error("Canonical mapping failed: {0}")]
    Mapping(#[from] MappingError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Ingestion error: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Input validation failed: {0}")]
    Validation(String),
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        Error::Database(DatabaseError::QueryFailed(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(err.to_string())
    }
}
