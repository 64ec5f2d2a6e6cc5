use thiserror::Error;

/// Custom error type for settings loading and validation
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Missing required setting '{0}'")]
    MissingKey(String),

    #[error("Invalid value for setting '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
