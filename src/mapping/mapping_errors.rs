use thiserror::Error;

pub type Result<T> = std::result::Result<T, MappingError>;

/// Custom error type for raw-to-canonical mapping
#[derive(Debug, Error)]
pub enum MappingError {
    /// A required canonical field failed normalization. The whole run fails;
    /// partial canonical commits are not allowed.
    #[error(
        "mapping contract violation in {section} at {source_row_ref}: field '{field}' has invalid value '{raw_value}'"
    )]
    ContractViolation {
        section: String,
        source_row_ref: String,
        field: String,
        raw_value: String,
    },

    #[error("Invalid input: {0}")]
    InvalidData(String),
}
