use thiserror::Error;

/// Typed adapter-layer failures for the Flex request/poll flow.
///
/// Each variant carries the upstream error code when one was available.
#[derive(Debug, Error)]
pub enum FlexError {
    #[error("Flex token expired (code {code}): {message}")]
    TokenExpired { code: String, message: String },

    #[error("Flex token invalid (code {code}): {message}")]
    TokenInvalid { code: String, message: String },

    #[error("Flex request rejected (code {code}): {message}")]
    RequestRejected { code: String, message: String },

    #[error("Flex statement rejected (code {code}): {message}")]
    StatementRejected { code: String, message: String },

    #[error("Flex statement polling timed out after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    #[error("Flex transport request failed")]
    Transport(#[source] reqwest::Error),

    #[error("Flex transport request timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("Flex upstream returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Flex response malformed: {context}")]
    MalformedResponse { context: String },

    #[error("Flex poll wait cancelled")]
    Cancelled,
}

impl FlexError {
    /// Upstream error code attached to this failure, when known.
    pub fn upstream_code(&self) -> Option<&str> {
        match self {
            FlexError::TokenExpired { code, .. }
            | FlexError::TokenInvalid { code, .. }
            | FlexError::RequestRejected { code, .. }
            | FlexError::StatementRejected { code, .. } => Some(code),
            _ => None,
        }
    }
}
