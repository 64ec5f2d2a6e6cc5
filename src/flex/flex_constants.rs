/// Known IBKR Flex Web Service error codes used by adapter routing logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlexErrorCode {
    StatementNotAvailable,
    StatementIncomplete,
    SettlementNotReady,
    FifoNotReady,
    MtmNotReady,
    MtmAndFifoNotReady,
    ServerBusy,
    LegacyQueryUnsupported,
    ServiceAccountInactive,
    TokenExpired,
    IpRestriction,
    InvalidQuery,
    InvalidToken,
    InvalidAccount,
    InvalidReferenceCode,
    RateLimited,
    StatementInProgress,
    InvalidRequest,
    StatementUnavailable,
}

impl FlexErrorCode {
    pub fn as_code(&self) -> &'static str {
        match self {
            FlexErrorCode::StatementNotAvailable => "1003",
            FlexErrorCode::StatementIncomplete => "1004",
            FlexErrorCode::SettlementNotReady => "1005",
            FlexErrorCode::FifoNotReady => "1006",
            FlexErrorCode::MtmNotReady => "1007",
            FlexErrorCode::MtmAndFifoNotReady => "1008",
            FlexErrorCode::ServerBusy => "1009",
            FlexErrorCode::LegacyQueryUnsupported => "1010",
            FlexErrorCode::ServiceAccountInactive => "1011",
            FlexErrorCode::TokenExpired => "1012",
            FlexErrorCode::IpRestriction => "1013",
            FlexErrorCode::InvalidQuery => "1014",
            FlexErrorCode::InvalidToken => "1015",
            FlexErrorCode::InvalidAccount => "1016",
            FlexErrorCode::InvalidReferenceCode => "1017",
            FlexErrorCode::RateLimited => "1018",
            FlexErrorCode::StatementInProgress => "1019",
            FlexErrorCode::InvalidRequest => "1020",
            FlexErrorCode::StatementUnavailable => "1021",
        }
    }

    pub fn from_code(code: &str) -> Option<FlexErrorCode> {
        match code {
            "1003" => Some(FlexErrorCode::StatementNotAvailable),
            "1004" => Some(FlexErrorCode::StatementIncomplete),
            "1005" => Some(FlexErrorCode::SettlementNotReady),
            "1006" => Some(FlexErrorCode::FifoNotReady),
            "1007" => Some(FlexErrorCode::MtmNotReady),
            "1008" => Some(FlexErrorCode::MtmAndFifoNotReady),
            "1009" => Some(FlexErrorCode::ServerBusy),
            "1010" => Some(FlexErrorCode::LegacyQueryUnsupported),
            "1011" => Some(FlexErrorCode::ServiceAccountInactive),
            "1012" => Some(FlexErrorCode::TokenExpired),
            "1013" => Some(FlexErrorCode::IpRestriction),
            "1014" => Some(FlexErrorCode::InvalidQuery),
            "1015" => Some(FlexErrorCode::InvalidToken),
            "1016" => Some(FlexErrorCode::InvalidAccount),
            "1017" => Some(FlexErrorCode::InvalidReferenceCode),
            "1018" => Some(FlexErrorCode::RateLimited),
            "1019" => Some(FlexErrorCode::StatementInProgress),
            "1020" => Some(FlexErrorCode::InvalidRequest),
            "1021" => Some(FlexErrorCode::StatementUnavailable),
            _ => None,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            FlexErrorCode::StatementNotAvailable => "Statement is not available.",
            FlexErrorCode::StatementIncomplete => {
                "Statement is incomplete at this time. Please try again shortly."
            }
            FlexErrorCode::SettlementNotReady => {
                "Settlement data is not ready at this time. Please try again shortly."
            }
            FlexErrorCode::FifoNotReady => {
                "FIFO P/L data is not ready at this time. Please try again shortly."
            }
            FlexErrorCode::MtmNotReady => {
                "MTM P/L data is not ready at this time. Please try again shortly."
            }
            FlexErrorCode::MtmAndFifoNotReady => {
                "MTM and FIFO P/L data is not ready at this time. Please try again shortly."
            }
            FlexErrorCode::ServerBusy => {
                "The server is under heavy load. Statement could not be generated at this time. Please try again shortly."
            }
            FlexErrorCode::LegacyQueryUnsupported => {
                "Legacy Flex Queries are no longer supported. Please convert over to Activity Flex."
            }
            FlexErrorCode::ServiceAccountInactive => "Service account is inactive.",
            FlexErrorCode::TokenExpired => "Token has expired.",
            FlexErrorCode::IpRestriction => "IP restriction.",
            FlexErrorCode::InvalidQuery => "Query is invalid.",
            FlexErrorCode::InvalidToken => "Token is invalid.",
            FlexErrorCode::InvalidAccount => "Account in invalid.",
            FlexErrorCode::InvalidReferenceCode => "Reference code is invalid.",
            FlexErrorCode::RateLimited => {
                "Too many requests have been made from this token. Please try again shortly."
            }
            FlexErrorCode::StatementInProgress => {
                "Statement generation in progress. Please try again shortly."
            }
            FlexErrorCode::InvalidRequest => "Invalid request or unable to validate request.",
            FlexErrorCode::StatementUnavailable => {
                "Statement could not be retrieved at this time. Please try again shortly."
            }
        }
    }
}

/// Returns whether an upstream code may be retried inside the poll loop.
pub fn is_retryable_in_poll(code: &str) -> bool {
    matches!(
        FlexErrorCode::from_code(code),
        Some(FlexErrorCode::ServerBusy)
            | Some(FlexErrorCode::RateLimited)
            | Some(FlexErrorCode::StatementInProgress)
    )
}

/// Returns whether an upstream code signals a token problem.
pub fn is_token_code(code: &str) -> bool {
    matches!(
        FlexErrorCode::from_code(code),
        Some(FlexErrorCode::TokenExpired) | Some(FlexErrorCode::InvalidToken)
    )
}

/// Returns whether an upstream code is fatal for the current run.
///
/// Unknown codes are treated as fatal statement errors.
pub fn is_fatal(code: &str) -> bool {
    !is_retryable_in_poll(code) && !is_token_code(code)
}

/// Code-specific minimum retry delay for retryable poll errors, in seconds.
pub fn retry_floor_seconds(code: &str) -> f64 {
    match FlexErrorCode::from_code(code) {
        Some(FlexErrorCode::RateLimited) => 10.0,
        Some(FlexErrorCode::ServerBusy) => 5.0,
        Some(FlexErrorCode::StatementInProgress) => 5.0,
        _ => 0.0,
    }
}

/// Resolves the canonical message for a code, falling back when unknown.
pub fn default_message_for(code: &str, fallback: &str) -> String {
    FlexErrorCode::from_code(code)
        .map(|known| known.default_message().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_poll_codes() {
        assert!(is_retryable_in_poll("1009"));
        assert!(is_retryable_in_poll("1018"));
        assert!(is_retryable_in_poll("1019"));
        assert!(!is_retryable_in_poll("1012"));
        assert!(!is_retryable_in_poll("1003"));
    }

    #[test]
    fn test_token_codes() {
        assert!(is_token_code("1012"));
        assert!(is_token_code("1015"));
        assert!(!is_token_code("1019"));
    }

    #[test]
    fn test_unknown_codes_are_fatal() {
        assert!(is_fatal("9999"));
        assert!(is_fatal("1014"));
        assert!(!is_fatal("1019"));
        assert!(!is_fatal("1015"));
    }

    #[test]
    fn test_retry_floors() {
        assert_eq!(retry_floor_seconds("1018"), 10.0);
        assert_eq!(retry_floor_seconds("1009"), 5.0);
        assert_eq!(retry_floor_seconds("1019"), 5.0);
        assert_eq!(retry_floor_seconds("1003"), 0.0);
    }

    #[test]
    fn test_code_round_trip() {
        for code in ["1003", "1009", "1012", "1015", "1018", "1019", "1021"] {
            let parsed = FlexErrorCode::from_code(code).unwrap();
            assert_eq!(parsed.as_code(), code);
        }
        assert!(FlexErrorCode::from_code("1234").is_none());
    }
}
