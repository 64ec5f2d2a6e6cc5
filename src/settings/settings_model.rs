use chrono_tz::Tz;

/// Local business zone used to derive the daily report date from a UTC instant.
pub const LOCAL_REPORT_TZ: Tz = chrono_tz::Asia::Jerusalem;

/// Default functional (base) reporting currency.
pub const DEFAULT_BASE_CURRENCY: &str = "USD";

/// Default Flex Web Service endpoint.
pub const DEFAULT_FLEX_BASE_URL: &str =
    "https://ndcdyn.interactivebrokers.com/AccountManagement/FlexWebService";

/// Poll retry tuning for the Flex statement download loop.
#[derive(Debug, Clone)]
pub struct FlexRetrySettings {
    /// Delay before the first poll attempt.
    pub initial_wait_seconds: f64,
    /// Maximum number of poll attempts.
    pub retry_attempts: u32,
    /// Base delay for exponential backoff.
    pub backoff_base_seconds: f64,
    /// Exponential delay cap before jitter.
    pub backoff_max_seconds: f64,
    /// Lower jitter multiplier bound.
    pub jitter_min_multiplier: f64,
    /// Upper jitter multiplier bound.
    pub jitter_max_multiplier: f64,
    /// Per-request HTTP timeout.
    pub request_timeout_seconds: f64,
}

impl Default for FlexRetrySettings {
    fn default() -> Self {
        Self {
            initial_wait_seconds: 5.0,
            retry_attempts: 7,
            backoff_base_seconds: 10.0,
            backoff_max_seconds: 60.0,
            jitter_min_multiplier: 0.5,
            jitter_max_multiplier: 1.5,
            request_timeout_seconds: 30.0,
        }
    }
}

/// Immutable per-process runtime configuration.
///
/// Resolved once at startup from the environment and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    /// The single account this process handles.
    pub account_id: String,
    /// Flex Web Service token.
    pub flex_token: String,
    /// Flex query identifier.
    pub flex_query_id: String,
    /// Flex Web Service base endpoint.
    pub flex_base_url: String,
    /// Store connection string.
    pub database_url: String,
    /// Functional (base) reporting currency.
    pub base_currency: String,
    /// Whether reconciliation-required section checks are enforced.
    pub reconciliation_enabled: bool,
    /// Statement poll retry tuning.
    pub retry: FlexRetrySettings,
}
