use std::env;
use std::str::FromStr;

use super::settings_errors::SettingsError;
use super::settings_model::{
    FlexRetrySettings, Settings, DEFAULT_BASE_CURRENCY, DEFAULT_FLEX_BASE_URL,
};

/// Loads and validates runtime settings from the process environment.
///
/// Missing or invalid required settings abort startup with a descriptive error.
pub fn load_settings() -> Result<Settings, SettingsError> {
    let retry = FlexRetrySettings {
        initial_wait_seconds: optional_parsed("IBKR_FLEX_INITIAL_WAIT_SECONDS", 5.0)?,
        retry_attempts: optional_parsed("IBKR_FLEX_RETRY_ATTEMPTS", 7u32)?,
        backoff_base_seconds: optional_parsed("IBKR_FLEX_BACKOFF_BASE_SECONDS", 10.0)?,
        backoff_max_seconds: optional_parsed("IBKR_FLEX_BACKOFF_MAX_SECONDS", 60.0)?,
        jitter_min_multiplier: optional_parsed("IBKR_FLEX_JITTER_MIN_MULTIPLIER", 0.5)?,
        jitter_max_multiplier: optional_parsed("IBKR_FLEX_JITTER_MAX_MULTIPLIER", 1.5)?,
        request_timeout_seconds: optional_parsed("IBKR_FLEX_REQUEST_TIMEOUT_SECONDS", 30.0)?,
    };
    validate_retry(&retry)?;

    let settings = Settings {
        account_id: required_text("ACCOUNT_ID")?,
        flex_token: required_text("IBKR_FLEX_TOKEN")?,
        flex_query_id: required_text("IBKR_FLEX_QUERY_ID")?,
        flex_base_url: optional_text("IBKR_FLEX_BASE_URL", DEFAULT_FLEX_BASE_URL),
        database_url: required_text("DATABASE_URL")?,
        base_currency: optional_text("BASE_CURRENCY", DEFAULT_BASE_CURRENCY),
        reconciliation_enabled: optional_parsed("RECONCILIATION_ENABLED", false)?,
        retry,
    };

    Ok(settings)
}

fn validate_retry(retry: &FlexRetrySettings) -> Result<(), SettingsError> {
    if retry.retry_attempts < 1 {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_RETRY_ATTEMPTS".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    if retry.initial_wait_seconds < 0.0 {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_INITIAL_WAIT_SECONDS".to_string(),
            reason: "must be >= 0".to_string(),
        });
    }
    if retry.backoff_base_seconds < 0.0 {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_BACKOFF_BASE_SECONDS".to_string(),
            reason: "must be >= 0".to_string(),
        });
    }
    if retry.backoff_max_seconds < retry.backoff_base_seconds {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_BACKOFF_MAX_SECONDS".to_string(),
            reason: "must be >= IBKR_FLEX_BACKOFF_BASE_SECONDS".to_string(),
        });
    }
    if retry.jitter_min_multiplier <= 0.0 {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_JITTER_MIN_MULTIPLIER".to_string(),
            reason: "must be > 0".to_string(),
        });
    }
    if retry.jitter_max_multiplier < retry.jitter_min_multiplier {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_JITTER_MAX_MULTIPLIER".to_string(),
            reason: "must be >= IBKR_FLEX_JITTER_MIN_MULTIPLIER".to_string(),
        });
    }
    if retry.request_timeout_seconds <= 0.0 {
        return Err(SettingsError::InvalidValue {
            key: "IBKR_FLEX_REQUEST_TIMEOUT_SECONDS".to_string(),
            reason: "must be > 0".to_string(),
        });
    }
    Ok(())
}

fn required_text(key: &str) -> Result<String, SettingsError> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            if trimmed.is_empty() {
                Err(SettingsError::InvalidValue {
                    key: key.to_string(),
                    reason: "must not be blank".to_string(),
                })
            } else {
                Ok(trimmed)
            }
        }
        Err(_) => Err(SettingsError::MissingKey(key.to_string())),
    }
}

fn optional_text(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

fn optional_parsed<T>(key: &str, default: T) -> Result<T, SettingsError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value
                .trim()
                .parse::<T>()
                .map_err(|e| SettingsError::InvalidValue {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_validation_rejects_inverted_backoff_bounds() {
        let retry = FlexRetrySettings {
            backoff_base_seconds: 60.0,
            backoff_max_seconds: 10.0,
            ..FlexRetrySettings::default()
        };
        assert!(validate_retry(&retry).is_err());
    }

    #[test]
    fn test_retry_validation_rejects_inverted_jitter_bounds() {
        let retry = FlexRetrySettings {
            jitter_min_multiplier: 1.5,
            jitter_max_multiplier: 0.5,
            ..FlexRetrySettings::default()
        };
        assert!(validate_retry(&retry).is_err());
    }

    #[test]
    fn test_retry_validation_accepts_defaults() {
        assert!(validate_retry(&FlexRetrySettings::default()).is_ok());
    }
}
