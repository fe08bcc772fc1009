use std::path::PathBuf;
use std::time::Duration;

use chrono::Weekday;

use crate::error::AppError;
use crate::summarizer;

/// Runtime configuration, read from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Interval of the scheduler's due-check loop.
    pub poll_interval: Duration,
    /// Interval between full job table rebuilds from the database.
    pub rebuild_interval: Duration,
    /// Weekday on which weekly digests fire.
    pub weekly_anchor: Weekday,
    pub db_url: String,
    pub db_path: String,
    /// Base URL of the chat gateway sidecar.
    pub gateway_url: String,
    pub openrouter_url: String,
    pub openrouter_api_key: String,
    /// Model used when a user has no valid model configured.
    pub default_model: String,
    /// Maximum number of messages fetched per pipeline run.
    pub fetch_limit: u32,
    pub logs_path: PathBuf,
}

impl Config {
    pub fn new() -> Result<Self, AppError> {
        Ok(Self {
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL", 1)?),
            rebuild_interval: Duration::from_secs(parse_or("REBUILD_INTERVAL", 300)?),
            weekly_anchor: parse_weekday_or("WEEKLY_ANCHOR", Weekday::Mon)?,
            db_url: optional("DB_URL").unwrap_or("sqlite://data/digest.db".to_string()),
            db_path: optional("DB_PATH").unwrap_or("data/digest.db".to_string()),
            gateway_url: required("GATEWAY_URL")?,
            openrouter_url: optional("OPENROUTER_URL")
                .unwrap_or("https://openrouter.ai/api/v1".to_string()),
            openrouter_api_key: required("OPENROUTER_API_KEY")?,
            default_model: optional("OPENROUTER_MODEL")
                .unwrap_or(summarizer::DEFAULT_MODEL.to_string()),
            fetch_limit: parse_or("FETCH_LIMIT", 100)? as u32,
            logs_path: PathBuf::from(optional("LOGS_PATH").unwrap_or("logs".to_string())),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String, AppError> {
    optional(key).ok_or(AppError::MissingConfig {
        key: key.to_string(),
    })
}

fn parse_or(key: &str, default: u64) -> Result<u64, AppError> {
    match optional(key) {
        Some(v) => v.parse::<u64>().map_err(|_| AppError::ConfigurationError {
            msg: format!("{key} must be a positive integer, got `{v}`"),
        }),
        None => Ok(default),
    }
}

fn parse_weekday_or(key: &str, default: Weekday) -> Result<Weekday, AppError> {
    match optional(key) {
        Some(v) => v
            .parse::<Weekday>()
            .map_err(|_| AppError::ConfigurationError {
                msg: format!("{key} must be a weekday name, got `{v}`"),
            }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_required_and_optional() {
        unsafe {
            std::env::remove_var("DIGEST_TEST_KEY");
        }
        assert!(optional("DIGEST_TEST_KEY").is_none());
        assert!(matches!(
            required("DIGEST_TEST_KEY"),
            Err(AppError::MissingConfig { .. })
        ));

        unsafe {
            std::env::set_var("DIGEST_TEST_KEY", "value");
        }
        assert_eq!(required("DIGEST_TEST_KEY").unwrap(), "value");
        unsafe {
            std::env::remove_var("DIGEST_TEST_KEY");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_parse_or_rejects_garbage() {
        unsafe {
            std::env::set_var("DIGEST_TEST_NUM", "not-a-number");
        }
        assert!(parse_or("DIGEST_TEST_NUM", 1).is_err());
        unsafe {
            std::env::set_var("DIGEST_TEST_NUM", "30");
        }
        assert_eq!(parse_or("DIGEST_TEST_NUM", 1).unwrap(), 30);
        unsafe {
            std::env::remove_var("DIGEST_TEST_NUM");
        }
    }
}
