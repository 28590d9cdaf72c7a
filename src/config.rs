//! Runtime configuration, read from the environment.
//! Defaults target a backend on localhost.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_SESSION_FILE: &str = "session.json";
pub const DEFAULT_POLL_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a whole number of seconds, got `{value}`")]
    NotANumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
    #[error("API_BASE_URL must start with http:// or https://, got `{0}`")]
    BaseUrl(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Backend root, without a trailing slash.
    pub base_url: String,
    /// Where the device session is persisted between runs.
    pub session_file: PathBuf,
    pub flow_poll_interval: Duration,
    pub alerts_poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = non_empty(&lookup, "API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::BaseUrl(base_url));
        }
        let base_url = base_url.trim_end_matches('/').to_string();

        let session_file = non_empty(&lookup, "SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE));

        Ok(Config {
            base_url,
            session_file,
            flow_poll_interval: seconds(&lookup, "FLOW_POLL_INTERVAL_SECS", DEFAULT_POLL_SECS)?,
            alerts_poll_interval: seconds(&lookup, "ALERTS_POLL_INTERVAL_SECS", DEFAULT_POLL_SECS)?,
            request_timeout: seconds(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
        })
    }
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn seconds<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match non_empty(lookup, key) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|_| ConfigError::NotANumber { key, value: raw })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::Zero { key });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let pairs: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    #[test]
    fn applies_defaults() {
        let cfg = Config::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8080");
        assert_eq!(cfg.session_file, PathBuf::from("session.json"));
        assert_eq!(cfg.flow_poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.alerts_poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn reads_overrides_and_trims_base_url() {
        let cfg = Config::from_lookup(lookup(&[
            ("API_BASE_URL", " https://meters.example.com/api/ "),
            ("SESSION_FILE", "/var/lib/flowwatch/session.json"),
            ("FLOW_POLL_INTERVAL_SECS", "15"),
            ("REQUEST_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(cfg.base_url, "https://meters.example.com/api");
        assert_eq!(cfg.session_file, PathBuf::from("/var/lib/flowwatch/session.json"));
        assert_eq!(cfg.flow_poll_interval, Duration::from_secs(15));
        assert_eq!(cfg.alerts_poll_interval, Duration::from_secs(60));
        assert_eq!(cfg.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = Config::from_lookup(lookup(&[("API_BASE_URL", "  "), ("FLOW_POLL_INTERVAL_SECS", "")])).unwrap();
        assert_eq!(cfg.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(cfg.flow_poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn rejects_bad_intervals() {
        let err = Config::from_lookup(lookup(&[("ALERTS_POLL_INTERVAL_SECS", "soon")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "ALERTS_POLL_INTERVAL_SECS must be a whole number of seconds, got `soon`"
        );

        let err = Config::from_lookup(lookup(&[("FLOW_POLL_INTERVAL_SECS", "0")])).unwrap_err();
        assert_eq!(err, ConfigError::Zero { key: "FLOW_POLL_INTERVAL_SECS" });
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = Config::from_lookup(lookup(&[("API_BASE_URL", "ftp://host")])).unwrap_err();
        assert_eq!(err, ConfigError::BaseUrl("ftp://host".to_string()));
    }
}
