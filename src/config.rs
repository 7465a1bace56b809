//! Runtime settings
//!
//! Loaded once at process start from the environment (and `.env` if present).

use crate::error::AuditError;
use crate::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TOLERANCE: f64 = 0.01;
pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_DEEPSEEK_MODEL: &str = "deepseek-reasoner";
pub const DEFAULT_LOCAL_MODEL_URL: &str = "http://127.0.0.1:8000/v1";

#[derive(Debug, Clone)]
pub struct Settings {
    pub inference_mode: String,
    pub deepseek_api_key: String,
    pub deepseek_base_url: String,
    pub deepseek_model: String,
    pub local_model_path: String,
    pub local_model_url: String,
    pub max_retries: u32,
    pub balance_tolerance: f64,
    pub rules_dir: PathBuf,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            inference_mode: "api".to_string(),
            deepseek_api_key: String::new(),
            deepseek_base_url: DEFAULT_DEEPSEEK_BASE_URL.to_string(),
            deepseek_model: DEFAULT_DEEPSEEK_MODEL.to_string(),
            local_model_path: String::new(),
            local_model_url: DEFAULT_LOCAL_MODEL_URL.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            balance_tolerance: DEFAULT_TOLERANCE,
            rules_dir: PathBuf::from("rules"),
            request_timeout: Duration::from_secs(60),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup (environment, test maps).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let max_retries = parse_var(&lookup, "MAX_RETRY_COUNT", defaults.max_retries)?;
        let balance_tolerance = parse_var(&lookup, "BALANCE_TOLERANCE", defaults.balance_tolerance)?;
        if !balance_tolerance.is_finite() || balance_tolerance < 0.0 {
            return Err(AuditError::Configuration(format!(
                "BALANCE_TOLERANCE must be a non-negative number, got {}",
                balance_tolerance
            )));
        }

        let timeout_secs: u64 = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 60)?;
        if timeout_secs == 0 {
            return Err(AuditError::Configuration(
                "REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            inference_mode: text("INFERENCE_MODE", defaults.inference_mode).to_lowercase(),
            deepseek_api_key: text("DEEPSEEK_API_KEY", defaults.deepseek_api_key),
            deepseek_base_url: text("DEEPSEEK_BASE_URL", defaults.deepseek_base_url),
            deepseek_model: text("DEEPSEEK_MODEL", defaults.deepseek_model),
            local_model_path: text("LOCAL_MODEL_PATH", defaults.local_model_path),
            local_model_url: text("LOCAL_MODEL_URL", defaults.local_model_url),
            max_retries,
            balance_tolerance,
            rules_dir: PathBuf::from(text("RULES_DIR", "rules".to_string())),
            request_timeout: Duration::from_secs(timeout_secs),
            log_level: text("LOG_LEVEL", defaults.log_level),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        Some(raw) if !raw.is_empty() => raw.parse::<T>().map_err(|e| {
            AuditError::Configuration(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(settings.inference_mode, "api");
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.balance_tolerance, 0.01);
        assert_eq!(settings.request_timeout, Duration::from_secs(60));
        assert_eq!(settings.rules_dir, PathBuf::from("rules"));
    }

    #[test]
    fn test_overrides_are_applied() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("INFERENCE_MODE", "LOCAL"),
            ("LOCAL_MODEL_PATH", "/models/r1"),
            ("MAX_RETRY_COUNT", "5"),
            ("BALANCE_TOLERANCE", "0.5"),
            ("REQUEST_TIMEOUT_SECS", "10"),
        ]))
        .unwrap();

        assert_eq!(settings.inference_mode, "local");
        assert_eq!(settings.local_model_path, "/models/r1");
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.balance_tolerance, 0.5);
        assert_eq!(settings.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_number_is_configuration_error() {
        let err = Settings::from_lookup(lookup_from(&[("MAX_RETRY_COUNT", "three")])).unwrap_err();
        assert!(matches!(err, AuditError::Configuration(_)));

        let err = Settings::from_lookup(lookup_from(&[("BALANCE_TOLERANCE", "-1")])).unwrap_err();
        assert!(matches!(err, AuditError::Configuration(_)));

        let err = Settings::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, AuditError::Configuration(_)));
    }
}
