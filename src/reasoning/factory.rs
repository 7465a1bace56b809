//! Reasoning backend selection
//!
//! The backend is chosen once at startup from `INFERENCE_MODE`. Adding a
//! backend means implementing [`ReasoningAdapter`] and a match arm here;
//! call sites only ever see the trait object.

use super::{DeepSeekAdapter, LocalModelAdapter, PassthroughAdapter, ReasoningAdapter};
use crate::config::Settings;
use crate::error::AuditError;
use crate::Result;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceMode {
    /// Remote DeepSeek API
    Api,
    /// On-premise model server
    Local,
    /// No inference, input used as extracted data
    Passthrough,
}

impl FromStr for InferenceMode {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "api" => Ok(InferenceMode::Api),
            "local" => Ok(InferenceMode::Local),
            "passthrough" => Ok(InferenceMode::Passthrough),
            other => Err(AuditError::Configuration(format!(
                "unsupported INFERENCE_MODE '{}' (expected api, local or passthrough)",
                other
            ))),
        }
    }
}

impl fmt::Display for InferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InferenceMode::Api => "api",
            InferenceMode::Local => "local",
            InferenceMode::Passthrough => "passthrough",
        };
        write!(f, "{}", s)
    }
}

/// Build the configured backend. Errors here are fatal startup errors.
pub fn create_adapter(settings: &Settings) -> Result<Arc<dyn ReasoningAdapter>> {
    let mode: InferenceMode = settings.inference_mode.parse()?;

    let adapter: Arc<dyn ReasoningAdapter> = match mode {
        InferenceMode::Api => Arc::new(DeepSeekAdapter::new(
            &settings.deepseek_api_key,
            &settings.deepseek_base_url,
            &settings.deepseek_model,
            settings.request_timeout,
        )?),
        InferenceMode::Local => Arc::new(LocalModelAdapter::new(
            &settings.local_model_path,
            &settings.local_model_url,
            settings.request_timeout,
        )?),
        InferenceMode::Passthrough => Arc::new(PassthroughAdapter),
    };

    info!(mode = %mode, backend = adapter.name(), "Reasoning adapter initialized");
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("API".parse::<InferenceMode>().unwrap(), InferenceMode::Api);
        assert_eq!(" local ".parse::<InferenceMode>().unwrap(), InferenceMode::Local);
        assert!(matches!(
            "cloud".parse::<InferenceMode>(),
            Err(AuditError::Configuration(_))
        ));
    }

    #[test]
    fn test_api_mode_requires_key() {
        let settings = Settings::default();
        assert!(matches!(create_adapter(&settings), Err(AuditError::Configuration(_))));

        let settings = Settings {
            deepseek_api_key: "sk-test".to_string(),
            ..Settings::default()
        };
        assert_eq!(create_adapter(&settings).unwrap().name(), "deepseek");
    }

    #[test]
    fn test_local_mode_requires_existing_path() {
        let settings = Settings {
            inference_mode: "local".to_string(),
            ..Settings::default()
        };
        assert!(matches!(create_adapter(&settings), Err(AuditError::Configuration(_))));

        let tmp = TempDir::new().unwrap();
        let settings = Settings {
            inference_mode: "local".to_string(),
            local_model_path: tmp.path().to_string_lossy().to_string(),
            ..Settings::default()
        };
        assert_eq!(create_adapter(&settings).unwrap().name(), "local");
    }

    #[test]
    fn test_passthrough_mode_needs_nothing() {
        let settings = Settings {
            inference_mode: "passthrough".to_string(),
            ..Settings::default()
        };
        assert_eq!(create_adapter(&settings).unwrap().name(), "passthrough");
    }
}
