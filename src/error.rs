//! Error types for the audit verification loop

use thiserror::Error;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {

    // =============================
    // Startup
    // =============================

    /// Missing credentials, model path or malformed settings.
    /// The only error allowed to reach the process operator.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // =============================
    // Reasoning backend (absorbed into degraded results)
    // =============================

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response parse error: {0}")]
    ResponseParse(String),

    // =============================
    // Rule engine (logged, record or rule skipped)
    // =============================

    #[error("Rule load error ({source_name}): {message}")]
    RuleLoad {
        source_name: String,
        message: String,
    },

    #[error("Rule evaluation error ({rule_id}): {message}")]
    RuleEval {
        rule_id: String,
        message: String,
    },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AuditError {
    pub fn rule_load(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::RuleLoad {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn rule_eval(rule_id: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::RuleEval {
            rule_id: rule_id.into(),
            message: message.into(),
        }
    }
}
