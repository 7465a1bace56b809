//! Core data models for the audit verification loop

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
}

/// Terminal verdict carried by a final report. Never `PENDING`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Approved,
    Rejected,
}

/// How the loop terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Approved,
    /// Retry ceiling reached while validation still rejected the output.
    RetriesExhausted,
}

//
// ================= Validation =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Violation {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub expected: String,
    pub actual: String,
    pub correction_hint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationResult {
    pub status: ValidationStatus,
    pub violations: Vec<Violation>,
    pub retry_allowed: bool,
}

impl ValidationResult {
    /// Fold a violation list into a verdict.
    ///
    /// Severity does not gate approval: any violation rejects and makes the
    /// run retry-eligible, INFO included.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        let rejected = !violations.is_empty();
        Self {
            status: if rejected {
                ValidationStatus::Rejected
            } else {
                ValidationStatus::Approved
            },
            violations,
            retry_allowed: rejected,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ValidationStatus::Approved
    }
}

//
// ================= Reasoning =================
//

/// Structured answer from a reasoning backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReasoningOutput {
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning_chain: Vec<String>,
    #[serde(default)]
    pub extracted_data: Map<String, Value>,
}

impl ReasoningOutput {
    /// Result returned in place of an error when the backend cannot answer.
    pub fn degraded(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            conclusion: format!("Analysis unavailable: {}", reason),
            confidence: 0.0,
            reasoning_chain: vec![format!("backend failure: {}", reason)],
            extracted_data: Map::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.confidence == 0.0 && self.extracted_data.is_empty()
    }
}

//
// ================= Final Report =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReport {
    pub audit_id: Uuid,
    pub status: ReportStatus,
    pub outcome: AuditOutcome,
    /// Confidence of the last reasoning answer.
    pub confidence: f64,
    pub details: ReasoningOutput,
    pub violations: Vec<Violation>,
    pub feedback_history: Vec<String>,
    pub retry_count: u32,
    pub trace: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl FinalReport {
    pub fn is_approved(&self) -> bool {
        self.status == ReportStatus::Approved
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::Approved => "APPROVED",
            ValidationStatus::Rejected => "REJECTED",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditOutcome::Approved => "approved",
            AuditOutcome::RetriesExhausted => "retries exhausted while still rejected",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(severity: Severity) -> Violation {
        Violation {
            rule_id: "R009".to_string(),
            rule_name: "Disclosure note present".to_string(),
            severity,
            expected: "notes.count = 1".to_string(),
            actual: "0".to_string(),
            correction_hint: "Check the notes section".to_string(),
        }
    }

    #[test]
    fn test_empty_violations_approve() {
        let result = ValidationResult::from_violations(vec![]);
        assert_eq!(result.status, ValidationStatus::Approved);
        assert!(!result.retry_allowed);
    }

    #[test]
    fn test_info_only_violations_still_reject() {
        let result = ValidationResult::from_violations(vec![violation(Severity::Info)]);
        assert_eq!(result.status, ValidationStatus::Rejected);
        assert!(result.retry_allowed);
    }

    #[test]
    fn test_reasoning_output_wire_names() {
        let parsed: ReasoningOutput = serde_json::from_value(serde_json::json!({
            "conclusion": "balanced",
            "confidence": 0.9,
            "reasoning_chain": ["step"],
            "extracted_data": {"assets": {"total": 1}}
        }))
        .unwrap();

        assert_eq!(parsed.reasoning_chain, vec!["step".to_string()]);
        assert!(parsed.extracted_data.contains_key("assets"));
        assert_eq!(serde_json::to_value(Severity::Critical).unwrap(), "CRITICAL");
        assert_eq!(
            serde_json::to_value(AuditOutcome::RetriesExhausted).unwrap(),
            "RETRIES_EXHAUSTED"
        );
    }

    #[test]
    fn test_degraded_output_shape() {
        let output = ReasoningOutput::degraded("timeout");
        assert_eq!(output.confidence, 0.0);
        assert!(output.extracted_data.is_empty());
        assert_eq!(output.reasoning_chain.len(), 1);
        assert!(output.conclusion.contains("timeout"));
        assert!(output.is_degraded());
    }
}
