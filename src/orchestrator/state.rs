//! Audit loop state and transition table
//!
//! INIT → ANALYZING → VALIDATING → {FEEDBACK → ANALYZING | REPORTING} → DONE
//!
//! Every step produces a [`StateUpdate`] holding only the fields it
//! changes; [`AuditState::apply`] folds it into the next state value.

use crate::models::{
    AuditOutcome, FinalReport, ReasoningOutput, ReportStatus, ValidationResult, ValidationStatus,
    Violation,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditPhase {
    Init,
    Analyzing,
    Validating,
    Feedback,
    Reporting,
    Done,
}

impl fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditPhase::Init => "INIT",
            AuditPhase::Analyzing => "ANALYZING",
            AuditPhase::Validating => "VALIDATING",
            AuditPhase::Feedback => "FEEDBACK",
            AuditPhase::Reporting => "REPORTING",
            AuditPhase::Done => "DONE",
        };
        write!(f, "{}", s)
    }
}

/// State of one audit run. Owned by that run alone.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditState {
    pub raw_input: Value,
    pub extracted_data: Map<String, Value>,
    pub reasoning_output: ReasoningOutput,
    pub validation_result: ValidationStatus,
    pub violations: Vec<Violation>,
    /// Append-only.
    pub feedback_history: Vec<String>,
    pub retry_count: u32,
    pub trace: Vec<String>,
    /// Set only once the loop reaches REPORTING.
    pub final_report: Option<FinalReport>,
}

/// Fields changed by one step. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub extracted_data: Option<Map<String, Value>>,
    pub reasoning_output: Option<ReasoningOutput>,
    pub validation_result: Option<ValidationStatus>,
    pub violations: Option<Vec<Violation>>,
    pub feedback_entry: Option<String>,
    pub retry_count: Option<u32>,
    pub trace_entry: Option<String>,
    pub final_report: Option<FinalReport>,
}

impl AuditState {
    /// INIT: fresh state for `raw_input`.
    pub fn new(raw_input: Value) -> Self {
        Self {
            raw_input,
            extracted_data: Map::new(),
            reasoning_output: ReasoningOutput::default(),
            validation_result: ValidationStatus::Pending,
            violations: Vec::new(),
            feedback_history: Vec::new(),
            retry_count: 0,
            trace: vec!["INIT: audit run started".to_string()],
            final_report: None,
        }
    }

    pub fn apply(mut self, update: StateUpdate) -> Self {
        if let Some(data) = update.extracted_data {
            self.extracted_data = data;
        }
        if let Some(output) = update.reasoning_output {
            self.reasoning_output = output;
        }
        if let Some(status) = update.validation_result {
            self.validation_result = status;
        }
        if let Some(violations) = update.violations {
            self.violations = violations;
        }
        if let Some(entry) = update.feedback_entry {
            self.feedback_history.push(entry);
        }
        if let Some(count) = update.retry_count {
            self.retry_count = count;
        }
        if let Some(entry) = update.trace_entry {
            self.trace.push(entry);
        }
        if let Some(report) = update.final_report {
            self.final_report = Some(report);
        }
        self
    }

    /// Only the newest feedback entry is forwarded to the reasoning backend;
    /// the full history stays on the state for the report.
    pub fn latest_feedback(&self) -> Option<&str> {
        self.feedback_history.last().map(String::as_str)
    }
}

/// Transition table.
pub fn next_phase(phase: AuditPhase, state: &AuditState, max_retries: u32) -> AuditPhase {
    match phase {
        AuditPhase::Init => AuditPhase::Analyzing,
        AuditPhase::Analyzing => AuditPhase::Validating,
        AuditPhase::Validating => {
            if state.validation_result == ValidationStatus::Approved
                || state.retry_count >= max_retries
            {
                AuditPhase::Reporting
            } else {
                AuditPhase::Feedback
            }
        }
        AuditPhase::Feedback => AuditPhase::Analyzing,
        AuditPhase::Reporting | AuditPhase::Done => AuditPhase::Done,
    }
}

//
// ================= Steps =================
//

/// ANALYZING: replace the extracted data and reasoning output.
pub fn analyzed(backend: &str, output: ReasoningOutput) -> StateUpdate {
    let trace = format!(
        "ANALYZING: {} returned confidence {:.2} with {} extracted field(s)",
        backend,
        output.confidence,
        output.extracted_data.len()
    );

    StateUpdate {
        extracted_data: Some(output.extracted_data.clone()),
        reasoning_output: Some(output),
        trace_entry: Some(trace),
        ..StateUpdate::default()
    }
}

/// VALIDATING: fold the rule engine verdict in.
pub fn validated(result: ValidationResult) -> StateUpdate {
    let trace = format!(
        "VALIDATING: {} with {} violation(s)",
        result.status,
        result.violations.len()
    );

    StateUpdate {
        validation_result: Some(result.status),
        violations: Some(result.violations),
        trace_entry: Some(trace),
        ..StateUpdate::default()
    }
}

/// FEEDBACK: record the correction text and count the retry.
pub fn feedback_step(state: &AuditState, feedback: String, max_retries: u32) -> StateUpdate {
    let retry_count = state.retry_count + 1;

    StateUpdate {
        feedback_entry: Some(feedback),
        retry_count: Some(retry_count),
        trace_entry: Some(format!("FEEDBACK: retry {}/{}", retry_count, max_retries)),
        ..StateUpdate::default()
    }
}

/// REPORTING: build the final report from the current state.
pub fn report_step(state: &AuditState) -> StateUpdate {
    let report = build_report(state);
    StateUpdate {
        trace_entry: report.trace.last().cloned(),
        final_report: Some(report),
        ..StateUpdate::default()
    }
}

/// Final report for `state`, treating anything but APPROVED as a run that
/// ran out of retries.
pub fn build_report(state: &AuditState) -> FinalReport {
    let (status, outcome) = match state.validation_result {
        ValidationStatus::Approved => (ReportStatus::Approved, AuditOutcome::Approved),
        ValidationStatus::Rejected | ValidationStatus::Pending => {
            (ReportStatus::Rejected, AuditOutcome::RetriesExhausted)
        }
    };

    let mut trace = state.trace.clone();
    trace.push(format!("REPORTING: {}", outcome));

    FinalReport {
        audit_id: Uuid::new_v4(),
        status,
        outcome,
        confidence: state.reasoning_output.confidence,
        details: state.reasoning_output.clone(),
        violations: state.violations.clone(),
        feedback_history: state.feedback_history.clone(),
        retry_count: state.retry_count,
        trace,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use serde_json::json;

    fn violation() -> Violation {
        Violation {
            rule_id: "R001".to_string(),
            rule_name: "balance".to_string(),
            severity: Severity::Critical,
            expected: "a = b".to_string(),
            actual: "1".to_string(),
            correction_hint: "check".to_string(),
        }
    }

    fn state_with(status: ValidationStatus, retry_count: u32) -> AuditState {
        let mut state = AuditState::new(json!({}));
        state.validation_result = status;
        state.retry_count = retry_count;
        state
    }

    #[test]
    fn test_initial_state() {
        let state = AuditState::new(json!("doc"));
        assert_eq!(state.retry_count, 0);
        assert_eq!(state.validation_result, ValidationStatus::Pending);
        assert!(state.feedback_history.is_empty());
        assert!(state.final_report.is_none());
        assert!(state.latest_feedback().is_none());
    }

    #[test]
    fn test_transition_table() {
        let pending = state_with(ValidationStatus::Pending, 0);
        assert_eq!(next_phase(AuditPhase::Init, &pending, 3), AuditPhase::Analyzing);
        assert_eq!(next_phase(AuditPhase::Analyzing, &pending, 3), AuditPhase::Validating);
        assert_eq!(next_phase(AuditPhase::Feedback, &pending, 3), AuditPhase::Analyzing);
        assert_eq!(next_phase(AuditPhase::Reporting, &pending, 3), AuditPhase::Done);

        let approved = state_with(ValidationStatus::Approved, 0);
        assert_eq!(next_phase(AuditPhase::Validating, &approved, 3), AuditPhase::Reporting);

        let rejected = state_with(ValidationStatus::Rejected, 2);
        assert_eq!(next_phase(AuditPhase::Validating, &rejected, 3), AuditPhase::Feedback);

        let exhausted = state_with(ValidationStatus::Rejected, 3);
        assert_eq!(next_phase(AuditPhase::Validating, &exhausted, 3), AuditPhase::Reporting);

        let no_retries = state_with(ValidationStatus::Rejected, 0);
        assert_eq!(next_phase(AuditPhase::Validating, &no_retries, 0), AuditPhase::Reporting);
    }

    #[test]
    fn test_steps_fold_into_state() {
        let output = ReasoningOutput {
            conclusion: "unbalanced".to_string(),
            confidence: 0.7,
            reasoning_chain: vec![],
            extracted_data: json!({"assets": {"total": 5}}).as_object().cloned().unwrap(),
        };

        let state = AuditState::new(json!({}))
            .apply(analyzed("test", output))
            .apply(validated(ValidationResult::from_violations(vec![violation()])));

        assert!(state.extracted_data.contains_key("assets"));
        assert_eq!(state.reasoning_output.conclusion, "unbalanced");
        assert_eq!(state.validation_result, ValidationStatus::Rejected);
        assert_eq!(state.violations.len(), 1);

        let update = feedback_step(&state, "fix R001".to_string(), 3);
        let state = state.apply(update);
        assert_eq!(state.retry_count, 1);
        assert_eq!(state.latest_feedback(), Some("fix R001"));

        let update = feedback_step(&state, "fix R001 again".to_string(), 3);
        let state = state.apply(update);
        assert_eq!(state.feedback_history, vec!["fix R001", "fix R001 again"]);
        assert_eq!(state.latest_feedback(), Some("fix R001 again"));
    }

    #[test]
    fn test_report_distinguishes_outcomes() {
        let mut approved = state_with(ValidationStatus::Approved, 1);
        approved.reasoning_output.confidence = 0.85;
        let report = approved.clone().apply(report_step(&approved)).final_report.unwrap();
        assert_eq!(report.confidence, 0.85);
        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.outcome, AuditOutcome::Approved);
        assert_eq!(report.retry_count, 1);

        let rejected = state_with(ValidationStatus::Rejected, 3);
        let report = rejected.clone().apply(report_step(&rejected)).final_report.unwrap();
        assert_eq!(report.status, ReportStatus::Rejected);
        assert_eq!(report.outcome, AuditOutcome::RetriesExhausted);
        assert_eq!(report.trace.last().map(String::as_str), Some("REPORTING: retries exhausted while still rejected"));
    }
}
