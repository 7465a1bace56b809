//! Checks the shipped rule library against the balance-sheet scenarios.

use fincode_audit::models::{ReasoningOutput, Severity, ValidationStatus};
use fincode_audit::RuleEngine;
use serde_json::{json, Value};
use std::path::PathBuf;

fn rules_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("rules")
}

fn output(data: Value) -> ReasoningOutput {
    ReasoningOutput {
        conclusion: String::new(),
        confidence: 0.9,
        reasoning_chain: vec![],
        extracted_data: data.as_object().cloned().unwrap(),
    }
}

#[test]
fn loads_every_shipped_rule() {
    let mut engine = RuleEngine::new();
    assert_eq!(engine.load(rules_dir(), None), 3);

    let ids: Vec<&str> = engine.rules().iter().map(|r| r.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["R001", "R002", "R003"]);
    assert_eq!(engine.rules()[0].severity, Severity::Critical);
}

#[test]
fn category_filter_applies_to_library() {
    let mut engine = RuleEngine::new();
    assert_eq!(engine.load(rules_dir(), Some("accounting")), 3);

    let mut none = RuleEngine::new();
    assert_eq!(none.load(rules_dir(), Some("tax")), 0);
}

#[test]
fn full_balance_sheet_passes_library() {
    let mut engine = RuleEngine::new();
    engine.load(rules_dir(), None);

    let result = engine.validate(&output(json!({
        "assets": {"total": 5000000, "current": 3200000, "non_current": 1800000},
        "liabilities": {"total": 3000000, "current": 2100000, "non_current": 900000},
        "equity": {"total": 2000000}
    })));

    assert_eq!(result.status, ValidationStatus::Approved);
    assert!(!result.retry_allowed);
}

#[test]
fn unbalanced_sheet_flags_only_the_balance_rule() {
    let mut engine = RuleEngine::new();
    engine.load(rules_dir(), None);

    let subset = vec!["R001".to_string()];
    let result = engine.validate_subset(
        &output(json!({
            "assets": {"total": 5000000},
            "liabilities": {"total": 3000000},
            "equity": {"total": 1500000}
        })),
        Some(&subset),
    );

    assert_eq!(result.status, ValidationStatus::Rejected);
    assert_eq!(result.violations.len(), 1);
    assert_eq!(result.violations[0].rule_id, "R001");
    assert_eq!(result.violations[0].actual, "450万");
    assert!(result.retry_allowed);
}

#[test]
fn passthrough_audit_over_library_reaches_a_verdict() {
    use fincode_audit::reasoning::PassthroughAdapter;
    use fincode_audit::{AuditOrchestrator, AuditOutcome, OrchestratorConfig, ReportStatus};
    use std::sync::Arc;

    let mut engine = RuleEngine::new();
    engine.load(rules_dir(), None);
    let orchestrator = AuditOrchestrator::new(
        Arc::new(PassthroughAdapter),
        Arc::new(engine),
        OrchestratorConfig::default(),
    );

    // breakdown fields are missing, so R002/R003 stay unresolved on every round
    let report = tokio_test::block_on(orchestrator.run(
        json!({
            "assets": {"total": 5000000},
            "liabilities": {"total": 3000000},
            "equity": {"total": 2000000}
        }),
        None,
    ));

    assert_eq!(report.status, ReportStatus::Rejected);
    assert_eq!(report.outcome, AuditOutcome::RetriesExhausted);
    assert_eq!(report.retry_count, 3);
    let ids: Vec<&str> = report.violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["R002", "R003"]);
}
