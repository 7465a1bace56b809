//! Rule engine for deterministic audit checks
//!
//! Loads JSON rule records once at startup, evaluates them against the
//! figures a reasoning backend extracted, and renders violations plus the
//! feedback text that is re-injected on retry.
//!
//! The loaded rule set is immutable; share the engine behind an `Arc` and
//! call [`RuleEngine::validate`] from as many runs as needed.

pub mod expression;

pub use expression::{evaluate, EvalFault, Expression, Resolved};

use crate::config::DEFAULT_TOLERANCE;
use crate::error::AuditError;
use crate::models::{ReasoningOutput, Severity, ValidationResult, Violation};
use crate::Result;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Amounts at or above this are printed in 万 (ten-thousands).
const WAN: f64 = 10_000.0;

/// Immutable rule definition
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    pub rule_id: String,
    pub name: String,
    pub category: String,
    pub severity: Severity,
    pub expression: Expression,
    pub correction_hint: String,
}

/// On-disk record shape
#[derive(Debug, Deserialize)]
struct RuleRecord {
    rule_id: String,
    name: String,
    category: String,
    severity: Severity,
    expression: Value,
    correction_hint: String,
}

impl RuleDefinition {
    /// Decode one rule record. `source_name` only labels errors.
    pub fn from_json(value: &Value, source_name: &str) -> Result<Self> {
        let record: RuleRecord = serde_json::from_value(value.clone())
            .map_err(|e| AuditError::rule_load(source_name, e.to_string()))?;

        if record.rule_id.trim().is_empty() {
            return Err(AuditError::rule_load(source_name, "rule_id is empty"));
        }

        let expression = Expression::from_json(&record.expression)
            .map_err(|e| AuditError::rule_load(source_name, format!("{}: {}", record.rule_id, e)))?;

        Ok(Self {
            rule_id: record.rule_id.trim().to_string(),
            name: record.name,
            category: record.category,
            severity: record.severity,
            expression,
            correction_hint: record.correction_hint,
        })
    }
}

/// Rule engine holding the loaded rule set
pub struct RuleEngine {
    rules: Vec<RuleDefinition>,
    default_tolerance: f64,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self::with_tolerance(DEFAULT_TOLERANCE)
    }

    /// Engine whose `equals` nodes default to `tolerance` instead of 0.01.
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self {
            rules: Vec::new(),
            default_tolerance: tolerance,
        }
    }

    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Load every `*.json` file under `dir`, recursively.
    ///
    /// A file may hold one record or an array of records. Unreadable files
    /// and malformed records are logged and skipped. Returns the number of
    /// rules added by this call.
    pub fn load(&mut self, dir: impl AsRef<Path>, category: Option<&str>) -> usize {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(path = %dir.display(), "Rules directory not found, no rules loaded");
            return 0;
        }

        let mut loaded = 0;

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read rules directory entry");
                    continue;
                }
            };

            let path = entry.path();
            let is_json = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !entry.file_type().is_file() || !is_json {
                continue;
            }

            let source_name = path.display().to_string();
            let parsed = std::fs::read_to_string(path)
                .map_err(AuditError::from)
                .and_then(|text| serde_json::from_str::<Value>(&text).map_err(AuditError::from));

            let document = match parsed {
                Ok(document) => document,
                Err(e) => {
                    warn!(source = %source_name, error = %e, "Skipping unreadable rule file");
                    continue;
                }
            };

            match document {
                Value::Array(records) => {
                    for (i, record) in records.iter().enumerate() {
                        let name = format!("{}[{}]", source_name, i);
                        if self.ingest(&name, record, category) {
                            loaded += 1;
                        }
                    }
                }
                record => {
                    if self.ingest(&source_name, &record, category) {
                        loaded += 1;
                    }
                }
            }
        }

        info!(
            path = %dir.display(),
            category = category.unwrap_or("*"),
            loaded,
            total = self.rules.len(),
            "Rules loaded"
        );

        loaded
    }

    /// Load rules from already-decoded records.
    pub fn load_records<I>(&mut self, records: I, category: Option<&str>) -> usize
    where
        I: IntoIterator<Item = Value>,
    {
        let mut loaded = 0;
        for (i, record) in records.into_iter().enumerate() {
            if self.ingest(&format!("record[{}]", i), &record, category) {
                loaded += 1;
            }
        }
        loaded
    }

    fn ingest(&mut self, source_name: &str, record: &Value, category: Option<&str>) -> bool {
        let rule = match RuleDefinition::from_json(record, source_name) {
            Ok(rule) => rule,
            Err(e) => {
                warn!(error = %e, "Skipping malformed rule record");
                return false;
            }
        };

        if let Some(wanted) = category {
            if !rule.category.eq_ignore_ascii_case(wanted) {
                debug!(rule_id = %rule.rule_id, category = %rule.category, "Rule filtered out by category");
                return false;
            }
        }

        if self.rules.iter().any(|r| r.rule_id == rule.rule_id) {
            warn!(rule_id = %rule.rule_id, source = source_name, "Duplicate rule_id, keeping the first definition");
            return false;
        }

        self.rules.push(rule);
        true
    }

    /// Evaluate a single expression with this engine's default tolerance.
    pub fn evaluate(
        &self,
        expression: &Expression,
        data: &Map<String, Value>,
    ) -> std::result::Result<Resolved, EvalFault> {
        evaluate(expression, data, self.default_tolerance)
    }

    /// Validate against every loaded rule.
    pub fn validate(&self, output: &ReasoningOutput) -> ValidationResult {
        self.validate_subset(output, None)
    }

    /// Validate against the loaded rules whose ids appear in `subset`
    /// (all rules when `None`).
    pub fn validate_subset(
        &self,
        output: &ReasoningOutput,
        subset: Option<&[String]>,
    ) -> ValidationResult {
        let selected: Option<HashSet<&str>> =
            subset.map(|ids| ids.iter().map(|id| id.as_str()).collect());

        let mut violations = Vec::new();
        let mut evaluated = 0usize;

        for rule in &self.rules {
            if let Some(ids) = &selected {
                if !ids.contains(rule.rule_id.as_str()) {
                    continue;
                }
            }
            evaluated += 1;

            match self.check_rule(rule, &output.extracted_data) {
                Ok(None) => {}
                Ok(Some(violation)) => violations.push(violation),
                Err(e) => {
                    warn!(rule_id = %rule.rule_id, error = %e, "Rule evaluation failed, skipping rule");
                }
            }
        }

        let result = ValidationResult::from_violations(violations);

        info!(
            rule_count = evaluated,
            violations = result.violations.len(),
            status = %result.status,
            "Validation completed"
        );

        result
    }

    fn check_rule(
        &self,
        rule: &RuleDefinition,
        data: &Map<String, Value>,
    ) -> Result<Option<Violation>> {
        let fault = |e: EvalFault| AuditError::rule_eval(&rule.rule_id, e.to_string());

        let verdict = self.evaluate(&rule.expression, data).map_err(fault)?;
        match verdict {
            Resolved::Bool(true) => return Ok(None),
            Resolved::Bool(false) | Resolved::Unresolved => {}
            Resolved::Number(_) => {
                return Err(AuditError::rule_eval(
                    &rule.rule_id,
                    "expression yields a number, not a verdict",
                ))
            }
        }

        // The right-hand side of the equation is reported as the observed figure.
        let (expected, observed) = match &rule.expression {
            Expression::Equals { left, right, .. } => (
                format!("{} = {}", left.describe(), right.describe()),
                self.evaluate(right, data).map_err(fault)?,
            ),
            other => (other.describe(), verdict),
        };

        let actual = match observed {
            Resolved::Unresolved => {
                let missing = rule.expression.missing_paths(data);
                if missing.is_empty() {
                    "unresolved".to_string()
                } else {
                    format!("unresolved (missing: {})", missing.join(", "))
                }
            }
            value => format_resolved(value),
        };

        Ok(Some(Violation {
            rule_id: rule.rule_id.clone(),
            rule_name: rule.name.clone(),
            severity: rule.severity,
            expected,
            actual,
            correction_hint: rule.correction_hint.clone(),
        }))
    }

    /// Render violations as correction text for the next reasoning request.
    pub fn generate_feedback(&self, violations: &[Violation]) -> String {
        render_feedback(violations)
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Feedback block enumerating each violation. Empty input yields "".
pub fn render_feedback(violations: &[Violation]) -> String {
    if violations.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(violations.len() + 1);
    lines.push(
        "The following rule checks failed. Re-examine the source data and correct the extracted figures:"
            .to_string(),
    );

    for v in violations {
        lines.push(format!(
            "- [{}] {} ({}): expected {}, actual {}. Hint: {}",
            v.rule_id, v.rule_name, v.severity, v.expected, v.actual, v.correction_hint
        ));
    }

    lines.join("\n")
}

/// Format an amount, scaling to 万 at 10,000 and above.
///
/// `5_000_000.0` → `"500万"`, `9_999.0` → `"9999"`.
pub fn format_amount(value: f64) -> String {
    if value >= WAN {
        let scaled = (value / WAN * 10_000.0).round() / 10_000.0;
        format!("{}万", scaled)
    } else {
        format!("{}", value)
    }
}

fn format_resolved(value: Resolved) -> String {
    match value {
        Resolved::Number(v) => format_amount(v),
        Resolved::Bool(b) => b.to_string(),
        Resolved::Unresolved => "unresolved".to_string(),
    }
}

//
// ================= Tests =================
//
