//! Audit orchestrator - drives the verification loop
//!
//! ANALYZE → VALIDATE → FEEDBACK? → REPORT
//!
//! One run is a strictly sequential chain of steps over its own
//! [`AuditState`]. The reasoning adapter and rule engine are shared,
//! read-only collaborators, so any number of runs may execute concurrently
//! against the same orchestrator.

pub mod state;

pub use state::{next_phase, AuditPhase, AuditState, StateUpdate};

use crate::config::{Settings, DEFAULT_MAX_RETRIES};
use crate::models::{FinalReport, ReasoningOutput};
use crate::reasoning::ReasoningAdapter;
use crate::rules::RuleEngine;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Slack on top of the adapter's own HTTP timeout, so the adapter's more
/// specific error wins when both fire.
const TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_retries: u32,
    /// Upper bound on a single `analyze` call.
    pub analyze_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            analyze_timeout: Duration::from_secs(120),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_retries,
            analyze_timeout: settings.request_timeout + TIMEOUT_GRACE,
        }
    }
}

/// Orchestrator coordinating reasoning and rule validation
pub struct AuditOrchestrator {
    adapter: Arc<dyn ReasoningAdapter>,
    engine: Arc<RuleEngine>,
    config: OrchestratorConfig,
}

impl AuditOrchestrator {
    pub fn new(
        adapter: Arc<dyn ReasoningAdapter>,
        engine: Arc<RuleEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            adapter,
            engine,
            config,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Run one audit to completion. Never fails: every run ends in a
    /// status-bearing report, whether approved or out of retries.
    ///
    /// `rule_subset` restricts validation to the given rule ids.
    pub async fn run(&self, raw_input: Value, rule_subset: Option<&[String]>) -> FinalReport {
        let mut state = self.run_to_completion(raw_input, rule_subset).await;
        state
            .final_report
            .take()
            .unwrap_or_else(|| state::build_report(&state))
    }

    /// Drive the state machine until DONE and return the final state.
    pub async fn run_to_completion(
        &self,
        raw_input: Value,
        rule_subset: Option<&[String]>,
    ) -> AuditState {
        let max_retries = self.config.max_retries;
        let mut state = AuditState::new(raw_input);
        let mut phase = AuditPhase::Init;

        info!(
            backend = self.adapter.name(),
            rules = self.engine.len(),
            max_retries,
            "Audit run starting"
        );

        while phase != AuditPhase::Done {
            let update = match phase {
                AuditPhase::Init => StateUpdate::default(),
                AuditPhase::Analyzing => {
                    let output = self
                        .analyze_bounded(&state.raw_input, state.latest_feedback())
                        .await;
                    state::analyzed(self.adapter.name(), output)
                }
                AuditPhase::Validating => state::validated(
                    self.engine
                        .validate_subset(&state.reasoning_output, rule_subset),
                ),
                AuditPhase::Feedback => {
                    let feedback = self.engine.generate_feedback(&state.violations);
                    state::feedback_step(&state, feedback, max_retries)
                }
                AuditPhase::Reporting => state::report_step(&state),
                AuditPhase::Done => StateUpdate::default(),
            };

            state = state.apply(update);
            debug_assert!(state.retry_count <= max_retries);

            let next = next_phase(phase, &state, max_retries);
            debug!(
                from = %phase,
                to = %next,
                retry_count = state.retry_count,
                status = %state.validation_result,
                "Audit transition"
            );

            if phase == AuditPhase::Feedback {
                warn!(
                    retry_count = state.retry_count,
                    violations = state.violations.len(),
                    "Validation rejected - re-analyzing with feedback"
                );
            }

            phase = next;
        }

        info!(
            status = %state.validation_result,
            retry_count = state.retry_count,
            violations = state.violations.len(),
            "Audit run complete"
        );

        state
    }

    /// Call the adapter under the orchestrator's timeout. Expiry degrades
    /// exactly like any other backend failure.
    async fn analyze_bounded(&self, data: &Value, feedback: Option<&str>) -> ReasoningOutput {
        let limit = self.config.analyze_timeout;
        match tokio::time::timeout(limit, self.adapter.analyze(data, feedback)).await {
            Ok(output) => output,
            Err(_) => {
                warn!(
                    backend = self.adapter.name(),
                    timeout_ms = limit.as_millis() as u64,
                    "Reasoning call timed out"
                );
                ReasoningOutput::degraded(format!(
                    "reasoning call timed out after {} ms",
                    limit.as_millis()
                ))
            }
        }
    }
}
