//! FinCode audit verification loop
//!
//! Reconciles a non-deterministic reasoning backend with a deterministic
//! rule engine:
//! - The reasoning adapter extracts figures and a conclusion from document data
//! - The rule engine checks those figures against JSON-encoded audit rules
//! - Violations are turned into feedback and re-injected, up to a retry ceiling
//! - Every run ends in a status-bearing final report
//!
//! UNIFIED LOOP:
//! INIT → ANALYZING → VALIDATING → FEEDBACK? → REPORTING → DONE

pub mod audit;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod reasoning;
pub mod rules;

pub use error::{AuditError, Result};

// Re-export common types
pub use models::*;
pub use orchestrator::{AuditOrchestrator, OrchestratorConfig};
pub use reasoning::{create_adapter, ReasoningAdapter};
pub use rules::RuleEngine;
