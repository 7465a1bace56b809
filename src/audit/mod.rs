//! Audit trail and service entry point
//!
//! Final reports are kept in memory with a SHA-256 digest so a stored
//! report can be checked for tampering and replayed by id. The log is
//! bounded; once full, the oldest record is evicted first.

use crate::models::FinalReport;
use crate::orchestrator::AuditOrchestrator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub report: Arc<FinalReport>,
    pub report_hash: String,
}

pub const DEFAULT_LOG_CAPACITY: usize = 1024;

#[derive(Default)]
struct LogEntries {
    records: HashMap<Uuid, AuditRecord>,
    /// Insertion order, oldest first.
    order: VecDeque<Uuid>,
}

/// Audit trail storage
pub struct AuditLog {
    entries: Arc<RwLock<LogEntries>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Log holding at most `capacity` reports (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(LogEntries::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a final report, keyed by its audit id
    pub async fn record(&self, report: FinalReport) -> Uuid {
        let audit_id = report.audit_id;
        let record = AuditRecord {
            audit_id,
            created_at: report.created_at,
            report_hash: compute_report_hash(&report),
            report: Arc::new(report),
        };

        let mut entries = self.entries.write().await;
        if entries.records.insert(audit_id, record).is_none() {
            entries.order.push_back(audit_id);
        }

        while entries.order.len() > self.capacity {
            if let Some(evicted) = entries.order.pop_front() {
                entries.records.remove(&evicted);
                debug!(audit_id = %evicted, "Evicted oldest audit record");
            }
        }

        audit_id
    }

    pub async fn get(&self, audit_id: Uuid) -> Option<AuditRecord> {
        let entries = self.entries.read().await;
        entries.records.get(&audit_id).cloned()
    }

    /// Most recent audit ids first
    pub async fn list_recent(&self, limit: usize) -> Vec<Uuid> {
        let entries = self.entries.read().await;

        let mut items: Vec<_> = entries
            .records
            .values()
            .map(|record| (record.audit_id, record.created_at))
            .collect();

        items.sort_by(|a, b| b.1.cmp(&a.1));

        items.into_iter().take(limit).map(|(id, _)| id).collect()
    }

    /// Recompute a stored report's digest and compare
    pub async fn verify_integrity(&self, audit_id: Uuid) -> bool {
        let entries = self.entries.read().await;

        match entries.records.get(&audit_id) {
            Some(record) => compute_report_hash(&record.report) == record.report_hash,
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.records.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute SHA256 hash of a report for integrity verification
/// Uses zero-copy streaming serialization into hasher
pub fn compute_report_hash(report: &FinalReport) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), report).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Runs audits and keeps their reports
pub struct AuditService {
    orchestrator: Arc<AuditOrchestrator>,
    log: AuditLog,
}

impl AuditService {
    pub fn new(orchestrator: Arc<AuditOrchestrator>) -> Self {
        Self::with_log(orchestrator, AuditLog::new())
    }

    pub fn with_log(orchestrator: Arc<AuditOrchestrator>, log: AuditLog) -> Self {
        Self { orchestrator, log }
    }

    /// Run an audit over `raw_input` and return its id
    pub async fn start_audit(&self, raw_input: Value, rule_subset: Option<Vec<String>>) -> Uuid {
        let report = self
            .orchestrator
            .run(raw_input, rule_subset.as_deref())
            .await;

        info!(
            audit_id = %report.audit_id,
            status = ?report.status,
            retry_count = report.retry_count,
            "Audit recorded"
        );

        self.log.record(report).await
    }

    pub async fn get_result(&self, audit_id: Uuid) -> Option<Arc<FinalReport>> {
        self.log.get(audit_id).await.map(|record| record.report)
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }
}
