use super::SuppressionAction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One append-only audit entry for a suppression application.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub pattern: String,
    pub reason: String,
    pub action: SuppressionAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Sink for suppression audit records.
///
/// The pipeline serializes emissions; implementations only need interior
/// mutability for their own storage. External shippers (SIEM, databases)
/// implement this outside the core.
pub trait SuppressionAuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// In-memory sink, mostly for tests and the default engine wiring.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().expect("audit sink lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("audit sink lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SuppressionAuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records
            .lock()
            .expect("audit sink lock poisoned")
            .push(record);
    }
}
