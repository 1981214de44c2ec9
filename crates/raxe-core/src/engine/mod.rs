//! L1 execution: applying compiled rules to text.

mod executor;

pub use executor::{ExecutorConfig, RuleExecutor};

use chrono::{DateTime, Utc};
use raxe_common::Severity;
use serde::Serialize;

/// A single successful regex application.
///
/// Carries raw text, so it deliberately does not implement `Serialize`:
/// the wire projection has no way to include it.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Index of the pattern within its rule.
    pub pattern_index: usize,
    pub start: usize,
    pub end: usize,
    pub matched_text: String,
    /// Capture groups 1.., `None` for groups that did not participate.
    pub groups: Vec<Option<String>>,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
}

/// Which layer produced a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DetectionLayer {
    L1,
    L2,
    Plugin,
}

/// A rule-level finding: one per matching rule, aggregating every match
/// across that rule's patterns. Like [`Match`], not serializable; the wire
/// shape is a separate projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub rule_id: String,
    pub rule_version: String,
    pub severity: Severity,
    pub confidence: f64,
    pub matches: Vec<Match>,
    pub detected_at: DateTime<Utc>,
    pub detection_layer: DetectionLayer,
    pub layer_latency_ms: f64,
    /// Family (L1) or threat type (L2).
    pub category: String,
    pub message: String,
    pub is_flagged: bool,
    pub suppression_reason: Option<String>,
}

impl Detection {
    pub fn versioned_rule_id(&self) -> String {
        format!("{}@{}", self.rule_id, self.rule_version)
    }

    /// Offset of the earliest match, for ordering.
    pub fn first_match_start(&self) -> usize {
        self.matches.iter().map(|m| m.start).min().unwrap_or(0)
    }
}

/// Output of the rule layer for one scan.
#[derive(Debug, Clone, Default)]
pub struct L1ScanResult {
    pub detections: Vec<Detection>,
    pub duration_ms: f64,
    pub rules_evaluated: usize,
    /// Patterns abandoned on their matching budget.
    pub pattern_timeouts: u64,
}

impl L1ScanResult {
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }

    pub fn detection_count(&self) -> usize {
        self.detections.len()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.detections.iter().map(|d| d.severity).max()
    }
}
