//! The scan pipeline: orchestration, result envelope, wire projection.

mod pipeline;
mod serializer;

pub use pipeline::{Raxe, RaxeBuilder};
pub use serializer::{to_wire, WireDetection, WireL2Metadata, WireScanResult, FORBIDDEN_KEYS};

use crate::config::ScanMode;
use crate::engine::Detection;
use crate::ml::detector::ScanContext;
use crate::ml::L2Result;
use raxe_common::Severity;
use raxe_policy::{PolicyAction, PolicyDecision, Suppression};

/// Per-scan options. `None` fields fall back to the engine configuration;
/// explicit values win over both file and environment layers.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub mode: Option<ScanMode>,
    pub l1_enabled: Option<bool>,
    pub l2_enabled: Option<bool>,
    pub confidence_threshold: Option<f64>,
    /// Inline suppressions for this scan only.
    pub suppress: Vec<Suppression>,
    /// Include explainability detail on the result.
    pub explain: bool,
    /// Detect but skip enforcement and audit emission.
    pub dry_run: bool,
    pub max_text_length: Option<usize>,
    pub fail_fast_on_critical: Option<bool>,
    /// Customer scope for policy filtering, from the authenticated API key.
    pub customer_id: Option<String>,
    pub context: Option<ScanContext>,
}

impl ScanOptions {
    pub fn with_mode(mode: ScanMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// Shorthand for plain SUPPRESS patterns (`["pi-*"]`).
    pub fn suppress_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suppress
            .extend(patterns.into_iter().map(|p| Suppression::suppress(p)));
        self
    }

    pub fn suppress_with(mut self, suppression: Suppression) -> Self {
        self.suppress.push(suppression);
        self
    }
}

/// How the two layers were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sync,
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Parallel => "parallel",
        }
    }
}

/// Scan-level bookkeeping attached to every result.
#[derive(Debug, Clone)]
pub struct ScanMetadata {
    pub mode: ScanMode,
    pub l1_enabled: bool,
    pub l2_enabled: bool,
    pub confidence_threshold: f64,
    pub execution_mode: ExecutionMode,
    pub l2_cancelled: bool,
    pub l1_timeout: bool,
    pub l2_timeout: bool,
    /// (l1 + l2 duration) / wall duration; only meaningful in parallel mode.
    pub parallel_speedup: Option<f64>,
    pub l1_error: Option<String>,
    pub l2_error: Option<String>,
}

/// Result of one scan.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub scan_id: String,
    pub has_threats: bool,
    /// Retained detections, L1 first then L2, stable within each layer.
    pub detections: Vec<Detection>,
    pub l1_detections: usize,
    pub l2_detections: usize,
    /// Highest severity across retained detections (post policy override).
    pub combined_severity: Option<Severity>,
    /// Final enforcement action for the whole scan.
    pub action: PolicyAction,
    /// Per-detection policy decisions, keyed by versioned rule ID.
    pub policy_decisions: Vec<(String, PolicyDecision)>,
    pub l1_duration_ms: f64,
    pub l2_duration_ms: f64,
    pub total_duration_ms: f64,
    /// SHA-256 of the input, the only textual identifier of the scan.
    pub text_hash: String,
    pub inline_suppressed_count: usize,
    pub inline_flagged_count: usize,
    /// Full ML layer output, when L2 ran.
    pub l2_result: Option<L2Result>,
    pub metadata: ScanMetadata,
}

impl ScanResult {
    pub fn total_detections(&self) -> usize {
        self.detections.len()
    }

    /// CLI exit code contract: 0 clean, 1 threats.
    pub fn exit_code(&self) -> i32 {
        if self.has_threats {
            1
        } else {
            0
        }
    }
}

/// Severity of an action for picking the scan-level verdict: the most
/// restrictive per-detection decision wins the envelope.
pub(crate) fn action_rank(action: PolicyAction) -> u8 {
    match action {
        PolicyAction::Block => 3,
        PolicyAction::Flag => 2,
        PolicyAction::Log => 1,
        PolicyAction::Allow => 0,
    }
}
