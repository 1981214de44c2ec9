//! L2: the ML detection layer.
//!
//! The detector sits behind the [`L2Detector`] trait with three
//! implementations: a stub (always available), a single-model ONNX folder,
//! and a two-model bundle (separate embedder + classifier). Discovery picks
//! the best available at engine construction; loading failures degrade to
//! the stub so the engine stays up.

pub mod cache;
pub mod detector;
#[cfg(feature = "onnx")]
mod onnx;
pub mod voting;

pub use cache::{CacheStats, EmbeddingCache};
pub use detector::{discover_detector, L2Detector, ModelInfo, StubDetector};

use crate::engine::L1ScanResult;
use serde::Serialize;
use std::collections::BTreeMap;

/// Semantic threat classes produced by the ML layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum L2ThreatType {
    SemanticJailbreak,
    EncodedInjection,
    ContextManipulation,
    PrivilegeEscalation,
    DataExfilPattern,
    ObfuscatedCommand,
    Unknown,
}

impl L2ThreatType {
    /// Lowercase identifier, used for synthetic L2 rule IDs.
    pub fn as_str(&self) -> &'static str {
        match self {
            L2ThreatType::SemanticJailbreak => "semantic_jailbreak",
            L2ThreatType::EncodedInjection => "encoded_injection",
            L2ThreatType::ContextManipulation => "context_manipulation",
            L2ThreatType::PrivilegeEscalation => "privilege_escalation",
            L2ThreatType::DataExfilPattern => "data_exfil_pattern",
            L2ThreatType::ObfuscatedCommand => "obfuscated_command",
            L2ThreatType::Unknown => "unknown",
        }
    }

    /// Map a model family label onto the protocol threat type.
    pub fn from_family(family: &str) -> Self {
        match family {
            "jailbreak" => L2ThreatType::SemanticJailbreak,
            "prompt_injection" => L2ThreatType::ContextManipulation,
            "command_injection" => L2ThreatType::ObfuscatedCommand,
            "encoding" => L2ThreatType::EncodedInjection,
            "data_exfiltration" | "pii_exposure" => L2ThreatType::DataExfilPattern,
            "bias_manipulation" => L2ThreatType::PrivilegeEscalation,
            _ => L2ThreatType::Unknown,
        }
    }
}

/// Per-head score bundle attached to a prediction.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct L2Scores {
    pub attack_probability: f64,
    pub family_confidence: f64,
    pub subfamily_confidence: f64,
}

/// Structured prediction metadata: the explainability bundle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct L2PredictionBundle {
    pub family: String,
    pub sub_family: String,
    pub scores: L2Scores,
    pub why_it_hit: String,
    /// `allow`, `review`, or `block`.
    pub recommended_action: String,
    pub uncertain: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<raxe_common::Severity>,
}

/// One ML finding.
#[derive(Debug, Clone, Serialize)]
pub struct L2Prediction {
    pub threat_type: L2ThreatType,
    pub confidence: f64,
    pub explanation: String,
    pub features_used: Vec<String>,
    pub metadata: L2PredictionBundle,
}

/// Non-fatal bookkeeping attached to an [`L2Result`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct L2ResultMetadata {
    pub is_stub: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Output of the ML layer for one scan. Failures never escape the detector;
/// they come back as an empty result with `metadata.error` set.
#[derive(Debug, Clone, Serialize)]
pub struct L2Result {
    /// Ordered by confidence, highest first.
    pub predictions: Vec<L2Prediction>,
    /// Aggregate confidence in the result.
    pub confidence: f64,
    pub processing_time_ms: f64,
    pub model_version: String,
    pub features_extracted: BTreeMap<String, serde_json::Value>,
    pub metadata: L2ResultMetadata,
}

impl L2Result {
    /// An empty result (no predictions), e.g. from the stub.
    pub fn empty(model_version: impl Into<String>, processing_time_ms: f64) -> Self {
        Self {
            predictions: Vec::new(),
            confidence: 0.0,
            processing_time_ms,
            model_version: model_version.into(),
            features_extracted: BTreeMap::new(),
            metadata: L2ResultMetadata::default(),
        }
    }

    /// An empty result carrying a layer-local error.
    pub fn failed(
        model_version: impl Into<String>,
        processing_time_ms: f64,
        error: impl Into<String>,
    ) -> Self {
        let mut result = Self::empty(model_version, processing_time_ms);
        result.metadata.error = Some(error.into());
        result
    }

    pub fn has_predictions(&self) -> bool {
        !self.predictions.is_empty()
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    pub fn highest_confidence(&self) -> f64 {
        self.predictions
            .iter()
            .map(|p| p.confidence)
            .fold(0.0, f64::max)
    }

    /// Enforce the confidence-descending prediction order.
    pub fn sort_predictions(&mut self) {
        self.predictions
            .sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    }

    /// Standard feature bookkeeping shared by all detector implementations.
    pub fn record_input_features(&mut self, text: &str, l1: Option<&L1ScanResult>) {
        self.features_extracted.insert(
            "text_length".into(),
            serde_json::Value::from(text.chars().count()),
        );
        self.features_extracted.insert(
            "l1_detections".into(),
            serde_json::Value::from(l1.map(L1ScanResult::detection_count).unwrap_or(0)),
        );
        self.features_extracted.insert(
            "l1_highest_severity".into(),
            serde_json::Value::from(
                l1.and_then(L1ScanResult::highest_severity)
                    .map(|s| s.as_str().to_string())
                    .unwrap_or_else(|| "none".to_string()),
            ),
        );
    }
}
