//! Wire projection of scan results.
//!
//! The wire format is privacy-safe by construction: the projection types
//! simply have no fields for input text, matched text, context windows, or
//! pattern strings, so nothing sensitive can leak through serialization.
//! Tests additionally scan the serialized output for the forbidden keys.

use super::ScanResult;
use crate::engine::{Detection, DetectionLayer};
use crate::ml::L2Scores;
use serde::Serialize;

/// Keys that must never appear in serialized output.
pub const FORBIDDEN_KEYS: &[&str] = &[
    "prompt",
    "prompt_text",
    "response",
    "response_text",
    "system_prompt",
    "context",
    "raw_text",
    "input_text",
    "output_text",
    "user_input",
    "matched_text",
    "trigger_matches",
    "why_it_hit",
];

/// One detection, projected for the wire. No matches, no text.
#[derive(Debug, Clone, Serialize)]
pub struct WireDetection {
    pub rule_id: String,
    pub rule_version: String,
    pub severity: String,
    pub confidence: f64,
    pub layer: DetectionLayer,
    pub category: String,
    pub match_count: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_flagged: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<String>,
}

/// Projection of the ML layer metadata that is allowed on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct WireL2Metadata {
    pub is_attack: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<L2Scores>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
    pub uncertain: bool,
    pub model_version: String,
    pub processing_time_ms: f64,
}

/// The privacy-safe scan result.
#[derive(Debug, Clone, Serialize)]
pub struct WireScanResult {
    pub has_threats: bool,
    /// Lowercase severity of the worst retained detection.
    pub severity: Option<String>,
    /// Lowercase enforcement action (`allow`, `block`, `flag`, `log`).
    pub action: String,
    pub detections: Vec<WireDetection>,
    pub scan_duration_ms: f64,
    /// SHA-256 hex of the scanned input.
    pub prompt_hash: String,
    pub l1_detections: usize,
    pub l2_detections: usize,
    pub mode: String,
    pub execution_mode: String,
    pub l1_enabled: bool,
    pub l2_enabled: bool,
    pub confidence_threshold: f64,
    pub l2_cancelled: bool,
    pub l2_timeout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub l2: Option<WireL2Metadata>,
}

fn project_detection(detection: &Detection) -> WireDetection {
    WireDetection {
        rule_id: detection.rule_id.clone(),
        rule_version: detection.rule_version.clone(),
        severity: detection.severity.as_str().to_string(),
        confidence: detection.confidence,
        layer: detection.detection_layer,
        category: detection.category.clone(),
        match_count: detection.matches.len(),
        is_flagged: detection.is_flagged,
        suppression_reason: detection.suppression_reason.clone(),
    }
}

/// Project an internal result to the wire shape.
pub fn to_wire(result: &ScanResult) -> WireScanResult {
    let l2 = result.l2_result.as_ref().map(|l2_result| {
        let top = l2_result.predictions.first();
        WireL2Metadata {
            is_attack: l2_result.has_predictions(),
            family: top.map(|p| p.metadata.family.clone()),
            sub_family: top.map(|p| p.metadata.sub_family.clone()),
            scores: top.map(|p| p.metadata.scores.clone()),
            recommended_action: top.map(|p| p.metadata.recommended_action.clone()),
            uncertain: top.map(|p| p.metadata.uncertain).unwrap_or(false),
            model_version: l2_result.model_version.clone(),
            processing_time_ms: l2_result.processing_time_ms,
        }
    });

    WireScanResult {
        has_threats: result.has_threats,
        severity: result.combined_severity.map(|s| s.as_str().to_string()),
        action: result.action.as_str().to_string(),
        detections: result.detections.iter().map(project_detection).collect(),
        scan_duration_ms: result.total_duration_ms,
        prompt_hash: result.text_hash.clone(),
        l1_detections: result.l1_detections,
        l2_detections: result.l2_detections,
        mode: result.metadata.mode.to_string(),
        execution_mode: result.metadata.execution_mode.as_str().to_string(),
        l1_enabled: result.metadata.l1_enabled,
        l2_enabled: result.metadata.l2_enabled,
        confidence_threshold: result.metadata.confidence_threshold,
        l2_cancelled: result.metadata.l2_cancelled,
        l2_timeout: result.metadata.l2_timeout,
        l2,
    }
}
