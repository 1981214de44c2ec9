//! Shared fixtures for the integration tests: an in-code rule pack and a
//! scripted L2 detector with controllable latency.

#![allow(dead_code)]

use raxe_common::{RuleFamily, Severity};
use raxe_core::engine::L1ScanResult;
use raxe_core::ml::detector::{L2Detector, ModelInfo, ScanContext};
use raxe_core::ml::{L2Prediction, L2PredictionBundle, L2Result, L2Scores, L2ThreatType};
use raxe_core::packs::{PackManifest, PackRule, PackType, RulePack};
use raxe_core::rules::{Pattern, PatternFlag, Rule, RuleExamples, RuleMetrics};
use std::time::{Duration, Instant};

pub fn rule(
    id: &str,
    family: RuleFamily,
    severity: Severity,
    confidence: f64,
    pattern: &str,
) -> Rule {
    Rule {
        rule_id: id.to_string(),
        version: "1.0.0".parse().unwrap(),
        family,
        sub_family: "test".into(),
        name: format!("Rule {id}"),
        description: String::new(),
        severity,
        confidence,
        patterns: vec![Pattern {
            pattern: pattern.to_string(),
            flags: vec![PatternFlag::Ignorecase],
            timeout: Duration::from_secs(5),
        }],
        examples: RuleExamples::default(),
        metrics: RuleMetrics::default(),
        mitre_attack: vec![],
        metadata: Default::default(),
        risk_explanation: String::new(),
        remediation_advice: String::new(),
        docs_url: String::new(),
    }
}

pub fn pack(id: &str, rules: Vec<Rule>) -> RulePack {
    let manifest = PackManifest {
        id: id.to_string(),
        version: "1.0.0".parse().unwrap(),
        name: format!("{id} pack"),
        pack_type: PackType::Custom,
        schema_version: "1.1.0".into(),
        rules: rules
            .iter()
            .map(|r| PackRule {
                id: r.rule_id.clone(),
                version: r.version,
                path: format!("rules/{}/{}.yaml", r.family, r.versioned_id()),
            })
            .collect(),
        metadata: Default::default(),
        signature: None,
        signature_algorithm: None,
    };
    RulePack::new(manifest, rules, "test-digest".into()).unwrap()
}

/// The default test pack: a prompt-injection rule and a CRITICAL command
/// rule for fast-path scenarios.
pub fn default_pack() -> RulePack {
    pack(
        "test-core",
        vec![
            rule(
                "pi-001",
                RuleFamily::Pi,
                Severity::High,
                0.92,
                r"ignore .* instructions",
            ),
            rule(
                "cmd-001",
                RuleFamily::Cmd,
                Severity::Critical,
                0.95,
                r"drop\s+table",
            ),
        ],
    )
}

/// Deterministic L2 stand-in: fires a prediction when the text contains a
/// configured needle, after an optional artificial delay.
pub struct ScriptedDetector {
    pub delay: Option<Duration>,
    pub triggers: Vec<(String, L2Prediction)>,
}

impl ScriptedDetector {
    pub const MODEL_VERSION: &'static str = "test-1.0.0";

    pub fn new(triggers: Vec<(String, L2Prediction)>) -> Self {
        Self {
            delay: None,
            triggers,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Standard prompt-injection prediction used by most scenarios.
    pub fn pi_prediction(confidence: f64) -> L2Prediction {
        L2Prediction {
            threat_type: L2ThreatType::ContextManipulation,
            confidence,
            explanation: "instruction-override phrasing".into(),
            features_used: vec!["family=PI".into()],
            metadata: L2PredictionBundle {
                family: "PI".into(),
                sub_family: "ignore_instructions".into(),
                scores: L2Scores {
                    attack_probability: confidence,
                    family_confidence: confidence,
                    subfamily_confidence: confidence * 0.9,
                },
                why_it_hit: "override phrasing plus secret exfiltration ask".into(),
                recommended_action: "block".into(),
                uncertain: false,
                severity: Some(Severity::High),
            },
        }
    }
}

impl L2Detector for ScriptedDetector {
    fn analyze(
        &self,
        text: &str,
        l1: Option<&L1ScanResult>,
        _context: Option<&ScanContext>,
    ) -> L2Result {
        let started = Instant::now();
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let mut result = L2Result::empty(Self::MODEL_VERSION, 0.0);
        for (needle, prediction) in &self.triggers {
            if text.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()) {
                result.predictions.push(prediction.clone());
            }
        }
        result.sort_predictions();
        result.confidence = result.highest_confidence();
        result.record_input_features(text, l1);
        result.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        result
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "scripted test detector".into(),
            version: Self::MODEL_VERSION.into(),
            is_stub: false,
            latency_p95_ms: 1.0,
        }
    }
}

/// A detector whose triggers fire on the standard scenario texts.
pub fn scripted_pi_detector() -> ScriptedDetector {
    ScriptedDetector::new(vec![(
        "ignore all previous instructions".into(),
        ScriptedDetector::pi_prediction(0.88),
    )])
}
