//! Voting thresholds, weights, and named presets.

use serde::Serialize;
use std::str::FromStr;

/// Named threshold presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingPreset {
    Balanced,
    HighSecurity,
    LowFp,
    HarmFocused,
}

impl VotingPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            VotingPreset::Balanced => "balanced",
            VotingPreset::HighSecurity => "high_security",
            VotingPreset::LowFp => "low_fp",
            VotingPreset::HarmFocused => "harm_focused",
        }
    }
}

impl FromStr for VotingPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "balanced" => Ok(VotingPreset::Balanced),
            "high_security" => Ok(VotingPreset::HighSecurity),
            "low_fp" => Ok(VotingPreset::LowFp),
            "harm_focused" => Ok(VotingPreset::HarmFocused),
            other => Err(format!("unknown voting preset: {other}")),
        }
    }
}

/// Binary head: attack probability against two cut points.
#[derive(Debug, Clone, Serialize)]
pub struct BinaryHeadThresholds {
    pub threat_threshold: f64,
    pub safe_threshold: f64,
}

impl Default for BinaryHeadThresholds {
    fn default() -> Self {
        Self {
            threat_threshold: 0.65,
            safe_threshold: 0.40,
        }
    }
}

/// Family head: confidence cut points for threat vs benign families.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyHeadThresholds {
    pub threat_confidence: f64,
    pub safe_confidence: f64,
}

impl Default for FamilyHeadThresholds {
    fn default() -> Self {
        Self {
            threat_confidence: 0.55,
            safe_confidence: 0.35,
        }
    }
}

/// Severity head: which predicted labels count as threat / safe.
#[derive(Debug, Clone, Serialize)]
pub struct SeverityHeadThresholds {
    pub threat_severities: Vec<String>,
    pub safe_severities: Vec<String>,
}

impl Default for SeverityHeadThresholds {
    fn default() -> Self {
        Self {
            threat_severities: vec!["high".into(), "critical".into()],
            safe_severities: vec!["none".into()],
        }
    }
}

/// Technique head: label sets plus confidence cut points.
#[derive(Debug, Clone, Serialize)]
pub struct TechniqueHeadThresholds {
    pub threat_confidence: f64,
    pub safe_confidence: f64,
    pub safe_techniques: Vec<String>,
}

impl Default for TechniqueHeadThresholds {
    fn default() -> Self {
        Self {
            threat_confidence: 0.50,
            safe_confidence: 0.30,
            safe_techniques: vec!["none".into()],
        }
    }
}

/// Harm head: harm probability against two cut points.
#[derive(Debug, Clone, Serialize)]
pub struct HarmHeadThresholds {
    pub threat_threshold: f64,
    pub safe_threshold: f64,
}

impl Default for HarmHeadThresholds {
    fn default() -> Self {
        Self {
            threat_threshold: 0.92,
            safe_threshold: 0.50,
        }
    }
}

/// Per-head vote weights. Severity carries the most weight; harm the least
/// under the balanced preset.
#[derive(Debug, Clone, Serialize)]
pub struct HeadWeights {
    pub binary: f64,
    pub family: f64,
    pub severity: f64,
    pub technique: f64,
    pub harm: f64,
}

impl Default for HeadWeights {
    fn default() -> Self {
        Self {
            binary: 1.0,
            family: 1.2,
            severity: 1.5,
            technique: 1.0,
            harm: 0.8,
        }
    }
}

impl HeadWeights {
    pub fn weight(&self, head_name: &str) -> Option<f64> {
        match head_name {
            "binary" => Some(self.binary),
            "family" => Some(self.family),
            "severity" => Some(self.severity),
            "technique" => Some(self.technique),
            "harm" => Some(self.harm),
            _ => None,
        }
    }

    pub fn total(&self) -> f64 {
        self.binary + self.family + self.severity + self.technique + self.harm
    }
}

/// Thresholds for the final decision layer.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionThresholds {
    /// Any single THREAT vote at or above this confidence decides THREAT.
    pub high_confidence_threshold: f64,
    /// Minimum THREAT votes for the weighted-ratio rule to decide THREAT.
    pub min_threat_votes: usize,
    /// THREAT votes needed to overrule a SAFE vote from the severity head.
    pub severity_veto_override_votes: usize,
    /// Weighted threat/safe ratio at or above which THREAT wins.
    pub threat_ratio: f64,
    /// Weighted ratio at or above which the result is at least REVIEW.
    pub review_ratio_min: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.85,
            min_threat_votes: 2,
            severity_veto_override_votes: 3,
            threat_ratio: 1.3,
            review_ratio_min: 1.0,
        }
    }
}

/// Complete voting configuration: one threshold block per head, the weights,
/// and the decision layer.
#[derive(Debug, Clone, Serialize)]
pub struct VotingConfig {
    pub name: String,
    pub binary: BinaryHeadThresholds,
    pub family: FamilyHeadThresholds,
    pub severity: SeverityHeadThresholds,
    pub technique: TechniqueHeadThresholds,
    pub harm: HarmHeadThresholds,
    pub weights: HeadWeights,
    pub decision: DecisionThresholds,
}

impl Default for VotingConfig {
    fn default() -> Self {
        VotingConfig::preset(VotingPreset::Balanced)
    }
}

impl VotingConfig {
    /// Resolve a named preset.
    pub fn preset(preset: VotingPreset) -> Self {
        match preset {
            VotingPreset::Balanced => Self {
                name: "balanced".into(),
                binary: BinaryHeadThresholds::default(),
                family: FamilyHeadThresholds::default(),
                severity: SeverityHeadThresholds::default(),
                technique: TechniqueHeadThresholds::default(),
                harm: HarmHeadThresholds::default(),
                weights: HeadWeights::default(),
                decision: DecisionThresholds::default(),
            },
            // Catch more, earlier: lower cut points everywhere and let a
            // single strong vote decide.
            VotingPreset::HighSecurity => Self {
                name: "high_security".into(),
                binary: BinaryHeadThresholds {
                    threat_threshold: 0.50,
                    safe_threshold: 0.30,
                },
                family: FamilyHeadThresholds {
                    threat_confidence: 0.45,
                    safe_confidence: 0.25,
                },
                severity: SeverityHeadThresholds::default(),
                technique: TechniqueHeadThresholds {
                    threat_confidence: 0.40,
                    safe_confidence: 0.25,
                    safe_techniques: vec!["none".into()],
                },
                harm: HarmHeadThresholds {
                    threat_threshold: 0.80,
                    safe_threshold: 0.40,
                },
                weights: HeadWeights::default(),
                decision: DecisionThresholds {
                    high_confidence_threshold: 0.80,
                    min_threat_votes: 1,
                    severity_veto_override_votes: 2,
                    threat_ratio: 1.0,
                    review_ratio_min: 0.6,
                },
            },
            // Precision over recall: raise every bar and require consensus.
            VotingPreset::LowFp => Self {
                name: "low_fp".into(),
                binary: BinaryHeadThresholds {
                    threat_threshold: 0.80,
                    safe_threshold: 0.50,
                },
                family: FamilyHeadThresholds {
                    threat_confidence: 0.70,
                    safe_confidence: 0.45,
                },
                severity: SeverityHeadThresholds::default(),
                technique: TechniqueHeadThresholds {
                    threat_confidence: 0.65,
                    safe_confidence: 0.40,
                    safe_techniques: vec!["none".into()],
                },
                harm: HarmHeadThresholds {
                    threat_threshold: 0.95,
                    safe_threshold: 0.60,
                },
                weights: HeadWeights::default(),
                decision: DecisionThresholds {
                    high_confidence_threshold: 0.90,
                    min_threat_votes: 3,
                    severity_veto_override_votes: 4,
                    threat_ratio: 1.8,
                    review_ratio_min: 1.2,
                },
            },
            // The harm head dominates: low harm cut points, triple weight,
            // and decision thresholds a lone harm vote can clear.
            VotingPreset::HarmFocused => Self {
                name: "harm_focused".into(),
                binary: BinaryHeadThresholds::default(),
                family: FamilyHeadThresholds::default(),
                severity: SeverityHeadThresholds::default(),
                technique: TechniqueHeadThresholds::default(),
                harm: HarmHeadThresholds {
                    threat_threshold: 0.50,
                    safe_threshold: 0.40,
                },
                weights: HeadWeights {
                    harm: 3.0,
                    ..HeadWeights::default()
                },
                decision: DecisionThresholds {
                    high_confidence_threshold: 0.85,
                    min_threat_votes: 1,
                    severity_veto_override_votes: 1,
                    threat_ratio: 0.25,
                    review_ratio_min: 0.15,
                },
            },
        }
    }

    /// Check internal consistency. Presets are consistent by construction;
    /// this guards externally supplied configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.binary.safe_threshold >= self.binary.threat_threshold {
            return Err(format!(
                "binary safe_threshold ({}) must be < threat_threshold ({})",
                self.binary.safe_threshold, self.binary.threat_threshold
            ));
        }
        if self.harm.safe_threshold >= self.harm.threat_threshold {
            return Err(format!(
                "harm safe_threshold ({}) must be < threat_threshold ({})",
                self.harm.safe_threshold, self.harm.threat_threshold
            ));
        }
        if self.decision.review_ratio_min >= self.decision.threat_ratio {
            return Err(format!(
                "review_ratio_min ({}) must be < threat_ratio ({})",
                self.decision.review_ratio_min, self.decision.threat_ratio
            ));
        }
        for (name, w) in [
            ("binary", self.weights.binary),
            ("family", self.weights.family),
            ("severity", self.weights.severity),
            ("technique", self.weights.technique),
            ("harm", self.weights.harm),
        ] {
            if w < 0.0 {
                return Err(format!("{name} weight must be non-negative, got {w}"));
            }
        }
        Ok(())
    }
}
