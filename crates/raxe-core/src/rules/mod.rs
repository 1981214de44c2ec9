//! Rule domain model.
//!
//! Rules are immutable value objects matching the YAML v1.1 rule format.
//! Construction-time validation lives in [`Rule::validate`]; regex
//! compilation lives in [`compiler`]. No I/O here.

pub mod compiler;
pub mod schema;

pub use compiler::{compile, matches_examples, CompiledPattern, CompiledRule};

use crate::errors::ConfigError;
use raxe_common::{RuleFamily, SemVer, Severity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Regex flags accepted in rule patterns.
///
/// This is the complete set; any other flag name is rejected when the rule
/// compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PatternFlag {
    Ignorecase,
    Multiline,
    Dotall,
    Unicode,
}

/// A single regex pattern within a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern: String,
    #[serde(default)]
    pub flags: Vec<PatternFlag>,
    /// Per-pattern matching budget, in seconds in the YAML form.
    #[serde(default = "default_pattern_timeout", with = "seconds_f64")]
    pub timeout: Duration,
}

fn default_pattern_timeout() -> Duration {
    Duration::from_secs(5)
}

mod seconds_f64 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(serde::de::Error::custom(format!(
                "timeout must be positive, got {secs}"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Test examples shipped with a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleExamples {
    #[serde(default)]
    pub should_match: Vec<String>,
    #[serde(default)]
    pub should_not_match: Vec<String>,
}

/// Precision/recall bookkeeping for a published rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f1_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counts_30d: BTreeMap<String, u64>,
}

/// An atomic detector: identity is `(rule_id, version)`, emitting at most
/// one detection per scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub rule_id: String,
    pub version: SemVer,
    pub family: RuleFamily,
    pub sub_family: String,

    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub confidence: f64,
    pub patterns: Vec<Pattern>,

    #[serde(default)]
    pub examples: RuleExamples,
    #[serde(default)]
    pub metrics: RuleMetrics,

    #[serde(default)]
    pub mitre_attack: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub risk_explanation: String,
    #[serde(default)]
    pub remediation_advice: String,
    #[serde(default)]
    pub docs_url: String,
}

impl Rule {
    /// `rule_id@version`, the identity used by packs, caches, and results.
    pub fn versioned_id(&self) -> String {
        format!("{}@{}", self.rule_id, self.version)
    }

    /// Check construction invariants. Loaders call this before a rule is
    /// admitted to a pack.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ctx = || format!("rule {}", self.rule_id);
        if self.rule_id.is_empty() {
            return Err(ConfigError::InvalidField {
                context: "rule".into(),
                reason: "rule_id cannot be empty".into(),
            });
        }
        if self.sub_family.is_empty() {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: "sub_family cannot be empty".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: format!("confidence must be 0-1, got {}", self.confidence),
            });
        }
        if self.patterns.is_empty() {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: "rule must have at least one pattern".into(),
            });
        }
        for p in &self.patterns {
            if p.pattern.is_empty() {
                return Err(ConfigError::EmptyPattern { context: ctx() });
            }
        }
        for technique in &self.mitre_attack {
            if !technique.starts_with('T') {
                return Err(ConfigError::InvalidField {
                    context: ctx(),
                    reason: format!("invalid MITRE ATT&CK ID: {technique}"),
                });
            }
        }
        for (metric, value) in [
            ("precision", self.metrics.precision),
            ("recall", self.metrics.recall),
            ("f1_score", self.metrics.f1_score),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(ConfigError::InvalidField {
                        context: ctx(),
                        reason: format!("{metric} must be 0-1, got {v}"),
                    });
                }
            }
        }
        Ok(())
    }
}
