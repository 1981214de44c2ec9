//! YAML rule schema (v1.1) and conversion to the domain model.
//!
//! The schema layer parses the raw file shape; conversion maps loose string
//! fields (family, severity, flags) onto the closed domain enums so that a
//! typo is reported as a configuration error with the rule's context, not a
//! bare serde message.

use super::{Pattern, PatternFlag, Rule, RuleExamples, RuleMetrics};
use crate::errors::ConfigError;
use raxe_common::{RuleFamily, SemVer, Severity};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Raw pattern entry as written in rule YAML.
#[derive(Debug, Deserialize)]
pub struct PatternSchema {
    pub pattern: String,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Seconds; default 5.0.
    #[serde(default = "default_timeout_secs")]
    pub timeout: f64,
}

fn default_timeout_secs() -> f64 {
    5.0
}

/// Raw rule file shape (schema v1.1).
#[derive(Debug, Deserialize)]
pub struct RuleSchema {
    /// Schema version of the rule file itself.
    pub version: String,
    pub rule_id: String,
    #[serde(rename = "rule_version", alias = "semver", default)]
    pub rule_version: Option<String>,
    pub family: String,
    pub sub_family: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: String,
    pub confidence: f64,
    pub patterns: Vec<PatternSchema>,
    #[serde(default)]
    pub examples: RuleExamples,
    #[serde(default)]
    pub metrics: RuleMetrics,
    #[serde(default)]
    pub mitre_attack: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub risk_explanation: String,
    #[serde(default)]
    pub remediation_advice: String,
    #[serde(default)]
    pub docs_url: String,
}

impl RuleSchema {
    /// Convert to a validated domain [`Rule`].
    ///
    /// `fallback_version` supplies the rule version when the file omits it
    /// (packs carry the version in the manifest and the file name).
    pub fn into_rule(self, fallback_version: Option<&SemVer>) -> Result<Rule, ConfigError> {
        let ctx = || format!("rule {}", self.rule_id);

        let version: SemVer = match (&self.rule_version, fallback_version) {
            (Some(v), _) => v.parse().map_err(|e| ConfigError::InvalidField {
                context: ctx(),
                reason: e,
            })?,
            (None, Some(v)) => *v,
            (None, None) => {
                return Err(ConfigError::InvalidField {
                    context: ctx(),
                    reason: "missing rule version".into(),
                })
            }
        };

        let family: RuleFamily = self.family.parse().map_err(|e| ConfigError::InvalidField {
            context: ctx(),
            reason: e,
        })?;
        let severity: Severity = self
            .severity
            .parse()
            .map_err(|e| ConfigError::InvalidField {
                context: ctx(),
                reason: e,
            })?;

        let mut patterns = Vec::with_capacity(self.patterns.len());
        for p in self.patterns {
            patterns.push(convert_pattern(&self.rule_id, p)?);
        }

        let rule = Rule {
            rule_id: self.rule_id,
            version,
            family,
            sub_family: self.sub_family,
            name: self.name,
            description: self.description,
            severity,
            confidence: self.confidence,
            patterns,
            examples: self.examples,
            metrics: self.metrics,
            mitre_attack: self.mitre_attack,
            metadata: self.metadata,
            risk_explanation: self.risk_explanation,
            remediation_advice: self.remediation_advice,
            docs_url: self.docs_url,
        };
        rule.validate()?;
        Ok(rule)
    }
}

fn convert_pattern(rule_id: &str, schema: PatternSchema) -> Result<Pattern, ConfigError> {
    let mut flags = Vec::with_capacity(schema.flags.len());
    for flag in &schema.flags {
        let parsed = match flag.to_ascii_uppercase().as_str() {
            "IGNORECASE" => PatternFlag::Ignorecase,
            "MULTILINE" => PatternFlag::Multiline,
            "DOTALL" => PatternFlag::Dotall,
            "UNICODE" => PatternFlag::Unicode,
            _ => {
                return Err(ConfigError::UnknownFlag {
                    context: format!("rule {rule_id}"),
                    flag: flag.clone(),
                })
            }
        };
        flags.push(parsed);
    }
    if !(schema.timeout.is_finite() && schema.timeout > 0.0) {
        return Err(ConfigError::InvalidField {
            context: format!("rule {rule_id}"),
            reason: format!("pattern timeout must be positive, got {}", schema.timeout),
        });
    }
    Ok(Pattern {
        pattern: schema.pattern,
        flags,
        timeout: Duration::from_secs_f64(schema.timeout),
    })
}
