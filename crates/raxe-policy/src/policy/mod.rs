//! Policy models and evaluation.
//!
//! Policies let a customer override the default response to detections:
//! allow known false positives, block aggressively, flag for review, or log
//! only. A policy carries a list of conditions (OR-combined); each condition
//! AND-combines its non-null fields.

mod evaluator;
mod loader;

pub use evaluator::{evaluate_policies, DetectionFacts};
pub use loader::{load_policies_file, PolicyLoadReport};

use raxe_common::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Hard cap on the number of policies in one set.
pub const MAX_POLICIES: usize = 100;

/// Priority range accepted for a policy.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = 0..=1000;

/// Enforcement action taken when a policy matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyAction {
    /// Allow through despite detection.
    Allow,
    /// Block despite low severity.
    Block,
    /// Flag for review but allow.
    Flag,
    /// Log only, no enforcement.
    Log,
}

impl PolicyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Allow => "allow",
            PolicyAction::Block => "block",
            PolicyAction::Flag => "flag",
            PolicyAction::Log => "log",
        }
    }
}

/// Malformed policy definitions. Offending entries are excluded; the rest of
/// the set continues to load.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy {policy_id}: {reason}")]
    Invalid { policy_id: String, reason: String },

    #[error("policy set exceeds the {MAX_POLICIES}-policy cap ({count} given)")]
    LimitExceeded { count: usize },

    #[error("failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse policy file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// One condition inside a policy. All non-null fields must match
/// (AND semantics); a `None` field is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyCondition {
    /// Specific rule IDs this policy applies to (`None` = all rules).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_ids: Option<Vec<String>>,

    /// Minimum severity level (`None` = all severities).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_threshold: Option<Severity>,

    /// Specific threat types (`None` = all types).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threat_types: Option<Vec<String>>,

    /// Minimum confidence score (`None` = no floor).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,

    /// Maximum confidence score (`None` = no ceiling).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_confidence: Option<f64>,

    /// `key=value` expression matched against detection metadata
    /// (`None` = no filter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_filter: Option<String>,
}

impl PolicyCondition {
    /// Validate field constraints. Called by [`Policy::validate`].
    fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("max_confidence", self.max_confidence),
        ] {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(format!("{name} must be 0-1, got {v}"));
                }
            }
        }
        if let (Some(lo), Some(hi)) = (self.min_confidence, self.max_confidence) {
            if lo > hi {
                return Err(format!(
                    "min_confidence ({lo}) cannot be greater than max_confidence ({hi})"
                ));
            }
        }
        if matches!(&self.rule_ids, Some(ids) if ids.is_empty()) {
            return Err("rule_ids cannot be an empty list (use null for all rules)".into());
        }
        if matches!(&self.threat_types, Some(t) if t.is_empty()) {
            return Err("threat_types cannot be an empty list (use null for all types)".into());
        }
        Ok(())
    }
}

/// A customer-scoped rule mapping detections to an enforcement action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub policy_id: String,
    pub customer_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// OR-combined: the policy matches when any condition matches.
    pub conditions: Vec<PolicyCondition>,
    pub action: PolicyAction,
    /// Optional severity override applied when this policy wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_severity: Option<Severity>,
    /// Conflict resolution: higher wins. Range 0..=1000.
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Policy {
    /// Check structural invariants. Malformed policies are excluded from the
    /// set rather than failing the whole load.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: String| PolicyError::Invalid {
            policy_id: self.policy_id.clone(),
            reason,
        };
        if self.policy_id.is_empty() {
            return Err(PolicyError::Invalid {
                policy_id: "<unnamed>".into(),
                reason: "policy_id cannot be empty".into(),
            });
        }
        if self.customer_id.is_empty() {
            return Err(invalid("customer_id cannot be empty".into()));
        }
        if self.conditions.is_empty() {
            return Err(invalid("policy must have at least one condition".into()));
        }
        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(invalid(format!(
                "priority must be in 0..=1000, got {}",
                self.priority
            )));
        }
        for cond in &self.conditions {
            cond.validate().map_err(invalid)?;
        }
        Ok(())
    }
}

/// A bounded, validated collection of policies.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    /// Build a set from validated policies, enforcing the size cap.
    pub fn new(policies: Vec<Policy>) -> Result<Self, PolicyError> {
        if policies.len() > MAX_POLICIES {
            return Err(PolicyError::LimitExceeded {
                count: policies.len(),
            });
        }
        for p in &policies {
            p.validate()?;
        }
        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// The final enforcement outcome for a single detection under a policy set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyDecision {
    pub action: PolicyAction,
    pub original_severity: Severity,
    pub final_severity: Severity,
    /// IDs of every matching policy, highest priority first.
    pub matched_policies: Vec<String>,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PolicyDecision {
    pub fn should_block(&self) -> bool {
        self.action == PolicyAction::Block
    }

    pub fn should_allow(&self) -> bool {
        self.action == PolicyAction::Allow
    }

    pub fn should_flag(&self) -> bool {
        self.action == PolicyAction::Flag
    }

    pub fn severity_changed(&self) -> bool {
        self.original_severity != self.final_severity
    }
}
