//! Pure policy evaluation: detection facts + policy set → decision.

use super::{Policy, PolicyAction, PolicyDecision, PolicySet};
use raxe_common::Severity;
use std::collections::BTreeMap;

/// The slice of a detection that policy conditions can see.
///
/// The scan pipeline projects its detection type into this; evaluation never
/// touches matched text or positions.
#[derive(Debug, Clone)]
pub struct DetectionFacts {
    pub rule_id: String,
    pub severity: Severity,
    pub confidence: f64,
    /// Threat type / category label (layer-dependent).
    pub threat_type: Option<String>,
    /// Free-form metadata for `custom_filter` expressions.
    pub metadata: BTreeMap<String, String>,
}

/// Evaluate a policy set against one detection.
///
/// Policies are filtered by `enabled` and, when `customer_id` is known, by
/// ownership. A policy matches when any of its conditions matches; ties are
/// broken by priority descending, then policy ID for determinism. When
/// nothing matches the default action is LOG with the severity unchanged.
pub fn evaluate_policies(
    facts: &DetectionFacts,
    policies: &PolicySet,
    customer_id: Option<&str>,
) -> PolicyDecision {
    let mut matched: Vec<&Policy> = policies
        .policies()
        .iter()
        .filter(|p| p.enabled)
        .filter(|p| customer_id.is_none_or(|c| p.customer_id == c))
        .filter(|p| policy_matches(p, facts))
        .collect();

    matched.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.policy_id.cmp(&b.policy_id))
    });

    let Some(winner) = matched.first() else {
        return PolicyDecision {
            action: PolicyAction::Log,
            original_severity: facts.severity,
            final_severity: facts.severity,
            matched_policies: Vec::new(),
            metadata: BTreeMap::new(),
        };
    };

    let final_severity = winner.override_severity.unwrap_or(facts.severity);
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "winning_policy".to_string(),
        serde_json::Value::String(winner.policy_id.clone()),
    );
    metadata.insert(
        "winning_priority".to_string(),
        serde_json::Value::from(winner.priority),
    );

    PolicyDecision {
        action: winner.action,
        original_severity: facts.severity,
        final_severity,
        matched_policies: matched.iter().map(|p| p.policy_id.clone()).collect(),
        metadata,
    }
}

fn policy_matches(policy: &Policy, facts: &DetectionFacts) -> bool {
    policy.conditions.iter().any(|c| condition_matches(c, facts))
}

fn condition_matches(cond: &super::PolicyCondition, facts: &DetectionFacts) -> bool {
    if let Some(ids) = &cond.rule_ids {
        if !ids.iter().any(|id| id == &facts.rule_id) {
            return false;
        }
    }
    if let Some(threshold) = cond.severity_threshold {
        if facts.severity < threshold {
            return false;
        }
    }
    if let Some(types) = &cond.threat_types {
        match &facts.threat_type {
            Some(t) if types.iter().any(|x| x == t) => {}
            _ => return false,
        }
    }
    if let Some(lo) = cond.min_confidence {
        if facts.confidence < lo {
            return false;
        }
    }
    if let Some(hi) = cond.max_confidence {
        if facts.confidence > hi {
            return false;
        }
    }
    if let Some(filter) = &cond.custom_filter {
        if !custom_filter_matches(filter, facts) {
            return false;
        }
    }
    true
}

/// `key=value` lookup against detection metadata. A bare `key` matches when
/// the key is present with any value.
fn custom_filter_matches(filter: &str, facts: &DetectionFacts) -> bool {
    match filter.split_once('=') {
        Some((key, value)) => facts
            .metadata
            .get(key.trim())
            .is_some_and(|v| v == value.trim()),
        None => facts.metadata.contains_key(filter.trim()),
    }
}
