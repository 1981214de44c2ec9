//! The voting engine: cast per-head votes, then apply the decision rules.
//!
//! Decision rules, first match wins:
//! 1. high-confidence override: any THREAT vote at high confidence
//! 2. severity veto: the severity head said SAFE and too few heads disagree
//! 3. weighted ratio: threat/safe weight ratio against the preset cut points

use super::config::VotingConfig;
use super::{Decision, HeadOutput, HeadVoteDetail, Vote, VotingResult};
use std::collections::BTreeMap;

/// Combine head outputs into a single decision under `config`.
///
/// Heads absent from `heads` simply do not vote; an empty slice yields SAFE
/// with zero confidence either way.
pub fn cast_votes(heads: &[HeadOutput], config: &VotingConfig) -> VotingResult {
    let mut per_head_votes = BTreeMap::new();

    for head in heads {
        let Some(weight) = config.weights.weight(&head.head_name) else {
            tracing::debug!(head = %head.head_name, "ignoring unknown voting head");
            continue;
        };
        let detail = cast_one(head, weight, config);
        per_head_votes.insert(head.head_name.clone(), detail);
    }

    let mut threat_votes = 0usize;
    let mut safe_votes = 0usize;
    let mut abstain_votes = 0usize;
    let mut weighted_threat = 0.0f64;
    let mut weighted_safe = 0.0f64;
    let mut weighted_abstain = 0.0f64;
    let mut top_threat_confidence = 0.0f64;

    for detail in per_head_votes.values() {
        match detail.vote {
            Vote::Threat => {
                threat_votes += 1;
                weighted_threat += detail.weight;
                top_threat_confidence = top_threat_confidence.max(detail.confidence);
            }
            Vote::Safe => {
                safe_votes += 1;
                weighted_safe += detail.weight;
            }
            Vote::Abstain => {
                abstain_votes += 1;
                weighted_abstain += detail.weight;
            }
        }
    }

    let ratio = if weighted_safe == 0.0 {
        if weighted_threat > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    } else {
        weighted_threat / weighted_safe
    };

    let severity_voted_safe = per_head_votes
        .get("severity")
        .is_some_and(|d| d.vote == Vote::Safe);

    let (decision, rule) = if top_threat_confidence >= config.decision.high_confidence_threshold
        && threat_votes > 0
    {
        (Decision::Threat, "high_confidence_override")
    } else if severity_voted_safe && threat_votes < config.decision.severity_veto_override_votes {
        (Decision::Safe, "severity_veto")
    } else if ratio >= config.decision.threat_ratio
        && threat_votes >= config.decision.min_threat_votes
    {
        (Decision::Threat, "weighted_ratio_threat")
    } else if ratio >= config.decision.review_ratio_min {
        (Decision::Review, "weighted_ratio_review")
    } else {
        (Decision::Safe, "weighted_ratio_safe")
    };

    let voting_total = weighted_threat + weighted_safe;
    let confidence = match decision {
        _ if voting_total == 0.0 => 0.0,
        Decision::Threat => weighted_threat / voting_total,
        Decision::Safe => weighted_safe / voting_total,
        Decision::Review => 0.5,
    }
    .clamp(0.0, 1.0);

    let mut aggregated_scores = BTreeMap::new();
    aggregated_scores.insert("safe".to_string(), weighted_safe);
    aggregated_scores.insert("abstain".to_string(), weighted_abstain);
    aggregated_scores.insert("threat".to_string(), weighted_threat);

    VotingResult {
        decision,
        confidence,
        preset_used: config.name.clone(),
        per_head_votes,
        aggregated_scores,
        decision_rule_triggered: rule.to_string(),
        threat_vote_count: threat_votes,
        safe_vote_count: safe_votes,
        abstain_vote_count: abstain_votes,
        weighted_threat_score: weighted_threat,
        weighted_safe_score: weighted_safe,
    }
}

fn cast_one(head: &HeadOutput, weight: f64, config: &VotingConfig) -> HeadVoteDetail {
    let (vote, threshold, rationale) = match head.head_name.as_str() {
        "binary" => {
            let t = &config.binary;
            if head.confidence >= t.threat_threshold {
                (
                    Vote::Threat,
                    t.threat_threshold,
                    format!("attack probability {:.2} above cut point", head.confidence),
                )
            } else if head.confidence <= t.safe_threshold {
                (
                    Vote::Safe,
                    t.safe_threshold,
                    format!("attack probability {:.2} below cut point", head.confidence),
                )
            } else {
                (
                    Vote::Abstain,
                    t.threat_threshold,
                    "attack probability in the gray zone".to_string(),
                )
            }
        }
        "family" => {
            let t = &config.family;
            if head.is_threat_indicator && head.confidence >= t.threat_confidence {
                (
                    Vote::Threat,
                    t.threat_confidence,
                    format!("family {:?} at {:.2}", head.prediction, head.confidence),
                )
            } else if !head.is_threat_indicator && head.confidence >= t.safe_confidence {
                (
                    Vote::Safe,
                    t.safe_confidence,
                    format!("benign family at {:.2}", head.confidence),
                )
            } else {
                (
                    Vote::Abstain,
                    t.threat_confidence,
                    "family confidence too low".to_string(),
                )
            }
        }
        "severity" => {
            let t = &config.severity;
            if t.threat_severities.contains(&head.prediction) {
                (
                    Vote::Threat,
                    0.0,
                    format!("predicted severity {:?}", head.prediction),
                )
            } else if t.safe_severities.contains(&head.prediction) {
                (
                    Vote::Safe,
                    0.0,
                    format!("predicted severity {:?}", head.prediction),
                )
            } else {
                (
                    Vote::Abstain,
                    0.0,
                    format!("severity {:?} is neutral", head.prediction),
                )
            }
        }
        "technique" => {
            let t = &config.technique;
            if t.safe_techniques.contains(&head.prediction) {
                if head.confidence >= t.safe_confidence {
                    (
                        Vote::Safe,
                        t.safe_confidence,
                        "no attack technique recognized".to_string(),
                    )
                } else {
                    (
                        Vote::Abstain,
                        t.safe_confidence,
                        "technique head unsure".to_string(),
                    )
                }
            } else if head.confidence >= t.threat_confidence {
                (
                    Vote::Threat,
                    t.threat_confidence,
                    format!("technique {:?} at {:.2}", head.prediction, head.confidence),
                )
            } else {
                (
                    Vote::Abstain,
                    t.threat_confidence,
                    "technique confidence too low".to_string(),
                )
            }
        }
        "harm" => {
            let t = &config.harm;
            if head.confidence >= t.threat_threshold {
                (
                    Vote::Threat,
                    t.threat_threshold,
                    format!("harm probability {:.2} above cut point", head.confidence),
                )
            } else if head.confidence <= t.safe_threshold {
                (
                    Vote::Safe,
                    t.safe_threshold,
                    format!("harm probability {:.2} below cut point", head.confidence),
                )
            } else {
                (
                    Vote::Abstain,
                    t.threat_threshold,
                    "harm probability in the gray zone".to_string(),
                )
            }
        }
        // Unknown heads are filtered by the caller; keep a harmless default.
        _ => (Vote::Abstain, 0.0, "unknown head".to_string()),
    };

    HeadVoteDetail {
        head_name: head.head_name.clone(),
        vote,
        confidence: head.confidence,
        weight,
        raw_probability: head.confidence,
        threshold_used: threshold,
        prediction: head.prediction.clone(),
        rationale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::voting::VotingPreset;

    fn head(name: &str, prediction: &str, confidence: f64, threat: bool) -> HeadOutput {
        HeadOutput {
            head_name: name.to_string(),
            prediction: prediction.to_string(),
            confidence,
            probabilities: None,
            is_threat_indicator: threat,
        }
    }

    fn balanced() -> VotingConfig {
        VotingConfig::preset(VotingPreset::Balanced)
    }

    #[test]
    fn high_confidence_override_fires_first() {
        let heads = vec![
            head("binary", "threat", 0.99, true),
            head("severity", "none", 0.9, false),
            head("family", "benign", 0.9, false),
        ];
        let result = cast_votes(&heads, &balanced());
        assert_eq!(result.decision, Decision::Threat);
        assert_eq!(result.decision_rule_triggered, "high_confidence_override");
    }

    #[test]
    fn severity_veto_downgrades_weak_threat_signals() {
        // Two sub-override THREAT votes against a SAFE severity head:
        // balanced needs 3 to override, so the veto wins.
        let heads = vec![
            head("binary", "threat", 0.70, true),
            head("technique", "encoding", 0.60, true),
            head("severity", "none", 0.9, false),
        ];
        let result = cast_votes(&heads, &balanced());
        assert_eq!(result.decision, Decision::Safe);
        assert_eq!(result.decision_rule_triggered, "severity_veto");
    }

    #[test]
    fn weighted_ratio_decides_threat_with_enough_votes() {
        let heads = vec![
            head("binary", "threat", 0.70, true),
            head("family", "jailbreak", 0.60, true),
            head("severity", "high", 0.8, true),
            head("harm", "harmful", 0.30, false),
        ];
        let result = cast_votes(&heads, &balanced());
        assert_eq!(result.decision, Decision::Threat);
        assert_eq!(result.decision_rule_triggered, "weighted_ratio_threat");
        assert_eq!(result.threat_vote_count, 3);
        assert_eq!(result.safe_vote_count, 1);
    }

    #[test]
    fn gray_zone_everywhere_reads_safe() {
        let heads = vec![
            head("binary", "threat", 0.50, true),
            head("harm", "harmful", 0.70, true),
        ];
        let result = cast_votes(&heads, &balanced());
        assert_eq!(result.decision, Decision::Safe);
        assert_eq!(result.abstain_vote_count, 2);
        assert_eq!(result.threat_vote_count, 0);
    }

    #[test]
    fn infinite_ratio_serializes_to_sentinel() {
        // Threat votes with no safe votes: ratio is infinite.
        let heads = vec![
            head("binary", "threat", 0.70, true),
            head("family", "jailbreak", 0.60, true),
        ];
        let result = cast_votes(&heads, &balanced());
        assert!(result.weighted_ratio().is_infinite());
        assert_eq!(result.wire_ratio(), super::super::WEIGHTED_RATIO_SENTINEL);
    }

    #[test]
    fn harm_focused_lets_a_lone_harm_vote_win() {
        let config = VotingConfig::preset(VotingPreset::HarmFocused);
        let heads = vec![
            head("harm", "harmful", 0.60, true),
            head("binary", "benign", 0.35, false),
        ];
        let result = cast_votes(&heads, &config);
        // harm weight 3.0 vs binary weight 1.0: ratio 3.0 >= 0.25 with one
        // threat vote allowed.
        assert_eq!(result.decision, Decision::Threat);
    }

    #[test]
    fn no_heads_is_safe_with_zero_confidence() {
        let result = cast_votes(&[], &balanced());
        assert_eq!(result.decision, Decision::Safe);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn per_head_detail_is_complete() {
        let heads = vec![head("binary", "threat", 0.9, true)];
        let result = cast_votes(&heads, &balanced());
        let detail = &result.per_head_votes["binary"];
        assert_eq!(detail.vote, Vote::Threat);
        assert_eq!(detail.weight, 1.0);
        assert_eq!(detail.threshold_used, 0.65);
        assert!(!detail.rationale.is_empty());
    }
}
