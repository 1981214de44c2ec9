//! Pattern compilation.
//!
//! Compilation is pure and happens at load time; a failure here is a
//! configuration error and excludes the rule, it can never fail a scan.

use super::{Pattern, PatternFlag, Rule};
use crate::errors::ConfigError;
use raxe_common::text_key;
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use std::time::Duration;

/// A compiled pattern plus the metadata the executor needs.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    /// Matching budget, advisory to the executor.
    pub timeout: Duration,
    /// Stable key over (pattern, flags) for the match cache.
    pub fingerprint: String,
}

/// A rule with all of its patterns compiled, ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Arc<Rule>,
    pub patterns: Vec<CompiledPattern>,
}

impl CompiledRule {
    pub fn rule_id(&self) -> &str {
        &self.rule.rule_id
    }
}

/// Compile every pattern of `rule`.
///
/// The rule itself is validated first, so `compile` is the single gate a
/// rule passes on its way into a pack.
pub fn compile(rule: &Rule) -> Result<CompiledRule, ConfigError> {
    rule.validate()?;
    let patterns = rule
        .patterns
        .iter()
        .map(|p| compile_pattern(&rule.rule_id, p))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CompiledRule {
        rule: Arc::new(rule.clone()),
        patterns,
    })
}

fn compile_pattern(rule_id: &str, pattern: &Pattern) -> Result<CompiledPattern, ConfigError> {
    if pattern.pattern.is_empty() {
        return Err(ConfigError::EmptyPattern {
            context: format!("rule {rule_id}"),
        });
    }

    let mut builder = RegexBuilder::new(&pattern.pattern);
    // `unicode` defaults to true in the regex crate; listing the flag is a
    // no-op kept for parity with the rule format.
    for flag in &pattern.flags {
        match flag {
            PatternFlag::Ignorecase => {
                builder.case_insensitive(true);
            }
            PatternFlag::Multiline => {
                builder.multi_line(true);
            }
            PatternFlag::Dotall => {
                builder.dot_matches_new_line(true);
            }
            PatternFlag::Unicode => {
                builder.unicode(true);
            }
        }
    }

    let regex = builder.build().map_err(|e| ConfigError::InvalidRegex {
        context: format!("rule {rule_id}"),
        pattern: pattern.pattern.clone(),
        reason: e.to_string(),
    })?;

    let flag_tags: Vec<&str> = pattern
        .flags
        .iter()
        .map(|f| match f {
            PatternFlag::Ignorecase => "i",
            PatternFlag::Multiline => "m",
            PatternFlag::Dotall => "s",
            PatternFlag::Unicode => "u",
        })
        .collect();
    let fingerprint = text_key(&format!("{}#{}", pattern.pattern, flag_tags.join("")));

    Ok(CompiledPattern {
        regex,
        timeout: pattern.timeout,
        fingerprint,
    })
}

/// Run a rule against its own examples.
///
/// Returns `(failed_should_match, failed_should_not_match)`; both lists must
/// be empty for the rule to publish.
pub fn matches_examples(rule: &Rule) -> Result<(Vec<String>, Vec<String>), ConfigError> {
    let compiled = compile(rule)?;

    let any_match =
        |text: &str| -> bool { compiled.patterns.iter().any(|p| p.regex.is_match(text)) };

    let failed_should_match = rule
        .examples
        .should_match
        .iter()
        .filter(|ex| !any_match(ex))
        .cloned()
        .collect();
    let failed_should_not_match = rule
        .examples
        .should_not_match
        .iter()
        .filter(|ex| any_match(ex))
        .cloned()
        .collect();

    Ok((failed_should_match, failed_should_not_match))
}
