use super::{Suppression, SuppressionAction, SuppressionError};
use globset::{Glob, GlobMatcher};

/// The resolution for a single detection.
#[derive(Debug, Clone)]
pub struct SuppressionMatch {
    pub action: SuppressionAction,
    pub reason: String,
    pub pattern: String,
    /// True when the winning entry came from the inline (per-scan) source.
    pub inline: bool,
}

struct CompiledEntry {
    suppression: Suppression,
    matcher: GlobMatcher,
    inline: bool,
}

/// Scoped + inline suppressions compiled for matching.
///
/// Within each source, the first matching entry in declaration order wins;
/// any inline match takes precedence over every scoped match.
pub struct SuppressionSet {
    entries: Vec<CompiledEntry>,
}

impl SuppressionSet {
    /// Compile both sources. Entries with invalid glob patterns are
    /// excluded and returned as errors; the rest of the set still works.
    pub fn compile(
        scoped: &[Suppression],
        inline: &[Suppression],
    ) -> (Self, Vec<SuppressionError>) {
        let mut entries = Vec::with_capacity(scoped.len() + inline.len());
        let mut errors = Vec::new();

        // Inline first so precedence falls out of declaration order.
        for (source, is_inline) in [(inline, true), (scoped, false)] {
            for s in source {
                match Glob::new(&s.pattern) {
                    Ok(glob) => entries.push(CompiledEntry {
                        suppression: s.clone(),
                        matcher: glob.compile_matcher(),
                        inline: is_inline,
                    }),
                    Err(e) => errors.push(SuppressionError::InvalidPattern {
                        pattern: s.pattern.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
        }

        (Self { entries }, errors)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the action for `rule_id` in `scan_id`, if any entry matches.
    pub fn decide(&self, rule_id: &str, scan_id: Option<&str>) -> Option<SuppressionMatch> {
        self.entries
            .iter()
            .find(|e| {
                let s = &e.suppression;
                if let Some(scope_scan) = &s.scan_id {
                    if scan_id != Some(scope_scan.as_str()) {
                        return false;
                    }
                }
                if let Some(scope_rule) = &s.rule_id {
                    if scope_rule != rule_id {
                        return false;
                    }
                }
                e.matcher.is_match(rule_id)
            })
            .map(|e| SuppressionMatch {
                action: e.suppression.action,
                reason: e.suppression.reason.clone(),
                pattern: e.suppression.pattern.clone(),
                inline: e.inline,
            })
    }
}
