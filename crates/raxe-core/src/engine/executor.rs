//! Rule executor: compiled rules × text → detections.
//!
//! Matching uses the linear-time `regex` engine, so the per-pattern budget
//! is enforced between match iterations rather than by interrupting the
//! matcher. Pattern outputs are memoized keyed by (pattern fingerprint,
//! text key); a hit is byte-identical to recomputation.

use super::{Detection, DetectionLayer, L1ScanResult, Match};
use crate::errors::ValidationError;
use crate::rules::{CompiledPattern, CompiledRule};
use chrono::Utc;
use lru::LruCache;
use raxe_common::text_key;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Executor knobs, resolved by the engine configuration.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Input cap, in characters.
    pub max_text_length: usize,
    /// Characters of context captured around each match.
    pub context_window: usize,
    /// Match-cache capacity in (pattern, text) entries; 0 disables.
    pub match_cache_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_text_length: 100_000,
            context_window: 40,
            match_cache_size: 4096,
        }
    }
}

pub struct RuleExecutor {
    config: ExecutorConfig,
    match_cache: Option<Mutex<LruCache<String, Arc<Vec<Match>>>>>,
}

impl RuleExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let match_cache = NonZeroUsize::new(config.match_cache_size)
            .map(|cap| Mutex::new(LruCache::new(cap)));
        Self {
            config,
            match_cache,
        }
    }

    /// Validate input against executor limits without running any rule.
    pub fn validate_input(&self, text: &str, max_text_length: usize) -> Result<(), ValidationError> {
        if text.is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        let length = text.chars().count();
        if length > max_text_length {
            return Err(ValidationError::TooLong {
                length,
                max: max_text_length,
            });
        }
        Ok(())
    }

    /// Run `rules` against `text`.
    ///
    /// Produces exactly one detection per matching rule; detections are
    /// ordered by (rule_id, first match offset). Pattern overruns abandon
    /// that pattern only and are counted, never raised.
    pub fn execute(
        &self,
        text: &str,
        rules: &[Arc<CompiledRule>],
    ) -> Result<L1ScanResult, ValidationError> {
        self.validate_input(text, self.config.max_text_length)?;

        let started = Instant::now();
        let text_id = text_key(text);
        let mut detections = Vec::new();
        let mut pattern_timeouts = 0u64;

        for compiled in rules {
            let rule_started = Instant::now();
            let mut matches: Vec<Match> = Vec::new();

            for (pattern_index, pattern) in compiled.patterns.iter().enumerate() {
                match self.run_pattern(pattern, pattern_index, text, &text_id) {
                    Some(found) => matches.extend(found.iter().cloned()),
                    None => pattern_timeouts += 1,
                }
            }

            if matches.is_empty() {
                continue;
            }
            let rule = &compiled.rule;
            detections.push(Detection {
                rule_id: rule.rule_id.clone(),
                rule_version: rule.version.to_string(),
                severity: rule.severity,
                confidence: rule.confidence,
                matches,
                detected_at: Utc::now(),
                detection_layer: DetectionLayer::L1,
                layer_latency_ms: rule_started.elapsed().as_secs_f64() * 1000.0,
                category: rule.family.as_str().to_string(),
                message: rule.name.clone(),
                is_flagged: false,
                suppression_reason: None,
            });
        }

        detections.sort_by(|a, b| {
            a.rule_id
                .cmp(&b.rule_id)
                .then_with(|| a.first_match_start().cmp(&b.first_match_start()))
        });

        if pattern_timeouts > 0 {
            tracing::debug!(pattern_timeouts, "patterns abandoned on budget");
        }

        Ok(L1ScanResult {
            detections,
            duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            rules_evaluated: rules.len(),
            pattern_timeouts,
        })
    }

    /// Run one pattern, consulting the match cache. `None` means the pattern
    /// was abandoned on its budget (partial output is discarded, not cached).
    fn run_pattern(
        &self,
        pattern: &CompiledPattern,
        pattern_index: usize,
        text: &str,
        text_id: &str,
    ) -> Option<Arc<Vec<Match>>> {
        let cache_key = format!("{}:{}", pattern.fingerprint, text_id);
        if let Some(cache) = &self.match_cache {
            let mut cache = cache.lock().expect("match cache lock poisoned");
            if let Some(hit) = cache.get(&cache_key) {
                return Some(Arc::clone(hit));
            }
        }

        let deadline = Instant::now() + pattern.timeout;
        let mut found = Vec::new();
        for caps in pattern.regex.captures_iter(text) {
            if Instant::now() > deadline {
                tracing::warn!(
                    pattern = %pattern.fingerprint,
                    timeout_ms = pattern.timeout.as_millis() as u64,
                    "pattern abandoned on matching budget"
                );
                return None;
            }
            let overall = caps.get(0).expect("group 0 always participates");
            let groups = (1..caps.len())
                .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
                .collect();
            found.push(Match {
                pattern_index,
                start: overall.start(),
                end: overall.end(),
                matched_text: overall.as_str().to_string(),
                groups,
                context_before: self.context_before(text, overall.start()),
                context_after: self.context_after(text, overall.end()),
            });
        }

        let found = Arc::new(found);
        if let Some(cache) = &self.match_cache {
            let mut cache = cache.lock().expect("match cache lock poisoned");
            cache.put(cache_key, Arc::clone(&found));
        }
        Some(found)
    }

    fn context_before(&self, text: &str, start: usize) -> Option<String> {
        if self.config.context_window == 0 || start == 0 {
            return None;
        }
        let from = floor_char_boundary(text, start.saturating_sub(self.config.context_window));
        Some(text[from..start].to_string())
    }

    fn context_after(&self, text: &str, end: usize) -> Option<String> {
        if self.config.context_window == 0 || end >= text.len() {
            return None;
        }
        let to = ceil_char_boundary(text, (end + self.config.context_window).min(text.len()));
        Some(text[end..to].to_string())
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
