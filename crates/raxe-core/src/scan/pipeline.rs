//! End-to-end scan orchestration.
//!
//! Two execution modes. **Sync** runs L1 then L2 sequentially. **Parallel**
//! (the default when both layers are enabled) starts both layers at once,
//! watches L1 for an early CRITICAL hit, and cancels L2 via a cooperative
//! flag checked before the classifier forward pass. Each layer has an
//! independent wall-clock budget; a layer that blows its budget yields an
//! empty result and a metadata flag, never a failed scan.

use super::{action_rank, ExecutionMode, ScanMetadata, ScanOptions, ScanResult};
use crate::config::{RaxeConfig, ScanMode};
use crate::engine::{Detection, DetectionLayer, ExecutorConfig, L1ScanResult, RuleExecutor};
use crate::errors::{ScanError, ValidationError};
use crate::ml::detector::{discover_detector, ScanContext};
use crate::ml::voting::{VotingConfig, VotingPreset};
use crate::ml::{EmbeddingCache, L2Detector, L2Result, StubDetector};
use crate::packs::{load_pack, LoaderOptions, PackRegistry, RulePack};
use crate::telemetry::{NoopEventSink, ScanEvent, ScanEventSink};
use chrono::Utc;
use raxe_common::{sha256_hex, Severity};
use raxe_policy::{
    evaluate_policies, AuditRecord, DetectionFacts, MemoryAuditSink, PolicyAction, PolicySet,
    ScopedSuppressions, Suppression, SuppressionAction, SuppressionAuditSink, SuppressionSet,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use uuid::Uuid;

/// Fast-path trigger: L1 CRITICAL at or above this confidence cancels L2.
const FAIL_FAST_CONFIDENCE: f64 = 0.90;

/// The detection engine. Construct once via [`Raxe::builder`], share via
/// `Arc`, and call [`Raxe::scan`] concurrently; every shared resource is
/// behind its own synchronization.
pub struct Raxe {
    config: RaxeConfig,
    registry: PackRegistry,
    executor: Arc<RuleExecutor>,
    detector: Arc<dyn L2Detector>,
    embedding_cache: Arc<EmbeddingCache>,
    policies: Option<PolicySet>,
    /// Suppressions loaded from `.raxe/suppressions.yaml`, always active.
    base_suppressions: Vec<Suppression>,
    scoped_suppressions: ScopedSuppressions,
    audit: Arc<dyn SuppressionAuditSink>,
    events: Arc<dyn ScanEventSink>,
    scan_permits: Arc<Semaphore>,
    waiting: AtomicUsize,
}

impl Raxe {
    pub fn builder() -> RaxeBuilder {
        RaxeBuilder::default()
    }

    /// Suppression scope manager; pushed scopes apply to every scan until
    /// their guard drops.
    pub fn suppressions(&self) -> &ScopedSuppressions {
        &self.scoped_suppressions
    }

    /// Push a suppression scope shared by subsequent scans.
    #[must_use = "dropping the guard immediately pops the scope"]
    pub fn push_suppression_scope(
        &self,
        suppressions: Vec<Suppression>,
    ) -> raxe_policy::suppression::ScopeGuard {
        self.scoped_suppressions.push(suppressions)
    }

    pub fn embedding_cache(&self) -> &EmbeddingCache {
        &self.embedding_cache
    }

    pub fn registry(&self) -> &PackRegistry {
        &self.registry
    }

    /// Scan `text` under `options`.
    ///
    /// Only [`ValidationError`] and queue exhaustion surface as errors;
    /// every layer-local failure is folded into the result metadata.
    pub async fn scan(&self, text: &str, options: &ScanOptions) -> Result<ScanResult, ScanError> {
        let settings = self.resolve_settings(options)?;
        self.executor
            .validate_input(text, settings.max_text_length)?;

        let _permit = self.acquire_slot().await?;

        let scan_id = Uuid::new_v4().to_string();
        let text_hash = sha256_hex(text);
        self.events.emit(ScanEvent::Started {
            scan_id: scan_id.clone(),
            text_hash: text_hash.clone(),
        });

        let started = Instant::now();
        let outcome = if settings.l1_enabled && settings.l2_enabled {
            self.run_parallel(text, &scan_id, &settings, options.context.as_ref())
                .await
        } else {
            self.run_sync(text, &scan_id, &settings, options.context.as_ref())
                .await
        };

        let result = self.assemble(
            outcome,
            &scan_id,
            text_hash,
            started,
            &settings,
            options,
        );
        self.events.emit(ScanEvent::Completed {
            scan_id,
            has_threats: result.has_threats,
            total_duration_ms: result.total_duration_ms,
        });
        Ok(result)
    }

    /// Blocking wrapper for synchronous callers. Must not be called from
    /// inside a tokio runtime.
    pub fn scan_blocking(&self, text: &str, options: &ScanOptions) -> Result<ScanResult, ScanError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to build scan runtime");
        runtime.block_on(self.scan(text, options))
    }

    fn resolve_settings(&self, options: &ScanOptions) -> Result<EffectiveSettings, ValidationError> {
        let d = &self.config.detection;
        let p = &self.config.performance;

        let mode = options.mode.unwrap_or(d.mode);
        let confidence_threshold = options
            .confidence_threshold
            .unwrap_or(d.confidence_threshold);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ValidationError::ConfidenceOutOfRange(confidence_threshold));
        }

        let mut l1_enabled = options.l1_enabled.unwrap_or(d.l1_enabled);
        let mut l2_enabled = options.l2_enabled.unwrap_or(d.l2_enabled);
        match mode {
            ScanMode::Fast => l2_enabled = false,
            ScanMode::Balanced | ScanMode::Thorough => {}
        }
        // A mode cannot resurrect an explicitly disabled layer.
        if options.l1_enabled == Some(false) {
            l1_enabled = false;
        }
        if options.l2_enabled == Some(false) {
            l2_enabled = false;
        }

        Ok(EffectiveSettings {
            mode,
            l1_enabled,
            l2_enabled,
            confidence_threshold,
            fail_fast_on_critical: options
                .fail_fast_on_critical
                .unwrap_or(d.fail_fast_on_critical),
            max_text_length: options.max_text_length.unwrap_or(p.max_text_length),
            l1_budget: Duration::from_millis(p.l1_timeout_ms),
            l2_budget: Duration::from_millis(p.l2_timeout_ms),
        })
    }

    async fn acquire_slot(&self) -> Result<tokio::sync::OwnedSemaphorePermit, ScanError> {
        if let Ok(permit) = Arc::clone(&self.scan_permits).try_acquire_owned() {
            return Ok(permit);
        }
        let queue_depth = self.config.performance.scan_queue_depth;
        let waiting = self.waiting.fetch_add(1, Ordering::SeqCst);
        if waiting >= queue_depth {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(ScanError::ResourceExhausted { waiting });
        }
        let permit = Arc::clone(&self.scan_permits)
            .acquire_owned()
            .await
            .expect("scan semaphore closed");
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        Ok(permit)
    }

    async fn run_l1(
        &self,
        text: &str,
        scan_id: &str,
        budget: Duration,
    ) -> (L1ScanResult, f64, bool, Option<String>) {
        let executor = Arc::clone(&self.executor);
        let rules = self.registry.snapshot();
        let text = text.to_string();
        let started = Instant::now();

        let handle =
            tokio::task::spawn_blocking(move || executor.execute(&text, rules.all_rules()));
        match timeout(budget, handle).await {
            Ok(Ok(Ok(result))) => {
                let duration = result.duration_ms;
                self.events.emit(ScanEvent::LayerCompleted {
                    scan_id: scan_id.to_string(),
                    layer: "l1",
                    duration_ms: duration,
                    detections: result.detection_count(),
                });
                (result, duration, false, None)
            }
            // Input was validated up front; an executor error here is a
            // layer failure, not a caller error.
            Ok(Ok(Err(e))) => (
                L1ScanResult::default(),
                started.elapsed().as_secs_f64() * 1000.0,
                false,
                Some(e.to_string()),
            ),
            Ok(Err(join_err)) => (
                L1ScanResult::default(),
                started.elapsed().as_secs_f64() * 1000.0,
                false,
                Some(format!("rule layer task failed: {join_err}")),
            ),
            Err(_) => {
                self.events.emit(ScanEvent::LayerTimedOut {
                    scan_id: scan_id.to_string(),
                    layer: "l1",
                    budget_ms: budget.as_millis() as u64,
                });
                (
                    L1ScanResult::default(),
                    budget.as_secs_f64() * 1000.0,
                    true,
                    None,
                )
            }
        }
    }

    /// Spawn the ML layer. `l1` is available in sync mode only; in parallel
    /// mode L2 starts before L1 finishes.
    fn spawn_l2(
        &self,
        text: &str,
        l1: Option<L1ScanResult>,
        context: Option<&ScanContext>,
        cancel: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<Option<L2Result>> {
        let detector = Arc::clone(&self.detector);
        let text = text.to_string();
        let context = context.cloned();
        tokio::task::spawn_blocking(move || {
            // Cooperative cancellation point, before the forward pass.
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            let result = detector.analyze(&text, l1.as_ref(), context.as_ref());
            // A cancellation that raced completion drops the result.
            if cancel.load(Ordering::SeqCst) {
                return None;
            }
            Some(result)
        })
    }

    async fn run_parallel(
        &self,
        text: &str,
        scan_id: &str,
        settings: &EffectiveSettings,
        context: Option<&ScanContext>,
    ) -> LayerOutcome {
        let started = Instant::now();
        let cancel = Arc::new(AtomicBool::new(false));
        let l2_handle = self.spawn_l2(text, None, context, Arc::clone(&cancel));

        let (l1, l1_duration, l1_timeout, l1_error) =
            self.run_l1(text, scan_id, settings.l1_budget).await;

        // Fast path: a confident CRITICAL from L1 makes L2 moot.
        let fail_fast = settings.fail_fast_on_critical
            && settings.mode != ScanMode::Thorough
            && l1.detections.iter().any(|d| {
                d.severity == Severity::Critical && d.confidence >= FAIL_FAST_CONFIDENCE
            });

        if fail_fast {
            cancel.store(true, Ordering::SeqCst);
            l2_handle.abort();
            self.events.emit(ScanEvent::L2Cancelled {
                scan_id: scan_id.to_string(),
            });
            return LayerOutcome {
                l1,
                l1_duration_ms: l1_duration,
                l1_timeout,
                l1_error,
                l2: None,
                l2_duration_ms: 0.0,
                l2_timeout: false,
                l2_cancelled: true,
                execution_mode: ExecutionMode::Parallel,
            };
        }

        let l2_deadline = settings
            .l2_budget
            .saturating_sub(started.elapsed())
            .max(Duration::from_millis(1));
        let (l2, l2_duration, l2_timeout) = match timeout(l2_deadline, l2_handle).await {
            Ok(Ok(Some(result))) => {
                let duration = result.processing_time_ms;
                self.events.emit(ScanEvent::LayerCompleted {
                    scan_id: scan_id.to_string(),
                    layer: "l2",
                    duration_ms: duration,
                    detections: result.prediction_count(),
                });
                (Some(result), duration, false)
            }
            Ok(Ok(None)) | Ok(Err(_)) => (None, 0.0, false),
            Err(_) => {
                cancel.store(true, Ordering::SeqCst);
                self.events.emit(ScanEvent::LayerTimedOut {
                    scan_id: scan_id.to_string(),
                    layer: "l2",
                    budget_ms: settings.l2_budget.as_millis() as u64,
                });
                (None, settings.l2_budget.as_secs_f64() * 1000.0, true)
            }
        };

        LayerOutcome {
            l1,
            l1_duration_ms: l1_duration,
            l1_timeout,
            l1_error,
            l2,
            l2_duration_ms: l2_duration,
            l2_timeout,
            l2_cancelled: false,
            execution_mode: ExecutionMode::Parallel,
        }
    }

    async fn run_sync(
        &self,
        text: &str,
        scan_id: &str,
        settings: &EffectiveSettings,
        context: Option<&ScanContext>,
    ) -> LayerOutcome {
        let (l1, l1_duration, l1_timeout, l1_error) = if settings.l1_enabled {
            self.run_l1(text, scan_id, settings.l1_budget).await
        } else {
            (L1ScanResult::default(), 0.0, false, None)
        };

        let (l2, l2_duration, l2_timeout) = if settings.l2_enabled {
            let cancel = Arc::new(AtomicBool::new(false));
            let handle = self.spawn_l2(text, Some(l1.clone()), context, Arc::clone(&cancel));
            match timeout(settings.l2_budget, handle).await {
                Ok(Ok(Some(result))) => {
                    let duration = result.processing_time_ms;
                    self.events.emit(ScanEvent::LayerCompleted {
                        scan_id: scan_id.to_string(),
                        layer: "l2",
                        duration_ms: duration,
                        detections: result.prediction_count(),
                    });
                    (Some(result), duration, false)
                }
                Ok(Ok(None)) | Ok(Err(_)) => (None, 0.0, false),
                Err(_) => {
                    cancel.store(true, Ordering::SeqCst);
                    self.events.emit(ScanEvent::LayerTimedOut {
                        scan_id: scan_id.to_string(),
                        layer: "l2",
                        budget_ms: settings.l2_budget.as_millis() as u64,
                    });
                    (None, settings.l2_budget.as_secs_f64() * 1000.0, true)
                }
            }
        } else {
            (None, 0.0, false)
        };

        LayerOutcome {
            l1,
            l1_duration_ms: l1_duration,
            l1_timeout,
            l1_error,
            l2,
            l2_duration_ms: l2_duration,
            l2_timeout,
            l2_cancelled: false,
            execution_mode: ExecutionMode::Sync,
        }
    }

    /// Merge layers, apply suppression and policies, build the envelope.
    fn assemble(
        &self,
        outcome: LayerOutcome,
        scan_id: &str,
        text_hash: String,
        started: Instant,
        settings: &EffectiveSettings,
        options: &ScanOptions,
    ) -> ScanResult {
        let LayerOutcome {
            l1,
            l1_duration_ms,
            l1_timeout,
            l1_error,
            l2,
            l2_duration_ms,
            l2_timeout,
            l2_cancelled,
            execution_mode,
        } = outcome;

        // Merge: L1 detections then L2 predictions, each already ordered,
        // filtered by the confidence floor.
        let mut detections: Vec<Detection> = l1
            .detections
            .into_iter()
            .filter(|d| d.confidence >= settings.confidence_threshold)
            .collect();
        let l2_error = l2.as_ref().and_then(|r| r.metadata.error.clone());
        if let Some(l2_result) = &l2 {
            for prediction in &l2_result.predictions {
                if prediction.confidence < settings.confidence_threshold {
                    continue;
                }
                detections.push(Detection {
                    rule_id: format!("l2-{}", prediction.threat_type.as_str()),
                    rule_version: l2_result.model_version.clone(),
                    severity: prediction.metadata.severity.unwrap_or(Severity::Medium),
                    confidence: prediction.confidence,
                    matches: Vec::new(),
                    detected_at: Utc::now(),
                    detection_layer: DetectionLayer::L2,
                    layer_latency_ms: l2_result.processing_time_ms,
                    category: prediction.metadata.family.clone(),
                    message: prediction.explanation.clone(),
                    is_flagged: false,
                    suppression_reason: None,
                });
            }
        }

        // Suppression: scoped entries from the context manager (innermost
        // first) plus the file-configured base set, then inline entries from
        // this scan's options; inline wins on conflict.
        let mut scoped = self.scoped_suppressions.active();
        scoped.extend(self.base_suppressions.iter().cloned());
        let (suppressions, suppression_errors) =
            SuppressionSet::compile(&scoped, &options.suppress);
        for err in &suppression_errors {
            tracing::warn!(error = %err, "ignoring invalid suppression");
        }

        let mut inline_suppressed_count = 0usize;
        let mut inline_flagged_count = 0usize;
        let mut retained: Vec<Detection> = Vec::with_capacity(detections.len());
        for mut detection in detections {
            let Some(hit) = suppressions.decide(&detection.rule_id, Some(scan_id)) else {
                retained.push(detection);
                continue;
            };
            if !options.dry_run {
                self.audit.record(AuditRecord {
                    pattern: hit.pattern.clone(),
                    reason: hit.reason.clone(),
                    action: hit.action,
                    scan_id: Some(scan_id.to_string()),
                    rule_id: Some(detection.rule_id.clone()),
                    created_at: Utc::now(),
                    created_by: options.customer_id.clone(),
                    metadata: Default::default(),
                });
            }
            match hit.action {
                SuppressionAction::Suppress => {
                    if hit.inline {
                        inline_suppressed_count += 1;
                    }
                }
                SuppressionAction::Flag => {
                    detection.is_flagged = true;
                    detection.suppression_reason = Some(hit.reason);
                    if hit.inline {
                        inline_flagged_count += 1;
                    }
                    retained.push(detection);
                }
                SuppressionAction::Log => retained.push(detection),
            }
        }

        // Policies: per retained detection, most restrictive action wins
        // the envelope.
        let mut policy_decisions = Vec::new();
        let mut action: Option<PolicyAction> = None;
        if let (Some(policies), false) = (&self.policies, options.dry_run) {
            for detection in &mut retained {
                let facts = DetectionFacts {
                    rule_id: detection.rule_id.clone(),
                    severity: detection.severity,
                    confidence: detection.confidence,
                    threat_type: Some(detection.category.clone()),
                    metadata: Default::default(),
                };
                let decision = evaluate_policies(&facts, policies, options.customer_id.as_deref());
                if decision.should_flag() {
                    detection.is_flagged = true;
                }
                detection.severity = decision.final_severity;
                action = Some(match action {
                    Some(current) if action_rank(current) >= action_rank(decision.action) => {
                        current
                    }
                    _ => decision.action,
                });
                policy_decisions.push((detection.versioned_rule_id(), decision));
            }
        }

        // Explain mode: enrich L1 messages with the rule's risk text. The
        // enrichment stays on the internal result; the wire projection
        // never carries messages.
        if options.explain {
            let snapshot = self.registry.snapshot();
            for detection in &mut retained {
                if detection.detection_layer != DetectionLayer::L1 {
                    continue;
                }
                if let Some(compiled) = snapshot.rule(&detection.rule_id) {
                    if !compiled.rule.risk_explanation.is_empty() {
                        detection.message = format!(
                            "{}: {}",
                            compiled.rule.name, compiled.rule.risk_explanation
                        );
                    }
                }
            }
        }

        let has_threats = !retained.is_empty();
        let combined_severity = retained.iter().map(|d| d.severity).max();
        let action = action.unwrap_or(if options.dry_run {
            PolicyAction::Log
        } else if has_threats {
            PolicyAction::Block
        } else {
            PolicyAction::Allow
        });

        let l1_count = retained
            .iter()
            .filter(|d| d.detection_layer == DetectionLayer::L1)
            .count();
        let l2_count = retained.len() - l1_count;

        let total_duration_ms = (started.elapsed().as_secs_f64() * 1000.0)
            .max(l1_duration_ms)
            .max(l2_duration_ms);
        let parallel_speedup = match execution_mode {
            ExecutionMode::Parallel if total_duration_ms > 0.0 => {
                Some((l1_duration_ms + l2_duration_ms) / total_duration_ms)
            }
            _ => None,
        };

        ScanResult {
            scan_id: scan_id.to_string(),
            has_threats,
            detections: retained,
            l1_detections: l1_count,
            l2_detections: l2_count,
            combined_severity,
            action,
            policy_decisions,
            l1_duration_ms,
            l2_duration_ms,
            total_duration_ms,
            text_hash,
            inline_suppressed_count,
            inline_flagged_count,
            l2_result: l2,
            metadata: ScanMetadata {
                mode: settings.mode,
                l1_enabled: settings.l1_enabled,
                l2_enabled: settings.l2_enabled,
                confidence_threshold: settings.confidence_threshold,
                execution_mode,
                l2_cancelled,
                l1_timeout,
                l2_timeout,
                parallel_speedup,
                l1_error,
                l2_error,
            },
        }
    }
}

/// Per-scan resolved knobs.
struct EffectiveSettings {
    mode: ScanMode,
    l1_enabled: bool,
    l2_enabled: bool,
    confidence_threshold: f64,
    fail_fast_on_critical: bool,
    max_text_length: usize,
    l1_budget: Duration,
    l2_budget: Duration,
}

struct LayerOutcome {
    l1: L1ScanResult,
    l1_duration_ms: f64,
    l1_timeout: bool,
    l1_error: Option<String>,
    l2: Option<L2Result>,
    l2_duration_ms: f64,
    l2_timeout: bool,
    l2_cancelled: bool,
    execution_mode: ExecutionMode,
}

/// Builder for [`Raxe`]. Loads packs, discovers the L2 model eagerly, and
/// wires default sinks; everything is overridable.
pub struct RaxeBuilder {
    config: RaxeConfig,
    packs: Vec<RulePack>,
    pack_errors: Vec<String>,
    detector: Option<Arc<dyn L2Detector>>,
    model_dir: Option<std::path::PathBuf>,
    policies: Option<PolicySet>,
    base_suppressions: Vec<Suppression>,
    audit: Option<Arc<dyn SuppressionAuditSink>>,
    events: Option<Arc<dyn ScanEventSink>>,
}

impl Default for RaxeBuilder {
    fn default() -> Self {
        Self {
            config: RaxeConfig::default(),
            packs: Vec::new(),
            pack_errors: Vec::new(),
            detector: None,
            model_dir: None,
            policies: None,
            base_suppressions: Vec::new(),
            audit: None,
            events: None,
        }
    }
}

impl RaxeBuilder {
    pub fn with_config(mut self, config: RaxeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_pack(mut self, pack: RulePack) -> Self {
        self.packs.push(pack);
        self
    }

    /// Load a pack directory; load failures are recorded and reported by
    /// `build`, matching the load-time propagation rule.
    pub fn with_pack_dir(mut self, dir: &Path, options: &LoaderOptions) -> Self {
        match load_pack(dir, options) {
            Ok(report) => {
                for err in &report.errors {
                    self.pack_errors.push(err.to_string());
                }
                self.packs.push(report.pack);
            }
            Err(e) => self.pack_errors.push(e.to_string()),
        }
        self
    }

    /// Folder to probe for ONNX models; without it (or without the `onnx`
    /// feature) the stub detector is used.
    pub fn with_model_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.model_dir = Some(dir.into());
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn L2Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn with_policies(mut self, policies: PolicySet) -> Self {
        self.policies = Some(policies);
        self
    }

    /// Load `.raxe/policies.yaml` from a project directory. Malformed
    /// entries are skipped with a warning; only the cap aborts.
    pub fn with_policies_dir(mut self, project_dir: &Path) -> Self {
        let path = project_dir.join(".raxe").join("policies.yaml");
        if !path.exists() {
            return self;
        }
        match raxe_policy::policy::load_policies_file(&path) {
            Ok(report) => {
                for err in &report.errors {
                    tracing::warn!(error = %err, "skipped policy entry");
                }
                self.policies = Some(report.policies);
            }
            Err(e) => self.pack_errors.push(e.to_string()),
        }
        self
    }

    /// Load `.raxe/suppressions.yaml` from a project directory. A legacy
    /// `.raxeignore` without the YAML config triggers a deprecation notice.
    pub fn with_suppressions_dir(mut self, project_dir: &Path) -> Self {
        match raxe_policy::suppression::load_suppressions_file(project_dir) {
            Ok(report) => {
                for err in &report.errors {
                    tracing::warn!(error = %err, "skipped suppression entry");
                }
                self.base_suppressions.extend(report.suppressions);
            }
            Err(e) => self.pack_errors.push(e.to_string()),
        }
        self
    }

    /// Sink for suppression audit records; defaults to an in-memory log.
    pub fn with_audit_sink(mut self, sink: Arc<dyn SuppressionAuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn ScanEventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Construct the engine. The L2 model loads now, not on first scan.
    pub fn build(self) -> anyhow::Result<Raxe> {
        if !self.pack_errors.is_empty() {
            anyhow::bail!("pack loading failed: {}", self.pack_errors.join("; "));
        }
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
        if let Some(policies) = &self.policies {
            let cap = self.config.policies.max_policies;
            if policies.len() > cap {
                anyhow::bail!(
                    "policy set has {} policies, configured cap is {cap}",
                    policies.len()
                );
            }
        }

        let registry = PackRegistry::from_packs(self.packs)
            .map_err(|e| anyhow::anyhow!("failed to build rule registry: {e}"))?;

        let embedding_cache = Arc::new(EmbeddingCache::new(
            self.config.cache.embedding_max_size,
            self.config.cache.embedding_ttl_s.map(Duration::from_secs),
        ));

        let preset: VotingPreset = self
            .config
            .voting
            .preset
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let voting = VotingConfig::preset(preset);

        let detector = match self.detector {
            Some(detector) => detector,
            None => match &self.model_dir {
                Some(dir) => discover_detector(
                    Some(dir),
                    Arc::clone(&embedding_cache),
                    voting,
                    self.config.detection.confidence_threshold,
                ),
                None => Arc::new(StubDetector::new()),
            },
        };
        tracing::info!(
            model = %detector.model_info().version,
            is_stub = detector.model_info().is_stub,
            "L2 detector ready"
        );

        let executor = Arc::new(RuleExecutor::new(ExecutorConfig {
            max_text_length: self.config.performance.max_text_length,
            context_window: 40,
            match_cache_size: self.config.cache.match_cache_size,
        }));

        let permits = self.config.performance.max_concurrent_scans.max(1);
        Ok(Raxe {
            registry,
            executor,
            detector,
            embedding_cache,
            policies: self.policies,
            base_suppressions: self.base_suppressions,
            scoped_suppressions: ScopedSuppressions::new(),
            audit: self.audit.unwrap_or_else(|| Arc::new(MemoryAuditSink::new())),
            events: self.events.unwrap_or_else(|| Arc::new(NoopEventSink)),
            scan_permits: Arc::new(Semaphore::new(permits)),
            waiting: AtomicUsize::new(0),
            config: self.config,
        })
    }
}

