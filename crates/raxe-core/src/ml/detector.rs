//! L2 detector trait, the stub implementation, and model discovery.

use super::{EmbeddingCache, L2Result};
use crate::engine::L1ScanResult;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Free-form request context handed to the detector (model name, caller id).
pub type ScanContext = BTreeMap<String, String>;

/// Model metadata for diagnostics and result envelopes.
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub is_stub: bool,
    pub latency_p95_ms: f64,
}

/// The ML detection layer.
///
/// `analyze` must never fail: model trouble comes back as an empty
/// [`L2Result`] with `metadata.error` set. Implementations are shared
/// read-only across scans after warmup; per-call state stays on the stack.
pub trait L2Detector: Send + Sync {
    fn analyze(
        &self,
        text: &str,
        l1: Option<&L1ScanResult>,
        context: Option<&ScanContext>,
    ) -> L2Result;

    fn model_info(&self) -> ModelInfo;
}

/// No-model fallback: always returns an empty result, in well under a
/// millisecond. Keeps the engine available when no model can be loaded.
#[derive(Debug, Default)]
pub struct StubDetector;

impl StubDetector {
    pub const MODEL_VERSION: &'static str = "stub-1.0.0";

    pub fn new() -> Self {
        Self
    }
}

impl L2Detector for StubDetector {
    fn analyze(
        &self,
        text: &str,
        l1: Option<&L1ScanResult>,
        _context: Option<&ScanContext>,
    ) -> L2Result {
        let started = Instant::now();
        let mut result = L2Result::empty(
            Self::MODEL_VERSION,
            started.elapsed().as_secs_f64() * 1000.0,
        );
        result.metadata.is_stub = true;
        result.record_input_features(text, l1);
        result
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "Raxe stub detector".into(),
            version: Self::MODEL_VERSION.into(),
            is_stub: true,
            latency_p95_ms: 1.0,
        }
    }
}

/// Locate and eagerly load the best available detector.
///
/// Tries, in order: the single-model quantized folder form, the packaged
/// embedder + classifier bundle, then the stub. Any load failure falls
/// through to the next candidate; the stub always succeeds.
pub fn discover_detector(
    model_dir: Option<&Path>,
    cache: Arc<EmbeddingCache>,
    voting: super::voting::VotingConfig,
    confidence_threshold: f64,
) -> Arc<dyn L2Detector> {
    #[cfg(feature = "onnx")]
    {
        if let Some(dir) = model_dir {
            match super::onnx::OnnxFolderDetector::load(dir, Arc::clone(&cache), voting.clone(), confidence_threshold) {
                Ok(detector) => {
                    tracing::info!(dir = %dir.display(), "loaded quantized ONNX folder model");
                    return Arc::new(detector);
                }
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "no folder-form model");
                }
            }
            match super::onnx::BundleDetector::load(dir, Arc::clone(&cache), voting, confidence_threshold) {
                Ok(detector) => {
                    tracing::info!(dir = %dir.display(), "loaded embedder+classifier bundle");
                    return Arc::new(detector);
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "no loadable model, degrading to stub");
                }
            }
        }
    }
    #[cfg(not(feature = "onnx"))]
    {
        let _ = (model_dir, cache, voting, confidence_threshold);
        tracing::debug!("onnx feature disabled, using stub detector");
    }

    Arc::new(StubDetector::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::voting::VotingConfig;

    #[test]
    fn stub_returns_empty_fast() {
        let stub = StubDetector::new();
        let result = stub.analyze("anything at all", None, None);
        assert!(!result.has_predictions());
        assert!(result.metadata.is_stub);
        assert!(result.processing_time_ms < 1.0);
        assert_eq!(result.model_version, StubDetector::MODEL_VERSION);
    }

    #[test]
    fn stub_records_l1_features() {
        let stub = StubDetector::new();
        let result = stub.analyze("text", Some(&L1ScanResult::default()), None);
        assert_eq!(
            result.features_extracted.get("l1_detections"),
            Some(&serde_json::Value::from(0))
        );
    }

    #[test]
    fn discovery_without_model_dir_yields_stub() {
        let detector = discover_detector(
            None,
            Arc::new(EmbeddingCache::new(16, None)),
            VotingConfig::default(),
            0.5,
        );
        assert!(detector.model_info().is_stub);
    }

    #[test]
    fn discovery_with_empty_dir_yields_stub() {
        let dir = tempfile::tempdir().unwrap();
        let detector = discover_detector(
            Some(dir.path()),
            Arc::new(EmbeddingCache::new(16, None)),
            VotingConfig::default(),
            0.5,
        );
        assert!(detector.model_info().is_stub);
    }
}
