//! ONNX-backed L2 detectors (feature `onnx`).
//!
//! Two disk layouts are supported:
//!
//! - **folder form**: `model.onnx` + `tokenizer.json` + `heads.json`, one
//!   quantized model mapping tokens straight to classifier heads;
//! - **bundle form**: `embedder.onnx` + `classifier.onnx` +
//!   `tokenizer.json` + `heads.json`, where the embedder output is cached
//!   in the embedding cache and the classifier runs on the vector.
//!
//! `Session` is not `Send`, so live sessions are cached per thread keyed by
//! model path; the detector itself only holds paths and configuration and
//! stays `Send + Sync`.

use super::voting::{cast_votes, HeadOutput, VotingConfig};
use super::{
    EmbeddingCache, L2Prediction, L2PredictionBundle, L2Result, L2Scores, L2ThreatType,
};
use crate::engine::L1ScanResult;
use crate::ml::detector::{L2Detector, ModelInfo, ScanContext};
use onnxruntime::environment::Environment;
use onnxruntime::ndarray::Array2;
use onnxruntime::session::Session;
use onnxruntime::tensor::OrtOwnedTensor;
use onnxruntime::GraphOptimizationLevel;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokenizers::Tokenizer;

const MAX_SEQUENCE_LENGTH: usize = 256;

static ORT_ENV: OnceLock<Environment> = OnceLock::new();

thread_local! {
    static SESSION_CACHE: RefCell<HashMap<PathBuf, Rc<RefCell<Session<'static>>>>> =
        RefCell::new(HashMap::new());
}

fn ort_environment() -> Result<&'static Environment, String> {
    if let Some(env) = ORT_ENV.get() {
        return Ok(env);
    }
    let env = Environment::builder()
        .with_name("raxe")
        .build()
        .map_err(|e| e.to_string())?;
    let _ = ORT_ENV.set(env);
    Ok(ORT_ENV.get().expect("environment just installed"))
}

fn thread_session(path: &Path) -> Result<Rc<RefCell<Session<'static>>>, String> {
    SESSION_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();
        if let Some(session) = cache.get(path) {
            return Ok(Rc::clone(session));
        }
        let env = ort_environment()?;
        let session = env
            .new_session_builder()
            .map_err(|e| e.to_string())?
            .with_optimization_level(GraphOptimizationLevel::Basic)
            .map_err(|e| e.to_string())?
            .with_model_from_file(path)
            .map_err(|e| e.to_string())?;
        let session = Rc::new(RefCell::new(session));
        cache.insert(path.to_path_buf(), Rc::clone(&session));
        Ok(session)
    })
}

/// `heads.json`: classifier output layout.
#[derive(Debug, Clone, Deserialize)]
struct HeadsManifest {
    model_version: String,
    heads: Vec<HeadSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct HeadSpec {
    /// `binary`, `family`, `severity`, `technique`, or `harm`.
    name: String,
    labels: Vec<String>,
    #[serde(default)]
    threat_labels: Vec<String>,
}

fn load_heads(path: &Path) -> Result<HeadsManifest, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    serde_json::from_str(&raw).map_err(|e| e.to_string())
}

fn load_tokenizer(path: &Path) -> Result<Tokenizer, String> {
    Tokenizer::from_file(path).map_err(|e| e.to_string())
}

fn encode(tokenizer: &Tokenizer, text: &str) -> Result<(Array2<i64>, Array2<i64>), String> {
    let encoding = tokenizer.encode(text, true).map_err(|e| e.to_string())?;
    let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    ids.truncate(MAX_SEQUENCE_LENGTH);
    let len = ids.len();
    let input_ids = Array2::from_shape_vec((1, len), ids).map_err(|e| e.to_string())?;
    let attention_mask = Array2::from_elem((1, len), 1i64);
    Ok((input_ids, attention_mask))
}

fn run_session(
    session: &Rc<RefCell<Session<'static>>>,
    input_ids: Array2<i64>,
    attention_mask: Array2<i64>,
) -> Result<Vec<Vec<f32>>, String> {
    let mut session = session.borrow_mut();
    let inputs = vec![input_ids.into_dyn(), attention_mask.into_dyn()];
    let outputs: Vec<OrtOwnedTensor<'_, '_, f32, _>> =
        session.run(inputs).map_err(|e| e.to_string())?;
    Ok(outputs
        .iter()
        .map(|t| t.iter().copied().collect::<Vec<f32>>())
        .collect())
}

fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f64> = logits.iter().map(|&l| ((l - max) as f64).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Decode one head's logits into a [`HeadOutput`].
fn decode_head(spec: &HeadSpec, logits: &[f32]) -> HeadOutput {
    let probs = softmax(logits);
    let (best_idx, best_prob) = probs
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, p)| (i, *p))
        .unwrap_or((0, 0.0));
    let prediction = spec
        .labels
        .get(best_idx)
        .cloned()
        .unwrap_or_else(|| "unknown".to_string());
    let is_threat = if spec.threat_labels.is_empty() {
        prediction != "benign" && prediction != "none"
    } else {
        spec.threat_labels.contains(&prediction)
    };
    HeadOutput {
        head_name: spec.name.clone(),
        prediction,
        confidence: best_prob,
        probabilities: Some(logits.to_vec()),
        is_threat_indicator: is_threat,
    }
}

/// Shared post-processing: head outputs → voting → predictions.
fn build_result(
    heads: &[HeadOutput],
    voting: &VotingConfig,
    confidence_threshold: f64,
    model_version: &str,
    started: Instant,
) -> L2Result {
    let vote = cast_votes(heads, voting);

    let mut result = L2Result::empty(model_version, 0.0);
    result.confidence = vote.confidence;

    if vote.is_threat() && vote.confidence >= confidence_threshold {
        let family_head = heads.iter().find(|h| h.head_name == "family");
        let technique_head = heads.iter().find(|h| h.head_name == "technique");
        let severity_head = heads.iter().find(|h| h.head_name == "severity");
        let binary_head = heads.iter().find(|h| h.head_name == "binary");

        let family = family_head
            .map(|h| h.prediction.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let sub_family = technique_head
            .map(|h| h.prediction.clone())
            .unwrap_or_else(|| "unknown".to_string());
        let severity = severity_head.and_then(|h| h.prediction.parse().ok());

        result.predictions.push(L2Prediction {
            threat_type: L2ThreatType::from_family(&family),
            confidence: vote.confidence,
            explanation: format!(
                "ensemble decision {:?} via {}",
                vote.decision, vote.decision_rule_triggered
            ),
            features_used: heads
                .iter()
                .map(|h| format!("{}={}", h.head_name, h.prediction))
                .collect(),
            metadata: L2PredictionBundle {
                family,
                sub_family,
                scores: L2Scores {
                    attack_probability: binary_head.map(|h| h.confidence).unwrap_or(0.0),
                    family_confidence: family_head.map(|h| h.confidence).unwrap_or(0.0),
                    subfamily_confidence: technique_head.map(|h| h.confidence).unwrap_or(0.0),
                },
                why_it_hit: vote
                    .per_head_votes
                    .values()
                    .map(|d| d.rationale.clone())
                    .collect::<Vec<_>>()
                    .join("; "),
                recommended_action: if vote.confidence >= 0.85 {
                    "block".to_string()
                } else {
                    "review".to_string()
                },
                uncertain: vote.is_review(),
                severity,
            },
        });
    }

    result.sort_predictions();
    result.processing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
    result
}

/// Single quantized model: tokens in, classifier heads out.
pub struct OnnxFolderDetector {
    model_path: PathBuf,
    tokenizer_path: PathBuf,
    heads: HeadsManifest,
    voting: VotingConfig,
    confidence_threshold: f64,
}

impl OnnxFolderDetector {
    pub fn load(
        dir: &Path,
        _cache: Arc<EmbeddingCache>,
        voting: VotingConfig,
        confidence_threshold: f64,
    ) -> Result<Self, String> {
        let model_path = dir.join("model.onnx");
        let tokenizer_path = dir.join("tokenizer.json");
        if !model_path.exists() {
            return Err(format!("{} not found", model_path.display()));
        }
        let heads = load_heads(&dir.join("heads.json"))?;
        // Eager warmup: materialize tokenizer and session now so the first
        // scan does not pay the load cost.
        load_tokenizer(&tokenizer_path)?;
        thread_session(&model_path)?;
        Ok(Self {
            model_path,
            tokenizer_path,
            heads,
            voting,
            confidence_threshold,
        })
    }

    fn infer(&self, text: &str) -> Result<Vec<HeadOutput>, String> {
        let tokenizer = load_tokenizer(&self.tokenizer_path)?;
        let (input_ids, attention_mask) = encode(&tokenizer, text)?;
        let session = thread_session(&self.model_path)?;
        let outputs = run_session(&session, input_ids, attention_mask)?;
        if outputs.len() < self.heads.heads.len() {
            return Err(format!(
                "model produced {} outputs, heads manifest declares {}",
                outputs.len(),
                self.heads.heads.len()
            ));
        }
        Ok(self
            .heads
            .heads
            .iter()
            .zip(outputs.iter())
            .map(|(spec, logits)| decode_head(spec, logits))
            .collect())
    }
}

impl L2Detector for OnnxFolderDetector {
    fn analyze(
        &self,
        text: &str,
        l1: Option<&L1ScanResult>,
        _context: Option<&ScanContext>,
    ) -> L2Result {
        let started = Instant::now();
        let mut result = match self.infer(text) {
            Ok(heads) => build_result(
                &heads,
                &self.voting,
                self.confidence_threshold,
                &self.heads.model_version,
                started,
            ),
            Err(e) => L2Result::failed(
                self.heads.model_version.clone(),
                started.elapsed().as_secs_f64() * 1000.0,
                e,
            ),
        };
        result.record_input_features(text, l1);
        result
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "Raxe quantized folder model".into(),
            version: self.heads.model_version.clone(),
            is_stub: false,
            latency_p95_ms: 150.0,
        }
    }
}

/// Two-model bundle: embedder feeding a classifier, with the embedding
/// memoized in the shared cache.
pub struct BundleDetector {
    embedder_path: PathBuf,
    classifier_path: PathBuf,
    tokenizer_path: PathBuf,
    heads: HeadsManifest,
    cache: Arc<EmbeddingCache>,
    voting: VotingConfig,
    confidence_threshold: f64,
}

impl BundleDetector {
    pub fn load(
        dir: &Path,
        cache: Arc<EmbeddingCache>,
        voting: VotingConfig,
        confidence_threshold: f64,
    ) -> Result<Self, String> {
        let embedder_path = dir.join("embedder.onnx");
        let classifier_path = dir.join("classifier.onnx");
        let tokenizer_path = dir.join("tokenizer.json");
        if !embedder_path.exists() || !classifier_path.exists() {
            return Err(format!("no embedder/classifier pair in {}", dir.display()));
        }
        let heads = load_heads(&dir.join("heads.json"))?;
        load_tokenizer(&tokenizer_path)?;
        thread_session(&embedder_path)?;
        thread_session(&classifier_path)?;
        Ok(Self {
            embedder_path,
            classifier_path,
            tokenizer_path,
            heads,
            cache,
            voting,
            confidence_threshold,
        })
    }

    fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>, String> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let tokenizer = load_tokenizer(&self.tokenizer_path)?;
        let (input_ids, attention_mask) = encode(&tokenizer, text)?;
        let session = thread_session(&self.embedder_path)?;
        let outputs = run_session(&session, input_ids, attention_mask)?;
        let token_vectors = outputs
            .into_iter()
            .next()
            .ok_or_else(|| "embedder returned no outputs".to_string())?;
        self.cache.put(text, token_vectors.clone());
        Ok(Arc::new(token_vectors))
    }

    fn classify(&self, embedding: &[f32]) -> Result<Vec<HeadOutput>, String> {
        let input = Array2::from_shape_vec((1, embedding.len()), embedding.to_vec())
            .map_err(|e| e.to_string())?;
        let session = thread_session(&self.classifier_path)?;
        let mut session = session.borrow_mut();
        let outputs: Vec<OrtOwnedTensor<'_, '_, f32, _>> = session
            .run(vec![input.into_dyn()])
            .map_err(|e| e.to_string())?;
        let logit_sets: Vec<Vec<f32>> = outputs
            .iter()
            .map(|t| t.iter().copied().collect())
            .collect();
        if logit_sets.len() < self.heads.heads.len() {
            return Err(format!(
                "classifier produced {} outputs, heads manifest declares {}",
                logit_sets.len(),
                self.heads.heads.len()
            ));
        }
        Ok(self
            .heads
            .heads
            .iter()
            .zip(logit_sets.iter())
            .map(|(spec, logits)| decode_head(spec, logits))
            .collect())
    }
}

impl L2Detector for BundleDetector {
    fn analyze(
        &self,
        text: &str,
        l1: Option<&L1ScanResult>,
        _context: Option<&ScanContext>,
    ) -> L2Result {
        let started = Instant::now();
        let outcome = self
            .embed(text)
            .and_then(|embedding| self.classify(&embedding));
        let mut result = match outcome {
            Ok(heads) => build_result(
                &heads,
                &self.voting,
                self.confidence_threshold,
                &self.heads.model_version,
                started,
            ),
            Err(e) => L2Result::failed(
                self.heads.model_version.clone(),
                started.elapsed().as_secs_f64() * 1000.0,
                e,
            ),
        };
        result.record_input_features(text, l1);
        result
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "Raxe embedder+classifier bundle".into(),
            version: self.heads.model_version.clone(),
            is_stub: false,
            latency_p95_ms: 150.0,
        }
    }
}
