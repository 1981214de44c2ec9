//! Engine configuration.
//!
//! Values resolve in three layers, later wins: `raxe.toml` config file,
//! `RAXE_*` environment variables, explicit scan options. The file and env
//! layers live here; per-scan overrides are applied by the pipeline.

use crate::errors::{ConfigError, ValidationError};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Pipeline mode: which layers run and whether the fast path may cancel L2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// L1 only.
    Fast,
    /// L1 + L2 with fast-path cancellation.
    #[default]
    Balanced,
    /// L1 + L2, no fast-path cancellation.
    Thorough,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Fast => "fast",
            ScanMode::Balanced => "balanced",
            ScanMode::Thorough => "thorough",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(ScanMode::Fast),
            "balanced" => Ok(ScanMode::Balanced),
            "thorough" => Ok(ScanMode::Thorough),
            other => Err(ValidationError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mode: ScanMode,
    pub l1_enabled: bool,
    pub l2_enabled: bool,
    /// Retention floor for detections and predictions.
    pub confidence_threshold: f64,
    /// Cancel L2 when L1 reports CRITICAL at >= 0.90 confidence.
    pub fail_fast_on_critical: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mode: ScanMode::Balanced,
            l1_enabled: true,
            l2_enabled: true,
            confidence_threshold: 0.5,
            fail_fast_on_critical: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Input cap in characters.
    pub max_text_length: usize,
    pub l1_timeout_ms: u64,
    pub l2_timeout_ms: u64,
    pub max_concurrent_scans: usize,
    /// Scans allowed to queue beyond the worker pool before callers get
    /// pushed back.
    pub scan_queue_depth: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_text_length: 100_000,
            l1_timeout_ms: 50,
            l2_timeout_ms: 100,
            max_concurrent_scans: 8,
            scan_queue_depth: 32,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub embedding_max_size: usize,
    /// Per-entry TTL in seconds; absent means entries never expire.
    pub embedding_ttl_s: Option<u64>,
    pub match_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            embedding_max_size: 1000,
            embedding_ttl_s: None,
            match_cache_size: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VotingSection {
    pub preset: String,
}

impl Default for VotingSection {
    fn default() -> Self {
        Self {
            preset: "balanced".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoliciesSection {
    pub max_policies: usize,
}

impl Default for PoliciesSection {
    fn default() -> Self {
        Self { max_policies: 100 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RaxeConfig {
    pub detection: DetectionConfig,
    pub performance: PerformanceConfig,
    pub cache: CacheConfig,
    pub voting: VotingSection,
    pub policies: PoliciesSection,
}

impl RaxeConfig {
    /// Parse a `raxe.toml` file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::InvalidField {
            context: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Resolve the full layering: defaults, optional file, then `RAXE_*`
    /// environment variables.
    pub fn resolve(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match file {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env();
        config.validate().map_err(|e| ConfigError::InvalidField {
            context: "config".into(),
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    /// Overlay `RAXE_*` environment variables. Unparseable values are
    /// ignored with a warning rather than failing startup.
    pub fn apply_env(&mut self) {
        fn read<T: FromStr>(key: &str, slot: &mut T) {
            if let Ok(raw) = std::env::var(key) {
                match raw.parse::<T>() {
                    Ok(v) => *slot = v,
                    Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable env override"),
                }
            }
        }

        read("RAXE_MODE", &mut self.detection.mode);
        read("RAXE_L1_ENABLED", &mut self.detection.l1_enabled);
        read("RAXE_L2_ENABLED", &mut self.detection.l2_enabled);
        read(
            "RAXE_CONFIDENCE_THRESHOLD",
            &mut self.detection.confidence_threshold,
        );
        read(
            "RAXE_FAIL_FAST_ON_CRITICAL",
            &mut self.detection.fail_fast_on_critical,
        );
        read("RAXE_MAX_TEXT_LENGTH", &mut self.performance.max_text_length);
        read("RAXE_L1_TIMEOUT_MS", &mut self.performance.l1_timeout_ms);
        read("RAXE_L2_TIMEOUT_MS", &mut self.performance.l2_timeout_ms);
        read(
            "RAXE_EMBEDDING_CACHE_SIZE",
            &mut self.cache.embedding_max_size,
        );
        if let Ok(raw) = std::env::var("RAXE_EMBEDDING_CACHE_TTL_S") {
            match raw.parse::<u64>() {
                Ok(v) => self.cache.embedding_ttl_s = Some(v),
                Err(_) => {
                    tracing::warn!(value = %raw, "ignoring unparseable RAXE_EMBEDDING_CACHE_TTL_S")
                }
            }
        }
        read("RAXE_VOTING_PRESET", &mut self.voting.preset);
        read("RAXE_MAX_POLICIES", &mut self.policies.max_policies);
    }

    /// Range checks on the assembled configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ValidationError::ConfidenceOutOfRange(
                self.detection.confidence_threshold,
            ));
        }
        Ok(())
    }
}
