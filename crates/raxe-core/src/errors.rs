//! Error taxonomy for the scan core.
//!
//! Layer-local failures (model errors, pattern timeouts, cache trouble) are
//! never surfaced from `scan()`; they are captured as metadata on the
//! partial layer result. Only input validation and resource exhaustion
//! propagate to the caller. Configuration errors propagate at load time.

use thiserror::Error;

/// Input rejected before any layer runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("input is empty")]
    EmptyInput,

    #[error("input exceeds max_text_length ({length} > {max})")]
    TooLong { length: usize, max: usize },

    #[error("invalid scan mode: {0:?} (expected fast, balanced, or thorough)")]
    InvalidMode(String),

    #[error("confidence threshold must be 0-1, got {0}")]
    ConfidenceOutOfRange(f64),
}

/// Errors surfaced from `scan()`.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("scan queue is full ({waiting} scans already waiting)")]
    ResourceExhausted { waiting: usize },
}

impl ScanError {
    /// Exit code for CLI callers: validation and exhaustion are both
    /// configuration/usage errors.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Rule or pack configuration errors, reported at load time. The offending
/// rule or pack is excluded; a scan never sees these.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{context}: unknown regex flag {flag:?}")]
    UnknownFlag { context: String, flag: String },

    #[error("{context}: invalid regex {pattern:?}: {reason}")]
    InvalidRegex {
        context: String,
        pattern: String,
        reason: String,
    },

    #[error("{context}: pattern cannot be empty")]
    EmptyPattern { context: String },

    #[error("{context}: {reason}")]
    InvalidField { context: String, reason: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Schema version incompatibility between a pack and this engine.
#[derive(Debug, Error)]
#[error("unsupported schema version {found} in {context} (supported: {supported}.x)")]
pub struct VersionError {
    pub context: String,
    pub found: String,
    pub supported: u32,
}

/// Pack signature present but invalid. Non-recoverable for that pack.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("pack {pack_id}: unsupported signature algorithm {algorithm:?}")]
    UnsupportedAlgorithm { pack_id: String, algorithm: String },

    #[error("pack {pack_id}: malformed signature: {reason}")]
    Malformed { pack_id: String, reason: String },

    #[error("pack {pack_id}: signature verification failed")]
    VerificationFailed { pack_id: String },

    #[error("pack {pack_id} is signed but no public key is configured")]
    NoPublicKey { pack_id: String },
}
