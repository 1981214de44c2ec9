//! Suppression models and matching.
//!
//! A suppression hides or marks detections whose rule ID matches a glob
//! pattern (`pi-*`, an exact ID, or a family prefix). Suppressions arrive
//! from two sources: scoped (pushed by a scan-context manager, possibly
//! nested) and inline (a per-scan parameter). Inline entries override scoped
//! ones for the same rule.

mod audit;
mod loader;
mod matcher;
mod scope;

pub use audit::{AuditRecord, MemoryAuditSink, SuppressionAuditSink};
pub use loader::{load_suppressions_file, SuppressionLoadReport, LEGACY_IGNORE_FILE};
pub use matcher::{SuppressionMatch, SuppressionSet};
pub use scope::{ScopeGuard, ScopedSuppressions};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// What to do with a matching detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuppressionAction {
    /// Remove the detection from results.
    #[default]
    Suppress,
    /// Keep the detection but mark it flagged.
    Flag,
    /// Keep the detection unchanged; record to the audit trail.
    Log,
}

/// Malformed suppression definitions. Offending entries are excluded; the
/// rest continue to load.
#[derive(Debug, Error)]
pub enum SuppressionError {
    #[error("invalid suppression pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to read suppression file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse suppression file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// A user-declared rule to hide or mark detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suppression {
    /// Rule-ID glob, e.g. `pi-*`.
    pub pattern: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub action: SuppressionAction,
    /// Restrict to a single scan when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_id: Option<String>,
    /// Restrict to a single rule when set (in addition to `pattern`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Suppression {
    /// A plain SUPPRESS entry for `pattern`, as produced by the shorthand
    /// string form in scan options.
    pub fn suppress(pattern: impl Into<String>) -> Self {
        Self::with_action(pattern, SuppressionAction::Suppress, "")
    }

    pub fn with_action(
        pattern: impl Into<String>,
        action: SuppressionAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            reason: reason.into(),
            action,
            scan_id: None,
            rule_id: None,
            created_at: Utc::now(),
            created_by: None,
            metadata: BTreeMap::new(),
        }
    }
}
