//! Suppression file loading (`.raxe/suppressions.yaml`) and legacy
//! `.raxeignore` deprecation detection.

use super::{Suppression, SuppressionError};
use serde::Deserialize;
use std::path::Path;

/// File name of the deprecated plain-text ignore list.
pub const LEGACY_IGNORE_FILE: &str = ".raxeignore";

#[derive(Debug, Deserialize)]
struct SuppressionsFile {
    #[allow(dead_code)]
    version: String,
    #[serde(default)]
    suppressions: Vec<serde_yaml::Value>,
}

/// Outcome of loading suppressions for a project directory.
#[derive(Debug, Default)]
pub struct SuppressionLoadReport {
    pub suppressions: Vec<Suppression>,
    pub errors: Vec<SuppressionError>,
    /// A `.raxeignore` was found without the YAML config.
    pub legacy_ignore_deprecated: bool,
}

/// Load suppressions for `project_dir`.
///
/// Reads `<project_dir>/.raxe/suppressions.yaml` when present. A legacy
/// `.raxeignore` alongside a missing YAML config triggers a deprecation
/// notice (the legacy file is NOT parsed).
pub fn load_suppressions_file(project_dir: &Path) -> Result<SuppressionLoadReport, SuppressionError> {
    let yaml_path = project_dir.join(".raxe").join("suppressions.yaml");
    let legacy_path = project_dir.join(LEGACY_IGNORE_FILE);

    let mut report = SuppressionLoadReport::default();

    if legacy_path.exists() && !yaml_path.exists() {
        report.legacy_ignore_deprecated = true;
        tracing::warn!(
            path = %legacy_path.display(),
            "DEPRECATION: .raxeignore is no longer read; migrate to .raxe/suppressions.yaml"
        );
    }

    if !yaml_path.exists() {
        return Ok(report);
    }

    let raw = std::fs::read_to_string(&yaml_path).map_err(|source| SuppressionError::Io {
        path: yaml_path.display().to_string(),
        source,
    })?;
    let file: SuppressionsFile =
        serde_yaml::from_str(&raw).map_err(|source| SuppressionError::Parse {
            path: yaml_path.display().to_string(),
            source,
        })?;

    for (idx, entry) in file.suppressions.into_iter().enumerate() {
        match serde_yaml::from_value::<Suppression>(entry) {
            Ok(s) => report.suppressions.push(s),
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping malformed suppression entry");
                report.errors.push(SuppressionError::InvalidPattern {
                    pattern: format!("<entry {idx}>"),
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
