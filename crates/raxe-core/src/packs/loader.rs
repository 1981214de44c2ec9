//! Pack directory loading and validation.
//!
//! Load order: parse `pack.yaml`, check schema compatibility, validate
//! manifest invariants, load + compile each rule file, verify the manifest
//! signature when present. In strict mode the first rule error aborts;
//! otherwise the pack loads best-effort and the errors ride along in the
//! report.

use super::signing::{content_digest, verify_manifest_signature, PackVerifyingKey};
use super::{PackManifest, RulePack};
use crate::errors::{ConfigError, SignatureError, VersionError};
use crate::rules::schema::RuleSchema;
use crate::rules::{matches_examples, Rule};
use std::path::Path;
use thiserror::Error;

/// Schema MAJOR this engine understands.
pub const SUPPORTED_SCHEMA_MAJOR: u32 = 1;

/// Options controlling pack loading.
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Abort on the first rule error instead of loading best-effort.
    pub strict: bool,
    /// Trust anchor for signed packs.
    pub verifying_key: Option<PackVerifyingKey>,
    /// Run each rule's example self-test and reject rules that fail.
    pub check_examples: bool,
}

/// Errors that abort a pack load entirely.
#[derive(Debug, Error)]
pub enum PackLoadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// A loaded pack plus any per-rule errors tolerated in lenient mode.
#[derive(Debug)]
pub struct PackLoadReport {
    pub pack: RulePack,
    pub errors: Vec<ConfigError>,
}

/// Load a pack from `dir` (which must contain `pack.yaml`).
pub fn load_pack(dir: &Path, options: &LoaderOptions) -> Result<PackLoadReport, PackLoadError> {
    let manifest_path = dir.join("pack.yaml");
    let raw = std::fs::read_to_string(&manifest_path).map_err(|source| ConfigError::Io {
        path: manifest_path.display().to_string(),
        source,
    })?;
    let manifest: PackManifest =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: manifest_path.display().to_string(),
            source,
        })?;

    check_schema_version(&manifest)?;
    manifest.validate()?;
    verify_manifest_signature(&manifest, options.verifying_key.as_ref())?;

    let mut rules: Vec<Rule> = Vec::with_capacity(manifest.rules.len());
    let mut errors: Vec<ConfigError> = Vec::new();

    for entry in &manifest.rules {
        match load_rule_file(dir, &entry.path, entry) {
            Ok(rule) => {
                if options.check_examples {
                    match matches_examples(&rule) {
                        Ok((fail_match, fail_not_match))
                            if fail_match.is_empty() && fail_not_match.is_empty() =>
                        {
                            rules.push(rule);
                        }
                        Ok((fail_match, fail_not_match)) => {
                            let err = ConfigError::InvalidField {
                                context: format!("rule {}", entry.id),
                                reason: format!(
                                    "example self-test failed ({} should-match, {} should-not-match)",
                                    fail_match.len(),
                                    fail_not_match.len()
                                ),
                            };
                            if options.strict {
                                return Err(err.into());
                            }
                            errors.push(err);
                        }
                        Err(err) => {
                            if options.strict {
                                return Err(err.into());
                            }
                            errors.push(err);
                        }
                    }
                } else {
                    rules.push(rule);
                }
            }
            Err(err) => {
                if options.strict {
                    return Err(err.into());
                }
                tracing::warn!(rule = %entry.id, error = %err, "excluding rule from pack");
                errors.push(err);
            }
        }
    }

    // In lenient mode the manifest is narrowed to the rules that survived,
    // keeping the pack invariant (manifest <-> rules bijection) intact.
    let mut manifest = manifest;
    if !errors.is_empty() {
        let loaded: std::collections::HashSet<String> =
            rules.iter().map(Rule::versioned_id).collect();
        manifest.rules.retain(|r| loaded.contains(&r.versioned_id()));
        if manifest.rules.is_empty() {
            return Err(ConfigError::InvalidField {
                context: format!("pack {}", manifest.id),
                reason: "no rules survived loading".into(),
            }
            .into());
        }
    }

    let digest = content_digest(&manifest).map_err(|reason| ConfigError::InvalidField {
        context: format!("pack {}", manifest.id),
        reason,
    })?;
    let pack = RulePack::new(manifest, rules, digest)?;
    tracing::info!(
        pack = %pack.versioned_id(),
        rules = pack.rules.len(),
        skipped = errors.len(),
        "loaded rule pack"
    );
    Ok(PackLoadReport { pack, errors })
}

fn check_schema_version(manifest: &PackManifest) -> Result<(), VersionError> {
    let major = manifest
        .schema_version
        .split('.')
        .next()
        .and_then(|p| p.parse::<u32>().ok());
    match major {
        Some(m) if m == SUPPORTED_SCHEMA_MAJOR => Ok(()),
        _ => Err(VersionError {
            context: format!("pack {}", manifest.id),
            found: manifest.schema_version.clone(),
            supported: SUPPORTED_SCHEMA_MAJOR,
        }),
    }
}

fn load_rule_file(
    dir: &Path,
    rel_path: &str,
    entry: &super::PackRule,
) -> Result<Rule, ConfigError> {
    let path = dir.join(rel_path);
    let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let schema: RuleSchema = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    let rule = schema.into_rule(Some(&entry.version))?;
    // Compile now so a bad regex is reported with file context; the
    // registry compiles again when the pack installs.
    crate::rules::compile(&rule)?;

    if rule.rule_id != entry.id || rule.version != entry.version {
        return Err(ConfigError::InvalidField {
            context: format!("rule file {rel_path}"),
            reason: format!(
                "identity mismatch: file says {}, manifest says {}",
                rule.versioned_id(),
                entry.versioned_id()
            ),
        });
    }
    Ok(rule)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_pack(dir: &Path, rule_pattern: &str) {
        fs::write(
            dir.join("pack.yaml"),
            r#"
id: "core"
version: "1.0.0"
name: "Core rules"
pack_type: "OFFICIAL"
schema_version: "1.1.0"
rules:
  - id: "pi-001"
    version: "1.0.0"
    path: "rules/PI/pi-001@1.0.0.yaml"
"#,
        )
        .unwrap();
        let rules_dir = dir.join("rules").join("PI");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(
            rules_dir.join("pi-001@1.0.0.yaml"),
            format!(
                r#"
version: "1.1.0"
rule_id: "pi-001"
family: "PI"
sub_family: "ignore_instructions"
name: "Ignore previous instructions"
severity: "high"
confidence: 0.92
patterns:
  - pattern: "{rule_pattern}"
    flags: ["IGNORECASE"]
examples:
  should_match:
    - "ignore all previous instructions"
"#
            ),
        )
        .unwrap();
    }

    #[test]
    fn loads_a_well_formed_pack() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "ignore .* instructions");
        let report = load_pack(dir.path(), &LoaderOptions::default()).unwrap();
        assert_eq!(report.pack.rules.len(), 1);
        assert!(report.errors.is_empty());
        assert_eq!(report.pack.versioned_id(), "core@1.0.0");
        assert!(!report.pack.content_digest.is_empty());
    }

    #[test]
    fn incompatible_schema_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "x");
        let manifest = fs::read_to_string(dir.path().join("pack.yaml"))
            .unwrap()
            .replace("schema_version: \"1.1.0\"", "schema_version: \"2.0.0\"");
        fs::write(dir.path().join("pack.yaml"), manifest).unwrap();
        assert!(matches!(
            load_pack(dir.path(), &LoaderOptions::default()),
            Err(PackLoadError::Version(_))
        ));
    }

    #[test]
    fn strict_mode_aborts_on_bad_rule() {
        let dir = tempfile::tempdir().unwrap();
        write_pack(dir.path(), "(unclosed");
        let strict = LoaderOptions {
            strict: true,
            ..Default::default()
        };
        assert!(load_pack(dir.path(), &strict).is_err());
    }

    #[test]
    fn example_self_test_gates_publication() {
        let dir = tempfile::tempdir().unwrap();
        // Pattern that cannot match its own should_match example.
        write_pack(dir.path(), "completely different pattern");
        let opts = LoaderOptions {
            check_examples: true,
            ..Default::default()
        };
        // Single-rule pack: dropping the rule empties the pack, which is fatal.
        assert!(load_pack(dir.path(), &opts).is_err());
    }
}
