//! Rule packs: versioned bundles of detection rules.
//!
//! A pack is a directory with a `pack.yaml` manifest and rule files under
//! `rules/<FAMILY>/<id>@<version>.yaml`. Packs are loaded once, validated,
//! optionally signature-verified, and installed into an immutable registry.

mod loader;
mod registry;
mod signing;

pub use loader::{load_pack, LoaderOptions, PackLoadError, PackLoadReport};
pub use registry::{PackRegistry, RegistrySnapshot};
pub use signing::{verify_manifest_signature, PackVerifyingKey};

use crate::errors::ConfigError;
use crate::rules::Rule;
use raxe_common::SemVer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Upper bound on rules per pack.
pub const MAX_RULES_PER_PACK: usize = 10_000;

/// Distribution tier of a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PackType {
    /// Maintained core packs bundled with the engine.
    Official,
    /// Community-contributed packs from the registry.
    Community,
    /// Organization-specific packs.
    Custom,
}

/// Reference to one versioned rule file within a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackRule {
    pub id: String,
    pub version: SemVer,
    /// Relative path within the pack directory.
    pub path: String,
}

impl PackRule {
    pub fn versioned_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }
}

/// Pack manifest, the parsed `pack.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackManifest {
    pub id: String,
    pub version: SemVer,
    pub name: String,
    pub pack_type: PackType,
    pub schema_version: String,
    pub rules: Vec<PackRule>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_algorithm: Option<String>,
}

impl PackManifest {
    pub fn versioned_id(&self) -> String {
        format!("{}@{}", self.id, self.version)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Manifest-level invariants: non-empty fields, unique versioned rule
    /// IDs, rule count under the cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ctx = || format!("pack {}", self.id);
        if self.id.is_empty() {
            return Err(ConfigError::InvalidField {
                context: "pack".into(),
                reason: "pack id cannot be empty".into(),
            });
        }
        if self.name.is_empty() {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: "pack name cannot be empty".into(),
            });
        }
        if self.schema_version.is_empty() {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: "pack schema_version cannot be empty".into(),
            });
        }
        if self.rules.is_empty() {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: "pack must contain at least one rule".into(),
            });
        }
        if self.rules.len() > MAX_RULES_PER_PACK {
            return Err(ConfigError::InvalidField {
                context: ctx(),
                reason: format!(
                    "pack declares {} rules, cap is {MAX_RULES_PER_PACK}",
                    self.rules.len()
                ),
            });
        }
        let mut seen = HashSet::new();
        for r in &self.rules {
            if !seen.insert(r.versioned_id()) {
                return Err(ConfigError::InvalidField {
                    context: ctx(),
                    reason: format!("duplicate rule {} in manifest", r.versioned_id()),
                });
            }
        }
        Ok(())
    }
}

/// A loaded pack: manifest plus resolved rules.
///
/// Invariant: loaded rules are bijective with manifest entries (versioned
/// IDs match exactly). Checked by [`RulePack::new`].
#[derive(Debug, Clone)]
pub struct RulePack {
    pub manifest: PackManifest,
    pub rules: Vec<Rule>,
    /// SHA-256 over the canonical manifest body (signature fields removed).
    pub content_digest: String,
}

impl RulePack {
    pub fn new(
        manifest: PackManifest,
        rules: Vec<Rule>,
        content_digest: String,
    ) -> Result<Self, ConfigError> {
        let manifest_ids: HashSet<String> =
            manifest.rules.iter().map(PackRule::versioned_id).collect();
        let loaded_ids: HashSet<String> = rules.iter().map(Rule::versioned_id).collect();

        let missing: Vec<&String> = manifest_ids.difference(&loaded_ids).collect();
        if !missing.is_empty() {
            return Err(ConfigError::InvalidField {
                context: format!("pack {}", manifest.id),
                reason: format!("missing rules declared in manifest: {missing:?}"),
            });
        }
        let extra: Vec<&String> = loaded_ids.difference(&manifest_ids).collect();
        if !extra.is_empty() {
            return Err(ConfigError::InvalidField {
                context: format!("pack {}", manifest.id),
                reason: format!("rules not declared in manifest: {extra:?}"),
            });
        }

        Ok(Self {
            manifest,
            rules,
            content_digest,
        })
    }

    pub fn pack_id(&self) -> &str {
        &self.manifest.id
    }

    pub fn versioned_id(&self) -> String {
        self.manifest.versioned_id()
    }
}
