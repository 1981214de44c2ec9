//! YAML policy file loading (`.raxe/policies.yaml`).
//!
//! Malformed entries are excluded and reported; the rest of the file still
//! loads. Only the size cap aborts the whole load.

use super::{Policy, PolicyError, PolicySet, MAX_POLICIES};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct PoliciesFile {
    #[allow(dead_code)]
    version: String,
    #[serde(default)]
    policies: Vec<serde_yaml::Value>,
}

/// Outcome of loading a policy file: the usable set plus per-entry errors.
#[derive(Debug)]
pub struct PolicyLoadReport {
    pub policies: PolicySet,
    pub errors: Vec<PolicyError>,
}

/// Load `.raxe/policies.yaml`.
///
/// Entries are deserialized one by one so a single malformed policy cannot
/// poison the file.
pub fn load_policies_file(path: &Path) -> Result<PolicyLoadReport, PolicyError> {
    let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let file: PoliciesFile = serde_yaml::from_str(&raw).map_err(|source| PolicyError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    if file.policies.len() > MAX_POLICIES {
        return Err(PolicyError::LimitExceeded {
            count: file.policies.len(),
        });
    }

    let mut policies = Vec::new();
    let mut errors = Vec::new();
    for (idx, entry) in file.policies.into_iter().enumerate() {
        let policy: Policy = match serde_yaml::from_value(entry) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(index = idx, error = %e, "skipping malformed policy entry");
                errors.push(PolicyError::Invalid {
                    policy_id: format!("<entry {idx}>"),
                    reason: e.to_string(),
                });
                continue;
            }
        };
        match policy.validate() {
            Ok(()) => policies.push(policy),
            Err(e) => {
                tracing::warn!(error = %e, "skipping invalid policy");
                errors.push(e);
            }
        }
    }

    // The cap was checked against the raw entry count, so this cannot fail
    // on size; individual policies were already validated.
    let policies = PolicySet::new(policies)?;
    Ok(PolicyLoadReport { policies, errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyAction;

    fn write_policies(yaml: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policies.yaml");
        std::fs::write(&path, yaml).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_valid_file() {
        let (_dir, path) = write_policies(
            r#"
version: "1.0.0"
policies:
  - policy_id: "allow-internal-pi"
    customer_id: "cust-1"
    name: "Allow internal prompt-injection tests"
    conditions:
      - rule_ids: ["pi-001"]
    action: "ALLOW"
    priority: 500
"#,
        );
        let report = load_policies_file(&path).unwrap();
        assert_eq!(report.policies.len(), 1);
        assert!(report.errors.is_empty());
        assert_eq!(report.policies.policies()[0].action, PolicyAction::Allow);
    }

    #[test]
    fn malformed_entry_is_skipped_not_fatal() {
        let (_dir, path) = write_policies(
            r#"
version: "1.0.0"
policies:
  - policy_id: "ok"
    customer_id: "cust-1"
    conditions:
      - severity_threshold: "high"
    action: "BLOCK"
  - policy_id: "bad"
    customer_id: "cust-1"
    conditions: []
    action: "BLOCK"
  - nonsense: true
"#,
        );
        let report = load_policies_file(&path).unwrap();
        assert_eq!(report.policies.len(), 1);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn oversized_set_is_rejected() {
        let mut yaml = String::from("version: \"1.0.0\"\npolicies:\n");
        for i in 0..(MAX_POLICIES + 1) {
            yaml.push_str(&format!(
                "  - policy_id: \"p{i}\"\n    customer_id: \"c\"\n    conditions: [{{}}]\n    action: \"LOG\"\n"
            ));
        }
        let (_dir, path) = write_policies(&yaml);
        let err = load_policies_file(&path).unwrap_err();
        assert!(matches!(err, PolicyError::LimitExceeded { .. }));
    }
}
