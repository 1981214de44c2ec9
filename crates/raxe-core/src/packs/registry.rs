//! In-memory pack registry.
//!
//! The registry holds compiled rules from every installed pack, indexed for
//! the lookups the executor and callers need. A snapshot is immutable;
//! reloads build a fresh snapshot and swap it atomically, so readers never
//! see partial state and never take a lock on the hot path.

use super::RulePack;
use crate::errors::ConfigError;
use crate::rules::{compile, CompiledRule};
use raxe_common::{RuleFamily, SemVer, Severity};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Immutable view over all installed packs.
#[derive(Default)]
pub struct RegistrySnapshot {
    packs: HashMap<String, Arc<RulePack>>,
    /// All compiled rules, ordered by rule_id for deterministic execution.
    rules: Vec<Arc<CompiledRule>>,
    by_id: HashMap<String, Arc<CompiledRule>>,
    by_versioned_id: HashMap<String, Arc<CompiledRule>>,
    by_family: BTreeMap<String, Vec<Arc<CompiledRule>>>,
    by_severity: BTreeMap<Severity, Vec<Arc<CompiledRule>>>,
}

impl RegistrySnapshot {
    fn install(&mut self, pack: RulePack) -> Result<(), ConfigError> {
        let pack = Arc::new(pack);
        for rule in &pack.rules {
            let compiled = Arc::new(compile(rule)?);
            self.by_id
                .entry(rule.rule_id.clone())
                .or_insert_with(|| Arc::clone(&compiled));
            self.by_versioned_id
                .insert(rule.versioned_id(), Arc::clone(&compiled));
            self.by_family
                .entry(rule.family.as_str().to_string())
                .or_default()
                .push(Arc::clone(&compiled));
            self.by_severity
                .entry(rule.severity)
                .or_default()
                .push(Arc::clone(&compiled));
            self.rules.push(compiled);
        }
        self.rules.sort_by(|a, b| a.rule.rule_id.cmp(&b.rule.rule_id));
        self.packs.insert(pack.versioned_id(), pack);
        Ok(())
    }

    pub fn all_rules(&self) -> &[Arc<CompiledRule>] {
        &self.rules
    }

    pub fn rule(&self, rule_id: &str) -> Option<&Arc<CompiledRule>> {
        self.by_id.get(rule_id)
    }

    pub fn rule_versioned(&self, rule_id: &str, version: &SemVer) -> Option<&Arc<CompiledRule>> {
        self.by_versioned_id.get(&format!("{rule_id}@{version}"))
    }

    pub fn rules_by_family(&self, family: RuleFamily) -> &[Arc<CompiledRule>] {
        self.by_family
            .get(family.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rules_by_severity(&self, severity: Severity) -> &[Arc<CompiledRule>] {
        self.by_severity
            .get(&severity)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rules at or above `severity`.
    pub fn rules_at_least(&self, severity: Severity) -> Vec<Arc<CompiledRule>> {
        self.by_severity
            .range(severity..)
            .flat_map(|(_, rules)| rules.iter().cloned())
            .collect()
    }

    pub fn pack(&self, versioned_id: &str) -> Option<&Arc<RulePack>> {
        self.packs.get(versioned_id)
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Handle to the current snapshot. Cloning is cheap; readers pin a snapshot
/// for the duration of one scan so a concurrent reload cannot change the
/// rule set mid-scan.
#[derive(Clone, Default)]
pub struct PackRegistry {
    current: Arc<RwLock<Arc<RegistrySnapshot>>>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already-loaded packs.
    pub fn from_packs(packs: Vec<RulePack>) -> Result<Self, ConfigError> {
        let registry = Self::new();
        registry.reload(packs)?;
        Ok(registry)
    }

    /// Pin the current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read().expect("registry lock poisoned"))
    }

    /// Replace all installed packs atomically. Readers holding the old
    /// snapshot keep it until they finish.
    pub fn reload(&self, packs: Vec<RulePack>) -> Result<(), ConfigError> {
        let mut next = RegistrySnapshot::default();
        for pack in packs {
            next.install(pack)?;
        }
        let next = Arc::new(next);
        *self.current.write().expect("registry lock poisoned") = next;
        Ok(())
    }
}
