//! Suppression and policy layers for the Raxe detection engine.
//!
//! Both layers post-process detections produced by the scan pipeline:
//!
//! - **Suppressions** hide or mark detections by rule-ID glob (`pi-*`),
//!   declared inline per scan or pushed as nested scopes.
//! - **Policies** map detections to enforcement actions (allow / block /
//!   flag / log) per customer, with priority-based conflict resolution.
//!
//! The crate is I/O-free except for the YAML loaders; evaluation operates on
//! a [`DetectionFacts`] projection so it stays decoupled from the scan
//! pipeline's full detection type.

pub mod policy;
pub mod suppression;

pub use policy::{
    evaluate_policies, DetectionFacts, Policy, PolicyAction, PolicyCondition, PolicyDecision,
    PolicyError, PolicySet, MAX_POLICIES,
};
pub use suppression::{
    AuditRecord, MemoryAuditSink, ScopedSuppressions, Suppression, SuppressionAction,
    SuppressionAuditSink, SuppressionError, SuppressionSet,
};
