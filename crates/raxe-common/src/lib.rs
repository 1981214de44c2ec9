//! Shared value types for the Raxe detection engine.
//!
//! Everything here is a pure value type with no I/O: severity and family
//! enums, text hashing, and semantic-version handling. Heavier domain logic
//! lives in `raxe-core` and `raxe-policy`.

pub mod hash;
pub mod semver;
pub mod severity;

pub use hash::{sha256_hex, text_key};
pub use semver::SemVer;
pub use severity::{RuleFamily, Severity};
