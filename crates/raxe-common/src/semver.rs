use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A MAJOR.MINOR.PATCH version.
///
/// Rules, packs, and schema versions are all plain three-part versions;
/// pre-release and build metadata are not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SemVer {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// True when `version` parses as MAJOR.MINOR.PATCH.
    pub fn is_valid(version: &str) -> bool {
        version.parse::<SemVer>().is_ok()
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SemVer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(format!("not a MAJOR.MINOR.PATCH version: {s:?}"));
        }
        let parse = |part: &str| -> Result<u32, String> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("invalid version component {part:?} in {s:?}"));
            }
            part.parse::<u32>()
                .map_err(|e| format!("invalid version component {part:?} in {s:?}: {e}"))
        };
        Ok(SemVer {
            major: parse(parts[0])?,
            minor: parse(parts[1])?,
            patch: parse(parts[2])?,
        })
    }
}

impl Serialize for SemVer {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_versions() {
        let v: SemVer = "1.2.0".parse().unwrap();
        assert_eq!(v, SemVer::new(1, 2, 0));
        assert_eq!(v.to_string(), "1.2.0");
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["1.2", "1.2.3.4", "a.b.c", "1.2.-3", "1.2.3-rc1", "", "1..3"] {
            assert!(!SemVer::is_valid(bad), "accepted {bad:?}");
        }
    }

    #[test]
    fn orders_numerically() {
        let a: SemVer = "0.9.0".parse().unwrap();
        let b: SemVer = "0.10.0".parse().unwrap();
        assert!(a < b);
    }
}
