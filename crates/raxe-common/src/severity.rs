use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Threat severity levels.
///
/// Ordering is by threat weight: `Info < Low < Medium < High < Critical`,
/// so `severity >= threshold` reads naturally in policy conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Lowercase wire representation (`"critical"`, `"high"`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "info" => Ok(Severity::Info),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// Rule family categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleFamily {
    /// Prompt injection.
    #[serde(rename = "PI")]
    Pi,
    /// Jailbreak.
    #[serde(rename = "JB")]
    Jb,
    /// PII / data leak.
    #[serde(rename = "PII")]
    Pii,
    /// Command injection.
    #[serde(rename = "CMD")]
    Cmd,
    /// Encoding / obfuscation attacks.
    #[serde(rename = "ENC")]
    Enc,
    /// RAG-specific attacks.
    #[serde(rename = "RAG")]
    Rag,
    /// Harmful content.
    #[serde(rename = "HC")]
    Hc,
    /// Security.
    #[serde(rename = "SEC")]
    Sec,
    /// Quality.
    #[serde(rename = "QUAL")]
    Qual,
    /// User-defined.
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl RuleFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleFamily::Pi => "PI",
            RuleFamily::Jb => "JB",
            RuleFamily::Pii => "PII",
            RuleFamily::Cmd => "CMD",
            RuleFamily::Enc => "ENC",
            RuleFamily::Rag => "RAG",
            RuleFamily::Hc => "HC",
            RuleFamily::Sec => "SEC",
            RuleFamily::Qual => "QUAL",
            RuleFamily::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for RuleFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PI" => Ok(RuleFamily::Pi),
            "JB" => Ok(RuleFamily::Jb),
            "PII" => Ok(RuleFamily::Pii),
            "CMD" => Ok(RuleFamily::Cmd),
            "ENC" => Ok(RuleFamily::Enc),
            "RAG" => Ok(RuleFamily::Rag),
            "HC" => Ok(RuleFamily::Hc),
            "SEC" => Ok(RuleFamily::Sec),
            "QUAL" => Ok(RuleFamily::Qual),
            "CUSTOM" => Ok(RuleFamily::Custom),
            other => Err(format!("unknown rule family: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_threat_weight() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn severity_round_trips_lowercase() {
        for s in [
            Severity::Critical,
            Severity::High,
            Severity::Medium,
            Severity::Low,
            Severity::Info,
        ] {
            assert_eq!(s.as_str().parse::<Severity>().unwrap(), s);
        }
    }

    #[test]
    fn family_parse_is_case_insensitive() {
        assert_eq!("pi".parse::<RuleFamily>().unwrap(), RuleFamily::Pi);
        assert_eq!("CUSTOM".parse::<RuleFamily>().unwrap(), RuleFamily::Custom);
        assert!("XX".parse::<RuleFamily>().is_err());
    }
}
