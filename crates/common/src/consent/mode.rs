use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A way of accessing data, requested by callers and granted by consents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Read,
    Write,
    Anonymous,
    Pseudonym,
    Aggregated,
    Differential,
    Confidential,
    Protected,
}

pub type AccessModes = BTreeSet<AccessMode>;

/// Modes a caller may request without them being consented
pub const OPTIONAL_MODES: [AccessMode; 2] = [AccessMode::Read, AccessMode::Protected];

/// Consented modes the caller must request explicitly
pub const REQUIRED_IF_CONSENTED: [AccessMode; 5] = [
    AccessMode::Anonymous,
    AccessMode::Pseudonym,
    AccessMode::Aggregated,
    AccessMode::Differential,
    AccessMode::Confidential,
];

impl AccessMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Anonymous => "anonymous",
            AccessMode::Pseudonym => "pseudonym",
            AccessMode::Aggregated => "aggregated",
            AccessMode::Differential => "differential",
            AccessMode::Confidential => "confidential",
            AccessMode::Protected => "protected",
        }
    }

    /// Check `requested` modes against `consented` ones.
    ///
    /// Every requested mode must be consented unless it is optional, and
    /// every consented mode that is required-if-consented must be requested.
    /// `protected` is required-if-consented for writes only.
    pub fn check(requested: &AccessModes, consented: &AccessModes) -> Result<(), String> {
        let missing: Vec<&str> = requested
            .iter()
            .filter(|m| !OPTIONAL_MODES.contains(m) && !consented.contains(m))
            .map(|m| m.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("modes not consented: {}", missing.join(", ")));
        }

        let mut required: Vec<AccessMode> = REQUIRED_IF_CONSENTED.to_vec();
        if requested.contains(&AccessMode::Write) {
            required.push(AccessMode::Protected);
        }
        let unrequested: Vec<&str> = consented
            .iter()
            .filter(|m| required.contains(m) && !requested.contains(m))
            .map(|m| m.as_str())
            .collect();
        if !unrequested.is_empty() {
            return Err(format!(
                "consent requires modes to be requested: {}",
                unrequested.join(", ")
            ));
        }

        Ok(())
    }

    /// Parse a comma-separated mode list such as `read,anonymous`
    pub fn parse_set(s: &str) -> Result<AccessModes, String> {
        s.split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::parse::<AccessMode>)
            .collect()
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessMode::Read),
            "write" => Ok(AccessMode::Write),
            "anonymous" => Ok(AccessMode::Anonymous),
            "pseudonym" => Ok(AccessMode::Pseudonym),
            "aggregated" => Ok(AccessMode::Aggregated),
            "differential" => Ok(AccessMode::Differential),
            "confidential" => Ok(AccessMode::Confidential),
            "protected" => Ok(AccessMode::Protected),
            other => Err(format!("unknown access mode: {}", other)),
        }
    }
}
