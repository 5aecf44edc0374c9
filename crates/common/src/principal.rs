use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::key::{KeyError, DELIMITER, FACET_DELIMITER, OWNER_DELIMITER};

/// Identifier of the wildcard principal
pub const ALL_PRINCIPALS: &str = "*";

/// A user or service acting on data.
///
/// Principals are identified by a short id that may appear as an owner
/// segment in a key, so ids cannot contain key delimiters. Their key pair
/// lives in the [`KeyVault`](crate::vault::KeyVault).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    pub fn parse(id: &str) -> Result<Self, KeyError> {
        if id.is_empty()
            || id
                .chars()
                .any(|c| c == DELIMITER || c == FACET_DELIMITER || c == OWNER_DELIMITER)
            || id.chars().any(char::is_whitespace)
        {
            return Err(KeyError::InvalidPrincipal(id.to_string()));
        }
        Ok(Self(id.to_string()))
    }

    /// The wildcard principal, standing for everyone
    pub fn all() -> Self {
        Self(ALL_PRINCIPALS.to_string())
    }

    pub fn is_all(&self) -> bool {
        self.0 == ALL_PRINCIPALS
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Principal {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Principal::parse("alice").unwrap().id(), "alice");
        assert!(Principal::parse("").is_err());
        assert!(Principal::parse("a/b").is_err());
        assert!(Principal::parse("a,b").is_err());
        assert!(Principal::parse("a:b").is_err());
        assert!(Principal::parse("a b").is_err());
    }

    #[test]
    fn test_wildcard() {
        assert!(Principal::all().is_all());
        assert!(Principal::parse("*").unwrap().is_all());
        assert!(!Principal::parse("alice").unwrap().is_all());
    }
}
