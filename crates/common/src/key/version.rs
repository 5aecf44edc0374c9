use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::KeyError;

/// Maximum number of numeric parts in a version
pub const MAX_VERSION_PARTS: usize = 4;

/// A schema version of up to four numeric parts.
///
/// Equality, ordering and hashing are exact, part by part, so `1.0 < 1.0.1`.
/// Negotiation uses [`Version::matches`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(Vec<u32>);

impl Version {
    pub fn unspecified() -> Self {
        Self::default()
    }

    pub fn new(parts: &[u32]) -> Result<Self, KeyError> {
        if parts.len() > MAX_VERSION_PARTS {
            return Err(KeyError::TooManyVersionParts(parts.len()));
        }
        Ok(Self(parts.to_vec()))
    }

    pub fn is_unspecified(&self) -> bool {
        self.0.is_empty()
    }

    pub fn parts(&self) -> &[u32] {
        &self.0
    }

    /// Short-prefix match: only the parts both sides specify are compared,
    /// so `1.0` matches `1.0.1` but not `1.1`, and the unspecified version
    /// matches every version.
    ///
    /// Not transitive: `1.2` and `1.3` both match `1`.
    pub fn matches(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|p| p.to_string()).collect();
        f.write_str(&parts.join("."))
    }
}

impl FromStr for Version {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::unspecified());
        }
        let parts = s
            .split('.')
            .map(|p| {
                p.parse::<u32>()
                    .map_err(|_| KeyError::InvalidVersion(s.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(&parts)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_short_prefix_match() {
        assert!(v("1.0").matches(&v("1.0.1")));
        assert!(v("1.0.1").matches(&v("1.0")));
        assert!(v("1").matches(&v("1.7.3.2")));
        assert!(!v("1.0").matches(&v("1.1")));
        assert!(!v("2").matches(&v("1.9")));
    }

    #[test]
    fn test_unspecified_matches_everything() {
        assert!(v("").is_unspecified());
        assert!(Version::unspecified().matches(&v("3.2.1")));
        assert_ne!(Version::unspecified(), v("3.2.1"));
    }

    #[test]
    fn test_equality_is_exact() {
        let (one, a, b) = (v("1"), v("1.2"), v("1.3"));
        assert!(one.matches(&a) && one.matches(&b));
        assert!(!a.matches(&b));
        assert_ne!(one, a);
        assert_ne!(a, b);
        assert_eq!(v("1.2"), a);

        let set: std::collections::HashSet<Version> = [one, a, b, v("1.2")].into_iter().collect();
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_ordering() {
        assert!(v("1.0") < v("1.1"));
        assert!(v("1.10") > v("1.9"));
        assert!(v("1.0") < v("1.0.5"));
        assert!(Version::unspecified() < v("0"));
        let mut versions = vec![v("2"), v("1.0.5"), v("1.0"), v("1.1")];
        versions.sort();
        assert_eq!(versions, vec![v("1.0"), v("1.0.5"), v("1.1"), v("2")]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "1.x".parse::<Version>(),
            Err(KeyError::InvalidVersion(_))
        ));
        assert!(matches!(
            "1..2".parse::<Version>(),
            Err(KeyError::InvalidVersion(_))
        ));
        assert!(matches!(
            "1.2.3.4.5".parse::<Version>(),
            Err(KeyError::TooManyVersionParts(5))
        ));
        assert_eq!(v("1.2.3.4").parts(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_display() {
        assert_eq!(v("1.0.2").to_string(), "1.0.2");
        assert_eq!(Version::unspecified().to_string(), "");
    }
}
