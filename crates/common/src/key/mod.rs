//! Hierarchical resource identifiers.
//!
//! A [`DDHKey`] is a `/`-delimited path with three facets appended after
//! `:` delimiters:
//!
//! ```text
//! /alice/docs/1:data
//! /org/schema:schema:compact:1.2
//! /org/schema::v2:1.0        (empty fork defaults to data)
//! ```
//!
//! A rooted key starts with the root marker (an empty first segment). The
//! segment right after the root is the owner segment, which may name several
//! principals separated by `,`.

mod fork;
mod version;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use fork::Fork;
pub use version::{Version, MAX_VERSION_PARTS};

use crate::principal::Principal;

/// The root marker segment
pub const ROOT: &str = "";
pub const DELIMITER: char = '/';
pub const FACET_DELIMITER: char = ':';
pub const OWNER_DELIMITER: char = ',';

/// Index of the owner segment in a rooted key
const OWNER_INDEX: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("unknown fork: {0}")]
    UnknownFork(String),
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("too many version parts: {0}")]
    TooManyVersionParts(usize),
    #[error("empty segment in key: {0}")]
    EmptySegment(String),
    #[error("too many facets in key: {0}")]
    TooManyFacets(String),
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),
}

/// Keys compare exactly, facets included. [`DDHKey::matches`] compares
/// versions by short prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DDHKey {
    segments: Vec<String>,
    fork: Fork,
    variant: Option<String>,
    version: Version,
}

impl DDHKey {
    /// The rooted empty key, `/`
    pub fn root() -> Self {
        Self {
            segments: vec![ROOT.to_string()],
            ..Default::default()
        }
    }

    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let mut facets = s.split(FACET_DELIMITER);
        let path = facets.next().unwrap_or_default();
        let fork = facets.next().unwrap_or_default().parse::<Fork>()?;
        let variant = facets
            .next()
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string());
        let version = facets.next().unwrap_or_default().parse::<Version>()?;
        if facets.next().is_some() {
            return Err(KeyError::TooManyFacets(s.to_string()));
        }

        Ok(Self {
            segments: parse_path(path)?,
            fork,
            variant,
            version,
        })
    }

    /// Build a key from raw segments. An empty first segment roots the key.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, KeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().skip(1).any(|s| s.is_empty()) {
            return Err(KeyError::EmptySegment(segments.join("/")));
        }
        Ok(Self {
            segments,
            ..Default::default()
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments, including the root marker
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_rooted(&self) -> bool {
        self.segments.first().map(|s| s == ROOT).unwrap_or(false)
    }

    pub fn fork(&self) -> Fork {
        self.fork
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Same path, fork and variant, with versions matching by short prefix
    pub fn matches(&self, other: &Self) -> bool {
        self.segments == other.segments
            && self.fork == other.fork
            && self.variant == other.variant
            && self.version.matches(&other.version)
    }

    pub fn with_fork(&self, fork: Fork) -> Self {
        Self {
            fork,
            ..self.clone()
        }
    }

    pub fn with_variant(&self, variant: Option<&str>) -> Self {
        Self {
            variant: variant.map(|v| v.to_string()),
            ..self.clone()
        }
    }

    pub fn with_version(&self, version: Version) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }

    pub fn without_facets(&self) -> Self {
        Self {
            segments: self.segments.clone(),
            ..Default::default()
        }
    }

    /// Parent key, keeping the facets. `None` at the root or for the empty key.
    pub fn up(&self) -> Option<Self> {
        if self.segments.is_empty() || (self.is_rooted() && self.segments.len() == 1) {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    /// Split into the first `index` segments and the rest.
    ///
    /// Both halves carry this key's facets; the suffix is never rooted
    /// unless `index` is zero. `prefix.join(&suffix)` yields this key again.
    pub fn split_at(&self, index: usize) -> (Self, Self) {
        let index = index.min(self.segments.len());
        let prefix = Self {
            segments: self.segments[..index].to_vec(),
            ..self.clone()
        };
        let suffix = Self {
            segments: self.segments[index..].to_vec(),
            ..self.clone()
        };
        (prefix, suffix)
    }

    /// Append `other`'s segments, keeping this key's facets
    pub fn join(&self, other: &DDHKey) -> Self {
        let mut joined = self.clone();
        joined.segments.extend(other.segments.iter().cloned());
        joined
    }

    pub fn child(&self, segment: &str) -> Result<Self, KeyError> {
        if segment.is_empty() || segment.contains(DELIMITER) || segment.contains(FACET_DELIMITER)
        {
            return Err(KeyError::EmptySegment(format!("{}/{}", self, segment)));
        }
        let mut child = self.clone();
        child.segments.push(segment.to_string());
        Ok(child)
    }

    pub fn ensure_rooted(&self) -> Self {
        if self.is_rooted() {
            return self.clone();
        }
        let mut rooted = self.clone();
        rooted.segments.insert(0, ROOT.to_string());
        rooted
    }

    /// Whether `self` lies at or below `ancestor`, comparing segments only
    pub fn starts_with(&self, ancestor: &DDHKey) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }

    /// The principals named by the owner segment of the rooted key
    pub fn owners(&self) -> Vec<Principal> {
        let rooted = self.ensure_rooted();
        rooted
            .segments
            .get(OWNER_INDEX)
            .map(|segment| {
                segment
                    .split(OWNER_DELIMITER)
                    .filter(|s| !s.is_empty())
                    .filter_map(|s| Principal::parse(s).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Path component only, e.g. `/alice/docs`
    pub fn path(&self) -> String {
        if self.is_rooted() {
            format!("{}{}", DELIMITER, self.segments[1..].join("/"))
        } else {
            self.segments.join("/")
        }
    }
}

fn parse_path(path: &str) -> Result<Vec<String>, KeyError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }

    let (rooted, body) = match path.strip_prefix(DELIMITER) {
        Some(rest) => (true, rest),
        None => (false, path),
    };
    let body = body.strip_suffix(DELIMITER).unwrap_or(body);

    let mut segments = Vec::new();
    if rooted {
        segments.push(ROOT.to_string());
    }
    if body.is_empty() {
        return Ok(segments);
    }
    for segment in body.split(DELIMITER) {
        if segment.is_empty() {
            return Err(KeyError::EmptySegment(path.to_string()));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

impl fmt::Display for DDHKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())?;
        if !self.version.is_unspecified() {
            write!(
                f,
                ":{}:{}:{}",
                self.fork,
                self.variant.as_deref().unwrap_or_default(),
                self.version
            )
        } else if let Some(variant) = &self.variant {
            write!(f, ":{}:{}", self.fork, variant)
        } else if self.fork != Fork::Data {
            write!(f, ":{}", self.fork)
        } else {
            Ok(())
        }
    }
}

impl FromStr for DDHKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DDHKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DDHKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn key(s: &str) -> DDHKey {
        DDHKey::parse(s).unwrap()
    }

    #[test]
    fn test_parse_rooted() {
        let k = key("/alice/docs/1");
        assert!(k.is_rooted());
        assert_eq!(k.segments(), &["", "alice", "docs", "1"]);
        assert_eq!(k.fork(), Fork::Data);
        assert_eq!(k.variant(), None);
        assert!(k.version().is_unspecified());
    }

    #[test]
    fn test_parse_facets() {
        let k = key("/org/schema:schema:compact:1.2");
        assert_eq!(k.fork(), Fork::Schema);
        assert_eq!(k.variant(), Some("compact"));
        assert_eq!(k.version().parts(), &[1, 2]);

        let k = key("/org/schema::v2:1.0");
        assert_eq!(k.fork(), Fork::Data);
        assert_eq!(k.variant(), Some("v2"));
    }

    #[test]
    fn test_parse_rejects() {
        assert!(matches!(
            DDHKey::parse("/a:bogus"),
            Err(KeyError::UnknownFork(_))
        ));
        assert!(matches!(
            DDHKey::parse("/a//b"),
            Err(KeyError::EmptySegment(_))
        ));
        assert!(matches!(
            DDHKey::parse("/a:data::1.2.3.4.5"),
            Err(KeyError::TooManyVersionParts(5))
        ));
        assert!(matches!(
            DDHKey::parse("/a:data::1.b"),
            Err(KeyError::InvalidVersion(_))
        ));
        assert!(matches!(
            DDHKey::parse("/a:data:v:1:extra"),
            Err(KeyError::TooManyFacets(_))
        ));
    }

    #[test]
    fn test_display_round_trip() {
        for s in [
            "/",
            "/alice",
            "/alice/docs/1",
            "/alice/docs:consents",
            "/org/schema:schema:compact",
            "/org/schema:data:v2:1.0",
            "relative/path",
        ] {
            assert_eq!(key(s).to_string(), s);
            assert_eq!(key(&key(s).to_string()), key(s));
        }
        assert_eq!(key("/alice/").to_string(), "/alice");
    }

    #[test]
    fn test_version_short_prefix_match() {
        assert!(key("/a/b:data::1.0").matches(&key("/a/b:data::1.0.1")));
        assert!(key("/a/b").matches(&key("/a/b:data::2.1")));
        assert!(!key("/a/b:data::1.0").matches(&key("/a/b:data::1.1")));
        assert!(!key("/a/b").matches(&key("/a/b:schema")));
        assert!(!key("/a/b").matches(&key("/a/c")));

        assert_ne!(key("/a/b:data::1.0"), key("/a/b:data::1.0.1"));
        assert!(key("/a/b:data::1.0") < key("/a/b:data::1.0.1"));
    }

    #[test]
    fn test_up() {
        let k = key("/alice/docs:consents");
        let parent = k.up().unwrap();
        assert_eq!(parent.to_string(), "/alice:consents");
        assert_eq!(parent.up().unwrap(), DDHKey::root().with_fork(Fork::Consents));
        assert!(DDHKey::root().up().is_none());
        assert!(DDHKey::default().up().is_none());
    }

    #[test]
    fn test_split_join_round_trip() {
        let k = key("/alice/docs/1:data:v1:1.0");
        for n in 0..=k.len() {
            let (prefix, suffix) = k.split_at(n);
            assert_eq!(prefix.len(), n);
            assert_eq!(prefix.join(&suffix), k);
        }

        let (prefix, suffix) = k.split_at(2);
        assert_eq!(prefix.path(), "/alice");
        assert_eq!(suffix.path(), "docs/1");
        assert!(!suffix.is_rooted());
        assert_eq!(suffix.variant(), Some("v1"));
    }

    #[test]
    fn test_ensure_rooted() {
        let k = key("alice/docs");
        assert!(!k.is_rooted());
        assert_eq!(k.ensure_rooted(), key("/alice/docs"));
        assert_eq!(key("/alice").ensure_rooted(), key("/alice"));
    }

    #[test]
    fn test_owners() {
        assert_eq!(
            key("/alice/docs").owners(),
            vec![Principal::parse("alice").unwrap()]
        );
        assert_eq!(
            key("/alice,bob/shared").owners(),
            vec![
                Principal::parse("alice").unwrap(),
                Principal::parse("bob").unwrap()
            ]
        );
        assert!(DDHKey::root().owners().is_empty());
    }

    #[test]
    fn test_serde_as_string() {
        let k = key("/alice/docs:consents");
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"/alice/docs:consents\"");
        assert_eq!(serde_json::from_str::<DDHKey>(&json).unwrap(), k);
    }
}
