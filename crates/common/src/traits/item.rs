use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A policy marker attached to a schema node, identified by its tag.
///
/// Traits are immutable; the builder methods return modified copies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Trait {
    tag: String,
    /// A more specific scope may replace this trait
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    may_overwrite: bool,
    /// Removes the trait of the same tag from a less specific scope
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    cancel: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    params: BTreeMap<String, String>,
}

impl Trait {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            may_overwrite: false,
            cancel: false,
            params: BTreeMap::new(),
        }
    }

    /// A trait cancelling `tag` where it may be overwritten
    pub fn cancellation(tag: impl Into<String>) -> Self {
        Self {
            cancel: true,
            ..Self::new(tag)
        }
    }

    pub fn overwritable(self) -> Self {
        Self {
            may_overwrite: true,
            ..self
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn may_overwrite(&self) -> bool {
        self.may_overwrite
    }

    pub fn is_cancel(&self) -> bool {
        self.cancel
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Merge two traits of the same tag; `left` is the less specific one.
    /// `None` means the tag is removed.
    pub fn merge(left: &Trait, right: &Trait) -> Option<Trait> {
        if left == right {
            return Some(left.clone());
        }
        if left.may_overwrite {
            if right.cancel {
                None
            } else {
                Some(right.clone())
            }
        } else if left.cancel && right.may_overwrite {
            None
        } else {
            Some(left.clone())
        }
    }
}

impl fmt::Display for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cancel {
            write!(f, "!")?;
        }
        write!(f, "{}", self.tag)
    }
}
