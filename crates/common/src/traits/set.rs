use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Trait;
use crate::transformers::tags;

/// A set of traits, unique by tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Trait>", into = "Vec<Trait>")]
pub struct Traits {
    traits: BTreeMap<String, Trait>,
}

impl From<Vec<Trait>> for Traits {
    fn from(traits: Vec<Trait>) -> Self {
        Self::new(traits)
    }
}

impl From<Traits> for Vec<Trait> {
    fn from(traits: Traits) -> Self {
        traits.traits.into_values().collect()
    }
}

impl FromIterator<Trait> for Traits {
    fn from_iter<I: IntoIterator<Item = Trait>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Traits {
    /// Later traits with the same tag replace earlier ones
    pub fn new(traits: impl IntoIterator<Item = Trait>) -> Self {
        let mut set = Self::default();
        for t in traits {
            set.insert(t);
        }
        set
    }

    /// What applies when no schema says otherwise.
    ///
    /// Validation may be cancelled by a schema; anonymization and
    /// pseudonymization are only offered where a schema lists them.
    pub fn defaults() -> Self {
        Self::new([
            Trait::new(tags::PARSE_DATA),
            Trait::new(tags::LOAD_FROM_STORAGE),
            Trait::new(tags::MUST_VALIDATE).overwritable(),
            Trait::new(tags::SAVE_TO_STORAGE),
            Trait::new(tags::APPLY_CONSENTS),
            Trait::new(tags::LOAD_CONSENTS),
            Trait::new(tags::AUDIT_ACCESS),
            Trait::new(tags::NOTIFY_SUBSCRIBERS),
            Trait::new(tags::ABORT_TRANSACTION),
        ])
    }

    pub fn insert(&mut self, t: Trait) -> Option<Trait> {
        self.traits.insert(t.tag().to_string(), t)
    }

    pub fn get(&self, tag: &str) -> Option<&Trait> {
        self.traits.get(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.traits.contains_key(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trait> {
        self.traits.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.traits.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }

    /// Merge tag by tag with [`Trait::merge`]; `self` is the less specific side
    pub fn merge(&self, other: &Traits) -> Traits {
        let mut merged = BTreeMap::new();
        for (tag, left) in &self.traits {
            let result = match other.traits.get(tag) {
                Some(right) => Trait::merge(left, right),
                None => Some(left.clone()),
            };
            if let Some(t) = result {
                merged.insert(tag.clone(), t);
            }
        }
        for (tag, right) in &other.traits {
            if !self.traits.contains_key(tag) {
                merged.insert(tag.clone(), right.clone());
            }
        }
        Traits { traits: merged }
    }
}
