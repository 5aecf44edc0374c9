use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Schema;
use crate::error::Error;
use crate::key::Version;

pub const DEFAULT_VARIANT: &str = "default";

/// Every variant and version of the schema registered at one key.
///
/// Negotiation: a missing variant means the default variant; an unspecified
/// version means the latest one; otherwise the highest version equal to the
/// requested one under the short-prefix rule wins.
#[derive(Clone, Default)]
pub struct SchemaContainer {
    schemas: BTreeMap<String, Vec<Arc<dyn Schema>>>,
    default_variant: Option<String>,
}

impl fmt::Debug for SchemaContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let versions: BTreeMap<&String, Vec<String>> = self
            .schemas
            .iter()
            .map(|(variant, schemas)| {
                (
                    variant,
                    schemas.iter().map(|s| s.version().to_string()).collect(),
                )
            })
            .collect();
        f.debug_struct("SchemaContainer")
            .field("schemas", &versions)
            .field("default_variant", &self.default_variant)
            .finish()
    }
}

impl SchemaContainer {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        let mut container = Self::default();
        container.add(schema, true);
        container
    }

    /// Add a schema, replacing one with the same variant and exact version.
    /// The first variant added becomes the default unless `make_default` moves it.
    pub fn add(&mut self, schema: Arc<dyn Schema>, make_default: bool) {
        let variant = schema.variant().to_string();
        if make_default || self.default_variant.is_none() {
            self.default_variant = Some(variant.clone());
        }
        let versions = self.schemas.entry(variant).or_default();
        versions.retain(|s| s.version() != schema.version());
        versions.push(schema);
        versions.sort_by(|a, b| a.version().cmp(b.version()));
    }

    pub fn default_variant(&self) -> Option<&str> {
        self.default_variant.as_deref()
    }

    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Arc<dyn Schema>> {
        self.schemas.values().flatten()
    }

    pub fn get(&self, variant: Option<&str>, version: &Version) -> Result<Arc<dyn Schema>, Error> {
        let variant = variant
            .or(self.default_variant.as_deref())
            .ok_or_else(|| Error::NotFound("schema".to_string()))?;
        let versions = self
            .schemas
            .get(variant)
            .ok_or_else(|| Error::NotFound(format!("schema variant {}", variant)))?;

        versions
            .iter()
            .rev()
            .find(|s| s.version().matches(version))
            .cloned()
            .ok_or_else(|| {
                Error::VersionMismatch(format!(
                    "no version of schema variant {} matches {}",
                    variant, version
                ))
            })
    }
}
