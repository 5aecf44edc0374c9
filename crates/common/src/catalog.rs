//! Persisted form of the directory: schemas, data nodes and their
//! consents, and the public half of the key vault.
//!
//! Executable nodes, and the consents-only nodes inside their sub-trees,
//! are not part of a catalog; applications register themselves again at
//! start-up.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::consent::MultiOwnerConsents;
use crate::directory::{Capability, DataNode, Node, NodeKind};
use crate::engine::Engine;
use crate::error::Error;
use crate::key::DDHKey;
use crate::principal::Principal;
use crate::schema::{JsonSchema, Schema, SchemaContainer};
use crate::traits::Traits;
use crate::vault::VaultSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub key: DDHKey,
    #[serde(default)]
    pub owners: Vec<Principal>,
    /// Traits declared at the key, not the inherited ones
    #[serde(default)]
    pub traits: Traits,
    pub default_variant: Option<String>,
    pub schemas: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    pub key: DDHKey,
    pub id: Uuid,
    pub owners: Vec<Principal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consents: Option<MultiOwnerConsents>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub schemas: Vec<SchemaEntry>,
    #[serde(default)]
    pub data: Vec<DataEntry>,
    #[serde(default)]
    pub vault: VaultSnapshot,
}

impl Catalog {
    pub fn capture(engine: &Engine) -> Self {
        let registry = engine.registry();

        let schemas = registry
            .nodes(Capability::Schema)
            .into_iter()
            .filter_map(|(key, node)| {
                let node = node.read();
                let schema_node = node.as_schema()?;
                let container = schema_node.container();
                Some(SchemaEntry {
                    key,
                    owners: node.owners().to_vec(),
                    traits: schema_node.traits().clone(),
                    default_variant: container.default_variant().map(str::to_string),
                    schemas: container.schemas().map(|s| s.document()).collect(),
                })
            })
            .collect();

        let data = registry
            .nodes(Capability::Data)
            .into_iter()
            .filter_map(|(key, node)| {
                let node = node.read();
                let id = node.as_data()?.id();
                Some(DataEntry {
                    key,
                    id,
                    owners: node.owners().to_vec(),
                    consents: node.consents().cloned(),
                })
            })
            .collect();

        Self {
            schemas,
            data,
            vault: engine.vault().export(),
        }
    }

    /// Register everything in the catalog with `engine`. Schemas go in key
    /// order so each one inherits the traits of those above it.
    pub fn restore(&self, engine: &Engine) -> Result<(), Error> {
        let mut schemas: Vec<&SchemaEntry> = self.schemas.iter().collect();
        schemas.sort_by(|a, b| a.key.cmp(&b.key));

        for entry in schemas {
            let mut container = SchemaContainer::default();
            for document in &entry.schemas {
                let schema: Arc<dyn Schema> = Arc::new(JsonSchema::from_value(document.clone())?);
                let make_default = entry.default_variant.as_deref() == Some(schema.variant());
                container.add(schema, make_default);
            }
            if container.default_variant().is_none() {
                return Err(Error::Config(format!("no schema at {}", entry.key)));
            }
            engine.install_schemas(
                &entry.key,
                container,
                entry.traits.clone(),
                entry.owners.clone(),
            );
        }

        engine.vault().import(self.vault.clone());

        let registry = engine.registry();
        for entry in &self.data {
            let node = Node::new(
                entry.key.clone(),
                entry.owners.clone(),
                NodeKind::Data(DataNode::new(entry.id)),
            )
            .with_consents(entry.consents.clone())
            .into_ref();
            registry.register(&entry.key, node);
        }

        tracing::info!(
            schemas = self.schemas.len(),
            data = self.data.len(),
            "restored catalog"
        );
        Ok(())
    }

    /// Read a catalog file; a missing file is an empty catalog
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!("failed to read {}: {}", path.display(), e).into()),
        }
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("failed to create {}: {}", parent.display(), e))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;
        Ok(())
    }
}
