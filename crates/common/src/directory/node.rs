use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::consent::MultiOwnerConsents;
use crate::executable::ExecutableApp;
use crate::key::DDHKey;
use crate::principal::Principal;
use crate::schema::SchemaContainer;
use crate::traits::{Traits, Transformers};

/// Shared handle to a node; the directory never copies nodes
pub type NodeRef = Arc<RwLock<Node>>;

/// What a node can be resolved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Schema,
    Data,
    Execute,
    Consents,
}

/// Schemas registered at a key, and the traits applying below it
#[derive(Debug)]
pub struct SchemaNode {
    container: SchemaContainer,
    /// Traits declared by this node itself
    traits: Traits,
    /// Inherited traits merged with this node's own, compiled lazily
    transformers: Arc<Transformers>,
}

impl SchemaNode {
    /// `inherited` are the effective traits of the enclosing scope
    pub fn new(container: SchemaContainer, traits: Traits, inherited: &Traits) -> Self {
        let effective = inherited.merge(&traits);
        Self {
            container,
            traits,
            transformers: Arc::new(Transformers::new(effective)),
        }
    }

    pub fn container(&self) -> &SchemaContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut SchemaContainer {
        &mut self.container
    }

    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    pub fn transformers(&self) -> &Arc<Transformers> {
        &self.transformers
    }
}

/// A stored object; the payload lives in the storage backend under `id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataNode {
    id: Uuid,
}

impl DataNode {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// A key served by an external application
#[derive(Clone)]
pub struct ExecutableNode {
    app: Arc<dyn ExecutableApp>,
}

impl ExecutableNode {
    pub fn new(app: Arc<dyn ExecutableApp>) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &Arc<dyn ExecutableApp> {
        &self.app
    }
}

impl fmt::Debug for ExecutableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableNode")
            .field("app", &self.app.id())
            .finish()
    }
}

#[derive(Debug)]
pub enum NodeKind {
    Schema(SchemaNode),
    Data(DataNode),
    Executable(ExecutableNode),
    /// Holds consents only, for keys inside an application's sub-tree
    Consents,
}

#[derive(Debug)]
pub struct Node {
    key: DDHKey,
    owners: Vec<Principal>,
    consents: Option<MultiOwnerConsents>,
    kind: NodeKind,
}

impl Node {
    pub fn new(key: DDHKey, owners: Vec<Principal>, kind: NodeKind) -> Self {
        Self {
            key: key.without_facets().ensure_rooted(),
            owners,
            consents: None,
            kind,
        }
    }

    pub fn into_ref(self) -> NodeRef {
        Arc::new(RwLock::new(self))
    }

    pub fn key(&self) -> &DDHKey {
        &self.key
    }

    pub fn owners(&self) -> &[Principal] {
        &self.owners
    }

    pub fn consents(&self) -> Option<&MultiOwnerConsents> {
        self.consents.as_ref()
    }

    pub fn set_consents(&mut self, consents: MultiOwnerConsents) {
        self.consents = Some(consents);
    }

    pub fn with_consents(mut self, consents: Option<MultiOwnerConsents>) -> Self {
        self.consents = consents;
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn supports(&self) -> BTreeSet<Capability> {
        let mut supports = BTreeSet::new();
        match self.kind {
            NodeKind::Schema(_) => supports.insert(Capability::Schema),
            NodeKind::Data(_) => supports.insert(Capability::Data),
            NodeKind::Executable(_) => supports.insert(Capability::Execute),
            NodeKind::Consents => false,
        };
        if self.consents.is_some() {
            supports.insert(Capability::Consents);
        }
        supports
    }

    pub fn as_schema(&self) -> Option<&SchemaNode> {
        match &self.kind {
            NodeKind::Schema(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_schema_mut(&mut self) -> Option<&mut SchemaNode> {
        match &mut self.kind {
            NodeKind::Schema(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataNode> {
        match &self.kind {
            NodeKind::Data(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_executable(&self) -> Option<&ExecutableNode> {
        match &self.kind {
            NodeKind::Executable(node) => Some(node),
            _ => None,
        }
    }
}
