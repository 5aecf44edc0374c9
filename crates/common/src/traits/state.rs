use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use uuid::Uuid;

use crate::consent::Access;
use crate::directory::NodeRef;
use crate::engine::Services;
use crate::schema::Schema;
use crate::transaction::Transaction;

/// Everything one pipeline run reads and mutates
pub struct TransformState<'a> {
    pub services: &'a Services,
    pub access: Access,
    pub trx: &'a mut Transaction,
    /// Nearest schema node and the length of its key
    pub schema_node: Option<(NodeRef, usize)>,
    /// The negotiated schema for the access's variant and version
    pub schema: Option<Arc<dyn Schema>>,
    /// Nearest data or executable node and the length of its key
    pub data_node: Option<(NodeRef, usize)>,
    /// Request body on writes
    pub raw: Option<Bytes>,
    /// Parsed request body on writes, response on reads
    pub data: Option<Value>,
    /// Response metadata
    pub meta: BTreeMap<String, Value>,
    /// Tags of the transformers applied so far, in order
    pub executed: Vec<String>,
}

impl fmt::Debug for TransformState<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformState")
            .field("access", &self.access)
            .field("trx", &self.trx.id())
            .field("schema", &self.schema)
            .field("data_node", &self.data_node.as_ref().map(|(_, split)| split))
            .field("meta", &self.meta)
            .field("executed", &self.executed)
            .finish()
    }
}

impl<'a> TransformState<'a> {
    pub fn new(services: &'a Services, access: Access, trx: &'a mut Transaction) -> Self {
        Self {
            services,
            access,
            trx,
            schema_node: None,
            schema: None,
            data_node: None,
            raw: None,
            data: None,
            meta: BTreeMap::new(),
            executed: Vec::new(),
        }
    }

    /// Segments of the access key below the first `split` ones
    pub fn remainder(&self, split: usize) -> Vec<String> {
        let key = self.access.key().ensure_rooted();
        key.segments().get(split..).unwrap_or_default().to_vec()
    }

    pub fn schema_remainder(&self) -> Vec<String> {
        self.remainder(self.schema_node.as_ref().map_or(0, |(_, split)| *split))
    }

    pub fn data_remainder(&self) -> Vec<String> {
        self.remainder(self.data_node.as_ref().map_or(0, |(_, split)| *split))
    }

    /// Storage id of the resolved data node, if it is one
    pub fn data_node_id(&self) -> Option<Uuid> {
        let (node, _) = self.data_node.as_ref()?;
        let id = node.read().as_data().map(|data| data.id());
        id
    }
}
