//! The single access point: every read and write is authorized, run
//! through the transformer pipeline of the nearest schema, and committed
//! or aborted as one transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consent::{Access, Consent, Consents, Operation};
use crate::crypto::{PublicKey, SecretKey};
use crate::directory::{Capability, ExecutableNode, Node, NodeKind, NodeRef, NodeRegistry, SchemaNode};
use crate::error::Error;
use crate::executable::ExecutableApp;
use crate::key::{DDHKey, Fork};
use crate::principal::Principal;
use crate::pubsub::{MemoryPubSub, PubSub, DEFAULT_CAPACITY};
use crate::schema::{Schema, SchemaContainer};
use crate::storage::StorageProvider;
use crate::traits::{TransformState, TransformerRegistry, Traits, Transformers};
use crate::transaction::{Transaction, TransactionError, TransactionTable, TrxId};
use crate::vault::KeyVault;

fn default_transaction_timeout_secs() -> u64 {
    300
}

fn default_pubsub_capacity() -> usize {
    DEFAULT_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifetime of a transaction from its creation
    #[serde(default = "default_transaction_timeout_secs")]
    pub transaction_timeout_secs: u64,
    /// Events buffered per pub/sub topic
    #[serde(default = "default_pubsub_capacity")]
    pub pubsub_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_secs: default_transaction_timeout_secs(),
            pubsub_capacity: default_pubsub_capacity(),
        }
    }
}

/// Shared collaborators handed to transformers and actions
#[derive(Debug, Clone)]
pub struct Services {
    pub registry: Arc<NodeRegistry>,
    pub vault: Arc<KeyVault>,
    pub storage: Arc<dyn StorageProvider>,
    pub pubsub: Arc<dyn PubSub>,
    pub transformers: Arc<TransformerRegistry>,
    pub transactions: Arc<TransactionTable>,
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct Response {
    pub trx: TrxId,
    pub access: Access,
    pub data: Option<Value>,
    pub meta: BTreeMap<String, Value>,
    /// Transformers applied, in order
    pub executed: Vec<String>,
}

#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    services: Services,
    default_transformers: Arc<Transformers>,
}

impl Engine {
    /// An engine with the built-in transformers and in-memory pub/sub
    pub fn new(config: EngineConfig, storage: Arc<dyn StorageProvider>) -> Self {
        Self::with_transformers(config, storage, TransformerRegistry::with_builtins())
    }

    /// Register custom transformers before any schema is registered; each
    /// scope compiles its pipeline once.
    pub fn with_transformers(
        config: EngineConfig,
        storage: Arc<dyn StorageProvider>,
        transformers: TransformerRegistry,
    ) -> Self {
        let timeout = chrono::Duration::seconds(config.transaction_timeout_secs as i64);
        let services = Services {
            registry: Arc::new(NodeRegistry::new()),
            vault: Arc::new(KeyVault::new()),
            storage,
            pubsub: Arc::new(MemoryPubSub::new(config.pubsub_capacity)),
            transformers: Arc::new(transformers),
            transactions: Arc::new(TransactionTable::new(timeout)),
        };
        Self {
            config,
            services,
            default_transformers: Arc::new(Transformers::new(Traits::defaults())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.services.registry
    }

    pub fn vault(&self) -> &KeyVault {
        &self.services.vault
    }

    pub fn register_principal(&self, principal: Principal, secret: SecretKey) {
        self.services.vault.register_principal(principal, secret);
    }

    pub fn register_public_key(&self, principal: Principal, public: PublicKey) {
        self.services.vault.register_public_key(principal, public);
    }

    /// Effective traits at `key`: those of the nearest schema node above
    /// it, or the defaults
    fn inherited_traits(&self, key: &DDHKey) -> Traits {
        let Some(parent) = key.up() else {
            return Traits::defaults();
        };
        match self.services.registry.get_node(&parent, Capability::Schema) {
            Some((node, _)) => {
                let node = node.read();
                node.as_schema()
                    .map(|schema| schema.transformers().traits().clone())
                    .unwrap_or_else(Traits::defaults)
            }
            None => Traits::defaults(),
        }
    }

    /// Register `schema` at `key`. A schema node already at the key gains
    /// the schema as another variant or version and keeps its traits.
    pub fn register_schema(
        &self,
        key: &DDHKey,
        schema: Arc<dyn Schema>,
        traits: Traits,
        owners: Vec<Principal>,
    ) -> Result<NodeRef, Error> {
        let key = key.without_facets().ensure_rooted();
        if let Some((node, split)) = self.services.registry.get_node(&key, Capability::Schema) {
            if split == key.len() {
                {
                    let mut guard = node.write();
                    let existing = guard
                        .as_schema_mut()
                        .ok_or_else(|| Error::Config(format!("not a schema node: {}", key)))?;
                    existing.container_mut().add(schema, false);
                }
                tracing::info!(key = %key, "added schema version");
                return Ok(node);
            }
        }

        Ok(self.install_schemas(&key, SchemaContainer::new(schema), traits, owners))
    }

    /// Register a whole container at `key`, replacing any schema node there
    pub(crate) fn install_schemas(
        &self,
        key: &DDHKey,
        container: SchemaContainer,
        traits: Traits,
        owners: Vec<Principal>,
    ) -> NodeRef {
        let inherited = self.inherited_traits(key);
        let schema_node = SchemaNode::new(container, traits, &inherited);
        let node = Node::new(key.clone(), owners, NodeKind::Schema(schema_node)).into_ref();
        self.services.registry.register(key, node.clone());
        tracing::info!(key = %key, "registered schema");
        node
    }

    /// Serve `key` and everything below it by `app`
    pub fn register_app(
        &self,
        key: &DDHKey,
        app: Arc<dyn ExecutableApp>,
        owners: Vec<Principal>,
    ) -> NodeRef {
        let key = key.without_facets().ensure_rooted();
        let app_id = app.id().to_string();
        let node = Node::new(key.clone(), owners, NodeKind::Executable(ExecutableNode::new(app)))
            .into_ref();
        self.services.registry.register(&key, node.clone());
        tracing::info!(key = %key, app = %app_id, "registered application");
        node
    }

    /// The document of the schema negotiated for `key`, if one governs it
    pub fn schema(&self, key: &DDHKey) -> Result<Option<Value>, Error> {
        let Some((node, _)) = self.services.registry.get_node(key, Capability::Schema) else {
            return Ok(None);
        };
        let node = node.read();
        let Some(schema_node) = node.as_schema() else {
            return Ok(None);
        };
        let schema = schema_node
            .container()
            .get(key.variant(), key.version())?;
        Ok(Some(schema.document()))
    }

    /// Begin a transaction spanning several requests
    pub fn begin(&self, principal: &Principal) -> TrxId {
        let (id, _) = self.services.transactions.create(principal, None);
        id
    }

    pub async fn commit(&self, principal: &Principal, trx: TrxId) -> Result<(), Error> {
        self.finish(principal, trx, true).await
    }

    pub async fn abort(&self, principal: &Principal, trx: TrxId) -> Result<(), Error> {
        self.finish(principal, trx, false).await
    }

    async fn finish(&self, principal: &Principal, trx: TrxId, commit: bool) -> Result<(), Error> {
        let handle = self.services.transactions.get(trx)?;
        let mut guard = handle.lock().await;
        if guard.owner() != principal {
            return Err(TransactionError::OwnerMismatch(trx).into());
        }
        let result = if commit {
            Self::commit_or_abort(&mut guard).await
        } else {
            guard.abort().await
        };
        drop(guard);
        self.services.transactions.end(trx);
        result
    }

    async fn commit_or_abort(trx: &mut Transaction) -> Result<(), Error> {
        let result = trx.commit().await;
        if result.is_err() {
            if let Err(e) = trx.abort().await {
                tracing::error!(trx = %trx.id(), "abort after failed commit failed: {}", e);
            }
        }
        result
    }

    /// Run `access` through its pipeline.
    ///
    /// Without `trx` the request runs in its own transaction, committed on
    /// success. With `trx` it joins that transaction, which the caller
    /// commits; a failure aborts it.
    pub async fn execute(
        &self,
        access: Access,
        body: Option<Bytes>,
        trx: Option<TrxId>,
    ) -> Result<Response, Error> {
        let transactions = &self.services.transactions;
        let principal = access.principal().clone();
        let (id, handle) = match trx {
            Some(id) => {
                let handle = transactions
                    .get_or_create_transaction_with_id(id, &principal, None)
                    .await?;
                (id, handle)
            }
            None => transactions.create(&principal, None),
        };

        let mut guard = handle.lock().await;
        let result = self.run(access, body, &mut guard).await;
        let result = match result {
            Ok(response) if trx.is_none() => Self::commit_or_abort(&mut guard).await.map(|_| response),
            Ok(response) => return Ok(response),
            Err(e) => {
                if let Err(abort) = guard.abort().await {
                    tracing::error!(trx = %id, "abort failed: {}", abort);
                }
                Err(e)
            }
        };
        drop(guard);
        transactions.end(id);
        result
    }

    async fn run(
        &self,
        mut access: Access,
        body: Option<Bytes>,
        trx: &mut Transaction,
    ) -> Result<Response, Error> {
        trx.check_live()?;
        if access.key().fork() == Fork::Schema {
            return self.run_schema(access, trx.id());
        }
        let registry = &self.services.registry;
        access.ensure_permitted(registry)?;

        let key = access.key().ensure_rooted();
        let schema_node = registry.get_node(&key, Capability::Schema);
        let (transformers, schema) = match &schema_node {
            Some((node, _)) => {
                let node = node.read();
                match node.as_schema() {
                    Some(schema_node) => (
                        schema_node.transformers().clone(),
                        Some(schema_node.container().get(key.variant(), key.version())?),
                    ),
                    None => (self.default_transformers.clone(), None),
                }
            }
            None => (self.default_transformers.clone(), None),
        };

        let trx_id = trx.id();
        let mut state = TransformState::new(&self.services, access, trx);
        state.schema_node = schema_node;
        state.schema = schema;
        state.data_node = registry.get_data_node(&key);
        state.raw = body;

        transformers
            .apply(&self.services.transformers, &mut state)
            .await?;

        Ok(Response {
            trx: trx_id,
            access: state.access,
            data: state.data,
            meta: state.meta,
            executed: state.executed,
        })
    }

    /// Schemas are public and only change through registration
    fn run_schema(&self, access: Access, trx: TrxId) -> Result<Response, Error> {
        let key = access.key().ensure_rooted();
        if access.op() != Operation::Get {
            return Err(Error::Config(format!(
                "schemas at {} are registered, not written",
                key
            )));
        }
        let document = self
            .schema(&key)?
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(Response {
            trx,
            access,
            data: Some(document),
            meta: BTreeMap::new(),
            executed: Vec::new(),
        })
    }

    pub async fn get(&self, principal: &Principal, key: &DDHKey) -> Result<Value, Error> {
        let access = Access::new(Operation::Get, key.clone(), principal.clone());
        let response = self.execute(access, None, None).await?;
        Ok(response.data.unwrap_or(Value::Null))
    }

    pub async fn put(
        &self,
        principal: &Principal,
        key: &DDHKey,
        value: &Value,
    ) -> Result<Response, Error> {
        let access = Access::new(Operation::Put, key.clone(), principal.clone());
        let body = Bytes::from(serde_json::to_vec(value)?);
        self.execute(access, Some(body), None).await
    }

    pub async fn delete(&self, principal: &Principal, key: &DDHKey) -> Result<Response, Error> {
        let access = Access::new(Operation::Delete, key.clone(), principal.clone());
        self.execute(access, None, None).await
    }

    /// The owner's consents governing `key`
    pub async fn consents(&self, owner: &Principal, key: &DDHKey) -> Result<Consents, Error> {
        let value = self.get(owner, &key.with_fork(Fork::Consents)).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Replace the owner's consents at `key`
    pub async fn set_consents(
        &self,
        owner: &Principal,
        key: &DDHKey,
        consents: &Consents,
    ) -> Result<(), Error> {
        let value = serde_json::to_value(consents)?;
        self.put(owner, &key.with_fork(Fork::Consents), &value)
            .await?;
        Ok(())
    }

    /// Add `consent` to the owner's consents at `key`
    pub async fn grant(
        &self,
        owner: &Principal,
        key: &DDHKey,
        consent: Consent,
    ) -> Result<Consents, Error> {
        let mut consents = self.consents(owner, key).await?;
        consents.grant(consent);
        self.set_consents(owner, key, &consents).await?;
        Ok(consents)
    }

    /// Remove every consent granted to `principal` at `key`. Returns whether
    /// there was one.
    pub async fn revoke(
        &self,
        owner: &Principal,
        key: &DDHKey,
        principal: &Principal,
    ) -> Result<bool, Error> {
        let mut consents = self.consents(owner, key).await?;
        if !consents.revoke(principal) {
            return Ok(false);
        }
        self.set_consents(owner, key, &consents).await?;
        Ok(true)
    }

    pub async fn subscribe(
        &self,
        key: &DDHKey,
    ) -> Result<tokio::sync::broadcast::Receiver<crate::pubsub::UpdateEvent>, Error> {
        self.services
            .pubsub
            .subscribe(&crate::pubsub::topic_for(key))
            .await
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::schema::JsonSchema;
    use crate::storage::MemoryStorage;

    fn p(id: &str) -> Principal {
        Principal::parse(id).unwrap()
    }

    fn key(s: &str) -> DDHKey {
        DDHKey::parse(s).unwrap()
    }

    fn engine() -> Engine {
        let engine = Engine::new(EngineConfig::default(), Arc::new(MemoryStorage::new()));
        engine.register_principal(p("alice"), SecretKey::generate());
        engine
            .register_schema(&key("/"), Arc::new(JsonSchema::permissive()), Traits::default(), vec![])
            .unwrap();
        engine
    }

    #[test]
    fn test_config_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.transaction_timeout_secs, 300);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let engine = engine();
        let alice = p("alice");
        engine
            .put(&alice, &key("/alice/docs/1"), &json!({"title": "a"}))
            .await
            .unwrap();
        assert_eq!(
            engine.get(&alice, &key("/alice/docs/1/title")).await.unwrap(),
            json!("a")
        );
        assert_eq!(
            engine.get(&alice, &key("/alice/docs")).await.unwrap(),
            json!({"1": {"title": "a"}})
        );
        assert!(engine.services().transactions.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_transaction_commits_once() {
        let engine = engine();
        let alice = p("alice");
        let trx = engine.begin(&alice);

        let access = Access::new(Operation::Put, key("/alice/docs/1"), alice.clone());
        let body = Bytes::from_static(br#"{"title": "a"}"#);
        engine.execute(access, Some(body), Some(trx)).await.unwrap();
        assert!(engine
            .registry()
            .get_node(&key("/alice/docs"), Capability::Data)
            .is_none());

        engine.commit(&alice, trx).await.unwrap();
        assert!(engine
            .registry()
            .get_node(&key("/alice/docs"), Capability::Data)
            .is_some());
        assert!(engine.commit(&alice, trx).await.is_err());
    }

    #[tokio::test]
    async fn test_aborted_transaction_leaves_nothing() {
        let engine = engine();
        let alice = p("alice");
        let trx = engine.begin(&alice);
        let access = Access::new(Operation::Put, key("/alice/docs/1"), alice.clone());
        engine
            .execute(access, Some(Bytes::from_static(b"{}")), Some(trx))
            .await
            .unwrap();
        engine.abort(&alice, trx).await.unwrap();

        assert!(engine.registry().nodes(Capability::Data).is_empty());
        assert!(matches!(
            engine.get(&alice, &key("/alice/docs/1")).await,
            Err(Error::NotFound(_))
        ));
    }
}
