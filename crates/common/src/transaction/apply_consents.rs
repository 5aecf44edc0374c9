use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{Action, StorageResource};
use crate::consent::{Consents, MultiOwnerConsents};
use crate::directory::{Capability, DataNode, Node, NodeKind, NodeRef};
use crate::engine::Services;
use crate::error::Error;
use crate::key::DDHKey;
use crate::payload;
use crate::principal::Principal;
use crate::vault::KeyVault;

type Retired = Arc<Mutex<Vec<(Uuid, u64)>>>;

/// Who could read before a consent change, and who can read after
struct Change {
    node: NodeRef,
    old: BTreeSet<Principal>,
    new: BTreeSet<Principal>,
}

impl Change {
    fn removed(&self) -> BTreeSet<Principal> {
        self.old.difference(&self.new).cloned().collect()
    }

    fn added(&self) -> BTreeSet<Principal> {
        self.new.difference(&self.old).cloned().collect()
    }
}

/// Replaces one owner's consents at a key on commit and brings storage
/// keys in line with the new set of consentees.
///
/// The data node at the key is re-encrypted under a fresh key. Keys served
/// by an application get a consents-only node. A data node above the key
/// is split: the sub-tree at the key moves to a new node
/// carrying the consents. Data nodes below the key governed by these
/// consents are rotated too; their bytes are only re-encrypted when
/// principals were added, otherwise old epochs stay readable by the
/// remaining principals until the next store.
///
/// Payloads are read and re-sealed through the transaction's
/// [`StorageResource`], so writes staged earlier in the same transaction
/// are rotated too and land with the resource commit. Epochs the re-sealed
/// bytes no longer need are retired by the follow-up from
/// [`ApplyConsentsAction::retirement`].
#[derive(Debug)]
pub struct ApplyConsentsAction {
    services: Services,
    storage: Arc<StorageResource>,
    key: DDHKey,
    owner: Principal,
    consents: Consents,
    retired: Retired,
}

impl ApplyConsentsAction {
    pub fn new(
        services: Services,
        storage: Arc<StorageResource>,
        key: DDHKey,
        owner: Principal,
        consents: Consents,
    ) -> Self {
        Self {
            services,
            storage,
            key: key.without_facets().ensure_rooted(),
            owner,
            consents,
            retired: Retired::default(),
        }
    }

    /// Follow-up retiring the epochs this action superseded, once the
    /// re-sealed payloads are in storage
    pub fn retirement(&self) -> RetireEpochsAction {
        RetireEpochsAction {
            vault: self.services.vault.clone(),
            retired: self.retired.clone(),
        }
    }

    fn retire_before(&self, id: Uuid, epoch: u64) {
        self.retired.lock().push((id, epoch));
    }

    /// The consents governing `key`, from the nearest node carrying any
    fn governing(&self, key: &DDHKey) -> Option<MultiOwnerConsents> {
        let (node, _) = self
            .services
            .registry
            .get_node(key, Capability::Consents)?;
        let node = node.read();
        node.consents().cloned()
    }

    fn consentees(&self, key: &DDHKey) -> BTreeSet<Principal> {
        self.governing(key)
            .map(|c| c.consentees())
            .unwrap_or_default()
    }

    /// `base` with the writer's record replaced; other owners keep what
    /// governed them before
    fn merged(&self, owners: &[Principal], base: Option<MultiOwnerConsents>) -> MultiOwnerConsents {
        let mut merged = base.unwrap_or_else(|| MultiOwnerConsents::new(owners, Consents::default()));
        merged.set(self.owner.clone(), self.consents.clone());
        merged
    }

    async fn load(&self, id: Uuid) -> Result<Option<Value>, Error> {
        payload::load(
            self.services.storage.as_ref(),
            Some(self.storage.as_ref()),
            &self.services.vault,
            id,
            &self.owner,
        )
        .await
    }

    fn store(&self, id: Uuid, value: &Value) -> Result<(), Error> {
        let sealed = payload::seal(&self.services.vault, id, &self.owner, value)?;
        self.storage.store(id, sealed);
        Ok(())
    }

    /// Rotate the storage key of `id` to `new` and its owners, dropping
    /// `removed`; re-encrypt the stored bytes if `restore`
    async fn rekey(
        &self,
        id: Uuid,
        owners: &[Principal],
        new: &BTreeSet<Principal>,
        removed: &BTreeSet<Principal>,
        restore: bool,
    ) -> Result<(), Error> {
        let vault = &self.services.vault;
        let stored = if restore {
            match self.load(id).await {
                Ok(stored) => stored,
                Err(Error::AccessDenied) => {
                    tracing::warn!(node = %id, owner = %self.owner, "no storage key held, not rotating");
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };

        let effective: BTreeSet<Principal> = new.iter().chain(owners).cloned().collect();
        let removed: BTreeSet<Principal> = removed
            .iter()
            .filter(|p| !owners.contains(p))
            .cloned()
            .collect();
        let epoch = vault.set_new_storage_key(id, &self.owner, &effective, &removed)?;

        if let Some(value) = stored {
            self.store(id, &value)?;
            self.retire_before(id, epoch);
        }
        Ok(())
    }

    async fn update(&self, node: NodeRef) -> Result<Change, Error> {
        let (id, owners, own) = {
            let node = node.read();
            (
                node.as_data().map(DataNode::id),
                node.owners().to_vec(),
                node.consents().cloned(),
            )
        };
        let old = self.consentees(&self.key);
        let base = own.or_else(|| self.governing(&self.key));
        let consents = self.merged(&owners, base);
        let new = consents.consentees();

        node.write().set_consents(consents);
        self.services.registry.register(&self.key, node.clone());

        let change = Change { node, old, new };
        if let Some(id) = id {
            self.rekey(id, &owners, &change.new, &change.removed(), true)
                .await?;
        }
        Ok(change)
    }

    /// Consents inside an application's sub-tree live on a node of their
    /// own at the key; the application's registration is left alone
    fn attach(&self, app: NodeRef) -> Change {
        let owners = app.read().owners().to_vec();
        let old = self.consentees(&self.key);
        let existing = self
            .services
            .registry
            .get_node(&self.key, Capability::Consents)
            .filter(|(node, split)| {
                *split == self.key.len() && matches!(node.read().kind(), NodeKind::Consents)
            });
        let base = existing
            .as_ref()
            .and_then(|(node, _)| node.read().consents().cloned())
            .or_else(|| self.governing(&self.key));
        let consents = self.merged(&owners, base);
        let new = consents.consentees();

        let node = match existing {
            Some((node, _)) => {
                node.write().set_consents(consents);
                node
            }
            None => {
                let node = Node::new(self.key.clone(), owners, NodeKind::Consents)
                    .with_consents(Some(consents))
                    .into_ref();
                self.services.registry.register(&self.key, node.clone());
                node
            }
        };
        Change { node, old, new }
    }

    async fn split(&self, above: NodeRef, split: usize) -> Result<Change, Error> {
        let (above_id, above_key, owners) = {
            let node = above.read();
            let id = node
                .as_data()
                .map(DataNode::id)
                .ok_or_else(|| Error::NotFound(node.key().to_string()))?;
            (id, node.key().clone(), node.owners().to_vec())
        };
        let vault = &self.services.vault;
        let remainder = self.key.segments()[split..].to_vec();
        let old = self.consentees(&self.key);
        let base = self.governing(&self.key);

        let mut stored = self
            .load(above_id)
            .await?
            .unwrap_or_else(|| json!({}));
        let subtree = match payload::take(&mut stored, &remainder) {
            Ok(subtree) => subtree,
            Err(Error::NotFound(_)) => json!({}),
            Err(e) => return Err(e),
        };

        // the above node keeps its principals under a fresh key, without the sub-tree
        let above_effective: BTreeSet<Principal> = self
            .consentees(&above_key)
            .into_iter()
            .chain(owners.iter().cloned())
            .collect();
        let epoch = vault.set_new_storage_key(above_id, &self.owner, &above_effective, &BTreeSet::new())?;
        self.store(above_id, &stored)?;
        self.retire_before(above_id, epoch);

        let consents = self.merged(&owners, base);
        let new = consents.consentees();
        let below_id = Uuid::new_v4();
        let effective: BTreeSet<Principal> = new.iter().chain(&owners).cloned().collect();
        vault.set_new_storage_key(below_id, &self.owner, &effective, &BTreeSet::new())?;
        self.store(below_id, &subtree)?;

        let below = Node::new(self.key.clone(), owners, NodeKind::Data(DataNode::new(below_id)))
            .with_consents(Some(consents))
            .into_ref();
        self.services.registry.register(&self.key, below.clone());
        tracing::info!(above = %above_key, below = %self.key, node = %below_id, "split data node");

        Ok(Change {
            node: below,
            old,
            new,
        })
    }

    async fn create(&self) -> Result<Change, Error> {
        let owners = self.key.owners();
        if owners.is_empty() {
            return Err(Error::NotFound(format!("owner of {}", self.key)));
        }
        let old = self.consentees(&self.key);
        let consents = self.merged(&owners, self.governing(&self.key));
        let new = consents.consentees();

        let id = Uuid::new_v4();
        let effective: BTreeSet<Principal> = new.iter().chain(&owners).cloned().collect();
        self.services
            .vault
            .set_new_storage_key(id, &self.owner, &effective, &BTreeSet::new())?;
        self.store(id, &json!({}))?;

        let node = Node::new(self.key.clone(), owners, NodeKind::Data(DataNode::new(id)))
            .with_consents(Some(consents))
            .into_ref();
        self.services.registry.register(&self.key, node.clone());
        Ok(Change { node, old, new })
    }

    /// Rotate data nodes below the key whose nearest consents are the new ones
    async fn propagate(&self, change: &Change) -> Result<(), Error> {
        let registry = &self.services.registry;
        let removed = change.removed();
        let restore = !change.added().is_empty();

        for (key, node) in registry.descendants(&self.key, Capability::Data) {
            let (id, owners, own) = {
                let node = node.read();
                (
                    node.as_data().map(DataNode::id),
                    node.owners().to_vec(),
                    node.consents().is_some(),
                )
            };
            let Some(id) = id else { continue };
            if own {
                continue;
            }
            let governed = matches!(
                registry.get_node(&key, Capability::Consents),
                Some((_, split)) if split == self.key.len()
            );
            if governed {
                self.rekey(id, &owners, &change.new, &removed, restore).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Action for ApplyConsentsAction {
    async fn commit(&self) -> Result<(), Error> {
        let registry = &self.services.registry;
        let resolved = registry.get_data_node(&self.key);
        let is_exec = resolved
            .as_ref()
            .map(|(node, _)| node.read().as_executable().is_some())
            .unwrap_or(false);

        let change = match resolved {
            Some((node, _)) if is_exec => self.attach(node),
            Some((node, split)) if split == self.key.len() => self.update(node).await?,
            Some((node, split)) => self.split(node, split).await?,
            None => self.create().await?,
        };
        self.propagate(&change).await?;

        let node_key = change.node.read().key().clone();
        tracing::info!(
            key = %self.key,
            node = %node_key,
            owner = %self.owner,
            added = ?change.added(),
            removed = ?change.removed(),
            "applied consents"
        );
        Ok(())
    }
}

/// Drops access keys of epochs no stored payload is sealed under any more
#[derive(Debug)]
pub struct RetireEpochsAction {
    vault: Arc<KeyVault>,
    retired: Retired,
}

#[async_trait]
impl Action for RetireEpochsAction {
    async fn commit(&self) -> Result<(), Error> {
        let retired = std::mem::take(&mut *self.retired.lock());
        for (id, epoch) in retired {
            self.vault.retire_epochs_before(id, epoch);
            tracing::debug!(node = %id, epoch, "retired older epochs");
        }
        Ok(())
    }
}
