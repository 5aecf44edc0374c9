//! Groups the side effects of one logical request into a unit with explicit
//! commit or abort.
//!
//! Actions are in-process effects (directory registration, consent updates)
//! deferred to commit. Resources are backends taking part in the
//! transaction; they are told when they join (`added`) and at the end.
//! Follow-ups are actions that only run once every resource has committed,
//! such as notifying subscribers.

mod action;
mod actions;
mod apply_consents;
mod resource;
mod table;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

pub use action::Action;
pub use actions::{RegisterNodeAction, RemoveNodeAction};
pub use apply_consents::{ApplyConsentsAction, RetireEpochsAction};
pub use resource::{AppResource, Resource, StorageResource, STORAGE_RESOURCE_ID};
pub use table::{TransactionTable, TrxHandle};

use crate::error::Error;
use crate::principal::Principal;

pub type TrxId = Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("transaction {0} expired")]
    Expired(TrxId),
    #[error("transaction {0} not found")]
    NotFound(TrxId),
    #[error("transaction {0} belongs to another principal")]
    OwnerMismatch(TrxId),
    #[error("transaction {0} has ended")]
    Ended(TrxId),
    #[error("{0} refused to join the transaction")]
    Vetoed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    /// A commit failed part way; only abort is left
    Failed,
    Committed,
    Aborted,
}

pub struct Transaction {
    id: TrxId,
    owner: Principal,
    expires: DateTime<Utc>,
    state: TransactionState,
    actions: Vec<Box<dyn Action>>,
    resources: BTreeMap<String, Arc<dyn Resource>>,
    followups: Vec<Box<dyn Action>>,
    scratch: HashMap<String, Value>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("expires", &self.expires)
            .field("state", &self.state)
            .field("actions", &self.actions.len())
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("followups", &self.followups.len())
            .finish()
    }
}

impl Transaction {
    /// Create a transaction, already begun
    pub fn new(id: TrxId, owner: Principal, timeout: Duration) -> Self {
        tracing::debug!(trx = %id, owner = %owner, "beginning transaction");
        Self {
            id,
            owner,
            expires: Utc::now() + timeout,
            state: TransactionState::Active,
            actions: Vec::new(),
            resources: BTreeMap::new(),
            followups: Vec::new(),
            scratch: HashMap::new(),
        }
    }

    pub fn id(&self) -> TrxId {
        self.id
    }

    pub fn owner(&self) -> &Principal {
        &self.owner
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Fail unless the transaction is active and not expired
    pub fn check_live(&self) -> Result<(), TransactionError> {
        if self.state != TransactionState::Active {
            return Err(TransactionError::Ended(self.id));
        }
        if self.is_expired() {
            return Err(TransactionError::Expired(self.id));
        }
        Ok(())
    }

    /// Queue an action for commit. Returns `false` if the action vetoed joining.
    pub fn add(&mut self, action: Box<dyn Action>) -> Result<bool, TransactionError> {
        self.check_live()?;
        if !action.add_ok(self) {
            return Ok(false);
        }
        tracing::debug!(trx = %self.id, ?action, "adding action");
        self.actions.push(action);
        Ok(true)
    }

    /// Queue an action to run after every resource has committed.
    ///
    /// Follow-ups see durable state. They are never rolled back, and a
    /// failing follow-up is logged without failing the commit.
    pub fn add_followup(&mut self, action: Box<dyn Action>) -> Result<bool, TransactionError> {
        self.check_live()?;
        if !action.add_ok(self) {
            return Ok(false);
        }
        tracing::debug!(trx = %self.id, ?action, "adding follow-up");
        self.followups.push(action);
        Ok(true)
    }

    /// Enlist a resource. A resource with the same id is only enlisted once.
    /// Returns `false` if the resource vetoed joining.
    pub async fn add_resource(&mut self, resource: Arc<dyn Resource>) -> Result<bool, Error> {
        self.check_live()?;
        let id = resource.id();
        if self.resources.contains_key(&id) {
            return Ok(true);
        }
        if !resource.add_ok(self) {
            return Ok(false);
        }
        resource.added(self.id).await?;
        tracing::debug!(trx = %self.id, resource = %id, "resource joined");
        self.resources.insert(id, resource);
        Ok(true)
    }

    pub fn resource(&self, id: &str) -> Option<Arc<dyn Resource>> {
        self.resources.get(id).cloned()
    }

    /// Look up an enlisted resource by id and concrete type
    pub fn resource_as<T: Resource>(&self, id: &str) -> Option<Arc<T>> {
        let resource: Arc<dyn Any + Send + Sync> = self.resource(id)?.as_any();
        resource.downcast::<T>().ok()
    }

    pub fn scratch(&self, key: &str) -> Option<&Value> {
        self.scratch.get(key)
    }

    pub fn set_scratch(&mut self, key: impl Into<String>, value: Value) {
        self.scratch.insert(key.into(), value);
    }

    /// Commit every action in order, then every resource, then run the
    /// follow-ups.
    ///
    /// Work is consumed as it commits. If one commit fails the transaction
    /// is left [`TransactionState::Failed`] holding the failed item and
    /// everything after it, so [`Transaction::abort`] can roll those back.
    /// Effects already committed stay.
    pub async fn commit(&mut self) -> Result<(), Error> {
        self.check_live()?;

        while !self.actions.is_empty() {
            let action = self.actions.remove(0);
            if let Err(e) = action.commit().await {
                tracing::error!(trx = %self.id, ?action, "action commit failed: {}", e);
                self.actions.insert(0, action);
                self.state = TransactionState::Failed;
                return Err(e);
            }
        }

        let ids: Vec<String> = self.resources.keys().cloned().collect();
        for id in ids {
            let Some(resource) = self.resources.get(&id).cloned() else {
                continue;
            };
            if let Err(e) = resource.commit(self.id).await {
                tracing::error!(trx = %self.id, resource = %id, "resource commit failed: {}", e);
                self.state = TransactionState::Failed;
                return Err(e);
            }
            self.resources.remove(&id);
        }

        self.state = TransactionState::Committed;
        for followup in std::mem::take(&mut self.followups) {
            if let Err(e) = followup.commit().await {
                tracing::warn!(trx = %self.id, action = ?followup, "follow-up failed: {}", e);
            }
        }

        tracing::info!(trx = %self.id, owner = %self.owner, "committed transaction");
        Ok(())
    }

    /// Roll back every pending action (newest first), then abort every
    /// pending resource. Follow-ups are dropped.
    ///
    /// Allowed after expiry and after a failed commit. Aborting a committed
    /// or aborted transaction does nothing.
    pub async fn abort(&mut self) -> Result<(), Error> {
        if matches!(
            self.state,
            TransactionState::Committed | TransactionState::Aborted
        ) {
            return Ok(());
        }
        self.state = TransactionState::Aborted;
        let actions = std::mem::take(&mut self.actions);
        let resources = std::mem::take(&mut self.resources);
        self.followups.clear();

        let mut first_error = None;
        for action in actions.into_iter().rev() {
            if let Err(e) = action.rollback().await {
                tracing::error!(trx = %self.id, ?action, "action rollback failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        for (id, resource) in resources {
            if let Err(e) = resource.abort(self.id).await {
                tracing::error!(trx = %self.id, resource = %id, "resource abort failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        tracing::info!(trx = %self.id, owner = %self.owner, "aborted transaction");
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            tracing::error!(
                trx = %self.id,
                pending = self.actions.len(),
                "transaction dropped with pending actions"
            );
        }
    }
}
