use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::SecretShare;
use crate::principal::Principal;

/// A storage key wrapped for one principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKey {
    pub principal: Principal,
    pub node: Uuid,
    pub epoch: u64,
    pub share: SecretShare,
}

/// Every epoch of wrapped storage keys for one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeKeys {
    current: u64,
    epochs: BTreeMap<u64, BTreeMap<Principal, SecretShare>>,
}

impl NodeKeys {
    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn epochs(&self) -> impl Iterator<Item = u64> + '_ {
        self.epochs.keys().copied()
    }

    pub fn share(&self, epoch: u64, principal: &Principal) -> Option<SecretShare> {
        self.epochs.get(&epoch)?.get(principal).copied()
    }

    /// Install `shares` as the next epoch and purge `removed` from older ones
    pub(super) fn rotate(
        &mut self,
        shares: BTreeMap<Principal, SecretShare>,
        removed: &BTreeSet<Principal>,
    ) -> u64 {
        for epoch in self.epochs.values_mut() {
            epoch.retain(|p, _| !removed.contains(p));
        }
        self.epochs.retain(|_, shares| !shares.is_empty());

        self.current += 1;
        self.epochs.insert(self.current, shares);
        self.current
    }

    pub(super) fn retire_before(&mut self, epoch: u64) {
        self.epochs.retain(|e, _| *e >= epoch);
    }

    pub(super) fn access_keys(&self, node: Uuid) -> Vec<AccessKey> {
        self.epochs
            .get(&self.current)
            .map(|shares| {
                shares
                    .iter()
                    .map(|(principal, share)| AccessKey {
                        principal: principal.clone(),
                        node,
                        epoch: self.current,
                        share: *share,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
