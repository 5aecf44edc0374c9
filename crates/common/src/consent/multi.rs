use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::access::Access;
use super::consents::{Consent, Consents};
use crate::principal::Principal;

/// Consents of a resource with one or more owners, one record per owner.
///
/// Access is granted only when every owner's record grants it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiOwnerConsents {
    by_owner: BTreeMap<Principal, Consents>,
}

impl MultiOwnerConsents {
    /// Give every owner the same consents
    pub fn new(owners: &[Principal], consents: Consents) -> Self {
        Self {
            by_owner: owners
                .iter()
                .map(|owner| (owner.clone(), consents.clone()))
                .collect(),
        }
    }

    pub fn for_owner(&self, owner: &Principal) -> Option<&Consents> {
        self.by_owner.get(owner)
    }

    pub fn set(&mut self, owner: Principal, consents: Consents) {
        self.by_owner.insert(owner, consents);
    }

    pub fn owners(&self) -> impl Iterator<Item = &Principal> {
        self.by_owner.keys()
    }

    /// Principals every owner has consented to.
    ///
    /// An owner with a wildcard grant does not restrict the result; if all
    /// owners grant the wildcard the result is `{*}`.
    pub fn consentees(&self) -> BTreeSet<Principal> {
        let mut effective: Option<BTreeSet<Principal>> = None;
        for consents in self.by_owner.values() {
            let consentees = consents.consentees();
            if consentees.contains(&Principal::all()) {
                continue;
            }
            effective = Some(match effective {
                None => consentees,
                Some(acc) => acc.intersection(&consentees).cloned().collect(),
            });
        }
        match effective {
            Some(set) => set,
            None if self.by_owner.is_empty() => BTreeSet::new(),
            None => [Principal::all()].into_iter().collect(),
        }
    }

    /// Every owner must grant. Returns the verdict, the first owner's granting
    /// consent and an explanation.
    pub fn check(&self, access: &Access) -> (bool, Option<Consent>, String) {
        if self.by_owner.is_empty() {
            return (false, None, "no consent".to_string());
        }
        let mut granting = None;
        for (owner, consents) in &self.by_owner {
            let (granted, consent, explanation) = consents.check(access);
            if !granted {
                return (false, None, format!("{} (owner {})", explanation, owner));
            }
            if granting.is_none() {
                granting = consent;
            }
        }
        (true, granting, "consent".to_string())
    }
}
