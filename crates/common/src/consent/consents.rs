use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::access::Access;
use super::mode::{AccessMode, AccessModes};
use crate::error::Error;
use crate::principal::Principal;

fn default_modes() -> AccessModes {
    [AccessMode::Read].into_iter().collect()
}

/// One grant: who, through which apps, in which modes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Consent {
    pub granted_to: BTreeSet<Principal>,
    /// Requesting applications allowed to use this consent; empty means any
    #[serde(default)]
    pub with_apps: BTreeSet<String>,
    #[serde(default = "default_modes")]
    pub with_modes: AccessModes,
}

impl Consent {
    /// Grant read access to a single principal
    pub fn new(principal: Principal) -> Self {
        Self {
            granted_to: [principal].into_iter().collect(),
            with_apps: BTreeSet::new(),
            with_modes: default_modes(),
        }
    }

    pub fn with_modes(mut self, modes: impl IntoIterator<Item = AccessMode>) -> Self {
        self.with_modes = modes.into_iter().collect();
        self
    }

    pub fn with_apps<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with_apps = apps.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.granted_to.iter().any(Principal::is_all)
    }

    pub fn applies_to(&self, principal: &Principal) -> bool {
        self.is_wildcard() || self.granted_to.contains(principal)
    }

    pub fn check(&self, access: &Access) -> Result<(), String> {
        if !self.applies_to(access.principal()) {
            return Err(format!("consent not granted to {}", access.principal()));
        }
        if !self.with_apps.is_empty() {
            match access.app() {
                None => return Err("consent restricted to applications".to_string()),
                Some(app) if !self.with_apps.contains(app) => {
                    return Err(format!("consent not granted to application {}", app))
                }
                _ => {}
            }
        }
        AccessMode::check(access.modes(), &self.with_modes)
    }
}

/// Consent records added and removed between two versions of a [`Consents`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsentsDiff {
    pub added: Vec<Consent>,
    pub removed: Vec<Consent>,
    /// Principals that had some access before and have none after
    pub revoked: BTreeSet<Principal>,
}

impl ConsentsDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The consents an owner has given for one resource, indexed by principal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ConsentsDocument", into = "ConsentsDocument")]
pub struct Consents {
    consents: Vec<Consent>,
    by_principal: HashMap<Principal, Vec<usize>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConsentsDocument {
    #[serde(default)]
    consents: Vec<Consent>,
}

impl From<ConsentsDocument> for Consents {
    fn from(doc: ConsentsDocument) -> Self {
        Consents::new(doc.consents)
    }
}

impl From<Consents> for ConsentsDocument {
    fn from(consents: Consents) -> Self {
        ConsentsDocument {
            consents: consents.consents,
        }
    }
}

impl PartialEq for Consents {
    fn eq(&self, other: &Self) -> bool {
        self.consents == other.consents
    }
}

impl Eq for Consents {}

impl Consents {
    pub fn new(consents: Vec<Consent>) -> Self {
        let mut this = Self {
            consents: Vec::new(),
            by_principal: HashMap::new(),
        };
        for consent in consents {
            this.grant(consent);
        }
        this
    }

    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn consents(&self) -> &[Consent] {
        &self.consents
    }

    pub fn is_empty(&self) -> bool {
        self.consents.is_empty()
    }

    /// Add a consent record; identical records are kept once
    pub fn grant(&mut self, consent: Consent) {
        if self.consents.contains(&consent) || consent.granted_to.is_empty() {
            return;
        }
        let index = self.consents.len();
        for principal in &consent.granted_to {
            self.by_principal
                .entry(principal.clone())
                .or_default()
                .push(index);
        }
        self.consents.push(consent);
    }

    /// Remove `principal` from every record, dropping records left empty.
    /// Returns whether anything changed.
    pub fn revoke(&mut self, principal: &Principal) -> bool {
        if !self.by_principal.contains_key(principal) {
            return false;
        }
        let remaining = self
            .consents
            .drain(..)
            .filter_map(|mut consent| {
                consent.granted_to.remove(principal);
                (!consent.granted_to.is_empty()).then_some(consent)
            })
            .collect();
        *self = Self::new(remaining);
        true
    }

    /// Records that apply to `principal`, direct grants first, then wildcard grants
    pub fn applicable(&self, principal: &Principal) -> impl Iterator<Item = &Consent> {
        let direct = self.by_principal.get(principal).into_iter().flatten();
        let wildcard = self
            .by_principal
            .get(&Principal::all())
            .into_iter()
            .flatten();
        direct
            .chain(wildcard)
            .map(move |index| &self.consents[*index])
    }

    /// Principals holding some access; contains [`Principal::all`] for wildcard grants
    pub fn consentees(&self) -> BTreeSet<Principal> {
        self.by_principal.keys().cloned().collect()
    }

    /// Check `access` against the applicable records, stopping at the first grant.
    ///
    /// Returns the verdict, the granting consent and an explanation.
    pub fn check(&self, access: &Access) -> (bool, Option<Consent>, String) {
        let mut reasons = Vec::new();
        for consent in self.applicable(access.principal()) {
            match consent.check(access) {
                Ok(()) => return (true, Some(consent.clone()), "consent".to_string()),
                Err(reason) => reasons.push(reason),
            }
        }
        if reasons.is_empty() {
            (false, None, "no consent".to_string())
        } else {
            (false, None, reasons.join("; "))
        }
    }

    pub fn changes(old: &Consents, new: &Consents) -> ConsentsDiff {
        let added = new
            .consents
            .iter()
            .filter(|c| !old.consents.contains(c))
            .cloned()
            .collect();
        let removed = old
            .consents
            .iter()
            .filter(|c| !new.consents.contains(c))
            .cloned()
            .collect();
        let new_consentees = new.consentees();
        let revoked = old
            .consentees()
            .into_iter()
            .filter(|p| !new_consentees.contains(p))
            .collect();
        ConsentsDiff {
            added,
            removed,
            revoked,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::consent::Operation;
    use crate::key::DDHKey;

    fn p(id: &str) -> Principal {
        Principal::parse(id).unwrap()
    }

    fn read_access(principal: &str) -> Access {
        Access::new(
            Operation::Get,
            DDHKey::parse("/alice/docs").unwrap(),
            p(principal),
        )
    }

    #[test]
    fn test_consent_defaults_to_read() {
        let consent: Consent = serde_json::from_str(r#"{"granted_to":["bob"]}"#).unwrap();
        assert_eq!(consent.with_modes, default_modes());
        assert!(consent.with_apps.is_empty());
        assert!(consent.check(&read_access("bob")).is_ok());
        assert!(consent.check(&read_access("carol")).is_err());
    }

    #[test]
    fn test_consent_app_restriction() {
        let consent = Consent::new(p("bob")).with_apps(["planner"]);
        assert!(consent.check(&read_access("bob")).is_err());
        assert!(consent
            .check(&read_access("bob").with_app("planner"))
            .is_ok());
        assert!(consent
            .check(&read_access("bob").with_app("tracker"))
            .is_err());
    }

    #[test]
    fn test_wildcard_applies_to_everyone() {
        let consents = Consents::new(vec![Consent::new(Principal::all())]);
        let (granted, consent, _) = consents.check(&read_access("anyone"));
        assert!(granted);
        assert!(consent.unwrap().is_wildcard());
    }

    #[test]
    fn test_check_short_circuits_on_first_grant() {
        let consents = Consents::new(vec![
            Consent::new(p("bob")).with_modes([AccessMode::Write]),
            Consent::new(p("bob")),
        ]);
        let (granted, consent, explanation) =
            consents.check(&read_access("bob").with_modes([AccessMode::Write]));
        assert!(granted);
        assert_eq!(consent.unwrap().with_modes, [AccessMode::Write].into());
        assert_eq!(explanation, "consent");

        let (granted, consent, explanation) = consents.check(&read_access("carol"));
        assert!(!granted);
        assert!(consent.is_none());
        assert_eq!(explanation, "no consent");
    }

    #[test]
    fn test_grant_and_revoke() {
        let mut consents = Consents::default();
        consents.grant(Consent::new(p("bob")));
        consents.grant(Consent::new(p("bob")));
        assert_eq!(consents.consents().len(), 1);

        let mut shared = Consent::new(p("bob"));
        shared.granted_to.insert(p("carol"));
        consents.grant(shared);
        assert_eq!(consents.consentees(), [p("bob"), p("carol")].into());

        assert!(consents.revoke(&p("bob")));
        assert!(!consents.revoke(&p("bob")));
        assert_eq!(consents.consentees(), [p("carol")].into());
        assert_eq!(consents.consents().len(), 1);
    }

    #[test]
    fn test_changes() {
        let old = Consents::new(vec![Consent::new(p("bob")), Consent::new(p("carol"))]);
        let new = Consents::new(vec![
            Consent::new(p("carol")),
            Consent::new(p("dave")).with_modes([AccessMode::Read, AccessMode::Write]),
        ]);

        let diff = Consents::changes(&old, &new);
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed, vec![Consent::new(p("bob"))]);
        assert_eq!(diff.revoked, [p("bob")].into());
        assert!(Consents::changes(&new, &new).is_empty());
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let json = r#"{"consents":[{"granted_to":["bob"],"with_modes":["read","anonymous"]}]}"#;
        let consents = Consents::from_json(json.as_bytes()).unwrap();
        assert_eq!(consents.consentees(), [p("bob")].into());

        let back: Consents =
            serde_json::from_value(serde_json::to_value(&consents).unwrap()).unwrap();
        assert_eq!(back, consents);
        assert_eq!(back.applicable(&p("bob")).count(), 1);
    }
}
