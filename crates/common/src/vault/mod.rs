//! Storage keys and who can unwrap them.
//!
//! Each stored object has one live [`Secret`] at a time. The secret is
//! wrapped for every principal with access as a [`SecretShare`]; together
//! the shares of one generation form an *epoch*. Ciphertexts are prefixed
//! with the epoch they were written under:
//!
//! ```text
//! [ epoch: u64 big-endian ][ nonce || ciphertext || tag ]
//! ```
//!
//! Rotation appends a new epoch and purges removed principals from every
//! older one, so bytes written before the rotation stay readable by the
//! remaining principals until the object is next stored.

mod node_keys;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use node_keys::{AccessKey, NodeKeys};

use crate::crypto::{PublicKey, Secret, SecretError, SecretKey, SecretShare, SecretShareError};
use crate::principal::Principal;

const EPOCH_SIZE: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The principal holds no wrapped copy of the key; never says whether the object exists
    #[error("access denied")]
    AccessDenied,
    #[error("unknown principal: {0}")]
    UnknownPrincipal(Principal),
    #[error("no secret key held for principal: {0}")]
    MissingSecretKey(Principal),
    #[error("no storage key for node: {0}")]
    UnknownNode(Uuid),
    #[error("malformed ciphertext")]
    Malformed,
    #[error("share error: {0}")]
    Share(#[from] SecretShareError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

#[derive(Debug, Clone)]
struct PrincipalKeys {
    public: PublicKey,
    secret: Option<SecretKey>,
}

/// Public keys and wrapped storage keys, persisted in the catalog.
/// Secret keys are never part of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub principals: BTreeMap<Principal, PublicKey>,
    pub nodes: BTreeMap<Uuid, NodeKeys>,
}

#[derive(Debug, Default)]
pub struct KeyVault {
    principals: RwLock<BTreeMap<Principal, PrincipalKeys>>,
    nodes: RwLock<HashMap<Uuid, NodeKeys>>,
}

impl KeyVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a principal whose data this vault may decrypt
    pub fn register_principal(&self, principal: Principal, secret: SecretKey) {
        tracing::debug!(principal = %principal, "registering principal key pair");
        self.principals.write().insert(
            principal,
            PrincipalKeys {
                public: secret.public(),
                secret: Some(secret),
            },
        );
    }

    /// Register a principal known only by its public key; keys can be wrapped
    /// for it but the vault cannot decrypt on its behalf.
    pub fn register_public_key(&self, principal: Principal, public: PublicKey) {
        let mut principals = self.principals.write();
        match principals.get_mut(&principal) {
            Some(keys) if keys.public == public => {}
            _ => {
                principals.insert(
                    principal,
                    PrincipalKeys {
                        public,
                        secret: None,
                    },
                );
            }
        }
    }

    pub fn public_key(&self, principal: &Principal) -> Option<PublicKey> {
        self.principals.read().get(principal).map(|k| k.public)
    }

    pub fn principals(&self) -> Vec<Principal> {
        self.principals.read().keys().cloned().collect()
    }

    fn secret_key(&self, principal: &Principal) -> Result<SecretKey, VaultError> {
        match self.principals.read().get(principal) {
            Some(PrincipalKeys {
                secret: Some(secret),
                ..
            }) => Ok(secret.clone()),
            Some(_) => Err(VaultError::MissingSecretKey(principal.clone())),
            None => Err(VaultError::UnknownPrincipal(principal.clone())),
        }
    }

    /// Generate a fresh storage key for `node` and wrap it for `principal`
    /// and every principal in `effective`, minus `removed`.
    ///
    /// The wildcard principal in `effective` expands to every registered
    /// principal. Copies held by `removed` principals are also purged from
    /// older epochs. Readers observe either the old or the new epoch set.
    pub fn set_new_storage_key(
        &self,
        node: Uuid,
        principal: &Principal,
        effective: &BTreeSet<Principal>,
        removed: &BTreeSet<Principal>,
    ) -> Result<u64, VaultError> {
        let secret = Secret::generate();

        let shares = {
            let principals = self.principals.read();
            if !principals.contains_key(principal) {
                return Err(VaultError::UnknownPrincipal(principal.clone()));
            }

            let mut recipients: BTreeSet<Principal> = BTreeSet::new();
            for p in effective {
                if p.is_all() {
                    recipients.extend(principals.keys().cloned());
                } else {
                    recipients.insert(p.clone());
                }
            }
            recipients.retain(|p| !removed.contains(p));
            recipients.insert(principal.clone());

            let mut shares = BTreeMap::new();
            for recipient in recipients {
                match principals.get(&recipient) {
                    Some(keys) => {
                        shares.insert(recipient, SecretShare::new(&secret, &keys.public)?);
                    }
                    None => {
                        tracing::warn!(
                            principal = %recipient,
                            node = %node,
                            "no public key registered, not wrapping storage key"
                        );
                    }
                }
            }
            shares
        };

        let mut nodes = self.nodes.write();
        let keys = nodes.entry(node).or_default();
        let epoch = keys.rotate(shares, removed);
        tracing::info!(node = %node, epoch, removed = ?removed, "rotated storage key");
        Ok(epoch)
    }

    fn share(
        &self,
        node: Uuid,
        principal: &Principal,
        epoch: Option<u64>,
    ) -> Result<(u64, SecretShare), VaultError> {
        let nodes = self.nodes.read();
        let keys = nodes.get(&node).ok_or(VaultError::UnknownNode(node))?;
        let epoch = epoch.unwrap_or(keys.current());
        let share = keys
            .share(epoch, principal)
            .ok_or(VaultError::AccessDenied)?;
        Ok((epoch, share))
    }

    /// Encrypt `data` for `node` under the current epoch
    pub fn encrypt_data(
        &self,
        node: Uuid,
        principal: &Principal,
        data: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        let (epoch, share) = self.share(node, principal, None)?;
        let secret = share.recover(&self.secret_key(principal)?)?;

        let ciphertext = secret.encrypt(node.as_bytes(), data)?;
        let mut out = Vec::with_capacity(EPOCH_SIZE + ciphertext.len());
        out.extend_from_slice(&epoch.to_be_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt bytes produced by [`KeyVault::encrypt_data`] as `principal`.
    ///
    /// A principal without a wrapped copy for the ciphertext's epoch gets
    /// [`VaultError::AccessDenied`], as does any caller for an unknown node.
    pub fn decrypt_data(
        &self,
        node: Uuid,
        principal: &Principal,
        data: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        if data.len() < EPOCH_SIZE {
            return Err(VaultError::Malformed);
        }
        let mut epoch = [0u8; EPOCH_SIZE];
        epoch.copy_from_slice(&data[..EPOCH_SIZE]);
        let epoch = u64::from_be_bytes(epoch);

        let (_, share) = self
            .share(node, principal, Some(epoch))
            .map_err(|e| match e {
                VaultError::UnknownNode(_) => VaultError::AccessDenied,
                other => other,
            })?;
        let secret = share.recover(&self.secret_key(principal)?)?;
        Ok(secret.decrypt(node.as_bytes(), &data[EPOCH_SIZE..])?)
    }

    pub fn current_epoch(&self, node: Uuid) -> Option<u64> {
        self.nodes.read().get(&node).map(NodeKeys::current)
    }

    /// Drop every epoch of `node` older than `epoch`
    pub fn retire_epochs_before(&self, node: Uuid, epoch: u64) {
        if let Some(keys) = self.nodes.write().get_mut(&node) {
            keys.retire_before(epoch);
        }
    }

    pub fn remove_node(&self, node: Uuid) -> bool {
        self.nodes.write().remove(&node).is_some()
    }

    pub fn access_keys(&self, node: Uuid) -> Vec<AccessKey> {
        self.nodes
            .read()
            .get(&node)
            .map(|keys| keys.access_keys(node))
            .unwrap_or_default()
    }

    pub fn export(&self) -> VaultSnapshot {
        VaultSnapshot {
            principals: self
                .principals
                .read()
                .iter()
                .map(|(p, k)| (p.clone(), k.public))
                .collect(),
            nodes: self
                .nodes
                .read()
                .iter()
                .map(|(id, keys)| (*id, keys.clone()))
                .collect(),
        }
    }

    /// Load a snapshot, keeping secret keys already registered
    pub fn import(&self, snapshot: VaultSnapshot) {
        for (principal, public) in snapshot.principals {
            self.register_public_key(principal, public);
        }
        self.nodes.write().extend(snapshot.nodes);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn p(id: &str) -> Principal {
        Principal::parse(id).unwrap()
    }

    fn vault_with(ids: &[&str]) -> KeyVault {
        let vault = KeyVault::new();
        for id in ids {
            vault.register_principal(p(id), SecretKey::generate());
        }
        vault
    }

    fn set(ids: &[&str]) -> BTreeSet<Principal> {
        ids.iter().map(|id| p(id)).collect()
    }

    #[test]
    fn test_encrypt_decrypt_for_effective_principals() {
        let vault = vault_with(&["alice", "bob", "carol"]);
        let node = Uuid::new_v4();
        let epoch = vault
            .set_new_storage_key(node, &p("alice"), &set(&["bob"]), &set(&[]))
            .unwrap();
        assert_eq!(epoch, 1);

        let blob = vault.encrypt_data(node, &p("alice"), b"{\"x\":1}").unwrap();
        assert_eq!(&blob[..EPOCH_SIZE], &1u64.to_be_bytes());
        assert_eq!(
            vault.decrypt_data(node, &p("bob"), &blob).unwrap(),
            b"{\"x\":1}"
        );
        assert!(matches!(
            vault.decrypt_data(node, &p("carol"), &blob),
            Err(VaultError::AccessDenied)
        ));
    }

    #[test]
    fn test_rotation_excludes_removed_principals() {
        let vault = vault_with(&["alice", "bob", "carol"]);
        let node = Uuid::new_v4();
        vault
            .set_new_storage_key(node, &p("alice"), &set(&["bob", "carol"]), &set(&[]))
            .unwrap();
        let old_blob = vault.encrypt_data(node, &p("alice"), b"old").unwrap();

        let epoch = vault
            .set_new_storage_key(node, &p("alice"), &set(&["carol"]), &set(&["bob"]))
            .unwrap();
        assert_eq!(epoch, 2);
        let new_blob = vault.encrypt_data(node, &p("alice"), b"new").unwrap();

        // removed principal loses both the new and the retained old epoch
        for blob in [&old_blob, &new_blob] {
            assert!(matches!(
                vault.decrypt_data(node, &p("bob"), blob),
                Err(VaultError::AccessDenied)
            ));
        }
        // remaining principals read old bytes until they are re-stored
        assert_eq!(
            vault.decrypt_data(node, &p("carol"), &old_blob).unwrap(),
            b"old"
        );
        assert_eq!(
            vault.decrypt_data(node, &p("carol"), &new_blob).unwrap(),
            b"new"
        );
        assert_eq!(
            vault.decrypt_data(node, &p("alice"), &new_blob).unwrap(),
            b"new"
        );
    }

    #[test]
    fn test_wildcard_wraps_for_every_registered_principal() {
        let vault = vault_with(&["alice", "bob", "carol"]);
        let node = Uuid::new_v4();
        vault
            .set_new_storage_key(node, &p("alice"), &[Principal::all()].into(), &set(&[]))
            .unwrap();
        let blob = vault.encrypt_data(node, &p("alice"), b"public").unwrap();
        for id in ["alice", "bob", "carol"] {
            assert_eq!(vault.decrypt_data(node, &p(id), &blob).unwrap(), b"public");
        }
        assert_eq!(vault.access_keys(node).len(), 3);
    }

    #[test]
    fn test_unknown_node_is_access_denied() {
        let vault = vault_with(&["alice"]);
        let result = vault.decrypt_data(Uuid::new_v4(), &p("alice"), &[0u8; 40]);
        assert!(matches!(result, Err(VaultError::AccessDenied)));
        assert!(matches!(
            vault.encrypt_data(Uuid::new_v4(), &p("alice"), b"x"),
            Err(VaultError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_unknown_principal_cannot_own_a_key() {
        let vault = vault_with(&["alice"]);
        assert!(matches!(
            vault.set_new_storage_key(Uuid::new_v4(), &p("mallory"), &set(&[]), &set(&[])),
            Err(VaultError::UnknownPrincipal(_))
        ));
    }

    #[test]
    fn test_ciphertext_bound_to_node() {
        let vault = vault_with(&["alice"]);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for node in [a, b] {
            vault
                .set_new_storage_key(node, &p("alice"), &set(&[]), &set(&[]))
                .unwrap();
        }
        let blob = vault.encrypt_data(a, &p("alice"), b"x").unwrap();
        assert!(vault.decrypt_data(b, &p("alice"), &blob).is_err());
    }

    #[test]
    fn test_retire_and_remove() {
        let vault = vault_with(&["alice"]);
        let node = Uuid::new_v4();
        vault
            .set_new_storage_key(node, &p("alice"), &set(&[]), &set(&[]))
            .unwrap();
        let old = vault.encrypt_data(node, &p("alice"), b"old").unwrap();
        let epoch = vault
            .set_new_storage_key(node, &p("alice"), &set(&[]), &set(&[]))
            .unwrap();
        vault.retire_epochs_before(node, epoch);
        assert!(vault.decrypt_data(node, &p("alice"), &old).is_err());
        assert_eq!(vault.current_epoch(node), Some(2));

        assert!(vault.remove_node(node));
        assert_eq!(vault.current_epoch(node), None);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let alice_key = SecretKey::generate();
        let vault = KeyVault::new();
        vault.register_principal(p("alice"), alice_key.clone());
        let node = Uuid::new_v4();
        vault
            .set_new_storage_key(node, &p("alice"), &set(&[]), &set(&[]))
            .unwrap();
        let blob = vault.encrypt_data(node, &p("alice"), b"persisted").unwrap();

        let json = serde_json::to_string(&vault.export()).unwrap();
        let restored = KeyVault::new();
        restored.register_principal(p("alice"), alice_key);
        restored.import(serde_json::from_str(&json).unwrap());

        assert_eq!(
            restored.decrypt_data(node, &p("alice"), &blob).unwrap(),
            b"persisted"
        );
    }
}
