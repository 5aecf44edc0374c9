/**
 * Persisted directory: schemas, data nodes,
 *  their consents and the public key vault.
 */
pub mod catalog;
/**
 * Consents, access modes and the access
 *  check every request goes through.
 */
pub mod consent;
/**
 * Cryptographic types and operations.
 *  - Public and Private key implementations
 *  - Key-to-key key sharing
 */
pub mod crypto;
/**
 * The node directory: which schema, data or
 *  application serves a key.
 */
pub mod directory;
/**
 * Entry point tying the directory, vault,
 *  storage and transformer pipeline together.
 */
pub mod engine;
pub mod error;
/// Applications serving a sub-tree of keys
pub mod executable;
/**
 * Hierarchical keys: owner, path, fork,
 *  variant and version.
 */
pub mod key;
/// Sealing, loading and navigating JSON payloads
pub mod payload;
pub mod principal;
pub mod pubsub;
pub mod schema;
/**
 * Storage backends for encrypted payloads.
 *  Each data node is one opaque object.
 */
pub mod storage;
/**
 * Traits declared on schema nodes and the
 *  transformers compiled from them.
 */
pub mod traits;
/**
 * Built-in transformers for parsing, loading,
 *  validation, anonymization and storage.
 */
pub mod transformers;
/**
 * Transactions spanning one or more requests,
 *  with deferred actions and enlisted resources.
 */
pub mod transaction;
/**
 * Principal key pairs and the per-node
 *  storage keys wrapped for them.
 */
pub mod vault;

pub use error::Error;

pub mod prelude {
    pub use crate::catalog::Catalog;
    pub use crate::consent::{Access, AccessMode, Consent, Consents, Operation};
    pub use crate::crypto::{PublicKey, SecretKey};
    pub use crate::engine::{Engine, EngineConfig, Response};
    pub use crate::error::Error;
    pub use crate::executable::{ExecutableApp, ExecuteRequest};
    pub use crate::key::{DDHKey, Fork, Version};
    pub use crate::principal::Principal;
    pub use crate::schema::{JsonSchema, Schema};
    pub use crate::storage::{FsStorage, MemoryStorage, StorageProvider};
    pub use crate::traits::{Trait, Traits};
    pub use crate::transaction::TrxId;
}
