//! Cryptographic primitives for data at rest
//!
//! - **Identity**: Ed25519 keypairs per principal (`SecretKey`/`PublicKey`)
//! - **Encryption**: one ChaCha20-Poly1305 [`Secret`] per stored object
//! - **Key wrapping**: the object's secret is wrapped for every principal
//!   with access as a [`SecretShare`] (X25519 ECDH + AES-KW)
//!
//! Rotation and bookkeeping of who holds which share live in
//! [`vault`](crate::vault).

mod keys;
mod secret;
mod secret_share;

pub use keys::{KeyError, PublicKey, SecretKey};
pub use secret::{Secret, SecretError};
pub use secret_share::{SecretShare, SecretShareError};
