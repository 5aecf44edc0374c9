//! Consent records and the accept/reject decision for an [`Access`].
//!
//! Owners always have access. Anyone else needs a consent from every owner
//! of the resource, found on the resolved data node or on the nearest
//! ancestor node carrying consents.

mod access;
mod consents;
mod mode;
mod multi;

pub use access::{Access, Operation};
pub use consents::{Consent, Consents, ConsentsDiff};
pub use mode::{AccessMode, AccessModes, OPTIONAL_MODES, REQUIRED_IF_CONSENTED};
pub use multi::MultiOwnerConsents;
