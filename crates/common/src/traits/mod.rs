//! Policy traits and the transformer pipeline they compile to.
//!
//! A [`Trait`] is a tagged marker attached to schema nodes. Traits merge
//! down the key tree: a more specific scope may replace an overwritable
//! trait or cancel it. Tags with a registered [`Transform`] run as
//! transformers, ordered by [`Phase`] and explicit `after` hints.

mod item;
mod phase;
mod registry;
mod set;
mod state;
mod transformers;

pub use item::Trait;
pub use phase::{Phase, READ_SEQUENCE, WRITE_SEQUENCE};
pub use registry::{Transform, TransformerRegistry, TransformerSpec};
pub use set::Traits;
pub use state::TransformState;
pub use transformers::{Admitted, Transformers};
