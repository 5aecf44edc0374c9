//! Built-in transformers.

mod abort;
mod anonymize;
mod audit;
mod consents;
mod load;
mod parse;
mod pseudonymize;
mod store;
mod validate;

use std::sync::Arc;

pub use abort::AbortTransaction;
pub use anonymize::{Anonymize, ValueKind};
pub use audit::{AuditAccess, NotifySubscribers};
pub use consents::{ApplyConsents, LoadConsents};
pub use load::LoadFromStorage;
pub use parse::ParseData;
pub use pseudonymize::Pseudonymize;
pub use store::SaveToStorage;
pub use validate::MustValidate;

use crate::error::Error;
use crate::executable::ExecutableApp;
use crate::schema::{Schema, Sensitivity, ANY_SEGMENT};
use crate::traits::{TransformState, TransformerRegistry};
use crate::transaction::AppResource;

pub mod tags {
    pub const PARSE_DATA: &str = "ParseData";
    pub const LOAD_FROM_STORAGE: &str = "LoadFromStorage";
    pub const MUST_VALIDATE: &str = "MustValidate";
    pub const ANONYMIZE: &str = "Anonymize";
    pub const PSEUDONYMIZE: &str = "Pseudonymize";
    pub const SAVE_TO_STORAGE: &str = "SaveToStorage";
    pub const APPLY_CONSENTS: &str = "ApplyConsents";
    pub const LOAD_CONSENTS: &str = "LoadConsents";
    pub const AUDIT_ACCESS: &str = "AuditAccess";
    pub const NOTIFY_SUBSCRIBERS: &str = "NotifySubscribers";
    pub const ABORT_TRANSACTION: &str = "AbortTransaction";
}

pub fn register_builtins(registry: &mut TransformerRegistry) {
    registry.register(Arc::new(ParseData::default()));
    registry.register(Arc::new(LoadFromStorage::default()));
    registry.register(Arc::new(MustValidate::default()));
    registry.register(Arc::new(Anonymize::default()));
    registry.register(Arc::new(Pseudonymize::default()));
    registry.register(Arc::new(SaveToStorage::default()));
    registry.register(Arc::new(ApplyConsents::default()));
    registry.register(Arc::new(LoadConsents::default()));
    registry.register(Arc::new(AuditAccess::default()));
    registry.register(Arc::new(NotifySubscribers::default()));
    registry.register(Arc::new(AbortTransaction::default()));
}

/// `path` made relative to the data selected by `remainder`.
///
/// `*` segments of `path` match any segment. If `remainder` lies inside
/// `path`, the whole selection is covered and the result is empty.
fn relative_to(path: &[String], remainder: &[String]) -> Option<Vec<String>> {
    let common = path.len().min(remainder.len());
    let matches = path[..common]
        .iter()
        .zip(&remainder[..common])
        .all(|(p, r)| p == ANY_SEGMENT || p == r);
    matches.then(|| path[common..].to_vec())
}

/// Paths with one of `kinds` below the selected data, relative to it
fn sensitive_paths(
    schema: &dyn Schema,
    remainder: &[String],
    kinds: &[Sensitivity],
) -> Vec<Vec<String>> {
    schema
        .sensitivities()
        .into_iter()
        .filter(|(_, sensitivity)| kinds.contains(sensitivity))
        .filter_map(|(path, _)| relative_to(&path, remainder))
        .collect()
}

/// The executable application serving the resolved node, if any,
/// enlisted in the transaction
async fn enlisted_app(state: &mut TransformState<'_>) -> Result<Option<Arc<dyn ExecutableApp>>, Error> {
    let app = match &state.data_node {
        Some((node, _)) => node.read().as_executable().map(|exec| exec.app().clone()),
        None => None,
    };
    if let Some(app) = &app {
        state
            .trx
            .add_resource(Arc::new(AppResource::new(app.clone())))
            .await?;
    }
    Ok(app)
}
