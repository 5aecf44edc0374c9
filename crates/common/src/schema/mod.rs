//! The schema provider seam.
//!
//! The engine only needs a schema to validate a payload at a sub-path,
//! narrow itself to a sub-path, report field sensitivities and identify its
//! variant and version. [`JsonSchema`] is a small structural implementation
//! of that contract.

mod container;
mod json;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use container::{SchemaContainer, DEFAULT_VARIANT};
pub use json::{Additional, JsonNode, JsonSchema, JsonType};

use crate::error::Error;
use crate::key::Version;

/// Path segment standing for any object member or array element
pub const ANY_SEGMENT: &str = "*";

/// How identifying a field is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Directly identifies a person
    Eid,
    /// Identifies a person in combination with other fields
    Qid,
    /// Sensitive attribute
    Sa,
}

pub trait Schema: Send + Sync + fmt::Debug {
    fn variant(&self) -> &str;

    fn version(&self) -> &Version;

    /// Validate `value` as the data found at `path` below the schema root
    fn validate(&self, path: &[String], value: &Value) -> Result<(), Error>;

    /// The schema describing the data at `path`.
    ///
    /// Fails with `NotFound` when the path does not exist and with
    /// `NotSelectable` when it descends into a scalar.
    fn subschema(&self, path: &[String]) -> Result<Box<dyn Schema>, Error>;

    /// Annotated fields, as paths relative to this schema's root.
    /// [`ANY_SEGMENT`] matches every member or element.
    fn sensitivities(&self) -> Vec<(Vec<String>, Sensitivity)>;

    /// Serializable form, used to persist the schema
    fn document(&self) -> Value;
}
