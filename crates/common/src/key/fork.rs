use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::KeyError;

/// Which family of records a key addresses at its path
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Fork {
    #[default]
    Data,
    Schema,
    Consents,
}

impl Fork {
    pub const ALL: [Fork; 3] = [Fork::Data, Fork::Schema, Fork::Consents];

    pub fn as_str(&self) -> &'static str {
        match self {
            Fork::Data => "data",
            Fork::Schema => "schema",
            Fork::Consents => "consents",
        }
    }
}

impl fmt::Display for Fork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Fork {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "data" => Ok(Fork::Data),
            "schema" => Ok(Fork::Schema),
            "consents" => Ok(Fork::Consents),
            other => Err(KeyError::UnknownFork(other.to_string())),
        }
    }
}
