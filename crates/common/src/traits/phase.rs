use std::fmt;

use serde::{Deserialize, Serialize};

use crate::consent::Operation;

/// Where in the pipeline a transformer runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    /// Never part of a sequence; runs only when the pipeline fails
    AbortOnly,
    First,
    Parse,
    Load,
    PostLoad,
    Validation,
    PreStore,
    Store,
    Last,
}

pub const READ_SEQUENCE: &[Phase] = &[
    Phase::First,
    Phase::Load,
    Phase::PostLoad,
    Phase::Validation,
    Phase::Last,
];

pub const WRITE_SEQUENCE: &[Phase] = &[
    Phase::First,
    Phase::Parse,
    Phase::PostLoad,
    Phase::Validation,
    Phase::PreStore,
    Phase::Store,
    Phase::Last,
];

impl Phase {
    /// The active phases for `op`; deletes run the write sequence
    pub fn sequence(op: Operation) -> &'static [Phase] {
        match op {
            Operation::Get => READ_SEQUENCE,
            Operation::Put | Operation::Delete => WRITE_SEQUENCE,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
