use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::consents::Consent;
use super::mode::{AccessMode, AccessModes};
use crate::directory::{Capability, NodeRegistry};
use crate::error::Error;
use crate::key::{DDHKey, Fork};
use crate::principal::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    Put,
    Delete,
}

impl Operation {
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Put | Operation::Delete)
    }

    /// Modes requested when the caller does not name any
    pub fn default_modes(&self) -> AccessModes {
        match self {
            Operation::Get => [AccessMode::Read].into(),
            Operation::Put | Operation::Delete => [AccessMode::Write].into(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Get => "get",
            Operation::Put => "put",
            Operation::Delete => "delete",
        })
    }
}

/// One authorization request and, once evaluated, its verdict
#[derive(Debug, Clone, Serialize)]
pub struct Access {
    op: Operation,
    key: DDHKey,
    principal: Principal,
    app: Option<String>,
    modes: AccessModes,
    time: DateTime<Utc>,
    granted: Option<bool>,
    by_consent: Option<Consent>,
    explanation: String,
}

impl Access {
    pub fn new(op: Operation, key: DDHKey, principal: Principal) -> Self {
        Self {
            op,
            key,
            principal,
            app: None,
            modes: op.default_modes(),
            time: Utc::now(),
            granted: None,
            by_consent: None,
            explanation: String::new(),
        }
    }

    pub fn with_modes(mut self, modes: impl IntoIterator<Item = AccessMode>) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    pub fn key(&self) -> &DDHKey {
        &self.key
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn app(&self) -> Option<&str> {
        self.app.as_deref()
    }

    pub fn modes(&self) -> &AccessModes {
        &self.modes
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// `None` until [`Access::permitted`] has run
    pub fn granted(&self) -> Option<bool> {
        self.granted
    }

    pub fn by_consent(&self) -> Option<&Consent> {
        self.by_consent.as_ref()
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    fn record(&mut self, granted: bool, consent: Option<Consent>, explanation: String) -> bool {
        self.granted = Some(granted);
        self.by_consent = consent;
        self.explanation = explanation;
        granted
    }

    /// The owners of the resource this access targets: those of the nearest
    /// data or executable node, or else the principals named by the key.
    pub fn owners(&self, registry: &NodeRegistry) -> Vec<Principal> {
        let key = self.key.ensure_rooted();
        let owners = match registry.get_data_node(&key) {
            Some((node, _)) => node.read().owners().to_vec(),
            None => key.owners(),
        };
        owners
    }

    /// Decide whether this access is allowed and record the verdict.
    pub fn permitted(&mut self, registry: &NodeRegistry) -> bool {
        let key = self.key.ensure_rooted();
        let resolved = registry.get_data_node(&key);

        let owners = match &resolved {
            Some((node, _)) => node.read().owners().to_vec(),
            None => key.owners(),
        };
        if owners.contains(&self.principal) {
            return self.record(true, None, "owner".to_string());
        }
        if self.key.fork() == Fork::Consents {
            return self.record(false, None, "consents are owner-only".to_string());
        }

        let consents = resolved
            .as_ref()
            .and_then(|(node, _)| node.read().consents().cloned())
            .or_else(|| {
                registry
                    .get_node(&key, Capability::Consents)
                    .as_ref()
                    .and_then(|(node, _)| node.read().consents().cloned())
            });

        let (granted, consent, explanation) = match consents {
            Some(consents) => consents.check(self),
            None => (false, None, "no consent".to_string()),
        };
        self.record(granted, consent, explanation)
    }

    /// Like [`Access::permitted`], turning a denial into [`Error::AccessDenied`]
    pub fn ensure_permitted(&mut self, registry: &NodeRegistry) -> Result<(), Error> {
        if self.permitted(registry) {
            tracing::debug!(
                principal = %self.principal,
                key = %self.key,
                explanation = %self.explanation,
                "access granted"
            );
            return Ok(());
        }
        tracing::warn!(
            principal = %self.principal,
            key = %self.key,
            op = %self.op,
            explanation = %self.explanation,
            "access denied"
        );
        Err(Error::AccessDenied)
    }
}
