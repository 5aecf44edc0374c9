use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Phase, Trait, TransformState};
use crate::consent::{AccessMode, AccessModes};
use crate::error::Error;
use crate::key::Fork;

/// Static description of a transformer: when it runs and what it provides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerSpec {
    pub tag: String,
    /// Modes this transformer provides; a request for one of them requires it
    pub supports_modes: AccessModes,
    /// Restrict to requests with one of these modes; empty admits any
    pub only_modes: AccessModes,
    /// Restrict to these forks; empty admits any
    pub only_forks: BTreeSet<Fork>,
    pub phase: Phase,
    /// Tags that must run before this one
    pub after: Vec<String>,
    /// Traits added to the compiled set whenever this one is present
    pub implies: Vec<Trait>,
}

impl TransformerSpec {
    pub fn new(tag: impl Into<String>, phase: Phase) -> Self {
        Self {
            tag: tag.into(),
            supports_modes: AccessModes::new(),
            only_modes: AccessModes::new(),
            only_forks: BTreeSet::new(),
            phase,
            after: Vec::new(),
            implies: Vec::new(),
        }
    }

    pub fn supports(mut self, modes: impl IntoIterator<Item = AccessMode>) -> Self {
        self.supports_modes.extend(modes);
        self
    }

    pub fn only_modes(mut self, modes: impl IntoIterator<Item = AccessMode>) -> Self {
        self.only_modes.extend(modes);
        self
    }

    pub fn only_forks(mut self, forks: impl IntoIterator<Item = Fork>) -> Self {
        self.only_forks.extend(forks);
        self
    }

    pub fn after(mut self, tag: impl Into<String>) -> Self {
        self.after.push(tag.into());
        self
    }

    pub fn implies(mut self, t: Trait) -> Self {
        self.implies.push(t);
        self
    }

    pub fn admits_fork(&self, fork: Fork) -> bool {
        self.only_forks.is_empty() || self.only_forks.contains(&fork)
    }

    pub fn admits_modes(&self, modes: &AccessModes) -> bool {
        self.only_modes.is_empty() || !self.only_modes.is_disjoint(modes)
    }

    /// Whether a request for `modes` on `fork` cannot do without this transformer
    pub fn required_for(&self, modes: &AccessModes, fork: Fork) -> bool {
        !self.supports_modes.is_disjoint(modes) && self.admits_fork(fork)
    }
}

/// The behaviour behind a registered trait tag
#[async_trait]
pub trait Transform: Send + Sync + 'static {
    fn spec(&self) -> &TransformerSpec;

    async fn apply(&self, t: &Trait, state: &mut TransformState<'_>) -> Result<(), Error>;

    /// Called on abort-only transformers after `failed` returned `error`
    async fn abort(
        &self,
        _t: &Trait,
        _state: &mut TransformState<'_>,
        _failed: &str,
        _error: &Error,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// Transformer implementations by tag
#[derive(Default, Clone)]
pub struct TransformerRegistry {
    transformers: BTreeMap<String, Arc<dyn Transform>>,
}

impl fmt::Debug for TransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformerRegistry")
            .field("tags", &self.transformers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::transformers::register_builtins(&mut registry);
        registry
    }

    /// Register `transformer` under its spec's tag, replacing any previous one
    pub fn register(&mut self, transformer: Arc<dyn Transform>) {
        let tag = transformer.spec().tag.clone();
        tracing::debug!(tag = %tag, phase = %transformer.spec().phase, "registering transformer");
        self.transformers.insert(tag, transformer);
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<dyn Transform>> {
        self.transformers.get(tag)
    }

    pub fn specs(&self) -> impl Iterator<Item = &TransformerSpec> {
        self.transformers.values().map(|t| t.spec())
    }

    /// Tags of every transformer a request for `modes` on `fork` requires
    pub fn required_tags(&self, modes: &AccessModes, fork: Fork) -> BTreeSet<String> {
        self.specs()
            .filter(|spec| spec.required_for(modes, fork))
            .map(|spec| spec.tag.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }
}
