use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::Mutex;
use petgraph::algo::toposort;
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Direction;

use super::{Phase, Trait, Traits, Transform, TransformState, TransformerRegistry};
use crate::consent::AccessModes;
use crate::error::Error;
use crate::key::Fork;

/// Serializes trait compilation across every `Transformers` instance
static COMPILE_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// A trait paired with the transformer registered for its tag
pub type Admitted = (Trait, Arc<dyn Transform>);

/// The effective traits of a scope and the pipeline they compile to
#[derive(Debug)]
pub struct Transformers {
    traits: Traits,
    compiled: OnceCell<Traits>,
}

impl Transformers {
    pub fn new(traits: Traits) -> Self {
        Self {
            traits,
            compiled: OnceCell::new(),
        }
    }

    pub fn traits(&self) -> &Traits {
        &self.traits
    }

    /// The traits with every implied prerequisite added, computed once
    pub fn compiled(&self, registry: &TransformerRegistry) -> &Traits {
        self.compiled.get_or_init(|| {
            let _guard = COMPILE_LOCK.lock();
            expand_implied(&self.traits, registry)
        })
    }

    /// The transformers to run for a request, unordered.
    ///
    /// Fails with [`Error::CapabilityMissing`] if a transformer that the
    /// requested modes require is not among the candidates.
    pub fn select_for_apply(
        &self,
        registry: &TransformerRegistry,
        modes: &AccessModes,
        fork: Fork,
    ) -> Result<Vec<Admitted>, Error> {
        let required = registry.required_tags(modes, fork);
        let candidates: BTreeMap<&str, Admitted> = self
            .compiled(registry)
            .iter()
            .filter(|t| !t.is_cancel())
            .filter_map(|t| {
                let transformer = registry.get(t.tag())?;
                let spec = transformer.spec();
                let admitted = spec.phase != Phase::AbortOnly
                    && spec.admits_fork(fork)
                    && spec.admits_modes(modes);
                admitted.then(|| (t.tag(), (t.clone(), transformer.clone())))
            })
            .collect();

        let missing: Vec<&str> = required
            .iter()
            .map(String::as_str)
            .filter(|tag| !candidates.contains_key(tag))
            .collect();
        if !missing.is_empty() {
            return Err(Error::CapabilityMissing(missing.join(", ")));
        }

        Ok(candidates
            .into_iter()
            .filter(|(tag, (_, transformer))| {
                required.contains(*tag) || transformer.spec().supports_modes.is_empty()
            })
            .map(|(_, admitted)| admitted)
            .collect())
    }

    /// Order `admitted` for `sequence`.
    ///
    /// Each transformer sits between its phase and the next active phase;
    /// `after` hints add edges between transformers. Transformers outside
    /// the sequence are dropped. Unordered transformers run in tag order.
    pub fn sorted(admitted: Vec<Admitted>, sequence: &[Phase]) -> Result<Vec<Admitted>, Error> {
        let mut admitted: Vec<Admitted> = admitted
            .into_iter()
            .filter(|(_, transformer)| sequence.contains(&transformer.spec().phase))
            .collect();
        admitted.sort_by(|(a, _), (b, _)| a.tag().cmp(b.tag()));

        #[derive(Debug, Clone, Copy)]
        enum Step {
            Phase(Phase),
            Transformer(usize),
        }

        let mut graph: Graph<Step, ()> = Graph::new();
        let phases: Vec<NodeIndex> = sequence
            .iter()
            .map(|phase| graph.add_node(Step::Phase(*phase)))
            .collect();
        for pair in phases.windows(2) {
            graph.add_edge(pair[0], pair[1], ());
        }

        let mut by_tag: BTreeMap<&str, NodeIndex> = BTreeMap::new();
        for (i, (t, transformer)) in admitted.iter().enumerate() {
            let node = graph.add_node(Step::Transformer(i));
            let position = sequence
                .iter()
                .position(|phase| *phase == transformer.spec().phase)
                .unwrap_or_default();
            graph.add_edge(phases[position], node, ());
            if let Some(next) = phases.get(position + 1) {
                graph.add_edge(node, *next, ());
            }
            by_tag.insert(t.tag(), node);
        }

        for (t, transformer) in &admitted {
            let node = by_tag[t.tag()];
            for before in &transformer.spec().after {
                let Some(&before_node) = by_tag.get(before.as_str()) else {
                    return Err(Error::Config(format!(
                        "{} must run after {}, which is not part of this pipeline",
                        t.tag(),
                        before
                    )));
                };
                graph.add_edge(before_node, node, ());
            }
        }

        toposort(&graph, None).map_err(|cycle| {
            let at = match graph[cycle.node_id()] {
                Step::Phase(phase) => phase.to_string(),
                Step::Transformer(i) => admitted[i].0.tag().to_string(),
            };
            Error::Config(format!("transformer ordering has a cycle at {}", at))
        })?;

        // Kahn's algorithm, picking ready transformers by tag
        let label = |node: NodeIndex| match graph[node] {
            Step::Phase(_) => (0, node.index(), ""),
            Step::Transformer(i) => (1, 0, admitted[i].0.tag()),
        };
        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BTreeSet<((u8, usize, &str), NodeIndex)> = graph
            .node_indices()
            .filter(|n| in_degree[n.index()] == 0)
            .map(|n| (label(n), n))
            .collect();

        let mut order = Vec::with_capacity(admitted.len());
        while let Some((_, node)) = ready.pop_first() {
            if let Step::Transformer(i) = graph[node] {
                order.push(i);
            }
            for next in graph.neighbors_directed(node, Direction::Outgoing) {
                in_degree[next.index()] -= 1;
                if in_degree[next.index()] == 0 {
                    ready.insert((label(next), next));
                }
            }
        }

        let mut slots: Vec<Option<Admitted>> = admitted.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    /// Select, order and run the pipeline for `state.access`.
    ///
    /// On failure every abort-only transformer is given the error, then the
    /// original error is returned.
    pub async fn apply(
        &self,
        registry: &TransformerRegistry,
        state: &mut TransformState<'_>,
    ) -> Result<(), Error> {
        let Err((failed, error)) = self.run(registry, state).await else {
            return Ok(());
        };

        tracing::warn!(
            trx = %state.trx.id(),
            key = %state.access.key(),
            failed = %failed,
            "pipeline failed: {}",
            error
        );
        let handlers: Vec<Admitted> = self
            .compiled(registry)
            .iter()
            .filter(|t| !t.is_cancel())
            .filter_map(|t| {
                let transformer = registry.get(t.tag())?;
                (transformer.spec().phase == Phase::AbortOnly)
                    .then(|| (t.clone(), transformer.clone()))
            })
            .collect();
        for (t, transformer) in handlers {
            if let Err(e) = transformer.abort(&t, state, &failed, &error).await {
                tracing::error!(tag = %t.tag(), "abort handler failed: {}", e);
            }
        }
        Err(error)
    }

    async fn run(
        &self,
        registry: &TransformerRegistry,
        state: &mut TransformState<'_>,
    ) -> Result<(), (String, Error)> {
        let fork = state.access.key().fork();
        let sequence = Phase::sequence(state.access.op());
        let pipeline = self
            .select_for_apply(registry, state.access.modes(), fork)
            .and_then(|admitted| Self::sorted(admitted, sequence))
            .map_err(|e| (String::new(), e))?;

        for (t, transformer) in pipeline {
            tracing::debug!(tag = %t.tag(), trx = %state.trx.id(), "applying transformer");
            transformer
                .apply(&t, state)
                .await
                .map_err(|e| (t.tag().to_string(), e))?;
            state.executed.push(t.tag().to_string());
        }
        Ok(())
    }
}

/// Add the traits implied by registered transformers until nothing changes.
/// Explicit traits win over implied ones of the same tag.
fn expand_implied(traits: &Traits, registry: &TransformerRegistry) -> Traits {
    let mut compiled = traits.clone();
    loop {
        let implied: Traits = compiled
            .iter()
            .filter(|t| !t.is_cancel())
            .filter_map(|t| registry.get(t.tag()))
            .flat_map(|transformer| transformer.spec().implies.iter().cloned())
            .filter(|t| !compiled.contains(t.tag()))
            .collect();
        if implied.is_empty() {
            return compiled;
        }
        compiled = implied.merge(&compiled);
    }
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;

    use super::*;
    use crate::consent::AccessMode;
    use crate::traits::{TransformerSpec, READ_SEQUENCE, WRITE_SEQUENCE};

    struct Probe(TransformerSpec);

    #[async_trait]
    impl Transform for Probe {
        fn spec(&self) -> &TransformerSpec {
            &self.0
        }

        async fn apply(&self, _t: &Trait, _state: &mut TransformState<'_>) -> Result<(), Error> {
            Ok(())
        }
    }

    fn registry(specs: Vec<TransformerSpec>) -> TransformerRegistry {
        let mut registry = TransformerRegistry::new();
        for spec in specs {
            registry.register(Arc::new(Probe(spec)));
        }
        registry
    }

    fn traits(tags: &[&str]) -> Traits {
        tags.iter().map(|tag| Trait::new(*tag)).collect()
    }

    fn modes(modes: &[AccessMode]) -> AccessModes {
        modes.iter().copied().collect()
    }

    fn tags(admitted: &[Admitted]) -> Vec<&str> {
        admitted.iter().map(|(t, _)| t.tag()).collect()
    }

    #[test]
    fn test_required_mode_without_candidate_is_missing() {
        let registry = registry(vec![
            TransformerSpec::new("Save", Phase::Store).supports([AccessMode::Write]),
            TransformerSpec::new("Pseudo", Phase::PostLoad)
                .supports([AccessMode::Pseudonym])
                .only_modes([AccessMode::Read]),
        ]);

        // listed, but only for reads
        let transformers = Transformers::new(traits(&["Save", "Pseudo"]));
        let result = transformers.select_for_apply(
            &registry,
            &modes(&[AccessMode::Write, AccessMode::Pseudonym]),
            Fork::Data,
        );
        assert!(matches!(result, Err(Error::CapabilityMissing(tag)) if tag == "Pseudo"));

        let admitted = transformers
            .select_for_apply(
                &registry,
                &modes(&[AccessMode::Read, AccessMode::Pseudonym]),
                Fork::Data,
            )
            .unwrap();
        assert_eq!(tags(&admitted), vec!["Pseudo"]);
    }

    #[test]
    fn test_unrequired_mode_transformers_are_not_admitted() {
        let registry = registry(vec![
            TransformerSpec::new("Load", Phase::Load).supports([AccessMode::Read]),
            TransformerSpec::new("Anon", Phase::PostLoad).supports([AccessMode::Anonymous]),
            TransformerSpec::new("Audit", Phase::Last),
            TransformerSpec::new("Abort", Phase::AbortOnly),
            TransformerSpec::new("SchemaOnly", Phase::Load).only_forks([Fork::Schema]),
        ]);
        let transformers =
            Transformers::new(traits(&["Load", "Anon", "Audit", "Abort", "SchemaOnly"]));
        let admitted = transformers
            .select_for_apply(&registry, &modes(&[AccessMode::Read]), Fork::Data)
            .unwrap();
        assert_eq!(tags(&admitted), vec!["Audit", "Load"]);
    }

    #[test]
    fn test_cancelled_traits_are_not_candidates() {
        let registry = registry(vec![
            TransformerSpec::new("Validate", Phase::Validation).supports([AccessMode::Write])
        ]);
        let transformers = Transformers::new(Traits::new([Trait::cancellation("Validate")]));
        assert!(matches!(
            transformers.select_for_apply(&registry, &modes(&[AccessMode::Write]), Fork::Data),
            Err(Error::CapabilityMissing(_))
        ));
    }

    #[test]
    fn test_load_runs_before_validation_regardless_of_registration() {
        let registry = registry(vec![
            TransformerSpec::new("A-Validate", Phase::Validation),
            TransformerSpec::new("Z-Load", Phase::Load),
            TransformerSpec::new("M-Last", Phase::Last),
            TransformerSpec::new("B-First", Phase::First),
        ]);
        let transformers = Transformers::new(traits(&["A-Validate", "Z-Load", "M-Last", "B-First"]));
        let admitted = transformers
            .select_for_apply(&registry, &modes(&[AccessMode::Read]), Fork::Data)
            .unwrap();
        let sorted = Transformers::sorted(admitted, READ_SEQUENCE).unwrap();
        assert_eq!(tags(&sorted), vec!["B-First", "Z-Load", "A-Validate", "M-Last"]);
    }

    #[test]
    fn test_after_hints_and_ties_by_tag() {
        let registry = registry(vec![
            TransformerSpec::new("C", Phase::Last),
            TransformerSpec::new("A", Phase::Last).after("C"),
            TransformerSpec::new("B", Phase::Last),
            TransformerSpec::new("Parse", Phase::Parse),
        ]);
        let transformers = Transformers::new(traits(&["A", "B", "C", "Parse"]));
        let admitted = transformers
            .select_for_apply(&registry, &modes(&[AccessMode::Write]), Fork::Data)
            .unwrap();

        let sorted = Transformers::sorted(admitted.clone(), WRITE_SEQUENCE).unwrap();
        assert_eq!(tags(&sorted), vec!["Parse", "B", "C", "A"]);

        // Parse is not part of the read sequence
        let sorted = Transformers::sorted(admitted, READ_SEQUENCE).unwrap();
        assert_eq!(tags(&sorted), vec!["B", "C", "A"]);
    }

    #[test]
    fn test_unknown_after_and_cycles_are_config_errors() {
        let registry = registry(vec![
            TransformerSpec::new("A", Phase::Last).after("Missing"),
            TransformerSpec::new("X", Phase::Last).after("Y"),
            TransformerSpec::new("Y", Phase::Last).after("X"),
            TransformerSpec::new("Early", Phase::Load).after("Late"),
            TransformerSpec::new("Late", Phase::Validation),
        ]);
        let read = modes(&[AccessMode::Read]);

        for set in [&["A"][..], &["X", "Y"][..], &["Early", "Late"][..]] {
            let admitted = Transformers::new(traits(set))
                .select_for_apply(&registry, &read, Fork::Data)
                .unwrap();
            assert!(matches!(
                Transformers::sorted(admitted, READ_SEQUENCE),
                Err(Error::Config(_))
            ));
        }
    }

    #[test]
    fn test_implied_traits_are_compiled_in() {
        let registry = registry(vec![
            TransformerSpec::new("Notify", Phase::Last)
                .after("Audit")
                .implies(Trait::new("Audit")),
            TransformerSpec::new("Audit", Phase::Last).implies(Trait::new("Clock")),
            TransformerSpec::new("Clock", Phase::First),
        ]);
        let transformers = Transformers::new(traits(&["Notify"]));
        let compiled = transformers.compiled(&registry);
        assert_eq!(
            compiled.tags().collect::<Vec<_>>(),
            vec!["Audit", "Clock", "Notify"]
        );

        // an explicit cancellation is not re-added
        let transformers = Transformers::new(Traits::new([
            Trait::new("Notify"),
            Trait::cancellation("Audit"),
        ]));
        assert!(transformers
            .compiled(&registry)
            .get("Audit")
            .unwrap()
            .is_cancel());
    }
}
