/// The generation engine: graph traversal from the start node to a leaf.
///
/// Wires together pool resolution, sampling and template interpolation
/// over a validated, read-only document.
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

use crate::core::config::GenerationConfig;
use crate::core::pool::ResolvedPool;
use crate::core::random::RandomSource;
use crate::core::sampling::{passes_gate, sample_one, select};
use crate::core::template::{Template, TemplateError};
use crate::core::validate::{check, resolve_pools, CheckedGraph, ValidationErrors};
use crate::schema::document::{GraphDocument, OutgoingEdges};
use crate::schema::node::{Node, NodeId, NodeKind};

/// Failures during a run. Validation rules all of these out, so hitting one
/// means the engine was handed a graph that skipped validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("graph has no start node")]
    MissingStart,
    #[error("edge '{edge_id}' points at missing node '{target}'")]
    UnknownNode { edge_id: String, target: NodeId },
    #[error("branch node '{node_id}' has {options} options but {edges} outgoing edges")]
    BranchEdgeMismatch {
        node_id: NodeId,
        options: usize,
        edges: usize,
    },
    #[error("node '{node_id}' was reached twice in one run; the graph is cyclic")]
    CyclicGraph { node_id: NodeId },
    #[error("template node '{node_id}' uses unknown key '{key}'")]
    UnknownTemplateKey { node_id: NodeId, key: String },
    #[error("node '{node_id}' has no resolved pools")]
    MissingPools { node_id: NodeId },
}

/// An aborted run, with everything recorded before the failure.
#[derive(Debug, Clone, Error)]
#[error("generation aborted after {} step(s): {error}", .trace.steps.len())]
pub struct GenerationFailure {
    #[source]
    pub error: GenerationError,
    pub trace: GenerationTrace,
}

/// The path choice made at a branch node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchChoice {
    /// Index of the chosen option in the pool's declared order.
    pub option: usize,
    pub value: String,
    pub edge_id: String,
}

/// One visited node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceStep {
    pub node_id: NodeId,
    /// False when the optional gate excluded the node this run.
    pub included: bool,
    pub produced: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchChoice>,
}

/// Ordered record of the nodes visited in one run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GenerationTrace {
    pub steps: Vec<TraceStep>,
}

impl GenerationTrace {
    pub fn visited(&self) -> impl Iterator<Item = &NodeId> {
        self.steps.iter().map(|s| &s.node_id)
    }

    /// Every produced fragment in visit order, joined by `separator`.
    pub fn flatten(&self, separator: &str) -> String {
        self.steps
            .iter()
            .flat_map(|s| s.produced.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// A completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub trace: GenerationTrace,
    pub output: String,
}

/// Pools a node needs at generation time, resolved once.
#[derive(Debug, Clone)]
pub(crate) enum NodePools {
    None,
    Values(ResolvedPool),
    Template {
        templates: ResolvedPool,
        parsed: Vec<Template>,
        keys: FxHashMap<String, ResolvedPool>,
    },
}

/// A document plus everything derived from it for generation: resolved
/// pools, parsed templates, node index and option-ordered edges.
///
/// Read-only after construction, so concurrent runs can share it. The
/// document is either borrowed or owned, see [`CompiledGraph::compile_owned`].
#[derive(Debug, Clone)]
pub struct CompiledGraph<'d> {
    document: Cow<'d, GraphDocument>,
    index: FxHashMap<NodeId, usize>,
    /// Per node: indices into `document.edges`, in option order.
    successors: Vec<Vec<usize>>,
    pools: Vec<NodePools>,
    start: Option<usize>,
}

impl<'d> CompiledGraph<'d> {
    /// Validate `document` and prepare it for generation.
    pub fn compile(document: &'d GraphDocument) -> Result<Self, ValidationErrors> {
        let checked = check(document)?;
        Ok(Self::assemble(Cow::Borrowed(document), checked))
    }

    /// Like [`CompiledGraph::compile`], but takes the document along.
    pub fn compile_owned(document: GraphDocument) -> Result<CompiledGraph<'static>, ValidationErrors> {
        let checked = check(&document)?;
        Ok(CompiledGraph::assemble(Cow::Owned(document), checked))
    }

    /// Prepare without the structural checks. Only pool resolution can fail.
    pub(crate) fn build(document: &'d GraphDocument) -> Result<Self, ValidationErrors> {
        let mut errors = Vec::new();
        let pools: Vec<NodePools> = document
            .nodes
            .iter()
            .map(|node| resolve_pools(node, &mut errors))
            .collect();
        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }
        let outgoing = OutgoingEdges::new(document);
        let successors = document
            .nodes
            .iter()
            .map(|node| outgoing.of(&node.id).to_vec())
            .collect();
        Ok(Self::assemble(
            Cow::Borrowed(document),
            CheckedGraph { successors, pools },
        ))
    }

    fn assemble(document: Cow<'d, GraphDocument>, checked: CheckedGraph) -> Self {
        let mut index = FxHashMap::default();
        for (i, node) in document.nodes.iter().enumerate() {
            index.entry(node.id.clone()).or_insert(i);
        }
        let start = document.nodes.iter().position(Node::is_start);
        CompiledGraph {
            document,
            index,
            successors: checked.successors,
            pools: checked.pools,
            start,
        }
    }

    pub fn document(&self) -> &GraphDocument {
        &self.document
    }

    /// Walk the graph once, drawing every random value from `rng`.
    pub fn run<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        separator: &str,
    ) -> Result<Generation, GenerationFailure> {
        let mut trace = GenerationTrace::default();
        match self.walk(rng, &mut trace) {
            Ok(()) => {
                let output = trace.flatten(separator);
                debug!(
                    document = %self.document.name,
                    steps = trace.steps.len(),
                    "generation finished"
                );
                Ok(Generation { trace, output })
            }
            Err(error) => {
                debug!(document = %self.document.name, %error, "generation aborted");
                Err(GenerationFailure { error, trace })
            }
        }
    }

    fn walk<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
        trace: &mut GenerationTrace,
    ) -> Result<(), GenerationError> {
        let mut current = self.start.ok_or(GenerationError::MissingStart)?;
        let mut visited: FxHashSet<usize> = FxHashSet::default();

        loop {
            let node = &self.document.nodes[current];
            if !visited.insert(current) {
                return Err(GenerationError::CyclicGraph {
                    node_id: node.id.clone(),
                });
            }

            let (step, next_edge) = self.visit(current, rng)?;
            debug!(
                node = %step.node_id,
                included = step.included,
                fragments = step.produced.len(),
                "visited node"
            );
            trace.steps.push(step);

            let Some(edge_index) = next_edge else {
                return Ok(());
            };
            let edge = &self.document.edges[edge_index];
            current = *self
                .index
                .get(&edge.target)
                .ok_or_else(|| GenerationError::UnknownNode {
                    edge_id: edge.id.clone(),
                    target: edge.target.clone(),
                })?;
        }
    }

    /// Resolve one node. Returns its trace step and the edge to follow.
    fn visit<R: RandomSource + ?Sized>(
        &self,
        position: usize,
        rng: &mut R,
    ) -> Result<(TraceStep, Option<usize>), GenerationError> {
        let node = &self.document.nodes[position];
        let successors = &self.successors[position];
        let single_successor = successors.first().copied();
        let included = passes_gate(&node.optional, rng);

        let mut step = TraceStep {
            node_id: node.id.clone(),
            included,
            produced: Vec::new(),
            branch: None,
        };

        match (&node.kind, &self.pools[position]) {
            (NodeKind::Start, _) => Ok((step, single_successor)),
            (NodeKind::Simple { .. }, NodePools::Values(pool)) => {
                if included {
                    let selection = select(pool, &node.range, rng);
                    step.produced = selection.values(pool).map(str::to_string).collect();
                }
                Ok((step, single_successor))
            }
            (NodeKind::Branch { .. }, NodePools::Values(pool)) => {
                if !included {
                    // No value, no edge: the path ends here.
                    return Ok((step, None));
                }
                if pool.len() != successors.len() {
                    return Err(GenerationError::BranchEdgeMismatch {
                        node_id: node.id.clone(),
                        options: pool.len(),
                        edges: successors.len(),
                    });
                }
                let option = sample_one(pool, rng);
                let edge_index = successors[option];
                step.branch = Some(BranchChoice {
                    option,
                    value: pool.get(option).unwrap_or_default().to_string(),
                    edge_id: self.document.edges[edge_index].id.clone(),
                });
                Ok((step, Some(edge_index)))
            }
            (
                NodeKind::Template { .. },
                NodePools::Template {
                    templates,
                    parsed,
                    keys,
                },
            ) => {
                if included {
                    let selection = select(templates, &node.range, rng);
                    for &i in selection.indices() {
                        let text = parsed[i].interpolate(keys, rng).map_err(|e| match e {
                            TemplateError::UnknownKey(key) => GenerationError::UnknownTemplateKey {
                                node_id: node.id.clone(),
                                key,
                            },
                        })?;
                        step.produced.push(text);
                    }
                }
                Ok((step, single_successor))
            }
            (NodeKind::Simple { .. } | NodeKind::Branch { .. } | NodeKind::Template { .. }, _) => {
                Err(GenerationError::MissingPools {
                    node_id: node.id.clone(),
                })
            }
        }
    }
}

/// The top-level generator. Built via `GraphEngine::builder()`.
///
/// Each call to [`GraphEngine::generate`] seeds a fresh `StdRng` with
/// `seed + n`, where `n` counts the runs made so far, so a new engine with
/// the same seed and document replays the same outputs in the same order.
#[derive(Debug)]
pub struct GraphEngine<'d> {
    graph: CompiledGraph<'d>,
    seed: u64,
    separator: String,
    generation_count: u64,
}

/// Builder for constructing a `GraphEngine`.
#[derive(Debug, Clone)]
pub struct GraphEngineBuilder {
    seed: u64,
    separator: String,
}

impl<'d> GraphEngine<'d> {
    pub fn builder() -> GraphEngineBuilder {
        let defaults = GenerationConfig::default();
        GraphEngineBuilder {
            seed: defaults.seed,
            separator: defaults.separator,
        }
    }

    pub fn graph(&self) -> &CompiledGraph<'d> {
        &self.graph
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs made so far in the current seed sequence.
    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }

    /// Restart the seed sequence at `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.generation_count = 0;
    }

    /// Run once with the next seed in this engine's sequence.
    pub fn generate(&mut self) -> Result<Generation, GenerationFailure> {
        let seed = self.next_seed();
        self.generation_count += 1;
        self.generate_seeded(seed)
    }

    /// Run once with an explicit seed. Does not advance the sequence.
    pub fn generate_seeded(&self, seed: u64) -> Result<Generation, GenerationFailure> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.graph.run(&mut rng, &self.separator)
    }

    /// Run once with a caller-supplied random source.
    pub fn generate_with<R: RandomSource + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Generation, GenerationFailure> {
        self.graph.run(rng, &self.separator)
    }

    /// Generate `count` independent outputs. Equivalent to `count` calls
    /// of [`GraphEngine::generate`], but runs execute in parallel when the
    /// `parallel` feature is enabled. Results keep run order.
    pub fn generate_many(&mut self, count: usize) -> Vec<Result<Generation, GenerationFailure>> {
        let first = self.next_seed();
        self.generation_count += count as u64;
        let seeds: Vec<u64> = (0..count as u64).map(|i| first.wrapping_add(i)).collect();

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            seeds
                .into_par_iter()
                .map(|seed| self.generate_seeded(seed))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            seeds
                .into_iter()
                .map(|seed| self.generate_seeded(seed))
                .collect()
        }
    }

    fn next_seed(&self) -> u64 {
        self.seed.wrapping_add(self.generation_count)
    }
}

impl GraphEngineBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Take seed and separator from a loaded config.
    pub fn config(mut self, config: &GenerationConfig) -> Self {
        self.seed = config.seed;
        self.separator = config.separator.clone();
        self
    }

    /// Validate and compile `document`, then build the engine.
    pub fn build(self, document: &GraphDocument) -> Result<GraphEngine<'_>, ValidationErrors> {
        let graph = CompiledGraph::compile(document)?;
        Ok(self.with_graph(graph))
    }

    /// Build an engine that owns its document.
    pub fn build_owned(self, document: GraphDocument) -> Result<GraphEngine<'static>, ValidationErrors> {
        let graph = CompiledGraph::compile_owned(document)?;
        Ok(self.with_graph(graph))
    }

    pub(crate) fn with_graph<'d>(self, graph: CompiledGraph<'d>) -> GraphEngine<'d> {
        GraphEngine {
            graph,
            seed: self.seed,
            separator: self.separator,
            generation_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::random::ScriptedSource;
    use crate::schema::document::Edge;
    use crate::schema::node::{OptionalSpec, RangeSpec};
    use crate::schema::value_spec::ValueSpec;

    fn branch_doc() -> GraphDocument {
        GraphDocument::new("branch")
            .with_node(Node::start("s"))
            .with_node(Node::branch("b", ValueSpec::list(["left", "right"])))
            .with_node(Node::simple("l", ValueSpec::list(["went left"])))
            .with_node(Node::simple("r", ValueSpec::list(["went right"])))
            .with_edge(Edge::new("s-b", "s", "b"))
            .with_edge(Edge::new("b-l", "b", "l"))
            .with_edge(Edge::new("b-r", "b", "r"))
    }

    fn run_scripted(doc: &GraphDocument, values: &[f64]) -> Result<Generation, GenerationFailure> {
        let graph = CompiledGraph::compile(doc).unwrap();
        graph.run(&mut ScriptedSource::new(values.to_vec()), "\n")
    }

    #[test]
    fn linear_walk_collects_in_visit_order() {
        let doc = GraphDocument::new("linear")
            .with_node(Node::simple("b", ValueSpec::list(["second"])))
            .with_node(Node::start("s"))
            .with_node(Node::simple("a", ValueSpec::list(["first"])))
            .with_edge(Edge::new("e1", "s", "a"))
            .with_edge(Edge::new("e2", "a", "b"));
        let generation = run_scripted(&doc, &[0.0]).unwrap();
        assert_eq!(generation.output, "first\nsecond");
        let visited: Vec<&str> = generation.trace.visited().map(NodeId::as_str).collect();
        assert_eq!(visited, vec!["s", "a", "b"]);
    }

    #[test]
    fn branch_first_option_follows_first_edge() {
        let generation = run_scripted(&branch_doc(), &[0.0]).unwrap();
        let choice = generation.trace.steps[1].branch.clone().unwrap();
        assert_eq!(choice.option, 0);
        assert_eq!(choice.value, "left");
        assert_eq!(choice.edge_id, "b-l");
        assert_eq!(generation.output, "went left");

        let generation = run_scripted(&branch_doc(), &[0.9]).unwrap();
        assert_eq!(generation.output, "went right");
    }

    #[test]
    fn branch_ignores_range() {
        let mut doc = branch_doc();
        doc.nodes[1].range = RangeSpec::between(2, 2);
        let generation = run_scripted(&doc, &[0.0]).unwrap();
        assert_eq!(generation.trace.steps.len(), 3);
        assert!(generation.trace.steps[1].produced.is_empty());
    }

    #[test]
    fn branch_slots_override_document_order() {
        let doc = GraphDocument::new("slots")
            .with_node(Node::start("s"))
            .with_node(Node::branch("b", ValueSpec::list(["left", "right"])))
            .with_node(Node::simple("l", ValueSpec::list(["L"])))
            .with_node(Node::simple("r", ValueSpec::list(["R"])))
            .with_edge(Edge::new("s-b", "s", "b"))
            .with_edge(Edge::new("b-r", "b", "r").with_slot(1))
            .with_edge(Edge::new("b-l", "b", "l").with_slot(0));
        assert_eq!(run_scripted(&doc, &[0.0]).unwrap().output, "L");
    }

    #[test]
    fn unslotted_edge_fills_the_free_option() {
        let doc = GraphDocument::new("mixed")
            .with_node(Node::start("s"))
            .with_node(Node::branch("b", ValueSpec::list(["left", "right"])))
            .with_node(Node::simple("l", ValueSpec::list(["L"])))
            .with_node(Node::simple("r", ValueSpec::list(["R"])))
            .with_edge(Edge::new("s-b", "s", "b"))
            .with_edge(Edge::new("b-r", "b", "r").with_slot(1))
            .with_edge(Edge::new("b-l", "b", "l"));
        let generation = run_scripted(&doc, &[0.0]).unwrap();
        assert_eq!(generation.output, "L");
        assert_eq!(generation.trace.steps[1].branch.clone().unwrap().edge_id, "b-l");
        assert_eq!(run_scripted(&doc, &[0.9]).unwrap().output, "R");
    }

    #[test]
    fn gated_out_branch_terminates_path() {
        let mut doc = branch_doc();
        doc.nodes[1].optional = OptionalSpec::chance(0.2);
        let generation = run_scripted(&doc, &[0.5]).unwrap();
        assert_eq!(generation.trace.steps.len(), 2);
        assert!(!generation.trace.steps[1].included);
        assert!(generation.trace.steps[1].branch.is_none());
        assert_eq!(generation.output, "");
    }

    #[test]
    fn gated_out_simple_node_still_continues() {
        let doc = GraphDocument::new("gate")
            .with_node(Node::start("s"))
            .with_node(
                Node::simple("a", ValueSpec::list(["skipped"])).with_optional(OptionalSpec::chance(0.1)),
            )
            .with_node(Node::simple("b", ValueSpec::list(["kept"])))
            .with_edge(Edge::new("e1", "s", "a"))
            .with_edge(Edge::new("e2", "a", "b"));
        let generation = run_scripted(&doc, &[0.5]).unwrap();
        assert_eq!(generation.output, "kept");
        assert!(!generation.trace.steps[1].included);
        assert_eq!(generation.trace.steps.len(), 3);
    }

    #[test]
    fn gated_out_template_node_still_continues() {
        let doc = GraphDocument::new("gate")
            .with_node(Node::start("s"))
            .with_node(
                Node::template("t", ValueSpec::list(["${k}"]), [("k", ValueSpec::list(["skipped"]))])
                    .with_optional(OptionalSpec::chance(0.1)),
            )
            .with_node(Node::simple("b", ValueSpec::list(["kept"])))
            .with_edge(Edge::new("e1", "s", "t"))
            .with_edge(Edge::new("e2", "t", "b"));
        let generation = run_scripted(&doc, &[0.5]).unwrap();
        assert_eq!(generation.output, "kept");
        let visited: Vec<&str> = generation.trace.visited().map(NodeId::as_str).collect();
        assert_eq!(visited, vec!["s", "t", "b"]);
        assert!(!generation.trace.steps[1].included);
        assert!(generation.trace.steps[1].produced.is_empty());
    }

    #[test]
    fn template_node_interpolates_each_selected_template() {
        let doc = GraphDocument::new("tpl")
            .with_node(Node::start("s"))
            .with_node(
                Node::template(
                    "t",
                    ValueSpec::list(["${a} one", "${a} two"]),
                    [("a", ValueSpec::list(["x", "y"]))],
                )
                .with_range(RangeSpec::between(2, 2)),
            )
            .with_edge(Edge::new("e", "s", "t"));
        // count -> 2; pick template 1 then 0; key draws x, y
        let generation = run_scripted(&doc, &[0.0, 0.9, 0.0, 0.0, 0.9]).unwrap();
        assert_eq!(generation.trace.steps[1].produced, vec!["x two", "y one"]);
        assert_eq!(generation.output, "x two\ny one");
    }

    #[test]
    fn cycle_detected_at_runtime() {
        let doc = GraphDocument::new("loop")
            .with_node(Node::start("s"))
            .with_node(Node::simple("a", ValueSpec::list(["a"])))
            .with_node(Node::simple("b", ValueSpec::list(["b"])))
            .with_edge(Edge::new("e1", "s", "a"))
            .with_edge(Edge::new("e2", "a", "b"))
            .with_edge(Edge::new("e3", "b", "a"));
        assert!(CompiledGraph::compile(&doc).is_err());

        let graph = CompiledGraph::build(&doc).unwrap();
        let failure = graph.run(&mut ScriptedSource::new([0.0]), "\n").unwrap_err();
        assert_eq!(
            failure.error,
            GenerationError::CyclicGraph {
                node_id: NodeId::from("a")
            }
        );
        assert_eq!(failure.trace.steps.len(), 3);
        assert_eq!(failure.trace.flatten("\n"), "a\nb");
    }

    #[test]
    fn branch_mismatch_detected_at_runtime() {
        let doc = branch_doc().with_edge(Edge::new("b-extra", "b", "l"));
        let graph = CompiledGraph::build(&doc).unwrap();
        let failure = graph.run(&mut ScriptedSource::new([0.0]), "\n").unwrap_err();
        assert_eq!(
            failure.error,
            GenerationError::BranchEdgeMismatch {
                node_id: NodeId::from("b"),
                options: 2,
                edges: 3,
            }
        );
        assert_eq!(failure.trace.steps.len(), 1);
    }

    #[test]
    fn unknown_key_detected_at_runtime() {
        let doc = GraphDocument::new("tpl")
            .with_node(Node::start("s"))
            .with_node(Node::template(
                "t",
                ValueSpec::list(["${nope}"]),
                Vec::<(String, ValueSpec)>::new(),
            ))
            .with_edge(Edge::new("e", "s", "t"));
        let graph = CompiledGraph::build(&doc).unwrap();
        let failure = graph.run(&mut ScriptedSource::new([0.0]), "\n").unwrap_err();
        assert_eq!(
            failure.error,
            GenerationError::UnknownTemplateKey {
                node_id: NodeId::from("t"),
                key: "nope".to_string(),
            }
        );
        assert!(failure.to_string().contains("after 1 step(s)"));
    }

    #[test]
    fn missing_start_at_runtime() {
        let doc = GraphDocument::new("headless").with_node(Node::simple("a", ValueSpec::list(["a"])));
        let graph = CompiledGraph::build(&doc).unwrap();
        let failure = graph.run(&mut ScriptedSource::new([0.0]), "\n").unwrap_err();
        assert_eq!(failure.error, GenerationError::MissingStart);
        assert!(failure.trace.steps.is_empty());
    }

    #[test]
    fn dangling_edge_at_runtime() {
        let doc = GraphDocument::new("dangling")
            .with_node(Node::start("s"))
            .with_edge(Edge::new("e", "s", "ghost"));
        let graph = CompiledGraph::build(&doc).unwrap();
        let failure = graph.run(&mut ScriptedSource::new([0.0]), "\n").unwrap_err();
        assert!(matches!(failure.error, GenerationError::UnknownNode { .. }));
    }

    #[test]
    fn pools_out_of_step_with_kind_are_an_error() {
        let doc = branch_doc();
        let mut graph = CompiledGraph::compile(&doc).unwrap();
        graph.pools[1] = NodePools::None;
        let failure = graph.run(&mut ScriptedSource::new([0.0]), "\n").unwrap_err();
        assert_eq!(
            failure.error,
            GenerationError::MissingPools {
                node_id: NodeId::from("b")
            }
        );
        assert_eq!(failure.trace.steps.len(), 1);
    }

    #[test]
    fn long_chain_compiles_and_runs() {
        const LEN: usize = 50_000;
        let mut doc = GraphDocument::new("chain").with_node(Node::start("n0"));
        for i in 1..LEN {
            doc.nodes.push(Node::simple(&format!("n{}", i), ValueSpec::list(["x"])));
            doc.edges.push(Edge::new(
                &format!("e{}", i),
                &format!("n{}", i - 1),
                &format!("n{}", i),
            ));
        }
        let graph = CompiledGraph::compile(&doc).unwrap();
        let generation = graph.run(&mut ScriptedSource::new([0.0]), "").unwrap();
        assert_eq!(generation.trace.steps.len(), LEN);
        assert_eq!(generation.output.len(), LEN - 1);
    }

    /// Counts warn-level events seen while installed.
    #[derive(Clone, Default)]
    struct WarnCounter(std::sync::Arc<std::sync::atomic::AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn pools_resolve_once_per_build() {
        use tracing_subscriber::layer::SubscriberExt;

        let doc = GraphDocument::new("zero")
            .with_node(Node::start("s"))
            .with_node(Node::simple(
                "a",
                ValueSpec::weighted([("often", 1.0), ("never", 0.0)]),
            ))
            .with_edge(Edge::new("e", "s", "a"));
        let counter = WarnCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        tracing::subscriber::with_default(subscriber, || {
            let mut engine = GraphEngine::builder().build(&doc).unwrap();
            assert_eq!(engine.generate().unwrap().output, "often");
        });
        assert_eq!(counter.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn build_rejects_unresolvable_pools() {
        let doc = GraphDocument::new("bad")
            .with_node(Node::start("s"))
            .with_node(Node::simple("a", ValueSpec::list(Vec::<String>::new())));
        let errors = CompiledGraph::build(&doc).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn engine_sequence_is_reproducible() {
        let doc = GraphDocument::new("dice")
            .with_node(Node::start("s"))
            .with_node(Node::simple("d", ValueSpec::list(["1", "2", "3", "4", "5", "6"])))
            .with_edge(Edge::new("e", "s", "d"));

        let mut first = GraphEngine::builder().seed(11).build(&doc).unwrap();
        let mut second = GraphEngine::builder().seed(11).build(&doc).unwrap();
        for _ in 0..10 {
            assert_eq!(
                first.generate().unwrap().output,
                second.generate().unwrap().output
            );
        }
    }

    #[test]
    fn generate_many_matches_sequential_runs() {
        let doc = GraphDocument::new("dice")
            .with_node(Node::start("s"))
            .with_node(Node::simple("d", ValueSpec::list(["1", "2", "3", "4", "5", "6"])))
            .with_edge(Edge::new("e", "s", "d"));

        let mut batch = GraphEngine::builder().seed(5).build(&doc).unwrap();
        let mut sequential = GraphEngine::builder().seed(5).build(&doc).unwrap();
        let outputs: Vec<String> = batch
            .generate_many(8)
            .into_iter()
            .map(|r| r.unwrap().output)
            .collect();
        let expected: Vec<String> = (0..8).map(|_| sequential.generate().unwrap().output).collect();
        assert_eq!(outputs, expected);
        assert_eq!(
            batch.generate().unwrap().output,
            sequential.generate().unwrap().output
        );
    }

    #[test]
    fn owned_engine_matches_borrowed_one() {
        let doc = branch_doc();
        let mut borrowed = GraphEngine::builder().seed(21).build(&doc).unwrap();
        let mut owned = GraphEngine::builder().seed(21).build_owned(doc.clone()).unwrap();
        assert_eq!(owned.graph().document(), &doc);
        for _ in 0..6 {
            assert_eq!(borrowed.generate().unwrap(), owned.generate().unwrap());
        }
        assert!(GraphEngine::builder()
            .build_owned(GraphDocument::new("empty"))
            .is_err());
    }

    #[test]
    fn reseed_restarts_the_sequence() {
        let doc = branch_doc();
        let mut engine = GraphEngine::builder().seed(1).build(&doc).unwrap();
        engine.generate().unwrap();
        engine.generate().unwrap();
        assert_eq!(engine.generation_count(), 2);
        engine.reseed(40);
        assert_eq!(engine.seed(), 40);
        assert_eq!(engine.generation_count(), 0);
        let first = engine.generate().unwrap();
        assert_eq!(first, engine.generate_seeded(40).unwrap());
        assert_eq!(engine.generate().unwrap(), engine.generate_seeded(41).unwrap());
    }

    #[test]
    fn builder_takes_config() {
        let config = GenerationConfig {
            seed: 99,
            runs: 3,
            separator: " | ".to_string(),
        };
        let doc = GraphDocument::new("pair")
            .with_node(Node::start("s"))
            .with_node(Node::simple("a", ValueSpec::list(["x"])).with_range(RangeSpec::between(1, 1)))
            .with_node(Node::simple("b", ValueSpec::list(["y"])))
            .with_edge(Edge::new("e1", "s", "a"))
            .with_edge(Edge::new("e2", "a", "b"));
        let mut engine = GraphEngine::builder().config(&config).build(&doc).unwrap();
        assert_eq!(engine.seed(), 99);
        assert_eq!(engine.generate().unwrap().output, "x | y");
    }
}
