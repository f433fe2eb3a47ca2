/// Graph validation — collects every structural problem in a document so
/// the editor can report them all at once.
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;
use tracing::debug;

use crate::core::engine::NodePools;
use crate::core::pool::{PoolError, ResolvedPool};
use crate::core::template::Template;
use crate::schema::document::{GraphDocument, OutgoingEdges};
use crate::schema::node::{Node, NodeId, NodeKind};
use crate::schema::value_spec::ValueSpec;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("expected exactly one start node, found {count}")]
    StartCount { count: usize },
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(NodeId),
    #[error("edge '{edge_id}' targets missing node '{target}'")]
    DanglingEdge { edge_id: String, target: NodeId },
    #[error("edge '{edge_id}' leaves missing node '{from}'")]
    UnknownEdgeSource { edge_id: String, from: NodeId },
    #[error("node '{node_id}' has an invalid {field} pool ({raw:?}): {source}")]
    InvalidPool {
        node_id: NodeId,
        field: String,
        raw: String,
        #[source]
        source: PoolError,
    },
    #[error("branch node '{node_id}' has {options} options but {edges} outgoing edges")]
    BranchEdgeMismatch {
        node_id: NodeId,
        options: usize,
        edges: usize,
    },
    #[error("branch node '{node_id}': edge '{edge_id}' uses slot {slot}, which is out of range or taken")]
    InvalidBranchSlot {
        node_id: NodeId,
        edge_id: String,
        slot: usize,
    },
    #[error("node '{node_id}' has {count} outgoing edges, only branch nodes may fork")]
    AmbiguousSuccessor { node_id: NodeId, count: usize },
    #[error("template node '{node_id}' uses unknown key '{key}'")]
    UnknownTemplateKey { node_id: NodeId, key: String },
    #[error("node '{node_id}' has inclusion chance {chance}, expected a value in [0, 1]")]
    InvalidChance { node_id: NodeId, chance: f64 },
    #[error("node '{node_id}' has range [{low}, {high}], expected 1 <= low <= high")]
    InvalidRange { node_id: NodeId, low: u32, high: u32 },
    #[error("cycle reachable from start: {}", format_path(.path))]
    Cycle { path: Vec<NodeId> },
}

/// Every violation found in one document.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", format_errors(.0))]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn format_path(path: &[NodeId]) -> String {
    path.iter()
        .map(NodeId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_errors(errors: &[ValidationError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
    format!("{} validation error(s):\n{}", errors.len(), lines.join("\n"))
}

/// Validate a document, returning every violation found.
///
/// Checks run independently; a missing start node only skips the cycle
/// check, which is meaningless without an entry point.
pub fn validate(doc: &GraphDocument) -> Result<(), ValidationErrors> {
    check(doc).map(|_| ())
}

/// What a successful check already worked out, handed on to the engine so
/// nothing is resolved twice.
#[derive(Debug)]
pub(crate) struct CheckedGraph {
    /// Per node: indices into `edges`, in option order.
    pub(crate) successors: Vec<Vec<usize>>,
    pub(crate) pools: Vec<NodePools>,
}

pub(crate) fn check(doc: &GraphDocument) -> Result<CheckedGraph, ValidationErrors> {
    let mut errors = Vec::new();

    let mut ids: FxHashSet<&NodeId> = FxHashSet::default();
    for node in &doc.nodes {
        if !ids.insert(&node.id) {
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let start_count = doc.start_nodes().count();
    if start_count != 1 {
        errors.push(ValidationError::StartCount { count: start_count });
    }

    for edge in &doc.edges {
        if !ids.contains(&edge.source) {
            errors.push(ValidationError::UnknownEdgeSource {
                edge_id: edge.id.clone(),
                from: edge.source.clone(),
            });
        }
        if !ids.contains(&edge.target) {
            errors.push(ValidationError::DanglingEdge {
                edge_id: edge.id.clone(),
                target: edge.target.clone(),
            });
        }
    }

    let outgoing = OutgoingEdges::new(doc);
    let pools: Vec<NodePools> = doc
        .nodes
        .iter()
        .map(|node| check_node(doc, node, outgoing.of(&node.id), &mut errors))
        .collect();

    if start_count > 0 {
        check_cycles(doc, &ids, &outgoing, &mut errors);
    }

    debug!(
        document = %doc.name,
        nodes = doc.nodes.len(),
        edges = doc.edges.len(),
        errors = errors.len(),
        "validated document"
    );

    if !errors.is_empty() {
        return Err(ValidationErrors(errors));
    }
    let successors = doc
        .nodes
        .iter()
        .map(|node| outgoing.of(&node.id).to_vec())
        .collect();
    Ok(CheckedGraph { successors, pools })
}

fn check_node(
    doc: &GraphDocument,
    node: &Node,
    outgoing: &[usize],
    errors: &mut Vec<ValidationError>,
) -> NodePools {
    let optional = &node.optional;
    if optional.is_optional && !(0.0..=1.0).contains(&optional.value) {
        errors.push(ValidationError::InvalidChance {
            node_id: node.id.clone(),
            chance: optional.value,
        });
    }
    let (low, high) = node.range.value;
    if node.range.is_range && (low < 1 || low > high) {
        errors.push(ValidationError::InvalidRange {
            node_id: node.id.clone(),
            low,
            high,
        });
    }

    match &node.kind {
        NodeKind::Start => {
            check_single_successor(node, outgoing.len(), errors);
            NodePools::None
        }
        NodeKind::Simple { .. } => {
            check_single_successor(node, outgoing.len(), errors);
            resolve_pools(node, errors)
        }
        NodeKind::Branch { .. } => {
            let pools = resolve_pools(node, errors);
            let NodePools::Values(pool) = &pools else {
                return pools;
            };
            if pool.len() != outgoing.len() {
                errors.push(ValidationError::BranchEdgeMismatch {
                    node_id: node.id.clone(),
                    options: pool.len(),
                    edges: outgoing.len(),
                });
            }
            // Report the later duplicate, whatever slot order placed first.
            let mut in_document_order = outgoing.to_vec();
            in_document_order.sort_unstable();
            let mut taken = FxHashSet::default();
            for edge in in_document_order.into_iter().map(|i| &doc.edges[i]) {
                if let Some(slot) = edge.source_handle {
                    if slot >= pool.len() || !taken.insert(slot) {
                        errors.push(ValidationError::InvalidBranchSlot {
                            node_id: node.id.clone(),
                            edge_id: edge.id.clone(),
                            slot,
                        });
                    }
                }
            }
            pools
        }
        NodeKind::Template { keys, .. } => {
            check_single_successor(node, outgoing.len(), errors);
            let pools = resolve_pools(node, errors);
            if let NodePools::Template { parsed, .. } = &pools {
                let mut reported = FxHashSet::default();
                for key in parsed.iter().flat_map(|t| t.keys()) {
                    if !keys.contains_key(key) && reported.insert(key.to_string()) {
                        errors.push(ValidationError::UnknownTemplateKey {
                            node_id: node.id.clone(),
                            key: key.to_string(),
                        });
                    }
                }
            }
            pools
        }
    }
}

fn check_single_successor(node: &Node, count: usize, errors: &mut Vec<ValidationError>) {
    if count > 1 {
        errors.push(ValidationError::AmbiguousSuccessor {
            node_id: node.id.clone(),
            count,
        });
    }
}

/// Resolve every pool of `node`, pushing one error per pool that fails.
///
/// Template keys resolve in name order before the templates themselves.
/// A template node whose templates fail yields no pools at all.
pub(crate) fn resolve_pools(node: &Node, errors: &mut Vec<ValidationError>) -> NodePools {
    match &node.kind {
        NodeKind::Start => NodePools::None,
        NodeKind::Simple { values } | NodeKind::Branch { values } => {
            match resolve_field(node, "values", values, errors) {
                Some(pool) => NodePools::Values(pool),
                None => NodePools::None,
            }
        }
        NodeKind::Template { templates, keys } => {
            let mut names: Vec<&String> = keys.keys().collect();
            names.sort();
            let mut key_pools = FxHashMap::default();
            for name in names {
                if let Some(pool) = resolve_field(node, &format!("keys.{}", name), &keys[name], errors) {
                    key_pools.insert(name.clone(), pool);
                }
            }
            let Some(templates) = resolve_field(node, "templates", templates, errors) else {
                return NodePools::None;
            };
            let parsed = templates.entries().iter().map(|t| Template::parse(t)).collect();
            NodePools::Template {
                templates,
                parsed,
                keys: key_pools,
            }
        }
    }
}

fn resolve_field(
    node: &Node,
    field: &str,
    spec: &ValueSpec,
    errors: &mut Vec<ValidationError>,
) -> Option<ResolvedPool> {
    match ResolvedPool::resolve(spec) {
        Ok(pool) => Some(pool),
        Err(source) => {
            errors.push(ValidationError::InvalidPool {
                node_id: node.id.clone(),
                field: field.to_string(),
                raw: spec.to_raw_text(),
                source,
            });
            None
        }
    }
}

/// Depth-first search from every start node; a back edge closes a cycle.
///
/// Runs on an explicit stack of `(node, next outgoing edge)` frames, so
/// long chains cannot exhaust the call stack.
fn check_cycles<'d>(
    doc: &'d GraphDocument,
    ids: &FxHashSet<&'d NodeId>,
    outgoing: &OutgoingEdges<'d>,
    errors: &mut Vec<ValidationError>,
) {
    // 0 = unvisited, 1 = on the current path, 2 = finished
    let mut state: FxHashMap<&'d NodeId, u8> = FxHashMap::default();
    let mut path: Vec<(&'d NodeId, usize)> = Vec::new();

    for start in doc.start_nodes() {
        if state.get(&start.id).copied().unwrap_or(0) != 0 {
            continue;
        }
        state.insert(&start.id, 1);
        path.push((&start.id, 0));

        while let Some(top) = path.len().checked_sub(1) {
            let (node, cursor) = path[top];
            let edges = outgoing.of(node);
            if cursor == edges.len() {
                state.insert(node, 2);
                path.pop();
                continue;
            }
            path[top].1 += 1;

            let next = &doc.edges[edges[cursor]].target;
            if !ids.contains(next) {
                continue;
            }
            match state.get(next).copied().unwrap_or(0) {
                0 => {
                    state.insert(next, 1);
                    path.push((next, 0));
                }
                1 => {
                    if let Some(pos) = path.iter().position(|(n, _)| *n == next) {
                        let mut cycle: Vec<NodeId> =
                            path[pos..].iter().map(|(n, _)| (*n).clone()).collect();
                        cycle.push(next.clone());
                        errors.push(ValidationError::Cycle { path: cycle });
                    }
                }
                _ => {}
            }
        }
    }
}
