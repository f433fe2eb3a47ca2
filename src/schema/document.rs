/// Graph documents — the persisted node graph handed over by the editor.
use ron::extensions::Extensions;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use super::node::{Node, NodeId};

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("unsupported document format '{0}' (expected .json or .ron)")]
    UnsupportedFormat(String),
}

/// Document ids are timestamps in editor exports, but hand-written
/// documents often use plain names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Number(u64),
    Text(String),
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::Number(0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A directed link from one node's output slot to the next node to visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    /// Option index on the source node; only meaningful for branch nodes.
    #[serde(
        default,
        deserialize_with = "deserialize_slot",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<usize>,
}

/// Handles arrive as numbers from hand-written documents and as strings
/// from editor exports. Named handles carry no option index and read as none.
fn deserialize_slot<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Slot {
        Index(usize),
        Text(String),
    }

    match Option::<Slot>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Slot::Index(i)) => Ok(Some(i)),
        Some(Slot::Text(text)) => match text.trim().parse() {
            Ok(i) => Ok(Some(i)),
            Err(_) => {
                debug!(handle = %text, "ignoring non-numeric source handle");
                Ok(None)
            }
        },
    }
}

impl Edge {
    pub fn new(id: &str, source: &str, target: &str) -> Self {
        Self {
            id: id.to_string(),
            source: NodeId::from(source),
            target: NodeId::from(target),
            source_handle: None,
        }
    }

    pub fn with_slot(mut self, slot: usize) -> Self {
        self.source_handle = Some(slot);
        self
    }
}

/// The full graph: the sole owner of its nodes and edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub id: DocumentId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphDocument {
    pub fn new(name: &str) -> Self {
        Self {
            id: DocumentId::Text(name.to_string()),
            name: name.to_string(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Load a document from a `.json` or `.ron` file.
    pub fn load(path: &Path) -> Result<GraphDocument, DocumentError> {
        let contents = std::fs::read_to_string(path)?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => Self::parse_json(&contents),
            Some("ron") => Self::parse_ron(&contents),
            other => Err(DocumentError::UnsupportedFormat(
                other.unwrap_or("").to_string(),
            )),
        }
    }

    pub fn parse_json(input: &str) -> Result<GraphDocument, DocumentError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Optional payload fields may be written bare, without `Some(..)`.
    pub fn parse_ron(input: &str) -> Result<GraphDocument, DocumentError> {
        Ok(ron_options().from_str(input)?)
    }

    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn start_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_start())
    }

    /// Outgoing edges of `id`, in document order.
    pub fn outgoing<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.source == id)
    }

    /// Outgoing edges of `id` with their index in `edges`, in option order.
    /// See [`OutgoingEdges`] for how slots are placed.
    pub fn ordered_outgoing(&self, id: &NodeId) -> Vec<(usize, &Edge)> {
        let mut indices: Vec<usize> = self
            .edges
            .iter()
            .enumerate()
            .filter(|(_, e)| &e.source == id)
            .map(|(i, _)| i)
            .collect();
        arrange_by_slot(&self.edges, &mut indices);
        indices.into_iter().map(|i| (i, &self.edges[i])).collect()
    }
}

/// RON settings shared by every RON input of the crate.
pub(crate) fn ron_options() -> ron::Options {
    ron::Options::default().with_default_extension(Extensions::IMPLICIT_SOME)
}

/// Outgoing edge indices of every node, in option order, built with a
/// single pass over the edge list.
///
/// An edge whose `sourceHandle` names a free slot below the edge count sits
/// at that slot. The remaining edges fill the free slots in document order.
#[derive(Debug, Clone, Default)]
pub struct OutgoingEdges<'d> {
    by_source: FxHashMap<&'d NodeId, Vec<usize>>,
}

impl<'d> OutgoingEdges<'d> {
    pub fn new(document: &'d GraphDocument) -> Self {
        let mut by_source: FxHashMap<&'d NodeId, Vec<usize>> = FxHashMap::default();
        for (i, edge) in document.edges.iter().enumerate() {
            by_source.entry(&edge.source).or_default().push(i);
        }
        for indices in by_source.values_mut() {
            arrange_by_slot(&document.edges, indices);
        }
        Self { by_source }
    }

    /// Indices into the document's `edges` leaving `id`.
    pub fn of(&self, id: &NodeId) -> &[usize] {
        self.by_source.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn arrange_by_slot(edges: &[Edge], indices: &mut Vec<usize>) {
    if indices.iter().all(|&i| edges[i].source_handle.is_none()) {
        return;
    }
    let mut placed: Vec<Option<usize>> = vec![None; indices.len()];
    let mut rest = Vec::new();
    for &i in indices.iter() {
        match edges[i].source_handle {
            Some(slot) if slot < placed.len() && placed[slot].is_none() => placed[slot] = Some(i),
            _ => rest.push(i),
        }
    }
    let mut rest = rest.into_iter();
    *indices = placed
        .into_iter()
        .filter_map(|slot| slot.or_else(|| rest.next()))
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::node::NodeKind;
    use crate::schema::value_spec::ValueSpec;

    #[test]
    fn parse_editor_export() {
        let json = r#"{
            "id": 1700000000000,
            "name": "default template",
            "nodes": [
                { "id": "1", "type": "StartNode", "position": { "x": 0, "y": 0 }, "data": {} },
                { "id": "2", "type": "SimpleNode", "data": {
                    "name": "colour",
                    "values": { "type": "default", "data": ["red", "green"] }
                } }
            ],
            "edges": [ { "id": "reactflow__edge-1-2", "source": "1", "target": "2" } ],
            "pages": [],
            "functions": [],
            "globalVariables": []
        }"#;
        let doc = GraphDocument::parse_json(json).unwrap();
        assert_eq!(doc.id, DocumentId::Number(1_700_000_000_000));
        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(doc.edges[0].source_handle, None);
        assert_eq!(doc.start_nodes().count(), 1);
    }

    #[test]
    fn parse_ron_document() {
        let input = r#"(
            id: "inline",
            name: "inline",
            nodes: [
                (id: "s", type: StartNode),
                (id: "a", type: SimpleNode, data: (
                    name: "a",
                    values: (type: default, data: ["one"]),
                )),
            ],
            edges: [(id: "e", source: "s", target: "a")],
        )"#;
        let doc = GraphDocument::parse_ron(input).unwrap();
        assert_eq!(doc.id, DocumentId::Text("inline".to_string()));
        assert_eq!(doc.nodes[1].name, "a");
        assert!(matches!(&doc.nodes[1].kind, NodeKind::Simple { .. }));
    }

    #[test]
    fn parse_ron_accepts_explicit_some() {
        let input = r#"(
            nodes: [
                (id: "t", type: TemplateNode, data: (
                    name: Some("t"),
                    templates: Some((type: default, data: ["${k}"])),
                    keys: Some({"k": (type: default, data: ["v"])}),
                )),
            ],
            edges: [],
        )"#;
        let doc = GraphDocument::parse_ron(input).unwrap();
        match &doc.nodes[0].kind {
            NodeKind::Template { keys, .. } => assert!(keys.contains_key("k")),
            other => panic!("expected a template node, got {}", other.type_name()),
        }
    }

    #[test]
    fn source_handle_accepts_numbers_and_strings() {
        let edges: Vec<Edge> = serde_json::from_str(
            r#"[
                { "id": "a", "source": "b", "target": "x", "sourceHandle": 1 },
                { "id": "b", "source": "b", "target": "y", "sourceHandle": "0" },
                { "id": "c", "source": "b", "target": "z", "sourceHandle": null }
            ]"#,
        )
        .unwrap();
        assert_eq!(edges[0].source_handle, Some(1));
        assert_eq!(edges[1].source_handle, Some(0));
        assert_eq!(edges[2].source_handle, None);
        let named: Edge = serde_json::from_str(
            r#"{ "source": "b", "target": "x", "sourceHandle": "left" }"#,
        )
        .unwrap();
        assert_eq!(named.source_handle, None);
    }

    #[test]
    fn outgoing_preserves_document_order() {
        let doc = GraphDocument::new("order")
            .with_node(Node::branch("b", ValueSpec::list(["x", "y"])))
            .with_edge(Edge::new("e2", "b", "y"))
            .with_edge(Edge::new("e1", "b", "x"))
            .with_edge(Edge::new("e3", "other", "x"));
        let id = NodeId::from("b");
        let ids: Vec<&str> = doc.outgoing(&id).map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e2", "e1"]);
    }

    #[test]
    fn ordered_outgoing_places_slotted_edges_first() {
        let doc = GraphDocument::new("slots")
            .with_edge(Edge::new("second", "b", "y").with_slot(1))
            .with_edge(Edge::new("first", "b", "x").with_slot(0));
        let id = NodeId::from("b");
        let ids: Vec<&str> = doc
            .ordered_outgoing(&id)
            .iter()
            .map(|(_, e)| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);

        let partial = GraphDocument::new("partial")
            .with_edge(Edge::new("second", "b", "y").with_slot(1))
            .with_edge(Edge::new("first", "b", "x"));
        let indices: Vec<usize> = partial.ordered_outgoing(&id).iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 0]);

        let unslotted = GraphDocument::new("plain")
            .with_edge(Edge::new("second", "b", "y"))
            .with_edge(Edge::new("first", "b", "x"));
        let indices: Vec<usize> = unslotted.ordered_outgoing(&id).iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn out_of_range_and_duplicate_slots_fill_gaps_in_order() {
        let doc = GraphDocument::new("gaps")
            .with_edge(Edge::new("far", "b", "x").with_slot(7))
            .with_edge(Edge::new("one", "b", "y").with_slot(1))
            .with_edge(Edge::new("again", "b", "z").with_slot(1));
        let outgoing = OutgoingEdges::new(&doc);
        assert_eq!(outgoing.of(&NodeId::from("b")), &[0, 1, 2]);

        let doc = GraphDocument::new("gaps")
            .with_edge(Edge::new("a", "b", "x"))
            .with_edge(Edge::new("c", "b", "z").with_slot(2))
            .with_edge(Edge::new("b", "b", "y"));
        let outgoing = OutgoingEdges::new(&doc);
        assert_eq!(outgoing.of(&NodeId::from("b")), &[0, 2, 1]);
        assert!(outgoing.of(&NodeId::from("missing")).is_empty());
    }

    #[test]
    fn outgoing_index_matches_per_node_scan() {
        let doc = GraphDocument::new("index")
            .with_edge(Edge::new("e1", "a", "b"))
            .with_edge(Edge::new("e2", "b", "c").with_slot(1))
            .with_edge(Edge::new("e3", "a", "c"))
            .with_edge(Edge::new("e4", "b", "d"));
        let outgoing = OutgoingEdges::new(&doc);
        for id in ["a", "b", "c"] {
            let id = NodeId::from(id);
            let scanned: Vec<usize> = doc.ordered_outgoing(&id).iter().map(|(i, _)| *i).collect();
            assert_eq!(outgoing.of(&id), scanned.as_slice());
        }
    }

    #[test]
    fn unsupported_extension() {
        let err = GraphDocument::load(Path::new("Cargo.toml")).unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(ext) if ext == "toml"));
    }

    #[test]
    fn json_round_trip() {
        let doc = GraphDocument::new("rt")
            .with_node(Node::start("s"))
            .with_node(Node::simple("a", ValueSpec::list(["x"])))
            .with_edge(Edge::new("e", "s", "a"));
        let json = doc.to_json().unwrap();
        assert_eq!(GraphDocument::parse_json(&json).unwrap(), doc);
    }
}
