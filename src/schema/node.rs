use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::value_spec::ValueSpec;

/// Newtype wrapper for node ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Probabilistic inclusion of a node's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionalSpec {
    pub is_optional: bool,
    /// Chance in `[0, 1]` that the node contributes when optional.
    pub value: f64,
}

impl Default for OptionalSpec {
    fn default() -> Self {
        Self {
            is_optional: false,
            value: 0.5,
        }
    }
}

impl OptionalSpec {
    pub fn chance(value: f64) -> Self {
        Self {
            is_optional: true,
            value,
        }
    }
}

/// Ranged multi-selection: draw between `low` and `high` distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RangeSpec {
    pub is_range: bool,
    /// `(low, high)`, with `1 <= low <= high` for a well-formed range.
    pub value: (u32, u32),
}

impl Default for RangeSpec {
    fn default() -> Self {
        Self {
            is_range: false,
            value: (1, 2),
        }
    }
}

impl RangeSpec {
    pub fn between(low: u32, high: u32) -> Self {
        Self {
            is_range: true,
            value: (low, high),
        }
    }
}

/// Per-kind payload of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Start,
    Simple {
        values: ValueSpec,
    },
    /// The k-th resolved value selects the k-th outgoing edge.
    Branch {
        values: ValueSpec,
    },
    Template {
        templates: ValueSpec,
        keys: FxHashMap<String, ValueSpec>,
    },
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Start => "StartNode",
            Self::Simple { .. } => "SimpleNode",
            Self::Branch { .. } => "BranchNode",
            Self::Template { .. } => "TemplateNode",
        }
    }
}

/// A unit in the content graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub optional: OptionalSpec,
    pub range: RangeSpec,
    pub kind: NodeKind,
}

impl Node {
    pub fn start(id: &str) -> Self {
        Self::new(id, NodeKind::Start)
    }

    pub fn simple(id: &str, values: ValueSpec) -> Self {
        Self::new(id, NodeKind::Simple { values })
    }

    pub fn branch(id: &str, values: ValueSpec) -> Self {
        Self::new(id, NodeKind::Branch { values })
    }

    pub fn template<I, K>(id: &str, templates: ValueSpec, keys: I) -> Self
    where
        I: IntoIterator<Item = (K, ValueSpec)>,
        K: Into<String>,
    {
        Self::new(
            id,
            NodeKind::Template {
                templates,
                keys: keys.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            },
        )
    }

    fn new(id: &str, kind: NodeKind) -> Self {
        Self {
            id: NodeId::from(id),
            name: kind.type_name().to_string(),
            optional: OptionalSpec::default(),
            range: RangeSpec::default(),
            kind,
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_optional(mut self, optional: OptionalSpec) -> Self {
        self.optional = optional;
        self
    }

    pub fn with_range(mut self, range: RangeSpec) -> Self {
        self.range = range;
        self
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start)
    }
}

// Serialized shape used by the editor export: `{ id, type, data: {...} }`.
// The payload fields live side by side in `data`, so conversion goes through
// these intermediate structs.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum RawNodeType {
    StartNode,
    SimpleNode,
    BranchNode,
    TemplateNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: RawNodeType,
    #[serde(default)]
    data: RawNodeData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawNodeData {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    optional: OptionalSpec,
    #[serde(default)]
    range: RangeSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    templates: Option<ValueSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    keys: Option<FxHashMap<String, ValueSpec>>,
}

/// A node record whose payload does not match its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNode {
    pub id: NodeId,
    pub reason: String,
}

impl fmt::Display for InvalidNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node '{}': {}", self.id, self.reason)
    }
}

impl TryFrom<RawNode> for Node {
    type Error = InvalidNode;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let missing = |field: &str| InvalidNode {
            id: raw.id.clone(),
            reason: format!("{:?} is missing '{}'", raw.node_type, field),
        };
        let data = raw.data;
        let kind = match raw.node_type {
            RawNodeType::StartNode => NodeKind::Start,
            RawNodeType::SimpleNode => NodeKind::Simple {
                values: data.values.ok_or_else(|| missing("values"))?,
            },
            RawNodeType::BranchNode => NodeKind::Branch {
                values: data.values.ok_or_else(|| missing("values"))?,
            },
            RawNodeType::TemplateNode => NodeKind::Template {
                templates: data.templates.ok_or_else(|| missing("templates"))?,
                keys: data.keys.unwrap_or_default(),
            },
        };
        Ok(Node {
            name: data.name.unwrap_or_else(|| kind.type_name().to_string()),
            id: raw.id,
            optional: data.optional,
            range: data.range,
            kind,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        let mut data = RawNodeData {
            name: Some(node.name),
            optional: node.optional,
            range: node.range,
            ..RawNodeData::default()
        };
        let node_type = match node.kind {
            NodeKind::Start => RawNodeType::StartNode,
            NodeKind::Simple { values } => {
                data.values = Some(values);
                RawNodeType::SimpleNode
            }
            NodeKind::Branch { values } => {
                data.values = Some(values);
                RawNodeType::BranchNode
            }
            NodeKind::Template { templates, keys } => {
                data.templates = Some(templates);
                data.keys = Some(keys);
                RawNodeType::TemplateNode
            }
        };
        RawNode {
            id: node.id,
            node_type,
            data,
        }
    }
}
