//! In-memory model of a workflow template graph.
//!
//! No behavior lives here beyond structure and adjacency lookups; the
//! validator and the runtime engine both work against [`TemplateGraph`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::DbId;
use crate::workflow::condition::ConditionClause;

/// The closed set of node types a template may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Role,
    Department,
    Approval,
    Conditional,
    Form,
    Sync,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Role => "role",
            NodeType::Department => "department",
            NodeType::Approval => "approval",
            NodeType::Conditional => "conditional",
            NodeType::Form => "form",
            NodeType::Sync => "sync",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(NodeType::Start),
            "end" => Ok(NodeType::End),
            "role" => Ok(NodeType::Role),
            "department" => Ok(NodeType::Department),
            "approval" => Ok(NodeType::Approval),
            "conditional" => Ok(NodeType::Conditional),
            "form" => Ok(NodeType::Form),
            "sync" => Ok(NodeType::Sync),
            other => Err(format!("Unknown node type '{other}'")),
        }
    }
}

/// The approve/reject outcome recorded at an approval node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }
}

/// Type-specific node settings as a tagged union, so each variant carries
/// exactly its required fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    End,
    Role,
    Department,
    Sync,
    Approval {
        #[serde(default = "default_required_approvals")]
        required_approvals: i32,
        #[serde(default)]
        allow_feedback: bool,
        #[serde(default)]
        allow_send_back: bool,
    },
    Conditional {
        /// The upstream form node supplying the evaluated values.
        #[serde(default)]
        source_node_id: Option<DbId>,
        #[serde(default)]
        clauses: Vec<ConditionClause>,
    },
    Form {
        /// Embedded field schema, opaque to the engine.
        schema: serde_json::Value,
        #[serde(default)]
        draft: bool,
        #[serde(default)]
        allow_attachments: bool,
    },
}

fn default_required_approvals() -> i32 {
    1
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Start => NodeType::Start,
            NodeKind::End => NodeType::End,
            NodeKind::Role => NodeType::Role,
            NodeKind::Department => NodeType::Department,
            NodeKind::Sync => NodeType::Sync,
            NodeKind::Approval { .. } => NodeType::Approval,
            NodeKind::Conditional { .. } => NodeType::Conditional,
            NodeKind::Form { .. } => NodeType::Form,
        }
    }
}

/// A node of the template graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: DbId,
    pub label: String,
    /// A role id or department id; which one is meant depends on the type.
    pub required_entity_id: Option<DbId>,
    pub kind: NodeKind,
}

impl GraphNode {
    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }
}

/// Routing payload on a connection. A connection with no payload (or a
/// payload carrying neither a decision nor a condition value) is the
/// unconditional/default edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeCondition {
    #[serde(default)]
    pub label: Option<String>,
    /// Route tag matched against a conditional node's clause routes.
    #[serde(default)]
    pub condition_value: Option<String>,
    /// Decision tag for approval routing.
    #[serde(default)]
    pub decision: Option<Decision>,
    /// Visual source-handle identifier for multi-branch sourcing.
    #[serde(default)]
    pub source_handle: Option<String>,
}

/// A directed connection between two template nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: DbId,
    pub from_node_id: DbId,
    pub to_node_id: DbId,
    pub condition: Option<EdgeCondition>,
}

impl GraphEdge {
    /// An edge carrying neither a decision tag nor a condition value is a
    /// parallel branch / default edge, not a routing choice.
    pub fn is_unconditioned(&self) -> bool {
        self.condition
            .as_ref()
            .is_none_or(|c| c.decision.is_none() && c.condition_value.is_none())
    }

    pub fn decision(&self) -> Option<Decision> {
        self.condition.as_ref().and_then(|c| c.decision)
    }

    pub fn condition_value(&self) -> Option<&str> {
        self.condition.as_ref().and_then(|c| c.condition_value.as_deref())
    }

    /// A permitted "send back" loop edge, skipped during cycle detection.
    pub fn is_send_back(&self) -> bool {
        self.decision() == Some(Decision::Rejected) || self.condition_value() == Some("rejected")
    }

    /// Human-readable branch label for diagnostics.
    pub fn branch_label(&self) -> Option<&str> {
        self.condition.as_ref().and_then(|c| c.label.as_deref())
    }
}

/// A template's nodes and connections with adjacency indexes.
#[derive(Debug, Clone)]
pub struct TemplateGraph {
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
    node_index: HashMap<DbId, usize>,
    outgoing: HashMap<DbId, Vec<usize>>,
    incoming: HashMap<DbId, Vec<usize>>,
}

impl TemplateGraph {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        let node_index = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();

        let mut outgoing: HashMap<DbId, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<DbId, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.from_node_id).or_default().push(i);
            incoming.entry(edge.to_node_id).or_default().push(i);
        }

        Self {
            nodes,
            edges,
            node_index,
            outgoing,
            incoming,
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn node(&self, id: DbId) -> Option<&GraphNode> {
        self.node_index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn outgoing(&self, id: DbId) -> Vec<&GraphEdge> {
        self.edge_list(&self.outgoing, id)
    }

    pub fn incoming(&self, id: DbId) -> Vec<&GraphEdge> {
        self.edge_list(&self.incoming, id)
    }

    /// Outgoing edges that are parallel branches / default edges.
    pub fn unconditioned_outgoing(&self, id: DbId) -> Vec<&GraphEdge> {
        self.outgoing(id)
            .into_iter()
            .filter(|e| e.is_unconditioned())
            .collect()
    }

    /// A parallel fork is a node with two or more unconditioned outgoing
    /// edges; decision/condition-tagged edges are routing choices and do
    /// not count.
    pub fn is_fork(&self, id: DbId) -> bool {
        self.unconditioned_outgoing(id).len() >= 2
    }

    pub fn start_nodes(&self) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type() == NodeType::Start)
            .collect()
    }

    /// The single start node, when the template has exactly one.
    pub fn start_node(&self) -> Option<&GraphNode> {
        match self.start_nodes().as_slice() {
            [single] => Some(single),
            _ => None,
        }
    }

    fn edge_list(&self, index: &HashMap<DbId, Vec<usize>>, id: DbId) -> Vec<&GraphEdge> {
        index
            .get(&id)
            .map(|idxs| idxs.iter().map(|&i| &self.edges[i]).collect())
            .unwrap_or_default()
    }
}
