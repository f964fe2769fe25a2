use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifier of a storage node (the vertex underneath a topic).
///
/// Node and edge ids are drawn from one monotonically increasing sequence,
/// so comparing ids compares creation order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Identifier of a storage edge (the hyperedge underneath an association).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl NodeId {
    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl EdgeId {
    /// The raw numeric id.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidId(s.to_string()))
    }
}

impl FromStr for EdgeId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidId(s.to_string()))
    }
}

/// Reference to a role player: a node or an edge.
///
/// Edges may play roles in other edges, so an association can itself be
/// related (for example a view configuration attached to an association
/// definition). Entities reference each other strictly by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlayerRef {
    /// A node player.
    Node(NodeId),
    /// An edge player.
    Edge(EdgeId),
}

impl PlayerRef {
    /// Check if this reference points to a node.
    pub const fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    /// Check if this reference points to an edge.
    pub const fn is_edge(&self) -> bool {
        matches!(self, Self::Edge(_))
    }

    /// Get the node id if this is a node reference.
    pub const fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            Self::Edge(_) => None,
        }
    }

    /// Get the edge id if this is an edge reference.
    pub const fn as_edge(&self) -> Option<EdgeId> {
        match self {
            Self::Edge(id) => Some(*id),
            Self::Node(_) => None,
        }
    }

    /// The raw numeric id, regardless of kind.
    pub const fn raw(&self) -> u64 {
        match self {
            Self::Node(id) => id.0,
            Self::Edge(id) => id.0,
        }
    }
}

impl fmt::Display for PlayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "node:{id}"),
            Self::Edge(id) => write!(f, "edge:{id}"),
        }
    }
}

impl From<NodeId> for PlayerRef {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<EdgeId> for PlayerRef {
    fn from(id: EdgeId) -> Self {
        Self::Edge(id)
    }
}
