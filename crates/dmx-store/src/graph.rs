//! Storage records: nodes, edges, and roles.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

/// Reserved key that addresses the scalar value in `get_*_by_value` lookups.
pub const VALUE_KEY: &str = "value";

/// A storage vertex.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Optional scalar value.
    pub value: Option<SimpleValue>,
    /// Indexed properties.
    pub props: BTreeMap<String, SimpleValue>,
}

impl Node {
    pub fn prop(&self, key: &str) -> Option<&SimpleValue> {
        self.props.get(key)
    }

    /// Text property, if present and textual.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(SimpleValue::as_str)
    }
}

/// Participation of a player in an edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    pub player: PlayerRef,
    pub role_type_uri: String,
}

impl Role {
    pub fn new(player: impl Into<PlayerRef>, role_type_uri: impl Into<String>) -> Self {
        Self {
            player: player.into(),
            role_type_uri: role_type_uri.into(),
        }
    }

    /// `true` if this role is played by `player` and, when given, has the
    /// role type `role_type_uri`.
    pub fn matches(&self, player: PlayerRef, role_type_uri: Option<&str>) -> bool {
        self.player == player && role_type_uri.map_or(true, |r| r == self.role_type_uri)
    }
}

/// Which of the two roles of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RolePosition {
    First,
    Second,
}

impl RolePosition {
    pub fn other(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
        }
    }
}

/// A binary hyperedge: exactly two roles, each played by a node or an edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub role1: Role,
    pub role2: Role,
    pub value: Option<SimpleValue>,
    pub props: BTreeMap<String, SimpleValue>,
}

impl Edge {
    /// Both roles, in position order.
    pub fn roles(&self) -> [&Role; 2] {
        [&self.role1, &self.role2]
    }

    pub fn role(&self, position: RolePosition) -> &Role {
        match position {
            RolePosition::First => &self.role1,
            RolePosition::Second => &self.role2,
        }
    }

    pub(crate) fn role_mut(&mut self, position: RolePosition) -> &mut Role {
        match position {
            RolePosition::First => &mut self.role1,
            RolePosition::Second => &mut self.role2,
        }
    }

    /// `true` if `player` plays either role.
    pub fn involves(&self, player: PlayerRef) -> bool {
        self.role1.player == player || self.role2.player == player
    }

    /// Position of the first role played by `player`.
    pub fn position_of(&self, player: PlayerRef) -> Option<RolePosition> {
        if self.role1.player == player {
            Some(RolePosition::First)
        } else if self.role2.player == player {
            Some(RolePosition::Second)
        } else {
            None
        }
    }

    /// The role opposite to the one `player` plays.
    pub fn other_role(&self, player: PlayerRef) -> Option<&Role> {
        self.position_of(player).map(|pos| self.role(pos.other()))
    }

    /// `true` if the edge connects `a` (optionally in role `role_a`) with
    /// `b` (optionally in role `role_b`), in either role orientation.
    pub fn connects(
        &self,
        a: PlayerRef,
        role_a: Option<&str>,
        b: PlayerRef,
        role_b: Option<&str>,
    ) -> bool {
        (self.role1.matches(a, role_a) && self.role2.matches(b, role_b))
            || (self.role2.matches(a, role_a) && self.role1.matches(b, role_b))
    }

    pub fn prop(&self, key: &str) -> Option<&SimpleValue> {
        self.props.get(key)
    }

    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props.get(key).and_then(SimpleValue::as_str)
    }
}

/// Records removed by a (cascading) delete, in removal order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteReport {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl DeleteReport {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn edge_ids(&self) -> Vec<EdgeId> {
        self.edges.iter().map(|e| e.id).collect()
    }
}
