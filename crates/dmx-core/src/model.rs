//! Plain data models of topics and associations.
//!
//! Models are detached values: they are what callers hand to create/update
//! operations and what reads return. Handles that are bound to storage live
//! in [`crate::object`].

use serde::{Deserialize, Serialize};

use dmx_store::{Edge, Node, Role, RolePosition};
use dmx_types::uri::{self, prop};
use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::composite::{ChildValue, CompositeValue};

/// Addresses an existing topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicRef {
    Id(NodeId),
    Uri(String),
}

impl std::fmt::Display for TopicRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "topic {id}"),
            Self::Uri(u) => write!(f, "topic {u:?}"),
        }
    }
}

impl From<NodeId> for TopicRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for TopicRef {
    fn from(u: &str) -> Self {
        Self::Uri(u.to_string())
    }
}

/// A topic: a typed node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicModel {
    /// `None` until the topic is persisted.
    pub id: Option<NodeId>,
    /// Stable identifier; empty when absent.
    pub uri: String,
    pub type_uri: String,
    pub value: Option<SimpleValue>,
    pub children: CompositeValue,
}

impl TopicModel {
    pub fn new(type_uri: impl Into<String>) -> Self {
        Self {
            type_uri: type_uri.into(),
            ..Default::default()
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<SimpleValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_children(mut self, children: CompositeValue) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, key: impl Into<String>, value: impl Into<ChildValue>) -> Self {
        self.children.set(key, value);
        self
    }

    /// Shallow model of a stored node (children are not loaded).
    pub(crate) fn from_node(node: &Node) -> Self {
        Self {
            id: Some(node.id),
            uri: node.prop_str(prop::URI).unwrap_or_default().to_string(),
            type_uri: node.prop_str(prop::TYPE_URI).unwrap_or_default().to_string(),
            value: node.value.clone(),
            children: CompositeValue::new(),
        }
    }
}

/// An association: a typed edge between two players.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssociationModel {
    pub id: Option<EdgeId>,
    pub uri: String,
    pub type_uri: String,
    pub value: Option<SimpleValue>,
    pub children: CompositeValue,
    pub role1: Role,
    pub role2: Role,
}

impl AssociationModel {
    pub fn new(type_uri: impl Into<String>, role1: Role, role2: Role) -> Self {
        Self {
            id: None,
            uri: String::new(),
            type_uri: type_uri.into(),
            value: None,
            children: CompositeValue::new(),
            role1,
            role2,
        }
    }

    /// An untyped association with default roles.
    pub fn untyped(a: impl Into<PlayerRef>, b: impl Into<PlayerRef>) -> Self {
        Self::new(
            uri::ASSOCIATION,
            Role::new(a, uri::DEFAULT_ROLE),
            Role::new(b, uri::DEFAULT_ROLE),
        )
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<SimpleValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_child(mut self, key: impl Into<String>, value: impl Into<ChildValue>) -> Self {
        self.children.set(key, value);
        self
    }

    pub fn role(&self, position: RolePosition) -> &Role {
        match position {
            RolePosition::First => &self.role1,
            RolePosition::Second => &self.role2,
        }
    }

    /// The player on the other side of `player`, if `player` takes part.
    pub fn other_player(&self, player: PlayerRef) -> Option<PlayerRef> {
        if self.role1.player == player {
            Some(self.role2.player)
        } else if self.role2.player == player {
            Some(self.role1.player)
        } else {
            None
        }
    }

    pub(crate) fn from_edge(edge: &Edge) -> Self {
        Self {
            id: Some(edge.id),
            uri: edge.prop_str(prop::URI).unwrap_or_default().to_string(),
            type_uri: edge.prop_str(prop::TYPE_URI).unwrap_or_default().to_string(),
            value: edge.value.clone(),
            children: CompositeValue::new(),
            role1: edge.role1.clone(),
            role2: edge.role2.clone(),
        }
    }
}

/// Either kind of DMX object, as carried by hook events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObjectModel {
    Topic(TopicModel),
    Association(AssociationModel),
}

impl ObjectModel {
    /// Storage identity, once persisted.
    pub fn player(&self) -> Option<PlayerRef> {
        match self {
            Self::Topic(t) => t.id.map(PlayerRef::Node),
            Self::Association(a) => a.id.map(PlayerRef::Edge),
        }
    }

    pub fn type_uri(&self) -> &str {
        match self {
            Self::Topic(t) => &t.type_uri,
            Self::Association(a) => &a.type_uri,
        }
    }

    pub fn as_topic(&self) -> Option<&TopicModel> {
        match self {
            Self::Topic(t) => Some(t),
            Self::Association(_) => None,
        }
    }

    pub fn as_association(&self) -> Option<&AssociationModel> {
        match self {
            Self::Association(a) => Some(a),
            Self::Topic(_) => None,
        }
    }

    pub fn into_topic(self) -> Option<TopicModel> {
        match self {
            Self::Topic(t) => Some(t),
            Self::Association(_) => None,
        }
    }

    pub fn into_association(self) -> Option<AssociationModel> {
        match self {
            Self::Association(a) => Some(a),
            Self::Topic(_) => None,
        }
    }

    /// Short human-readable identification, e.g. `topic 7 (dmx.contacts.person)`.
    pub fn describe(&self) -> String {
        let (kind, id) = match self {
            Self::Topic(t) => ("topic", t.id.map(|i| i.get())),
            Self::Association(a) => ("association", a.id.map(|i| i.get())),
        };
        match id {
            Some(id) => format!("{kind} {id} ({})", self.type_uri()),
            None => format!("new {kind} ({})", self.type_uri()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn topic_from_node_reads_props() {
        let mut props = BTreeMap::new();
        props.insert(prop::URI.to_string(), SimpleValue::from("acme.person"));
        props.insert(prop::TYPE_URI.to_string(), SimpleValue::from(uri::TOPIC_TYPE));
        let node = Node {
            id: NodeId(3),
            value: Some("Person".into()),
            props,
        };
        let t = TopicModel::from_node(&node);
        assert_eq!(t.id, Some(NodeId(3)));
        assert_eq!(t.uri, "acme.person");
        assert_eq!(t.type_uri, uri::TOPIC_TYPE);
        assert!(t.children.is_empty());
    }

    #[test]
    fn untyped_association_roles() {
        let a = AssociationModel::untyped(NodeId(1), NodeId(2));
        assert_eq!(a.type_uri, uri::ASSOCIATION);
        assert_eq!(a.role1.role_type_uri, uri::DEFAULT_ROLE);
        assert_eq!(a.other_player(NodeId(2).into()), Some(NodeId(1).into()));
        assert_eq!(a.other_player(NodeId(5).into()), None);
    }

    #[test]
    fn describe_objects() {
        let t = ObjectModel::Topic(TopicModel::new("acme.person"));
        assert_eq!(t.describe(), "new topic (acme.person)");
        let mut m = AssociationModel::untyped(NodeId(1), NodeId(2));
        m.id = Some(EdgeId(8));
        let a = ObjectModel::Association(m);
        assert_eq!(a.describe(), "association 8 (dmx.core.association)");
        assert_eq!(a.player(), Some(PlayerRef::Edge(EdgeId(8))));
    }

    #[test]
    fn topic_ref_display() {
        assert_eq!(TopicRef::from(NodeId(2)).to_string(), "topic 2");
        assert_eq!(TopicRef::from("x.y").to_string(), "topic \"x.y\"");
    }
}
