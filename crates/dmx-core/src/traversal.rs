//! Role-typed relationship traversal.
//!
//! A query starts at a player and walks its incident edges:
//!
//! 1. fetch the incident edges (creation order)
//! 2. keep edges where the start plays `my_role` and the other side plays
//!    `others_role` (either may be unconstrained, both may be equal)
//! 3. keep edges of the requested association type
//! 4. resolve the other player and keep it if it has the requested type
//! 5. return each match with its connecting association

use serde::{Deserialize, Serialize};

use dmx_store::{Edge, GraphView, RolePosition};
use dmx_types::uri::{self, prop};
use dmx_types::PlayerRef;

use crate::error::CoreResult;
use crate::model::{AssociationModel, TopicModel};
use crate::schema::AssocDef;

/// Filters of a relationship query. `None` means "any".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleQuery {
    pub assoc_type_uri: Option<String>,
    pub my_role_type_uri: Option<String>,
    pub others_role_type_uri: Option<String>,
    pub others_type_uri: Option<String>,
}

impl RoleQuery {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn assoc_type(mut self, uri: impl Into<String>) -> Self {
        self.assoc_type_uri = Some(uri.into());
        self
    }

    pub fn my_role(mut self, uri: impl Into<String>) -> Self {
        self.my_role_type_uri = Some(uri.into());
        self
    }

    pub fn others_role(mut self, uri: impl Into<String>) -> Self {
        self.others_role_type_uri = Some(uri.into());
        self
    }

    pub fn others_type(mut self, uri: impl Into<String>) -> Self {
        self.others_type_uri = Some(uri.into());
        self
    }

    /// Children of a parent along one association definition.
    pub fn children_of(def: &AssocDef) -> Self {
        Self::any()
            .assoc_type(def.instance_assoc_type_uri())
            .my_role(uri::PARENT)
            .others_role(uri::CHILD)
            .others_type(def.child_type_uri.as_str())
    }

    /// Parents of a child along one association definition.
    pub fn parents_of(def: &AssocDef) -> Self {
        Self::any()
            .assoc_type(def.instance_assoc_type_uri())
            .my_role(uri::CHILD)
            .others_role(uri::PARENT)
            .others_type(def.parent_type_uri.as_str())
    }

    fn edge_type_matches(&self, edge: &Edge) -> bool {
        match &self.assoc_type_uri {
            Some(t) => edge.prop_str(prop::TYPE_URI) == Some(t.as_str()),
            None => true,
        }
    }

    /// The other player of `edge` if `me` and the other side play the
    /// requested roles, trying both orientations.
    fn other_side(&self, edge: &Edge, me: PlayerRef) -> Option<PlayerRef> {
        [RolePosition::First, RolePosition::Second]
            .into_iter()
            .find(|&pos| {
                let mine = edge.role(pos);
                let theirs = edge.role(pos.other());
                mine.matches(me, self.my_role_type_uri.as_deref())
                    && self
                        .others_role_type_uri
                        .as_deref()
                        .map_or(true, |r| r == theirs.role_type_uri)
            })
            .map(|pos| edge.role(pos.other()).player)
    }
}

/// A topic reached by traversal, with the association that connects it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedTopic {
    pub topic: TopicModel,
    pub assoc: AssociationModel,
}

/// An association reached by traversal (as a role player), with the
/// association that connects it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelatedAssociation {
    pub association: AssociationModel,
    pub assoc: AssociationModel,
}

/// Matching edges and the other player of each, in edge creation order.
pub fn related_players<G: GraphView + ?Sized>(
    graph: &G,
    me: PlayerRef,
    query: &RoleQuery,
) -> CoreResult<Vec<(Edge, PlayerRef)>> {
    Ok(graph
        .incident_edges(me)?
        .into_iter()
        .filter(|edge| query.edge_type_matches(edge))
        .filter_map(|edge| query.other_side(&edge, me).map(|other| (edge, other)))
        .collect())
}

/// Topics related to `me`.
pub fn related_topics<G: GraphView + ?Sized>(
    graph: &G,
    me: PlayerRef,
    query: &RoleQuery,
) -> CoreResult<Vec<RelatedTopic>> {
    let mut out = Vec::new();
    for (edge, other) in related_players(graph, me, query)? {
        let Some(id) = other.as_node() else {
            continue;
        };
        let node = graph.get_node(id)?;
        if let Some(t) = &query.others_type_uri {
            if node.prop_str(prop::TYPE_URI) != Some(t.as_str()) {
                continue;
            }
        }
        out.push(RelatedTopic {
            topic: TopicModel::from_node(&node),
            assoc: AssociationModel::from_edge(&edge),
        });
    }
    Ok(out)
}

/// Associations related to `me` (edges playing a role in a connecting edge).
pub fn related_associations<G: GraphView + ?Sized>(
    graph: &G,
    me: PlayerRef,
    query: &RoleQuery,
) -> CoreResult<Vec<RelatedAssociation>> {
    let mut out = Vec::new();
    for (edge, other) in related_players(graph, me, query)? {
        let Some(id) = other.as_edge() else {
            continue;
        };
        let other_edge = graph.get_edge(id)?;
        if let Some(t) = &query.others_type_uri {
            if other_edge.prop_str(prop::TYPE_URI) != Some(t.as_str()) {
                continue;
            }
        }
        out.push(RelatedAssociation {
            association: AssociationModel::from_edge(&other_edge),
            assoc: AssociationModel::from_edge(&edge),
        });
    }
    Ok(out)
}

/// Target of auto-typing: the association type and, per player type, the
/// role type it should get.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoTyping {
    pub assoc_type_uri: String,
    pub player_type1: String,
    pub role_type1: String,
    pub player_type2: String,
    pub role_type2: String,
}

impl AutoTyping {
    pub fn new(
        assoc_type_uri: impl Into<String>,
        (player_type1, role_type1): (&str, &str),
        (player_type2, role_type2): (&str, &str),
    ) -> Self {
        Self {
            assoc_type_uri: assoc_type_uri.into(),
            player_type1: player_type1.to_string(),
            role_type1: role_type1.to_string(),
            player_type2: player_type2.to_string(),
            role_type2: role_type2.to_string(),
        }
    }

    /// Role types for `(role1, role2)` of an edge whose players have the
    /// given types, in whichever orientation matches.
    pub fn roles_for(&self, type1: &str, type2: &str) -> Option<(&str, &str)> {
        if type1 == self.player_type1 && type2 == self.player_type2 {
            Some((&self.role_type1, &self.role_type2))
        } else if type1 == self.player_type2 && type2 == self.player_type1 {
            Some((&self.role_type2, &self.role_type1))
        } else {
            None
        }
    }
}

/// Type uri of a player: the `type_uri` property of its node or edge.
pub(crate) fn player_type<G: GraphView + ?Sized>(graph: &G, player: PlayerRef) -> CoreResult<String> {
    let t = match player {
        PlayerRef::Node(id) => graph.get_node(id)?.prop_str(prop::TYPE_URI).map(str::to_string),
        PlayerRef::Edge(id) => graph.get_edge(id)?.prop_str(prop::TYPE_URI).map(str::to_string),
    };
    Ok(t.unwrap_or_default())
}

/// The parent player of a parent/child association, if `edge` is one.
pub(crate) fn parent_player(edge: &Edge) -> Option<PlayerRef> {
    let [a, b] = edge.roles();
    match (a.role_type_uri.as_str(), b.role_type_uri.as_str()) {
        (uri::PARENT, uri::CHILD) => Some(a.player),
        (uri::CHILD, uri::PARENT) => Some(b.player),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_store::{GraphState, Role};
    use dmx_types::{NodeId, SimpleValue};

    fn topic(g: &mut GraphState, type_uri: &str, value: &str) -> NodeId {
        let n = g.create_node(Some(value.into()));
        g.set_node_property(n.id, prop::TYPE_URI, type_uri.into()).unwrap();
        n.id
    }

    fn assoc(
        g: &mut GraphState,
        type_uri: &str,
        a: impl Into<PlayerRef>,
        ra: &str,
        b: impl Into<PlayerRef>,
        rb: &str,
    ) -> dmx_types::EdgeId {
        let e = g.create_edge(Role::new(a, ra), Role::new(b, rb)).unwrap();
        g.set_edge_property(e.id, prop::TYPE_URI, type_uri.into()).unwrap();
        e.id
    }

    #[test]
    fn filters_by_roles_type_and_player_type() {
        let mut g = GraphState::new();
        let person = topic(&mut g, "acme.person", "Ada");
        let name = topic(&mut g, "acme.name", "Ada L.");
        let phone = topic(&mut g, "acme.phone", "111");
        let other = topic(&mut g, "acme.person", "Bob");
        assoc(&mut g, uri::COMPOSITION, person, uri::PARENT, name, uri::CHILD);
        assoc(&mut g, uri::COMPOSITION, person, uri::PARENT, phone, uri::CHILD);
        assoc(&mut g, uri::ASSOCIATION, person, uri::DEFAULT_ROLE, other, uri::DEFAULT_ROLE);

        let children = related_topics(
            &g,
            person.into(),
            &RoleQuery::any()
                .assoc_type(uri::COMPOSITION)
                .my_role(uri::PARENT)
                .others_role(uri::CHILD),
        )
        .unwrap();
        let ids: Vec<_> = children.iter().map(|r| r.topic.id.unwrap()).collect();
        assert_eq!(ids, vec![name, phone]);

        let phones = related_topics(
            &g,
            person.into(),
            &RoleQuery::any().others_type("acme.phone"),
        )
        .unwrap();
        assert_eq!(phones.len(), 1);
        assert_eq!(phones[0].topic.value, Some(SimpleValue::from("111")));
        assert_eq!(phones[0].assoc.type_uri, uri::COMPOSITION);

        // the child side sees the parent with swapped roles
        let parents = related_topics(
            &g,
            name.into(),
            &RoleQuery::any().my_role(uri::CHILD).others_role(uri::PARENT),
        )
        .unwrap();
        assert_eq!(parents[0].topic.id, Some(person));

        // roles do not match in the wrong direction
        let none = related_topics(
            &g,
            name.into(),
            &RoleQuery::any().my_role(uri::PARENT),
        )
        .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn equal_role_types_match_either_side() {
        let mut g = GraphState::new();
        let a = topic(&mut g, "acme.person", "Ada");
        let b = topic(&mut g, "acme.person", "Bob");
        assoc(&mut g, uri::ASSOCIATION, a, uri::DEFAULT_ROLE, b, uri::DEFAULT_ROLE);
        let q = RoleQuery::any()
            .my_role(uri::DEFAULT_ROLE)
            .others_role(uri::DEFAULT_ROLE);
        assert_eq!(related_topics(&g, a.into(), &q).unwrap()[0].topic.id, Some(b));
        assert_eq!(related_topics(&g, b.into(), &q).unwrap()[0].topic.id, Some(a));
    }

    #[test]
    fn related_associations_follow_edge_players() {
        let mut g = GraphState::new();
        let a = topic(&mut g, "acme.person", "Ada");
        let b = topic(&mut g, "acme.org", "Acme");
        let employment = assoc(&mut g, "acme.employment", a, uri::DEFAULT_ROLE, b, uri::DEFAULT_ROLE);
        let note = topic(&mut g, "acme.note", "since 2020");
        let link = assoc(&mut g, uri::ASSOCIATION, note, uri::DEFAULT_ROLE, employment, uri::CONFIGURABLE);

        let found = related_associations(&g, note.into(), &RoleQuery::any()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].association.id, Some(employment));
        assert_eq!(found[0].assoc.id, Some(link));

        // topics only: the edge player is skipped
        assert!(related_topics(&g, note.into(), &RoleQuery::any()).unwrap().is_empty());
        // and from the edge back to the topic
        let back = related_topics(&g, employment.into(), &RoleQuery::any().my_role(uri::CONFIGURABLE)).unwrap();
        assert_eq!(back[0].topic.id, Some(note));
    }

    #[test]
    fn results_follow_creation_order() {
        let mut g = GraphState::new();
        let hub = topic(&mut g, "acme.hub", "hub");
        let mut expected = Vec::new();
        for i in 0..5 {
            let t = topic(&mut g, "acme.leaf", &i.to_string());
            assoc(&mut g, uri::ASSOCIATION, t, uri::DEFAULT_ROLE, hub, uri::DEFAULT_ROLE);
            expected.push(t);
        }
        let got: Vec<_> = related_topics(&g, hub.into(), &RoleQuery::any())
            .unwrap()
            .into_iter()
            .map(|r| r.topic.id.unwrap())
            .collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn missing_start_is_not_found() {
        let g = GraphState::new();
        let err = related_topics(&g, NodeId(99).into(), &RoleQuery::any()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn auto_typing_orientation() {
        let at = AutoTyping::new(
            "acme.employment",
            ("acme.person", "acme.employee"),
            ("acme.org", "acme.employer"),
        );
        assert_eq!(
            at.roles_for("acme.person", "acme.org"),
            Some(("acme.employee", "acme.employer"))
        );
        assert_eq!(
            at.roles_for("acme.org", "acme.person"),
            Some(("acme.employer", "acme.employee"))
        );
        assert_eq!(at.roles_for("acme.person", "acme.person"), None);
    }
}
