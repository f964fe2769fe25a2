//! The id-indexed arena behind the in-memory engine.
//!
//! [`GraphState`] stores nodes and edges in ordered maps keyed by id and
//! maintains three secondary indexes:
//!
//! - `incidence`: player -> edges in which it plays a role
//! - `node_index` / `edge_index`: (property key, value key) -> ids
//!
//! # Invariants
//!
//! - Every role player of every edge exists.
//! - `incidence[p]` contains exactly the edges that have `p` as a player.
//! - Index entries mirror the current property and scalar values.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::error::{StoreError, StoreResult};
use crate::graph::{DeleteReport, Edge, Node, Role, RolePosition, VALUE_KEY};
use crate::traits::GraphView;

type IndexKey = (String, String);

/// Complete graph state: entity arena plus indexes.
#[derive(Clone, Debug, Default)]
pub struct GraphState {
    revision: u64,
    next_id: u64,
    nodes: BTreeMap<NodeId, Node>,
    edges: BTreeMap<EdgeId, Edge>,
    incidence: HashMap<PlayerRef, BTreeSet<EdgeId>>,
    node_index: HashMap<IndexKey, BTreeSet<NodeId>>,
    edge_index: HashMap<IndexKey, BTreeSet<EdgeId>>,
}

/// Serialized form of a [`GraphState`]; indexes are rebuilt on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateImage {
    pub revision: u64,
    pub next_id: u64,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl GraphState {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Capture the persistent part of the state.
    pub fn to_image(&self) -> StateImage {
        StateImage {
            revision: self.revision,
            next_id: self.next_id,
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Rebuild a state (with indexes) from an image, verifying that every
    /// role player exists.
    pub fn from_image(image: StateImage) -> StoreResult<Self> {
        let mut state = Self {
            revision: image.revision,
            next_id: image.next_id.max(1),
            ..Self::default()
        };
        for node in image.nodes {
            index_entity(&mut state.node_index, node.id, node.value.as_ref(), &node.props);
            state.next_id = state.next_id.max(node.id.0 + 1);
            state.nodes.insert(node.id, node);
        }
        for edge in image.edges {
            state.next_id = state.next_id.max(edge.id.0 + 1);
            state.edges.insert(edge.id, edge);
        }
        let edges: Vec<Edge> = state.edges.values().cloned().collect();
        for edge in &edges {
            for role in edge.roles() {
                if !state.contains(role.player) {
                    return Err(StoreError::Corrupt(format!(
                        "edge {} references missing player {}",
                        edge.id, role.player
                    )));
                }
                state.incidence.entry(role.player).or_default().insert(edge.id);
            }
            index_entity(&mut state.edge_index, edge.id, edge.value.as_ref(), &edge.props);
        }
        Ok(state)
    }

    /// Mark this state as the next committed revision.
    pub(crate) fn bump_revision(&mut self) {
        self.revision += 1;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn node_mut(&mut self, id: NodeId) -> StoreResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(StoreError::NodeNotFound(id))
    }

    fn edge_mut(&mut self, id: EdgeId) -> StoreResult<&mut Edge> {
        self.edges.get_mut(&id).ok_or(StoreError::EdgeNotFound(id))
    }

    // ---------------------------------------------------------------
    // Mutation
    // ---------------------------------------------------------------

    pub fn create_node(&mut self, value: Option<SimpleValue>) -> Node {
        let id = NodeId(self.next_id());
        if let Some(v) = &value {
            index_add(&mut self.node_index, VALUE_KEY, v, id);
        }
        let node = Node {
            id,
            value,
            props: BTreeMap::new(),
        };
        self.nodes.insert(id, node.clone());
        node
    }

    pub fn create_edge(&mut self, role1: Role, role2: Role) -> StoreResult<Edge> {
        for role in [&role1, &role2] {
            if !self.contains(role.player) {
                return Err(StoreError::DanglingPlayer(role.player));
            }
        }
        let id = EdgeId(self.next_id());
        self.incidence.entry(role1.player).or_default().insert(id);
        self.incidence.entry(role2.player).or_default().insert(id);
        let edge = Edge {
            id,
            role1,
            role2,
            value: None,
            props: BTreeMap::new(),
        };
        self.edges.insert(id, edge.clone());
        Ok(edge)
    }

    pub fn set_node_value(&mut self, id: NodeId, value: Option<SimpleValue>) -> StoreResult<()> {
        let node = self.nodes.get_mut(&id).ok_or(StoreError::NodeNotFound(id))?;
        let old = std::mem::replace(&mut node.value, value.clone());
        if let Some(v) = &old {
            index_remove(&mut self.node_index, VALUE_KEY, v, id);
        }
        if let Some(v) = &value {
            index_add(&mut self.node_index, VALUE_KEY, v, id);
        }
        Ok(())
    }

    pub fn set_node_property(
        &mut self,
        id: NodeId,
        key: &str,
        value: SimpleValue,
    ) -> StoreResult<()> {
        check_key(key)?;
        let node = self.node_mut(id)?;
        let old = node.props.insert(key.to_string(), value.clone());
        if let Some(v) = &old {
            index_remove(&mut self.node_index, key, v, id);
        }
        index_add(&mut self.node_index, key, &value, id);
        Ok(())
    }

    pub fn remove_node_property(
        &mut self,
        id: NodeId,
        key: &str,
    ) -> StoreResult<Option<SimpleValue>> {
        let old = self.node_mut(id)?.props.remove(key);
        if let Some(v) = &old {
            index_remove(&mut self.node_index, key, v, id);
        }
        Ok(old)
    }

    pub fn set_edge_value(&mut self, id: EdgeId, value: Option<SimpleValue>) -> StoreResult<()> {
        let edge = self.edges.get_mut(&id).ok_or(StoreError::EdgeNotFound(id))?;
        let old = std::mem::replace(&mut edge.value, value.clone());
        if let Some(v) = &old {
            index_remove(&mut self.edge_index, VALUE_KEY, v, id);
        }
        if let Some(v) = &value {
            index_add(&mut self.edge_index, VALUE_KEY, v, id);
        }
        Ok(())
    }

    pub fn set_edge_property(
        &mut self,
        id: EdgeId,
        key: &str,
        value: SimpleValue,
    ) -> StoreResult<()> {
        check_key(key)?;
        let edge = self.edge_mut(id)?;
        let old = edge.props.insert(key.to_string(), value.clone());
        if let Some(v) = &old {
            index_remove(&mut self.edge_index, key, v, id);
        }
        index_add(&mut self.edge_index, key, &value, id);
        Ok(())
    }

    pub fn remove_edge_property(
        &mut self,
        id: EdgeId,
        key: &str,
    ) -> StoreResult<Option<SimpleValue>> {
        let old = self.edge_mut(id)?.props.remove(key);
        if let Some(v) = &old {
            index_remove(&mut self.edge_index, key, v, id);
        }
        Ok(old)
    }

    pub fn set_edge_role(
        &mut self,
        id: EdgeId,
        position: RolePosition,
        role: Role,
    ) -> StoreResult<Edge> {
        if role.player == PlayerRef::Edge(id) {
            return Err(StoreError::SelfReference(id));
        }
        if !self.contains(role.player) {
            return Err(StoreError::DanglingPlayer(role.player));
        }
        let edge = self.edge_mut(id)?;
        let new_player = role.player;
        let old_player = std::mem::replace(edge.role_mut(position), role).player;
        let other_player = edge.role(position.other()).player;
        let updated = edge.clone();

        if old_player != new_player && old_player != other_player {
            if let Some(set) = self.incidence.get_mut(&old_player) {
                set.remove(&id);
            }
        }
        self.incidence.entry(new_player).or_default().insert(id);
        Ok(updated)
    }

    pub fn delete_node(&mut self, id: NodeId) -> StoreResult<DeleteReport> {
        let node = self.nodes.remove(&id).ok_or(StoreError::NodeNotFound(id))?;
        unindex_entity(&mut self.node_index, node.id, node.value.as_ref(), &node.props);
        let seeds: Vec<EdgeId> = self
            .incidence
            .remove(&PlayerRef::Node(id))
            .map(|set| set.into_iter().collect())
            .unwrap_or_default();
        let mut report = DeleteReport {
            nodes: vec![node],
            edges: Vec::new(),
        };
        self.remove_edges(seeds, &mut report);
        debug!(node = %id, edges = report.edges.len(), "deleted node");
        Ok(report)
    }

    pub fn delete_edge(&mut self, id: EdgeId) -> StoreResult<DeleteReport> {
        if !self.edges.contains_key(&id) {
            return Err(StoreError::EdgeNotFound(id));
        }
        let mut report = DeleteReport::default();
        self.remove_edges(vec![id], &mut report);
        debug!(edge = %id, cascaded = report.edges.len() - 1, "deleted edge");
        Ok(report)
    }

    /// Remove edges and, transitively, every edge that uses a removed edge
    /// as a player. Iterative, so depth does not grow the stack.
    fn remove_edges(&mut self, seeds: Vec<EdgeId>, report: &mut DeleteReport) {
        let mut worklist = seeds;
        while let Some(id) = worklist.pop() {
            let Some(edge) = self.edges.remove(&id) else {
                continue;
            };
            for role in edge.roles() {
                if let Some(set) = self.incidence.get_mut(&role.player) {
                    set.remove(&id);
                }
            }
            if let Some(dependents) = self.incidence.remove(&PlayerRef::Edge(id)) {
                worklist.extend(dependents);
            }
            unindex_entity(&mut self.edge_index, edge.id, edge.value.as_ref(), &edge.props);
            report.edges.push(edge);
        }
    }
}

impl GraphView for GraphState {
    fn revision(&self) -> u64 {
        self.revision
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Node> {
        self.nodes.get(&id).cloned().ok_or(StoreError::NodeNotFound(id))
    }

    fn get_edge(&self, id: EdgeId) -> StoreResult<Edge> {
        self.edges.get(&id).cloned().ok_or(StoreError::EdgeNotFound(id))
    }

    fn contains(&self, player: PlayerRef) -> bool {
        match player {
            PlayerRef::Node(id) => self.nodes.contains_key(&id),
            PlayerRef::Edge(id) => self.edges.contains_key(&id),
        }
    }

    fn get_nodes_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Node>> {
        let ids = self.node_index.get(&(key.to_string(), value.index_key()));
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect())
    }

    fn get_edges_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Edge>> {
        let ids = self.edge_index.get(&(key.to_string(), value.index_key()));
        Ok(ids
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).cloned())
            .collect())
    }

    fn incident_edges(&self, player: PlayerRef) -> StoreResult<Vec<Edge>> {
        if !self.contains(player) {
            return Err(match player {
                PlayerRef::Node(id) => StoreError::NodeNotFound(id),
                PlayerRef::Edge(id) => StoreError::EdgeNotFound(id),
            });
        }
        Ok(self
            .incidence
            .get(&player)
            .into_iter()
            .flatten()
            .filter_map(|id| self.edges.get(id).cloned())
            .collect())
    }

    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

fn check_key(key: &str) -> StoreResult<()> {
    if key == VALUE_KEY {
        return Err(StoreError::ReservedKey(key.to_string()));
    }
    Ok(())
}

fn index_add<I: Ord>(
    index: &mut HashMap<IndexKey, BTreeSet<I>>,
    key: &str,
    value: &SimpleValue,
    id: I,
) {
    index
        .entry((key.to_string(), value.index_key()))
        .or_default()
        .insert(id);
}

fn index_remove<I: Ord>(
    index: &mut HashMap<IndexKey, BTreeSet<I>>,
    key: &str,
    value: &SimpleValue,
    id: I,
) {
    let index_key = (key.to_string(), value.index_key());
    if let Some(set) = index.get_mut(&index_key) {
        set.remove(&id);
        if set.is_empty() {
            index.remove(&index_key);
        }
    }
}

fn index_entity<I: Ord + Copy>(
    index: &mut HashMap<IndexKey, BTreeSet<I>>,
    id: I,
    value: Option<&SimpleValue>,
    props: &BTreeMap<String, SimpleValue>,
) {
    if let Some(v) = value {
        index_add(index, VALUE_KEY, v, id);
    }
    for (key, v) in props {
        index_add(index, key, v, id);
    }
}

fn unindex_entity<I: Ord + Copy>(
    index: &mut HashMap<IndexKey, BTreeSet<I>>,
    id: I,
    value: Option<&SimpleValue>,
    props: &BTreeMap<String, SimpleValue>,
) {
    if let Some(v) = value {
        index_remove(index, VALUE_KEY, v, id);
    }
    for (key, v) in props {
        index_remove(index, key, v, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn node_role(id: NodeId, role: &str) -> Role {
        Role::new(id, role)
    }

    #[test]
    fn create_edge_rejects_dangling_player() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let err = g
            .create_edge(node_role(a, "x"), node_role(NodeId(999), "y"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DanglingPlayer(PlayerRef::Node(NodeId(999)))));
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn ids_are_monotonic_across_nodes_and_edges() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        let e = g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap().id;
        assert!(a.0 < b.0 && b.0 < e.0);
    }

    #[test]
    fn value_and_property_indexes() {
        let mut g = GraphState::new();
        let a = g.create_node(Some("Karl".into())).id;
        g.set_node_property(a, "uri", "person.karl".into()).unwrap();

        let by_value = g.get_nodes_by_value(VALUE_KEY, &"Karl".into()).unwrap();
        assert_eq!(by_value.len(), 1);
        let by_uri = g.get_nodes_by_value("uri", &"person.karl".into()).unwrap();
        assert_eq!(by_uri[0].id, a);

        g.set_node_value(a, Some("Carl".into())).unwrap();
        assert!(g.get_nodes_by_value(VALUE_KEY, &"Karl".into()).unwrap().is_empty());
        g.remove_node_property(a, "uri").unwrap();
        assert!(g.get_nodes_by_value("uri", &"person.karl".into()).unwrap().is_empty());
    }

    #[test]
    fn reserved_key_is_rejected() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let err = g.set_node_property(a, VALUE_KEY, 1i64.into()).unwrap_err();
        assert!(matches!(err, StoreError::ReservedKey(_)));
    }

    #[test]
    fn delete_node_cascades_transitively_through_edges() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        let c = g.create_node(None).id;
        let ab = g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap().id;
        // Edge on edge: c is attached to the a-b edge.
        let c_ab = g
            .create_edge(Role::new(ab, "configurable"), node_role(c, "config"))
            .unwrap()
            .id;
        // And one more level: b attached to the c->ab edge.
        let deep = g
            .create_edge(Role::new(c_ab, "x"), node_role(b, "y"))
            .unwrap()
            .id;

        let report = g.delete_node(a).unwrap();
        let mut removed = report.edge_ids();
        removed.sort();
        assert_eq!(removed, vec![ab, c_ab, deep]);
        assert_eq!(g.edge_count(), 0);
        assert!(g.incident_edges(PlayerRef::Node(b)).unwrap().is_empty());
        assert!(g.incident_edges(PlayerRef::Node(c)).unwrap().is_empty());
        assert!(matches!(g.get_edge(ab), Err(StoreError::EdgeNotFound(_))));
    }

    #[test]
    fn delete_edge_leaves_players() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        let ab = g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap().id;
        let report = g.delete_edge(ab).unwrap();
        assert_eq!(report.edges.len(), 1);
        assert!(report.nodes.is_empty());
        assert_eq!(g.node_count(), 2);
        assert!(matches!(g.delete_edge(ab), Err(StoreError::EdgeNotFound(_))));
    }

    #[test]
    fn deep_edge_chain_deletes_without_recursion() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        let mut prev = g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap().id;
        for _ in 0..10_000 {
            prev = g.create_edge(Role::new(prev, "x"), node_role(b, "y")).unwrap().id;
        }
        let report = g.delete_node(a).unwrap();
        assert_eq!(report.edges.len(), 10_001);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn retarget_role_updates_incidence() {
        let mut g = GraphState::new();
        let parent = g.create_node(None).id;
        let old_child = g.create_node(None).id;
        let new_child = g.create_node(None).id;
        let e = g
            .create_edge(node_role(parent, "parent"), node_role(old_child, "child"))
            .unwrap()
            .id;

        let updated = g
            .set_edge_role(e, RolePosition::Second, node_role(new_child, "child"))
            .unwrap();
        assert_eq!(updated.id, e);
        assert!(g.incident_edges(PlayerRef::Node(old_child)).unwrap().is_empty());
        assert_eq!(g.incident_edges(PlayerRef::Node(new_child)).unwrap()[0].id, e);
        assert_eq!(
            g.get_edges_between(parent, new_child, Some("parent"), Some("child"))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn retarget_rejects_self_and_dangling() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        let e = g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap().id;
        assert!(matches!(
            g.set_edge_role(e, RolePosition::First, Role::new(e, "x")),
            Err(StoreError::SelfReference(_))
        ));
        assert!(matches!(
            g.set_edge_role(e, RolePosition::First, node_role(NodeId(77), "x")),
            Err(StoreError::DanglingPlayer(_))
        ));
    }

    #[test]
    fn edges_between_node_and_edge() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        let one = g.create_node(None).id;
        let def = g.create_edge(node_role(a, "parent_type"), node_role(b, "child_type")).unwrap().id;
        let card = g
            .create_edge(Role::new(def, "assoc_def"), node_role(one, "child_cardinality"))
            .unwrap()
            .id;
        let found = g
            .get_edges_between_node_and_edge(one, def, Some("child_cardinality"), Some("assoc_def"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, card);
        assert!(g
            .get_edges_between_node_and_edge(one, def, Some("parent_cardinality"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn image_roundtrip_rebuilds_indexes() {
        let mut g = GraphState::new();
        let a = g.create_node(Some("A".into())).id;
        let b = g.create_node(None).id;
        g.set_node_property(b, "uri", "b".into()).unwrap();
        let e = g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap().id;
        g.set_edge_property(e, "type_uri", "t".into()).unwrap();

        let restored = GraphState::from_image(g.to_image()).unwrap();
        assert_eq!(restored.get_nodes_by_value("uri", &"b".into()).unwrap()[0].id, b);
        assert_eq!(restored.get_edges_by_value("type_uri", &"t".into()).unwrap()[0].id, e);
        assert_eq!(restored.incident_edges(PlayerRef::Node(a)).unwrap().len(), 1);
        let mut next = restored.clone();
        assert!(next.create_node(None).id.0 > e.0);
    }

    #[test]
    fn image_with_dangling_player_is_corrupt() {
        let mut g = GraphState::new();
        let a = g.create_node(None).id;
        let b = g.create_node(None).id;
        g.create_edge(node_role(a, "x"), node_role(b, "y")).unwrap();
        let mut image = g.to_image();
        image.nodes.retain(|n| n.id != b);
        assert!(matches!(GraphState::from_image(image), Err(StoreError::Corrupt(_))));
    }

    proptest! {
        #[test]
        fn create_edge_then_lookup_returns_exactly_that_edge(
            r1 in "[a-z]{1,6}",
            r2 in "[a-z]{1,6}",
            noise in 0usize..4,
        ) {
            let mut g = GraphState::new();
            let a = g.create_node(None).id;
            let b = g.create_node(None).id;
            let c = g.create_node(None).id;
            for _ in 0..noise {
                g.create_edge(node_role(a, &r1), node_role(c, &r2)).unwrap();
            }
            let e = g.create_edge(node_role(a, &r1), node_role(b, &r2)).unwrap();
            let found = g.get_edges_between(a, b, Some(&r1), Some(&r2)).unwrap();
            prop_assert_eq!(found.len(), 1);
            prop_assert_eq!(found[0].id, e.id);
            let reversed = g.get_edges_between(b, a, Some(&r2), Some(&r1)).unwrap();
            prop_assert_eq!(reversed.len(), 1);
        }
    }
}
