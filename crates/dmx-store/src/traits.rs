use std::sync::Arc;

use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::error::StoreResult;
use crate::graph::{DeleteReport, Edge, Node, Role, RolePosition};

/// Read half of the hypergraph contract.
///
/// Implemented by committed snapshots and by open transactions (which see
/// their own uncommitted writes). Lookups by id fail with
/// [`StoreError::NodeNotFound`] / [`StoreError::EdgeNotFound`]; collection
/// results are ordered by id, which is creation order.
///
/// [`StoreError::NodeNotFound`]: crate::StoreError::NodeNotFound
/// [`StoreError::EdgeNotFound`]: crate::StoreError::EdgeNotFound
pub trait GraphView {
    /// Commit revision this view reflects. Grows by one on every commit.
    fn revision(&self) -> u64;

    fn get_node(&self, id: NodeId) -> StoreResult<Node>;

    fn get_edge(&self, id: EdgeId) -> StoreResult<Edge>;

    /// `true` if the node or edge exists.
    fn contains(&self, player: PlayerRef) -> bool;

    /// Nodes whose property `key` equals `value`. The reserved key
    /// [`VALUE_KEY`](crate::VALUE_KEY) matches the scalar value.
    fn get_nodes_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Node>>;

    /// Edges whose property `key` equals `value`.
    fn get_edges_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Edge>>;

    /// All edges in which `player` plays a role, in creation order.
    fn incident_edges(&self, player: PlayerRef) -> StoreResult<Vec<Edge>>;

    fn node_count(&self) -> usize;

    fn edge_count(&self) -> usize;

    /// Edges connecting `a` and `b` with optional role-type constraints,
    /// matched in either role orientation.
    fn edges_between(
        &self,
        a: PlayerRef,
        role_a: Option<&str>,
        b: PlayerRef,
        role_b: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        Ok(self
            .incident_edges(a)?
            .into_iter()
            .filter(|edge| edge.connects(a, role_a, b, role_b))
            .collect())
    }

    /// Edges between two nodes.
    fn get_edges_between(
        &self,
        node1: NodeId,
        node2: NodeId,
        role_type1: Option<&str>,
        role_type2: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        self.edges_between(node1.into(), role_type1, node2.into(), role_type2)
    }

    /// Edges between a node and an edge.
    fn get_edges_between_node_and_edge(
        &self,
        node: NodeId,
        edge: EdgeId,
        node_role_type: Option<&str>,
        edge_role_type: Option<&str>,
    ) -> StoreResult<Vec<Edge>> {
        self.edges_between(node.into(), node_role_type, edge.into(), edge_role_type)
    }
}

/// Write half of the hypergraph contract.
///
/// A transaction is a private working copy. Nothing it does is visible to
/// other readers until [`commit`](Transaction::commit); dropping it without
/// committing discards every change.
pub trait Transaction: GraphView {
    /// This transaction as a plain read view.
    fn as_view(&self) -> &dyn GraphView;

    fn create_node(&mut self, value: Option<SimpleValue>) -> StoreResult<Node>;

    /// Create an edge. Fails with an integrity error if a player is missing.
    fn create_edge(&mut self, role1: Role, role2: Role) -> StoreResult<Edge>;

    fn set_node_value(&mut self, id: NodeId, value: Option<SimpleValue>) -> StoreResult<()>;

    fn set_node_property(&mut self, id: NodeId, key: &str, value: SimpleValue) -> StoreResult<()>;

    fn remove_node_property(&mut self, id: NodeId, key: &str) -> StoreResult<Option<SimpleValue>>;

    fn set_edge_value(&mut self, id: EdgeId, value: Option<SimpleValue>) -> StoreResult<()>;

    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: SimpleValue) -> StoreResult<()>;

    fn remove_edge_property(&mut self, id: EdgeId, key: &str) -> StoreResult<Option<SimpleValue>>;

    /// Replace one role of an edge in place (retarget). The edge keeps its id.
    fn set_edge_role(&mut self, id: EdgeId, position: RolePosition, role: Role)
        -> StoreResult<Edge>;

    /// Delete a node and, transitively, every edge depending on it.
    fn delete_node(&mut self, id: NodeId) -> StoreResult<DeleteReport>;

    /// Delete an edge and, transitively, every edge depending on it.
    fn delete_edge(&mut self, id: EdgeId) -> StoreResult<DeleteReport>;

    /// Publish all changes atomically.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Discard all changes.
    fn rollback(self: Box<Self>);
}

/// A hypergraph storage engine.
///
/// The engine owns isolation and durability: the core opens one
/// transaction per mutating call and never re-implements locking.
pub trait HypergraphStore: Send + Sync {
    /// Open a write transaction. May block while another writer is active.
    fn begin_tx(&self) -> StoreResult<Box<dyn Transaction + '_>>;

    /// A read view of the latest committed state.
    fn view(&self) -> StoreResult<Box<dyn GraphView + Send + Sync + '_>>;
}

impl<T: GraphView + ?Sized> GraphView for Arc<T> {
    fn revision(&self) -> u64 {
        (**self).revision()
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Node> {
        (**self).get_node(id)
    }

    fn get_edge(&self, id: EdgeId) -> StoreResult<Edge> {
        (**self).get_edge(id)
    }

    fn contains(&self, player: PlayerRef) -> bool {
        (**self).contains(player)
    }

    fn get_nodes_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Node>> {
        (**self).get_nodes_by_value(key, value)
    }

    fn get_edges_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Edge>> {
        (**self).get_edges_by_value(key, value)
    }

    fn incident_edges(&self, player: PlayerRef) -> StoreResult<Vec<Edge>> {
        (**self).incident_edges(player)
    }

    fn node_count(&self) -> usize {
        (**self).node_count()
    }

    fn edge_count(&self) -> usize {
        (**self).edge_count()
    }
}
