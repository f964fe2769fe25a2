use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use tracing::debug;

use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::error::{StoreError, StoreResult};
use crate::graph::{DeleteReport, Edge, Node, Role, RolePosition};
use crate::state::GraphState;
use crate::traits::{GraphView, HypergraphStore, Transaction};

/// In-memory hypergraph engine.
///
/// Intended for tests and embedding. The committed state is an immutable
/// `Arc<GraphState>` snapshot: readers clone the `Arc` and never block
/// writers. Writers are serialized by a writer lock; each transaction works
/// on a private copy of the state and publishes it on commit with a single
/// pointer swap, so readers observe either the old or the new state, never a
/// partial one.
pub struct InMemoryHypergraph {
    committed: RwLock<Arc<GraphState>>,
    writer: Mutex<()>,
}

impl InMemoryHypergraph {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::from_state(GraphState::new())
    }

    /// Create a store whose committed state is `state`.
    pub fn from_state(state: GraphState) -> Self {
        Self {
            committed: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
        }
    }

    /// The latest committed state.
    pub fn snapshot(&self) -> StoreResult<Arc<GraphState>> {
        let committed = self
            .committed
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(Arc::clone(&committed))
    }

    fn publish(&self, state: GraphState) -> StoreResult<()> {
        let mut committed = self
            .committed
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        *committed = Arc::new(state);
        Ok(())
    }
}

impl Default for InMemoryHypergraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryHypergraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("InMemoryHypergraph");
        if let Ok(state) = self.snapshot() {
            s.field("revision", &state.revision())
                .field("node_count", &state.node_count())
                .field("edge_count", &state.edge_count());
        }
        s.finish()
    }
}

impl HypergraphStore for InMemoryHypergraph {
    fn begin_tx(&self) -> StoreResult<Box<dyn Transaction + '_>> {
        let guard = self
            .writer
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        let mut working = (*self.snapshot()?).clone();
        working.bump_revision();
        debug!(revision = working.revision(), "transaction started");
        Ok(Box::new(MemoryTransaction {
            store: self,
            working,
            _writer: guard,
        }))
    }

    fn view(&self) -> StoreResult<Box<dyn GraphView + Send + Sync + '_>> {
        Ok(Box::new(self.snapshot()?))
    }
}

/// A write transaction on an [`InMemoryHypergraph`].
///
/// Holds the writer lock for its whole lifetime.
struct MemoryTransaction<'a> {
    store: &'a InMemoryHypergraph,
    working: GraphState,
    _writer: MutexGuard<'a, ()>,
}

impl GraphView for MemoryTransaction<'_> {
    fn revision(&self) -> u64 {
        self.working.revision()
    }

    fn get_node(&self, id: NodeId) -> StoreResult<Node> {
        self.working.get_node(id)
    }

    fn get_edge(&self, id: EdgeId) -> StoreResult<Edge> {
        self.working.get_edge(id)
    }

    fn contains(&self, player: PlayerRef) -> bool {
        self.working.contains(player)
    }

    fn get_nodes_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Node>> {
        self.working.get_nodes_by_value(key, value)
    }

    fn get_edges_by_value(&self, key: &str, value: &SimpleValue) -> StoreResult<Vec<Edge>> {
        self.working.get_edges_by_value(key, value)
    }

    fn incident_edges(&self, player: PlayerRef) -> StoreResult<Vec<Edge>> {
        self.working.incident_edges(player)
    }

    fn node_count(&self) -> usize {
        self.working.node_count()
    }

    fn edge_count(&self) -> usize {
        self.working.edge_count()
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn as_view(&self) -> &dyn GraphView {
        self
    }

    fn create_node(&mut self, value: Option<SimpleValue>) -> StoreResult<Node> {
        Ok(self.working.create_node(value))
    }

    fn create_edge(&mut self, role1: Role, role2: Role) -> StoreResult<Edge> {
        self.working.create_edge(role1, role2)
    }

    fn set_node_value(&mut self, id: NodeId, value: Option<SimpleValue>) -> StoreResult<()> {
        self.working.set_node_value(id, value)
    }

    fn set_node_property(&mut self, id: NodeId, key: &str, value: SimpleValue) -> StoreResult<()> {
        self.working.set_node_property(id, key, value)
    }

    fn remove_node_property(&mut self, id: NodeId, key: &str) -> StoreResult<Option<SimpleValue>> {
        self.working.remove_node_property(id, key)
    }

    fn set_edge_value(&mut self, id: EdgeId, value: Option<SimpleValue>) -> StoreResult<()> {
        self.working.set_edge_value(id, value)
    }

    fn set_edge_property(&mut self, id: EdgeId, key: &str, value: SimpleValue) -> StoreResult<()> {
        self.working.set_edge_property(id, key, value)
    }

    fn remove_edge_property(&mut self, id: EdgeId, key: &str) -> StoreResult<Option<SimpleValue>> {
        self.working.remove_edge_property(id, key)
    }

    fn set_edge_role(
        &mut self,
        id: EdgeId,
        position: RolePosition,
        role: Role,
    ) -> StoreResult<Edge> {
        self.working.set_edge_role(id, position, role)
    }

    fn delete_node(&mut self, id: NodeId) -> StoreResult<DeleteReport> {
        self.working.delete_node(id)
    }

    fn delete_edge(&mut self, id: EdgeId) -> StoreResult<DeleteReport> {
        self.working.delete_edge(id)
    }

    fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction {
            store,
            working,
            _writer,
        } = *self;
        let revision = working.revision();
        store.publish(working)?;
        debug!(revision, "transaction committed");
        Ok(())
    }

    fn rollback(self: Box<Self>) {
        debug!(revision = self.working.revision(), "transaction rolled back");
    }
}
