//! Hypergraph storage for DMX.
//!
//! This crate is the leaf of the DMX stack: a domain-agnostic store of nodes
//! and binary hyperedges. Every edge has exactly two [`Role`]s, and a role
//! player may be a node *or another edge*, so edges can connect node↔node,
//! node↔edge, or edge↔edge.
//!
//! # Storage Backends
//!
//! All backends implement the [`HypergraphStore`] trait, which hands out
//! read snapshots ([`GraphView`]) and write [`Transaction`]s:
//!
//! - [`InMemoryHypergraph`] -- arena-backed store for tests and embedding,
//!   persistable through [`snapshot`] files
//!
//! # Design Rules
//!
//! 1. Ids are assigned on first persist and never change.
//! 2. Entities reference each other strictly by id ([`PlayerRef`]).
//! 3. Deleting a node or edge cascades to every edge it plays a role in,
//!    transitively, using an explicit worklist.
//! 4. All mutation happens inside a transaction; dropping an uncommitted
//!    transaction rolls it back.
//! 5. The store never interprets property values -- the object layer does.
//!
//! [`PlayerRef`]: dmx_types::PlayerRef

pub mod error;
pub mod graph;
pub mod memory;
pub mod snapshot;
pub mod state;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use error::{StoreError, StoreResult};
pub use graph::{DeleteReport, Edge, Node, Role, RolePosition, VALUE_KEY};
pub use memory::InMemoryHypergraph;
pub use state::GraphState;
pub use traits::{GraphView, HypergraphStore, Transaction};
