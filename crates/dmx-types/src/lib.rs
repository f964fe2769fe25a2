//! Foundation types for DMX.
//!
//! This crate provides the identifiers and scalar values shared by the
//! hypergraph store and the typed object layer built on top of it. Every
//! other DMX crate depends on `dmx-types`.
//!
//! # Key Types
//!
//! - [`NodeId`] / [`EdgeId`] -- Immutable storage identifiers, assigned on first persist
//! - [`PlayerRef`] -- A role player: either a node or an edge (edges may connect edges)
//! - [`SimpleValue`] -- Scalar value carried by nodes, edges, and simple topics
//! - [`uri`] -- URIs of the core meta types, data types, role types, and association types

pub mod error;
pub mod ids;
pub mod uri;
pub mod value;

pub use error::TypeError;
pub use ids::{EdgeId, NodeId, PlayerRef};
pub use value::{SimpleValue, ValueKind};
