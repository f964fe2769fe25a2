//! DMX core: typed topics and associations over a hypergraph store.
//!
//! Topics are typed nodes and associations are typed edges of a
//! [`dmx_store::HypergraphStore`]. A [`TypeModel`] declares the data type of
//! its instances and, for composite types, an ordered list of
//! [`AssocDef`]s that say which child topics an instance holds. Children are
//! read and written as a [`CompositeValue`].
//!
//! # Entry Points
//!
//! - [`CoreService`] -- owns the store handle, the [`SchemaCache`] and the
//!   listener table
//! - [`TxContext`] -- one mutating call: create/update/delete topics,
//!   associations and types, accumulate [`Directives`], fire hooks
//! - [`ReadContext`] -- reads over an immutable snapshot with best-effort
//!   pre-send enrichment
//!
//! # Design Rules
//!
//! 1. One mutating call is one storage transaction. Any error rolls it back
//!    and no directives are reported.
//! 2. Write-path listeners run inside the transaction and may mutate further.
//!    A `(hook, object)` pair fires at most once per call.
//! 3. Type definitions are cached as immutable `Arc` snapshots. Writes
//!    invalidate them at the committing revision.
//! 4. Composition children are owned by their parent and deleted with it;
//!    aggregated children are shared and survive.

pub mod cache;
pub mod client;
pub mod composite;
pub mod config;
pub mod context;
pub mod directive;
pub mod document;
pub mod error;
pub mod event;
pub mod model;
pub mod object;
pub mod schema;
pub mod service;
pub mod traversal;
pub mod update;

mod bootstrap;
mod type_ops;
mod type_store;

#[cfg(test)]
mod testing;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::SchemaCache;
pub use client::ClientState;
pub use composite::{ChildTopic, ChildValue, CompositeValue};
pub use config::CoreConfig;
pub use context::{CoreRead, ReadContext, TxContext};
pub use directive::{Directive, Directives};
pub use document::ToDocument;
pub use error::{CoreError, CoreResult};
pub use event::{EventDispatcher, FnListener, HookEvent, HookKind, Listener};
pub use model::{AssociationModel, ObjectModel, TopicModel, TopicRef};
pub use object::{Association, Topic};
pub use schema::{
    AssocDef, AssocDefKind, Cardinality, DataType, IndexMode, TypeKind, TypeModel, ViewConfig,
};
pub use service::{CoreService, Outcome};
pub use traversal::{AutoTyping, RelatedAssociation, RelatedTopic, RoleQuery};
pub use update::{Change, ChangeReport};

pub use dmx_store::{Role, RolePosition};
pub use dmx_types::{uri, EdgeId, NodeId, PlayerRef, SimpleValue, ValueKind};
