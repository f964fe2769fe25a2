//! Lifecycle hooks.
//!
//! Listeners register for a [`HookKind`] and are called in registration
//! order with a [`HookEvent`]. Write-path hooks run inside the transaction
//! and may mutate further through the [`TxContext`]; an error aborts the
//! whole call. Pre-send hooks enrich outgoing models and are best-effort.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use dmx_store::StoreError;

use crate::client::ClientState;
use crate::context::{CoreRead, TxContext};
use crate::error::{CoreError, CoreResult};
use crate::model::ObjectModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookKind {
    PreCreateTopic,
    PostCreateTopic,
    PreUpdateTopic,
    PostUpdateTopic,
    PreDeleteTopic,
    PostDeleteTopic,
    PreSendTopic,
    PreCreateAssociation,
    PostCreateAssociation,
    PreUpdateAssociation,
    PostUpdateAssociation,
    PreDeleteAssociation,
    PostDeleteAssociation,
    PreSendAssociation,
}

impl HookKind {
    pub const ALL: [HookKind; 14] = [
        Self::PreCreateTopic,
        Self::PostCreateTopic,
        Self::PreUpdateTopic,
        Self::PostUpdateTopic,
        Self::PreDeleteTopic,
        Self::PostDeleteTopic,
        Self::PreSendTopic,
        Self::PreCreateAssociation,
        Self::PostCreateAssociation,
        Self::PreUpdateAssociation,
        Self::PostUpdateAssociation,
        Self::PreDeleteAssociation,
        Self::PostDeleteAssociation,
        Self::PreSendAssociation,
    ];

    /// `true` for the read-path hooks.
    pub fn is_pre_send(self) -> bool {
        matches!(self, Self::PreSendTopic | Self::PreSendAssociation)
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Payload handed to every listener.
#[derive(Clone, Debug, PartialEq)]
pub struct HookEvent {
    pub kind: HookKind,
    /// The object concerned. Pre-create and pre-send listeners may modify it.
    pub object: ObjectModel,
    /// State before an update.
    pub old: Option<ObjectModel>,
    pub client: ClientState,
}

/// A lifecycle listener. Implement the callbacks for the hooks you register.
pub trait Listener: Send + Sync {
    fn name(&self) -> &str;

    /// Write-path hooks (create, update, delete).
    fn on_write(&self, ctx: &mut TxContext<'_>, event: &mut HookEvent) -> CoreResult<()> {
        let _ = (ctx, event);
        Ok(())
    }

    /// Pre-send hooks.
    fn on_send(&self, ctx: &dyn CoreRead, event: &mut HookEvent) -> CoreResult<()> {
        let _ = (ctx, event);
        Ok(())
    }
}

/// Write-path listener backed by a closure.
pub struct FnListener<F> {
    name: String,
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(&mut TxContext<'_>, &mut HookEvent) -> CoreResult<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> Listener for FnListener<F>
where
    F: Fn(&mut TxContext<'_>, &mut HookEvent) -> CoreResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn on_write(&self, ctx: &mut TxContext<'_>, event: &mut HookEvent) -> CoreResult<()> {
        (self.f)(ctx, event)
    }
}

/// Enum-keyed dispatch table.
#[derive(Default)]
pub struct EventDispatcher {
    table: RwLock<HashMap<HookKind, Vec<Arc<dyn Listener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: HookKind, listener: Arc<dyn Listener>) -> CoreResult<()> {
        let mut table = self.table.write().map_err(poisoned)?;
        table.entry(kind).or_default().push(listener);
        Ok(())
    }

    /// Listeners of `kind` in registration order. The list is copied so
    /// listeners may register further listeners while being dispatched.
    pub fn listeners(&self, kind: HookKind) -> CoreResult<Vec<Arc<dyn Listener>>> {
        let table = self.table.read().map_err(poisoned)?;
        Ok(table.get(&kind).cloned().unwrap_or_default())
    }

    pub fn listener_count(&self, kind: HookKind) -> usize {
        self.table
            .read()
            .map(|t| t.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let total: usize = HookKind::ALL.iter().map(|k| self.listener_count(*k)).sum();
        f.debug_struct("EventDispatcher").field("listeners", &total).finish()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> CoreError {
    CoreError::Storage(StoreError::LockPoisoned(format!("event dispatcher: {e}")))
}
