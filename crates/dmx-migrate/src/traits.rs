//! The [`Migration`] step and the [`RevisionStore`] that remembers which
//! steps ran.

use dmx_core::{CoreResult, TxContext};

use crate::error::MigrateResult;

/// One upgrade step of a module.
///
/// A step runs inside a single core transaction: everything it does commits
/// together or not at all.
pub trait Migration: Send + Sync {
    /// Position of this step in its module's plan. Must be greater than zero.
    fn revision(&self) -> u64;

    fn name(&self) -> &str;

    fn run(&self, ctx: &mut TxContext<'_>) -> CoreResult<()>;
}

/// Persistent "last applied revision" counter per module, kept outside the
/// core's hypergraph.
pub trait RevisionStore: Send + Sync {
    /// The last revision recorded for `module`, or `None` if no step ran.
    fn applied(&self, module: &str) -> MigrateResult<Option<u64>>;

    /// Record `revision` as applied for `module`.
    ///
    /// Fails with [`MigrateError::Regression`](crate::MigrateError::Regression)
    /// unless `revision` is greater than the recorded one.
    fn record(&self, module: &str, revision: u64) -> MigrateResult<()>;

    /// Every module with a recorded revision, sorted by name.
    fn modules(&self) -> MigrateResult<Vec<(String, u64)>>;
}
