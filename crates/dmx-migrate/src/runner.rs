//! Running a module's migrations in revision order, each at most once.

use dmx_core::{ClientState, CoreResult, CoreService, Directives, TxContext};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, MigrateResult};
use crate::traits::{Migration, RevisionStore};

/// A [`Migration`] backed by a closure.
pub struct FnMigration<F> {
    revision: u64,
    name: String,
    f: F,
}

impl<F> FnMigration<F>
where
    F: Fn(&mut TxContext<'_>) -> CoreResult<()> + Send + Sync,
{
    pub fn new(revision: u64, name: impl Into<String>, f: F) -> Self {
        Self {
            revision,
            name: name.into(),
            f,
        }
    }
}

impl<F> Migration for FnMigration<F>
where
    F: Fn(&mut TxContext<'_>) -> CoreResult<()> + Send + Sync,
{
    fn revision(&self) -> u64 {
        self.revision
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut TxContext<'_>) -> CoreResult<()> {
        (self.f)(ctx)
    }
}

/// A step that ran and committed.
#[derive(Debug)]
pub struct Applied {
    pub revision: u64,
    pub name: String,
    pub directives: Directives,
}

/// What one [`MigrationRunner::run`] did.
#[derive(Debug)]
pub struct MigrationReport {
    pub module: String,
    /// Revision recorded before the run.
    pub from: Option<u64>,
    pub applied: Vec<Applied>,
}

impl MigrationReport {
    /// Revision recorded after the run.
    pub fn to(&self) -> Option<u64> {
        self.applied.last().map(|a| a.revision).or(self.from)
    }

    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// The ordered migrations of one logical module.
pub struct MigrationRunner {
    module: String,
    steps: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step. Steps must be added in strictly increasing revision
    /// order; [`validate`](Self::validate) checks this.
    pub fn add(&mut self, step: impl Migration + 'static) -> &mut Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn with(mut self, step: impl Migration + 'static) -> Self {
        self.add(step);
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// The highest revision this runner knows about.
    pub fn latest(&self) -> Option<u64> {
        self.steps.last().map(|s| s.revision())
    }

    /// Revisions must be positive, unique and strictly increasing.
    pub fn validate(&self) -> MigrateResult<()> {
        let mut previous = 0;
        for step in &self.steps {
            let revision = step.revision();
            if revision <= previous {
                return Err(MigrateError::InvalidPlan {
                    module: self.module.clone(),
                    reason: if revision == 0 {
                        format!("{:?} has revision 0", step.name())
                    } else {
                        format!(
                            "{:?} (revision {revision}) does not follow revision {previous}",
                            step.name()
                        )
                    },
                });
            }
            previous = revision;
        }
        Ok(())
    }

    /// Steps newer than the revision recorded in `revisions`.
    pub fn pending(&self, revisions: &dyn RevisionStore) -> MigrateResult<Vec<&dyn Migration>> {
        self.validate()?;
        let applied = revisions.applied(&self.module)?.unwrap_or(0);
        Ok(self
            .steps
            .iter()
            .filter(|s| s.revision() > applied)
            .map(|s| s.as_ref())
            .collect())
    }

    /// Run every pending step, in order, each in its own core transaction.
    ///
    /// A step's revision is recorded right after its transaction commits. The
    /// first failing step stops the run; steps before it stay applied and
    /// recorded.
    pub fn run(
        &self,
        core: &CoreService,
        revisions: &dyn RevisionStore,
    ) -> MigrateResult<MigrationReport> {
        let from = revisions.applied(&self.module)?;
        let mut report = MigrationReport {
            module: self.module.clone(),
            from,
            applied: Vec::new(),
        };

        let pending = self.pending(revisions)?;
        if pending.is_empty() {
            debug!(module = %self.module, revision = ?from, "migrations up to date");
            return Ok(report);
        }

        for step in pending {
            let revision = step.revision();
            let outcome = core
                .transaction(ClientState::new(), |ctx| step.run(ctx))
                .map_err(|source| {
                    warn!(
                        module = %self.module,
                        revision,
                        name = step.name(),
                        error = %source,
                        "migration failed"
                    );
                    MigrateError::Failed {
                        module: self.module.clone(),
                        revision,
                        name: step.name().to_string(),
                        source,
                    }
                })?;
            revisions.record(&self.module, revision)?;
            info!(
                module = %self.module,
                revision,
                name = step.name(),
                directives = outcome.directives.len(),
                "migration applied"
            );
            report.applied.push(Applied {
                revision,
                name: step.name().to_string(),
                directives: outcome.directives,
            });
        }
        Ok(report)
    }
}

impl std::fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("module", &self.module)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.revision()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
