//! Revision-tracked migrations for DMX modules.
//!
//! A module (a plugin, an application schema) ships an ordered list of
//! [`Migration`] steps. The [`MigrationRunner`] compares them with the last
//! revision its [`RevisionStore`] recorded for that module and runs only the
//! newer ones, each in its own core transaction.
//!
//! # Modules
//!
//! - [`error`] -- [`MigrateError`] and [`MigrateResult`]
//! - [`traits`] -- the [`Migration`] and [`RevisionStore`] traits
//! - [`runner`] -- [`MigrationRunner`] and the closure-backed [`FnMigration`]
//! - [`memory`] -- [`InMemoryRevisionStore`] for tests
//! - [`file`] -- [`TomlRevisionStore`] for on-disk deployments

pub mod error;
pub mod file;
pub mod memory;
pub mod runner;
pub mod traits;

pub use error::{MigrateError, MigrateResult};
pub use file::TomlRevisionStore;
pub use memory::InMemoryRevisionStore;
pub use runner::{Applied, FnMigration, MigrationReport, MigrationRunner};
pub use traits::{Migration, RevisionStore};
