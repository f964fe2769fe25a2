//! Revision tracking in a TOML file next to the snapshot.
//!
//! ```toml
//! [modules]
//! "acme.notes" = 3
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateError, MigrateResult};
use crate::memory::advance;
use crate::traits::RevisionStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RevisionFile {
    #[serde(default)]
    modules: BTreeMap<String, u64>,
}

/// A [`RevisionStore`] persisted as a TOML file.
///
/// The file is re-read on every call and replaced atomically on every
/// record, so several processes may share it as long as they do not record
/// concurrently.
#[derive(Debug)]
pub struct TomlRevisionStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TomlRevisionStore {
    /// Track revisions in `path`. A missing file means nothing ran yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> MigrateResult<RevisionFile> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RevisionFile::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&text).map_err(|e| {
            MigrateError::Serialization(format!("{}: {e}", self.path.display()))
        })
    }

    fn write_file(&self, file: &RevisionFile) -> MigrateResult<()> {
        let text =
            toml::to_string(file).map_err(|e| MigrateError::Serialization(e.to_string()))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(text.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| MigrateError::Io(e.error))?;
        Ok(())
    }
}

impl RevisionStore for TomlRevisionStore {
    fn applied(&self, module: &str) -> MigrateResult<Option<u64>> {
        Ok(self.read_file()?.modules.get(module).copied())
    }

    fn record(&self, module: &str, revision: u64) -> MigrateResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| MigrateError::LockPoisoned(e.to_string()))?;
        let mut file = self.read_file()?;
        advance(&mut file.modules, module, revision)?;
        self.write_file(&file)?;
        debug!(module, revision, path = %self.path.display(), "revision recorded");
        Ok(())
    }

    fn modules(&self) -> MigrateResult<Vec<(String, u64)>> {
        Ok(self.read_file()?.modules.into_iter().collect())
    }
}
