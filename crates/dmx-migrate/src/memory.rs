//! In-memory revision tracking for tests and ephemeral stores.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::{MigrateError, MigrateResult};
use crate::traits::RevisionStore;

/// A [`RevisionStore`] that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct InMemoryRevisionStore {
    revisions: RwLock<BTreeMap<String, u64>>,
}

impl InMemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevisionStore for InMemoryRevisionStore {
    fn applied(&self, module: &str) -> MigrateResult<Option<u64>> {
        let revisions = self
            .revisions
            .read()
            .map_err(|e| MigrateError::LockPoisoned(e.to_string()))?;
        Ok(revisions.get(module).copied())
    }

    fn record(&self, module: &str, revision: u64) -> MigrateResult<()> {
        let mut revisions = self
            .revisions
            .write()
            .map_err(|e| MigrateError::LockPoisoned(e.to_string()))?;
        advance(&mut revisions, module, revision)
    }

    fn modules(&self) -> MigrateResult<Vec<(String, u64)>> {
        let revisions = self
            .revisions
            .read()
            .map_err(|e| MigrateError::LockPoisoned(e.to_string()))?;
        Ok(revisions.iter().map(|(m, r)| (m.clone(), *r)).collect())
    }
}

/// Move `module` forward to `revision`, rejecting anything else.
pub(crate) fn advance(
    revisions: &mut BTreeMap<String, u64>,
    module: &str,
    revision: u64,
) -> MigrateResult<()> {
    let current = revisions.get(module).copied().unwrap_or(0);
    if revision <= current {
        return Err(MigrateError::Regression {
            module: module.to_string(),
            current,
            attempted: revision,
        });
    }
    revisions.insert(module.to_string(), revision);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_module_has_no_revision() {
        let store = InMemoryRevisionStore::new();
        assert_eq!(store.applied("acme.notes").unwrap(), None);
        assert!(store.modules().unwrap().is_empty());
    }

    #[test]
    fn record_only_moves_forward() {
        let store = InMemoryRevisionStore::new();
        store.record("acme.notes", 2).unwrap();
        assert_eq!(store.applied("acme.notes").unwrap(), Some(2));

        let err = store.record("acme.notes", 2).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Regression { current: 2, attempted: 2, .. }
        ));
        assert!(store.record("acme.notes", 1).is_err());
        store.record("acme.notes", 5).unwrap();
        assert_eq!(store.applied("acme.notes").unwrap(), Some(5));
    }

    #[test]
    fn revision_zero_is_never_recorded() {
        let store = InMemoryRevisionStore::new();
        assert!(store.record("acme.notes", 0).is_err());
    }

    #[test]
    fn modules_are_sorted() {
        let store = InMemoryRevisionStore::new();
        store.record("zeta", 1).unwrap();
        store.record("alpha", 3).unwrap();
        assert_eq!(
            store.modules().unwrap(),
            vec![("alpha".to_string(), 3), ("zeta".to_string(), 1)]
        );
    }
}
