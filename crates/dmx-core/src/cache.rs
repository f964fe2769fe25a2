//! Process-wide cache of type definitions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use dmx_store::StoreError;

use crate::error::{CoreError, CoreResult};
use crate::schema::TypeModel;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<TypeModel>>,
    /// Revision at which each uri was last invalidated. Loads from older
    /// snapshots are returned but not cached.
    floors: HashMap<String, u64>,
}

/// Shared, lazily populated type cache.
///
/// Entries are immutable snapshots: an update replaces the `Arc`, it never
/// mutates a model other readers may hold.
pub struct SchemaCache {
    state: RwLock<CacheState>,
    max_retries: u32,
}

impl SchemaCache {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_retries,
        }
    }

    /// The cached model of `uri`, if any.
    pub fn get(&self, uri: &str) -> CoreResult<Option<Arc<TypeModel>>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.entries.get(uri).cloned())
    }

    /// Return the cached model, or run `loader` against a snapshot at
    /// `revision` and cache the result. Transient loader errors are retried
    /// up to the configured bound.
    pub fn get_or_load(
        &self,
        uri: &str,
        revision: u64,
        mut loader: impl FnMut() -> CoreResult<TypeModel>,
    ) -> CoreResult<Arc<TypeModel>> {
        if let Some(hit) = self.get(uri)? {
            return Ok(hit);
        }

        let mut attempt = 0;
        let model = loop {
            match loader() {
                Ok(model) => break Arc::new(model),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(uri, attempt, error = %e, "retrying schema load");
                }
                Err(e) => return Err(e),
            }
        };

        let mut state = self.state.write().map_err(poisoned)?;
        let floor = state.floors.get(uri).copied().unwrap_or(0);
        if revision >= floor {
            state.entries.insert(uri.to_string(), Arc::clone(&model));
        } else {
            debug!(uri, revision, floor, "not caching type loaded from stale snapshot");
        }
        Ok(model)
    }

    /// Drop the entry of `uri`; loads from snapshots older than `revision`
    /// will no longer be cached.
    pub fn invalidate(&self, uri: &str, revision: u64) -> CoreResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.entries.remove(uri);
        let floor = state.floors.entry(uri.to_string()).or_insert(0);
        *floor = (*floor).max(revision);
        debug!(uri, revision, "invalidated type");
        Ok(())
    }

    pub fn clear(&self) -> CoreResult<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.entries.clear();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.len())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> CoreError {
    CoreError::Storage(StoreError::LockPoisoned(format!("schema cache: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DataType;
    use std::cell::Cell;

    fn model(label: &str) -> TypeModel {
        TypeModel::topic_type("acme.name", label, DataType::Text)
    }

    #[test]
    fn loads_once_then_hits() {
        let cache = SchemaCache::new(3);
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok(model("Name"))
        };
        let a = cache.get_or_load("acme.name", 1, load).unwrap();
        let b = cache.get_or_load("acme.name", 1, load).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_replaces_entry() {
        let cache = SchemaCache::new(3);
        let old = cache.get_or_load("acme.name", 1, || Ok(model("Old"))).unwrap();
        cache.invalidate("acme.name", 2).unwrap();
        assert!(cache.get("acme.name").unwrap().is_none());
        let new = cache.get_or_load("acme.name", 2, || Ok(model("New"))).unwrap();
        assert_eq!(old.label, "Old");
        assert_eq!(new.label, "New");
    }

    #[test]
    fn stale_load_is_not_cached() {
        let cache = SchemaCache::new(3);
        cache.invalidate("acme.name", 5).unwrap();
        let stale = cache.get_or_load("acme.name", 4, || Ok(model("Old"))).unwrap();
        assert_eq!(stale.label, "Old");
        assert!(cache.get("acme.name").unwrap().is_none());
        cache.get_or_load("acme.name", 5, || Ok(model("New"))).unwrap();
        assert_eq!(cache.get("acme.name").unwrap().unwrap().label, "New");
    }

    #[test]
    fn transient_errors_are_retried() {
        let cache = SchemaCache::new(2);
        let calls = Cell::new(0);
        let got = cache
            .get_or_load("acme.name", 1, || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(CoreError::Storage(StoreError::LockPoisoned("busy".into())))
                } else {
                    Ok(model("Name"))
                }
            })
            .unwrap();
        assert_eq!(got.label, "Name");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn retries_are_bounded() {
        let cache = SchemaCache::new(1);
        let calls = Cell::new(0);
        let err = cache
            .get_or_load("acme.name", 1, || {
                calls.set(calls.get() + 1);
                Err(CoreError::Storage(StoreError::LockPoisoned("busy".into())))
            })
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let cache = SchemaCache::new(5);
        let calls = Cell::new(0);
        let err = cache
            .get_or_load("acme.nope", 1, || {
                calls.set(calls.get() + 1);
                Err(CoreError::not_found("type \"acme.nope\""))
            })
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(calls.get(), 1);
        assert!(cache.is_empty());
    }
}
