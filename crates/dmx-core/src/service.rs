use std::sync::Arc;

use tracing::{debug, info};

use dmx_store::{HypergraphStore, InMemoryHypergraph};
use dmx_types::NodeId;

use crate::bootstrap;
use crate::cache::SchemaCache;
use crate::client::ClientState;
use crate::config::CoreConfig;
use crate::context::{CoreRead, ReadContext, TxContext};
use crate::directive::Directives;
use crate::error::CoreResult;
use crate::event::{EventDispatcher, HookKind, Listener};
use crate::object::Topic;
use crate::schema::TypeModel;

/// Result of a committed mutating call.
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    /// Side effects in the order they happened.
    pub directives: Directives,
}

/// Entry point of the core: owns the store handle, the schema cache and the
/// listener table.
pub struct CoreService {
    store: Arc<dyn HypergraphStore>,
    cache: SchemaCache,
    dispatcher: EventDispatcher,
    config: CoreConfig,
}

impl CoreService {
    /// Wrap `store`, installing the core meta topics when
    /// [`CoreConfig::bootstrap`] is set.
    pub fn new(store: Arc<dyn HypergraphStore>, config: CoreConfig) -> CoreResult<Self> {
        let service = Self {
            store,
            cache: SchemaCache::new(config.schema_cache_retries),
            dispatcher: EventDispatcher::new(),
            config,
        };
        if service.config.bootstrap {
            service.bootstrap()?;
        }
        Ok(service)
    }

    /// A bootstrapped service over a fresh in-memory store.
    pub fn in_memory() -> CoreResult<Self> {
        Self::new(Arc::new(InMemoryHypergraph::new()), CoreConfig::default())
    }

    pub fn store(&self) -> &Arc<dyn HypergraphStore> {
        &self.store
    }

    pub fn cache(&self) -> &SchemaCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn register_listener(&self, kind: HookKind, listener: Arc<dyn Listener>) -> CoreResult<()> {
        debug!(hook = %kind, listener = listener.name(), "registered listener");
        self.dispatcher.register(kind, listener)
    }

    /// Create missing core meta topics. Returns how many were created.
    pub fn bootstrap(&self) -> CoreResult<usize> {
        let mut tx = self.store.begin_tx()?;
        let created = bootstrap::install(&mut *tx)?;
        if created == 0 {
            tx.rollback();
            return Ok(0);
        }
        tx.commit()?;
        info!(created, "core meta model installed");
        Ok(created)
    }

    // ---- Write operations ----

    /// Run `f` in one storage transaction.
    ///
    /// On success the transaction commits and the accumulated directives are
    /// returned. Any error, including a failing write-path listener, rolls
    /// back every change and no directives are reported.
    pub fn transaction<T>(
        &self,
        client: ClientState,
        f: impl FnOnce(&mut TxContext<'_>) -> CoreResult<T>,
    ) -> CoreResult<Outcome<T>> {
        let tx = self.store.begin_tx()?;
        let mut ctx = TxContext::new(self, tx, client);
        let value = match f(&mut ctx) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, "mutating call failed");
                ctx.rollback();
                return Err(e);
            }
        };

        // Invalidate while the writer lock is still held: readers of older
        // snapshots may reload a type but cannot cache it.
        let revision = ctx.revision();
        for uri in &ctx.dirty_types {
            self.cache.invalidate(uri, revision)?;
        }
        let committed = ctx.commit()?;
        if !committed.dirty_types.is_empty() {
            debug!(
                revision = committed.revision,
                types = committed.dirty_types.len(),
                "schema cache invalidated"
            );
        }
        Ok(Outcome {
            value,
            directives: committed.directives,
        })
    }

    // ---- Read operations ----

    /// A read context over the latest committed snapshot.
    pub fn read(&self, client: ClientState) -> CoreResult<ReadContext<'_>> {
        Ok(ReadContext::new(self, self.store.view()?, client))
    }

    /// Latest committed revision.
    pub fn revision(&self) -> CoreResult<u64> {
        Ok(self.store.view()?.revision())
    }

    pub fn get_type(&self, uri: &str) -> CoreResult<Arc<TypeModel>> {
        self.read(ClientState::new())?.get_type(uri)
    }

    pub fn get_topic(&self, id: NodeId) -> CoreResult<Topic> {
        self.read(ClientState::new())?.get_topic(id)
    }

    pub fn get_topic_by_uri(&self, uri: &str) -> CoreResult<Topic> {
        self.read(ClientState::new())?.get_topic_by_uri(uri)
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("cache", &self.cache)
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dmx_store::InMemoryHypergraph;

    use crate::composite::CompositeValue;
    use crate::error::CoreError;
    use crate::event::{FnListener, HookEvent};
    use crate::model::{ObjectModel, TopicModel};
    use crate::testing::{define_person, person, NAME, PERSON, PHONE};

    fn client() -> ClientState {
        ClientState::new()
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let svc = CoreService::in_memory().unwrap();
        let rev = svc.revision().unwrap();
        assert_eq!(svc.bootstrap().unwrap(), 0);
        assert_eq!(svc.revision().unwrap(), rev);
    }

    #[test]
    fn without_bootstrap_types_cannot_be_defined() {
        let config = CoreConfig {
            bootstrap: false,
            ..CoreConfig::default()
        };
        let svc = CoreService::new(Arc::new(InMemoryHypergraph::new()), config).unwrap();
        assert_eq!(svc.revision().unwrap(), 0);
        let err = define_person(&svc).unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)));
    }

    #[test]
    fn person_name_phone_scenario() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();

        let out = svc
            .transaction(client(), |ctx| ctx.create_topic(person("Ann", &["111", "222"])))
            .unwrap();
        let ann = out.value;
        assert_eq!(ann.value(), Some(&"Ann".into()));
        assert_eq!(out.directives.count("CREATE_TOPIC"), 4);
        assert_eq!(out.directives.count("CREATE_ASSOCIATION"), 3);
        assert_eq!(out.directives.count("UPDATE_CHILD_TOPICS"), 2);

        let read = svc.read(client()).unwrap();
        let ann = read.get_topic(ann.id()).unwrap();
        assert_eq!(ann.children().get_string(NAME).unwrap(), "Ann");
        let phones: Vec<_> = ann
            .children()
            .get_topics(PHONE)
            .unwrap()
            .iter()
            .map(|t| t.value.clone())
            .collect();
        assert_eq!(phones, vec![Some("111".into()), Some("222".into())]);
        assert_eq!(read.get_topics_by_type(PERSON).unwrap().len(), 1);
    }

    #[test]
    fn failed_call_reports_nothing_and_rolls_back() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        let before = svc.read(client()).unwrap();
        let (nodes, edges) = (before.graph().node_count(), before.graph().edge_count());

        svc.register_listener(
            HookKind::PostCreateTopic,
            Arc::new(FnListener::new("veto", |_: &mut TxContext<'_>, ev: &mut HookEvent| {
                if ev.object.type_uri() == PHONE {
                    Err(CoreError::integrity("phones are closed"))
                } else {
                    Ok(())
                }
            })),
        )
        .unwrap();

        let err = svc
            .transaction(client(), |ctx| ctx.create_topic(person("Ann", &["111"])))
            .unwrap_err();
        match err {
            CoreError::Listener { hook, listener, .. } => {
                assert_eq!(hook, HookKind::PostCreateTopic);
                assert_eq!(listener, "veto");
            }
            other => panic!("unexpected error: {other}"),
        }

        let after = svc.read(client()).unwrap();
        assert_eq!(after.graph().node_count(), nodes);
        assert_eq!(after.graph().edge_count(), edges);
        assert_eq!(after.revision(), before.revision());
    }

    #[test]
    fn pre_create_listener_may_rewrite_the_object() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        svc.register_listener(
            HookKind::PreCreateTopic,
            Arc::new(FnListener::new("shout", |_: &mut TxContext<'_>, ev: &mut HookEvent| {
                if let ObjectModel::Topic(t) = &mut ev.object {
                    if t.type_uri == NAME {
                        let upper = t.value.as_ref().map(|v| v.to_string().to_uppercase());
                        t.value = upper.map(Into::into);
                    }
                }
                Ok(())
            })),
        )
        .unwrap();

        let ann = svc
            .transaction(client(), |ctx| ctx.create_topic(person("Ann", &[])))
            .unwrap()
            .value;
        let ann = svc.get_topic(ann.id()).unwrap();
        assert_eq!(ann.children().get_string(NAME).unwrap(), "ANN");
        assert_eq!(ann.value(), Some(&"ANN".into()));
    }

    #[test]
    fn each_hook_fires_once_per_object() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        let ann = svc
            .transaction(client(), |ctx| ctx.create_topic(person("Ann", &[])))
            .unwrap()
            .value;

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        svc.register_listener(
            HookKind::PostUpdateTopic,
            Arc::new(FnListener::new("count", move |_: &mut TxContext<'_>, _: &mut HookEvent| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })),
        )
        .unwrap();

        svc.transaction(client(), |ctx| {
            ctx.update_topic(ann.id(), TopicModel::new("").with_value("x"))?;
            ctx.update_topic(ann.id(), TopicModel::new("").with_value("y"))
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_scalar_updates_serialize() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        let ann = svc
            .transaction(client(), |ctx| ctx.create_topic(person("Ann", &[])))
            .unwrap()
            .value;
        let name_id = ann.children().get_topic(NAME).unwrap().id;

        std::thread::scope(|s| {
            for v in ["Bea", "Cy"] {
                let svc = &svc;
                s.spawn(move || {
                    svc.transaction(ClientState::new(), |ctx| {
                        ctx.update_topic(name_id, TopicModel::new("").with_value(v))
                    })
                    .unwrap();
                });
            }
        });

        let name = svc.get_topic(name_id).unwrap();
        let value = name.value().map(ToString::to_string);
        assert!(
            value.as_deref() == Some("Bea") || value.as_deref() == Some("Cy"),
            "got {value:?}"
        );
    }

    #[test]
    fn type_updates_are_visible_after_commit() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        assert_eq!(svc.get_type(NAME).unwrap().label, "Name");

        let renamed = TypeModel::clone(&svc.get_type(NAME).unwrap());
        svc.transaction(client(), |ctx| {
            ctx.update_type(TypeModel {
                label: "Full Name".into(),
                ..renamed
            })
        })
        .unwrap();
        assert_eq!(svc.get_type(NAME).unwrap().label, "Full Name");
    }

    #[test]
    fn composite_children_from_an_explicit_value() {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        let children = CompositeValue::new().with(NAME, "Dee");
        let dee = svc
            .transaction(client(), |ctx| {
                ctx.create_topic(TopicModel::new(PERSON).with_children(children))
            })
            .unwrap()
            .value;
        assert_eq!(dee.value(), Some(&"Dee".into()));
        assert!(dee.children().get_topics(PHONE).is_err());
    }
}
