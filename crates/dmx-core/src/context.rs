//! Read and write contexts.
//!
//! Every mutating call runs inside one [`TxContext`], which owns the storage
//! transaction, accumulates [`Directives`] and dispatches write-path hooks.
//! Reads go through a [`ReadContext`] over an immutable snapshot.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use dmx_store::{GraphView, Role, Transaction};
use dmx_types::uri::{self, prop};
use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::client::ClientState;
use crate::config::CoreConfig;
use crate::directive::{Directive, Directives};
use crate::error::{CoreError, CoreResult};
use crate::event::{HookEvent, HookKind};
use crate::model::{AssociationModel, ObjectModel, TopicModel};
use crate::object::{self, Association, Topic};
use crate::schema::{TypeKind, TypeModel};
use crate::service::CoreService;
use crate::traversal::{self, AutoTyping, RelatedAssociation, RelatedTopic, RoleQuery};
use crate::type_store;
use crate::update::ChangeReport;

/// Read access shared by both contexts.
pub trait CoreRead {
    /// The graph as seen by this context.
    fn graph(&self) -> &dyn GraphView;

    /// A type definition as seen by this context.
    fn get_type(&self, uri: &str) -> CoreResult<Arc<TypeModel>>;

    fn config(&self) -> &CoreConfig;

    fn client(&self) -> &ClientState;
}

/// What a committed transaction leaves behind.
pub(crate) struct Committed {
    pub revision: u64,
    pub directives: Directives,
    pub dirty_types: BTreeSet<String>,
}

/// Context of one mutating call.
pub struct TxContext<'s> {
    core: &'s CoreService,
    tx: Box<dyn Transaction + 's>,
    client: ClientState,
    pub(crate) directives: Directives,
    fired: HashSet<(HookKind, PlayerRef)>,
    /// Types written in this transaction. Their cache entries are bypassed
    /// until commit and invalidated after it.
    pub(crate) dirty_types: BTreeSet<String>,
}

impl<'s> TxContext<'s> {
    pub(crate) fn new(core: &'s CoreService, tx: Box<dyn Transaction + 's>, client: ClientState) -> Self {
        debug!(revision = tx.revision(), "transaction started");
        Self {
            core,
            tx,
            client,
            directives: Directives::new(),
            fired: HashSet::new(),
            dirty_types: BTreeSet::new(),
        }
    }

    /// Revision this transaction will commit as.
    pub fn revision(&self) -> u64 {
        self.tx.revision()
    }

    /// Directives accumulated so far.
    pub fn directives(&self) -> &Directives {
        &self.directives
    }

    /// Append a directive, e.g. from a listener.
    pub fn add_directive(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    pub(crate) fn tx_mut(&mut self) -> &mut (dyn Transaction + 's) {
        &mut *self.tx
    }

    pub(crate) fn commit(self) -> CoreResult<Committed> {
        let revision = self.tx.revision();
        self.tx.commit()?;
        debug!(revision, directives = self.directives.len(), "transaction committed");
        Ok(Committed {
            revision,
            directives: self.directives,
            dirty_types: self.dirty_types,
        })
    }

    pub(crate) fn rollback(self) {
        debug!(revision = self.tx.revision(), "transaction rolled back");
        self.tx.rollback();
    }

    // -----------------------------------------------------------------------
    // Hooks
    // -----------------------------------------------------------------------

    /// Dispatch a write-path hook. Returns the (possibly modified) object.
    /// A `(kind, object)` pair fires at most once per call.
    pub(crate) fn fire(
        &mut self,
        kind: HookKind,
        object: ObjectModel,
        old: Option<ObjectModel>,
    ) -> CoreResult<ObjectModel> {
        if let Some(player) = object.player() {
            if !self.fired.insert((kind, player)) {
                return Ok(object);
            }
        }
        let listeners = self.core.dispatcher().listeners(kind)?;
        if listeners.is_empty() {
            return Ok(object);
        }
        let mut event = HookEvent {
            kind,
            object,
            old,
            client: self.client.clone(),
        };
        for listener in listeners {
            if let Err(source) = listener.on_write(self, &mut event) {
                return Err(CoreError::Listener {
                    hook: kind,
                    listener: listener.name().to_string(),
                    object: event.object.describe(),
                    source: Box::new(source),
                });
            }
        }
        Ok(event.object)
    }

    pub(crate) fn fire_topic(
        &mut self,
        kind: HookKind,
        topic: TopicModel,
        old: Option<TopicModel>,
    ) -> CoreResult<TopicModel> {
        match self.fire(kind, ObjectModel::Topic(topic), old.map(ObjectModel::Topic))? {
            ObjectModel::Topic(t) => Ok(t),
            other => Err(CoreError::integrity(format!(
                "{kind} listener replaced a topic with {}",
                other.describe()
            ))),
        }
    }

    pub(crate) fn fire_association(
        &mut self,
        kind: HookKind,
        assoc: AssociationModel,
        old: Option<AssociationModel>,
    ) -> CoreResult<AssociationModel> {
        match self.fire(
            kind,
            ObjectModel::Association(assoc),
            old.map(ObjectModel::Association),
        )? {
            ObjectModel::Association(a) => Ok(a),
            other => Err(CoreError::integrity(format!(
                "{kind} listener replaced an association with {}",
                other.describe()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// A topic with its children materialized.
    pub fn get_topic(&self, id: NodeId) -> CoreResult<Topic> {
        Ok(Topic::new(id, object::load_topic(self, id)?))
    }

    pub fn get_topic_by_uri(&self, topic_uri: &str) -> CoreResult<Topic> {
        let node = type_store::find_topic_node(self.tx.as_view(), topic_uri)?
            .ok_or_else(|| CoreError::not_found(format!("topic {topic_uri:?}")))?;
        self.get_topic(node.id)
    }

    pub fn get_association(&self, id: EdgeId) -> CoreResult<Association> {
        Ok(Association::new(id, object::load_association(self, id)?))
    }

    pub fn related_topics(&self, player: PlayerRef, query: &RoleQuery) -> CoreResult<Vec<RelatedTopic>> {
        traversal::related_topics(self.tx.as_view(), player, query)
    }

    pub fn related_associations(
        &self,
        player: PlayerRef,
        query: &RoleQuery,
    ) -> CoreResult<Vec<RelatedAssociation>> {
        traversal::related_associations(self.tx.as_view(), player, query)
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    /// Create a topic, including any children given in its composite value.
    pub fn create_topic(&mut self, model: TopicModel) -> CoreResult<Topic> {
        let model = self.fire_topic(HookKind::PreCreateTopic, model, None)?;
        let ty = self.get_type(&model.type_uri)?;
        if ty.kind != TypeKind::TopicType {
            return Err(CoreError::schema(format!("{} is not a topic type", ty.uri)));
        }
        if !model.uri.is_empty() && type_store::uri_in_use(self.tx.as_view(), &model.uri, None)? {
            return Err(CoreError::integrity(format!("uri {:?} is already in use", model.uri)));
        }
        if let (Some(v), true) = (&model.value, ty.data_type.is_simple()) {
            ty.data_type.check(&ty.uri, v)?;
        }

        let node = self.tx.create_node(model.value.clone())?;
        self.tx
            .set_node_property(node.id, prop::TYPE_URI, ty.uri.as_str().into())?;
        if !model.uri.is_empty() {
            self.tx
                .set_node_property(node.id, prop::URI, model.uri.as_str().into())?;
        }
        if !model.children.is_empty() {
            let mut report = ChangeReport::default();
            self.update_children(PlayerRef::Node(node.id), &ty, &model.children, &mut report)?;
        }

        let created = object::load_topic(self, node.id)?;
        self.directives.push(Directive::CreateTopic(created.clone()));
        let created = self.fire_topic(HookKind::PostCreateTopic, created, None)?;
        debug!(topic = %node.id, type_uri = %ty.uri, "created topic");
        Ok(Topic::new(node.id, created))
    }

    /// Apply `model` to the topic `id`. Fields left empty in `model` (uri,
    /// type uri, value, children) are not touched.
    pub fn update_topic(&mut self, id: NodeId, model: TopicModel) -> CoreResult<ChangeReport> {
        self.update_topic_from(id, model, None)
    }

    /// [`update_topic`](Self::update_topic) issued while updating `origin`,
    /// whose label the caller re-derives itself.
    pub(crate) fn update_topic_from(
        &mut self,
        id: NodeId,
        mut model: TopicModel,
        origin: Option<PlayerRef>,
    ) -> CoreResult<ChangeReport> {
        let old = object::load_topic(self, id)?;
        model.id = Some(id);
        let model = self.fire_topic(HookKind::PreUpdateTopic, model, Some(old.clone()))?;
        let report = Topic::new(id, old.clone()).update(self, &model)?;
        let updated = object::load_topic(self, id)?;
        if !report.is_empty() {
            self.directives.push(Directive::UpdateTopic(updated.clone()));
        }
        if report.value_change(PlayerRef::Node(id)).is_some() {
            let parents = self.parents_holding(PlayerRef::Node(id))?;
            self.refresh_labels(parents.into_iter().filter(|p| Some(*p) != origin))?;
        }
        self.fire_topic(HookKind::PostUpdateTopic, updated, Some(old))?;
        Ok(report)
    }

    /// Delete a topic, its composition children (transitively) and every
    /// association depending on any of them. Parents left behind get their
    /// labels re-derived.
    pub fn delete_topic(&mut self, id: NodeId) -> CoreResult<()> {
        let doomed = self.composition_closure(id)?;
        let mut models = Vec::with_capacity(doomed.len());
        for &topic in &doomed {
            let model = object::load_topic(self, topic)?;
            models.push(self.fire_topic(HookKind::PreDeleteTopic, model, None)?);
        }

        let mut parents = Vec::new();
        for &topic in &doomed {
            if self.tx.contains(PlayerRef::Node(topic)) {
                parents.extend(self.remove_with_dependents(PlayerRef::Node(topic))?);
            }
        }

        for model in models {
            self.fire_topic(HookKind::PostDeleteTopic, model, None)?;
        }
        self.refresh_labels(parents)?;
        debug!(topic = %id, cascaded = doomed.len().saturating_sub(1), "deleted topic");
        Ok(())
    }

    /// Remove `root` from storage along with every association depending on
    /// it, dispatching the delete hooks of those associations. Hooks of
    /// `root` itself are the caller's. Returns the parents that lost a child.
    pub(crate) fn remove_with_dependents(&mut self, root: PlayerRef) -> CoreResult<Vec<PlayerRef>> {
        let mut models = Vec::new();
        for edge in self.dependent_edges(root)? {
            let model = object::load_association(self, edge)?;
            models.push(self.fire_association(HookKind::PreDeleteAssociation, model, None)?);
        }

        let removed = match root {
            PlayerRef::Node(id) => self.tx.delete_node(id)?,
            PlayerRef::Edge(id) => self.tx.delete_edge(id)?,
        };
        let mut parents = Vec::new();
        for edge in &removed.edges {
            parents.extend(traversal::parent_player(edge));
            self.directives
                .push(Directive::DeleteAssociation(AssociationModel::from_edge(edge)));
        }
        for node in &removed.nodes {
            self.directives
                .push(Directive::DeleteTopic(TopicModel::from_node(node)));
        }

        for model in models {
            self.fire_association(HookKind::PostDeleteAssociation, model, None)?;
        }
        Ok(parents)
    }

    /// Edges played by `root` and, transitively, edges played by those.
    /// `root` itself is not included.
    fn dependent_edges(&self, root: PlayerRef) -> CoreResult<Vec<EdgeId>> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut worklist = vec![root];
        while let Some(player) = worklist.pop() {
            for edge in self.tx.incident_edges(player)? {
                if PlayerRef::Edge(edge.id) != root && seen.insert(edge.id) {
                    worklist.push(PlayerRef::Edge(edge.id));
                    found.push(edge.id);
                }
            }
        }
        Ok(found)
    }

    /// `root` and every topic it owns through composition, parents first.
    fn composition_closure(&self, root: NodeId) -> CoreResult<Vec<NodeId>> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut worklist = vec![root];
        while let Some(id) = worklist.pop() {
            if !seen.insert(id) {
                continue;
            }
            order.push(id);
            let type_uri = traversal::player_type(self.tx.as_view(), PlayerRef::Node(id))?;
            let ty = match self.get_type(&type_uri) {
                Ok(ty) => ty,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            for def in ty.assoc_defs.iter().filter(|d| d.is_composition()) {
                let children = traversal::related_topics(
                    self.tx.as_view(),
                    PlayerRef::Node(id),
                    &RoleQuery::children_of(def),
                )?;
                worklist.extend(children.into_iter().filter_map(|rt| rt.topic.id));
            }
        }
        Ok(order)
    }

    // -----------------------------------------------------------------------
    // Associations
    // -----------------------------------------------------------------------

    pub fn create_association(&mut self, model: AssociationModel) -> CoreResult<Association> {
        let model = self.fire_association(HookKind::PreCreateAssociation, model, None)?;
        let ty = self.get_type(&model.type_uri)?;
        if ty.kind != TypeKind::AssocType {
            return Err(CoreError::schema(format!("{} is not an association type", ty.uri)));
        }
        if !model.uri.is_empty() && type_store::uri_in_use(self.tx.as_view(), &model.uri, None)? {
            return Err(CoreError::integrity(format!("uri {:?} is already in use", model.uri)));
        }
        if let (Some(v), true) = (&model.value, ty.data_type.is_simple()) {
            ty.data_type.check(&ty.uri, v)?;
        }

        let edge = self.tx.create_edge(model.role1.clone(), model.role2.clone())?;
        if let Some(v) = &model.value {
            self.tx.set_edge_value(edge.id, Some(v.clone()))?;
        }
        self.tx
            .set_edge_property(edge.id, prop::TYPE_URI, ty.uri.as_str().into())?;
        if !model.uri.is_empty() {
            self.tx
                .set_edge_property(edge.id, prop::URI, model.uri.as_str().into())?;
        }
        if !model.children.is_empty() {
            let mut report = ChangeReport::default();
            self.update_children(PlayerRef::Edge(edge.id), &ty, &model.children, &mut report)?;
        }

        let created = object::load_association(self, edge.id)?;
        self.directives
            .push(Directive::CreateAssociation(created.clone()));
        let created = self.fire_association(HookKind::PostCreateAssociation, created, None)?;
        debug!(assoc = %edge.id, type_uri = %ty.uri, "created association");
        Ok(Association::new(edge.id, created))
    }

    /// Apply `model` to the association `id`, including its roles.
    pub fn update_association(
        &mut self,
        id: EdgeId,
        mut model: AssociationModel,
    ) -> CoreResult<ChangeReport> {
        let old = object::load_association(self, id)?;
        model.id = Some(id);
        let model = self.fire_association(HookKind::PreUpdateAssociation, model, Some(old.clone()))?;
        let report = Association::new(id, old.clone()).update(self, &model)?;
        let updated = object::load_association(self, id)?;
        if !report.is_empty() {
            self.directives
                .push(Directive::UpdateAssociation(updated.clone()));
        }
        self.fire_association(HookKind::PostUpdateAssociation, updated, Some(old))?;
        Ok(report)
    }

    /// Delete an association and every association depending on it.
    pub fn delete_association(&mut self, id: EdgeId) -> CoreResult<()> {
        let model = object::load_association(self, id)?;
        let model = self.fire_association(HookKind::PreDeleteAssociation, model, None)?;
        let parents = self.remove_with_dependents(PlayerRef::Edge(id))?;
        self.fire_association(HookKind::PostDeleteAssociation, model, None)?;
        self.refresh_labels(parents)?;
        debug!(assoc = %id, "deleted association");
        Ok(())
    }

    /// Type an untyped association between two typed players.
    ///
    /// Returns the updated association, or `None` (and emits nothing) when
    /// the association is already typed or its players do not match.
    pub fn auto_type(
        &mut self,
        id: EdgeId,
        typing: &AutoTyping,
    ) -> CoreResult<Option<AssociationModel>> {
        let edge = self.tx.get_edge(id)?;
        if edge.prop_str(prop::TYPE_URI) != Some(uri::ASSOCIATION) {
            return Ok(None);
        }
        let type1 = traversal::player_type(self.tx.as_view(), edge.role1.player)?;
        let type2 = traversal::player_type(self.tx.as_view(), edge.role2.player)?;
        let Some((role1, role2)) = typing.roles_for(&type1, &type2) else {
            return Ok(None);
        };
        let ty = self.get_type(&typing.assoc_type_uri)?;
        if ty.kind != TypeKind::AssocType {
            return Err(CoreError::schema(format!("{} is not an association type", ty.uri)));
        }

        let old = object::load_association(self, id)?;
        let mut typed = AssociationModel::new(
            ty.uri.as_str(),
            Role::new(edge.role1.player, role1),
            Role::new(edge.role2.player, role2),
        );
        typed.id = Some(id);
        let typed = self.fire_association(HookKind::PreUpdateAssociation, typed, Some(old.clone()))?;
        let report = self.update_association_object(id, &typed)?;

        let typed = object::load_association(self, id)?;
        if !report.is_empty() {
            self.directives
                .push(Directive::UpdateAssociation(typed.clone()));
        }
        let typed = self.fire_association(HookKind::PostUpdateAssociation, typed, Some(old))?;
        debug!(assoc = %id, type_uri = %ty.uri, "auto-typed association");
        Ok(Some(typed))
    }

    // -----------------------------------------------------------------------
    // Low-level field access shared by the update engine
    // -----------------------------------------------------------------------

    pub(crate) fn stored_value(&self, me: PlayerRef) -> CoreResult<Option<SimpleValue>> {
        Ok(match me {
            PlayerRef::Node(id) => self.tx.get_node(id)?.value,
            PlayerRef::Edge(id) => self.tx.get_edge(id)?.value,
        })
    }

    pub(crate) fn stored_prop(&self, me: PlayerRef, key: &str) -> CoreResult<String> {
        let v = match me {
            PlayerRef::Node(id) => self.tx.get_node(id)?.prop_str(key).map(str::to_string),
            PlayerRef::Edge(id) => self.tx.get_edge(id)?.prop_str(key).map(str::to_string),
        };
        Ok(v.unwrap_or_default())
    }

    pub(crate) fn write_value(&mut self, me: PlayerRef, value: Option<SimpleValue>) -> CoreResult<()> {
        match me {
            PlayerRef::Node(id) => self.tx.set_node_value(id, value)?,
            PlayerRef::Edge(id) => self.tx.set_edge_value(id, value)?,
        }
        Ok(())
    }

    pub(crate) fn write_prop(&mut self, me: PlayerRef, key: &str, value: &str) -> CoreResult<()> {
        match me {
            PlayerRef::Node(id) => self.tx.set_node_property(id, key, value.into())?,
            PlayerRef::Edge(id) => self.tx.set_edge_property(id, key, value.into())?,
        }
        Ok(())
    }
}

impl CoreRead for TxContext<'_> {
    fn graph(&self) -> &dyn GraphView {
        self.tx.as_view()
    }

    fn get_type(&self, uri: &str) -> CoreResult<Arc<TypeModel>> {
        if self.dirty_types.contains(uri) {
            return type_store::load_type(self.tx.as_view(), uri).map(Arc::new);
        }
        // Untouched types read the same in the working copy as in the
        // committed state the transaction started from.
        let base = self.tx.revision().saturating_sub(1);
        self.core
            .cache()
            .get_or_load(uri, base, || type_store::load_type(self.tx.as_view(), uri))
    }

    fn config(&self) -> &CoreConfig {
        self.core.config()
    }

    fn client(&self) -> &ClientState {
        &self.client
    }
}

/// Context of a read: an immutable snapshot plus the caller's client state.
pub struct ReadContext<'s> {
    core: &'s CoreService,
    view: Box<dyn GraphView + Send + Sync + 's>,
    client: ClientState,
}

impl<'s> ReadContext<'s> {
    pub(crate) fn new(
        core: &'s CoreService,
        view: Box<dyn GraphView + Send + Sync + 's>,
        client: ClientState,
    ) -> Self {
        Self { core, view, client }
    }

    /// Revision of the snapshot.
    pub fn revision(&self) -> u64 {
        self.view.revision()
    }

    pub fn get_topic(&self, id: NodeId) -> CoreResult<Topic> {
        let model = object::load_topic(self, id)?;
        Ok(Topic::new(id, self.send_topic(model)))
    }

    pub fn get_topic_by_uri(&self, topic_uri: &str) -> CoreResult<Topic> {
        let node = type_store::find_topic_node(&*self.view, topic_uri)?
            .ok_or_else(|| CoreError::not_found(format!("topic {topic_uri:?}")))?;
        self.get_topic(node.id)
    }

    /// All instances of a topic type, in creation order.
    pub fn get_topics_by_type(&self, type_uri: &str) -> CoreResult<Vec<Topic>> {
        let key = SimpleValue::from(type_uri);
        self.view
            .get_nodes_by_value(prop::TYPE_URI, &key)?
            .into_iter()
            .map(|node| self.get_topic(node.id))
            .collect()
    }

    pub fn get_association(&self, id: EdgeId) -> CoreResult<Association> {
        let model = object::load_association(self, id)?;
        Ok(Association::new(id, self.send_association(model)))
    }

    pub fn related_topics(&self, player: PlayerRef, query: &RoleQuery) -> CoreResult<Vec<RelatedTopic>> {
        Ok(traversal::related_topics(&*self.view, player, query)?
            .into_iter()
            .map(|rt| RelatedTopic {
                topic: self.send_topic(rt.topic),
                assoc: rt.assoc,
            })
            .collect())
    }

    pub fn related_associations(
        &self,
        player: PlayerRef,
        query: &RoleQuery,
    ) -> CoreResult<Vec<RelatedAssociation>> {
        Ok(traversal::related_associations(&*self.view, player, query)?
            .into_iter()
            .map(|ra| RelatedAssociation {
                association: self.send_association(ra.association),
                assoc: ra.assoc,
            })
            .collect())
    }

    fn send_topic(&self, topic: TopicModel) -> TopicModel {
        self.pre_send(
            HookKind::PreSendTopic,
            topic,
            ObjectModel::Topic,
            ObjectModel::into_topic,
        )
    }

    fn send_association(&self, assoc: AssociationModel) -> AssociationModel {
        self.pre_send(
            HookKind::PreSendAssociation,
            assoc,
            ObjectModel::Association,
            ObjectModel::into_association,
        )
    }

    /// Best-effort enrichment: a failing listener is logged and its changes
    /// are discarded; the remaining listeners still run.
    fn pre_send<T: Clone>(
        &self,
        kind: HookKind,
        mut value: T,
        wrap: fn(T) -> ObjectModel,
        unwrap: fn(ObjectModel) -> Option<T>,
    ) -> T {
        let listeners = match self.core.dispatcher().listeners(kind) {
            Ok(l) => l,
            Err(e) => {
                warn!(hook = %kind, error = %e, "pre-send dispatch unavailable");
                return value;
            }
        };
        for listener in listeners {
            let mut event = HookEvent {
                kind,
                object: wrap(value.clone()),
                old: None,
                client: self.client.clone(),
            };
            match listener.on_send(self, &mut event) {
                Ok(()) => match unwrap(event.object) {
                    Some(enriched) => value = enriched,
                    None => warn!(
                        hook = %kind,
                        listener = listener.name(),
                        "pre-send listener changed the object kind; ignored"
                    ),
                },
                Err(e) => warn!(
                    hook = %kind,
                    listener = listener.name(),
                    error = %e,
                    "pre-send listener failed"
                ),
            }
        }
        value
    }
}

impl CoreRead for ReadContext<'_> {
    fn graph(&self) -> &dyn GraphView {
        &*self.view
    }

    fn get_type(&self, uri: &str) -> CoreResult<Arc<TypeModel>> {
        let revision = self.view.revision();
        self.core
            .cache()
            .get_or_load(uri, revision, || type_store::load_type(&*self.view, uri))
    }

    fn config(&self) -> &CoreConfig {
        self.core.config()
    }

    fn client(&self) -> &ClientState {
        &self.client
    }
}
