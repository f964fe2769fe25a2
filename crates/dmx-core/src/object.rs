//! Topic and association handles plus child materialization.

use std::collections::HashSet;

use dmx_store::Role;
use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::composite::{ChildTopic, ChildValue, CompositeValue};
use crate::context::{CoreRead, TxContext};
use crate::error::{CoreError, CoreResult};
use crate::model::{AssociationModel, TopicModel};
use crate::schema::Cardinality;
use crate::traversal::{self, RelatedAssociation, RelatedTopic, RoleQuery};
use crate::update::ChangeReport;

/// Read a topic with its children materialized.
pub(crate) fn load_topic<C: CoreRead + ?Sized>(ctx: &C, id: NodeId) -> CoreResult<TopicModel> {
    let node = ctx.graph().get_node(id)?;
    let mut model = TopicModel::from_node(&node);
    let mut path = HashSet::from([id]);
    model.children = materialize(ctx, PlayerRef::Node(id), &model.type_uri, &mut path, 0)?;
    Ok(model)
}

/// Read an association with its children materialized.
pub(crate) fn load_association<C: CoreRead + ?Sized>(
    ctx: &C,
    id: EdgeId,
) -> CoreResult<AssociationModel> {
    let edge = ctx.graph().get_edge(id)?;
    let mut model = AssociationModel::from_edge(&edge);
    let mut path = HashSet::new();
    model.children = materialize(ctx, PlayerRef::Edge(id), &model.type_uri, &mut path, 0)?;
    Ok(model)
}

/// Build the composite value of `me` from its type's association
/// definitions. Topics already on the current path are emitted without
/// children, as is everything below the configured depth bound.
fn materialize<C: CoreRead + ?Sized>(
    ctx: &C,
    me: PlayerRef,
    type_uri: &str,
    path: &mut HashSet<NodeId>,
    depth: usize,
) -> CoreResult<CompositeValue> {
    let mut out = CompositeValue::new();
    if depth >= ctx.config().max_child_depth {
        return Ok(out);
    }
    let ty = match ctx.get_type(type_uri) {
        Ok(ty) => ty,
        // Bootstrapped meta topics and untyped edges have no definition.
        Err(e) if e.is_not_found() => return Ok(out),
        Err(e) => return Err(e),
    };

    for def in &ty.assoc_defs {
        let mut items = Vec::new();
        for rt in traversal::related_topics(ctx.graph(), me, &RoleQuery::children_of(def))? {
            let (Some(child), Some(assoc_id)) = (rt.topic.id, rt.assoc.id) else {
                continue;
            };
            let children = if path.insert(child) {
                let nested =
                    materialize(ctx, PlayerRef::Node(child), &rt.topic.type_uri, path, depth + 1);
                path.remove(&child);
                nested?
            } else {
                CompositeValue::new()
            };
            items.push(ChildValue::Topic(ChildTopic {
                id: child,
                uri: rt.topic.uri,
                type_uri: rt.topic.type_uri,
                value: rt.topic.value,
                children,
                assoc_id,
            }));
        }
        match def.child_cardinality {
            Cardinality::One => {
                if let Some(first) = items.into_iter().next() {
                    out.set(def.uri(), first);
                }
            }
            Cardinality::Many => {
                if !items.is_empty() {
                    out.set(def.uri(), ChildValue::Sequence(items));
                }
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Topic
// ---------------------------------------------------------------------------

/// A persisted topic as read at some revision.
#[derive(Clone, Debug, PartialEq)]
pub struct Topic {
    id: NodeId,
    model: TopicModel,
}

impl Topic {
    pub(crate) fn new(id: NodeId, mut model: TopicModel) -> Self {
        model.id = Some(id);
        Self { id, model }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.model.uri
    }

    pub fn type_uri(&self) -> &str {
        &self.model.type_uri
    }

    pub fn value(&self) -> Option<&SimpleValue> {
        self.model.value.as_ref()
    }

    /// The children as materialized when this handle was read.
    pub fn children(&self) -> &CompositeValue {
        &self.model.children
    }

    pub fn model(&self) -> &TopicModel {
        &self.model
    }

    pub fn into_model(self) -> TopicModel {
        self.model
    }

    /// Fail with [`CoreError::StaleObject`] if the topic no longer exists.
    pub fn check_live<C: CoreRead + ?Sized>(&self, ctx: &C) -> CoreResult<()> {
        if ctx.graph().contains(PlayerRef::Node(self.id)) {
            Ok(())
        } else {
            Err(CoreError::StaleObject {
                kind: "topic",
                id: self.id.get(),
            })
        }
    }

    /// Re-read this topic in `ctx`.
    pub fn refresh<C: CoreRead + ?Sized>(&self, ctx: &C) -> CoreResult<Topic> {
        self.check_live(ctx)?;
        Ok(Topic::new(self.id, load_topic(ctx, self.id)?))
    }

    pub fn related_topics<C: CoreRead + ?Sized>(
        &self,
        ctx: &C,
        query: &RoleQuery,
    ) -> CoreResult<Vec<RelatedTopic>> {
        self.check_live(ctx)?;
        traversal::related_topics(ctx.graph(), PlayerRef::Node(self.id), query)
    }

    pub fn related_associations<C: CoreRead + ?Sized>(
        &self,
        ctx: &C,
        query: &RoleQuery,
    ) -> CoreResult<Vec<RelatedAssociation>> {
        self.check_live(ctx)?;
        traversal::related_associations(ctx.graph(), PlayerRef::Node(self.id), query)
    }

    /// The current composite value, freshly materialized.
    pub fn child_topics<C: CoreRead + ?Sized>(&self, ctx: &C) -> CoreResult<CompositeValue> {
        self.check_live(ctx)?;
        let mut path = HashSet::from([self.id]);
        let type_uri = traversal::player_type(ctx.graph(), PlayerRef::Node(self.id))?;
        materialize(ctx, PlayerRef::Node(self.id), &type_uri, &mut path, 0)
    }

    /// Diff `new` against the stored topic and write the differences.
    /// Listeners are not fired; [`TxContext::update_topic`] does that.
    pub fn update(&self, ctx: &mut TxContext<'_>, new: &TopicModel) -> CoreResult<ChangeReport> {
        self.check_live(&*ctx)?;
        ctx.update_object(
            PlayerRef::Node(self.id),
            &new.uri,
            &new.type_uri,
            new.value.as_ref(),
            &new.children,
        )
    }

    /// Delete this topic along with the children it owns.
    pub fn delete(self, ctx: &mut TxContext<'_>) -> CoreResult<()> {
        self.check_live(&*ctx)?;
        ctx.delete_topic(self.id)
    }
}

// ---------------------------------------------------------------------------
// Association
// ---------------------------------------------------------------------------

/// A persisted association as read at some revision.
#[derive(Clone, Debug, PartialEq)]
pub struct Association {
    id: EdgeId,
    model: AssociationModel,
}

impl Association {
    pub(crate) fn new(id: EdgeId, mut model: AssociationModel) -> Self {
        model.id = Some(id);
        Self { id, model }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.model.uri
    }

    pub fn type_uri(&self) -> &str {
        &self.model.type_uri
    }

    pub fn value(&self) -> Option<&SimpleValue> {
        self.model.value.as_ref()
    }

    pub fn children(&self) -> &CompositeValue {
        &self.model.children
    }

    pub fn role1(&self) -> &Role {
        &self.model.role1
    }

    pub fn role2(&self) -> &Role {
        &self.model.role2
    }

    /// The player opposite `player`, if `player` takes part.
    pub fn other_player(&self, player: PlayerRef) -> Option<PlayerRef> {
        self.model.other_player(player)
    }

    pub fn model(&self) -> &AssociationModel {
        &self.model
    }

    pub fn into_model(self) -> AssociationModel {
        self.model
    }

    pub fn check_live<C: CoreRead + ?Sized>(&self, ctx: &C) -> CoreResult<()> {
        if ctx.graph().contains(PlayerRef::Edge(self.id)) {
            Ok(())
        } else {
            Err(CoreError::StaleObject {
                kind: "association",
                id: self.id.get(),
            })
        }
    }

    pub fn refresh<C: CoreRead + ?Sized>(&self, ctx: &C) -> CoreResult<Association> {
        self.check_live(ctx)?;
        Ok(Association::new(self.id, load_association(ctx, self.id)?))
    }

    pub fn related_topics<C: CoreRead + ?Sized>(
        &self,
        ctx: &C,
        query: &RoleQuery,
    ) -> CoreResult<Vec<RelatedTopic>> {
        self.check_live(ctx)?;
        traversal::related_topics(ctx.graph(), PlayerRef::Edge(self.id), query)
    }

    pub fn related_associations<C: CoreRead + ?Sized>(
        &self,
        ctx: &C,
        query: &RoleQuery,
    ) -> CoreResult<Vec<RelatedAssociation>> {
        self.check_live(ctx)?;
        traversal::related_associations(ctx.graph(), PlayerRef::Edge(self.id), query)
    }

    pub fn child_topics<C: CoreRead + ?Sized>(&self, ctx: &C) -> CoreResult<CompositeValue> {
        self.check_live(ctx)?;
        let mut path = HashSet::new();
        let type_uri = traversal::player_type(ctx.graph(), PlayerRef::Edge(self.id))?;
        materialize(ctx, PlayerRef::Edge(self.id), &type_uri, &mut path, 0)
    }

    /// Diff `new` (roles included) against the stored association.
    pub fn update(
        &self,
        ctx: &mut TxContext<'_>,
        new: &AssociationModel,
    ) -> CoreResult<ChangeReport> {
        self.check_live(&*ctx)?;
        ctx.update_association_object(self.id, new)
    }

    pub fn delete(self, ctx: &mut TxContext<'_>) -> CoreResult<()> {
        self.check_live(&*ctx)?;
        ctx.delete_association(self.id)
    }
}
