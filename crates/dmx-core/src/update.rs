//! Composite value updates.
//!
//! Applies a [`CompositeValue`] to a stored parent according to the parent
//! type's association definitions. Each child is given as an inline value, a
//! reference to an existing topic, or a deletion reference:
//!
//! | Cardinality | inline value                          | reference              | deletion             |
//! |-------------|---------------------------------------|------------------------|----------------------|
//! | ONE         | overwrite owned child, else retarget  | retarget relating edge | detach if current    |
//! | MANY        | add a new child                       | add unless related     | detach or `NotFound` |
//!
//! Aggregated simple children reuse an existing topic of the child type with
//! an equal value instead of creating a duplicate. A materialized child topic
//! is related like a reference, then its value and children are written back
//! to it. A child whose definition allows one parent cannot be related to a
//! second one.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use dmx_store::{Role, RolePosition, VALUE_KEY};
use dmx_types::uri::{self, prop};
use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::composite::{ChildTopic, ChildValue, CompositeValue};
use crate::context::{CoreRead, TxContext};
use crate::directive::Directive;
use crate::error::{CoreError, CoreResult};
use crate::event::HookKind;
use crate::model::{AssociationModel, TopicModel, TopicRef};
use crate::object;
use crate::schema::{AssocDef, Cardinality, DataType, TypeKind, TypeModel};
use crate::traversal::{self, RelatedTopic, RoleQuery};
use crate::type_store;

/// One persisted difference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Change {
    TypeChanged {
        object: PlayerRef,
        old: String,
        new: String,
    },
    UriChanged {
        object: PlayerRef,
        old: String,
        new: String,
    },
    ValueChanged {
        object: PlayerRef,
        old: Option<SimpleValue>,
        new: Option<SimpleValue>,
    },
    RoleChanged {
        assoc: EdgeId,
        position: RolePosition,
        old: Role,
        new: Role,
    },
    ChildAdded {
        parent: PlayerRef,
        key: String,
        child: NodeId,
        assoc: EdgeId,
    },
    ChildRetargeted {
        parent: PlayerRef,
        key: String,
        assoc: EdgeId,
        old_child: NodeId,
        new_child: NodeId,
    },
    ChildRemoved {
        parent: PlayerRef,
        key: String,
        child: NodeId,
        assoc: EdgeId,
    },
}

/// Old/new record of everything an update wrote, in write order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeReport {
    changes: Vec<Change>,
}

impl ChangeReport {
    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    /// Move every change of `other` to the end of this report.
    pub fn append(&mut self, other: ChangeReport) {
        self.changes.extend(other.changes);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    /// Old and new scalar value of `object`, if it changed.
    pub fn value_change(
        &self,
        object: PlayerRef,
    ) -> Option<(&Option<SimpleValue>, &Option<SimpleValue>)> {
        self.changes.iter().rev().find_map(|c| match c {
            Change::ValueChanged { object: o, old, new } if *o == object => Some((old, new)),
            _ => None,
        })
    }
}

fn ids_of(rt: &RelatedTopic) -> CoreResult<(NodeId, EdgeId)> {
    match (rt.topic.id, rt.assoc.id) {
        (Some(child), Some(assoc)) => Ok((child, assoc)),
        _ => Err(CoreError::integrity("related topic without storage identity")),
    }
}

impl TxContext<'_> {
    /// Diff the given fields against the stored object and write the
    /// differences. Empty `uri` / `type_uri`, a `None` value and an empty
    /// composite leave the respective field untouched.
    pub(crate) fn update_object(
        &mut self,
        me: PlayerRef,
        new_uri: &str,
        new_type_uri: &str,
        new_value: Option<&SimpleValue>,
        children: &CompositeValue,
    ) -> CoreResult<ChangeReport> {
        let mut report = ChangeReport::default();
        let expected_kind = if me.is_node() {
            TypeKind::TopicType
        } else {
            TypeKind::AssocType
        };

        let current_type = self.stored_prop(me, prop::TYPE_URI)?;
        if !new_type_uri.is_empty() && new_type_uri != current_type {
            let ty = self.get_type(new_type_uri)?;
            if ty.kind != expected_kind {
                return Err(CoreError::schema(format!(
                    "{} cannot be retyped to {}",
                    me, ty.uri
                )));
            }
            self.write_prop(me, prop::TYPE_URI, new_type_uri)?;
            report.push(Change::TypeChanged {
                object: me,
                old: current_type,
                new: new_type_uri.to_string(),
            });
        }
        let ty = self.get_type(&self.stored_prop(me, prop::TYPE_URI)?)?;

        let current_uri = self.stored_prop(me, prop::URI)?;
        if !new_uri.is_empty() && new_uri != current_uri {
            if type_store::uri_in_use(self.graph(), new_uri, Some(me))? {
                return Err(CoreError::integrity(format!("uri {new_uri:?} is already in use")));
            }
            self.write_prop(me, prop::URI, new_uri)?;
            report.push(Change::UriChanged {
                object: me,
                old: current_uri,
                new: new_uri.to_string(),
            });
        }

        if let Some(value) = new_value {
            let current = self.stored_value(me)?;
            if current.as_ref() != Some(value) {
                if ty.data_type.is_simple() {
                    ty.data_type.check(&ty.uri, value)?;
                }
                self.write_value(me, Some(value.clone()))?;
                report.push(Change::ValueChanged {
                    object: me,
                    old: current,
                    new: Some(value.clone()),
                });
            }
        }

        if !children.is_empty() {
            self.update_children(me, &ty, children, &mut report)?;
        }
        Ok(report)
    }

    /// Like [`update_object`](Self::update_object), plus role replacement.
    pub(crate) fn update_association_object(
        &mut self,
        id: EdgeId,
        new: &AssociationModel,
    ) -> CoreResult<ChangeReport> {
        let me = PlayerRef::Edge(id);
        let mut report =
            self.update_object(me, &new.uri, &new.type_uri, new.value.as_ref(), &new.children)?;
        let edge = self.graph().get_edge(id)?;
        for (position, role) in [
            (RolePosition::First, &new.role1),
            (RolePosition::Second, &new.role2),
        ] {
            let old = edge.role(position).clone();
            if &old != role {
                self.tx_mut().set_edge_role(id, position, role.clone())?;
                report.push(Change::RoleChanged {
                    assoc: id,
                    position,
                    old,
                    new: role.clone(),
                });
            }
        }
        Ok(report)
    }

    /// Apply `new` to the children of `parent`.
    pub(crate) fn update_children(
        &mut self,
        parent: PlayerRef,
        parent_type: &TypeModel,
        new: &CompositeValue,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        let mut touched = false;
        for (key, value) in new.iter() {
            let def = parent_type.assoc_def(key).cloned().ok_or_else(|| {
                CoreError::schema(format!("type {} has no child {key:?}", parent_type.uri))
            })?;
            let child_type = self.get_type(&def.child_type_uri)?;
            let before = report.len();

            match def.child_cardinality {
                Cardinality::One => {
                    if let ChildValue::Sequence(items) = value {
                        return Err(CoreError::integrity(format!(
                            "{key:?} of {} takes one child, got {}",
                            parent_type.uri,
                            items.len()
                        )));
                    }
                    self.update_one(parent, &def, &child_type, value, report)?;
                }
                Cardinality::Many => {
                    let items = match value {
                        ChildValue::Sequence(items) => items.as_slice(),
                        single => std::slice::from_ref(single),
                    };
                    for item in items {
                        self.update_many(parent, &def, &child_type, item, report)?;
                    }
                }
            }

            if report.len() > before {
                touched = true;
                if let PlayerRef::Node(p) = parent {
                    self.directives.push(Directive::UpdateChildTopics {
                        parent: p,
                        key: key.to_string(),
                    });
                }
            }
        }
        if touched && parent_type.data_type == DataType::Composite {
            self.refresh_label(parent, parent_type, report)?;
        }
        Ok(())
    }

    fn update_one(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        child_type: &TypeModel,
        value: &ChildValue,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        let existing = self.current_children(parent, def)?.into_iter().next();
        match value {
            ChildValue::Scalar(v) => {
                check_simple(def, child_type, v)?;
                match existing {
                    Some(current) if def.is_composition() => {
                        let (child, _) = ids_of(&current)?;
                        if current.topic.value.as_ref() != Some(v) {
                            self.write_value(PlayerRef::Node(child), Some(v.clone()))?;
                            report.push(Change::ValueChanged {
                                object: PlayerRef::Node(child),
                                old: current.topic.value,
                                new: Some(v.clone()),
                            });
                        }
                        Ok(())
                    }
                    existing => {
                        let target = self.simple_child(def, child_type, v)?;
                        self.relate_one(parent, def, existing, target, report)
                    }
                }
            }
            ChildValue::Composite(composite) => match existing {
                Some(current) if def.is_composition() => {
                    let (child, _) = ids_of(&current)?;
                    self.update_children(PlayerRef::Node(child), child_type, composite, report)
                }
                existing => {
                    let target = self.composite_child(child_type, composite)?;
                    self.relate_one(parent, def, existing, target, report)
                }
            },
            ChildValue::Ref(r) => {
                let target = self.resolve_child(r, def)?;
                self.relate_one(parent, def, existing, target, report)
            }
            ChildValue::Topic(t) => {
                let target = self.resolve_child(&TopicRef::Id(t.id), def)?;
                self.relate_one(parent, def, existing, target, report)?;
                self.update_child_topic(parent, def, t, report)
            }
            ChildValue::Deletion(r) => {
                let target = self.resolve_topic(r)?;
                match existing {
                    Some(current) if current.topic.id == Some(target) => {
                        self.detach(parent, def, &current, report)
                    }
                    _ => Err(CoreError::not_found(format!(
                        "{r} is not the {:?} child of {parent}",
                        def.uri()
                    ))),
                }
            }
            ChildValue::Sequence(_) => Err(CoreError::integrity(format!(
                "{:?} takes one child",
                def.uri()
            ))),
        }
    }

    fn update_many(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        child_type: &TypeModel,
        item: &ChildValue,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        match item {
            ChildValue::Scalar(v) => {
                check_simple(def, child_type, v)?;
                let target = self.simple_child(def, child_type, v)?;
                self.relate_unless_related(parent, def, target, report)
            }
            ChildValue::Composite(composite) => {
                let target = self.composite_child(child_type, composite)?;
                self.relate(parent, def, target, report)
            }
            ChildValue::Ref(r) => {
                let target = self.resolve_child(r, def)?;
                self.relate_unless_related(parent, def, target, report)
            }
            ChildValue::Topic(t) => {
                let target = self.resolve_child(&TopicRef::Id(t.id), def)?;
                self.relate_unless_related(parent, def, target, report)?;
                self.update_child_topic(parent, def, t, report)
            }
            ChildValue::Deletion(r) => {
                let target = self.resolve_topic(r)?;
                let current = self
                    .current_children(parent, def)?
                    .into_iter()
                    .find(|rt| rt.topic.id == Some(target))
                    .ok_or_else(|| {
                        CoreError::not_found(format!(
                            "{r} is not a {:?} child of {parent}",
                            def.uri()
                        ))
                    })?;
                self.detach(parent, def, &current, report)
            }
            ChildValue::Sequence(_) => Err(CoreError::integrity(format!(
                "nested sequence under {:?}",
                def.uri()
            ))),
        }
    }

    fn current_children(&self, parent: PlayerRef, def: &AssocDef) -> CoreResult<Vec<RelatedTopic>> {
        traversal::related_topics(self.graph(), parent, &RoleQuery::children_of(def))
    }

    fn resolve_topic(&self, r: &TopicRef) -> CoreResult<NodeId> {
        match r {
            TopicRef::Id(id) => Ok(self.graph().get_node(*id)?.id),
            TopicRef::Uri(u) => type_store::find_topic_node(self.graph(), u)?
                .map(|n| n.id)
                .ok_or_else(|| CoreError::not_found(format!("topic {u:?}"))),
        }
    }

    /// Resolve a reference and check it has the def's child type.
    fn resolve_child(&self, r: &TopicRef, def: &AssocDef) -> CoreResult<NodeId> {
        let id = self.resolve_topic(r)?;
        let actual = traversal::player_type(self.graph(), PlayerRef::Node(id))?;
        if actual != def.child_type_uri {
            return Err(CoreError::integrity(format!(
                "{r} is a {actual}, expected {}",
                def.child_type_uri
            )));
        }
        Ok(id)
    }

    /// The topic holding `value`: an equal-valued topic of the child type
    /// for aggregations whose children may have many parents, a new topic
    /// otherwise.
    fn simple_child(
        &mut self,
        def: &AssocDef,
        child_type: &TypeModel,
        value: &SimpleValue,
    ) -> CoreResult<NodeId> {
        if !def.is_composition() && def.parent_cardinality == Cardinality::Many {
            let existing = self
                .graph()
                .get_nodes_by_value(VALUE_KEY, value)?
                .into_iter()
                .find(|n| n.prop_str(prop::TYPE_URI) == Some(child_type.uri.as_str()));
            if let Some(node) = existing {
                return Ok(node.id);
            }
        }
        let topic = self.create_topic(TopicModel::new(child_type.uri.as_str()).with_value(value.clone()))?;
        Ok(topic.id())
    }

    fn composite_child(
        &mut self,
        child_type: &TypeModel,
        composite: &CompositeValue,
    ) -> CoreResult<NodeId> {
        let model = TopicModel::new(child_type.uri.as_str()).with_children(composite.clone());
        Ok(self.create_topic(model)?.id())
    }

    /// Write the value and children carried by a materialized child back
    /// to that child. Its type is fixed by `def`.
    fn update_child_topic(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        t: &ChildTopic,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        if !t.type_uri.is_empty() && t.type_uri != def.child_type_uri {
            return Err(CoreError::integrity(format!(
                "topic {} cannot become a {} under {:?}",
                t.id,
                t.type_uri,
                def.uri()
            )));
        }
        let edits = TopicModel {
            uri: t.uri.clone(),
            value: t.value.clone(),
            children: t.children.clone(),
            ..TopicModel::new("")
        };
        let changes = self.update_topic_from(t.id, edits, Some(parent))?;
        report.append(changes);
        Ok(())
    }

    /// Reject relating `target` to `parent` when `def` allows a single
    /// parent and `target` already has another one.
    fn check_parent_cardinality(
        &self,
        parent: PlayerRef,
        def: &AssocDef,
        target: NodeId,
    ) -> CoreResult<()> {
        if def.parent_cardinality != Cardinality::One {
            return Ok(());
        }
        let child = PlayerRef::Node(target);
        for edge in self.graph().incident_edges(child)? {
            if edge.prop_str(prop::TYPE_URI) != Some(def.instance_assoc_type_uri()) {
                continue;
            }
            let Some(owner) = traversal::parent_player(&edge) else {
                continue;
            };
            if owner == child || owner == parent {
                continue;
            }
            if traversal::player_type(self.graph(), owner)? == def.parent_type_uri {
                return Err(CoreError::integrity(format!(
                    "{child} already belongs to {owner} as {:?}",
                    def.uri()
                )));
            }
        }
        Ok(())
    }

    /// Make `target` the single child, retargeting the existing relating
    /// association in place.
    fn relate_one(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        existing: Option<RelatedTopic>,
        target: NodeId,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        let Some(current) = existing else {
            return self.relate(parent, def, target, report);
        };
        let (old_child, assoc) = ids_of(&current)?;
        if old_child == target {
            return Ok(());
        }
        self.check_parent_cardinality(parent, def, target)?;

        let old = object::load_association(self, assoc)?;
        let position = [RolePosition::First, RolePosition::Second]
            .into_iter()
            .find(|&p| old.role(p).matches(PlayerRef::Node(old_child), Some(uri::CHILD)))
            .ok_or_else(|| CoreError::integrity(format!("association {assoc} has no child role")))?;
        let mut retargeted = AssociationModel::new("", old.role1.clone(), old.role2.clone());
        retargeted.id = Some(assoc);
        match position {
            RolePosition::First => retargeted.role1 = Role::new(target, uri::CHILD),
            RolePosition::Second => retargeted.role2 = Role::new(target, uri::CHILD),
        }
        let retargeted =
            self.fire_association(HookKind::PreUpdateAssociation, retargeted, Some(old.clone()))?;
        self.update_association_object(assoc, &retargeted)?;

        report.push(Change::ChildRetargeted {
            parent,
            key: def.uri(),
            assoc,
            old_child,
            new_child: target,
        });
        let updated = object::load_association(self, assoc)?;
        self.directives
            .push(Directive::UpdateAssociation(updated.clone()));
        self.fire_association(HookKind::PostUpdateAssociation, updated, Some(old))?;
        Ok(())
    }

    fn relate_unless_related(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        target: NodeId,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        let related = self
            .current_children(parent, def)?
            .iter()
            .any(|rt| rt.topic.id == Some(target));
        if related {
            return Ok(());
        }
        self.relate(parent, def, target, report)
    }

    /// Create the association relating `target` to `parent`. Listeners may
    /// veto it but its roles and type stay fixed.
    fn relate(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        target: NodeId,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        self.check_parent_cardinality(parent, def, target)?;
        let role1 = Role::new(parent, uri::PARENT);
        let role2 = Role::new(target, uri::CHILD);
        let proposed =
            AssociationModel::new(def.instance_assoc_type_uri(), role1.clone(), role2.clone());
        self.fire_association(HookKind::PreCreateAssociation, proposed, None)?;

        let tx = self.tx_mut();
        let edge = tx.create_edge(role1, role2)?;
        tx.set_edge_property(edge.id, prop::TYPE_URI, def.instance_assoc_type_uri().into())?;
        report.push(Change::ChildAdded {
            parent,
            key: def.uri(),
            child: target,
            assoc: edge.id,
        });
        let created = object::load_association(self, edge.id)?;
        self.directives
            .push(Directive::CreateAssociation(created.clone()));
        self.fire_association(HookKind::PostCreateAssociation, created, None)?;
        Ok(())
    }

    /// Remove the relating association. The child topic itself survives.
    fn detach(
        &mut self,
        parent: PlayerRef,
        def: &AssocDef,
        current: &RelatedTopic,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        let (child, assoc) = ids_of(current)?;
        let model = object::load_association(self, assoc)?;
        let model = self.fire_association(HookKind::PreDeleteAssociation, model, None)?;
        let parents = self.remove_with_dependents(PlayerRef::Edge(assoc))?;
        report.push(Change::ChildRemoved {
            parent,
            key: def.uri(),
            child,
            assoc,
        });
        self.fire_association(HookKind::PostDeleteAssociation, model, None)?;
        self.refresh_labels(parents.into_iter().filter(|p| *p != parent))
    }

    /// Players holding `child` through a parent/child association.
    pub(crate) fn parents_holding(&self, child: PlayerRef) -> CoreResult<Vec<PlayerRef>> {
        Ok(self
            .graph()
            .incident_edges(child)?
            .iter()
            .filter_map(traversal::parent_player)
            .filter(|p| *p != child)
            .collect())
    }

    /// Label of a composite object joined from its label children.
    fn derive_label(&self, me: PlayerRef, ty: &TypeModel) -> CoreResult<Option<SimpleValue>> {
        let mut parts = Vec::new();
        for key in ty.label_keys() {
            let Some(def) = ty.assoc_def(&key) else {
                continue;
            };
            for rt in self.current_children(me, def)? {
                if let Some(v) = rt.topic.value {
                    let text = v.to_string();
                    if !text.is_empty() {
                        parts.push(text);
                    }
                }
            }
        }
        Ok((!parts.is_empty()).then(|| SimpleValue::Text(parts.join(" "))))
    }

    /// Re-derive the label of a composite object from its label children.
    pub(crate) fn refresh_label(
        &mut self,
        me: PlayerRef,
        ty: &TypeModel,
        report: &mut ChangeReport,
    ) -> CoreResult<()> {
        let label = self.derive_label(me, ty)?;
        let old = self.stored_value(me)?;
        if old != label {
            self.write_value(me, label.clone())?;
            report.push(Change::ValueChanged {
                object: me,
                old,
                new: label,
            });
        }
        Ok(())
    }

    /// Re-derive the labels of `parents` after one of their children changed
    /// outside of their own update. A changed label moves on to the parents
    /// holding that object in turn.
    pub(crate) fn refresh_labels(
        &mut self,
        parents: impl IntoIterator<Item = PlayerRef>,
    ) -> CoreResult<()> {
        let mut worklist: Vec<PlayerRef> = parents.into_iter().collect();
        let mut seen = HashSet::new();
        while let Some(me) = worklist.pop() {
            if !seen.insert(me) || !self.graph().contains(me) {
                continue;
            }
            let ty = self.get_type(&self.stored_prop(me, prop::TYPE_URI)?)?;
            if ty.data_type != DataType::Composite {
                continue;
            }
            let label = self.derive_label(me, &ty)?;
            if self.stored_value(me)? == label {
                continue;
            }
            match me {
                PlayerRef::Node(id) => {
                    let old = object::load_topic(self, id)?;
                    let relabeled = TopicModel {
                        value: label.clone(),
                        ..old.clone()
                    };
                    self.fire_topic(HookKind::PreUpdateTopic, relabeled, Some(old.clone()))?;
                    self.write_value(me, label)?;
                    let updated = object::load_topic(self, id)?;
                    self.directives.push(Directive::UpdateTopic(updated.clone()));
                    self.fire_topic(HookKind::PostUpdateTopic, updated, Some(old))?;
                }
                PlayerRef::Edge(id) => {
                    let old = object::load_association(self, id)?;
                    let relabeled = AssociationModel {
                        value: label.clone(),
                        ..old.clone()
                    };
                    self.fire_association(HookKind::PreUpdateAssociation, relabeled, Some(old.clone()))?;
                    self.write_value(me, label)?;
                    let updated = object::load_association(self, id)?;
                    self.directives
                        .push(Directive::UpdateAssociation(updated.clone()));
                    self.fire_association(HookKind::PostUpdateAssociation, updated, Some(old))?;
                }
            }
            debug!(object = %me, "label re-derived");
            worklist.extend(self.parents_holding(me)?);
        }
        Ok(())
    }
}

fn check_simple(def: &AssocDef, child_type: &TypeModel, value: &SimpleValue) -> CoreResult<()> {
    if !child_type.data_type.is_simple() {
        return Err(CoreError::wrong_data_type(
            def.uri(),
            "composite",
            value.kind().to_string(),
        ));
    }
    child_type.data_type.check(&def.uri(), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::client::ClientState;
    use crate::object::Topic;
    use crate::service::CoreService;
    use crate::testing::{
        define_note, define_person, note, person, NAME, NOTE, PERSON, PHONE, STATUS, TAG, TITLE,
    };

    fn service() -> CoreService {
        let svc = CoreService::in_memory().unwrap();
        define_person(&svc).unwrap();
        define_note(&svc).unwrap();
        svc
    }

    fn create(svc: &CoreService, model: TopicModel) -> Topic {
        svc.transaction(ClientState::new(), |ctx| ctx.create_topic(model))
            .unwrap()
            .value
    }

    fn children(svc: &CoreService, parent: NodeId, parent_type: &str, key: &str) -> Vec<RelatedTopic> {
        let ty = svc.get_type(parent_type).unwrap();
        let def = ty.assoc_def(key).unwrap();
        svc.read(ClientState::new())
            .unwrap()
            .related_topics(PlayerRef::Node(parent), &RoleQuery::children_of(def))
            .unwrap()
    }

    fn with_children(children: CompositeValue) -> TopicModel {
        TopicModel::new("").with_children(children)
    }

    #[test]
    fn report_finds_latest_value_change() {
        let me = PlayerRef::Node(NodeId(1));
        let mut r = ChangeReport::default();
        assert!(r.is_empty());
        r.push(Change::ValueChanged {
            object: me,
            old: None,
            new: Some("a".into()),
        });
        r.push(Change::ValueChanged {
            object: me,
            old: Some("a".into()),
            new: Some("b".into()),
        });
        let (old, new) = r.value_change(me).unwrap();
        assert_eq!(old, &Some(SimpleValue::from("a")));
        assert_eq!(new, &Some(SimpleValue::from("b")));
        assert!(r.value_change(PlayerRef::Node(NodeId(2))).is_none());
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn one_child_set_twice_keeps_one_association() {
        let svc = service();
        let ann = create(&svc, person("Ann", &[]));
        let name_id = ann.children().get_topic(NAME).unwrap().id;

        let first = svc
            .transaction(ClientState::new(), |ctx| {
                ctx.update_topic(ann.id(), TopicModel::new("").with_child(NAME, "Bob"))
            })
            .unwrap();
        assert_eq!(first.directives.count("UPDATE_TOPIC"), 1);
        assert_eq!(first.directives.count("UPDATE_CHILD_TOPICS"), 1);

        let second = svc
            .transaction(ClientState::new(), |ctx| {
                ctx.update_topic(ann.id(), TopicModel::new("").with_child(NAME, "Bob"))
            })
            .unwrap();
        assert!(second.value.is_empty());
        assert!(second.directives.is_empty());

        let names = children(&svc, ann.id(), PERSON, NAME);
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].topic.id, Some(name_id));
        assert_eq!(svc.get_topic(ann.id()).unwrap().value(), Some(&"Bob".into()));
    }

    #[test]
    fn one_child_by_ref_retargets_in_place() {
        let svc = service();
        let ann = create(&svc, person("Ann", &[]));
        let old = ann.children().get_topic(NAME).unwrap().clone();
        let cy = create(&svc, TopicModel::new(NAME).with_value("Cy"));

        let out = svc
            .transaction(ClientState::new(), |ctx| {
                let mut c = CompositeValue::new();
                c.set_ref(NAME, cy.id());
                ctx.update_topic(ann.id(), with_children(c))
            })
            .unwrap();
        assert!(out.value.iter().any(|c| matches!(
            c,
            Change::ChildRetargeted { old_child, new_child, .. }
                if *old_child == old.id && *new_child == cy.id()
        )));
        assert_eq!(out.directives.count("UPDATE_ASSOCIATION"), 1);
        assert_eq!(out.directives.count("CREATE_ASSOCIATION"), 0);

        let names = children(&svc, ann.id(), PERSON, NAME);
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].topic.id, Some(cy.id()));
        assert_eq!(names[0].assoc.id, Some(old.assoc_id));
        assert!(svc.get_topic(old.id).is_ok());
        assert_eq!(svc.get_topic(ann.id()).unwrap().value(), Some(&"Cy".into()));
    }

    #[test]
    fn sequence_for_one_child_is_an_integrity_error() {
        let svc = service();
        let err = svc
            .transaction(ClientState::new(), |ctx| {
                ctx.create_topic(
                    TopicModel::new(PERSON)
                        .with_child(NAME, ChildValue::Sequence(vec!["A".into(), "B".into()])),
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)), "{err}");
    }

    #[test]
    fn many_add_ref_twice_is_deduplicated() {
        let svc = service();
        let red = create(&svc, TopicModel::new(TAG).with_value("red"));
        let n = create(&svc, note("n1"));

        let out = svc
            .transaction(ClientState::new(), |ctx| {
                let mut c = CompositeValue::new();
                c.add_ref(TAG, red.id());
                c.add_ref(TAG, red.id());
                ctx.update_topic(n.id(), with_children(c))
            })
            .unwrap();
        assert_eq!(out.directives.count("CREATE_ASSOCIATION"), 1);

        let again = svc
            .transaction(ClientState::new(), |ctx| {
                let mut c = CompositeValue::new();
                c.add_ref(TAG, red.id());
                ctx.update_topic(n.id(), with_children(c))
            })
            .unwrap();
        assert_eq!(again.directives.count("CREATE_ASSOCIATION"), 0);
        assert_eq!(children(&svc, n.id(), NOTE, TAG).len(), 1);
    }

    #[test]
    fn aggregated_scalars_reuse_equal_topics() {
        let svc = service();
        let a = create(&svc, note("a").with_child(TAG, "red"));
        let b = create(&svc, note("b").with_child(TAG, "red"));
        let ta = a.children().get_topics(TAG).unwrap()[0].id;
        let tb = b.children().get_topics(TAG).unwrap()[0].id;
        assert_eq!(ta, tb);

        // Composition never shares.
        let x = create(&svc, note("same"));
        let y = create(&svc, note("same"));
        assert_ne!(
            x.children().get_topic(TITLE).unwrap().id,
            y.children().get_topic(TITLE).unwrap().id
        );
    }

    #[test]
    fn aggregated_one_child_is_retargeted_not_overwritten() {
        let svc = service();
        let a = create(&svc, note("a").with_child(STATUS, "open"));
        let open = a.children().get_topic(STATUS).unwrap().id;

        svc.transaction(ClientState::new(), |ctx| {
            ctx.update_topic(a.id(), TopicModel::new("").with_child(STATUS, "done"))
        })
        .unwrap();

        let a = svc.get_topic(a.id()).unwrap();
        let status = a.children().get_topic(STATUS).unwrap();
        assert_eq!(status.value, Some("done".into()));
        assert_ne!(status.id, open);
        assert_eq!(svc.get_topic(open).unwrap().value(), Some(&"open".into()));
    }

    #[test]
    fn deletion_detaches_and_second_deletion_is_not_found() {
        let svc = service();
        let ann = create(&svc, person("Ann", &["111", "222", "333"]));
        let first = ann.children().get_topics(PHONE).unwrap()[0].id;
        let detach = || {
            let mut c = CompositeValue::new();
            c.add_deletion(PHONE, first);
            with_children(c)
        };

        let out = svc
            .transaction(ClientState::new(), |ctx| ctx.update_topic(ann.id(), detach()))
            .unwrap();
        assert_eq!(out.directives.count("DELETE_ASSOCIATION"), 1);
        assert_eq!(out.directives.count("DELETE_TOPIC"), 0);
        assert_eq!(svc.get_topic(first).unwrap().value(), Some(&"111".into()));
        let left: Vec<_> = children(&svc, ann.id(), PERSON, PHONE)
            .into_iter()
            .map(|rt| rt.topic.value)
            .collect();
        assert_eq!(left, vec![Some("222".into()), Some("333".into())]);
        let ann = svc.get_topic(ann.id()).unwrap();
        let phones: Vec<_> = ann
            .children()
            .get_topics(PHONE)
            .unwrap()
            .into_iter()
            .map(|t| t.value.clone())
            .collect();
        assert_eq!(phones, left);

        let err = svc
            .transaction(ClientState::new(), |ctx| ctx.update_topic(ann.id(), detach()))
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn unknown_child_key_is_a_schema_error() {
        let svc = service();
        let err = svc
            .transaction(ClientState::new(), |ctx| {
                ctx.create_topic(TopicModel::new(PERSON).with_child("acme.shoe", "x"))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Schema(_)), "{err}");
    }

    #[test]
    fn mistyped_children_are_rejected() {
        let svc = service();
        let phone = create(&svc, TopicModel::new(PHONE).with_value("333"));

        let err = svc
            .transaction(ClientState::new(), |ctx| {
                let mut c = CompositeValue::new();
                c.set_ref(NAME, phone.id());
                ctx.create_topic(TopicModel::new(PERSON).with_children(c))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)), "{err}");

        let err = svc
            .transaction(ClientState::new(), |ctx| {
                ctx.create_topic(TopicModel::new(NOTE).with_child(TITLE, true))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::WrongDataType { .. }), "{err}");
    }

    #[test]
    fn single_parent_children_cannot_be_shared() {
        let svc = service();
        let ann = create(&svc, person("Ann", &[]));
        let ann_name = ann.children().get_topic(NAME).unwrap().id;
        let bob = create(&svc, person("Bob", &[]));

        let mut c = CompositeValue::new();
        c.set_ref(NAME, ann_name);
        let err = svc
            .transaction(ClientState::new(), |ctx| {
                ctx.create_topic(TopicModel::new(PERSON).with_children(c.clone()))
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)), "{err}");

        let err = svc
            .transaction(ClientState::new(), |ctx| ctx.update_topic(bob.id(), with_children(c.clone())))
            .unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)), "{err}");

        svc.transaction(ClientState::new(), |ctx| ctx.delete_topic(ann.id()))
            .unwrap();
        let bob = svc.get_topic(bob.id()).unwrap();
        assert_eq!(bob.children().get_string(NAME).unwrap(), "Bob");
        assert_eq!(bob.value(), Some(&"Bob".into()));
    }

    #[test]
    fn shared_aggregated_children_are_allowed() {
        let svc = service();
        let red = create(&svc, TopicModel::new(TAG).with_value("red"));
        for title in ["a", "b"] {
            let mut c = CompositeValue::new();
            c.set(TITLE, title).add_ref(TAG, red.id());
            create(&svc, TopicModel::new(NOTE).with_children(c));
        }
        let parents = svc
            .read(ClientState::new())
            .unwrap()
            .related_topics(PlayerRef::Node(red.id()), &RoleQuery::any().my_role(uri::CHILD))
            .unwrap();
        assert_eq!(parents.len(), 2);
    }

    #[test]
    fn edited_child_topics_are_written_back() {
        let svc = service();
        let ann = create(&svc, person("Ann", &["111"]));
        let mut model = svc.get_topic(ann.id()).unwrap().into_model();
        let mut name = model.children.get_topic(NAME).unwrap().clone();
        let name_id = name.id;
        name.value = Some("Zed".into());
        model.children.set(NAME, ChildValue::Topic(name));

        let out = svc
            .transaction(ClientState::new(), |ctx| ctx.update_topic(ann.id(), model.clone()))
            .unwrap();
        let (old, new) = out.value.value_change(PlayerRef::Node(name_id)).unwrap();
        assert_eq!(old, &Some("Ann".into()));
        assert_eq!(new, &Some("Zed".into()));
        assert_eq!(out.directives.count("UPDATE_TOPIC"), 2);

        let ann = svc.get_topic(ann.id()).unwrap();
        assert_eq!(ann.children().get_string(NAME).unwrap(), "Zed");
        assert_eq!(ann.value(), Some(&"Zed".into()));
        assert_eq!(ann.children().get_topics(PHONE).unwrap().len(), 1);

        // Sending the same model again changes nothing.
        let again = svc
            .transaction(ClientState::new(), |ctx| {
                let mut model = ctx.get_topic(ann.id())?.into_model();
                model.value = None;
                ctx.update_topic(ann.id(), model)
            })
            .unwrap();
        assert!(again.value.is_empty());
    }

    #[test]
    fn child_topics_keep_their_type() {
        let svc = service();
        let ann = create(&svc, person("Ann", &[]));
        let mut model = svc.get_topic(ann.id()).unwrap().into_model();
        let mut name = model.children.get_topic(NAME).unwrap().clone();
        name.type_uri = PHONE.to_string();
        model.children.set(NAME, ChildValue::Topic(name));

        let err = svc
            .transaction(ClientState::new(), |ctx| ctx.update_topic(ann.id(), model.clone()))
            .unwrap_err();
        assert!(matches!(err, CoreError::Integrity(_)), "{err}");
    }
}
