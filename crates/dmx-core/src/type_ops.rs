//! Type definition operations of a [`TxContext`].

use std::sync::Arc;

use tracing::debug;

use dmx_types::uri::{self, prop};
use dmx_types::{PlayerRef, SimpleValue};

use crate::context::{CoreRead, TxContext};
use crate::directive::Directive;
use crate::error::{CoreError, CoreResult};
use crate::schema::{AssocDef, AssocDefKind, TypeKind, TypeModel};
use crate::type_store;

impl TxContext<'_> {
    pub fn create_topic_type(&mut self, model: TypeModel) -> CoreResult<Arc<TypeModel>> {
        if model.kind != TypeKind::TopicType {
            return Err(CoreError::schema(format!("{} is not a topic type", model.uri)));
        }
        self.create_type(model)
    }

    pub fn create_assoc_type(&mut self, model: TypeModel) -> CoreResult<Arc<TypeModel>> {
        if model.kind != TypeKind::AssocType {
            return Err(CoreError::schema(format!(
                "{} is not an association type",
                model.uri
            )));
        }
        self.create_type(model)
    }

    fn create_type(&mut self, mut model: TypeModel) -> CoreResult<Arc<TypeModel>> {
        if model.uri.is_empty() {
            return Err(CoreError::schema("type uri must not be empty"));
        }
        if type_store::uri_in_use(self.graph(), &model.uri, None)? {
            return Err(CoreError::integrity(format!(
                "uri {:?} is already in use",
                model.uri
            )));
        }
        for def in &mut model.assoc_defs {
            if def.parent_type_uri.is_empty() {
                def.parent_type_uri = model.uri.clone();
            }
        }
        for (i, def) in model.assoc_defs.iter().enumerate() {
            self.check_assoc_def(&model.uri, def)?;
            let key = def.uri();
            if model.assoc_defs[..i].iter().any(|d| d.uri() == key) {
                return Err(CoreError::schema(format!(
                    "type {} defines child {key:?} twice",
                    model.uri
                )));
            }
        }
        model.validate_label_config()?;

        let id = type_store::create_type_node(self.tx_mut(), &model)?;
        for (ordinal, def) in model.assoc_defs.iter().enumerate() {
            type_store::write_assoc_def(self.tx_mut(), id, def, ordinal)?;
        }
        debug!(type_uri = %model.uri, defs = model.assoc_defs.len(), "created type");
        self.type_changed(&model.uri)
    }

    /// Validate a definition against the types visible in this transaction.
    fn check_assoc_def(&self, parent_type_uri: &str, def: &AssocDef) -> CoreResult<()> {
        if def.parent_type_uri != parent_type_uri {
            return Err(CoreError::schema(format!(
                "definition of {:?} belongs to {}, not {parent_type_uri}",
                def.uri(),
                def.parent_type_uri
            )));
        }
        if def.child_type_uri == parent_type_uri {
            return Err(CoreError::schema(format!(
                "type {parent_type_uri} cannot be its own child"
            )));
        }
        match self.get_type(&def.child_type_uri) {
            Ok(child) if child.kind == TypeKind::TopicType => {}
            Ok(child) => {
                return Err(CoreError::schema(format!(
                    "child type {} is not a topic type",
                    child.uri
                )))
            }
            Err(e) if e.is_not_found() => {
                return Err(CoreError::schema(format!(
                    "unknown child type {}",
                    def.child_type_uri
                )))
            }
            Err(e) => return Err(e),
        }
        if let Some(custom) = &def.custom_assoc_type_uri {
            match self.get_type(custom) {
                Ok(ty) if ty.kind == TypeKind::AssocType => {}
                Ok(_) => {
                    return Err(CoreError::schema(format!(
                        "custom association type {custom} is not an association type"
                    )))
                }
                Err(e) if e.is_not_found() => {
                    return Err(CoreError::schema(format!(
                        "unknown custom association type {custom}"
                    )))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Insert `def` into its parent type, before the definition `before`
    /// or at the end.
    pub fn add_assoc_def(&mut self, def: AssocDef, before: Option<&str>) -> CoreResult<Arc<TypeModel>> {
        let parent = self.get_type(&def.parent_type_uri)?;
        self.check_assoc_def(&parent.uri, &def)?;
        let key = def.uri();
        if parent.assoc_def(&key).is_some() {
            return Err(CoreError::schema(format!(
                "type {} already has child {key:?}",
                parent.uri
            )));
        }
        let index = match before {
            Some(b) => parent.assoc_def_index(b).ok_or_else(|| {
                CoreError::not_found(format!("child {b:?} of type {}", parent.uri))
            })?,
            None => parent.assoc_defs.len(),
        };
        let type_node = parent
            .id
            .ok_or_else(|| CoreError::integrity(format!("type {} is not persisted", parent.uri)))?;

        let new_id = type_store::write_assoc_def(self.tx_mut(), type_node, &def, index)?;
        let mut order: Vec<_> = parent.assoc_defs.iter().filter_map(|d| d.id).collect();
        order.insert(index.min(order.len()), new_id);
        for (ordinal, edge) in order.into_iter().enumerate() {
            type_store::set_ordinal(self.tx_mut(), edge, ordinal)?;
        }
        debug!(type_uri = %parent.uri, child = %key, index, "added assoc def");
        self.type_changed(&parent.uri)
    }

    /// Remove the definition `def_uri` from `type_uri`. Existing instance
    /// associations are left in place.
    pub fn remove_assoc_def(&mut self, type_uri: &str, def_uri: &str) -> CoreResult<Arc<TypeModel>> {
        let ty = self.get_type(type_uri)?;
        let def = ty
            .assoc_def(def_uri)
            .ok_or_else(|| CoreError::not_found(format!("child {def_uri:?} of type {type_uri}")))?;
        let edge = def
            .id
            .ok_or_else(|| CoreError::integrity(format!("definition {def_uri:?} is not persisted")))?;
        type_store::delete_assoc_def(self.tx_mut(), edge)?;

        if ty.label_config.iter().any(|k| k == def_uri) {
            let mut stripped = (*ty).clone();
            stripped.label_config.retain(|k| k != def_uri);
            if let Some(id) = stripped.id {
                type_store::write_type_props(self.tx_mut(), id, &stripped)?;
            }
        }
        debug!(type_uri, child = def_uri, "removed assoc def");
        self.type_changed(type_uri)
    }

    /// Replace label, data type, index modes, label config and view config.
    /// Association definitions are changed through
    /// [`add_assoc_def`](Self::add_assoc_def) and
    /// [`remove_assoc_def`](Self::remove_assoc_def).
    pub fn update_type(&mut self, model: TypeModel) -> CoreResult<Arc<TypeModel>> {
        let current = self.get_type(&model.uri)?;
        if current.kind != model.kind {
            return Err(CoreError::schema(format!(
                "type {} cannot change its kind",
                model.uri
            )));
        }
        let merged = TypeModel {
            id: current.id,
            assoc_defs: current.assoc_defs.clone(),
            ..model
        };
        merged.validate_label_config()?;
        let id = merged
            .id
            .ok_or_else(|| CoreError::integrity(format!("type {} is not persisted", merged.uri)))?;
        type_store::write_type_props(self.tx_mut(), id, &merged)?;
        debug!(type_uri = %merged.uri, "updated type");
        self.type_changed(&merged.uri)
    }

    /// Delete a type that has no instances and is not referenced by
    /// another type's definitions.
    pub fn delete_type(&mut self, type_uri: &str) -> CoreResult<()> {
        if type_uri.starts_with(uri::CORE_PREFIX) {
            return Err(CoreError::integrity(format!("core type {type_uri} cannot be deleted")));
        }
        let ty = self.get_type(type_uri)?;
        let type_node = ty
            .id
            .ok_or_else(|| CoreError::integrity(format!("type {type_uri} is not persisted")))?;

        let key = SimpleValue::from(type_uri);
        let instances = self.graph().get_nodes_by_value(prop::TYPE_URI, &key)?.len()
            + self.graph().get_edges_by_value(prop::TYPE_URI, &key)?.len();
        if instances > 0 {
            return Err(CoreError::integrity(format!(
                "type {type_uri} still has {instances} instance(s)"
            )));
        }

        let me = PlayerRef::Node(type_node);
        for edge in self.graph().incident_edges(me)? {
            let Some(role) = edge.position_of(me).map(|p| edge.role(p)) else {
                continue;
            };
            let is_def = edge
                .prop_str(prop::TYPE_URI)
                .and_then(AssocDefKind::from_def_type_uri)
                .is_some();
            if (is_def && role.role_type_uri == uri::CHILD_TYPE)
                || role.role_type_uri == uri::CUSTOM_ASSOC_TYPE
            {
                return Err(CoreError::integrity(format!(
                    "type {type_uri} is used by another type's definition"
                )));
            }
        }

        for def in &ty.assoc_defs {
            if let Some(edge) = def.id {
                type_store::delete_assoc_def(self.tx_mut(), edge)?;
            }
        }
        self.tx_mut().delete_node(type_node)?;
        self.dirty_types.insert(type_uri.to_string());
        self.directives.push(Directive::DeleteType {
            uri: type_uri.to_string(),
        });
        debug!(type_uri, "deleted type");
        Ok(())
    }

    /// Mark `type_uri` as written and report its new definition.
    fn type_changed(&mut self, type_uri: &str) -> CoreResult<Arc<TypeModel>> {
        self.dirty_types.insert(type_uri.to_string());
        let ty = self.get_type(type_uri)?;
        self.directives.push(Directive::UpdateType((*ty).clone()));
        Ok(ty)
    }
}
