//! Deterministic JSON documents for models, types and directives.
//!
//! Field order is fixed: `id`, `uri`, `type_uri`, then `value` or
//! `children`, then role or relating-association metadata.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use dmx_store::Role;
use dmx_types::{PlayerRef, SimpleValue};

use crate::composite::{ChildTopic, ChildValue, CompositeValue};
use crate::directive::{Directive, Directives};
use crate::error::CoreResult;
use crate::model::{AssociationModel, TopicModel, TopicRef};
use crate::object::{Association, Topic};
use crate::schema::{AssocDef, TypeModel};
use crate::traversal::RelatedTopic;

/// Conversion into a serializable document.
pub trait ToDocument {
    type Document: Serialize;

    fn to_document(&self) -> Self::Document;

    fn to_json(&self) -> CoreResult<Value> {
        Ok(serde_json::to_value(self.to_document())?)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopicDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uri: String,
    pub type_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, ChildDocument>,
    /// Id of the association relating a child to its parent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assoc_id: Option<u64>,
}

/// One composite entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChildDocument {
    Topic(Box<TopicDocument>),
    Many(Vec<ChildDocument>),
    Composite(IndexMap<String, ChildDocument>),
    Ref {
        #[serde(rename = "ref")]
        target: String,
    },
    Deletion {
        #[serde(rename = "delete")]
        target: String,
    },
    Value(Value),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoleDocument {
    pub player_id: u64,
    /// `"topic"` or `"association"`.
    pub player_kind: &'static str,
    pub role_type_uri: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssociationDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub uri: String,
    pub type_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, ChildDocument>,
    pub role1: RoleDocument,
    pub role2: RoleDocument,
}

/// A traversal result: the topic plus the association reaching it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelatedTopicDocument {
    #[serde(flatten)]
    pub topic: TopicDocument,
    pub assoc: AssociationDocument,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssocDefDocument {
    pub uri: String,
    pub assoc_type_uri: &'static str,
    pub parent_type_uri: String,
    pub child_type_uri: String,
    pub parent_cardinality_uri: &'static str,
    pub child_cardinality_uri: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_assoc_type_uri: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub view_config: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TypeDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub uri: String,
    pub type_uri: &'static str,
    pub value: String,
    pub data_type_uri: &'static str,
    pub index_mode_uris: Vec<&'static str>,
    pub assoc_defs: Vec<AssocDefDocument>,
    pub label_config: Vec<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub view_config: Value,
}

/// `{"type": "UPDATE_TOPIC", "arg": {...}}`
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirectiveDocument {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub arg: Value,
}

fn scalar(value: &Option<SimpleValue>) -> Option<Value> {
    value.as_ref().map(SimpleValue::to_json)
}

fn ref_target(r: &TopicRef) -> String {
    match r {
        TopicRef::Id(id) => format!("id:{id}"),
        TopicRef::Uri(u) => format!("uri:{u}"),
    }
}

fn children_document(children: &CompositeValue) -> IndexMap<String, ChildDocument> {
    children
        .iter()
        .map(|(key, value)| (key.to_string(), child_document(value)))
        .collect()
}

fn child_document(value: &ChildValue) -> ChildDocument {
    match value {
        ChildValue::Scalar(v) => ChildDocument::Value(v.to_json()),
        ChildValue::Composite(c) => ChildDocument::Composite(children_document(c)),
        ChildValue::Topic(t) => ChildDocument::Topic(Box::new(t.to_document())),
        ChildValue::Ref(r) => ChildDocument::Ref {
            target: ref_target(r),
        },
        ChildValue::Deletion(r) => ChildDocument::Deletion {
            target: ref_target(r),
        },
        ChildValue::Sequence(items) => ChildDocument::Many(items.iter().map(child_document).collect()),
    }
}

impl ToDocument for ChildTopic {
    type Document = TopicDocument;

    fn to_document(&self) -> TopicDocument {
        TopicDocument {
            id: Some(self.id.get()),
            uri: self.uri.clone(),
            type_uri: self.type_uri.clone(),
            value: scalar(&self.value),
            children: children_document(&self.children),
            assoc_id: Some(self.assoc_id.get()),
        }
    }
}

impl ToDocument for TopicModel {
    type Document = TopicDocument;

    fn to_document(&self) -> TopicDocument {
        TopicDocument {
            id: self.id.map(|id| id.get()),
            uri: self.uri.clone(),
            type_uri: self.type_uri.clone(),
            value: scalar(&self.value),
            children: children_document(&self.children),
            assoc_id: None,
        }
    }
}

impl ToDocument for Topic {
    type Document = TopicDocument;

    fn to_document(&self) -> TopicDocument {
        self.model().to_document()
    }
}

impl ToDocument for Role {
    type Document = RoleDocument;

    fn to_document(&self) -> RoleDocument {
        let player_kind = match self.player {
            PlayerRef::Node(_) => "topic",
            PlayerRef::Edge(_) => "association",
        };
        RoleDocument {
            player_id: self.player.raw(),
            player_kind,
            role_type_uri: self.role_type_uri.clone(),
        }
    }
}

impl ToDocument for AssociationModel {
    type Document = AssociationDocument;

    fn to_document(&self) -> AssociationDocument {
        AssociationDocument {
            id: self.id.map(|id| id.get()),
            uri: self.uri.clone(),
            type_uri: self.type_uri.clone(),
            value: scalar(&self.value),
            children: children_document(&self.children),
            role1: self.role1.to_document(),
            role2: self.role2.to_document(),
        }
    }
}

impl ToDocument for Association {
    type Document = AssociationDocument;

    fn to_document(&self) -> AssociationDocument {
        self.model().to_document()
    }
}

impl ToDocument for RelatedTopic {
    type Document = RelatedTopicDocument;

    fn to_document(&self) -> RelatedTopicDocument {
        RelatedTopicDocument {
            topic: self.topic.to_document(),
            assoc: self.assoc.to_document(),
        }
    }
}

impl ToDocument for AssocDef {
    type Document = AssocDefDocument;

    fn to_document(&self) -> AssocDefDocument {
        AssocDefDocument {
            uri: self.uri(),
            assoc_type_uri: self.kind.def_type_uri(),
            parent_type_uri: self.parent_type_uri.clone(),
            child_type_uri: self.child_type_uri.clone(),
            parent_cardinality_uri: self.parent_cardinality.uri(),
            child_cardinality_uri: self.child_cardinality.uri(),
            custom_assoc_type_uri: self.custom_assoc_type_uri.clone(),
            view_config: self.view_config.0.clone(),
        }
    }
}

impl ToDocument for TypeModel {
    type Document = TypeDocument;

    fn to_document(&self) -> TypeDocument {
        TypeDocument {
            id: self.id.map(|id| id.get()),
            uri: self.uri.clone(),
            type_uri: self.kind.uri(),
            value: self.label.clone(),
            data_type_uri: self.data_type.uri(),
            index_mode_uris: self.index_modes.iter().map(|m| m.uri()).collect(),
            assoc_defs: self.assoc_defs.iter().map(ToDocument::to_document).collect(),
            label_config: self.label_config.clone(),
            view_config: self.view_config.0.clone(),
        }
    }
}

impl ToDocument for Directive {
    type Document = DirectiveDocument;

    fn to_document(&self) -> DirectiveDocument {
        let arg = match self {
            Self::CreateTopic(t) | Self::UpdateTopic(t) | Self::DeleteTopic(t) => {
                document_value(t)
            }
            Self::CreateAssociation(a) | Self::UpdateAssociation(a) | Self::DeleteAssociation(a) => {
                document_value(a)
            }
            Self::UpdateChildTopics { parent, key } => {
                serde_json::json!({ "id": parent.get(), "key": key })
            }
            Self::UpdateType(ty) => document_value(ty),
            Self::DeleteType { uri } => serde_json::json!({ "uri": uri }),
        };
        DirectiveDocument {
            kind: self.name(),
            arg,
        }
    }
}

impl ToDocument for Directives {
    type Document = Vec<DirectiveDocument>;

    fn to_document(&self) -> Vec<DirectiveDocument> {
        self.iter().map(ToDocument::to_document).collect()
    }
}

/// Documents hold only strings, numbers and string-keyed maps, which always
/// serialize; a failure degrades to `null`.
fn document_value<D: ToDocument>(item: &D) -> Value {
    item.to_json().unwrap_or(Value::Null)
}
