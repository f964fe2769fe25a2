//! Type definitions: topic types, association types and their
//! association definitions.

use serde::{Deserialize, Serialize};

use dmx_types::uri;
use dmx_types::{EdgeId, NodeId, SimpleValue, ValueKind};

use crate::error::{CoreError, CoreResult};

/// Whether a type describes topics or associations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    TopicType,
    AssocType,
}

impl TypeKind {
    pub fn uri(self) -> &'static str {
        match self {
            Self::TopicType => uri::TOPIC_TYPE,
            Self::AssocType => uri::ASSOC_TYPE,
        }
    }

    pub fn from_uri(u: &str) -> Option<Self> {
        match u {
            uri::TOPIC_TYPE => Some(Self::TopicType),
            uri::ASSOC_TYPE => Some(Self::AssocType),
            _ => None,
        }
    }
}

/// Data type of a type's instances.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Text,
    Html,
    Number,
    Boolean,
    Reference,
    Composite,
}

impl DataType {
    pub fn uri(self) -> &'static str {
        match self {
            Self::Text => uri::TEXT,
            Self::Html => uri::HTML,
            Self::Number => uri::NUMBER,
            Self::Boolean => uri::BOOLEAN,
            Self::Reference => uri::REFERENCE,
            Self::Composite => uri::COMPOSITE,
        }
    }

    pub fn from_uri(u: &str) -> CoreResult<Self> {
        Ok(match u {
            uri::TEXT => Self::Text,
            uri::HTML => Self::Html,
            uri::NUMBER => Self::Number,
            uri::BOOLEAN => Self::Boolean,
            uri::REFERENCE => Self::Reference,
            uri::COMPOSITE => Self::Composite,
            other => return Err(CoreError::schema(format!("unknown data type {other:?}"))),
        })
    }

    pub fn is_simple(self) -> bool {
        self != Self::Composite
    }

    /// The scalar kind used when parsing textual input for this data type.
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Number => ValueKind::Float,
            Self::Boolean => ValueKind::Bool,
            _ => ValueKind::Text,
        }
    }

    /// `true` if `value` is a legal scalar for this data type.
    pub fn accepts(self, value: &SimpleValue) -> bool {
        match self {
            Self::Text | Self::Html | Self::Reference | Self::Composite => {
                value.kind() == ValueKind::Text
            }
            Self::Number => matches!(value.kind(), ValueKind::Int | ValueKind::Float),
            Self::Boolean => value.kind() == ValueKind::Bool,
        }
    }

    /// Check `value` against this data type.
    pub fn check(self, key: &str, value: &SimpleValue) -> CoreResult<()> {
        if self.accepts(value) {
            Ok(())
        } else {
            Err(CoreError::wrong_data_type(
                key,
                self.uri(),
                value.kind().to_string(),
            ))
        }
    }
}

/// How many children (or parents) an association definition allows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn uri(self) -> &'static str {
        match self {
            Self::One => uri::ONE,
            Self::Many => uri::MANY,
        }
    }

    pub fn from_uri(u: &str) -> CoreResult<Self> {
        match u {
            uri::ONE => Ok(Self::One),
            uri::MANY => Ok(Self::Many),
            other => Err(CoreError::schema(format!("unknown cardinality {other:?}"))),
        }
    }
}

/// Index modes requested for a type's values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexMode {
    Off,
    Key,
    Fulltext,
    FulltextKey,
}

impl IndexMode {
    pub fn uri(self) -> &'static str {
        match self {
            Self::Off => uri::INDEX_OFF,
            Self::Key => uri::INDEX_KEY,
            Self::Fulltext => uri::INDEX_FULLTEXT,
            Self::FulltextKey => uri::INDEX_FULLTEXT_KEY,
        }
    }

    pub fn from_uri(u: &str) -> CoreResult<Self> {
        match u {
            uri::INDEX_OFF => Ok(Self::Off),
            uri::INDEX_KEY => Ok(Self::Key),
            uri::INDEX_FULLTEXT => Ok(Self::Fulltext),
            uri::INDEX_FULLTEXT_KEY => Ok(Self::FulltextKey),
            other => Err(CoreError::schema(format!("unknown index mode {other:?}"))),
        }
    }
}

/// Composition (child owned by the parent) or aggregation (child independent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssocDefKind {
    Composition,
    Aggregation,
}

impl AssocDefKind {
    /// Type uri of the definition edge itself.
    pub fn def_type_uri(self) -> &'static str {
        match self {
            Self::Composition => uri::COMPOSITION_DEF,
            Self::Aggregation => uri::AGGREGATION_DEF,
        }
    }

    /// Type uri of the instance-level association between parent and child.
    pub fn instance_type_uri(self) -> &'static str {
        match self {
            Self::Composition => uri::COMPOSITION,
            Self::Aggregation => uri::AGGREGATION,
        }
    }

    pub fn from_def_type_uri(u: &str) -> Option<Self> {
        match u {
            uri::COMPOSITION_DEF => Some(Self::Composition),
            uri::AGGREGATION_DEF => Some(Self::Aggregation),
            _ => None,
        }
    }
}

/// Opaque presentation data. Stored and returned, never interpreted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewConfig(pub serde_json::Value);

impl ViewConfig {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub(crate) fn to_json_string(&self) -> String {
        self.0.to_string()
    }

    pub(crate) fn parse(text: &str) -> CoreResult<Self> {
        serde_json::from_str(text)
            .map(Self)
            .map_err(|e| CoreError::schema(format!("invalid view config: {e}")))
    }
}

/// Defines one child slot of a parent type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssocDef {
    /// Id of the definition edge, once persisted.
    pub id: Option<EdgeId>,
    pub parent_type_uri: String,
    pub child_type_uri: String,
    pub kind: AssocDefKind,
    pub parent_cardinality: Cardinality,
    pub child_cardinality: Cardinality,
    /// Qualifies the instance associations; makes the def uri
    /// `child#custom` so one parent can hold several slots of the same
    /// child type.
    pub custom_assoc_type_uri: Option<String>,
    pub view_config: ViewConfig,
}

impl AssocDef {
    pub fn composition(
        parent_type_uri: impl Into<String>,
        child_type_uri: impl Into<String>,
        child_cardinality: Cardinality,
    ) -> Self {
        Self {
            id: None,
            parent_type_uri: parent_type_uri.into(),
            child_type_uri: child_type_uri.into(),
            kind: AssocDefKind::Composition,
            parent_cardinality: Cardinality::One,
            child_cardinality,
            custom_assoc_type_uri: None,
            view_config: ViewConfig::default(),
        }
    }

    pub fn aggregation(
        parent_type_uri: impl Into<String>,
        child_type_uri: impl Into<String>,
        child_cardinality: Cardinality,
    ) -> Self {
        Self {
            kind: AssocDefKind::Aggregation,
            parent_cardinality: Cardinality::Many,
            ..Self::composition(parent_type_uri, child_type_uri, child_cardinality)
        }
    }

    pub fn with_custom_assoc_type(mut self, assoc_type_uri: impl Into<String>) -> Self {
        self.custom_assoc_type_uri = Some(assoc_type_uri.into());
        self
    }

    pub fn with_parent_cardinality(mut self, cardinality: Cardinality) -> Self {
        self.parent_cardinality = cardinality;
        self
    }

    pub fn with_view_config(mut self, config: serde_json::Value) -> Self {
        self.view_config = ViewConfig(config);
        self
    }

    /// The child key under which instances appear in a composite value.
    pub fn uri(&self) -> String {
        match &self.custom_assoc_type_uri {
            Some(custom) => format!("{}#{custom}", self.child_type_uri),
            None => self.child_type_uri.clone(),
        }
    }

    /// Type uri of the parent↔child instance associations.
    pub fn instance_assoc_type_uri(&self) -> &str {
        self.custom_assoc_type_uri
            .as_deref()
            .unwrap_or_else(|| self.kind.instance_type_uri())
    }

    pub fn is_composition(&self) -> bool {
        self.kind == AssocDefKind::Composition
    }
}

/// A topic type or association type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypeModel {
    /// Id of the type topic, once persisted.
    pub id: Option<NodeId>,
    pub uri: String,
    pub kind: TypeKind,
    /// Human-readable name; the value of the type topic.
    pub label: String,
    pub data_type: DataType,
    pub index_modes: Vec<IndexMode>,
    pub assoc_defs: Vec<AssocDef>,
    /// Def uris whose child values make up a composite instance's label.
    /// Empty means "the first child".
    pub label_config: Vec<String>,
    pub view_config: ViewConfig,
}

impl TypeModel {
    pub fn topic_type(
        uri: impl Into<String>,
        label: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            id: None,
            uri: uri.into(),
            kind: TypeKind::TopicType,
            label: label.into(),
            data_type,
            index_modes: Vec::new(),
            assoc_defs: Vec::new(),
            label_config: Vec::new(),
            view_config: ViewConfig::default(),
        }
    }

    pub fn assoc_type(uri: impl Into<String>, label: impl Into<String>, data_type: DataType) -> Self {
        Self {
            kind: TypeKind::AssocType,
            ..Self::topic_type(uri, label, data_type)
        }
    }

    pub fn with_assoc_def(mut self, def: AssocDef) -> Self {
        self.assoc_defs.push(def);
        self
    }

    pub fn with_index_modes(mut self, modes: impl IntoIterator<Item = IndexMode>) -> Self {
        self.index_modes = modes.into_iter().collect();
        self
    }

    pub fn with_label_config(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.label_config = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_view_config(mut self, config: serde_json::Value) -> Self {
        self.view_config = ViewConfig(config);
        self
    }

    pub fn assoc_def(&self, def_uri: &str) -> Option<&AssocDef> {
        self.assoc_defs.iter().find(|d| d.uri() == def_uri)
    }

    pub fn assoc_def_index(&self, def_uri: &str) -> Option<usize> {
        self.assoc_defs.iter().position(|d| d.uri() == def_uri)
    }

    /// Def uris contributing to the label of a composite instance.
    pub fn label_keys(&self) -> Vec<String> {
        if !self.label_config.is_empty() {
            return self.label_config.clone();
        }
        self.assoc_defs.first().map(AssocDef::uri).into_iter().collect()
    }

    /// Check that every label config entry names an assoc def.
    pub fn validate_label_config(&self) -> CoreResult<()> {
        match self.label_config.iter().find(|k| self.assoc_def(k).is_none()) {
            Some(k) => Err(CoreError::schema(format!(
                "label config of {} names unknown child {k:?}",
                self.uri
            ))),
            None => Ok(()),
        }
    }
}
