//! Composite values: the tree-shaped child structure of a topic.
//!
//! A [`CompositeValue`] maps child keys (association definition uris) to
//! [`ChildValue`]s in insertion order. The same type serves two purposes:
//!
//! - **Input** to create/update operations, where each child is given as an
//!   inline value, a reference to an existing topic, or a deletion reference.
//! - **Output** of materialization, where each child is a [`ChildTopic`]
//!   carrying the id of the association that relates it to its parent.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use dmx_types::{EdgeId, NodeId, SimpleValue};

use crate::error::{CoreError, CoreResult};
use crate::model::TopicRef;

/// A materialized child topic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildTopic {
    pub id: NodeId,
    pub uri: String,
    pub type_uri: String,
    pub value: Option<SimpleValue>,
    pub children: CompositeValue,
    /// The association relating this child to its parent.
    pub assoc_id: EdgeId,
}

/// One entry of a composite value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ChildValue {
    /// Inline simple value.
    Scalar(SimpleValue),
    /// Inline composite value.
    Composite(CompositeValue),
    /// Materialized child topic.
    Topic(ChildTopic),
    /// Relate an existing topic.
    Ref(TopicRef),
    /// Detach a currently related topic.
    Deletion(TopicRef),
    /// Many-cardinality children, in order.
    Sequence(Vec<ChildValue>),
}

impl ChildValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Composite(_) => "composite",
            Self::Topic(_) => "topic",
            Self::Ref(_) => "ref",
            Self::Deletion(_) => "deletion",
            Self::Sequence(_) => "sequence",
        }
    }

    /// The simple value of an inline scalar or a materialized topic.
    pub fn simple_value(&self) -> Option<&SimpleValue> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Topic(t) => t.value.as_ref(),
            _ => None,
        }
    }
}

impl From<SimpleValue> for ChildValue {
    fn from(v: SimpleValue) -> Self {
        Self::Scalar(v)
    }
}

impl From<&str> for ChildValue {
    fn from(v: &str) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<String> for ChildValue {
    fn from(v: String) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<i64> for ChildValue {
    fn from(v: i64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<f64> for ChildValue {
    fn from(v: f64) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<bool> for ChildValue {
    fn from(v: bool) -> Self {
        Self::Scalar(v.into())
    }
}

impl From<CompositeValue> for ChildValue {
    fn from(v: CompositeValue) -> Self {
        Self::Composite(v)
    }
}

impl From<ChildTopic> for ChildValue {
    fn from(v: ChildTopic) -> Self {
        Self::Topic(v)
    }
}

/// Ordered mapping from child key to child value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeValue {
    entries: IndexMap<String, ChildValue>,
}

impl CompositeValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ChildValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, key: &str) -> Option<&ChildValue> {
        self.entries.get(key)
    }

    /// Set `key`, replacing any previous value in place.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ChildValue>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ChildValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Append to the many-cardinality children of `key`.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<ChildValue>) -> &mut Self {
        let value = value.into();
        let slot = self
            .entries
            .entry(key.into())
            .or_insert_with(|| ChildValue::Sequence(Vec::new()));
        match slot {
            ChildValue::Sequence(items) => items.push(value),
            single => {
                let first = std::mem::replace(single, ChildValue::Sequence(Vec::new()));
                *single = ChildValue::Sequence(vec![first, value]);
            }
        }
        self
    }

    /// Relate an existing topic as the child `key`.
    pub fn set_ref(&mut self, key: impl Into<String>, topic: impl Into<TopicRef>) -> &mut Self {
        self.set(key, ChildValue::Ref(topic.into()))
    }

    /// Add an existing topic to the many-cardinality children of `key`.
    pub fn add_ref(&mut self, key: impl Into<String>, topic: impl Into<TopicRef>) -> &mut Self {
        self.add(key, ChildValue::Ref(topic.into()))
    }

    /// Detach `topic` from the children of `key`.
    pub fn add_deletion(
        &mut self,
        key: impl Into<String>,
        topic: impl Into<TopicRef>,
    ) -> &mut Self {
        self.add(key, ChildValue::Deletion(topic.into()))
    }

    pub fn remove(&mut self, key: &str) -> Option<ChildValue> {
        self.entries.shift_remove(key)
    }

    /// The value of `key`, or `NotFound`.
    pub fn value_of(&self, key: &str) -> CoreResult<&ChildValue> {
        self.entries
            .get(key)
            .ok_or_else(|| CoreError::not_found(format!("child {key:?}")))
    }

    fn simple_of(&self, key: &str, expected: &str) -> CoreResult<&SimpleValue> {
        let child = self.value_of(key)?;
        child
            .simple_value()
            .ok_or_else(|| CoreError::wrong_data_type(key, expected, child.kind_name()))
    }

    pub fn get_string(&self, key: &str) -> CoreResult<&str> {
        let v = self.simple_of(key, "text")?;
        v.as_str()
            .ok_or_else(|| CoreError::wrong_data_type(key, "text", v.kind().to_string()))
    }

    pub fn get_int(&self, key: &str) -> CoreResult<i64> {
        let v = self.simple_of(key, "int")?;
        v.as_int()
            .ok_or_else(|| CoreError::wrong_data_type(key, "int", v.kind().to_string()))
    }

    /// Numeric child as a float; integers widen.
    pub fn get_float(&self, key: &str) -> CoreResult<f64> {
        let v = self.simple_of(key, "float")?;
        v.as_float()
            .ok_or_else(|| CoreError::wrong_data_type(key, "float", v.kind().to_string()))
    }

    pub fn get_boolean(&self, key: &str) -> CoreResult<bool> {
        let v = self.simple_of(key, "bool")?;
        v.as_bool()
            .ok_or_else(|| CoreError::wrong_data_type(key, "bool", v.kind().to_string()))
    }

    /// A materialized one-cardinality child.
    pub fn get_topic(&self, key: &str) -> CoreResult<&ChildTopic> {
        match self.value_of(key)? {
            ChildValue::Topic(t) => Ok(t),
            other => Err(CoreError::wrong_data_type(key, "topic", other.kind_name())),
        }
    }

    /// Materialized many-cardinality children, in order.
    pub fn get_topics(&self, key: &str) -> CoreResult<Vec<&ChildTopic>> {
        match self.value_of(key)? {
            ChildValue::Sequence(items) => items
                .iter()
                .map(|item| match item {
                    ChildValue::Topic(t) => Ok(t),
                    other => Err(CoreError::wrong_data_type(key, "topic", other.kind_name())),
                })
                .collect(),
            other => Err(CoreError::wrong_data_type(key, "sequence", other.kind_name())),
        }
    }

    /// The nested composite of `key`: an inline composite or the children of
    /// a materialized topic.
    pub fn get_composite(&self, key: &str) -> CoreResult<&CompositeValue> {
        match self.value_of(key)? {
            ChildValue::Composite(c) => Ok(c),
            ChildValue::Topic(t) => Ok(&t.children),
            other => Err(CoreError::wrong_data_type(key, "composite", other.kind_name())),
        }
    }
}

impl<K: Into<String>, V: Into<ChildValue>> FromIterator<(K, V)> for CompositeValue {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut c = Self::new();
        for (k, v) in iter {
            c.set(k, v);
        }
        c
    }
}
