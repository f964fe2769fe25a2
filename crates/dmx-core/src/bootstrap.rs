//! Core meta topics every store needs before types can be defined.

use tracing::info;

use dmx_store::Transaction;
use dmx_types::uri::{self, prop};

use crate::error::CoreResult;
use crate::schema::{DataType, TypeModel};
use crate::type_store;

/// Plain core topics: `(uri, type_uri, label)`.
const CORE_TOPICS: &[(&str, &str, &str)] = &[
    (uri::META_TYPE, uri::META_TYPE, "Meta Type"),
    (uri::TOPIC_TYPE, uri::META_TYPE, "Topic Type"),
    (uri::ASSOC_TYPE, uri::META_TYPE, "Association Type"),
    (uri::DATA_TYPE, uri::META_TYPE, "Data Type"),
    (uri::CARDINALITY, uri::META_TYPE, "Cardinality"),
    (uri::ROLE_TYPE, uri::META_TYPE, "Role Type"),
    (uri::TEXT, uri::DATA_TYPE, "Text"),
    (uri::HTML, uri::DATA_TYPE, "HTML"),
    (uri::NUMBER, uri::DATA_TYPE, "Number"),
    (uri::BOOLEAN, uri::DATA_TYPE, "Boolean"),
    (uri::REFERENCE, uri::DATA_TYPE, "Reference"),
    (uri::COMPOSITE, uri::DATA_TYPE, "Composite"),
    (uri::ONE, uri::CARDINALITY, "One"),
    (uri::MANY, uri::CARDINALITY, "Many"),
    (uri::DEFAULT_ROLE, uri::ROLE_TYPE, "Default"),
    (uri::PARENT, uri::ROLE_TYPE, "Parent"),
    (uri::CHILD, uri::ROLE_TYPE, "Child"),
    (uri::PARENT_TYPE, uri::ROLE_TYPE, "Parent Type"),
    (uri::CHILD_TYPE, uri::ROLE_TYPE, "Child Type"),
    (uri::ASSOC_DEF, uri::ROLE_TYPE, "Association Definition"),
    (uri::PARENT_CARDINALITY, uri::ROLE_TYPE, "Parent Cardinality"),
    (uri::CHILD_CARDINALITY, uri::ROLE_TYPE, "Child Cardinality"),
    (uri::CUSTOM_ASSOC_TYPE, uri::ROLE_TYPE, "Custom Association Type"),
    (uri::CONFIGURABLE, uri::ROLE_TYPE, "Configurable"),
];

/// Core types that instances refer to by `type_uri`.
fn core_types() -> Vec<TypeModel> {
    vec![
        TypeModel::assoc_type(uri::ASSOCIATION, "Association", DataType::Text),
        TypeModel::assoc_type(uri::COMPOSITION, "Composition", DataType::Text),
        TypeModel::assoc_type(uri::AGGREGATION, "Aggregation", DataType::Text),
        TypeModel::assoc_type(uri::COMPOSITION_DEF, "Composition Definition", DataType::Text),
        TypeModel::assoc_type(uri::AGGREGATION_DEF, "Aggregation Definition", DataType::Text),
        TypeModel::assoc_type(uri::INSTANTIATION, "Instantiation", DataType::Text),
        TypeModel::topic_type(uri::VIEW_CONFIG, "View Configuration", DataType::Text),
    ]
}

/// Create whatever core topics are missing. Returns how many were created;
/// running it on a bootstrapped store creates nothing.
pub(crate) fn install<T: Transaction + ?Sized>(tx: &mut T) -> CoreResult<usize> {
    let mut created = 0;
    for (topic_uri, type_uri, label) in CORE_TOPICS {
        if type_store::find_topic_node(tx.as_view(), topic_uri)?.is_some() {
            continue;
        }
        let node = tx.create_node(Some((*label).into()))?;
        tx.set_node_property(node.id, prop::URI, (*topic_uri).into())?;
        tx.set_node_property(node.id, prop::TYPE_URI, (*type_uri).into())?;
        created += 1;
    }
    for model in core_types() {
        if type_store::find_topic_node(tx.as_view(), &model.uri)?.is_some() {
            continue;
        }
        type_store::create_type_node(tx, &model)?;
        created += 1;
    }
    if created > 0 {
        info!(created, "bootstrapped core topics");
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_store::{HypergraphStore, InMemoryHypergraph};

    #[test]
    fn install_is_idempotent() {
        let store = InMemoryHypergraph::new();
        let mut tx = store.begin_tx().unwrap();
        let first = install(&mut *tx).unwrap();
        assert_eq!(first, CORE_TOPICS.len() + core_types().len());
        assert_eq!(install(&mut *tx).unwrap(), 0);
        assert_eq!(tx.node_count(), first);
    }

    #[test]
    fn core_assoc_types_are_loadable() {
        let store = InMemoryHypergraph::new();
        let mut tx = store.begin_tx().unwrap();
        install(&mut *tx).unwrap();
        let t = type_store::load_type(tx.as_view(), uri::COMPOSITION).unwrap();
        assert_eq!(t.label, "Composition");
        assert!(t.assoc_defs.is_empty());
    }
}
