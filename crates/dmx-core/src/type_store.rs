//! Graph layout of type definitions.
//!
//! A type is a topic whose `type_uri` is the topic-type or assoc-type meta
//! type. Its scalar value is the label; data type, index modes, label config
//! and view config are node properties. Each association definition is an
//! edge `parent_type ↔ child_type` typed `composition_def` or
//! `aggregation_def` with an `ordinal` property. Cardinalities, the custom
//! association type and the def's view config hang off that edge through
//! edge↔node associations.

use dmx_store::{DeleteReport, GraphView, Node, Role, Transaction};
use dmx_types::uri::{self, prop};
use dmx_types::{EdgeId, NodeId, PlayerRef, SimpleValue};

use crate::error::{CoreError, CoreResult};
use crate::schema::{
    AssocDef, AssocDefKind, Cardinality, DataType, IndexMode, TypeKind, TypeModel, ViewConfig,
};

/// The node carrying `uri`, if any.
pub(crate) fn find_topic_node<G: GraphView + ?Sized>(
    graph: &G,
    topic_uri: &str,
) -> CoreResult<Option<Node>> {
    let key = SimpleValue::from(topic_uri);
    Ok(graph.get_nodes_by_value(prop::URI, &key)?.into_iter().next())
}

/// `true` if a topic or association already carries `object_uri`.
pub(crate) fn uri_in_use<G: GraphView + ?Sized>(
    graph: &G,
    object_uri: &str,
    except: Option<PlayerRef>,
) -> CoreResult<bool> {
    let key = SimpleValue::from(object_uri);
    let nodes = graph.get_nodes_by_value(prop::URI, &key)?;
    let edges = graph.get_edges_by_value(prop::URI, &key)?;
    Ok(nodes
        .iter()
        .map(|n| PlayerRef::Node(n.id))
        .chain(edges.iter().map(|e| PlayerRef::Edge(e.id)))
        .any(|p| Some(p) != except))
}

pub(crate) fn find_type_node<G: GraphView + ?Sized>(graph: &G, type_uri: &str) -> CoreResult<Node> {
    find_topic_node(graph, type_uri)?
        .filter(|n| n.prop_str(prop::TYPE_URI).and_then(TypeKind::from_uri).is_some())
        .ok_or_else(|| CoreError::not_found(format!("type {type_uri:?}")))
}

fn require_core_topic<G: GraphView + ?Sized>(graph: &G, topic_uri: &str) -> CoreResult<NodeId> {
    find_topic_node(graph, topic_uri)?
        .map(|n| n.id)
        .ok_or_else(|| {
            CoreError::schema(format!("core topic {topic_uri:?} is missing; bootstrap the store"))
        })
}

/// Read a type and its association definitions.
pub(crate) fn load_type<G: GraphView + ?Sized>(graph: &G, type_uri: &str) -> CoreResult<TypeModel> {
    let node = find_type_node(graph, type_uri)?;
    let kind = node
        .prop_str(prop::TYPE_URI)
        .and_then(TypeKind::from_uri)
        .unwrap_or(TypeKind::TopicType);
    let data_type = DataType::from_uri(node.prop_str(prop::DATA_TYPE_URI).unwrap_or(uri::TEXT))?;
    let index_modes = node
        .prop_str(prop::INDEX_MODES)
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(IndexMode::from_uri)
        .collect::<CoreResult<Vec<_>>>()?;
    let label_config = match node.prop_str(prop::LABEL_CONFIG) {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| CoreError::schema(format!("invalid label config of {type_uri}: {e}")))?,
        None => Vec::new(),
    };
    let view_config = match node.prop_str(prop::VIEW_CONFIG) {
        Some(text) => ViewConfig::parse(text)?,
        None => ViewConfig::default(),
    };
    let assoc_defs = load_assoc_defs(graph, &node, type_uri)?;

    Ok(TypeModel {
        id: Some(node.id),
        uri: type_uri.to_string(),
        kind,
        label: node
            .value
            .as_ref()
            .and_then(SimpleValue::as_str)
            .unwrap_or_default()
            .to_string(),
        data_type,
        index_modes,
        assoc_defs,
        label_config,
        view_config,
    })
}

fn load_assoc_defs<G: GraphView + ?Sized>(
    graph: &G,
    type_node: &Node,
    type_uri: &str,
) -> CoreResult<Vec<AssocDef>> {
    let me = PlayerRef::Node(type_node.id);
    let mut defs = Vec::new();

    for edge in graph.incident_edges(me)? {
        let Some(kind) = edge.prop_str(prop::TYPE_URI).and_then(AssocDefKind::from_def_type_uri)
        else {
            continue;
        };
        let Some(pos) = edge.position_of(me) else {
            continue;
        };
        if edge.role(pos).role_type_uri != uri::PARENT_TYPE {
            continue;
        }
        let child_id = edge
            .role(pos.other())
            .player
            .as_node()
            .ok_or_else(|| CoreError::integrity(format!("assoc def {} has no child type", edge.id)))?;
        let child = graph.get_node(child_id)?;

        let mut def = AssocDef {
            id: Some(edge.id),
            parent_type_uri: type_uri.to_string(),
            child_type_uri: child.prop_str(prop::URI).unwrap_or_default().to_string(),
            kind,
            parent_cardinality: Cardinality::One,
            child_cardinality: Cardinality::One,
            custom_assoc_type_uri: None,
            view_config: ViewConfig::default(),
        };

        let def_player = PlayerRef::Edge(edge.id);
        for meta in graph.incident_edges(def_player)? {
            let Some(role) = meta.other_role(def_player) else {
                continue;
            };
            let Some(node_id) = role.player.as_node() else {
                continue;
            };
            let node = graph.get_node(node_id)?;
            let node_uri = node.prop_str(prop::URI).unwrap_or_default();
            match role.role_type_uri.as_str() {
                uri::PARENT_CARDINALITY => def.parent_cardinality = Cardinality::from_uri(node_uri)?,
                uri::CHILD_CARDINALITY => def.child_cardinality = Cardinality::from_uri(node_uri)?,
                uri::CUSTOM_ASSOC_TYPE => def.custom_assoc_type_uri = Some(node_uri.to_string()),
                uri::VIEW_CONFIG => {
                    if let Some(text) = node.value.as_ref().and_then(SimpleValue::as_str) {
                        def.view_config = ViewConfig::parse(text)?;
                    }
                }
                _ => {}
            }
        }

        let ordinal = edge
            .prop(prop::ORDINAL)
            .and_then(SimpleValue::as_int)
            .unwrap_or(i64::MAX);
        defs.push((ordinal, def));
    }

    // Stable: equal ordinals keep creation order.
    defs.sort_by_key(|(ordinal, _)| *ordinal);
    Ok(defs.into_iter().map(|(_, def)| def).collect())
}

/// Create the type topic and its properties. Association definitions are
/// written separately with [`write_assoc_def`].
pub(crate) fn create_type_node<T: Transaction + ?Sized>(
    tx: &mut T,
    model: &TypeModel,
) -> CoreResult<NodeId> {
    let node = tx.create_node(None)?;
    tx.set_node_property(node.id, prop::URI, model.uri.as_str().into())?;
    tx.set_node_property(node.id, prop::TYPE_URI, model.kind.uri().into())?;
    write_type_props(tx, node.id, model)?;
    Ok(node.id)
}

/// Overwrite label, data type, index modes, label config and view config.
pub(crate) fn write_type_props<T: Transaction + ?Sized>(
    tx: &mut T,
    id: NodeId,
    model: &TypeModel,
) -> CoreResult<()> {
    tx.set_node_value(id, Some(model.label.as_str().into()))?;
    tx.set_node_property(id, prop::DATA_TYPE_URI, model.data_type.uri().into())?;

    let modes: Vec<&str> = model.index_modes.iter().map(|m| m.uri()).collect();
    set_or_clear(tx, id, prop::INDEX_MODES, (!modes.is_empty()).then(|| modes.join(",")))?;

    let label_config = if model.label_config.is_empty() {
        None
    } else {
        Some(
            serde_json::to_string(&model.label_config)
                .map_err(|e| CoreError::schema(format!("label config: {e}")))?,
        )
    };
    set_or_clear(tx, id, prop::LABEL_CONFIG, label_config)?;

    let view_config = (!model.view_config.is_empty()).then(|| model.view_config.to_json_string());
    set_or_clear(tx, id, prop::VIEW_CONFIG, view_config)
}

fn set_or_clear<T: Transaction + ?Sized>(
    tx: &mut T,
    id: NodeId,
    key: &str,
    value: Option<String>,
) -> CoreResult<()> {
    match value {
        Some(v) => tx.set_node_property(id, key, v.into())?,
        None => {
            tx.remove_node_property(id, key)?;
        }
    }
    Ok(())
}

/// Persist one association definition below `type_node`.
pub(crate) fn write_assoc_def<T: Transaction + ?Sized>(
    tx: &mut T,
    type_node: NodeId,
    def: &AssocDef,
    ordinal: usize,
) -> CoreResult<EdgeId> {
    let child = find_type_node(tx.as_view(), &def.child_type_uri)?;
    let edge = tx.create_edge(
        Role::new(type_node, uri::PARENT_TYPE),
        Role::new(child.id, uri::CHILD_TYPE),
    )?;
    tx.set_edge_property(edge.id, prop::TYPE_URI, def.kind.def_type_uri().into())?;
    set_ordinal(tx, edge.id, ordinal)?;

    let parent_card = require_core_topic(tx.as_view(), def.parent_cardinality.uri())?;
    link(tx, edge.id, parent_card, uri::PARENT_CARDINALITY)?;
    let child_card = require_core_topic(tx.as_view(), def.child_cardinality.uri())?;
    link(tx, edge.id, child_card, uri::CHILD_CARDINALITY)?;

    if let Some(custom) = &def.custom_assoc_type_uri {
        let custom_type = find_type_node(tx.as_view(), custom)?;
        link(tx, edge.id, custom_type.id, uri::CUSTOM_ASSOC_TYPE)?;
    }
    if !def.view_config.is_empty() {
        let config = tx.create_node(Some(def.view_config.to_json_string().into()))?;
        tx.set_node_property(config.id, prop::TYPE_URI, uri::VIEW_CONFIG.into())?;
        link(tx, edge.id, config.id, uri::VIEW_CONFIG)?;
    }
    Ok(edge.id)
}

pub(crate) fn set_ordinal<T: Transaction + ?Sized>(
    tx: &mut T,
    def_edge: EdgeId,
    ordinal: usize,
) -> CoreResult<()> {
    let ordinal = i64::try_from(ordinal).unwrap_or(i64::MAX);
    tx.set_edge_property(def_edge, prop::ORDINAL, SimpleValue::Int(ordinal))?;
    Ok(())
}

fn link<T: Transaction + ?Sized>(
    tx: &mut T,
    def_edge: EdgeId,
    node: NodeId,
    role_type_uri: &str,
) -> CoreResult<()> {
    let edge = tx.create_edge(
        Role::new(def_edge, uri::ASSOC_DEF),
        Role::new(node, role_type_uri),
    )?;
    tx.set_edge_property(edge.id, prop::TYPE_URI, uri::COMPOSITION.into())?;
    Ok(())
}

/// Remove an association definition together with its owned view config.
pub(crate) fn delete_assoc_def<T: Transaction + ?Sized>(
    tx: &mut T,
    def_edge: EdgeId,
) -> CoreResult<DeleteReport> {
    let def_player = PlayerRef::Edge(def_edge);
    let owned: Vec<NodeId> = tx
        .incident_edges(def_player)?
        .iter()
        .filter_map(|meta| meta.other_role(def_player))
        .filter(|role| role.role_type_uri == uri::VIEW_CONFIG)
        .filter_map(|role| role.player.as_node())
        .collect();

    let mut report = tx.delete_edge(def_edge)?;
    for id in owned {
        if tx.contains(PlayerRef::Node(id)) {
            let more = tx.delete_node(id)?;
            report.nodes.extend(more.nodes);
            report.edges.extend(more.edges);
        }
    }
    Ok(report)
}
