//! URIs of the core meta model.
//!
//! The core bootstraps one topic per URI listed here so that types, data
//! types, cardinalities, and role types can be related like any other topic.

/// Prefix shared by every core uri.
pub const CORE_PREFIX: &str = "dmx.core.";

// Meta types
pub const META_TYPE: &str = "dmx.core.meta_type";
pub const TOPIC_TYPE: &str = "dmx.core.topic_type";
pub const ASSOC_TYPE: &str = "dmx.core.assoc_type";
pub const DATA_TYPE: &str = "dmx.core.data_type";
pub const CARDINALITY: &str = "dmx.core.cardinality";
pub const ROLE_TYPE: &str = "dmx.core.role_type";
pub const VIEW_CONFIG: &str = "dmx.core.view_config";

// Data types
pub const TEXT: &str = "dmx.core.text";
pub const HTML: &str = "dmx.core.html";
pub const NUMBER: &str = "dmx.core.number";
pub const BOOLEAN: &str = "dmx.core.boolean";
pub const REFERENCE: &str = "dmx.core.reference";
pub const COMPOSITE: &str = "dmx.core.composite";

// Cardinalities
pub const ONE: &str = "dmx.core.one";
pub const MANY: &str = "dmx.core.many";

// Association types
pub const ASSOCIATION: &str = "dmx.core.association";
pub const COMPOSITION: &str = "dmx.core.composition";
pub const AGGREGATION: &str = "dmx.core.aggregation";
pub const COMPOSITION_DEF: &str = "dmx.core.composition_def";
pub const AGGREGATION_DEF: &str = "dmx.core.aggregation_def";
pub const INSTANTIATION: &str = "dmx.core.instantiation";

// Role types
pub const DEFAULT_ROLE: &str = "dmx.core.default";
pub const PARENT: &str = "dmx.core.parent";
pub const CHILD: &str = "dmx.core.child";
pub const PARENT_TYPE: &str = "dmx.core.parent_type";
pub const CHILD_TYPE: &str = "dmx.core.child_type";
pub const ASSOC_DEF: &str = "dmx.core.assoc_def";
pub const PARENT_CARDINALITY: &str = "dmx.core.parent_cardinality";
pub const CHILD_CARDINALITY: &str = "dmx.core.child_cardinality";
pub const CUSTOM_ASSOC_TYPE: &str = "dmx.core.custom_assoc_type";
pub const CONFIGURABLE: &str = "dmx.core.configurable";

// Index modes
pub const INDEX_OFF: &str = "dmx.core.off";
pub const INDEX_KEY: &str = "dmx.core.key";
pub const INDEX_FULLTEXT: &str = "dmx.core.fulltext";
pub const INDEX_FULLTEXT_KEY: &str = "dmx.core.fulltext_key";

/// Property keys the object layer stores on nodes and edges.
pub mod prop {
    pub const URI: &str = "uri";
    pub const TYPE_URI: &str = "type_uri";
    pub const DATA_TYPE_URI: &str = "data_type_uri";
    pub const INDEX_MODES: &str = "index_modes";
    pub const LABEL_CONFIG: &str = "label_config";
    pub const VIEW_CONFIG: &str = "view_config";
    pub const ORDINAL: &str = "ordinal";
}
