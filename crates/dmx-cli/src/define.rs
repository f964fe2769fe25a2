//! Type definition files for `dmx define`.
//!
//! ```toml
//! [[type]]
//! uri = "acme.name"
//! label = "Name"
//! data_type = "text"
//!
//! [[type]]
//! uri = "acme.person"
//! label = "Person"
//! data_type = "composite"
//! label_config = ["acme.name"]
//! child = [
//!     { type = "acme.name" },
//!     { type = "acme.phone", cardinality = "many" },
//! ]
//! ```
//!
//! Core uris may be written without their `dmx.core.` prefix.

use anyhow::Context;
use serde::Deserialize;

use dmx_core::{AssocDef, Cardinality, DataType, IndexMode, TypeModel};
use dmx_types::uri;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypesFile {
    #[serde(default, rename = "type")]
    pub types: Vec<TypeSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindSpec {
    Topic,
    Assoc,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeSpec {
    pub uri: String,
    pub label: String,
    #[serde(default = "topic_kind")]
    pub kind: KindSpec,
    pub data_type: String,
    #[serde(default)]
    pub index: Vec<String>,
    #[serde(default)]
    pub label_config: Vec<String>,
    #[serde(default, rename = "child")]
    pub children: Vec<ChildSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChildSpec {
    #[serde(rename = "type")]
    pub child_type: String,
    #[serde(default)]
    pub aggregation: bool,
    #[serde(default = "one")]
    pub cardinality: String,
    pub assoc_type: Option<String>,
}

fn topic_kind() -> KindSpec {
    KindSpec::Topic
}

fn one() -> String {
    "one".into()
}

/// `text` → `dmx.core.text`; anything with a dot is taken as is.
fn core_uri(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        format!("{}{name}", uri::CORE_PREFIX)
    }
}

impl TypesFile {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid type definition file")
    }

    pub fn to_models(&self) -> anyhow::Result<Vec<TypeModel>> {
        self.types.iter().map(TypeSpec::to_model).collect()
    }
}

impl TypeSpec {
    pub fn to_model(&self) -> anyhow::Result<TypeModel> {
        let data_type = DataType::from_uri(&core_uri(&self.data_type))
            .with_context(|| format!("type {}", self.uri))?;
        let mut model = match self.kind {
            KindSpec::Topic => TypeModel::topic_type(&self.uri, &self.label, data_type),
            KindSpec::Assoc => TypeModel::assoc_type(&self.uri, &self.label, data_type),
        };
        model.index_modes = self
            .index
            .iter()
            .map(|m| IndexMode::from_uri(&core_uri(m)))
            .collect::<Result<_, _>>()
            .with_context(|| format!("type {}", self.uri))?;
        for child in &self.children {
            let cardinality = Cardinality::from_uri(&core_uri(&child.cardinality))
                .with_context(|| format!("type {}, child {}", self.uri, child.child_type))?;
            let mut def = if child.aggregation {
                AssocDef::aggregation(&self.uri, &child.child_type, cardinality)
            } else {
                AssocDef::composition(&self.uri, &child.child_type, cardinality)
            };
            if let Some(assoc_type) = &child.assoc_type {
                def = def.with_custom_assoc_type(assoc_type);
            }
            model = model.with_assoc_def(def);
        }
        model.label_config = self.label_config.clone();
        Ok(model)
    }
}
