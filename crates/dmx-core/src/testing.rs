//! Fixtures shared by the unit tests.

use crate::client::ClientState;
use crate::composite::CompositeValue;
use crate::error::CoreResult;
use crate::model::TopicModel;
use crate::schema::{AssocDef, Cardinality, DataType, TypeModel};
use crate::service::CoreService;

pub(crate) const NAME: &str = "acme.name";
pub(crate) const PHONE: &str = "acme.phone";
pub(crate) const PERSON: &str = "acme.person";

pub(crate) const TITLE: &str = "acme.title";
pub(crate) const TAG: &str = "acme.tag";
pub(crate) const STATUS: &str = "acme.status";
pub(crate) const NOTE: &str = "acme.note";

/// `acme.person` composed of one `acme.name` (its label) and many
/// `acme.phone`.
pub(crate) fn define_person(svc: &CoreService) -> CoreResult<()> {
    svc.transaction(ClientState::new(), |ctx| {
        ctx.create_topic_type(TypeModel::topic_type(NAME, "Name", DataType::Text))?;
        ctx.create_topic_type(TypeModel::topic_type(PHONE, "Phone", DataType::Text))?;
        ctx.create_topic_type(
            TypeModel::topic_type(PERSON, "Person", DataType::Composite)
                .with_assoc_def(AssocDef::composition(PERSON, NAME, Cardinality::One))
                .with_assoc_def(AssocDef::composition(PERSON, PHONE, Cardinality::Many))
                .with_label_config([NAME]),
        )?;
        Ok(())
    })?;
    Ok(())
}

pub(crate) fn person(name: &str, phones: &[&str]) -> TopicModel {
    let mut children = CompositeValue::new();
    children.set(NAME, name);
    for phone in phones {
        children.add(PHONE, *phone);
    }
    TopicModel::new(PERSON).with_children(children)
}

/// `acme.note` with a composed title, many aggregated tags and one
/// aggregated status.
pub(crate) fn define_note(svc: &CoreService) -> CoreResult<()> {
    svc.transaction(ClientState::new(), |ctx| {
        ctx.create_topic_type(TypeModel::topic_type(TITLE, "Title", DataType::Text))?;
        ctx.create_topic_type(TypeModel::topic_type(TAG, "Tag", DataType::Text))?;
        ctx.create_topic_type(TypeModel::topic_type(STATUS, "Status", DataType::Text))?;
        ctx.create_topic_type(
            TypeModel::topic_type(NOTE, "Note", DataType::Composite)
                .with_assoc_def(AssocDef::composition(NOTE, TITLE, Cardinality::One))
                .with_assoc_def(AssocDef::aggregation(NOTE, TAG, Cardinality::Many))
                .with_assoc_def(AssocDef::aggregation(NOTE, STATUS, Cardinality::One)),
        )?;
        Ok(())
    })?;
    Ok(())
}

pub(crate) fn note(title: &str) -> TopicModel {
    TopicModel::new(NOTE).with_child(TITLE, title)
}
