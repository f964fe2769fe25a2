use serde::{Deserialize, Serialize};

use dmx_types::NodeId;

use crate::model::{AssociationModel, TopicModel};
use crate::schema::TypeModel;

/// One side effect of a mutating call, reported back to the caller so that
/// clients can update their views.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    CreateTopic(TopicModel),
    UpdateTopic(TopicModel),
    DeleteTopic(TopicModel),
    CreateAssociation(AssociationModel),
    UpdateAssociation(AssociationModel),
    DeleteAssociation(AssociationModel),
    /// The children under `key` of `parent` changed.
    UpdateChildTopics { parent: NodeId, key: String },
    UpdateType(TypeModel),
    DeleteType { uri: String },
}

impl Directive {
    /// Wire name, e.g. `UPDATE_TOPIC`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateTopic(_) => "CREATE_TOPIC",
            Self::UpdateTopic(_) => "UPDATE_TOPIC",
            Self::DeleteTopic(_) => "DELETE_TOPIC",
            Self::CreateAssociation(_) => "CREATE_ASSOCIATION",
            Self::UpdateAssociation(_) => "UPDATE_ASSOCIATION",
            Self::DeleteAssociation(_) => "DELETE_ASSOCIATION",
            Self::UpdateChildTopics { .. } => "UPDATE_CHILD_TOPICS",
            Self::UpdateType(_) => "UPDATE_TYPE",
            Self::DeleteType { .. } => "DELETE_TYPE",
        }
    }
}

/// Ordered directives accumulated during one call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Directives {
    items: Vec<Directive>,
}

impl Directives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: Directive) {
        self.items.push(directive);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.items.iter()
    }

    /// Number of directives with the given wire name.
    pub fn count(&self, name: &str) -> usize {
        self.items.iter().filter(|d| d.name() == name).count()
    }

    pub fn into_vec(self) -> Vec<Directive> {
        self.items
    }
}

impl IntoIterator for Directives {
    type Item = Directive;
    type IntoIter = std::vec::IntoIter<Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Directives {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Extend<Directive> for Directives {
    fn extend<I: IntoIterator<Item = Directive>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_in_order() {
        let mut d = Directives::new();
        d.push(Directive::CreateTopic(TopicModel::new("acme.person")));
        d.push(Directive::UpdateChildTopics {
            parent: NodeId(1),
            key: "acme.name".into(),
        });
        d.push(Directive::DeleteType {
            uri: "acme.old".into(),
        });
        let names: Vec<_> = d.iter().map(Directive::name).collect();
        assert_eq!(names, vec!["CREATE_TOPIC", "UPDATE_CHILD_TOPICS", "DELETE_TYPE"]);
        assert_eq!(d.count("CREATE_TOPIC"), 1);
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn extend_and_into_iter() {
        let mut d = Directives::new();
        d.extend(vec![
            Directive::DeleteType { uri: "a".into() },
            Directive::DeleteType { uri: "b".into() },
        ]);
        let uris: Vec<String> = d
            .into_iter()
            .filter_map(|x| match x {
                Directive::DeleteType { uri } => Some(uri),
                _ => None,
            })
            .collect();
        assert_eq!(uris, vec!["a", "b"]);
    }
}
