use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Opaque per-request state supplied by the caller (session, workspace,
/// locale, ...). The core never interprets it; hooks receive it unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    values: BTreeMap<String, String>,
}

impl ClientState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_lookup() {
        let c = ClientState::new().with("workspace", "42").with("locale", "de");
        assert_eq!(c.get("workspace"), Some("42"));
        assert_eq!(c.get("missing"), None);
        let keys: Vec<_> = c.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["locale", "workspace"]);
    }
}
