use dmx_store::StoreError;

use crate::event::HookKind;

/// Errors from the object, type and traversal layers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A topic, association, type or child key does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Referential integrity or cardinality violation.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// A value was read or written as the wrong kind.
    #[error("wrong data type for {key:?}: expected {expected}, found {found}")]
    WrongDataType {
        key: String,
        expected: String,
        found: String,
    },

    /// The object was deleted or detached since it was read.
    #[error("stale {kind} {id}: the object no longer exists")]
    StaleObject { kind: &'static str, id: u64 },

    /// An invalid type definition or an instance that violates its type.
    #[error("schema error: {0}")]
    Schema(String),

    /// A write-path listener failed; the transaction was rolled back.
    #[error("listener {listener:?} failed on {hook} for {object}: {source}")]
    Listener {
        hook: HookKind,
        listener: String,
        object: String,
        #[source]
        source: Box<CoreError>,
    },

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// A document could not be rendered as JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure inside the storage engine (lock poisoning, I/O, corrupt data).
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl CoreError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::NotFound(what.to_string())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn wrong_data_type(
        key: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::WrongDataType {
            key: key.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Listener { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NodeNotFound(id) => Self::NotFound(format!("topic {id}")),
            StoreError::EdgeNotFound(id) => Self::NotFound(format!("association {id}")),
            e if e.is_integrity() => Self::Integrity(e.to_string()),
            e => Self::Storage(e),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dmx_types::{EdgeId, NodeId, PlayerRef};

    #[test]
    fn store_not_found_maps_to_not_found() {
        let e: CoreError = StoreError::NodeNotFound(NodeId(4)).into();
        assert!(e.is_not_found());
        assert_eq!(e.to_string(), "not found: topic 4");

        let e: CoreError = StoreError::EdgeNotFound(EdgeId(9)).into();
        assert!(matches!(e, CoreError::NotFound(ref m) if m == "association 9"));
    }

    #[test]
    fn store_integrity_maps_to_integrity() {
        let e: CoreError = StoreError::DanglingPlayer(PlayerRef::Node(NodeId(1))).into();
        assert!(matches!(e, CoreError::Integrity(_)));
    }

    #[test]
    fn io_stays_storage_and_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let e: CoreError = StoreError::Io(io).into();
        assert!(matches!(e, CoreError::Storage(_)));
        assert!(e.is_transient());
    }

    #[test]
    fn listener_error_keeps_source() {
        let e = CoreError::Listener {
            hook: HookKind::PostCreateTopic,
            listener: "audit".into(),
            object: "topic 3".into(),
            source: Box::new(CoreError::integrity("denied")),
        };
        let text = e.to_string();
        assert!(text.contains("audit"));
        assert!(text.contains("PostCreateTopic"));
        assert!(std::error::Error::source(&e).is_some());
        assert!(!e.is_transient());
    }
}
