use dmx_types::{EdgeId, NodeId, PlayerRef};

/// Errors from hypergraph store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested node does not exist.
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    /// The requested edge does not exist.
    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// An edge role references a player that does not exist.
    #[error("dangling role player: {0}")]
    DanglingPlayer(PlayerRef),

    /// An edge would play a role in itself.
    #[error("edge {0} cannot play a role in itself")]
    SelfReference(EdgeId),

    /// The property key is reserved by the store.
    #[error("property key {0:?} is reserved")]
    ReservedKey(String),

    /// A lock guarding shared state was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A snapshot file failed its integrity checks.
    #[error("corrupt snapshot: {0}")]
    Corrupt(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` for id misses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NodeNotFound(_) | Self::EdgeNotFound(_))
    }

    /// Returns `true` for referential integrity violations.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::DanglingPlayer(_) | Self::SelfReference(_) | Self::ReservedKey(_)
        )
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LockPoisoned(_) | Self::Io(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(StoreError::NodeNotFound(NodeId(1)).is_not_found());
        assert!(StoreError::EdgeNotFound(EdgeId(1)).is_not_found());
        assert!(StoreError::DanglingPlayer(PlayerRef::Node(NodeId(9))).is_integrity());
        assert!(StoreError::LockPoisoned("x".into()).is_transient());
        assert!(!StoreError::Corrupt("x".into()).is_transient());
    }

    #[test]
    fn display_names_the_id() {
        let err = StoreError::NodeNotFound(NodeId(42));
        assert_eq!(err.to_string(), "node not found: 42");
    }
}
