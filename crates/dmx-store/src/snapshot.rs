//! Snapshot files for the in-memory engine.
//!
//! On-disk format:
//! ```text
//! [4 bytes: magic "DMXG"]
//! [4 bytes: format version (little-endian u32)]
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized StateImage)]
//! ```
//!
//! Saving writes to a temporary file in the target directory and renames it
//! into place, so a crash mid-save leaves the previous snapshot intact.

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryHypergraph;
use crate::state::{GraphState, StateImage};
use crate::traits::GraphView;

const MAGIC: &[u8; 4] = b"DMXG";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 16;

/// Encode a state into snapshot bytes.
pub fn encode(state: &GraphState) -> StoreResult<Vec<u8>> {
    let payload = bincode::serialize(&state.to_image())
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| StoreError::Serialization("snapshot exceeds 4 GiB".into()))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&length.to_le_bytes());
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode snapshot bytes, verifying magic, version, length, and checksum.
pub fn decode(bytes: &[u8]) -> StoreResult<GraphState> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Corrupt("truncated header".into()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(StoreError::Corrupt("bad magic".into()));
    }
    let version = read_u32(&bytes[4..8]);
    if version != FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!("unsupported format version {version}")));
    }
    let length = read_u32(&bytes[8..12]) as usize;
    let expected_crc = read_u32(&bytes[12..16]);
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() != length {
        return Err(StoreError::Corrupt(format!(
            "payload length {} does not match header {length}",
            payload.len()
        )));
    }
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(StoreError::Corrupt(format!(
            "checksum mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"
        )));
    }
    let image: StateImage =
        bincode::deserialize(payload).map_err(|e| StoreError::Serialization(e.to_string()))?;
    GraphState::from_image(image)
}

/// Save the committed state of `store` to `path`.
pub fn save(store: &InMemoryHypergraph, path: &Path) -> StoreResult<()> {
    let state = store.snapshot()?;
    let bytes = encode(&state)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;

    info!(
        path = %path.display(),
        revision = state.revision(),
        nodes = state.node_count(),
        edges = state.edge_count(),
        "snapshot saved"
    );
    Ok(())
}

/// Load a store from a snapshot file.
pub fn load(path: &Path) -> StoreResult<InMemoryHypergraph> {
    let bytes = fs::read(path)?;
    let state = decode(&bytes)?;
    info!(
        path = %path.display(),
        revision = state.revision(),
        nodes = state.node_count(),
        edges = state.edge_count(),
        "snapshot loaded"
    );
    Ok(InMemoryHypergraph::from_state(state))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Role;
    use crate::traits::HypergraphStore;
    use dmx_types::PlayerRef;

    fn populated_store() -> InMemoryHypergraph {
        let store = InMemoryHypergraph::new();
        let mut tx = store.begin_tx().unwrap();
        let a = tx.create_node(Some("Karl Blum".into())).unwrap().id;
        let b = tx.create_node(None).unwrap().id;
        tx.set_node_property(b, "uri", "dmx.contacts.person".into()).unwrap();
        let e = tx.create_edge(Role::new(a, "x"), Role::new(b, "y")).unwrap().id;
        tx.create_edge(Role::new(e, "assoc_def"), Role::new(a, "z")).unwrap();
        tx.commit().unwrap();
        store
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.dmxg");
        let store = populated_store();
        save(&store, &path).unwrap();

        let loaded = load(&path).unwrap();
        let view = loaded.view().unwrap();
        assert_eq!(view.node_count(), 2);
        assert_eq!(view.edge_count(), 2);
        assert_eq!(view.revision(), 1);
        let by_uri = view
            .get_nodes_by_value("uri", &"dmx.contacts.person".into())
            .unwrap();
        assert_eq!(by_uri.len(), 1);
        let incident = view.incident_edges(PlayerRef::Node(by_uri[0].id)).unwrap();
        assert_eq!(incident.len(), 1);
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let store = populated_store();
        let mut bytes = encode(&store.snapshot().unwrap()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn bad_magic_and_truncation_are_rejected() {
        assert!(matches!(decode(b"DMX"), Err(StoreError::Corrupt(_))));
        let store = populated_store();
        let mut bytes = encode(&store.snapshot().unwrap()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("absent.dmxg")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
