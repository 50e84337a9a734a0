//! Persisted registry state.
//!
//! The ledger stores exactly two items: the authority and the attestation map.
//! A snapshot encodes both in canonical CBOR; its SHA-256 is the state root,
//! which depends only on the current state and not on how it was reached.

use crate::crypto::sha256;
use crate::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use crate::types::{Hash256, Identity, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot format version
pub const SNAPSHOT_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub authority: Identity,
    pub attestations: BTreeMap<Identity, StatusCode>,
}

/// Versioned envelope written to storage.
#[derive(Serialize, Deserialize)]
struct StoredSnapshot {
    version: u8,
    state: RegistrySnapshot,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u8),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl RegistrySnapshot {
    /// Canonical hash of the persisted state.
    pub fn state_root(&self) -> Result<Hash256, SerializationError> {
        Ok(sha256(&to_canonical_cbor(self)?))
    }

    /// Encode for storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(&StoredSnapshot {
            version: SNAPSHOT_VERSION,
            state: self.clone(),
        })
    }

    /// Decode from storage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        let stored: StoredSnapshot = from_canonical_cbor(bytes)?;
        if stored.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(stored.version));
        }
        Ok(stored.state)
    }
}
