//! Core types shared by the registry, the transaction encoding and the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA-256 hash (32 bytes)
pub type Hash256 = [u8; 32];

/// Opaque status code carried by an attestation.
///
/// Meaning (tier, verification level, ...) is an off-chain convention between
/// the authority and its consumers. Any value is accepted.
pub type StatusCode = u128;

/// Prefix for identities derived from an Ed25519 public key.
pub const ED25519_IDENTITY_PREFIX: &str = "ed25519:";

/// A principal on the ledger (caller, authority or attestation subject).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(principal: impl Into<String>) -> Self {
        Identity(principal.into())
    }

    /// Identity controlled by the holder of the matching signing key.
    pub fn from_verifying_key(key: &ed25519_dalek::VerifyingKey) -> Self {
        Identity(format!("{}{}", ED25519_IDENTITY_PREFIX, hex::encode(key.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identity {
    fn from(principal: &str) -> Self {
        Identity(principal.to_string())
    }
}

impl From<String> for Identity {
    fn from(principal: String) -> Self {
        Identity(principal)
    }
}

/// State change emitted by a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryEvent {
    AttestationCreated {
        subject: Identity,
        status_code: StatusCode,
    },
    AttestationRevoked {
        subject: Identity,
    },
    AuthorityTransferred {
        previous: Identity,
        current: Identity,
    },
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryEvent::AttestationCreated { subject, status_code } => {
                write!(f, "attestation-created({}, u{})", subject, status_code)
            }
            RegistryEvent::AttestationRevoked { subject } => {
                write!(f, "attestation-revoked({})", subject)
            }
            RegistryEvent::AuthorityTransferred { previous, current } => {
                write!(f, "authority-transferred({} -> {})", previous, current)
            }
        }
    }
}
