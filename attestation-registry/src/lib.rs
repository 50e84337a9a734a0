//! # Attestation Registry
//!
//! A single-authority registry of attestations: the authority asserts a
//! numeric status code about a subject identity, and may later revoke it.
//! Anyone can ask whether a subject is attested and with which code.
//!
//! ## Key Features
//! - **Authority-gated writes**: create, revoke and transfer all require the
//!   caller to be the current authority (`err u401` otherwise)
//! - **Typed lookups**: missing attestations surface as `err u404`
//! - **Canonical state roots**: SHA-256 over canonical CBOR snapshots
//! - **Ledger model**: signed, nonce-ordered, serialized transactions
//!   (`async` feature)

pub mod crypto;
#[cfg(feature = "async")]
pub mod ledger;
pub mod registry;
pub mod serialization;
pub mod state;
pub mod transaction;
pub mod types;

pub use crypto::{PublicKeyBytes, SignatureBytes, Signer};
#[cfg(feature = "async")]
pub use ledger::{Ledger, LedgerCheckpoint, LedgerConfig, LedgerError, Receipt};
pub use registry::{AttestationRegistry, RegistryError, ERR_NOT_AUTHORIZED, ERR_NOT_FOUND};
pub use state::{RegistrySnapshot, SnapshotError};
pub use transaction::{Call, CallOutput, SignedTransaction, Transaction, Value};
pub use types::*;
