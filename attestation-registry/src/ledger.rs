//! In-process ledger hosting one attestation registry.
//!
//! The ledger plays the role of the chain: it authenticates callers, orders
//! transactions and commits each one completely before the next starts. All
//! access to the registry goes through a single lock, which is the only
//! serialization point; the registry itself holds no locks.
//!
//! A transaction rejected by the ledger (bad signature, wrong chain, stale
//! nonce) never reaches the registry and is not recorded. A transaction that
//! reaches the registry is committed even when the registry answers with an
//! error; its receipt carries `(err u401)` or `(err u404)` and state is left
//! unchanged.

use crate::registry::AttestationRegistry;
use crate::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use crate::state::RegistrySnapshot;
use crate::transaction::{AuthenticationError, Call, CallOutput, SignedTransaction, Transaction};
use crate::types::{Hash256, Identity, RegistryEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Chain identifier bound into every signed transaction
    pub chain_id: String,
    /// Height of the deployment block
    pub genesis_height: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            chain_id: "attestation-devnet".to_string(),
            genesis_height: 0,
        }
    }
}

/// Record of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub height: u64,
    pub caller: Identity,
    pub operation: String,
    pub output: CallOutput,
    pub events: Vec<RegistryEvent>,
    pub committed_at: DateTime<Utc>,
}

/// Reasons the ledger refuses a transaction before it reaches the registry.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Transaction for chain {got} submitted to chain {expected}")]
    ChainMismatch { expected: String, got: String },

    #[error("Stale nonce for {caller}: expected {expected}, got {got}")]
    StaleNonce {
        caller: Identity,
        expected: u64,
        got: u64,
    },

    #[error("{0} is not a read-only call")]
    NotReadOnly(&'static str),

    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    #[error("State encoding failed: {0}")]
    Serialization(#[from] SerializationError),
}

/// Persisted ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCheckpoint {
    pub chain_id: String,
    pub height: u64,
    /// Next expected nonce per signing identity
    pub nonces: BTreeMap<Identity, u64>,
    pub registry: RegistrySnapshot,
}

impl LedgerCheckpoint {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        from_canonical_cbor(bytes)
    }
}

struct LedgerState {
    registry: AttestationRegistry,
    height: u64,
    nonces: HashMap<Identity, u64>,
}

impl LedgerState {
    fn commit(&mut self, tx: Transaction) -> Receipt {
        let execution = tx.call.execute(&mut self.registry, &tx.caller);
        self.height += 1;

        info!(
            height = self.height,
            caller = %tx.caller,
            operation = tx.call.name(),
            output = %execution.output,
            "transaction committed"
        );

        Receipt {
            height: self.height,
            caller: tx.caller,
            operation: tx.call.name().to_string(),
            output: execution.output,
            events: execution.events,
            committed_at: Utc::now(),
        }
    }
}

/// A ledger hosting one registry.
pub struct Ledger {
    config: LedgerConfig,
    state: Mutex<LedgerState>,
}

impl Ledger {
    /// Deploy a fresh registry with `deployer` as its authority.
    pub fn deploy(config: LedgerConfig, deployer: Identity) -> Self {
        info!(chain_id = %config.chain_id, %deployer, "deploying attestation registry");
        let state = LedgerState {
            registry: AttestationRegistry::new(deployer),
            height: config.genesis_height,
            nonces: HashMap::new(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// Resume a ledger from a checkpoint taken with [`Ledger::checkpoint`].
    ///
    /// Nonces are restored along with the registry, so signed transactions
    /// committed before the checkpoint stay unreplayable.
    pub fn resume(
        config: LedgerConfig,
        checkpoint: LedgerCheckpoint,
    ) -> Result<Self, LedgerError> {
        if checkpoint.chain_id != config.chain_id {
            return Err(LedgerError::ChainMismatch {
                expected: config.chain_id,
                got: checkpoint.chain_id,
            });
        }

        info!(
            chain_id = %config.chain_id,
            height = checkpoint.height,
            callers = checkpoint.nonces.len(),
            "resuming ledger from checkpoint"
        );
        Ok(Self {
            config,
            state: Mutex::new(LedgerState {
                registry: AttestationRegistry::restore(checkpoint.registry),
                height: checkpoint.height,
                nonces: checkpoint.nonces.into_iter().collect(),
            }),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Commit a transaction whose caller is already authenticated.
    pub async fn submit(&self, tx: Transaction) -> Receipt {
        self.state.lock().await.commit(tx)
    }

    /// Authenticate, check chain and nonce, then commit.
    pub async fn submit_signed(&self, tx: SignedTransaction) -> Result<Receipt, LedgerError> {
        if tx.chain_id != self.config.chain_id {
            warn!(
                expected = %self.config.chain_id,
                got = %tx.chain_id,
                "rejected transaction for foreign chain"
            );
            return Err(LedgerError::ChainMismatch {
                expected: self.config.chain_id.clone(),
                got: tx.chain_id,
            });
        }

        let authenticated = tx.authenticate().map_err(|e| {
            warn!(error = %e, "rejected unauthenticated transaction");
            LedgerError::from(e)
        })?;

        let mut state = self.state.lock().await;
        let expected = state.nonces.get(&authenticated.caller).copied().unwrap_or(0);
        if tx.nonce != expected {
            warn!(caller = %authenticated.caller, expected, got = tx.nonce, "rejected stale nonce");
            return Err(LedgerError::StaleNonce {
                caller: authenticated.caller,
                expected,
                got: tx.nonce,
            });
        }

        state.nonces.insert(authenticated.caller.clone(), expected + 1);
        debug!(caller = %authenticated.caller, next_nonce = expected + 1, "nonce consumed");
        Ok(state.commit(authenticated))
    }

    /// Evaluate a read-only call against current state without committing.
    pub async fn call_read_only(&self, call: &Call) -> Result<CallOutput, LedgerError> {
        let state = self.state.lock().await;
        call.query(&state.registry)
            .ok_or(LedgerError::NotReadOnly(call.name()))
    }

    /// Height of the last committed transaction.
    pub async fn height(&self) -> u64 {
        self.state.lock().await.height
    }

    /// Next nonce expected from `caller`.
    pub async fn next_nonce(&self, caller: &Identity) -> u64 {
        self.state.lock().await.nonces.get(caller).copied().unwrap_or(0)
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.state.lock().await.registry.snapshot()
    }

    /// Everything needed to resume this ledger: registry state, height and
    /// per-caller nonces, taken under one lock.
    pub async fn checkpoint(&self) -> LedgerCheckpoint {
        let state = self.state.lock().await;
        LedgerCheckpoint {
            chain_id: self.config.chain_id.clone(),
            height: state.height,
            nonces: state.nonces.iter().map(|(id, n)| (id.clone(), *n)).collect(),
            registry: state.registry.snapshot(),
        }
    }

    pub async fn state_root(&self) -> Result<Hash256, LedgerError> {
        Ok(self.snapshot().await.state_root()?)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
