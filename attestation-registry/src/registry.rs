//! The authority-gated attestation registry.
//!
//! A registry holds exactly one authority and a map from subject identity to
//! status code. Reads are open to anyone; every write is gated by the same
//! check: the caller must be the current authority. The check runs before any
//! mutation and each successful write performs a single mutation, so a failed
//! call never leaves partial effects behind.

use crate::state::RegistrySnapshot;
use crate::types::{Identity, StatusCode};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Numeric code surfaced to callers for [`RegistryError::NotAuthorized`].
pub const ERR_NOT_AUTHORIZED: u32 = 401;

/// Numeric code surfaced to callers for [`RegistryError::NotFound`].
pub const ERR_NOT_FOUND: u32 = 404;

/// Failures returned by registry operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Caller is not the registry authority")]
    NotAuthorized,

    #[error("No attestation found for subject")]
    NotFound,
}

impl RegistryError {
    /// The numeric error code (401 / 404).
    pub fn code(&self) -> u32 {
        match self {
            RegistryError::NotAuthorized => ERR_NOT_AUTHORIZED,
            RegistryError::NotFound => ERR_NOT_FOUND,
        }
    }

    /// Map a numeric code back to the error, if it is one of ours.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            ERR_NOT_AUTHORIZED => Some(RegistryError::NotAuthorized),
            ERR_NOT_FOUND => Some(RegistryError::NotFound),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Single-authority attestation registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationRegistry {
    authority: Identity,
    attestations: BTreeMap<Identity, StatusCode>,
}

impl AttestationRegistry {
    /// Create a registry whose authority is the deploying identity.
    pub fn new(deployer: Identity) -> Self {
        info!(authority = %deployer, "attestation registry initialized");
        Self {
            authority: deployer,
            attestations: BTreeMap::new(),
        }
    }

    /// Current authority. Never fails.
    pub fn authority(&self) -> &Identity {
        &self.authority
    }

    /// Status code attested for `subject`, or `NotFound`.
    pub fn attestation_status(&self, subject: &Identity) -> Result<StatusCode> {
        let status = self.attestations.get(subject).copied();
        debug!(%subject, found = status.is_some(), "attestation lookup");
        status.ok_or(RegistryError::NotFound)
    }

    /// Whether `subject` currently holds an attestation.
    pub fn is_attested(&self, subject: &Identity) -> bool {
        self.attestations.contains_key(subject)
    }

    /// Number of live attestations.
    pub fn attestation_count(&self) -> usize {
        self.attestations.len()
    }

    /// Iterate over live attestations in subject order.
    pub fn attestations(&self) -> impl Iterator<Item = (&Identity, StatusCode)> {
        self.attestations.iter().map(|(subject, code)| (subject, *code))
    }

    /// Assert `status_code` for `subject`, replacing any previous code.
    pub fn create_attestation(
        &mut self,
        caller: &Identity,
        subject: Identity,
        status_code: StatusCode,
    ) -> Result<bool> {
        self.ensure_authority(caller, "create-attestation")?;

        let previous = self.attestations.insert(subject.clone(), status_code);
        info!(
            %subject,
            status_code,
            replaced = previous.is_some(),
            "attestation created"
        );
        Ok(true)
    }

    /// Remove the attestation for `subject`.
    ///
    /// Revoking a subject that holds no attestation succeeds without
    /// changing state.
    pub fn revoke_attestation(&mut self, caller: &Identity, subject: &Identity) -> Result<bool> {
        self.ensure_authority(caller, "revoke-attestation")?;

        match self.attestations.remove(subject) {
            Some(status_code) => info!(%subject, status_code, "attestation revoked"),
            None => debug!(%subject, "revoke of absent attestation"),
        }
        Ok(true)
    }

    /// Hand the authority role to `new_authority`. Attestations are kept.
    pub fn transfer_authority(
        &mut self,
        caller: &Identity,
        new_authority: Identity,
    ) -> Result<bool> {
        self.ensure_authority(caller, "transfer-authority")?;

        info!(previous = %self.authority, current = %new_authority, "authority transferred");
        self.authority = new_authority;
        Ok(true)
    }

    /// Export the persisted state layout.
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            authority: self.authority.clone(),
            attestations: self.attestations.clone(),
        }
    }

    /// Rebuild a registry from a persisted snapshot.
    pub fn restore(snapshot: RegistrySnapshot) -> Self {
        debug!(
            authority = %snapshot.authority,
            attestations = snapshot.attestations.len(),
            "registry restored from snapshot"
        );
        Self {
            authority: snapshot.authority,
            attestations: snapshot.attestations,
        }
    }

    fn ensure_authority(&self, caller: &Identity, operation: &'static str) -> Result<()> {
        if caller != &self.authority {
            warn!(%caller, operation, "rejected caller without authority");
            return Err(RegistryError::NotAuthorized);
        }
        Ok(())
    }
}
