//! Call and result encoding.
//!
//! A [`Call`] names one registry operation with its arguments. The caller is
//! never part of the call itself: it comes from the envelope, either a
//! [`Transaction`] whose caller the host has already authenticated, or a
//! [`SignedTransaction`] whose caller is derived from the signing key.

use crate::crypto::{verify_signature, CryptoError, PublicKeyBytes, SignatureBytes, Signer};
use crate::registry::{AttestationRegistry, RegistryError};
use crate::serialization::{from_canonical_cbor, to_canonical_cbor, SerializationError};
use crate::types::{Identity, RegistryEvent, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A registry operation and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Call {
    GetAuthority,
    GetAttestationStatus { subject: Identity },
    CreateAttestation { subject: Identity, status_code: StatusCode },
    RevokeAttestation { subject: Identity },
    TransferAuthority { new_authority: Identity },
}

/// Successful call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Uint(StatusCode),
    Principal(Identity),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Uint(n) => write!(f, "u{}", n),
            Value::Principal(p) => write!(f, "{}", p),
        }
    }
}

/// Result of a call: `ok(value)` or `err(code)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutput {
    Ok(Value),
    Err(u32),
}

impl CallOutput {
    pub fn is_ok(&self) -> bool {
        matches!(self, CallOutput::Ok(_))
    }

    /// The registry error behind an `err` result.
    pub fn error(&self) -> Option<RegistryError> {
        match self {
            CallOutput::Ok(_) => None,
            CallOutput::Err(code) => RegistryError::from_code(*code),
        }
    }
}

impl From<Result<Value, RegistryError>> for CallOutput {
    fn from(result: Result<Value, RegistryError>) -> Self {
        match result {
            Ok(value) => CallOutput::Ok(value),
            Err(err) => CallOutput::Err(err.code()),
        }
    }
}

impl fmt::Display for CallOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutput::Ok(value) => write!(f, "(ok {})", value),
            CallOutput::Err(code) => write!(f, "(err u{})", code),
        }
    }
}

/// Output of a call together with the events it emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: CallOutput,
    pub events: Vec<RegistryEvent>,
}

impl Call {
    /// Operation name as exposed on the ledger.
    pub fn name(&self) -> &'static str {
        match self {
            Call::GetAuthority => "get-authority",
            Call::GetAttestationStatus { .. } => "get-attestation-status",
            Call::CreateAttestation { .. } => "create-attestation",
            Call::RevokeAttestation { .. } => "revoke-attestation",
            Call::TransferAuthority { .. } => "transfer-authority",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Call::GetAuthority | Call::GetAttestationStatus { .. })
    }

    /// Evaluate a read-only call. Returns `None` for writes.
    pub fn query(&self, registry: &AttestationRegistry) -> Option<CallOutput> {
        let result = match self {
            Call::GetAuthority => Ok(Value::Principal(registry.authority().clone())),
            Call::GetAttestationStatus { subject } => {
                registry.attestation_status(subject).map(Value::Uint)
            }
            _ => return None,
        };
        Some(result.into())
    }

    /// Execute the call on behalf of `caller`.
    pub fn execute(&self, registry: &mut AttestationRegistry, caller: &Identity) -> Execution {
        let (result, event) = match self {
            Call::GetAuthority => {
                return Execution::read(Ok(Value::Principal(registry.authority().clone())));
            }
            Call::GetAttestationStatus { subject } => {
                return Execution::read(registry.attestation_status(subject).map(Value::Uint));
            }
            Call::CreateAttestation { subject, status_code } => (
                registry.create_attestation(caller, subject.clone(), *status_code),
                Some(RegistryEvent::AttestationCreated {
                    subject: subject.clone(),
                    status_code: *status_code,
                }),
            ),
            Call::RevokeAttestation { subject } => {
                // Revoking an absent subject succeeds but changes nothing.
                let present = registry.is_attested(subject);
                (
                    registry.revoke_attestation(caller, subject),
                    present.then(|| RegistryEvent::AttestationRevoked {
                        subject: subject.clone(),
                    }),
                )
            }
            Call::TransferAuthority { new_authority } => {
                let previous = registry.authority().clone();
                (
                    registry.transfer_authority(caller, new_authority.clone()),
                    Some(RegistryEvent::AuthorityTransferred {
                        previous,
                        current: new_authority.clone(),
                    }),
                )
            }
        };

        let events = match (&result, event) {
            (Ok(_), Some(event)) => vec![event],
            _ => Vec::new(),
        };
        Execution {
            output: result.map(Value::Bool).into(),
            events,
        }
    }
}

impl Execution {
    fn read(result: Result<Value, RegistryError>) -> Self {
        Self {
            output: result.into(),
            events: Vec::new(),
        }
    }
}

/// A call from a caller the host has already authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub caller: Identity,
    pub call: Call,
}

impl Transaction {
    pub fn new(caller: Identity, call: Call) -> Self {
        Self { caller, call }
    }
}

/// Bytes covered by a transaction signature.
#[derive(Serialize)]
struct SigningPayload<'a> {
    chain_id: &'a str,
    nonce: u64,
    call: &'a Call,
}

/// A call authenticated by the caller's Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub chain_id: String,
    pub nonce: u64,
    pub call: Call,
    pub public_key: PublicKeyBytes,
    pub signature: SignatureBytes,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthenticationError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Could not encode signing payload: {0}")]
    Serialization(#[from] SerializationError),
}

impl SignedTransaction {
    /// Sign `call` for submission to `chain_id` with the given nonce.
    pub fn sign(
        signer: &Signer,
        chain_id: impl Into<String>,
        nonce: u64,
        call: Call,
    ) -> Result<Self, SerializationError> {
        let chain_id = chain_id.into();
        let message = signing_message(&chain_id, nonce, &call)?;

        Ok(Self {
            signature: signer.sign(&message),
            public_key: signer.public_key(),
            chain_id,
            nonce,
            call,
        })
    }

    /// Check the signature and return the authenticated transaction.
    pub fn authenticate(&self) -> Result<Transaction, AuthenticationError> {
        let message = signing_message(&self.chain_id, self.nonce, &self.call)?;
        let key = verify_signature(&self.public_key, &message, &self.signature)?;

        Ok(Transaction {
            caller: Identity::from_verifying_key(&key),
            call: self.call.clone(),
        })
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        to_canonical_cbor(self)
    }

    /// Decode from the wire.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        from_canonical_cbor(bytes)
    }
}

fn signing_message(chain_id: &str, nonce: u64, call: &Call) -> Result<Vec<u8>, SerializationError> {
    to_canonical_cbor(&SigningPayload { chain_id, nonce, call })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployer() -> Identity {
        Identity::from("deployer")
    }

    fn create(subject: &str, status_code: StatusCode) -> Call {
        Call::CreateAttestation {
            subject: subject.into(),
            status_code,
        }
    }

    #[test]
    fn test_call_names() {
        assert_eq!(Call::GetAuthority.name(), "get-authority");
        assert_eq!(create("user_a", 1).name(), "create-attestation");
        assert!(Call::GetAttestationStatus { subject: deployer() }.is_read_only());
        assert!(!create("user_a", 1).is_read_only());
    }

    #[test]
    fn test_query_rejects_writes() {
        let registry = AttestationRegistry::new(deployer());
        assert_eq!(create("user_a", 1).query(&registry), None);
        assert_eq!(
            Call::GetAuthority.query(&registry),
            Some(CallOutput::Ok(Value::Principal(deployer())))
        );
    }

    #[test]
    fn test_execute_emits_event_on_success() {
        let mut registry = AttestationRegistry::new(deployer());

        let execution = create("user_a", 100).execute(&mut registry, &deployer());
        assert_eq!(execution.output, CallOutput::Ok(Value::Bool(true)));
        assert_eq!(
            execution.events,
            vec![RegistryEvent::AttestationCreated {
                subject: "user_a".into(),
                status_code: 100,
            }]
        );
    }

    #[test]
    fn test_execute_failure_has_no_events() {
        let mut registry = AttestationRegistry::new(deployer());

        let execution = create("user_a", 200).execute(&mut registry, &"intruder".into());
        assert_eq!(execution.output, CallOutput::Err(401));
        assert_eq!(execution.output.error(), Some(RegistryError::NotAuthorized));
        assert!(execution.events.is_empty());

        let lookup = Call::GetAttestationStatus { subject: "user_a".into() }
            .execute(&mut registry, &deployer());
        assert_eq!(lookup.output, CallOutput::Err(404));
    }

    #[test]
    fn test_revoke_emits_event_only_when_removed() {
        let mut registry = AttestationRegistry::new(deployer());
        let revoke = Call::RevokeAttestation { subject: "user_a".into() };

        let absent = revoke.execute(&mut registry, &deployer());
        assert_eq!(absent.output, CallOutput::Ok(Value::Bool(true)));
        assert!(absent.events.is_empty());

        create("user_a", 7).execute(&mut registry, &deployer());
        let present = revoke.execute(&mut registry, &deployer());
        assert_eq!(present.output, CallOutput::Ok(Value::Bool(true)));
        assert_eq!(
            present.events,
            vec![RegistryEvent::AttestationRevoked { subject: "user_a".into() }]
        );
    }

    #[test]
    fn test_execute_answers_reads_without_events() {
        let mut registry = AttestationRegistry::new(deployer());

        let authority = Call::GetAuthority.execute(&mut registry, &"anyone".into());
        assert_eq!(authority.output, CallOutput::Ok(Value::Principal(deployer())));
        assert!(authority.events.is_empty());
    }

    #[test]
    fn test_transfer_event_records_both_authorities() {
        let mut registry = AttestationRegistry::new(deployer());
        let execution = Call::TransferAuthority {
            new_authority: "successor".into(),
        }
        .execute(&mut registry, &deployer());

        assert_eq!(
            execution.events,
            vec![RegistryEvent::AuthorityTransferred {
                previous: deployer(),
                current: "successor".into(),
            }]
        );
    }

    #[test]
    fn test_output_display() {
        assert_eq!(CallOutput::Ok(Value::Uint(100)).to_string(), "(ok u100)");
        assert_eq!(CallOutput::Ok(Value::Bool(true)).to_string(), "(ok true)");
        assert_eq!(CallOutput::Err(404).to_string(), "(err u404)");
    }

    #[test]
    fn test_signed_transaction_authenticates_signer() {
        let signer = Signer::generate();
        let tx = SignedTransaction::sign(&signer, "testnet", 0, create("user_a", 5)).unwrap();

        let authenticated = tx.authenticate().unwrap();
        assert_eq!(authenticated.caller, signer.identity());
        assert_eq!(authenticated.call, create("user_a", 5));
    }

    #[test]
    fn test_signed_transaction_detects_tampering() {
        let signer = Signer::generate();
        let mut tx = SignedTransaction::sign(&signer, "testnet", 0, create("user_a", 5)).unwrap();
        tx.call = create("user_a", 6);

        assert!(matches!(
            tx.authenticate(),
            Err(AuthenticationError::Crypto(CryptoError::InvalidSignature))
        ));
    }

    #[test]
    fn test_signature_binds_chain_and_nonce() {
        let signer = Signer::generate();
        let tx = SignedTransaction::sign(&signer, "testnet", 3, create("user_a", 5)).unwrap();

        let mut other_chain = tx.clone();
        other_chain.chain_id = "mainnet".to_string();
        assert!(other_chain.authenticate().is_err());

        let mut other_nonce = tx;
        other_nonce.nonce = 4;
        assert!(other_nonce.authenticate().is_err());
    }

    #[test]
    fn test_signed_transaction_wire_encoding() {
        let signer = Signer::generate();
        let call = create("user_a", u128::MAX);
        let tx = SignedTransaction::sign(&signer, "testnet", 9, call).unwrap();

        let decoded = SignedTransaction::from_bytes(&tx.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.authenticate().unwrap().caller, signer.identity());
    }
}
