//! Hashing and caller authentication.
//!
//! Callers sign transactions with Ed25519; the ledger derives the caller's
//! [`Identity`] from the verifying key, so only the key holder can act as
//! that identity. State roots use SHA-256.

use crate::types::{Hash256, Identity};
pub use ed25519_dalek::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Compute SHA-256 hash of data.
pub fn sha256(data: &[u8]) -> Hash256 {
    Sha256::digest(data).into()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid Ed25519 public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,
}

/// Fixed-size byte array encoded as a CBOR byte string.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

/// Ed25519 public key bytes.
pub type PublicKeyBytes = FixedBytes<32>;

/// Ed25519 signature bytes.
pub type SignatureBytes = FixedBytes<64>;

impl<const N: usize> From<[u8; N]> for FixedBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        FixedBytes(bytes)
    }
}

impl<const N: usize> AsRef<[u8; N]> for FixedBytes<N> {
    fn as_ref(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FixedVisitor<const N: usize>;

        impl<'de, const N: usize> serde::de::Visitor<'de> for FixedVisitor<N> {
            type Value = FixedBytes<N>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a byte string of length {}", N)
            }

            fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                <[u8; N]>::try_from(v)
                    .map(FixedBytes)
                    .map_err(|_| E::invalid_length(v.len(), &self))
            }

            fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                self.visit_bytes(&v)
            }
        }

        deserializer.deserialize_bytes(FixedVisitor::<N>)
    }
}

/// Verify `signature` over `message` and return the authenticated key.
pub fn verify_signature(
    public_key: &PublicKeyBytes,
    message: &[u8],
    signature: &SignatureBytes,
) -> Result<VerifyingKey, CryptoError> {
    use ed25519_dalek::Verifier;

    let key = VerifyingKey::from_bytes(public_key.as_ref())
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature = Signature::from_bytes(signature.as_ref());
    key.verify(message, &signature)
        .map_err(|_| CryptoError::InvalidSignature)?;
    Ok(key)
}

/// A key holder acting as a ledger identity.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Create a new signer from a signing key.
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// Generate a new random signing key.
    pub fn generate() -> Self {
        use rand::rngs::OsRng;
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        use ed25519_dalek::Signer as _;
        FixedBytes(self.signing_key.sign(message).to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        FixedBytes(self.verifying_key().to_bytes())
    }

    /// The ledger identity this key acts as.
    pub fn identity(&self) -> Identity {
        Identity::from_verifying_key(&self.verifying_key())
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("identity", &self.identity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{from_canonical_cbor, to_canonical_cbor};

    #[test]
    fn test_sha256() {
        let hash1 = sha256(b"registry state");
        let hash2 = sha256(b"registry state");
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, sha256(b"other state"));
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = Signer::generate();
        let signature = signer.sign(b"create-attestation");

        let key =
            verify_signature(&signer.public_key(), b"create-attestation", &signature).unwrap();
        assert_eq!(Identity::from_verifying_key(&key), signer.identity());
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let signer = Signer::generate();
        let signature = signer.sign(b"create-attestation");

        assert_eq!(
            verify_signature(&signer.public_key(), b"revoke-attestation", &signature),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn test_verify_rejects_foreign_key() {
        let signer = Signer::generate();
        let other = Signer::generate();
        let signature = signer.sign(b"payload");

        assert!(verify_signature(&other.public_key(), b"payload", &signature).is_err());
    }

    #[test]
    fn test_fixed_bytes_encode_as_byte_string() {
        let bytes = PublicKeyBytes::from([7u8; 32]);
        let encoded = to_canonical_cbor(&bytes).unwrap();

        // Major type 2, one-byte length 32
        assert_eq!(&encoded[..2], &[0x58, 32]);
        let decoded: PublicKeyBytes = from_canonical_cbor(&encoded).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_fixed_bytes_wrong_length() {
        let encoded = to_canonical_cbor(&FixedBytes([1u8; 16])).unwrap();
        assert!(from_canonical_cbor::<PublicKeyBytes>(&encoded).is_err());
    }
}
