//! Ledger participants and the signing service.
//!
//! A [`Party`] is a well-known name bound to an ed25519 public key. Two
//! parties are the same party iff their keys are equal; the name is only
//! for humans and directory lookup.

use std::fmt;
use std::hash::{Hash, Hasher};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::{PartyKey, TxId};

/// A network participant identified by its public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Party {
    /// Well-known name, e.g. `"CurrencyIssuer"`.
    pub name: String,
    /// The party's ed25519 public key.
    pub key: PartyKey,
}

impl Party {
    #[must_use]
    pub fn new(name: impl Into<String>, key: PartyKey) -> Self {
        Self {
            name: name.into(),
            key,
        }
    }
}

impl PartialEq for Party {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Party {}

impl Hash for Party {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Party {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Party {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O={}", self.name)
    }
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// An ed25519 signature over a transaction id, tagged with the signer's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    /// The key that produced this signature.
    pub by: PartyKey,
    /// Raw 64-byte ed25519 signature.
    pub bytes: Vec<u8>,
}

impl TransactionSignature {
    /// Check this signature against `tx_id` and the embedded key.
    #[must_use]
    pub fn verify(&self, tx_id: &TxId) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(self.by.as_bytes()) else {
            return false;
        };
        let Ok(sig) = Signature::from_slice(&self.bytes) else {
            return false;
        };
        key.verify(tx_id.as_bytes(), &sig).is_ok()
    }
}

/// Produces signatures on behalf of one identity.
pub trait SigningService: Send + Sync {
    /// The public key whose private half this service holds.
    fn public_key(&self) -> PartyKey;

    /// Sign a transaction id.
    fn sign(&self, tx_id: &TxId) -> TransactionSignature;
}

/// In-process ed25519 key pair.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generate a fresh key pair from the OS RNG.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut rand::rngs::OsRng),
        }
    }

    /// Deterministic key pair from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Bind this key to a name.
    #[must_use]
    pub fn party(&self, name: impl Into<String>) -> Party {
        Party::new(name, self.public_key())
    }
}

impl SigningService for KeyPair {
    fn public_key(&self) -> PartyKey {
        PartyKey::from_pubkey(self.signing.verifying_key().to_bytes())
    }

    fn sign(&self, tx_id: &TxId) -> TransactionSignature {
        TransactionSignature {
            by: self.public_key(),
            bytes: self.signing.sign(tx_id.as_bytes()).to_bytes().to_vec(),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Dummy parties for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Party {
    /// A party with a random key and the given name.
    pub fn dummy(name: &str) -> Self {
        KeyPair::generate().party(name)
    }
}
