//! Curve25519 key exchange and session key derivation (RFC 8731, RFC 4253
//! Section 7.2).
//!
//! The exchange produces the shared secret K; [`derive_key`] then expands
//! K and the exchange hash H into the directional cipher keys. The piper
//! runs this twice per session, once in each role, and the two resulting
//! session identifiers must never be confused: signatures from the
//! downstream verify against the downstream's H, signatures toward the
//! upstream bind the upstream's H.

use ring::agreement::{agree_ephemeral, EphemeralPrivateKey, UnparsedPublicKey, X25519};
use ring::rand::SystemRandom;
use sha2::{Digest, Sha256};
use strait_platform::{StraitError, StraitResult};

/// Curve25519 key exchange (curve25519-sha256, curve25519-sha256@libssh.org).
pub struct Curve25519Exchange {
    /// Ephemeral private key
    private_key: EphemeralPrivateKey,
    /// Public key (32 bytes)
    public_key: [u8; 32],
}

impl Curve25519Exchange {
    /// Generates a new ephemeral key pair.
    ///
    /// # Example
    ///
    /// ```rust
    /// use strait_proto::ssh::kex_dh::Curve25519Exchange;
    ///
    /// let exchange = Curve25519Exchange::new().unwrap();
    /// assert_eq!(exchange.public_key().len(), 32);
    /// ```
    pub fn new() -> StraitResult<Self> {
        let rng = SystemRandom::new();
        let private_key = EphemeralPrivateKey::generate(&X25519, &rng)
            .map_err(|_| StraitError::Security("Failed to generate Curve25519 key".to_string()))?;

        let public_key = private_key.compute_public_key().map_err(|_| {
            StraitError::Security("Failed to compute Curve25519 public key".to_string())
        })?;

        let mut public_key_bytes = [0u8; 32];
        public_key_bytes.copy_from_slice(public_key.as_ref());

        Ok(Self {
            private_key,
            public_key: public_key_bytes,
        })
    }

    /// Returns the public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Computes the shared secret K, consuming the ephemeral key.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Security`] if the key agreement fails.
    pub fn compute_shared_secret(self, peer_public: &[u8; 32]) -> StraitResult<Vec<u8>> {
        let peer_public_key = UnparsedPublicKey::new(&X25519, peer_public);

        agree_ephemeral(self.private_key, &peer_public_key, |key_material| {
            key_material.to_vec()
        })
        .map_err(|_| StraitError::Security("Curve25519 key agreement failed".to_string()))
    }
}

/// Derives an SSH session key (RFC 4253 Section 7.2).
///
/// ```text
/// Initial IV client to server:     HASH(K || H || "A" || session_id)
/// Initial IV server to client:     HASH(K || H || "B" || session_id)
/// Encryption key client to server: HASH(K || H || "C" || session_id)
/// Encryption key server to client: HASH(K || H || "D" || session_id)
/// Integrity key client to server:  HASH(K || H || "E" || session_id)
/// Integrity key server to client:  HASH(K || H || "F" || session_id)
/// ```
///
/// K is fed to the hash in mpint encoding. When the requested length
/// exceeds one hash block the output is extended with
/// `HASH(K || H || previous_block)`.
pub fn derive_key(
    shared_secret: &[u8],
    exchange_hash: &[u8],
    session_id: &[u8],
    key_type: u8,
    key_length: usize,
) -> Vec<u8> {
    let mut key = Vec::new();
    let mut hasher = Sha256::new();

    let k_mpint = encode_mpint(shared_secret);

    hasher.update(&k_mpint);
    hasher.update(exchange_hash);
    hasher.update([key_type]);
    hasher.update(session_id);
    let block = hasher.finalize_reset();
    key.extend_from_slice(&block);

    while key.len() < key_length {
        hasher.update(&k_mpint);
        hasher.update(exchange_hash);
        hasher.update(&key[key.len() - 32..]);
        let block = hasher.finalize_reset();
        key.extend_from_slice(&block);
    }

    key.truncate(key_length);
    key
}

/// Encodes a big integer as SSH mpint: uint32 length + magnitude bytes,
/// with a leading 0x00 when the high bit is set.
pub(crate) fn encode_mpint(data: &[u8]) -> Vec<u8> {
    let trimmed = data
        .iter()
        .skip_while(|&&b| b == 0)
        .copied()
        .collect::<Vec<_>>();

    if trimmed.is_empty() {
        return vec![0, 0, 0, 0];
    }

    let needs_padding = trimmed[0] & 0x80 != 0;
    let length = if needs_padding {
        trimmed.len() + 1
    } else {
        trimmed.len()
    };

    let mut result = Vec::with_capacity(4 + length);
    result.extend_from_slice(&(length as u32).to_be_bytes());

    if needs_padding {
        result.push(0);
    }
    result.extend_from_slice(&trimmed);

    result
}
