//! SSH host key for the server role (RFC 4253 Section 6.6).
//!
//! The piper presents exactly one host identity to every downstream
//! client, loaded once at startup and shared across sessions behind an
//! `Arc<dyn HostKey>`. Ed25519 is the supported algorithm.
//!
//! # Example
//!
//! ```rust
//! use strait_proto::ssh::hostkey::{HostKey, Ed25519HostKey};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let hostkey = Ed25519HostKey::generate()?;
//! let public_key = hostkey.public_key_bytes();
//! let signature = hostkey.sign(b"exchange hash")?;
//! # Ok(())
//! # }
//! ```

use ed25519_dalek::{Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use strait_platform::{StraitError, StraitResult};
use zeroize::Zeroizing;

/// Host key algorithm identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyAlgorithm {
    /// ssh-ed25519 - EdDSA signature using Ed25519
    SshEd25519,
}

impl HostKeyAlgorithm {
    /// Get the algorithm name as specified in RFC 4253
    pub fn name(&self) -> &'static str {
        match self {
            HostKeyAlgorithm::SshEd25519 => "ssh-ed25519",
        }
    }

    /// Parse algorithm from name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ssh-ed25519" => Some(HostKeyAlgorithm::SshEd25519),
            _ => None,
        }
    }
}

/// Trait for host key operations
pub trait HostKey: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> HostKeyAlgorithm;

    /// Get the public key in SSH wire format
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Sign data, returning the signature in SSH wire format
    /// (string format name, string signature bytes)
    fn sign(&self, data: &[u8]) -> StraitResult<Vec<u8>>;

    /// Get the algorithm name
    fn algorithm_name(&self) -> &'static str {
        self.algorithm().name()
    }
}

/// Ed25519 host key (ssh-ed25519)
#[derive(Clone)]
pub struct Ed25519HostKey {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519HostKey {
    /// Generate a new key pair
    pub fn generate() -> StraitResult<Self> {
        let mut csprng = rand::thread_rng();
        let secret_bytes: [u8; SECRET_KEY_LENGTH] = rand::Rng::gen(&mut csprng);
        Ok(Self::from_signing_key(SigningKey::from_bytes(&secret_bytes)))
    }

    /// Create from a 32-byte secret key
    pub fn from_bytes(secret_bytes: &[u8]) -> StraitResult<Self> {
        if secret_bytes.len() != 32 {
            return Err(StraitError::Security(
                "Ed25519 secret key must be 32 bytes".to_string(),
            ));
        }
        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(secret_bytes);
        Ok(Self::from_signing_key(SigningKey::from_bytes(&key_bytes)))
    }

    /// Create from a private key loaded via
    /// [`PrivateKey`](crate::ssh::privatekey::PrivateKey) file parsing
    pub fn from_private_key(key: &crate::ssh::privatekey::PrivateKey) -> StraitResult<Self> {
        match key {
            crate::ssh::privatekey::PrivateKey::Ed25519(ed) => {
                Ok(Self::from_signing_key(SigningKey::from_bytes(&ed.seed())))
            }
            _ => Err(StraitError::Config(
                "Host key must be an Ed25519 key".to_string(),
            )),
        }
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get the secret key bytes (32 bytes)
    ///
    /// WARNING: exposes private key material.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Get the verifying key
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

impl HostKey for Ed25519HostKey {
    fn algorithm(&self) -> HostKeyAlgorithm {
        HostKeyAlgorithm::SshEd25519
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        crate::ssh::publickey::PublicKey::Ed25519(self.verifying_key.to_bytes()).to_wire()
    }

    fn sign(&self, data: &[u8]) -> StraitResult<Vec<u8>> {
        let signature = self.signing_key.sign(data);
        Ok(
            crate::ssh::auth::SignatureBlob::new("ssh-ed25519", signature.to_bytes().to_vec())
                .to_bytes(),
        )
    }
}

impl std::fmt::Debug for Ed25519HostKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519HostKey")
            .field("algorithm", &"ssh-ed25519")
            .field("public_key", &hex::encode(self.verifying_key.as_bytes()))
            .finish_non_exhaustive()
    }
}
