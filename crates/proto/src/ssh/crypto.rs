//! AEAD packet encryption for the SSH transport.
//!
//! Supports ChaCha20-Poly1305 and AES-256-GCM. The packet sequence number
//! doubles as the AEAD nonce, so the encryption and decryption keys each
//! carry their own counter and must see every packet in order, which is
//! the property the transport's split read/write halves preserve.

use ring::aead::{
    Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM,
    CHACHA20_POLY1305,
};
use strait_platform::{StraitError, StraitResult};

/// Nonce counter for AEAD ciphers.
///
/// SSH uses the 64-bit packet sequence number as the nonce.
struct Counter {
    value: u64,
}

impl Counter {
    fn new() -> Self {
        Self { value: 0 }
    }
}

impl NonceSequence for Counter {
    fn advance(&mut self) -> Result<Nonce, ring::error::Unspecified> {
        let mut nonce_bytes = [0u8; 12];
        nonce_bytes[4..12].copy_from_slice(&self.value.to_be_bytes());
        self.value = self.value.wrapping_add(1);
        Nonce::try_assume_unique_for_key(&nonce_bytes)
    }
}

/// Cipher algorithm for SSH packet encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// ChaCha20-Poly1305 AEAD cipher
    ChaCha20Poly1305,
    /// AES-256-GCM AEAD cipher
    Aes256Gcm,
}

impl CipherAlgorithm {
    /// Returns the algorithm name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305@openssh.com",
            CipherAlgorithm::Aes256Gcm => "aes256-gcm@openssh.com",
        }
    }

    /// Returns the key size in bytes.
    pub fn key_size(&self) -> usize {
        32
    }

    /// Returns the authentication tag size in bytes.
    pub fn tag_size(&self) -> usize {
        16
    }

    /// Parses a cipher algorithm from its name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "chacha20-poly1305@openssh.com" => Some(CipherAlgorithm::ChaCha20Poly1305),
            "aes256-gcm@openssh.com" => Some(CipherAlgorithm::Aes256Gcm),
            _ => None,
        }
    }
}

fn unbound_key(algorithm: CipherAlgorithm, key_material: &[u8]) -> StraitResult<UnboundKey> {
    if key_material.len() < algorithm.key_size() {
        return Err(StraitError::Security(format!(
            "Insufficient key material: expected {}, got {}",
            algorithm.key_size(),
            key_material.len()
        )));
    }

    let alg = match algorithm {
        CipherAlgorithm::ChaCha20Poly1305 => &CHACHA20_POLY1305,
        CipherAlgorithm::Aes256Gcm => &AES_256_GCM,
    };

    UnboundKey::new(alg, &key_material[..algorithm.key_size()])
        .map_err(|_| StraitError::Security(format!("Failed to create {} key", algorithm.name())))
}

/// Encryption key for outgoing packets.
pub struct EncryptionKey {
    algorithm: CipherAlgorithm,
    key: SealingKey<Counter>,
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl EncryptionKey {
    /// Creates a new encryption key from derived key material.
    pub fn new(algorithm: CipherAlgorithm, key_material: &[u8]) -> StraitResult<Self> {
        let key = SealingKey::new(unbound_key(algorithm, key_material)?, Counter::new());
        Ok(Self { algorithm, key })
    }

    /// Encrypts data in place, appending the authentication tag.
    pub fn encrypt(&mut self, data: &mut Vec<u8>) -> StraitResult<()> {
        self.key
            .seal_in_place_append_tag(Aad::empty(), data)
            .map_err(|_| StraitError::Security("Encryption failed".to_string()))
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }
}

/// Decryption key for incoming packets.
pub struct DecryptionKey {
    algorithm: CipherAlgorithm,
    key: OpeningKey<Counter>,
}

impl std::fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl DecryptionKey {
    /// Creates a new decryption key from derived key material.
    pub fn new(algorithm: CipherAlgorithm, key_material: &[u8]) -> StraitResult<Self> {
        let key = OpeningKey::new(unbound_key(algorithm, key_material)?, Counter::new());
        Ok(Self { algorithm, key })
    }

    /// Decrypts data in place, verifying and stripping the tag.
    pub fn decrypt(&mut self, data: &mut Vec<u8>) -> StraitResult<()> {
        let plaintext_len = {
            let plaintext = self.key.open_in_place(Aad::empty(), data).map_err(|_| {
                StraitError::Security("Decryption failed or authentication tag mismatch".to_string())
            })?;
            plaintext.len()
        };
        data.truncate(plaintext_len);
        Ok(())
    }

    /// Returns the algorithm.
    pub fn algorithm(&self) -> CipherAlgorithm {
        self.algorithm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_names() {
        assert_eq!(
            CipherAlgorithm::ChaCha20Poly1305.name(),
            "chacha20-poly1305@openssh.com"
        );
        assert_eq!(
            CipherAlgorithm::from_name("aes256-gcm@openssh.com"),
            Some(CipherAlgorithm::Aes256Gcm)
        );
        assert_eq!(CipherAlgorithm::from_name("des"), None);
    }

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key_material = [0x42u8; 32];
        let mut enc = EncryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &key_material).unwrap();
        let mut dec = DecryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &key_material).unwrap();

        let mut data = b"a packet body".to_vec();
        enc.encrypt(&mut data).unwrap();
        assert_ne!(&data[..13], b"a packet body");
        assert_eq!(data.len(), 13 + 16);

        dec.decrypt(&mut data).unwrap();
        assert_eq!(data, b"a packet body");
    }

    #[test]
    fn test_decrypt_sequence_matters() {
        let key_material = [0x42u8; 32];
        let mut enc = EncryptionKey::new(CipherAlgorithm::Aes256Gcm, &key_material).unwrap();
        let mut dec = DecryptionKey::new(CipherAlgorithm::Aes256Gcm, &key_material).unwrap();

        let mut first = b"first".to_vec();
        let mut second = b"second".to_vec();
        enc.encrypt(&mut first).unwrap();
        enc.encrypt(&mut second).unwrap();

        // Decrypting out of order fails the tag check.
        let mut out_of_order = second.clone();
        assert!(dec.decrypt(&mut out_of_order).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let key_material = [0x42u8; 32];
        let mut enc = EncryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &key_material).unwrap();
        let mut dec = DecryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &key_material).unwrap();

        let mut data = b"payload".to_vec();
        enc.encrypt(&mut data).unwrap();
        data[0] ^= 0xFF;
        assert!(dec.decrypt(&mut data).is_err());
    }

    #[test]
    fn test_short_key_material_rejected() {
        let short = [0u8; 16];
        assert!(EncryptionKey::new(CipherAlgorithm::Aes256Gcm, &short).is_err());
        assert!(DecryptionKey::new(CipherAlgorithm::Aes256Gcm, &short).is_err());
    }
}
