//! Wire-format SSH public keys and signature verification.
//!
//! A public key blob is the SSH-encoded form carried in authentication
//! requests, authorized_keys entries, and KEXDH replies:
//!
//! ```text
//! string    key type name
//! ....      type-specific fields
//! ```
//!
//! The rewriter parses the downstream's blob to look it up in the
//! credential store and to verify the signature that arrived with it; the
//! backend signer's blob is re-marshaled from here when the request is
//! rewritten.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use strait_platform::{StraitError, StraitResult};

use crate::ssh::auth::{read_bytes, read_string, write_bytes, write_string};
use crate::ssh::kex_dh::encode_mpint;
use base64::Engine;
use bytes::BytesMut;

/// A parsed SSH public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// Ed25519 public key (32 bytes)
    Ed25519([u8; 32]),
    /// RSA public key
    Rsa {
        /// Public exponent
        e: Vec<u8>,
        /// Modulus
        n: Vec<u8>,
    },
    /// ECDSA public key on NIST P-256 (uncompressed SEC1 point)
    EcdsaP256(Vec<u8>),
}

impl PublicKey {
    /// Parses a key from its SSH wire blob.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] on truncation, an unknown key
    /// type, or malformed type-specific fields.
    pub fn from_wire(blob: &[u8]) -> StraitResult<Self> {
        let mut offset = 0;
        let key_type = read_string(blob, &mut offset)?;

        let key = match key_type.as_str() {
            "ssh-ed25519" => {
                let key_bytes = read_bytes(blob, &mut offset)?;
                if key_bytes.len() != 32 {
                    return Err(StraitError::Protocol(format!(
                        "Ed25519 public key must be 32 bytes, got {}",
                        key_bytes.len()
                    )));
                }
                let mut key = [0u8; 32];
                key.copy_from_slice(&key_bytes);
                PublicKey::Ed25519(key)
            }
            "ssh-rsa" => {
                let e = read_bytes(blob, &mut offset)?;
                let n = read_bytes(blob, &mut offset)?;
                PublicKey::Rsa { e, n }
            }
            "ecdsa-sha2-nistp256" => {
                let curve = read_string(blob, &mut offset)?;
                if curve != "nistp256" {
                    return Err(StraitError::Protocol(format!(
                        "Unexpected curve '{}' for ecdsa-sha2-nistp256",
                        curve
                    )));
                }
                let point = read_bytes(blob, &mut offset)?;
                PublicKey::EcdsaP256(point)
            }
            other => {
                return Err(StraitError::Protocol(format!(
                    "Unsupported public key type: '{}'",
                    other
                )))
            }
        };

        if offset != blob.len() {
            return Err(StraitError::Protocol(
                "trailing bytes in public key blob".to_string(),
            ));
        }

        Ok(key)
    }

    /// Returns the SSH wire blob for this key.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        match self {
            PublicKey::Ed25519(key) => {
                write_string(&mut buf, "ssh-ed25519");
                write_bytes(&mut buf, key);
            }
            PublicKey::Rsa { e, n } => {
                write_string(&mut buf, "ssh-rsa");
                buf.extend_from_slice(&encode_mpint(e));
                buf.extend_from_slice(&encode_mpint(n));
            }
            PublicKey::EcdsaP256(point) => {
                write_string(&mut buf, "ecdsa-sha2-nistp256");
                write_string(&mut buf, "nistp256");
                write_bytes(&mut buf, point);
            }
        }

        buf.to_vec()
    }

    /// Returns the canonical key type name.
    pub fn algorithm(&self) -> &'static str {
        match self {
            PublicKey::Ed25519(_) => "ssh-ed25519",
            PublicKey::Rsa { .. } => "ssh-rsa",
            PublicKey::EcdsaP256(_) => "ecdsa-sha2-nistp256",
        }
    }

    /// Verifies `signature` (the raw bytes from a signature blob) over
    /// `data`, interpreted under `sig_format`.
    ///
    /// A format that does not fit this key, a malformed signature, or a
    /// failed check all yield `Ok(false)`; the caller treats every one of
    /// them as an ordinary authentication refusal.
    pub fn verify(&self, sig_format: &str, data: &[u8], signature: &[u8]) -> StraitResult<bool> {
        match (self, sig_format) {
            (PublicKey::Ed25519(key), "ssh-ed25519") => {
                if signature.len() != 64 {
                    return Ok(false);
                }
                let verifying_key = match VerifyingKey::from_bytes(key) {
                    Ok(vk) => vk,
                    Err(_) => return Ok(false),
                };
                let mut sig_bytes = [0u8; 64];
                sig_bytes.copy_from_slice(signature);
                let sig = Signature::from_bytes(&sig_bytes);
                Ok(verifying_key.verify(data, &sig).is_ok())
            }
            (PublicKey::Rsa { e, n }, "rsa-sha2-256") => {
                Ok(rsa_verify(e, n, signature, Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(data)))
            }
            (PublicKey::Rsa { e, n }, "rsa-sha2-512") => {
                Ok(rsa_verify(e, n, signature, Pkcs1v15Sign::new::<Sha512>(), &Sha512::digest(data)))
            }
            (PublicKey::Rsa { e, n }, "ssh-rsa") => {
                Ok(rsa_verify(e, n, signature, Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(data)))
            }
            (PublicKey::EcdsaP256(point), "ecdsa-sha2-nistp256") => {
                Ok(ecdsa_p256_verify(point, data, signature))
            }
            _ => Ok(false),
        }
    }

    /// Returns the OpenSSH-style SHA-256 fingerprint of the wire blob.
    pub fn fingerprint_sha256(&self) -> String {
        fingerprint_sha256(&self.to_wire())
    }
}

/// Computes the OpenSSH-style SHA-256 fingerprint of a key blob.
pub fn fingerprint_sha256(key_blob: &[u8]) -> String {
    let hash = Sha256::digest(key_blob);
    format!(
        "SHA256:{}",
        base64::engine::general_purpose::STANDARD_NO_PAD.encode(hash)
    )
}

fn rsa_verify(e: &[u8], n: &[u8], signature: &[u8], scheme: Pkcs1v15Sign, hashed: &[u8]) -> bool {
    let key = match RsaPublicKey::new(BigUint::from_bytes_be(n), BigUint::from_bytes_be(e)) {
        Ok(key) => key,
        Err(_) => return false,
    };
    key.verify(scheme, hashed, signature).is_ok()
}

fn ecdsa_p256_verify(point: &[u8], data: &[u8], signature: &[u8]) -> bool {
    use p256::ecdsa::signature::Verifier as _;
    use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};

    let verifying_key = match P256VerifyingKey::from_sec1_bytes(point) {
        Ok(vk) => vk,
        Err(_) => return false,
    };

    // SSH ECDSA signatures carry (mpint r, mpint s).
    let (r, s) = match parse_ecdsa_scalars(signature) {
        Some(pair) => pair,
        None => return false,
    };

    let sig = match P256Signature::from_scalars(r, s) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    verifying_key.verify(data, &sig).is_ok()
}

/// Splits an SSH ECDSA signature body into fixed-width r and s scalars.
fn parse_ecdsa_scalars(signature: &[u8]) -> Option<([u8; 32], [u8; 32])> {
    let mut offset = 0;
    let r = read_bytes(signature, &mut offset).ok()?;
    let s = read_bytes(signature, &mut offset).ok()?;
    if offset != signature.len() {
        return None;
    }
    Some((mpint_to_fixed(&r)?, mpint_to_fixed(&s)?))
}

fn mpint_to_fixed(mpint: &[u8]) -> Option<[u8; 32]> {
    let trimmed: Vec<u8> = mpint.iter().skip_while(|&&b| b == 0).copied().collect();
    if trimmed.len() > 32 {
        return None;
    }
    let mut fixed = [0u8; 32];
    fixed[32 - trimmed.len()..].copy_from_slice(&trimmed);
    Some(fixed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::privatekey::PrivateKey;

    fn ed25519_key() -> (PrivateKey, PublicKey) {
        let private = PrivateKey::ed25519_from_seed([7u8; 32]);
        let public = private.public_key();
        (private, public)
    }

    #[test]
    fn test_ed25519_wire_round_trip() {
        let (_, public) = ed25519_key();
        let blob = public.to_wire();
        let parsed = PublicKey::from_wire(&blob).unwrap();
        assert_eq!(parsed, public);
        assert_eq!(parsed.algorithm(), "ssh-ed25519");
    }

    #[test]
    fn test_ed25519_verify() {
        let (private, public) = ed25519_key();
        let data = b"session-bound signature data";
        let signature = private.sign(data).unwrap();

        assert!(public.verify("ssh-ed25519", data, &signature).unwrap());
        assert!(!public.verify("ssh-ed25519", b"other data", &signature).unwrap());
    }

    #[test]
    fn test_verify_wrong_key_fails() {
        let (private, _) = ed25519_key();
        let other = PrivateKey::ed25519_from_seed([8u8; 32]).public_key();

        let data = b"data";
        let signature = private.sign(data).unwrap();
        assert!(!other.verify("ssh-ed25519", data, &signature).unwrap());
    }

    #[test]
    fn test_verify_format_mismatch_is_false_not_error() {
        let (private, public) = ed25519_key();
        let data = b"data";
        let signature = private.sign(data).unwrap();

        assert!(!public.verify("rsa-sha2-256", data, &signature).unwrap());
        assert!(!public.verify("ssh-dss", data, &signature).unwrap());
    }

    #[test]
    fn test_malformed_signature_is_false() {
        let (_, public) = ed25519_key();
        assert!(!public.verify("ssh-ed25519", b"data", &[1, 2, 3]).unwrap());
    }

    #[test]
    fn test_unknown_key_type_rejected() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "ssh-dss");
        write_bytes(&mut buf, &[1, 2, 3]);
        assert!(PublicKey::from_wire(&buf).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let (_, public) = ed25519_key();
        let mut blob = public.to_wire();
        blob.push(0);
        assert!(PublicKey::from_wire(&blob).is_err());
    }

    #[test]
    fn test_fingerprint_format() {
        let (_, public) = ed25519_key();
        let fp = public.fingerprint_sha256();
        assert!(fp.starts_with("SHA256:"));
        assert!(fp.len() > 10);
    }

    #[test]
    fn test_mpint_to_fixed() {
        assert_eq!(mpint_to_fixed(&[0x01]).unwrap()[31], 0x01);
        assert_eq!(mpint_to_fixed(&[0x00, 0x80]).unwrap()[31], 0x80);
        assert!(mpint_to_fixed(&[0x01; 40]).is_none());
    }
}
