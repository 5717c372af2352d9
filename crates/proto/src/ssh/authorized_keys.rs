//! OpenSSH authorized_keys file parsing.
//!
//! The reference credential resolver keeps one authorized_keys file per
//! user; a downstream key must match an entry before the user's backend
//! credential is released.
//!
//! # Format
//!
//! Each line:
//! ```text
//! [options] keytype base64-key [comment]
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use strait_proto::ssh::authorized_keys::AuthorizedKeysFile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = AuthorizedKeysFile::from_file("/var/strait/alice/authorized_keys")?;
//! for key in file.keys() {
//!     println!("{} {}", key.algorithm(), key.comment());
//! }
//! # Ok(())
//! # }
//! ```

use base64::Engine;
use strait_platform::{StraitError, StraitResult};
use std::path::Path;
use subtle::ConstantTimeEq;

/// A single authorized key entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    /// Key options (e.g. "no-port-forwarding", "command=\"...\"")
    options: Vec<String>,
    /// Algorithm name (e.g. "ssh-ed25519", "ssh-rsa")
    algorithm: String,
    /// Decoded key data (SSH wire format)
    key_data: Vec<u8>,
    /// Optional comment
    comment: String,
}

impl AuthorizedKey {
    /// Creates a new entry without options.
    pub fn new(algorithm: String, key_data: Vec<u8>, comment: String) -> Self {
        Self {
            options: Vec::new(),
            algorithm,
            key_data,
            comment,
        }
    }

    /// Returns the key options.
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Returns the algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the key data (SSH wire format).
    pub fn key_data(&self) -> &[u8] {
        &self.key_data
    }

    /// Returns the comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Parses a single authorized_keys line.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] for empty lines, comments, and
    /// malformed entries.
    pub fn parse_line(line: &str) -> StraitResult<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Err(StraitError::Protocol("Empty or comment line".to_string()));
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 {
            return Err(StraitError::Protocol(
                "Invalid authorized_keys line: too few fields".to_string(),
            ));
        }

        // The first field is either an option list or the key type.
        let (options, algorithm_idx) = if Self::is_key_type(parts[0]) {
            (Vec::new(), 0)
        } else {
            let opts: Vec<String> = parts[0].split(',').map(String::from).collect();
            if parts.len() < 3 || !Self::is_key_type(parts[1]) {
                return Err(StraitError::Protocol(
                    "Invalid authorized_keys line: unknown key type".to_string(),
                ));
            }
            (opts, 1)
        };

        let algorithm = parts[algorithm_idx].to_string();
        let key_base64 = parts[algorithm_idx + 1];
        let comment = parts
            .get(algorithm_idx + 2..)
            .map(|rest| rest.join(" "))
            .unwrap_or_default();

        let key_data = base64::engine::general_purpose::STANDARD
            .decode(key_base64)
            .map_err(|e| StraitError::Protocol(format!("Invalid base64 key data: {}", e)))?;

        Ok(Self {
            options,
            algorithm,
            key_data,
            comment,
        })
    }

    fn is_key_type(field: &str) -> bool {
        matches!(
            field,
            "ssh-ed25519"
                | "ssh-rsa"
                | "ssh-dss"
                | "ecdsa-sha2-nistp256"
                | "ecdsa-sha2-nistp384"
                | "ecdsa-sha2-nistp521"
                | "sk-ssh-ed25519@openssh.com"
                | "sk-ecdsa-sha2-nistp256@openssh.com"
        )
    }
}

/// A parsed authorized_keys file.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedKeysFile {
    keys: Vec<AuthorizedKey>,
}

impl AuthorizedKeysFile {
    /// Creates an empty file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads and parses an authorized_keys file from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> StraitResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_string(&content)
    }

    /// Parses authorized_keys content. Unparseable lines are skipped, as
    /// OpenSSH does.
    pub fn from_string(content: &str) -> StraitResult<Self> {
        let keys = content
            .lines()
            .filter_map(|line| AuthorizedKey::parse_line(line).ok())
            .collect();

        Ok(Self { keys })
    }

    /// Returns the parsed keys.
    pub fn keys(&self) -> &[AuthorizedKey] {
        &self.keys
    }

    /// Adds a key entry.
    pub fn add_key(&mut self, key: AuthorizedKey) {
        self.keys.push(key);
    }

    /// Finds an entry whose wire blob equals `key_data`.
    ///
    /// The blob comparison is constant-time.
    pub fn find_key(&self, key_data: &[u8]) -> Option<&AuthorizedKey> {
        self.keys.iter().find(|key| {
            key.key_data.len() == key_data.len()
                && bool::from(key.key_data.as_slice().ct_eq(key_data))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::privatekey::PrivateKey;

    fn ed25519_line(seed: [u8; 32], comment: &str) -> (String, Vec<u8>) {
        let blob = PrivateKey::ed25519_from_seed(seed).public_key().to_wire();
        let encoded = base64::engine::general_purpose::STANDARD.encode(&blob);
        (format!("ssh-ed25519 {} {}", encoded, comment), blob)
    }

    #[test]
    fn test_parse_line_basic() {
        let (line, blob) = ed25519_line([1u8; 32], "alice@example");
        let key = AuthorizedKey::parse_line(&line).unwrap();

        assert_eq!(key.algorithm(), "ssh-ed25519");
        assert_eq!(key.key_data(), &blob[..]);
        assert_eq!(key.comment(), "alice@example");
        assert!(key.options().is_empty());
    }

    #[test]
    fn test_parse_line_with_options() {
        let (line, _) = ed25519_line([1u8; 32], "restricted");
        let line = format!("no-port-forwarding,no-pty {}", line);
        let key = AuthorizedKey::parse_line(&line).unwrap();

        assert_eq!(key.options(), &["no-port-forwarding", "no-pty"]);
        assert_eq!(key.algorithm(), "ssh-ed25519");
    }

    #[test]
    fn test_parse_line_rejects_comment_and_empty() {
        assert!(AuthorizedKey::parse_line("# a comment").is_err());
        assert!(AuthorizedKey::parse_line("   ").is_err());
    }

    #[test]
    fn test_parse_line_rejects_bad_base64() {
        assert!(AuthorizedKey::parse_line("ssh-ed25519 !!!notbase64!!!").is_err());
    }

    #[test]
    fn test_from_string_skips_garbage() {
        let (line, _) = ed25519_line([1u8; 32], "ok");
        let content = format!("# header\n\n{}\nnot a key line\n", line);
        let file = AuthorizedKeysFile::from_string(&content).unwrap();
        assert_eq!(file.keys().len(), 1);
    }

    #[test]
    fn test_find_key() {
        let (line_a, blob_a) = ed25519_line([1u8; 32], "a");
        let (line_b, blob_b) = ed25519_line([2u8; 32], "b");
        let file =
            AuthorizedKeysFile::from_string(&format!("{}\n{}\n", line_a, line_b)).unwrap();

        assert_eq!(file.find_key(&blob_a).unwrap().comment(), "a");
        assert_eq!(file.find_key(&blob_b).unwrap().comment(), "b");
        assert!(file.find_key(&[0u8; 51]).is_none());
    }
}
