//! SSH key exchange negotiation (RFC 4253 Section 7).
//!
//! Implements the SSH_MSG_KEXINIT and SSH_MSG_NEWKEYS messages and the
//! first-match algorithm negotiation. The actual curve25519 exchange lives
//! in [`crate::ssh::kex_dh`].
//!
//! # Key exchange flow
//!
//! 1. Both sides send SSH_MSG_KEXINIT
//! 2. Algorithm negotiation (first client preference the server supports)
//! 3. Curve25519 ECDH exchange
//! 4. Both sides send SSH_MSG_NEWKEYS
//! 5. Switch to encrypted communication
//!
//! # Example
//!
//! ```rust
//! use strait_proto::ssh::kex::{KexInit, NewKeys};
//!
//! let kexinit = KexInit::new_default();
//! assert!(kexinit.kex_algorithms().contains(&"curve25519-sha256".to_string()));
//!
//! let newkeys = NewKeys::new();
//! assert_eq!(newkeys.to_bytes(), vec![21]);
//! ```

use bytes::{BufMut, BytesMut};
use rand::RngCore;
use strait_platform::{StraitError, StraitResult};

/// SSH_MSG_KEXINIT message (RFC 4253 Section 7.1).
///
/// Each algorithm list is ordered by preference, most preferred first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexInit {
    /// Random cookie (16 bytes)
    cookie: [u8; 16],
    /// Key exchange algorithms
    kex_algorithms: Vec<String>,
    /// Server host key algorithms
    server_host_key_algorithms: Vec<String>,
    /// Encryption algorithms client to server
    encryption_algorithms_client_to_server: Vec<String>,
    /// Encryption algorithms server to client
    encryption_algorithms_server_to_client: Vec<String>,
    /// MAC algorithms client to server
    mac_algorithms_client_to_server: Vec<String>,
    /// MAC algorithms server to client
    mac_algorithms_server_to_client: Vec<String>,
    /// Compression algorithms client to server
    compression_algorithms_client_to_server: Vec<String>,
    /// Compression algorithms server to client
    compression_algorithms_server_to_client: Vec<String>,
    /// Languages client to server (usually empty)
    languages_client_to_server: Vec<String>,
    /// Languages server to client (usually empty)
    languages_server_to_client: Vec<String>,
    /// First KEX packet follows
    first_kex_packet_follows: bool,
}

impl KexInit {
    /// Creates a KEXINIT message with the strait algorithm set.
    ///
    /// - KEX: curve25519-sha256 (and the libssh.org alias)
    /// - Host key: ssh-ed25519
    /// - Encryption: chacha20-poly1305\@openssh.com, aes256-gcm\@openssh.com
    /// - MAC: hmac-sha2-256 (unused with the AEAD ciphers above)
    /// - Compression: none
    pub fn new_default() -> Self {
        let mut cookie = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut cookie);

        Self {
            cookie,
            kex_algorithms: vec![
                "curve25519-sha256".to_string(),
                "curve25519-sha256@libssh.org".to_string(),
            ],
            server_host_key_algorithms: vec!["ssh-ed25519".to_string()],
            encryption_algorithms_client_to_server: vec![
                "chacha20-poly1305@openssh.com".to_string(),
                "aes256-gcm@openssh.com".to_string(),
            ],
            encryption_algorithms_server_to_client: vec![
                "chacha20-poly1305@openssh.com".to_string(),
                "aes256-gcm@openssh.com".to_string(),
            ],
            mac_algorithms_client_to_server: vec!["hmac-sha2-256".to_string()],
            mac_algorithms_server_to_client: vec!["hmac-sha2-256".to_string()],
            compression_algorithms_client_to_server: vec!["none".to_string()],
            compression_algorithms_server_to_client: vec!["none".to_string()],
            languages_client_to_server: vec![],
            languages_server_to_client: vec![],
            first_kex_packet_follows: false,
        }
    }

    /// Returns the cookie.
    pub fn cookie(&self) -> &[u8; 16] {
        &self.cookie
    }

    /// Returns the key exchange algorithms.
    pub fn kex_algorithms(&self) -> &[String] {
        &self.kex_algorithms
    }

    /// Returns the server host key algorithms.
    pub fn server_host_key_algorithms(&self) -> &[String] {
        &self.server_host_key_algorithms
    }

    /// Returns the encryption algorithms (client to server).
    pub fn encryption_algorithms_client_to_server(&self) -> &[String] {
        &self.encryption_algorithms_client_to_server
    }

    /// Returns the encryption algorithms (server to client).
    pub fn encryption_algorithms_server_to_client(&self) -> &[String] {
        &self.encryption_algorithms_server_to_client
    }

    /// Returns whether a guessed first KEX packet follows.
    pub fn first_kex_packet_follows(&self) -> bool {
        self.first_kex_packet_follows
    }

    /// Serializes the KEXINIT message (without packet framing).
    ///
    /// Format (RFC 4253 Section 7.1):
    /// ```text
    /// byte         SSH_MSG_KEXINIT (20)
    /// byte[16]     cookie
    /// name-list    kex_algorithms
    /// name-list    server_host_key_algorithms
    /// name-list    encryption_algorithms (both directions)
    /// name-list    mac_algorithms (both directions)
    /// name-list    compression_algorithms (both directions)
    /// name-list    languages (both directions)
    /// boolean      first_kex_packet_follows
    /// uint32       0 (reserved)
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(20);
        buf.put_slice(&self.cookie);

        write_name_list(&mut buf, &self.kex_algorithms);
        write_name_list(&mut buf, &self.server_host_key_algorithms);
        write_name_list(&mut buf, &self.encryption_algorithms_client_to_server);
        write_name_list(&mut buf, &self.encryption_algorithms_server_to_client);
        write_name_list(&mut buf, &self.mac_algorithms_client_to_server);
        write_name_list(&mut buf, &self.mac_algorithms_server_to_client);
        write_name_list(&mut buf, &self.compression_algorithms_client_to_server);
        write_name_list(&mut buf, &self.compression_algorithms_server_to_client);
        write_name_list(&mut buf, &self.languages_client_to_server);
        write_name_list(&mut buf, &self.languages_server_to_client);

        buf.put_u8(if self.first_kex_packet_follows { 1 } else { 0 });
        buf.put_u32(0);

        buf.to_vec()
    }

    /// Parses a KEXINIT message.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] on wrong message type, truncation,
    /// or malformed name-lists.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() {
            return Err(StraitError::Protocol("KEXINIT message is empty".to_string()));
        }

        if data[0] != 20 {
            return Err(StraitError::Protocol(format!(
                "Invalid message type: expected 20 (SSH_MSG_KEXINIT), got {}",
                data[0]
            )));
        }

        if data.len() < 17 {
            return Err(StraitError::Protocol(format!(
                "KEXINIT message too short: {} bytes (minimum 17)",
                data.len()
            )));
        }

        let mut cookie = [0u8; 16];
        cookie.copy_from_slice(&data[1..17]);

        let mut offset = 17;

        let kex_algorithms = read_name_list(data, &mut offset)?;
        let server_host_key_algorithms = read_name_list(data, &mut offset)?;
        let encryption_algorithms_client_to_server = read_name_list(data, &mut offset)?;
        let encryption_algorithms_server_to_client = read_name_list(data, &mut offset)?;
        let mac_algorithms_client_to_server = read_name_list(data, &mut offset)?;
        let mac_algorithms_server_to_client = read_name_list(data, &mut offset)?;
        let compression_algorithms_client_to_server = read_name_list(data, &mut offset)?;
        let compression_algorithms_server_to_client = read_name_list(data, &mut offset)?;
        let languages_client_to_server = read_name_list(data, &mut offset)?;
        let languages_server_to_client = read_name_list(data, &mut offset)?;

        if offset >= data.len() {
            return Err(StraitError::Protocol(
                "KEXINIT message truncated (missing first_kex_packet_follows)".to_string(),
            ));
        }
        let first_kex_packet_follows = data[offset] != 0;
        offset += 1;

        if offset + 4 > data.len() {
            return Err(StraitError::Protocol(
                "KEXINIT message truncated (missing reserved field)".to_string(),
            ));
        }

        Ok(Self {
            cookie,
            kex_algorithms,
            server_host_key_algorithms,
            encryption_algorithms_client_to_server,
            encryption_algorithms_server_to_client,
            mac_algorithms_client_to_server,
            mac_algorithms_server_to_client,
            compression_algorithms_client_to_server,
            compression_algorithms_server_to_client,
            languages_client_to_server,
            languages_server_to_client,
            first_kex_packet_follows,
        })
    }
}

/// SSH_MSG_NEWKEYS message (RFC 4253 Section 7.3).
///
/// A single byte with value 21. After both sides send and receive it, all
/// subsequent packets are encrypted with the freshly negotiated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NewKeys;

impl NewKeys {
    /// Creates a new SSH_MSG_NEWKEYS message.
    pub const fn new() -> Self {
        Self
    }

    /// Serializes the NEWKEYS message.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![21]
    }

    /// Parses a NEWKEYS message.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() {
            return Err(StraitError::Protocol("NEWKEYS message is empty".to_string()));
        }

        if data[0] != 21 {
            return Err(StraitError::Protocol(format!(
                "Invalid message type: expected 21 (SSH_MSG_NEWKEYS), got {}",
                data[0]
            )));
        }

        Ok(Self)
    }
}

/// Writes a name-list (RFC 4251 Section 5): uint32 length + comma-separated names.
fn write_name_list(buf: &mut BytesMut, names: &[String]) {
    let list = names.join(",");
    let bytes = list.as_bytes();
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

/// Reads a name-list (RFC 4251 Section 5).
fn read_name_list(data: &[u8], offset: &mut usize) -> StraitResult<Vec<String>> {
    if *offset + 4 > data.len() {
        return Err(StraitError::Protocol(format!(
            "Cannot read name-list length at offset {}",
            offset
        )));
    }

    let length = u32::from_be_bytes([
        data[*offset],
        data[*offset + 1],
        data[*offset + 2],
        data[*offset + 3],
    ]) as usize;
    *offset += 4;

    if *offset + length > data.len() {
        return Err(StraitError::Protocol(format!(
            "Name-list data truncated: expected {} bytes at offset {}",
            length, offset
        )));
    }

    let list_bytes = &data[*offset..*offset + length];
    *offset += length;

    let list_str = std::str::from_utf8(list_bytes)
        .map_err(|_| StraitError::Protocol("Name-list contains invalid UTF-8".to_string()))?;

    if list_str.is_empty() {
        Ok(vec![])
    } else {
        Ok(list_str.split(',').map(String::from).collect())
    }
}

/// Negotiates an algorithm: first entry in the client's list that also
/// appears in the server's list (RFC 4253 Section 7.1).
///
/// # Errors
///
/// Returns [`StraitError::Protocol`] if there is no common algorithm.
pub fn negotiate_algorithm(client_list: &[String], server_list: &[String]) -> StraitResult<String> {
    for client_alg in client_list {
        if server_list.contains(client_alg) {
            return Ok(client_alg.clone());
        }
    }

    Err(StraitError::Protocol(format!(
        "No common algorithm: client={:?}, server={:?}",
        client_list, server_list
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kexinit_new_default() {
        let kexinit = KexInit::new_default();
        assert_eq!(kexinit.cookie().len(), 16);
        assert!(kexinit
            .kex_algorithms()
            .contains(&"curve25519-sha256".to_string()));
        assert!(kexinit
            .server_host_key_algorithms()
            .contains(&"ssh-ed25519".to_string()));
        assert!(!kexinit.first_kex_packet_follows());
    }

    #[test]
    fn test_kexinit_round_trip() {
        let original = KexInit::new_default();
        let bytes = original.to_bytes();
        assert_eq!(bytes[0], 20);

        let parsed = KexInit::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_kexinit_parse_invalid_type() {
        let mut data = vec![99];
        data.extend_from_slice(&[0u8; 20]);

        match KexInit::from_bytes(&data) {
            Err(StraitError::Protocol(msg)) => assert!(msg.contains("Invalid message type")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_kexinit_parse_too_short() {
        assert!(KexInit::from_bytes(&[20, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_negotiate_algorithm_success() {
        let client = vec!["aes256-ctr".to_string(), "aes128-ctr".to_string()];
        let server = vec!["aes128-ctr".to_string(), "aes256-ctr".to_string()];

        // First match from the client's perspective wins.
        assert_eq!(negotiate_algorithm(&client, &server).unwrap(), "aes256-ctr");
    }

    #[test]
    fn test_negotiate_algorithm_no_match() {
        let client = vec!["aes256-ctr".to_string()];
        let server = vec!["aes128-ctr".to_string()];

        match negotiate_algorithm(&client, &server) {
            Err(StraitError::Protocol(msg)) => assert!(msg.contains("No common algorithm")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_name_list_round_trip() {
        let names = vec!["first".to_string(), "second".to_string()];
        let mut buf = BytesMut::new();
        write_name_list(&mut buf, &names);

        let mut offset = 0;
        assert_eq!(read_name_list(&buf, &mut offset).unwrap(), names);
    }

    #[test]
    fn test_name_list_empty() {
        let names: Vec<String> = vec![];
        let mut buf = BytesMut::new();
        write_name_list(&mut buf, &names);

        let mut offset = 0;
        assert_eq!(read_name_list(&buf, &mut offset).unwrap(), names);
    }

    #[test]
    fn test_newkeys_round_trip() {
        let bytes = NewKeys::new().to_bytes();
        assert_eq!(bytes, vec![21]);
        assert_eq!(NewKeys::from_bytes(&bytes).unwrap(), NewKeys::new());
    }

    #[test]
    fn test_newkeys_invalid() {
        assert!(NewKeys::from_bytes(&[]).is_err());
        assert!(NewKeys::from_bytes(&[20]).is_err());
    }
}
