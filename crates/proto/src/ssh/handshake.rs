//! SSH transport handshakes for both roles of the piper.
//!
//! [`server`] terminates a downstream client: version exchange, KEXINIT,
//! curve25519-sha256 key exchange signed with the piper's host key, NEWKEYS,
//! and finally the `ssh-userauth` service request. [`client`] opens the
//! upstream side: same exchange from the client's seat, verifying the
//! backend's signature over the exchange hash (and optionally pinning its
//! host key fingerprint). Both return a [`Transport`] carrying that
//! connection's session identifier.
//!
//! The two session identifiers that come out of these handshakes are the
//! piper's most safety-critical state: every signature the rewriter checks
//! or produces is bound to one of them, and they must never be swapped.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::net::TcpStream;

use crate::ssh::auth::{ServiceAccept, ServiceRequest, SignatureBlob, SERVICE_USERAUTH};
use crate::ssh::crypto::{CipherAlgorithm, DecryptionKey, EncryptionKey};
use crate::ssh::hostkey::HostKey;
use crate::ssh::kex::{negotiate_algorithm, KexInit, NewKeys};
use crate::ssh::kex_dh::{derive_key, Curve25519Exchange};
use crate::ssh::message::MessageType;
use crate::ssh::packet::Packet;
use crate::ssh::publickey::{fingerprint_sha256, PublicKey};
use crate::ssh::transport::{PacketReader, Transport};
use crate::ssh::version::Version;
use strait_platform::{StraitError, StraitResult};

/// Configuration for the server role (facing the downstream client).
#[derive(Clone)]
pub struct ServerConfig {
    /// The piper's host key, shared across sessions.
    pub host_key: Arc<dyn HostKey>,
    /// Software version advertised in the identification line.
    pub server_version: String,
    /// Bound on pre-auth request loops (coercion rounds, auth attempts).
    pub max_auth_attempts: u32,
}

impl ServerConfig {
    /// Creates a server configuration with default version and limits.
    pub fn new(host_key: Arc<dyn HostKey>) -> Self {
        Self {
            host_key,
            server_version: format!("strait_{}", env!("CARGO_PKG_VERSION")),
            max_auth_attempts: 6,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("server_version", &self.server_version)
            .field("max_auth_attempts", &self.max_auth_attempts)
            .finish_non_exhaustive()
    }
}

/// Backend host key policy for the client role.
///
/// The reference behavior is [`AcceptAny`](HostKeyVerification::AcceptAny):
/// the upstream is chosen by the operator's own credential store, not
/// discovered, so the key is taken on faith. Deployments that want the
/// extra check can pin the backend's SHA-256 fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostKeyVerification {
    /// Accept whatever host key the backend presents.
    #[default]
    AcceptAny,
    /// Require the backend key's OpenSSH-style SHA-256 fingerprint
    /// (`SHA256:...`) to match.
    Fingerprint(String),
}

/// Configuration for the client role (facing the upstream backend).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Software version advertised in the identification line.
    pub client_version: String,
    /// Backend host key policy.
    pub host_key_verification: HostKeyVerification,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_version: format!("strait_{}", env!("CARGO_PKG_VERSION")),
            host_key_verification: HostKeyVerification::AcceptAny,
        }
    }
}

/// Performs the server-side handshake on an accepted connection.
///
/// On success the downstream has been walked through version exchange, key
/// exchange, NEWKEYS, and the `ssh-userauth` service request; the next
/// packet it sends will be its first USERAUTH_REQUEST.
///
/// # Errors
///
/// Any I/O, negotiation, or protocol fault aborts the handshake; dropping
/// the error path closes the socket.
pub async fn server(stream: TcpStream, config: &ServerConfig) -> StraitResult<Transport> {
    let (mut reader, mut writer) = Transport::split_stream(stream);

    // Version exchange.
    let our_version = Version::new(&config.server_version, None);
    writer.write_raw(&our_version.to_wire_format()).await?;

    let peer_line = reader.read_version_line().await?;
    let peer_version = Version::parse(&peer_line)?;

    // KEXINIT exchange.
    let our_kexinit = KexInit::new_default();
    let our_kexinit_payload = our_kexinit.to_bytes();
    writer.write_packet(&our_kexinit_payload).await?;

    let peer_packet = expect_message(&mut reader, MessageType::KexInit).await?;
    let peer_kexinit_payload = peer_packet.into_payload();
    let peer_kexinit = KexInit::from_bytes(&peer_kexinit_payload)?;

    // The client's preference list leads the negotiation.
    let kex_alg = negotiate_algorithm(
        peer_kexinit.kex_algorithms(),
        our_kexinit.kex_algorithms(),
    )?;
    if kex_alg != "curve25519-sha256" && kex_alg != "curve25519-sha256@libssh.org" {
        return Err(StraitError::Protocol(format!(
            "Unsupported KEX algorithm: {}",
            kex_alg
        )));
    }

    let cipher_c2s = negotiate_cipher(
        peer_kexinit.encryption_algorithms_client_to_server(),
        our_kexinit.encryption_algorithms_client_to_server(),
    )?;
    let cipher_s2c = negotiate_cipher(
        peer_kexinit.encryption_algorithms_server_to_client(),
        our_kexinit.encryption_algorithms_server_to_client(),
    )?;

    // Curve25519: the client opens with KEXDH_INIT.
    let init_packet = expect_message(&mut reader, MessageType::KexdhInit).await?;
    let client_public = parse_kexdh_init(init_packet.payload())?;

    let our_exchange = Curve25519Exchange::new()?;
    let our_public = *our_exchange.public_key();
    let shared_secret = our_exchange.compute_shared_secret(&client_public)?;

    let host_key_blob = config.host_key.public_key_bytes();

    let exchange_hash = compute_exchange_hash(
        &format!("{}", peer_version),
        &format!("{}", our_version),
        &peer_kexinit_payload,
        &our_kexinit_payload,
        &host_key_blob,
        &client_public,
        &our_public,
        &shared_secret,
    );

    let signature_blob = config.host_key.sign(&exchange_hash)?;

    // KEXDH_REPLY: host key, our ephemeral public key, signature over H.
    let mut reply = vec![MessageType::KexdhReply as u8];
    reply.extend_from_slice(&(host_key_blob.len() as u32).to_be_bytes());
    reply.extend_from_slice(&host_key_blob);
    reply.extend_from_slice(&(our_public.len() as u32).to_be_bytes());
    reply.extend_from_slice(&our_public);
    reply.extend_from_slice(&(signature_blob.len() as u32).to_be_bytes());
    reply.extend_from_slice(&signature_blob);
    writer.write_packet(&reply).await?;

    // NEWKEYS travels unencrypted in both directions.
    expect_message(&mut reader, MessageType::NewKeys).await?;
    writer.write_packet(&NewKeys::new().to_bytes()).await?;

    // Session id is the exchange hash of the first kex.
    let session_id = exchange_hash.clone();

    // Server decrypts the client-to-server direction and encrypts the
    // server-to-client direction.
    let dec_material = derive_key(
        &shared_secret,
        &exchange_hash,
        &session_id,
        b'C',
        cipher_c2s.key_size(),
    );
    let enc_material = derive_key(
        &shared_secret,
        &exchange_hash,
        &session_id,
        b'D',
        cipher_s2c.key_size(),
    );

    reader.enable_encryption(DecryptionKey::new(cipher_c2s, &dec_material)?);
    writer.enable_encryption(EncryptionKey::new(cipher_s2c, &enc_material)?);

    // The client now asks for the user-auth service.
    let request_packet = expect_message(&mut reader, MessageType::ServiceRequest).await?;
    let request = ServiceRequest::from_bytes(request_packet.payload())?;
    if request.service() != SERVICE_USERAUTH {
        return Err(StraitError::Protocol(format!(
            "Client requested unknown service: '{}'",
            request.service()
        )));
    }
    writer
        .write_packet(&ServiceAccept::new(SERVICE_USERAUTH).to_bytes())
        .await?;

    Ok(Transport::new(reader, writer, session_id))
}

/// Performs the client-side handshake toward a backend.
///
/// Stops after NEWKEYS: the piper requests the user-auth service later,
/// as the first step of the auth pipe.
pub async fn client(stream: TcpStream, config: &ClientConfig) -> StraitResult<Transport> {
    let (mut reader, mut writer) = Transport::split_stream(stream);

    // Version exchange.
    let our_version = Version::new(&config.client_version, None);
    writer.write_raw(&our_version.to_wire_format()).await?;

    let peer_line = reader.read_version_line().await?;
    let peer_version = Version::parse(&peer_line)?;

    // KEXINIT exchange.
    let our_kexinit = KexInit::new_default();
    let our_kexinit_payload = our_kexinit.to_bytes();
    writer.write_packet(&our_kexinit_payload).await?;

    let peer_packet = expect_message(&mut reader, MessageType::KexInit).await?;
    let peer_kexinit_payload = peer_packet.into_payload();
    let peer_kexinit = KexInit::from_bytes(&peer_kexinit_payload)?;

    let kex_alg = negotiate_algorithm(
        our_kexinit.kex_algorithms(),
        peer_kexinit.kex_algorithms(),
    )?;
    if kex_alg != "curve25519-sha256" && kex_alg != "curve25519-sha256@libssh.org" {
        return Err(StraitError::Protocol(format!(
            "Unsupported KEX algorithm: {}",
            kex_alg
        )));
    }

    let cipher_c2s = negotiate_cipher(
        our_kexinit.encryption_algorithms_client_to_server(),
        peer_kexinit.encryption_algorithms_client_to_server(),
    )?;
    let cipher_s2c = negotiate_cipher(
        our_kexinit.encryption_algorithms_server_to_client(),
        peer_kexinit.encryption_algorithms_server_to_client(),
    )?;

    // Curve25519: we open with KEXDH_INIT.
    let our_exchange = Curve25519Exchange::new()?;
    let our_public = *our_exchange.public_key();

    let mut init = vec![MessageType::KexdhInit as u8];
    init.extend_from_slice(&(our_public.len() as u32).to_be_bytes());
    init.extend_from_slice(&our_public);
    writer.write_packet(&init).await?;

    let reply_packet = expect_message(&mut reader, MessageType::KexdhReply).await?;
    let (host_key_blob, server_public, signature_blob) =
        parse_kexdh_reply(reply_packet.payload())?;

    let shared_secret = our_exchange.compute_shared_secret(&server_public)?;

    let exchange_hash = compute_exchange_hash(
        &format!("{}", our_version),
        &format!("{}", peer_version),
        &our_kexinit_payload,
        &peer_kexinit_payload,
        &host_key_blob,
        &our_public,
        &server_public,
        &shared_secret,
    );

    verify_host_key(
        &host_key_blob,
        &exchange_hash,
        &signature_blob,
        &config.host_key_verification,
    )?;

    // NEWKEYS in both directions, unencrypted.
    writer.write_packet(&NewKeys::new().to_bytes()).await?;
    expect_message(&mut reader, MessageType::NewKeys).await?;

    let session_id = exchange_hash.clone();

    // Client encrypts client-to-server and decrypts server-to-client.
    let enc_material = derive_key(
        &shared_secret,
        &exchange_hash,
        &session_id,
        b'C',
        cipher_c2s.key_size(),
    );
    let dec_material = derive_key(
        &shared_secret,
        &exchange_hash,
        &session_id,
        b'D',
        cipher_s2c.key_size(),
    );

    writer.enable_encryption(EncryptionKey::new(cipher_c2s, &enc_material)?);
    reader.enable_encryption(DecryptionKey::new(cipher_s2c, &dec_material)?);

    Ok(Transport::new(reader, writer, session_id))
}

/// Reads one packet and requires it to carry `expected`.
async fn expect_message(
    reader: &mut PacketReader,
    expected: MessageType,
) -> StraitResult<Packet> {
    let packet = reader.read_packet().await?;
    match packet.payload().first() {
        Some(&byte) if byte == expected as u8 => Ok(packet),
        Some(&byte) => Err(StraitError::Protocol(format!(
            "Expected {}, got message {}",
            expected, byte
        ))),
        None => Err(StraitError::Protocol(format!(
            "Expected {}, got empty packet",
            expected
        ))),
    }
}

fn negotiate_cipher(
    client_list: &[String],
    server_list: &[String],
) -> StraitResult<CipherAlgorithm> {
    let name = negotiate_algorithm(client_list, server_list)?;
    CipherAlgorithm::from_name(&name)
        .ok_or_else(|| StraitError::Protocol(format!("Unsupported cipher: {}", name)))
}

/// Parses KEXDH_INIT: the peer's 32-byte ephemeral public key.
fn parse_kexdh_init(payload: &[u8]) -> StraitResult<[u8; 32]> {
    let mut offset = 1;
    let public = crate::ssh::auth::read_bytes(payload, &mut offset)?;
    if public.len() != 32 {
        return Err(StraitError::Protocol(format!(
            "Invalid Curve25519 public key length: expected 32, got {}",
            public.len()
        )));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&public);
    Ok(key)
}

/// Parses KEXDH_REPLY: host key blob, ephemeral public key, signature blob.
fn parse_kexdh_reply(payload: &[u8]) -> StraitResult<(Vec<u8>, [u8; 32], Vec<u8>)> {
    let mut offset = 1;
    let host_key_blob = crate::ssh::auth::read_bytes(payload, &mut offset)?;
    let public = crate::ssh::auth::read_bytes(payload, &mut offset)?;
    let signature_blob = crate::ssh::auth::read_bytes(payload, &mut offset)?;

    if public.len() != 32 {
        return Err(StraitError::Protocol(format!(
            "Invalid Curve25519 public key length: expected 32, got {}",
            public.len()
        )));
    }
    let mut server_public = [0u8; 32];
    server_public.copy_from_slice(&public);

    Ok((host_key_blob, server_public, signature_blob))
}

/// Verifies the backend's signature over the exchange hash and applies the
/// configured host key policy.
fn verify_host_key(
    host_key_blob: &[u8],
    exchange_hash: &[u8],
    signature_blob: &[u8],
    verification: &HostKeyVerification,
) -> StraitResult<()> {
    let host_key = PublicKey::from_wire(host_key_blob)?;
    let signature = SignatureBlob::from_bytes(signature_blob)?;

    if !host_key.verify(&signature.format, exchange_hash, &signature.data)? {
        return Err(StraitError::Security(
            "Host key signature verification failed".to_string(),
        ));
    }

    match verification {
        HostKeyVerification::AcceptAny => Ok(()),
        HostKeyVerification::Fingerprint(expected) => {
            let actual = fingerprint_sha256(host_key_blob);
            if &actual == expected {
                Ok(())
            } else {
                Err(StraitError::Security(format!(
                    "Host key fingerprint mismatch: expected {}, got {}",
                    expected, actual
                )))
            }
        }
    }
}

/// Computes the exchange hash H (RFC 4253 Section 8):
/// `H = HASH(V_C || V_S || I_C || I_S || K_S || Q_C || Q_S || K)`.
#[allow(clippy::too_many_arguments)]
fn compute_exchange_hash(
    client_version: &str,
    server_version: &str,
    client_kexinit: &[u8],
    server_kexinit: &[u8],
    host_key_blob: &[u8],
    client_public: &[u8],
    server_public: &[u8],
    shared_secret: &[u8],
) -> Vec<u8> {
    let mut hasher = Sha256::new();

    let write_string = |h: &mut Sha256, s: &[u8]| {
        h.update((s.len() as u32).to_be_bytes());
        h.update(s);
    };

    // K is hashed in mpint encoding.
    let write_mpint = |h: &mut Sha256, data: &[u8]| {
        if !data.is_empty() && (data[0] & 0x80) != 0 {
            h.update(((data.len() + 1) as u32).to_be_bytes());
            h.update([0x00]);
            h.update(data);
        } else {
            h.update((data.len() as u32).to_be_bytes());
            h.update(data);
        }
    };

    write_string(&mut hasher, client_version.trim_end_matches("\r\n").as_bytes());
    write_string(&mut hasher, server_version.trim_end_matches("\r\n").as_bytes());
    write_string(&mut hasher, client_kexinit);
    write_string(&mut hasher, server_kexinit);
    write_string(&mut hasher, host_key_blob);
    write_string(&mut hasher, client_public);
    write_string(&mut hasher, server_public);
    write_mpint(&mut hasher, shared_secret);

    hasher.finalize().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::hostkey::Ed25519HostKey;
    use tokio::net::TcpListener;

    async fn handshake_pair(
        client_config: ClientConfig,
    ) -> (StraitResult<Transport>, StraitResult<Transport>) {
        let host_key = Arc::new(Ed25519HostKey::generate().unwrap());
        let server_config = ServerConfig::new(host_key);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            server(stream, &server_config).await
        });

        let client_result = async {
            let stream = TcpStream::connect(addr).await?;
            let transport = client(stream, &client_config).await?;
            // Complete the server's handshake: it waits for the service
            // request that the auth pipe normally sends.
            let mut transport = transport;
            transport
                .write_packet(&ServiceRequest::new(SERVICE_USERAUTH).to_bytes())
                .await?;
            let accept = transport.read_packet().await?;
            ServiceAccept::from_bytes(accept.payload())?;
            Ok(transport)
        }
        .await;

        let server_result = server_task.await.unwrap();
        (client_result, server_result)
    }

    #[tokio::test]
    async fn test_handshake_completes_and_session_ids_match() {
        let (client_result, server_result) = handshake_pair(ClientConfig::default()).await;

        let client_transport = client_result.unwrap();
        let server_transport = server_result.unwrap();

        // Both sides derive the same exchange hash.
        assert_eq!(client_transport.session_id(), server_transport.session_id());
        assert_eq!(client_transport.session_id().len(), 32);
    }

    #[tokio::test]
    async fn test_encrypted_traffic_after_handshake() {
        let (client_result, server_result) = handshake_pair(ClientConfig::default()).await;
        let mut client_transport = client_result.unwrap();
        let mut server_transport = server_result.unwrap();

        client_transport.write_packet(b"\x02ping").await.unwrap();
        let packet = server_transport.read_packet().await.unwrap();
        assert_eq!(packet.payload(), b"\x02ping");

        server_transport.write_packet(b"\x02pong").await.unwrap();
        let packet = client_transport.read_packet().await.unwrap();
        assert_eq!(packet.payload(), b"\x02pong");
    }

    #[tokio::test]
    async fn test_fingerprint_pinning_rejects_unknown_backend() {
        let config = ClientConfig {
            host_key_verification: HostKeyVerification::Fingerprint(
                "SHA256:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".to_string(),
            ),
            ..ClientConfig::default()
        };

        let (client_result, _server_result) = handshake_pair(config).await;
        match client_result {
            Err(StraitError::Security(msg)) => assert!(msg.contains("fingerprint")),
            other => panic!("Expected fingerprint mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_session_ids_differ_between_connections() {
        let (a_client, _) = handshake_pair(ClientConfig::default()).await;
        let (b_client, _) = handshake_pair(ClientConfig::default()).await;

        assert_ne!(
            a_client.unwrap().session_id(),
            b_client.unwrap().session_id()
        );
    }
}
