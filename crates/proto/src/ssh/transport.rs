//! Encrypted packet transport over a TCP stream.
//!
//! A [`Transport`] is the post-handshake view of one SSH connection: a
//! packet reader, a packet writer, and the immutable session identifier
//! established during key exchange. The piper holds two of these (the
//! downstream in the server role, the upstream in the client role) and
//! moves authentication messages between them.
//!
//! # Framing
//!
//! With an AEAD cipher installed, the 4-byte packet length is sent in
//! cleartext and the remainder of the framed packet (padding length,
//! payload, padding) is sealed, with the 16-byte tag appended:
//!
//! ```text
//! uint32 packet_length || AEAD(padding_length || payload || padding) || tag
//! ```
//!
//! Before NEWKEYS the same framing travels unencrypted.
//!
//! # Splitting
//!
//! [`Transport::into_split`] hands out the two halves so the forwarding
//! phase can run both directions concurrently; each half owns its TCP half
//! and its cipher state, so dropping a half closes that side of the socket.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::ssh::crypto::{DecryptionKey, EncryptionKey};
use crate::ssh::packet::{Packet, MAX_BODY_SIZE};
use strait_platform::{StraitError, StraitResult};

/// Reading half of a transport: owns the TCP read half and the inbound
/// cipher state.
pub struct PacketReader {
    stream: OwnedReadHalf,
    cipher: Option<DecryptionKey>,
}

impl PacketReader {
    /// Wraps a TCP read half with no cipher installed (pre-NEWKEYS).
    pub fn new(stream: OwnedReadHalf) -> Self {
        Self {
            stream,
            cipher: None,
        }
    }

    /// Installs the inbound cipher. Called once, after NEWKEYS.
    pub fn enable_encryption(&mut self, cipher: DecryptionKey) {
        self.cipher = Some(cipher);
    }

    /// Reads one line terminated by `\n`, for the version exchange.
    pub(crate) async fn read_version_line(&mut self) -> StraitResult<String> {
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            self.stream.read_exact(&mut byte).await?;
            buffer.push(byte[0]);

            if byte[0] == b'\n' {
                break;
            }

            if buffer.len() > 255 {
                return Err(StraitError::Protocol("Version string too long".to_string()));
            }
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Reads one SSH packet.
    ///
    /// # Errors
    ///
    /// I/O errors surface as [`StraitError::Io`]; framing violations and
    /// failed tag checks are protocol/security errors. All of them are
    /// fatal to the session.
    pub async fn read_packet(&mut self) -> StraitResult<Packet> {
        let mut length_bytes = [0u8; 4];
        self.stream.read_exact(&mut length_bytes).await?;
        let packet_length = u32::from_be_bytes(length_bytes) as usize;

        // The bound is shared with outbound framing, so anything admitted
        // here can always be reframed when forwarded.
        if packet_length > MAX_BODY_SIZE {
            return Err(StraitError::Protocol(format!(
                "Packet body too large: {} bytes (maximum {})",
                packet_length, MAX_BODY_SIZE
            )));
        }

        let bytes_to_read = match &self.cipher {
            Some(cipher) => packet_length + cipher.algorithm().tag_size(),
            None => packet_length,
        };

        let mut body = vec![0u8; bytes_to_read];
        self.stream.read_exact(&mut body).await?;

        if let Some(cipher) = &mut self.cipher {
            cipher.decrypt(&mut body)?;
        }

        let mut framed = Vec::with_capacity(4 + body.len());
        framed.extend_from_slice(&length_bytes);
        framed.extend_from_slice(&body);

        Packet::from_bytes(&framed)
    }
}

/// Writing half of a transport: owns the TCP write half and the outbound
/// cipher state.
pub struct PacketWriter {
    stream: OwnedWriteHalf,
    cipher: Option<EncryptionKey>,
}

impl PacketWriter {
    /// Wraps a TCP write half with no cipher installed (pre-NEWKEYS).
    pub fn new(stream: OwnedWriteHalf) -> Self {
        Self {
            stream,
            cipher: None,
        }
    }

    /// Installs the outbound cipher. Called once, after NEWKEYS.
    pub fn enable_encryption(&mut self, cipher: EncryptionKey) {
        self.cipher = Some(cipher);
    }

    /// Writes raw bytes, for the version exchange.
    pub(crate) async fn write_raw(&mut self, bytes: &[u8]) -> StraitResult<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Frames and writes one SSH packet carrying `payload`.
    pub async fn write_packet(&mut self, payload: &[u8]) -> StraitResult<()> {
        let framed = Packet::new(payload.to_vec())?.to_bytes();

        let bytes = match &mut self.cipher {
            Some(cipher) => {
                // Length stays cleartext; the rest is sealed.
                let mut body = framed[4..].to_vec();
                cipher.encrypt(&mut body)?;

                let mut sealed = Vec::with_capacity(4 + body.len());
                sealed.extend_from_slice(&framed[..4]);
                sealed.extend_from_slice(&body);
                sealed
            }
            None => framed,
        };

        self.stream.write_all(&bytes).await?;
        Ok(())
    }
}

/// One side of a piped SSH connection, after a completed handshake.
pub struct Transport {
    reader: PacketReader,
    writer: PacketWriter,
    session_id: Vec<u8>,
}

impl Transport {
    /// Assembles a transport from its halves and the session identifier
    /// (the exchange hash of the first key exchange).
    pub fn new(reader: PacketReader, writer: PacketWriter, session_id: Vec<u8>) -> Self {
        Self {
            reader,
            writer,
            session_id,
        }
    }

    /// Splits a fresh TCP stream into unencrypted packet halves.
    pub fn split_stream(stream: TcpStream) -> (PacketReader, PacketWriter) {
        let (read_half, write_half) = stream.into_split();
        (PacketReader::new(read_half), PacketWriter::new(write_half))
    }

    /// Returns the session identifier.
    ///
    /// This value is bound into every public-key authentication signature
    /// on this connection (RFC 4252 Section 7) and never changes, even
    /// across rekeying.
    pub fn session_id(&self) -> &[u8] {
        &self.session_id
    }

    /// Reads one packet.
    pub async fn read_packet(&mut self) -> StraitResult<Packet> {
        self.reader.read_packet().await
    }

    /// Writes one packet carrying `payload`.
    pub async fn write_packet(&mut self, payload: &[u8]) -> StraitResult<()> {
        self.writer.write_packet(payload).await
    }

    /// Consumes the transport, returning its halves for the forwarding
    /// phase.
    pub fn into_split(self) -> (PacketReader, PacketWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("session_id", &hex::encode(&self.session_id))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::crypto::CipherAlgorithm;
    use tokio::net::TcpListener;

    async fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_plaintext_packet_round_trip() {
        let (a, b) = tcp_pair().await;
        let (_rx_a, mut tx_a) = Transport::split_stream(a);
        let (mut rx_b, _tx_b) = Transport::split_stream(b);

        tx_a.write_packet(b"hello over tcp").await.unwrap();
        let packet = rx_b.read_packet().await.unwrap();
        assert_eq!(packet.payload(), b"hello over tcp");
    }

    #[tokio::test]
    async fn test_encrypted_packet_round_trip() {
        let (a, b) = tcp_pair().await;
        let (_rx_a, mut tx_a) = Transport::split_stream(a);
        let (mut rx_b, _tx_b) = Transport::split_stream(b);

        let key_material = [7u8; 32];
        tx_a.enable_encryption(
            EncryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &key_material).unwrap(),
        );
        rx_b.enable_encryption(
            DecryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &key_material).unwrap(),
        );

        for payload in [&b"first"[..], &b"second"[..], &b"third"[..]] {
            tx_a.write_packet(payload).await.unwrap();
            let packet = rx_b.read_packet().await.unwrap();
            assert_eq!(packet.payload(), payload);
        }
    }

    #[tokio::test]
    async fn test_key_mismatch_rejected() {
        let (a, b) = tcp_pair().await;
        let (_rx_a, mut tx_a) = Transport::split_stream(a);
        let (mut rx_b, _tx_b) = Transport::split_stream(b);

        tx_a.enable_encryption(
            EncryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &[1u8; 32]).unwrap(),
        );
        rx_b.enable_encryption(
            DecryptionKey::new(CipherAlgorithm::ChaCha20Poly1305, &[2u8; 32]).unwrap(),
        );

        tx_a.write_packet(b"secret").await.unwrap();
        assert!(rx_b.read_packet().await.is_err());
    }
}
