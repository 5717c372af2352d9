//! SSH binary packet protocol (RFC 4253 Section 6).
//!
//! # Packet format
//!
//! ```text
//! uint32    packet_length
//! byte      padding_length
//! byte[n1]  payload (n1 = packet_length - padding_length - 1)
//! byte[n2]  random padding (n2 = padding_length)
//! ```
//!
//! # Constraints
//!
//! - `packet_length` excludes the length field itself
//! - padding is 4-255 bytes; the framed packet is padded to a multiple of
//!   the 8-byte block size
//! - a wire packet larger than 35000 bytes in total (length field, body,
//!   and AEAD tag included) is rejected (RFC 4253 Section 6.1)
//!
//! The piper reframes every packet it forwards: the payload crosses from
//! one transport to the other byte-for-byte, while length and padding are
//! regenerated for the outgoing side. Reading and framing therefore share
//! one bound, [`MAX_BODY_SIZE`]: a `packet_length` admitted on the inbound
//! side is always small enough that its payload reframes under the same
//! ceiling on the outbound side.

use bytes::{Buf, BufMut, BytesMut};
use rand::RngCore;
use strait_platform::{StraitError, StraitResult};

/// Bytes of the `packet_length` field on the wire.
const PACKET_LENGTH_LEN: usize = 4;

/// Bytes of the authentication tag appended by the AEAD ciphers in
/// [`crate::ssh::crypto`].
const AEAD_TAG_LEN: usize = 16;

/// Maximum size of a complete wire packet in bytes (RFC 4253 Section 6.1).
///
/// This covers everything that travels for one packet: the length field,
/// the encrypted body (padding length, payload, padding), and the AEAD
/// tag.
pub const MAX_PACKET_SIZE: usize = 35000;

/// Maximum admissible value of the `packet_length` field.
///
/// [`MAX_PACKET_SIZE`] minus the length field and the AEAD tag. Both
/// [`Packet::new`] and [`Packet::from_bytes`] enforce this bound, which is
/// what keeps the forwarding loop total: block alignment can grow a
/// reframed body, but never past this value for any payload the inbound
/// side accepts.
pub const MAX_BODY_SIZE: usize = MAX_PACKET_SIZE - PACKET_LENGTH_LEN - AEAD_TAG_LEN;

/// Minimum framed packet size in bytes (5-byte header + 4 bytes padding +
/// payload, aligned to the 8-byte block size).
pub const MIN_PACKET_SIZE: usize = 16;

/// Minimum padding length in bytes (RFC 4253 Section 6).
pub const MIN_PADDING_LEN: u8 = 4;

/// Maximum padding length in bytes.
pub const MAX_PADDING_LEN: u8 = 255;

/// An SSH binary packet.
///
/// Holds the payload and the random padding; the MAC (when a non-AEAD
/// cipher would carry one) is left to the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
    padding: Vec<u8>,
}

impl Packet {
    /// Creates a packet with the given payload, padded to SSH requirements.
    ///
    /// Padding is at least 4 bytes of cryptographically random data and
    /// brings the framed packet to a multiple of the 8-byte block size.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] if the padded body would exceed
    /// [`MAX_BODY_SIZE`]. Payloads read off a transport never hit this;
    /// the inbound bound already excludes them.
    pub fn new(payload: Vec<u8>) -> StraitResult<Self> {
        // packet = packet_length (4) + padding_length (1) + payload + padding
        let header_len = 5;
        let unpadded_len = header_len + payload.len();
        let block_size = 8;

        let mut padding_len = MIN_PADDING_LEN as usize;
        while (unpadded_len + padding_len) % block_size != 0 {
            padding_len += 1;
        }

        let body_len = 1 + payload.len() + padding_len;
        if body_len > MAX_BODY_SIZE {
            return Err(StraitError::Protocol(format!(
                "Payload too large to frame: {} bytes (padded body {}, maximum {})",
                payload.len(),
                body_len,
                MAX_BODY_SIZE
            )));
        }

        let mut padding = vec![0u8; padding_len];
        rand::thread_rng().fill_bytes(&mut padding);

        Ok(Self { payload, padding })
    }

    /// Returns the payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consumes the packet, returning the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Returns the padding.
    pub fn padding(&self) -> &[u8] {
        &self.padding
    }

    /// Serializes this packet to wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let packet_length = 1 + self.payload.len() + self.padding.len();
        let mut buf = BytesMut::with_capacity(4 + packet_length);

        buf.put_u32(packet_length as u32);
        buf.put_u8(self.padding.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.padding);

        buf.to_vec()
    }

    /// Parses a packet from wire format.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] if the data is shorter than the
    /// header, the declared length is outside the allowed range, the
    /// padding length is invalid, or the data does not match the declared
    /// length.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.len() < 5 {
            return Err(StraitError::Protocol(format!(
                "Packet too short: {} bytes (minimum 5)",
                data.len()
            )));
        }

        let mut buf = data;
        let packet_length = buf.get_u32() as usize;

        if packet_length > MAX_BODY_SIZE {
            return Err(StraitError::Protocol(format!(
                "Packet body too large: {} bytes (maximum {})",
                packet_length, MAX_BODY_SIZE
            )));
        }

        if packet_length < 5 {
            return Err(StraitError::Protocol(format!(
                "Packet too small: {} bytes (minimum 5)",
                packet_length
            )));
        }

        if buf.len() < packet_length {
            return Err(StraitError::Protocol(format!(
                "Incomplete packet: expected {} bytes, got {} bytes",
                packet_length,
                buf.len()
            )));
        }

        let padding_length = buf.get_u8() as usize;

        if padding_length < MIN_PADDING_LEN as usize {
            return Err(StraitError::Protocol(format!(
                "Padding too short: {} bytes (minimum {})",
                padding_length, MIN_PADDING_LEN
            )));
        }

        if packet_length < 1 + padding_length {
            return Err(StraitError::Protocol(format!(
                "Invalid packet: packet_length ({}) too small for padding ({})",
                packet_length, padding_length
            )));
        }

        let payload_length = packet_length - 1 - padding_length;

        if buf.len() < payload_length + padding_length {
            return Err(StraitError::Protocol(format!(
                "Incomplete packet body: expected {} bytes, got {}",
                payload_length + padding_length,
                buf.len()
            )));
        }

        let payload = buf[..payload_length].to_vec();
        buf.advance(payload_length);
        let padding = buf[..padding_length].to_vec();

        Ok(Self { payload, padding })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The largest payload the inbound bound admits: a body of
    /// MAX_BODY_SIZE with minimum padding.
    const MAX_INBOUND_PAYLOAD: usize = MAX_BODY_SIZE - 1 - MIN_PADDING_LEN as usize;

    #[test]
    fn test_packet_new() {
        let payload = b"Hello, SSH!".to_vec();
        let packet = Packet::new(payload.clone()).unwrap();

        assert_eq!(packet.payload(), &payload[..]);
        assert!(packet.padding().len() >= MIN_PADDING_LEN as usize);
        assert!(packet.padding().len() <= MAX_PADDING_LEN as usize);
    }

    #[test]
    fn test_packet_alignment() {
        let packet = Packet::new(b"test".to_vec()).unwrap();

        let total_size = 4 + 1 + packet.payload().len() + packet.padding().len();
        assert_eq!(total_size % 8, 0, "Packet not aligned to 8-byte boundary");
    }

    #[test]
    fn test_packet_round_trip() {
        let payload = b"Test SSH packet payload".to_vec();
        let packet = Packet::new(payload.clone()).unwrap();

        let bytes = packet.to_bytes();
        let parsed = Packet::from_bytes(&bytes).unwrap();

        assert_eq!(parsed.payload(), &payload[..]);
        assert_eq!(parsed.padding(), packet.padding());
    }

    #[test]
    fn test_packet_minimum_size() {
        let packet = Packet::new(b"x".to_vec()).unwrap();
        assert!(packet.to_bytes().len() >= MIN_PACKET_SIZE);
    }

    #[test]
    fn test_packet_invalid_too_short() {
        let data = vec![0, 0, 0, 10];
        assert!(matches!(
            Packet::from_bytes(&data),
            Err(StraitError::Protocol(_))
        ));
    }

    #[test]
    fn test_packet_invalid_padding_too_short() {
        let data = vec![
            0, 0, 0, 8, // packet_length = 8
            2, // padding_length = 2 (< 4)
            0x48, 0x65, 0x6c, 0x6c, 0x6f, // payload "Hello"
            0x00, 0x00, // padding
        ];
        match Packet::from_bytes(&data) {
            Err(StraitError::Protocol(msg)) => assert!(msg.contains("Padding too short")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_packet_invalid_incomplete() {
        let data = vec![0, 0, 0, 20, 4, 0x48, 0x65];
        assert!(Packet::from_bytes(&data).is_err());
    }

    #[test]
    fn test_packet_oversized_length_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&((MAX_BODY_SIZE as u32) + 1).to_be_bytes());
        data.push(4);
        match Packet::from_bytes(&data) {
            Err(StraitError::Protocol(msg)) => assert!(msg.contains("Packet body too large")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_payload_is_error_not_panic() {
        let payload = vec![0u8; MAX_INBOUND_PAYLOAD + 1];
        match Packet::new(payload) {
            Err(StraitError::Protocol(msg)) => assert!(msg.contains("Payload too large")),
            other => panic!("Expected Protocol error, got {:?}", other.map(|_| ())),
        }
    }

    /// Every payload the inbound bound admits must reframe under the same
    /// bound, so a forwarded packet can never fail at the writing side.
    #[test]
    fn test_any_admitted_payload_reframes() {
        for payload_len in (MAX_INBOUND_PAYLOAD - 16)..=MAX_INBOUND_PAYLOAD {
            let packet = Packet::new(vec![0u8; payload_len]).unwrap();
            let body_len = 1 + packet.payload().len() + packet.padding().len();
            assert!(
                body_len <= MAX_BODY_SIZE,
                "payload of {} bytes framed to body of {}",
                payload_len,
                body_len
            );

            // And the framed packet parses back under the inbound bound.
            let parsed = Packet::from_bytes(&packet.to_bytes()).unwrap();
            assert_eq!(parsed.payload().len(), payload_len);
        }
    }

    #[test]
    fn test_wire_packet_fits_rfc_limit() {
        let packet = Packet::new(vec![0u8; MAX_INBOUND_PAYLOAD]).unwrap();
        // Framed bytes plus the AEAD tag stay within the RFC ceiling.
        assert!(packet.to_bytes().len() + 16 <= MAX_PACKET_SIZE);
    }
}
