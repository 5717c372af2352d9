//! SSH user-authentication protocol messages (RFC 4252, RFC 4256).
//!
//! The piper never authenticates anybody itself; it moves authentication
//! requests between two live sessions and rewrites the publickey ones.
//! The codec here is therefore built around that job:
//!
//! - [`AuthRequest`] keeps the method-specific payload opaque, so a parsed
//!   request re-serializes byte-for-byte no matter which method it carries.
//! - [`PublicKeyPayload`] is the typed view of a publickey payload, parsed
//!   only when the rewriter needs to look inside.
//! - [`construct_signature_data`] builds the session-bound blob that
//!   publickey signatures cover. The caller chooses which session
//!   identifier to pass in; that choice is the central correctness
//!   property of the piper.

use bytes::{BufMut, BytesMut};
use strait_platform::{StraitError, StraitResult};

/// The user-authentication service name.
pub const SERVICE_USERAUTH: &str = "ssh-userauth";

/// The connection service name, the only service a client may request
/// authentication for.
pub const SERVICE_CONNECTION: &str = "ssh-connection";

/// Method name constants.
pub mod method {
    /// The "none" method.
    pub const NONE: &str = "none";
    /// The "password" method.
    pub const PASSWORD: &str = "password";
    /// The "publickey" method.
    pub const PUBLICKEY: &str = "publickey";
    /// The "keyboard-interactive" method.
    pub const KEYBOARD_INTERACTIVE: &str = "keyboard-interactive";
}

/// Public-key algorithms acceptable in authentication requests and
/// signature blobs. Anything else is treated as a verification failure,
/// never as a protocol error.
pub const ACCEPTED_PUBLICKEY_ALGORITHMS: &[&str] = &[
    "ssh-ed25519",
    "rsa-sha2-256",
    "rsa-sha2-512",
    "ssh-rsa",
    "ecdsa-sha2-nistp256",
];

/// Returns whether `name` is in the accepted public-key algorithm set.
pub fn is_acceptable_algorithm(name: &str) -> bool {
    ACCEPTED_PUBLICKEY_ALGORITHMS.contains(&name)
}

/// SSH_MSG_USERAUTH_REQUEST (RFC 4252 Section 5).
///
/// ```text
/// byte      SSH_MSG_USERAUTH_REQUEST (50)
/// string    user name
/// string    service name
/// string    method name
/// ....      method specific fields (kept opaque)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    user: String,
    service: String,
    method: String,
    payload: Vec<u8>,
}

impl AuthRequest {
    /// Creates a request with an explicit method name and raw payload.
    pub fn new(user: &str, service: &str, method: &str, payload: Vec<u8>) -> Self {
        Self {
            user: user.to_string(),
            service: service.to_string(),
            method: method.to_string(),
            payload,
        }
    }

    /// Creates a "none"-method request for `user`.
    ///
    /// The rewriter substitutes this whenever a publickey request cannot be
    /// mapped onto a backend credential; the upstream answers it with its
    /// usual failure list and the downstream learns nothing about why.
    pub fn none(user: &str) -> Self {
        Self::new(user, SERVICE_CONNECTION, method::NONE, Vec::new())
    }

    /// Creates a publickey query (has-signature = false) for `key_blob`.
    pub fn publickey_query(user: &str, algorithm: &str, key_blob: &[u8]) -> Self {
        let payload = PublicKeyPayload {
            has_signature: false,
            algorithm: algorithm.to_string(),
            key_blob: key_blob.to_vec(),
            signature_blob: None,
        };
        Self::new(user, SERVICE_CONNECTION, method::PUBLICKEY, payload.to_bytes())
    }

    /// Creates a signed publickey request.
    pub fn publickey_signed(
        user: &str,
        algorithm: &str,
        key_blob: &[u8],
        signature_blob: &[u8],
    ) -> Self {
        let payload = PublicKeyPayload {
            has_signature: true,
            algorithm: algorithm.to_string(),
            key_blob: key_blob.to_vec(),
            signature_blob: Some(signature_blob.to_vec()),
        };
        Self::new(user, SERVICE_CONNECTION, method::PUBLICKEY, payload.to_bytes())
    }

    /// Returns the user name.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Returns the service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Returns the method name.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the raw method-specific payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the request. Parsing and re-serializing is byte-equal
    /// for every method, since the payload is carried verbatim.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(50);
        write_string(&mut buf, &self.user);
        write_string(&mut buf, &self.service);
        write_string(&mut buf, &self.method);
        buf.put_slice(&self.payload);

        buf.to_vec()
    }

    /// Parses a request.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] on a wrong message type or a
    /// truncated header. The method payload is not validated here.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() {
            return Err(StraitError::Protocol(
                "USERAUTH_REQUEST message is empty".to_string(),
            ));
        }

        if data[0] != 50 {
            return Err(StraitError::Protocol(format!(
                "Invalid message type: expected 50 (SSH_MSG_USERAUTH_REQUEST), got {}",
                data[0]
            )));
        }

        let mut offset = 1;
        let user = read_string(data, &mut offset)?;
        let service = read_string(data, &mut offset)?;
        let method = read_string(data, &mut offset)?;
        let payload = data[offset..].to_vec();

        Ok(Self {
            user,
            service,
            method,
            payload,
        })
    }
}

/// Typed view of a publickey method payload (RFC 4252 Section 7).
///
/// ```text
/// boolean   has-signature
/// string    public key algorithm name
/// string    public key blob
/// [string   signature blob, when has-signature is TRUE]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPayload {
    /// Whether a signature follows (false = query).
    pub has_signature: bool,
    /// Advertised algorithm name.
    pub algorithm: String,
    /// Public key in SSH wire format.
    pub key_blob: Vec<u8>,
    /// Signature blob, present when `has_signature`.
    pub signature_blob: Option<Vec<u8>>,
}

impl PublicKeyPayload {
    /// Returns whether this is a "would this key be accepted?" query.
    pub fn is_query(&self) -> bool {
        !self.has_signature
    }

    /// Serializes the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(if self.has_signature { 1 } else { 0 });
        write_string(&mut buf, &self.algorithm);
        write_bytes(&mut buf, &self.key_blob);
        if let Some(sig) = &self.signature_blob {
            write_bytes(&mut buf, sig);
        }

        buf.to_vec()
    }

    /// Parses a publickey payload.
    ///
    /// # Errors
    ///
    /// Returns [`StraitError::Protocol`] on an empty payload, truncation,
    /// a missing signature despite the flag, or trailing bytes after the
    /// signature. These are structural faults and fatal to the session;
    /// algorithm acceptability is checked separately by the rewriter.
    pub fn from_bytes(payload: &[u8]) -> StraitResult<Self> {
        if payload.is_empty() {
            return Err(StraitError::Protocol(
                "publickey payload is empty".to_string(),
            ));
        }

        let has_signature = payload[0] != 0;
        let mut offset = 1;

        let algorithm = read_string(payload, &mut offset)?;
        let key_blob = read_bytes(payload, &mut offset)?;

        let signature_blob = if has_signature {
            let sig = read_bytes(payload, &mut offset)?;
            if offset != payload.len() {
                return Err(StraitError::Protocol(
                    "trailing bytes after publickey signature".to_string(),
                ));
            }
            Some(sig)
        } else {
            if offset != payload.len() {
                return Err(StraitError::Protocol(
                    "trailing bytes after publickey query".to_string(),
                ));
            }
            None
        };

        Ok(Self {
            has_signature,
            algorithm,
            key_blob,
            signature_blob,
        })
    }
}

/// An SSH signature blob: the format name and the raw signature, each
/// SSH-encoded.
///
/// ```text
/// string    signature format name (e.g. "ssh-ed25519")
/// string    signature bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlob {
    /// Signature format name.
    pub format: String,
    /// Raw signature bytes.
    pub data: Vec<u8>,
}

impl SignatureBlob {
    /// Creates a signature blob.
    pub fn new(format: &str, data: Vec<u8>) -> Self {
        Self {
            format: format.to_string(),
            data,
        }
    }

    /// Serializes the blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        write_string(&mut buf, &self.format);
        write_bytes(&mut buf, &self.data);
        buf.to_vec()
    }

    /// Parses a signature blob.
    pub fn from_bytes(blob: &[u8]) -> StraitResult<Self> {
        let mut offset = 0;
        let format = read_string(blob, &mut offset)?;
        let data = read_bytes(blob, &mut offset)?;
        if offset != blob.len() {
            return Err(StraitError::Protocol(
                "trailing bytes in signature blob".to_string(),
            ));
        }
        Ok(Self { format, data })
    }
}

/// SSH_MSG_USERAUTH_FAILURE (RFC 4252 Section 5.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthFailure {
    methods_can_continue: Vec<String>,
    partial_success: bool,
}

impl AuthFailure {
    /// Creates a failure message listing the methods that can continue.
    pub fn new(methods: Vec<String>, partial_success: bool) -> Self {
        Self {
            methods_can_continue: methods,
            partial_success,
        }
    }

    /// Returns the methods that can continue.
    pub fn methods_can_continue(&self) -> &[String] {
        &self.methods_can_continue
    }

    /// Returns the partial-success flag.
    pub fn partial_success(&self) -> bool {
        self.partial_success
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(51);
        write_string(&mut buf, &self.methods_can_continue.join(","));
        buf.put_u8(if self.partial_success { 1 } else { 0 });

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 51 {
            return Err(StraitError::Protocol(
                "Invalid USERAUTH_FAILURE message".to_string(),
            ));
        }

        let mut offset = 1;
        let methods_str = read_string(data, &mut offset)?;
        let methods_can_continue: Vec<String> = if methods_str.is_empty() {
            vec![]
        } else {
            methods_str.split(',').map(String::from).collect()
        };

        if offset >= data.len() {
            return Err(StraitError::Protocol(
                "USERAUTH_FAILURE truncated (missing partial success flag)".to_string(),
            ));
        }
        let partial_success = data[offset] != 0;

        Ok(Self {
            methods_can_continue,
            partial_success,
        })
    }
}

/// SSH_MSG_USERAUTH_SUCCESS (RFC 4252 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuthSuccess;

impl AuthSuccess {
    /// Creates a success message.
    pub fn new() -> Self {
        Self
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        vec![52]
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 52 {
            return Err(StraitError::Protocol(
                "Invalid USERAUTH_SUCCESS message".to_string(),
            ));
        }
        Ok(Self)
    }
}

/// SSH_MSG_USERAUTH_PK_OK (RFC 4252 Section 7): the affirmative reply to a
/// publickey query.
///
/// The piper answers downstream queries itself and always echoes the key
/// the client asked about; the backend key never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPkOk {
    algorithm: String,
    key_blob: Vec<u8>,
}

impl AuthPkOk {
    /// Creates a PK_OK for the given algorithm and key blob.
    pub fn new(algorithm: impl Into<String>, key_blob: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.into(),
            key_blob,
        }
    }

    /// Returns the algorithm name.
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// Returns the public key blob.
    pub fn key_blob(&self) -> &[u8] {
        &self.key_blob
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(60);
        write_string(&mut buf, &self.algorithm);
        write_bytes(&mut buf, &self.key_blob);

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 60 {
            return Err(StraitError::Protocol(
                "Invalid USERAUTH_PK_OK message".to_string(),
            ));
        }

        let mut offset = 1;
        let algorithm = read_string(data, &mut offset)?;
        let key_blob = read_bytes(data, &mut offset)?;

        Ok(Self {
            algorithm,
            key_blob,
        })
    }
}

/// SSH_MSG_SERVICE_REQUEST (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRequest {
    service: String,
}

impl ServiceRequest {
    /// Creates a service request.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Returns the service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(5);
        write_string(&mut buf, &self.service);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 5 {
            return Err(StraitError::Protocol(
                "Invalid SERVICE_REQUEST message".to_string(),
            ));
        }
        let mut offset = 1;
        let service = read_string(data, &mut offset)?;
        Ok(Self { service })
    }
}

/// SSH_MSG_SERVICE_ACCEPT (RFC 4253 Section 10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccept {
    service: String,
}

impl ServiceAccept {
    /// Creates a service accept.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Returns the service name.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(6);
        write_string(&mut buf, &self.service);
        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 6 {
            return Err(StraitError::Protocol(
                "Invalid SERVICE_ACCEPT message".to_string(),
            ));
        }
        let mut offset = 1;
        let service = read_string(data, &mut offset)?;
        Ok(Self { service })
    }
}

/// One prompt of a keyboard-interactive round (RFC 4256).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Prompt text shown to the user.
    pub text: String,
    /// Whether the response may be echoed.
    pub echo: bool,
}

/// SSH_MSG_USERAUTH_INFO_REQUEST (RFC 4256 Section 3.2).
///
/// Shares message number 60 with PK_OK; the method in progress
/// disambiguates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRequest {
    /// Request name (may be empty).
    pub name: String,
    /// Instruction text (may be empty).
    pub instruction: String,
    /// Prompts, in order.
    pub prompts: Vec<Prompt>,
}

impl InfoRequest {
    /// Creates an info request.
    pub fn new(name: &str, instruction: &str, prompts: Vec<Prompt>) -> Self {
        Self {
            name: name.to_string(),
            instruction: instruction.to_string(),
            prompts,
        }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(60);
        write_string(&mut buf, &self.name);
        write_string(&mut buf, &self.instruction);
        write_string(&mut buf, ""); // language tag
        buf.put_u32(self.prompts.len() as u32);
        for prompt in &self.prompts {
            write_string(&mut buf, &prompt.text);
            buf.put_u8(if prompt.echo { 1 } else { 0 });
        }

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 60 {
            return Err(StraitError::Protocol(
                "Invalid USERAUTH_INFO_REQUEST message".to_string(),
            ));
        }

        let mut offset = 1;
        let name = read_string(data, &mut offset)?;
        let instruction = read_string(data, &mut offset)?;
        let _language = read_string(data, &mut offset)?;

        if offset + 4 > data.len() {
            return Err(StraitError::Protocol(
                "INFO_REQUEST truncated (missing prompt count)".to_string(),
            ));
        }
        let num_prompts = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;

        let mut prompts = Vec::with_capacity(num_prompts);
        for _ in 0..num_prompts {
            let text = read_string(data, &mut offset)?;
            if offset >= data.len() {
                return Err(StraitError::Protocol(
                    "INFO_REQUEST truncated (missing echo flag)".to_string(),
                ));
            }
            let echo = data[offset] != 0;
            offset += 1;
            prompts.push(Prompt { text, echo });
        }

        Ok(Self {
            name,
            instruction,
            prompts,
        })
    }
}

/// SSH_MSG_USERAUTH_INFO_RESPONSE (RFC 4256 Section 3.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoResponse {
    /// Responses, one per prompt, in prompt order.
    pub responses: Vec<String>,
}

impl InfoResponse {
    /// Creates an info response.
    pub fn new(responses: Vec<String>) -> Self {
        Self { responses }
    }

    /// Serializes to bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::new();

        buf.put_u8(61);
        buf.put_u32(self.responses.len() as u32);
        for response in &self.responses {
            write_string(&mut buf, response);
        }

        buf.to_vec()
    }

    /// Parses from bytes.
    pub fn from_bytes(data: &[u8]) -> StraitResult<Self> {
        if data.is_empty() || data[0] != 61 {
            return Err(StraitError::Protocol(
                "Invalid USERAUTH_INFO_RESPONSE message".to_string(),
            ));
        }

        let mut offset = 1;
        if offset + 4 > data.len() {
            return Err(StraitError::Protocol(
                "INFO_RESPONSE truncated (missing response count)".to_string(),
            ));
        }
        let num_responses = u32::from_be_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]) as usize;
        offset += 4;

        let mut responses = Vec::with_capacity(num_responses);
        for _ in 0..num_responses {
            responses.push(read_string(data, &mut offset)?);
        }

        Ok(Self { responses })
    }
}

/// Constructs the session-bound data covered by a publickey signature
/// (RFC 4252 Section 7).
///
/// ```text
/// string    session identifier
/// byte      SSH_MSG_USERAUTH_REQUEST (50)
/// string    user name
/// string    service name
/// string    "publickey"
/// boolean   TRUE
/// string    public key algorithm name
/// string    public key blob
/// ```
///
/// The piper calls this twice per signed attempt with different session
/// identifiers: the downstream's to verify what the client sent, the
/// upstream's to produce the replacement signature.
pub fn construct_signature_data(
    session_id: &[u8],
    user: &str,
    service: &str,
    algorithm: &str,
    key_blob: &[u8],
) -> Vec<u8> {
    let mut buf = BytesMut::new();

    write_bytes(&mut buf, session_id);
    buf.put_u8(50);
    write_string(&mut buf, user);
    write_string(&mut buf, service);
    write_string(&mut buf, method::PUBLICKEY);
    buf.put_u8(1);
    write_string(&mut buf, algorithm);
    write_bytes(&mut buf, key_blob);

    buf.to_vec()
}

// String encoding helpers (RFC 4251 Section 5).

pub(crate) fn write_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn write_bytes(buf: &mut BytesMut, bytes: &[u8]) {
    buf.put_u32(bytes.len() as u32);
    buf.put_slice(bytes);
}

pub(crate) fn read_string(data: &[u8], offset: &mut usize) -> StraitResult<String> {
    let bytes = read_bytes(data, offset)?;
    String::from_utf8(bytes)
        .map_err(|_| StraitError::Protocol("String contains invalid UTF-8".to_string()))
}

pub(crate) fn read_bytes(data: &[u8], offset: &mut usize) -> StraitResult<Vec<u8>> {
    if *offset + 4 > data.len() {
        return Err(StraitError::Protocol(format!(
            "Cannot read length at offset {}",
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
            "Data truncated: expected {} bytes at offset {}",
            length, offset
        )));
    }

    let bytes = data[*offset..*offset + length].to_vec();
    *offset += length;

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_request_none_round_trip() {
        let request = AuthRequest::none("alice");
        assert_eq!(request.method(), "none");
        assert_eq!(request.service(), SERVICE_CONNECTION);

        let bytes = request.to_bytes();
        let parsed = AuthRequest::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, request);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_auth_request_byte_equal_for_all_methods() {
        // Byte-for-byte reserialization must hold for every method the
        // piper relays, including payloads it never parses.
        let mut password_payload = BytesMut::new();
        password_payload.put_u8(0);
        write_string(&mut password_payload, "hunter2");

        let mut ki_payload = BytesMut::new();
        write_string(&mut ki_payload, ""); // language
        write_string(&mut ki_payload, "totp"); // submethods

        let cases = vec![
            AuthRequest::none("alice"),
            AuthRequest::new(
                "bob",
                SERVICE_CONNECTION,
                method::PASSWORD,
                password_payload.to_vec(),
            ),
            AuthRequest::new(
                "carol",
                SERVICE_CONNECTION,
                method::KEYBOARD_INTERACTIVE,
                ki_payload.to_vec(),
            ),
            AuthRequest::publickey_query("dave", "ssh-ed25519", &[1, 2, 3, 4]),
            AuthRequest::publickey_signed("eve", "ssh-ed25519", &[1, 2, 3], &[9, 9, 9]),
        ];

        for request in cases {
            let bytes = request.to_bytes();
            let parsed = AuthRequest::from_bytes(&bytes).unwrap();
            assert_eq!(parsed.to_bytes(), bytes);
        }
    }

    #[test]
    fn test_auth_request_invalid_type() {
        assert!(AuthRequest::from_bytes(&[51, 0, 0, 0, 0]).is_err());
        assert!(AuthRequest::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_publickey_payload_query() {
        let request = AuthRequest::publickey_query("alice", "ssh-ed25519", &[5, 6, 7]);
        let payload = PublicKeyPayload::from_bytes(request.payload()).unwrap();

        assert!(payload.is_query());
        assert_eq!(payload.algorithm, "ssh-ed25519");
        assert_eq!(payload.key_blob, vec![5, 6, 7]);
        assert!(payload.signature_blob.is_none());
    }

    #[test]
    fn test_publickey_payload_signed() {
        let sig = SignatureBlob::new("ssh-ed25519", vec![0xAA; 64]).to_bytes();
        let request = AuthRequest::publickey_signed("alice", "ssh-ed25519", &[5, 6, 7], &sig);
        let payload = PublicKeyPayload::from_bytes(request.payload()).unwrap();

        assert!(!payload.is_query());
        let parsed_sig = SignatureBlob::from_bytes(payload.signature_blob.as_ref().unwrap()).unwrap();
        assert_eq!(parsed_sig.format, "ssh-ed25519");
        assert_eq!(parsed_sig.data, vec![0xAA; 64]);
    }

    #[test]
    fn test_publickey_payload_empty_is_error() {
        match PublicKeyPayload::from_bytes(&[]) {
            Err(StraitError::Protocol(msg)) => assert!(msg.contains("empty")),
            other => panic!("Expected Protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_publickey_payload_trailing_bytes_rejected() {
        let mut bytes = PublicKeyPayload {
            has_signature: false,
            algorithm: "ssh-ed25519".to_string(),
            key_blob: vec![1, 2, 3],
            signature_blob: None,
        }
        .to_bytes();
        bytes.push(0xFF);

        assert!(PublicKeyPayload::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_signature_blob_round_trip() {
        let blob = SignatureBlob::new("rsa-sha2-256", vec![1, 2, 3, 4]);
        let parsed = SignatureBlob::from_bytes(&blob.to_bytes()).unwrap();
        assert_eq!(parsed, blob);
    }

    #[test]
    fn test_auth_failure_round_trip() {
        let failure = AuthFailure::new(
            vec!["publickey".to_string(), "password".to_string()],
            false,
        );
        let parsed = AuthFailure::from_bytes(&failure.to_bytes()).unwrap();
        assert_eq!(parsed, failure);
    }

    #[test]
    fn test_auth_success_round_trip() {
        let bytes = AuthSuccess::new().to_bytes();
        assert_eq!(bytes, vec![52]);
        assert!(AuthSuccess::from_bytes(&bytes).is_ok());
    }

    #[test]
    fn test_auth_pk_ok_round_trip() {
        let pk_ok = AuthPkOk::new("ssh-ed25519", vec![1, 2, 3, 4]);
        let bytes = pk_ok.to_bytes();
        assert_eq!(bytes[0], 60);

        let parsed = AuthPkOk::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.algorithm(), "ssh-ed25519");
        assert_eq!(parsed.key_blob(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_service_request_accept_round_trip() {
        let request = ServiceRequest::new(SERVICE_USERAUTH);
        let parsed = ServiceRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed.service(), SERVICE_USERAUTH);

        let accept = ServiceAccept::new(SERVICE_USERAUTH);
        let parsed = ServiceAccept::from_bytes(&accept.to_bytes()).unwrap();
        assert_eq!(parsed.service(), SERVICE_USERAUTH);
    }

    #[test]
    fn test_info_request_round_trip() {
        let request = InfoRequest::new(
            "One-time password",
            "Check your token",
            vec![
                Prompt {
                    text: "Code: ".to_string(),
                    echo: false,
                },
                Prompt {
                    text: "Confirm: ".to_string(),
                    echo: true,
                },
            ],
        );

        let parsed = InfoRequest::from_bytes(&request.to_bytes()).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_info_response_round_trip() {
        let response = InfoResponse::new(vec!["123456".to_string()]);
        let parsed = InfoResponse::from_bytes(&response.to_bytes()).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_acceptable_algorithms() {
        assert!(is_acceptable_algorithm("ssh-ed25519"));
        assert!(is_acceptable_algorithm("rsa-sha2-256"));
        assert!(!is_acceptable_algorithm("ssh-dss"));
        assert!(!is_acceptable_algorithm("made-up-algo"));
    }

    #[test]
    fn test_construct_signature_data_layout() {
        let session_id = vec![1, 2, 3, 4];
        let data = construct_signature_data(&session_id, "alice", SERVICE_CONNECTION, "ssh-ed25519", &[5, 6, 7, 8]);

        // session identifier first
        let sid_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        assert_eq!(sid_len, session_id.len());
        assert_eq!(&data[4..4 + sid_len], &session_id[..]);

        // then the message type byte
        assert_eq!(data[4 + sid_len], 50);
    }

    #[test]
    fn test_signature_data_differs_by_session() {
        let a = construct_signature_data(&[1; 32], "alice", SERVICE_CONNECTION, "ssh-ed25519", &[9]);
        let b = construct_signature_data(&[2; 32], "alice", SERVICE_CONNECTION, "ssh-ed25519", &[9]);
        assert_ne!(a, b);
    }
}
