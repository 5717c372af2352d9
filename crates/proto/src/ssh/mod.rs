//! SSH (Secure Shell) protocol implementation and piping core.
//!
//! # Architecture
//!
//! The stack is layered, leaves first:
//!
//! 1. **Packet layer** ([`packet`]) - binary packet protocol (RFC 4253 Section 6)
//! 2. **Transport layer** ([`transport`], [`handshake`]) - version exchange,
//!    key exchange, AEAD encryption, session identifiers
//! 3. **Authentication codec** ([`auth`]) - user authentication messages
//!    (RFC 4252) and the signed-data blob they bind to a session
//! 4. **Keys** ([`publickey`], [`privatekey`], [`hostkey`],
//!    [`authorized_keys`]) - wire-format public keys, signers, host keys
//! 5. **Piper** ([`piper`]) - the reverse-proxy core that drives a
//!    server-side and a client-side transport in lockstep
//!
//! The piper is the reason this stack exists: both the server role (facing
//! the downstream client) and the client role (facing the upstream backend)
//! share one [`transport::Transport`] type, so the auth state machine can
//! hold both ends and move authentication requests between them.

pub mod auth;
pub mod authorized_keys;
pub mod crypto;
pub mod handshake;
pub mod hostkey;
pub mod kex;
pub mod kex_dh;
pub mod message;
pub mod packet;
pub mod piper;
pub mod privatekey;
pub mod publickey;
pub mod transport;
pub mod version;

pub use auth::{
    construct_signature_data, is_acceptable_algorithm, AuthFailure, AuthPkOk, AuthRequest,
    AuthSuccess, InfoRequest, InfoResponse, Prompt, PublicKeyPayload, ServiceAccept,
    ServiceRequest, SignatureBlob, SERVICE_CONNECTION, SERVICE_USERAUTH,
};
pub use authorized_keys::{AuthorizedKey, AuthorizedKeysFile};
pub use crypto::{CipherAlgorithm, DecryptionKey, EncryptionKey};
pub use handshake::{ClientConfig, HostKeyVerification, ServerConfig};
pub use hostkey::{Ed25519HostKey, HostKey, HostKeyAlgorithm};
pub use kex::{negotiate_algorithm, KexInit, NewKeys};
pub use kex_dh::{derive_key, Curve25519Exchange};
pub use message::MessageType;
pub use packet::Packet;
pub use piper::{Challenger, ConnMeta, KeyboardPrompter, SshPiper, UpstreamResolver};
pub use privatekey::PrivateKey;
pub use publickey::PublicKey;
pub use transport::{PacketReader, PacketWriter, Transport};
pub use version::Version;
