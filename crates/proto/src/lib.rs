//! Protocol implementation for the strait SSH reverse proxy.
//!
//! This crate provides the SSH protocol stack (RFC 4251-4253) and the
//! piping core that strait is built around:
//!
//! - **Transport** - version exchange, curve25519-sha256 key exchange,
//!   AEAD packet encryption, session identifiers
//! - **User authentication codec** - the RFC 4252 message structures
//! - **Piper** - the auth-rewriting reverse proxy: terminates a downstream
//!   SSH session, maps the presented public key onto a backend credential,
//!   re-signs the authentication request against the upstream session, and
//!   forwards packets verbatim once authentication succeeds
//!
//! # Security
//!
//! - All cryptographic operations use vetted libraries (`ring`, `dalek`)
//! - Secure memory handling with `zeroize`
//! - No `unsafe` code
//!
//! # References
//!
//! - [RFC 4251](https://datatracker.ietf.org/doc/html/rfc4251) - SSH Protocol Architecture
//! - [RFC 4252](https://datatracker.ietf.org/doc/html/rfc4252) - SSH Authentication Protocol
//! - [RFC 4253](https://datatracker.ietf.org/doc/html/rfc4253) - SSH Transport Layer Protocol
//! - [RFC 4256](https://datatracker.ietf.org/doc/html/rfc4256) - Keyboard-Interactive Authentication

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ssh;
