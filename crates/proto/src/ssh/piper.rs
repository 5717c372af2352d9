//! The piping core: an auth-rewriting SSH reverse proxy.
//!
//! [`SshPiper::serve`] takes one accepted TCP connection and walks it
//! through the whole lifecycle:
//!
//! 1. server-side handshake with the downstream client
//! 2. the first USERAUTH_REQUEST, which names the user and therefore the
//!    route
//! 3. an optional keyboard-interactive challenge, run before any backend
//!    is dialed
//! 4. resolver lookup, backend dial, client-side handshake with the
//!    upstream
//! 5. the auth pipe: every downstream request is rewritten (or suppressed)
//!    and relayed; the upstream's replies go back verbatim
//! 6. once a USERAUTH_SUCCESS has been relayed, a transparent forwarding
//!    loop until either side closes
//!
//! The rewriting rules live in `PipedConnection::process_auth_msg`:
//! non-publickey methods pass through untouched; publickey requests are
//! translated from the client's key to the backend credential the resolver
//! returns, including a fresh signature bound to the *upstream* session
//! identifier. Refusals of any kind collapse into a `none`-method request,
//! so the downstream only ever sees ordinary authentication failures.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::ssh::auth::{
    self, construct_signature_data, is_acceptable_algorithm, AuthFailure, AuthPkOk, AuthRequest,
    InfoRequest, InfoResponse, Prompt, PublicKeyPayload, ServiceAccept, ServiceRequest,
    SignatureBlob, SERVICE_CONNECTION, SERVICE_USERAUTH,
};
use crate::ssh::handshake::{self, ClientConfig, ServerConfig};
use crate::ssh::message::MessageType;
use crate::ssh::privatekey::PrivateKey;
use crate::ssh::publickey::PublicKey;
use crate::ssh::transport::{PacketReader, PacketWriter, Transport};
use strait_platform::{StraitError, StraitResult};

/// Per-connection metadata handed to the injected callbacks.
#[derive(Debug, Clone)]
pub struct ConnMeta {
    /// Username presented by the downstream in its first auth request.
    pub user: String,
    /// Downstream remote address.
    pub remote_addr: SocketAddr,
    /// Session identifier of the downstream SSH session.
    pub session_id: Vec<u8>,
}

/// Chooses the backend and the credentials used toward it.
///
/// One instance serves every session of a piper; implementations must be
/// safe to call concurrently.
#[async_trait]
pub trait UpstreamResolver: Send + Sync {
    /// Returns an open TCP connection to the backend for this user, plus
    /// the client configuration for the upstream handshake.
    ///
    /// Errors here are fatal to the session: the downstream has not been
    /// told anything yet, so the connection simply drops.
    async fn find_upstream(&self, conn: &ConnMeta) -> StraitResult<(TcpStream, ClientConfig)>;

    /// Maps a public key presented by the downstream onto a backend
    /// signer.
    ///
    /// `Ok(None)` means "no mapping"; the piper then sends a `none`-method
    /// request upstream, and the client sees an ordinary failure. Errors
    /// are logged and treated the same way.
    async fn map_public_key(
        &self,
        conn: &ConnMeta,
        key: &PublicKey,
    ) -> StraitResult<Option<PrivateKey>>;
}

/// Optional keyboard-interactive gate, run before the backend is dialed.
#[async_trait]
pub trait Challenger: Send + Sync {
    /// Runs a challenge dialog against the downstream. Returning `false`
    /// or an error terminates the session.
    async fn challenge(
        &self,
        conn: &ConnMeta,
        prompter: &mut KeyboardPrompter<'_>,
    ) -> StraitResult<bool>;
}

/// Prompter handed to a [`Challenger`]: one round of prompts against the
/// downstream via USERAUTH_INFO_REQUEST / INFO_RESPONSE.
pub struct KeyboardPrompter<'a> {
    downstream: &'a mut Transport,
}

impl KeyboardPrompter<'_> {
    /// Sends the prompts and returns the client's answers, in prompt
    /// order.
    pub async fn prompt(
        &mut self,
        name: &str,
        instruction: &str,
        prompts: &[Prompt],
    ) -> StraitResult<Vec<String>> {
        let request = InfoRequest::new(name, instruction, prompts.to_vec());
        self.downstream.write_packet(&request.to_bytes()).await?;

        let reply = self.downstream.read_packet().await?;
        let response = InfoResponse::from_bytes(reply.payload())?;

        if response.responses.len() != prompts.len() {
            return Err(StraitError::Protocol(format!(
                "INFO_RESPONSE answer count {} does not match {} prompts",
                response.responses.len(),
                prompts.len()
            )));
        }

        Ok(response.responses)
    }
}

/// The piper: per-listener configuration plus the injected callbacks.
pub struct SshPiper {
    /// Downstream (server role) configuration.
    pub server_config: ServerConfig,
    /// Backend and credential resolution.
    pub resolver: Arc<dyn UpstreamResolver>,
    /// Optional pre-dial challenge.
    pub challenger: Option<Arc<dyn Challenger>>,
}

impl SshPiper {
    /// Creates a piper without an additional challenge.
    pub fn new(server_config: ServerConfig, resolver: Arc<dyn UpstreamResolver>) -> Self {
        Self {
            server_config,
            resolver,
            challenger: None,
        }
    }

    /// Installs the additional challenge.
    pub fn with_challenger(mut self, challenger: Arc<dyn Challenger>) -> Self {
        self.challenger = Some(challenger);
        self
    }

    /// Serves one accepted downstream connection to completion.
    ///
    /// Returns when the session ends; all error paths drop both sockets.
    pub async fn serve(&self, stream: TcpStream) -> StraitResult<()> {
        let remote_addr = stream.peer_addr()?;

        let mut downstream = handshake::server(stream, &self.server_config).await?;

        // The first auth request names the user and seeds the auth pipe,
        // even when a challenge runs in between.
        let first_request = next_auth_request(&mut downstream).await?;

        let meta = ConnMeta {
            user: first_request.user().to_string(),
            remote_addr,
            session_id: downstream.session_id().to_vec(),
        };

        debug!(user = %meta.user, addr = %meta.remote_addr, "downstream handshake complete");

        if let Some(challenger) = &self.challenger {
            self.run_challenge(challenger.as_ref(), &meta, &mut downstream)
                .await?;
        }

        let (upstream_conn, client_config) = self.resolver.find_upstream(&meta).await?;
        let upstream = handshake::client(upstream_conn, &client_config).await?;

        let mut piped = PipedConnection {
            downstream,
            upstream,
            meta,
            resolver: self.resolver.clone(),
        };

        piped.pipe_auth(first_request).await?;
        piped.forward().await
    }

    /// Coerces the downstream into keyboard-interactive and runs the
    /// configured challenge. The requests discarded during coercion are
    /// never forwarded; there is no upstream yet.
    async fn run_challenge(
        &self,
        challenger: &dyn Challenger,
        meta: &ConnMeta,
        downstream: &mut Transport,
    ) -> StraitResult<()> {
        let mut rounds = 0;
        loop {
            let failure = AuthFailure::new(vec![auth::method::KEYBOARD_INTERACTIVE.to_string()], false);
            downstream.write_packet(&failure.to_bytes()).await?;

            let request = next_auth_request(downstream).await?;
            if request.method() == auth::method::KEYBOARD_INTERACTIVE {
                break;
            }

            rounds += 1;
            if rounds >= self.server_config.max_auth_attempts {
                return Err(StraitError::Security(
                    "client never offered keyboard-interactive".to_string(),
                ));
            }
        }

        let mut prompter = KeyboardPrompter { downstream };
        let passed = challenger.challenge(meta, &mut prompter).await?;

        if !passed {
            return Err(StraitError::Security(
                "additional challenge failed".to_string(),
            ));
        }

        Ok(())
    }
}

/// Both live transports of one bridged session, during the auth phase.
struct PipedConnection {
    downstream: Transport,
    upstream: Transport,
    meta: ConnMeta,
    resolver: Arc<dyn UpstreamResolver>,
}

impl PipedConnection {
    /// Drives authentication to completion.
    ///
    /// Holds one downstream request per iteration; the rewriter either
    /// produces a request to relay (one upstream round-trip, reply relayed
    /// verbatim) or suppresses the round-trip after answering the
    /// downstream locally.
    async fn pipe_auth(&mut self, first_request: AuthRequest) -> StraitResult<()> {
        // The upstream has only finished its transport handshake.
        self.upstream
            .write_packet(&ServiceRequest::new(SERVICE_USERAUTH).to_bytes())
            .await?;
        let accept = self.upstream.read_packet().await?;
        ServiceAccept::from_bytes(accept.payload())?;

        let mut request = first_request;

        loop {
            if let Some(rewritten) = self.process_auth_msg(&request).await? {
                self.upstream.write_packet(&rewritten.to_bytes()).await?;

                let reply = self.upstream.read_packet().await?;
                let success =
                    reply.payload().first() == Some(&(MessageType::UserauthSuccess as u8));

                self.downstream.write_packet(reply.payload()).await?;

                if success {
                    debug!(user = %self.meta.user, "authentication bridged");
                    return Ok(());
                }
            }

            request = next_auth_request(&mut self.downstream).await?;
        }
    }

    /// Rewrites one downstream auth request for the upstream.
    ///
    /// Returns `None` when the request was answered locally (publickey
    /// query) and nothing must be written upstream this iteration.
    async fn process_auth_msg(&mut self, request: &AuthRequest) -> StraitResult<Option<AuthRequest>> {
        if request.method() != auth::method::PUBLICKEY {
            return Ok(Some(request.clone()));
        }

        let payload = PublicKeyPayload::from_bytes(request.payload())?;

        // An algorithm outside the accepted set is an ordinary refusal,
        // never a protocol error; structural faults above stay fatal.
        if !is_acceptable_algorithm(&payload.algorithm) {
            return Ok(Some(AuthRequest::none(request.user())));
        }

        let down_key = PublicKey::from_wire(&payload.key_blob)?;

        let signer = match self.resolver.map_public_key(&self.meta, &down_key).await {
            Ok(Some(signer)) => signer,
            Ok(None) => {
                debug!(user = %self.meta.user, key = %down_key.fingerprint_sha256(), "no key mapping");
                return Ok(Some(AuthRequest::none(request.user())));
            }
            Err(err) => {
                warn!(user = %self.meta.user, error = %err, "key mapping failed, treating as unmapped");
                return Ok(Some(AuthRequest::none(request.user())));
            }
        };

        if payload.is_query() {
            // Answer the query locally: probe the upstream with the
            // backend key, but echo the client's own key back. The
            // backend key must never appear on the downstream wire.
            if self.upstream_accepts_key(request.user(), &signer).await? {
                let pk_ok = AuthPkOk::new(payload.algorithm.clone(), payload.key_blob.clone());
                self.downstream.write_packet(&pk_ok.to_bytes()).await?;
                Ok(None)
            } else {
                Ok(Some(AuthRequest::none(request.user())))
            }
        } else {
            if !self.check_signature(request, &payload, &down_key)? {
                return Ok(Some(AuthRequest::none(request.user())));
            }

            self.sign_again(request, &signer).map(Some)
        }
    }

    /// Verifies the downstream's signature against the *downstream*
    /// session identifier. Every failure mode is an ordinary refusal.
    fn check_signature(
        &self,
        request: &AuthRequest,
        payload: &PublicKeyPayload,
        down_key: &PublicKey,
    ) -> StraitResult<bool> {
        if !is_acceptable_algorithm(&payload.algorithm) {
            return Ok(false);
        }

        let blob = match &payload.signature_blob {
            Some(blob) => blob,
            None => return Ok(false),
        };
        let signature = match SignatureBlob::from_bytes(blob) {
            Ok(sig) => sig,
            Err(_) => return Ok(false),
        };

        if !is_acceptable_algorithm(&signature.format) {
            return Ok(false);
        }

        let signed_data = construct_signature_data(
            self.downstream.session_id(),
            request.user(),
            request.service(),
            &payload.algorithm,
            &payload.key_blob,
        );

        down_key.verify(&signature.format, &signed_data, &signature.data)
    }

    /// Builds the replacement request: the same user, the backend key, and
    /// a fresh signature bound to the *upstream* session identifier.
    fn sign_again(&self, request: &AuthRequest, signer: &PrivateKey) -> StraitResult<AuthRequest> {
        let algorithm = signer.signature_algorithm();
        let up_key_blob = signer.public_key().to_wire();

        let signed_data = construct_signature_data(
            self.upstream.session_id(),
            request.user(),
            SERVICE_CONNECTION,
            algorithm,
            &up_key_blob,
        );

        let raw_signature = signer.sign(&signed_data)?;
        let signature_blob = SignatureBlob::new(algorithm, raw_signature).to_bytes();

        Ok(AuthRequest::publickey_signed(
            request.user(),
            algorithm,
            &up_key_blob,
            &signature_blob,
        ))
    }

    /// Asks the upstream whether the backend key would be accepted for
    /// this user, without signing.
    ///
    /// Borrows the upstream between main-loop iterations; the probe's
    /// reply is consumed here and never forwarded.
    async fn upstream_accepts_key(&mut self, user: &str, signer: &PrivateKey) -> StraitResult<bool> {
        let query = AuthRequest::publickey_query(
            user,
            signer.signature_algorithm(),
            &signer.public_key().to_wire(),
        );
        self.upstream.write_packet(&query.to_bytes()).await?;

        let reply = self.upstream.read_packet().await?;
        match reply.payload().first() {
            Some(&byte) if byte == MessageType::UserauthPkOk as u8 => Ok(true),
            Some(&byte) if byte == MessageType::UserauthFailure as u8 => Ok(false),
            Some(&byte) => Err(StraitError::Protocol(format!(
                "Unexpected reply to publickey query: message {}",
                byte
            ))),
            None => Err(StraitError::Protocol(
                "Empty reply to publickey query".to_string(),
            )),
        }
    }

    /// Transparent forwarding until either side closes.
    ///
    /// Two copiers run concurrently, one per direction; the first to
    /// return wins, the other is aborted, and dropping the four halves
    /// closes both sockets.
    async fn forward(self) -> StraitResult<()> {
        let (down_reader, down_writer) = self.downstream.into_split();
        let (up_reader, up_writer) = self.upstream.into_split();

        let mut down_to_up = tokio::spawn(copy_packets(down_reader, up_writer));
        let mut up_to_down = tokio::spawn(copy_packets(up_reader, down_writer));

        let first = tokio::select! {
            result = &mut down_to_up => {
                up_to_down.abort();
                result
            }
            result = &mut up_to_down => {
                down_to_up.abort();
                result
            }
        };

        match first {
            Ok(result) => result,
            Err(_) => Err(StraitError::Protocol(
                "forwarding task terminated abnormally".to_string(),
            )),
        }
    }
}

/// Copies decrypted packets in one direction until a read or write fails.
async fn copy_packets(mut from: PacketReader, mut to: PacketWriter) -> StraitResult<()> {
    loop {
        let packet = from.read_packet().await?;
        to.write_packet(packet.payload()).await?;
    }
}

/// Reads the next USERAUTH_REQUEST from the downstream.
///
/// Anything that is not an auth request for the connection service is a
/// protocol error and fatal to the session.
async fn next_auth_request(downstream: &mut Transport) -> StraitResult<AuthRequest> {
    let packet = downstream.read_packet().await?;
    let request = AuthRequest::from_bytes(packet.payload())?;

    if request.service() != SERVICE_CONNECTION {
        return Err(StraitError::Protocol(format!(
            "client attempted to negotiate for unknown service: '{}'",
            request.service()
        )));
    }

    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    // The state machine itself is exercised end-to-end over real sockets
    // in tests/piper_integration.rs. The units here cover the pieces that
    // do not need a live transport.

    #[test]
    fn test_conn_meta_is_cloneable() {
        let meta = ConnMeta {
            user: "alice".to_string(),
            remote_addr: "127.0.0.1:2222".parse().unwrap(),
            session_id: vec![1, 2, 3],
        };
        let copy = meta.clone();
        assert_eq!(copy.user, "alice");
        assert_eq!(copy.session_id, meta.session_id);
    }

    #[test]
    fn test_none_substitution_keeps_username() {
        let request = AuthRequest::publickey_query("alice", "ssh-ed25519", &[1, 2, 3]);
        let none = AuthRequest::none(request.user());
        assert_eq!(none.user(), "alice");
        assert_eq!(none.method(), "none");
        assert_eq!(none.service(), SERVICE_CONNECTION);
    }
}
