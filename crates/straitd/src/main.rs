//! straitd - the strait SSH piper daemon.
//!
//! Listens for SSH clients, authenticates them against a per-user
//! credential directory, and pipes each session to the backend recorded
//! for that user. See [`workdir`] for the on-disk layout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strait_proto::ssh::hostkey::Ed25519HostKey;
use strait_proto::ssh::privatekey::PrivateKey;
use strait_proto::ssh::{ServerConfig, SshPiper};

mod workdir;

use workdir::WorkingDirResolver;

/// SSH reverse proxy routing sessions through per-user credential mappings.
#[derive(Debug, Parser)]
#[command(name = "straitd", version, about)]
struct Args {
    /// Listening address.
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    address: String,

    /// Listening port.
    #[arg(short = 'p', long, default_value_t = 2222)]
    port: u16,

    /// Working directory holding one subdirectory per user.
    #[arg(short = 'w', long, default_value = "/var/strait")]
    workdir: PathBuf,

    /// Host key file for the piper's server identity (Ed25519).
    #[arg(short = 'i', long, default_value = "/etc/ssh/ssh_host_ed25519_key")]
    host_key: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let private_key = PrivateKey::from_file(&args.host_key)?;
    let host_key = Arc::new(Ed25519HostKey::from_private_key(&private_key)?);

    let resolver = Arc::new(WorkingDirResolver::new(args.workdir.clone()));
    let piper = Arc::new(SshPiper::new(ServerConfig::new(host_key), resolver));

    let listen_addr = format!("{}:{}", args.address, args.port);
    let listener = TcpListener::bind(&listen_addr).await?;

    info!(
        addr = %listen_addr,
        host_key = %args.host_key.display(),
        workdir = %args.workdir.display(),
        "listening"
    );

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!(error = %err, "failed to accept connection");
                continue;
            }
        };

        info!(peer = %peer, "connection accepted");

        let piper = piper.clone();
        tokio::spawn(async move {
            match piper.serve(stream).await {
                Ok(()) => info!(peer = %peer, "connection closed"),
                Err(err) => info!(peer = %peer, reason = %err, "connection closed"),
            }
        });
    }
}
