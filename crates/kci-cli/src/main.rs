//! kci-demo: demonstrates key-compromise impersonation against a
//! crypto_box handshake.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use kci_common::profile::DEFAULT_PROFILE_PATH;
use kci_common::Profile;
use kci_core::KEY_SIZE;
use kci_crypto::{parse_public_key, KeyMode, Keypair};
use kci_peer::{Peer, PeerEvent, UdpTransport};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kci-demo")]
#[command(about = "kci-demo demonstrates the KCI attack")]
#[command(version)]
struct Args {
    /// Profile file holding the local keypair
    #[arg(long, global = true, env = "KCI_PROFILE", default_value = DEFAULT_PROFILE_PATH)]
    profile: PathBuf,

    /// Local UDP address to bind (port 0 picks an ephemeral port)
    #[arg(long, global = true, env = "KCI_BIND", default_value = "0.0.0.0:0")]
    bind: SocketAddr,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new profile
    Init,

    /// Listen for handshakes (the default)
    Listen,

    /// Connect to an instance of kci-demo
    Connect {
        /// The host to connect to
        #[arg(long)]
        host: String,

        /// The port to connect to
        #[arg(long)]
        port: u16,

        /// The hex-encoded public key of the host we want to connect to
        #[arg(long)]
        key: String,

        /// Derive shared keys from our own keypair only (KCI mode)
        #[arg(long, default_value_t = false)]
        kci: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    kci_common::init_tracing();

    let Args {
        profile,
        bind,
        command,
    } = Args::parse();

    match command.unwrap_or(Command::Listen) {
        Command::Init => init(&profile),
        Command::Listen => listen(&profile, bind).await,
        Command::Connect {
            host,
            port,
            key,
            kci,
        } => {
            let mode = if kci { KeyMode::Kci } else { KeyMode::Normal };
            connect(&profile, bind, &host, port, &key, mode).await
        }
    }
}

fn init(path: &Path) -> Result<()> {
    if Profile::exists(path) {
        return Err(anyhow!("profile already exists: {}", path.display()));
    }

    let keypair = Keypair::generate().context("unable to create new profile")?;
    Profile::new(keypair.public_hex(), keypair.secret_hex())
        .create(path)
        .context("unable to save new profile")?;

    println!("Profile:    {}", path.display());
    println!("Public key: {}", keypair.public_hex());
    Ok(())
}

async fn listen(path: &Path, bind: SocketAddr) -> Result<()> {
    let peer = start_peer(path, bind, KeyMode::Normal).await?;
    serve(peer, None).await
}

async fn connect(
    path: &Path,
    bind: SocketAddr,
    host: &str,
    port: u16,
    key: &str,
    mode: KeyMode,
) -> Result<()> {
    let peer_public = parse_public_key(key).context("bad public key")?;
    let peer = start_peer(path, bind, mode).await?;

    let resolved = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("unable to resolve {}:{}", host, port))?;
    let target = select_target(resolved, bind).ok_or_else(|| {
        anyhow!(
            "no {} address found for {}:{} (bound to {}, try a different --bind)",
            if bind.is_ipv4() { "IPv4" } else { "IPv6" },
            host,
            port,
            bind
        )
    })?;

    serve(peer, Some((target, peer_public))).await
}

/// First resolved address the socket bound at `bind` can send to.
fn select_target(
    mut resolved: impl Iterator<Item = SocketAddr>,
    bind: SocketAddr,
) -> Option<SocketAddr> {
    resolved.find(|addr| addr.is_ipv4() == bind.is_ipv4())
}

async fn start_peer(path: &Path, bind: SocketAddr, mode: KeyMode) -> Result<Peer<UdpTransport>> {
    let keypair = load_keypair(path)?;
    if mode == KeyMode::Kci {
        warn!("KCI mode enabled: shared keys are derived from the local keypair only");
    }

    let transport = UdpTransport::bind(bind)
        .await
        .with_context(|| format!("unable to bind {}", bind))?;
    Ok(Peer::new(transport, keypair, mode))
}

fn load_keypair(path: &Path) -> Result<Arc<Keypair>> {
    let profile = Profile::load(path).context("unable to load profile")?;
    let keypair =
        Keypair::from_hex(&profile.public_key, &profile.secret_key).context("invalid profile")?;

    if !keypair.matches() {
        warn!("profile public key does not belong to its secret key");
    }
    Ok(Arc::new(keypair))
}

/// Run the receive loop, optionally initiating one handshake, until Ctrl-C.
async fn serve(
    peer: Peer<UdpTransport>,
    initiate: Option<(SocketAddr, [u8; KEY_SIZE])>,
) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let peer = Arc::new(peer.with_events(events_tx));

    println!("listening on {}", peer.local_addr()?);
    println!("public key: {}", hex::encode(peer.public_key()));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runner = peer.clone();
    let mut run_task = tokio::spawn(async move { runner.run_with_shutdown(shutdown_rx).await });

    if let Some((target, peer_public)) = initiate {
        peer.connect(target, &peer_public)
            .await
            .context("unable to send handshake packet")?;
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                let _ = shutdown_tx.send(());
                run_task.await??;
                return Ok(());
            }
            result = &mut run_task => {
                result??;
                return Ok(());
            }
            Some(event) = events_rx.recv() => match event {
                PeerEvent::RequestAnswered { peer } => {
                    println!("answered handshake request from {}", peer)
                }
                PeerEvent::Confirmed { peer } => println!("handshake confirmed with {}", peer),
                PeerEvent::Rejected { peer, reason } => {
                    println!("bad handshake from {}: {:?}", peer, reason)
                }
            },
        }
    }
}
