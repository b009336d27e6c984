//! # tcprouter-client
//!
//! The reverse-tunnel companion client. Dials the router's tunnel-client
//! port, performs the handshake, then accepts whatever multiplexed streams
//! the router opens and forwards each to a local backend.
//!
//! The client opens exactly one stream itself — the handshake stream — and
//! otherwise only accepts; every subsequent stream is opened by the router
//! to deliver one inbound public connection.

use std::time::Duration;

use clap::Parser;
use log::{error, info, warn};
use tcprouter::app::forward::forward;
use tcprouter::app::handshake::Handshake;
use tcprouter::service::session::promote_to_client;
use tokio::net::TcpStream;
use tokio_util::compat::FuturesAsyncReadCompatExt;

#[derive(Parser)]
#[command(name = "tcprouter-client", about = "Reverse-tunnel client for tcprouter")]
struct Args {
    /// Address of the router's tunnel-client port, e.g. "router.example:7000".
    #[arg(long)]
    router: String,

    /// Shared secret registered for this client's service.
    #[arg(long)]
    secret: String,

    /// Local backend this client forwards accepted streams to.
    #[arg(long)]
    local: String,
}

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    loop {
        match run_once(&args).await {
            Ok(()) => info!("tunnel session ended, reconnecting in {:?}", RECONNECT_DELAY),
            Err(e) => warn!("tunnel session error: {}, reconnecting in {:?}", e, RECONNECT_DELAY),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn run_once(args: &Args) -> std::io::Result<()> {
    let socket = TcpStream::connect(&args.router).await?;
    let mut connection = promote_to_client(socket);
    let mut control = connection.control();

    let handshake_stream = control.open_stream().await.map_err(|e| {
        std::io::Error::other(format!("failed to open handshake stream: {}", e))
    })?;
    let mut handshake_stream = handshake_stream.compat();
    Handshake::new(args.secret.clone().into_bytes())
        .write(&mut handshake_stream)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    drop(handshake_stream);

    info!("handshake sent, waiting for forwarded connections");

    loop {
        match connection.next_stream().await {
            Ok(Some(stream)) => {
                let stream = stream.compat();
                let local_addr = args.local.clone();
                tokio::spawn(async move {
                    let local = match TcpStream::connect(&local_addr).await {
                        Ok(s) => s,
                        Err(e) => {
                            error!("failed to dial local backend {}: {}", local_addr, e);
                            return;
                        }
                    };
                    if let Err(e) = forward(stream, local).await {
                        warn!("forward error for local backend {}: {}", local_addr, e);
                    }
                });
            }
            Ok(None) => return Ok(()),
            Err(e) => return Err(std::io::Error::other(e.to_string())),
        }
    }
}
