//! Acceptor loops.
//!
//! One generic loop services all three listeners (public TLS, public HTTP,
//! tunnel-client ingress): bind, then repeatedly accept with a short
//! deadline so the cancellation flag gets re-checked even with no traffic.
//! Each accepted connection is handed to its handler in a new task so one
//! slow or misbehaving connection never blocks the loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::{TcpListener, TcpStream};

/// Accept-loop deadline: long enough to avoid busy-looping, short enough
/// that shutdown is noticed promptly even with no incoming traffic.
pub const ACCEPT_DEADLINE: Duration = Duration::from_secs(1);

/// TCP keepalive period enabled on every accepted socket ("a few minutes").
const KEEPALIVE_PERIOD: Duration = Duration::from_secs(120);

/// Run an accept loop on an already-bound `listener` until `shutdown` is
/// set, handing every accepted connection to `handle` in its own task.
///
/// Binding happens in the caller (see `system::router::Router::run`) so a
/// bind failure surfaces immediately as a fatal startup error rather than
/// from inside a spawned task.
///
/// `handle` is cloned (cheaply, as it is generic over `Fn`) for each
/// connection; it returns a future so callers can close over async state
/// (registries, config) without an extra trait object.
pub async fn run<H, Fut>(
    name: &str,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    handle: H,
) -> std::io::Result<()>
where
    H: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("{}: listening on {}", name, addr);
    let handle = Arc::new(handle);

    while !shutdown.load(Ordering::Relaxed) {
        match tokio::time::timeout(ACCEPT_DEADLINE, listener.accept()).await {
            Ok(Ok((socket, peer))) => {
                if let Err(e) = configure_keepalive(&socket) {
                    warn!("{}: failed to set keepalive for {}: {}", name, peer, e);
                }
                let handle = Arc::clone(&handle);
                tokio::spawn(async move {
                    handle(socket, peer).await;
                });
            }
            Ok(Err(e)) => {
                if is_transient(&e) {
                    warn!("{}: transient accept error: {}", name, e);
                    continue;
                }
                error!("{}: fatal accept error, stopping loop: {}", name, e);
                break;
            }
            Err(_timeout) => {
                // Accept deadline fired; loop back around to re-check shutdown.
                continue;
            }
        }
    }

    info!("{}: accept loop exiting", name);
    Ok(())
}

fn configure_keepalive(socket: &TcpStream) -> std::io::Result<()> {
    let sock_ref = socket2::SockRef::from(socket);
    sock_ref.set_keepalive(true)?;
    sock_ref.set_tcp_keepalive(
        &socket2::TcpKeepalive::new().with_time(KEEPALIVE_PERIOD),
    )?;
    Ok(())
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
    )
}
