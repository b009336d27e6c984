//! The Dispatcher: accept → sniff → resolve → forward, plus the
//! tunnel-client handshake-accept path.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::net::TcpStream;
use tokio_util::compat::FuturesAsyncReadCompatExt;

use crate::app::forward::forward;
use crate::app::handshake::Handshake;
use crate::app::peekable::PeekableStream;
use crate::app::sniff::{self, SniffResult};
use crate::error::RouterError;
use crate::service::registry::Service;
use crate::service::session;
use crate::system::router::RouterState;

/// Handle one accepted connection on the public TLS port.
pub async fn dispatch_tls(stream: TcpStream, peer: SocketAddr, router: Arc<RouterState>) {
    dispatch_public(stream, peer, router, true).await;
}

/// Handle one accepted connection on the public HTTP port.
pub async fn dispatch_http(stream: TcpStream, peer: SocketAddr, router: Arc<RouterState>) {
    dispatch_public(stream, peer, router, false).await;
}

async fn dispatch_public(stream: TcpStream, peer: SocketAddr, router: Arc<RouterState>, is_tls: bool) {
    if let Err(e) = try_dispatch_public(stream, peer, &router, is_tls).await {
        warn!("{}: {}", peer, e);
    }
}

async fn try_dispatch_public(
    mut stream: TcpStream,
    peer: SocketAddr,
    router: &RouterState,
    is_tls: bool,
) -> Result<(), RouterError> {
    let sniffed: SniffResult = if is_tls {
        sniff::sniff_tls(&mut stream).await?
    } else {
        sniff::sniff_http(&mut stream).await?
    };

    if sniffed.routing_key.is_empty() {
        return Err(RouterError::NoRoutingKey);
    }

    let service = router.services.resolve(&sniffed.routing_key).await?;
    let incoming = PeekableStream::new(stream, sniffed.peeked);

    if service.is_tunneled() {
        forward_tunneled(incoming, &service, router).await
    } else {
        forward_direct(incoming, &service, sniffed.is_tls).await
    }
}

async fn forward_direct(
    incoming: PeekableStream<TcpStream>,
    service: &Service,
    is_tls: bool,
) -> Result<(), RouterError> {
    let addr = format!("{}:{}", service.addr, service.port_for(is_tls));
    let outgoing = TcpStream::connect(&addr)
        .await
        .map_err(|source| RouterError::DialFailed { addr, source })?;
    forward(incoming, outgoing).await
}

async fn forward_tunneled(
    incoming: PeekableStream<TcpStream>,
    service: &Service,
    router: &RouterState,
) -> Result<(), RouterError> {
    let session = router
        .sessions
        .get(service.client_secret.as_bytes())
        .ok_or(RouterError::NoSession)?;
    let stream = session.open_stream().await?;
    forward(incoming, stream).await
}

/// Handle one accepted connection on the tunnel-client ingress port.
///
/// Promotes the connection to a multiplexer server session, accepts exactly
/// one stream (the handshake stream), validates the handshake, and on
/// success registers the session. The rest of this task's lifetime is spent
/// driving the multiplexer connection; when it ends, the session is removed.
pub async fn dispatch_tunnel_client(stream: TcpStream, peer: SocketAddr, router: Arc<RouterState>) {
    let (session_handle, mut connection) = session::promote_to_server(stream);

    let handshake_stream = match connection.next_stream().await {
        Ok(Some(s)) => s,
        Ok(None) => {
            warn!("{}: tunnel client closed before handshake stream", peer);
            return;
        }
        Err(e) => {
            warn!("{}: failed to accept handshake stream: {}", peer, e);
            return;
        }
    };
    let mut handshake_stream = handshake_stream.compat();

    let handshake = match Handshake::read(&mut handshake_stream).await {
        Ok(h) => h,
        Err(e) => {
            warn!("{}: handshake failed: {}", peer, e);
            return;
        }
    };
    drop(handshake_stream);

    let secret = handshake.secret;
    info!("{}: tunnel client handshake succeeded, registering session", peer);
    router.sessions.put(secret.clone(), session_handle).await;

    loop {
        match connection.next_stream().await {
            Ok(Some(_unexpected)) => {
                debug!("{}: ignoring unexpected stream opened by tunnel client", peer);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("{}: tunnel session ended with error: {}", peer, e);
                break;
            }
        }
    }

    router.sessions.remove(&secret).await;
    info!("{}: tunnel session ended", peer);
}
