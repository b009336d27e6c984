//! The stream multiplexer integration and Session registry.
//!
//! Multiplexing itself is delegated to the `yamux` crate; this module only
//! adapts it to the router's needs: a `Session` handle that can open new
//! streams, and a registry mapping a client secret to its live session with
//! "last handshake wins" supersession.
//!
//! `yamux::Connection` is built against the `futures` crate's I/O traits
//! rather than tokio's, so every raw socket is wrapped with
//! `tokio_util::compat` at the boundary: tokio socket types go in via
//! `TokioAsyncReadCompatExt::compat()`, and the `futures`-flavored `Stream`
//! that comes back out is wrapped the other way, via
//! `FuturesAsyncReadCompatExt::compat()`, so the rest of the crate — the
//! forwarder in particular — only ever deals in tokio's `AsyncRead`/
//! `AsyncWrite`.
//!
//! The asymmetry that makes this a *reverse* tunnel: on the tunnel-client
//! TCP connection the router plays the multiplexer **server** role (it
//! accepted the connection) but *opens* streams — one per inbound public
//! connection that needs tunneling — while the tunnel client plays the
//! multiplexer **client** role and *accepts* them. Stream-id parity is what
//! "server"/"client" governs here, not which side dialed the TCP socket.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::compat::{Compat, FuturesAsyncReadCompatExt, TokioAsyncReadCompatExt};
use yamux::{Config, Connection, Mode, Stream};

use crate::error::RouterError;

/// A tunneled stream, wrapped so the rest of the crate sees tokio's I/O
/// traits rather than `yamux`'s `futures`-based ones.
pub type TunnelStream = Compat<Stream>;

/// A handle onto one live reverse-tunnel session: enough to open new
/// streams. The connection itself is driven by the task that accepted the
/// tunnel-client TCP connection (see `system::dispatcher::dispatch_tunnel_client`);
/// this handle only needs a cloneable `Control`.
pub struct Session {
    control: yamux::Control,
}

impl Session {
    fn new(control: yamux::Control) -> Self {
        Self { control }
    }

    /// Open a new logical stream on this session.
    pub async fn open_stream(&self) -> Result<TunnelStream, RouterError> {
        let mut control = self.control.clone();
        let stream = control
            .open_stream()
            .await
            .map_err(|e| RouterError::StreamOpenFailed(e.to_string()))?;
        Ok(stream.compat())
    }

    /// Orderly session-level close, used when this session is superseded or
    /// explicitly removed.
    pub async fn close(&self) {
        let mut control = self.control.clone();
        if let Err(e) = control.close().await {
            log::debug!("error closing superseded session: {}", e);
        }
    }
}

/// Promote an accepted tunnel-client TCP connection into a multiplexer
/// server session. Returns a `Session` handle plus the raw `Connection`,
/// which the caller must keep polling (via `next_stream`) for the lifetime
/// of the tunnel — that polling is what actually drives the multiplexer's
/// I/O, including frames generated by `Session::open_stream`.
pub fn promote_to_server<T>(io: T) -> (Session, Connection<Compat<T>>)
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let connection = Connection::new(io.compat(), Config::default(), Mode::Server);
    let session = Session::new(connection.control());
    (session, connection)
}

/// Promote an outbound TCP connection (the tunnel client's dial to the
/// router) into a multiplexer client session. The tunnel client never opens
/// streams itself except for the handshake stream; it otherwise only accepts
/// the ones the router opens, so only the driven `Connection` is of interest
/// on this side.
pub fn promote_to_client<T>(io: T) -> Connection<Compat<T>>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    Connection::new(io.compat(), Config::default(), Mode::Client)
}

/// Secret → live session mapping.
///
/// Reads (one per incoming tunneled flow) dominate; writes happen only on
/// handshake success and session termination, hence the reader/writer lock.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Vec<u8>, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert `session` under `secret`. If one already exists, it is closed
    /// after being evicted — "last handshake wins".
    pub async fn put(&self, secret: Vec<u8>, session: Session) {
        let previous = {
            let mut map = self.sessions.write().expect("session map lock poisoned");
            map.insert(secret, Arc::new(session))
        };
        if let Some(previous) = previous {
            previous.close().await;
        }
    }

    pub fn get(&self, secret: &[u8]) -> Option<Arc<Session>> {
        let map = self.sessions.read().expect("session map lock poisoned");
        map.get(secret).cloned()
    }

    pub async fn remove(&self, secret: &[u8]) {
        let removed = {
            let mut map = self.sessions.write().expect("session map lock poisoned");
            map.remove(secret)
        };
        if let Some(session) = removed {
            session.close().await;
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
