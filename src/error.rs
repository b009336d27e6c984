//! Typed error taxonomy for the router core.
//!
//! Errors are grouped by how they propagate: `Configuration` and
//! `ListenerBind` are fatal at startup; everything else is scoped to a single
//! connection and never crosses a connection-task boundary.

use std::io;

/// Errors raised while loading or validating the static configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("service \"{name}\" is neither direct (addr set) nor tunneled (client_secret set)")]
    AmbiguousService { name: String },

    #[error("unknown kv backend: {0}")]
    UnknownKvBackend(String),
}

/// Errors raised by the key/value store interface.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),

    #[error("kv store transient error: {0}")]
    Transient(String),
}

/// Per-connection and startup error taxonomy.
///
/// `Configuration` and `ListenerBind` variants are fatal and only ever
/// surface from [`crate::system::router::Router::run`] before the accept
/// loops start. Every other variant is recoverable: the connection task that
/// produced it logs and closes, and the server keeps running.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("failed to bind listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("sniff failed: {0}")]
    SniffFailed(String),

    #[error("no routing key could be derived from connection")]
    NoRoutingKey,

    #[error("no Host header present")]
    NoHost,

    #[error("unknown service for host {0:?}")]
    UnknownService(String),

    #[error("invalid service record: {0}")]
    InvalidServiceRecord(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("no active tunnel session for secret")]
    NoSession,

    #[error("failed to dial backend {addr}: {source}")]
    DialFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open multiplexed stream: {0}")]
    StreamOpenFailed(String),

    #[error(transparent)]
    Kv(#[from] KvError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RouterError>;
