//! # tcprouter
//!
//! A layer-4 reverse proxy with a companion reverse-tunnel protocol. Public
//! TLS and HTTP connections are sniffed for a routing key (SNI or `Host`)
//! and forwarded either directly to a `host:port` backend or through a
//! multiplexed stream on a pre-registered reverse-tunnel session.
//!
//! ## Module Structure
//!
//! * `app`: connection-level building blocks (peekable stream, sniffer,
//!   handshake codec, forwarder)
//! * `service`: service resolution and reverse-tunnel session tracking
//! * `system`: acceptor loops, dispatcher, and the `Router` that owns them
//! * `config`: the static configuration type
//! * `error`: the router-wide error taxonomy

pub mod app;
pub mod config;
pub mod error;
pub mod service;
pub mod system;
