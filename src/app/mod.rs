//! # Application Module
//!
//! Connection-level building blocks shared by every listener: a
//! non-destructive peeking wrapper, the TLS/HTTP sniffer, the reverse-tunnel
//! handshake codec, and the bidirectional forwarder.
//!
//! ## Module Structure
//!
//! * `peekable`: wraps a stream so sniffed bytes can be replayed
//! * `sniff`: TLS SNI / HTTP Host extraction
//! * `handshake`: reverse-tunnel handshake frame codec
//! * `forward`: bidirectional copy with half-close propagation

pub mod forward;
pub mod handshake;
pub mod peekable;
pub mod sniff;
