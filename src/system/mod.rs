//! # System Module
//!
//! Connection lifecycle infrastructure: the acceptor loops, the dispatcher
//! glue between them and the service/session layer, the `Router` that owns
//! everything, and the cancellation flag wired to SIGINT.
//!
//! ## Module Structure
//!
//! * `listeners`: generic accept loop shared by all three listeners
//! * `dispatcher`: per-connection routing and forwarding logic
//! * `router`: owns the registries and orchestrates the acceptor loops
//! * `signal`: cancellation flag + SIGINT wiring

pub mod dispatcher;
pub mod listeners;
pub mod router;
pub mod signal;
