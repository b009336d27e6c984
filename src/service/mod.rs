//! # Service Module
//!
//! Resolution of a routing key to a `Service`, and tracking of live
//! reverse-tunnel sessions.
//!
//! ## Module Structure
//!
//! * `registry`: `Service` data model and the layered `ServiceRegistry`
//! * `kv`: the external key/value store interface and its drivers
//! * `session`: multiplexed `Session` wrapper and the `SessionRegistry`

pub mod kv;
pub mod registry;
pub mod session;
