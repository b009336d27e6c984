//! Cancellation: a single flag shared by all three acceptor loops, flipped
//! from a SIGINT handler.
//!
//! The flag is owned by the `Router` and handed out as an `Arc`; nothing
//! here needs process-wide mutable state or `unsafe`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Install a SIGINT handler that sets `flag` to `true`. Returns the same
/// flag for convenience so callers can chain it straight into `Router::run`.
pub fn install_ctrlc_handler(flag: Arc<AtomicBool>) -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        log::info!("SIGINT received, signalling shutdown");
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(flag)
}
