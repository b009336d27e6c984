//! # tcprouterd
//!
//! The router binary. Loads the static configuration, wires up the
//! key/value store, and runs the three acceptor loops until SIGINT.
//!
//! ## Lifecycle
//!
//! 1. Parse CLI flags (just the config path).
//! 2. Load and validate the static configuration.
//! 3. Connect the configured key/value store backend.
//! 4. Install the SIGINT handler and run the router.
//! 5. Exit 0 once cancellation has drained; exit non-zero on any fatal
//!    startup error (bad config, a listener that fails to bind).

use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use log::error;

use tcprouter::config::{Config, KvBackendKind};
use tcprouter::service::kv::{KvStore, NullKvStore, RedisKvStore};
use tcprouter::system::router::Router;
use tcprouter::system::signal;

#[derive(Parser)]
#[command(name = "tcprouterd", about = "Layer-4 reverse proxy with reverse-tunnel support")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tcprouter.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let kv: Box<dyn KvStore> = match config.kv.backend {
        KvBackendKind::Redis => match RedisKvStore::connect(&config.kv.address).await {
            Ok(store) => Box::new(store),
            Err(e) => {
                error!("failed to connect to kv backend: {}", e);
                return ExitCode::FAILURE;
            }
        },
        KvBackendKind::None => Box::new(NullKvStore),
    };

    let router = match Router::new(config, kv) {
        Ok(r) => r,
        Err(e) => {
            error!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    if let Err(e) = signal::install_ctrlc_handler(Arc::clone(&shutdown)) {
        error!("failed to install SIGINT handler: {}", e);
        return ExitCode::FAILURE;
    }

    match router.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("router exited with error: {}", e);
            ExitCode::FAILURE
        }
    }
}
