//! The `Router`: owns the Service and Session registries and orchestrates
//! the three acceptor loops. Deliberately not a process-wide global — it is
//! constructed once by the binary's `main` and reaches connection tasks only
//! through the `Arc` each acceptor loop closes over.

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::error::RouterError;
use crate::service::kv::KvStore;
use crate::service::registry::ServiceRegistry;
use crate::service::session::SessionRegistry;
use crate::system::{dispatcher, listeners};

/// Shared state handed to every dispatcher task. Deliberately not a
/// process-wide global: it is constructed once by `Router::new` and reaches
/// connection tasks only via the `Arc` each acceptor loop closes over.
pub struct RouterState {
    pub services: ServiceRegistry,
    pub sessions: SessionRegistry,
}

pub struct Router {
    state: Arc<RouterState>,
    config: Config,
}

impl Router {
    pub fn new(config: Config, kv: Box<dyn KvStore>) -> Result<Self, RouterError> {
        let static_map = config.static_services().map_err(RouterError::Configuration)?;
        let state = Arc::new(RouterState {
            services: ServiceRegistry::new(static_map, kv),
            sessions: SessionRegistry::new(),
        });
        Ok(Self { state, config })
    }

    pub fn state(&self) -> Arc<RouterState> {
        Arc::clone(&self.state)
    }

    /// Bind all three listeners and run their accept loops until `shutdown`
    /// is set. Bind failures are fatal and returned immediately; loop
    /// exits (after shutdown) are joined and surfaced as a group.
    pub async fn run(self, shutdown: Arc<AtomicBool>) -> Result<(), RouterError> {
        let host = &self.config.server.listen_addr;
        let tls_addr = parse_addr(host, self.config.server.tls_port)?;
        let http_addr = parse_addr(host, self.config.server.http_port)?;
        let clients_addr = parse_addr(host, self.config.server.clients_port)?;

        let tls_listener = bind(tls_addr).await?;
        let http_listener = bind(http_addr).await?;
        let clients_listener = bind(clients_addr).await?;

        info!(
            "router starting: tls={} http={} clients={}",
            tls_addr, http_addr, clients_addr
        );

        let state_tls = self.state();
        let shutdown_tls = Arc::clone(&shutdown);
        let tls_task = tokio::spawn(async move {
            listeners::run("public-tls", tls_listener, shutdown_tls, move |socket, peer| {
                let state = Arc::clone(&state_tls);
                async move { dispatcher::dispatch_tls(socket, peer, state).await }
            })
            .await
        });

        let state_http = self.state();
        let shutdown_http = Arc::clone(&shutdown);
        let http_task = tokio::spawn(async move {
            listeners::run("public-http", http_listener, shutdown_http, move |socket, peer| {
                let state = Arc::clone(&state_http);
                async move { dispatcher::dispatch_http(socket, peer, state).await }
            })
            .await
        });

        let state_clients = self.state();
        let shutdown_clients = Arc::clone(&shutdown);
        let clients_task = tokio::spawn(async move {
            listeners::run(
                "tunnel-clients",
                clients_listener,
                shutdown_clients,
                move |socket, peer| {
                    let state = Arc::clone(&state_clients);
                    async move { dispatcher::dispatch_tunnel_client(socket, peer, state).await }
                },
            )
            .await
        });

        let (tls_res, http_res, clients_res) = tokio::join!(tls_task, http_task, clients_task);
        tls_res.map_err(|e| RouterError::Io(std::io::Error::other(e)))??;
        http_res.map_err(|e| RouterError::Io(std::io::Error::other(e)))??;
        clients_res.map_err(|e| RouterError::Io(std::io::Error::other(e)))??;

        info!("router: all acceptor loops exited cleanly");
        Ok(())
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr, RouterError> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| RouterError::ListenerBind {
            addr: format!("{}:{}", host, port),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}", e)),
        })
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, RouterError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RouterError::ListenerBind {
            addr: addr.to_string(),
            source,
        })
}
