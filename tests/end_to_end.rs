//! End-to-end exercises of the full accept → sniff → resolve → forward path,
//! both direct and tunneled.
//!
//! These spin up real listening sockets on the loopback interface rather
//! than going through `Router::run` (which binds three fixed ports from
//! configuration); driving `system::dispatcher` directly against ephemeral
//! ports keeps the tests independent of any port already in use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tcprouter::app::forward::forward;
use tcprouter::app::handshake::Handshake;
use tcprouter::service::kv::NullKvStore;
use tcprouter::service::registry::{Service, ServiceRegistry};
use tcprouter::service::session::SessionRegistry;
use tcprouter::system::dispatcher;
use tcprouter::system::router::RouterState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::compat::FuturesAsyncReadCompatExt;

const ONE_MIB: usize = 1024 * 1024;

/// A minimal backend: accept one connection, echo everything read back to
/// the caller, then close.
async fn spawn_echo_backend() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        loop {
            let n = match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            if socket.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });
    addr
}

/// A backend that reads exactly `request_len` bytes (the fixed-size request
/// the test sends) then streams a large one-way response body back before
/// half-closing, letting the forwarder's half-close propagate that close to
/// the public-side client.
async fn spawn_large_body_backend(request_len: usize, body: Arc<Vec<u8>>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut discard = vec![0u8; request_len];
        socket.read_exact(&mut discard).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.shutdown().await.unwrap();
    });
    addr
}

/// Deterministic filler bytes, varied enough to catch a truncated or
/// reordered copy but reproducible across test runs.
fn pseudo_random_body(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    let mut out = Vec::with_capacity(len + 8);
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.extend_from_slice(&state.to_le_bytes());
    }
    out.truncate(len);
    out
}

#[tokio::test]
async fn end_to_end_direct_forward_roundtrips_bytes() {
    let backend_addr = spawn_echo_backend().await;

    let mut static_map = HashMap::new();
    static_map.insert(
        "example.test".to_string(),
        Service {
            addr: backend_addr.ip().to_string(),
            http_port: backend_addr.port(),
            tls_port: 0,
            client_secret: String::new(),
        },
    );
    let state = Arc::new(RouterState {
        services: ServiceRegistry::new(static_map, Box::new(NullKvStore)),
        sessions: SessionRegistry::new(),
    });

    let public_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let public_addr = public_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, peer) = public_listener.accept().await.unwrap();
        dispatcher::dispatch_http(socket, peer, state).await;
    });

    let mut client = TcpStream::connect(public_addr).await.unwrap();
    let request = b"GET / HTTP/1.1\r\nHost: example.test\r\n\r\n";
    client.write_all(request).await.unwrap();

    let mut response = vec![0u8; request.len()];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut response))
        .await
        .expect("backend echo did not arrive in time")
        .unwrap();

    // The non-destructive sniff replayed `request` to the backend verbatim,
    // so the echoed bytes match it exactly.
    assert_eq!(response, request);
}

#[tokio::test]
async fn end_to_end_direct_forward_roundtrips_a_large_one_way_body() {
    let request = b"GET / HTTP/1.1\r\nHost: big.test\r\n\r\n".to_vec();
    let body = Arc::new(pseudo_random_body(ONE_MIB, 0xC0FFEE));
    let backend_addr = spawn_large_body_backend(request.len(), Arc::clone(&body)).await;

    let mut static_map = HashMap::new();
    static_map.insert(
        "big.test".to_string(),
        Service {
            addr: backend_addr.ip().to_string(),
            http_port: backend_addr.port(),
            tls_port: 0,
            client_secret: String::new(),
        },
    );
    let state = Arc::new(RouterState {
        services: ServiceRegistry::new(static_map, Box::new(NullKvStore)),
        sessions: SessionRegistry::new(),
    });

    let public_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let public_addr = public_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, peer) = public_listener.accept().await.unwrap();
        dispatcher::dispatch_http(socket, peer, state).await;
    });

    let mut client = TcpStream::connect(public_addr).await.unwrap();
    client.write_all(&request).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::with_capacity(body.len());
    tokio::time::timeout(
        Duration::from_secs(10),
        client.read_to_end(&mut response),
    )
    .await
    .expect("large body did not arrive in time")
    .unwrap();

    assert_eq!(response.len(), body.len());
    assert_eq!(&response, body.as_ref());
}

#[tokio::test]
async fn end_to_end_tunneled_forward_roundtrips_bytes() {
    let backend_addr = spawn_echo_backend().await;
    let state = tunneled_state(backend_addr, "tunneled.test", "s3cr3t").await;

    let mut client = TcpStream::connect(state.public_addr).await.unwrap();
    let request = b"GET / HTTP/1.1\r\nHost: tunneled.test\r\n\r\n";
    client.write_all(request).await.unwrap();

    let mut response = vec![0u8; request.len()];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut response))
        .await
        .expect("tunneled echo did not arrive in time")
        .unwrap();

    assert_eq!(response, request);
}

#[tokio::test]
async fn end_to_end_tunneled_forward_roundtrips_a_large_one_way_body() {
    let request = b"GET / HTTP/1.1\r\nHost: big-tunneled.test\r\n\r\n".to_vec();
    let body = Arc::new(pseudo_random_body(ONE_MIB, 0xFACADE));
    let backend_addr = spawn_large_body_backend(request.len(), Arc::clone(&body)).await;
    let state = tunneled_state(backend_addr, "big-tunneled.test", "s3cr3t-big").await;

    let mut client = TcpStream::connect(state.public_addr).await.unwrap();
    client.write_all(&request).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::with_capacity(body.len());
    tokio::time::timeout(
        Duration::from_secs(10),
        client.read_to_end(&mut response),
    )
    .await
    .expect("large tunneled body did not arrive in time")
    .unwrap();

    assert_eq!(response.len(), body.len());
    assert_eq!(&response, body.as_ref());
}

struct TunneledFixture {
    public_addr: std::net::SocketAddr,
}

/// Wires up a registered service backed by a reverse-tunnel session, standing
/// in for `tcprouter-client`: dial the ingress port, open the handshake
/// stream, then accept exactly one forwarded stream and pipe it to `backend_addr`.
async fn tunneled_state(
    backend_addr: std::net::SocketAddr,
    hostname: &str,
    secret: &str,
) -> TunneledFixture {
    let mut static_map = HashMap::new();
    static_map.insert(
        hostname.to_string(),
        Service {
            addr: String::new(),
            http_port: 0,
            tls_port: 0,
            client_secret: secret.to_string(),
        },
    );
    let state = Arc::new(RouterState {
        services: ServiceRegistry::new(static_map, Box::new(NullKvStore)),
        sessions: SessionRegistry::new(),
    });

    let clients_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let clients_addr = clients_listener.local_addr().unwrap();
    let state_clients = Arc::clone(&state);
    tokio::spawn(async move {
        let (socket, peer) = clients_listener.accept().await.unwrap();
        dispatcher::dispatch_tunnel_client(socket, peer, state_clients).await;
    });

    let tunnel_socket = TcpStream::connect(clients_addr).await.unwrap();
    let mut connection = tcprouter::service::session::promote_to_client(tunnel_socket);
    let mut control = connection.control();
    let handshake_stream = control.open_stream().await.unwrap();
    let mut handshake_stream = handshake_stream.compat();
    Handshake::new(secret.as_bytes().to_vec())
        .write(&mut handshake_stream)
        .await
        .unwrap();
    drop(handshake_stream);

    tokio::spawn(async move {
        if let Ok(Some(stream)) = connection.next_stream().await {
            let stream = stream.compat();
            let backend = TcpStream::connect(backend_addr).await.unwrap();
            let _ = forward(stream, backend).await;
        }
    });

    // Give the handshake a moment to register before the public side dials.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let public_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let public_addr = public_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (socket, peer) = public_listener.accept().await.unwrap();
        dispatcher::dispatch_http(socket, peer, state).await;
    });

    TunneledFixture { public_addr }
}
