//! The Forwarder: a bidirectional byte copy with half-close propagation.
//!
//! Two copy loops run concurrently, one per direction. When a loop observes
//! EOF on its source it half-closes the *write* side of its destination —
//! `AsyncWrite::shutdown` on a `TcpStream` performs exactly a `shutdown(Write)`
//! on the socket, and on a multiplexed stream it sends a FIN-flagged frame,
//! so the same call means the right thing for both destination kinds. The
//! forwarder returns once both loops have signalled completion over a
//! buffered channel (capacity 2, so the second-to-finish loop never blocks).

use std::io::ErrorKind;

use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::RouterError;

/// Join `a` and `b`, copying bytes in both directions until both sides are
/// done. Returns the first non-benign error observed, if any.
pub async fn forward<A, B>(a: A, b: B) -> Result<(), RouterError>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut a_read, mut a_write) = split(a);
    let (mut b_read, mut b_write) = split(b);

    let (tx, mut rx) = mpsc::channel::<Result<(), RouterError>>(2);

    let tx_ab = tx.clone();
    let ab = tokio::spawn(async move {
        let result = copy_and_half_close(&mut a_read, &mut b_write).await;
        let _ = tx_ab.send(result).await;
    });

    let tx_ba = tx.clone();
    let ba = tokio::spawn(async move {
        let result = copy_and_half_close(&mut b_read, &mut a_write).await;
        let _ = tx_ba.send(result).await;
    });
    drop(tx);

    let mut first_error = None;
    for _ in 0..2 {
        match rx.recv().await {
            Some(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    log::warn!("forward: additional error after first: {}", e);
                }
            }
            Some(Ok(())) => {}
            None => break,
        }
    }

    // Both loops have signalled; the spawned tasks are effectively done.
    let _ = ab.await;
    let _ = ba.await;

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn copy_and_half_close<R, W>(reader: &mut R, writer: &mut W) -> Result<(), RouterError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let copy_result = tokio::io::copy(reader, writer).await;
    // Always attempt the half-close, even if the copy itself errored, so the
    // peer is not left waiting on a stream that will never progress.
    let _ = writer.shutdown().await;

    match copy_result {
        Ok(_) => Ok(()),
        Err(e) if is_benign_close(&e) => Ok(()),
        Err(e) => Err(RouterError::Io(e)),
    }
}

/// Errors that mean "the peer went away", treated as normal rather than
/// surfaced as the forwarder's reported error.
fn is_benign_close(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt as _};

    #[tokio::test]
    async fn copies_both_directions_and_half_closes() {
        let (client, mut server) = duplex(1024);
        let (mut upstream_client, upstream_server) = duplex(1024);

        let handle = tokio::spawn(forward(client, upstream_server));

        server.write_all(b"request").await.unwrap();
        let mut buf = [0u8; 7];
        upstream_client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"request");

        upstream_client.write_all(b"response").await.unwrap();
        let mut buf = [0u8; 8];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"response");

        // Closing both real endpoints lets the forwarder's copy loops see EOF.
        drop(server);
        drop(upstream_client);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn half_close_on_one_side_lets_the_other_keep_flowing() {
        let (mut client, server) = duplex(1024);
        let (upstream_client, mut upstream_server) = duplex(1024);

        let handle = tokio::spawn(forward(server, upstream_client));

        // Client is done sending; half-close write.
        client.shutdown().await.unwrap();

        // Upstream should observe EOF on its read side shortly.
        let mut buf = [0u8; 1];
        let n = upstream_server.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);

        // Upstream can still send data back before fully closing.
        upstream_server.write_all(b"still here").await.unwrap();
        let mut out = [0u8; 10];
        client.read_exact(&mut out).await.unwrap();
        assert_eq!(&out, b"still here");

        drop(upstream_server);
        drop(client);
        handle.await.unwrap().unwrap();
    }
}
