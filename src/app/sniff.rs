//! The SNI / HTTP Host sniffer.
//!
//! Both entry points read real bytes off the connection — there is no
//! peek-without-consuming at the OS level for an arbitrary number of bytes —
//! and accumulate everything they read into `peeked`. The caller is expected
//! to hand `peeked` to a [`crate::app::peekable::PeekableStream`] so the
//! bytes are replayed to whatever consumes the connection next.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::RouterError;

/// A read deadline applied to the whole sniff.
const SNIFF_TIMEOUT: Duration = Duration::from_secs(5);

pub struct SniffResult {
    /// Lowercased routing key, or empty if none could be derived.
    pub routing_key: String,
    pub is_tls: bool,
    /// Every byte read from the connection during sniffing, in order.
    pub peeked: Vec<u8>,
}

/// TLS path: peek the ClientHello and extract SNI without terminating the
/// handshake for real — we never proceed past the first record.
pub async fn sniff_tls<R: AsyncRead + Unpin>(stream: &mut R) -> Result<SniffResult, RouterError> {
    tokio::time::timeout(SNIFF_TIMEOUT, sniff_tls_inner(stream))
        .await
        .map_err(|_| RouterError::SniffFailed("read deadline exceeded".to_string()))?
}

async fn sniff_tls_inner<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<SniffResult, RouterError> {
    let mut peeked = Vec::with_capacity(512);

    let mut content_type = [0u8; 1];
    stream
        .read_exact(&mut content_type)
        .await
        .map_err(|e| RouterError::SniffFailed(e.to_string()))?;
    peeked.extend_from_slice(&content_type);

    if content_type[0] != 0x16 {
        return Ok(SniffResult {
            routing_key: String::new(),
            is_tls: false,
            peeked,
        });
    }

    let mut rest_of_header = [0u8; 4];
    stream
        .read_exact(&mut rest_of_header)
        .await
        .map_err(|e| RouterError::SniffFailed(e.to_string()))?;
    peeked.extend_from_slice(&rest_of_header);

    let record_len = u16::from_be_bytes([rest_of_header[2], rest_of_header[3]]) as usize;
    let mut body = vec![0u8; record_len];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| RouterError::SniffFailed(e.to_string()))?;
    peeked.extend_from_slice(&body);

    let sni = extract_sni(&body).unwrap_or_default();

    Ok(SniffResult {
        routing_key: sni.to_lowercase(),
        is_tls: true,
        peeked,
    })
}

/// Parse the SNI extension out of a ClientHello body (everything after the
/// 5-byte TLS record header).
///
/// Layout walked: handshake header (4) → client_version (2) → random (32) →
/// session_id (1 + var) → cipher_suites (2 + var) → compression_methods
/// (1 + var) → extensions_length (2) → extensions, each `type(2) len(2)
/// data(len)`; extension type 0 is `server_name`, whose body is
/// `list_length(2) name_type(1) name_length(2) name`.
fn extract_sni(body: &[u8]) -> Option<&str> {
    let mut pos = 0usize;
    let take = |pos: &mut usize, n: usize| -> Option<std::ops::Range<usize>> {
        let start = *pos;
        let end = start.checked_add(n)?;
        if end > body.len() {
            return None;
        }
        *pos = end;
        Some(start..end)
    };

    take(&mut pos, 4)?; // handshake msg_type + 24-bit length
    take(&mut pos, 2)?; // client_version
    take(&mut pos, 32)?; // random

    if pos >= body.len() {
        return None;
    }
    let session_id_len = body[pos] as usize;
    pos += 1;
    take(&mut pos, session_id_len)?;

    let cs_len_range = take(&mut pos, 2)?;
    let cipher_suites_len = u16::from_be_bytes([body[cs_len_range.start], body[cs_len_range.start + 1]]) as usize;
    take(&mut pos, cipher_suites_len)?;

    if pos >= body.len() {
        return None;
    }
    let compression_len = body[pos] as usize;
    pos += 1;
    take(&mut pos, compression_len)?;

    if pos + 2 > body.len() {
        return None;
    }
    let ext_total_len =
        u16::from_be_bytes([body[pos], body[pos + 1]]) as usize;
    pos += 2;
    let extensions_end = (pos + ext_total_len).min(body.len());

    while pos + 4 <= extensions_end {
        let ext_type = u16::from_be_bytes([body[pos], body[pos + 1]]);
        let ext_len = u16::from_be_bytes([body[pos + 2], body[pos + 3]]) as usize;
        let ext_data_start = pos + 4;
        let ext_data_end = ext_data_start + ext_len;
        if ext_data_end > extensions_end {
            return None;
        }

        if ext_type == 0 {
            return parse_server_name_extension(&body[ext_data_start..ext_data_end]);
        }

        pos = ext_data_end;
    }

    None
}

fn parse_server_name_extension(data: &[u8]) -> Option<&str> {
    if data.len() < 2 {
        return None;
    }
    let list_len = u16::from_be_bytes([data[0], data[1]]) as usize;
    let list = data.get(2..2 + list_len)?;

    let mut pos = 0usize;
    while pos + 3 <= list.len() {
        let name_type = list[pos];
        let name_len = u16::from_be_bytes([list[pos + 1], list[pos + 2]]) as usize;
        let name_start = pos + 3;
        let name_end = name_start + name_len;
        if name_end > list.len() {
            return None;
        }
        if name_type == 0 {
            return std::str::from_utf8(&list[name_start..name_end]).ok();
        }
        pos = name_end;
    }
    None
}

/// HTTP path: read CRLF-terminated lines until an empty line, case-sensitive
/// `Host:` extraction per HTTP/1.1.
pub async fn sniff_http<R: AsyncRead + Unpin>(stream: &mut R) -> Result<SniffResult, RouterError> {
    tokio::time::timeout(SNIFF_TIMEOUT, sniff_http_inner(stream))
        .await
        .map_err(|_| RouterError::SniffFailed("read deadline exceeded".to_string()))?
}

async fn sniff_http_inner<R: AsyncRead + Unpin>(
    stream: &mut R,
) -> Result<SniffResult, RouterError> {
    let mut peeked = Vec::with_capacity(512);
    let mut host: Option<String> = None;

    loop {
        let line = read_crlf_line(stream, &mut peeked).await?;
        if let Some(rest) = line.strip_prefix("Host:") {
            let value = rest.trim();
            let value = match value.rsplit_once(':') {
                Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => h,
                _ => value,
            };
            host = Some(value.to_string());
        }
        if line.is_empty() {
            break;
        }
    }

    let routing_key = host.ok_or(RouterError::NoHost)?.to_lowercase();

    Ok(SniffResult {
        routing_key,
        is_tls: false,
        peeked,
    })
}

/// Read one line terminated by `\r\n` (or bare `\n`), returning it with the
/// terminator stripped, while appending every byte read (including the
/// terminator) to `peeked`.
async fn read_crlf_line<R: AsyncRead + Unpin>(
    stream: &mut R,
    peeked: &mut Vec<u8>,
) -> Result<String, RouterError> {
    let mut line = Vec::with_capacity(64);
    let mut byte = [0u8; 1];
    loop {
        stream
            .read_exact(&mut byte)
            .await
            .map_err(|e| RouterError::SniffFailed(e.to_string()))?;
        peeked.push(byte[0]);
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line).map_err(|e| RouterError::SniffFailed(e.to_string()))
}
