//! Reverse-tunnel handshake codec.
//!
//! Wire format, big-endian:
//!
//! ```text
//! offset  size  field
//! 0       2     magic = 0x1111
//! 2       2     secretLen (uint16)
//! 4       N     secret bytes
//! ```
//!
//! A handshake is only accepted if `magic` matches and `secretLen > 0`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::RouterError;

pub const MAGIC: u16 = 0x1111;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub secret: Vec<u8>,
}

impl Handshake {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Write this handshake to `w` as `magic || secretLen || secret`.
    pub async fn write<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<(), RouterError> {
        let len = u16::try_from(self.secret.len())
            .map_err(|_| RouterError::HandshakeFailed("secret too long".to_string()))?;
        let mut header = [0u8; 4];
        header[0..2].copy_from_slice(&MAGIC.to_be_bytes());
        header[2..4].copy_from_slice(&len.to_be_bytes());
        w.write_all(&header).await?;
        w.write_all(&self.secret).await?;
        w.flush().await?;
        Ok(())
    }

    /// Read and validate a handshake from `r`.
    ///
    /// Short reads are I/O errors; a mismatched magic or zero-length secret
    /// is `RouterError::HandshakeFailed`.
    pub async fn read<R: AsyncRead + Unpin>(r: &mut R) -> Result<Self, RouterError> {
        let mut header = [0u8; 4];
        r.read_exact(&mut header).await?;
        let magic = u16::from_be_bytes([header[0], header[1]]);
        if magic != MAGIC {
            return Err(RouterError::HandshakeFailed(format!(
                "expected magic {:#06x}, got {:#06x}",
                MAGIC, magic
            )));
        }
        let secret_len = u16::from_be_bytes([header[2], header[3]]) as usize;
        if secret_len == 0 {
            return Err(RouterError::HandshakeFailed(
                "secretLen must be non-zero".to_string(),
            ));
        }
        let mut secret = vec![0u8; secret_len];
        r.read_exact(&mut secret).await?;
        Ok(Self { secret })
    }
}
