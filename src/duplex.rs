use crate::cipher::Pass;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Each direction moves at most this many bytes per read
pub const BUFFER_SIZE: usize = 1024;

/// RelayError ends one direction of a relay
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("short write: {written} of {offered} bytes accepted")]
    ShortWrite { offered: usize, written: usize },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Transfer is the outcome of one direction
#[derive(Debug)]
pub struct Transfer {
    /// Bytes accepted by the destination
    pub bytes: u64,
    /// None when the source reached a clean EOF
    pub error: Option<RelayError>,
}

/// RelayReport holds both directions once they have finished
#[derive(Debug)]
pub struct RelayReport {
    pub left_to_right: Transfer,
    pub right_to_left: Transfer,
}

impl RelayReport {
    /// log records how the session ended. `session` prefixes every line.
    pub fn log(&self, session: &str) {
        if let Some(e) = &self.left_to_right.error {
            warn!("[{}] upstream direction failed: {}", session, e);
        }
        if let Some(e) = &self.right_to_left.error {
            warn!("[{}] downstream direction failed: {}", session, e);
        }

        info!(
            "[{}] connection closed: {} bytes from client, {} bytes from server",
            session, self.left_to_right.bytes, self.right_to_left.bytes
        );
    }
}

/// relay pumps bytes between `left` and `right` until both directions finish,
/// applying `ltr` to bytes headed right and `rtl` to bytes headed left.
///
/// A failing direction never cuts the other one short. Both streams are
/// dropped when this returns.
pub async fn relay<L, R>(left: L, right: R, ltr: Pass<'_>, rtl: Pass<'_>) -> RelayReport
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut left_rd, mut left_wr) = tokio::io::split(left);
    let (mut right_rd, mut right_wr) = tokio::io::split(right);

    let (left_to_right, right_to_left) = tokio::join!(
        pump(&mut left_rd, &mut right_wr, ltr),
        pump(&mut right_rd, &mut left_wr, rtl),
    );

    RelayReport {
        left_to_right,
        right_to_left,
    }
}

/// pump copies `src` into `dst` one buffer at a time. A buffer the
/// destination stops accepting part way through ends the direction with
/// `ShortWrite`. `dst` is shut down however the direction ends.
async fn pump<R, W>(src: &mut R, dst: &mut W, pass: Pass<'_>) -> Transfer
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; BUFFER_SIZE];
    let mut bytes = 0u64;

    loop {
        let n = match src.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => return close(dst, bytes, e.into()).await,
        };

        let chunk = &mut buf[..n];
        pass.apply(chunk);

        let mut written = 0;
        while written < n {
            match dst.write(&chunk[written..]).await {
                Ok(0) => {
                    bytes += written as u64;
                    let short = RelayError::ShortWrite { offered: n, written };
                    return close(dst, bytes, short).await;
                }
                Ok(accepted) => written += accepted,
                Err(e) if e.kind() == io::ErrorKind::WriteZero => {
                    bytes += written as u64;
                    let short = RelayError::ShortWrite { offered: n, written };
                    return close(dst, bytes, short).await;
                }
                Err(e) => {
                    bytes += written as u64;
                    return close(dst, bytes, e.into()).await;
                }
            }
        }
        bytes += n as u64;
    }

    // Pass the EOF on so the peer sees the half-close
    let error = dst.shutdown().await.err().map(RelayError::from);
    Transfer { bytes, error }
}

/// close half-closes `dst` after a failed direction. The original error is
/// the one reported.
async fn close<W>(dst: &mut W, bytes: u64, error: RelayError) -> Transfer
where
    W: AsyncWrite + Unpin,
{
    let _ = dst.shutdown().await;
    Transfer {
        bytes,
        error: Some(error),
    }
}
