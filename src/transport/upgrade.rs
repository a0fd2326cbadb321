//! Request screening ahead of the WebSocket handshake.
//!
//! The handshake library drops requests it cannot upgrade without writing a
//! response. To answer those with `404 Not Found`, the server peeks at the
//! request head first and only hands the stream over when it is a WebSocket
//! upgrade for the served path. Peeking leaves the bytes in the socket, so
//! the handshake still reads the full request.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest request head the server will look at.
pub(crate) const MAX_HEAD_LEN: usize = 8192;

/// Time a client gets to send its complete request head.
pub(crate) const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause between peeks while the head is still incomplete.
const PEEK_INTERVAL: Duration = Duration::from_millis(10);

/// Response written to anything that is not an upgrade on the served path.
pub(crate) const NOT_FOUND_RESPONSE: &[u8] =
    b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nNot Found";

const HEAD_END: &[u8] = b"\r\n\r\n";

// ============================================================================
// Admission
// ============================================================================

/// Outcome of screening one request head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// WebSocket upgrade on the served path.
    Upgrade,
    /// Anything else.
    NotFound,
}

impl Admission {
    /// Screens a complete request head against the served `path`.
    ///
    /// A request qualifies when it is a `GET` on `path` (query ignored)
    /// carrying `Upgrade: websocket`, a `Connection` header listing
    /// `upgrade`, and a `Sec-WebSocket-Key`.
    pub(crate) fn classify(head: &[u8], path: &str) -> Self {
        let Ok(head) = std::str::from_utf8(head) else {
            return Self::NotFound;
        };

        let mut lines = head.split("\r\n");
        let mut request_line = lines.next().unwrap_or_default().split_whitespace();

        if request_line.next() != Some("GET") {
            return Self::NotFound;
        }
        let target = request_line.next().unwrap_or_default();
        let target_path = target.split('?').next().unwrap_or_default();
        if target_path != path {
            return Self::NotFound;
        }

        let mut wants_websocket = false;
        let mut connection_upgrade = false;
        let mut has_key = false;

        for (name, value) in lines.filter_map(|line| line.split_once(':')) {
            let name = name.trim();
            let value = value.trim();

            if name.eq_ignore_ascii_case("upgrade") {
                wants_websocket = value.eq_ignore_ascii_case("websocket");
            } else if name.eq_ignore_ascii_case("connection") {
                connection_upgrade = value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
            } else if name.eq_ignore_ascii_case("sec-websocket-key") {
                has_key = !value.is_empty();
            }
        }

        if wants_websocket && connection_upgrade && has_key {
            Self::Upgrade
        } else {
            Self::NotFound
        }
    }
}

// ============================================================================
// Screening
// ============================================================================

/// Waits for the request head and checks it, answering 404 on refusal.
///
/// # Errors
///
/// - [`Error::Connection`] if the request was refused or never completed
/// - [`Error::ConnectionClosed`] if the client hung up first
/// - [`Error::Io`] if reading the socket fails
pub(crate) async fn screen(stream: &mut TcpStream, path: &str) -> Result<()> {
    let head = timeout(HEAD_TIMEOUT, peek_head(stream))
        .await
        .map_err(|_| Error::connection("request head timed out"))??;

    let admission = match &head {
        Some(head) => Admission::classify(head, path),
        None => Admission::NotFound,
    };

    if admission == Admission::Upgrade {
        return Ok(());
    }

    let peeked = head.map_or(MAX_HEAD_LEN, |head| head.len());
    reject(stream, peeked).await;
    Err(Error::connection("not a WebSocket upgrade on the served path"))
}

/// Peeks until the request head is complete.
///
/// Returns `None` if the head outgrows [`MAX_HEAD_LEN`].
async fn peek_head(stream: &TcpStream) -> Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; MAX_HEAD_LEN];

    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        if let Some(end) = buf[..n].windows(HEAD_END.len()).position(|w| w == HEAD_END) {
            buf.truncate(end + HEAD_END.len());
            return Ok(Some(buf));
        }

        if n == MAX_HEAD_LEN {
            return Ok(None);
        }

        sleep(PEEK_INTERVAL).await;
    }
}

/// Consumes the peeked head, writes the 404 and closes the write half.
///
/// The head is read off the socket first; closing with unread input would
/// reset the connection before the client sees the response.
async fn reject(stream: &mut TcpStream, peeked: usize) {
    let mut head = vec![0u8; peeked];
    if let Err(e) = stream.read_exact(&mut head).await {
        debug!(error = %e, "Failed to consume rejected request");
        return;
    }
    if let Err(e) = stream.write_all(NOT_FOUND_RESPONSE).await {
        debug!(error = %e, "Failed to write 404");
        return;
    }
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to shut down rejected stream");
    }
}

// ============================================================================
// Tests
// ============================================================================
