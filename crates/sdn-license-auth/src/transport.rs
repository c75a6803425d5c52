//! Newline-delimited JSON stream serving.
//!
//! One request and one response per stream. Each stream is served on its
//! own task; nothing is shared between streams except the authenticator.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::authenticator::Authenticator;
use crate::error::{AuthError, Result};
use crate::messages::{Request, Response};

/// Default bound on one request line.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 64 * 1024;
/// Default deadline for the request line to arrive.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Limits applied to every stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub max_request_bytes: usize,
    pub read_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Read one line of at most `max` bytes (excluding the newline).
///
/// A stream that closes without a newline yields whatever was read.
pub async fn read_line<R>(reader: &mut R, max: usize, timeout: Duration) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut limited = BufReader::new(reader.take(max as u64 + 1));
    let mut line = Vec::new();
    match tokio::time::timeout(timeout, limited.read_until(b'\n', &mut line)).await {
        Err(_) => return Err(AuthError::Timeout),
        Ok(Err(e)) => return Err(e.into()),
        Ok(Ok(_)) => {}
    }

    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    } else if line.len() > max {
        return Err(AuthError::RequestTooLarge { limit: max });
    }
    Ok(line)
}

/// Write `value` as one JSON line.
pub async fn write_line<W, T>(writer: &mut W, value: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let mut buf = serde_json::to_vec(value).map_err(|e| AuthError::InvalidJson(e.to_string()))?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn next_response<S>(auth: &Authenticator, stream: &mut S, config: &StreamConfig) -> Response
where
    S: AsyncRead + Unpin,
{
    let line = match read_line(stream, config.max_request_bytes, config.read_timeout).await {
        Ok(line) => line,
        Err(e) => return Response::error(&e),
    };
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return Response::error(&AuthError::InvalidRequest("empty request".into()));
    }
    match Request::parse(&line) {
        Ok(request) => auth.handle(&request).await,
        Err(e) => Response::error(&e),
    }
}

/// Serve one request on `stream` and close it.
pub async fn serve_stream<S>(auth: &Authenticator, mut stream: S, config: &StreamConfig) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = next_response(auth, &mut stream, config).await;
    if let Response::ErrorResponse(err) = &response {
        tracing::warn!(code = %err.code, "license request rejected");
    }
    write_line(&mut stream, &response).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Accept connections forever, serving each on its own task.
pub async fn serve_tcp(
    listener: TcpListener,
    auth: Arc<Authenticator>,
    config: StreamConfig,
) -> Result<()> {
    tracing::info!(addr = ?listener.local_addr().ok(), "license stream listener started");
    loop {
        let (socket, peer) = listener.accept().await?;
        let auth = auth.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_stream(&auth, socket, &config).await {
                tracing::debug!(%peer, error = %e, "license stream closed with error");
            }
        });
    }
}

/// Client side: send one request and read the response.
pub async fn send_request<S>(mut stream: S, request: &Request, config: &StreamConfig) -> Result<Response>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_line(&mut stream, request).await?;
    let line = read_line(&mut stream, config.max_request_bytes, config.read_timeout).await?;
    serde_json::from_slice(&line).map_err(|e| AuthError::InvalidJson(e.to_string()))
}
