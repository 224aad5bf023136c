//! Target connection and outbound request head.

use std::fmt::Write;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::net::TcpStream;

use crate::config::TargetConfig;
use crate::error::{Operation, TransportError};
use crate::session::with_timeout;

/// Open a connection to the target within `limit`.
pub async fn connect(addr: &str, limit: Duration) -> Result<TcpStream, TransportError> {
    let stream = with_timeout(Operation::Connect, Some(limit), async {
        TcpStream::connect(addr).await.map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })
    })
    .await?;
    // Frames are written whole; don't hold them back waiting for more.
    stream.set_nodelay(true).map_err(|source| TransportError::Connect {
        addr: addr.to_string(),
        source,
    })?;
    tracing::debug!(target_addr = %addr, "Connected to target");
    Ok(stream)
}

/// The request line and headers sent ahead of the first outbound chunk.
pub fn outbound_head(method: &str, target: &TargetConfig) -> Bytes {
    let mut head = BytesMut::with_capacity(128);
    // Writing into a BytesMut cannot fail.
    let _ = write!(
        head,
        "{method} {path} HTTP/1.1\r\nHost: {host}\r\nContent-Type: {content_type}\r\n\
         Transfer-Encoding: chunked\r\n\r\n",
        path = target.path,
        host = target.address,
        content_type = target.content_type,
    );
    head.freeze()
}
