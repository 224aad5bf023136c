//! Stream operations issued by the session driver.
//!
//! Each operation owns its stream for as long as it runs and hands it back
//! with the result, so the driver can hold one read and one write in flight
//! without borrowing from itself.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Operation, TransportError};
use crate::framing::ReadRequest;

pub(crate) type PendingRead<R> = BoxFuture<'static, (R, Result<Bytes, TransportError>)>;
pub(crate) type PendingWrite<W> = BoxFuture<'static, (W, Result<(), TransportError>)>;

/// Issue one decoder read against `upstream`.
///
/// End of stream is not an error here: the short result goes back to the
/// decoder, which reports it as truncation.
pub(crate) fn read_frame<R>(mut upstream: R, request: ReadRequest, limit: Option<Duration>) -> PendingRead<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    Box::pin(async move {
        let result = with_timeout(Operation::Read, limit, read_request(&mut upstream, request)).await;
        (upstream, result)
    })
}

/// Write one frame to `downstream` and flush it.
pub(crate) fn write_frame<W>(mut downstream: W, frame: Bytes, limit: Option<Duration>) -> PendingWrite<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    Box::pin(async move {
        let result = with_timeout(Operation::Write, limit, async {
            downstream.write_all(&frame).await.map_err(TransportError::Write)?;
            downstream.flush().await.map_err(TransportError::Write)
        })
        .await;
        (downstream, result)
    })
}

async fn read_request<R>(upstream: &mut R, request: ReadRequest) -> Result<Bytes, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    match request {
        ReadRequest::Line { limit } => {
            (&mut *upstream)
                .take(limit as u64)
                .read_until(b'\n', &mut buf)
                .await
                .map_err(TransportError::Read)?;
        }
        ReadRequest::Exactly(len) => {
            buf.reserve_exact(len);
            (&mut *upstream)
                .take(len as u64)
                .read_to_end(&mut buf)
                .await
                .map_err(TransportError::Read)?;
        }
    }
    Ok(Bytes::from(buf))
}

pub(crate) async fn with_timeout<T, F>(op: Operation, limit: Option<Duration>, fut: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .unwrap_or_else(|_| Err(TransportError::TimedOut { op, after })),
        None => fut.await,
    }
}
