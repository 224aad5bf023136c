//! Relay server.
//!
//! # Responsibilities
//! - Accept connections under the listener's connection limit
//! - Parse and route the request head, reject anything that is not a chunked
//!   POST/PUT on the relay path
//! - Connect to the target and run one session per request
//! - Answer the client with the target's status, or an error status
//! - Drain in-flight sessions on shutdown
//!
//! # Data Flow
//! ```text
//! client ──head──▶ read_request_head ──route──▶ connect(target)
//!                                                    │
//! client body ──▶ Session ──chunks──▶ target         │
//!                    │                               │
//!            Completed ──▶ read_response_status ◀────┘
//!                    │
//! client ◀── "HTTP/1.1 <target status>" (or mapped error status)
//! ```
//!
//! # Design Decisions
//! - One connection carries one request; every response closes the connection
//! - The client never sees a partial body: errors map to a bodyless status
//! - Streams are split so the handler keeps the halves the session does not need

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::config::RelayConfig;
use crate::error::{ErrorKind, Operation, SessionError, TransportError};
use crate::http::forward::{connect, outbound_head};
use crate::http::head::{read_request_head, read_response_status, HeadError};
use crate::lifecycle::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::session::{with_timeout, Session, SessionConfig, SessionEvents, SessionSummary};

/// Largest target response head read after a completed session.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// Chunked relay server.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
            tracker: ConnectionTracker::new(),
            shutdown: Shutdown::new(),
        }
    }

    /// Handle for triggering shutdown from another task.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown is triggered, then drain.
    pub async fn run(&self, listener: Listener) -> Result<(), ListenerError> {
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(active = self.tracker.active_count(), "Shutdown requested, no longer accepting");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(accepted) => accepted,
                        Err(ListenerError::Accept(e)) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };

                    let guard = self.tracker.track();
                    let config = Arc::clone(&self.config);
                    let span = tracing::info_span!("session", id = %guard.id(), peer = %peer);
                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            let _guard = guard;
                            handle_connection(stream, &config).await;
                        }
                        .instrument(span),
                    );
                }
            }
        }

        let deadline = self.config.timeouts.shutdown();
        if self.tracker.wait_for_drain(deadline).await {
            tracing::info!("All sessions drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                deadline_secs = deadline.as_secs(),
                "Shutdown deadline passed with sessions still running"
            );
        }
        Ok(())
    }
}

/// How a connection ended, as reported in `relay_sessions_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Rejected,
    Failed(ErrorKind),
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Rejected => "rejected",
            Outcome::Failed(_) => "failed",
        }
    }
}

async fn handle_connection(stream: TcpStream, config: &RelayConfig) {
    let started = Instant::now();
    metrics::session_started();
    let outcome = relay(stream, config).await;
    if let Outcome::Failed(kind) = outcome {
        metrics::session_error(kind);
    }
    metrics::session_finished(outcome.as_str(), started);
    tracing::info!(
        outcome = outcome.as_str(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Session finished"
    );
}

async fn relay(stream: TcpStream, config: &RelayConfig) -> Outcome {
    let (client_read, mut client_write) = stream.into_split();
    let mut client_read = BufReader::new(client_read);

    let head = match tokio::time::timeout(
        config.timeouts.read(),
        read_request_head(&mut client_read, config.pipeline.max_head_bytes),
    )
    .await
    {
        Ok(Ok(head)) => head,
        Ok(Err(HeadError::Closed)) => {
            tracing::debug!("Client closed before sending a request");
            return Outcome::Rejected;
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Unreadable request head");
            let status = match e {
                HeadError::TooLarge { .. } => 431,
                _ => 400,
            };
            respond(&mut client_write, status, "").await;
            return Outcome::Rejected;
        }
        Err(_) => {
            tracing::warn!("Timed out waiting for request head");
            respond(&mut client_write, 408, "").await;
            return Outcome::Rejected;
        }
    };

    if head.path != config.listener.path {
        tracing::debug!(path = %head.path, "No route");
        respond(&mut client_write, 404, "").await;
        return Outcome::Rejected;
    }
    if head.method != "POST" && head.method != "PUT" {
        tracing::debug!(method = %head.method, "Method not allowed");
        respond(&mut client_write, 405, "").await;
        return Outcome::Rejected;
    }
    if !head.is_chunked() {
        tracing::warn!(method = %head.method, "Request body is not chunked");
        respond(&mut client_write, 500, "non-chunked request").await;
        return Outcome::Rejected;
    }

    tracing::info!(method = %head.method, path = %head.path, target_addr = %config.target.address, "Session started");

    let target = match connect(&config.target.address, config.timeouts.connect()).await {
        Ok(target) => target,
        Err(e) => {
            tracing::error!(error = %e, "Target unreachable");
            return fail(&mut client_write, e.into()).await;
        }
    };
    let (target_read, target_write) = target.into_split();

    if head.expects_continue() {
        if let Err(e) = send_continue(&mut client_write).await {
            tracing::warn!(error = %e, "Failed to send 100 Continue");
            return Outcome::Failed(ErrorKind::Transport);
        }
    }

    let session = config
        .transform
        .build(config.pipeline.block_size)
        .and_then(|transform| {
            Session::new(
                &SessionConfig::from(config),
                Some(transform),
                Some(outbound_head(&head.method, &config.target)),
                client_read,
                target_write,
            )
        });
    let session = match session {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "Session setup failed");
            respond(&mut client_write, 500, "").await;
            return Outcome::Failed(ErrorKind::Internal);
        }
    };

    let mut events = RelayEvents;
    let completed = match session.run(&mut events).await {
        Ok(completed) => completed,
        Err(err) => return fail(&mut client_write, err).await,
    };
    metrics::record_summary(&completed.summary);

    // Keep the write half open until the target has answered.
    let _target_write = completed.downstream;
    let mut target_read = BufReader::new(target_read);
    match target_status(&mut target_read, config.timeouts.response()).await {
        Ok(status) => {
            tracing::debug!(status, "Target responded");
            respond(&mut client_write, status, "").await;
            Outcome::Completed
        }
        Err(e) => {
            tracing::error!(error = %e, "No usable target response");
            fail(&mut client_write, e.into()).await
        }
    }
}

/// Read the status of the target's response within `limit`.
async fn target_status<R>(reader: &mut R, limit: Duration) -> Result<u16, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    with_timeout(Operation::Response, Some(limit), async {
        read_response_status(reader, MAX_RESPONSE_HEAD)
            .await
            .map_err(TransportError::Response)
    })
    .await
}

/// Answer the client with the status for `err`.
async fn fail<W>(writer: &mut W, err: SessionError) -> Outcome
where
    W: AsyncWrite + Unpin,
{
    respond(writer, status_for(&err), "").await;
    Outcome::Failed(err.kind())
}

/// Client-facing status for a failed session.
pub fn status_for(err: &SessionError) -> u16 {
    match err {
        SessionError::Framing(_) => 400,
        SessionError::Transport(e) if e.is_timeout() => 504,
        SessionError::Transport(_) => 502,
        SessionError::Stalled { .. } => 500,
    }
}

/// Logs and counts session milestones.
struct RelayEvents;

impl SessionEvents for RelayEvents {
    fn on_request_body_complete(&mut self, summary: &SessionSummary) {
        tracing::debug!(
            chunks = summary.chunks_in,
            payload_bytes = summary.payload_in,
            "Request body received"
        );
    }

    fn on_proxy_complete(&mut self, summary: &SessionSummary) {
        tracing::info!(
            chunks_in = summary.chunks_in,
            chunks_out = summary.chunks_out,
            payload_bytes = summary.payload_out,
            wire_bytes = summary.wire_out,
            backpressure_pauses = summary.backpressure_pauses,
            "Body relayed"
        );
    }

    fn on_error(&mut self, error: &SessionError, summary: &SessionSummary) {
        let kind = error.kind();
        match kind {
            ErrorKind::Framing => {
                tracing::warn!(error = %error, kind = kind.as_str(), "Session failed")
            }
            ErrorKind::Transport | ErrorKind::Internal => {
                tracing::error!(error = %error, kind = kind.as_str(), "Session failed")
            }
        }
        metrics::record_summary(summary);
    }
}

async fn send_continue<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n").await?;
    writer.flush().await
}

/// Write a final response with an optional plain-text body, then close.
async fn respond<W>(writer: &mut W, status: u16, body: &str)
where
    W: AsyncWrite + Unpin,
{
    let response = Bytes::from(format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n{body}",
        reason = reason_phrase(status),
        len = body.len(),
    ));
    let result = async {
        writer.write_all(&response).await?;
        writer.shutdown().await
    }
    .await;
    if let Err(e) = result {
        tracing::debug!(error = %e, status, "Failed to send response");
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Content Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Status",
    }
}
