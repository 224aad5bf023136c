//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use chunk_relay::config::{RelayConfig, TransformConfig};
use chunk_relay::net::Listener;
use chunk_relay::{RelayServer, Shutdown};

/// Frame `pieces` as a chunked body, terminal chunk included.
pub fn chunked_body(pieces: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for piece in pieces {
        out.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
        out.extend_from_slice(piece);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

/// Split a complete chunked body into chunk sizes and concatenated payload.
pub fn decode_chunked(mut wire: &[u8]) -> (Vec<usize>, Vec<u8>) {
    let mut sizes = Vec::new();
    let mut payload = Vec::new();
    loop {
        let line_end = wire
            .windows(2)
            .position(|w| w == b"\r\n")
            .expect("chunk-size line");
        let size = usize::from_str_radix(std::str::from_utf8(&wire[..line_end]).unwrap(), 16).unwrap();
        wire = &wire[line_end + 2..];
        if size == 0 {
            assert_eq!(wire, b"\r\n", "bytes after terminal chunk");
            return (sizes, payload);
        }
        sizes.push(size);
        payload.extend_from_slice(&wire[..size]);
        assert_eq!(&wire[size..size + 2], b"\r\n");
        wire = &wire[size + 2..];
    }
}

/// Split a captured target request into head and body.
pub fn split_head(request: &[u8]) -> (&[u8], &[u8]) {
    let end = request
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("request head")
        + 4;
    request.split_at(end)
}

/// Start a target that reads one chunked request per connection, replies
/// with `status`, and reports the raw bytes it received.
pub async fn start_mock_target(status: u16) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut received = Vec::new();
                let mut buf = [0u8; 4096];
                let complete = loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break false,
                        Ok(n) => received.extend_from_slice(&buf[..n]),
                    }
                    if received.ends_with(b"\r\n0\r\n\r\n") {
                        break true;
                    }
                };
                if complete {
                    let response = format!("HTTP/1.1 {status} Mock\r\nContent-Length: 0\r\n\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
                let _ = tx.send(received);
            });
        }
    });

    (addr, rx)
}

/// Small sizes so a short body spans several chunks and blocks.
pub fn relay_config(target: SocketAddr) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.target.address = target.to_string();
    config.pipeline.block_size = 4;
    config.pipeline.outbound_chunk_size = 5;
    config.pipeline.low_watermark = 16;
    config.pipeline.high_watermark = 64;
    config.transform = TransformConfig::Uppercase;
    config.timeouts.read_secs = 5;
    config.timeouts.write_secs = 5;
    config.timeouts.response_secs = 5;
    config.timeouts.shutdown_secs = 2;
    config
}

/// Run a relay on an ephemeral port.
pub async fn start_relay(config: RelayConfig) -> (SocketAddr, Shutdown, JoinHandle<()>) {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tcp.local_addr().unwrap();
    let listener = Listener::from_tcp(tcp, config.listener.max_connections);
    let server = RelayServer::new(config);
    let shutdown = server.shutdown_handle();
    let handle = tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });
    (addr, shutdown, handle)
}

/// Send a raw request and read the whole response.
pub async fn send_raw(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut response))
        .await
        .expect("response within deadline")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

/// POST a chunked body to `path`.
pub async fn post_chunked(addr: SocketAddr, path: &str, body: &[u8]) -> String {
    let mut request = format!("POST {path} HTTP/1.1\r\nHost: relay\r\nTransfer-Encoding: chunked\r\n\r\n").into_bytes();
    request.extend_from_slice(body);
    send_raw(addr, &request).await
}
