//! End-to-end tests: client → relay → mock target.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

mod common;

#[tokio::test]
async fn relays_and_reframes_body() {
    let (target, mut received) = common::start_mock_target(200).await;
    let (relay, shutdown, handle) = common::start_relay(common::relay_config(target)).await;

    let body = common::chunked_body(&[b"abcdefghijklmnopqrstuvwxyz", b"1234567890abcdef"]);
    let response = common::post_chunked(relay, "/chunked", &body).await;
    assert!(response.starts_with("HTTP/1.1 200 "), "{response}");
    assert!(response.contains("Content-Length: 0\r\n"));
    assert!(response.contains("Connection: close\r\n"));

    let request = received.recv().await.unwrap();
    let (head, body) = common::split_head(&request);
    let head = String::from_utf8_lossy(head);
    assert!(head.starts_with("POST /chunked HTTP/1.1\r\n"), "{head}");
    assert!(head.contains(&format!("Host: {target}\r\n")));
    assert!(head.contains("Transfer-Encoding: chunked\r\n"));
    assert!(head.contains("Content-Type: application/octet-stream\r\n"));

    let (sizes, payload) = common::decode_chunked(body);
    assert_eq!(sizes, vec![5, 5, 5, 5, 5, 5, 5, 5, 2]);
    assert_eq!(payload, b"ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890ABCDEF");

    shutdown.trigger();
    handle.await.unwrap();
}

#[tokio::test]
async fn forwards_target_status_and_method() {
    let (target, mut received) = common::start_mock_target(201).await;
    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;

    let mut request = b"PUT /chunked HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
    request.extend_from_slice(&common::chunked_body(&[b"hi"]));
    let response = common::send_raw(relay, &request).await;
    assert!(response.starts_with("HTTP/1.1 201 "), "{response}");

    let request = received.recv().await.unwrap();
    assert!(request.starts_with(b"PUT /chunked HTTP/1.1\r\n"));
    let (_, body) = common::split_head(&request);
    assert_eq!(body, b"2\r\nHI\r\n0\r\n\r\n");
}

#[tokio::test]
async fn empty_body_sends_only_terminal_chunk() {
    let (target, mut received) = common::start_mock_target(200).await;
    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;

    let response = common::post_chunked(relay, "/chunked", b"0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 "), "{response}");

    let request = received.recv().await.unwrap();
    let (_, body) = common::split_head(&request);
    assert_eq!(body, b"0\r\n\r\n");
}

#[tokio::test]
async fn answers_expect_continue_before_body() {
    let (target, mut received) = common::start_mock_target(200).await;
    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;

    let stream = TcpStream::connect(relay).await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut read = BufReader::new(read);
    write
        .write_all(b"POST /chunked HTTP/1.1\r\nExpect: 100-continue\r\nTransfer-Encoding: chunked\r\n\r\n")
        .await
        .unwrap();

    let mut line = String::new();
    read.read_line(&mut line).await.unwrap();
    assert_eq!(line, "HTTP/1.1 100 Continue\r\n");
    line.clear();
    read.read_line(&mut line).await.unwrap();
    assert_eq!(line, "\r\n");

    write.write_all(&common::chunked_body(&[b"hello"])).await.unwrap();
    let mut rest = String::new();
    read.read_to_string(&mut rest).await.unwrap();
    assert!(rest.starts_with("HTTP/1.1 200 "), "{rest}");

    let request = received.recv().await.unwrap();
    let (_, body) = common::split_head(&request);
    assert_eq!(common::decode_chunked(body).1, b"HELLO");
}

#[tokio::test]
async fn rejects_requests_that_cannot_be_relayed() {
    let (target, _received) = common::start_mock_target(200).await;
    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;

    let response = common::send_raw(relay, b"POST /other HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 "), "{response}");

    let response = common::send_raw(relay, b"GET /chunked HTTP/1.1\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 405 "), "{response}");

    let response = common::send_raw(relay, b"POST /chunked HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello").await;
    assert!(response.starts_with("HTTP/1.1 500 "), "{response}");
    assert!(response.ends_with("non-chunked request"));

    let response = common::send_raw(relay, b"NOT HTTP\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 "), "{response}");
}

#[tokio::test]
async fn framing_error_returns_400_without_terminal_chunk() {
    let (target, mut received) = common::start_mock_target(200).await;
    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;

    let response = common::post_chunked(relay, "/chunked", b"g\r\nhello\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 "), "{response}");

    // The target connection closes without ever seeing a frame.
    let request = received.recv().await.unwrap();
    assert!(request.is_empty(), "{:?}", String::from_utf8_lossy(&request));
}

#[tokio::test]
async fn framing_error_mid_body_never_completes_target_body() {
    let (target, mut received) = common::start_mock_target(200).await;
    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;

    let mut body = common::chunked_body(&[b"abcdefghij"]);
    body.truncate(body.len() - b"0\r\n\r\n".len());
    body.extend_from_slice(b"5;ext=1\r\nhello\r\n0\r\n\r\n");
    let response = common::post_chunked(relay, "/chunked", &body).await;
    assert!(response.starts_with("HTTP/1.1 400 "), "{response}");

    let request = received.recv().await.unwrap();
    assert!(!request.ends_with(b"\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn unreachable_target_is_502() {
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = unused.local_addr().unwrap();
    drop(unused);

    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;
    let response = common::post_chunked(relay, "/chunked", &common::chunked_body(&[b"x"])).await;
    assert!(response.starts_with("HTTP/1.1 502 "), "{response}");
}

#[tokio::test]
async fn garbage_target_response_is_502() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.ends_with(b"\r\n0\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            received.extend_from_slice(&buf[..n]);
        }
        let _ = socket.write_all(b"not a response\r\n\r\n").await;
    });

    let (relay, _shutdown, _handle) = common::start_relay(common::relay_config(target)).await;
    let response = common::post_chunked(relay, "/chunked", &common::chunked_body(&[b"x"])).await;
    assert!(response.starts_with("HTTP/1.1 502 "), "{response}");
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let (target, _received) = common::start_mock_target(200).await;
    let (relay, shutdown, handle) = common::start_relay(common::relay_config(target)).await;

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server stops")
        .unwrap();

    assert!(TcpStream::connect(relay).await.is_err());
}
