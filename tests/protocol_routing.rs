//! End-to-end routing tests: one multiplexer listener, echo backends,
//! real client connections classified by their first bytes.


use std::time::Duration;

use harness::{roundtrip, target, EchoBackend, MuxHandle};
use portmux::{MatchRule, Matcher};
use regex::bytes::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

#[tokio::test]
async fn ssh_banner_routes_to_ssh_backend() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(backend.addr))])
        .await
        .unwrap();

    let payload = b"SSH-2.0-OpenSSH_9.0\r\n";
    let echoed = roundtrip(mux.listen_addr, payload).await.unwrap();

    assert_eq!(echoed, payload);
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn tls_client_hello_routes_to_tls_backend() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(
        MatchRule::TlsHandshake,
        target(backend.addr),
    )])
    .await
    .unwrap();

    let hello = [0x16, 0x03, 0x01, 0x00, 0x08, 0x01, 0x00, 0x00, 0x04, 0xde, 0xad, 0xbe, 0xef];
    let echoed = roundtrip(mux.listen_addr, &hello).await.unwrap();

    assert_eq!(echoed, hello);
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn tls_with_bad_version_byte_is_rejected() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(
        MatchRule::TlsHandshake,
        target(backend.addr),
    )])
    .await
    .unwrap();

    // byte[3] outside 0x00..=0x03
    let not_quite_tls = [0x16, 0x03, 0x01, 0x04, 0x5f];
    let result = roundtrip(mux.listen_addr, &not_quite_tls).await;

    assert!(result.is_err(), "unmatched connection must be closed");
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn http_get_routes_via_regex() {
    let backend = EchoBackend::spawn().await.unwrap();
    let pattern = Regex::new("^GET ").unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(
        MatchRule::Regex(pattern),
        target(backend.addr),
    )])
    .await
    .unwrap();

    let payload = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let echoed = roundtrip(mux.listen_addr, payload).await.unwrap();

    assert_eq!(echoed, payload);
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn declined_matcher_falls_through_to_second() {
    let ssh_backend = EchoBackend::spawn().await.unwrap();
    let tls_backend = EchoBackend::spawn().await.unwrap();

    let mux = MuxHandle::spawn(vec![
        Matcher::new(MatchRule::SshPrefix, target(ssh_backend.addr)),
        Matcher::new(MatchRule::TlsHandshake, target(tls_backend.addr)),
    ])
    .await
    .unwrap();

    // Fails the SSH prefix check, passes the TLS check
    let hello = [0x16, 0x03, 0x03, 0x00, 0x02, 0x01, 0x00];
    let echoed = roundtrip(mux.listen_addr, &hello).await.unwrap();

    assert_eq!(echoed, hello);
    assert_eq!(tls_backend.connection_count(), 1);
    assert_eq!(ssh_backend.connection_count(), 0);
}

#[tokio::test]
async fn registry_order_decides_between_overlapping_matchers() {
    let payload = b"SSH-2.0-client\r\n";

    // Catch-all regex listed first shadows the SSH matcher.
    let first = EchoBackend::spawn().await.unwrap();
    let second = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![
        Matcher::new(MatchRule::Regex(Regex::new(".").unwrap()), target(first.addr)),
        Matcher::new(MatchRule::SshPrefix, target(second.addr)),
    ])
    .await
    .unwrap();

    roundtrip(mux.listen_addr, payload).await.unwrap();
    assert_eq!(first.connection_count(), 1);
    assert_eq!(second.connection_count(), 0);

    // Same matchers, opposite order: the SSH matcher wins now.
    let first = EchoBackend::spawn().await.unwrap();
    let second = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![
        Matcher::new(MatchRule::SshPrefix, target(second.addr)),
        Matcher::new(MatchRule::Regex(Regex::new(".").unwrap()), target(first.addr)),
    ])
    .await
    .unwrap();

    roundtrip(mux.listen_addr, payload).await.unwrap();
    assert_eq!(second.connection_count(), 1);
    assert_eq!(first.connection_count(), 0);
}

#[tokio::test]
async fn unmatched_input_never_contacts_a_backend() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(backend.addr))])
        .await
        .unwrap();

    let result = roundtrip(mux.listen_addr, b"TELNET anyone?\r\n").await;

    assert!(result.is_err());
    // Give the dispatch task time to have dialed if it was going to
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.connection_count(), 0);
}

#[tokio::test]
async fn length_prefix_consistency_routes_and_rejects() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(
        MatchRule::LengthPrefixed,
        target(backend.addr),
    )])
    .await
    .unwrap();

    // Declared length 5, remaining bytes 5
    let consistent = [0x00, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05];
    let echoed = roundtrip(mux.listen_addr, &consistent).await.unwrap();
    assert_eq!(echoed, consistent);
    assert_eq!(backend.connection_count(), 1);

    // Declared length 9, remaining bytes 3
    let mismatched = [0x00, 0x09, 0x01, 0x02, 0x03];
    let result = roundtrip(mux.listen_addr, &mismatched).await;
    assert!(result.is_err());
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn relay_preserves_bytes_in_both_directions() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(backend.addr))])
        .await
        .unwrap();

    // A payload larger than both the peek buffer and the relay copy
    // buffer, to cross every buffering boundary.
    let mut payload = b"SSH-2.0-bulk\r\n".to_vec();
    payload.extend((0..32 * 1024).map(|i| (i % 251) as u8));

    let echoed = roundtrip(mux.listen_addr, &payload).await.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn relay_keeps_flowing_after_the_peeked_head() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(backend.addr))])
        .await
        .unwrap();

    let mut stream = TcpStream::connect(mux.listen_addr).await.unwrap();

    // First exchange includes the peeked bytes; they must reach the
    // backend intact (peeking consumed nothing).
    stream.write_all(b"SSH-2.0-interactive\r\n").await.unwrap();
    let mut buf = vec![0u8; b"SSH-2.0-interactive\r\n".len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, b"SSH-2.0-interactive\r\n");

    // Later traffic flows through the same relay.
    stream.write_all(b"more data").await.unwrap();
    let mut buf = vec![0u8; b"more data".len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, b"more data");
}

#[tokio::test]
async fn listener_keeps_accepting_after_failed_connections() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(backend.addr))])
        .await
        .unwrap();

    // A peer that connects and disappears without sending anything.
    let silent = TcpStream::connect(mux.listen_addr).await.unwrap();
    drop(silent);

    // A peer that sends garbage and is rejected.
    let _ = roundtrip(mux.listen_addr, b"\x00\xff\x00\xff").await;

    // The listener still serves the next valid connection.
    let payload = b"SSH-2.0-still-alive\r\n";
    let echoed = roundtrip(mux.listen_addr, payload).await.unwrap();
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn stalled_connection_does_not_block_others() {
    let backend = EchoBackend::spawn().await.unwrap();
    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(backend.addr))])
        .await
        .unwrap();

    // Holds its connection open without ever sending a byte; its
    // dispatch task stays parked in the peek.
    let _stalled = TcpStream::connect(mux.listen_addr).await.unwrap();

    let payload = b"SSH-2.0-concurrent\r\n";
    let echoed = roundtrip(mux.listen_addr, payload).await.unwrap();
    assert_eq!(echoed, payload);
    assert_eq!(backend.connection_count(), 1);
}

#[tokio::test]
async fn dial_failure_closes_the_client() {
    // Reserve an address with no listener behind it.
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = unused.local_addr().unwrap();
    drop(unused);

    let mux = MuxHandle::spawn(vec![Matcher::new(MatchRule::SshPrefix, target(dead_addr))])
        .await
        .unwrap();

    let result = roundtrip(mux.listen_addr, b"SSH-2.0-nobody-home\r\n").await;
    assert!(result.is_err(), "dial failure must drop the client");
}
