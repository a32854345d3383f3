#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::time::timeout;

use tokio_util::sync::CancellationToken;

use polykern_core::error::ErrorCode;
use polykern_engine::config;
use polykern_engine::sync::protocol::{decode_request, encode_response};
use polykern_engine::sync::{
    DiscoveryResponse, DiscoveryStream, DiscoveryTransport, TcpTransport, POLICY_CHAIN_TYPE_URL,
};
use polykern_engine::PolicyEngine;


const WAIT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn frames_are_newline_delimited() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (sock, _) = listener.accept().await.unwrap();
        let (rd, mut wr) = sock.into_split();
        let mut lines = BufReader::new(rd).lines();
        let got = lines.next_line().await.unwrap().unwrap();
        wr.write_all(b"{\"typeUrl\":\"t\"}\n").await.unwrap();
        got
    });

    let transport = TcpTransport::new(addr.to_string(), 1024);
    assert_eq!(transport.endpoint(), format!("tcp://{addr}"));
    let mut stream = timeout(WAIT, transport.connect()).await.unwrap().unwrap();

    stream.send("{\"hello\":1}".into()).await.unwrap();
    let frame = timeout(WAIT, stream.recv()).await.unwrap().unwrap();
    assert_eq!(frame.as_deref(), Some("{\"typeUrl\":\"t\"}"));
    assert_eq!(server.await.unwrap(), "{\"hello\":1}");

    // Server task ended and dropped the socket.
    assert_eq!(timeout(WAIT, stream.recv()).await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn oversized_frame_ends_the_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let big = "x".repeat(4096);
        sock.write_all(big.as_bytes()).await.unwrap();
        sock.write_all(b"\n{\"ok\":1}\n").await.unwrap();
        tokio::time::sleep(WAIT).await;
    });

    let transport = TcpTransport::new(addr.to_string(), 1024);
    let mut stream = transport.connect().await.unwrap();
    let err = timeout(WAIT, stream.recv())
        .await
        .unwrap()
        .expect_err("frame too large");
    assert_eq!(err.code(), ErrorCode::Transport);
    assert!(err.is_transport());
}

#[tokio::test]
async fn client_reconnects_after_oversized_frame() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let push = |version: &str, nonce: &str| {
        let mut frame = encode_response(&DiscoveryResponse {
            version_info: version.into(),
            type_url: POLICY_CHAIN_TYPE_URL.into(),
            nonce: nonce.into(),
            resources: vec![],
        })
        .unwrap();
        frame.push('\n');
        frame
    };
    let first = push("6", "n-1");
    let second = push("7", "n-2");

    let server = tokio::spawn(async move {
        // First connection: an oversized frame followed by a valid one.
        let (sock, _) = listener.accept().await.unwrap();
        let (rd, mut wr) = sock.into_split();
        let mut lines = BufReader::new(rd).lines();
        for _ in 0..3 {
            lines.next_line().await.unwrap().unwrap();
        }
        // The client may hang up mid-write once the limit is hit.
        let _ = wr.write_all("x".repeat(4096).as_bytes()).await;
        let _ = wr.write_all(b"\n").await;
        let _ = wr.write_all(first.as_bytes()).await;

        // The client drops that stream and comes back.
        let (sock, _) = listener.accept().await.unwrap();
        let (rd, mut wr) = sock.into_split();
        let mut lines = BufReader::new(rd).lines();
        for _ in 0..3 {
            lines.next_line().await.unwrap().unwrap();
        }
        wr.write_all(second.as_bytes()).await.unwrap();
        let ack = lines.next_line().await.unwrap().unwrap();
        decode_request(&ack).unwrap()
    });

    let cfg = config::load_from_str(&format!(
        "version: 1\nnode:\n  id: gw-1\ncontrol_plane:\n  address: \"{addr}\"\n  max_frame_bytes: 1024\nreconnect:\n  initial_delay_ms: 20\n  max_delay_ms: 100\n"
    ))
    .unwrap();
    let engine = PolicyEngine::new(cfg, test_policies::registry()).unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(engine.sync_client(engine.tcp_transport()).run(cancel.clone()));

    let ack = timeout(WAIT, server).await.unwrap().unwrap();
    assert!(!ack.is_nack());
    assert_eq!(ack.version_info, "7");
    assert_eq!(ack.response_nonce, "n-2");
    assert!(engine.metrics().sync_reconnects.get(&[]) >= 1);

    cancel.cancel();
    timeout(WAIT, task).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = TcpTransport::new(addr.to_string(), 1024)
        .connect()
        .await
        .err()
        .expect("nothing listening");
    assert!(err.is_transport());
}
