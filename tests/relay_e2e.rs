//! End-to-end tests through both relays.

use std::time::Duration;

use envelope_relay::codec::{Cipher, Packaging};
use envelope_relay::config::{EgressConfig, EnvelopeConfig, ReverseProxyConfig};
use envelope_relay::relay::egress::CONNECT_ESTABLISHED;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_payload_is_decoded_at_egress() {
    let echo = common::start_echo_server().await;
    let (_egress, ingress) = common::start_relays(
        EgressConfig {
            upstream: Some(echo.to_string()),
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    client.write_all(b"PING").await.unwrap();

    // The echo server only ever sees the decoded payload.
    assert_eq!(common::read_exact_timeout(&mut client, 4).await, b"PING");
}

#[tokio::test]
async fn test_upstream_sees_raw_payload() {
    let (capture, mut captured) = common::start_capture_server().await;
    let (_egress, ingress) = common::start_relays(
        EgressConfig {
            upstream: Some(capture.to_string()),
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    client.write_all(b"PING").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"PING");
}

#[tokio::test]
async fn test_many_chunks_arrive_in_order() {
    let echo = common::start_echo_server().await;
    let (_egress, ingress) = common::start_relays(
        EgressConfig {
            upstream: Some(echo.to_string()),
            ..EgressConfig::default()
        },
        EnvelopeConfig {
            package: Packaging::File,
            cipher: Cipher::Hex,
            path: "/upload".into(),
            ..EnvelopeConfig::default()
        },
    )
    .await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    let mut expected = Vec::new();
    for i in 0..20u8 {
        let chunk = vec![i; 100 + i as usize];
        client.write_all(&chunk).await.unwrap();
        expected.extend_from_slice(&chunk);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let echoed = common::read_exact_timeout(&mut client, expected.len()).await;
    assert_eq!(echoed, expected);
}

#[tokio::test]
async fn test_connect_tunnel() {
    let echo = common::start_echo_server().await;
    let (_egress, ingress) =
        common::start_relays(EgressConfig::default(), EnvelopeConfig::default()).await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    let connect = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", echo);
    client.write_all(connect.as_bytes()).await.unwrap();

    let reply = common::read_exact_timeout(&mut client, CONNECT_ESTABLISHED.len()).await;
    assert_eq!(reply, CONNECT_ESTABLISHED);

    let opaque = b"\x16\x03\x01\x00\x05hello\r\n\r\nGET / HTTP/1.1";
    client.write_all(opaque).await.unwrap();
    assert_eq!(common::read_exact_timeout(&mut client, opaque.len()).await, opaque);
}

#[tokio::test]
async fn test_connect_tunnel_plain_packaging() {
    let echo = common::start_echo_server().await;
    let (_egress, ingress) = common::start_relays(
        EgressConfig::default(),
        EnvelopeConfig {
            package: Packaging::Plain,
            ..EnvelopeConfig::default()
        },
    )
    .await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    let connect = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", echo);
    client.write_all(connect.as_bytes()).await.unwrap();
    assert_eq!(
        common::read_exact_timeout(&mut client, CONNECT_ESTABLISHED.len()).await,
        CONNECT_ESTABLISHED
    );

    client.write_all(b"raw bytes").await.unwrap();
    assert_eq!(common::read_exact_timeout(&mut client, 9).await, b"raw bytes");
}

#[tokio::test]
async fn test_non_conforming_traffic_is_reverse_proxied() {
    let (decoy, mut captured) = common::start_capture_server().await;
    let (egress, _ingress) = common::start_relays(
        EgressConfig {
            reverse_proxy: ReverseProxyConfig {
                host: "127.0.0.1".into(),
                port: decoy.port(),
                protocol: None,
            },
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    // A browser request sent straight at the egress relay.
    let mut visitor = TcpStream::connect(egress.egress_addr().unwrap()).await.unwrap();
    visitor
        .write_all(
            b"GET /index.html HTTP/1.1\r\nHost: relay.example.com\r\nReferer: https://relay.example.com/home\r\nContent-Length: 5\r\n\r\nhello",
        )
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8(received).unwrap();
    let decoy_authority = format!("127.0.0.1:{}", decoy.port());

    assert!(text.starts_with("GET /index.html HTTP/1.1\r\n"));
    assert!(text.contains(&format!("Host: {}\r\n", decoy_authority)));
    assert!(text.contains(&format!("Referer: http://{}/home\r\n", decoy_authority)));
    assert!(text.ends_with("\r\n\r\nhello"));
}

#[tokio::test]
async fn test_opaque_bytes_are_reverse_proxied_unchanged() {
    let (decoy, mut captured) = common::start_capture_server().await;
    let (egress, _ingress) = common::start_relays(
        EgressConfig {
            reverse_proxy: ReverseProxyConfig {
                host: "127.0.0.1".into(),
                port: decoy.port(),
                protocol: None,
            },
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    let mut visitor = TcpStream::connect(egress.egress_addr().unwrap()).await.unwrap();
    visitor.write_all(b"\x16\x03\x01\x02\x00not http\n").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), captured.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, b"\x16\x03\x01\x02\x00not http\n");
}

#[tokio::test]
async fn test_http_forwarding_through_both_hops() {
    let backend = common::start_mock_backend("hello from backend").await;
    let (_egress, ingress) =
        common::start_relays(EgressConfig::default(), EnvelopeConfig::default()).await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", ingress.ingress_addr().unwrap())).unwrap())
        .build()
        .unwrap();

    let res = tokio::time::timeout(
        Duration::from_secs(5),
        client.get(format!("http://{}/greeting", backend)).send(),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-backend"], "mock");
    assert_eq!(res.text().await.unwrap(), "hello from backend");
}

#[tokio::test]
async fn test_insecure_https_forwarding_through_both_hops() {
    let backend = common::start_tls_backend("hello over tls").await;
    let (_egress, ingress) = common::start_relays(
        EgressConfig {
            insecure_skip_verify: true,
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    let request = format!(
        "GET httpst://{0}/secure HTTP/1.1\r\nHost: {0}\r\n\r\n",
        backend
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    let text = String::from_utf8(response).unwrap();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{}", text);
    assert!(text.contains("x-backend: tls\r\n"));
    assert!(text.contains("content-length: 14\r\n"));
    assert!(text.contains("Connection: close\r\n\r\n"));
    assert!(text.ends_with("\r\n\r\nhello over tls"));
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (egress, ingress) =
        common::start_relays(EgressConfig::default(), EnvelopeConfig::default()).await;
    let ingress_addr = ingress.ingress_addr().unwrap();

    ingress.shutdown().await;
    egress.shutdown().await;

    assert!(TcpStream::connect(ingress_addr).await.is_err());
}
