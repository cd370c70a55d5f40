//! Failure injection tests for the relays.

use envelope_relay::config::{EgressConfig, EnvelopeConfig, IngressConfig, RelayConfig};
use envelope_relay::start;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn test_unreachable_next_hop_closes_client() {
    let dead = common::closed_port().await;
    let ingress = start(RelayConfig {
        ingress: Some(IngressConfig {
            bind_address: "127.0.0.1:0".into(),
            next_hop: dead.to_string(),
            ..IngressConfig::default()
        }),
        ..RelayConfig::default()
    })
    .await
    .unwrap();

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    assert!(common::closes_within_timeout(&mut client).await);
}

#[tokio::test]
async fn test_unreachable_destination_closes_client() {
    let dead = common::closed_port().await;
    let (_egress, ingress) = common::start_relays(
        EgressConfig {
            upstream: Some(dead.to_string()),
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    client.write_all(b"PING").await.unwrap();
    assert!(common::closes_within_timeout(&mut client).await);
}

#[tokio::test]
async fn test_unreachable_connect_target_gets_no_reply() {
    let dead = common::closed_port().await;
    let (_egress, ingress) =
        common::start_relays(EgressConfig::default(), EnvelopeConfig::default()).await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    let connect = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", dead);
    client.write_all(connect.as_bytes()).await.unwrap();

    // No "200 Connection Established" before the close.
    assert!(common::closes_within_timeout(&mut client).await);
}

#[tokio::test]
async fn test_insecure_https_refused_without_opt_in() {
    let backend = common::start_mock_backend("secret").await;
    let (_egress, ingress) =
        common::start_relays(EgressConfig::default(), EnvelopeConfig::default()).await;

    let mut client = TcpStream::connect(ingress.ingress_addr().unwrap()).await.unwrap();
    let request = format!(
        "GET httpst://{0}/ HTTP/1.1\r\nHost: {0}\r\n\r\n",
        backend
    );
    client.write_all(request.as_bytes()).await.unwrap();
    assert!(common::closes_within_timeout(&mut client).await);
}

#[tokio::test]
async fn test_tampered_envelope_closes_session() {
    let echo = common::start_echo_server().await;
    let (egress, _ingress) = common::start_relays(
        EgressConfig {
            upstream: Some(echo.to_string()),
            ..EgressConfig::default()
        },
        EnvelopeConfig::default(),
    )
    .await;

    // Passes the allow-list but the body lacks the obfuscation prefix.
    let mut client = TcpStream::connect(egress.egress_addr().unwrap()).await.unwrap();
    client
        .write_all(b"POST / HTTP/1.1\r\nHost: relay\r\nContent-Length: 4\r\n\r\nPING")
        .await
        .unwrap();
    assert!(common::closes_within_timeout(&mut client).await);
}
