//! Shared utilities for relay integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use envelope_relay::config::{EgressConfig, EnvelopeConfig, IngressConfig, RelayConfig};
use envelope_relay::{start, RelayHandle};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Start a TCP server that echoes every byte back.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut r, mut w) = socket.split();
                let _ = tokio::io::copy(&mut r, &mut w).await;
            });
        }
    });
    addr
}

/// Start a simple mock backend that reads one request head and returns a
/// fixed response.
pub async fn start_mock_backend(response: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_head(&mut socket).await;
                let response_str = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Backend: mock\r\nConnection: close\r\n\r\n{}",
                    response.len(),
                    response
                );
                let _ = socket.write_all(response_str.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });
    addr
}

/// Start an HTTPS backend with a freshly generated self-signed
/// certificate. `GET /secure` answers `body` with `X-Backend: tls`.
pub async fn start_tls_backend(body: &'static str) -> SocketAddr {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let certified =
        rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string(), "localhost".to_string()])
            .unwrap();
    let config = RustlsConfig::from_pem(
        certified.cert.pem().into_bytes(),
        certified.key_pair.serialize_pem().into_bytes(),
    )
    .await
    .unwrap();

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let app = axum::Router::new().route(
        "/secure",
        axum::routing::get(move || async move { ([("x-backend", "tls")], body) }),
    );
    tokio::spawn(async move {
        let _ = axum_server::from_tcp_rustls(listener, config)
            .serve(app.into_make_service())
            .await;
    });
    addr
}

/// Start a server that records everything a connection sends until it
/// goes quiet, then reports it on the channel.
pub async fn start_capture_server() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut captured = Vec::new();
                let mut buf = [0u8; 4096];
                loop {
                    match tokio::time::timeout(Duration::from_millis(300), socket.read(&mut buf))
                        .await
                    {
                        Ok(Ok(n)) if n > 0 => captured.extend_from_slice(&buf[..n]),
                        _ => break,
                    }
                }
                let _ = tx.send(captured);
            });
        }
    });
    (addr, rx)
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start an egress relay, then an ingress relay pointed at it.
pub async fn start_relays(
    egress: EgressConfig,
    envelope: EnvelopeConfig,
) -> (RelayHandle, RelayHandle) {
    let egress_handle = start(RelayConfig {
        egress: Some(EgressConfig {
            bind_address: "127.0.0.1:0".into(),
            ..egress
        }),
        envelope: envelope.clone(),
        ..RelayConfig::default()
    })
    .await
    .unwrap();

    let ingress_handle = start(RelayConfig {
        ingress: Some(IngressConfig {
            bind_address: "127.0.0.1:0".into(),
            next_hop: egress_handle.egress_addr().unwrap().to_string(),
            ..IngressConfig::default()
        }),
        envelope,
        ..RelayConfig::default()
    })
    .await
    .unwrap();

    (egress_handle, ingress_handle)
}

/// Read exactly `n` bytes, failing the test after two seconds.
pub async fn read_exact_timeout(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for relay")
        .unwrap();
    buf
}

/// True if the peer closes the stream within two seconds.
pub async fn closes_within_timeout(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        _ => false,
    }
}

async fn read_head(socket: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
    Ok(head)
}
