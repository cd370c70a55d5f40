//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build relay state and start the metrics exporter
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - `start` returns only once every configured listener is bound
//! - Listeners start last (traffic only when ready)

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::validation::validate_config;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::lifecycle::Shutdown;
use crate::net::connection::{SessionGuard, SessionTracker};
use crate::net::listener::{Listener, ListenerError};
use crate::observability::metrics;
use crate::relay::{egress, ingress, EgressRelay, IngressRelay};

/// Running relays. Dropping the handle leaves them running; call
/// [`RelayHandle::shutdown`] to stop.
#[derive(Debug)]
pub struct RelayHandle {
    ingress_addr: Option<SocketAddr>,
    egress_addr: Option<SocketAddr>,
    shutdown: Shutdown,
    accept_loops: Vec<JoinHandle<()>>,
    trackers: Vec<SessionTracker>,
    drain: Duration,
}

impl RelayHandle {
    pub fn ingress_addr(&self) -> Option<SocketAddr> {
        self.ingress_addr
    }

    pub fn egress_addr(&self) -> Option<SocketAddr> {
        self.egress_addr
    }

    /// Live sessions across both relays.
    pub fn active_sessions(&self) -> u64 {
        self.trackers.iter().map(SessionTracker::active_count).sum()
    }

    /// Stop accepting, then give live sessions the drain period to finish.
    pub async fn shutdown(self) {
        tracing::info!("Shutting down relays");
        self.shutdown.trigger();
        for task in self.accept_loops {
            let _ = task.await;
        }

        for tracker in &self.trackers {
            if !tracker.wait_idle(self.drain).await {
                tracing::warn!(
                    active_sessions = tracker.active_count(),
                    "Sessions still active after drain period"
                );
            }
        }
        tracing::info!("Shutdown complete");
    }
}

/// Bind and run every relay `config` enables.
pub async fn start(config: RelayConfig) -> Result<RelayHandle, RelayError> {
    validate_config(&config).map_err(|errors| {
        RelayError::Setup(
            errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        )
    })?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let mut handle = RelayHandle {
        ingress_addr: None,
        egress_addr: None,
        shutdown: shutdown.clone(),
        accept_loops: Vec::new(),
        trackers: Vec::new(),
        drain: config.timeouts.drain(),
    };

    // Egress first so a loopback ingress has somewhere to connect.
    if let Some(egress_config) = &config.egress {
        let relay = Arc::new(EgressRelay::new(
            egress_config,
            &config.envelope,
            &config.timeouts,
        )?);
        let listener = Listener::bind(
            egress::ROLE,
            &egress_config.bind_address,
            egress_config.max_connections,
        )
        .await?;
        handle.egress_addr = Some(listener.local_addr()?);

        let tracker = SessionTracker::new(egress::ROLE);
        handle.trackers.push(tracker.clone());
        handle.accept_loops.push(tokio::spawn(accept_loop(
            listener,
            tracker,
            shutdown.subscribe(),
            move |stream, peer, session| {
                let relay = Arc::clone(&relay);
                async move { relay.serve(stream, peer, session).await }
            },
        )));
    }

    if let Some(ingress_config) = &config.ingress {
        let relay = Arc::new(IngressRelay::new(
            ingress_config,
            &config.envelope,
            &config.timeouts,
        )?);
        let listener = Listener::bind(
            ingress::ROLE,
            &ingress_config.bind_address,
            ingress_config.max_connections,
        )
        .await?;
        handle.ingress_addr = Some(listener.local_addr()?);

        let tracker = SessionTracker::new(ingress::ROLE);
        handle.trackers.push(tracker.clone());
        handle.accept_loops.push(tokio::spawn(accept_loop(
            listener,
            tracker,
            shutdown.subscribe(),
            move |stream, peer, session| {
                let relay = Arc::clone(&relay);
                async move { relay.serve(stream, peer, session).await }
            },
        )));
    }

    tracing::info!(
        ingress = ?handle.ingress_addr,
        egress = ?handle.egress_addr,
        package = ?config.envelope.package,
        cipher = ?config.envelope.cipher,
        "Relays started"
    );
    Ok(handle)
}

/// Accept connections until shutdown, one task per session.
async fn accept_loop<F, Fut>(
    listener: Listener,
    tracker: SessionTracker,
    mut shutdown_rx: broadcast::Receiver<()>,
    serve: F,
) where
    F: Fn(TcpStream, SocketAddr, SessionGuard) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::debug!("Accept loop stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr, permit)) => {
                    let _ = stream.set_nodelay(true);
                    let session = tracker.track();
                    tracing::debug!(
                        session_id = %session.id(),
                        peer_addr = %peer_addr,
                        "Session opened"
                    );
                    let session_task = serve(stream, peer_addr, session);
                    tokio::spawn(async move {
                        session_task.await;
                        drop(permit);
                    });
                }
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Listener stopped");
                    break;
                }
            }
        }
    }
}
