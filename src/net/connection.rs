//! Session state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Track session state per relay role
//! - Generate unique session IDs for tracing
//! - Count live sessions for graceful shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;

/// Global atomic counter for session IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Generate a new unique session ID.
    pub fn new() -> Self {
        Self(SESSION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

/// Session states for both relay roles.
///
/// ```text
/// ingress: Connecting → Tunneling → Closed
/// egress:  Buffering → Dispatching → Tunneling | Proxying → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Ingress: opening the tunnel to the next hop.
    Connecting,
    /// Egress: accumulating bytes until a complete envelope is buffered.
    Buffering,
    /// Egress: validating and decoding the envelope, picking a transport.
    Dispatching,
    /// Bytes flow between the two sockets.
    Tunneling,
    /// Egress: forwarding one HTTP(S) request and streaming its response.
    Proxying,
    /// Both sockets are closed.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Buffering => "buffering",
            SessionState::Dispatching => "dispatching",
            SessionState::Tunneling => "tunneling",
            SessionState::Proxying => "proxying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks live sessions for graceful shutdown.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    role: &'static str,
    active_count: Arc<AtomicU64>,
}

impl SessionTracker {
    pub fn new(role: &'static str) -> Self {
        Self {
            role,
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new live session. Returns a guard that decrements on drop.
    pub fn track(&self) -> SessionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        metrics::session_opened(self.role);
        SessionGuard {
            role: self.role,
            active_count: Arc::clone(&self.active_count),
            id: SessionId::new(),
        }
    }

    /// Get current live session count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all sessions are closed or `deadline` elapses.
    /// Returns true if the tracker drained.
    pub async fn wait_idle(&self, deadline: Duration) -> bool {
        let drained = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(deadline, drained).await.is_ok()
    }
}

/// Guard that tracks a session's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct SessionGuard {
    role: &'static str,
    active_count: Arc<AtomicU64>,
    id: SessionId,
}

impl SessionGuard {
    /// Get this session's ID.
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        metrics::session_closed(self.role);
        tracing::trace!(session_id = %self.id, state = %SessionState::Closed, "Session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
        assert!(id1.to_string().starts_with("sess-"));
    }

    #[test]
    fn session_tracker_counts() {
        let tracker = SessionTracker::new("test");
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);
        assert_ne!(guard1.id(), guard2.id());

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn wait_idle_times_out_with_live_sessions() {
        let tracker = SessionTracker::new("test");
        let guard = tracker.track();
        assert!(!tracker.wait_idle(Duration::from_millis(120)).await);
        drop(guard);
        assert!(tracker.wait_idle(Duration::from_millis(120)).await);
    }
}
