//! Connection identity and lifetime tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count live, total, closed and peak connections for `Info`
//! - Let the broker wait for in-flight connections during drain

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicU64,
    total: AtomicU64,
    closed: AtomicU64,
    peak: AtomicU64,
}

/// Tracks admitted connections for statistics and graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters.peak.fetch_max(active, Ordering::Relaxed);
        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Connections admitted since start.
    pub fn total_count(&self) -> u64 {
        self.counters.total.load(Ordering::Relaxed)
    }

    /// Connections that have ended since start.
    pub fn closed_count(&self) -> u64 {
        self.counters.closed.load(Ordering::Relaxed)
    }

    /// Highest number of simultaneously active connections.
    pub fn peak_count(&self) -> u64 {
        self.counters.peak.load(Ordering::Relaxed)
    }

    /// Wait until all connections are closed.
    pub async fn wait_idle(&self) {
        while self.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
        self.counters.closed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
