//! Broker statistics and the read-only `Info` snapshot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::net::connection::ConnectionTracker;

/// Point-in-time view of broker statistics, served by the diagnostics listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Info {
    pub version: String,
    /// Unix seconds when the broker was constructed.
    pub started: u64,
    /// Unix seconds when this snapshot was taken.
    pub time: u64,
    /// Seconds since construction.
    pub uptime: u64,
    pub listeners: u64,
    pub clients_connected: u64,
    pub clients_disconnected: u64,
    pub clients_maximum: u64,
    pub clients_total: u64,
    /// Connections refused by the hook.
    pub clients_rejected: u64,
    pub handshake_failures: u64,
    pub bytes_received: u64,
    pub messages_received: u64,
}

/// Live counters behind [`Info`]. Safe to share and update from any task.
#[derive(Debug)]
pub struct Stats {
    started: Instant,
    started_unix: u64,
    tracker: ConnectionTracker,
    listeners: AtomicU64,
    rejected: AtomicU64,
    handshake_failures: AtomicU64,
    bytes_received: AtomicU64,
    messages_received: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_unix: unix_now(),
            tracker: ConnectionTracker::new(),
            listeners: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            handshake_failures: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        }
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn listener_added(&self) {
        self.listeners.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handshake_failed(&self) {
        self.handshake_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// A framed message arrived; `n` is its payload size.
    pub fn message_received(&self, n: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received(n);
    }

    pub fn snapshot(&self) -> Info {
        Info {
            version: env!("CARGO_PKG_VERSION").to_string(),
            started: self.started_unix,
            time: unix_now(),
            uptime: self.started.elapsed().as_secs(),
            listeners: self.listeners.load(Ordering::Relaxed),
            clients_connected: self.tracker.active_count(),
            clients_disconnected: self.tracker.closed_count(),
            clients_maximum: self.tracker.peak_count(),
            clients_total: self.tracker.total_count(),
            clients_rejected: self.rejected.load(Ordering::Relaxed),
            handshake_failures: self.handshake_failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = Stats::new();
        stats.listener_added();
        stats.message_received(10);
        stats.bytes_received(5);
        stats.client_rejected();

        let guard = stats.tracker().track();
        let info = stats.snapshot();
        assert_eq!(info.listeners, 1);
        assert_eq!(info.messages_received, 1);
        assert_eq!(info.bytes_received, 15);
        assert_eq!(info.clients_rejected, 1);
        assert_eq!(info.clients_connected, 1);
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.time >= info.started);

        drop(guard);
        let info = stats.snapshot();
        assert_eq!(info.clients_connected, 0);
        assert_eq!(info.clients_disconnected, 1);
        assert_eq!(info.clients_total, 1);
    }

    #[test]
    fn info_serializes_as_flat_json() {
        let info = Stats::new().snapshot();
        let value = serde_json::to_value(&info).unwrap();
        assert!(value.get("uptime").is_some());
        assert!(value.get("clients_connected").is_some());
        assert!(value.get("bytes_sent").is_none());
        assert!(value.get("messages_sent").is_none());
    }
}
