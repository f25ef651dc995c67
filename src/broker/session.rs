//! Per-connection handling once a listener has established a transport.
//!
//! # Data Flow
//! ```text
//! stream / TLS stream / web-socket
//!     → admit (hook authenticate, connection tracking)
//!     → read loop (traffic accounting) until EOF, error or shutdown
//!     → close transport, guard drop updates Info
//! ```
//!
//! The application protocol is not interpreted here; this is where a
//! protocol engine would take over the transport.

use std::sync::{Arc, OnceLock};

use axum::extract::ws::{Message, WebSocket};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::hook::{ClientInfo, Hook};
use super::info::Stats;
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::ConnectionGuard;

/// Shared state for every connection of one broker.
pub struct Sessions {
    hook: OnceLock<Arc<dyn Hook>>,
    stats: Arc<Stats>,
    read_buffer_size: usize,
    shutdown: ShutdownSignal,
}

impl Sessions {
    pub fn new(stats: Arc<Stats>, read_buffer_size: usize, shutdown: ShutdownSignal) -> Self {
        Self {
            hook: OnceLock::new(),
            stats,
            read_buffer_size: read_buffer_size.max(1),
            shutdown,
        }
    }

    /// Install the admission hook. Returns the hook back if one is already set.
    pub(crate) fn set_hook(&self, hook: Arc<dyn Hook>) -> Result<(), Arc<dyn Hook>> {
        self.hook.set(hook)
    }

    pub(crate) fn hook_id(&self) -> Option<&str> {
        self.hook.get().map(|h| h.id())
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Run the hook for a new client. Without a hook every client is refused,
    /// and nothing is admitted once the broker is shutting down.
    fn admit(&self, client: &ClientInfo) -> Option<ConnectionGuard> {
        if self.shutdown.is_triggered() {
            tracing::debug!(
                listener = %client.listener,
                remote_addr = %client.remote_addr,
                "Client refused during shutdown"
            );
            return None;
        }

        let allowed = self
            .hook
            .get()
            .is_some_and(|hook| hook.authenticate(client));

        if !allowed {
            self.stats.client_rejected();
            tracing::info!(
                listener = %client.listener,
                remote_addr = %client.remote_addr,
                "Client rejected by hook"
            );
            return None;
        }

        let guard = self.stats.tracker().track();
        tracing::debug!(
            connection_id = %guard.id(),
            listener = %client.listener,
            transport = %client.transport,
            remote_addr = %client.remote_addr,
            peer_certificate = client.peer_certificate,
            "Client connected"
        );
        Some(guard)
    }

    /// Drive a byte-stream connection (plain or TLS) until it ends.
    pub async fn run_stream<S>(&self, client: ClientInfo, mut stream: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let Some(guard) = self.admit(&client) else {
            let _ = stream.shutdown().await;
            return;
        };

        let mut shutdown = self.shutdown.clone();
        let mut buf = vec![0u8; self.read_buffer_size];
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                read = stream.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => self.stats.bytes_received(n),
                    Err(e) => {
                        tracing::debug!(connection_id = %guard.id(), error = %e, "Read failed");
                        break;
                    }
                },
            }
        }

        let _ = stream.shutdown().await;
        tracing::debug!(connection_id = %guard.id(), listener = %client.listener, "Client disconnected");
    }

    /// Drive an upgraded web-socket connection until it ends.
    pub async fn run_websocket(&self, client: ClientInfo, mut socket: WebSocket) {
        let Some(guard) = self.admit(&client) else {
            let _ = socket.send(Message::Close(None)).await;
            return;
        };

        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
                msg = socket.recv() => match msg {
                    Some(Ok(Message::Binary(data))) => self.stats.message_received(data.len()),
                    Some(Ok(Message::Text(text))) => self.stats.message_received(text.as_str().len()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %guard.id(), error = %e, "Web-socket receive failed");
                        break;
                    }
                },
            }
        }

        tracing::debug!(connection_id = %guard.id(), listener = %client.listener, "Client disconnected");
    }
}
