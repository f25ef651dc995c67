//! Listener factory and stream accept loops.
//!
//! # Responsibilities
//! - Bind one endpoint per transport kind (tcp, tls, ws, stats)
//! - Accept incoming stream connections under the broker's connection limit
//! - Run the mutual TLS handshake for secured listeners
//! - Hand established transports to the broker's sessions
//!
//! Binding happens at construction, so a handle always owns a live socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_rustls::TlsAcceptor;

use crate::broker::hook::ClientInfo;
use crate::broker::session::Sessions;
use crate::broker::Info;
use crate::http;
use crate::lifecycle::ShutdownSignal;
use crate::net::tls::SecurityContext;

/// Time allowed for a client to complete the TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Back-off after a failed accept (e.g. descriptor exhaustion).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accessor for the broker snapshot served by the diagnostics listener.
pub type InfoFn = Arc<dyn Fn() -> Info + Send + Sync>;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("listener '{name}' failed to bind {addr}: {source}")]
    Bind {
        name: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Listener stopped serving because of an unrecoverable fault.
    #[error("listener '{name}' failed: {message}")]
    Serve { name: String, message: String },
}

/// The four transports a listener can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Tcp,
    Tls,
    WebSocket,
    Stats,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Tls => "tls",
            TransportKind::WebSocket => "ws",
            TransportKind::Stats => "stats",
        };
        f.write_str(s)
    }
}

enum Transport {
    Tcp,
    Tls(SecurityContext),
    WebSocket,
    Stats(InfoFn),
}

/// Everything a listener needs from the broker while serving.
#[derive(Clone)]
pub struct ServeContext {
    pub sessions: Arc<Sessions>,
    pub shutdown: ShutdownSignal,
    /// Slots shared by all stream listeners (`max_connections`).
    pub permits: Arc<Semaphore>,
}

/// A bound network endpoint, registered into and owned by the broker.
pub struct ListenerHandle {
    name: String,
    local_addr: SocketAddr,
    inner: TcpListener,
    transport: Transport,
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl ListenerHandle {
    /// Plain stream listener.
    pub async fn tcp(name: impl Into<String>, addr: &str) -> Result<Self, ListenerError> {
        Self::bind(name.into(), addr, Transport::Tcp).await
    }

    /// Stream listener performing the mutual TLS handshake of `security`.
    pub async fn tls(
        name: impl Into<String>,
        addr: &str,
        security: SecurityContext,
    ) -> Result<Self, ListenerError> {
        Self::bind(name.into(), addr, Transport::Tls(security)).await
    }

    /// Web-socket listener (HTTP upgrade, no transport encryption).
    pub async fn websocket(name: impl Into<String>, addr: &str) -> Result<Self, ListenerError> {
        Self::bind(name.into(), addr, Transport::WebSocket).await
    }

    /// Diagnostics listener serving `info()` as JSON.
    pub async fn stats(
        name: impl Into<String>,
        addr: &str,
        info: InfoFn,
    ) -> Result<Self, ListenerError> {
        Self::bind(name.into(), addr, Transport::Stats(info)).await
    }

    async fn bind(name: String, addr: &str, transport: Transport) -> Result<Self, ListenerError> {
        let bind_err = |source: std::io::Error| ListenerError::Bind {
            name: name.clone(),
            addr: addr.to_string(),
            source,
        };

        let inner = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        let handle = Self {
            name,
            local_addr,
            inner,
            transport,
        };
        tracing::info!(
            listener = %handle.name,
            kind = %handle.kind(),
            address = %local_addr,
            "Listener bound"
        );
        Ok(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TransportKind {
        match self.transport {
            Transport::Tcp => TransportKind::Tcp,
            Transport::Tls(_) => TransportKind::Tls,
            Transport::WebSocket => TransportKind::WebSocket,
            Transport::Stats(_) => TransportKind::Stats,
        }
    }

    /// Address the socket is actually bound to (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The security context of a secured listener.
    pub fn security_context(&self) -> Option<&SecurityContext> {
        match &self.transport {
            Transport::Tls(security) => Some(security),
            _ => None,
        }
    }

    /// Serve until shutdown is signalled. Consumes the handle.
    pub async fn serve(self, ctx: ServeContext) -> Result<(), ListenerError> {
        let Self {
            name,
            local_addr,
            inner,
            transport,
        } = self;
        tracing::info!(listener = %name, address = %local_addr, "Listener serving");

        let result = match transport {
            Transport::Tcp => accept_streams(&name, TransportKind::Tcp, inner, None, ctx).await,
            Transport::Tls(security) => {
                let acceptor = security.acceptor();
                accept_streams(&name, TransportKind::Tls, inner, Some(acceptor), ctx).await
            }
            Transport::WebSocket => {
                let router = http::websocket::router(name.clone(), Arc::clone(&ctx.sessions));
                http::serve_router(inner, router, ctx.shutdown).await.map_err(|e| ListenerError::Serve {
                    name: name.clone(),
                    message: e.to_string(),
                })
            }
            Transport::Stats(info) => {
                let router = http::stats::router(info);
                http::serve_router(inner, router, ctx.shutdown).await.map_err(|e| ListenerError::Serve {
                    name: name.clone(),
                    message: e.to_string(),
                })
            }
        };

        tracing::info!(listener = %name, "Listener stopped");
        result
    }
}

/// Accept loop shared by the plain and TLS stream listeners.
async fn accept_streams(
    name: &str,
    transport: TransportKind,
    listener: TcpListener,
    acceptor: Option<TlsAcceptor>,
    ctx: ServeContext,
) -> Result<(), ListenerError> {
    let mut shutdown = ctx.shutdown.clone();
    loop {
        // Acquire a slot first (backpressure), then accept.
        let permit = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            permit = Arc::clone(&ctx.permits).acquire_owned() => permit.map_err(|_| ListenerError::Serve {
                name: name.to_string(),
                message: "connection limit closed".to_string(),
            })?,
        };

        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.recv() => return Ok(()),
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(listener = %name, error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            },
        };

        tracing::debug!(
            listener = %name,
            remote_addr = %remote_addr,
            available_permits = ctx.permits.available_permits(),
            "Connection accepted"
        );

        let client = ClientInfo {
            listener: name.to_string(),
            transport,
            remote_addr,
            peer_certificate: false,
        };
        let sessions = Arc::clone(&ctx.sessions);
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match acceptor {
                None => sessions.run_stream(client, stream).await,
                Some(acceptor) => secure_session(sessions, client, acceptor, stream).await,
            }
        });
    }
}

async fn secure_session(
    sessions: Arc<Sessions>,
    mut client: ClientInfo,
    acceptor: TlsAcceptor,
    stream: TcpStream,
) {
    let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await;
    let stream = match handshake {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            sessions.stats().handshake_failed();
            tracing::warn!(
                listener = %client.listener,
                remote_addr = %client.remote_addr,
                error = %e,
                "TLS handshake rejected"
            );
            return;
        }
        Err(_) => {
            sessions.stats().handshake_failed();
            tracing::warn!(
                listener = %client.listener,
                remote_addr = %client.remote_addr,
                "TLS handshake timed out"
            );
            return;
        }
    };

    client.peer_certificate = stream
        .get_ref()
        .1
        .peer_certificates()
        .is_some_and(|certs| !certs.is_empty());
    sessions.run_stream(client, stream).await;
}
