//! Broker facade.
//!
//! # Data Flow
//! ```text
//! Broker::new(options)
//!     → add_hook (exactly one, before serving)
//!     → add_listener (one per enabled transport, unique names)
//!     → serve (blocks; per-listener accept tasks → session.rs)
//!     → close (idempotent; stops listeners, drains sessions)
//!
//! info() may be called at any point of the above.
//! ```
//!
//! [`Broker`] is the capability the lifecycle manager drives; [`Server`] is
//! the in-crate implementation.

pub mod hook;
pub mod info;
pub mod options;
pub mod server;
pub mod session;

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::net::listener::ListenerHandle;

pub use hook::{AllowHook, Hook, HookConfig};
pub use info::Info;
pub use options::Options;
pub use server::Server;

/// Errors returned by broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A listener with the same name is already registered.
    #[error("listener '{0}' is already registered")]
    DuplicateListener(String),

    /// The hook refused its configuration, or a hook is already registered.
    #[error("hook '{id}' rejected: {reason}")]
    HookRejected { id: String, reason: String },

    /// `serve` was already called.
    #[error("broker is already serving")]
    AlreadyServing,

    /// Registration after the broker was closed.
    #[error("broker is closed")]
    Closed,

    /// Unrecoverable fault in the accept loop.
    #[error("serve fault: {0}")]
    Serve(String),

    /// Shutdown did not complete cleanly.
    #[error("close failed: {0}")]
    Close(String),
}

/// The broker capability consumed by the lifecycle manager.
///
/// Every method takes `&self`: the broker is shared as `Arc<B>` between the
/// serve task and the shutdown path, and `close` must be safe to call while
/// `serve` is running.
pub trait Broker: Send + Sync + 'static {
    /// Pure construction, no I/O.
    fn new(options: Options) -> Self
    where
        Self: Sized;

    /// Register the authentication/authorization hook.
    fn add_hook(&self, hook: Arc<dyn Hook>, config: Option<&HookConfig>) -> Result<(), BrokerError>;

    /// Register a bound listener.
    fn add_listener(&self, handle: ListenerHandle) -> Result<(), BrokerError>;

    /// Serve every registered listener until `close` or a fault.
    fn serve(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Stop listeners and connections. A second call is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Statistics snapshot.
    fn info(&self) -> Info;
}
