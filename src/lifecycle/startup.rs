//! Startup orchestration and the lifecycle state machine.
//!
//! # Responsibilities
//! - Build the TLS security context when the secured listener is enabled
//! - Construct the broker and register the hook
//! - Bind and register every enabled listener, in a fixed order
//! - Serve until the stop signal or a serve fault, then drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and nothing serves
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::sync::watch;

use crate::broker::{Broker, BrokerError, Hook, Info};
use crate::config::Config;
use crate::lifecycle::State;
use crate::net::listener::{InfoFn, ListenerError, ListenerHandle};
use crate::net::tls::{SecurityContext, TlsError};

/// Listener names, one per transport.
pub const TCP_LISTENER: &str = "t1";
pub const TLS_LISTENER: &str = "tls1";
pub const WS_LISTENER: &str = "ws1";
pub const STATS_LISTENER: &str = "stats";

/// Fatal errors surfaced by [`Lifecycle::run`].
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Bind(#[from] ListenerError),

    #[error("hook registration failed: {0}")]
    Hook(#[source] BrokerError),

    #[error("listener registration failed: {0}")]
    Register(#[source] BrokerError),

    #[error("broker stopped with a fault: {0}")]
    Serve(#[source] BrokerError),
}

/// Drives one broker from configuration to shutdown.
pub struct Lifecycle<B: Broker> {
    config: Config,
    broker: Arc<B>,
    hook: Arc<dyn Hook>,
    stop: BoxFuture<'static, ()>,
    state: watch::Sender<State>,
}

impl<B: Broker> Lifecycle<B> {
    /// Create the manager. The broker is constructed here from
    /// `config.options`; `stop` is the single cancellation trigger.
    pub fn new<F>(config: Config, hook: Arc<dyn Hook>, stop: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let broker = Arc::new(B::new(config.options.clone()));
        let (state, _) = watch::channel(State::Configuring);
        Self {
            config,
            broker,
            hook,
            stop: Box::pin(stop),
            state,
        }
    }

    /// The broker being managed.
    pub fn broker(&self) -> Arc<B> {
        Arc::clone(&self.broker)
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<State> {
        self.state.subscribe()
    }

    /// Run to completion. `Ok` means a graceful stop; an `Err` is either a
    /// startup abort (nothing was served) or a serve fault (after draining).
    pub async fn run(self) -> Result<(), BootstrapError> {
        let Self {
            config,
            broker,
            hook,
            stop,
            state,
        } = self;

        if let Err(e) = start(&config, &broker, hook, &state).await {
            state.send_replace(State::Aborted);
            tracing::error!(error = %e, "Startup aborted");
            return Err(e);
        }

        state.send_replace(State::Serving);
        let serving = Arc::clone(&broker);
        let mut serve_task = tokio::spawn(async move { serving.serve().await });

        let finished = tokio::select! {
            _ = stop => {
                tracing::warn!("caught signal, stopping...");
                None
            }
            joined = &mut serve_task => Some(flatten(joined)),
        };

        state.send_replace(State::Draining);
        match &finished {
            Some(Err(e)) => tracing::error!(error = %e, "Broker serve fault, stopping..."),
            Some(Ok(())) => tracing::warn!("Broker stopped serving, stopping..."),
            None => {}
        }

        if let Err(e) = broker.close().await {
            tracing::error!(error = %e, "Broker close failed");
        }

        let result = match finished {
            Some(result) => result,
            None => flatten(serve_task.await),
        };

        state.send_replace(State::Stopped);
        tracing::info!("Broker stopped");
        result.map_err(BootstrapError::Serve)
    }
}

/// Configuring and Registering phases.
async fn start<B: Broker>(
    config: &Config,
    broker: &Arc<B>,
    hook: Arc<dyn Hook>,
    state: &watch::Sender<State>,
) -> Result<(), BootstrapError> {
    let secured = match &config.tls {
        Some(tls) => Some((
            tls.addr.as_str(),
            SecurityContext::build(&tls.cert, &tls.key, &tls.ca)?,
        )),
        None => None,
    };

    broker.add_hook(hook, None).map_err(BootstrapError::Hook)?;
    state.send_replace(State::Registering);

    if let Some(addr) = &config.tcp_addr {
        register(broker, ListenerHandle::tcp(TCP_LISTENER, addr).await?)?;
    }
    if let Some((addr, security)) = secured {
        register(broker, ListenerHandle::tls(TLS_LISTENER, addr, security).await?)?;
    }
    if let Some(addr) = &config.ws_addr {
        register(broker, ListenerHandle::websocket(WS_LISTENER, addr).await?)?;
    }
    if let Some(addr) = &config.stats_addr {
        let info = info_fn(broker);
        register(broker, ListenerHandle::stats(STATS_LISTENER, addr, info).await?)?;
    }

    tracing::info!(listeners = config.enabled_listeners(), "Listeners registered");
    Ok(())
}

fn register<B: Broker>(broker: &Arc<B>, handle: ListenerHandle) -> Result<(), BootstrapError> {
    broker.add_listener(handle).map_err(BootstrapError::Register)
}

/// The broker owns the stats listener, so the accessor holds it weakly.
fn info_fn<B: Broker>(broker: &Arc<B>) -> InfoFn {
    let broker = Arc::downgrade(broker);
    Arc::new(move || broker.upgrade().map(|b| b.info()).unwrap_or_else(Info::default))
}

fn flatten(
    joined: Result<Result<(), BrokerError>, tokio::task::JoinError>,
) -> Result<(), BrokerError> {
    joined.map_err(|e| BrokerError::Serve(format!("serve task failed: {}", e)))?
}
