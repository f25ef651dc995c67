//! In-crate broker implementation.
//!
//! # Responsibilities
//! - Keep the name-keyed listener registry and the single hook
//! - Run one accept task per listener while serving
//! - Enforce the shared connection limit
//! - Drain sessions on close, bounded by `drain_timeout_secs`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Interval;

use super::hook::{Hook, HookConfig};
use super::info::{Info, Stats};
use super::options::Options;
use super::session::Sessions;
use super::{Broker, BrokerError};
use crate::lifecycle::Shutdown;
use crate::net::listener::{ListenerHandle, ServeContext};

/// Broker owning listeners, the hook, and connection accounting.
pub struct Server {
    options: Options,
    listeners: DashMap<String, ListenerHandle>,
    sessions: Arc<Sessions>,
    stats: Arc<Stats>,
    permits: Arc<Semaphore>,
    shutdown: Shutdown,
    serving: AtomicBool,
    closed: AtomicBool,
}

impl Server {
    /// Names of listeners registered and not yet serving.
    pub fn pending_listeners(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn info_ticker(&self) -> Option<Interval> {
        match self.options.info_interval_secs {
            0 => None,
            secs => {
                let mut ticker = tokio::time::interval(Duration::from_secs(secs));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                Some(ticker)
            }
        }
    }

    fn log_info(&self) {
        let info = self.stats.snapshot();
        tracing::debug!(
            uptime = info.uptime,
            clients_connected = info.clients_connected,
            clients_total = info.clients_total,
            bytes_received = info.bytes_received,
            messages_received = info.messages_received,
            "Broker info"
        );
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Broker for Server {
    fn new(options: Options) -> Self {
        let shutdown = Shutdown::new();
        let stats = Arc::new(Stats::new());
        let sessions = Arc::new(Sessions::new(
            Arc::clone(&stats),
            options.read_buffer_size,
            shutdown.subscribe(),
        ));
        let permits = Arc::new(Semaphore::new(
            options.max_connections.clamp(1, Semaphore::MAX_PERMITS),
        ));

        Self {
            options,
            listeners: DashMap::new(),
            sessions,
            stats,
            permits,
            shutdown,
            serving: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn add_hook(&self, hook: Arc<dyn Hook>, config: Option<&HookConfig>) -> Result<(), BrokerError> {
        let id = hook.id().to_string();
        if let Some(existing) = self.sessions.hook_id() {
            return Err(BrokerError::HookRejected {
                id,
                reason: format!("hook '{}' is already registered", existing),
            });
        }

        hook.init(config).map_err(|e| BrokerError::HookRejected {
            id: id.clone(),
            reason: e.to_string(),
        })?;

        self.sessions
            .set_hook(hook)
            .map_err(|_| BrokerError::HookRejected {
                id: id.clone(),
                reason: "a hook is already registered".to_string(),
            })?;

        tracing::info!(hook = %id, "Hook registered");
        Ok(())
    }

    fn add_listener(&self, handle: ListenerHandle) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Closed);
        }
        if self.serving.load(Ordering::SeqCst) {
            return Err(BrokerError::AlreadyServing);
        }

        match self.listeners.entry(handle.name().to_string()) {
            Entry::Occupied(entry) => Err(BrokerError::DuplicateListener(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::info!(
                    listener = %handle.name(),
                    kind = %handle.kind(),
                    address = %handle.local_addr(),
                    "Listener registered"
                );
                entry.insert(handle);
                self.stats.listener_added();
                Ok(())
            }
        }
    }

    async fn serve(&self) -> Result<(), BrokerError> {
        if self.serving.swap(true, Ordering::SeqCst) {
            return Err(BrokerError::AlreadyServing);
        }

        let mut shutdown = self.shutdown.subscribe();
        let mut tasks = JoinSet::new();
        for name in self.pending_listeners() {
            if let Some((_, handle)) = self.listeners.remove(&name) {
                let ctx = ServeContext {
                    sessions: Arc::clone(&self.sessions),
                    shutdown: self.shutdown.subscribe(),
                    permits: Arc::clone(&self.permits),
                };
                tasks.spawn(handle.serve(ctx));
            }
        }

        tracing::info!(listeners = tasks.len(), "Broker serving");

        let mut ticker = self.info_ticker();
        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => break Ok(()),
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => break Err(BrokerError::Serve(e.to_string())),
                    Err(e) => break Err(BrokerError::Serve(format!("listener task failed: {}", e))),
                },
                _ = tick(&mut ticker) => self.log_info(),
            }
        };

        if result.is_err() {
            tasks.abort_all();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Err(e)) = joined {
                tracing::warn!(error = %e, "Listener ended with error during shutdown");
            }
        }

        result
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!("Broker closing");
        self.shutdown.trigger();
        // Listeners that never served are dropped here, releasing their sockets.
        self.listeners.clear();

        let drain = Duration::from_secs(self.options.drain_timeout_secs);
        let tracker = self.stats.tracker();
        match tokio::time::timeout(drain, tracker.wait_idle()).await {
            Ok(()) => {
                tracing::info!("Broker closed");
                Ok(())
            }
            Err(_) => Err(BrokerError::Close(format!(
                "{} connection(s) still open after {}s",
                tracker.active_count(),
                drain.as_secs()
            ))),
        }
    }

    fn info(&self) -> Info {
        self.stats.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::hook::{Access, AllowHook, ClientInfo, HookError};
    use crate::net::listener::InfoFn;

    struct StrictHook;

    impl Hook for StrictHook {
        fn id(&self) -> &str {
            "strict"
        }
        fn init(&self, config: Option<&HookConfig>) -> Result<(), HookError> {
            match config {
                Some(_) => Ok(()),
                None => Err(HookError("configuration required".into())),
            }
        }
        fn authenticate(&self, _client: &ClientInfo) -> bool {
            true
        }
        fn authorize(&self, _client: &ClientInfo, _topic: &str, _access: Access) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn duplicate_names_are_rejected_across_kinds() {
        let server = Server::new(Options::default());
        let tcp = ListenerHandle::tcp("edge", "127.0.0.1:0").await.unwrap();
        let ws = ListenerHandle::websocket("edge", "127.0.0.1:0").await.unwrap();

        server.add_listener(tcp).unwrap();
        let err = server.add_listener(ws).unwrap_err();
        assert!(matches!(err, BrokerError::DuplicateListener(ref name) if name == "edge"));
        assert_eq!(server.pending_listeners(), vec!["edge".to_string()]);
        assert_eq!(server.info().listeners, 1);
    }

    #[tokio::test]
    async fn hook_rejected_on_bad_config() {
        let server = Server::new(Options::default());
        let err = server.add_hook(Arc::new(StrictHook), None).unwrap_err();
        assert!(matches!(err, BrokerError::HookRejected { ref id, .. } if id == "strict"));

        let config: HookConfig = toml::Value::Table(Default::default());
        server.add_hook(Arc::new(StrictHook), Some(&config)).unwrap();
    }

    #[tokio::test]
    async fn second_hook_is_rejected() {
        let server = Server::new(Options::default());
        server.add_hook(Arc::new(AllowHook), None).unwrap();
        let err = server.add_hook(Arc::new(AllowHook), None).unwrap_err();
        assert!(matches!(err, BrokerError::HookRejected { .. }));
    }

    #[tokio::test]
    async fn close_is_idempotent_without_serve() {
        let server = Server::new(Options::default());
        let handle = ListenerHandle::tcp("t1", "127.0.0.1:0").await.unwrap();
        server.add_listener(handle).unwrap();

        server.close().await.unwrap();
        assert!(server.is_closed());
        assert!(server.pending_listeners().is_empty());
        server.close().await.unwrap();

        let late = ListenerHandle::tcp("t2", "127.0.0.1:0").await.unwrap();
        assert!(matches!(server.add_listener(late), Err(BrokerError::Closed)));
    }

    #[tokio::test]
    async fn serve_blocks_until_close() {
        let server = Arc::new(Server::new(Options::default()));
        let info: InfoFn = Arc::new(Info::default);
        let handle = ListenerHandle::stats("stats", "127.0.0.1:0", info).await.unwrap();
        server.add_listener(handle).unwrap();

        let serving = Arc::clone(&server);
        let task = tokio::spawn(async move { serving.serve().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!task.is_finished());
        assert!(matches!(server.serve().await, Err(BrokerError::AlreadyServing)));

        let late = ListenerHandle::tcp("t1", "127.0.0.1:0").await.unwrap();
        assert!(matches!(server.add_listener(late), Err(BrokerError::AlreadyServing)));
        assert_eq!(server.info().listeners, 1);

        server.close().await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("serve should return after close")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn zero_limits_are_raised_to_one() {
        let server = Server::new(Options {
            max_connections: 0,
            read_buffer_size: 0,
            ..Options::default()
        });
        assert_eq!(server.permits.available_permits(), 1);
    }

    #[tokio::test]
    async fn info_is_available_before_serve_and_after_close() {
        let server = Server::new(Options::default());
        let before = server.info();
        assert_eq!(before.clients_connected, 0);
        assert_eq!(before.listeners, 0);

        server.close().await.unwrap();
        let after = server.info();
        assert_eq!(after.version, before.version);
    }
}
