//! Authentication / authorization hook capability.

use std::net::SocketAddr;

use thiserror::Error;

use crate::net::listener::TransportKind;

/// Opaque hook configuration block.
pub type HookConfig = toml::Value;

/// Raised by [`Hook::init`] when the hook refuses its configuration.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HookError(pub String);

/// Access requested on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// What the broker knows about a connecting client before any traffic.
#[derive(Debug, Clone)]
pub struct ClientInfo {
    /// Name of the listener that accepted the connection.
    pub listener: String,
    pub transport: TransportKind,
    pub remote_addr: SocketAddr,
    /// A client certificate was presented and verified during the handshake.
    pub peer_certificate: bool,
}

/// Pluggable admission policy, registered once before serving.
pub trait Hook: Send + Sync + 'static {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Validate the hook configuration. Errors abort startup.
    fn init(&self, _config: Option<&HookConfig>) -> Result<(), HookError> {
        Ok(())
    }

    /// Decide whether a freshly established connection may proceed.
    fn authenticate(&self, client: &ClientInfo) -> bool;

    /// Decide whether a client may read or write a topic.
    fn authorize(&self, client: &ClientInfo, topic: &str, access: Access) -> bool;
}

/// Admits every client and allows every topic.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowHook;

impl Hook for AllowHook {
    fn id(&self) -> &str {
        "allow-all-auth"
    }

    fn authenticate(&self, _client: &ClientInfo) -> bool {
        true
    }

    fn authorize(&self, _client: &ClientInfo, _topic: &str, _access: Access) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_hook_allows_everything() {
        let client = ClientInfo {
            listener: "t1".into(),
            transport: TransportKind::Tcp,
            remote_addr: "127.0.0.1:5000".parse().unwrap(),
            peer_certificate: false,
        };
        let hook = AllowHook;
        assert!(hook.init(None).is_ok());
        assert!(hook.authenticate(&client));
        assert!(hook.authorize(&client, "a/b", Access::Write));
        assert!(hook.authorize(&client, "$SYS/broker", Access::Read));
    }
}
