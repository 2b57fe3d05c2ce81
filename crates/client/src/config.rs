//! Client configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use rentline_shared::ROOT_NAMESPACE;
use url::Url;

use crate::ws::ReconnectConfig;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000";
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Settings for the realtime connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// Base URL of the realtime server (http/https/ws/wss).
    pub endpoint: Url,
    /// Socket.IO namespace to connect to.
    pub namespace: String,
    /// Upper bound on a single handshake attempt.
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL"),
            namespace: ROOT_NAMESPACE.to_string(),
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl RealtimeConfig {
    /// Read the configuration from environment variables.
    ///
    /// Environment variables:
    /// - `RENTLINE_SOCKET_URL`: realtime server base URL (default: "http://localhost:5000")
    /// - `RENTLINE_SOCKET_NAMESPACE`: Socket.IO namespace (default: "/")
    /// - `RENTLINE_HANDSHAKE_TIMEOUT_MS`: handshake bound (default: 10000)
    /// - `RENTLINE_MAX_CONNECT_ATTEMPTS`: failed handshakes per cycle (default: 3)
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let endpoint = match std::env::var("RENTLINE_SOCKET_URL") {
            Ok(raw) => Url::parse(&raw).unwrap_or_else(|e| {
                crate::log_warn!("ignoring RENTLINE_SOCKET_URL={:?}: {}", raw, e);
                defaults.endpoint.clone()
            }),
            Err(_) => defaults.endpoint.clone(),
        };

        let namespace = namespace_or(
            std::env::var("RENTLINE_SOCKET_NAMESPACE").ok(),
            defaults.namespace,
        );

        let handshake_timeout = Duration::from_millis(env_or(
            "RENTLINE_HANDSHAKE_TIMEOUT_MS",
            DEFAULT_HANDSHAKE_TIMEOUT_MS,
        ));

        let reconnect = ReconnectConfig {
            max_attempts: env_or(
                "RENTLINE_MAX_CONNECT_ATTEMPTS",
                defaults.reconnect.max_attempts,
            ),
            ..defaults.reconnect
        };

        Self {
            endpoint,
            namespace,
            handshake_timeout,
            reconnect,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Namespaces must start with `/`.
fn namespace_or(raw: Option<String>, default: String) -> String {
    match raw {
        Some(ns) if ns.starts_with('/') => ns,
        Some(ns) => {
            crate::log_warn!(
                "ignoring RENTLINE_SOCKET_NAMESPACE={:?}: must start with '/', using {:?}",
                ns,
                default
            );
            default
        }
        None => default,
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            crate::log_warn!("ignoring {}={:?}, using {:?}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
