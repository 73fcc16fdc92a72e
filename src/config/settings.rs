use std::time::Duration;

use serde::Deserialize;

use crate::utils::backoff::RetryPolicy;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the upstream bus, the state store, and
/// the relay's retry behavior.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub bus: BusSettings,
    pub store: StoreSettings,
    pub relay: RelaySettings,
    pub log: LogSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Configuration settings for the upstream bus connection.
#[derive(Debug, Deserialize, Clone)]
pub struct BusSettings {
    pub url: String,
    pub connect_timeout_ms: u64,
}

/// Configuration settings for the state store.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    pub path: String,
}

/// Operational parameters for the relay: per-attempt timeout, retry cap and
/// backoff, and the reconciliation sweep interval.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub op_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_max_delay_ms: u64,
    pub reconcile_interval_secs: u64,
}

/// Logging settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub bus: Option<PartialBusSettings>,
    pub store: Option<PartialStoreSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub log: Option<PartialLogSettings>,
}

/// Partial server settings.
#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Partial bus settings.
#[derive(Debug, Deserialize)]
pub struct PartialBusSettings {
    pub url: Option<String>,
    pub connect_timeout_ms: Option<u64>,
}

/// Partial store settings.
#[derive(Debug, Deserialize)]
pub struct PartialStoreSettings {
    pub path: Option<String>,
}

/// Partial relay settings.
#[derive(Debug, Deserialize)]
pub struct PartialRelaySettings {
    pub op_timeout_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub retry_max_delay_ms: Option<u64>,
    pub reconcile_interval_secs: Option<u64>,
}

/// Partial logging settings.
#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            bus: BusSettings {
                url: "ws://127.0.0.1:9000".to_string(),
                connect_timeout_ms: 5000,
            },
            store: StoreSettings {
                path: "data/roomcast".to_string(),
            },
            relay: RelaySettings {
                op_timeout_ms: 2000,
                max_retries: 4,
                retry_base_ms: 100,
                retry_max_delay_ms: 2000,
                reconcile_interval_secs: 30,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Merge partially specified settings over the defaults.
    pub fn from_partial(partial: PartialSettings) -> Self {
        let default = Settings::default();

        Settings {
            server: ServerSettings {
                host: partial
                    .server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: partial
                    .server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            bus: BusSettings {
                url: partial
                    .bus
                    .as_ref()
                    .and_then(|b| b.url.clone())
                    .unwrap_or(default.bus.url),
                connect_timeout_ms: partial
                    .bus
                    .as_ref()
                    .and_then(|b| b.connect_timeout_ms)
                    .unwrap_or(default.bus.connect_timeout_ms),
            },
            store: StoreSettings {
                path: partial
                    .store
                    .as_ref()
                    .and_then(|s| s.path.clone())
                    .unwrap_or(default.store.path),
            },
            relay: RelaySettings {
                op_timeout_ms: partial
                    .relay
                    .as_ref()
                    .and_then(|r| r.op_timeout_ms)
                    .unwrap_or(default.relay.op_timeout_ms),
                max_retries: partial
                    .relay
                    .as_ref()
                    .and_then(|r| r.max_retries)
                    .unwrap_or(default.relay.max_retries),
                retry_base_ms: partial
                    .relay
                    .as_ref()
                    .and_then(|r| r.retry_base_ms)
                    .unwrap_or(default.relay.retry_base_ms),
                retry_max_delay_ms: partial
                    .relay
                    .as_ref()
                    .and_then(|r| r.retry_max_delay_ms)
                    .unwrap_or(default.relay.retry_max_delay_ms),
                reconcile_interval_secs: partial
                    .relay
                    .as_ref()
                    .and_then(|r| r.reconcile_interval_secs)
                    .unwrap_or(default.relay.reconcile_interval_secs),
            },
            log: LogSettings {
                level: partial
                    .log
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.log.level),
            },
        }
    }
}

impl RelaySettings {
    /// The retry policy applied to store and bus operations.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            op_timeout: Duration::from_millis(self.op_timeout_ms),
        }
    }
}
