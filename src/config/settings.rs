use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the server, the broker, storage, push delivery and
/// logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub storage: StorageSettings,
    pub push: PushSettings,
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

/// Configuration settings for the broker.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// Ack deadline given to subscriptions created without one.
    pub default_ack_deadline_secs: i64,
    /// Upper bound on `max_messages` accepted by a single pull request.
    pub max_messages_per_pull: usize,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

/// Which storage backend to open and where.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Database directory; only used by the sled backend.
    pub path: String,
}

/// HTTP client settings for push subscriptions.
#[derive(Debug, Deserialize, Clone)]
pub struct PushSettings {
    pub enabled: bool,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub storage: Option<PartialStorageSettings>,
    pub push: Option<PartialPushSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub default_ack_deadline_secs: Option<i64>,
    pub max_messages_per_pull: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialStorageSettings {
    pub backend: Option<StorageBackend>,
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPushSettings {
    pub enabled: Option<bool>,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let server = self.server;
        let broker = self.broker;
        let storage = self.storage;
        let push = self.push;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                default_ack_deadline_secs: broker
                    .as_ref()
                    .and_then(|b| b.default_ack_deadline_secs)
                    .unwrap_or(default.broker.default_ack_deadline_secs),
                max_messages_per_pull: broker
                    .as_ref()
                    .and_then(|b| b.max_messages_per_pull)
                    .unwrap_or(default.broker.max_messages_per_pull),
            },
            storage: StorageSettings {
                backend: storage
                    .as_ref()
                    .and_then(|s| s.backend)
                    .unwrap_or(default.storage.backend),
                path: storage
                    .as_ref()
                    .and_then(|s| s.path.clone())
                    .unwrap_or(default.storage.path),
            },
            push: PushSettings {
                enabled: push
                    .as_ref()
                    .and_then(|p| p.enabled)
                    .unwrap_or(default.push.enabled),
                connect_timeout_secs: push
                    .as_ref()
                    .and_then(|p| p.connect_timeout_secs)
                    .unwrap_or(default.push.connect_timeout_secs),
                timeout_secs: push
                    .as_ref()
                    .and_then(|p| p.timeout_secs)
                    .unwrap_or(default.push.timeout_secs),
            },
            log: LogSettings {
                level: log
                    .as_ref()
                    .and_then(|l| l.level.clone())
                    .unwrap_or(default.log.level),
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8085,
            },
            broker: BrokerSettings {
                default_ack_deadline_secs: 10,
                max_messages_per_pull: 1000,
            },
            storage: StorageSettings {
                backend: StorageBackend::Memory,
                path: "pullsub_db".to_string(),
            },
            push: PushSettings {
                enabled: true,
                connect_timeout_secs: 8,
                timeout_secs: 15,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
