//! Broker Configuration using Figment
//!
//! Configuration is layered, lowest precedence first:
//! 1. Built-in defaults
//! 2. `config/broker.toml` (or an explicit path), if present
//! 3. Legacy multiplexer variables (`TAI_MUX_EXEC_SCRIPT`,
//!    `TAI_MUX_STATIC_CONFIG_FILE`, `TAI_MUX_PLATFORM_ADAPTER`)
//! 4. Environment variables prefixed with `MODULE_BROKER_`, nested with `__`
//!    (e.g. `MODULE_BROKER_SERVER__PORT=50052`)
//!
//! # Example
//! ```no_run
//! use broker_core::config::BrokerConfig;
//!
//! let config = BrokerConfig::load()?;
//! println!("probe: {}", config.platform.probe_path.display());
//! # Ok::<(), broker_core::error::BrokerError>(())
//! ```

use crate::error::{BrokerError, BrokerResult};
use crate::types::AdapterKind;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Host the server binds and the client dials when nothing is configured.
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1";

/// Port the server binds and the client dials when nothing is configured.
pub const DEFAULT_SERVER_PORT: u16 = 50051;

/// Default location of the broker configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/broker.toml";

/// Default probe executable.
pub const DEFAULT_PROBE_PATH: &str = "/etc/tai/mux/exec.sh";

/// Default static location map.
pub const DEFAULT_STATIC_CONFIG: &str = "/etc/tai/mux/static.json";

const ENV_PREFIX: &str = "MODULE_BROKER_";
const MIN_PROBE_TIMEOUT_MS: u64 = 1_000;

/// Top-level broker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Discovery source settings
    pub platform: PlatformConfig,
    /// Registry policy
    pub registry: RegistryConfig,
    /// Backend table settings
    pub backends: BackendsConfig,
    /// gRPC endpoint settings
    pub server: ServerConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Discovery source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Which platform adapter to use (`exec` or `static`)
    pub adapter: AdapterKind,
    /// Probe executable invoked with `list` or `<location>`
    pub probe_path: PathBuf,
    /// Upper bound for a single probe invocation, in milliseconds
    pub probe_timeout_ms: u64,
    /// JSON file mapping location -> backend name (static adapter)
    pub static_config: PathBuf,
}

/// Registry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Allow more than one live session per location
    pub allow_multiple_sessions: bool,
    /// Require the location to appear in the most recent `list()` before `create()`
    pub require_fresh_listing: bool,
}

/// Backend table configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Serve backend names without a registered factory with the simulated backend
    pub simulate_unknown: bool,
    /// Artificial attach latency of the simulated backend, in milliseconds
    pub attach_latency_ms: u64,
}

/// gRPC server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub bind_address: IpAddr,
    /// Port to bind
    pub port: u16,
    /// How long in-flight requests may run after shutdown is requested, in milliseconds
    pub shutdown_grace_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (pretty, compact, json)
    pub format: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterKind::Exec,
            probe_path: PathBuf::from(DEFAULT_PROBE_PATH),
            probe_timeout_ms: 10_000,
            static_config: PathBuf::from(DEFAULT_STATIC_CONFIG),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            allow_multiple_sessions: false,
            require_fresh_listing: true,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            simulate_unknown: true,
            attach_latency_ms: 0,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_SERVER_PORT,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl PlatformConfig {
    /// Probe timeout as a [`Duration`].
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl BackendsConfig {
    /// Simulated attach latency as a [`Duration`].
    pub fn attach_latency(&self) -> Duration {
        Duration::from_millis(self.attach_latency_ms)
    }
}

impl ServerConfig {
    /// Socket the server binds.
    pub fn bind_socket(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Shutdown grace period as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl BrokerConfig {
    /// Load configuration from `config/broker.toml` and the environment.
    ///
    /// # Errors
    /// Returns [`BrokerError::Config`] if a source cannot be parsed or the
    /// result fails validation.
    pub fn load() -> BrokerResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BrokerResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(
                path = %path.display(),
                "broker config file not found (using defaults/env overrides)"
            );
        }

        let config: BrokerConfig = Self::figment(path).extract()?;
        config.validate().map_err(BrokerError::Config)?;
        Ok(config)
    }

    /// Figment with every provider merged, for callers that layer more on top.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(BrokerConfig::default()))
            .merge(Toml::file(path))
            .merge(
                Env::raw()
                    .only(&["TAI_MUX_EXEC_SCRIPT"])
                    .map(|_| "platform.probe_path".into()),
            )
            .merge(
                Env::raw()
                    .only(&["TAI_MUX_STATIC_CONFIG_FILE"])
                    .map(|_| "platform.static_config".into()),
            )
            .merge(
                Env::raw()
                    .only(&["TAI_MUX_PLATFORM_ADAPTER"])
                    .map(|_| "platform.adapter".into()),
            )
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid logging.level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid logging.format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.platform.probe_timeout_ms < MIN_PROBE_TIMEOUT_MS {
            return Err(format!(
                "platform.probe_timeout_ms {} is too short; probes may take seconds (minimum {})",
                self.platform.probe_timeout_ms, MIN_PROBE_TIMEOUT_MS
            ));
        }

        if self.server.port == 0 {
            return Err("server.port must be non-zero".to_string());
        }

        if self.server.shutdown_grace_ms == 0 {
            return Err("server.shutdown_grace_ms must be positive".to_string());
        }

        Ok(())
    }
}
