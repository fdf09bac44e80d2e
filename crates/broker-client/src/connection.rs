//! Broker address resolution and URL normalization.
//!
//! Addresses resolve in this order (highest priority first):
//! 1. An explicit `host:port` or `http://host:port` string
//! 2. `MODULE_BROKER_SERVER_ADDRESS` / `MODULE_BROKER_SERVER_PORT`
//! 3. [`DEFAULT_SERVER_ADDRESS`]:[`DEFAULT_SERVER_PORT`], shared with the server
//!
//! ```
//! use broker_client::ServerAddress;
//!
//! let addr: ServerAddress = "10.0.0.7:6000".parse()?;
//! assert_eq!(addr.uri(), "http://10.0.0.7:6000");
//!
//! let addr: ServerAddress = "http://[::1]".parse()?;
//! assert_eq!(addr.port, 50051);
//! # Ok::<(), broker_client::ClientError>(())
//! ```

use crate::error::{ClientError, Result};
pub use broker_core::config::{DEFAULT_SERVER_ADDRESS, DEFAULT_SERVER_PORT};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Environment variable overriding the broker host.
pub const ENV_SERVER_ADDRESS: &str = "MODULE_BROKER_SERVER_ADDRESS";

/// Environment variable overriding the broker port.
pub const ENV_SERVER_PORT: &str = "MODULE_BROKER_SERVER_PORT";

/// Host and port of a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_ADDRESS, DEFAULT_SERVER_PORT)
    }
}

impl ServerAddress {
    /// Address for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Defaults overridden by `MODULE_BROKER_SERVER_ADDRESS` and
    /// `MODULE_BROKER_SERVER_PORT`.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidAddress`] if the port is not a valid `u16`.
    pub fn from_env() -> Result<Self> {
        let mut addr = Self::default();
        if let Ok(host) = std::env::var(ENV_SERVER_ADDRESS) {
            if !host.trim().is_empty() {
                addr.host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var(ENV_SERVER_PORT) {
            addr.port = port.trim().parse().map_err(|_| {
                ClientError::InvalidAddress(format!("{}={} is not a port", ENV_SERVER_PORT, port))
            })?;
        }
        Ok(addr)
    }

    /// `http://` URI for the tonic endpoint.
    pub fn uri(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for ServerAddress {
    type Err = ClientError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ClientError::InvalidAddress("address cannot be empty".into()));
        }

        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("http://{input}")
        };
        let url = Url::parse(&with_scheme).map_err(|e| ClientError::InvalidAddress(e.to_string()))?;

        if url.scheme() != "http" {
            return Err(ClientError::InvalidAddress(format!(
                "unsupported scheme '{}' (use http)",
                url.scheme()
            )));
        }
        let host = match url.host() {
            Some(url::Host::Ipv6(ip)) => ip.to_string(),
            Some(host) => host.to_string(),
            None => return Err(ClientError::InvalidAddress("address must include a host".into())),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_SERVER_PORT),
        })
    }
}
