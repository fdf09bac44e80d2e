//! Platform adapters: where locations and backend names come from.
//!
//! - [`ExecPlatform`] asks the external probe (the default).
//! - [`StaticPlatform`] reads a fixed `location -> backend` JSON map, for
//!   platforms whose slot population never changes.
//!
//! ```json
//! { "1": "libtai-a.so", "2": "libtai-b.so" }
//! ```

use crate::probe::ProbeInvoker;
use async_trait::async_trait;
use broker_core::config::PlatformConfig;
use broker_core::error::{BrokerError, BrokerResult};
use broker_core::types::{AdapterKind, BackendName, LocationKey};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// Discovery source consulted by the module registry.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// Which adapter this is.
    fn kind(&self) -> AdapterKind;

    /// Enumerate the locations currently present, in stable order.
    async fn enumerate(&self) -> BrokerResult<Vec<LocationKey>>;

    /// Resolve the backend library serving `location`.
    async fn resolve(&self, location: &LocationKey) -> BrokerResult<BackendName>;
}

/// Build the adapter selected by `platform.adapter`.
///
/// # Errors
/// Returns [`BrokerError::Config`] if the static map exists but is malformed.
pub fn build_platform(config: &PlatformConfig) -> BrokerResult<Arc<dyn PlatformAdapter>> {
    match config.adapter {
        AdapterKind::Exec => {
            tracing::info!(
                probe = %config.probe_path.display(),
                timeout = ?config.probe_timeout(),
                "using exec platform adapter"
            );
            Ok(Arc::new(ExecPlatform::new(ProbeInvoker::new(
                config.probe_path.clone(),
                config.probe_timeout(),
            ))))
        }
        AdapterKind::Static => {
            tracing::info!(
                map = %config.static_config.display(),
                "using static platform adapter"
            );
            Ok(Arc::new(StaticPlatform::from_file(&config.static_config)?))
        }
    }
}

// =============================================================================
// Exec Platform
// =============================================================================

/// Platform adapter backed by the external probe executable.
#[derive(Debug, Clone)]
pub struct ExecPlatform {
    probe: ProbeInvoker,
}

impl ExecPlatform {
    /// Wrap a probe invoker.
    pub fn new(probe: ProbeInvoker) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl PlatformAdapter for ExecPlatform {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Exec
    }

    async fn enumerate(&self) -> BrokerResult<Vec<LocationKey>> {
        Ok(self.probe.enumerate().await?)
    }

    async fn resolve(&self, location: &LocationKey) -> BrokerResult<BackendName> {
        Ok(self.probe.resolve(location).await?)
    }
}

// =============================================================================
// Static Platform
// =============================================================================

/// Platform adapter backed by a fixed location map.
#[derive(Debug, Clone, Default)]
pub struct StaticPlatform {
    entries: Vec<(LocationKey, BackendName)>,
}

impl StaticPlatform {
    /// Build from entries in the order they should be listed.
    pub fn new(entries: Vec<(LocationKey, BackendName)>) -> Self {
        Self { entries }
    }

    /// Load the JSON map at `path`.
    ///
    /// A missing file yields an empty platform.
    ///
    /// # Errors
    /// Returns [`BrokerError::Config`] if the file cannot be read or is not a
    /// JSON object of string values with valid location keys.
    pub fn from_file(path: &Path) -> BrokerResult<Self> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "static location map not found; no modules will be listed"
            );
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
            .map_err(|e| BrokerError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a JSON object `{ "<location>": "<backend>" }`.
    pub fn from_json(raw: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
        let object = value
            .as_object()
            .ok_or_else(|| "expected a JSON object of location -> backend".to_string())?;

        let mut entries = Vec::with_capacity(object.len());
        for (location, backend) in object {
            let location = LocationKey::parse(location)?;
            let backend = backend
                .as_str()
                .map(BackendName::new)
                .filter(|b| !b.is_empty())
                .ok_or_else(|| format!("backend for location '{}' must be a non-empty string", location))?;
            entries.push((location, backend));
        }
        Ok(Self { entries })
    }
}

#[async_trait]
impl PlatformAdapter for StaticPlatform {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Static
    }

    async fn enumerate(&self) -> BrokerResult<Vec<LocationKey>> {
        Ok(self.entries.iter().map(|(l, _)| l.clone()).collect())
    }

    async fn resolve(&self, location: &LocationKey) -> BrokerResult<BackendName> {
        self.entries
            .iter()
            .find(|(l, _)| l == location)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| BrokerError::UnknownLocation(location.clone()))
    }
}
