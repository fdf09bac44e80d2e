//! Simulated Vendor Backend
//!
//! Stands in for a vendor transponder library when none is available, so the
//! broker can be exercised end to end without hardware. All waiting uses
//! `tokio::time::sleep`, never a blocking sleep.
//!
//! # Behaviour
//!
//! - `attach` waits the configured latency, then allocates a handle from the
//!   backend's own counter (the vendor's "real oid")
//! - `detach` of an unknown handle fails with `InvalidHandle`
//! - `unload` drops every handle still attached

use async_trait::async_trait;
use broker_core::backend::{Backend, BackendFactory};
use broker_core::error::{BackendError, BackendErrorKind};
use broker_core::types::{BackendHandle, BackendName, LocationKey};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// SimulatedBackend
// =============================================================================

/// In-process backend with configurable attach latency.
///
/// # Example
///
/// ```rust,ignore
/// let backend = SimulatedBackend::new(BackendName::new("libtai-a.so"), Duration::ZERO);
/// let handle = backend.attach(&LocationKey::parse("1")?).await?;
/// backend.detach(handle).await?;
/// ```
pub struct SimulatedBackend {
    name: BackendName,
    attach_latency: Duration,
    next_handle: AtomicU64,
    attached: DashMap<u64, LocationKey>,
}

impl SimulatedBackend {
    /// Create a simulated backend named `name`.
    pub fn new(name: BackendName, attach_latency: Duration) -> Self {
        Self {
            name,
            attach_latency,
            next_handle: AtomicU64::new(1),
            attached: DashMap::new(),
        }
    }

    /// Number of handles currently attached.
    pub fn attached_count(&self) -> usize {
        self.attached.len()
    }
}

#[async_trait]
impl Backend for SimulatedBackend {
    fn name(&self) -> &BackendName {
        &self.name
    }

    async fn attach(&self, location: &LocationKey) -> Result<BackendHandle, BackendError> {
        if !self.attach_latency.is_zero() {
            tokio::time::sleep(self.attach_latency).await;
        }
        // Nothing is recorded before the last await, so a dropped attach leaves no trace.
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.attached.insert(id, location.clone());
        tracing::debug!(backend = %self.name, %location, handle = id, "simulated attach");
        Ok(BackendHandle { id })
    }

    async fn detach(&self, handle: BackendHandle) -> Result<(), BackendError> {
        match self.attached.remove(&handle.id) {
            Some((_, location)) => {
                tracing::debug!(backend = %self.name, %location, handle = handle.id, "simulated detach");
                Ok(())
            }
            None => Err(BackendError::new(
                self.name.as_str(),
                BackendErrorKind::InvalidHandle,
                format!("handle {} is not attached", handle.id),
            )),
        }
    }

    async fn unload(&self) -> Result<(), BackendError> {
        let leftover = self.attached.len();
        if leftover > 0 {
            tracing::warn!(backend = %self.name, leftover, "unloading with handles still attached");
        }
        self.attached.clear();
        Ok(())
    }
}

// =============================================================================
// SimulatedFactory
// =============================================================================

/// Factory producing [`SimulatedBackend`] instances.
///
/// Registered either under a fixed backend name or as the backend table's
/// fallback, in which case it serves whatever name it is asked for.
#[derive(Debug, Clone)]
pub struct SimulatedFactory {
    backend_name: String,
    attach_latency: Duration,
}

impl SimulatedFactory {
    /// Factory serving `backend_name`.
    pub fn new(backend_name: impl Into<String>, attach_latency: Duration) -> Self {
        Self {
            backend_name: backend_name.into(),
            attach_latency,
        }
    }

    /// Factory intended as a fallback for any backend name.
    pub fn fallback(attach_latency: Duration) -> Self {
        Self::new("*", attach_latency)
    }
}

impl BackendFactory for SimulatedFactory {
    fn backend_name(&self) -> &str {
        &self.backend_name
    }

    fn description(&self) -> &'static str {
        "Simulated transponder backend"
    }

    fn load(&self, name: &BackendName) -> BoxFuture<'static, Result<Arc<dyn Backend>, BackendError>> {
        let backend: Arc<dyn Backend> =
            Arc::new(SimulatedBackend::new(name.clone(), self.attach_latency));
        Box::pin(async move { Ok(backend) })
    }
}
