//! Backend lookup table and bundled backends.
//!
//! The table maps a resolved [`BackendName`] to a loaded [`Backend`]. Each
//! name is loaded at most once and the instance is shared by every session
//! using that library, the same way one vendor `.so` serves all of its slots.

pub mod simulated;

use broker_core::backend::{Backend, BackendFactory};
use broker_core::config::BackendsConfig;
use broker_core::error::{BackendError, BackendErrorKind, BrokerError, BrokerResult};
use broker_core::types::BackendName;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub use simulated::{SimulatedBackend, SimulatedFactory};

type LoadCell = Arc<OnceCell<Arc<dyn Backend>>>;

/// Runtime lookup table from backend name to backend instance.
#[derive(Default)]
pub struct BackendTable {
    factories: DashMap<BackendName, Arc<dyn BackendFactory>>,
    fallback: Option<Arc<dyn BackendFactory>>,
    loaded: DashMap<BackendName, LoadCell>,
}

impl BackendTable {
    /// Empty table with no fallback.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table configured from `[backends]`.
    ///
    /// With `simulate_unknown`, names without a registered factory are served
    /// by [`SimulatedBackend`].
    pub fn from_config(config: &BackendsConfig) -> Self {
        let table = Self::new();
        if config.simulate_unknown {
            table.with_fallback(Arc::new(SimulatedFactory::fallback(config.attach_latency())))
        } else {
            table
        }
    }

    /// Use `factory` for names that have no registered factory.
    pub fn with_fallback(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.fallback = Some(factory);
        self
    }

    /// Register a factory under its backend name, replacing any previous one.
    pub fn register_factory(&self, factory: Arc<dyn BackendFactory>) {
        let name = BackendName::new(factory.backend_name());
        tracing::info!(backend = %name, description = factory.description(), "registered backend factory");
        self.factories.insert(name, factory);
    }

    /// Shared backend instance for `name`, loading it on first use.
    ///
    /// Concurrent first users wait on one load.
    ///
    /// # Errors
    /// Returns a [`BackendError`] of kind `Unsupported` if no factory serves
    /// the name, or whatever the factory's load reports.
    pub async fn instance(&self, name: &BackendName) -> Result<Arc<dyn Backend>, BackendError> {
        let cell = self
            .loaded
            .entry(name.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let backend = cell
            .get_or_try_init(|| async {
                let factory = self.factory_for(name)?;
                tracing::info!(backend = %name, "loading backend");
                factory.load(name).await
            })
            .await?;
        Ok(backend.clone())
    }

    /// Names of backends loaded so far.
    pub fn loaded_backends(&self) -> Vec<BackendName> {
        let mut names: Vec<BackendName> = self
            .loaded
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Unload every loaded backend.
    ///
    /// # Errors
    /// Returns [`BrokerError::ShutdownFailed`] listing each backend that failed
    /// to unload; the others are still unloaded.
    pub async fn unload_all(&self) -> BrokerResult<()> {
        let cells: Vec<(BackendName, LoadCell)> = self
            .loaded
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.loaded.clear();

        let mut errors = Vec::new();
        for (name, cell) in cells {
            if let Some(backend) = cell.get() {
                tracing::info!(backend = %name, "unloading backend");
                if let Err(e) = backend.unload().await {
                    tracing::error!(backend = %name, error = %e, "backend unload failed");
                    errors.push(BrokerError::Backend(e));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::ShutdownFailed(errors))
        }
    }

    fn factory_for(&self, name: &BackendName) -> Result<Arc<dyn BackendFactory>, BackendError> {
        if let Some(factory) = self.factories.get(name) {
            return Ok(factory.value().clone());
        }
        self.fallback.clone().ok_or_else(|| {
            BackendError::new(
                name.as_str(),
                BackendErrorKind::Unsupported,
                "no backend factory registered for this library",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingFactory {
        loads: Arc<AtomicUsize>,
    }

    impl BackendFactory for CountingFactory {
        fn backend_name(&self) -> &str {
            "libtai-a.so"
        }

        fn description(&self) -> &'static str {
            "counting"
        }

        fn load(&self, name: &BackendName) -> BoxFuture<'static, Result<Arc<dyn Backend>, BackendError>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let name = name.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new(SimulatedBackend::new(name, Duration::ZERO)) as Arc<dyn Backend>)
            })
        }
    }

    #[tokio::test]
    async fn test_backend_loaded_once_per_name() {
        let loads = Arc::new(AtomicUsize::new(0));
        let table = BackendTable::new();
        table.register_factory(Arc::new(CountingFactory { loads: loads.clone() }));

        let name = BackendName::new("libtai-a.so");
        let (a, b) = tokio::join!(table.instance(&name), table.instance(&name));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(table.loaded_backends(), vec![name]);
    }

    #[tokio::test]
    async fn test_unknown_backend_without_fallback_is_unsupported() {
        let table = BackendTable::new();
        let err = match table.instance(&BackendName::new("libtai-x.so")).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert_eq!(err.kind, BackendErrorKind::Unsupported);
        assert!(table.loaded_backends().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_serves_any_name() {
        let table = BackendTable::from_config(&BackendsConfig::default());
        let backend = table.instance(&BackendName::new("libtai-q.so")).await.unwrap();
        assert_eq!(backend.name().as_str(), "libtai-q.so");

        table.unload_all().await.unwrap();
        assert!(table.loaded_backends().is_empty());
    }
}
