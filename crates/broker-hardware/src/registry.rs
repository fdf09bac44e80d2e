//! Module Registry
//!
//! Central table of live module sessions. The registry owns three maps and no
//! global lock:
//!
//! ```text
//! ┌──────────────────────────── ModuleRegistry ────────────────────────────┐
//! │  descriptors: LocationKey -> OnceCell<BackendName>   (resolution cache) │
//! │  locks:       LocationKey -> Mutex<()>               (per-location)     │
//! │  sessions:    Oid         -> Session                 (live sessions)    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  PlatformAdapter (probe / static map)    BackendTable (shared backends) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Operations on the same location are linearized by that location's mutex.
//! Operations on different locations run fully in parallel. DashMap guards are
//! never held across an `.await`.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let registry = ModuleRegistry::from_config(&BrokerConfig::load()?)?;
//!
//! let modules = registry.list().await?;
//! for module in modules.iter() {
//!     let session = registry.create(module.location.clone()).await?;
//!     println!("{} -> {} ({})", module.location, session.oid, session.backend);
//! }
//!
//! registry.shutdown().await?;
//! ```

use crate::backends::BackendTable;
use crate::platform::{build_platform, PlatformAdapter};
use broker_core::backend::Backend;
use broker_core::config::{BrokerConfig, RegistryConfig};
use broker_core::error::{BrokerError, BrokerResult};
use broker_core::types::{
    AdapterKind, BackendHandle, BackendName, LocationKey, ModuleDescriptor, ModuleInfo, ModuleMap,
    Oid, SessionInfo,
};
use chrono::Utc;
use dashmap::DashMap;
use futures::future::try_join_all;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::instrument;

/// A live session: public snapshot plus the backend that owns its handle.
struct Session {
    info: SessionInfo,
    backend: Arc<dyn Backend>,
}

// =============================================================================
// Attach Guard
// =============================================================================

/// Owns a freshly attached handle until the session is committed.
///
/// Dropped uncommitted, it detaches the handle on a background task so no
/// backend object outlives a create that never registered it.
struct AttachGuard {
    backend: Arc<dyn Backend>,
    handle: BackendHandle,
    armed: bool,
}

impl AttachGuard {
    fn new(backend: Arc<dyn Backend>, handle: BackendHandle) -> Self {
        Self {
            backend,
            handle,
            armed: true,
        }
    }

    /// Hand the backend over to the session, disarming the rollback.
    fn commit(mut self) -> Arc<dyn Backend> {
        self.armed = false;
        self.backend.clone()
    }

    /// Detach the handle now. If this future is dropped before the backend
    /// answers, the guard is still armed and `Drop` retries in the background.
    async fn rollback(mut self) {
        if let Err(e) = self.backend.detach(self.handle).await {
            tracing::error!(error = %e, "rollback detach failed");
        }
        self.armed = false;
    }
}

impl Drop for AttachGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let backend = self.backend.clone();
        let handle = self.handle;
        tracing::warn!(backend = %backend.name(), handle = handle.id, "rolling back uncommitted attach");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = backend.detach(handle).await {
                        tracing::error!(error = %e, "rollback detach failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(handle = handle.id, "no runtime available; attached handle leaked");
            }
        }
    }
}

// =============================================================================
// ModuleRegistry
// =============================================================================

/// Registry of module sessions, keyed by broker [`Oid`].
pub struct ModuleRegistry {
    platform: Arc<dyn PlatformAdapter>,
    backends: Arc<BackendTable>,
    policy: RegistryConfig,
    sessions: DashMap<Oid, Session>,
    descriptors: DashMap<LocationKey, Arc<OnceCell<BackendName>>>,
    locks: DashMap<LocationKey, Arc<Mutex<()>>>,
    last_listing: RwLock<Option<HashSet<LocationKey>>>,
    next_oid: AtomicU64,
    closed: AtomicBool,
}

impl ModuleRegistry {
    /// Create a registry over an explicit platform and backend table.
    pub fn new(
        platform: Arc<dyn PlatformAdapter>,
        backends: Arc<BackendTable>,
        policy: RegistryConfig,
    ) -> Self {
        Self {
            platform,
            backends,
            policy,
            sessions: DashMap::new(),
            descriptors: DashMap::new(),
            locks: DashMap::new(),
            last_listing: RwLock::new(None),
            next_oid: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Build the platform adapter and backend table described by `config`.
    ///
    /// # Errors
    /// Returns [`BrokerError::Config`] if the platform cannot be built.
    pub fn from_config(config: &BrokerConfig) -> BrokerResult<Self> {
        let platform = build_platform(&config.platform)?;
        let backends = Arc::new(BackendTable::from_config(&config.backends));
        Ok(Self::new(platform, backends, config.registry.clone()))
    }

    /// Discovery source in use.
    pub fn adapter_kind(&self) -> AdapterKind {
        self.platform.kind()
    }

    /// Backend table shared by all sessions.
    pub fn backends(&self) -> &Arc<BackendTable> {
        &self.backends
    }

    /// Enumerate locations and resolve each one's backend.
    ///
    /// Resolutions run concurrently and go through the resolution cache, so a
    /// location is asked about at most once until [`reset_discovery`] is called.
    /// The freshness set used by [`create`] is only replaced after every
    /// resolution has succeeded.
    ///
    /// [`reset_discovery`]: Self::reset_discovery
    /// [`create`]: Self::create
    ///
    /// # Errors
    /// Returns [`BrokerError::Probe`] if enumeration or any resolution fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> BrokerResult<ModuleMap> {
        let locations = self.platform.enumerate().await?;

        let backends = try_join_all(locations.iter().map(|l| self.resolve_backend(l))).await?;

        let entries: Vec<ModuleDescriptor> = locations
            .into_iter()
            .zip(backends)
            .map(|(location, backend)| ModuleDescriptor { location, backend })
            .collect();

        let listed = entries.iter().map(|d| d.location.clone()).collect();
        *self.last_listing.write() = Some(listed);

        tracing::info!(count = entries.len(), "listed modules");
        Ok(ModuleMap::new(entries))
    }

    /// Create a session for `location`.
    ///
    /// # Errors
    /// - [`BrokerError::UnknownLocation`] if the location was not in the last listing
    /// - [`BrokerError::LocationBusy`] if single-session policy is in force and
    ///   the location already has a session
    /// - [`BrokerError::Probe`] if resolving the backend fails
    /// - [`BrokerError::Backend`] if loading or attaching fails; no session is left behind
    /// - [`BrokerError::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun;
    ///   a handle attached in the meantime is detached again
    #[instrument(skip(self), fields(location = %location))]
    pub async fn create(&self, location: LocationKey) -> BrokerResult<SessionInfo> {
        self.ensure_open()?;
        if self.policy.require_fresh_listing && !self.was_listed(&location) {
            return Err(BrokerError::UnknownLocation(location));
        }

        let lock = self.location_lock(&location);
        let _held = lock.lock().await;
        self.ensure_open()?;

        if !self.policy.allow_multiple_sessions {
            if let Some(oid) = self.session_at(&location) {
                return Err(BrokerError::LocationBusy { location, oid });
            }
        }

        let backend_name = self.resolve_backend(&location).await?;
        let backend = self.backends.instance(&backend_name).await?;

        let oid = Oid::new(self.next_oid.fetch_add(1, Ordering::Relaxed));
        let handle = backend.attach(&location).await.map_err(|e| {
            tracing::warn!(%oid, error = %e, "attach failed");
            BrokerError::Backend(e)
        })?;

        let guard = AttachGuard::new(backend, handle);
        if self.is_closed() {
            guard.rollback().await;
            tracing::warn!(%oid, "shutdown began during attach; handle released");
            return Err(BrokerError::ShuttingDown);
        }

        // Shutdown drains the location locks, so it cannot pass us between
        // the check above and the insert.
        let info = SessionInfo {
            oid,
            location,
            backend: backend_name,
            backend_handle: handle,
            created_at: Utc::now(),
        };
        self.sessions.insert(
            oid,
            Session {
                info: info.clone(),
                backend: guard.commit(),
            },
        );

        tracing::info!(%oid, backend = %info.backend, handle = handle.id, "module session created");
        Ok(info)
    }

    /// Remove the session `oid`, detaching it from its backend.
    ///
    /// # Errors
    /// - [`BrokerError::UnknownOid`] if no live session holds `oid`
    /// - [`BrokerError::Backend`] if detach fails; the session stays registered
    #[instrument(skip(self), fields(oid = %oid))]
    pub async fn remove(&self, oid: Oid) -> BrokerResult<()> {
        let location = self
            .sessions
            .get(&oid)
            .map(|s| s.info.location.clone())
            .ok_or(BrokerError::UnknownOid(oid))?;

        let lock = self.location_lock(&location);
        let _held = lock.lock().await;

        let (backend, handle) = match self.sessions.get(&oid) {
            Some(s) => (s.backend.clone(), s.info.backend_handle),
            None => return Err(BrokerError::UnknownOid(oid)),
        };

        backend.detach(handle).await.map_err(|e| {
            tracing::warn!(error = %e, "detach failed; session kept");
            BrokerError::Backend(e)
        })?;

        self.sessions.remove(&oid);
        tracing::info!(%location, "module session removed");
        Ok(())
    }

    /// Snapshot of the session `oid`.
    ///
    /// # Errors
    /// Returns [`BrokerError::UnknownOid`] if no live session holds `oid`.
    pub fn get_session(&self, oid: Oid) -> BrokerResult<SessionInfo> {
        self.sessions
            .get(&oid)
            .map(|s| s.info.clone())
            .ok_or(BrokerError::UnknownOid(oid))
    }

    /// Session snapshot plus the adapter that discovered it.
    ///
    /// # Errors
    /// Returns [`BrokerError::UnknownOid`] if no live session holds `oid`.
    pub fn module_info(&self, oid: Oid) -> BrokerResult<ModuleInfo> {
        Ok(ModuleInfo {
            session: self.get_session(oid)?,
            adapter: self.adapter_kind(),
        })
    }

    /// All live sessions, ordered by oid.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> =
            self.sessions.iter().map(|s| s.info.clone()).collect();
        sessions.sort_by_key(|s| s.oid);
        sessions
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Forget every cached resolution and the last listing.
    ///
    /// Live sessions are untouched. The next [`list`](Self::list) asks the
    /// platform again for every location.
    pub fn reset_discovery(&self) {
        self.descriptors.clear();
        *self.last_listing.write() = None;
        tracing::info!("discovery state reset");
    }

    /// Remove every session and unload all backends.
    ///
    /// New creates are refused from the moment this is called. Creates already
    /// holding a location lock are waited for; they either commit before the
    /// sessions are released or roll their attach back.
    ///
    /// The registry is empty afterwards even if some detaches failed.
    ///
    /// # Errors
    /// Returns [`BrokerError::ShutdownFailed`] with every failure encountered.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> BrokerResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let in_flight: Vec<Arc<Mutex<()>>> =
            self.locks.iter().map(|entry| entry.value().clone()).collect();
        for lock in in_flight {
            drop(lock.lock().await);
        }

        let mut oids: Vec<Oid> = self.sessions.iter().map(|s| *s.key()).collect();
        oids.sort();
        tracing::info!(sessions = oids.len(), "shutting down module registry");

        let mut errors = Vec::new();
        for oid in oids {
            match self.remove(oid).await {
                Ok(()) | Err(BrokerError::UnknownOid(_)) => {}
                Err(e) => {
                    tracing::error!(%oid, error = %e, "failed to release session");
                    errors.push(e);
                }
            }
        }
        self.sessions.clear();
        self.reset_discovery();

        match self.backends.unload_all().await {
            Ok(()) => {}
            Err(BrokerError::ShutdownFailed(unload)) => errors.extend(unload),
            Err(e) => errors.push(e),
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BrokerError::ShutdownFailed(errors))
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn resolve_backend(&self, location: &LocationKey) -> BrokerResult<BackendName> {
        let cell = self
            .descriptors
            .entry(location.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let name = cell
            .get_or_try_init(|| async {
                let name = self.platform.resolve(location).await?;
                tracing::debug!(%location, backend = %name, "resolved backend");
                Ok::<_, BrokerError>(name)
            })
            .await?;
        Ok(name.clone())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> BrokerResult<()> {
        if self.is_closed() {
            Err(BrokerError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn location_lock(&self, location: &LocationKey) -> Arc<Mutex<()>> {
        self.locks
            .entry(location.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn was_listed(&self, location: &LocationKey) -> bool {
        self.last_listing
            .read()
            .as_ref()
            .is_some_and(|listed| listed.contains(location))
    }

    fn session_at(&self, location: &LocationKey) -> Option<Oid> {
        self.sessions
            .iter()
            .find(|s| &s.info.location == location)
            .map(|s| *s.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SimulatedFactory;
    use crate::platform::StaticPlatform;
    use async_trait::async_trait;
    use broker_core::backend::BackendFactory;
    use broker_core::config::BackendsConfig;
    use broker_core::error::{BackendError, BackendErrorKind};
    use futures::future::BoxFuture;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn key(raw: &str) -> LocationKey {
        LocationKey::parse(raw).unwrap()
    }

    fn static_platform(count: usize) -> Arc<dyn PlatformAdapter> {
        let entries = (1..=count)
            .map(|i| (key(&i.to_string()), BackendName::new("libtai-a.so")))
            .collect();
        Arc::new(StaticPlatform::new(entries))
    }

    fn registry_with(platform: Arc<dyn PlatformAdapter>, policy: RegistryConfig) -> ModuleRegistry {
        let backends = Arc::new(BackendTable::from_config(&BackendsConfig::default()));
        ModuleRegistry::new(platform, backends, policy)
    }

    /// Platform that counts resolve calls.
    struct CountingPlatform {
        inner: StaticPlatform,
        resolves: AtomicUsize,
    }

    #[async_trait]
    impl PlatformAdapter for CountingPlatform {
        fn kind(&self) -> AdapterKind {
            AdapterKind::Static
        }

        async fn enumerate(&self) -> BrokerResult<Vec<LocationKey>> {
            self.inner.enumerate().await
        }

        async fn resolve(&self, location: &LocationKey) -> BrokerResult<BackendName> {
            self.resolves.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(location).await
        }
    }

    /// Backend whose attach or detach can be made to fail.
    struct FaultyBackend {
        name: BackendName,
        fail_attach: bool,
        fail_detach: bool,
    }

    #[async_trait]
    impl Backend for FaultyBackend {
        fn name(&self) -> &BackendName {
            &self.name
        }

        async fn attach(&self, _location: &LocationKey) -> Result<BackendHandle, BackendError> {
            if self.fail_attach {
                return Err(BackendError::new(
                    self.name.as_str(),
                    BackendErrorKind::Attach,
                    "module did not respond",
                ));
            }
            Ok(BackendHandle { id: 42 })
        }

        async fn detach(&self, _handle: BackendHandle) -> Result<(), BackendError> {
            if self.fail_detach {
                return Err(BackendError::new(
                    self.name.as_str(),
                    BackendErrorKind::Detach,
                    "module busy",
                ));
            }
            Ok(())
        }
    }

    struct FaultyFactory {
        fail_attach: bool,
        fail_detach: bool,
    }

    impl BackendFactory for FaultyFactory {
        fn backend_name(&self) -> &str {
            "libtai-a.so"
        }

        fn description(&self) -> &'static str {
            "faulty"
        }

        fn load(&self, name: &BackendName) -> BoxFuture<'static, Result<Arc<dyn Backend>, BackendError>> {
            let backend: Arc<dyn Backend> = Arc::new(FaultyBackend {
                name: name.clone(),
                fail_attach: self.fail_attach,
                fail_detach: self.fail_detach,
            });
            Box::pin(async move { Ok(backend) })
        }
    }

    fn faulty_registry(fail_attach: bool, fail_detach: bool) -> ModuleRegistry {
        let backends = BackendTable::new();
        backends.register_factory(Arc::new(FaultyFactory {
            fail_attach,
            fail_detach,
        }));
        ModuleRegistry::new(static_platform(2), Arc::new(backends), RegistryConfig::default())
    }

    #[tokio::test]
    async fn test_list_then_create_and_remove() {
        let registry = registry_with(static_platform(3), RegistryConfig::default());

        let modules = registry.list().await.unwrap();
        assert_eq!(modules.len(), 3);

        let session = registry.create(key("2")).await.unwrap();
        assert_eq!(session.backend.as_str(), "libtai-a.so");
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.get_session(session.oid).unwrap(), session);

        registry.remove(session.oid).await.unwrap();
        assert_eq!(registry.session_count(), 0);
        assert!(matches!(
            registry.remove(session.oid).await,
            Err(BrokerError::UnknownOid(_))
        ));
    }

    #[tokio::test]
    async fn test_create_requires_listing() {
        let registry = registry_with(static_platform(3), RegistryConfig::default());

        let err = registry.create(key("1")).await.unwrap_err();
        assert!(matches!(err, BrokerError::UnknownLocation(_)));

        registry.list().await.unwrap();
        let err = registry.create(key("9")).await.unwrap_err();
        assert!(matches!(err, BrokerError::UnknownLocation(_)));
    }

    #[tokio::test]
    async fn test_on_demand_resolution_when_freshness_disabled() {
        let policy = RegistryConfig {
            require_fresh_listing: false,
            ..RegistryConfig::default()
        };
        let registry = registry_with(static_platform(3), policy);

        let session = registry.create(key("3")).await.unwrap();
        assert_eq!(session.location, key("3"));

        let err = registry.create(key("9")).await.unwrap_err();
        assert!(matches!(err, BrokerError::UnknownLocation(_)));
    }

    #[tokio::test]
    async fn test_single_session_policy() {
        let registry = registry_with(static_platform(2), RegistryConfig::default());
        registry.list().await.unwrap();

        let first = registry.create(key("1")).await.unwrap();
        match registry.create(key("1")).await {
            Err(BrokerError::LocationBusy { oid, .. }) => assert_eq!(oid, first.oid),
            other => panic!("expected LocationBusy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_sessions_when_allowed() {
        let policy = RegistryConfig {
            allow_multiple_sessions: true,
            ..RegistryConfig::default()
        };
        let registry = registry_with(static_platform(1), policy);
        registry.list().await.unwrap();

        let a = registry.create(key("1")).await.unwrap();
        let b = registry.create(key("1")).await.unwrap();
        assert_ne!(a.oid, b.oid);
        assert_ne!(a.backend_handle, b.backend_handle);
        assert_eq!(registry.sessions().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_attach_leaves_no_session() {
        let registry = faulty_registry(true, false);
        registry.list().await.unwrap();

        let err = registry.create(key("1")).await.unwrap_err();
        assert!(matches!(err, BrokerError::Backend(ref e) if e.kind == BackendErrorKind::Attach));
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_detach_keeps_session() {
        let registry = faulty_registry(false, true);
        registry.list().await.unwrap();

        let session = registry.create(key("1")).await.unwrap();
        let err = registry.remove(session.oid).await.unwrap_err();
        assert!(matches!(err, BrokerError::Backend(_)));
        assert!(registry.get_session(session.oid).is_ok());

        let err = registry.shutdown().await.unwrap_err();
        assert!(matches!(err, BrokerError::ShutdownFailed(ref errors) if errors.len() == 1));
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_create_leaves_no_session() {
        let backends = BackendTable::new().with_fallback(Arc::new(SimulatedFactory::fallback(
            Duration::from_secs(2),
        )));
        let registry = ModuleRegistry::new(
            static_platform(1),
            Arc::new(backends),
            RegistryConfig::default(),
        );
        registry.list().await.unwrap();

        let attempt = tokio::time::timeout(Duration::from_millis(100), registry.create(key("1"))).await;
        assert!(attempt.is_err());
        assert_eq!(registry.session_count(), 0);

        // The location lock was released with the cancelled future.
        let session = registry.create(key("1")).await.unwrap();
        assert_eq!(session.oid.get(), 2);
    }

    /// Backend with a slow attach that counts live handles.
    struct SlowBackend {
        name: BackendName,
        latency: Duration,
        attached: AtomicUsize,
    }

    #[async_trait]
    impl Backend for SlowBackend {
        fn name(&self) -> &BackendName {
            &self.name
        }

        async fn attach(&self, _location: &LocationKey) -> Result<BackendHandle, BackendError> {
            tokio::time::sleep(self.latency).await;
            let id = self.attached.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok(BackendHandle { id })
        }

        async fn detach(&self, _handle: BackendHandle) -> Result<(), BackendError> {
            self.attached.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct SharedFactory(Arc<SlowBackend>);

    impl BackendFactory for SharedFactory {
        fn backend_name(&self) -> &str {
            "libtai-a.so"
        }

        fn description(&self) -> &'static str {
            "slow"
        }

        fn load(&self, _name: &BackendName) -> BoxFuture<'static, Result<Arc<dyn Backend>, BackendError>> {
            let backend: Arc<dyn Backend> = self.0.clone();
            Box::pin(async move { Ok(backend) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_racing_shutdown_leaves_no_session() {
        let backend = Arc::new(SlowBackend {
            name: BackendName::new("libtai-a.so"),
            latency: Duration::from_millis(300),
            attached: AtomicUsize::new(0),
        });
        let backends = BackendTable::new();
        backends.register_factory(Arc::new(SharedFactory(backend.clone())));
        let registry = Arc::new(ModuleRegistry::new(
            static_platform(2),
            Arc::new(backends),
            RegistryConfig::default(),
        ));
        registry.list().await.unwrap();

        let pending = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.create(key("1")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        registry.shutdown().await.unwrap();
        assert_eq!(registry.session_count(), 0);

        // The attach finished before shutdown released anything, so the
        // create saw the gate and gave its handle back.
        assert!(matches!(
            pending.await.unwrap(),
            Err(BrokerError::ShuttingDown)
        ));
        assert_eq!(registry.session_count(), 0);
        assert_eq!(backend.attached.load(Ordering::SeqCst), 0);
        assert!(registry.backends().loaded_backends().is_empty());

        assert!(matches!(
            registry.create(key("2")).await,
            Err(BrokerError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_uncommitted_attach_is_rolled_back() {
        let backend = Arc::new(crate::backends::SimulatedBackend::new(
            BackendName::new("libtai-a.so"),
            Duration::ZERO,
        ));
        let handle = backend.attach(&key("1")).await.unwrap();
        assert_eq!(backend.attached_count(), 1);

        drop(AttachGuard::new(backend.clone(), handle));
        for _ in 0..10 {
            if backend.attached_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(backend.attached_count(), 0);

        let handle = backend.attach(&key("2")).await.unwrap();
        let kept = AttachGuard::new(backend.clone(), handle).commit();
        tokio::task::yield_now().await;
        assert_eq!(kept.name().as_str(), "libtai-a.so");
        assert_eq!(backend.attached_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_discovery_forces_reresolution() {
        let platform = Arc::new(CountingPlatform {
            inner: StaticPlatform::new(vec![
                (key("1"), BackendName::new("libtai-a.so")),
                (key("2"), BackendName::new("libtai-b.so")),
            ]),
            resolves: AtomicUsize::new(0),
        });
        let registry = registry_with(platform.clone(), RegistryConfig::default());

        registry.list().await.unwrap();
        registry.list().await.unwrap();
        assert_eq!(platform.resolves.load(Ordering::SeqCst), 2);

        let session = registry.create(key("1")).await.unwrap();
        registry.reset_discovery();
        assert_eq!(registry.session_count(), 1);
        assert!(matches!(
            registry.create(key("2")).await,
            Err(BrokerError::UnknownLocation(_))
        ));

        registry.list().await.unwrap();
        assert_eq!(platform.resolves.load(Ordering::SeqCst), 4);
        assert!(registry.get_session(session.oid).is_ok());
    }

    #[tokio::test]
    async fn test_module_info_reports_adapter() {
        let registry = registry_with(static_platform(1), RegistryConfig::default());
        registry.list().await.unwrap();
        let session = registry.create(key("1")).await.unwrap();

        let info = registry.module_info(session.oid).unwrap();
        assert_eq!(info.adapter, AdapterKind::Static);
        assert_eq!(info.session.backend_handle, session.backend_handle);
        assert!(registry.module_info(Oid::new(999)).is_err());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_shutdown_releases_everything() {
        let registry = registry_with(static_platform(4), RegistryConfig::default());
        registry.list().await.unwrap();
        for i in 1..=4 {
            registry.create(key(&i.to_string())).await.unwrap();
        }
        assert_eq!(registry.backends().loaded_backends().len(), 1);

        registry.shutdown().await.unwrap();
        assert_eq!(registry.session_count(), 0);
        assert!(registry.backends().loaded_backends().is_empty());
        assert!(logs_contain("shutting down module registry"));
    }
}
