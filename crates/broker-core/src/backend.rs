//! Backend Factory and Backend Types
//!
//! This module provides the plugin API for vendor backends. A backend is the
//! library that actually drives a transponder module; the broker only needs
//! the capability set `{attach(location) -> handle, detach(handle)}`.
//!
//! Factories are registered with the backend table at startup and selected at
//! runtime by the [`BackendName`] the probe resolved for a location.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Composition Root (main.rs)                   │
//! │  table.register_factory(Arc::new(SimulatedFactory::new(..)));  │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         BackendTable                            │
//! │  factories: name -> Arc<dyn BackendFactory>                     │
//! │  loaded:    name -> Arc<dyn Backend>   (loaded once, shared)    │
//! └─────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          Backend::attach(location) / Backend::detach(h)         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example: Implementing a Backend Factory
//!
//! ```rust,ignore
//! use broker_core::backend::{Backend, BackendFactory};
//! use futures::future::BoxFuture;
//! use std::sync::Arc;
//!
//! pub struct AcmeFactory;
//!
//! impl BackendFactory for AcmeFactory {
//!     fn backend_name(&self) -> &str { "libtai-acme.so" }
//!     fn description(&self) -> &'static str { "ACME coherent transponder" }
//!
//!     fn load(&self, name: &BackendName)
//!         -> BoxFuture<'static, Result<Arc<dyn Backend>, BackendError>>
//!     {
//!         let name = name.clone();
//!         Box::pin(async move { Ok(Arc::new(AcmeBackend::open(name).await?) as Arc<dyn Backend>) })
//!     }
//! }
//! ```

use crate::error::BackendError;
use crate::types::{BackendHandle, BackendName, LocationKey};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

/// A loaded vendor backend, shared by every session that uses its name.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name this backend was loaded under.
    fn name(&self) -> &BackendName;

    /// Bring up the module at `location` and return the backend's handle for it.
    ///
    /// Must be cancel-safe: if the returned future is dropped before it
    /// resolves, nothing may remain attached.
    ///
    /// # Errors
    /// Returns [`BackendError`] if the module cannot be attached.
    async fn attach(&self, location: &LocationKey) -> Result<BackendHandle, BackendError>;

    /// Release a handle previously returned by [`Backend::attach`].
    ///
    /// # Errors
    /// Returns [`BackendError`] if the handle is unknown or the library fails.
    /// On error the handle is still considered attached.
    async fn detach(&self, handle: BackendHandle) -> Result<(), BackendError>;

    /// Tear the backend down. Called once at broker shutdown.
    async fn unload(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Factory that loads a [`Backend`] for a backend name.
pub trait BackendFactory: Send + Sync {
    /// Backend name this factory serves (e.g. `libtai-a.so`).
    fn backend_name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Load the backend. Called at most once per name by the backend table.
    fn load(&self, name: &BackendName) -> BoxFuture<'static, Result<Arc<dyn Backend>, BackendError>>;
}
