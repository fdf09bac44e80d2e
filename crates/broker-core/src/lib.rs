//! Core types, errors and configuration for the module broker.
//!
//! - [`types`]: location keys, backend names, oids, descriptors and sessions
//! - [`error`]: [`BrokerError`](error::BrokerError) and its collaborator errors
//! - [`backend`]: the vendor backend plugin API
//! - [`config`]: figment-based configuration shared by server and client

pub mod backend;
pub mod config;
pub mod error;
pub mod types;

pub use error::{BackendError, BackendErrorKind, BrokerError, BrokerResult, ProbeError};
pub use types::{
    AdapterKind, BackendHandle, BackendName, LocationKey, ModuleDescriptor, ModuleInfo, ModuleMap,
    Oid, SessionInfo,
};
