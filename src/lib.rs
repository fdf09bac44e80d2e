//! # Module Broker
//!
//! Facade over the broker workspace. A module broker sits between a network
//! operating system and the vendor libraries that drive pluggable transponder
//! modules: it discovers which modules are present, works out which backend
//! library serves each one, and hands out broker-wide object ids for sessions
//! it multiplexes onto those backends.
//!
//! ## Crate Structure
//!
//! - **`core`**: location keys, oids, sessions, errors, the backend plugin API
//!   and figment configuration.
//! - **`hardware`**: the probe invoker, exec/static platform adapters, the
//!   backend table and the module registry.
//! - **`server`**: the gRPC service, health service and server lifecycle.
//! - **`client`**: typed gRPC client used by the CLI and tests.
//! - **`logging`**: tracing subscriber setup for the binaries.

pub use broker_client as client;
pub use broker_core as core;
pub use broker_hardware as hardware;
pub use broker_server as server;

pub mod logging;
