//! gRPC front end for the module broker.
//!
//! Exposes the [`ModuleRegistry`](broker_hardware::ModuleRegistry) as
//! `broker.BrokerService` next to the standard `grpc.health.v1.Health`
//! service, and owns the serve/shutdown lifecycle.

pub mod grpc;

pub use grpc::server::BrokerServer;
