//! Protocol buffer definitions and conversions for the module broker.
//!
//! This crate contains:
//! - Generated protobuf types and the `BrokerService` stubs from `proto/broker.proto`
//! - The standard health check service from `proto/health.proto`
//! - Conversions between proto types and the domain types in `broker-core`

#![allow(missing_docs)] // Generated code doesn't have docs

pub mod convert;

/// Generated broker protocol buffer types.
pub mod broker {
    tonic::include_proto!("broker");
}

/// Generated health check protocol buffer types.
pub mod health {
    tonic::include_proto!("grpc.health.v1");
}

pub use broker::*;

/// ASCII status metadata key naming the broker error kind behind a failed RPC.
pub const ERROR_KIND_METADATA: &str = "broker-error-kind";

/// Fully qualified name of the broker service, as used by health checks.
pub const BROKER_SERVICE_NAME: &str = "broker.BrokerService";
