//! gRPC services and server lifecycle.

pub mod broker_service;
pub mod error_mapping;
pub mod health_service;
pub mod server;

pub use broker_proto as proto;
pub use broker_service::{BrokerIdentity, BrokerServiceImpl};
pub use error_mapping::{map_broker_error_to_status, BrokerResultExt};
pub use health_service::HealthServiceImpl;
