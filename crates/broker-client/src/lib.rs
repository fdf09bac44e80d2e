//! Client library for the module broker.
//!
//! ```rust,ignore
//! use broker_client::{BrokerClient, ServerAddress};
//!
//! let client = BrokerClient::connect(&ServerAddress::from_env()?).await?;
//! let modules = client.list().await?;
//! let session = client.create_module("1").await?;
//! client.remove(session.oid).await?;
//! ```

pub mod client;
pub mod connection;
pub mod error;

pub use client::{BrokerClient, BrokerStatus};
pub use connection::ServerAddress;
pub use error::{ClientError, Result};
