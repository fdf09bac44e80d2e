//! gRPC client for the module broker.

use std::time::Duration;

use broker_core::types::{AdapterKind, ModuleInfo, ModuleMap, Oid, SessionInfo};
use broker_proto::broker_service_client::BrokerServiceClient;
use broker_proto::convert::{adapter_from_i32, timestamp_from_millis, ToDomain};
use broker_proto::health::health_check_response::ServingStatus;
use broker_proto::health::health_client::HealthClient;
use broker_proto::health::HealthCheckRequest;
use broker_proto::{
    BrokerInfoRequest, CreateModuleRequest, GetModuleRequest, ListRequest, ListSessionsRequest,
    RemoveRequest, ResetDiscoveryRequest, BROKER_SERVICE_NAME,
};
use chrono::{DateTime, Utc};
use tonic::transport::{Channel, Endpoint};

use crate::connection::ServerAddress;
use crate::error::{ClientError, Result};

/// How long to wait for the initial connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Broker identity and status, as reported by `GetBrokerInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerStatus {
    /// Per-process instance id.
    pub instance_id: String,
    /// Server version.
    pub version: String,
    /// Discovery adapter in use.
    pub adapter: AdapterKind,
    /// When the broker started.
    pub started_at: DateTime<Utc>,
    /// Live session count.
    pub session_count: u64,
}

/// Connection to a module broker.
///
/// Cheap to clone; every method takes `&self`, so one client can issue many
/// concurrent requests over a single HTTP/2 connection.
#[derive(Clone, Debug)]
pub struct BrokerClient {
    address: ServerAddress,
    broker: BrokerServiceClient<Channel>,
    health: HealthClient<Channel>,
}

impl BrokerClient {
    /// Connect to the broker at `address`.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidAddress`] if the address does not form a
    /// valid URI, or [`ClientError::Transport`] if the connection fails.
    pub async fn connect(address: &ServerAddress) -> Result<Self> {
        let endpoint = Endpoint::from_shared(address.uri())
            .map_err(|e| ClientError::InvalidAddress(e.to_string()))?
            .connect_timeout(CONNECT_TIMEOUT);
        let channel = endpoint.connect().await?;
        tracing::debug!(%address, "connected to module broker");

        Ok(Self {
            address: address.clone(),
            broker: BrokerServiceClient::new(channel.clone()),
            health: HealthClient::new(channel),
        })
    }

    /// Connect using `MODULE_BROKER_SERVER_*` or the shared defaults.
    pub async fn connect_default() -> Result<Self> {
        Self::connect(&ServerAddress::from_env()?).await
    }

    /// Address this client is connected to.
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Enumerate modules and their backends.
    pub async fn list(&self) -> Result<ModuleMap> {
        let response = self
            .broker
            .clone()
            .list(ListRequest {})
            .await
            .map_err(|s| ClientError::from_status(s, None))?;
        response
            .into_inner()
            .to_domain()
            .map_err(ClientError::MalformedResponse)
    }

    /// Create a session for `location`.
    pub async fn create_module(&self, location: impl Into<String>) -> Result<SessionInfo> {
        let response = self
            .broker
            .clone()
            .create_module(CreateModuleRequest {
                location: location.into(),
            })
            .await
            .map_err(|s| ClientError::from_status(s, None))?;
        response
            .into_inner()
            .session
            .to_domain()
            .map_err(ClientError::MalformedResponse)
    }

    /// Remove the session `oid`.
    pub async fn remove(&self, oid: Oid) -> Result<()> {
        self.broker
            .clone()
            .remove(RemoveRequest { oid: oid.get() })
            .await
            .map_err(|s| ClientError::from_status(s, Some(oid)))?;
        Ok(())
    }

    /// Session details plus the broker's discovery adapter.
    pub async fn get_module(&self, oid: Oid) -> Result<ModuleInfo> {
        let response = self
            .broker
            .clone()
            .get_module(GetModuleRequest { oid: oid.get() })
            .await
            .map_err(|s| ClientError::from_status(s, Some(oid)))?;
        response
            .into_inner()
            .to_domain()
            .map_err(ClientError::MalformedResponse)
    }

    /// All live sessions, ordered by oid.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let response = self
            .broker
            .clone()
            .list_sessions(ListSessionsRequest {})
            .await
            .map_err(|s| ClientError::from_status(s, None))?;
        response
            .into_inner()
            .sessions
            .into_iter()
            .map(ToDomain::to_domain)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(ClientError::MalformedResponse)
    }

    /// Drop the broker's cached discovery results.
    pub async fn reset_discovery(&self) -> Result<()> {
        self.broker
            .clone()
            .reset_discovery(ResetDiscoveryRequest {})
            .await
            .map_err(|s| ClientError::from_status(s, None))?;
        Ok(())
    }

    /// Broker identity and status.
    pub async fn broker_info(&self) -> Result<BrokerStatus> {
        let info = self
            .broker
            .clone()
            .get_broker_info(BrokerInfoRequest {})
            .await
            .map_err(|s| ClientError::from_status(s, None))?
            .into_inner();

        Ok(BrokerStatus {
            instance_id: info.instance_id,
            version: info.version,
            adapter: adapter_from_i32(info.adapter).map_err(ClientError::MalformedResponse)?,
            started_at: timestamp_from_millis(info.started_at_ms)
                .map_err(ClientError::MalformedResponse)?,
            session_count: info.session_count,
        })
    }

    /// True if the broker service reports `SERVING`.
    pub async fn is_serving(&self) -> Result<bool> {
        let response = self
            .health
            .clone()
            .check(HealthCheckRequest {
                service: BROKER_SERVICE_NAME.to_string(),
            })
            .await
            .map_err(|s| ClientError::from_status(s, None))?;
        Ok(response.into_inner().status == ServingStatus::Serving as i32)
    }
}
