//! `broker.BrokerService` implementation.
//!
//! Thin dispatch layer: each RPC decodes its request, calls the registry and
//! encodes the result. Registry errors go through
//! [`map_broker_error_to_status`](super::map_broker_error_to_status), so a
//! failing request never takes the server down. Each handler runs in its own
//! tonic task; if the caller goes away the handler future is dropped, which
//! the registry tolerates at every await point.

use crate::grpc::error_mapping::BrokerResultExt;
use crate::grpc::proto::broker_service_server::BrokerService;
use crate::grpc::proto::{
    AdapterKind as ProtoAdapterKind, BrokerInfo, BrokerInfoRequest, CreateModuleRequest,
    CreateModuleResponse, GetModuleRequest, ListRequest, ListResponse, ListSessionsRequest,
    ListSessionsResponse, ModuleInfo, RemoveRequest, RemoveResponse, ResetDiscoveryRequest,
    ResetDiscoveryResponse,
};
use broker_core::error::BrokerError;
use broker_core::types::{LocationKey, Oid};
use broker_hardware::ModuleRegistry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::instrument;
use uuid::Uuid;

/// Identity of one broker process, reported by `GetBrokerInfo`.
#[derive(Debug, Clone)]
pub struct BrokerIdentity {
    /// Random per-process instance id.
    pub instance_id: Uuid,
    /// Crate version of the server.
    pub version: &'static str,
    /// When the broker started.
    pub started_at: DateTime<Utc>,
}

impl Default for BrokerIdentity {
    fn default() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            version: env!("CARGO_PKG_VERSION"),
            started_at: Utc::now(),
        }
    }
}

/// gRPC service backed by a [`ModuleRegistry`].
#[derive(Clone)]
pub struct BrokerServiceImpl {
    registry: Arc<ModuleRegistry>,
    identity: Arc<BrokerIdentity>,
}

impl BrokerServiceImpl {
    /// Serve `registry` under `identity`.
    pub fn new(registry: Arc<ModuleRegistry>, identity: Arc<BrokerIdentity>) -> Self {
        Self { registry, identity }
    }
}

#[tonic::async_trait]
impl BrokerService for BrokerServiceImpl {
    #[instrument(skip(self, _request))]
    async fn list(&self, _request: Request<ListRequest>) -> Result<Response<ListResponse>, Status> {
        let modules = self.registry.list().await.map_broker_err()?;
        Ok(Response::new(modules.into()))
    }

    #[instrument(skip(self, request), fields(location = tracing::field::Empty))]
    async fn create_module(
        &self,
        request: Request<CreateModuleRequest>,
    ) -> Result<Response<CreateModuleResponse>, Status> {
        let raw = request.into_inner().location;
        tracing::Span::current().record("location", raw.as_str());

        let location = LocationKey::parse(&raw)
            .map_err(BrokerError::InvalidArgument)
            .map_broker_err()?;
        let session = self.registry.create(location).await.map_broker_err()?;

        Ok(Response::new(CreateModuleResponse {
            session: Some(session.into()),
        }))
    }

    #[instrument(skip(self, request), fields(oid = request.get_ref().oid))]
    async fn remove(
        &self,
        request: Request<RemoveRequest>,
    ) -> Result<Response<RemoveResponse>, Status> {
        let oid = Oid::new(request.into_inner().oid);
        self.registry.remove(oid).await.map_broker_err()?;
        Ok(Response::new(RemoveResponse {}))
    }

    #[instrument(skip(self, request), fields(oid = request.get_ref().oid))]
    async fn get_module(
        &self,
        request: Request<GetModuleRequest>,
    ) -> Result<Response<ModuleInfo>, Status> {
        let oid = Oid::new(request.into_inner().oid);
        let info = self.registry.module_info(oid).map_broker_err()?;
        Ok(Response::new(info.into()))
    }

    #[instrument(skip(self, _request))]
    async fn list_sessions(
        &self,
        _request: Request<ListSessionsRequest>,
    ) -> Result<Response<ListSessionsResponse>, Status> {
        let sessions = self
            .registry
            .sessions()
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(Response::new(ListSessionsResponse { sessions }))
    }

    #[instrument(skip(self, _request))]
    async fn reset_discovery(
        &self,
        _request: Request<ResetDiscoveryRequest>,
    ) -> Result<Response<ResetDiscoveryResponse>, Status> {
        self.registry.reset_discovery();
        Ok(Response::new(ResetDiscoveryResponse {}))
    }

    async fn get_broker_info(
        &self,
        _request: Request<BrokerInfoRequest>,
    ) -> Result<Response<BrokerInfo>, Status> {
        Ok(Response::new(BrokerInfo {
            instance_id: self.identity.instance_id.to_string(),
            version: self.identity.version.to_string(),
            adapter: ProtoAdapterKind::from(self.registry.adapter_kind()) as i32,
            started_at_ms: self.identity.started_at.timestamp_millis(),
            session_count: self.registry.session_count() as u64,
        }))
    }
}
