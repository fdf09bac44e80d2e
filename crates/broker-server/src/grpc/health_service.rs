use crate::grpc::proto::health::health_check_response::ServingStatus;
use crate::grpc::proto::health::health_server::Health;
use crate::grpc::proto::health::{HealthCheckRequest, HealthCheckResponse};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tonic::{Request, Response, Status};

/// gRPC Health Check Service implementation
///
/// The empty service name reports overall server health. It reads as
/// `SERVING` until something explicitly sets it.
#[derive(Debug, Clone)]
pub struct HealthServiceImpl {
    // Map service name -> status sender
    statuses: Arc<Mutex<HashMap<String, watch::Sender<ServingStatus>>>>,
}

impl Default for HealthServiceImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthServiceImpl {
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Update the serving status of a service
    pub fn set_serving_status(&self, service: &str, status: ServingStatus) {
        let mut statuses = self.statuses.lock();
        if let Some(tx) = statuses.get(service) {
            tx.send_replace(status);
        } else {
            let (tx, _) = watch::channel(status);
            statuses.insert(service.to_string(), tx);
        }
    }

    /// Current status of a service, if it has been registered.
    pub fn serving_status(&self, service: &str) -> Option<ServingStatus> {
        self.statuses.lock().get(service).map(|tx| *tx.borrow())
    }
}

#[tonic::async_trait]
impl Health for HealthServiceImpl {
    type WatchStream = std::pin::Pin<
        Box<dyn tokio_stream::Stream<Item = Result<HealthCheckResponse, Status>> + Send + Sync>,
    >;

    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        let status = match self.serving_status(&service) {
            Some(status) => status,
            None if service.is_empty() => ServingStatus::Serving,
            None => return Err(Status::not_found(format!("Unknown service: {}", service))),
        };

        Ok(Response::new(HealthCheckResponse {
            status: status.into(),
        }))
    }

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;

        let rx = {
            let mut statuses = self.statuses.lock();
            match statuses.get(&service) {
                Some(tx) => tx.subscribe(),
                None => {
                    // Unknown services stream SERVICE_UNKNOWN until registered
                    let initial = if service.is_empty() {
                        ServingStatus::Serving
                    } else {
                        ServingStatus::ServiceUnknown
                    };
                    let (tx, rx) = watch::channel(initial);
                    statuses.insert(service, tx);
                    rx
                }
            }
        };

        let stream = tokio_stream::wrappers::WatchStream::new(rx).map(|status| {
            Ok(HealthCheckResponse {
                status: status.into(),
            })
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
