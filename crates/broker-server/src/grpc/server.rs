//! Broker server lifecycle.
//!
//! ```text
//!  bind ──▶ serve ──(signal)──▶ NOT_SERVING ──▶ drain (≤ grace) ──▶ registry.shutdown()
//! ```
//!
//! The listener is bound by the caller so tests can use an ephemeral port and
//! the daemon is reachable the moment `bind` returns.

use crate::grpc::broker_service::{BrokerIdentity, BrokerServiceImpl};
use crate::grpc::health_service::HealthServiceImpl;
use crate::grpc::proto::broker_service_server::BrokerServiceServer;
use crate::grpc::proto::health::health_check_response::ServingStatus;
use crate::grpc::proto::health::health_server::HealthServer;
use crate::grpc::proto::BROKER_SERVICE_NAME;
use broker_core::config::ServerConfig;
use broker_core::error::{BrokerError, BrokerResult};
use broker_hardware::ModuleRegistry;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

/// Module broker gRPC server.
pub struct BrokerServer {
    registry: Arc<ModuleRegistry>,
    health: HealthServiceImpl,
    identity: Arc<BrokerIdentity>,
    shutdown_grace: Duration,
}

impl BrokerServer {
    /// Create a server for `registry` using the `[server]` settings.
    pub fn new(registry: Arc<ModuleRegistry>, settings: &ServerConfig) -> Self {
        Self {
            registry,
            health: HealthServiceImpl::new(),
            identity: Arc::new(BrokerIdentity::default()),
            shutdown_grace: settings.shutdown_grace(),
        }
    }

    /// Bind the configured socket.
    ///
    /// # Errors
    /// Returns [`BrokerError::Io`] if the address is unavailable.
    pub async fn bind(settings: &ServerConfig) -> BrokerResult<TcpListener> {
        let addr = settings.bind_socket();
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "broker socket bound");
        Ok(listener)
    }

    /// Registry served by this server.
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Health service, for inspecting serving status.
    pub fn health(&self) -> &HealthServiceImpl {
        &self.health
    }

    /// Identity reported by `GetBrokerInfo`.
    pub fn identity(&self) -> &BrokerIdentity {
        &self.identity
    }

    /// Serve on `listener` until `signal` resolves, then shut down.
    ///
    /// Shutdown flips health to `NOT_SERVING`, stops accepting connections and
    /// lets in-flight requests drain for at most the configured grace period
    /// before aborting them. The registry is shut down last, releasing every
    /// session and unloading every backend.
    ///
    /// # Errors
    /// Returns [`BrokerError::Io`] if the transport fails, or
    /// [`BrokerError::ShutdownFailed`] if releasing sessions or backends fails.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, signal: F) -> BrokerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        self.set_serving(ServingStatus::Serving);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let router = Server::builder()
            .add_service(HealthServer::new(self.health.clone()))
            .add_service(BrokerServiceServer::new(BrokerServiceImpl::new(
                self.registry.clone(),
                self.identity.clone(),
            )));
        let mut serving = tokio::spawn(router.serve_with_incoming_shutdown(
            TcpListenerStream::new(listener),
            async {
                let _ = stop_rx.await;
            },
        ));

        tracing::info!(
            %local_addr,
            instance = %self.identity.instance_id,
            adapter = %self.registry.adapter_kind(),
            "module broker serving"
        );

        let mut transport_error = None;
        tokio::select! {
            _ = signal => {
                tracing::info!("shutdown requested");
            }
            exited = &mut serving => {
                transport_error = Some(join_outcome(exited));
            }
        }

        self.set_serving(ServingStatus::NotServing);

        if transport_error.is_none() {
            let _ = stop_tx.send(());
            match tokio::time::timeout(self.shutdown_grace, &mut serving).await {
                Ok(exited) => {
                    if let Err(e) = join_outcome(exited) {
                        tracing::warn!(error = %e, "transport reported an error while draining");
                    }
                }
                Err(_) => {
                    tracing::warn!(
                        grace = ?self.shutdown_grace,
                        "in-flight requests did not drain in time; aborting"
                    );
                    serving.abort();
                }
            }
        }

        let released = self.registry.shutdown().await;
        tracing::info!("module broker stopped");

        if let Some(Err(e)) = transport_error {
            if let Err(shutdown) = released {
                tracing::error!(error = %shutdown, "registry shutdown failed after transport error");
            }
            return Err(e);
        }
        released
    }

    fn set_serving(&self, status: ServingStatus) {
        self.health.set_serving_status("", status);
        self.health.set_serving_status(BROKER_SERVICE_NAME, status);
    }
}

type ServeOutcome = Result<Result<(), tonic::transport::Error>, tokio::task::JoinError>;

fn join_outcome(exited: ServeOutcome) -> BrokerResult<()> {
    match exited {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BrokerError::Io(std::io::Error::other(e))),
        Err(e) => Err(BrokerError::Io(std::io::Error::other(e))),
    }
}
