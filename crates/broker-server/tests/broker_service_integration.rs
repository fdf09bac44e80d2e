//! End-to-end tests: `BrokerClient` against a live `BrokerServer` on an
//! ephemeral port, using the static platform adapter.

use broker_client::{BrokerClient, ClientError, ServerAddress};
use broker_core::config::BrokerConfig;
use broker_core::types::{AdapterKind, Oid};
use broker_hardware::ModuleRegistry;
use broker_proto::broker_service_client::BrokerServiceClient;
use broker_proto::{CreateModuleRequest, ERROR_KIND_METADATA};
use broker_server::BrokerServer;
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::Code;

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    address: ServerAddress,
    registry: Arc<ModuleRegistry>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<broker_core::error::BrokerResult<()>>,
    _dir: TempDir,
}

impl Harness {
    async fn start(locations: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("static.json");
        std::fs::write(&path, static_map(locations)).unwrap();

        let mut config = BrokerConfig::default();
        config.platform.adapter = AdapterKind::Static;
        config.platform.static_config = path;
        config.server.port = 0;

        let registry = Arc::new(ModuleRegistry::from_config(&config).unwrap());
        let listener = BrokerServer::bind(&config.server).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = BrokerServer::new(registry.clone(), &config.server);

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(server.serve_with_shutdown(listener, async {
            let _ = stopped.await;
        }));

        Self {
            address: ServerAddress::new("127.0.0.1", port),
            registry,
            stop: Some(stop),
            task,
            _dir: dir,
        }
    }

    async fn client(&self) -> BrokerClient {
        BrokerClient::connect(&self.address).await.unwrap()
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.task).await.unwrap().unwrap();
    }
}

/// `{ "1": "libtai-a.so", "2": "libtai-a.so", ... }`
fn static_map(locations: usize) -> String {
    let entries: Vec<String> = (1..=locations)
        .map(|i| format!("\"{}\": \"libtai-a.so\"", i))
        .collect();
    format!("{{ {} }}", entries.join(", "))
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn list_create_remove_round() {
    let harness = Harness::start(7).await;
    let client = harness.client().await;

    let modules = client.list().await.unwrap();
    let keys: Vec<String> = modules.keys().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["1", "2", "3", "4", "5", "6", "7"]);

    let creates: Vec<_> = keys
        .iter()
        .cloned()
        .map(|location| {
            let client = client.clone();
            tokio::spawn(async move { client.create_module(location).await })
        })
        .collect();
    let mut oids = HashSet::new();
    for create in creates {
        let session = create.await.unwrap().unwrap();
        assert_eq!(session.backend.as_str(), "libtai-a.so");
        assert!(oids.insert(session.oid));
    }
    assert_eq!(client.list_sessions().await.unwrap().len(), 7);

    let removes: Vec<_> = oids
        .iter()
        .copied()
        .map(|oid| {
            let client = client.clone();
            tokio::spawn(async move { client.remove(oid).await })
        })
        .collect();
    for remove in removes {
        remove.await.unwrap().unwrap();
    }
    assert_eq!(harness.registry.session_count(), 0);

    let oid = *oids.iter().next().unwrap();
    assert!(matches!(
        client.remove(oid).await,
        Err(ClientError::UnknownOid(o)) if o == oid
    ));

    harness.stop().await;
}

#[tokio::test]
async fn typed_errors_reach_the_client() {
    let harness = Harness::start(2).await;
    let client = harness.client().await;

    assert!(matches!(
        client.create_module("1").await,
        Err(ClientError::UnknownLocation(_))
    ));

    client.list().await.unwrap();
    assert!(matches!(
        client.create_module("9").await,
        Err(ClientError::UnknownLocation(_))
    ));

    let session = client.create_module("1").await.unwrap();
    assert!(matches!(
        client.create_module("1").await,
        Err(ClientError::LocationBusy(_))
    ));

    let info = client.get_module(session.oid).await.unwrap();
    assert_eq!(info.adapter, AdapterKind::Static);
    assert_eq!(info.session.oid, session.oid);

    assert!(matches!(
        client.get_module(Oid::new(999)).await,
        Err(ClientError::UnknownOid(_))
    ));

    harness.stop().await;
}

#[tokio::test]
async fn status_carries_error_kind_metadata() {
    let harness = Harness::start(1).await;
    let mut raw = BrokerServiceClient::connect(harness.address.uri())
        .await
        .unwrap();

    let status = raw
        .create_module(CreateModuleRequest {
            location: "1".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
    assert_eq!(
        status.metadata().get(ERROR_KIND_METADATA).unwrap(),
        "unknown_location"
    );

    let status = raw
        .create_module(CreateModuleRequest {
            location: "".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(
        status.metadata().get(ERROR_KIND_METADATA).unwrap(),
        "invalid_argument"
    );

    harness.stop().await;
}

#[tokio::test]
async fn reset_discovery_and_broker_info() {
    let harness = Harness::start(3).await;
    let client = harness.client().await;

    client.list().await.unwrap();
    let session = client.create_module("2").await.unwrap();
    client.reset_discovery().await.unwrap();

    // Sessions survive; unlisted creates are refused until the next list.
    assert_eq!(client.list_sessions().await.unwrap()[0].oid, session.oid);
    assert!(matches!(
        client.create_module("3").await,
        Err(ClientError::UnknownLocation(_))
    ));

    let info = client.broker_info().await.unwrap();
    assert_eq!(info.session_count, 1);
    assert_eq!(info.adapter, AdapterKind::Static);
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    assert!(client.is_serving().await.unwrap());

    harness.stop().await;
}

#[tokio::test]
async fn shutdown_releases_sessions() {
    let harness = Harness::start(3).await;
    let client = harness.client().await;
    client.list().await.unwrap();
    for location in ["1", "2", "3"] {
        client.create_module(location).await.unwrap();
    }

    let registry = harness.registry.clone();
    let address = harness.address.clone();
    harness.stop().await;

    assert_eq!(registry.session_count(), 0);
    assert!(registry.backends().loaded_backends().is_empty());

    let after = BrokerClient::connect(&address).await;
    assert!(matches!(after, Err(ref e) if e.is_transport()));
}
