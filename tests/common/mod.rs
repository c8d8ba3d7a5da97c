use async_trait::async_trait;
use billing_bridge::application::connection::ConnectionManager;
use billing_bridge::application::dispatcher::RequestDispatcher;
use billing_bridge::domain::ports::{MarketConnector, RemoteServiceHandle};
use billing_bridge::error::Result;
use billing_bridge::infrastructure::in_memory::{InMemoryBillingService, InMemoryResultSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Connector whose bind attempts park on a gate until the test releases
/// them, so tests control exactly when a connection becomes available.
pub struct GatedConnector {
    service: Arc<InMemoryBillingService>,
    gate: Notify,
    binds: AtomicUsize,
}

impl GatedConnector {
    pub fn new(service: Arc<InMemoryBillingService>) -> Self {
        Self {
            service,
            gate: Notify::new(),
            binds: AtomicUsize::new(0),
        }
    }

    /// Lets one parked bind attempt complete.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketConnector for GatedConnector {
    async fn bind(&self) -> Result<RemoteServiceHandle> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        Ok(self.service.clone())
    }
}

pub struct Harness {
    pub remote: Arc<InMemoryBillingService>,
    pub connector: Arc<GatedConnector>,
    pub connection: Arc<ConnectionManager>,
    pub sink: Arc<InMemoryResultSink>,
    pub dispatcher: Arc<RequestDispatcher>,
}

impl Harness {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let remote = Arc::new(InMemoryBillingService::new());
        let connector = Arc::new(GatedConnector::new(remote.clone()));
        let connection = ConnectionManager::new(connector.clone());
        let sink = Arc::new(InMemoryResultSink::new());
        let dispatcher = RequestDispatcher::new(connection.clone(), sink.clone());
        Self {
            remote,
            connector,
            connection,
            sink,
            dispatcher,
        }
    }

    /// Delivers a live handle and the connection-established event directly,
    /// the way the platform binding callback would.
    pub async fn establish(&self) {
        use billing_bridge::domain::ports::ConnectionObserver;
        self.connection.on_connected(self.remote.clone());
        self.dispatcher.connection_established().await;
    }

    /// Platform-style disconnect: handle cleared, then the lost event.
    pub async fn drop_connection(&self) {
        self.connection.on_disconnected();
        self.dispatcher.connection_lost().await;
    }
}
