use super::connection::ConnectionManager;
use super::dispatcher::RequestDispatcher;
use crate::domain::ports::{
    ConnectionObserver, MarketConnectorBox, RemoteServiceHandle, ResultSinkBox,
};
use crate::domain::request::BillingRequest;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The public submission boundary of the bridge.
///
/// One entry point per request kind; each builds the request and pushes it
/// onto an ordered channel consumed by a single worker task, so submission is
/// fire-and-forget: the caller never blocks on remote completion, and
/// back-to-back calls reach the dispatcher in call order. Outcomes are only
/// observable through the `ResultSink` and whatever later notifications the
/// hosting application receives.
///
/// Build one per process, inside a tokio runtime, and keep it for the
/// process lifetime; the bridge has no teardown.
pub struct BillingService {
    package_name: String,
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<RequestDispatcher>,
    submissions: mpsc::UnboundedSender<BillingRequest>,
}

impl BillingService {
    pub fn new(
        package_name: impl Into<String>,
        connector: MarketConnectorBox,
        sink: ResultSinkBox,
    ) -> Self {
        let connection = ConnectionManager::new(connector);
        let dispatcher = RequestDispatcher::new(connection.clone(), sink);

        let (submissions, mut queue) = mpsc::unbounded_channel::<BillingRequest>();
        let worker = dispatcher.clone();
        tokio::spawn(async move {
            while let Some(request) = queue.recv().await {
                worker.submit(request).await;
            }
        });

        Self {
            package_name: package_name.into(),
            connection,
            dispatcher,
            submissions,
        }
    }

    pub fn check_billing_supported(&self) {
        self.enqueue(BillingRequest::check_billing_supported(&self.package_name));
    }

    pub fn confirm_notifications(&self, notify_ids: Vec<String>) {
        self.enqueue(BillingRequest::confirm_notifications(
            &self.package_name,
            notify_ids,
        ));
    }

    pub fn get_purchase_information(&self, notify_ids: Vec<String>, nonce: u64) {
        let mut request =
            BillingRequest::get_purchase_information(&self.package_name, notify_ids);
        request.set_nonce(nonce);
        self.enqueue(request);
    }

    pub fn request_purchase(&self, item_id: &str, developer_payload: Option<String>) {
        self.enqueue(BillingRequest::request_purchase(
            &self.package_name,
            item_id,
            developer_payload,
        ));
    }

    pub fn restore_transactions(&self, nonce: u64) {
        let mut request = BillingRequest::restore_transactions(&self.package_name);
        request.set_nonce(nonce);
        self.enqueue(request);
    }

    fn enqueue(&self, request: BillingRequest) {
        // The worker only stops once this sender is dropped, so a send can
        // only fail if the worker task itself died.
        if self.submissions.send(request).is_err() {
            tracing::warn!("submission worker is gone, dropping billing request");
        }
    }

    /// Platform callback: the binding mechanism delivered a live handle.
    pub async fn on_connected(&self, handle: RemoteServiceHandle) {
        self.connection.on_connected(handle);
        self.dispatcher.connection_established().await;
    }

    /// Platform callback: the remote service went away.
    pub async fn on_disconnected(&self) {
        self.connection.on_disconnected();
        self.dispatcher.connection_lost().await;
    }

    /// The dispatcher backing this service, mostly useful to observe queue
    /// state from tests and diagnostics.
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }
}
