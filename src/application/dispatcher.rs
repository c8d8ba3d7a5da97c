use super::connection::ConnectionManager;
use crate::domain::ports::{ConnectionObserver, RemoteServiceHandle, ResultSinkBox};
use crate::domain::request::BillingRequest;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;

/// Connection state as the dispatcher sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

struct DispatchState {
    link: LinkState,
    pending: VecDeque<BillingRequest>,
}

/// Accepts billing requests, queues them while no connection exists, and
/// drains the queue in FIFO order once a connection becomes available.
///
/// All of `submit`, `connection_established`, `connect_failed` and
/// `connection_lost` serialize on one mutex over the (state, queue) pair, so
/// the "execute now vs. enqueue" decision is atomic with respect to
/// concurrent submissions. Requests submitted while a handle is live take the
/// direct path and never touch the queue; they are not ordered relative to a
/// drain already in progress.
pub struct RequestDispatcher {
    connection: Arc<ConnectionManager>,
    sink: ResultSinkBox,
    inner: Mutex<DispatchState>,
    weak_self: Weak<RequestDispatcher>,
}

impl RequestDispatcher {
    pub fn new(connection: Arc<ConnectionManager>, sink: ResultSinkBox) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            connection,
            sink,
            inner: Mutex::new(DispatchState {
                link: LinkState::Disconnected,
                pending: VecDeque::new(),
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// Submits one request: executes it immediately when a handle is live,
    /// otherwise enqueues it and triggers a connection attempt.
    ///
    /// The direct path blocks the calling task for the duration of one remote
    /// call. The queued path only enqueues.
    pub async fn submit(&self, request: BillingRequest) {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = self.connection.current_handle() {
            inner.link = LinkState::Connected;
            // Direct path: a failed call is logged and the request dropped.
            if let Err(error) = self.execute(&handle, request).await {
                tracing::warn!(%error, "direct-path billing request failed, dropping");
            }
            return;
        }

        inner.pending.push_back(request);
        if inner.link != LinkState::Connecting {
            inner.link = LinkState::Connecting;
            let observer: Weak<dyn ConnectionObserver> = self.weak_self.clone();
            self.connection.connect(observer);
        }
    }

    /// Runs one request against a live handle and records the dispatch.
    async fn execute(&self, handle: &RemoteServiceHandle, request: BillingRequest) -> Result<()> {
        let correlation_id = request.execute(handle.as_ref()).await?;
        tracing::debug!(
            %correlation_id,
            kind = request.kind().name(),
            "billing request dispatched"
        );
        self.sink.record_dispatch(correlation_id, request).await;
        Ok(())
    }

    /// Drains the pending queue in strict FIFO order.
    ///
    /// The handle is re-checked before every item; if it has gone absent the
    /// drain aborts and the remaining items stay queued for the next
    /// successful connection. A failed call is likewise treated as handle
    /// loss: the item under execution stays at the head of the queue, giving
    /// at-least-once semantics under handle churn.
    async fn drain(&self, inner: &mut DispatchState) {
        loop {
            let request = match inner.pending.front() {
                Some(request) => request.clone(),
                None => break,
            };
            let Some(handle) = self.connection.current_handle() else {
                tracing::debug!(pending = inner.pending.len(), "handle lost mid-drain, aborting");
                break;
            };
            match self.execute(&handle, request).await {
                Ok(()) => {
                    inner.pending.pop_front();
                }
                Err(error) => {
                    tracing::warn!(%error, "remote call failed mid-drain, keeping request queued");
                    break;
                }
            }
        }
    }

    pub async fn link_state(&self) -> LinkState {
        self.inner.lock().await.link
    }

    pub async fn pending_len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Connection loss reported by the hosting platform. Queued requests are
    /// untouched and there is no automatic reconnection; the next submission
    /// re-enters the connecting path.
    pub async fn connection_lost(&self) {
        let mut inner = self.inner.lock().await;
        inner.link = LinkState::Disconnected;
    }
}

#[async_trait]
impl ConnectionObserver for RequestDispatcher {
    async fn connection_established(&self) {
        let mut inner = self.inner.lock().await;
        inner.link = LinkState::Connected;
        self.drain(&mut inner).await;
    }

    async fn connect_failed(&self) {
        let mut inner = self.inner.lock().await;
        inner.link = LinkState::Disconnected;
        tracing::debug!(pending = inner.pending.len(), "connect failed, requests stay queued");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::{
        InMemoryBillingService, InMemoryConnector, InMemoryResultSink,
    };

    fn fixture() -> (
        Arc<RequestDispatcher>,
        Arc<ConnectionManager>,
        Arc<InMemoryBillingService>,
        Arc<InMemoryResultSink>,
    ) {
        let service = Arc::new(InMemoryBillingService::new());
        let connector = Arc::new(InMemoryConnector::new(service.clone()));
        let connection = ConnectionManager::new(connector);
        let sink = Arc::new(InMemoryResultSink::new());
        let dispatcher = RequestDispatcher::new(connection.clone(), sink.clone());
        (dispatcher, connection, service, sink)
    }

    #[tokio::test]
    async fn test_submit_while_disconnected_enqueues_and_connects() {
        let (dispatcher, _connection, _service, sink) = fixture();

        dispatcher
            .submit(BillingRequest::check_billing_supported("com.example.app"))
            .await;

        assert_eq!(dispatcher.link_state().await, LinkState::Connecting);
        assert_eq!(dispatcher.pending_len().await, 1);
        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_established_drains_in_fifo_order() {
        let (dispatcher, connection, service, sink) = fixture();

        dispatcher
            .submit(BillingRequest::request_purchase(
                "com.example.app",
                "sku1",
                None,
            ))
            .await;
        dispatcher
            .submit(BillingRequest::restore_transactions("com.example.app"))
            .await;
        assert_eq!(dispatcher.pending_len().await, 2);

        connection.on_connected(service.clone());
        dispatcher.connection_established().await;

        assert_eq!(dispatcher.pending_len().await, 0);
        assert_eq!(dispatcher.link_state().await, LinkState::Connected);
        let records = sink.records().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].1.kind().name(), "request_purchase");
        assert_eq!(records[1].1.kind().name(), "restore_transactions");
    }

    #[tokio::test]
    async fn test_direct_path_bypasses_queue() {
        let (dispatcher, connection, service, sink) = fixture();
        connection.on_connected(service.clone());
        dispatcher.connection_established().await;

        dispatcher
            .submit(BillingRequest::confirm_notifications(
                "com.example.app",
                vec!["n1".to_string()],
            ))
            .await;

        assert_eq!(dispatcher.pending_len().await, 0);
        assert_eq!(sink.records().await.len(), 1);
    }

    #[tokio::test]
    async fn test_direct_path_failure_drops_request() {
        let (dispatcher, connection, service, sink) = fixture();
        connection.on_connected(service.clone());
        dispatcher.connection_established().await;

        service.fail_next_calls(1);
        dispatcher
            .submit(BillingRequest::check_billing_supported("com.example.app"))
            .await;

        assert_eq!(dispatcher.pending_len().await, 0);
        assert!(sink.records().await.is_empty());
    }

    #[tokio::test]
    async fn test_call_failure_mid_drain_keeps_item_queued() {
        let (dispatcher, connection, service, sink) = fixture();

        for item in ["sku1", "sku2", "sku3"] {
            dispatcher
                .submit(BillingRequest::request_purchase(
                    "com.example.app",
                    item,
                    None,
                ))
                .await;
        }

        // First call succeeds, second dies with the handle.
        service.fail_after_calls(1);
        connection.on_connected(service.clone());
        dispatcher.connection_established().await;

        assert_eq!(sink.records().await.len(), 1);
        assert_eq!(dispatcher.pending_len().await, 2);

        // Platform reports the loss, then a fresh connection drains the rest
        // in original relative order.
        connection.on_disconnected();
        dispatcher.connection_lost().await;
        service.heal();
        connection.on_connected(service.clone());
        dispatcher.connection_established().await;

        let records = sink.records().await;
        assert_eq!(records.len(), 3);
        let skus: Vec<_> = records
            .iter()
            .map(|(_, request)| match request.kind() {
                crate::domain::request::RequestKind::RequestPurchase { item_id, .. } => {
                    item_id.clone()
                }
                other => panic!("unexpected kind {other:?}"),
            })
            .collect();
        assert_eq!(skus, vec!["sku1", "sku2", "sku3"]);
        assert_eq!(dispatcher.pending_len().await, 0);
    }

    #[tokio::test]
    async fn test_handle_absent_mid_drain_aborts() {
        let (dispatcher, connection, service, _sink) = fixture();

        dispatcher
            .submit(BillingRequest::restore_transactions("com.example.app"))
            .await;

        // Established is delivered but the handle is already gone again.
        connection.on_connected(service.clone());
        connection.on_disconnected();
        dispatcher.connection_established().await;

        assert_eq!(dispatcher.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_connect_failed_keeps_queue_and_resets_state() {
        let (dispatcher, _connection, _service, _sink) = fixture();

        dispatcher
            .submit(BillingRequest::check_billing_supported("com.example.app"))
            .await;
        dispatcher.connect_failed().await;

        assert_eq!(dispatcher.link_state().await, LinkState::Disconnected);
        assert_eq!(dispatcher.pending_len().await, 1);
    }

    #[tokio::test]
    async fn test_connection_lost_then_resubmit_reconnects() {
        let (dispatcher, connection, service, sink) = fixture();
        connection.on_connected(service.clone());
        dispatcher.connection_established().await;

        connection.on_disconnected();
        dispatcher.connection_lost().await;
        assert_eq!(dispatcher.link_state().await, LinkState::Disconnected);

        dispatcher
            .submit(BillingRequest::check_billing_supported("com.example.app"))
            .await;
        assert_eq!(dispatcher.link_state().await, LinkState::Connecting);
        assert_eq!(dispatcher.pending_len().await, 1);

        // The manager's bind task completes and drains the queue.
        sink.wait_for(1).await;
        assert_eq!(dispatcher.pending_len().await, 0);
    }
}
