use crate::domain::ports::{MarketConnector, RemoteBillingService, RemoteServiceHandle, ResultSink};
use crate::domain::request::{BillingRequest, CorrelationId};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{RwLock, watch};

/// A loopback remote billing service.
///
/// Accepts every request and issues monotonically increasing correlation
/// ids. Failure can be scripted to exercise handle-loss paths: either the
/// next N calls fail, or the handle "dies" after N further successes.
pub struct InMemoryBillingService {
    next_id: AtomicI64,
    received: RwLock<Vec<BillingRequest>>,
    fail_next: AtomicU64,
    // -1 = unlimited successes; otherwise calls left before the handle dies
    succeed_budget: AtomicI64,
}

impl Default for InMemoryBillingService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBillingService {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            received: RwLock::new(Vec::new()),
            fail_next: AtomicU64::new(0),
            succeed_budget: AtomicI64::new(-1),
        }
    }

    /// Fails the next `n` calls, then behaves normally again.
    pub fn fail_next_calls(&self, n: u64) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Succeeds `n` more calls, then fails every call until [`Self::heal`].
    pub fn fail_after_calls(&self, n: i64) {
        self.succeed_budget.store(n, Ordering::SeqCst);
    }

    /// Clears any scripted failure.
    pub fn heal(&self) {
        self.fail_next.store(0, Ordering::SeqCst);
        self.succeed_budget.store(-1, Ordering::SeqCst);
    }

    /// Requests the service has accepted, in arrival order.
    pub async fn received(&self) -> Vec<BillingRequest> {
        self.received.read().await.clone()
    }
}

#[async_trait]
impl RemoteBillingService for InMemoryBillingService {
    async fn send_billing_request(&self, request: &BillingRequest) -> Result<CorrelationId> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(BillingError::RemoteCallFailure(
                "scripted call failure".to_string(),
            ));
        }
        if self.succeed_budget.load(Ordering::SeqCst) == 0 {
            return Err(BillingError::RemoteCallFailure(
                "remote billing service died".to_string(),
            ));
        }
        self.succeed_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            })
            .ok();

        self.received.write().await.push(request.clone());
        Ok(CorrelationId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Connector that hands out a shared in-memory service, optionally rejecting
/// bind attempts to exercise the connect-failed path.
pub struct InMemoryConnector {
    service: Arc<InMemoryBillingService>,
    reject_binds: AtomicBool,
    binds: AtomicUsize,
}

impl InMemoryConnector {
    pub fn new(service: Arc<InMemoryBillingService>) -> Self {
        Self {
            service,
            reject_binds: AtomicBool::new(false),
            binds: AtomicUsize::new(0),
        }
    }

    pub fn reject_binds(&self, reject: bool) {
        self.reject_binds.store(reject, Ordering::SeqCst);
    }

    /// Number of bind attempts seen so far.
    pub fn bind_count(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketConnector for InMemoryConnector {
    async fn bind(&self) -> Result<RemoteServiceHandle> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        if self.reject_binds.load(Ordering::SeqCst) {
            return Err(BillingError::BindRejected(
                "bind rejected by configuration".to_string(),
            ));
        }
        Ok(self.service.clone())
    }
}

/// Recording sink with an explicit completion signal.
///
/// Tests and demo hosts can await `wait_for(n)` instead of polling for the
/// fire-and-forget dispatch notifications to land.
pub struct InMemoryResultSink {
    records: RwLock<Vec<(CorrelationId, BillingRequest)>>,
    count: watch::Sender<usize>,
}

impl Default for InMemoryResultSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            count: watch::Sender::new(0),
        }
    }

    /// Recorded dispatches, in the order they were reported.
    pub async fn records(&self) -> Vec<(CorrelationId, BillingRequest)> {
        self.records.read().await.clone()
    }

    /// Waits until at least `n` dispatches have been recorded.
    pub async fn wait_for(&self, n: usize) {
        let mut count = self.count.subscribe();
        while *count.borrow_and_update() < n {
            if count.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl ResultSink for InMemoryResultSink {
    async fn record_dispatch(&self, correlation_id: CorrelationId, request: BillingRequest) {
        let mut records = self.records.write().await;
        records.push((correlation_id, request));
        self.count.send_replace(records.len());
    }
}
