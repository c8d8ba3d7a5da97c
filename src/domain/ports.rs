use super::request::{BillingRequest, CorrelationId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// The live connection handle to the remote billing service.
///
/// At most one valid instance exists process-wide at a time; it is installed
/// and cleared only by the `ConnectionManager`.
#[async_trait]
pub trait RemoteBillingService: Send + Sync {
    /// Performs one billing call and returns the server-issued correlation
    /// id. Fails with `BillingError::RemoteCallFailure` when the handle is no
    /// longer valid.
    async fn send_billing_request(&self, request: &BillingRequest) -> Result<CorrelationId>;
}

pub type RemoteServiceHandle = Arc<dyn RemoteBillingService>;

/// Locates and binds to the remote billing service.
///
/// The binding mechanism itself is outside this crate; hosting applications
/// provide the platform-specific implementation.
#[async_trait]
pub trait MarketConnector: Send + Sync {
    /// Asynchronously establishes a connection, yielding a live handle or
    /// `BillingError::BindRejected`.
    async fn bind(&self) -> Result<RemoteServiceHandle>;
}

pub type MarketConnectorBox = Arc<dyn MarketConnector>;

/// Receives the (correlation id, request) pair for every successfully
/// executed request, so later asynchronous notifications can be matched back
/// to their originating request. Write-only from the core's perspective.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record_dispatch(&self, correlation_id: CorrelationId, request: BillingRequest);
}

pub type ResultSinkBox = Arc<dyn ResultSink>;

/// Connection lifecycle events delivered by the `ConnectionManager` to the
/// dispatcher at the end of a bind attempt.
#[async_trait]
pub trait ConnectionObserver: Send + Sync {
    async fn connection_established(&self);
    async fn connect_failed(&self);
}
