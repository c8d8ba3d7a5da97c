use crate::domain::ports::RemoteBillingService;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-issued identifier returned per executed request.
///
/// Used to match asynchronous confirmation notifications arriving out-of-band
/// back to the originating request. Uniqueness among in-flight requests is a
/// server invariant, not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub i64);

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of request kinds with their kind-specific payloads.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    CheckBillingSupported,
    ConfirmNotifications {
        notify_ids: Vec<String>,
    },
    GetPurchaseInformation {
        notify_ids: Vec<String>,
    },
    RequestPurchase {
        item_id: String,
        developer_payload: Option<String>,
    },
    RestoreTransactions,
}

impl RequestKind {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CheckBillingSupported => "check_billing_supported",
            Self::ConfirmNotifications { .. } => "confirm_notifications",
            Self::GetPurchaseInformation { .. } => "get_purchase_information",
            Self::RequestPurchase { .. } => "request_purchase",
            Self::RestoreTransactions => "restore_transactions",
        }
    }
}

/// One unit of billing work: an immutable request that, given a live
/// connection handle, performs a single remote call and yields the
/// correlation id the server assigned to it.
///
/// Value object. The only post-construction mutation allowed is setting the
/// optional nonce, exactly once, before dispatch.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct BillingRequest {
    package_name: String,
    kind: RequestKind,
    nonce: Option<u64>,
}

impl BillingRequest {
    pub fn check_billing_supported(package_name: impl Into<String>) -> Self {
        Self::new(package_name, RequestKind::CheckBillingSupported)
    }

    pub fn confirm_notifications(
        package_name: impl Into<String>,
        notify_ids: Vec<String>,
    ) -> Self {
        Self::new(package_name, RequestKind::ConfirmNotifications { notify_ids })
    }

    pub fn get_purchase_information(
        package_name: impl Into<String>,
        notify_ids: Vec<String>,
    ) -> Self {
        Self::new(
            package_name,
            RequestKind::GetPurchaseInformation { notify_ids },
        )
    }

    pub fn request_purchase(
        package_name: impl Into<String>,
        item_id: impl Into<String>,
        developer_payload: Option<String>,
    ) -> Self {
        Self::new(
            package_name,
            RequestKind::RequestPurchase {
                item_id: item_id.into(),
                developer_payload,
            },
        )
    }

    pub fn restore_transactions(package_name: impl Into<String>) -> Self {
        Self::new(package_name, RequestKind::RestoreTransactions)
    }

    fn new(package_name: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            package_name: package_name.into(),
            kind,
            nonce: None,
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    /// Sets the nonce. Settable exactly once: a second call is a no-op so a
    /// request already stamped for dispatch cannot be re-stamped.
    pub fn set_nonce(&mut self, nonce: u64) {
        if self.nonce.is_none() {
            self.nonce = Some(nonce);
        }
    }

    /// Performs this request's single remote call against a live handle.
    pub async fn execute(&self, handle: &dyn RemoteBillingService) -> Result<CorrelationId> {
        handle.send_billing_request(self).await
    }
}
