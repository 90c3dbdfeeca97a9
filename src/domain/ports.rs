use crate::domain::denomination::Amount;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Backend-issued invoice identifier. Opaque to the core: whatever JSON value
/// the backend hands out is echoed back verbatim on settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub serde_json::Value);

impl fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the per-device invoice listing.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceSummary {
    #[serde(rename = "ID")]
    pub id: InvoiceId,
    #[serde(rename = "PaymentToken")]
    pub payment_token: String,
    #[serde(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

/// Full invoice detail fetched by payment token.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceDetail {
    #[serde(rename = "ID")]
    pub id: InvoiceId,
    #[serde(rename = "isPaid", default)]
    pub is_paid: bool,
    #[serde(rename = "productPrice")]
    pub product_price: Amount,
}

/// Settlement request reporting the final accumulated amount for a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    #[serde(rename = "ID")]
    pub id: InvoiceId,
    #[serde(rename = "paymentToken")]
    pub payment_token: String,
    #[serde(rename = "productPrice")]
    pub product_price: Amount,
}

/// Backend verdict on a settlement, parsed once at the HTTP boundary so the
/// core never string-matches error text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Accepted,
    InsufficientPayment,
    /// The invoice was settled elsewhere; treated as success.
    AlreadyPaid,
    /// A well-formed rejection the core has no special handling for.
    Rejected,
}

/// The remote invoicing backend.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    /// Lists recent invoices issued against this device.
    async fn device_invoices(&self) -> Result<Vec<InvoiceSummary>>;

    /// Fetches the full invoice behind a payment token.
    async fn invoice_detail(&self, payment_token: &str) -> Result<InvoiceDetail>;

    /// Reports the accumulated amount and returns the backend's verdict.
    async fn settle(&self, settlement: &Settlement) -> Result<SettlementOutcome>;
}

/// The acceptor's intake-enable line.
///
/// Called from the watchdog and from the synchronous edge handler, so
/// implementations must not block or await.
pub trait IntakeControl: Send + Sync {
    fn set_enabled(&self, enabled: bool);
}

pub type BackendHandle = Arc<dyn PaymentBackend>;
pub type IntakeHandle = Arc<dyn IntakeControl>;
