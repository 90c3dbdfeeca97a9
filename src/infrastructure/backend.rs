use crate::config::Config;
use crate::domain::ports::{
    InvoiceDetail, InvoiceSummary, PaymentBackend, Settlement, SettlementOutcome,
};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// Envelope every backend response wraps its payload in.
#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

/// reqwest-backed [`PaymentBackend`] adapter.
///
/// All response interpretation happens here; the core only ever sees the
/// tagged [`SettlementOutcome`] variants.
pub struct HttpPaymentBackend {
    client: Client,
    device_invoice_url: String,
    invoice_url: String,
    settlement_url: String,
}

impl HttpPaymentBackend {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .connect_timeout(Duration::from_secs(2))
            .build()?;

        Ok(Self {
            client,
            device_invoice_url: format!(
                "{}/{}",
                config.device_invoice_url.trim_end_matches('/'),
                config.device_id
            ),
            invoice_url: config.invoice_url.clone(),
            settlement_url: config.settlement_url.clone(),
        })
    }
}

#[async_trait]
impl PaymentBackend for HttpPaymentBackend {
    async fn device_invoices(&self) -> Result<Vec<InvoiceSummary>> {
        let response = self.client.get(&self.device_invoice_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Backend(format!(
                "invoice listing returned {status}"
            )));
        }
        let envelope: DataEnvelope<Vec<InvoiceSummary>> = response.json().await?;
        Ok(envelope.data)
    }

    async fn invoice_detail(&self, payment_token: &str) -> Result<InvoiceDetail> {
        let url = format!("{}{payment_token}", self.invoice_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BridgeError::Backend(format!(
                "invoice detail returned {status}"
            )));
        }
        let envelope: DataEnvelope<InvoiceDetail> = response.json().await?;
        Ok(envelope.data)
    }

    async fn settle(&self, settlement: &Settlement) -> Result<SettlementOutcome> {
        let response = self
            .client
            .post(&self.settlement_url)
            .json(settlement)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let (message, paid_at) = confirmation_fields(&body);
            info!(message, paid_at, "payment confirmed by backend");
            return Ok(SettlementOutcome::Accepted);
        }

        if status == StatusCode::BAD_REQUEST {
            let text = response.text().await?;
            let message = rejection_message(&text);
            return Ok(classify_rejection(&message));
        }

        Err(BridgeError::Backend(format!(
            "settlement returned {status}"
        )))
    }
}

/// Confirmation message and payment date from a success body; either may be
/// absent.
fn confirmation_fields(body: &Value) -> (&str, &str) {
    (
        body.get("message").and_then(Value::as_str).unwrap_or(""),
        body.get("payment date").and_then(Value::as_str).unwrap_or(""),
    )
}

/// Pulls the human-readable error out of a rejection body, falling back to
/// the raw text when the body is not JSON.
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .or_else(|| v.get("message"))
                .and_then(Value::as_str)
                .map(str::to_owned)
        })
        .unwrap_or_else(|| body.to_owned())
}

fn classify_rejection(message: &str) -> SettlementOutcome {
    if message.contains("Insufficient payment") {
        SettlementOutcome::InsufficientPayment
    } else if message.contains("Payment already completed") {
        SettlementOutcome::AlreadyPaid
    } else {
        warn!(message, "backend rejected settlement");
        SettlementOutcome::Rejected
    }
}
