use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulsepay::domain::denomination::Amount;
use pulsepay::domain::ports::{
    IntakeControl, InvoiceDetail, InvoiceId, InvoiceSummary, PaymentBackend, Settlement,
    SettlementOutcome,
};
use pulsepay::error::{BridgeError, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Scriptable in-memory backend. Invoices are handed out once; settlement
/// verdicts are consumed from a queue, defaulting to `Accepted`.
pub struct MockBackend {
    invoices: Mutex<Vec<InvoiceSummary>>,
    details: Mutex<HashMap<String, InvoiceDetail>>,
    outcomes: Mutex<VecDeque<SettlementOutcome>>,
    pub settlements: Mutex<Vec<Settlement>>,
    pub fail_listing: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            invoices: Mutex::new(Vec::new()),
            details: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(VecDeque::new()),
            settlements: Mutex::new(Vec::new()),
            fail_listing: AtomicBool::new(false),
        })
    }

    pub fn push_invoice(
        &self,
        id: u64,
        token: &str,
        price: u64,
        is_paid: bool,
        created_at: DateTime<Utc>,
    ) {
        self.invoices.lock().push(InvoiceSummary {
            id: InvoiceId(serde_json::json!(id)),
            payment_token: token.to_string(),
            created_at,
        });
        self.details.lock().insert(
            token.to_string(),
            InvoiceDetail {
                id: InvoiceId(serde_json::json!(id)),
                is_paid,
                product_price: Amount(price),
            },
        );
    }

    pub fn push_outcome(&self, outcome: SettlementOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn settled_amounts(&self) -> Vec<Amount> {
        self.settlements
            .lock()
            .iter()
            .map(|s| s.product_price)
            .collect()
    }
}

#[async_trait]
impl PaymentBackend for MockBackend {
    async fn device_invoices(&self) -> Result<Vec<InvoiceSummary>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(BridgeError::Backend("listing unavailable".into()));
        }
        Ok(self.invoices.lock().drain(..).collect())
    }

    async fn invoice_detail(&self, payment_token: &str) -> Result<InvoiceDetail> {
        self.details
            .lock()
            .get(payment_token)
            .cloned()
            .ok_or_else(|| BridgeError::Backend(format!("unknown token {payment_token}")))
    }

    async fn settle(&self, settlement: &Settlement) -> Result<SettlementOutcome> {
        self.settlements.lock().push(settlement.clone());
        Ok(self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(SettlementOutcome::Accepted))
    }
}

/// Records every intake-line transition the engine drives.
#[derive(Default)]
pub struct RecordingIntake {
    enabled: AtomicBool,
    pub transitions: Mutex<Vec<bool>>,
}

impl RecordingIntake {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl IntakeControl for RecordingIntake {
    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        self.transitions.lock().push(enabled);
    }
}
