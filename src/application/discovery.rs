use crate::application::engine::TransactionEngine;
use crate::config::Config;
use crate::domain::ports::BackendHandle;
use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Polls the backend for an eligible unpaid invoice while no session is
/// active, and opens a session when one is found.
pub struct InvoiceDiscovery {
    engine: Arc<TransactionEngine>,
    backend: BackendHandle,
    config: Config,
}

impl InvoiceDiscovery {
    pub fn new(engine: Arc<TransactionEngine>, backend: BackendHandle, config: Config) -> Self {
        Self {
            engine,
            backend,
            config,
        }
    }

    /// Runs forever. Backend failures are logged and count as "no eligible
    /// invoice this cycle"; the loop never crashes out.
    pub async fn run(self) {
        loop {
            if !self.engine.is_busy() {
                if let Err(error) = self.poll_once().await {
                    warn!(%error, "invoice discovery cycle failed");
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// One discovery cycle: list, filter by age, fetch detail, open session.
    async fn poll_once(&self) -> Result<()> {
        let invoices = self.backend.device_invoices().await?;
        let now = Utc::now();

        for summary in invoices {
            let age = now.signed_duration_since(summary.created_at);
            if age > self.config.invoice_max_age() {
                continue;
            }
            info!(
                token = %summary.payment_token,
                age_secs = age.num_seconds(),
                "eligible invoice found"
            );

            let detail = self.backend.invoice_detail(&summary.payment_token).await?;
            if detail.is_paid {
                info!(token = %summary.payment_token, "invoice already paid, keep searching");
                continue;
            }

            self.engine.start_session(
                detail.id,
                summary.payment_token,
                detail.product_price,
                Instant::now(),
            );
            return Ok(());
        }

        debug!("no eligible invoice this cycle");
        Ok(())
    }
}
