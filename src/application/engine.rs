use crate::config::Config;
use crate::domain::denomination::{Amount, DenominationTable};
use crate::domain::ports::{BackendHandle, IntakeHandle, InvoiceId, Settlement, SettlementOutcome};
use crate::domain::session::{EdgeOutcome, Session, SessionSlot, SessionState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Immediate re-evaluations allowed after a correction before the watchdog
/// must sleep again.
const MAX_RECHECKS: u32 = 2;

/// What the watchdog decided on one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    /// No active session; the watchdog is done.
    Finished,
    /// A quiet-period correction was applied; re-evaluate without sleeping.
    Corrected,
    /// The session moved to `Settling`; a settlement request is due.
    Settle,
    /// Nothing to do until the next poll.
    Wait { remaining: Duration },
}

/// The transaction engine: owns the single process-wide session and arbitrates
/// between the edge handler, the watchdog and invoice discovery.
///
/// The edge handler is synchronous and only touches the session under a short
/// critical section; settlement network calls happen in the watchdog task with
/// the lock released.
pub struct TransactionEngine {
    session: Mutex<SessionSlot>,
    backend: BackendHandle,
    intake: IntakeHandle,
    table: DenominationTable,
    config: Config,
    watchdog_live: AtomicBool,
    runtime: tokio::runtime::Handle,
}

impl TransactionEngine {
    /// Builds the engine and drives the intake line low.
    ///
    /// Must be called from within a tokio runtime; the handle is captured so
    /// that watchdogs can be spawned from the hardware callback thread.
    pub fn new(config: Config, backend: BackendHandle, intake: IntakeHandle) -> Arc<Self> {
        intake.set_enabled(false);
        Arc::new(Self {
            session: Mutex::new(SessionSlot::Idle),
            backend,
            intake,
            table: DenominationTable::standard(),
            config,
            watchdog_live: AtomicBool::new(false),
            runtime: tokio::runtime::Handle::current(),
        })
    }

    /// Read-only projection for the status endpoint and discovery loop.
    pub fn is_busy(&self) -> bool {
        self.session.lock().is_active()
    }

    /// Materializes a new session for a discovered invoice.
    ///
    /// Returns `false` without side effects when a session is already active;
    /// exactly one session may exist process-wide.
    pub fn start_session(
        self: &Arc<Self>,
        id: InvoiceId,
        payment_token: String,
        price: Amount,
        now: Instant,
    ) -> bool {
        {
            let mut slot = self.session.lock();
            if slot.is_active() {
                return false;
            }
            info!(
                target: "payment",
                %id,
                token = %payment_token,
                price = %price,
                "transaction started"
            );
            *slot = SessionSlot::Active(Session::open(id, payment_token, price, now));
        }
        self.intake.set_enabled(true);
        self.spawn_watchdog();
        true
    }

    /// Hardware edge entry point. Must return quickly and never block on I/O.
    pub fn on_edge(self: &Arc<Self>, now: Instant) {
        let outcome = {
            let mut slot = self.session.lock();
            let Some(session) = slot.as_active_mut() else {
                return;
            };
            session.record_edge(now, self.config.debounce_window())
        };

        match outcome {
            EdgeOutcome::BurstStarted { pending } => {
                if self.config.pause_intake_while_counting {
                    // Hold the gate closed so the acceptor cannot feed a
                    // second bill mid-count.
                    self.intake.set_enabled(false);
                }
                debug!(pending, "pulse received");
                self.spawn_watchdog();
            }
            EdgeOutcome::Counted { pending } => {
                debug!(pending, "pulse received");
                self.spawn_watchdog();
            }
            EdgeOutcome::Bounced | EdgeOutcome::NotAccepting => {}
        }
    }

    /// Starts the watchdog task unless one is already alive.
    ///
    /// Returns whether a new watchdog was spawned. At most one runs at any
    /// instant, which is what prevents duplicate settlement requests.
    pub fn spawn_watchdog(self: &Arc<Self>) -> bool {
        if self
            .watchdog_live
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let engine = Arc::clone(self);
        self.runtime.spawn(async move {
            engine.watchdog_loop().await;
            engine.watchdog_live.store(false, Ordering::Release);
            // A session opened in the gap between loop exit and the store
            // above would otherwise tick without a watchdog.
            if engine.is_busy() {
                engine.spawn_watchdog();
            }
        });
        true
    }

    async fn watchdog_loop(&self) {
        debug!("watchdog started");
        let mut rechecks = 0u32;
        loop {
            match self.evaluate(Instant::now()) {
                Tick::Finished => break,
                Tick::Corrected => {
                    // Correction zeroes the pending count, so one immediate
                    // re-evaluation can settle a paid-up session without
                    // waiting a full poll tick. Bounded so the loop can never
                    // spin.
                    if rechecks < MAX_RECHECKS {
                        rechecks += 1;
                        continue;
                    }
                }
                Tick::Settle => {
                    if self.run_settlement().await {
                        break;
                    }
                    rechecks = 0;
                }
                Tick::Wait { remaining } => {
                    trace!(remaining_secs = remaining.as_secs(), "awaiting pulses");
                    rechecks = 0;
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
        debug!("watchdog finished");
    }

    /// One watchdog decision, taken under the session lock.
    fn evaluate(&self, now: Instant) -> Tick {
        let mut slot = self.session.lock();
        let Some(session) = slot.as_active_mut() else {
            return Tick::Finished;
        };
        if session.state == SessionState::Settling {
            return Tick::Wait {
                remaining: self.config.poll_interval(),
            };
        }

        let quiet = session.quiet_for(now);
        if quiet >= self.config.quiet_period() && session.pending_pulses > 0 {
            let raw = session.pending_pulses;
            match self.table.correct(raw, self.config.tolerance) {
                Some(amount) => {
                    session.absorb_correction(Some(amount));
                    info!(
                        target: "payment",
                        raw_pulses = raw,
                        amount = %amount,
                        total = %session.total_inserted,
                        remaining = %session.remaining_due(),
                        "burst corrected"
                    );
                }
                None => {
                    session.absorb_correction(None);
                    warn!(raw_pulses = raw, "burst outside tolerance, discarded");
                }
            }
            if self.config.pause_intake_while_counting {
                self.intake.set_enabled(true);
            }
            return Tick::Corrected;
        }

        if quiet >= self.config.quiet_period() && session.is_paid_up() {
            session.begin_settling();
            self.intake.set_enabled(false);
            if session.overpaid() > Amount::ZERO {
                info!(
                    target: "payment",
                    total = %session.total_inserted,
                    overpaid = %session.overpaid(),
                    "transaction complete with overpayment"
                );
            } else {
                info!(target: "payment", total = %session.total_inserted, "transaction complete");
            }
            return Tick::Settle;
        }

        let timeout = self.config.session_timeout();
        if session.timed_out(now, timeout) {
            session.begin_settling();
            self.intake.set_enabled(false);
            warn!(
                target: "payment",
                total = %session.total_inserted,
                remaining = %session.remaining_due(),
                "session timed out, settling with what arrived"
            );
            return Tick::Settle;
        }

        Tick::Wait {
            remaining: timeout - quiet,
        }
    }

    /// Sends the settlement request and applies the backend's verdict.
    ///
    /// Returns `true` once the session is closed and the watchdog can exit.
    async fn run_settlement(&self) -> bool {
        let settlement = {
            let slot = self.session.lock();
            match slot.as_active() {
                Some(session) => Settlement {
                    id: session.id.clone(),
                    payment_token: session.payment_token.clone(),
                    product_price: session.total_inserted,
                },
                None => return true,
            }
        };

        match self.backend.settle(&settlement).await {
            Ok(SettlementOutcome::Accepted) => {
                info!(
                    target: "payment",
                    id = %settlement.id,
                    amount = %settlement.product_price,
                    "settlement accepted"
                );
                self.close_session();
                true
            }
            Ok(SettlementOutcome::AlreadyPaid) => {
                info!(target: "payment", id = %settlement.id, "invoice already paid, closing session");
                self.close_session();
                true
            }
            Ok(SettlementOutcome::InsufficientPayment) => self.handle_shortfall(),
            Ok(SettlementOutcome::Rejected) => {
                warn!(id = %settlement.id, "settlement rejected, retrying on next tick");
                self.revert_to_accumulating();
                false
            }
            Err(error) => {
                warn!(%error, "settlement request failed, retrying on next tick");
                self.revert_to_accumulating();
                false
            }
        }
    }

    /// Underpayment retry policy.
    ///
    /// Within budget the session reopens for more money with a fresh timeout
    /// clock; beyond it the session is cancelled. A budget of zero cancels on
    /// the first shortfall.
    fn handle_shortfall(&self) -> bool {
        let mut slot = self.session.lock();
        let Some(session) = slot.as_active_mut() else {
            return true;
        };
        let attempts = session.register_shortfall();
        let budget = self.config.max_insufficient_retries;
        if attempts >= budget {
            warn!(
                target: "payment",
                attempts,
                budget,
                "underpaid beyond retry budget, cancelling session"
            );
            slot.close();
            self.intake.set_enabled(false);
            info!(target: "payment", "session reset to idle");
            true
        } else {
            info!(
                target: "payment",
                attempts,
                budget,
                total = %session.total_inserted,
                remaining = %session.remaining_due(),
                "underpaid, waiting for more money"
            );
            session.reopen(Instant::now());
            self.intake.set_enabled(true);
            false
        }
    }

    fn close_session(&self) {
        self.intake.set_enabled(false);
        self.session.lock().close();
        info!(target: "payment", "session reset to idle");
    }

    fn revert_to_accumulating(&self) {
        let mut slot = self.session.lock();
        if let Some(session) = slot.as_active_mut()
            && session.state == SessionState::Settling
        {
            // Timeout clock deliberately untouched: the already-elapsed
            // timeout fires again next tick and settlement is retried at
            // poll cadence.
            session.state = SessionState::Accumulating;
        }
    }
}
