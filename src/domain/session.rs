use crate::domain::denomination::Amount;
use crate::domain::ports::InvoiceId;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle phase of an active session.
///
/// `Idle` and the terminal `Closed` phase have no struct of their own: an idle
/// process holds [`SessionSlot::Idle`], and closing a session immediately
/// folds it back to that slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Invoice located and intake enabled, no money seen yet.
    Awaiting,
    /// Pulses arriving or corrected amounts accumulating.
    Accumulating,
    /// Settlement request in flight; intake disabled.
    Settling,
}

/// Outcome of feeding one hardware edge into the debouncer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOutcome {
    /// First pulse of a new burst; the caller may drop the intake line.
    BurstStarted { pending: u32 },
    /// Pulse counted into an ongoing burst.
    Counted { pending: u32 },
    /// Edge arrived inside the debounce window, discarded.
    Bounced,
    /// Session is settling and no longer accepts pulses.
    NotAccepting,
}

/// One end-to-end attempt to settle a specific invoice with physical currency.
#[derive(Debug, Clone)]
pub struct Session {
    /// Backend-issued invoice identifier, passed back verbatim on settlement.
    pub id: InvoiceId,
    /// Opaque token correlating the session to the backend invoice.
    pub payment_token: String,
    /// Amount owed, fixed at session start.
    pub price: Amount,
    /// Corrected amounts accumulated so far; never decreases within a session.
    pub total_inserted: Amount,
    /// Debounced edges not yet corrected into an amount.
    pub pending_pulses: u32,
    /// Backend underpayment rejections seen so far.
    pub insufficiency_count: u32,
    /// Most recent debounced pulse or state transition; drives the quiet
    /// period and the timeout clock.
    pub last_activity: Instant,
    last_edge: Option<Instant>,
    pub state: SessionState,
}

impl Session {
    pub fn open(id: InvoiceId, payment_token: String, price: Amount, now: Instant) -> Self {
        Self {
            id,
            payment_token,
            price,
            total_inserted: Amount::ZERO,
            pending_pulses: 0,
            insufficiency_count: 0,
            last_activity: now,
            last_edge: None,
            state: SessionState::Awaiting,
        }
    }

    /// Feeds one raw rising edge through the debounce filter.
    ///
    /// A genuine edge increments `pending_pulses`, stamps `last_activity` and
    /// moves an `Awaiting` session to `Accumulating`.
    pub fn record_edge(&mut self, now: Instant, debounce: Duration) -> EdgeOutcome {
        if self.state == SessionState::Settling {
            return EdgeOutcome::NotAccepting;
        }
        if let Some(last) = self.last_edge
            && now.saturating_duration_since(last) <= debounce
        {
            return EdgeOutcome::Bounced;
        }

        let burst_start = self.pending_pulses == 0;
        self.pending_pulses += 1;
        self.last_edge = Some(now);
        self.last_activity = now;
        self.state = SessionState::Accumulating;

        if burst_start {
            EdgeOutcome::BurstStarted {
                pending: self.pending_pulses,
            }
        } else {
            EdgeOutcome::Counted {
                pending: self.pending_pulses,
            }
        }
    }

    /// Folds a corrected burst amount into the running total and clears the
    /// pending count. `None` means the burst was noise and is discarded.
    pub fn absorb_correction(&mut self, amount: Option<Amount>) {
        if let Some(amount) = amount {
            self.total_inserted += amount;
        }
        self.pending_pulses = 0;
    }

    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub fn timed_out(&self, now: Instant, timeout: Duration) -> bool {
        self.quiet_for(now) >= timeout
    }

    pub fn is_paid_up(&self) -> bool {
        self.total_inserted >= self.price
    }

    pub fn remaining_due(&self) -> Amount {
        self.price.saturating_sub(self.total_inserted)
    }

    pub fn overpaid(&self) -> Amount {
        self.total_inserted.saturating_sub(self.price)
    }

    pub fn begin_settling(&mut self) {
        self.state = SessionState::Settling;
    }

    /// Counts a backend underpayment rejection and returns the new total.
    pub fn register_shortfall(&mut self) -> u32 {
        self.insufficiency_count += 1;
        self.insufficiency_count
    }

    /// Returns a settling session to `Accumulating` after an underpayment
    /// rejection. Resetting `last_activity` restarts the timeout clock from
    /// the retry, not from the original session start.
    pub fn reopen(&mut self, now: Instant) {
        self.state = SessionState::Accumulating;
        self.last_activity = now;
    }
}

/// The single process-wide session slot.
///
/// At most one session is active at any time; everything else is `Idle`.
#[derive(Debug, Clone, Default)]
pub enum SessionSlot {
    #[default]
    Idle,
    Active(Session),
}

impl SessionSlot {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn as_active(&self) -> Option<&Session> {
        match self {
            Self::Active(session) => Some(session),
            Self::Idle => None,
        }
    }

    pub fn as_active_mut(&mut self) -> Option<&mut Session> {
        match self {
            Self::Active(session) => Some(session),
            Self::Idle => None,
        }
    }

    /// Terminal transition: drops all session state and folds back to `Idle`.
    pub fn close(&mut self) {
        *self = Self::Idle;
    }
}
