//! End-to-end transaction scenarios driven through discovery, the edge
//! handler and the watchdog, with the tokio clock paused so timeouts and
//! quiet periods elapse instantly.

mod common;

use common::{MockBackend, RecordingIntake};
use pulsepay::application::discovery::InvoiceDiscovery;
use pulsepay::application::engine::TransactionEngine;
use pulsepay::config::Config;
use pulsepay::domain::denomination::Amount;
use pulsepay::domain::ports::{BackendHandle, IntakeHandle, SettlementOutcome};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{Instant, sleep};

struct Harness {
    engine: Arc<TransactionEngine>,
    backend: Arc<MockBackend>,
    intake: Arc<RecordingIntake>,
}

impl Harness {
    fn new(config: Config) -> Self {
        let backend = MockBackend::new();
        let intake = Arc::new(RecordingIntake::default());
        let engine = TransactionEngine::new(
            config.clone(),
            Arc::clone(&backend) as BackendHandle,
            Arc::clone(&intake) as IntakeHandle,
        );
        let discovery = InvoiceDiscovery::new(
            Arc::clone(&engine),
            Arc::clone(&backend) as BackendHandle,
            config,
        );
        tokio::spawn(discovery.run());
        Self {
            engine,
            backend,
            intake,
        }
    }

    /// Feeds `count` debounce-spaced edges.
    async fn pulse_burst(&self, count: u32) {
        for _ in 0..count {
            self.engine.on_edge(Instant::now());
            sleep(Duration::from_millis(60)).await;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn burst_covering_the_price_settles_after_quiet_period() {
    let h = Harness::new(Config::default());
    h.backend.push_invoice(1, "tok-a", 5_000, false, chrono::Utc::now());

    sleep(Duration::from_millis(10)).await;
    assert!(h.engine.is_busy());
    assert!(h.intake.is_enabled());

    h.pulse_burst(5).await;
    sleep(Duration::from_secs(4)).await;

    assert_eq!(h.backend.settled_amounts(), vec![Amount(5_000)]);
    assert!(!h.engine.is_busy());
    assert!(!h.intake.is_enabled());
    // The line's last recorded transition is the close-time drop.
    assert_eq!(h.intake.transitions.lock().last(), Some(&false));
}

#[tokio::test(start_paused = true)]
async fn two_bursts_accumulate_to_the_price() {
    let h = Harness::new(Config::default());
    h.backend
        .push_invoice(2, "tok-b", 10_000, false, chrono::Utc::now());

    sleep(Duration::from_millis(10)).await;
    h.pulse_burst(5).await;
    sleep(Duration::from_secs(4)).await;

    // First burst corrected to 5000, below the price: session keeps waiting
    // with the intake re-opened.
    assert!(h.engine.is_busy());
    assert!(h.intake.is_enabled());
    assert!(h.backend.settled_amounts().is_empty());

    h.pulse_burst(5).await;
    sleep(Duration::from_secs(4)).await;

    assert_eq!(h.backend.settled_amounts(), vec![Amount(10_000)]);
    assert!(!h.engine.is_busy());
}

#[tokio::test(start_paused = true)]
async fn timeout_settles_with_whatever_arrived() {
    // No pulses at all; retry budget of zero cancels on the first shortfall.
    let h = Harness::new(Config::default());
    h.backend.push_invoice(3, "tok-c", 5_000, false, chrono::Utc::now());
    h.backend
        .push_outcome(SettlementOutcome::InsufficientPayment);

    sleep(Duration::from_millis(10)).await;
    assert!(h.engine.is_busy());

    sleep(Duration::from_secs(200)).await;

    assert_eq!(h.backend.settled_amounts(), vec![Amount::ZERO]);
    assert!(!h.engine.is_busy());
    assert!(!h.intake.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn noise_burst_outside_tolerance_is_discarded() {
    let h = Harness::new(Config::default());
    h.backend.push_invoice(4, "tok-d", 5_000, false, chrono::Utc::now());

    sleep(Duration::from_millis(10)).await;
    // 97 pulses: near denomination 100 but outside tolerance 2.
    h.pulse_burst(97).await;
    sleep(Duration::from_secs(4)).await;

    assert!(h.backend.settled_amounts().is_empty());
    assert!(h.engine.is_busy());
    // Intake reopened after the discarded burst so real money can follow.
    assert!(h.intake.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn underpayment_with_retries_remaining_resets_the_timeout_clock() {
    let config = Config {
        session_timeout_secs: 10,
        max_insufficient_retries: 2,
        ..Config::default()
    };
    let h = Harness::new(config);
    h.backend.push_invoice(5, "tok-e", 5_000, false, chrono::Utc::now());
    h.backend
        .push_outcome(SettlementOutcome::InsufficientPayment);
    h.backend.push_outcome(SettlementOutcome::Accepted);

    sleep(Duration::from_millis(10)).await;
    assert!(h.engine.is_busy());

    // First timeout fires at ~10s and is rejected as underpaid.
    sleep(Duration::from_secs(12)).await;
    assert_eq!(h.backend.settled_amounts().len(), 1);
    assert!(h.engine.is_busy());
    assert!(h.intake.is_enabled());

    // The timeout clock restarted at the retry: 6s later nothing new fired.
    sleep(Duration::from_secs(6)).await;
    assert_eq!(h.backend.settled_amounts().len(), 1);

    // A full timeout after the retry, the second settlement goes out.
    sleep(Duration::from_secs(6)).await;
    assert_eq!(h.backend.settled_amounts().len(), 2);
    assert!(!h.engine.is_busy());
}

#[tokio::test(start_paused = true)]
async fn rejected_settlement_is_retried_at_poll_cadence() {
    let h = Harness::new(Config::default());
    h.backend.push_invoice(12, "tok-j", 5_000, false, chrono::Utc::now());
    h.backend.push_outcome(SettlementOutcome::Rejected);
    h.backend.push_outcome(SettlementOutcome::Accepted);

    sleep(Duration::from_millis(10)).await;
    h.pulse_burst(5).await;
    sleep(Duration::from_secs(6)).await;

    // The unclassified rejection left the session accumulating with its
    // clock untouched, so the next tick re-fired the settlement and the
    // second verdict closed the session.
    assert_eq!(
        h.backend.settled_amounts(),
        vec![Amount(5_000), Amount(5_000)]
    );
    assert!(!h.engine.is_busy());
    assert!(!h.intake.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn already_paid_settlement_closes_the_session() {
    let h = Harness::new(Config::default());
    h.backend.push_invoice(6, "tok-f", 5_000, false, chrono::Utc::now());
    h.backend.push_outcome(SettlementOutcome::AlreadyPaid);

    sleep(Duration::from_millis(10)).await;
    h.pulse_burst(5).await;
    sleep(Duration::from_secs(4)).await;

    assert_eq!(h.backend.settled_amounts().len(), 1);
    assert!(!h.engine.is_busy());
    assert!(!h.intake.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn discovery_skips_paid_and_stale_invoices() {
    let h = Harness::new(Config::default());
    let stale = chrono::Utc::now() - chrono::Duration::minutes(10);
    h.backend.push_invoice(7, "tok-stale", 5_000, false, stale);
    h.backend
        .push_invoice(8, "tok-paid", 5_000, true, chrono::Utc::now());

    sleep(Duration::from_secs(2)).await;
    assert!(!h.engine.is_busy());
    assert!(!h.intake.is_enabled());
}

#[tokio::test(start_paused = true)]
async fn discovery_survives_backend_outages() {
    let h = Harness::new(Config::default());
    h.backend.fail_listing.store(true, Ordering::SeqCst);

    sleep(Duration::from_secs(3)).await;
    assert!(!h.engine.is_busy());

    h.backend.fail_listing.store(false, Ordering::SeqCst);
    h.backend.push_invoice(9, "tok-g", 5_000, false, chrono::Utc::now());
    sleep(Duration::from_secs(2)).await;
    assert!(h.engine.is_busy());
}

#[tokio::test(start_paused = true)]
async fn next_session_starts_with_clean_counters() {
    let h = Harness::new(Config::default());
    h.backend
        .push_invoice(10, "tok-h", 5_000, false, chrono::Utc::now());

    sleep(Duration::from_millis(10)).await;
    // Overpay: 10 pulses correct to 10000 against a 5000 price.
    h.pulse_burst(10).await;
    sleep(Duration::from_secs(4)).await;
    assert_eq!(h.backend.settled_amounts(), vec![Amount(10_000)]);
    assert!(!h.engine.is_busy());

    // A fresh invoice gets a fresh session; its settlement reflects only its
    // own pulses.
    h.backend
        .push_invoice(11, "tok-i", 5_000, false, chrono::Utc::now());
    sleep(Duration::from_secs(2)).await;
    assert!(h.engine.is_busy());
    h.pulse_burst(5).await;
    sleep(Duration::from_secs(4)).await;

    assert_eq!(
        h.backend.settled_amounts(),
        vec![Amount(10_000), Amount(5_000)]
    );
    assert!(!h.engine.is_busy());
}
