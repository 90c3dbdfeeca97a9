use crate::error::{BridgeError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DEVICE_ID: &str = "bic01";
const DEFAULT_DEVICE_INVOICE_URL: &str = "https://app.xpdisi.id/api/invoice/device";
const DEFAULT_INVOICE_URL: &str = "https://app.xpdisi.id/api/invoice/";
const DEFAULT_SETTLEMENT_URL: &str = "https://app.xpdisi.id/api/order/billacceptor";

/// Runtime configuration for the bill-acceptor bridge.
///
/// Every knob can be set by command-line flag or environment variable, so the
/// same binary serves bench setups and field deployments.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Device identifier used to scope the invoice listing
    #[arg(long, env = "PULSEPAY_DEVICE_ID", default_value = DEFAULT_DEVICE_ID)]
    pub device_id: String,

    /// Base URL of the per-device invoice listing endpoint
    #[arg(long, env = "PULSEPAY_DEVICE_INVOICE_URL", default_value = DEFAULT_DEVICE_INVOICE_URL)]
    pub device_invoice_url: String,

    /// Base URL of the invoice detail endpoint; the payment token is appended
    #[arg(long, env = "PULSEPAY_INVOICE_URL", default_value = DEFAULT_INVOICE_URL)]
    pub invoice_url: String,

    /// URL of the settlement endpoint
    #[arg(long, env = "PULSEPAY_SETTLEMENT_URL", default_value = DEFAULT_SETTLEMENT_URL)]
    pub settlement_url: String,

    /// Directory for the persistent log file; stdout only when unset
    #[arg(long, env = "PULSEPAY_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Listen port for the status endpoint
    #[arg(long, env = "PULSEPAY_LISTEN_PORT", default_value_t = 5000)]
    pub listen_port: u16,

    /// BCM pin carrying the acceptor's pulse output
    #[arg(long, env = "PULSEPAY_PULSE_PIN", default_value_t = 14)]
    pub pulse_pin: u8,

    /// BCM pin driving the acceptor's intake-enable line
    #[arg(long, env = "PULSEPAY_ENABLE_PIN", default_value_t = 15)]
    pub enable_pin: u8,

    /// Seconds of inactivity before a session is settled regardless of amount
    #[arg(long, env = "PULSEPAY_SESSION_TIMEOUT_SECS", default_value_t = 180)]
    pub session_timeout_secs: u64,

    /// Milliseconds of quiet after the last pulse before a burst is corrected
    #[arg(long, env = "PULSEPAY_QUIET_PERIOD_MS", default_value_t = 2000)]
    pub quiet_period_ms: u64,

    /// Debounce window in milliseconds; edges inside it are discarded
    #[arg(long, env = "PULSEPAY_DEBOUNCE_MS", default_value_t = 50)]
    pub debounce_ms: u64,

    /// Watchdog and invoice-discovery poll interval in milliseconds
    #[arg(long, env = "PULSEPAY_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Maximum pulse-count distance accepted by denomination correction
    #[arg(long, env = "PULSEPAY_TOLERANCE", default_value_t = 2)]
    pub tolerance: u32,

    /// Underpayment rejections tolerated before a session is cancelled
    #[arg(long, env = "PULSEPAY_MAX_INSUFFICIENT_RETRIES", default_value_t = 0)]
    pub max_insufficient_retries: u32,

    /// Drop the intake line while a burst is being counted
    #[arg(
        long,
        env = "PULSEPAY_PAUSE_INTAKE_WHILE_COUNTING",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub pause_intake_while_counting: bool,

    /// Maximum invoice age in seconds considered by discovery
    #[arg(long, env = "PULSEPAY_INVOICE_MAX_AGE_SECS", default_value_t = 180)]
    pub invoice_max_age_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            device_invoice_url: DEFAULT_DEVICE_INVOICE_URL.to_string(),
            invoice_url: DEFAULT_INVOICE_URL.to_string(),
            settlement_url: DEFAULT_SETTLEMENT_URL.to_string(),
            log_dir: None,
            listen_port: 5000,
            pulse_pin: 14,
            enable_pin: 15,
            session_timeout_secs: 180,
            quiet_period_ms: 2000,
            debounce_ms: 50,
            poll_interval_ms: 1000,
            tolerance: 2,
            max_insufficient_retries: 0,
            pause_intake_while_counting: true,
            invoice_max_age_secs: 180,
        }
    }
}

impl Config {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn invoice_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.invoice_max_age_secs as i64)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            return Err(BridgeError::Config("device id must not be empty".into()));
        }
        for (name, url) in [
            ("device invoice URL", &self.device_invoice_url),
            ("invoice URL", &self.invoice_url),
            ("settlement URL", &self.settlement_url),
        ] {
            if url.is_empty() {
                return Err(BridgeError::Config(format!("{name} must not be empty")));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::Config("poll interval must be non-zero".into()));
        }
        if self.quiet_period_ms <= self.debounce_ms {
            return Err(BridgeError::Config(
                "quiet period must exceed the debounce window".into(),
            ));
        }
        if self.session_timeout() <= self.quiet_period() {
            return Err(BridgeError::Config(
                "session timeout must exceed the quiet period".into(),
            ));
        }
        Ok(())
    }
}
