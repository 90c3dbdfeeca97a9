use crate::domain::ports::IntakeControl;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Intake stand-in for builds without GPIO support.
///
/// Tracks the logical line state and logs transitions so the state machine
/// can be exercised against a staging backend on a development machine.
#[derive(Default)]
pub struct DisconnectedIntake {
    enabled: AtomicBool,
}

impl DisconnectedIntake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl IntakeControl for DisconnectedIntake {
    fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            debug!(enabled, "intake line (disconnected)");
        }
    }
}
