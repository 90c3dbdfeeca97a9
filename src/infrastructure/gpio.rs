use crate::application::engine::TransactionEngine;
use crate::domain::ports::IntakeControl;
use crate::error::{BridgeError, Result};
use parking_lot::Mutex;
use rppal::gpio::{Event, Gpio, InputPin, OutputPin, Trigger};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Drives the acceptor's intake-enable line through a GPIO output pin.
///
/// Constructed with the line low; the engine raises it when a session opens.
pub struct GpioIntake {
    pin: Mutex<OutputPin>,
}

impl GpioIntake {
    /// Fails when the GPIO interface cannot be attached, which is fatal at
    /// process start: the bridge must not serve sessions it cannot gate.
    pub fn new(enable_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| BridgeError::Hardware(e.to_string()))?;
        let pin = gpio
            .get(enable_pin)
            .map_err(|e| BridgeError::Hardware(e.to_string()))?
            .into_output_low();
        Ok(Self {
            pin: Mutex::new(pin),
        })
    }
}

impl IntakeControl for GpioIntake {
    fn set_enabled(&self, enabled: bool) {
        let mut pin = self.pin.lock();
        if enabled {
            pin.set_high();
        } else {
            pin.set_low();
        }
    }
}

/// Subscribes the engine to rising edges on the acceptor's pulse pin.
///
/// The callback fires on rppal's interrupt thread; `on_edge` is synchronous
/// and lock-light, so no work is deferred here. Hardware-level debounce is
/// left off, the engine's debounce window owns that decision.
pub struct PulseSource {
    _pin: InputPin,
}

impl PulseSource {
    pub fn attach(engine: Arc<TransactionEngine>, pulse_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| BridgeError::Hardware(e.to_string()))?;
        let mut pin = gpio
            .get(pulse_pin)
            .map_err(|e| BridgeError::Hardware(e.to_string()))?
            .into_input_pullup();

        pin.set_async_interrupt(Trigger::RisingEdge, None, move |_event: Event| {
            engine.on_edge(Instant::now());
        })
        .map_err(|e| BridgeError::Hardware(e.to_string()))?;

        info!(pin = pulse_pin, "pulse input attached");
        Ok(Self { _pin: pin })
    }
}
