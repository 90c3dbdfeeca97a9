pub mod backend;
#[cfg(feature = "hardware-rppal")]
pub mod gpio;
pub mod intake;
