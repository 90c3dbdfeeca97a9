pub mod denomination;
pub mod ports;
pub mod session;
