pub mod discovery;
pub mod engine;
