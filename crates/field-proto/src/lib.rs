pub mod detection;
pub mod envelope;
pub mod state;
pub mod telemetry;
