pub mod app_state;
pub mod backends;
pub mod errors;
pub mod telemetry;
pub mod viewers;
