//! Runtime glue: configuration, the engine clock, boundary tracking, telemetry,
//! and runner orchestration.

pub mod clock;
pub mod config;
pub mod progress;
pub mod runner;
pub mod telemetry;
