//! Admission-controlled CSV upload service.
//!
//! Uploads pass a load gate, then run under a FIFO concurrency limit.
//! Health reporting combines host resource usage with the status of an
//! external dependency reached through retries and a circuit breaker.

pub mod admission;
pub mod auth;
pub mod config;
pub mod health;
pub mod limiter;
pub mod monitor;
pub mod resilience;
pub mod server;
pub mod upload;
