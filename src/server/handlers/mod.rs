//! HTTP request handlers for the upload service.

mod health;
mod upload;

// Re-export handlers for use by the router
pub use health::{health, health_check};
pub use upload::upload_file;
