//! HTTP surface for the stitch chunked upload coordinator.
//!
//! This crate provides:
//! - Multipart chunk upload
//! - Status and completeness queries
//! - Merge, purge and artifact download
//! - Health and Prometheus metrics endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
