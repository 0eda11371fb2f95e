//! # foxess-cloud - FoxESS Cloud OpenAPI adapter
//!
//! Client and reconciliation logic for monitoring and controlling FoxESS
//! solar inverters through the vendor's cloud API, packaged for embedding
//! in a home-automation host.
//!
//! ## Features
//!
//! - **Signed API client**: MD5 request signing, per-client throttling and a
//!   small error taxonomy (authentication, connection, API)
//! - **Call tracking**: rolling 24-hour request counter
//! - **Coordinators**: device detail, real-time snapshot and scheduler
//!   refresh with `watch` subscriptions
//! - **Scheduler staging**: local edits of a single time segment with dirty
//!   tracking, restore and submit
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `api`: Signed HTTP client, wire types and setting keys
//! - `tracker`: Rolling API call counter
//! - `coordinator`: Refresh coordinators and scheduler staging
//! - `projection`: Host-facing value tables and device info

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod projection;
pub mod tracker;

// Re-export commonly used types
pub use api::FoxessClient;
pub use config::Config;
pub use coordinator::{DeviceDetailCoordinator, RealTimeCoordinator, SchedulerCoordinator};
pub use error::{FoxessError, Result};
pub use tracker::ApiCallTracker;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
