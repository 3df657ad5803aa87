//! # NetBox Registry Client
//!
//! Registry collaborator for vmsync backed by the NetBox REST API.
//!
//! ## Features
//!
//! - Token authentication
//! - `next`-link pagination on list endpoints
//! - Lookups by id treat HTTP 404 as absent
//! - Rejected writes classified as duplicate-key or validation errors
//!
//! ## Example
//!
//! ```ignore
//! use vmsync_connector_netbox::{NetBoxConfig, NetBoxConnector};
//! use vmsync_connector::prelude::*;
//!
//! let config = NetBoxConfig::new("https://netbox.example.com", "0123456789abcdef")
//!     .with_timeout_secs(30);
//!
//! let connector = NetBoxConnector::new(config)?;
//! connector.test_connection().await?;
//! ```

pub mod config;
pub mod connector;

// Re-exports
pub use config::NetBoxConfig;
pub use connector::NetBoxConnector;
