//! # vSphere Source Client
//!
//! Source collaborator for vmsync backed by the vSphere Automation REST API.
//!
//! The connector opens a session with basic authentication, then walks
//! datacenters, clusters and VMs, enriching each VM with its detail record
//! and guest identity/networking information.
//!
//! ## Example
//!
//! ```ignore
//! use vmsync_connector_vsphere::{VsphereConfig, VsphereConnector};
//! use vmsync_connector::prelude::*;
//!
//! let config = VsphereConfig::new("vcenter.example.com", "svc-sync", "secret")
//!     .with_vm_limit(Some(50));
//!
//! let source = VsphereConnector::new(config)?;
//! let vms = source.list_virtual_machines().await?;
//! ```

pub mod config;
pub mod connector;

// Re-exports
pub use config::VsphereConfig;
pub use connector::VsphereConnector;
