//! # vmsync Connector Contracts
//!
//! Entity model and collaborator abstractions shared by the vmsync
//! reconciliation engine and its clients.
//!
//! ## Architecture
//!
//! The source of truth and the registry are reached through
//! capability-based traits:
//!
//! - [`traits::Connector`] - Base trait every collaborator implements
//! - [`traits::SourceInventory`] - Read the authoritative VM inventory
//! - [`traits::VirtualMachineOps`], [`traits::ClusterOps`],
//!   [`traits::InterfaceOps`], [`traits::TagOps`], [`traits::SchemaOps`] -
//!   Registry capabilities
//! - [`traits::Registry`] - Marker for a registry with every capability
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmsync_connector::prelude::*;
//!
//! let registry: Arc<dyn Registry> = Arc::new(netbox_connector);
//! registry.test_connection().await?;
//!
//! for vm in registry.list_vms().await? {
//!     println!("{} is {}", vm.name, vm.status);
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`ids`] - Type-safe registry identifiers (`VmId`, `ClusterId`, etc.)
//! - [`types`] - Status enums
//! - [`model`] - Source and registry entity types
//! - [`error`] - Error types with transport/rejection classification
//! - [`traits`] - Collaborator capability traits

pub mod error;
pub mod ids;
pub mod model;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use vmsync_connector::prelude::*;
/// ```
pub mod prelude {
    // IDs
    pub use crate::ids::{
        ClusterId, ClusterTypeId, InterfaceId, IpAddressId, PlatformId, RoleId, SiteId, TagId,
        TenantId, VmId,
    };

    // Types and enums
    pub use crate::types::VmStatus;

    // Error handling
    pub use crate::error::{ConnectorError, ConnectorResult};

    // Traits
    pub use crate::traits::{
        ClusterOps, Connector, InterfaceOps, Registry, SchemaOps, SourceInventory, TagOps,
        VirtualMachineOps,
    };

    // Model
    pub use crate::model::{
        AssignedObject, Cluster, ClusterType, CustomField, IpAddressRecord, NewCluster,
        NewIpAddress, NewVm, Platform, RegistryVm, Site, SourceVm, Tag, VmInterface,
    };
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;
