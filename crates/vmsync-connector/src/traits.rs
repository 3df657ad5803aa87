//! Collaborator traits
//!
//! Capability-based trait definitions for the source of truth and the
//! registry. The reconciliation engine only ever sees these traits, so the
//! REST clients and the in-memory test doubles are interchangeable.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::error::ConnectorResult;
use crate::ids::{ClusterId, InterfaceId, IpAddressId, SiteId, VmId};
use crate::model::{
    Cluster, ClusterType, CustomField, IpAddressRecord, NewCluster, NewIpAddress, NewVm,
    Platform, RegistryVm, Site, SourceVm, Tag, VmInterface,
};

/// Base trait for all collaborators.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Test the connection to the remote system.
    ///
    /// Returns `Ok(())` if the connection is successful, or an error describing
    /// what went wrong.
    async fn test_connection(&self) -> ConnectorResult<()>;
}

/// Read-only access to the authoritative VM inventory.
#[async_trait]
pub trait SourceInventory: Connector {
    /// Fetch every virtual machine the source knows about.
    ///
    /// This is a whole-result call: a partial listing is an error.
    async fn list_virtual_machines(&self) -> ConnectorResult<Vec<SourceVm>>;

    /// Fetch the names of all clusters.
    async fn list_clusters(&self) -> ConnectorResult<Vec<String>>;
}

/// Capability for reading and writing VM records in the registry.
#[async_trait]
pub trait VirtualMachineOps: Connector {
    /// List every VM record.
    async fn list_vms(&self) -> ConnectorResult<Vec<RegistryVm>>;

    /// Create a VM record in one request.
    async fn create_vm(&self, vm: &NewVm) -> ConnectorResult<RegistryVm>;

    /// Persist the mutable fields of an existing VM record.
    ///
    /// Writes cluster, site, status, sizing, platform, comments, custom
    /// fields, tags and primary addresses.
    async fn update_vm(&self, vm: &RegistryVm) -> ConnectorResult<RegistryVm>;
}

/// Capability for clusters, cluster types and sites.
#[async_trait]
pub trait ClusterOps: Connector {
    /// List every cluster.
    async fn list_clusters(&self) -> ConnectorResult<Vec<Cluster>>;

    /// Get a cluster by id, `None` if it no longer exists.
    async fn get_cluster(&self, id: ClusterId) -> ConnectorResult<Option<Cluster>>;

    async fn find_cluster_by_name(&self, name: &str) -> ConnectorResult<Option<Cluster>>;

    async fn create_cluster(&self, cluster: &NewCluster) -> ConnectorResult<Cluster>;

    async fn find_cluster_type_by_name(&self, name: &str) -> ConnectorResult<Option<ClusterType>>;

    async fn create_cluster_type(&self, name: &str, slug: &str) -> ConnectorResult<ClusterType>;

    /// Get a site by id, `None` if it no longer exists.
    async fn get_site(&self, id: SiteId) -> ConnectorResult<Option<Site>>;

    async fn find_site_by_name(&self, name: &str) -> ConnectorResult<Option<Site>>;

    async fn create_site(&self, name: &str, slug: &str) -> ConnectorResult<Site>;
}

/// Capability for VM interfaces and IP address records.
#[async_trait]
pub trait InterfaceOps: Connector {
    /// Find the interface with this name on a VM.
    async fn find_interface(&self, vm: VmId, name: &str) -> ConnectorResult<Option<VmInterface>>;

    /// Create an enabled interface on a VM.
    async fn create_interface(&self, vm: VmId, name: &str) -> ConnectorResult<VmInterface>;

    /// Find every IP address record for this literal address, any prefix.
    async fn find_ip_addresses(&self, address: IpAddr) -> ConnectorResult<Vec<IpAddressRecord>>;

    async fn create_ip_address(&self, ip: &NewIpAddress) -> ConnectorResult<IpAddressRecord>;

    /// Bind an existing IP address record to a VM interface.
    async fn assign_ip_address(
        &self,
        id: IpAddressId,
        interface: InterfaceId,
    ) -> ConnectorResult<IpAddressRecord>;
}

/// Capability for tags and platforms.
#[async_trait]
pub trait TagOps: Connector {
    async fn find_tag_by_name(&self, name: &str) -> ConnectorResult<Option<Tag>>;

    async fn create_tag(&self, name: &str, slug: &str) -> ConnectorResult<Tag>;

    async fn find_platform_by_slug(&self, slug: &str) -> ConnectorResult<Option<Platform>>;

    async fn create_platform(&self, name: &str, slug: &str) -> ConnectorResult<Platform>;
}

/// Capability for discovering the registry's custom-field schema.
#[async_trait]
pub trait SchemaOps: Connector {
    /// List the custom fields declared on the registry.
    async fn list_custom_fields(&self) -> ConnectorResult<Vec<CustomField>>;
}

/// Marker trait for registries that support every capability the
/// reconciliation engine needs.
pub trait Registry: VirtualMachineOps + ClusterOps + InterfaceOps + TagOps + SchemaOps {}

// Blanket implementation for any connector that implements all capabilities
impl<T> Registry for T where T: VirtualMachineOps + ClusterOps + InterfaceOps + TagOps + SchemaOps {}
