//! Shared test doubles: an in-memory registry and a static source.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vmsync_connector::prelude::*;
use vmsync_reconcile::reconciliation::ReconciliationEngine;

// =============================================================================
// In-memory registry
// =============================================================================

/// Everything the in-memory registry stores.
#[derive(Debug, Default, Clone)]
pub struct RegistryState {
    pub vms: BTreeMap<VmId, RegistryVm>,
    pub clusters: Vec<Cluster>,
    pub cluster_types: Vec<ClusterType>,
    pub sites: Vec<Site>,
    pub interfaces: Vec<VmInterface>,
    pub ips: Vec<IpAddressRecord>,
    pub tags: Vec<Tag>,
    pub platforms: Vec<Platform>,
    pub custom_fields: Vec<CustomField>,
    next_id: u64,
}

impl RegistryState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Registry double with NetBox-like uniqueness rules and failure switches.
#[derive(Default)]
pub struct MemoryRegistry {
    state: Mutex<RegistryState>,
    fail_listing: AtomicBool,
    reject_updates: AtomicBool,
    reject_creates: AtomicBool,
    reject_ip_writes: AtomicBool,
    unreachable_clusters: Mutex<Vec<ClusterId>>,
    update_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut RegistryState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    /// Copy of the whole store.
    pub fn state(&self) -> RegistryState {
        self.with_state(|s| s.clone())
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn reject_updates(&self) {
        self.reject_updates.store(true, Ordering::SeqCst);
    }

    pub fn reject_creates(&self) {
        self.reject_creates.store(true, Ordering::SeqCst);
    }

    /// Refuse address creates and rebinds as duplicates.
    pub fn reject_ip_writes(&self) {
        self.reject_ip_writes.store(true, Ordering::SeqCst);
    }

    /// Lookups of `id` fail with a transport error.
    pub fn break_cluster_lookup(&self, id: ClusterId) {
        self.unreachable_clusters.lock().unwrap().push(id);
    }

    fn ip_write_refused(&self) -> ConnectorResult<()> {
        if self.reject_ip_writes.load(Ordering::SeqCst) {
            return Err(ConnectorError::duplicate(
                "ip address",
                "Duplicate IP address found in global table",
            ));
        }
        Ok(())
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    pub fn add_site(&self, name: &str) -> SiteId {
        self.with_state(|s| {
            let id = SiteId::new(s.next_id());
            s.sites.push(Site {
                id,
                name: name.to_string(),
                slug: name.to_lowercase(),
            });
            id
        })
    }

    pub fn add_cluster(&self, name: &str, site: Option<SiteId>) -> ClusterId {
        self.with_state(|s| {
            let id = ClusterId::new(s.next_id());
            s.clusters.push(Cluster {
                id,
                name: name.to_string(),
                site,
            });
            id
        })
    }

    pub fn add_custom_field(&self, name: &str) {
        self.with_state(|s| {
            let id = s.next_id();
            s.custom_fields.push(CustomField {
                id,
                name: name.to_string(),
            });
        });
    }

    pub fn add_tag(&self, name: &str) -> Tag {
        self.with_state(|s| {
            let tag = Tag {
                id: TagId::new(s.next_id()),
                name: name.to_string(),
                slug: name.to_lowercase(),
            };
            s.tags.push(tag.clone());
            tag
        })
    }

    /// Insert a VM record with a fresh id.
    pub fn add_vm(&self, name: &str, cluster: Option<ClusterId>, site: Option<SiteId>) -> VmId {
        self.with_state(|s| {
            let id = VmId::new(s.next_id());
            s.vms.insert(id, blank_vm(id, name, cluster, site));
            id
        })
    }

    pub fn modify_vm(&self, id: VmId, f: impl FnOnce(&mut RegistryVm)) {
        self.with_state(|s| {
            if let Some(vm) = s.vms.get_mut(&id) {
                f(vm);
            }
        });
    }

    pub fn add_interface(&self, vm: VmId) -> InterfaceId {
        self.with_state(|s| {
            let id = InterfaceId::new(s.next_id());
            s.interfaces.push(VmInterface {
                id,
                vm,
                name: "ens192".to_string(),
                enabled: true,
            });
            id
        })
    }

    pub fn add_ip(&self, address: &str, assigned: Option<AssignedObject>) -> IpAddressId {
        let address: IpAddr = address.parse().unwrap();
        self.with_state(|s| {
            let id = IpAddressId::new(s.next_id());
            s.ips.push(IpAddressRecord {
                id,
                address,
                prefix_len: if address.is_ipv4() { 24 } else { 64 },
                assigned,
            });
            id
        })
    }

    pub fn remove_cluster(&self, id: ClusterId) {
        self.with_state(|s| s.clusters.retain(|c| c.id != id));
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn vms_named(&self, name: &str) -> Vec<RegistryVm> {
        self.with_state(|s| {
            s.vms
                .values()
                .filter(|vm| vm.name.eq_ignore_ascii_case(name))
                .cloned()
                .collect()
        })
    }

    /// The single VM with this name.
    pub fn vm_named(&self, name: &str) -> RegistryVm {
        let mut vms = self.vms_named(name);
        assert_eq!(vms.len(), 1, "expected exactly one VM named {name}");
        vms.remove(0)
    }

    pub fn vm(&self, id: VmId) -> RegistryVm {
        self.with_state(|s| s.vms[&id].clone())
    }

    pub fn ips_for(&self, address: &str) -> Vec<IpAddressRecord> {
        let address: IpAddr = address.parse().unwrap();
        self.with_state(|s| {
            s.ips
                .iter()
                .filter(|ip| ip.address == address)
                .cloned()
                .collect()
        })
    }

    pub fn interfaces_of(&self, vm: VmId) -> Vec<VmInterface> {
        self.with_state(|s| s.interfaces.iter().filter(|i| i.vm == vm).cloned().collect())
    }

    pub fn site_named(&self, name: &str) -> Option<Site> {
        self.with_state(|s| s.sites.iter().find(|x| x.name == name).cloned())
    }

    pub fn cluster_named(&self, name: &str) -> Option<Cluster> {
        self.with_state(|s| s.clusters.iter().find(|x| x.name == name).cloned())
    }

    pub fn count_clusters_named(&self, name: &str) -> usize {
        self.with_state(|s| s.clusters.iter().filter(|x| x.name == name).count())
    }

    pub fn count_sites_named(&self, name: &str) -> usize {
        self.with_state(|s| s.sites.iter().filter(|x| x.name == name).count())
    }
}

pub fn blank_vm(id: VmId, name: &str, cluster: Option<ClusterId>, site: Option<SiteId>) -> RegistryVm {
    RegistryVm {
        id,
        name: name.to_string(),
        status: VmStatus::Active,
        cluster,
        site,
        vcpus: None,
        memory_mb: None,
        disk_gb: None,
        platform: None,
        comments: String::new(),
        custom_fields: BTreeMap::new(),
        tags: Vec::new(),
        primary_ip4: None,
        primary_ip6: None,
        tenant: None,
        role: None,
    }
}

fn same_name_in_cluster(vms: &BTreeMap<VmId, RegistryVm>, name: &str, cluster: Option<ClusterId>, except: Option<VmId>) -> bool {
    vms.values().any(|vm| {
        Some(vm.id) != except && vm.cluster == cluster && vm.name.eq_ignore_ascii_case(name)
    })
}

#[async_trait]
impl Connector for MemoryRegistry {
    fn display_name(&self) -> &str {
        "memory-registry"
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl VirtualMachineOps for MemoryRegistry {
    async fn list_vms(&self) -> ConnectorResult<Vec<RegistryVm>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(ConnectorError::Unavailable {
                message: "registry is down".to_string(),
            });
        }
        Ok(self.with_state(|s| s.vms.values().cloned().collect()))
    }

    async fn create_vm(&self, vm: &NewVm) -> ConnectorResult<RegistryVm> {
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(ConnectorError::validation("virtual machine", "creation refused"));
        }
        self.with_state(|s| {
            if same_name_in_cluster(&s.vms, &vm.name, vm.cluster, None) {
                return Err(ConnectorError::duplicate(
                    "virtual machine",
                    "Virtual machine name must be unique per cluster.",
                ));
            }
            let id = VmId::new(s.next_id());
            let tags = vm
                .tags
                .iter()
                .filter_map(|t| s.tags.iter().find(|tag| tag.id == *t).cloned())
                .collect();
            let record = RegistryVm {
                id,
                name: vm.name.clone(),
                status: vm.status,
                cluster: vm.cluster,
                site: vm.site,
                vcpus: Some(vm.vcpus),
                memory_mb: Some(vm.memory_mb),
                disk_gb: Some(vm.disk_gb),
                platform: vm.platform,
                comments: vm.comments.clone(),
                custom_fields: vm.custom_fields.clone(),
                tags,
                primary_ip4: None,
                primary_ip6: None,
                tenant: vm.tenant,
                role: vm.role,
            };
            s.vms.insert(id, record.clone());
            Ok(record)
        })
    }

    async fn update_vm(&self, vm: &RegistryVm) -> ConnectorResult<RegistryVm> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_updates.load(Ordering::SeqCst) {
            return Err(ConnectorError::validation("virtual machine", "update refused"));
        }
        self.with_state(|s| {
            if !s.vms.contains_key(&vm.id) {
                return Err(ConnectorError::not_found("virtual machine", vm.id));
            }
            if same_name_in_cluster(&s.vms, &vm.name, vm.cluster, Some(vm.id)) {
                return Err(ConnectorError::duplicate(
                    "virtual machine",
                    "Virtual machine name must be unique per cluster.",
                ));
            }
            s.vms.insert(vm.id, vm.clone());
            Ok(vm.clone())
        })
    }
}

#[async_trait]
impl ClusterOps for MemoryRegistry {
    async fn list_clusters(&self) -> ConnectorResult<Vec<Cluster>> {
        Ok(self.with_state(|s| s.clusters.clone()))
    }

    async fn get_cluster(&self, id: ClusterId) -> ConnectorResult<Option<Cluster>> {
        if self.unreachable_clusters.lock().unwrap().contains(&id) {
            return Err(ConnectorError::transport("connection reset"));
        }
        Ok(self.with_state(|s| s.clusters.iter().find(|c| c.id == id).cloned()))
    }

    async fn find_cluster_by_name(&self, name: &str) -> ConnectorResult<Option<Cluster>> {
        Ok(self.cluster_named(name))
    }

    async fn create_cluster(&self, cluster: &NewCluster) -> ConnectorResult<Cluster> {
        self.with_state(|s| {
            if s.clusters.iter().any(|c| c.name == cluster.name) {
                return Err(ConnectorError::duplicate("cluster", "name must be unique"));
            }
            let created = Cluster {
                id: ClusterId::new(s.next_id()),
                name: cluster.name.clone(),
                site: cluster.site,
            };
            s.clusters.push(created.clone());
            Ok(created)
        })
    }

    async fn find_cluster_type_by_name(&self, name: &str) -> ConnectorResult<Option<ClusterType>> {
        Ok(self.with_state(|s| s.cluster_types.iter().find(|t| t.name == name).cloned()))
    }

    async fn create_cluster_type(&self, name: &str, slug: &str) -> ConnectorResult<ClusterType> {
        Ok(self.with_state(|s| {
            let created = ClusterType {
                id: ClusterTypeId::new(s.next_id()),
                name: name.to_string(),
                slug: slug.to_string(),
            };
            s.cluster_types.push(created.clone());
            created
        }))
    }

    async fn get_site(&self, id: SiteId) -> ConnectorResult<Option<Site>> {
        Ok(self.with_state(|s| s.sites.iter().find(|x| x.id == id).cloned()))
    }

    async fn find_site_by_name(&self, name: &str) -> ConnectorResult<Option<Site>> {
        Ok(self.site_named(name))
    }

    async fn create_site(&self, name: &str, slug: &str) -> ConnectorResult<Site> {
        Ok(self.with_state(|s| {
            let created = Site {
                id: SiteId::new(s.next_id()),
                name: name.to_string(),
                slug: slug.to_string(),
            };
            s.sites.push(created.clone());
            created
        }))
    }
}

#[async_trait]
impl InterfaceOps for MemoryRegistry {
    async fn find_interface(&self, vm: VmId, name: &str) -> ConnectorResult<Option<VmInterface>> {
        Ok(self.with_state(|s| {
            s.interfaces
                .iter()
                .find(|i| i.vm == vm && i.name == name)
                .cloned()
        }))
    }

    async fn create_interface(&self, vm: VmId, name: &str) -> ConnectorResult<VmInterface> {
        Ok(self.with_state(|s| {
            let created = VmInterface {
                id: InterfaceId::new(s.next_id()),
                vm,
                name: name.to_string(),
                enabled: true,
            };
            s.interfaces.push(created.clone());
            created
        }))
    }

    async fn find_ip_addresses(&self, address: IpAddr) -> ConnectorResult<Vec<IpAddressRecord>> {
        Ok(self.with_state(|s| {
            s.ips
                .iter()
                .filter(|ip| ip.address == address)
                .cloned()
                .collect()
        }))
    }

    async fn create_ip_address(&self, ip: &NewIpAddress) -> ConnectorResult<IpAddressRecord> {
        self.ip_write_refused()?;
        Ok(self.with_state(|s| {
            let created = IpAddressRecord {
                id: IpAddressId::new(s.next_id()),
                address: ip.address,
                prefix_len: ip.prefix_len,
                assigned: Some(AssignedObject::VmInterface(ip.interface)),
            };
            s.ips.push(created.clone());
            created
        }))
    }

    async fn assign_ip_address(
        &self,
        id: IpAddressId,
        interface: InterfaceId,
    ) -> ConnectorResult<IpAddressRecord> {
        self.ip_write_refused()?;
        self.with_state(|s| {
            let ip = s
                .ips
                .iter_mut()
                .find(|ip| ip.id == id)
                .ok_or_else(|| ConnectorError::not_found("ip address", id))?;
            ip.assigned = Some(AssignedObject::VmInterface(interface));
            Ok(ip.clone())
        })
    }
}

#[async_trait]
impl TagOps for MemoryRegistry {
    async fn find_tag_by_name(&self, name: &str) -> ConnectorResult<Option<Tag>> {
        Ok(self.with_state(|s| s.tags.iter().find(|t| t.name == name).cloned()))
    }

    async fn create_tag(&self, name: &str, slug: &str) -> ConnectorResult<Tag> {
        self.with_state(|s| {
            if s.tags.iter().any(|t| t.name == name) {
                return Err(ConnectorError::duplicate("tag", "name must be unique"));
            }
            let created = Tag {
                id: TagId::new(s.next_id()),
                name: name.to_string(),
                slug: slug.to_string(),
            };
            s.tags.push(created.clone());
            Ok(created)
        })
    }

    async fn find_platform_by_slug(&self, slug: &str) -> ConnectorResult<Option<Platform>> {
        Ok(self.with_state(|s| s.platforms.iter().find(|p| p.slug == slug).cloned()))
    }

    async fn create_platform(&self, name: &str, slug: &str) -> ConnectorResult<Platform> {
        Ok(self.with_state(|s| {
            let created = Platform {
                id: PlatformId::new(s.next_id()),
                name: name.to_string(),
                slug: slug.to_string(),
            };
            s.platforms.push(created.clone());
            created
        }))
    }
}

#[async_trait]
impl SchemaOps for MemoryRegistry {
    async fn list_custom_fields(&self) -> ConnectorResult<Vec<CustomField>> {
        Ok(self.with_state(|s| s.custom_fields.clone()))
    }
}

// =============================================================================
// Static source
// =============================================================================

/// Source double serving a fixed inventory.
#[derive(Default)]
pub struct StaticSource {
    vms: Mutex<Vec<SourceVm>>,
    clusters: Vec<String>,
    fail: AtomicBool,
    delay: Option<Duration>,
    list_calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(vms: Vec<SourceVm>) -> Self {
        Self {
            vms: Mutex::new(vms),
            ..Default::default()
        }
    }

    pub fn with_clusters(mut self, clusters: &[&str]) -> Self {
        self.clusters = clusters.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Hold every listing for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_vms(&self, vms: Vec<SourceVm>) {
        *self.vms.lock().unwrap() = vms;
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for StaticSource {
    fn display_name(&self) -> &str {
        "static-source"
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl SourceInventory for StaticSource {
    async fn list_virtual_machines(&self) -> ConnectorResult<Vec<SourceVm>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ConnectorError::Timeout { timeout_secs: 30 });
        }
        Ok(self.vms.lock().unwrap().clone())
    }

    async fn list_clusters(&self) -> ConnectorResult<Vec<String>> {
        Ok(self.clusters.clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A powered-on source VM in `cluster` with an IPv4 address.
pub fn source_vm(id: &str, name: &str, cluster: &str, ip: Option<&str>) -> SourceVm {
    let mut vm = SourceVm::new(id, name);
    vm.power_state = "poweredOn".to_string();
    vm.cluster = Some(cluster.to_string());
    vm.site = Some("DC1".to_string());
    vm.vcpus = 4;
    vm.memory_mb = 8192;
    vm.disk_gb = 100;
    vm.ip_address = ip.map(str::to_string);
    vm
}

/// Registry with site `DC1` and cluster `Prod` in it.
pub fn registry_with_prod() -> (Arc<MemoryRegistry>, ClusterId, SiteId) {
    let registry = Arc::new(MemoryRegistry::new());
    let site = registry.add_site("DC1");
    let cluster = registry.add_cluster("Prod", Some(site));
    (registry, cluster, site)
}

pub fn engine(source: Arc<StaticSource>, registry: Arc<MemoryRegistry>) -> ReconciliationEngine {
    ReconciliationEngine::new(source, registry)
}
