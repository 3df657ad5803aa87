//! NetBox connector implementation
//!
//! Implements the registry capability traits against the NetBox REST API.

use async_trait::async_trait;
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use vmsync_connector::error::{ConnectorError, ConnectorResult};
use vmsync_connector::ids::{
    ClusterId, ClusterTypeId, InterfaceId, IpAddressId, PlatformId, RoleId, SiteId, TagId,
    TenantId, VmId,
};
use vmsync_connector::model::{
    AssignedObject, Cluster, ClusterType, CustomField, IpAddressRecord, NewCluster, NewIpAddress,
    NewVm, Platform, RegistryVm, Site, Tag, VmInterface, VM_INTERFACE_OBJECT_TYPE,
};
use vmsync_connector::traits::{
    ClusterOps, Connector, InterfaceOps, SchemaOps, TagOps, VirtualMachineOps,
};
use vmsync_connector::types::VmStatus;

use crate::config::NetBoxConfig;

const VMS: &str = "/api/virtualization/virtual-machines/";
const CLUSTERS: &str = "/api/virtualization/clusters/";
const CLUSTER_TYPES: &str = "/api/virtualization/cluster-types/";
const INTERFACES: &str = "/api/virtualization/interfaces/";
const SITES: &str = "/api/dcim/sites/";
const PLATFORMS: &str = "/api/dcim/platforms/";
const IP_ADDRESSES: &str = "/api/ipam/ip-addresses/";
const TAGS: &str = "/api/extras/tags/";
const CUSTOM_FIELDS: &str = "/api/extras/custom-fields/";
const STATUS: &str = "/api/status/";

/// Registry client for NetBox.
pub struct NetBoxConnector {
    config: NetBoxConfig,
    display_name: String,
    client: Client,
}

impl std::fmt::Debug for NetBoxConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetBoxConnector")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl NetBoxConnector {
    /// Create a new NetBox connector with the given configuration.
    pub fn new(config: NetBoxConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let display_name = format!("NetBox: {}", config.base_url);
        let client = Self::build_client(&config)?;

        Ok(Self {
            config,
            display_name,
            client,
        })
    }

    fn build_client(config: &NetBoxConfig) -> ConnectorResult<Client> {
        let mut headers = header::HeaderMap::new();
        let token = header::HeaderValue::from_str(&format!("Token {}", config.token)).map_err(
            |e| ConnectorError::InvalidConfiguration {
                message: format!("invalid token: {e}"),
            },
        )?;
        headers.insert(header::AUTHORIZATION, token);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers);

        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        builder
            .build()
            .map_err(|e| ConnectorError::InvalidConfiguration {
                message: format!("Failed to build HTTP client: {e}"),
            })
    }

    /// Send a request, mapping client-side failures to transport errors.
    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> ConnectorResult<Response> {
        debug!(method = %method, url = %url, "Sending NetBox request");

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request.send().await.map_err(|e| {
            if e.is_timeout() {
                ConnectorError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                }
            } else {
                ConnectorError::transport_with_source(format!("Request failed: {url}"), e)
            }
        })
    }

    /// Map a non-success response to a structured error.
    async fn error_for(&self, response: Response, entity: &str) -> ConnectorError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        map_status(status, entity, &body)
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ConnectorResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::serialization(format!("Invalid NetBox response: {e}")))
    }

    /// Follow `next` links until the listing is exhausted.
    async fn list_all<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, String)],
        entity: &str,
    ) -> ConnectorResult<Vec<T>> {
        let mut query: Vec<(&str, String)> = filters.to_vec();
        query.push(("limit", self.config.page_size.to_string()));

        let mut results = Vec::new();
        let mut url = self.config.url(path);
        let mut first = true;

        loop {
            let params: &[(&str, String)] = if first { &query } else { &[] };
            let response = self.send(Method::GET, &url, params, None).await?;
            if !response.status().is_success() {
                return Err(self.error_for(response, entity).await);
            }

            let page: Page<T> = Self::decode(response).await?;
            results.extend(page.results);

            match page.next {
                Some(next) if !next.is_empty() => {
                    url = next;
                    first = false;
                }
                _ => break,
            }
        }

        debug!(path = %path, count = results.len(), "Listed NetBox objects");
        Ok(results)
    }

    /// First object matching the filters, if any.
    async fn find_one<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, String)],
        entity: &str,
    ) -> ConnectorResult<Option<T>> {
        let url = self.config.url(path);
        let response = self.send(Method::GET, &url, filters, None).await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, entity).await);
        }
        let page: Page<T> = Self::decode(response).await?;
        Ok(page.results.into_iter().next())
    }

    /// Get an object by id; a 404 means it does not exist.
    async fn get_by_id<T: DeserializeOwned>(
        &self,
        path: &str,
        id: u64,
        entity: &str,
    ) -> ConnectorResult<Option<T>> {
        let url = self.config.url(&format!("{path}{id}/"));
        let response = self.send(Method::GET, &url, &[], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.error_for(response, entity).await);
        }
        Ok(Some(Self::decode(response).await?))
    }

    /// POST or PATCH a JSON body and decode the returned object.
    async fn write<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
        entity: &str,
    ) -> ConnectorResult<T> {
        let url = self.config.url(path);
        let response = self.send(method, &url, &[], Some(body)).await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, entity).await);
        }
        Self::decode(response).await
    }
}

/// Classify an HTTP error status into the collaborator error taxonomy.
fn map_status(status: StatusCode, entity: &str, body: &str) -> ConnectorError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ConnectorError::AuthenticationFailed {
                message: format!("HTTP {status}"),
            }
        }
        StatusCode::NOT_FOUND => ConnectorError::not_found(entity, body),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT => classify_rejection(entity, body),
        s if s.is_server_error() => ConnectorError::Unavailable {
            message: format!("HTTP {status}: {body}"),
        },
        _ => ConnectorError::validation(entity, format!("HTTP {status}: {body}")),
    }
}

/// Split a rejected write into uniqueness violations and everything else.
fn classify_rejection(entity: &str, body: &str) -> ConnectorError {
    let lower = body.to_lowercase();
    if lower.contains("already exists")
        || lower.contains("duplicate")
        || lower.contains("must be unique")
    {
        ConnectorError::duplicate(entity, body)
    } else {
        ConnectorError::validation(entity, body)
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct NestedRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct StatusValue {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TagDto {
    id: u64,
    name: String,
    slug: String,
}

impl From<TagDto> for Tag {
    fn from(dto: TagDto) -> Self {
        Tag {
            id: TagId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VmDto {
    id: u64,
    name: String,
    status: Option<StatusValue>,
    cluster: Option<NestedRef>,
    site: Option<NestedRef>,
    vcpus: Option<f64>,
    memory: Option<u64>,
    disk: Option<u64>,
    platform: Option<NestedRef>,
    comments: Option<String>,
    custom_fields: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    tags: Vec<TagDto>,
    primary_ip4: Option<NestedRef>,
    primary_ip6: Option<NestedRef>,
    tenant: Option<NestedRef>,
    role: Option<NestedRef>,
}

impl From<VmDto> for RegistryVm {
    fn from(dto: VmDto) -> Self {
        RegistryVm {
            id: VmId::new(dto.id),
            name: dto.name,
            status: dto
                .status
                .and_then(|s| s.value.parse::<VmStatus>().ok())
                .unwrap_or_default(),
            cluster: dto.cluster.map(|c| ClusterId::new(c.id)),
            site: dto.site.map(|s| SiteId::new(s.id)),
            vcpus: dto.vcpus.map(|v| v.round() as u32),
            memory_mb: dto.memory,
            disk_gb: dto.disk,
            platform: dto.platform.map(|p| PlatformId::new(p.id)),
            comments: dto.comments.unwrap_or_default(),
            custom_fields: dto.custom_fields.unwrap_or_default(),
            tags: dto.tags.into_iter().map(Tag::from).collect(),
            primary_ip4: dto.primary_ip4.map(|ip| IpAddressId::new(ip.id)),
            primary_ip6: dto.primary_ip6.map(|ip| IpAddressId::new(ip.id)),
            tenant: dto.tenant.map(|t| TenantId::new(t.id)),
            role: dto.role.map(|r| RoleId::new(r.id)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClusterDto {
    id: u64,
    name: String,
    site: Option<NestedRef>,
    // Newer NetBox releases scope clusters instead of pinning a site.
    scope_type: Option<String>,
    scope_id: Option<u64>,
}

impl From<ClusterDto> for Cluster {
    fn from(dto: ClusterDto) -> Self {
        let scoped_site = match (dto.scope_type.as_deref(), dto.scope_id) {
            (Some("dcim.site"), Some(id)) => Some(SiteId::new(id)),
            _ => None,
        };
        Cluster {
            id: ClusterId::new(dto.id),
            name: dto.name,
            site: dto.site.map(|s| SiteId::new(s.id)).or(scoped_site),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NamedDto {
    id: u64,
    name: String,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct InterfaceDto {
    id: u64,
    virtual_machine: NestedRef,
    name: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<InterfaceDto> for VmInterface {
    fn from(dto: InterfaceDto) -> Self {
        VmInterface {
            id: InterfaceId::new(dto.id),
            vm: VmId::new(dto.virtual_machine.id),
            name: dto.name,
            enabled: dto.enabled,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpAddressDto {
    id: u64,
    address: String,
    assigned_object_type: Option<String>,
    assigned_object_id: Option<u64>,
}

impl TryFrom<IpAddressDto> for IpAddressRecord {
    type Error = ConnectorError;

    fn try_from(dto: IpAddressDto) -> Result<Self, Self::Error> {
        let (addr, prefix) = dto
            .address
            .split_once('/')
            .unwrap_or((dto.address.as_str(), ""));
        let address: IpAddr = addr.parse().map_err(|_| {
            ConnectorError::serialization(format!("invalid IP address '{}'", dto.address))
        })?;
        let prefix_len = if prefix.is_empty() {
            vmsync_connector::model::host_prefix_len(&address)
        } else {
            prefix.parse().map_err(|_| {
                ConnectorError::serialization(format!("invalid prefix in '{}'", dto.address))
            })?
        };

        let assigned = match (dto.assigned_object_type, dto.assigned_object_id) {
            (Some(kind), Some(id)) if kind == VM_INTERFACE_OBJECT_TYPE => {
                Some(AssignedObject::VmInterface(InterfaceId::new(id)))
            }
            (Some(object_type), Some(id)) => Some(AssignedObject::Other { object_type, id }),
            _ => None,
        };

        Ok(IpAddressRecord {
            id: IpAddressId::new(dto.id),
            address,
            prefix_len,
            assigned,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CustomFieldDto {
    id: u64,
    name: String,
}

#[allow(clippy::too_many_arguments)]
fn vm_body(
    name: &str,
    status: VmStatus,
    cluster: Option<ClusterId>,
    site: Option<SiteId>,
    platform: Option<PlatformId>,
    comments: &str,
    custom_fields: &BTreeMap<String, Value>,
    tags: Vec<u64>,
) -> serde_json::Map<String, Value> {
    let mut body = serde_json::Map::new();
    body.insert("name".into(), json!(name));
    body.insert("status".into(), json!(status.as_str()));
    body.insert("cluster".into(), json!(cluster.map(|c| c.get())));
    body.insert("site".into(), json!(site.map(|s| s.get())));
    body.insert("platform".into(), json!(platform.map(|p| p.get())));
    body.insert("comments".into(), json!(comments));
    body.insert("custom_fields".into(), json!(custom_fields));
    body.insert("tags".into(), json!(tags));
    body
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl Connector for NetBoxConnector {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        let url = self.config.url(STATUS);
        let response = self.send(Method::GET, &url, &[], None).await?;
        if !response.status().is_success() {
            return Err(self.error_for(response, "status").await);
        }
        info!(base_url = %self.config.base_url, "NetBox connection test successful");
        Ok(())
    }
}

#[async_trait]
impl VirtualMachineOps for NetBoxConnector {
    #[instrument(skip(self))]
    async fn list_vms(&self) -> ConnectorResult<Vec<RegistryVm>> {
        let vms: Vec<VmDto> = self.list_all(VMS, &[], "virtual machine").await?;
        Ok(vms.into_iter().map(RegistryVm::from).collect())
    }

    #[instrument(skip(self, vm), fields(vm = %vm.name))]
    async fn create_vm(&self, vm: &NewVm) -> ConnectorResult<RegistryVm> {
        let mut body = vm_body(
            &vm.name,
            vm.status,
            vm.cluster,
            vm.site,
            vm.platform,
            &vm.comments,
            &vm.custom_fields,
            vm.tags.iter().map(|t| t.get()).collect(),
        );
        body.insert("vcpus".into(), json!(vm.vcpus));
        body.insert("memory".into(), json!(vm.memory_mb));
        body.insert("disk".into(), json!(vm.disk_gb));
        body.insert("tenant".into(), json!(vm.tenant.map(|t| t.get())));
        body.insert("role".into(), json!(vm.role.map(|r| r.get())));

        let created: VmDto = self
            .write(Method::POST, VMS, &Value::Object(body), "virtual machine")
            .await?;
        info!(id = created.id, "Created virtual machine");
        Ok(created.into())
    }

    #[instrument(skip(self, vm), fields(vm = %vm.name, id = %vm.id))]
    async fn update_vm(&self, vm: &RegistryVm) -> ConnectorResult<RegistryVm> {
        let mut body = vm_body(
            &vm.name,
            vm.status,
            vm.cluster,
            vm.site,
            vm.platform,
            &vm.comments,
            &vm.custom_fields,
            vm.tags.iter().map(|t| t.id.get()).collect(),
        );
        body.insert("vcpus".into(), json!(vm.vcpus));
        body.insert("memory".into(), json!(vm.memory_mb));
        body.insert("disk".into(), json!(vm.disk_gb));
        body.insert("tenant".into(), json!(vm.tenant.map(|t| t.get())));
        body.insert("role".into(), json!(vm.role.map(|r| r.get())));
        body.insert(
            "primary_ip4".into(),
            json!(vm.primary_ip4.map(|ip| ip.get())),
        );
        body.insert(
            "primary_ip6".into(),
            json!(vm.primary_ip6.map(|ip| ip.get())),
        );

        let path = format!("{VMS}{}/", vm.id);
        let updated: VmDto = self
            .write(Method::PATCH, &path, &Value::Object(body), "virtual machine")
            .await?;
        debug!("Saved virtual machine");
        Ok(updated.into())
    }
}

#[async_trait]
impl ClusterOps for NetBoxConnector {
    #[instrument(skip(self))]
    async fn list_clusters(&self) -> ConnectorResult<Vec<Cluster>> {
        let clusters: Vec<ClusterDto> = self.list_all(CLUSTERS, &[], "cluster").await?;
        Ok(clusters.into_iter().map(Cluster::from).collect())
    }

    async fn get_cluster(&self, id: ClusterId) -> ConnectorResult<Option<Cluster>> {
        let cluster: Option<ClusterDto> = self.get_by_id(CLUSTERS, id.get(), "cluster").await?;
        Ok(cluster.map(Cluster::from))
    }

    async fn find_cluster_by_name(&self, name: &str) -> ConnectorResult<Option<Cluster>> {
        let cluster: Option<ClusterDto> = self
            .find_one(CLUSTERS, &[("name", name.to_string())], "cluster")
            .await?;
        Ok(cluster.map(Cluster::from))
    }

    #[instrument(skip(self, cluster), fields(cluster = %cluster.name))]
    async fn create_cluster(&self, cluster: &NewCluster) -> ConnectorResult<Cluster> {
        let body = json!({
            "name": cluster.name,
            "type": cluster.cluster_type.get(),
            "site": cluster.site.map(|s| s.get()),
        });
        let created: ClusterDto = self.write(Method::POST, CLUSTERS, &body, "cluster").await?;
        info!(id = created.id, "Created cluster");
        Ok(created.into())
    }

    async fn find_cluster_type_by_name(&self, name: &str) -> ConnectorResult<Option<ClusterType>> {
        let found: Option<NamedDto> = self
            .find_one(CLUSTER_TYPES, &[("name", name.to_string())], "cluster type")
            .await?;
        Ok(found.map(|dto| ClusterType {
            id: ClusterTypeId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        }))
    }

    #[instrument(skip(self))]
    async fn create_cluster_type(&self, name: &str, slug: &str) -> ConnectorResult<ClusterType> {
        let body = json!({ "name": name, "slug": slug });
        let dto: NamedDto = self
            .write(Method::POST, CLUSTER_TYPES, &body, "cluster type")
            .await?;
        info!(id = dto.id, "Created cluster type");
        Ok(ClusterType {
            id: ClusterTypeId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        })
    }

    async fn get_site(&self, id: SiteId) -> ConnectorResult<Option<Site>> {
        let site: Option<NamedDto> = self.get_by_id(SITES, id.get(), "site").await?;
        Ok(site.map(|dto| Site {
            id: SiteId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        }))
    }

    async fn find_site_by_name(&self, name: &str) -> ConnectorResult<Option<Site>> {
        let site: Option<NamedDto> = self
            .find_one(SITES, &[("name", name.to_string())], "site")
            .await?;
        Ok(site.map(|dto| Site {
            id: SiteId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        }))
    }

    #[instrument(skip(self))]
    async fn create_site(&self, name: &str, slug: &str) -> ConnectorResult<Site> {
        let body = json!({ "name": name, "slug": slug, "status": "active" });
        let dto: NamedDto = self.write(Method::POST, SITES, &body, "site").await?;
        info!(id = dto.id, "Created site");
        Ok(Site {
            id: SiteId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        })
    }
}

#[async_trait]
impl InterfaceOps for NetBoxConnector {
    async fn find_interface(&self, vm: VmId, name: &str) -> ConnectorResult<Option<VmInterface>> {
        let found: Option<InterfaceDto> = self
            .find_one(
                INTERFACES,
                &[
                    ("virtual_machine_id", vm.to_string()),
                    ("name", name.to_string()),
                ],
                "interface",
            )
            .await?;
        Ok(found.map(VmInterface::from))
    }

    #[instrument(skip(self), fields(vm = %vm))]
    async fn create_interface(&self, vm: VmId, name: &str) -> ConnectorResult<VmInterface> {
        let body = json!({ "virtual_machine": vm.get(), "name": name, "enabled": true });
        let dto: InterfaceDto = self
            .write(Method::POST, INTERFACES, &body, "interface")
            .await?;
        info!(id = dto.id, "Created interface");
        Ok(dto.into())
    }

    async fn find_ip_addresses(&self, address: IpAddr) -> ConnectorResult<Vec<IpAddressRecord>> {
        let found: Vec<IpAddressDto> = self
            .list_all(IP_ADDRESSES, &[("address", address.to_string())], "ip address")
            .await?;
        let mut records = Vec::with_capacity(found.len());
        for dto in found {
            match IpAddressRecord::try_from(dto) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "Ignoring unparseable IP address record"),
            }
        }
        Ok(records)
    }

    #[instrument(skip(self, ip), fields(address = %ip.cidr()))]
    async fn create_ip_address(&self, ip: &NewIpAddress) -> ConnectorResult<IpAddressRecord> {
        let body = json!({
            "address": ip.cidr(),
            "status": "active",
            "assigned_object_type": VM_INTERFACE_OBJECT_TYPE,
            "assigned_object_id": ip.interface.get(),
        });
        let dto: IpAddressDto = self
            .write(Method::POST, IP_ADDRESSES, &body, "ip address")
            .await?;
        info!(id = dto.id, "Created IP address");
        IpAddressRecord::try_from(dto)
    }

    #[instrument(skip(self), fields(ip = %id, interface = %interface))]
    async fn assign_ip_address(
        &self,
        id: IpAddressId,
        interface: InterfaceId,
    ) -> ConnectorResult<IpAddressRecord> {
        let body = json!({
            "assigned_object_type": VM_INTERFACE_OBJECT_TYPE,
            "assigned_object_id": interface.get(),
        });
        let path = format!("{IP_ADDRESSES}{id}/");
        let dto: IpAddressDto = self
            .write(Method::PATCH, &path, &body, "ip address")
            .await?;
        IpAddressRecord::try_from(dto)
    }
}

#[async_trait]
impl TagOps for NetBoxConnector {
    async fn find_tag_by_name(&self, name: &str) -> ConnectorResult<Option<Tag>> {
        let found: Option<TagDto> = self
            .find_one(TAGS, &[("name", name.to_string())], "tag")
            .await?;
        Ok(found.map(Tag::from))
    }

    #[instrument(skip(self))]
    async fn create_tag(&self, name: &str, slug: &str) -> ConnectorResult<Tag> {
        let body = json!({ "name": name, "slug": slug });
        let dto: TagDto = self.write(Method::POST, TAGS, &body, "tag").await?;
        info!(id = dto.id, "Created tag");
        Ok(dto.into())
    }

    async fn find_platform_by_slug(&self, slug: &str) -> ConnectorResult<Option<Platform>> {
        let found: Option<NamedDto> = self
            .find_one(PLATFORMS, &[("slug", slug.to_string())], "platform")
            .await?;
        Ok(found.map(|dto| Platform {
            id: PlatformId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        }))
    }

    #[instrument(skip(self))]
    async fn create_platform(&self, name: &str, slug: &str) -> ConnectorResult<Platform> {
        let body = json!({ "name": name, "slug": slug });
        let dto: NamedDto = self.write(Method::POST, PLATFORMS, &body, "platform").await?;
        info!(id = dto.id, "Created platform");
        Ok(Platform {
            id: PlatformId::new(dto.id),
            name: dto.name,
            slug: dto.slug,
        })
    }
}

#[async_trait]
impl SchemaOps for NetBoxConnector {
    #[instrument(skip(self))]
    async fn list_custom_fields(&self) -> ConnectorResult<Vec<CustomField>> {
        let fields: Vec<CustomFieldDto> =
            self.list_all(CUSTOM_FIELDS, &[], "custom field").await?;
        Ok(fields
            .into_iter()
            .map(|dto| CustomField {
                id: dto.id,
                name: dto.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejection() {
        let dup = classify_rejection(
            "ip address",
            r#"{"address":["Duplicate IP address found in global table: 10.0.0.5/32"]}"#,
        );
        assert!(dup.is_duplicate());

        let unique = classify_rejection(
            "virtual machine",
            r#"{"__all__":["Virtual machine name must be unique per cluster."]}"#,
        );
        assert!(unique.is_duplicate());

        let exists = classify_rejection("tag", r#"{"slug":["tag with this slug already exists."]}"#);
        assert!(exists.is_duplicate());

        let invalid = classify_rejection("virtual machine", r#"{"vcpus":["Ensure this value is greater than or equal to 0.01."]}"#);
        assert!(!invalid.is_duplicate());
        assert!(invalid.is_rejection());
    }

    #[test]
    fn test_map_status() {
        assert!(matches!(
            map_status(StatusCode::FORBIDDEN, "vm", ""),
            ConnectorError::AuthenticationFailed { .. }
        ));
        assert!(map_status(StatusCode::BAD_GATEWAY, "vm", "").is_transient());
        assert!(matches!(
            map_status(StatusCode::NOT_FOUND, "vm", ""),
            ConnectorError::NotFound { .. }
        ));
        assert!(map_status(StatusCode::UNPROCESSABLE_ENTITY, "vm", "").is_rejection());
    }

    #[test]
    fn test_ip_dto_conversion() {
        let record = IpAddressRecord::try_from(IpAddressDto {
            id: 3,
            address: "10.0.0.5/24".to_string(),
            assigned_object_type: Some(VM_INTERFACE_OBJECT_TYPE.to_string()),
            assigned_object_id: Some(11),
        })
        .unwrap();
        assert_eq!(record.prefix_len, 24);
        assert_eq!(
            record.assigned,
            Some(AssignedObject::VmInterface(InterfaceId::new(11)))
        );

        let device = IpAddressRecord::try_from(IpAddressDto {
            id: 4,
            address: "2001:db8::1/128".to_string(),
            assigned_object_type: Some("dcim.interface".to_string()),
            assigned_object_id: Some(11),
        })
        .unwrap();
        assert!(device.is_bound_elsewhere(InterfaceId::new(11)));

        assert!(IpAddressRecord::try_from(IpAddressDto {
            id: 5,
            address: "bogus".to_string(),
            assigned_object_type: None,
            assigned_object_id: None,
        })
        .is_err());
    }

    #[test]
    fn test_cluster_scope_fallback() {
        let cluster: Cluster = ClusterDto {
            id: 1,
            name: "prod".to_string(),
            site: None,
            scope_type: Some("dcim.site".to_string()),
            scope_id: Some(4),
        }
        .into();
        assert_eq!(cluster.site, Some(SiteId::new(4)));
    }
}
