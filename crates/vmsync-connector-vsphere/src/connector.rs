//! vSphere connector implementation
//!
//! Reads VM inventory through the vSphere Automation REST API (`/api`).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use vmsync_connector::error::{ConnectorError, ConnectorResult};
use vmsync_connector::model::SourceVm;
use vmsync_connector::traits::{Connector, SourceInventory};

use crate::config::VsphereConfig;

const SESSION_HEADER: &str = "vmware-api-session-id";
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Source client for vCenter Server.
pub struct VsphereConnector {
    config: VsphereConfig,
    display_name: String,
    client: Client,
    /// Cached session token.
    session: RwLock<Option<String>>,
}

impl std::fmt::Debug for VsphereConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VsphereConnector")
            .field("config", &self.config.redacted())
            .field("display_name", &self.display_name)
            .finish()
    }
}

impl VsphereConnector {
    /// Create a new vSphere connector with the given configuration.
    pub fn new(config: VsphereConfig) -> ConnectorResult<Self> {
        config.validate()?;

        let display_name = format!("vSphere: {}", config.base_url());
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder
            .build()
            .map_err(|e| ConnectorError::InvalidConfiguration {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config,
            display_name,
            client,
            session: RwLock::new(None),
        })
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> ConnectorError {
        if e.is_timeout() {
            ConnectorError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }
        } else {
            ConnectorError::transport_with_source(format!("Request failed: {url}"), e)
        }
    }

    /// Create a session and return its token.
    #[instrument(skip(self))]
    async fn login(&self) -> ConnectorResult<String> {
        let url = self.config.url("/api/session");
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| self.transport_error(&url, e))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ConnectorError::AuthenticationFailed {
                    message: format!("vCenter rejected credentials for {}", self.config.username),
                })
            }
            s => return Err(map_status(s, &response.text().await.unwrap_or_default())),
        }

        let token: String = response
            .json()
            .await
            .map_err(|e| ConnectorError::serialization(format!("Invalid session response: {e}")))?;

        info!(host = %self.config.host, "Opened vCenter session");
        Ok(token)
    }

    /// Cached session token, logging in when there is none.
    async fn session_token(&self) -> ConnectorResult<String> {
        {
            let guard = self.session.read().await;
            if let Some(ref token) = *guard {
                return Ok(token.clone());
            }
        }

        let token = self.login().await?;
        {
            let mut guard = self.session.write().await;
            *guard = Some(token.clone());
        }
        Ok(token)
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> ConnectorResult<Response> {
        let token = self.session_token().await?;
        debug!(url = %url, "Sending vSphere request");

        let mut request = self
            .client
            .request(Method::GET, url)
            .header(SESSION_HEADER, token);
        if !query.is_empty() {
            request = request.query(query);
        }
        request
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))
    }

    /// GET a JSON resource, re-authenticating once if the session expired.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ConnectorResult<T> {
        let url = self.config.url(path);
        let mut response = self.send(&url, query).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("vCenter session expired, logging in again");
            *self.session.write().await = None;
            response = self.send(&url, query).await?;
        }

        if !response.status().is_success() {
            let status = response.status();
            return Err(map_status(status, &response.text().await.unwrap_or_default()));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::serialization(format!("Invalid vSphere response: {e}")))
    }

    /// Like [`Self::get_json`], but guest-side failures read as absent.
    ///
    /// Guest endpoints answer 503 when VMware Tools is not running.
    async fn get_guest<T: DeserializeOwned>(&self, path: &str) -> Option<T> {
        match self.get_json(path, &[]).await {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %path, error = %e, "Guest information unavailable");
                None
            }
        }
    }

    async fn datacenters(&self) -> ConnectorResult<Vec<DatacenterSummary>> {
        self.get_json("/api/vcenter/datacenter", &[]).await
    }

    async fn clusters_in(&self, datacenter: &str) -> ConnectorResult<Vec<ClusterSummary>> {
        self.get_json(
            "/api/vcenter/cluster",
            &[("datacenters", datacenter.to_string())],
        )
        .await
    }

    async fn vms_matching(&self, filter: &str, value: &str) -> ConnectorResult<Vec<VmSummary>> {
        self.get_json("/api/vcenter/vm", &[(filter, value.to_string())])
            .await
    }

    /// Build the full record for one VM.
    async fn vm_record(
        &self,
        summary: &VmSummary,
        site: &str,
        cluster: Option<&str>,
    ) -> ConnectorResult<SourceVm> {
        let detail: VmDetail = self
            .get_json(&format!("/api/vcenter/vm/{}", summary.vm), &[])
            .await?;
        let identity: Option<GuestIdentity> = self
            .get_guest(&format!("/api/vcenter/vm/{}/guest/identity", summary.vm))
            .await;
        let interfaces: Option<Vec<GuestInterface>> = self
            .get_guest(&format!(
                "/api/vcenter/vm/{}/guest/networking/interfaces",
                summary.vm
            ))
            .await;

        let id = detail
            .identity
            .as_ref()
            .and_then(|i| i.instance_uuid.clone())
            .unwrap_or_else(|| summary.vm.clone());

        let disk_bytes: u64 = detail.disks.values().filter_map(|d| d.capacity).sum();

        let platform = identity
            .as_ref()
            .and_then(|i| i.full_name.as_ref())
            .map(|m| m.default_message.clone())
            .or(detail.guest_os.clone())
            .filter(|p| !p.is_empty());

        let ip_address = identity
            .as_ref()
            .and_then(|i| i.ip_address.clone())
            .filter(|ip| !ip.is_empty());

        let ipv6 = interfaces
            .unwrap_or_default()
            .into_iter()
            .filter_map(|iface| iface.ip)
            .flat_map(|ip| ip.ip_addresses)
            .map(|a| a.ip_address)
            .filter(|a| a.contains(':'))
            .collect();

        let mut vm = SourceVm::new(id, detail.name.unwrap_or_else(|| summary.name.clone()));
        vm.power_state = power_state(&summary.power_state).to_string();
        vm.site = Some(site.to_string());
        vm.cluster = cluster.map(str::to_string);
        vm.vcpus = detail
            .cpu
            .map(|c| c.count)
            .or(summary.cpu_count)
            .unwrap_or_default();
        vm.memory_mb = detail
            .memory
            .map(|m| m.size_mib)
            .or(summary.memory_size_mib)
            .unwrap_or_default();
        vm.disk_gb = disk_bytes / BYTES_PER_GB;
        vm.ip_address = ip_address;
        vm.ipv6 = ipv6;
        vm.platform = platform;
        vm.last_checked = Some(Utc::now());
        Ok(vm)
    }

    fn limit_reached(&self, count: usize) -> bool {
        self.config.vm_limit.is_some_and(|limit| count >= limit)
    }
}

/// Translate the REST power state into the inventory vocabulary.
fn power_state(state: &str) -> &str {
    match state {
        "POWERED_ON" => "poweredOn",
        "POWERED_OFF" => "poweredOff",
        "SUSPENDED" => "suspended",
        other => other,
    }
}

fn map_status(status: StatusCode, body: &str) -> ConnectorError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::AuthenticationFailed {
            message: format!("HTTP {status}"),
        },
        StatusCode::NOT_FOUND => ConnectorError::not_found("vcenter object", body),
        s if s.is_server_error() => ConnectorError::Unavailable {
            message: format!("HTTP {status}: {body}"),
        },
        _ => ConnectorError::transport(format!("HTTP {status}: {body}")),
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct DatacenterSummary {
    datacenter: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ClusterSummary {
    cluster: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct VmSummary {
    vm: String,
    name: String,
    #[serde(default)]
    power_state: String,
    cpu_count: Option<u32>,
    #[serde(rename = "memory_size_MiB")]
    memory_size_mib: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct VmDetail {
    name: Option<String>,
    identity: Option<VmIdentity>,
    cpu: Option<CpuInfo>,
    memory: Option<MemoryInfo>,
    #[serde(default)]
    disks: BTreeMap<String, DiskInfo>,
    #[serde(rename = "guest_OS")]
    guest_os: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VmIdentity {
    instance_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CpuInfo {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct MemoryInfo {
    #[serde(rename = "size_MiB")]
    size_mib: u64,
}

#[derive(Debug, Deserialize)]
struct DiskInfo {
    capacity: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LocalizableMessage {
    default_message: String,
}

#[derive(Debug, Deserialize)]
struct GuestIdentity {
    full_name: Option<LocalizableMessage>,
    ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GuestInterface {
    ip: Option<GuestIpConfig>,
}

#[derive(Debug, Deserialize)]
struct GuestIpConfig {
    #[serde(default)]
    ip_addresses: Vec<GuestIpAddress>,
}

#[derive(Debug, Deserialize)]
struct GuestIpAddress {
    ip_address: String,
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl Connector for VsphereConnector {
    fn display_name(&self) -> &str {
        &self.display_name
    }

    #[instrument(skip(self))]
    async fn test_connection(&self) -> ConnectorResult<()> {
        self.datacenters().await?;
        info!(host = %self.config.host, "vCenter connection test successful");
        Ok(())
    }
}

#[async_trait]
impl SourceInventory for VsphereConnector {
    #[instrument(skip(self))]
    async fn list_virtual_machines(&self) -> ConnectorResult<Vec<SourceVm>> {
        let mut vms = Vec::new();

        'datacenters: for dc in self.datacenters().await? {
            let mut clustered = HashSet::new();

            for cluster in self.clusters_in(&dc.datacenter).await? {
                for summary in self.vms_matching("clusters", &cluster.cluster).await? {
                    if self.limit_reached(vms.len()) {
                        break 'datacenters;
                    }
                    clustered.insert(summary.vm.clone());
                    match self.vm_record(&summary, &dc.name, Some(&cluster.name)).await {
                        Ok(vm) => {
                            debug!(vm = %vm.name, "Retrieved VM information");
                            vms.push(vm);
                        }
                        Err(e) if e.is_transient() => return Err(e),
                        Err(e) => warn!(vm = %summary.name, error = %e, "Skipping VM"),
                    }
                }
            }

            // VMs on standalone hosts have no cluster.
            for summary in self.vms_matching("datacenters", &dc.datacenter).await? {
                if clustered.contains(&summary.vm) {
                    continue;
                }
                if self.limit_reached(vms.len()) {
                    break 'datacenters;
                }
                match self.vm_record(&summary, &dc.name, None).await {
                    Ok(vm) => vms.push(vm),
                    Err(e) if e.is_transient() => return Err(e),
                    Err(e) => warn!(vm = %summary.name, error = %e, "Skipping VM"),
                }
            }
        }

        info!(count = vms.len(), "Retrieved VM inventory from vCenter");
        Ok(vms)
    }

    #[instrument(skip(self))]
    async fn list_clusters(&self) -> ConnectorResult<Vec<String>> {
        let mut names = Vec::new();
        for dc in self.datacenters().await? {
            names.extend(self.clusters_in(&dc.datacenter).await?.into_iter().map(|c| c.name));
        }
        info!(count = names.len(), "Retrieved clusters from vCenter");
        Ok(names)
    }
}
