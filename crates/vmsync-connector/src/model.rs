//! Entity model
//!
//! The normalized source VM record and the registry entities the
//! reconciliation engine reads and writes. Registry types carry only the
//! fields the engine touches; anything else the registry stores is left
//! alone on update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::ids::{
    ClusterId, ClusterTypeId, InterfaceId, IpAddressId, PlatformId, RoleId, SiteId, TagId,
    TenantId, VmId,
};
use crate::types::VmStatus;

/// Sentinel the snapshot file uses for a missing value.
pub const UNKNOWN: &str = "Unknown";

/// Timestamp layout used in the snapshot file.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Object type of an IP address assigned to a VM interface.
pub const VM_INTERFACE_OBJECT_TYPE: &str = "virtualization.vminterface";

// =============================================================================
// Source side
// =============================================================================

/// A virtual machine as observed in the source of truth.
///
/// Immutable once fetched. On the JSON boundary the field names follow the
/// snapshot file layout, absent values are written as `"Unknown"` and
/// timestamps as `YYYY-MM-DD HH:MM:SS`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceVm {
    /// Source-side identifier (instance UUID or managed object id).
    #[serde(rename = "vm_id")]
    pub id: String,

    pub name: String,

    /// Raw power state (`poweredOn`, `poweredOff`, `suspended`).
    #[serde(rename = "status", default)]
    pub power_state: String,

    #[serde(default, with = "sentinel")]
    pub site: Option<String>,

    #[serde(default, with = "sentinel")]
    pub cluster: Option<String>,

    #[serde(default)]
    pub vcpus: u32,

    #[serde(default)]
    pub memory_mb: u64,

    #[serde(rename = "disk", default)]
    pub disk_gb: u64,

    /// Primary IPv4 address as reported by the guest.
    #[serde(default, with = "sentinel")]
    pub ip_address: Option<String>,

    #[serde(default, with = "address_list")]
    pub ipv6: Vec<String>,

    #[serde(default, with = "timestamp")]
    pub created: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp")]
    pub last_update: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp")]
    pub last_checked: Option<DateTime<Utc>>,

    #[serde(default)]
    pub comments: String,

    /// Guest OS label, resolved to a registry platform by slug.
    #[serde(default, with = "sentinel")]
    pub platform: Option<String>,

    /// Classification tags attached on create and added on update.
    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub tenant_id: Option<TenantId>,

    #[serde(default)]
    pub role_id: Option<RoleId>,
}

impl SourceVm {
    /// Create a record with the given identity and everything else empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            power_state: String::new(),
            site: None,
            cluster: None,
            vcpus: 0,
            memory_mb: 0,
            disk_gb: 0,
            ip_address: None,
            ipv6: Vec::new(),
            created: None,
            last_update: None,
            last_checked: None,
            comments: String::new(),
            platform: None,
            tags: Vec::new(),
            tenant_id: None,
            role_id: None,
        }
    }

    /// Registry status derived from the power state.
    #[must_use]
    pub fn status(&self) -> VmStatus {
        VmStatus::from_power_state(&self.power_state)
    }

    /// Lowercased name used as the matching key.
    #[must_use]
    pub fn match_name(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Serde adapter mapping the `"Unknown"` sentinel to `None`.
mod sentinel {
    use super::UNKNOWN;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(value.as_deref().unwrap_or(UNKNOWN))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.filter(|v| !v.trim().is_empty() && v != UNKNOWN))
    }
}

/// Serde adapter for snapshot timestamps.
///
/// Unparseable values read back as `None` instead of failing the file.
mod timestamp {
    use super::{TIMESTAMP_FORMAT, UNKNOWN};
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => s.serialize_str(&ts.format(TIMESTAMP_FORMAT).to_string()),
            None => s.serialize_str(UNKNOWN),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Value::deserialize(d)?;
        Ok(raw.as_str().and_then(parse))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
            return Some(naive.and_utc());
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Serde adapter for the IPv6 list, stored as a comma-joined string.
mod address_list {
    use super::UNKNOWN;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &[String], s: S) -> Result<S::Ok, S::Error> {
        if value.is_empty() {
            s.serialize_str(UNKNOWN)
        } else {
            s.serialize_str(&value.join(", "))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        let raw = Value::deserialize(d)?;
        let items: Vec<String> = match raw {
            Value::String(joined) => joined.split(',').map(|a| a.trim().to_string()).collect(),
            Value::Array(values) => values
                .into_iter()
                .filter_map(|v| v.as_str().map(|a| a.trim().to_string()))
                .collect(),
            _ => Vec::new(),
        };
        Ok(items
            .into_iter()
            .filter(|a| !a.is_empty() && a != UNKNOWN)
            .collect())
    }
}

/// Parse a timestamp the way the snapshot file does.
///
/// Accepts `YYYY-MM-DD HH:MM:SS` (taken as UTC) and RFC 3339.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    timestamp::parse(raw)
}

// =============================================================================
// Registry side
// =============================================================================

/// A virtual machine record owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryVm {
    pub id: VmId,
    pub name: String,
    pub status: VmStatus,
    pub cluster: Option<ClusterId>,
    pub site: Option<SiteId>,
    pub vcpus: Option<u32>,
    pub memory_mb: Option<u64>,
    pub disk_gb: Option<u64>,
    pub platform: Option<PlatformId>,
    pub comments: String,
    pub custom_fields: BTreeMap<String, Value>,
    pub tags: Vec<Tag>,
    pub primary_ip4: Option<IpAddressId>,
    pub primary_ip6: Option<IpAddressId>,
    pub tenant: Option<TenantId>,
    pub role: Option<RoleId>,
}

impl RegistryVm {
    /// Check whether a tag with this name is attached.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t.name == name)
    }

    /// Detach the tag with this name, returning whether it was present.
    pub fn remove_tag(&mut self, name: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t.name != name);
        self.tags.len() != before
    }

    /// Current primary address of the same IP version as `address`.
    #[must_use]
    pub fn primary_for(&self, address: &IpAddr) -> Option<IpAddressId> {
        match address {
            IpAddr::V4(_) => self.primary_ip4,
            IpAddr::V6(_) => self.primary_ip6,
        }
    }

    /// Set the primary address of the same IP version as `address`.
    pub fn set_primary(&mut self, address: &IpAddr, id: IpAddressId) {
        match address {
            IpAddr::V4(_) => self.primary_ip4 = Some(id),
            IpAddr::V6(_) => self.primary_ip6 = Some(id),
        }
    }
}

/// Fields for a new virtual machine record, submitted in one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewVm {
    pub name: String,
    pub status: VmStatus,
    pub cluster: Option<ClusterId>,
    pub site: Option<SiteId>,
    pub vcpus: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub platform: Option<PlatformId>,
    pub comments: String,
    pub custom_fields: BTreeMap<String, Value>,
    pub tags: Vec<TagId>,
    pub tenant: Option<TenantId>,
    pub role: Option<RoleId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub name: String,
    pub site: Option<SiteId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCluster {
    pub name: String,
    pub cluster_type: ClusterTypeId,
    pub site: Option<SiteId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterType {
    pub id: ClusterTypeId,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: PlatformId,
    pub name: String,
    pub slug: String,
}

/// A network interface attached to a VM record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInterface {
    pub id: InterfaceId,
    pub vm: VmId,
    pub name: String,
    pub enabled: bool,
}

/// What an IP address record is currently bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignedObject {
    /// A VM network interface.
    VmInterface(InterfaceId),
    /// Any other object kind, such as a device interface.
    Other { object_type: String, id: u64 },
}

/// An IP address record in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRecord {
    pub id: IpAddressId,
    pub address: IpAddr,
    pub prefix_len: u8,
    pub assigned: Option<AssignedObject>,
}

impl IpAddressRecord {
    /// Check whether the address is bound to anything other than `interface`.
    #[must_use]
    pub fn is_bound_elsewhere(&self, interface: InterfaceId) -> bool {
        match &self.assigned {
            None => false,
            Some(AssignedObject::VmInterface(id)) => *id != interface,
            Some(AssignedObject::Other { .. }) => true,
        }
    }
}

/// Fields for a new IP address record bound to a VM interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIpAddress {
    pub address: IpAddr,
    pub prefix_len: u8,
    pub interface: InterfaceId,
}

impl NewIpAddress {
    /// New host-prefix (`/32` or `/128`) address bound to `interface`.
    #[must_use]
    pub fn host(address: IpAddr, interface: InterfaceId) -> Self {
        Self {
            address,
            prefix_len: host_prefix_len(&address),
            interface,
        }
    }

    /// CIDR notation, e.g. `10.0.0.5/32`.
    #[must_use]
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_len)
    }
}

/// Host prefix length for the address family.
#[must_use]
pub fn host_prefix_len(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// A custom field declared on the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: u64,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_snapshot_record_with_sentinels() {
        let raw = json!({
            "vm_id": "4211-aaaa",
            "name": "db1",
            "status": "poweredOn",
            "site": "DC1",
            "cluster": "Unknown",
            "vcpus": 4,
            "memory_mb": 8192,
            "disk": 100,
            "ip_address": "Unknown",
            "created": "2024-01-02 03:04:05",
            "ipv6": "Unknown",
            "comments": "No comments",
            "platform": "Ubuntu Linux (64-bit)",
            "last_update": "2024-01-05T10:00:00.123456Z",
            "last_checked": "not a date",
            "tags": ["prod"],
            "tenant_id": null,
            "role_id": 3
        });

        let vm: SourceVm = serde_json::from_value(raw).unwrap();
        assert_eq!(vm.id, "4211-aaaa");
        assert_eq!(vm.cluster, None);
        assert_eq!(vm.site.as_deref(), Some("DC1"));
        assert_eq!(vm.ip_address, None);
        assert!(vm.ipv6.is_empty());
        assert_eq!(
            vm.created,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap())
        );
        assert!(vm.last_update.is_some());
        assert_eq!(vm.last_checked, None);
        assert_eq!(vm.role_id, Some(RoleId::new(3)));
        assert_eq!(vm.status(), VmStatus::Active);
    }

    #[test]
    fn test_snapshot_writes_sentinels() {
        let mut vm = SourceVm::new("vm-1", "web");
        vm.created = Some(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
        vm.ipv6 = vec!["fe80::1".to_string(), "2001:db8::5".to_string()];

        let value = serde_json::to_value(&vm).unwrap();
        assert_eq!(value["cluster"], "Unknown");
        assert_eq!(value["ip_address"], "Unknown");
        assert_eq!(value["created"], "2024-06-01 12:00:00");
        assert_eq!(value["last_checked"], "Unknown");
        assert_eq!(value["ipv6"], "fe80::1, 2001:db8::5");

        let back: SourceVm = serde_json::from_value(value).unwrap();
        assert_eq!(back, vm);
    }

    #[test]
    fn test_ipv6_accepts_array() {
        let vm: SourceVm = serde_json::from_value(json!({
            "vm_id": "x",
            "name": "y",
            "ipv6": ["2001:db8::1", " "]
        }))
        .unwrap();
        assert_eq!(vm.ipv6, vec!["2001:db8::1".to_string()]);
    }

    #[test]
    fn test_match_name_is_lowercase() {
        assert_eq!(SourceVm::new("1", "DB1").match_name(), "db1");
    }

    #[test]
    fn test_registry_vm_tags_and_primary() {
        let mut vm = RegistryVm {
            id: VmId::new(1),
            name: "db1".to_string(),
            status: VmStatus::Active,
            cluster: None,
            site: None,
            vcpus: None,
            memory_mb: None,
            disk_gb: None,
            platform: None,
            comments: String::new(),
            custom_fields: BTreeMap::new(),
            tags: vec![Tag {
                id: TagId::new(5),
                name: "SYNC_FROM_VCENTER".to_string(),
                slug: "sync_from_vcenter".to_string(),
            }],
            primary_ip4: None,
            primary_ip6: None,
            tenant: None,
            role: None,
        };

        assert!(vm.has_tag("SYNC_FROM_VCENTER"));
        assert!(vm.remove_tag("SYNC_FROM_VCENTER"));
        assert!(!vm.remove_tag("SYNC_FROM_VCENTER"));

        let v4: IpAddr = "10.0.0.5".parse().unwrap();
        let v6: IpAddr = "2001:db8::5".parse().unwrap();
        vm.set_primary(&v4, IpAddressId::new(9));
        assert_eq!(vm.primary_for(&v4), Some(IpAddressId::new(9)));
        assert_eq!(vm.primary_for(&v6), None);
    }

    #[test]
    fn test_ip_binding_checks() {
        let mut record = IpAddressRecord {
            id: IpAddressId::new(1),
            address: "10.0.0.5".parse().unwrap(),
            prefix_len: 32,
            assigned: None,
        };
        assert!(!record.is_bound_elsewhere(InterfaceId::new(7)));

        record.assigned = Some(AssignedObject::VmInterface(InterfaceId::new(7)));
        assert!(!record.is_bound_elsewhere(InterfaceId::new(7)));
        assert!(record.is_bound_elsewhere(InterfaceId::new(8)));

        record.assigned = Some(AssignedObject::Other {
            object_type: "dcim.interface".to_string(),
            id: 7,
        });
        assert!(record.is_bound_elsewhere(InterfaceId::new(7)));
    }

    #[test]
    fn test_host_prefix() {
        let v4 = NewIpAddress::host("10.0.0.5".parse().unwrap(), InterfaceId::new(1));
        assert_eq!(v4.cidr(), "10.0.0.5/32");
        let v6 = NewIpAddress::host("2001:db8::5".parse().unwrap(), InterfaceId::new(1));
        assert_eq!(v6.cidr(), "2001:db8::5/128");
    }
}
