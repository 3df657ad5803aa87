//! Registry identifier types
//!
//! Newtype wrappers around the registry's numeric primary keys, one per
//! entity kind so a cluster id can never be passed where a site id is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

macro_rules! registry_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw registry primary key.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// Get the raw registry primary key.
            #[must_use]
            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

registry_id!(
    /// Identifier of a virtual machine record in the registry.
    VmId
);
registry_id!(
    /// Identifier of a cluster in the registry.
    ClusterId
);
registry_id!(
    /// Identifier of a cluster type in the registry.
    ClusterTypeId
);
registry_id!(
    /// Identifier of a site in the registry.
    SiteId
);
registry_id!(
    /// Identifier of a VM network interface in the registry.
    InterfaceId
);
registry_id!(
    /// Identifier of an IP address record in the registry.
    IpAddressId
);
registry_id!(
    /// Identifier of a tag in the registry.
    TagId
);
registry_id!(
    /// Identifier of a platform in the registry.
    PlatformId
);
registry_id!(
    /// Identifier of a tenant in the registry.
    TenantId
);
registry_id!(
    /// Identifier of a device role in the registry.
    RoleId
);
