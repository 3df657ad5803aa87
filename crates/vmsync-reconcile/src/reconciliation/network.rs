//! Network interface and IP address convergence.
//!
//! Every VM gets a single tracked interface named [`INTERFACE_NAME`]. The
//! source's address is bound to it, reusing an existing address record when
//! one exists, and elected primary when the VM has no primary of that IP
//! version yet.
//!
//! Registry rejections are downgraded to a [`BindOutcome::Rejected`]; only
//! transport-class errors escape as `Err`.

use std::net::IpAddr;
use tracing::{debug, info, instrument, warn};

use vmsync_connector::prelude::*;

use super::types::BindMode;

/// Name of the interface carrying the synced address.
pub const INTERFACE_NAME: &str = "ens192";

/// What happened to one desired address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The address record was created or rebound onto the interface.
    Assigned { address: IpAddr, primary_set: bool },
    /// The address was already on the interface.
    AlreadyBound { address: IpAddr, primary_set: bool },
    /// The address belongs to another interface; left alone.
    Conflict { address: IpAddr },
    /// The registry refused one of the writes.
    Rejected { address: IpAddr, reason: String },
    /// Update mode and the VM has no tracked interface.
    NoInterface,
    /// The source reported no address.
    NoAddress,
    /// The source address does not parse.
    InvalidAddress(String),
}

impl BindOutcome {
    /// Check if the address now sits on the interface.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(
            self,
            BindOutcome::Assigned { .. } | BindOutcome::AlreadyBound { .. }
        )
    }
}

/// Turn a rejection into its message; anything else stays an error.
fn rejection(err: ConnectorError) -> ConnectorResult<String> {
    if err.is_rejection() {
        Ok(err.to_string())
    } else {
        Err(err)
    }
}

/// Binds source addresses to registry VM interfaces.
pub struct NetworkBinder<'a> {
    registry: &'a dyn Registry,
}

impl<'a> NetworkBinder<'a> {
    pub fn new(registry: &'a dyn Registry) -> Self {
        Self { registry }
    }

    /// Bind `address` to the VM's tracked interface.
    ///
    /// On success `vm` reflects any primary address that was set.
    #[instrument(skip(self, vm), fields(vm = %vm.name))]
    pub async fn bind(
        &self,
        vm: &mut RegistryVm,
        address: Option<&str>,
        mode: BindMode,
    ) -> ConnectorResult<BindOutcome> {
        let Some(raw) = address.map(str::trim).filter(|a| !a.is_empty()) else {
            debug!("No address to bind");
            return Ok(BindOutcome::NoAddress);
        };
        let address: IpAddr = match raw.parse() {
            Ok(address) => address,
            Err(_) => {
                warn!(address = raw, "Ignoring unparseable address");
                return Ok(BindOutcome::InvalidAddress(raw.to_string()));
            }
        };

        let interface = match self.registry.find_interface(vm.id, INTERFACE_NAME).await? {
            Some(interface) => interface,
            None if mode == BindMode::Create => {
                match self.registry.create_interface(vm.id, INTERFACE_NAME).await {
                    Ok(interface) => {
                        info!(interface_id = %interface.id, "Created interface");
                        interface
                    }
                    Err(e) => {
                        let reason = rejection(e)?;
                        warn!(%address, %reason, "Interface creation rejected");
                        return Ok(BindOutcome::Rejected { address, reason });
                    }
                }
            }
            None => {
                warn!(%address, interface = INTERFACE_NAME, "Interface not found, no address assigned");
                return Ok(BindOutcome::NoInterface);
            }
        };

        let mut records = self.registry.find_ip_addresses(address).await?;
        records.sort_by_key(|r| r.id);
        if records.len() > 1 {
            warn!(
                %address,
                count = records.len(),
                chosen = %records[0].id,
                "Address recorded more than once, using the lowest id"
            );
        }

        let (record, already_bound) = match records.into_iter().next() {
            None => {
                match self
                    .registry
                    .create_ip_address(&NewIpAddress::host(address, interface.id))
                    .await
                {
                    Ok(record) => {
                        info!(%address, ip_id = %record.id, "Created address");
                        (record, false)
                    }
                    Err(e) => {
                        let reason = rejection(e)?;
                        warn!(%address, %reason, "Address creation rejected");
                        return Ok(BindOutcome::Rejected { address, reason });
                    }
                }
            }
            Some(record) if record.is_bound_elsewhere(interface.id) => {
                warn!(%address, ip_id = %record.id, "Address is bound to another interface, skipping");
                return Ok(BindOutcome::Conflict { address });
            }
            Some(record) if record.assigned.is_some() => (record, true),
            Some(record) => match self.registry.assign_ip_address(record.id, interface.id).await {
                Ok(record) => {
                    info!(%address, ip_id = %record.id, "Assigned address");
                    (record, false)
                }
                Err(e) => {
                    let reason = rejection(e)?;
                    warn!(%address, %reason, "Address assignment rejected");
                    return Ok(BindOutcome::Rejected { address, reason });
                }
            },
        };

        let primary_set = self.elect_primary(vm, &address, record.id).await?;
        Ok(if already_bound {
            BindOutcome::AlreadyBound {
                address,
                primary_set,
            }
        } else {
            BindOutcome::Assigned {
                address,
                primary_set,
            }
        })
    }

    /// Make `ip` the primary address unless one of its version is set.
    async fn elect_primary(
        &self,
        vm: &mut RegistryVm,
        address: &IpAddr,
        ip: IpAddressId,
    ) -> ConnectorResult<bool> {
        if vm.primary_for(address).is_some() {
            return Ok(false);
        }

        let mut desired = vm.clone();
        desired.set_primary(address, ip);
        match self.registry.update_vm(&desired).await {
            Ok(saved) => {
                info!(%address, ip_id = %ip, "Set primary address");
                *vm = saved;
                Ok(true)
            }
            Err(e) => {
                let reason = rejection(e)?;
                warn!(%address, %reason, "Primary address rejected");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(rejection(ConnectorError::duplicate("ipam.ipaddress", "exists")).is_ok());
        assert!(rejection(ConnectorError::validation("vm", "bad field")).is_ok());
        assert!(rejection(ConnectorError::transport("reset")).is_err());
    }

    #[test]
    fn test_is_bound() {
        let address: IpAddr = "10.0.0.5".parse().unwrap();
        assert!(BindOutcome::Assigned {
            address,
            primary_set: true
        }
        .is_bound());
        assert!(!BindOutcome::Conflict { address }.is_bound());
        assert!(!BindOutcome::NoAddress.is_bound());
    }
}
