//! Service configuration loaded from environment variables.

use std::env::VarError;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use vmsync_connector_netbox::NetBoxConfig;
use vmsync_connector_vsphere::VsphereConfig;
use vmsync_reconcile::reconciliation::{
    OrphanPolicy, ReconciliationConfig, ScheduleConfig, ScheduleFrequency,
};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: &'static str, message: String },
}

impl ConfigError {
    fn invalid(name: &'static str, message: impl ToString) -> Self {
        Self::InvalidValue {
            name,
            message: message.to_string(),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub netbox: NetBoxConfig,
    pub vsphere: VsphereConfig,
    /// Snapshot file for source fetches.
    pub output_file: Option<PathBuf>,
    pub listen_addr: SocketAddr,
    pub schedule: ScheduleConfig,
    pub reconciliation: ReconciliationConfig,
}

impl SyncConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|name| std::env::var(name))
    }

    /// Load configuration through `read`, which looks up one variable.
    pub fn from_reader<F>(read: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let vars = Vars { read };

        let verify_tls = vars.flag("VERIFY_TLS", false)?;
        let timeout_secs = vars.parsed("REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        let netbox = NetBoxConfig::new(vars.required("NETBOX_URL")?, vars.required("NETBOX_TOKEN")?)
            .with_verify_tls(verify_tls)
            .with_timeout_secs(timeout_secs);
        netbox
            .validate()
            .map_err(|e| ConfigError::invalid("NETBOX_URL", e))?;

        let vm_limit = vars
            .optional("VM_LIMIT")
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|e| ConfigError::invalid("VM_LIMIT", e))
            })
            .transpose()?;
        let vsphere = VsphereConfig::new(
            vars.required("VCENTER_HOST")?,
            vars.required("VCENTER_USER")?,
            vars.required("VCENTER_PASSWORD")?,
        )
        .with_verify_tls(verify_tls)
        .with_timeout_secs(timeout_secs)
        .with_vm_limit(vm_limit);
        vsphere
            .validate()
            .map_err(|e| ConfigError::invalid("VCENTER_HOST", e))?;

        let listen_addr = vars
            .optional("VMSYNC_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::invalid("VMSYNC_LISTEN_ADDR", e))?;

        let schedule = Self::schedule(&vars)?;

        let orphan_policy = match vars.optional("ORPHAN_POLICY") {
            Some(raw) => OrphanPolicy::from_str(&raw)
                .map_err(|e| ConfigError::invalid("ORPHAN_POLICY", e))?,
            None => OrphanPolicy::default(),
        };
        let reconciliation = ReconciliationConfig {
            bind_ipv6: vars.flag("BIND_IPV6", false)?,
            orphan_policy,
        };

        Ok(Self {
            netbox,
            vsphere,
            output_file: vars.optional("OUTPUT_FILE").map(PathBuf::from),
            listen_addr,
            schedule,
            reconciliation,
        })
    }

    /// `SYNC_SCHEDULE=off` disables timed runs.
    fn schedule<F>(vars: &Vars<F>) -> Result<ScheduleConfig, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let raw = vars.optional("SYNC_SCHEDULE");
        let (frequency, enabled) = match raw.as_deref() {
            None => (ScheduleFrequency::Daily, true),
            Some(value) if value.eq_ignore_ascii_case("off") => (ScheduleFrequency::Daily, false),
            Some(value) => (
                value
                    .parse::<ScheduleFrequency>()
                    .map_err(|e| ConfigError::invalid("SYNC_SCHEDULE", e))?,
                true,
            ),
        };

        let hour: u8 = vars.parsed("SYNC_SCHEDULE_HOUR", 23)?;
        if hour > 23 {
            return Err(ConfigError::invalid("SYNC_SCHEDULE_HOUR", "must be 0-23"));
        }
        let minute: u8 = vars.parsed("SYNC_SCHEDULE_MINUTE", 0)?;
        if minute > 59 {
            return Err(ConfigError::invalid("SYNC_SCHEDULE_MINUTE", "must be 0-59"));
        }

        let mut schedule = ScheduleConfig::new(frequency)
            .with_hour(hour)
            .with_minute(minute)
            .with_enabled(enabled);
        if frequency == ScheduleFrequency::Weekly {
            let day: u8 = vars.parsed("SYNC_SCHEDULE_DAY", 0)?;
            if day > 6 {
                return Err(ConfigError::invalid(
                    "SYNC_SCHEDULE_DAY",
                    "must be 0 (Sunday) to 6 (Saturday)",
                ));
            }
            schedule = schedule.with_day_of_week(day);
        }
        Ok(schedule)
    }
}

struct Vars<F> {
    read: F,
}

impl<F> Vars<F>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    /// Set and non-blank.
    fn optional(&self, name: &str) -> Option<String> {
        (self.read)(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::MissingVar(name))
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            Some(raw) => raw.parse().map_err(|e| ConfigError::invalid(name, e)),
            None => Ok(default),
        }
    }

    fn flag(&self, name: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(name).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("1" | "true" | "yes" | "on") => Ok(true),
            Some("0" | "false" | "no" | "off") => Ok(false),
            Some(other) => Err(ConfigError::invalid(name, format!("not a boolean: {other}"))),
        }
    }
}
