//! vSphere client configuration

use serde::{Deserialize, Serialize};
use vmsync_connector::error::{ConnectorError, ConnectorResult};

fn default_timeout_secs() -> u64 {
    30
}

/// Connection settings for a vCenter Server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VsphereConfig {
    /// vCenter host name or base URL. A bare host name implies `https://`.
    pub host: String,

    pub username: String,

    pub password: String,

    /// Verify the server certificate. vCenter usually runs self-signed.
    #[serde(default)]
    pub verify_tls: bool,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Stop after this many VMs.
    #[serde(default)]
    pub vm_limit: Option<usize>,
}

impl VsphereConfig {
    /// Create a new config with required fields.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            verify_tls: false,
            timeout_secs: default_timeout_secs(),
            vm_limit: None,
        }
    }

    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_vm_limit(mut self, limit: Option<usize>) -> Self {
        self.vm_limit = limit;
        self
    }

    /// Base URL derived from `host`.
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    /// Build the full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "host is required".to_string(),
            });
        }
        url::Url::parse(&self.base_url()).map_err(|e| ConnectorError::InvalidConfiguration {
            message: format!("invalid host: {}", e),
        })?;
        if self.username.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "username is required".to_string(),
            });
        }
        Ok(())
    }

    /// Copy of the config safe to log.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.password = "***REDACTED***".to_string();
        config
    }
}
