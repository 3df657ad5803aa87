//! NetBox client configuration

use serde::{Deserialize, Serialize};
use vmsync_connector::error::{ConnectorError, ConnectorResult};

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    1000
}

/// Connection settings for a NetBox instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetBoxConfig {
    /// Base URL, e.g. `https://netbox.example.com`.
    pub base_url: String,

    /// API token, sent as `Authorization: Token <token>`.
    pub token: String,

    /// Verify the server certificate.
    #[serde(default)]
    pub verify_tls: bool,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `limit` used on list endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl NetBoxConfig {
    /// Create a new config with required fields.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            verify_tls: false,
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
        }
    }

    /// Enable or disable certificate verification.
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the list page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// Build the full URL for an API path.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.base_url.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "base_url is required".to_string(),
            });
        }

        let url =
            url::Url::parse(&self.base_url).map_err(|e| ConnectorError::InvalidConfiguration {
                message: format!("invalid base_url: {}", e),
            })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(ConnectorError::InvalidConfiguration {
                message: format!("unsupported scheme: {}", url.scheme()),
            });
        }

        if self.token.is_empty() {
            return Err(ConnectorError::InvalidConfiguration {
                message: "token is required".to_string(),
            });
        }

        if self.page_size == 0 {
            return Err(ConnectorError::InvalidConfiguration {
                message: "page_size must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Copy of the config safe to log.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.token = "***REDACTED***".to_string();
        config
    }
}
