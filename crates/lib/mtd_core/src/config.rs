//! MTD pipeline configuration.

use std::fmt;
use std::str::FromStr;

use crate::error::{MtdError, MtdResult};

pub const SANDBOX_BASE_URL: &str = "https://test-api.service.hmrc.gov.uk";
pub const PRODUCTION_BASE_URL: &str = "https://api.service.hmrc.gov.uk";

/// Which HMRC environment the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_BASE_URL,
            Environment::Production => PRODUCTION_BASE_URL,
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = MtdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "test" => Ok(Environment::Sandbox),
            "production" | "live" => Ok(Environment::Production),
            other => Err(MtdError::Validation(format!(
                "Unknown MTD environment '{other}'"
            ))),
        }
    }
}

/// Software identity reported in the `Gov-Vendor-*` headers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorInfo {
    pub product_name: String,
    pub version: String,
    /// Public IP of the server making calls to HMRC.
    pub public_ip: Option<String>,
}

/// Configuration for the submission pipeline.
#[derive(Clone)]
pub struct MtdConfig {
    pub environment: Environment,
    /// HMRC API root, without a trailing slash.
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub vendor: VendorInfo,
    /// Tokens expiring within this window are refreshed before use.
    pub token_refresh_threshold: chrono::Duration,
    /// Key for encrypting OAuth tokens at rest.
    pub encryption_key: String,
}

impl fmt::Debug for MtdConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MtdConfig")
            .field("environment", &self.environment)
            .field("api_base_url", &self.api_base_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("vendor", &self.vendor)
            .field("token_refresh_threshold", &self.token_refresh_threshold)
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

impl MtdConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                           | Default                         |
    /// |------------------------------------|---------------------------------|
    /// | `MTD_ENVIRONMENT`                  | `sandbox`                       |
    /// | `HMRC_API_BASE_URL`                | per environment                 |
    /// | `HMRC_CLIENT_ID`                   | empty                           |
    /// | `HMRC_CLIENT_SECRET`               | empty                           |
    /// | `HMRC_REDIRECT_URI`                | `http://localhost:3100/mtd/oauth/callback` |
    /// | `MTD_VENDOR_PRODUCT_NAME`          | `mtd-submissions`               |
    /// | `MTD_VENDOR_VERSION`               | crate version                   |
    /// | `MTD_VENDOR_PUBLIC_IP`             | unset                           |
    /// | `MTD_TOKEN_REFRESH_THRESHOLD_SECS` | `300`                           |
    /// | `MTD_ENCRYPTION_KEY`               | development key (sandbox only)  |
    pub fn from_env() -> MtdResult<Self> {
        let environment = match std::env::var("MTD_ENVIRONMENT") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "falling back to sandbox environment");
                Environment::Sandbox
            }),
            Err(_) => Environment::Sandbox,
        };

        let threshold_secs = std::env::var("MTD_TOKEN_REFRESH_THRESHOLD_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(300);

        let encryption_key =
            encryption_key_for(environment, std::env::var("MTD_ENCRYPTION_KEY").ok())?;

        Ok(Self {
            environment,
            api_base_url: std::env::var("HMRC_API_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| environment.default_base_url().into()),
            client_id: std::env::var("HMRC_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("HMRC_CLIENT_SECRET").unwrap_or_default(),
            redirect_uri: std::env::var("HMRC_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost:3100/mtd/oauth/callback".into()),
            vendor: VendorInfo {
                product_name: std::env::var("MTD_VENDOR_PRODUCT_NAME")
                    .unwrap_or_else(|_| "mtd-submissions".into()),
                version: std::env::var("MTD_VENDOR_VERSION")
                    .unwrap_or_else(|_| crate::version().into()),
                public_ip: std::env::var("MTD_VENDOR_PUBLIC_IP").ok(),
            },
            token_refresh_threshold: chrono::Duration::seconds(threshold_secs),
            encryption_key,
        })
    }

    /// Sandbox configuration pointed at an arbitrary base URL.
    pub fn for_base_url(environment: Environment, base_url: impl Into<String>) -> Self {
        Self {
            environment,
            api_base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: "test-client-id".into(),
            client_secret: "test-client-secret".into(),
            redirect_uri: "http://localhost:3100/mtd/oauth/callback".into(),
            vendor: VendorInfo {
                product_name: "mtd-submissions".into(),
                version: crate::version().into(),
                public_ip: Some("203.0.113.10".into()),
            },
            token_refresh_threshold: chrono::Duration::seconds(300),
            encryption_key: "mtd-test-key".into(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

const DEV_ENCRYPTION_KEY: &str = "mtd-default-dev-key-change-in-production";

/// Tokens at rest in production must never be sealed with the built-in key.
fn encryption_key_for(environment: Environment, configured: Option<String>) -> MtdResult<String> {
    match configured.filter(|k| !k.trim().is_empty()) {
        Some(key) => Ok(key),
        None if environment == Environment::Production => Err(MtdError::Config(
            "MTD_ENCRYPTION_KEY must be set when MTD_ENVIRONMENT is production".into(),
        )),
        None => {
            tracing::warn!("MTD_ENCRYPTION_KEY unset, using the development key");
            Ok(DEV_ENCRYPTION_KEY.into())
        }
    }
}
