//! API server configuration.

use mtd_core::config::MtdConfig;
use mtd_core::error::MtdResult;

use crate::auth::resolve_jwt_secret;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT verification secret shared with the token issuer.
    pub jwt_secret: String,
    /// Submission pipeline settings.
    pub mtd: MtdConfig,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable           | Default                                     |
    /// |--------------------|---------------------------------------------|
    /// | `BIND_ADDR`        | `127.0.0.1:3100`                            |
    /// | `DATABASE_URL`     | `postgres://localhost:5432/mtd`             |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file     |
    ///
    /// Pipeline variables are documented on [`MtdConfig::from_env`].
    pub fn from_env() -> MtdResult<Self> {
        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/mtd".into()),
            jwt_secret: resolve_jwt_secret(),
            mtd: MtdConfig::from_env()?,
        })
    }
}
