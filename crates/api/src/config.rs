use chemaudit_pipeline::config::{env_or, ConfigError};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for in-flight batches to drain on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Interval between batch retention sweeps (default: `60`).
    pub retention_sweep_interval_secs: u64,
    /// Request body limit in bytes. `None` derives it from the batch size
    /// limit, see [`crate::router::batch_body_limit`].
    pub max_body_bytes: Option<usize>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `HOST`                          | `0.0.0.0`               |
    /// | `PORT`                          | `3000`                  |
    /// | `CORS_ORIGINS`                  | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`          | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`         | `30`                    |
    /// | `RETENTION_SWEEP_INTERVAL_SECS` | `60`                    |
    /// | `MAX_BODY_BYTES`                | derived                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            host,
            port: env_or("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30)?,
            retention_sweep_interval_secs: env_or("RETENTION_SWEEP_INTERVAL_SECS", 60)?.max(1),
            max_body_bytes: std::env::var_os("MAX_BODY_BYTES")
                .map(|_| env_or("MAX_BODY_BYTES", 0usize))
                .transpose()?,
        })
    }
}
